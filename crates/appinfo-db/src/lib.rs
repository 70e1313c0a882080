pub mod checksum;
pub mod client;
pub mod reply;
pub mod schema;
pub mod server;
pub mod store;

pub use client::PackageClient;
pub use reply::Reply;
pub use server::PackageServer;
pub use store::{MetadataStore, PackageRecord, StoreError, StoreWriter};
