use crate::schema::Field;
use crate::store::{
    average_score, Filter, MetadataStore, PackageRecord, StoreError, DEFAULT_SCORE,
};
use appinfo_core::backend::{self, BackendError};
use appinfo_core::config::{Config, StoreSection};
use std::path::Path;

/// Read-only view used by package frontends to show ratings.
pub struct PackageClient {
    store: MetadataStore,
}

impl PackageClient {
    /// Fails for an unknown backend id even though reads never consult it.
    pub fn new(backend_id: &str, config: &Config) -> Result<Self, BackendError> {
        backend::resolve(backend_id, &config.backend)?;
        Ok(PackageClient::from_config(&config.store))
    }

    pub fn from_config(section: &StoreSection) -> Self {
        PackageClient {
            store: MetadataStore::from_config(section),
        }
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn initialize_database(&mut self, path: &Path) -> Result<(), StoreError> {
        self.store.initialize_database(path)
    }

    /// Average rating rounded up. Unknown and unrated packages score 1.
    pub fn score(&self, package: &str) -> Result<i64, StoreError> {
        self.store.ensure_initialized()?;
        let filter = Filter::Name(package.to_string());
        let rows = self
            .store
            .query_packages(&[Field::Score, Field::Nose], Some(&filter))?;
        Ok(match rows.first() {
            Some(row) => average_score(row.score.unwrap_or(0), row.nose.unwrap_or(0)),
            None => DEFAULT_SCORE,
        })
    }

    pub fn id(&self, package: &str) -> Result<Option<i64>, StoreError> {
        self.store.ensure_initialized()?;
        let filter = Filter::Name(package.to_string());
        let rows = self.store.query_packages(&[Field::Id], Some(&filter))?;
        Ok(rows.first().and_then(|row| row.id))
    }

    pub fn records(&self, filter: Option<&Filter>) -> Result<Vec<PackageRecord>, StoreError> {
        self.store.ensure_initialized()?;
        self.store.records(filter)
    }
}
