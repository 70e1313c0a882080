use crate::schema::Field;
use crate::store::{clamp_rating, Filter, MetadataStore, PackageRecord, StoreError};
use appinfo_core::backend::{self, BackendError, PackageSource};
use appinfo_core::config::{Config, StoreSection};
use std::collections::HashSet;
use std::path::Path;

/// Maintenance view: creates the database, mirrors the backend package list
/// into it and records ratings.
pub struct PackageServer {
    store: MetadataStore,
    source: Box<dyn PackageSource>,
}

impl PackageServer {
    pub fn new(backend_id: &str, config: &Config) -> Result<Self, BackendError> {
        let source = backend::resolve(backend_id, &config.backend)?;
        Ok(PackageServer::with_source(source, &config.store))
    }

    pub fn with_source(source: Box<dyn PackageSource>, section: &StoreSection) -> Self {
        PackageServer {
            store: MetadataStore::from_config(section),
            source,
        }
    }

    pub fn backend(&self) -> &str {
        self.source.name()
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn create_database(&mut self, path: &Path, force: bool) -> Result<(), StoreError> {
        self.store.create_database(path, force)
    }

    pub fn initialize_database(&mut self, path: &Path) -> Result<(), StoreError> {
        self.store.initialize_database(path)
    }

    /// Inserts every backend package not yet stored. Returns how many were added.
    pub fn synchronize(&mut self) -> Result<usize, StoreError> {
        self.store.ensure_initialized()?;
        let from_backend: HashSet<String> = self.source.package_names()?.into_iter().collect();
        let stored: HashSet<String> = self
            .store
            .query_packages(&[Field::Name], None)?
            .into_iter()
            .filter_map(|row| row.name)
            .collect();

        let writer = self.store.begin()?;
        let inserted = writer.insert_packages(from_backend.difference(&stored))?;
        writer.commit()?;
        tracing::info!(backend = self.source.name(), inserted, "synchronized package list");
        Ok(inserted)
    }

    /// Applies one rating, clamped to 1..=5, and returns the updated record.
    pub fn rate(&mut self, package: &str, rating: i64) -> Result<Vec<PackageRecord>, StoreError> {
        self.store.ensure_initialized()?;
        let rating = clamp_rating(rating);
        let filter = Filter::Name(package.to_string());
        if self
            .store
            .query_packages(&[Field::Id], Some(&filter))?
            .is_empty()
        {
            return Err(StoreError::PackageNotFound(package.to_string()));
        }

        let writer = self.store.begin()?;
        writer.add_rating(package, rating)?;
        writer.commit()?;
        tracing::debug!(package, rating, "recorded rating");
        self.store.records(Some(&filter))
    }

    /// Resets one package, or every package when `package` is `None` or empty.
    /// Naming an unknown package is not an error.
    pub fn reset_scores(&mut self, package: Option<&str>) -> Result<usize, StoreError> {
        self.store.ensure_initialized()?;
        let package = package.filter(|name| !name.is_empty());
        let writer = self.store.begin()?;
        let changed = writer.reset(package)?;
        writer.commit()?;
        tracing::info!(package = package.unwrap_or("*"), changed, "reset scores");
        Ok(changed)
    }
}
