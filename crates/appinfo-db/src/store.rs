//! SQLite-backed package metadata store.
//!
//! The store starts out uninitialized. Only [`MetadataStore::create_database`]
//! and [`MetadataStore::initialize_database`] are allowed before a database is
//! open; everything else returns [`StoreError::NotInitialized`].
//!
//! Writes go through a [`StoreWriter`], which wraps one transaction. Dropping
//! a writer without calling [`StoreWriter::commit`] rolls it back.

use crate::checksum::{CommitHook, Md5Checksum};
use crate::schema::{Field, PACKAGES_TABLE, SCHEMA};
use appinfo_core::backend::BackendError;
use appinfo_core::config::StoreSection;
use rusqlite::{params, params_from_iter, Connection, Transaction};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;
pub const DEFAULT_SCORE: i64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Initialize a DB first")]
    NotInitialized,
    #[error("No such DB ({}).", .0.display())]
    DatabaseMissing(PathBuf),
    #[error("DB already exists.")]
    AlreadyExists(PathBuf),
    #[error("Package {0} does not exist")]
    PackageNotFound(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("failed to prepare database file: {0}")]
    Io(std::io::Error),
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl StoreError {
    /// Whether this is an anticipated condition rather than a storage fault.
    pub fn is_expected(&self) -> bool {
        !matches!(self, StoreError::Io(_) | StoreError::Db(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Name(String),
    NamePrefix(String),
}

impl Filter {
    fn clause(&self) -> (&'static str, &str) {
        match self {
            Filter::Name(name) => ("name = ?1", name),
            Filter::NamePrefix(prefix) => ("substr(name, 1, length(?1)) = ?1", prefix),
        }
    }
}

/// A projected row. Columns that were not selected stay `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageRow {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub score: Option<i64>,
    pub nose: Option<i64>,
}

impl PackageRow {
    pub fn into_record(self) -> Option<PackageRecord> {
        Some(PackageRecord {
            id: self.id?,
            name: self.name?,
            score: self.score?,
            nose: self.nose?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageRecord {
    pub id: i64,
    pub name: String,
    pub score: i64,
    pub nose: i64,
}

impl PackageRecord {
    pub fn average_score(&self) -> i64 {
        average_score(self.score, self.nose)
    }
}

/// `ceil(max(1, score) / max(1, nose))`; unrated packages score 1.
pub fn average_score(score: i64, nose: i64) -> i64 {
    let score = score.max(1);
    let nose = nose.max(1);
    (score + nose - 1) / nose
}

pub fn clamp_rating(rating: i64) -> i64 {
    rating.clamp(MIN_RATING, MAX_RATING)
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".backup");
    PathBuf::from(name)
}

#[derive(Default)]
pub struct MetadataStore {
    conn: Option<Connection>,
    path: Option<PathBuf>,
    hook: Option<Box<dyn CommitHook>>,
}

impl MetadataStore {
    pub fn new() -> Self {
        MetadataStore::default()
    }

    pub fn from_config(section: &StoreSection) -> Self {
        let store = MetadataStore::new();
        if section.checksum_after_commit {
            store.with_commit_hook(Box::new(Md5Checksum))
        } else {
            store
        }
    }

    pub fn with_commit_hook(mut self, hook: Box<dyn CommitHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.conn.is_some()
    }

    pub fn ensure_initialized(&self) -> Result<(), StoreError> {
        self.conn().map(|_| ())
    }

    fn conn(&self) -> Result<&Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::NotInitialized)
    }

    fn open(&mut self, path: &Path) -> Result<(), StoreError> {
        let conn = Connection::open(path)?;
        self.conn = Some(conn);
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    fn close(&mut self) {
        self.conn = None;
        self.path = None;
    }

    /// Creates a fresh database at `path`.
    ///
    /// Without `force` an existing file is opened instead and
    /// [`StoreError::AlreadyExists`] is returned; the store is usable
    /// afterwards. With `force` the old file is moved to `<path>.backup`,
    /// replacing any earlier backup.
    pub fn create_database(&mut self, path: &Path, force: bool) -> Result<(), StoreError> {
        if !force && path.exists() {
            self.open(path)?;
            tracing::info!(path = %path.display(), "database exists, opened it instead");
            return Err(StoreError::AlreadyExists(path.to_path_buf()));
        }

        // The current connection may point at the file about to be moved.
        self.close();

        let backup = backup_path(path);
        if backup.exists() {
            std::fs::remove_file(&backup).map_err(StoreError::Io)?;
        }
        if path.exists() {
            std::fs::rename(path, &backup).map_err(StoreError::Io)?;
            tracing::info!(backup = %backup.display(), "moved previous database aside");
        }

        self.open(path)?;
        let writer = self.begin()?;
        writer.tx.execute_batch(SCHEMA)?;
        writer.commit()?;
        tracing::info!(path = %path.display(), "created database");
        Ok(())
    }

    /// Opens an existing database. A missing file leaves the store uninitialized.
    pub fn initialize_database(&mut self, path: &Path) -> Result<(), StoreError> {
        if !path.exists() {
            self.close();
            return Err(StoreError::DatabaseMissing(path.to_path_buf()));
        }
        self.open(path)?;
        tracing::debug!(path = %path.display(), "opened database");
        Ok(())
    }

    /// The single read primitive. An empty `fields` slice selects every column.
    pub fn query_packages(
        &self,
        fields: &[Field],
        filter: Option<&Filter>,
    ) -> Result<Vec<PackageRow>, StoreError> {
        let conn = self.conn()?;
        let fields = if fields.is_empty() {
            &Field::ALL[..]
        } else {
            fields
        };
        let columns = fields
            .iter()
            .map(|field| field.column())
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {} FROM {}", columns, PACKAGES_TABLE);
        let mut values: Vec<&str> = Vec::new();
        if let Some(filter) = filter {
            let (clause, value) = filter.clause();
            sql.push_str(" WHERE ");
            sql.push_str(clause);
            values.push(value);
        }
        sql.push_str(" ORDER BY id");
        tracing::debug!(%sql, "querying packages");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            let mut out = PackageRow::default();
            for (index, field) in fields.iter().enumerate() {
                match field {
                    Field::Id => out.id = Some(row.get(index)?),
                    Field::Name => out.name = Some(row.get(index)?),
                    Field::Score => out.score = Some(row.get(index)?),
                    Field::Nose => out.nose = Some(row.get(index)?),
                }
            }
            Ok(out)
        })?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn records(&self, filter: Option<&Filter>) -> Result<Vec<PackageRecord>, StoreError> {
        Ok(self
            .query_packages(&Field::ALL, filter)?
            .into_iter()
            .filter_map(PackageRow::into_record)
            .collect())
    }

    /// Starts a write transaction.
    pub fn begin(&mut self) -> Result<StoreWriter<'_>, StoreError> {
        let conn = self.conn.as_mut().ok_or(StoreError::NotInitialized)?;
        let tx = conn.transaction()?;
        Ok(StoreWriter {
            tx,
            hook: self.hook.as_deref(),
            path: self.path.as_deref(),
        })
    }
}

/// One pending write transaction against the packages table.
pub struct StoreWriter<'a> {
    tx: Transaction<'a>,
    hook: Option<&'a dyn CommitHook>,
    path: Option<&'a Path>,
}

impl StoreWriter<'_> {
    /// Inserts unrated records.
    pub fn insert_packages<I, S>(&self, names: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut stmt = self.tx.prepare(&format!(
            "INSERT INTO {} (name, score, nose) VALUES (?1, 0, 0)",
            PACKAGES_TABLE
        ))?;
        let mut inserted = 0;
        for name in names {
            inserted += stmt.execute(params![name.as_ref()])?;
        }
        Ok(inserted)
    }

    /// Adds `rating` to the score and bumps the rating count. Returns rows touched.
    pub fn add_rating(&self, name: &str, rating: i64) -> Result<usize, StoreError> {
        let changed = self.tx.execute(
            &format!(
                "UPDATE {} SET score = score + ?1, nose = nose + 1 WHERE name = ?2",
                PACKAGES_TABLE
            ),
            params![rating, name],
        )?;
        Ok(changed)
    }

    /// Zeroes score and count for `name`, or for every record when `None`.
    pub fn reset(&self, name: Option<&str>) -> Result<usize, StoreError> {
        let changed = match name {
            Some(name) => self.tx.execute(
                &format!(
                    "UPDATE {} SET score = 0, nose = 0 WHERE name = ?1",
                    PACKAGES_TABLE
                ),
                params![name],
            )?,
            None => self.tx.execute(
                &format!("UPDATE {} SET score = 0, nose = 0", PACKAGES_TABLE),
                [],
            )?,
        };
        Ok(changed)
    }

    /// Commits the transaction, then runs the post-commit hook if one is set.
    pub fn commit(self) -> Result<(), StoreError> {
        self.tx.commit()?;
        if let (Some(hook), Some(path)) = (self.hook, self.path) {
            if let Err(err) = hook.after_commit(path) {
                tracing::warn!(error = %err, "post-commit hook failed");
            }
        }
        Ok(())
    }
}
