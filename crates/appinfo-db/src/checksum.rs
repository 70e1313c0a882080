use md5::{Digest, Md5};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("failed to read {0} for checksum: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to write checksum file {0}: {1}")]
    Write(PathBuf, std::io::Error),
}

/// Runs after every successful commit. Failures are logged by the store and
/// never turn a committed write into an error.
pub trait CommitHook {
    fn after_commit(&self, db_path: &Path) -> Result<(), ChecksumError>;
}

/// Writes `<db>.md5` next to the database in `md5sum` format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Checksum;

impl Md5Checksum {
    pub fn digest_file(path: &Path) -> Result<String, ChecksumError> {
        let content =
            std::fs::read(path).map_err(|err| ChecksumError::Read(path.to_path_buf(), err))?;
        Ok(format!("{:x}", Md5::digest(&content)))
    }

    pub fn sidecar_path(db_path: &Path) -> PathBuf {
        let mut name = OsString::from(db_path.as_os_str());
        name.push(".md5");
        PathBuf::from(name)
    }
}

impl CommitHook for Md5Checksum {
    fn after_commit(&self, db_path: &Path) -> Result<(), ChecksumError> {
        let digest = Md5Checksum::digest_file(db_path)?;
        let file_name = db_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sidecar = Md5Checksum::sidecar_path(db_path);
        std::fs::write(&sidecar, format!("{}  {}\n", digest, file_name))
            .map_err(|err| ChecksumError::Write(sidecar.clone(), err))?;
        tracing::info!(db = %db_path.display(), md5 = %digest, "updated database checksum");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_known_md5() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("appinfo.db");
        std::fs::write(&path, b"hello").expect("write failed");

        let digest = Md5Checksum::digest_file(&path).expect("digest failed");
        assert_eq!(digest, "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn hook_writes_md5sum_sidecar() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("appinfo.db");
        std::fs::write(&path, b"hello").expect("write failed");

        Md5Checksum.after_commit(&path).expect("hook failed");
        let sidecar = std::fs::read_to_string(dir.path().join("appinfo.db.md5"))
            .expect("sidecar missing");
        assert_eq!(sidecar, "5d41402abc4b2a76b9719d911017c592  appinfo.db\n");
    }

    #[test]
    fn missing_database_is_a_read_error() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let err = Md5Checksum
            .after_commit(&dir.path().join("absent.db"))
            .expect_err("missing file should fail");
        assert!(matches!(err, ChecksumError::Read(..)));
    }
}
