use crate::{Error, Result};
use std::{
    fs::{self, create_dir_all},
    path::{Path, PathBuf},
};
use tracing::{info, warn};

/// Copies the file at `path` next to itself as `<name>.<timestamp>-<reason>.bak`.
pub fn try_backup_file(path: impl AsRef<Path>, reason: impl AsRef<str>) -> Result<PathBuf> {
    let path = path.as_ref();

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let backup_path = path.with_file_name(format!(
        "{file_name}.{}-{}.bak",
        chrono::Local::now().timestamp(),
        reason.as_ref()
    ));

    fs::copy(path, &backup_path).map_err(|e| Error::IOCopyFailure {
        path_from: path.display().to_string(),
        path_destination: backup_path.display().to_string(),
        reason: e,
    })?;

    return Ok(backup_path);
}

/// Backs up a file that failed to parse and returns the [`Error::DBCorrupt`] to report.
pub fn backup_failed_parse(
    path: impl AsRef<Path>,
    error: impl std::error::Error + Send + Sync + 'static,
) -> Error {
    let path = path.as_ref();

    warn!(
        "Failed deserialize file at [{}], creating a new backup, caused by: [{error}]",
        path.display(),
    );

    return match try_backup_file(path, "FAILED_PARSING") {
        Ok(backup_path) => {
            info!("Backup created successfully at [{}]", backup_path.display());

            return Error::DBCorrupt {
                file_path: path.to_path_buf(),
                reason: Error::DeserializationFailure(Box::new(error)).to_string(),
            };
        }
        Err(e) => e,
    };
}

pub fn try_create_dir(dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();

    return create_dir_all(dir).map_err(|e| Error::IOCreateDirFailure {
        path: dir.display().to_string(),
        reason: e,
    });
}

pub fn try_write_file(serialized_bytes: &[u8], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        try_create_dir(parent)?;
    }

    if path.is_dir() {
        return Err(Error::DBCorrupt {
            file_path: path.to_path_buf(),
            reason: std::io::ErrorKind::IsADirectory.to_string(),
        });
    }

    return fs::write(path, serialized_bytes).map_err(|e| Error::IOWriteFailure {
        path: path.display().to_string(),
        reason: e,
    });
}

pub fn try_read_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();

    return fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::DBNotFound {
            file_path: path.to_path_buf(),
        },
        _ => Error::DBCorrupt {
            file_path: path.to_path_buf(),
            reason: e.to_string(),
        },
    });
}
