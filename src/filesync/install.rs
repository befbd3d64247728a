//! Atomic install of a fetched file.

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::FetchedFile;
use crate::error::FetchError;

/// Verifies `file` against `checksum` and moves it into place at `target`.
///
/// The content is written to a temporary file in the target directory, then
/// renamed, so readers never observe a partial file.
pub async fn install(target: String, checksum: String, file: FetchedFile) -> Result<(), FetchError> {
    tokio::task::spawn_blocking(move || install_blocking(Path::new(&target), &checksum, &file))
        .await
        .map_err(|e| FetchError::Io(std::io::Error::other(e)))?
}

fn install_blocking(target: &Path, checksum: &str, file: &FetchedFile) -> Result<(), FetchError> {
    let actual = hex::encode(Sha256::digest(&file.content));
    if !actual.eq_ignore_ascii_case(checksum) {
        return Err(FetchError::Checksum {
            expected: checksum.to_string(),
            actual,
        });
    }

    let tmp = temp_path(target);
    let res = write_temp(&tmp, file).and_then(|()| fs::rename(&tmp, target));
    if res.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    res.map_err(FetchError::from)
}

fn temp_path(target: &Path) -> PathBuf {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let base = target
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.join(format!(".{base}.{}.tmp", Uuid::new_v4().simple()))
}

fn write_temp(tmp: &Path, file: &FetchedFile) -> std::io::Result<()> {
    let mut f = fs::File::create(tmp)?;
    f.write_all(&file.content)?;
    f.sync_all()?;
    if let Some(mode) = file.mode {
        f.set_permissions(fs::Permissions::from_mode(mode))?;
    }
    if let Some(mtime) = file.mtime {
        f.set_modified(SystemTime::from(mtime))?;
    }
    drop(f);
    if file.uid.is_some() || file.gid.is_some() {
        std::os::unix::fs::chown(tmp, file.uid, file.gid)?;
    }
    Ok(())
}
