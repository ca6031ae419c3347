//! Filesystem helpers shared by the extraction and promotion stages.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::warn;
use walkdir::WalkDir;

/// Recursively copies `src` into `dst`, skipping files rejected by `keep`.
///
/// Directories are always created. Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path, keep: impl Fn(&Path) -> bool) -> io::Result<usize> {
    let mut copied = 0usize;
    fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if keep(entry.path()) {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Lists regular files under `root` in sorted walk order.
pub fn list_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// File name as UTF-8, or an empty string.
pub fn file_name_str(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// SHA-256 of a file, hex encoded.
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Adds group read/write (`g+rw`) to every entry under `root`.
///
/// Best-effort: failures are logged and returned, never raised.
pub fn grant_group_rw(root: &Path) -> Vec<String> {
    let mut failures = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(path = %root.display(), %error, "cannot walk for permission change");
                failures.push(format!("walk {}: {error}", root.display()));
                continue;
            }
        };
        if let Err(error) = add_group_rw(entry.path()) {
            warn!(path = %entry.path().display(), %error, "cannot grant group read/write");
            failures.push(format!("chmod g+rw {}: {error}", entry.path().display()));
        }
    }
    failures
}

#[cfg(unix)]
fn add_group_rw(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::symlink_metadata(path)?;
    if metadata.file_type().is_symlink() {
        return Ok(());
    }
    let mut permissions = metadata.permissions();
    permissions.set_mode(permissions.mode() | 0o060);
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn add_group_rw(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Removes a file, logging instead of failing.
pub fn remove_file_best_effort(path: &Path, warnings: &mut Vec<String>) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(error) => {
            warn!(path = %path.display(), %error, "cannot remove file");
            warnings.push(format!("remove {}: {error}", path.display()));
            false
        }
    }
}
