//! Atomic copy-out of cached images
//!
//! The copy is written to a hidden sibling of the destination and renamed
//! into place, so the destination holds either its old content or the
//! complete new content.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Mode requested for copies that create a new file; the umask applies
pub const DEFAULT_COPY_MODE: u32 = 0o777;

/// Copy `src` to `dst` atomically.
///
/// A new `dst` is created with `mode` reduced by the process umask. An
/// existing `dst` keeps its permissions and only has its content replaced.
/// On error `dst` is untouched and the temporary sibling is removed.
pub fn copy_atomic(src: &Path, dst: &Path, mode: u32) -> io::Result<()> {
    let file_name = dst.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("destination {} has no file name", dst.display()),
        )
    })?;
    let parent = match dst.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let tmp = TempSibling(parent.join(format!(
        ".{}.tmp-{}",
        file_name.to_string_lossy(),
        Uuid::new_v4().simple()
    )));

    let existing = match fs::metadata(dst) {
        Ok(meta) => Some(meta.permissions()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };

    let mut reader = File::open(src)?;
    let mut writer = create_with_mode(&tmp.0, mode)?;
    let copied = io::copy(&mut reader, &mut writer)?;
    if let Some(perms) = existing {
        fs::set_permissions(&tmp.0, perms)?;
    }
    writer.sync_all()?;
    drop(writer);

    fs::rename(&tmp.0, dst)?;
    tmp.keep();

    debug!(bytes = copied, "Copied {} to {}", src.display(), dst.display());
    Ok(())
}

#[cfg(unix)]
fn create_with_mode(path: &Path, mode: u32) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(path)
}

#[cfg(not(unix))]
fn create_with_mode(path: &Path, _mode: u32) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

/// Removes the temporary sibling unless it was renamed into place
struct TempSibling(PathBuf);

impl TempSibling {
    fn keep(self) {
        std::mem::forget(self);
    }
}

impl Drop for TempSibling {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}
