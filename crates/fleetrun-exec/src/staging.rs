//! Scoped temporary files for staged executables and copies
//!
//! Everything created here is tied to a guard value and removed when the
//! guard drops, so cleanup also happens on early returns and spawn failures.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, warn};

use crate::error::ExecError;

/// Temporary directory holding staged scripts and tasks
#[derive(Debug)]
pub struct StagingDir {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl StagingDir {
    /// Create a staging directory under `tmpdir`
    ///
    /// With `cleanup` off the directory is left behind for inspection.
    ///
    /// # Errors
    /// Returns `ExecError::Staging` if the directory cannot be created
    pub fn create(tmpdir: &Path, cleanup: bool) -> Result<Self, ExecError> {
        let dir = tempfile::Builder::new()
            .prefix("fleetrun-")
            .tempdir_in(tmpdir)
            .map_err(|e| ExecError::Staging {
                path: tmpdir.to_path_buf(),
                message: e.to_string(),
            })?;
        let path = dir.path().to_path_buf();

        debug!(path = %path.display(), cleanup, "created staging directory");

        let dir = if cleanup {
            Some(dir)
        } else {
            let _ = dir.keep();
            None
        };

        Ok(Self { dir, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy an executable into the directory and mark it executable
    ///
    /// # Errors
    /// Returns `ExecError::Staging` if the copy or permission change fails
    pub fn stage(&self, source: &Path) -> Result<PathBuf, ExecError> {
        let staging_err = |e: io::Error| ExecError::Staging {
            path: source.to_path_buf(),
            message: e.to_string(),
        };

        let file_name = source.file_name().ok_or_else(|| ExecError::Staging {
            path: source.to_path_buf(),
            message: "path has no file name".to_string(),
        })?;
        let staged = self.path.join(file_name);

        fs::copy(source, &staged).map_err(staging_err)?;
        make_executable(&staged).map_err(staging_err)?;

        debug!(source = %source.display(), staged = %staged.display(), "staged executable");
        Ok(staged)
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take()
            && let Err(e) = dir.close()
        {
            warn!(path = %self.path.display(), error = %e, "failed to remove staging directory");
        }
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o700);
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Copy `source` to `destination`, replacing what is there
///
/// Follows `cp --remove-destination`: when `destination` is an existing
/// directory the source is copied into it under its own file name, and
/// whatever sits at that final path is replaced rather than merged into.
/// Content is written to a temporary sibling first and then renamed into
/// place. Directories are copied recursively. Any failure is reported as
/// `ExecError::Copy` for the requested destination.
///
/// # Errors
/// Returns `ExecError::Copy` if any step fails
pub fn replace_destination(source: &Path, destination: &Path) -> Result<(), ExecError> {
    let copy_err = |e: io::Error| ExecError::copy(destination, e);

    let metadata = fs::metadata(source).map_err(copy_err)?;
    let target = if destination.is_dir() {
        let name = source.file_name().ok_or_else(|| {
            ExecError::copy(destination, "source path has no file name")
        })?;
        destination.join(name)
    } else {
        destination.to_path_buf()
    };
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    if metadata.is_dir() {
        let staged = tempfile::Builder::new()
            .prefix(".fleetrun-copy-")
            .tempdir_in(parent)
            .map_err(copy_err)?;
        copy_tree(source, staged.path()).map_err(copy_err)?;
        remove_existing(&target).map_err(copy_err)?;
        fs::rename(staged.path(), &target).map_err(copy_err)?;
    } else {
        if target.is_dir() {
            return Err(ExecError::copy(
                destination,
                format!("cannot overwrite directory {} with a file", target.display()),
            ));
        }
        let mut staged = NamedTempFile::new_in(parent).map_err(copy_err)?;
        let mut input = fs::File::open(source).map_err(copy_err)?;
        io::copy(&mut input, staged.as_file_mut()).map_err(copy_err)?;
        staged
            .as_file()
            .set_permissions(metadata.permissions())
            .map_err(copy_err)?;
        staged.persist(&target).map_err(|e| copy_err(e.error))?;
    }

    debug!(
        source = %source.display(),
        destination = %target.display(),
        "copied"
    );
    Ok(())
}

fn remove_existing(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn copy_tree(source: &Path, destination: &Path) -> io::Result<()> {
    fs::create_dir_all(destination)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = destination.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
