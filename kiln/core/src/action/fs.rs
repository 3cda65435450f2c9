//! Filesystem operations

use std::{
    ffi::CString,
    fs::{self, File, FileTimes, OpenOptions, Permissions},
    io::{self, Write},
    os::unix::{
        ffi::OsStrExt,
        fs::{FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt},
    },
    path::Path,
};

use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use super::{Action, ActionError, ActionOutput, Result};

const SCRIPT_MODE: u32 = 0o755;

/// Recursively copy `source` to `target`, keeping mode, owner and timestamps
#[instrument(skip_all, fields(source = %action.source, target = %action.target), err)]
pub(super) fn copy(action: &Action) -> Result<ActionOutput> {
    action.require("source", &action.source)?;
    action.require("target", &action.target)?;

    let source = Path::new(&action.source);
    let target = Path::new(&action.target);

    match fs::symlink_metadata(source) {
        Ok(_) => (),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ActionError::SourceMissing(source.to_path_buf()))
        }
        Err(e) => return Err(ActionError::io("stat", source, e)),
    }

    // directories come after their contents so their timestamps are set last
    for entry in WalkDir::new(source).contents_first(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            ActionError::io("walk", path, e.into())
        })?;

        let relative = entry.path().strip_prefix(source).unwrap_or(Path::new(""));
        let destination = if relative.as_os_str().is_empty() {
            target.to_path_buf()
        } else {
            target.join(relative)
        };

        copy_entry(entry.path(), &destination)?;
    }

    Ok(ActionOutput::None)
}

fn copy_entry(source: &Path, destination: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(source).map_err(|e| ActionError::io("stat", source, e))?;
    let file_type = metadata.file_type();

    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| ActionError::io("create directory", parent, e))?;
        }
    }

    if file_type.is_symlink() {
        let link = fs::read_link(source).map_err(|e| ActionError::io("read link", source, e))?;
        remove_if_exists(destination)?;
        std::os::unix::fs::symlink(&link, destination)
            .map_err(|e| ActionError::io("create symlink", destination, e))?;
        preserve_owner(destination, &metadata);
        return Ok(());
    }

    if file_type.is_fifo() {
        // opening a pipe blocks until the other end is opened, so its timestamps are left alone
        remove_if_exists(destination)?;
        make_fifo(destination, metadata.mode())?;
    } else {
        if file_type.is_dir() {
            fs::create_dir_all(destination)
                .map_err(|e| ActionError::io("create directory", destination, e))?;
        } else {
            fs::copy(source, destination).map_err(|e| ActionError::io("copy", source, e))?;
        }
        preserve_times(destination, &metadata)?;
    }

    fs::set_permissions(destination, Permissions::from_mode(metadata.mode()))
        .map_err(|e| ActionError::io("set permissions", destination, e))?;
    preserve_owner(destination, &metadata);

    Ok(())
}

fn make_fifo(path: &Path, mode: u32) -> Result<()> {
    let raw = CString::new(path.as_os_str().as_bytes()).map_err(|e| {
        ActionError::io("create pipe", path, io::Error::new(io::ErrorKind::InvalidInput, e))
    })?;

    // SAFETY: `raw` is a valid NUL terminated path that outlives the call
    let status = unsafe { libc::mkfifo(raw.as_ptr(), (mode & 0o7777) as libc::mode_t) };
    if status != 0 {
        return Err(ActionError::io("create pipe", path, io::Error::last_os_error()));
    }

    Ok(())
}

// only root may hand files to another user, anyone else keeps ownership of the copy
fn preserve_owner(destination: &Path, metadata: &fs::Metadata) {
    if let Err(e) = std::os::unix::fs::lchown(destination, Some(metadata.uid()), Some(metadata.gid())) {
        debug!("Keeping current owner of {}: {e}", destination.display());
    }
}

fn preserve_times(destination: &Path, metadata: &fs::Metadata) -> Result<()> {
    let mut times = FileTimes::new();
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    if let Ok(modified) = metadata.modified() {
        times = times.set_modified(modified);
    }

    let file = File::open(destination).map_err(|e| ActionError::io("open", destination, e))?;
    file.set_times(times)
        .map_err(|e| ActionError::io("set timestamps", destination, e))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ActionError::io("stat", path, e)),
    };

    let removed = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match removed {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ActionError::io("delete", path, e)),
    }
}

/// Replace `target` with `source`
#[instrument(skip_all, fields(source = %action.source, target = %action.target), err)]
pub(super) fn move_path(action: &Action) -> Result<ActionOutput> {
    action.require("source", &action.source)?;
    action.require("target", &action.target)?;

    let source = Path::new(&action.source);
    let target = Path::new(&action.target);

    if fs::symlink_metadata(source).is_err() {
        return Err(ActionError::SourceMissing(source.to_path_buf()));
    }

    remove_if_exists(target)?;
    fs::rename(source, target).map_err(|e| ActionError::io("rename", source, e))?;

    Ok(ActionOutput::None)
}

/// Remove a single file or empty directory
pub(super) fn delete(action: &Action) -> Result<ActionOutput> {
    action.require("source", &action.source)?;

    let path = Path::new(&action.source);
    let metadata = fs::symlink_metadata(path).map_err(|e| ActionError::io("delete", path, e))?;

    let removed = if metadata.is_dir() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|e| ActionError::io("delete", path, e))?;

    Ok(ActionOutput::None)
}

/// Remove a path and everything below it, a missing path is not an error
pub(super) fn delete_recursive(action: &Action) -> Result<ActionOutput> {
    action.require("source", &action.source)?;
    remove_if_exists(Path::new(&action.source))?;
    Ok(ActionOutput::None)
}

pub(super) fn create_dir(action: &Action) -> Result<ActionOutput> {
    let path = Path::new(&action.source);
    fs::create_dir(path).map_err(|e| ActionError::io("create directory", path, e))?;
    Ok(ActionOutput::None)
}

pub(super) fn create_path(action: &Action) -> Result<ActionOutput> {
    let path = Path::new(&action.source);
    fs::create_dir_all(path).map_err(|e| ActionError::io("create path", path, e))?;
    Ok(ActionOutput::None)
}

/// Set the mode of `source` to the octal permission in `target`
pub(super) fn chmod(action: &Action) -> Result<ActionOutput> {
    action.require("source", &action.source)?;
    action.require("target", &action.target)?;

    let mode = u32::from_str_radix(&action.target, 8).map_err(|source| {
        ActionError::InvalidPermission {
            value: action.target.clone(),
            source,
        }
    })?;

    let path = Path::new(&action.source);
    if fs::symlink_metadata(path).is_err() {
        return Err(ActionError::SourceMissing(path.to_path_buf()));
    }

    fs::set_permissions(path, Permissions::from_mode(mode))
        .map_err(|e| ActionError::io("chmod", path, e))?;

    Ok(ActionOutput::None)
}

/// Set the owner of `source` to the `UID:GID` pair in `target`
pub(super) fn chown(action: &Action) -> Result<ActionOutput> {
    action.require("source", &action.source)?;
    action.require("target", &action.target)?;

    let (uid, gid) = parse_owner(&action.target)?;

    let path = Path::new(&action.source);
    if fs::symlink_metadata(path).is_err() {
        return Err(ActionError::SourceMissing(path.to_path_buf()));
    }

    std::os::unix::fs::chown(path, Some(uid), Some(gid))
        .map_err(|e| ActionError::io("chown", path, e))?;

    Ok(ActionOutput::None)
}

fn parse_owner(raw: &str) -> Result<(u32, u32)> {
    let invalid = || ActionError::InvalidOwner(raw.to_string());

    let (uid, gid) = raw.split_once(':').ok_or_else(invalid)?;
    let uid = uid.trim().parse::<u32>().map_err(|_| invalid())?;
    let gid = gid.trim().parse::<u32>().map_err(|_| invalid())?;

    Ok((uid, gid))
}

/// Write `source` verbatim to a new executable file at `target`
pub(super) fn script(action: &Action) -> Result<ActionOutput> {
    action.require("source", &action.source)?;
    action.require("target", &action.target)?;

    let path = Path::new(&action.target);
    if fs::symlink_metadata(path).is_ok() {
        return Err(ActionError::TargetExists(path.to_path_buf()));
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(SCRIPT_MODE)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => ActionError::TargetExists(path.to_path_buf()),
            _ => ActionError::io("create script", path, e),
        })?;

    file.write_all(action.source.as_bytes())
        .map_err(|e| ActionError::io("write script", path, e))?;

    // the process umask may have narrowed the mode passed to open
    if let Err(e) = fs::set_permissions(path, Permissions::from_mode(SCRIPT_MODE)) {
        warn!("Unable to mark {} executable: {e}", path.display());
    }

    Ok(ActionOutput::None)
}
