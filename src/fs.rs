//! Interact with the filesystem when saving the state of the PRNG.
use std::{
    fs::{self, DirBuilder, OpenOptions},
    io::{self, prelude::*},
    os::unix::fs::{DirBuilderExt, OpenOptionsExt},
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{
    config::{SEED_DIR_MODE, SEED_FILE_MODE},
    error::RandError,
    state::RandState,
};

/// What happened to the parent directory of a seed file before saving it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParentDir {
    Existing(PathBuf),
    Created(PathBuf),
}

/// The outcome of [`persist`].
///
/// a failure here never fails the run, it only means that the next run will
/// have to fall back to the entropy device.
#[derive(Debug)]
pub enum Persistence {
    /// `bytes` have been written to the seed file.
    Saved { bytes: usize },
    Failed(RandError),
}

impl Persistence {
    pub fn is_saved(&self) -> bool {
        matches!(self, Persistence::Saved { .. })
    }
}

/// Makes sure the immediate parent of `path` is a directory, creating it with
/// mode [`SEED_DIR_MODE`] if it does not exist.
///
/// > **Note**
/// >
/// > only the last component is created, a missing grandparent is an error.
pub fn ensure_parent_dir(path: &Path) -> io::Result<ParentDir> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    match fs::read_dir(&parent) {
        Ok(_) => Ok(ParentDir::Existing(parent)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            DirBuilder::new().mode(SEED_DIR_MODE).create(&parent)?;
            Ok(ParentDir::Created(parent))
        }
        Err(e) => Err(e),
    }
}

/// Writes `contents` to `path` through a temporary sibling file.
///
/// the temporary file is named after `path`, with `suffix` appended, and is
/// created with mode [`SEED_FILE_MODE`]. it is removed if anything goes wrong
/// before it has been renamed over `path`.
pub(crate) fn write_atomically(path: &Path, contents: &[u8], suffix: u32) -> io::Result<()> {
    let mut name = path
        .file_name()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{:?} does not name a file", path),
            )
        })?
        .to_os_string();
    name.push(format!(".{}", suffix));
    let tmp = path.with_file_name(name);

    debug!("writing {} bytes to temporary file {:?}", contents.len(), tmp);
    let res = write_new(&tmp, contents).and_then(|_| fs::rename(&tmp, path));
    if res.is_err() {
        let _ = fs::remove_file(&tmp);
    }

    res
}

fn write_new(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(SEED_FILE_MODE)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

/// Saves the state of the PRNG to `seed_file`.
///
/// a parent directory that cannot be prepared is only reported, the write is
/// attempted anyway and decides of the outcome.
pub fn persist(state: &mut RandState, seed_file: &Path) -> Persistence {
    match ensure_parent_dir(seed_file) {
        Ok(ParentDir::Existing(dir)) => debug!("seed directory {:?} exists", dir),
        Ok(ParentDir::Created(dir)) => info!("created seed directory {:?}", dir),
        Err(e) => warn!(
            "could not prepare the parent directory of {:?}: {}",
            seed_file, e
        ),
    }

    match state.write_file(seed_file) {
        Ok(bytes) => {
            info!("wrote {} bytes of seed to {:?}", bytes, seed_file);
            Persistence::Saved { bytes }
        }
        Err(e) => {
            warn!("{}, the next run will fall back to the entropy device", e);
            Persistence::Failed(e)
        }
    }
}
