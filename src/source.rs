//! Decide where the seed material comes from.
//!
//! The seed file is preferred. It is only trusted when it is a regular file,
//! readable and writable by us, at least [`ENTROPY_SIZE`] bytes long and no
//! bigger than [`MAX_SEED_FILE_SIZE`]; otherwise the entropy device is used
//! instead and, when the seed file is
//! there but unusable, it is removed so that the next save starts afresh.
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use nix::{
    errno::Errno,
    unistd::{access, AccessFlags},
};
use tracing::{info, warn};

use crate::config::{Paths, ENTROPY_SIZE, MAX_SEED_FILE_SIZE};

/// Why the seed file has not been used.
#[derive(Debug)]
pub enum Advisory {
    /// missing, or not both readable and writable.
    Inaccessible { path: PathBuf, errno: Errno },
    /// could not be inspected after passing the access check.
    Uninspectable { path: PathBuf, source: io::Error },
    NotRegularFile {
        path: PathBuf,
        removal: io::Result<()>,
    },
    TooSmall {
        path: PathBuf,
        size: u64,
        removal: io::Result<()>,
    },
    TooLarge {
        path: PathBuf,
        size: u64,
        removal: io::Result<()>,
    },
}

impl Advisory {
    /// whether the seed file was found unusable and had to be removed,
    /// successfully or not.
    pub fn removal(&self) -> Option<&io::Result<()>> {
        match self {
            Advisory::NotRegularFile { removal, .. }
            | Advisory::TooSmall { removal, .. }
            | Advisory::TooLarge { removal, .. } => Some(removal),
            Advisory::Inaccessible { .. } | Advisory::Uninspectable { .. } => None,
        }
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Advisory::Inaccessible { path, errno } => write!(
                f,
                "unable to access seed file {:?} ({}), if it exists be sure it is both readable and writable",
                path,
                errno.desc()
            ),
            Advisory::Uninspectable { path, source } => {
                write!(f, "could not inspect seed file {:?}: {}", path, source)
            }
            Advisory::NotRegularFile { path, .. } => {
                write!(f, "seed file {:?} is not a regular file", path)
            }
            Advisory::TooSmall { path, size, .. } => write!(
                f,
                "seed file {:?} is too small, {} bytes out of at least {}",
                path, size, ENTROPY_SIZE
            ),
            Advisory::TooLarge { path, size, .. } => write!(
                f,
                "seed file {:?} is too large, {} bytes out of at most {}",
                path, size, MAX_SEED_FILE_SIZE
            ),
        }?;

        match self.removal() {
            Some(Ok(())) => write!(f, ", removed it"),
            Some(Err(e)) => write!(f, ", could not remove it: {}", e),
            None => Ok(()),
        }
    }
}

/// Where to read seed material from, and how much of it.
#[derive(Debug)]
pub struct Resolution {
    pub source: PathBuf,
    pub size: usize,
    /// set when the seed file has been passed over for the entropy device.
    pub advisory: Option<Advisory>,
}

impl Resolution {
    fn fallback(paths: &Paths, advisory: Advisory) -> Self {
        Self {
            source: paths.entropy_device.clone(),
            size: ENTROPY_SIZE,
            advisory: Some(advisory),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.advisory.is_some()
    }
}

/// removes a disqualified seed file without following it if it is a link.
fn remove(path: &Path, metadata: &fs::Metadata) -> io::Result<()> {
    if metadata.is_dir() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    }
}

/// Picks the source of seed material for `paths`.
///
/// this never fails: any problem with the seed file resolves to the entropy
/// device and is reported in [`Resolution::advisory`].
pub fn resolve(paths: &Paths) -> Resolution {
    let candidate = &paths.seed_file;

    let accessible = access(candidate.as_path(), AccessFlags::R_OK | AccessFlags::W_OK);
    let resolution = if let Err(errno) = accessible {
        Resolution::fallback(
            paths,
            Advisory::Inaccessible {
                path: candidate.clone(),
                errno,
            },
        )
    } else {
        match fs::symlink_metadata(candidate) {
            Err(source) => Resolution::fallback(
                paths,
                Advisory::Uninspectable {
                    path: candidate.clone(),
                    source,
                },
            ),
            Ok(metadata) if !metadata.file_type().is_file() => Resolution::fallback(
                paths,
                Advisory::NotRegularFile {
                    path: candidate.clone(),
                    removal: remove(candidate, &metadata),
                },
            ),
            Ok(metadata) if metadata.len() < ENTROPY_SIZE as u64 => Resolution::fallback(
                paths,
                Advisory::TooSmall {
                    path: candidate.clone(),
                    size: metadata.len(),
                    removal: remove(candidate, &metadata),
                },
            ),
            Ok(metadata) if metadata.len() > MAX_SEED_FILE_SIZE => Resolution::fallback(
                paths,
                Advisory::TooLarge {
                    path: candidate.clone(),
                    size: metadata.len(),
                    removal: remove(candidate, &metadata),
                },
            ),
            Ok(metadata) => Resolution {
                source: candidate.clone(),
                size: metadata.len() as usize,
                advisory: None,
            },
        }
    };

    match &resolution.advisory {
        Some(advisory @ Advisory::Inaccessible { .. }) => info!(
            "{}, falling back to {:?}",
            advisory, paths.entropy_device
        ),
        Some(advisory) => warn!(
            "{}, falling back to {:?}",
            advisory, paths.entropy_device
        ),
        None => info!(
            "using seed file {:?} ({} bytes)",
            resolution.source, resolution.size
        ),
    }

    resolution
}
