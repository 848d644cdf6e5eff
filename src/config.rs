//! Fixed paths and sizes, and the configuration of a single run.
use std::{
    ffi::OsString,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};

use nix::unistd::{getuid, Uid, User};
use tracing::warn;

use crate::error::RandError;

/// Number of bytes read from the entropy device, and the minimum size of a
/// usable seed file.
pub const ENTROPY_SIZE: usize = 32;
/// Largest number of bytes that can be requested in a single run.
pub const MAX_BYTES: usize = 1024;
/// Minimum number of bytes written back to the seed file.
pub const SEED_FILE_SIZE: usize = 1024;
/// Name of the seed file, relative to the home directory of the user.
pub const SEED_FILE_NAME: &str = ".rand.seed";
/// Fallback source of entropy.
pub const ENTROPY_DEVICE: &str = "/dev/random";
/// Mode of the parent directory of the seed file when it has to be created.
pub const SEED_DIR_MODE: u32 = 0o750;
/// Mode of a freshly written seed file.
pub const SEED_FILE_MODE: u32 = 0o600;
/// Largest seed file that is trusted, anything bigger is discarded.
pub const MAX_SEED_FILE_SIZE: u64 = 1 << 20;

/// What has been asked on the command line.
///
/// [`RunConfig::new`] is the only way to build one, so `bytes` is always in
/// `1..=MAX_BYTES`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunConfig {
    hex: bool,
    verbose: bool,
    bytes: usize,
}

impl RunConfig {
    pub fn new(hex: bool, verbose: bool, bytes: usize) -> Result<Self, RandError> {
        if bytes == 0 || bytes > MAX_BYTES {
            return Err(RandError::InvalidByteCount {
                found: bytes,
                max: MAX_BYTES,
            });
        }

        Ok(Self {
            hex,
            verbose,
            bytes,
        })
    }

    pub fn hex(&self) -> bool {
        self.hex
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

/// Where the seed material lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Paths {
    pub seed_file: PathBuf,
    pub entropy_device: PathBuf,
}

impl Paths {
    pub fn new(seed_file: impl Into<PathBuf>, entropy_device: impl Into<PathBuf>) -> Self {
        Self {
            seed_file: seed_file.into(),
            entropy_device: entropy_device.into(),
        }
    }

    /// `~/.rand.seed` and `/dev/random`.
    ///
    /// `$HOME` is only honoured when it names an entry owned by the real
    /// user, e.g. not after `sudo -E`; otherwise the home directory comes from
    /// the password database entry of the real user.
    pub fn for_current_user() -> Result<Self, RandError> {
        let uid = getuid();
        let home = match home_from_env(std::env::var_os("HOME"), uid) {
            Some(home) => home,
            None => home_from_passwd(uid)?,
        };

        Ok(Self::in_directory(&home))
    }

    /// the default seed file inside `directory`, with the default entropy
    /// device.
    pub fn in_directory(directory: &Path) -> Self {
        Self::new(directory.join(SEED_FILE_NAME), ENTROPY_DEVICE)
    }
}

fn home_from_env(home: Option<OsString>, uid: Uid) -> Option<PathBuf> {
    let home = PathBuf::from(home.filter(|home| !home.is_empty())?);
    match std::fs::metadata(&home) {
        Ok(metadata) if metadata.uid() == uid.as_raw() => Some(home),
        Ok(metadata) => {
            warn!(
                "ignoring $HOME {:?}, owned by uid {} instead of {}",
                home,
                metadata.uid(),
                uid
            );
            None
        }
        Err(_) => None,
    }
}

fn home_from_passwd(uid: Uid) -> Result<PathBuf, RandError> {
    match User::from_uid(uid) {
        Ok(Some(user)) => Ok(user.dir),
        Ok(None) => Err(RandError::HomeDirectory(format!(
            "no password entry for uid {}",
            uid
        ))),
        Err(e) => Err(RandError::HomeDirectory(format!(
            "password lookup for uid {} failed: {}",
            uid, e
        ))),
    }
}
