//! randseed-specific errors
//!
//! Only the fatal and the reportable failures live here: a seed file that
//! cannot be used is not an error, see [`crate::source::Advisory`].
use std::{io, path::PathBuf};

use thiserror::Error;

/// An error that randseed could end up producing.
///
/// There are a few families of errors:
/// - the command line asked for something impossible
/// - the PRNG could not be seeded or could not produce bytes, both fatal
/// - the PRNG state could not be saved, which is only reported
#[derive(Debug, Error)]
pub enum RandError {
    #[error("`bytes` must be between 1 and {max}, found {found}")]
    InvalidByteCount { found: usize, max: usize },
    #[error("could not load seed material from {path:?}: {reason}")]
    SeedLoad {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
    /// `{0}` is the reason the generator refused to produce bytes.
    #[error("could not generate random bytes: {0}")]
    Generation(String),
    #[error("could not save seed to {path:?}: {reason}")]
    SeedSave {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
    /// `{0}` explains why no home directory was found.
    #[error("could not find the home directory: {0}")]
    HomeDirectory(String),
    #[error("could not write random bytes")]
    Output(#[from] io::Error),
}
