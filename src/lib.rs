//! randseed: pseudo-random bytes from a PRNG whose state survives between runs
//!
//! A run goes through four steps:
//! 1. [`source::resolve`] picks the seed file or falls back to the entropy
//!    device
//! 2. [`seed`] loads the seed material into a [`state::RandState`]
//! 3. [`generate`] draws the requested bytes, which are then [`format`]ted
//! 4. [`fs::persist`] writes the state back to the seed file
//!
//! Steps 2 and 3 are fatal when they fail, step 1 always recovers and step 4
//! is only reported.
use std::io::{self, Write};

use tracing::{debug, info};

pub mod config;
pub mod error;
pub mod fs;
pub mod source;
pub mod state;

use crate::{
    config::{Paths, RunConfig, MAX_BYTES},
    error::RandError,
    fs::Persistence,
    source::Resolution,
    state::RandState,
};

/// loads the seed material pointed to by `resolution` into `state`
///
/// exactly `resolution.size` bytes have to be read, anything less is an error.
pub fn seed(state: &mut RandState, resolution: &Resolution) -> Result<usize, RandError> {
    let loaded = state
        .load_file(&resolution.source, resolution.size)
        .map_err(|e| RandError::SeedLoad {
            path: resolution.source.clone(),
            reason: e.to_string(),
            source: Some(e),
        })?;

    if loaded != resolution.size {
        return Err(RandError::SeedLoad {
            path: resolution.source.clone(),
            reason: format!("expected {} bytes, got {}", resolution.size, loaded),
            source: None,
        });
    }

    info!("loaded {} bytes from {:?}", loaded, resolution.source);
    Ok(loaded)
}

/// fills the whole of `buffer` from a seeded `state`
pub fn generate<'a>(state: &mut RandState, buffer: &'a mut [u8]) -> Result<&'a [u8], RandError> {
    info!("reading {} random bytes", buffer.len());
    state.fill_bytes(buffer)?;
    Ok(buffer)
}

/// writes `bytes` to `out`, either raw or as a newline-terminated lower-case
/// hex string
pub fn format(out: &mut impl Write, bytes: &[u8], hex: bool) -> io::Result<()> {
    if hex {
        writeln!(out, "{}", hex::encode(bytes))?;
    } else {
        out.write_all(bytes)?;
    }
    out.flush()
}

/// runs the whole pipeline and writes the random bytes to `out`
///
/// nothing is written to `out` unless the PRNG has been seeded and the bytes
/// have been generated. the state is persisted even if writing to `out`
/// fails, the bytes have been drawn either way.
pub fn run(
    config: &RunConfig,
    paths: &Paths,
    out: &mut impl Write,
) -> Result<Persistence, RandError> {
    let mut state = RandState::new();

    let resolution = source::resolve(paths);
    seed(&mut state, &resolution)?;

    let mut buffer = [0u8; MAX_BYTES];
    let bytes = generate(&mut state, &mut buffer[..config.bytes()])?;

    debug!("formatting {} bytes, hex: {}", bytes.len(), config.hex());
    let printed = format(out, bytes, config.hex());
    buffer.fill(0);

    let persistence = fs::persist(&mut state, &paths.seed_file);
    printed?;

    Ok(persistence)
}
