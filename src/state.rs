//! The state of the PRNG, and the primitives to seed it from and save it to a
//! file.
//!
//! Seed material is never used as is: it is folded into a SHA-256 pool,
//! together with a personalization unique to the run, and the pool keys a
//! [`StdRng`].
use std::{
    fmt,
    fs::File,
    io::Read,
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use rs_merkle::{algorithms::Sha256, Hasher};
use tracing::debug;

use crate::{
    config::{ENTROPY_SIZE, MAX_SEED_FILE_SIZE, SEED_FILE_SIZE},
    error::RandError,
    fs,
};

static MIXES: AtomicU64 = AtomicU64::new(0);

/// Handle on the PRNG.
///
/// it starts empty, becomes usable once at least [`ENTROPY_SIZE`] bytes of
/// seed material have been added and is then mutated by every draw.
pub struct RandState {
    pool: [u8; 32],
    loaded: usize,
    rng: Option<StdRng>,
}

impl Default for RandState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandState")
            .field("loaded", &self.loaded)
            .field("seeded", &self.is_seeded())
            .finish_non_exhaustive()
    }
}

/// process id, wall-clock time and a counter, so that the same seed
/// material never keys the generator twice.
fn personalization() -> Vec<u8> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    let mut bytes = Vec::with_capacity(4 + 16 + 8);
    bytes.extend_from_slice(&std::process::id().to_le_bytes());
    bytes.extend_from_slice(&now.to_le_bytes());
    bytes.extend_from_slice(&MIXES.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    bytes
}

impl RandState {
    pub fn new() -> Self {
        Self {
            pool: [0; 32],
            loaded: 0,
            rng: None,
        }
    }

    /// number of bytes of seed material added so far.
    pub fn loaded(&self) -> usize {
        self.loaded
    }

    pub fn is_seeded(&self) -> bool {
        self.rng.is_some() && self.loaded >= ENTROPY_SIZE
    }

    /// mixes `material` into the pool and rekeys the generator.
    pub fn add(&mut self, material: &[u8]) {
        let mut input = Vec::with_capacity(self.pool.len() + 28 + material.len());
        input.extend_from_slice(&self.pool);
        input.extend_from_slice(&personalization());
        input.extend_from_slice(material);

        self.pool = Sha256::hash(&input);
        input.fill(0);

        self.loaded += material.len();
        self.rng = Some(StdRng::from_seed(self.pool));
    }

    /// reads at most `size` bytes from `path` and adds them to the state.
    ///
    /// returns the number of bytes actually read, which is smaller than `size`
    /// if the file is shorter.
    pub fn load_file(&mut self, path: &Path, size: usize) -> std::io::Result<usize> {
        let file = File::open(path)?;
        let mut material = Vec::with_capacity(size);
        file.take(size as u64).read_to_end(&mut material)?;

        debug!("mixing {} bytes from {:?} into the pool", material.len(), path);
        self.add(&material);
        material.fill(0);

        Ok(material.len())
    }

    /// fills `dest` with pseudo-random bytes.
    ///
    /// fails, without touching `dest`, if the state has not been seeded.
    pub fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), RandError> {
        let loaded = self.loaded;
        let rng = match self.rng.as_mut() {
            Some(rng) if loaded >= ENTROPY_SIZE => rng,
            _ => {
                return Err(RandError::Generation(format!(
                    "PRNG not seeded, {} bytes of seed material out of {}",
                    loaded, ENTROPY_SIZE
                )))
            }
        };

        rng.fill_bytes(dest);
        Ok(())
    }

    /// dumps the state to `path`, replacing it atomically with a new file of
    /// mode [`crate::config::SEED_FILE_MODE`].
    ///
    /// the dump is at least [`SEED_FILE_SIZE`] bytes and never smaller than
    /// what has been loaded, so a seed file does not shrink from one run to
    /// the next, up to [`MAX_SEED_FILE_SIZE`]. the generator is rekeyed
    /// afterwards, the dumped bytes say nothing about what it will produce
    /// next.
    ///
    /// returns the number of bytes written.
    pub fn write_file(&mut self, path: &Path) -> Result<usize, RandError> {
        let loaded = self.loaded;
        let rng = match self.rng.as_mut() {
            Some(rng) if loaded >= ENTROPY_SIZE => rng,
            _ => {
                return Err(RandError::SeedSave {
                    path: path.to_path_buf(),
                    reason: "PRNG not seeded".to_string(),
                    source: None,
                })
            }
        };

        let mut dump = vec![0; SEED_FILE_SIZE.max(loaded).min(MAX_SEED_FILE_SIZE as usize)];
        rng.fill_bytes(&mut dump);
        let suffix: u32 = rng.gen();

        let mut key = [0; 32];
        rng.fill_bytes(&mut key);
        *rng = StdRng::from_seed(key);
        key.fill(0);

        let res = fs::write_atomically(path, &dump, suffix);
        dump.fill(0);

        match res {
            Ok(()) => Ok(dump.len()),
            Err(e) => Err(RandError::SeedSave {
                path: path.to_path_buf(),
                reason: e.to_string(),
                source: Some(e),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::RandState;
    use crate::{
        config::{ENTROPY_SIZE, MAX_SEED_FILE_SIZE, SEED_FILE_SIZE},
        error::RandError,
    };

    #[test]
    fn unseeded_state_refuses_to_generate() {
        let mut state = RandState::new();
        let mut buffer = [0xaa; 16];
        assert!(matches!(
            state.fill_bytes(&mut buffer),
            Err(RandError::Generation(_))
        ));
        assert_eq!(buffer, [0xaa; 16], "buffer should be untouched");

        state.add(&[1; ENTROPY_SIZE - 1]);
        assert!(!state.is_seeded());
        assert!(state.fill_bytes(&mut buffer).is_err());

        state.add(&[2]);
        assert!(state.is_seeded());
        assert!(state.fill_bytes(&mut buffer).is_ok());
    }

    #[test]
    fn same_material_does_not_replay() {
        let mut a = RandState::new();
        let mut b = RandState::new();
        a.add(&[42; 64]);
        b.add(&[42; 64]);

        let mut x = [0; 64];
        let mut y = [0; 64];
        a.fill_bytes(&mut x).unwrap();
        b.fill_bytes(&mut y).unwrap();
        assert_ne!(x, y);

        let mut z = [0; 64];
        a.fill_bytes(&mut z).unwrap();
        assert_ne!(x, z, "consecutive draws should differ");
    }

    #[test]
    fn load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed");
        std::fs::write(&path, vec![7; 100]).unwrap();

        let mut state = RandState::new();
        assert_eq!(state.load_file(&path, 100).unwrap(), 100);
        assert_eq!(state.loaded(), 100);
        assert!(state.is_seeded());

        let mut state = RandState::new();
        assert_eq!(state.load_file(&path, 40).unwrap(), 40);

        let mut state = RandState::new();
        assert_eq!(
            state.load_file(&path, 200).unwrap(),
            100,
            "a short file should give a short read"
        );

        let mut state = RandState::new();
        assert!(state.load_file(&dir.path().join("missing"), 32).is_err());
        assert!(!state.is_seeded());
    }

    #[test]
    fn write_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed");

        let mut state = RandState::new();
        assert!(matches!(
            state.write_file(&path),
            Err(RandError::SeedSave { source: None, .. })
        ));
        assert!(!path.exists(), "nothing should be written without a seed");

        state.add(&[3; ENTROPY_SIZE]);
        assert_eq!(state.write_file(&path).unwrap(), SEED_FILE_SIZE);
        let metadata = std::fs::metadata(&path).unwrap();
        assert_eq!(metadata.len(), SEED_FILE_SIZE as u64);
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);

        let first = std::fs::read(&path).unwrap();
        assert_eq!(state.write_file(&path).unwrap(), SEED_FILE_SIZE);
        assert_ne!(first, std::fs::read(&path).unwrap());

        assert_eq!(
            std::fs::read_dir(dir.path()).unwrap().count(),
            1,
            "no temporary file should be left behind"
        );
    }

    #[test]
    fn dump_does_not_shrink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed");

        let mut state = RandState::new();
        state.add(&vec![9; 2 * SEED_FILE_SIZE + 3]);
        assert_eq!(state.write_file(&path).unwrap(), 2 * SEED_FILE_SIZE + 3);
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            (2 * SEED_FILE_SIZE + 3) as u64
        );
    }

    #[test]
    fn dump_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed");

        let mut state = RandState::new();
        state.add(&vec![9; MAX_SEED_FILE_SIZE as usize + 100]);
        assert_eq!(state.write_file(&path).unwrap(), MAX_SEED_FILE_SIZE as usize);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), MAX_SEED_FILE_SIZE);
    }

    #[test]
    fn write_file_into_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("seed");

        let mut state = RandState::new();
        state.add(&[3; ENTROPY_SIZE]);
        assert!(matches!(
            state.write_file(&path),
            Err(RandError::SeedSave { source: Some(_), .. })
        ));
    }
}
