//! BLAKE3 file hasher with streaming support.
//!
//! # Overview
//!
//! This module provides the [`Hasher`] struct for computing BLAKE3 digests
//! of file contents using memory-efficient streaming, plus the byte-for-byte
//! comparison used to confirm that two files are truly identical.
//!
//! Two digests are available:
//! - **Prehash**: covers only the first [`PREHASH_SIZE`] bytes. Cheap, and
//!   expected to collide for files that share a leading chunk.
//! - **Full hash**: covers the entire file.
//!
//! Digests only narrow the candidates. [`files_identical`] is the final word.
//!
//! # Example
//!
//! ```no_run
//! use copyall::scanner::{Hasher, hash_to_hex};
//! use std::path::Path;
//!
//! let hasher = Hasher::new();
//! let digest = hasher.full_hash(Path::new("photo.jpg")).unwrap();
//! println!("{}", hash_to_hex(&digest));
//! ```

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::HashError;

/// A 32-byte BLAKE3 digest.
pub type Hash = [u8; 32];

/// Number of leading bytes covered by a prehash (1 MiB).
pub const PREHASH_SIZE: usize = 1024 * 1024;

/// Read buffer size for streaming hashes and comparisons.
const BUFFER_SIZE: usize = 64 * 1024;

/// Streaming BLAKE3 hasher.
///
/// The hasher itself is stateless apart from an optional shutdown flag, so a
/// single instance can be shared across worker threads behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct Hasher {
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Hasher {
    /// Create a new hasher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shutdown_flag: None,
        }
    }

    /// Abort long reads when the flag is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Hash the first [`PREHASH_SIZE`] bytes of a file.
    ///
    /// For files smaller than the chunk this equals [`full_hash`](Self::full_hash).
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    pub fn prehash(&self, path: &Path) -> Result<Hash, HashError> {
        let file = open(path)?;
        self.stream(path, file.take(PREHASH_SIZE as u64))
    }

    /// Hash the entire content of a file.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read, or if the
    /// shutdown flag was raised mid-read.
    pub fn full_hash(&self, path: &Path) -> Result<Hash, HashError> {
        let file = open(path)?;
        self.stream(path, file)
    }

    fn stream<R: Read>(&self, path: &Path, reader: R) -> Result<Hash, HashError> {
        let mut reader = BufReader::with_capacity(BUFFER_SIZE, reader);
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            if self.is_shutdown_requested() {
                return Err(HashError::Io {
                    path: path.to_path_buf(),
                    source: Arc::new(io::Error::new(io::ErrorKind::Interrupted, "Shutdown")),
                });
            }
            let read = reader
                .read(&mut buffer)
                .map_err(|e| HashError::from_io(path, e))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(*hasher.finalize().as_bytes())
    }
}

fn open(path: &Path) -> Result<File, HashError> {
    File::open(path).map_err(|e| HashError::from_io(path, e))
}

/// Compare two files byte for byte.
///
/// Lengths are compared first so differing sizes never read any content.
///
/// # Errors
///
/// Returns the underlying I/O error if either file cannot be read.
pub fn files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    let meta_a = std::fs::metadata(a)?;
    let meta_b = std::fs::metadata(b)?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    let mut reader_a = BufReader::with_capacity(BUFFER_SIZE, File::open(a)?);
    let mut reader_b = BufReader::with_capacity(BUFFER_SIZE, File::open(b)?);
    let mut buf_a = vec![0u8; BUFFER_SIZE];
    let mut buf_b = vec![0u8; BUFFER_SIZE];

    loop {
        let read_a = read_full(&mut reader_a, &mut buf_a)?;
        let read_b = read_full(&mut reader_b, &mut buf_b)?;
        if read_a != read_b || buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as the reader allows; returns bytes read (0 at EOF).
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Convert a hash to a lowercase hexadecimal string.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}
