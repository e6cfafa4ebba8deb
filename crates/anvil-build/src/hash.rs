//! SHA-256 content fingerprints.

use std::fs::File;
use std::io;
use std::path::Path;

use anvil_core::ContentHash;
use sha2::{Digest, Sha256};

pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash::from_hex(hex::encode(Sha256::digest(bytes)))
}

/// Stream a file through SHA-256, returning its fingerprint and byte size.
pub fn hash_file(path: &Path) -> io::Result<(ContentHash, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut file, &mut hasher)?;
    Ok((ContentHash::from_hex(hex::encode(hasher.finalize())), size))
}
