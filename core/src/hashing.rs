//! Digest helpers for identifiers and content hashes.
//!
//! Content hashes are SHA-256, hex-encoded. Workbook identifiers use a BLAKE3 prefix of the
//! normalized path.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Prefix used when a hash is stored alongside its algorithm, as in workbook metadata.
pub const SHA256_TAG: &str = "sha256:";

const FILE_CHUNK_BYTES: usize = 64 * 1024;

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// SHA-256 of a file, streamed in chunks, formatted as `sha256:<hex>`.
pub fn file_sha256_tagged(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; FILE_CHUNK_BYTES];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{SHA256_TAG}{}", hex::encode(hasher.finalize())))
}

/// First `len` lower-case hex characters of the BLAKE3 digest of `bytes`.
pub(crate) fn digest_prefix_hex(bytes: &[u8], len: usize) -> String {
    let hash = blake3::hash(bytes);
    let mut out = hash.to_hex().to_string();
    out.truncate(len);
    out
}
