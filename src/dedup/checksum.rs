//! SHA-256 content addresses for deduplication.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Buffer size for reading files (8KB)
const BUFFER_SIZE: usize = 8192;

/// Content address of a file: digest plus size at hashing time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentAddress {
    pub sha256: String,
    pub size: u64,
}

/// Compute the SHA-256 content address of a regular file
pub fn content_address(path: &Path) -> io::Result<ContentAddress> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();

    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; BUFFER_SIZE];

    // Read and hash in chunks
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(ContentAddress {
        sha256: hex::encode(hasher.finalize()),
        size,
    })
}
