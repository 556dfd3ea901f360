use std::path::Path;

use ftpflow_protocol::ChecksumAlgorithm;
use md5::Md5;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::TransferError;

/// Incremental hasher over any supported algorithm.
pub enum Hasher {
    Sha256(Sha256),
    Md5(Md5),
    Crc32(crc32fast::Hasher),
}

impl Hasher {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            ChecksumAlgorithm::Md5 => Self::Md5(Md5::new()),
            ChecksumAlgorithm::Crc32 => Self::Crc32(crc32fast::Hasher::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Md5(h) => h.update(data),
            Self::Crc32(h) => h.update(data),
        }
    }

    /// Lowercase hex digest. CRC-32 renders as 8 digits.
    pub fn finish(self) -> String {
        match self {
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Md5(h) => hex::encode(h.finalize()),
            Self::Crc32(h) => format!("{:08x}", h.finalize()),
        }
    }
}

/// Hex digest of `data`.
pub fn checksum_bytes(algorithm: ChecksumAlgorithm, data: &[u8]) -> String {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finish()
}

/// Hex digest of everything `reader` yields from its current position.
pub async fn checksum_reader<R: AsyncRead + Unpin + ?Sized>(
    algorithm: ChecksumAlgorithm,
    reader: &mut R,
) -> Result<String, TransferError> {
    let mut hasher = Hasher::new(algorithm);
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish())
}

/// Hex digest of an entire local file.
pub async fn file_checksum(
    algorithm: ChecksumAlgorithm,
    path: &Path,
) -> Result<String, TransferError> {
    let mut file = tokio::fs::File::open(path).await?;
    checksum_reader(algorithm, &mut file).await
}
