//! Random message bodies

use bytes::Bytes;
use rand::RngCore;

use crate::config::ConfigError;

const BYTES_PER_MB: usize = 1024 * 1024;

/// Payload length for `size_mb` megabytes, `None` if it overflows `usize`
pub fn payload_len(size_mb: u32) -> Option<usize> {
    usize::try_from(size_mb).ok()?.checked_mul(BYTES_PER_MB)
}

/// Generate `size_mb` megabytes of cryptographically secure random bytes.
///
/// The returned buffer is never mutated; cloning it only bumps a refcount.
pub fn generate(size_mb: u32) -> Result<Bytes, ConfigError> {
    let len = payload_len(size_mb).ok_or(ConfigError::PayloadTooLarge(size_mb))?;
    let mut body = vec![0u8; len];
    rand::rng().fill_bytes(&mut body);
    Ok(Bytes::from(body))
}
