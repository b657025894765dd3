//! Digest helpers
//!
//! Registry digests have the form `<algorithm>:<hex>`. The hex part names the
//! blob files written to disk, so it is validated before it reaches a path.

use crate::error::{PullerError, Result};

pub struct DigestUtils;

impl DigestUtils {
    /// Split `sha256:abcd...` into `("sha256", "abcd...")`
    pub fn split(digest: &str) -> Result<(&str, &str)> {
        let (algorithm, encoded) = digest
            .split_once(':')
            .ok_or_else(|| PullerError::Parse(format!("Digest without algorithm: {}", digest)))?;

        if algorithm.is_empty()
            || !algorithm
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c))
        {
            return Err(PullerError::Parse(format!(
                "Invalid digest algorithm in {}",
                digest
            )));
        }

        if encoded.is_empty() || !encoded.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PullerError::Parse(format!(
                "Digest must carry a hexadecimal value: {}",
                digest
            )));
        }

        Ok((algorithm, encoded))
    }

    /// File name for a blob: the encoded digest plus `extension`
    pub fn blob_file_name(digest: &str, extension: &str) -> Result<String> {
        let (_, encoded) = Self::split(digest)?;
        Ok(format!("{}.{}", encoded, extension))
    }

    /// First 12 hex characters, the way docker prints layer ids
    pub fn short(digest: &str) -> &str {
        let encoded = digest.split_once(':').map(|(_, e)| e).unwrap_or(digest);
        encoded.get(..12).unwrap_or(encoded)
    }
}
