use std::fmt;
use std::str::FromStr;

use crate::error::AppError;
use crate::models::HashAlgo;

/// A content address of the form `hash://<algo>/<hex digest>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashUri {
    pub algo: HashAlgo,
    pub digest: Vec<u8>,
}

impl HashUri {
    pub fn new(algo: HashAlgo, digest: impl Into<Vec<u8>>) -> Self {
        Self {
            algo,
            digest: digest.into(),
        }
    }

    /// True when the digest is shorter than the algorithm's full output.
    pub fn is_short(&self) -> bool {
        self.digest.len() < self.algo.digest_len()
    }
}

impl fmt::Display for HashUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hash://{}/{}", self.algo, hex::encode(&self.digest))
    }
}

impl FromStr for HashUri {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("hash://")
            .ok_or_else(|| AppError::InvalidHashUri(format!("missing hash:// scheme in '{s}'")))?;

        // Query and fragment carry presentation hints only.
        let rest = rest.split(['?', '#']).next().unwrap_or_default();

        let (algo, digest) = rest
            .split_once('/')
            .ok_or_else(|| AppError::InvalidHashUri(format!("missing digest in '{s}'")))?;

        let algo: HashAlgo = algo.parse().map_err(AppError::InvalidHashUri)?;
        let digest = parse_digest(algo, digest)?;

        Ok(Self { algo, digest })
    }
}

/// Decode a hex digest for `algo`, rejecting empty or over-long input.
pub fn parse_digest(algo: HashAlgo, hex_digest: &str) -> Result<Vec<u8>, AppError> {
    let digest = hex::decode(hex_digest.trim_end_matches('/'))
        .map_err(|e| AppError::InvalidHashUri(format!("bad hex digest: {e}")))?;
    if digest.is_empty() {
        return Err(AppError::InvalidHashUri("empty digest".into()));
    }
    if digest.len() > algo.digest_len() {
        return Err(AppError::InvalidHashUri(format!(
            "{} digest is {} bytes, got {}",
            algo,
            algo.digest_len(),
            digest.len()
        )));
    }
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let uri: HashUri = "hash://sha256/00ff10".parse().unwrap();
        assert_eq!(uri.algo, HashAlgo::Sha256);
        assert_eq!(uri.digest, vec![0x00, 0xff, 0x10]);
        assert!(uri.is_short());
        assert_eq!(uri.to_string(), "hash://sha256/00ff10");
    }

    #[test]
    fn test_parse_ignores_query_and_fragment() {
        let uri: HashUri = "hash://sha1/abcd?type=text/html#x".parse().unwrap();
        assert_eq!(uri.algo, HashAlgo::Sha1);
        assert_eq!(uri.digest, vec![0xab, 0xcd]);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("http://sha256/00".parse::<HashUri>().is_err());
        assert!("hash://sha256".parse::<HashUri>().is_err());
        assert!("hash://whirlpool/00".parse::<HashUri>().is_err());
        assert!("hash://sha256/zz".parse::<HashUri>().is_err());
        assert!("hash://sha256/".parse::<HashUri>().is_err());
    }

    #[test]
    fn test_parse_rejects_overlong_digest() {
        let hex = "00".repeat(21);
        assert!(format!("hash://sha1/{hex}").parse::<HashUri>().is_err());
        let full = "11".repeat(20);
        let uri: HashUri = format!("hash://sha1/{full}").parse().unwrap();
        assert!(!uri.is_short());
    }
}
