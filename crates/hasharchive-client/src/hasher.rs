use hasharchive_core::{DigestSet, HashAlgo};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Computes every archived digest in one pass over a body.
///
/// sha256, sha384 and sha512 are current; sha1 is kept so new records still
/// match old ones by their legacy digest.
#[derive(Clone, Default)]
pub struct MultiHasher {
    sha1: Sha1,
    sha256: Sha256,
    sha384: Sha384,
    sha512: Sha512,
    length: u64,
}

impl MultiHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.sha1.update(chunk);
        self.sha256.update(chunk);
        self.sha384.update(chunk);
        self.sha512.update(chunk);
        self.length += chunk.len() as u64;
    }

    /// Bytes hashed so far.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn finish(self) -> DigestSet {
        DigestSet::new()
            .with(HashAlgo::Sha1, self.sha1.finalize().to_vec())
            .with(HashAlgo::Sha256, self.sha256.finalize().to_vec())
            .with(HashAlgo::Sha384, self.sha384.finalize().to_vec())
            .with(HashAlgo::Sha512, self.sha512.finalize().to_vec())
    }
}
