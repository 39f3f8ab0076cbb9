use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::sequence::Seq;

/// Hash algorithms known to the archive.
///
/// The discriminant is the persisted algorithm id used by the hash index,
/// the record value layout and the dump format. Ids are append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgo {
    Md5 = 0,
    Sha1 = 1,
    Sha256 = 2,
    Sha384 = 3,
    Sha512 = 4,
    Blake2s = 5,
    Blake2b = 6,
}

/// Number of algorithm ids currently assigned.
pub const ALGO_COUNT: usize = 7;

impl HashAlgo {
    /// All algorithms in persisted id order.
    pub const ALL: [HashAlgo; ALGO_COUNT] = [
        HashAlgo::Md5,
        HashAlgo::Sha1,
        HashAlgo::Sha256,
        HashAlgo::Sha384,
        HashAlgo::Sha512,
        HashAlgo::Blake2s,
        HashAlgo::Blake2b,
    ];

    /// Display preference: strongest modern digests first, legacy last.
    pub const PREFERRED: [HashAlgo; 4] = [
        HashAlgo::Sha256,
        HashAlgo::Sha384,
        HashAlgo::Sha512,
        HashAlgo::Sha1,
    ];

    pub fn id(self) -> u64 {
        self as u64
    }

    pub fn from_id(id: u64) -> Option<HashAlgo> {
        Self::ALL.get(usize::try_from(id).ok()?).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgo::Md5 => "md5",
            HashAlgo::Sha1 => "sha1",
            HashAlgo::Sha256 => "sha256",
            HashAlgo::Sha384 => "sha384",
            HashAlgo::Sha512 => "sha512",
            HashAlgo::Blake2s => "blake2s",
            HashAlgo::Blake2b => "blake2b",
        }
    }

    /// Full digest length in bytes.
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgo::Md5 => 16,
            HashAlgo::Sha1 => 20,
            HashAlgo::Sha256 | HashAlgo::Blake2s => 32,
            HashAlgo::Sha384 => 48,
            HashAlgo::Sha512 | HashAlgo::Blake2b => 64,
        }
    }

    /// Legacy algorithms are matched when present but never offered as the primary link.
    pub fn is_deprecated(&self) -> bool {
        matches!(self, HashAlgo::Md5 | HashAlgo::Sha1)
    }
}

impl fmt::Display for HashAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HashAlgo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "").as_str() {
            "md5" => Ok(HashAlgo::Md5),
            "sha1" => Ok(HashAlgo::Sha1),
            "sha256" => Ok(HashAlgo::Sha256),
            "sha384" => Ok(HashAlgo::Sha384),
            "sha512" => Ok(HashAlgo::Sha512),
            "blake2s" => Ok(HashAlgo::Blake2s),
            "blake2b" => Ok(HashAlgo::Blake2b),
            _ => Err(format!("Unknown hash algorithm: {}", s)),
        }
    }
}

/// Per-algorithm digests of one response body.
///
/// A zero-length digest means "not computed for this record". Older records
/// may carry fewer algorithms than newer ones; they are never backfilled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DigestSet {
    digests: [Vec<u8>; ALGO_COUNT],
}

impl DigestSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, algo: HashAlgo, digest: impl Into<Vec<u8>>) -> Self {
        self.set(algo, digest);
        self
    }

    pub fn set(&mut self, algo: HashAlgo, digest: impl Into<Vec<u8>>) {
        self.digests[algo as usize] = digest.into();
    }

    /// Digest bytes for `algo`; empty when not computed.
    pub fn get(&self, algo: HashAlgo) -> &[u8] {
        &self.digests[algo as usize]
    }

    pub fn contains(&self, algo: HashAlgo) -> bool {
        !self.get(algo).is_empty()
    }

    /// Computed digests in persisted id order.
    pub fn iter(&self) -> impl Iterator<Item = (HashAlgo, &[u8])> {
        HashAlgo::ALL
            .iter()
            .map(|&algo| (algo, self.get(algo)))
            .filter(|(_, d)| !d.is_empty())
    }

    /// Computed digests in display preference order.
    pub fn preferred(&self) -> impl Iterator<Item = (HashAlgo, &[u8])> {
        HashAlgo::PREFERRED
            .iter()
            .map(|&algo| (algo, self.get(algo)))
            .filter(|(_, d)| !d.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.digests.iter().all(Vec::is_empty)
    }
}

/// One archived fetch observation. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRecord {
    pub seq: Seq,
    /// Original URL string as requested (not the SURT form).
    pub url: String,
    /// HTTP status; negative values are reserved for fetch failure codes.
    pub status: i32,
    pub content_type: String,
    pub length: u64,
    pub digests: DigestSet,
}

impl ResponseRecord {
    pub fn time(&self) -> u64 {
        self.seq.time
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// A pending fetch request, keyed by its own sequence number at insertion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueEntry {
    pub seq: Seq,
    pub url: String,
    /// Who asked for the fetch; opaque to the archive.
    pub client: String,
}

/// What a successful fetch produced, before it is sequenced and stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    pub status: u16,
    /// Raw `Content-Type` header value; empty when absent.
    pub content_type: String,
    pub length: u64,
    pub digests: DigestSet,
}

impl FetchedResponse {
    /// Attach the sequence number and URL allocated by the worker.
    pub fn into_record(self, seq: Seq, url: &str) -> ResponseRecord {
        ResponseRecord {
            seq,
            url: url.to_string(),
            status: i32::from(self.status),
            content_type: self.content_type,
            length: self.length,
            digests: self.digests,
        }
    }
}
