//! Order-preserving key codec.
//!
//! All indexes share one keyspace. Every key starts with a tag varint; the
//! remaining fields are encoded so that byte order equals field order:
//!
//! - varint: one length byte `n` (0..=8), then `n` big-endian bytes with
//!   leading zeros stripped. Zero is `[0x00]`.
//! - string: UTF-8 bytes followed by `0x00`.
//! - blob: varint length followed by the bytes.
//!
//! Layouts are persisted. New tags may be added; existing ones never change.

use hasharchive_core::{AppError, HashAlgo, QueueEntry, Seq};

pub const TAG_META: u64 = 0x01;
pub const TAG_RESPONSE: u64 = 0x20;
pub const TAG_URL: u64 = 0x21;
pub const TAG_HASH: u64 = 0x22;
pub const TAG_QUEUE: u64 = 0x23;
pub const TAG_QUEUED_URL: u64 = 0x24;

/// Meta key holding the sequence id high-water mark.
pub const META_SEQUENCE: &str = "sequence";

/// Appends encoded fields to a key buffer.
#[derive(Debug, Default, Clone)]
pub struct KeyWriter {
    buf: Vec<u8>,
}

impl KeyWriter {
    pub fn new(tag: u64) -> Self {
        let mut writer = Self::default();
        writer.varint(tag);
        writer
    }

    pub fn varint(&mut self, value: u64) -> &mut Self {
        let bytes = value.to_be_bytes();
        let significant = &bytes[(value.leading_zeros() / 8) as usize..];
        self.buf.push(significant.len() as u8);
        self.buf.extend_from_slice(significant);
        self
    }

    pub fn str(&mut self, value: &str) -> Result<&mut Self, AppError> {
        if value.as_bytes().contains(&0) {
            return Err(AppError::InvalidKey(format!(
                "string contains a NUL byte: {value:?}"
            )));
        }
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
        Ok(self)
    }

    pub fn blob(&mut self, value: &[u8]) -> &mut Self {
        self.varint(value.len() as u64);
        self.buf.extend_from_slice(value);
        self
    }

    pub fn seq(&mut self, seq: Seq) -> &mut Self {
        self.varint(seq.time).varint(seq.id)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Decodes fields from a key, failing on any malformed input.
#[derive(Debug)]
pub struct KeyReader<'a> {
    buf: &'a [u8],
}

impl<'a> KeyReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Start reading a key and check that it carries `tag`.
    pub fn expect_tag(buf: &'a [u8], tag: u64) -> Result<Self, AppError> {
        let mut reader = Self::new(buf);
        let found = reader.varint()?;
        if found != tag {
            return Err(AppError::Corrupt(format!(
                "expected key tag {tag:#04x}, found {found:#04x}"
            )));
        }
        Ok(reader)
    }

    pub fn varint(&mut self) -> Result<u64, AppError> {
        let (&n, rest) = self
            .buf
            .split_first()
            .ok_or_else(|| AppError::Corrupt("truncated varint".into()))?;
        let n = usize::from(n);
        if n > 8 {
            return Err(AppError::Corrupt(format!("varint length {n} exceeds 8")));
        }
        if rest.len() < n {
            return Err(AppError::Corrupt("truncated varint".into()));
        }
        let (digits, rest) = rest.split_at(n);
        if digits.first() == Some(&0) {
            return Err(AppError::Corrupt("varint has a leading zero byte".into()));
        }
        let value = digits.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
        self.buf = rest;
        Ok(value)
    }

    pub fn str(&mut self) -> Result<&'a str, AppError> {
        let end = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| AppError::Corrupt("unterminated string".into()))?;
        let value = std::str::from_utf8(&self.buf[..end])
            .map_err(|_| AppError::Corrupt("string is not valid UTF-8".into()))?;
        self.buf = &self.buf[end + 1..];
        Ok(value)
    }

    pub fn blob(&mut self) -> Result<&'a [u8], AppError> {
        let len = usize::try_from(self.varint()?)
            .map_err(|_| AppError::Corrupt("blob length overflows".into()))?;
        if self.buf.len() < len {
            return Err(AppError::Corrupt("truncated blob".into()));
        }
        let (value, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(value)
    }

    pub fn seq(&mut self) -> Result<Seq, AppError> {
        let time = self.varint()?;
        let id = self.varint()?;
        Ok(Seq::new(time, id))
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Fail unless every byte was consumed.
    pub fn finish(self) -> Result<(), AppError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(AppError::Corrupt(format!(
                "{} trailing bytes after key",
                self.buf.len()
            )))
        }
    }
}

/// Smallest key greater than every key starting with `prefix`.
///
/// `None` means the prefix is all `0xff` and the range is unbounded.
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Every key carrying `tag`.
pub fn tag_prefix(tag: u64) -> Vec<u8> {
    KeyWriter::new(tag).into_bytes()
}

// Sequence index: RESPONSE time id

pub fn response_key(seq: Seq) -> Vec<u8> {
    let mut w = KeyWriter::new(TAG_RESPONSE);
    w.seq(seq);
    w.into_bytes()
}

pub fn decode_response_key(key: &[u8]) -> Result<Seq, AppError> {
    let mut r = KeyReader::expect_tag(key, TAG_RESPONSE)?;
    let seq = r.seq()?;
    r.finish()?;
    Ok(seq)
}

// URL index: URL surt time id

pub fn url_prefix(surt: &str) -> Result<Vec<u8>, AppError> {
    let mut w = KeyWriter::new(TAG_URL);
    w.str(surt)?;
    Ok(w.into_bytes())
}

pub fn url_key(surt: &str, seq: Seq) -> Result<Vec<u8>, AppError> {
    let mut w = KeyWriter::new(TAG_URL);
    w.str(surt)?.seq(seq);
    Ok(w.into_bytes())
}

pub fn decode_url_key(key: &[u8]) -> Result<(String, Seq), AppError> {
    let mut r = KeyReader::expect_tag(key, TAG_URL)?;
    let surt = r.str()?.to_string();
    let seq = r.seq()?;
    r.finish()?;
    Ok((surt, seq))
}

// Hash index: HASH algo digest time id

pub fn hash_prefix(algo: HashAlgo, digest: &[u8]) -> Vec<u8> {
    let mut w = KeyWriter::new(TAG_HASH);
    w.varint(algo.id()).blob(digest);
    w.into_bytes()
}

pub fn hash_key(algo: HashAlgo, digest: &[u8], seq: Seq) -> Vec<u8> {
    let mut w = KeyWriter::new(TAG_HASH);
    w.varint(algo.id()).blob(digest).seq(seq);
    w.into_bytes()
}

pub fn decode_hash_key(key: &[u8]) -> Result<(HashAlgo, Vec<u8>, Seq), AppError> {
    let mut r = KeyReader::expect_tag(key, TAG_HASH)?;
    let id = r.varint()?;
    let algo = HashAlgo::from_id(id)
        .ok_or_else(|| AppError::Corrupt(format!("unknown hash algorithm id {id}")))?;
    let digest = r.blob()?.to_vec();
    let seq = r.seq()?;
    r.finish()?;
    Ok((algo, digest, seq))
}

// Queue index: QUEUE time id url client

/// Start of the queue scan at `seq` (inclusive of any entry at `seq`).
pub fn queue_seek(seq: Seq) -> Vec<u8> {
    let mut w = KeyWriter::new(TAG_QUEUE);
    w.seq(seq);
    w.into_bytes()
}

pub fn queue_key(entry: &QueueEntry) -> Result<Vec<u8>, AppError> {
    let mut w = KeyWriter::new(TAG_QUEUE);
    w.seq(entry.seq).str(&entry.url)?.str(&entry.client)?;
    Ok(w.into_bytes())
}

pub fn decode_queue_key(key: &[u8]) -> Result<QueueEntry, AppError> {
    let mut r = KeyReader::expect_tag(key, TAG_QUEUE)?;
    let seq = r.seq()?;
    let url = r.str()?.to_string();
    let client = r.str()?.to_string();
    r.finish()?;
    Ok(QueueEntry { seq, url, client })
}

// Queued URL marker: QUEUED_URL url time id, one per queue entry

pub fn queued_url_prefix(url: &str) -> Result<Vec<u8>, AppError> {
    let mut w = KeyWriter::new(TAG_QUEUED_URL);
    w.str(url)?;
    Ok(w.into_bytes())
}

pub fn queued_url_key(entry: &QueueEntry) -> Result<Vec<u8>, AppError> {
    let mut w = KeyWriter::new(TAG_QUEUED_URL);
    w.str(&entry.url)?.seq(entry.seq);
    Ok(w.into_bytes())
}

pub fn decode_queued_url_key(key: &[u8]) -> Result<(String, Seq), AppError> {
    let mut r = KeyReader::expect_tag(key, TAG_QUEUED_URL)?;
    let url = r.str()?.to_string();
    let seq = r.seq()?;
    r.finish()?;
    Ok((url, seq))
}

// Meta: META name

pub fn meta_key(name: &str) -> Result<Vec<u8>, AppError> {
    let mut w = KeyWriter::new(TAG_META);
    w.str(name)?;
    Ok(w.into_bytes())
}

/// Encode a standalone varint value.
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut w = KeyWriter::default();
    w.varint(value);
    w.into_bytes()
}

/// Decode a standalone varint value, rejecting trailing bytes.
pub fn decode_varint(bytes: &[u8]) -> Result<u64, AppError> {
    let mut r = KeyReader::new(bytes);
    let value = r.varint()?;
    r.finish()?;
    Ok(value)
}
