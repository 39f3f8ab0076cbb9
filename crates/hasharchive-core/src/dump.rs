//! Portable dump format for archived responses.
//!
//! Each record is written big-endian:
//!
//! ```text
//! u64 time (all ones = unknown)
//! u16 len, url bytes
//! u64 status + 0xffff
//! u16 len, content type bytes
//! u64 length
//! u16 algorithm count
//! count x (u16 len, digest bytes)   in algorithm-id order
//! ```
//!
//! Negative statuses are fetch failure codes and survive the offset encoding.

use std::io::{ErrorKind, Read, Write};

use crate::error::AppError;
use crate::models::{ALGO_COUNT, DigestSet, HashAlgo, ResponseRecord};

const UNKNOWN_TIME: u64 = u64::MAX;
const STATUS_OFFSET: i64 = 0xffff;

/// A response as it appears in a dump: no local sequence id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRecord {
    pub time: Option<u64>,
    pub url: String,
    pub status: i32,
    pub content_type: String,
    pub length: u64,
    pub digests: DigestSet,
}

impl From<&ResponseRecord> for DumpRecord {
    fn from(record: &ResponseRecord) -> Self {
        Self {
            time: Some(record.seq.time),
            url: record.url.clone(),
            status: record.status,
            content_type: record.content_type.clone(),
            length: record.length,
            digests: record.digests.clone(),
        }
    }
}

/// Append one record to `w`.
pub fn write_record<W: Write>(w: &mut W, record: &DumpRecord) -> Result<(), AppError> {
    w.write_all(&record.time.unwrap_or(UNKNOWN_TIME).to_be_bytes())?;
    write_bytes(w, record.url.as_bytes())?;
    let status = i64::from(record.status) + STATUS_OFFSET;
    let status = u64::try_from(status)
        .map_err(|_| AppError::Dump(format!("status {} out of range", record.status)))?;
    w.write_all(&status.to_be_bytes())?;
    write_bytes(w, record.content_type.as_bytes())?;
    w.write_all(&record.length.to_be_bytes())?;
    w.write_all(&(ALGO_COUNT as u16).to_be_bytes())?;
    for algo in HashAlgo::ALL {
        write_bytes(w, record.digests.get(algo))?;
    }
    Ok(())
}

fn write_bytes<W: Write>(w: &mut W, bytes: &[u8]) -> Result<(), AppError> {
    let len = u16::try_from(bytes.len())
        .map_err(|_| AppError::Dump(format!("field of {} bytes exceeds u16", bytes.len())))?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(bytes)?;
    Ok(())
}

/// Streaming reader over a dump. Yields `None` at a clean record boundary.
pub struct DumpReader<R> {
    inner: R,
    done: bool,
}

impl<R: Read> DumpReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, done: false }
    }

    fn read_record(&mut self) -> Result<Option<DumpRecord>, AppError> {
        let mut first = [0u8; 8];
        if !self.fill_or_eof(&mut first)? {
            return Ok(None);
        }
        let time = match u64::from_be_bytes(first) {
            UNKNOWN_TIME => None,
            t => Some(t),
        };

        let url = self.read_string("url")?;
        let status = i64::try_from(self.read_u64()?)
            .ok()
            .and_then(|s| i32::try_from(s - STATUS_OFFSET).ok())
            .ok_or_else(|| AppError::Dump("status out of range".into()))?;
        let content_type = self.read_string("content type")?;
        let length = self.read_u64()?;

        let count = self.read_u16()?;
        let mut digests = DigestSet::new();
        for i in 0..u64::from(count) {
            let digest = self.read_bytes()?;
            // Algorithms this build does not know are skipped.
            if let Some(algo) = HashAlgo::from_id(i) {
                digests.set(algo, digest);
            }
        }

        Ok(Some(DumpRecord {
            time,
            url,
            status,
            content_type,
            length,
            digests,
        }))
    }

    /// Fill `buf` completely. Returns false on EOF before the first byte.
    fn fill_or_eof(&mut self, buf: &mut [u8]) -> Result<bool, AppError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => return Err(AppError::Dump("truncated record".into())),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), AppError> {
        self.inner.read_exact(buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => AppError::Dump("truncated record".into()),
            _ => AppError::Io(e),
        })
    }

    fn read_u16(&mut self) -> Result<u16, AppError> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64, AppError> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>, AppError> {
        let len = self.read_u16()?;
        let mut buf = vec![0u8; usize::from(len)];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_string(&mut self, field: &str) -> Result<String, AppError> {
        String::from_utf8(self.read_bytes()?)
            .map_err(|_| AppError::Dump(format!("{field} is not valid UTF-8")))
    }
}

impl<R: Read> Iterator for DumpReader<R> {
    type Item = Result<DumpRecord, AppError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
