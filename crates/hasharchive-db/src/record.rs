//! Sequence-index value codec.
//!
//! `url-str (status+0xffff)-varint type-str length-varint digest-blob*`, one
//! blob per algorithm in id order. Older records may stop early; missing
//! blobs are empty digests. Blobs past the known algorithms are ignored.

use hasharchive_core::{AppError, DigestSet, HashAlgo, ResponseRecord, Seq};

use crate::keys::{KeyReader, KeyWriter};

const STATUS_OFFSET: i64 = 0xffff;

pub fn encode_record(record: &ResponseRecord) -> Result<Vec<u8>, AppError> {
    let status = u64::try_from(i64::from(record.status) + STATUS_OFFSET)
        .map_err(|_| AppError::InvalidKey(format!("status {} out of range", record.status)))?;

    let mut w = KeyWriter::default();
    w.str(&record.url)?
        .varint(status)
        .str(&record.content_type)?
        .varint(record.length);

    // Trailing empty digests are left off.
    let present = HashAlgo::ALL
        .iter()
        .rposition(|&algo| record.digests.contains(algo))
        .map_or(0, |last| last + 1);
    for algo in &HashAlgo::ALL[..present] {
        w.blob(record.digests.get(*algo));
    }

    Ok(w.into_bytes())
}

pub fn decode_record(seq: Seq, value: &[u8]) -> Result<ResponseRecord, AppError> {
    let mut r = KeyReader::new(value);
    let url = r.str()?.to_string();
    let status = i64::try_from(r.varint()?)
        .ok()
        .and_then(|s| i32::try_from(s - STATUS_OFFSET).ok())
        .ok_or_else(|| AppError::Corrupt(format!("status out of range in record {seq}")))?;
    let content_type = r.str()?.to_string();
    let length = r.varint()?;

    let mut digests = DigestSet::new();
    let mut index = 0u64;
    while !r.is_empty() {
        let digest = r.blob()?;
        if let Some(algo) = HashAlgo::from_id(index) {
            digests.set(algo, digest);
        }
        index += 1;
    }

    Ok(ResponseRecord {
        seq,
        url,
        status,
        content_type,
        length,
        digests,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hasharchive_core::FetchError;

    fn record(status: i32, digests: DigestSet) -> ResponseRecord {
        ResponseRecord {
            seq: Seq::new(1_450_000_000, 3),
            url: "http://example.test/page?q=1".into(),
            status,
            content_type: "text/html; charset=utf-8".into(),
            length: 70_000,
            digests,
        }
    }

    #[test]
    fn test_record_roundtrip() {
        let original = record(
            200,
            DigestSet::new()
                .with(HashAlgo::Sha1, [1u8; 20])
                .with(HashAlgo::Sha256, [2u8; 32])
                .with(HashAlgo::Sha512, [3u8; 64]),
        );
        let value = encode_record(&original).unwrap();
        assert_eq!(decode_record(original.seq, &value).unwrap(), original);
    }

    #[test]
    fn test_negative_status_survives() {
        let original = record(FetchError::CertRevoked.code(), DigestSet::new());
        let value = encode_record(&original).unwrap();
        assert_eq!(decode_record(original.seq, &value).unwrap().status, FetchError::CertRevoked.code());
    }

    #[test]
    fn test_trailing_empty_digests_are_omitted() {
        let with_sha1 = encode_record(&record(200, DigestSet::new().with(HashAlgo::Sha1, [9u8; 20]))).unwrap();
        let without = encode_record(&record(200, DigestSet::new())).unwrap();
        // md5 (empty) blob + sha1 blob
        assert_eq!(with_sha1.len(), without.len() + 1 + 2 + 20);
    }

    #[test]
    fn test_unknown_trailing_blobs_are_ignored() {
        let original = record(200, DigestSet::new().with(HashAlgo::Blake2b, [4u8; 64]));
        let mut value = encode_record(&original).unwrap();
        let mut extra = KeyWriter::default();
        extra.blob(&[0xaa; 16]);
        value.extend(extra.into_bytes());
        assert_eq!(decode_record(original.seq, &value).unwrap(), original);
    }

    #[test]
    fn test_truncated_value_is_corrupt() {
        let value = encode_record(&record(200, DigestSet::new().with(HashAlgo::Sha256, [2u8; 32]))).unwrap();
        let truncated = &value[..value.len() - 1];
        assert!(matches!(decode_record(Seq::new(1, 1), truncated), Err(AppError::Corrupt(_))));
        assert!(matches!(decode_record(Seq::new(1, 1), &[]), Err(AppError::Corrupt(_))));
    }

    #[test]
    fn test_nul_in_url_cannot_be_encoded() {
        let mut bad = record(200, DigestSet::new());
        bad.url = "http://a\0b/".into();
        assert!(matches!(encode_record(&bad), Err(AppError::InvalidKey(_))));
    }
}
