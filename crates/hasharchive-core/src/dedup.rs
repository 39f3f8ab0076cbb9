use crate::models::{HashAlgo, ResponseRecord};
use crate::sequence::Seq;

/// One chain of equivalent, time-adjacent responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseGroup {
    /// Newest record of the chain.
    pub representative: ResponseRecord,
    /// The other observations merged into this chain, newest first.
    pub also_seen: Vec<Seq>,
}

impl ResponseGroup {
    fn new(representative: ResponseRecord) -> Self {
        Self {
            representative,
            also_seen: Vec::new(),
        }
    }

    /// Number of observations in the chain, representative included.
    pub fn observations(&self) -> usize {
        1 + self.also_seen.len()
    }
}

/// Whether two responses are treated as the same content.
///
/// Only successful (200) responses merge. Content type and length must match
/// exactly. For each algorithm, the shorter digest must be a prefix of the
/// longer one, so a zero-length digest matches anything.
// NOTE: the prefix rule tolerates legacy short digests but can also mask real
// differences when one side only stored a truncated hash. Kept as-is.
pub fn equivalent(a: &ResponseRecord, b: &ResponseRecord) -> bool {
    if a.status != 200 || b.status != 200 {
        return false;
    }
    if a.content_type != b.content_type {
        return false;
    }
    if a.length != b.length {
        return false;
    }
    HashAlgo::ALL.iter().all(|&algo| {
        let (x, y) = (a.digests.get(algo), b.digests.get(algo));
        let len = x.len().min(y.len());
        x[..len] == y[..len]
    })
}

/// Merge time-adjacent equivalent records into chains.
///
/// `records` must be in the order they will be displayed (newest first).
/// Equivalence is only checked between neighbours, so the result is a chain
/// grouping rather than a global partition.
pub fn group_responses(records: Vec<ResponseRecord>) -> Vec<ResponseGroup> {
    let mut groups: Vec<ResponseGroup> = Vec::new();
    let mut previous: Option<ResponseRecord> = None;

    for record in records {
        let merge = previous
            .as_ref()
            .is_some_and(|prev| equivalent(prev, &record));

        if merge && let Some(group) = groups.last_mut() {
            group.also_seen.push(record.seq);
        } else {
            groups.push(ResponseGroup::new(record.clone()));
        }
        previous = Some(record);
    }

    groups
}
