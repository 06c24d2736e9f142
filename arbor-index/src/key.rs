use arbor_transport::EUrl;
use bitcode::{Decode, Encode};
use std::cmp::Ordering;
use std::fmt;

const NSEC_BITS: u32 = 30;
const NSEC_MASK: u64 = (1 << NSEC_BITS) - 1;

/// One indexed entry: a sortable `id` plus the payload it points at.
///
/// Ordering and equality are on `(timestamp, id)`; the payload `url` and
/// `positions` never participate. Field declaration order is the wire
/// order.
#[derive(Clone, Debug, Default, Encode, Decode)]
pub struct Key {
    pub id: String,
    pub url: EUrl,
    pub positions: Vec<u64>,
    pub timestamp: u64,
}

impl Key {
    pub fn new(id: impl Into<String>, url: EUrl) -> Self {
        Self {
            id: id.into(),
            url,
            ..Default::default()
        }
    }

    /// Probe key for lookups and routing entries: only `id` is set.
    pub fn probe(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Pack `(seconds, nanoseconds)` into the sortable timestamp field.
    pub fn set_timestamp(&mut self, sec: u64, nsec: u64) {
        self.timestamp = (sec << NSEC_BITS) | (nsec & NSEC_MASK);
    }

    /// Unpack the timestamp field into `(seconds, nanoseconds)`.
    pub fn get_timestamp(&self) -> (u64, u64) {
        (self.timestamp >> NSEC_BITS, self.timestamp & NSEC_MASK)
    }

    /// Logical size used for page accounting.
    #[inline]
    pub fn size(&self) -> usize {
        self.id.len() + self.url.size()
    }

    /// A key without an id is the "absent" marker in recursion frames and
    /// probe results.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.id == other.id
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (sec, nsec) = self.get_timestamp();
        write!(f, "{}:{}:{}.{}", self.id, self.url, sec, nsec)
    }
}
