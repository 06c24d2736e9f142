//! Replicated blob I/O.
//!
//! A transport fans reads and writes across replica *groups* and reports a
//! per-group outcome for every replicated operation. The active group list
//! is owned, mutable session state: callers narrow it when groups fail and
//! widen it again when recovery succeeds.

pub mod mem;
pub mod url;

pub use mem::MemTransport;
pub use url::EUrl;

use arbor_result::Result;

/// Identifier of one replica group.
pub type GroupId = u32;

/// Default allocation hint handed to the store with page-sized writes
/// (1.5x the default page budget).
pub const DEFAULT_RESERVE_SIZE: usize = 6144;

/// Outcome of one replica group's participation in an operation.
#[derive(Clone, Debug)]
pub struct GroupOutcome<T> {
    pub group: GroupId,
    pub outcome: Result<T>,
}

impl<T> GroupOutcome<T> {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Per-group read reply: the blob bytes, or why this group has none.
pub type GroupRead = GroupOutcome<Vec<u8>>;

/// Per-group write/remove acknowledgement.
pub type GroupWrite = GroupOutcome<()>;

/// Blob store contract used by the index.
///
/// Implementations contact their replicas in parallel or not at all; the
/// caller only sees materialized per-group outcomes. Every method is a
/// suspension point from the index's perspective and is expected to bound
/// its own latency (the production contract is 60s per operation).
pub trait Transport {
    /// Read one blob from the active group set.
    fn read(&self, url: &EUrl) -> Result<Vec<u8>>;

    /// Read the blob independently from every active group, one reply per
    /// group in active order.
    fn read_all(&self, url: &EUrl) -> Vec<GroupRead>;

    /// Write to an explicit group list. `reserve` is an allocation hint:
    /// stores reserve `data.len() * 3 / 2` when the blob outgrows it.
    /// `cache` marks hot blobs (roots, meta, in-place rewrites).
    fn write_to_groups(
        &self,
        groups: &[GroupId],
        url: &EUrl,
        data: &[u8],
        reserve: usize,
        cache: bool,
    ) -> Vec<GroupWrite>;

    /// Write to the active groups with the default reserve.
    fn write(&self, url: &EUrl, data: &[u8], cache: bool) -> Vec<GroupWrite> {
        self.write_to_groups(&self.get_groups(), url, data, DEFAULT_RESERVE_SIZE, cache)
    }

    /// Remove the blob from the active groups.
    fn remove(&self, url: &EUrl) -> Vec<GroupWrite>;

    /// Current active group list.
    fn get_groups(&self) -> Vec<GroupId>;

    /// Replace the active group list for this session.
    fn set_groups(&self, groups: Vec<GroupId>);
}
