use crate::key::Key;
use arbor_result::{Error, Result};
use arbor_transport::EUrl;
use bitcode::{Decode, Encode};
use std::fmt;

/// Bit 0 of [`Page::flags`]: the page is a leaf.
pub const PAGE_LEAF: u32 = 1 << 0;

/// Default split threshold: a page is split right after an insert pushes its
/// `total_size` past this many bytes of logical entry size. Underflow is
/// signalled below a third of it.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 4096;

/// One B+-tree node, also the blob-store unit of read/write.
///
/// Entries stay sorted and unique by `(timestamp, id)`. On leaves every
/// entry is a stored key; on internal pages each entry routes to the child
/// whose first entry carries the same id. `total_size` is the running sum
/// of [`Key::size`] over the entries. `next` chains pages: its sorted-
/// successor meaning holds on leaves, but splits thread it on every level
/// so the whole tree is reachable from the root by following it.
///
/// Field declaration order is the wire order.
#[derive(Clone, Debug, Default, Encode, Decode)]
pub struct Page {
    pub flags: u32,
    pub entries: Vec<Key>,
    pub total_size: u64,
    pub next: EUrl,
}

impl Page {
    pub fn new_leaf() -> Self {
        Self {
            flags: PAGE_LEAF,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.flags & PAGE_LEAF != 0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load(bytes: &[u8]) -> Result<Self> {
        bitcode::decode(bytes).map_err(|_| Error::Corrupt("page decode"))
    }

    pub fn save(&self) -> Vec<u8> {
        bitcode::encode(self)
    }

    /// Position used for descent or leaf lookup.
    ///
    /// Leaves answer the exact `(timestamp, id)` match. Internal pages
    /// answer the child subtree covering `obj`: position 0 when `obj` sorts
    /// at or before the first entry, otherwise the last entry not greater
    /// than `obj`. Entry-less pages answer `None` whatever their flags say;
    /// the first insert into a fresh index relies on the empty root taking
    /// this path.
    pub fn search_node(&self, obj: &Key) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        if self.is_leaf() {
            return self.search_leaf(obj);
        }
        if *obj <= self.entries[0] {
            return Some(0);
        }
        let at = self.entries.partition_point(|entry| entry < obj);
        if at == self.entries.len() {
            return Some(self.entries.len() - 1);
        }
        if self.entries[at] == *obj {
            return Some(at);
        }
        Some(at - 1)
    }

    fn search_leaf(&self, obj: &Key) -> Option<usize> {
        self.entries.binary_search_by(|entry| entry.cmp(obj)).ok()
    }

    /// Ordered insert; an entry equal by `(timestamp, id)` is replaced and
    /// its size swapped out of the accounting. When `total_size` ends up
    /// past `max_page_size` the upper half moves into `other`, which
    /// inherits the flags, and both halves recount their sizes. Returns
    /// true iff the page split.
    pub fn insert_and_split(&mut self, obj: Key, other: &mut Page, max_page_size: usize) -> bool {
        let at = self.entries.partition_point(|entry| entry < &obj);
        self.total_size += obj.size() as u64;
        if at < self.entries.len() && self.entries[at] == obj {
            self.total_size -= self.entries[at].size() as u64;
            self.entries[at] = obj;
        } else {
            self.entries.insert(at, obj);
        }

        if self.total_size > max_page_size as u64 {
            let split_at = self.entries.len() / 2;
            other.flags = self.flags;
            other.entries = self.entries.split_off(split_at);
            other.recalculate_size();
            self.recalculate_size();
            return true;
        }
        false
    }

    /// Drop the entry at `at`. Returns true when the page fell below the
    /// underflow mark (`max_page_size / 3`). The signal is advisory;
    /// callers reclaim only fully empty pages.
    pub fn remove(&mut self, at: usize, max_page_size: usize) -> bool {
        let dropped = self.entries.remove(at);
        self.total_size -= dropped.size() as u64;
        self.total_size < (max_page_size / 3) as u64
    }

    /// Recount `total_size` from the entries.
    pub fn recalculate_size(&mut self) {
        self.total_size = self.entries.iter().map(|entry| entry.size() as u64).sum();
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(first), Some(last)) = (self.entries.first(), self.entries.last()) {
            write!(
                f,
                "[{}, {}, L{}, N{}, T{})",
                first,
                last,
                self.is_leaf() as u32,
                self.entries.len(),
                self.total_size
            )
        } else {
            write!(
                f,
                "[L{}, N{}, T{})",
                self.is_leaf() as u32,
                self.entries.len(),
                self.total_size
            )
        }
    }
}
