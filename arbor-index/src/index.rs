//! The replicated B+-tree: open-time recovery, descent mutations, and
//! metadata accounting.

use crate::iter::{KeyIter, PageIter};
use crate::key::Key;
use crate::meta::IndexMeta;
use crate::page::{DEFAULT_MAX_PAGE_SIZE, Page};
use arbor_result::{Error, Result};
use arbor_transport::{DEFAULT_RESERVE_SIZE, EUrl, GroupId, GroupWrite, Transport};

/// Upward frame of the insert descent: the child's first entry after its
/// mutation (so the parent can fix its routing id), and the routing key of
/// a freshly split sibling (empty when the child did not split).
#[derive(Default)]
struct InsertFrame {
    page_start: Key,
    split_key: Key,
}

/// Upward frame of the remove descent: the child's new first entry, and
/// whether the child emptied and was reclaimed.
#[derive(Default)]
struct RemoveFrame {
    page_start: Key,
    removed: bool,
}

/// A B+-tree rooted at a caller-chosen start URL.
///
/// The root page lives at the start URL itself, meta at `<start>.meta`, and
/// every other page at `<start>.<n>` in the same bucket. Opening reconciles
/// the replica groups: the highest persisted generation wins and its pages
/// are replayed into lagging groups. Single writer per index; readers
/// opening concurrently observe some committed generation.
pub struct Index<T: Transport> {
    transport: T,
    start: EUrl,
    meta: IndexMeta,
    max_page_size: usize,
}

/// Render a group list for log lines (`1:2:3`).
pub fn format_groups(groups: &[GroupId]) -> String {
    groups
        .iter()
        .map(|group| group.to_string())
        .collect::<Vec<_>>()
        .join(":")
}

fn accepted_groups(results: &[GroupWrite]) -> Vec<GroupId> {
    results
        .iter()
        .filter(|result| result.is_ok())
        .map(|result| result.group)
        .collect()
}

impl<T: Transport> Index<T> {
    /// Open the index at `start`, creating it on fresh storage and healing
    /// lagging replica groups otherwise.
    pub fn open(transport: T, start: EUrl) -> Result<Self> {
        Self::open_with_page_size(transport, start, DEFAULT_MAX_PAGE_SIZE)
    }

    /// As [`Self::open`], with an explicit split threshold.
    pub fn open_with_page_size(transport: T, start: EUrl, max_page_size: usize) -> Result<Self> {
        let mut index = Self {
            transport,
            start,
            meta: IndexMeta::default(),
            max_page_size,
        };
        index.recover()?;
        Ok(index)
    }

    /// Counters as of the last committed mutation.
    pub fn meta(&self) -> IndexMeta {
        self.meta
    }

    /// The URL this index is rooted at.
    pub fn start_url(&self) -> &EUrl {
        &self.start
    }

    /// Persist meta once and drop the handle.
    pub fn close(self) {
        self.write_meta();
    }

    /// Point lookup by `(timestamp, id)`. Returns the stored key, payload
    /// included, or `None`.
    pub fn search(&self, obj: &Key) -> Result<Option<Key>> {
        let (page, found) = self.locate(&self.start, obj)?;
        Ok(found.map(|at| page.entries[at].clone()))
    }

    /// Insert `obj`, replacing any entry equal by `(timestamp, id)`. Splits
    /// propagate upward; a split root is re-homed so the index stays
    /// addressable at its start URL.
    pub fn insert(&mut self, obj: Key) -> Result<()> {
        let mut frame = InsertFrame::default();
        let start = self.start.clone();
        self.insert_at(&start, &obj, &mut frame)?;
        self.meta.generation += 1;
        self.write_meta();
        Ok(())
    }

    /// Remove the entry equal to `obj` by `(timestamp, id)`. Pages that
    /// empty are reclaimed; underflow alone is tolerated.
    pub fn remove(&mut self, obj: &Key) -> Result<()> {
        let mut frame = RemoveFrame::default();
        let start = self.start.clone();
        self.remove_at(&start, obj, &mut frame)?;
        self.meta.generation += 1;
        self.write_meta();
        Ok(())
    }

    /// Iterate keys in order from the first leaf.
    pub fn iter(&self) -> Result<KeyIter<'_, T>> {
        self.iter_from("")
    }

    /// Iterate keys starting inside the leaf that covers `start_id`. A miss
    /// within that leaf clamps to its first entry.
    pub fn iter_from(&self, start_id: &str) -> Result<KeyIter<'_, T>> {
        let probe = Key::probe(start_id);
        let (page, found) = self.locate(&self.start, &probe)?;
        Ok(KeyIter::new(&self.transport, page, found.unwrap_or(0)))
    }

    /// Walk every page reachable from the start URL along `next` links.
    pub fn pages(&self) -> PageIter<'_, T> {
        PageIter::new(&self.transport, self.start.clone())
    }

    /// Collect all keys from `start_id` on.
    pub fn collect_keys_from(&self, start_id: &str) -> Result<Vec<Key>> {
        Ok(self.iter_from(start_id)?.collect())
    }

    /// Collect every key in the index.
    pub fn collect_keys(&self) -> Result<Vec<Key>> {
        self.collect_keys_from("")
    }

    // ----------------------------- open path ---------------------------------

    fn recover(&mut self) -> Result<()> {
        let replies = self.transport.read_all(&self.meta_url());
        let mut seen: Vec<(GroupId, IndexMeta)> = Vec::new();
        for reply in replies {
            match reply.outcome {
                Ok(bytes) => {
                    let meta = IndexMeta::load(&bytes).unwrap_or_default();
                    seen.push((reply.group, meta));
                }
                // Gone for good; the session may re-add it later.
                Err(err) if err.is_group_gone() => continue,
                // Anything else counts as "never wrote meta".
                Err(_) => seen.push((reply.group, IndexMeta::default())),
            }
        }

        if seen.is_empty() {
            self.init_start_page();
            self.write_meta();
            return Ok(());
        }

        let highest = seen
            .iter()
            .map(|(_, meta)| meta.generation)
            .max()
            .unwrap_or(0);
        for (_, meta) in &seen {
            if meta.generation == highest {
                self.meta = *meta;
            }
        }

        let good: Vec<GroupId> = seen
            .iter()
            .filter(|(_, meta)| meta.generation == highest)
            .map(|(group, _)| *group)
            .collect();
        let mut lagging: Vec<GroupId> = seen
            .iter()
            .filter(|(_, meta)| meta.generation < highest)
            .map(|(group, _)| *group)
            .collect();

        self.transport.set_groups(good.clone());

        if highest == 0 {
            self.init_start_page();
            self.write_meta();
            return Ok(());
        }
        if lagging.is_empty() {
            return Ok(());
        }

        // Eager, full recovery: replay every reachable page into the
        // lagging groups, shedding groups that stop accepting. Stale pages
        // on the lagging side become unreachable from the root.
        let mut pages_recovered = 0usize;
        for (url, page) in self.pages() {
            let results = self.transport.write_to_groups(
                &lagging,
                &url,
                &page.save(),
                DEFAULT_RESERVE_SIZE,
                false,
            );
            lagging = accepted_groups(&results);
            if lagging.is_empty() {
                break;
            }
            pages_recovered += 1;
        }

        let mut active = good;
        active.extend(lagging.iter().copied());
        self.transport.set_groups(active);
        self.write_meta();

        tracing::debug!(
            start = %self.start,
            meta = %self.meta,
            groups = %format_groups(&self.transport.get_groups()),
            pages_recovered,
            "index opened after replica recovery"
        );
        Ok(())
    }

    // A fresh root is an empty non-leaf page; the first insert grows the
    // first leaf under it.
    fn init_start_page(&mut self) {
        let root = Page::default();
        self.transport.write(&self.start, &root.save(), false);
        self.meta.num_pages += 1;
    }

    // ---------------------------- descent paths ------------------------------

    fn locate(&self, page_url: &EUrl, obj: &Key) -> Result<(Page, Option<usize>)> {
        let page = self.read_page(page_url)?;
        match page.search_node(obj) {
            Some(at) if !page.is_leaf() => {
                let child = page.entries[at].url.clone();
                self.locate(&child, obj)
            }
            found => Ok((page, found)),
        }
    }

    fn insert_at(&mut self, page_url: &EUrl, obj: &Key, frame: &mut InsertFrame) -> Result<()> {
        let mut page = self.read_page(page_url)?;
        let mut split = Page::default();

        if !page.is_leaf() {
            let Some(found) = page.search_node(obj) else {
                return self.insert_first_leaf(page_url, page, obj);
            };
            let child_url = page.entries[found].url.clone();
            self.insert_at(&child_url, obj, frame)?;

            let mut want_return = true;
            if page.entries[found].id != frame.page_start.id {
                // the child's smallest key moved; fix the routing id
                page.entries[found].id = frame.page_start.id.clone();
                want_return = false;
            }
            if !frame.split_key.is_empty() {
                let split_key = std::mem::take(&mut frame.split_key);
                page.insert_and_split(split_key, &mut split, self.max_page_size);
                want_return = false;
            }
            if want_return {
                frame.page_start = page.entries[0].clone();
                frame.split_key = Key::default();
                return Ok(());
            }
        } else {
            page.insert_and_split(obj.clone(), &mut split, self.max_page_size);
        }

        frame.page_start = page.entries[0].clone();
        frame.split_key = Key::default();

        if !split.is_empty() {
            let split_url = self.generate_page_url();
            frame.split_key.url = split_url.clone();
            frame.split_key.id = split.entries[0].id.clone();
            split.next = std::mem::replace(&mut page.next, split_url.clone());
            self.write_checked(&split_url, &split.save(), false)?;
            self.meta.num_pages += 1;
            if page.is_leaf() {
                self.meta.num_leaf_pages += 1;
            }
            tracing::trace!(page = %page_url, split = %split_url, "page split");
        }

        if !split.is_empty() && page_url == &self.start {
            let split_key = frame.split_key.clone();
            self.promote_root(page, split_key)?;
        } else {
            self.write_checked(page_url, &page.save(), true)?;
        }
        Ok(())
    }

    // Only reachable on the first insert into a fresh index: the root
    // exists but routes nowhere yet.
    fn insert_first_leaf(&mut self, page_url: &EUrl, mut page: Page, obj: &Key) -> Result<()> {
        let leaf_url = self.generate_page_url();
        let mut leaf = Page::new_leaf();
        let mut unused = Page::default();
        leaf.insert_and_split(obj.clone(), &mut unused, self.max_page_size);
        self.write_checked(&leaf_url, &leaf.save(), false)?;

        let mut route = Key::probe(obj.id.clone());
        route.url = leaf_url.clone();
        page.insert_and_split(route, &mut unused, self.max_page_size);
        page.next = leaf_url;
        self.write_checked(page_url, &page.save(), false)?;

        self.meta.num_pages += 1;
        self.meta.num_leaf_pages += 1;
        Ok(())
    }

    // The root must stay addressable at the start URL: move the split
    // root's lower half to a fresh URL and rebuild the root with two
    // routing entries. The new root's `next` keeps the page chain rooted.
    fn promote_root(&mut self, page: Page, split_key: Key) -> Result<()> {
        let old_root_url = self.generate_page_url();
        self.write_checked(&old_root_url, &page.save(), false)?;

        let mut old_root_key = Key::probe(page.entries[0].id.clone());
        old_root_key.url = old_root_url;

        let mut new_root = Page::default();
        let mut unused = Page::default();
        new_root.insert_and_split(old_root_key, &mut unused, self.max_page_size);
        new_root.insert_and_split(split_key, &mut unused, self.max_page_size);
        new_root.next = new_root.entries[0].url.clone();
        self.write_checked(&self.start, &new_root.save(), false)?;
        self.meta.num_pages += 1;
        tracing::trace!(start = %self.start, "root promoted");
        Ok(())
    }

    fn remove_at(&mut self, page_url: &EUrl, obj: &Key, frame: &mut RemoveFrame) -> Result<()> {
        let mut page = self.read_page(page_url)?;
        let Some(found) = page.search_node(obj) else {
            return Err(Error::NotFound);
        };

        if page.is_leaf() {
            page.remove(found, self.max_page_size);
        } else {
            let child_url = page.entries[found].url.clone();
            self.remove_at(&child_url, obj, frame)?;
            if frame.removed {
                // the child emptied and was reclaimed; drop its routing entry
                page.remove(found, self.max_page_size);
            } else if !frame.page_start.is_empty() {
                page.entries[found].id = frame.page_start.id.clone();
            } else {
                // nothing changed at this child's boundary
                return Ok(());
            }
        }

        frame.page_start = Key::default();
        frame.removed = false;

        if !page.entries.is_empty() {
            if found == 0 {
                frame.page_start = page.entries[0].clone();
            }
            self.write_checked(page_url, &page.save(), false)?;
        } else {
            self.remove_checked(page_url)?;
            frame.removed = true;
            self.meta.num_pages -= 1;
            if page.is_leaf() {
                self.meta.num_leaf_pages -= 1;
            }
        }
        Ok(())
    }

    // ------------------------------ plumbing ---------------------------------

    fn read_page(&self, url: &EUrl) -> Result<Page> {
        Page::load(&self.transport.read(url)?)
    }

    fn meta_url(&self) -> EUrl {
        EUrl::new(self.start.bucket.clone(), format!("{}.meta", self.start.key))
    }

    // Meta writes are fire-and-forget: the next successful mutation bumps
    // the generation again and recovery reconciles on open.
    fn write_meta(&self) {
        let results = self.transport.write(&self.meta_url(), &self.meta.save(), true);
        if !results.iter().any(GroupWrite::is_ok) {
            tracing::warn!(url = %self.meta_url(), "meta write reached no replica group");
        }
    }

    fn generate_page_url(&mut self) -> EUrl {
        let url = EUrl::new(
            self.start.bucket.clone(),
            format!("{}.{}", self.start.key, self.meta.page_index),
        );
        self.meta.page_index += 1;
        url
    }

    // Narrow the session to the groups that took the write; all-failed is
    // an I/O error and leaves the active set empty.
    fn write_checked(&self, url: &EUrl, data: &[u8], cache: bool) -> Result<()> {
        let results = self.transport.write(url, data, cache);
        let accepted = accepted_groups(&results);
        self.transport.set_groups(accepted.clone());
        if accepted.is_empty() {
            return Err(Error::Io);
        }
        Ok(())
    }

    fn remove_checked(&self, url: &EUrl) -> Result<()> {
        let results = self.transport.remove(url);
        let accepted = accepted_groups(&results);
        self.transport.set_groups(accepted.clone());
        if accepted.is_empty() {
            return Err(Error::Io);
        }
        Ok(())
    }
}
