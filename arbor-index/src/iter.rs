//! Forward traversal along the page chain.

use crate::key::Key;
use crate::page::Page;
use arbor_transport::{EUrl, Transport};

/// Key-level iterator over the leaf chain.
///
/// `peek`/`advance` expose the cursor the intersector drives; [`Iterator`]
/// is the plain facade over them. The iterator holds its current page by
/// value, so mutations after creation are not reflected.
pub struct KeyIter<'a, T: Transport> {
    transport: &'a T,
    page: Page,
    at: usize,
}

impl<'a, T: Transport> KeyIter<'a, T> {
    pub(crate) fn new(transport: &'a T, page: Page, at: usize) -> Self {
        Self { transport, page, at }
    }

    /// Current key, or `None` at end of chain.
    pub fn peek(&self) -> Option<&Key> {
        self.page.entries.get(self.at)
    }

    /// Step to the next key, following `next` across leaves. An empty
    /// next-link or a failed read ends the iteration.
    pub fn advance(&mut self) {
        self.at += 1;
        if self.at < self.page.entries.len() {
            return;
        }
        self.at = 0;
        if self.page.next.is_empty() {
            self.page = Page::default();
            return;
        }
        self.page = match self.transport.read(&self.page.next) {
            Ok(bytes) => Page::load(&bytes).unwrap_or_default(),
            Err(_) => Page::default(),
        };
    }
}

impl<T: Transport> Iterator for KeyIter<'_, T> {
    type Item = Key;

    fn next(&mut self) -> Option<Key> {
        let key = self.peek()?.clone();
        self.advance();
        Some(key)
    }
}

/// Page-level iterator: every page reachable from the start URL via `next`,
/// paired with the URL it was read from. Recovery replays this walk into
/// lagging groups; tests recount pages against the meta counters with it.
pub struct PageIter<'a, T: Transport> {
    transport: &'a T,
    current: Option<(EUrl, Page)>,
}

impl<'a, T: Transport> PageIter<'a, T> {
    pub(crate) fn new(transport: &'a T, start: EUrl) -> Self {
        let current = match transport.read(&start) {
            Ok(bytes) => Page::load(&bytes).ok().map(|page| (start, page)),
            Err(_) => None,
        };
        Self { transport, current }
    }
}

impl<T: Transport> Iterator for PageIter<'_, T> {
    type Item = (EUrl, Page);

    fn next(&mut self) -> Option<(EUrl, Page)> {
        let (url, page) = self.current.take()?;
        if !page.next.is_empty()
            && let Ok(bytes) = self.transport.read(&page.next)
            && let Ok(next_page) = Page::load(&bytes)
        {
            self.current = Some((page.next.clone(), next_page));
        }
        Some((url, page))
    }
}
