//! Multi-index intersection with resumable pagination.

use crate::index::Index;
use crate::iter::KeyIter;
use crate::key::Key;
use arbor_result::Result;
use arbor_transport::{EUrl, Transport};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Keys present in every input index, grouped per index.
///
/// Key ids and timestamps match across groups; each group holds that
/// index's own stored copy, so payload URLs may differ for the same key.
#[derive(Debug, Default)]
pub struct IntersectResult {
    pub completed: bool,
    pub keys: BTreeMap<EUrl, Vec<Key>>,
}

impl IntersectResult {
    /// Number of keys collected per index (every group has the same count).
    pub fn len(&self) -> usize {
        self.keys.values().next().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// K-way merge over the leaf iterators of several indexes.
pub struct Intersector<T: Transport + Clone> {
    transport: T,
}

impl<T: Transport + Clone> Intersector<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Intersect fully, without pagination.
    pub fn intersect(&self, indexes: &[EUrl]) -> Result<IntersectResult> {
        let mut start = String::new();
        self.intersect_paginated(indexes, &mut start, usize::MAX)
    }

    /// Intersect starting at id `start`, collecting at most `num` keys per
    /// index.
    ///
    /// On return `start` holds the resumption token; pass it back unchanged
    /// to continue. A returned `completed` or a count below `num` means the
    /// intersection is exhausted. The token is an id alone while keys
    /// compare on `(timestamp, id)`, so resumption is exact when ids are
    /// unique per timestamp bucket.
    pub fn intersect_paginated(
        &self,
        indexes: &[EUrl],
        start: &mut String,
        num: usize,
    ) -> Result<IntersectResult> {
        let opened: Vec<Index<T>> = indexes
            .iter()
            .map(|url| Index::open(self.transport.clone(), url.clone()))
            .collect::<Result<_>>()?;
        let mut cursors: Vec<KeyIter<'_, T>> = Vec::with_capacity(opened.len());
        for index in &opened {
            cursors.push(index.iter_from(start.as_str())?);
        }

        let mut res = IntersectResult::default();
        loop {
            // One scan: the minimum current key and the cursors holding it.
            let mut min: Option<Key> = None;
            let mut holders: Vec<usize> = Vec::new();
            let mut at_end = false;
            for at in 0..cursors.len() {
                let Some(cur) = cursors[at].peek() else {
                    at_end = true;
                    break;
                };
                match &min {
                    None => {
                        min = Some(cur.clone());
                        holders.push(at);
                    }
                    Some(smallest) => match cur.cmp(smallest) {
                        Ordering::Equal => holders.push(at),
                        Ordering::Less => {
                            min = Some(cur.clone());
                            holders.clear();
                            holders.push(at);
                        }
                        Ordering::Greater => {}
                    },
                }
            }

            if at_end {
                res.completed = true;
                start.clear();
                break;
            }

            // Not unanimous: the laggards are exactly the minimum holders.
            if holders.len() != cursors.len() {
                for &at in &holders {
                    cursors[at].advance();
                }
                continue;
            }

            let Some(min) = min else {
                // no input indexes at all
                res.completed = true;
                start.clear();
                break;
            };

            *start = min.id.clone();
            if res.len() == num {
                break;
            }

            for &at in &holders {
                if let Some(key) = cursors[at].peek().cloned() {
                    res.keys.entry(indexes[at].clone()).or_default().push(key);
                }
                cursors[at].advance();
            }
        }

        Ok(res)
    }
}
