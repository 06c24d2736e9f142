//! In-memory replicated transport with per-group fault injection.
//! Intended for tests, examples, and ephemeral stores.

use crate::{EUrl, GroupId, GroupRead, GroupWrite, Transport};
use arbor_result::{Error, NO_SUCH_GROUP, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Mutex};

struct Blob {
    bytes: Arc<[u8]>,
    // Allocation hint carried through so tests can observe reserve growth.
    reserved: usize,
}

struct MemTransportState {
    groups: Vec<GroupId>,
    replicas: FxHashMap<GroupId, FxHashMap<EUrl, Blob>>,
    severed: FxHashSet<GroupId>,
    failing_writes: FxHashSet<GroupId>,
}

/// In-memory transport over per-group blob tables.
///
/// Clones share one session: the same replica tables and the same active
/// group list. Fault injection is per group — a *severed* group answers
/// every operation with [`NO_SUCH_GROUP`], a *write-failing* group keeps
/// serving reads but rejects writes.
#[derive(Clone)]
pub struct MemTransport {
    inner: Arc<Mutex<MemTransportState>>,
}

impl MemTransport {
    /// Create a transport with the given configured groups, all active and
    /// empty.
    pub fn new(groups: &[GroupId]) -> Self {
        let replicas = groups.iter().map(|g| (*g, FxHashMap::default())).collect();
        Self {
            inner: Arc::new(Mutex::new(MemTransportState {
                groups: groups.to_vec(),
                replicas,
                severed: FxHashSet::default(),
                failing_writes: FxHashSet::default(),
            })),
        }
    }

    /// Make a group answer every operation with [`NO_SUCH_GROUP`].
    pub fn sever_group(&self, group: GroupId) {
        self.inner.lock().unwrap().severed.insert(group);
    }

    /// Undo [`Self::sever_group`]; stored blobs are intact.
    pub fn restore_group(&self, group: GroupId) {
        self.inner.lock().unwrap().severed.remove(&group);
    }

    /// Make writes to a group fail while reads keep working.
    pub fn fail_writes(&self, group: GroupId) {
        self.inner.lock().unwrap().failing_writes.insert(group);
    }

    /// Undo [`Self::fail_writes`].
    pub fn heal_writes(&self, group: GroupId) {
        self.inner.lock().unwrap().failing_writes.remove(&group);
    }

    /// Number of blobs a group currently stores (recount helper for tests).
    pub fn blob_count_in(&self, group: GroupId) -> usize {
        let state = self.inner.lock().unwrap();
        state.replicas.get(&group).map_or(0, |table| table.len())
    }

    /// Reserved size recorded for a blob in a group, if present.
    pub fn reserved_in(&self, group: GroupId, url: &EUrl) -> Option<usize> {
        let state = self.inner.lock().unwrap();
        state
            .replicas
            .get(&group)
            .and_then(|table| table.get(url))
            .map(|blob| blob.reserved)
    }
}

impl Transport for MemTransport {
    fn read(&self, url: &EUrl) -> Result<Vec<u8>> {
        let state = self.inner.lock().unwrap();
        for group in &state.groups {
            if state.severed.contains(group) {
                continue;
            }
            if let Some(blob) = state.replicas.get(group).and_then(|table| table.get(url)) {
                return Ok(blob.bytes.to_vec());
            }
        }
        Err(Error::NotFound)
    }

    fn read_all(&self, url: &EUrl) -> Vec<GroupRead> {
        let state = self.inner.lock().unwrap();
        state
            .groups
            .iter()
            .map(|&group| {
                let outcome = if state.severed.contains(&group) {
                    Err(Error::Transport(NO_SUCH_GROUP))
                } else {
                    match state.replicas.get(&group).and_then(|table| table.get(url)) {
                        Some(blob) => Ok(blob.bytes.to_vec()),
                        None => Err(Error::NotFound),
                    }
                };
                GroupRead { group, outcome }
            })
            .collect()
    }

    fn write_to_groups(
        &self,
        groups: &[GroupId],
        url: &EUrl,
        data: &[u8],
        reserve: usize,
        _cache: bool,
    ) -> Vec<GroupWrite> {
        let mut state = self.inner.lock().unwrap();
        let reserved = if data.len() > reserve {
            data.len() * 3 / 2
        } else {
            reserve
        };
        groups
            .iter()
            .map(|&group| {
                let outcome = if state.severed.contains(&group) {
                    Err(Error::Transport(NO_SUCH_GROUP))
                } else if state.failing_writes.contains(&group) {
                    Err(Error::Transport(-5))
                } else {
                    match state.replicas.get_mut(&group) {
                        Some(table) => {
                            table.insert(
                                url.clone(),
                                Blob {
                                    bytes: Arc::from(data),
                                    reserved,
                                },
                            );
                            Ok(())
                        }
                        None => Err(Error::Transport(NO_SUCH_GROUP)),
                    }
                };
                GroupWrite { group, outcome }
            })
            .collect()
    }

    fn remove(&self, url: &EUrl) -> Vec<GroupWrite> {
        let mut state = self.inner.lock().unwrap();
        let groups = state.groups.clone();
        groups
            .iter()
            .map(|&group| {
                let outcome = if state.severed.contains(&group) {
                    Err(Error::Transport(NO_SUCH_GROUP))
                } else {
                    match state.replicas.get_mut(&group) {
                        Some(table) => {
                            if table.remove(url).is_some() {
                                Ok(())
                            } else {
                                Err(Error::NotFound)
                            }
                        }
                        None => Err(Error::Transport(NO_SUCH_GROUP)),
                    }
                };
                GroupWrite { group, outcome }
            })
            .collect()
    }

    fn get_groups(&self) -> Vec<GroupId> {
        self.inner.lock().unwrap().groups.clone()
    }

    fn set_groups(&self, groups: Vec<GroupId>) {
        self.inner.lock().unwrap().groups = groups;
    }
}
