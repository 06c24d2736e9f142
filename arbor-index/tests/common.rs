//! Shared helpers for the integration suites.

#![allow(dead_code)]

use arbor_index::{Index, Key, Page};
use arbor_transport::{EUrl, GroupId, MemTransport, Transport};
use rand::Rng;
use rand::rngs::StdRng;

pub const GROUPS: [GroupId; 3] = [1, 2, 3];

/// Opt-in log output: set `ARBOR_LOG` to an env-filter (e.g. `debug`) to
/// watch recovery while the tests run.
pub fn init_tracing() {
    if std::env::var("ARBOR_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_env("ARBOR_LOG"))
            .try_init();
    }
}

pub fn transport() -> MemTransport {
    MemTransport::new(&GROUPS)
}

pub fn index_url(name: &str) -> EUrl {
    EUrl::new("b", name)
}

/// Keys shaped like the production ingest path: random prefix, ordered
/// suffix, payload URL derived from the ordinal.
pub fn make_key(rng: &mut StdRng, ordinal: usize) -> Key {
    Key::new(
        format!("{:08x}.{:08}", rng.random::<u32>(), ordinal),
        EUrl::new("b", format!("data.{ordinal:08}")),
    )
}

pub fn insert_keys(
    index: &mut Index<MemTransport>,
    rng: &mut StdRng,
    count: usize,
) -> Vec<Key> {
    let mut keys = Vec::with_capacity(count);
    for ordinal in 0..count {
        let key = make_key(rng, ordinal);
        index.insert(key.clone()).unwrap();
        keys.push(key);
    }
    keys
}

/// Walk the page chain verifying the stored-size and routing invariants.
/// Returns `(pages, leaf_pages, leaf_keys_in_chain_order)`.
pub fn sweep_pages(
    index: &Index<MemTransport>,
    transport: &MemTransport,
) -> (u64, u64, Vec<Key>) {
    let mut pages = 0u64;
    let mut leaves = 0u64;
    let mut keys = Vec::new();
    for (url, page) in index.pages() {
        pages += 1;
        let mut recount = page.clone();
        recount.recalculate_size();
        assert_eq!(page.total_size, recount.total_size, "size drift at {url}");
        if page.is_leaf() {
            leaves += 1;
            keys.extend(page.entries.iter().cloned());
        } else {
            for entry in &page.entries {
                let child = Page::load(&transport.read(&entry.url).unwrap()).unwrap();
                assert_eq!(
                    child.entries.first().map(|k| k.id.as_str()),
                    Some(entry.id.as_str()),
                    "routing id at {url} -> {}",
                    entry.url
                );
            }
        }
    }
    (pages, leaves, keys)
}
