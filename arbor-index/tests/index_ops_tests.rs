mod common;

use arbor_index::{Index, Key, Page};
use arbor_transport::{EUrl, Transport};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rustc_hash::FxHashMap;

#[test]
fn empty_open_initializes_the_start_page() {
    let transport = common::transport();
    let url = common::index_url("idx-empty");
    let index = Index::open(transport.clone(), url.clone()).unwrap();

    let meta = index.meta();
    assert_eq!(meta.page_index, 0);
    assert_eq!(meta.num_pages, 1);
    assert_eq!(meta.num_leaf_pages, 0);
    assert_eq!(meta.generation, 0);

    // the root exists in every group, empty, routing nowhere yet
    for reply in transport.read_all(&url) {
        let root = Page::load(&reply.outcome.unwrap()).unwrap();
        assert!(root.is_empty());
        assert!(root.next.is_empty());
    }
    assert!(index.collect_keys().unwrap().is_empty());
}

#[test]
fn inserted_keys_are_searchable_with_their_payload() {
    let transport = common::transport();
    let mut index = Index::open(transport, common::index_url("idx-search")).unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let keys = common::insert_keys(&mut index, &mut rng, 300);

    for key in &keys {
        let found = index.search(&Key::probe(key.id.clone())).unwrap().unwrap();
        assert_eq!(found.id, key.id);
        assert_eq!(found.url, key.url);
    }
    assert!(index.search(&Key::probe("no-such-id")).unwrap().is_none());
}

#[test]
fn ten_thousand_inserts_iterate_sorted() {
    let transport = common::transport();
    let mut index = Index::open(transport.clone(), common::index_url("idx-10k")).unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    let mut keys = common::insert_keys(&mut index, &mut rng, 10_000);

    let meta = index.meta();
    assert!(meta.num_pages >= 2);
    assert!(meta.num_leaf_pages >= 1);
    assert_eq!(meta.generation, 10_000);

    keys.sort();
    let iterated = index.collect_keys().unwrap();
    assert_eq!(iterated.len(), keys.len());
    for (got, want) in iterated.iter().zip(&keys) {
        assert_eq!(got.id, want.id);
        assert_eq!(got.url, want.url);
    }

    // recount physical pages against the write-side counters
    let (pages, leaves, chain_keys) = common::sweep_pages(&index, &transport);
    assert_eq!(pages, meta.num_pages);
    assert_eq!(leaves, meta.num_leaf_pages);
    let chain_ids: Vec<&str> = chain_keys.iter().map(|k| k.id.as_str()).collect();
    assert!(chain_ids.is_sorted());
    assert_eq!(chain_keys.len(), keys.len());
}

#[test]
fn duplicate_insert_replaces_the_payload() {
    let transport = common::transport();
    let mut index = Index::open(transport, common::index_url("idx-dup")).unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    let keys = common::insert_keys(&mut index, &mut rng, 500);

    let mut replacement = keys[123].clone();
    replacement.url = EUrl::new("b", "data.moved");
    index.insert(replacement.clone()).unwrap();

    let found = index.search(&Key::probe(replacement.id.clone())).unwrap().unwrap();
    assert_eq!(found.url.key, "data.moved");
    assert_eq!(index.collect_keys().unwrap().len(), keys.len());
}

#[test]
fn removing_half_keeps_the_other_half() {
    let transport = common::transport();
    let mut index = Index::open(transport, common::index_url("idx-half")).unwrap();
    let mut rng = StdRng::seed_from_u64(9);
    let keys = common::insert_keys(&mut index, &mut rng, 10_000);

    for key in &keys[..5_000] {
        index.remove(key).unwrap();
    }
    assert_eq!(index.meta().generation, 15_000);

    for (at, key) in keys.iter().enumerate() {
        let found = index.search(&Key::probe(key.id.clone())).unwrap();
        if at < 5_000 {
            assert!(found.is_none(), "key {at} should be gone");
        } else {
            let found = found.expect("retained key");
            assert_eq!(found.url, key.url);
        }
    }
}

#[test]
fn remove_of_a_missing_key_reports_not_found() {
    let transport = common::transport();
    let mut index = Index::open(transport, common::index_url("idx-miss")).unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    common::insert_keys(&mut index, &mut rng, 50);

    let before = index.meta().generation;
    assert!(index.remove(&Key::probe("unknown")).is_err());
    assert_eq!(index.meta().generation, before);
}

#[test]
fn iteration_resumes_from_a_stored_id() {
    let transport = common::transport();
    let mut index = Index::open(transport, common::index_url("idx-resume")).unwrap();
    // monotonic ids so leaf order and insertion order agree
    let mut keys = Vec::new();
    for ordinal in 0..2_000 {
        let key = Key::new(
            format!("k{ordinal:06}"),
            EUrl::new("b", format!("data.{ordinal:06}")),
        );
        index.insert(key.clone()).unwrap();
        keys.push(key);
    }

    let resumed = index.collect_keys_from(&keys[700].id).unwrap();
    assert_eq!(resumed.len(), keys.len() - 700);
    assert_eq!(resumed[0].id, keys[700].id);
    assert_eq!(resumed.last().unwrap().id, keys.last().unwrap().id);
}

#[test]
fn interleaved_mutations_match_a_truth_map() {
    let transport = common::transport();
    let mut index = Index::open(transport, common::index_url("idx-mixed")).unwrap();
    let mut truth: FxHashMap<String, Key> = FxHashMap::default();

    for step in 0..3_000 {
        let ordinal = step % 900;
        let key = Key::new(
            format!("k{ordinal:05}"),
            EUrl::new("b", format!("data.{step:05}")),
        );
        // the op for a given id shifts every cycle, so ids see inserts,
        // replacements, and removals in different orders
        match (step + step / 900) % 3 {
            0 | 1 => {
                index.insert(key.clone()).unwrap();
                truth.insert(key.id.clone(), key);
            }
            _ => {
                let existed = truth.remove(&key.id).is_some();
                assert_eq!(index.remove(&key).is_ok(), existed, "step {step}");
            }
        }
    }

    let mut want: Vec<&Key> = truth.values().collect();
    want.sort();
    let got = index.collect_keys().unwrap();
    assert_eq!(got.len(), want.len());
    for (g, w) in got.iter().zip(&want) {
        assert_eq!(g.id, w.id);
        assert_eq!(g.url, w.url);
    }
}
