//! End-to-end scenarios from spec.md §8, exercised against a real
//! temp-directory library and a real `Scheduler`/`FileSystem` pair —
//! mirroring `lnxdrive-sync::filesystem`'s `tempfile::TempDir`-backed test
//! style, just one layer up the stack.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use asset_core::{ContentId, FileSystemConfig};
use asset_fs::FileSystem;
use asset_loader::{Loader, ReadyFn, UnreadyFn};
use asset_scheduler::Scheduler;

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}

type ByteStore = Arc<Mutex<HashMap<ContentId, u8>>>;
type CountMap = Arc<Mutex<HashMap<ContentId, usize>>>;

fn counting_ready(counts: CountMap) -> ReadyFn {
    Arc::new(move |id| {
        *counts.lock().unwrap().entry(id).or_insert(0) += 1;
    })
}

fn counting_unready(counts: CountMap) -> UnreadyFn {
    Arc::new(move |id| {
        *counts.lock().unwrap().entry(id).or_insert(0) += 1;
    })
}

/// A filetype that reads exactly one byte into `store`, asserting no
/// dependencies. Used for scenarios A, C and D, which don't need a
/// dependency-asserting load callback.
fn raw_filetype(store: ByteStore) -> (asset_loader::LoadFn, asset_loader::UnloadFn) {
    let load_store = Arc::clone(&store);
    let load: asset_loader::LoadFn = Arc::new(move |mut stream, file_id, _ctx| {
        let mut buf = [0u8; 1];
        stream.read_all(&mut buf);
        load_store.lock().unwrap().insert(file_id, buf[0]);
    });
    let unload_store = store;
    let unload: asset_loader::UnloadFn = Arc::new(move |file_id| {
        unload_store.lock().unwrap().remove(&file_id);
    });
    (load, unload)
}

/// Scenario B's filetype: reads one byte, then asserts every dependency
/// `deps_map` lists for that file as a gating `load_dependency`. Every
/// ready/unready call (the top-level one and every asserted dependency's)
/// is routed through the same `counts` map so the test can assert the
/// exact per-file ready tallies spec.md §8 Scenario B lists.
fn tree_filetype(
    store: ByteStore,
    deps_map: Arc<HashMap<ContentId, Vec<ContentId>>>,
    ready_counts: CountMap,
    unready_counts: CountMap,
    filetype: ContentId,
) -> (asset_loader::LoadFn, asset_loader::UnloadFn) {
    let load_store = Arc::clone(&store);
    let load: asset_loader::LoadFn = Arc::new(move |mut stream, file_id, ctx| {
        let mut buf = [0u8; 1];
        stream.read_all(&mut buf);
        load_store.lock().unwrap().insert(file_id, buf[0]);

        if let Some(deps) = deps_map.get(&file_id) {
            for dep in deps {
                let ready = counting_ready(Arc::clone(&ready_counts));
                let unready = counting_unready(Arc::clone(&unready_counts));
                ctx.load_dependency(filetype, *dep, ready, unready).expect("load_dependency from within a load callback");
            }
        }
    });
    let unload_store = store;
    let unload: asset_loader::UnloadFn = Arc::new(move |file_id| {
        unload_store.lock().unwrap().remove(&file_id);
    });
    (load, unload)
}

struct Harness {
    scheduler: Arc<Scheduler>,
    fs: Arc<FileSystem>,
    loader: Loader,
    root: tempfile::TempDir,
}

fn harness() -> Harness {
    let scheduler = Arc::new(Scheduler::new(2).unwrap());
    let root = tempfile::tempdir().unwrap();
    let fs = Arc::new(FileSystem::new(Arc::clone(&scheduler), root.path().to_path_buf(), FileSystemConfig::default()).unwrap());
    let loader = Loader::new(Arc::clone(&scheduler), Arc::clone(&fs));
    Harness { scheduler, fs, loader, root }
}

/// Scenario A — simple load/unload.
#[test]
fn scenario_a_simple_load_unload() {
    let h = harness();
    std::fs::write(h.root.path().join("maybe.exists"), [2u8]).unwrap();

    let store: ByteStore = Arc::new(Mutex::new(HashMap::new()));
    let (load, unload) = raw_filetype(Arc::clone(&store));
    let ft = ContentId::from_name("raw");
    h.loader.register_filetype(ft, load, unload).unwrap();
    h.loader.register_library("root").unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let ready_count = Arc::new(AtomicUsize::new(0));
    let unready_count = Arc::new(AtomicUsize::new(0));
    let rc = Arc::clone(&ready_count);
    let uc = Arc::clone(&unready_count);

    let file = ContentId::from_name("maybe.exists");
    h.loader
        .load_global(
            ft,
            file,
            Arc::new(move |_| {
                rc.fetch_add(1, Ordering::SeqCst);
            }),
            Arc::new(move |_| {
                uc.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

    assert!(wait_until(Duration::from_secs(5), || ready_count.load(Ordering::SeqCst) == 1));
    assert_eq!(*store.lock().unwrap().get(&file).unwrap(), 2);
    assert_eq!(unready_count.load(Ordering::SeqCst), 0);

    h.loader.unload_global(file).unwrap();
    assert!(wait_until(Duration::from_secs(5), || unready_count.load(Ordering::SeqCst) == 1));
    assert_eq!(ready_count.load(Ordering::SeqCst), 1, "unload must not re-fire ready");
}

/// Scenario B — dependency tree, shared and nested.
#[test]
fn scenario_b_dependency_tree() {
    let h = harness();
    let files = [
        ("tree.root", 1u8),
        ("dependency.1", 11),
        ("dependency.2", 12),
        ("dependency.3", 13),
        ("dependency.4", 14),
        ("dependency.5", 15),
    ];
    for (name, value) in files {
        std::fs::write(h.root.path().join(name), [value]).unwrap();
    }

    let name_id = |name: &str| ContentId::from_name(name);
    let mut deps: HashMap<ContentId, Vec<ContentId>> = HashMap::new();
    deps.insert(name_id("tree.root"), vec![name_id("dependency.1"), name_id("dependency.2"), name_id("dependency.3")]);
    deps.insert(name_id("dependency.2"), vec![name_id("dependency.3"), name_id("dependency.4")]);
    deps.insert(name_id("dependency.3"), vec![name_id("dependency.1")]);
    deps.insert(name_id("dependency.4"), vec![name_id("dependency.5")]);
    let deps = Arc::new(deps);

    let store: ByteStore = Arc::new(Mutex::new(HashMap::new()));
    let ready_counts: CountMap = Arc::new(Mutex::new(HashMap::new()));
    let unready_counts: CountMap = Arc::new(Mutex::new(HashMap::new()));
    let ft = ContentId::from_name("tree");
    let (load, unload) = tree_filetype(Arc::clone(&store), deps, Arc::clone(&ready_counts), Arc::clone(&unready_counts), ft);
    h.loader.register_filetype(ft, load, unload).unwrap();
    h.loader.register_library("root").unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let root_id = name_id("tree.root");
    h.loader
        .load_global(ft, root_id, counting_ready(Arc::clone(&ready_counts)), counting_unready(Arc::clone(&unready_counts)))
        .unwrap();

    let expected: &[(&str, usize)] = &[
        ("tree.root", 1),
        ("dependency.1", 2),
        ("dependency.2", 1),
        ("dependency.3", 2),
        ("dependency.4", 1),
        ("dependency.5", 1),
    ];

    let all_ready = || {
        let counts = ready_counts.lock().unwrap();
        expected.iter().all(|(name, n)| counts.get(&name_id(name)).copied().unwrap_or(0) == *n)
    };
    assert!(wait_until(Duration::from_secs(5), all_ready), "ready counts: {:?}", ready_counts.lock().unwrap());

    {
        let values = store.lock().unwrap();
        for (name, value) in files {
            assert_eq!(values.get(&name_id(name)).copied(), Some(value), "{name} body value");
        }
    }

    h.loader.unload_global(root_id).unwrap();
    let all_unready_matches_ready = || {
        let ready = ready_counts.lock().unwrap().clone();
        let unready = unready_counts.lock().unwrap();
        ready.iter().all(|(id, n)| unready.get(id).copied().unwrap_or(0) == *n)
    };
    assert!(wait_until(Duration::from_secs(5), all_unready_matches_ready), "unready counts: {:?}", unready_counts.lock().unwrap());
}

/// Scenario C — hot reload: unready then ready fire, in that order, with
/// the reloaded value visible once ready fires again.
#[test]
fn scenario_c_hot_reload() {
    let h = harness();
    let path = h.root.path().join("x");
    std::fs::write(&path, [1u8]).unwrap();

    let store: ByteStore = Arc::new(Mutex::new(HashMap::new()));
    let (load, unload) = raw_filetype(Arc::clone(&store));
    let ft = ContentId::from_name("raw");
    h.loader.register_filetype(ft, load, unload).unwrap();
    h.loader.register_library("root").unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let ready_events = Arc::clone(&events);
    let unready_events = Arc::clone(&events);

    let file = ContentId::from_name("x");
    h.loader
        .load_global(
            ft,
            file,
            Arc::new(move |_| ready_events.lock().unwrap().push("ready")),
            Arc::new(move |_| unready_events.lock().unwrap().push("unready")),
        )
        .unwrap();

    assert!(wait_until(Duration::from_secs(5), || events.lock().unwrap().len() == 1));
    assert_eq!(*events.lock().unwrap(), vec!["ready"]);
    assert_eq!(*store.lock().unwrap().get(&file).unwrap(), 1);

    std::fs::write(&path, [9u8]).unwrap();
    assert!(wait_until(Duration::from_secs(5), || events.lock().unwrap().len() == 3));
    assert_eq!(*events.lock().unwrap(), vec!["ready", "unready", "ready"]);
    assert_eq!(*store.lock().unwrap().get(&file).unwrap(), 9);
}

/// Scenario D — stem resolution: a unique stem resolves silently; adding
/// a second extensioned file makes it ambiguous; removing the original
/// collapses it back to a (different) unique target.
#[test]
fn scenario_d_stem_resolution() {
    let h = harness();
    std::fs::write(h.root.path().join("stem.a"), [1u8]).unwrap();

    let store: ByteStore = Arc::new(Mutex::new(HashMap::new()));
    let (load, unload) = raw_filetype(Arc::clone(&store));
    let ft = ContentId::from_name("raw");
    h.loader.register_filetype(ft, load, unload).unwrap();
    h.loader.register_library("root").unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let ready_count = Arc::new(AtomicUsize::new(0));
    let rc = Arc::clone(&ready_count);
    let stem = ContentId::from_name("stem");
    h.loader
        .load_global(ft, stem, Arc::new(move |_| { rc.fetch_add(1, Ordering::SeqCst); }), Arc::new(|_| {}))
        .unwrap();
    assert!(wait_until(Duration::from_secs(5), || ready_count.load(Ordering::SeqCst) == 1));
    assert_eq!(*store.lock().unwrap().get(&ContentId::from_name("stem.a")).unwrap(), 1);

    std::fs::write(h.root.path().join("stem.b"), [2u8]).unwrap();
    std::thread::sleep(Duration::from_millis(300));

    std::fs::remove_file(h.root.path().join("stem.a")).unwrap();
    std::thread::sleep(Duration::from_millis(300));
    // "stem" now resolves uniquely to stem.b; a fresh load by stem should
    // reach it without ever touching the deleted stem.a.
    let second_ready = Arc::new(AtomicUsize::new(0));
    let src = Arc::clone(&second_ready);
    h.loader
        .load_global(ft, stem, Arc::new(move |_| { src.fetch_add(1, Ordering::SeqCst); }), Arc::new(|_| {}))
        .unwrap();
    assert!(wait_until(Duration::from_secs(5), || second_ready.load(Ordering::SeqCst) == 1));
    assert_eq!(*store.lock().unwrap().get(&ContentId::from_name("stem.b")).unwrap(), 2);

    drop(h.fs);
    drop(h.scheduler);
}
