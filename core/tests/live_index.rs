use livesearch_core::{BackendKind, FileEvent, SearchConfig, SearchService};
use std::fs;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

struct Fixture {
    _tmp: TempDir,
    corpus: PathBuf,
    index: PathBuf,
}

fn fixture() -> Fixture {
    let tmp = tempdir().unwrap();
    let corpus = tmp.path().join("corpus");
    let index = tmp.path().join("index");
    fs::create_dir_all(&corpus).unwrap();
    fs::write(corpus.join("a.txt"), "cats are small mammals").unwrap();
    fs::write(corpus.join("b.txt"), "dogs are loyal companions").unwrap();
    Fixture { _tmp: tmp, corpus, index }
}

fn service(fx: &Fixture, backend: BackendKind) -> SearchService {
    let config = SearchConfig {
        roots: vec![fx.corpus.clone()],
        index_dir: fx.index.clone(),
        backend,
        embedding_dimension: 128,
        ..SearchConfig::default()
    };
    let svc = SearchService::new(config).unwrap();
    svc.initialize(&[fx.corpus.clone()]).unwrap();
    svc
}

fn paths(svc: &SearchService, query: &str) -> Vec<PathBuf> {
    svc.search(query, None).unwrap().into_iter().map(|h| h.path).collect()
}

#[test]
fn cats_query_returns_only_cat_document() {
    for backend in [BackendKind::Sparse, BackendKind::Dense] {
        let fx = fixture();
        let svc = service(&fx, backend);
        let hits = svc.search("cats", None).unwrap();
        assert_eq!(hits[0].path, fx.corpus.join("a.txt"), "{backend}");
        assert!(hits[0].score > 0.0);
        assert_eq!(hits[0].matched_terms, vec!["cat".to_string()]);
        if backend == BackendKind::Sparse {
            assert!(hits.iter().all(|h| h.path != fx.corpus.join("b.txt")));
        }
    }
}

#[test]
fn adding_twice_changes_nothing() {
    for backend in [BackendKind::Sparse, BackendKind::Dense] {
        let fx = fixture();
        let svc = service(&fx, backend);
        let a = fx.corpus.join("a.txt");
        let before = svc.search("small mammals", None).unwrap();
        svc.on_file_event(FileEvent::Created(a.clone())).unwrap();
        svc.on_file_event(FileEvent::Modified(a)).unwrap();
        let after = svc.search("small mammals", None).unwrap();
        assert_eq!(svc.stats().documents, 2);
        assert_eq!(before.len(), after.len());
        assert!((before[0].score - after[0].score).abs() < 1e-6);
    }
}

#[test]
fn removed_paths_never_come_back() {
    for backend in [BackendKind::Sparse, BackendKind::Dense] {
        let fx = fixture();
        let svc = service(&fx, backend);
        let a = fx.corpus.join("a.txt");
        fs::remove_file(&a).unwrap();
        svc.on_file_event(FileEvent::Deleted(a.clone())).unwrap();
        for query in ["cats", "small mammals", "cats are small mammals", "dogs"] {
            assert!(!paths(&svc, query).contains(&a), "{backend}: {query}");
        }
    }
}

#[test]
fn move_reindexes_under_new_path() {
    for backend in [BackendKind::Sparse, BackendKind::Dense] {
        let fx = fixture();
        let svc = service(&fx, backend);
        let from = fx.corpus.join("a.txt");
        let to = fx.corpus.join("felines.txt");
        fs::rename(&from, &to).unwrap();
        svc.on_file_event(FileEvent::Moved { from: from.clone(), to: to.clone() }).unwrap();
        let found = paths(&svc, "cats");
        assert_eq!(found.first(), Some(&to), "{backend}");
        assert!(!found.contains(&from));
        let hit = &svc.search("cats", None).unwrap()[0];
        assert_eq!(hit.title, "felines");
    }
}

#[test]
fn moving_a_directory_moves_its_documents() {
    let fx = fixture();
    let nested = fx.corpus.join("nested");
    fs::create_dir_all(&nested).unwrap();
    fs::write(nested.join("c.txt"), "volcanic basalt columns").unwrap();
    let svc = service(&fx, BackendKind::Sparse);
    let renamed = fx.corpus.join("geology");
    fs::rename(&nested, &renamed).unwrap();
    svc.on_file_event(FileEvent::Moved { from: nested.clone(), to: renamed.clone() }).unwrap();
    assert_eq!(paths(&svc, "basalt"), vec![renamed.join("c.txt")]);
}

#[test]
fn snapshot_survives_restart() {
    for backend in [BackendKind::Sparse, BackendKind::Dense] {
        let fx = fixture();
        {
            let svc = service(&fx, backend);
            svc.shutdown().unwrap();
        }
        // c.txt appears and b.txt disappears while the service is down
        fs::write(fx.corpus.join("c.txt"), "parrots are colorful birds").unwrap();
        fs::remove_file(fx.corpus.join("b.txt")).unwrap();
        let svc = service(&fx, backend);
        assert_eq!(svc.stats().documents, 2, "{backend}");
        assert_eq!(paths(&svc, "parrots").first(), Some(&fx.corpus.join("c.txt")));
        assert!(!paths(&svc, "dogs loyal").contains(&fx.corpus.join("b.txt")));
    }
}

#[test]
fn empty_query_and_empty_index_return_nothing() {
    let tmp = tempdir().unwrap();
    for backend in [BackendKind::Sparse, BackendKind::Dense] {
        let config = SearchConfig { index_dir: tmp.path().join(backend.to_string()), backend, ..SearchConfig::default() };
        let svc = SearchService::new(config).unwrap();
        svc.initialize(&[]).unwrap();
        assert!(svc.search("anything", None).unwrap().is_empty());
        assert!(svc.search("", Some(3)).unwrap().is_empty());
    }
}

#[test]
fn unreadable_file_is_indexed_as_empty_row() {
    let fx = fixture();
    fs::write(fx.corpus.join("binary.txt"), [0xffu8, 0xfe, 0xfd]).unwrap();
    let sparse = service(&fx, BackendKind::Sparse);
    assert_eq!(sparse.stats().documents, 3);
    let dense_fx = fixture();
    fs::write(dense_fx.corpus.join("binary.txt"), [0xffu8, 0xfe, 0xfd]).unwrap();
    let dense = service(&dense_fx, BackendKind::Dense);
    assert_eq!(dense.stats().documents, 2);
    assert!(dense_fx.index.join("vectors.bin").exists());
}

#[test]
fn zero_threshold_admits_any_overlap() {
    let fx = fixture();
    let config = SearchConfig {
        index_dir: fx.index.clone(),
        relevance_threshold: 0.0,
        ..SearchConfig::default()
    };
    let svc = SearchService::new(config).unwrap();
    svc.initialize(&[fx.corpus.clone()]).unwrap();
    let hits = svc.search("cats dogs", None).unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.score > 0.0));
}

#[test]
fn querying_without_roots_keeps_the_index() {
    for backend in [BackendKind::Sparse, BackendKind::Dense] {
        let fx = fixture();
        service(&fx, backend).shutdown().unwrap();

        let config = SearchConfig { index_dir: fx.index.clone(), backend, embedding_dimension: 128, ..SearchConfig::default() };
        let svc = SearchService::new(config.clone()).unwrap();
        svc.initialize(&[]).unwrap();
        assert_eq!(svc.stats().documents, 2, "{backend}");

        let svc = SearchService::new(config).unwrap();
        svc.initialize(&[fx.corpus.join("renamed-away")]).unwrap();
        assert_eq!(svc.stats().documents, 2, "{backend}");
        assert_eq!(paths(&svc, "cats").first(), Some(&fx.corpus.join("a.txt")));
    }
}

#[test]
fn dense_restart_after_removals_hands_out_fresh_ids() {
    let fx = fixture();
    {
        let svc = service(&fx, BackendKind::Dense);
        let b = fx.corpus.join("b.txt");
        fs::remove_file(&b).unwrap();
        svc.on_file_event(FileEvent::Deleted(b)).unwrap();
        assert_eq!(svc.stats().tombstones, Some(1));
    }
    fs::write(fx.corpus.join("c.txt"), "parrots are colorful birds").unwrap();
    let svc = service(&fx, BackendKind::Dense);
    let stats = svc.stats();
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.stored_vectors, Some(3));
    let hits = svc.search("parrots colorful birds", Some(5)).unwrap();
    assert_eq!(hits[0].path, fx.corpus.join("c.txt"));
    assert_eq!(hits.iter().filter(|h| h.path == fx.corpus.join("c.txt")).count(), 1);
}
