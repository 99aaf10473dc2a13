use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use livesearch_core::{FileEvent, SearchConfig, SearchService};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use tower::ServiceExt;

fn build_tiny_service(dir: &Path) -> Arc<SearchService> {
    let corpus = dir.join("corpus");
    fs::create_dir_all(&corpus).unwrap();
    fs::write(corpus.join("a.txt"), "cats are small mammals").unwrap();
    fs::write(corpus.join("b.txt"), "dogs are loyal companions").unwrap();

    let config = SearchConfig { index_dir: dir.join("index"), roots: vec![corpus.clone()], ..SearchConfig::default() };
    let service = SearchService::new(config).unwrap();
    service.initialize(&[corpus]).unwrap();
    Arc::new(service)
}

async fn call(app: Router, uri: &str) -> (StatusCode, Bytes) {
    let req = Request::get(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let dir = tempdir().unwrap();
    let app = server::build_app(build_tiny_service(dir.path()));

    let (status, body) = call(app, "/search?q=cats&k=2").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(json["total_hits"].as_u64(), Some(1));
    assert_eq!(arr[0]["title"], "a");
    assert!(arr[0]["path"].as_str().unwrap().ends_with("a.txt"));
    assert!(arr[0]["score"].as_f64().unwrap() > 0.07);
    assert_eq!(arr[0]["matched_terms"][0], "cat");
}

#[tokio::test]
async fn empty_query_is_an_empty_list() {
    let dir = tempdir().unwrap();
    let app = server::build_app(build_tiny_service(dir.path()));

    let (status, body) = call(app, "/search").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["results"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn file_events_are_visible_to_queries() {
    let dir = tempdir().unwrap();
    let service = build_tiny_service(dir.path());
    let a = dir.path().join("corpus/a.txt");
    fs::remove_file(&a).unwrap();
    service.on_file_event(FileEvent::Deleted(a)).unwrap();

    let app = server::build_app(Arc::clone(&service));
    let (_, body) = call(app.clone(), "/search?q=cats").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["results"].as_array().unwrap().is_empty());

    let (status, body) = call(app, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    let stats: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(stats["backend"], "sparse");
    assert_eq!(stats["documents"], 1);
}
