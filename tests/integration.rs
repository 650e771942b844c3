//! End-to-end CLI tests: run the compiled `ragchat` binary against a
//! temporary database, with a local mock standing in for Ollama.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

const DIMS: usize = 16;

fn ragchat_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ragchat");
    path
}

fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let sum: usize = word.to_lowercase().bytes().map(usize::from).sum();
        v[sum % DIMS] += 1.0;
    }
    v
}

async fn mock_embed(Json(body): Json<Value>) -> Json<Value> {
    let input = body["input"].as_str().unwrap_or_default();
    Json(json!({ "model": body["model"], "embeddings": [bag_of_words(input)] }))
}

/// Streams the system message back so tests can see the injected context.
async fn mock_chat(Json(body): Json<Value>) -> Response {
    let system = body["messages"][0]["content"].as_str().unwrap_or_default();
    let mut ndjson = String::new();
    ndjson.push_str(&json!({"message": {"role": "assistant", "content": system}, "done": false}).to_string());
    ndjson.push('\n');
    ndjson.push_str(&json!({"message": {"role": "assistant", "content": ""}, "done": true}).to_string());
    ndjson.push('\n');
    Body::from(ndjson).into_response()
}

async fn spawn_mock_ollama() -> String {
    let app = Router::new()
        .route("/api/embed", post(mock_embed))
        .route("/api/chat", post(mock_chat));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn write_config(root: &Path, providers: &str) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config = format!(
        r#"[db]
path = "{}/data/ragchat.sqlite"

{}

[retrieval]
match_threshold = 0.7
match_count = 5
"#,
        root.display(),
        providers
    );
    let path = config_dir.join("ragchat.toml");
    fs::write(&path, config).unwrap();
    path
}

fn setup_test_env(ollama_url: Option<&str>) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha\n\nRust programming with cargo and crates.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.txt"),
        "Python notebooks and machine learning with PyTorch.",
    )
    .unwrap();

    let providers = match ollama_url {
        Some(url) => format!(
            r#"[embedding]
provider = "ollama"
model = "nomic-embed-text"
dims = {}
url = "{}"

[generation]
provider = "ollama"
model = "llama3"
url = "{}""#,
            DIMS, url, url
        ),
        None => String::new(),
    };
    let config_path = write_config(&root, &providers);
    (tmp, config_path)
}

fn run_ragchat(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ragchat_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ragchat binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn file(config_path: &Path, name: &str) -> String {
    let root = config_path.parent().unwrap().parent().unwrap();
    root.join("files").join(name).to_str().unwrap().to_string()
}

fn first_id(documents_stdout: &str, filename: &str) -> String {
    documents_stdout
        .lines()
        .find(|l| l.contains(filename))
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or_else(|| panic!("{} not listed in:\n{}", filename, documents_stdout))
        .to_string()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env(None);

    let (stdout, stderr, success) = run_ragchat(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    let db = config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("data/ragchat.sqlite");
    assert!(db.exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env(None);
    let (_, _, first) = run_ragchat(&config_path, &["init"]);
    assert!(first, "First init failed");
    let (_, _, second) = run_ragchat(&config_path, &["init"]);
    assert!(second, "Second init failed (not idempotent)");
}

#[test]
fn test_documents_empty() {
    let (_tmp, config_path) = setup_test_env(None);
    let (stdout, _, success) = run_ragchat(&config_path, &["documents"]);
    assert!(success);
    assert!(stdout.contains("No documents."));
}

#[test]
fn test_ingest_fails_when_embeddings_disabled() {
    let (_tmp, config_path) = setup_test_env(None);
    let alpha = file(&config_path, "alpha.md");
    let (_, stderr, success) = run_ragchat(&config_path, &["ingest", &alpha]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr: {}", stderr);

    let (stdout, _, _) = run_ragchat(&config_path, &["documents"]);
    assert!(stdout.contains("No documents."));
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), "[embedding]\nprovider = \"cohere\"");
    let (_, stderr, success) = run_ragchat(&config_path, &["documents"]);
    assert!(!success);
    assert!(stderr.contains("Unknown embedding provider"));
}

#[test]
fn test_delete_unknown_document() {
    let (_tmp, config_path) = setup_test_env(None);
    let (stdout, _, success) = run_ragchat(&config_path, &["delete", "no-such-id"]);
    assert!(success);
    assert!(stdout.contains("No document with id no-such-id"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ingest_search_chat_delete() {
    let url = spawn_mock_ollama().await;
    let (_tmp, config_path) = setup_test_env(Some(&url));
    let alpha = file(&config_path, "alpha.md");
    let beta = file(&config_path, "beta.txt");

    let (stdout, stderr, success) = run_ragchat(&config_path, &["ingest", &alpha, &beta]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("indexed alpha.md"));
    assert!(stdout.contains("indexed beta.txt"));

    let (listing, _, success) = run_ragchat(&config_path, &["documents"]);
    assert!(success);
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("beta.txt"), "newest first: {}", listing);

    let (stdout, _, success) = run_ragchat(
        &config_path,
        &["search", "Rust programming with cargo and crates", "--threshold", "0.9"],
    );
    assert!(success);
    assert!(stdout.starts_with("1. [0.95"), "{}", stdout);
    assert!(stdout.contains("alpha.md"));
    assert!(!stdout.contains("beta.txt"));

    let (stdout, _, success) = run_ragchat(
        &config_path,
        &["search", "Rust programming with cargo and crates", "--context"],
    );
    assert!(success);
    assert!(stdout.starts_with("[alpha.md]\n# Alpha"), "{}", stdout);

    let (stdout, stderr, success) = run_ragchat(
        &config_path,
        &["chat", "Rust programming with cargo and crates", "--system", "Be terse."],
    );
    assert!(success, "chat failed: {}", stderr);
    assert!(stdout.starts_with("Be terse.\n\nUSE THE CONTEXT BELOW:\n[alpha.md]"), "{}", stdout);
    assert!(stderr.contains("sources: alpha.md"), "{}", stderr);

    let alpha_id = first_id(&listing, "alpha.md");
    let (stdout, _, success) = run_ragchat(&config_path, &["delete", &alpha_id]);
    assert!(success);
    assert!(stdout.contains("Deleted"));

    let (listing, _, _) = run_ragchat(&config_path, &["documents"]);
    assert!(!listing.contains("alpha.md"));
    assert!(listing.contains("beta.txt"));
}
