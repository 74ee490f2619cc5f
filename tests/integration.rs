//! End-to-end tests that exercise the compiled `pagewise` binary: CLI
//! commands directly, and the HTTP API through a spawned `serve` process.
//!
//! Upstream model calls are served by an in-test stub that speaks just
//! enough of the Gemini surface (batchEmbedContents, streamGenerateContent
//! over SSE) for ingestion and chat to run for real.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use axum::extract::Path as AxumPath;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tempfile::TempDir;

/// Answer the stub completion endpoint always streams back.
const STUB_ANSWER: &str = "The document describes a test fixture.";

fn pagewise_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("pagewise");
    path
}

// ============ Stub model provider ============

/// Deterministic embedding for stub responses. Values only need to be
/// non-zero and text-dependent; ranking quality is covered by unit tests.
fn stub_vector(text: &str) -> Vec<f32> {
    let bytes = text.as_bytes();
    let sum = bytes.iter().map(|&b| b as f32).sum::<f32>();
    vec![
        (sum % 97.0) + 1.0,
        (text.len() as f32 % 89.0) + 1.0,
        bytes.first().copied().unwrap_or(1) as f32,
    ]
}

async fn stub_gemini(AxumPath(rest): AxumPath<String>, body: String) -> Response {
    if rest.ends_with(":batchEmbedContents") {
        let request: serde_json::Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(_) => return StatusCode::BAD_REQUEST.into_response(),
        };
        let embeddings: Vec<serde_json::Value> = request["requests"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(|r| {
                let text = r["content"]["parts"][0]["text"].as_str().unwrap_or("");
                serde_json::json!({ "values": stub_vector(text) })
            })
            .collect();
        Json(serde_json::json!({ "embeddings": embeddings })).into_response()
    } else if rest.ends_with(":streamGenerateContent") {
        let sse = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"The document \"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"describes a test fixture.\"}]}}]}\n\n",
        );
        (
            [(header::CONTENT_TYPE, "text/event-stream")],
            sse.to_string(),
        )
            .into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Start the stub provider on a free port; the thread lives for the test
/// process lifetime.
fn start_stub_provider() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            let app = Router::new().route("/models/{rest}", post(stub_gemini));
            axum::serve(listener, app).await.unwrap();
        });
    });

    port
}

// ============ Test environment ============

struct TestEnv {
    _tmp: TempDir,
    config_path: PathBuf,
    server_port: u16,
}

impl TestEnv {
    fn base(&self) -> String {
        format!("http://127.0.0.1:{}", self.server_port)
    }
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn setup_test_env() -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let stub_port = start_stub_provider();
    let server_port = find_free_port();

    let config_content = format!(
        r#"[db]
path = "{root}/data/pagewise.sqlite"

[server]
bind = "127.0.0.1:{server_port}"

[uploads]
dir = "{root}/data/uploads"
max_bytes = 1048576

[chunking]
max_tokens = 120

[chat]
history_limit = 6
top_k = 4

[embedding]
provider = "gemini"
model = "test-embed"
dims = 3
url = "http://127.0.0.1:{stub_port}"
max_retries = 1
timeout_secs = 10

[completion]
provider = "gemini"
model = "test-model"
url = "http://127.0.0.1:{stub_port}"
timeout_secs = 10
"#,
        root = root.display(),
    );

    let config_path = config_dir.join("pagewise.toml");
    fs::write(&config_path, config_content).unwrap();

    TestEnv {
        _tmp: tmp,
        config_path,
        server_port,
    }
}

fn run_pagewise(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = pagewise_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("GEMINI_API_KEY", "test-key")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run pagewise binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Kills the spawned `serve` process when the test ends.
struct ServerGuard(Child);

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn start_server(env: &TestEnv) -> ServerGuard {
    let child = Command::new(pagewise_binary())
        .arg("--config")
        .arg(env.config_path.to_str().unwrap())
        .arg("serve")
        .env("GEMINI_API_KEY", "test-key")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn pagewise serve");
    let guard = ServerGuard(child);

    let client = reqwest::blocking::Client::new();
    let health = format!("{}/health", env.base());
    for _ in 0..50 {
        if let Ok(resp) = client.get(&health).send() {
            if resp.status().is_success() {
                return guard;
            }
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    panic!("server did not become ready at {}", env.base());
}

fn mint_token(config_path: &Path, user: &str) -> String {
    let (stdout, stderr, success) =
        run_pagewise(config_path, &["token", "create", "--user", user]);
    assert!(success, "token create failed: {}", stderr);
    stdout
        .lines()
        .find(|l| l.trim().starts_with("pw_"))
        .map(|l| l.trim().to_string())
        .expect("token create printed no token")
}

fn upload(base: &str, token: &str, file_name: &str, bytes: Vec<u8>) -> reqwest::blocking::Response {
    let part = reqwest::blocking::multipart::Part::bytes(bytes).file_name(file_name.to_string());
    let form = reqwest::blocking::multipart::Form::new().part("file", part);
    reqwest::blocking::Client::new()
        .post(format!("{base}/api/documents"))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .unwrap()
}

fn send_message(
    base: &str,
    token: &str,
    file_id: &str,
    message: &str,
) -> reqwest::blocking::Response {
    reqwest::blocking::Client::new()
        .post(format!("{base}/api/message"))
        .bearer_auth(token)
        .json(&serde_json::json!({ "fileId": file_id, "message": message }))
        .send()
        .unwrap()
}

fn list_messages(base: &str, token: &str, file_id: &str) -> serde_json::Value {
    reqwest::blocking::Client::new()
        .get(format!("{base}/api/documents/{file_id}/messages"))
        .bearer_auth(token)
        .send()
        .unwrap()
        .json()
        .unwrap()
}

/// A small but structurally complete PDF with the given text on one page.
fn minimal_pdf(text: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![100.into(), 600.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

// ============ CLI tests ============

#[test]
fn test_init_creates_database() {
    let env = setup_test_env();

    let (stdout, stderr, success) = run_pagewise(&env.config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let env = setup_test_env();

    let (_, _, success1) = run_pagewise(&env.config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_pagewise(&env.config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_token_create_prints_token_once() {
    let env = setup_test_env();
    run_pagewise(&env.config_path, &["init"]);

    let token = mint_token(&env.config_path, "alice");
    assert!(token.starts_with("pw_"), "unexpected token shape: {token}");
}

#[test]
fn test_cli_ingest_and_ask() {
    let env = setup_test_env();
    run_pagewise(&env.config_path, &["init"]);

    let file = env._tmp.path().join("notes.txt");
    fs::write(
        &file,
        "The lease runs for twelve months.\n\nRent is due on the first of each month.",
    )
    .unwrap();

    let (stdout, stderr, success) = run_pagewise(
        &env.config_path,
        &["ingest", file.to_str().unwrap(), "--user", "alice"],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("status: SUCCESS"));
    assert!(stdout.contains("ok"));

    let doc_id = stdout
        .lines()
        .find(|l| l.trim().starts_with("document id:"))
        .and_then(|l| l.split("document id:").nth(1))
        .map(|s| s.trim().to_string())
        .expect("ingest printed no document id");

    let (stdout, stderr, success) = run_pagewise(
        &env.config_path,
        &["ask", &doc_id, "How long is the lease?", "--user", "alice"],
    );
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains(STUB_ANSWER));
}

#[test]
fn test_cli_ask_unknown_document_fails() {
    let env = setup_test_env();
    run_pagewise(&env.config_path, &["init"]);

    let (_, stderr, success) = run_pagewise(
        &env.config_path,
        &["ask", "nonexistent-id", "hello?", "--user", "alice"],
    );
    assert!(!success, "ask for a missing document should fail");
    assert!(
        stderr.contains("not found"),
        "Should report not found, got: {}",
        stderr
    );
}

// ============ HTTP API tests ============

#[test]
fn test_health_endpoint() {
    let env = setup_test_env();
    run_pagewise(&env.config_path, &["init"]);
    let _server = start_server(&env);

    let resp = reqwest::blocking::get(format!("{}/health", env.base())).unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[test]
fn test_upload_and_chat_roundtrip() {
    let env = setup_test_env();
    run_pagewise(&env.config_path, &["init"]);
    let token = mint_token(&env.config_path, "alice");
    let _server = start_server(&env);
    let base = env.base();

    // Upload a plain-text document
    let resp = upload(
        &base,
        &token,
        "lease.txt",
        b"The lease term is twelve months.\n\nThe deposit equals one month of rent.".to_vec(),
    );
    assert_eq!(resp.status().as_u16(), 201);
    let doc: serde_json::Value = resp.json().unwrap();
    assert_eq!(doc["status"], "SUCCESS");
    assert_eq!(doc["name"], "lease.txt");
    let doc_id = doc["id"].as_str().unwrap().to_string();

    // It shows up in the caller's document list
    let list: serde_json::Value = reqwest::blocking::Client::new()
        .get(format!("{base}/api/documents"))
        .bearer_auth(&token)
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(list["documents"].as_array().unwrap().len(), 1);

    // Ask a question; the answer is the stub's canned completion
    let resp = send_message(&base, &token, &doc_id, "How long is the lease?");
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().unwrap(), STUB_ANSWER);

    // Both turns are in the conversation log, oldest first
    let log = list_messages(&base, &token, &doc_id);
    let messages = log["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["isUserMessage"], true);
    assert_eq!(messages[0]["text"], "How long is the lease?");
    assert_eq!(messages[1]["isUserMessage"], false);
    assert_eq!(messages[1]["text"], STUB_ANSWER);
}

#[test]
fn test_pdf_upload_ingests_successfully() {
    let env = setup_test_env();
    run_pagewise(&env.config_path, &["init"]);
    let token = mint_token(&env.config_path, "alice");
    let _server = start_server(&env);
    let base = env.base();

    let pdf = minimal_pdf("Quarterly revenue grew by twelve percent.");
    let resp = upload(&base, &token, "report.pdf", pdf);
    assert_eq!(resp.status().as_u16(), 201);
    let doc: serde_json::Value = resp.json().unwrap();
    assert_eq!(doc["status"], "SUCCESS", "pdf ingestion did not succeed: {doc}");

    let doc_id = doc["id"].as_str().unwrap();
    let resp = send_message(&base, &token, doc_id, "How did revenue change?");
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().unwrap(), STUB_ANSWER);
}

#[test]
fn test_chat_requires_token() {
    let env = setup_test_env();
    run_pagewise(&env.config_path, &["init"]);
    let _server = start_server(&env);

    let resp = reqwest::blocking::Client::new()
        .post(format!("{}/api/message", env.base()))
        .json(&serde_json::json!({ "fileId": "whatever", "message": "hi" }))
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["error"]["code"], "unauthenticated");
}

#[test]
fn test_foreign_document_is_hidden_and_unwritten() {
    let env = setup_test_env();
    run_pagewise(&env.config_path, &["init"]);
    let alice = mint_token(&env.config_path, "alice");
    let bob = mint_token(&env.config_path, "bob");
    let _server = start_server(&env);
    let base = env.base();

    let resp = upload(&base, &alice, "private.txt", b"Alice's private notes.".to_vec());
    let doc: serde_json::Value = resp.json().unwrap();
    let doc_id = doc["id"].as_str().unwrap().to_string();

    // Bob gets the same 404 as for a nonexistent id
    let resp = send_message(&base, &bob, &doc_id, "What do the notes say?");
    assert_eq!(resp.status().as_u16(), 404);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let resp = reqwest::blocking::Client::new()
        .get(format!("{base}/api/documents/{doc_id}"))
        .bearer_auth(&bob)
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    // And the failed probe left nothing in Alice's conversation
    let log = list_messages(&base, &alice, &doc_id);
    assert_eq!(log["messages"].as_array().unwrap().len(), 0);
}

#[test]
fn test_empty_message_rejected_without_side_effects() {
    let env = setup_test_env();
    run_pagewise(&env.config_path, &["init"]);
    let token = mint_token(&env.config_path, "alice");
    let _server = start_server(&env);
    let base = env.base();

    let resp = upload(&base, &token, "doc.txt", b"Some content here.".to_vec());
    let doc: serde_json::Value = resp.json().unwrap();
    let doc_id = doc["id"].as_str().unwrap().to_string();

    let resp = send_message(&base, &token, &doc_id, "   ");
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let log = list_messages(&base, &token, &doc_id);
    assert_eq!(log["messages"].as_array().unwrap().len(), 0);
}

#[test]
fn test_malformed_body_rejected() {
    let env = setup_test_env();
    run_pagewise(&env.config_path, &["init"]);
    let token = mint_token(&env.config_path, "alice");
    let _server = start_server(&env);

    let resp = reqwest::blocking::Client::new()
        .post(format!("{}/api/message", env.base()))
        .bearer_auth(&token)
        .header(header::CONTENT_TYPE, "application/json")
        .body("{ not json")
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[test]
fn test_failed_document_returns_503_but_keeps_question() {
    let env = setup_test_env();
    run_pagewise(&env.config_path, &["init"]);
    let token = mint_token(&env.config_path, "alice");
    let _server = start_server(&env);
    let base = env.base();

    // Whitespace-only text extracts to nothing, so ingestion ends FAILED
    let resp = upload(&base, &token, "blank.txt", b"   \n\n   ".to_vec());
    assert_eq!(resp.status().as_u16(), 201);
    let doc: serde_json::Value = resp.json().unwrap();
    assert_eq!(doc["status"], "FAILED");
    let doc_id = doc["id"].as_str().unwrap().to_string();

    let resp = send_message(&base, &token, &doc_id, "Anything in here?");
    assert_eq!(resp.status().as_u16(), 503);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["error"]["code"], "retrieval_unavailable");

    // The question was appended before the readiness gate
    let log = list_messages(&base, &token, &doc_id);
    let messages = log["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["isUserMessage"], true);
}

#[test]
fn test_unsupported_extension_rejected() {
    let env = setup_test_env();
    run_pagewise(&env.config_path, &["init"]);
    let token = mint_token(&env.config_path, "alice");
    let _server = start_server(&env);

    let resp = upload(&env.base(), &token, "slides.pptx", b"fake".to_vec());
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("unsupported file type"));
}

#[test]
fn test_oversized_upload_rejected() {
    let env = setup_test_env();
    run_pagewise(&env.config_path, &["init"]);
    let token = mint_token(&env.config_path, "alice");
    let _server = start_server(&env);

    // Config caps uploads at 1 MiB
    let big = vec![b'a'; 1_048_577];
    let resp = upload(&env.base(), &token, "big.txt", big);
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().unwrap();
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("maximum size"));
}

#[test]
fn test_conversations_are_per_document() {
    let env = setup_test_env();
    run_pagewise(&env.config_path, &["init"]);
    let token = mint_token(&env.config_path, "alice");
    let _server = start_server(&env);
    let base = env.base();

    let first: serde_json::Value = upload(&base, &token, "one.txt", b"First document text.".to_vec())
        .json()
        .unwrap();
    let second: serde_json::Value =
        upload(&base, &token, "two.txt", b"Second document text.".to_vec())
            .json()
            .unwrap();
    let first_id = first["id"].as_str().unwrap().to_string();
    let second_id = second["id"].as_str().unwrap().to_string();

    let resp = send_message(&base, &token, &first_id, "Hello first document");
    assert_eq!(resp.status().as_u16(), 200);

    let log = list_messages(&base, &token, &first_id);
    assert_eq!(log["messages"].as_array().unwrap().len(), 2);

    let log = list_messages(&base, &token, &second_id);
    assert_eq!(log["messages"].as_array().unwrap().len(), 0);
}

#[test]
fn test_get_document_endpoint() {
    let env = setup_test_env();
    run_pagewise(&env.config_path, &["init"]);
    let token = mint_token(&env.config_path, "alice");
    let _server = start_server(&env);
    let base = env.base();

    let doc: serde_json::Value = upload(&base, &token, "doc.txt", b"Document body.".to_vec())
        .json()
        .unwrap();
    let doc_id = doc["id"].as_str().unwrap();

    let fetched: serde_json::Value = reqwest::blocking::Client::new()
        .get(format!("{base}/api/documents/{doc_id}"))
        .bearer_auth(&token)
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(fetched["id"], doc["id"]);
    assert_eq!(fetched["name"], "doc.txt");
    assert_eq!(fetched["status"], "SUCCESS");

    let resp = reqwest::blocking::Client::new()
        .get(format!("{base}/api/documents/no-such-id"))
        .bearer_auth(&token)
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}
