//! End-to-end tests against a fake Gemini API.
//!
//! The fake server embeds text as keyword counts, so retrieval is
//! deterministic, and answers by citing the first source in the prompt.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use axum::extract::Path as UrlPath;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use conflict_rag::config::{self, Config};
use conflict_rag::embedding::GeminiEmbedder;
use conflict_rag::index::build_index;
use conflict_rag::llm::GeminiChat;
use conflict_rag::progress::NoProgress;
use conflict_rag::prompt::PromptTemplate;
use conflict_rag::rag::RagChain;

const API_KEY: &str = "test-key";
const RULE: &str = "--------------------------------------------------";
const VOCAB: [&str; 6] = ["intern", "home", "remote", "vacation", "cafeteria", "2024"];

// ─── Fake Gemini ────────────────────────────────────────────────────

fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut v: Vec<f32> = VOCAB
        .iter()
        .map(|w| lower.matches(w).count() as f32)
        .collect();
    v.push(0.1);
    v
}

async fn gemini_handler(
    UrlPath(path): UrlPath<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) != Some(API_KEY) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": { "message": "API key not valid" } })),
        );
    }

    if path.ends_with(":batchEmbedContents") {
        let embeddings: Vec<Value> = body["requests"]
            .as_array()
            .map(|reqs| {
                reqs.iter()
                    .map(|r| {
                        let text = r["content"]["parts"][0]["text"].as_str().unwrap_or("");
                        json!({ "values": keyword_vector(text) })
                    })
                    .collect()
            })
            .unwrap_or_default();
        return (StatusCode::OK, Json(json!({ "embeddings": embeddings })));
    }

    if path.ends_with(":generateContent") {
        let prompt = body["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap_or("");
        if prompt.contains("FAILME") {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": { "message": "invalid argument" } })),
            );
        }
        let source = prompt
            .split("[Source: ")
            .nth(1)
            .and_then(|rest| rest.split(']').next())
            .unwrap_or("none");
        let answer = format!("No. Interns must work on-site.\nSource: {}", source);
        return (
            StatusCode::OK,
            Json(json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": answer }] },
                    "finishReason": "STOP"
                }]
            })),
        );
    }

    (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown method" })))
}

/// Serve the fake API on an ephemeral port from a background thread.
fn spawn_fake_gemini() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let port = listener.local_addr().unwrap().port();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            let app = Router::new().route("/v1beta/{*path}", post(gemini_handler));
            axum::serve(listener, app).await.ok();
        });
    });

    port
}

// ─── Fixtures ───────────────────────────────────────────────────────

fn write_policies(data_dir: &Path) {
    fs::create_dir_all(data_dir).unwrap();
    fs::write(
        data_dir.join("employee_handbook_v1.txt"),
        "All employees may work from home (remote) up to three days per week.",
    )
    .unwrap();
    fs::write(
        data_dir.join("intern_onboarding_faq.txt"),
        "Interns are not eligible for remote work. Every intern must work on-site \
         and may not work from home during the internship.",
    )
    .unwrap();
    fs::write(
        data_dir.join("cafeteria_menu.txt"),
        "The cafeteria serves lunch daily from noon.",
    )
    .unwrap();
    fs::write(
        data_dir.join("vacation_policy.txt"),
        "Vacation requests need two weeks notice.",
    )
    .unwrap();
}

fn setup_test_env(port: u16) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    write_policies(&root.join("data"));

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = format!(
        r#"[data]
dir = "{root}/data"

[embedding]
url = "http://127.0.0.1:{port}"
max_retries = 0

[llm]
url = "http://127.0.0.1:{port}"
max_retries = 0
"#,
        root = root.display(),
        port = port
    );
    let config_path = config_dir.join("crag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn crag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("crag");
    path
}

fn run_crag(cwd: &Path, args: &[&str], api_key: Option<&str>) -> Output {
    let binary = crag_binary();
    let mut cmd = Command::new(&binary);
    cmd.current_dir(cwd).args(args).env_remove("RUST_LOG");
    match api_key {
        Some(key) => cmd.env("GOOGLE_API_KEY", key),
        None => cmd.env_remove("GOOGLE_API_KEY"),
    };
    cmd.output()
        .unwrap_or_else(|e| panic!("Failed to run crag binary at {:?}: {}", binary, e))
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

// ─── Library ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chain_against_fake_gemini() {
    let port = spawn_fake_gemini();
    let (_tmp, config_path) = setup_test_env(port);
    let cfg: Config = config::load_config(&config_path).unwrap();

    let embedder = GeminiEmbedder::new(&cfg.embedding, API_KEY.to_string()).unwrap();
    let chat = GeminiChat::new(&cfg.llm, API_KEY.to_string()).unwrap();

    let (store, stats) = build_index(&cfg, &embedder, &NoProgress).await.unwrap();
    assert_eq!(stats.documents, 4);
    assert_eq!(stats.chunks, 4);
    assert_eq!(stats.dims, VOCAB.len() + 1);

    let chain = RagChain::new(
        &store,
        &embedder,
        &chat,
        PromptTemplate::default(),
        cfg.retrieval.params(),
    );
    let answer = chain
        .invoke("I just joined as a new intern. Can I work from home?")
        .await
        .unwrap();

    assert_eq!(
        answer.sources,
        vec![
            "intern_onboarding_faq.txt",
            "employee_handbook_v1.txt",
            "cafeteria_menu.txt"
        ]
    );
    assert!(answer.answer.ends_with("Source: intern_onboarding_faq.txt"));
}

#[tokio::test]
async fn test_wrong_key_fails_without_retry() {
    let port = spawn_fake_gemini();
    let (_tmp, config_path) = setup_test_env(port);
    let cfg = config::load_config(&config_path).unwrap();

    let embedder = GeminiEmbedder::new(&cfg.embedding, "wrong".to_string()).unwrap();
    let err = build_index(&cfg, &embedder, &NoProgress)
        .await
        .err()
        .unwrap();
    let msg = format!("{:#}", err);
    assert!(msg.contains("403"), "unexpected error: {}", msg);
    assert!(!msg.contains("wrong"), "API key leaked into error: {}", msg);
}

// ─── CLI ────────────────────────────────────────────────────────────

#[test]
fn test_sources_lists_data_folder() {
    let (tmp, config_path) = setup_test_env(1);
    let output = run_crag(
        tmp.path(),
        &["--config", config_path.to_str().unwrap(), "sources"],
        None,
    );
    let stdout = stdout_of(&output);
    assert!(output.status.success(), "sources failed: {}", stderr_of(&output));
    assert!(stdout.contains("intern_onboarding_faq.txt"));
    assert!(stdout.contains("4 documents in"));
    assert!(stdout.contains("nebula_gears_policies"));
}

#[test]
fn test_ask_default_question() {
    let port = spawn_fake_gemini();
    let (tmp, config_path) = setup_test_env(port);
    let output = run_crag(
        tmp.path(),
        &["--config", config_path.to_str().unwrap(), "ask"],
        Some(API_KEY),
    );
    let stdout = stdout_of(&output);
    assert!(
        output.status.success(),
        "ask failed: stdout={}, stderr={}",
        stdout,
        stderr_of(&output)
    );

    let expected = format!(
        "Starting Conflict-Aware RAG System...\n\
         Loaded 4 documents.\n\
         Vector Store Indexing Complete.\n\
         \n\
         Query: I just joined as a new intern. Can I work from home?\n\
         {rule}\n\
         AI Response:\n\
         No. Interns must work on-site.\n\
         Source: intern_onboarding_faq.txt\n\
         {rule}\n",
        rule = RULE
    );
    assert_eq!(stdout, expected);
}

#[test]
fn test_ask_json_output() {
    let port = spawn_fake_gemini();
    let (tmp, config_path) = setup_test_env(port);
    let output = run_crag(
        tmp.path(),
        &[
            "--config",
            config_path.to_str().unwrap(),
            "ask",
            "Can an intern work remote?",
            "-k",
            "2",
            "--json",
        ],
        Some(API_KEY),
    );
    assert!(output.status.success(), "ask failed: {}", stderr_of(&output));

    let body: Value = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert_eq!(body["question"], "Can an intern work remote?");
    assert_eq!(
        body["sources"],
        json!(["intern_onboarding_faq.txt", "employee_handbook_v1.txt"])
    );
}

#[test]
fn test_ask_failure_prints_error_between_rules() {
    let port = spawn_fake_gemini();
    let (tmp, config_path) = setup_test_env(port);
    let output = run_crag(
        tmp.path(),
        &["--config", config_path.to_str().unwrap(), "ask", "FAILME"],
        Some(API_KEY),
    );
    let stdout = stdout_of(&output);
    assert_eq!(output.status.code(), Some(1));
    assert!(!stdout.contains("AI Response:"));

    let lines: Vec<&str> = stdout.lines().collect();
    let n = lines.len();
    assert!(n >= 3, "unexpected output: {}", stdout);
    assert_eq!(lines[n - 3], RULE);
    assert!(lines[n - 2].starts_with("Error: "), "got: {}", lines[n - 2]);
    assert!(lines[n - 2].contains("400"));
    assert_eq!(lines[n - 1], RULE);
}

#[test]
fn test_prompt_shows_conflict_rules_and_sources() {
    let port = spawn_fake_gemini();
    let (tmp, config_path) = setup_test_env(port);
    let output = run_crag(
        tmp.path(),
        &[
            "--config",
            config_path.to_str().unwrap(),
            "prompt",
            "Can an intern work from home?",
        ],
        Some(API_KEY),
    );
    let stdout = stdout_of(&output);
    assert!(output.status.success(), "prompt failed: {}", stderr_of(&output));
    assert!(stdout.contains("CRITICAL RULES FOR CONFLICT RESOLUTION"));
    assert!(stdout.contains("[Source: intern_onboarding_faq.txt]\nInterns are not eligible"));
    assert!(stdout.contains("User Question: Can an intern work from home?"));
}

#[test]
fn test_retrieve_top_k_and_json_progress() {
    let port = spawn_fake_gemini();
    let (tmp, config_path) = setup_test_env(port);
    let output = run_crag(
        tmp.path(),
        &[
            "--config",
            config_path.to_str().unwrap(),
            "--progress",
            "json",
            "retrieve",
            "intern working from home",
            "-k",
            "1",
        ],
        Some(API_KEY),
    );
    let stdout = stdout_of(&output);
    assert!(output.status.success(), "retrieve failed: {}", stderr_of(&output));
    assert!(stdout.contains("4 documents, 4 chunks"));
    assert!(stdout.contains("1. ["));
    assert!(stdout.contains("intern_onboarding_faq.txt"));
    assert!(!stdout.contains("2. ["));
    assert!(stderr_of(&output).contains("\"phase\":\"embedding\""));
}

#[test]
fn test_retrieve_ignores_prompt_template() {
    let port = spawn_fake_gemini();
    let (tmp, config_path) = setup_test_env(port);
    let mut content = fs::read_to_string(&config_path).unwrap();
    content.push_str("\n[prompt]\ntemplate_path = \"does_not_exist.txt\"\n");
    fs::write(&config_path, content).unwrap();

    let config_arg = config_path.to_str().unwrap();
    let output = run_crag(
        tmp.path(),
        &["--config", config_arg, "retrieve", "intern working from home"],
        Some(API_KEY),
    );
    assert!(output.status.success(), "retrieve failed: {}", stderr_of(&output));
    assert!(stdout_of(&output).contains("1. ["));

    let output = run_crag(
        tmp.path(),
        &["--config", config_arg, "prompt", "intern working from home"],
        Some(API_KEY),
    );
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("Failed to read prompt template"));
}

#[test]
fn test_missing_api_key_is_reported() {
    let (tmp, config_path) = setup_test_env(1);
    let output = run_crag(
        tmp.path(),
        &["--config", config_path.to_str().unwrap(), "ask"],
        None,
    );
    assert!(!output.status.success());
    assert!(!stdout_of(&output).contains("Starting Conflict-Aware RAG System"));
    assert!(stderr_of(&output).contains("GOOGLE_API_KEY not found"));
}

#[test]
fn test_missing_data_folder_is_reported() {
    let (tmp, config_path) = setup_test_env(1);
    let output = run_crag(
        tmp.path(),
        &[
            "--config",
            config_path.to_str().unwrap(),
            "--data-dir",
            "no_such_folder",
            "ask",
        ],
        Some(API_KEY),
    );
    assert!(!output.status.success());
    let stderr = stderr_of(&output);
    assert!(
        stderr.contains("Folder 'no_such_folder' not found"),
        "stderr: {}",
        stderr
    );
    assert!(!stdout_of(&output).contains("Loaded"));
}

#[test]
fn test_explicit_missing_config_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let output = run_crag(
        tmp.path(),
        &["--config", "nope/crag.toml", "sources"],
        None,
    );
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("Failed to read config file"));
}

#[test]
fn test_default_config_falls_back_to_defaults() {
    let tmp = TempDir::new().unwrap();
    write_policies(&tmp.path().join("data"));
    let output = run_crag(tmp.path(), &["sources"], None);
    assert!(output.status.success(), "sources failed: {}", stderr_of(&output));
    assert!(stdout_of(&output).contains("4 documents in 'data'"));
}
