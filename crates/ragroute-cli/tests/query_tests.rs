//! Integration tests for ask, query, history, eval and config commands

use assert_cmd::Command;
use mockito::Matcher;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn ragroute_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ragroute").unwrap();
    for key in [
        "LLM_PROVIDER",
        "OPENAI_API_KEY",
        "ANTHROPIC_API_KEY",
        "OPENAI_BASE_URL",
        "EMBEDDING_MODEL",
        "EMBEDDING_DIMENSIONS",
        "CHUNK_SIZE",
        "CHUNK_OVERLAP",
        "CHUNK_STRATEGY",
        "TOP_K",
        "RAGROUTE_REQUEST_API_KEY",
    ] {
        cmd.env_remove(key);
    }
    cmd.env("RAGROUTE_CONFIG", dir.join("config.yml"))
        .env("EMBEDDING_PROVIDER", "hash")
        .env("VECTOR_STORE_PROVIDER", "local")
        .env("VECTOR_STORE_PATH", dir.join("vectors"))
        .env("DATABASE_PATH", dir.join("metadata.sqlite"));
    cmd
}

fn completion(content: &str) -> String {
    json!({
        "model": "gpt-4o-mini",
        "choices": [{"message": {"role": "assistant", "content": content}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 42, "completion_tokens": 7, "total_tokens": 49}
    })
    .to_string()
}

#[test]
fn test_query_answers_and_records_history() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("notes.txt");
    fs::write(
        &file,
        "Ferris is the unofficial mascot of Rust. \
         The borrow checker enforces aliasing rules. \
         Cargo builds and tests crates.",
    )
    .unwrap();
    ragroute_cmd(dir.path()).arg("upload").arg(&file).assert().success();

    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::Regex("borrow checker".into()))
        .with_status(200)
        .with_body(completion("It enforces aliasing rules."))
        .create();

    let output = ragroute_cmd(dir.path())
        .env("LLM_PROVIDER", "openai")
        .env("OPENAI_API_KEY", "sk-test")
        .env("OPENAI_BASE_URL", server.url())
        .args(["--format", "json", "query", "What does the borrow checker do?"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    mock.assert();

    let answer: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(answer["answer"], "It enforces aliasing rules.");
    assert_eq!(answer["sources"].as_array().unwrap().len(), 1);
    assert_eq!(answer["sources"][0]["metadata"]["filename"], "notes.txt");
    assert!(answer["sources"][0]["score"].as_f64().unwrap() > 0.0);
    assert!(answer["query_id"].is_string());

    ragroute_cmd(dir.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("What does the borrow checker do?"))
        .stdout(predicate::str::contains("It enforces aliasing rules."));
}

#[test]
fn test_ask_without_credentials_is_config_error() {
    let dir = TempDir::new().unwrap();
    ragroute_cmd(dir.path())
        .env("LLM_PROVIDER", "anthropic")
        .args(["ask", "hello"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("ANTHROPIC_API_KEY"));
}

#[test]
fn test_ask_unknown_provider() {
    let dir = TempDir::new().unwrap();
    ragroute_cmd(dir.path())
        .args(["ask", "--provider", "gemini", "hello"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("gemini"));
}

#[test]
fn test_ask_rejects_temperature_before_network() {
    let dir = TempDir::new().unwrap();
    ragroute_cmd(dir.path())
        .env("LLM_PROVIDER", "openai")
        .env("OPENAI_API_KEY", "sk-test")
        .env("OPENAI_BASE_URL", "http://127.0.0.1:9")
        .args(["ask", "--temperature", "3.5", "hello"])
        .assert()
        .code(3);
}

#[test]
fn test_ask_prints_answer() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex("Say hi".into()))
        .with_status(200)
        .with_body(completion("hi"))
        .create();

    ragroute_cmd(dir.path())
        .env("LLM_PROVIDER", "openai")
        .env("OPENAI_API_KEY", "sk-test")
        .env("OPENAI_BASE_URL", server.url())
        .args(["ask", "Say", "hi"])
        .assert()
        .success()
        .stdout(predicate::str::diff("hi\n"));
    mock.assert();
}

#[test]
fn test_malformed_numeric_setting() {
    let dir = TempDir::new().unwrap();
    ragroute_cmd(dir.path())
        .env("CHUNK_SIZE", "large")
        .args(["documents", "list"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("CHUNK_SIZE"));
}

#[test]
fn test_empty_history() {
    let dir = TempDir::new().unwrap();
    ragroute_cmd(dir.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("No queries"));
}

#[test]
fn test_eval_run_and_compare() {
    let dir = TempDir::new().unwrap();
    let baseline_set = dir.path().join("baseline.json");
    fs::write(
        &baseline_set,
        r#"[{"question": "Capital of France?", "expected_answer": "Paris", "actual_answer": "Paris"},
            {"question": "Largest planet?", "expected_answer": "Jupiter", "actual_answer": "Saturn"}]"#,
    )
    .unwrap();
    let candidate_set = dir.path().join("candidate.json");
    fs::write(
        &candidate_set,
        r#"{"test_set": [{"question": "Largest planet?", "expected_answer": "Jupiter", "actual_answer": "Jupiter"}]}"#,
    )
    .unwrap();
    let baseline = dir.path().join("reports").join("baseline.json");
    let candidate = dir.path().join("reports").join("candidate.json");

    let output = ragroute_cmd(dir.path())
        .args(["--format", "json", "eval", "run"])
        .arg(&baseline_set)
        .arg("--output")
        .arg(&baseline)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["total_cases"], 2);
    assert_eq!(report["metric_means"]["exact_match"], 0.5);
    assert!(baseline.exists());

    ragroute_cmd(dir.path())
        .args(["eval", "run", "--metrics", "exact_match,token_f1"])
        .arg(&candidate_set)
        .arg("--output")
        .arg(&candidate)
        .assert()
        .success()
        .stdout(predicate::str::contains("Pass rate:  100.0%"));

    ragroute_cmd(dir.path())
        .args(["eval", "compare"])
        .arg(&baseline)
        .arg(&candidate)
        .assert()
        .success()
        .stdout(predicate::str::contains("exact_match"))
        .stdout(predicate::str::contains("+0.500"));
}

#[test]
fn test_eval_unknown_metric() {
    let dir = TempDir::new().unwrap();
    let set = dir.path().join("set.json");
    fs::write(&set, r#"[{"question": "q"}]"#).unwrap();
    ragroute_cmd(dir.path())
        .args(["eval", "run", "--metrics", "bleu"])
        .arg(&set)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("bleu"));
}

#[test]
fn test_config_show_masks_credentials() {
    let dir = TempDir::new().unwrap();
    ragroute_cmd(dir.path())
        .env("OPENAI_API_KEY", "sk-very-secret")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("********"))
        .stdout(predicate::str::contains("sk-very-secret").not());
}

#[test]
fn test_config_path_follows_override() {
    let dir = TempDir::new().unwrap();
    ragroute_cmd(dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.yml"));
}

#[test]
fn test_config_file_is_loaded() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("config.yml"),
        "retrieval:\n  top_k: 9\n  context_window: 1200\n",
    )
    .unwrap();
    let output = ragroute_cmd(dir.path())
        .args(["--format", "json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let config: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["retrieval"]["top_k"], 9);
    assert_eq!(config["embedding"]["provider"], "hash");
}
