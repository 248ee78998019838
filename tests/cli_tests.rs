//! Integration tests for the CLI interface

mod common;

use assert_cmd::Command;
use common::{repository_routes, MockSourceApi, TestContext};
use predicates::prelude::*;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("delivery-metrics").unwrap();
    cmd.env_remove("DELIVERY_METRICS_CONFIG")
        .env_remove("DELIVERY_METRICS_STORAGE_DIR");
    cmd
}

#[test]
fn test_cli_help_flag() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("aggregate"));
}

#[test]
fn test_invalid_command() {
    cli()
        .arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn test_missing_config_fails() {
    let ctx = TestContext::new().unwrap();

    cli()
        .current_dir(ctx.path())
        .arg("aggregate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("config.yml"));
}

#[test]
fn test_config_with_unknown_adapter_fails() {
    let ctx = TestContext::new().unwrap();
    let config = ctx
        .write_config(&[("github", "http://127.0.0.1:9")], &[("r1", "gitlab")])
        .unwrap();

    cli()
        .arg("-c")
        .arg(&config)
        .arg("aggregate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown adapter 'gitlab'"));
}

#[test]
fn test_aggregate_empty_store() {
    let ctx = TestContext::new().unwrap();
    let config = ctx.write_config(&[("github", "http://127.0.0.1:9")], &[]).unwrap();

    cli()
        .arg("--config")
        .arg(&config)
        .args(["aggregate", "--adapter", "GitHub"])
        .assert()
        .success()
        .stdout(predicate::str::contains("github: 0 repositories aggregated"));
}

#[test]
fn test_storage_health_logged_at_startup() {
    let ctx = TestContext::new().unwrap();
    let config = ctx.write_config(&[("github", "http://127.0.0.1:9")], &[]).unwrap();

    cli()
        .arg("-v")
        .arg("-c")
        .arg(&config)
        .arg("aggregate")
        .assert()
        .success()
        .stderr(predicate::str::contains("Storage backend file healthy: true"));
}

#[test]
fn test_config_found_through_environment() {
    let ctx = TestContext::new().unwrap();
    let config = ctx.write_config(&[("github", "http://127.0.0.1:9")], &[]).unwrap();

    cli()
        .env("DELIVERY_METRICS_CONFIG", &config)
        .arg("aggregate")
        .assert()
        .success();
}

// The mock API runs on the runtime's workers while the binary blocks this thread
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_then_report() {
    let api = MockSourceApi::start(repository_routes("r1")).await.unwrap();
    let base = api.base_url();
    let ctx = TestContext::new().unwrap();
    let config = ctx
        .write_config(&[("github", base.as_str())], &[("r1", "github")])
        .unwrap();

    cli()
        .arg("-c")
        .arg(&config)
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Ingested 1 repositories (0 failed)"))
        .stdout(predicate::str::contains("org/r1 - 3 deployments over 3 days"));

    assert!(ctx.storage_dir().join("metrics/github/r1.json").is_file());

    cli()
        .arg("-c")
        .arg(&config)
        .arg("report")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"change_failure_rate\": 0.5"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ingest_failure_exits_nonzero() {
    let api = MockSourceApi::start(repository_routes("r1")).await.unwrap();
    let base = api.base_url();
    let ctx = TestContext::new().unwrap();
    let config = ctx
        .write_config(&[("github", base.as_str())], &[("nope", "github")])
        .unwrap();

    cli()
        .arg("-c")
        .arg(&config)
        .arg("ingest")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Ingested 0 repositories (1 failed)"));
}
