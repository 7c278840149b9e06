//! End-to-end bootstrap scenarios over the in-memory fakes.
//!
//! Each test wires `Bootstrap` to a `FakeTransport`, a `FakeProcessRunner`
//! and an output repository, then checks the report or the error together
//! with the side effects the run was allowed to have.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dcx_action_core::fakes::{
    test_config, FakeProcessRunner, FakeTransport, MemoryOutputRepository, ScriptedProcess,
};
use dcx_action_core::{
    Bootstrap, BootstrapError, ErrorCategory, FsOutputRepository, InstallMethod,
    PollOutcome, ScanLocation,
};
use serde_json::json;

const DOWNLOAD_URL: &str = "https://releases.dqx.ai/dcx/download?tag=latest";

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

fn happy_runner() -> FakeProcessRunner {
    FakeProcessRunner::new()
        .on("uv", ScriptedProcess::exit(0))
        .on("dcx", ScriptedProcess::exit(0).stdout("pipeline complete"))
}

#[tokio::test]
async fn test_binary_release_end_to_end() {
    let config = test_config();
    let transport = FakeTransport::new().binary(DOWNLOAD_URL, "application/gzip", b"\x1f\x8b");
    let runner = happy_runner();
    let outputs = MemoryOutputRepository::new()
        .with_dir("/work/scanner/output", "dcx-scan-2024-01-01")
        .with_dir("/work/scanner/output", "dcx-scan-2024-06-15");

    let report = Bootstrap::new(&transport, &runner, &outputs)
        .run(&config)
        .await
        .unwrap();

    assert_eq!(report.install_url, DOWNLOAD_URL);
    assert_eq!(report.install_method, InstallMethod::UvTool);
    assert_eq!(report.pipeline_exit_code, 0);
    assert_eq!(
        report.scan,
        ScanLocation::Found {
            scan_id: "dcx-scan-2024-06-15".to_string(),
            path: PathBuf::from("/work/scanner/output/dcx-scan-2024-06-15"),
        }
    );
    assert_eq!(report.poll, None);
    assert_eq!(report.artifact.bytes, 2);
    assert_eq!(report.artifact.file_name, "dcx-artifact.tar.gz");

    // One fetch with the bearer token, no AI traffic.
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].headers,
        vec![("Authorization".to_string(), "Bearer test-token".to_string())]
    );

    let calls = runner.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].program, "uv");
    assert_eq!(calls[1].to_string(), "dcx full-pipeline /work/repo");
    assert_eq!(calls[1].current_dir.as_deref(), Some(Path::new("/work/scanner")));
}

#[tokio::test]
async fn test_missing_token_fails_before_any_network_call() {
    let transport = FakeTransport::new().binary(DOWNLOAD_URL, "application/gzip", b"\x1f\x8b");
    let runner = happy_runner();
    let outputs = MemoryOutputRepository::new();

    let err = Bootstrap::new(&transport, &runner, &outputs)
        .run_from_lookup(Path::new("/work"), lookup(&[("DCX_TAG", "v1.0.0")]))
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::MissingConfig { ref name } if name == "GITHUB_TOKEN"));
    assert_eq!(err.category(), ErrorCategory::Config);
    assert_eq!(err.exit_code(), 2);
    assert_eq!(transport.request_count(), 0);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_malformed_ai_endpoint_fails_before_any_work() {
    let transport = FakeTransport::new().binary(DOWNLOAD_URL, "application/gzip", b"\x1f\x8b");
    let runner = happy_runner();
    let outputs = MemoryOutputRepository::new();

    let err = Bootstrap::new(&transport, &runner, &outputs)
        .run_from_lookup(
            Path::new("/work"),
            lookup(&[("GITHUB_TOKEN", "t"), ("AI_ENDPOINT", "not a url")]),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::InvalidConfig { ref name, .. } if name == "AI_ENDPOINT"));
    assert_eq!(transport.request_count(), 0);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_lookup_run_uses_loaded_configuration() {
    let transport = FakeTransport::new().binary(
        "https://releases.dqx.ai/dcx/download?tag=v1.0.0",
        "application/gzip",
        b"\x1f\x8b",
    );
    let runner = happy_runner();
    let outputs = MemoryOutputRepository::new();

    let report = Bootstrap::new(&transport, &runner, &outputs)
        .run_from_lookup(
            Path::new("/work"),
            lookup(&[("GITHUB_TOKEN", "ghs_abc"), ("DCX_TAG", "v1.0.0")]),
        )
        .await
        .unwrap();

    assert_eq!(report.install_url, "https://releases.dqx.ai/dcx/download?tag=v1.0.0");
    assert_eq!(
        transport.requests()[0].headers,
        vec![("Authorization".to_string(), "Bearer ghs_abc".to_string())]
    );
}

#[tokio::test]
async fn test_envelope_follow_up_installs_second_body() {
    let config = test_config();
    let asset = "https://releases.dqx.ai/assets/dcx-1.2.0-py3-none-any.whl";
    let transport = FakeTransport::new()
        .json(DOWNLOAD_URL, json!({ "asset_url": asset }))
        .binary(asset, "application/octet-stream", b"PK\x03\x04wheel");
    let runner = happy_runner();
    let outputs = MemoryOutputRepository::new();

    let report = Bootstrap::new(&transport, &runner, &outputs)
        .run(&config)
        .await
        .unwrap();

    assert_eq!(report.artifact.source_url, asset);
    assert_eq!(report.artifact.file_name, "dcx-1.2.0-py3-none-any.whl");
    assert_eq!(report.artifact.bytes, 9);
    assert_eq!(report.scan, ScanLocation::NotFound);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].url, asset);
    // Same origin, so the token follows.
    assert_eq!(requests[1].headers.len(), 1);

    let install = &runner.calls()[0];
    assert!(install.args[2].ends_with("dcx-1.2.0-py3-none-any.whl"));
}

#[tokio::test]
async fn test_envelope_on_foreign_host_drops_token() {
    let config = test_config();
    let asset = "https://objects.example-cdn.com/dcx-1.2.0.tar.gz";
    let transport = FakeTransport::new()
        .json(DOWNLOAD_URL, json!({ "asset_url": asset }))
        .binary(asset, "application/gzip", b"\x1f\x8b");
    let runner = happy_runner();
    let outputs = MemoryOutputRepository::new();

    Bootstrap::new(&transport, &runner, &outputs)
        .run(&config)
        .await
        .unwrap();

    let requests = transport.requests();
    assert_eq!(requests[1].url, asset);
    assert!(requests[1].headers.is_empty());
}

#[tokio::test]
async fn test_envelope_downgrade_to_http_drops_token() {
    let config = test_config();
    let asset = "http://releases.dqx.ai/assets/dcx-1.0.0-py3-none-any.whl";
    let transport = FakeTransport::new()
        .json(DOWNLOAD_URL, json!({ "asset_url": asset }))
        .binary(asset, "application/octet-stream", b"PK");
    let runner = happy_runner();
    let outputs = MemoryOutputRepository::new();

    Bootstrap::new(&transport, &runner, &outputs)
        .run(&config)
        .await
        .unwrap();

    let requests = transport.requests();
    assert_eq!(requests[1].url, asset);
    assert!(requests[1].headers.is_empty());
}

#[tokio::test]
async fn test_envelope_on_other_port_drops_token() {
    let config = test_config();
    let asset = "https://releases.dqx.ai:8443/assets/dcx-1.0.0-py3-none-any.whl";
    let transport = FakeTransport::new()
        .json(DOWNLOAD_URL, json!({ "asset_url": asset }))
        .binary(asset, "application/octet-stream", b"PK");
    let runner = happy_runner();
    let outputs = MemoryOutputRepository::new();

    Bootstrap::new(&transport, &runner, &outputs)
        .run(&config)
        .await
        .unwrap();

    assert!(transport.requests()[1].headers.is_empty());
}

#[tokio::test]
async fn test_release_listing_envelope_selects_matching_asset() {
    let config = test_config();
    let wheel = "https://releases.dqx.ai/assets/dcx-2.0.1-py3-none-any.whl";
    let transport = FakeTransport::new()
        .json(
            DOWNLOAD_URL,
            json!({
                "tag_name": "v2.0.1",
                "assets": [
                    { "browser_download_url": "https://releases.dqx.ai/assets/checksums.txt" },
                    { "browser_download_url": wheel }
                ]
            }),
        )
        .binary(wheel, "application/octet-stream", b"PK");
    let runner = happy_runner();
    let outputs = MemoryOutputRepository::new();

    let report = Bootstrap::new(&transport, &runner, &outputs)
        .run(&config)
        .await
        .unwrap();

    assert_eq!(report.artifact.source_url, wheel);
}

#[tokio::test]
async fn test_envelope_without_asset_url_never_installs() {
    let config = test_config();
    let transport = FakeTransport::new().json(DOWNLOAD_URL, json!({ "version": "1.2.0" }));
    let runner = happy_runner();
    let outputs = MemoryOutputRepository::new();

    let err = Bootstrap::new(&transport, &runner, &outputs)
        .run(&config)
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::BadEnvelope(_)));
    assert_eq!(err.exit_code(), 4);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_http_error_is_network_failure() {
    let config = test_config();
    let transport = FakeTransport::new().status(DOWNLOAD_URL, 404, b"tag not found");
    let runner = happy_runner();
    let outputs = MemoryOutputRepository::new();

    let err = Bootstrap::new(&transport, &runner, &outputs)
        .run(&config)
        .await
        .unwrap_err();

    match &err {
        BootstrapError::HttpStatus {
            status, snippet, ..
        } => {
            assert_eq!(*status, 404);
            assert_eq!(snippet, "tag not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.exit_code(), 3);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_installer_fallback_then_pipeline() {
    let config = test_config();
    let transport = FakeTransport::new().binary(DOWNLOAD_URL, "application/gzip", b"\x1f\x8b");
    let runner = FakeProcessRunner::new()
        .on("uv", ScriptedProcess::not_found())
        .on("python3", ScriptedProcess::exit(0))
        .on("dcx", ScriptedProcess::exit(0));
    let outputs = MemoryOutputRepository::new();

    let report = Bootstrap::new(&transport, &runner, &outputs)
        .run(&config)
        .await
        .unwrap();

    assert_eq!(report.install_method, InstallMethod::PipUser);
    assert_eq!(runner.calls_to("python3"), 1);
    assert_eq!(runner.calls_to("dcx"), 1);
}

#[tokio::test]
async fn test_pip_install_without_uv_runs_through_python() {
    let config = test_config();
    let transport = FakeTransport::new().binary(DOWNLOAD_URL, "application/gzip", b"\x1f\x8b");
    let runner = FakeProcessRunner::new()
        .on("uv", ScriptedProcess::not_found())
        .on("python3", ScriptedProcess::exit(0))
        .on("dcx", ScriptedProcess::not_found());
    let outputs = MemoryOutputRepository::new();

    let report = Bootstrap::new(&transport, &runner, &outputs)
        .run(&config)
        .await
        .unwrap();

    assert_eq!(report.install_method, InstallMethod::PipUser);
    assert_eq!(report.pipeline_exit_code, 0);
    let calls = runner.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[3].to_string(), "python3 -m dcx full-pipeline /work/repo");
    assert_eq!(runner.calls_to("uv"), 1);
}

#[tokio::test]
async fn test_install_failure_stops_before_pipeline() {
    let config = test_config();
    let transport = FakeTransport::new().binary(DOWNLOAD_URL, "application/gzip", b"\x1f\x8b");
    let runner = FakeProcessRunner::new()
        .on("uv", ScriptedProcess::exit(1))
        .on("python3", ScriptedProcess::exit(1).stderr("externally-managed-environment"));
    let outputs = MemoryOutputRepository::new();

    let err = Bootstrap::new(&transport, &runner, &outputs)
        .run(&config)
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Install);
    assert_eq!(runner.calls_to("dcx"), 0);
}

#[tokio::test]
async fn test_poll_timeout_is_reported_not_raised() {
    let mut config = test_config();
    config.ai_endpoint = Some("https://ai.example.com/status".to_string());
    let transport = FakeTransport::new()
        .binary(DOWNLOAD_URL, "application/gzip", b"\x1f\x8b")
        .json("https://ai.example.com/status", json!({ "status": "running" }));
    let runner = happy_runner();
    let outputs = MemoryOutputRepository::new();

    let report = Bootstrap::new(&transport, &runner, &outputs)
        .run(&config)
        .await
        .unwrap();

    assert_eq!(
        report.poll,
        Some(PollOutcome::TimedOut {
            attempts: config.max_checks
        })
    );
    // One fetch plus one request per check.
    assert_eq!(transport.request_count(), 1 + config.max_checks as usize);
}

#[tokio::test]
async fn test_filesystem_output_is_located() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("output");
    std::fs::create_dir_all(output.join("dcx-scan-20240101T000000")).unwrap();
    std::fs::create_dir_all(output.join("dcx-scan-20240615T120000")).unwrap();

    let mut config = test_config();
    config.scanner_dir = dir.path().to_path_buf();
    let transport = FakeTransport::new().binary(DOWNLOAD_URL, "application/gzip", b"\x1f\x8b");
    let runner = happy_runner();

    let report = Bootstrap::new(&transport, &runner, &FsOutputRepository)
        .run(&config)
        .await
        .unwrap();

    assert_eq!(report.scan.scan_id(), Some("dcx-scan-20240615T120000"));
    assert_eq!(runner.calls()[1].current_dir.as_deref(), Some(dir.path()));
}
