use anyhow::Result;
use axum::{extract::State, http::Uri, Router};
use rampart::{
    config::{Config, Mode, PacingConfig, Scenario, Target},
    profile::{RampProfile, RampStage},
    thresholds::ThresholdPolicy,
};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio_util::sync::CancellationToken;

type SeenUris = Arc<Mutex<Vec<String>>>;

/// Mock articles service: answers 200 "ok" on every route after ~50ms,
/// recording each request URI for path assertions.
async fn articles_stub(State(seen): State<SeenUris>, uri: Uri) -> &'static str {
    seen.lock().unwrap().push(uri.to_string());
    tokio::time::sleep(Duration::from_millis(50)).await;
    "ok"
}

async fn spawn_target() -> Result<(SocketAddr, SeenUris)> {
    let seen: SeenUris = Arc::new(Mutex::new(vec![]));
    let app = Router::new()
        .fallback(articles_stub)
        .with_state(Arc::clone(&seen));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock target crashed");
    });

    Ok((addr, seen))
}

fn test_config(addr: SocketAddr, mode: Mode) -> Result<Config> {
    let config = Config {
        target: Target {
            base_url: format!("http://{addr}"),
            mode,
        },
        profile: RampProfile {
            stages: vec![RampStage {
                duration: Duration::from_secs(2),
                target: 3,
            }],
            grace_period: Duration::from_secs(2),
        },
        pacing: PacingConfig {
            min_secs: 0.0,
            max_secs: 0.1,
        },
        thresholds: ThresholdPolicy {
            http_req_duration: vec!["p(95)<2000".parse()?],
            http_req_failed: vec!["rate<0.01".parse()?],
            checks: vec!["rate>0.99".parse()?],
            errors: vec![],
        },
        scenarios: vec![
            Scenario {
                name: "HomePage".to_string(),
                path: "/".to_string(),
                max_duration_ms: 1000,
            },
            Scenario {
                name: "FilterByDate".to_string(),
                path: "/?date=2025-10-29".to_string(),
                max_duration_ms: 1000,
            },
        ],
        debug_level: None,
    };
    config.validate()?;
    Ok(config)
}

#[tokio::test]
async fn a_healthy_target_yields_a_clean_passing_run() -> Result<()> {
    let (addr, _) = spawn_target().await?;
    let config = test_config(addr, Mode::Async)?;

    let report = rampart::run(&config, None, CancellationToken::new()).await?;

    assert!(report.passed());
    assert!(report.stats.sample_count() > 0);
    assert_eq!(report.stats.failed_rate(), Some(0.0));
    assert_eq!(report.stats.checks_rate(), Some(1.0));
    assert!(report.verdicts.iter().all(|v| v.passed));
    Ok(())
}

#[tokio::test]
async fn async_mode_targets_the_base_url_directly() -> Result<()> {
    let (addr, seen) = spawn_target().await?;
    let config = test_config(addr, Mode::Async)?;

    rampart::run(&config, None, CancellationToken::new()).await?;

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.iter().any(|uri| uri == "/"));
    assert!(seen.iter().any(|uri| uri == "/?date=2025-10-29"));
    assert!(seen.iter().all(|uri| !uri.starts_with("/sync")));
    Ok(())
}

#[tokio::test]
async fn sync_mode_prefixes_every_request_path() -> Result<()> {
    let (addr, seen) = spawn_target().await?;
    let config = test_config(addr, Mode::Sync)?;

    rampart::run(&config, None, CancellationToken::new()).await?;

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.iter().any(|uri| uri == "/sync/"));
    assert!(seen.iter().any(|uri| uri == "/sync/?date=2025-10-29"));
    assert!(seen.iter().all(|uri| uri.starts_with("/sync/")));
    Ok(())
}

#[tokio::test]
async fn the_output_sink_persists_one_record_per_request() -> Result<()> {
    let (addr, _) = spawn_target().await?;
    let config = test_config(addr, Mode::Async)?;
    let out = std::env::temp_dir().join(format!("rampart-run-{}.json", std::process::id()));

    let report = rampart::run(&config, Some(&out), CancellationToken::new()).await?;

    let contents = std::fs::read_to_string(&out)?;
    let lines = contents.lines().collect::<Vec<_>>();
    assert_eq!(lines.len() as u64, report.stats.sample_count());

    for line in lines {
        let record: serde_json::Value = serde_json::from_str(line)?;
        assert_eq!(record["status"], 200);
        assert_eq!(record["failed"], false);
        let scenario = record["scenario"].as_str().unwrap();
        assert!(scenario == "HomePage" || scenario == "FilterByDate");
    }

    std::fs::remove_file(&out)?;
    Ok(())
}

#[tokio::test]
async fn a_breached_threshold_fails_the_run_verdict() -> Result<()> {
    let (addr, _) = spawn_target().await?;
    let mut config = test_config(addr, Mode::Async)?;
    // the stub takes ~50ms, so a 10ms ceiling must breach
    config.thresholds.http_req_duration = vec!["p(50)<10".parse()?];

    let report = rampart::run(&config, None, CancellationToken::new()).await?;

    assert!(!report.passed());
    let duration_verdict = report
        .verdicts
        .iter()
        .find(|v| v.metric == "http_req_duration")
        .unwrap();
    assert!(!duration_verdict.passed);
    assert!(duration_verdict.observed.unwrap() >= 10.0);
    Ok(())
}
