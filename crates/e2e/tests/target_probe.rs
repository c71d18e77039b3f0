use std::time::Duration;

use axum::response::Redirect;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use cms_e2e::driver::PlaywrightConfig;
use cms_e2e::scenarios;
use cms_e2e::target::{wait_until_ready, TargetApp, TargetConfig};
use cms_e2e::{E2eError, RunnerConfig, ScenarioRunner};

/// Minimal stand-in for the CMS: `/admin.html` redirects to the login page
async fn spawn_fixture() -> String {
    let app = Router::new()
        .route("/", get(|| async { "<html><body><div class=\"parallax-bg\"></div></body></html>" }))
        .route("/admin.html", get(|| async { Redirect::to("/login.html") }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn probe_succeeds_once_server_answers() {
    let base_url = spawn_fixture().await;
    let attempts = wait_until_ready(&base_url, Duration::from_secs(5)).await.unwrap();
    assert!(attempts >= 1);
}

#[tokio::test]
async fn redirect_counts_as_ready() {
    let base_url = spawn_fixture().await;
    let admin = format!("{}/admin.html", base_url);
    wait_until_ready(&admin, Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn probe_gives_up_after_timeout() {
    let port = unused_port().await;
    let url = format!("http://127.0.0.1:{}", port);

    let err = wait_until_ready(&url, Duration::from_millis(300)).await.unwrap_err();
    match err {
        E2eError::TargetUnreachable { url: reported, attempts } => {
            assert_eq!(reported, url);
            assert!(attempts >= 2);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn external_target_is_not_managed() {
    let base_url = spawn_fixture().await;
    let target = TargetApp::start(TargetConfig {
        base_url: base_url.clone(),
        command: None,
        startup_timeout: Duration::from_secs(5),
    })
    .await
    .unwrap();

    assert_eq!(target.base_url(), base_url);
    assert!(!target.is_managed());
}

#[tokio::test]
async fn missing_serve_binary_fails_startup() {
    let result = TargetApp::start(TargetConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        command: Some(vec!["/nonexistent/cms-server".to_string()]),
        startup_timeout: Duration::from_millis(100),
    })
    .await;

    assert!(matches!(result, Err(E2eError::TargetStartup(_))));
}

#[tokio::test]
async fn browser_launch_failure_aborts_the_suite() {
    let base_url = spawn_fixture().await;
    let out = tempfile::tempdir().unwrap();
    let mut runner = ScenarioRunner::with_config(RunnerConfig {
        base_url,
        playwright: PlaywrightConfig {
            node: "/nonexistent/node".into(),
            ..Default::default()
        },
        screenshot_dir: out.path().join("verification"),
        output_dir: out.path().join("results"),
        ..Default::default()
    });

    let err = runner
        .run_all(&[scenarios::page_snapshots(), scenarios::popup_dismiss()])
        .await
        .unwrap_err();
    assert!(matches!(err, E2eError::PlaywrightNotFound), "{}", err);
    assert!(!err.is_scenario_failure());
}
