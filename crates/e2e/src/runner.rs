//! Scenario runner: one browser session per scenario, steps in order,
//! fail-fast, teardown on every exit path

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::driver::{PlaywrightConfig, Session};
use crate::error::{E2eError, E2eResult};
use crate::spec::{Condition, Scenario, Step};
use crate::target::{TargetApp, TargetConfig};
use crate::visual::{VisualConfig, VisualTester};

/// Result of executing a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualDiffResult {
    pub name: String,
    pub matches: bool,
    pub diff_percent: f64,
    pub diff_image_path: Option<PathBuf>,
}

/// Result of running one scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    /// Screenshots written by this run, in capture order
    pub artifacts: Vec<PathBuf>,
    pub visual_diffs: Vec<VisualDiffResult>,
    pub error: Option<String>,
}

impl ScenarioResult {
    fn failed(name: &str, started_at: DateTime<Utc>, error: &E2eError) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            started_at,
            duration_ms: 0,
            steps: vec![],
            artifacts: vec![],
            visual_diffs: vec![],
            error: Some(error.to_string()),
        }
    }
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl SuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Observed value of an attribute the element does not carry
const ABSENT: &str = "<absent>";

/// Something an assertion step observes, polled until it matches
enum Probe<'a> {
    Element {
        selector: &'a str,
        condition: &'a Condition,
    },
    Url(String),
    Title(&'a str),
}

impl Probe<'_> {
    fn target(&self) -> String {
        match self {
            Probe::Element { selector, condition } => match condition {
                Condition::Attribute { name, .. } => format!("{}[{}]", selector, name),
                Condition::Css { property, .. } => format!("{} {{{}}}", selector, property),
                _ => selector.to_string(),
            },
            Probe::Url(_) => "page url".to_string(),
            Probe::Title(_) => "page title".to_string(),
        }
    }

    fn expected(&self) -> String {
        match self {
            Probe::Element { condition, .. } => condition.expected(),
            Probe::Url(url) => url.clone(),
            Probe::Title(title) => title.to_string(),
        }
    }

    fn matches(&self, actual: &str) -> bool {
        match self {
            Probe::Element {
                condition: Condition::Attribute { .. },
                ..
            } if actual == ABSENT => false,
            Probe::Element { condition, .. } => condition.matches(actual),
            _ => actual == self.expected(),
        }
    }

    async fn observe(&self, session: &mut Session) -> E2eResult<String> {
        match self {
            Probe::Element { selector, condition } => match condition {
                Condition::Visible | Condition::Hidden => {
                    let visible = session.is_visible(selector).await?;
                    Ok(if visible { "visible" } else { "hidden" }.to_string())
                }
                Condition::Text { .. } | Condition::ContainsText { .. } => {
                    session.text(selector).await
                }
                Condition::Attribute { name, .. } => {
                    match session.attribute(selector, name).await? {
                        Some(value) => Ok(value),
                        None => Ok(ABSENT.to_string()),
                    }
                }
                Condition::Css { property, .. } => {
                    session.computed_style(selector, property).await
                }
                Condition::Count { .. } => Ok(session.count(selector).await?.to_string()),
            },
            Probe::Url(_) => session.url().await,
            Probe::Title(_) => session.title().await,
        }
    }
}

/// Configuration for the scenario runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Base URL that relative step URLs are resolved against
    pub base_url: String,
    pub playwright: PlaywrightConfig,
    pub target: TargetConfig,
    pub visual: VisualConfig,
    /// Screenshots land in `<screenshot_dir>/<scenario>/<name>.png`
    pub screenshot_dir: PathBuf,
    pub output_dir: PathBuf,
    /// How long assertions keep polling before failing
    pub expect_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_url: crate::scenarios::BASE_URL.to_string(),
            playwright: PlaywrightConfig::default(),
            target: TargetConfig::default(),
            visual: VisualConfig::default(),
            screenshot_dir: PathBuf::from("verification"),
            output_dir: PathBuf::from("test-results"),
            expect_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Executes scenarios, one fresh browser session each
pub struct ScenarioRunner {
    config: RunnerConfig,

    /// Target application handle (if started by this runner)
    target: Option<TargetApp>,
}

impl ScenarioRunner {
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self { config, target: None }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Start (if configured) and wait for the target application
    pub async fn start_target(&mut self) -> E2eResult<()> {
        if self.target.is_some() {
            return Ok(());
        }

        let mut target_config = self.config.target.clone();
        target_config.base_url = self.config.base_url.clone();
        self.target = Some(TargetApp::start(target_config).await?);
        Ok(())
    }

    pub fn stop_target(&mut self) {
        if let Some(mut target) = self.target.take() {
            target.stop();
        }
    }

    /// Resolve a step URL against the base URL
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("file://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", self.config.base_url.trim_end_matches('/'), url)
        } else {
            format!("{}/{}", self.config.base_url.trim_end_matches('/'), url)
        }
    }

    /// Fixed artifact path for a screenshot of a scenario
    pub fn artifact_path(&self, scenario: &str, name: &str) -> PathBuf {
        self.config
            .screenshot_dir
            .join(scenario)
            .join(format!("{}.png", name))
    }

    /// Run scenarios one after another; a failing scenario never stops the
    /// others, but a browser that cannot be launched aborts the suite
    pub async fn run_all(&mut self, scenarios: &[Scenario]) -> E2eResult<SuiteResult> {
        let start = Instant::now();
        self.start_target().await?;

        info!("Running {} scenario(s) against {}", scenarios.len(), self.config.base_url);

        let mut results = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            let started_at = Utc::now();
            let result = match self.run(scenario).await {
                Ok(result) => result,
                Err(e) if e.is_scenario_failure() => {
                    ScenarioResult::failed(&scenario.name, started_at, &e)
                }
                Err(e) => {
                    error!("Could not launch browser for {}: {}", scenario.name, e);
                    return Err(e);
                }
            };

            if result.success {
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        let passed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("Results: {} passed, {} failed ({} ms)", passed, failed, duration_ms);

        Ok(SuiteResult {
            total: results.len(),
            passed,
            failed,
            duration_ms,
            results,
        })
    }

    /// Launch a session for `scenario` and run it to completion
    pub async fn run(&self, scenario: &Scenario) -> E2eResult<ScenarioResult> {
        let mut playwright = self.config.playwright.clone();
        playwright.viewport = scenario.viewport;

        let session = Session::launch(&playwright).await?;
        Ok(self.run_in_session(session, scenario).await)
    }

    /// Run `scenario` in an already launched session, closing it afterwards
    pub async fn run_in_session(&self, mut session: Session, scenario: &Scenario) -> ScenarioResult {
        let started_at = Utc::now();
        let start = Instant::now();
        debug!("Running scenario: {}", scenario.name);

        let mut steps = Vec::with_capacity(scenario.steps.len());
        let mut artifacts = Vec::new();
        let mut scenario_error: Option<String> = None;

        for step in &scenario.steps {
            let step_start = Instant::now();
            let step_name = step.label();
            debug!("Executing step: {}", step_name);

            let outcome = self.execute_step(&mut session, scenario, step).await;
            let duration_ms = step_start.elapsed().as_millis() as u64;

            match outcome {
                Ok(screenshot_path) => {
                    if let Some(path) = &screenshot_path {
                        artifacts.push(path.clone());
                    }
                    steps.push(StepResult {
                        success: true,
                        step_name,
                        duration_ms,
                        error: None,
                        screenshot_path,
                    });
                }
                Err(e) => {
                    if e.is_scenario_failure() {
                        warn!("{}: step {} failed: {}", scenario.name, step_name, e);
                    } else {
                        error!("{}: step {} errored: {}", scenario.name, step_name, e);
                    }
                    scenario_error = Some(format!("{}: {}", step_name, e));
                    steps.push(StepResult {
                        success: false,
                        step_name,
                        duration_ms,
                        error: Some(e.to_string()),
                        screenshot_path: None,
                    });
                    break;
                }
            }
        }

        if let Err(e) = session.close().await {
            warn!("{}: closing browser session failed: {}", scenario.name, e);
            scenario_error.get_or_insert_with(|| format!("teardown: {}", e));
        }

        let mut visual_diffs = Vec::new();
        if scenario.visual_regression && scenario_error.is_none() {
            match self.compare_artifacts(scenario, &artifacts) {
                Ok((diffs, mismatch)) => {
                    visual_diffs = diffs;
                    scenario_error = mismatch;
                }
                Err(e) => scenario_error = Some(format!("Visual comparison error: {}", e)),
            }
        }

        ScenarioResult {
            name: scenario.name.clone(),
            success: scenario_error.is_none(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            steps,
            artifacts,
            visual_diffs,
            error: scenario_error,
        }
    }

    /// Execute one step; returns the screenshot path for screenshot steps
    pub async fn execute_step(
        &self,
        session: &mut Session,
        scenario: &Scenario,
        step: &Step,
    ) -> E2eResult<Option<PathBuf>> {
        match step {
            Step::Navigate { url, wait_until } => {
                session.goto(&self.resolve_url(url), *wait_until).await?;
            }
            Step::WaitForUrl { url } => {
                session.wait_for_url(&self.resolve_url(url)).await?;
            }
            Step::WaitForLoadState { state } => {
                session.wait_for_load_state(*state).await?;
            }
            Step::WaitFor { selector, state } => {
                session.wait_for(selector, *state).await?;
            }
            Step::Fill { selector, value } => {
                session.fill(selector, value).await?;
            }
            Step::Check { selector } => {
                session.check(selector).await?;
            }
            Step::Uncheck { selector } => {
                session.uncheck(selector).await?;
            }
            Step::Click { selector, position } => {
                session.click(selector, *position).await?;
            }
            Step::Evaluate { script } => {
                session.evaluate(script).await?;
            }
            Step::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            Step::Expect { selector, expect } => {
                self.poll(
                    session,
                    Probe::Element {
                        selector,
                        condition: expect,
                    },
                )
                .await?;
            }
            Step::ExpectUrl { url } => {
                self.poll(session, Probe::Url(self.resolve_url(url))).await?;
            }
            Step::ExpectTitle { title } => {
                self.poll(session, Probe::Title(title)).await?;
            }
            Step::Screenshot { name, full_page } => {
                let path = self.artifact_path(&scenario.name, name);
                session.screenshot(&path, *full_page).await?;
                debug!("Screenshot saved: {}", path.display());
                return Ok(Some(path));
            }
            Step::Log { message } => {
                info!("[{}] {}", scenario.name, message);
            }
        }
        Ok(None)
    }

    /// Observe `probe` until it matches or the expect timeout elapses
    async fn poll(&self, session: &mut Session, probe: Probe<'_>) -> E2eResult<()> {
        let deadline = Instant::now() + self.config.expect_timeout;

        loop {
            let last_actual = match probe.observe(session).await {
                Ok(actual) if probe.matches(&actual) => return Ok(()),
                Ok(actual) => Some(actual),
                Err(E2eError::ElementNotFound { .. }) => None,
                Err(e) => return Err(e),
            };

            if Instant::now() >= deadline {
                return Err(match (last_actual, &probe) {
                    (Some(actual), _) => E2eError::AssertionFailed {
                        target: probe.target(),
                        expected: probe.expected(),
                        actual,
                    },
                    (None, Probe::Element { selector, .. }) => E2eError::ElementNotFound {
                        selector: selector.to_string(),
                    },
                    (None, _) => E2eError::Timeout(probe.target()),
                });
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    fn compare_artifacts(
        &self,
        scenario: &Scenario,
        artifacts: &[PathBuf],
    ) -> E2eResult<(Vec<VisualDiffResult>, Option<String>)> {
        let tester = VisualTester::new(self.config.visual.clone())?;
        let mut diffs = Vec::new();
        let mut mismatch = None;

        let threshold = scenario
            .visual_threshold
            .unwrap_or(self.config.visual.threshold);

        for path in artifacts {
            let key = baseline_key(&scenario.name, path);
            match tester.compare(path, &key, Some(threshold)) {
                Ok(diff) => {
                    if !diff.matches && mismatch.is_none() {
                        mismatch = Some(
                            E2eError::ScreenshotMismatch {
                                name: key.clone(),
                                diff_percent: diff.diff_percent,
                                threshold,
                            }
                            .to_string(),
                        );
                    }
                    diffs.push(VisualDiffResult {
                        name: key,
                        matches: diff.matches,
                        diff_percent: diff.diff_percent,
                        diff_image_path: diff.diff_image_path,
                    });
                }
                Err(E2eError::BaselineNotFound(_)) => {
                    info!("No baseline for '{}' - create one with --update-baselines", key);
                }
                Err(e) => return Err(e),
            }
        }

        Ok((diffs, mismatch))
    }

    /// Copy the screenshots of passing scenarios over their baselines
    pub fn update_baselines(&self, results: &SuiteResult) -> E2eResult<usize> {
        let tester = VisualTester::new(self.config.visual.clone())?;
        let mut updated = 0;

        for result in results.results.iter().filter(|r| r.success) {
            for path in &result.artifacts {
                tester.update_baseline(path, &baseline_key(&result.name, path))?;
                updated += 1;
            }
        }

        Ok(updated)
    }

    /// Write results to `<output_dir>/scenario-results.json`
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("scenario-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScenarioRunner {
    fn drop(&mut self) {
        self.stop_target();
    }
}

fn baseline_key(scenario: &str, artifact: &Path) -> String {
    let stem = artifact
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}/{}", scenario, stem)
}
