//! Error types for scenario runs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Target application not reachable at {url} after {attempts} attempts")]
    TargetUnreachable { url: String, attempts: usize },

    #[error("Target application failed to start: {0}")]
    TargetStartup(String),

    #[error("Playwright not found. Install with: npm install playwright && npx playwright install chromium")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Driver(String),

    #[error("Browser driver exited unexpectedly")]
    DriverExited,

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Assertion failed on {target}: expected {expected:?}, got {actual:?}")]
    AssertionFailed {
        target: String,
        expected: String,
        actual: String,
    },

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Visual regression: {0}")]
    VisualRegression(String),

    #[error("Screenshot mismatch: {name} differs by {diff_percent:.2}% (threshold: {threshold:.2}%)")]
    ScreenshotMismatch {
        name: String,
        diff_percent: f64,
        threshold: f64,
    },

    #[error("Baseline not found: {0}")]
    BaselineNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl E2eError {
    /// Whether this error came from the page state rather than the harness
    pub fn is_scenario_failure(&self) -> bool {
        matches!(
            self,
            E2eError::AssertionFailed { .. }
                | E2eError::ElementNotFound { .. }
                | E2eError::Timeout(_)
                | E2eError::ScreenshotMismatch { .. }
        )
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
