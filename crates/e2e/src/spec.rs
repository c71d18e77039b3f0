//! Scenario definitions
//!
//! A [`Scenario`] is an ordered list of [`Step`]s executed against a single
//! browser session. Built-in scenarios are constructed in Rust (see
//! [`crate::scenarios`]); additional ones can be loaded from YAML files with
//! the same schema.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{E2eError, E2eResult};

/// A complete verification scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name, also used as the screenshot sub-directory
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    /// Viewport size for the browser
    #[serde(default)]
    pub viewport: Viewport,

    /// Steps to execute in order
    pub steps: Vec<Step>,

    /// Compare screenshots against stored baselines
    #[serde(default)]
    pub visual_regression: bool,

    /// Threshold for visual diff (0.0 - 100.0 percent); the runner's
    /// configured threshold applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_threshold: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// A single step in a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate to a URL (relative to the base URL) and wait for the load signal
    Navigate {
        url: String,
        #[serde(default)]
        wait_until: LoadState,
    },

    /// Wait until the page URL equals `url`
    WaitForUrl { url: String },

    /// Wait for a page load state
    WaitForLoadState { state: LoadState },

    /// Wait for an element to reach a state
    WaitFor {
        selector: String,
        #[serde(default)]
        state: WaitState,
    },

    /// Fill an input field
    Fill { selector: String, value: String },

    /// Check a checkbox
    Check { selector: String },

    /// Uncheck a checkbox
    Uncheck { selector: String },

    /// Click an element, optionally at an offset from its top-left corner
    Click {
        selector: String,
        #[serde(default)]
        position: Option<Position>,
    },

    /// Evaluate a script expression in the page
    Evaluate { script: String },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep { ms: u64 },

    /// Assert a condition on the first element matching `selector`
    Expect { selector: String, expect: Condition },

    /// Assert the current page URL
    ExpectUrl { url: String },

    /// Assert the page title
    ExpectTitle { title: String },

    /// Capture a screenshot artifact
    Screenshot {
        name: String,
        #[serde(default = "default_full_page")]
        full_page: bool,
    },

    /// Log a message
    Log { message: String },
}

fn default_full_page() -> bool {
    true
}

impl Step {
    /// Short label used in logs and results
    pub fn label(&self) -> String {
        match self {
            Step::Navigate { url, .. } => format!("navigate:{}", url),
            Step::WaitForUrl { url } => format!("wait_for_url:{}", url),
            Step::WaitForLoadState { state } => format!("wait_for_load_state:{}", state.as_str()),
            Step::WaitFor { selector, state } => format!("wait_for:{}:{}", selector, state.as_str()),
            Step::Fill { selector, .. } => format!("fill:{}", selector),
            Step::Check { selector } => format!("check:{}", selector),
            Step::Uncheck { selector } => format!("uncheck:{}", selector),
            Step::Click { selector, .. } => format!("click:{}", selector),
            Step::Evaluate { .. } => "evaluate".to_string(),
            Step::Sleep { ms } => format!("sleep:{}ms", ms),
            Step::Expect { selector, expect } => format!("expect:{}:{}", selector, expect.kind()),
            Step::ExpectUrl { url } => format!("expect_url:{}", url),
            Step::ExpectTitle { .. } => "expect_title".to_string(),
            Step::Screenshot { name, .. } => format!("screenshot:{}", name),
            Step::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
        }
    }
}

/// Page load signal to wait for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    Load,
    DomContentLoaded,
    NetworkIdle,
}

impl LoadState {
    /// Playwright's name for the state
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

/// Click offset relative to the element's top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Condition checked by [`Step::Expect`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "is", rename_all = "snake_case")]
pub enum Condition {
    Visible,
    Hidden,
    /// Text content equals `text` after whitespace normalisation
    Text { text: String },
    ContainsText { text: String },
    Attribute { name: String, value: String },
    /// Computed style property equals `value` exactly
    Css { property: String, value: String },
    Count { count: usize },
}

impl Condition {
    pub fn kind(&self) -> &'static str {
        match self {
            Condition::Visible => "visible",
            Condition::Hidden => "hidden",
            Condition::Text { .. } => "text",
            Condition::ContainsText { .. } => "contains_text",
            Condition::Attribute { .. } => "attribute",
            Condition::Css { .. } => "css",
            Condition::Count { .. } => "count",
        }
    }

    /// The expected observation, in the same form the runner observes it
    pub fn expected(&self) -> String {
        match self {
            Condition::Visible => "visible".to_string(),
            Condition::Hidden => "hidden".to_string(),
            Condition::Text { text } | Condition::ContainsText { text } => text.clone(),
            Condition::Attribute { value, .. } | Condition::Css { value, .. } => value.clone(),
            Condition::Count { count } => count.to_string(),
        }
    }

    /// Check an observed value against this condition
    pub fn matches(&self, actual: &str) -> bool {
        match self {
            Condition::Text { text } => normalize_whitespace(actual) == normalize_whitespace(text),
            Condition::ContainsText { text } => {
                normalize_whitespace(actual).contains(&normalize_whitespace(text))
            }
            _ => actual == self.expected(),
        }
    }
}

/// Collapse runs of whitespace and trim, like Playwright's text matchers
pub fn normalize_whitespace(text: &str) -> String {
    static WS: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let ws = WS.get_or_init(|| regex::Regex::new(r"\s+").expect("static regex"));
    ws.replace_all(text.trim(), " ").into_owned()
}

impl Scenario {
    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory, sorted by name
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut scenarios = Vec::new();

        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry.map_err(|e| {
                E2eError::SpecParse(format!("cannot read scenario directory {}: {}", dir.display(), e))
            })?;
            let is_yaml = entry
                .path()
                .extension()
                .map(|ext| ext == "yaml" || ext == "yml")
                .unwrap_or(false);
            if is_yaml && entry.file_type().is_file() {
                scenarios.push(Self::from_file(entry.path())?);
            }
        }

        scenarios.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(scenarios)
    }

    /// Screenshot names must be usable as file stems and unique per scenario
    pub fn validate(&self) -> E2eResult<()> {
        if self.name.is_empty() || !is_file_stem(&self.name) {
            return Err(E2eError::SpecParse(format!(
                "invalid scenario name: {:?}",
                self.name
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for name in self.screenshot_names() {
            if !is_file_stem(name) {
                return Err(E2eError::SpecParse(format!(
                    "{}: invalid screenshot name {:?}",
                    self.name, name
                )));
            }
            if !seen.insert(name) {
                return Err(E2eError::SpecParse(format!(
                    "{}: duplicate screenshot name {:?}",
                    self.name, name
                )));
            }
        }
        Ok(())
    }

    /// Names of the screenshots this scenario captures, in order
    pub fn screenshot_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|step| match step {
            Step::Screenshot { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

fn is_file_stem(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
