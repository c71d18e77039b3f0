//! CMS verification scenarios
//!
//! Browser-driven checks for the content-management site: the admin login,
//! content editing, and the public page with its popup and parallax
//! background. Each scenario:
//! - owns one Playwright browser session for its whole run
//! - executes its steps strictly in order and stops at the first failure
//! - writes full-page screenshots to fixed paths for review
//! - always closes the browser, on success and on failure
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   cms-e2e (Rust process)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner                                             │
//! │    ├── start_target() -> TargetApp (probe / spawn)          │
//! │    ├── run(scenario) -> ScenarioResult                      │
//! │    │     Session::launch ─ steps ─ Session::close           │
//! │    └── compare artifacts with baselines (optional)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Session  ──JSON lines──▶  node driver (Playwright)          │
//! │           ◀─────────────   one browser, one page            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod driver;
pub mod error;
pub mod runner;
pub mod scenarios;
pub mod spec;
pub mod target;
pub mod visual;

pub use error::{E2eError, E2eResult};
pub use runner::{RunnerConfig, ScenarioResult, ScenarioRunner, SuiteResult};
pub use scenarios::Credentials;
pub use spec::{Condition, Scenario, Step};
