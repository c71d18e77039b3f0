//! cms-e2e - run the CMS verification scenarios
//!
//! Examples:
//!   cms-e2e                       # every built-in scenario
//!   cms-e2e login popup_dismiss   # selected scenarios
//!   cms-e2e --list

use std::path::PathBuf;
use std::time::Duration;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cms_e2e::driver::{Browser, PlaywrightConfig};
use cms_e2e::scenarios::{self, Credentials};
use cms_e2e::spec::Viewport;
use cms_e2e::target::TargetConfig;
use cms_e2e::visual::VisualConfig;
use cms_e2e::{E2eError, E2eResult, RunnerConfig, Scenario, ScenarioRunner};

#[derive(Parser, Debug)]
#[command(name = "cms-e2e")]
#[command(about = "Browser verification scenarios for the CMS")]
struct Args {
    /// Scenarios to run (default: all)
    scenarios: Vec<String>,

    /// List scenarios and exit
    #[arg(long)]
    list: bool,

    /// Only run scenarios with this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Directory with additional YAML scenarios
    #[arg(long)]
    specs: Option<PathBuf>,

    /// Base URL of the application under test
    #[arg(long, env = "CMS_E2E_BASE_URL", default_value = scenarios::BASE_URL)]
    base_url: String,

    #[arg(long, env = "ADMIN_USERNAME", default_value = scenarios::ADMIN_USERNAME)]
    username: String,

    #[arg(long, env = "ADMIN_PASSWORD", default_value = scenarios::ADMIN_PASSWORD, hide_env_values = true)]
    password: String,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long, default_value = "chromium")]
    browser: Browser,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    #[arg(long, default_value = "1280")]
    viewport_width: u32,

    #[arg(long, default_value = "720")]
    viewport_height: u32,

    /// Directory the node driver runs in (must resolve `playwright`)
    #[arg(long, default_value = ".")]
    driver_dir: PathBuf,

    /// Screenshot directory
    #[arg(long, default_value = "verification")]
    screenshots: PathBuf,

    /// Baseline directory for visual comparison
    #[arg(long, default_value = "test-results/baselines")]
    baselines: PathBuf,

    /// Copy screenshots of passing scenarios over their baselines
    #[arg(long)]
    update_baselines: bool,

    /// Visual diff threshold (percentage) for scenarios that set none
    #[arg(long, default_value = "0.5")]
    visual_threshold: f64,

    /// Output directory for results
    #[arg(short, long, default_value = "test-results")]
    output: PathBuf,

    /// Command that starts the application, e.g. `--serve node --serve server.js`
    #[arg(long)]
    serve: Vec<String>,

    /// Seconds to wait for the application to answer
    #[arg(long, default_value = "30")]
    startup_timeout_secs: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> E2eResult<bool> {
    let credentials = Credentials {
        username: args.username.clone(),
        password: args.password.clone(),
    };

    let mut available = scenarios::builtin(&credentials);
    if let Some(dir) = &args.specs {
        let extra = Scenario::load_all(dir)?;
        info!("Loaded {} scenario(s) from {}", extra.len(), dir.display());
        available.extend(extra);
    }

    if args.list {
        for scenario in &available {
            println!("{:<24} {}", scenario.name, scenario.description);
        }
        return Ok(true);
    }

    let selected = select(available, &args.scenarios, args.tag.as_deref())?;
    if selected.is_empty() {
        warn!("No scenarios selected");
        return Ok(true);
    }

    let viewport = Viewport {
        width: args.viewport_width,
        height: args.viewport_height,
    };
    let selected: Vec<Scenario> = selected
        .into_iter()
        .map(|mut s| {
            if s.viewport == Viewport::default() {
                s.viewport = viewport;
            }
            s
        })
        .collect();

    let config = RunnerConfig {
        base_url: args.base_url.clone(),
        playwright: PlaywrightConfig {
            driver_dir: args.driver_dir,
            browser: args.browser,
            headless: !args.headed,
            viewport,
            ..Default::default()
        },
        target: TargetConfig {
            base_url: args.base_url,
            command: (!args.serve.is_empty()).then_some(args.serve),
            startup_timeout: Duration::from_secs(args.startup_timeout_secs),
        },
        visual: VisualConfig {
            baseline_dir: args.baselines,
            threshold: args.visual_threshold,
            ..Default::default()
        },
        screenshot_dir: args.screenshots,
        output_dir: args.output,
        ..Default::default()
    };

    let mut runner = ScenarioRunner::with_config(config);
    let results = runner.run_all(&selected).await?;

    if args.update_baselines {
        let updated = runner.update_baselines(&results)?;
        info!("Updated {} baseline(s)", updated);
    }

    runner.write_results(&results)?;
    Ok(results.success())
}

/// Pick scenarios by name (in the order given) or by tag
fn select(available: Vec<Scenario>, names: &[String], tag: Option<&str>) -> E2eResult<Vec<Scenario>> {
    let by_tag: Vec<Scenario> = match tag {
        Some(tag) => available.into_iter().filter(|s| s.has_tag(tag)).collect(),
        None => available,
    };

    if names.is_empty() {
        return Ok(by_tag);
    }

    names
        .iter()
        .map(|name| {
            by_tag
                .iter()
                .find(|s| &s.name == name)
                .cloned()
                .ok_or_else(|| E2eError::SpecParse(format!("Scenario not found: {}", name)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["cms-e2e"]).unwrap();
        assert!(args.scenarios.is_empty());
        assert_eq!(args.browser, Browser::Chromium);
        assert_eq!(args.screenshots, PathBuf::from("verification"));
        assert!(args.serve.is_empty());
    }

    #[test]
    fn test_select_keeps_requested_order() {
        let available = scenarios::builtin(&Credentials::default());
        let names = vec!["logout".to_string(), "login".to_string()];
        let selected = select(available, &names, None).unwrap();
        let got: Vec<_> = selected.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(got, ["logout", "login"]);
    }

    #[test]
    fn test_select_unknown_name_fails() {
        let available = scenarios::builtin(&Credentials::default());
        let names = vec!["nope".to_string()];
        assert!(select(available, &names, None).is_err());
    }

    #[test]
    fn test_select_by_tag() {
        let available = scenarios::builtin(&Credentials::default());
        let selected = select(available, &[], Some("auth")).unwrap();
        assert!(selected.iter().all(|s| s.has_tag("auth")));
        assert!(selected.iter().any(|s| s.name == "login"));
    }
}
