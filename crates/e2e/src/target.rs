//! Target application - readiness probing and optional spawning

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

/// Handle to the application under test
pub struct TargetApp {
    /// Present only when this process spawned the application
    child: Option<Child>,
    base_url: String,
}

impl TargetApp {
    /// Spawn the application if a command is configured, then wait until it answers
    pub async fn start(config: TargetConfig) -> E2eResult<Self> {
        let child = match &config.command {
            Some(command) => Some(spawn(command, &config.base_url)?),
            None => None,
        };

        let mut target = TargetApp {
            child,
            base_url: config.base_url,
        };

        if let Err(e) = wait_until_ready(&target.base_url, config.startup_timeout).await {
            target.stop();
            return Err(e);
        }

        info!("Target application is up at {}", target.base_url);
        Ok(target)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_managed(&self) -> bool {
        self.child.is_some()
    }

    /// Stop the application if we started it
    pub fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        info!("Stopping target application (pid: {})", child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        let _ = child.kill();
        let _ = child.wait();
    }
}

impl Drop for TargetApp {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn(command: &[String], base_url: &str) -> E2eResult<Child> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| E2eError::TargetStartup("empty command".to_string()))?;

    let mut cmd = Command::new(program);
    cmd.args(args).stdout(Stdio::null()).stderr(Stdio::inherit());

    if let Some(port) = port_of(base_url) {
        cmd.env("PORT", port.to_string());
    }

    info!("Spawning target application: {}", command.join(" "));
    cmd.spawn()
        .map_err(|e| E2eError::TargetStartup(format!("failed to spawn {}: {}", program, e)))
}

fn port_of(base_url: &str) -> Option<u16> {
    reqwest::Url::parse(base_url).ok()?.port_or_known_default()
}

/// Poll `base_url` until any HTTP response arrives
pub async fn wait_until_ready(base_url: &str, timeout: Duration) -> E2eResult<usize> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    let start = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;

        match client.get(base_url).send().await {
            Ok(resp) => {
                if resp.status().is_server_error() {
                    warn!("Target answered {} - continuing anyway", resp.status());
                }
                return Ok(attempts);
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for target application at {}...", base_url);
                }
                // Connection refused is expected while the app is starting
                if !e.is_connect() {
                    warn!("Readiness probe error: {}", e);
                }
            }
        }

        if start.elapsed() >= timeout {
            return Err(E2eError::TargetUnreachable {
                url: base_url.to_string(),
                attempts,
            });
        }
        sleep(Duration::from_millis(100)).await;
    }
}

/// Configuration for reaching the target application
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub base_url: String,

    /// Command that starts the application (None = already running)
    pub command: Option<Vec<String>>,

    pub startup_timeout: Duration,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: crate::scenarios::BASE_URL.to_string(),
            command: None,
            startup_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_of() {
        assert_eq!(port_of("http://localhost:3001"), Some(3001));
        assert_eq!(port_of("http://localhost/"), Some(80));
        assert_eq!(port_of("not a url"), None);
    }

    #[test]
    fn test_empty_command_rejected() {
        let err = spawn(&[], "http://localhost:3001").unwrap_err();
        assert!(matches!(err, E2eError::TargetStartup(_)));
    }
}
