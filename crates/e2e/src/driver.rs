//! Playwright browser session
//!
//! Each [`Session`] owns one Node.js process hosting Playwright with exactly
//! one browser, context and page. Commands are sent as JSON lines on the
//! driver's stdin and answered in order on its stdout:
//!
//! ```text
//! -> {"id":1,"op":"goto","url":"http://localhost:3001/","waitUntil":"load"}
//! <- {"id":1,"ok":true,"value":null}
//! -> {"id":2,"op":"text","selector":"#missing"}
//! <- {"id":2,"ok":false,"kind":"not_found","error":"#missing"}
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, Command as TokioCommand};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::spec::{LoadState, Position, Viewport, WaitState};

/// Environment variable carrying the launch options to the driver script
pub const DRIVER_OPTS_ENV: &str = "CMS_E2E_DRIVER_OPTS";

const DRIVER_JS: &str = r#"
const readline = require('readline');

const opts = JSON.parse(process.env.CMS_E2E_DRIVER_OPTS || '{}');
const send = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');

function notFound(selector) {
  const err = new Error(selector);
  err.kind = 'not_found';
  return err;
}

async function first(page, selector) {
  const locator = page.locator(selector);
  if ((await locator.count()) === 0) throw notFound(selector);
  return locator.first();
}

async function handle(page, cmd) {
  switch (cmd.op) {
    case 'goto': await page.goto(cmd.url, { waitUntil: cmd.waitUntil }); return null;
    case 'waitForUrl': await page.waitForURL(cmd.url); return null;
    case 'waitForLoadState': await page.waitForLoadState(cmd.state); return null;
    case 'waitFor': await page.locator(cmd.selector).first().waitFor({ state: cmd.state }); return null;
    case 'fill': await page.locator(cmd.selector).fill(cmd.value); return null;
    case 'check': await page.locator(cmd.selector).check(); return null;
    case 'uncheck': await page.locator(cmd.selector).uncheck(); return null;
    case 'click': await page.locator(cmd.selector).click(cmd.position ? { position: cmd.position } : {}); return null;
    case 'evaluate': { const v = await page.evaluate(cmd.script); return v === undefined ? null : v; }
    case 'visible': return await page.locator(cmd.selector).first().isVisible();
    case 'text': return await (await first(page, cmd.selector)).textContent();
    case 'attribute': return await (await first(page, cmd.selector)).getAttribute(cmd.name);
    case 'css': return await (await first(page, cmd.selector)).evaluate((el, p) => getComputedStyle(el).getPropertyValue(p), cmd.property);
    case 'count': return await page.locator(cmd.selector).count();
    case 'url': return page.url();
    case 'title': return await page.title();
    case 'screenshot': await page.screenshot({ path: cmd.path, fullPage: cmd.fullPage }); return null;
    case 'close': return null;
    default: throw new Error('unknown op: ' + cmd.op);
  }
}

(async () => {
  const playwright = require('playwright');
  const browser = await playwright[opts.browser || 'chromium'].launch({ headless: opts.headless !== false });
  try {
    const context = await browser.newContext({ viewport: opts.viewport });
    if (opts.timeoutMs) context.setDefaultTimeout(opts.timeoutMs);
    const page = await context.newPage();
    send({ id: 0, ok: true, value: 'ready' });

    const rl = readline.createInterface({ input: process.stdin });
    for await (const line of rl) {
      if (!line.trim()) continue;
      const cmd = JSON.parse(line);
      try {
        send({ id: cmd.id, ok: true, value: await handle(page, cmd) });
      } catch (err) {
        const kind = err.kind || (err.name === 'TimeoutError' ? 'timeout' : 'driver');
        send({ id: cmd.id, ok: false, kind, error: err.message });
      }
      if (cmd.op === 'close') break;
    }
  } finally {
    await browser.close();
  }
})().catch((err) => {
  send({ id: 0, ok: false, kind: 'driver', error: err.message });
  process.exit(1);
});
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chromium" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(format!("unknown browser: {}", other)),
        }
    }
}

/// Configuration for launching a Playwright session
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    /// Node executable
    pub node: PathBuf,
    /// Working directory of the driver; `playwright` must resolve from here
    pub driver_dir: PathBuf,
    pub browser: Browser,
    pub headless: bool,
    pub viewport: Viewport,
    /// Overrides Playwright's default action/navigation timeout
    pub timeout_ms: Option<u64>,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            node: PathBuf::from("node"),
            driver_dir: PathBuf::from("."),
            browser: Browser::Chromium,
            headless: true,
            viewport: Viewport::default(),
            timeout_ms: None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DriverOptions {
    browser: Browser,
    headless: bool,
    viewport: Viewport,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
}

/// A request to the driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Command {
    #[serde(rename_all = "camelCase")]
    Goto { url: String, wait_until: String },
    WaitForUrl { url: String },
    WaitForLoadState { state: String },
    WaitFor { selector: String, state: String },
    Fill { selector: String, value: String },
    Check { selector: String },
    Uncheck { selector: String },
    Click {
        selector: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        position: Option<Position>,
    },
    Evaluate { script: String },
    Visible { selector: String },
    Text { selector: String },
    Attribute { selector: String, name: String },
    Css { selector: String, property: String },
    Count { selector: String },
    Url,
    Title,
    #[serde(rename_all = "camelCase")]
    Screenshot { path: String, full_page: bool },
    Close,
}

impl Command {
    fn selector(&self) -> Option<&str> {
        match self {
            Command::WaitFor { selector, .. }
            | Command::Fill { selector, .. }
            | Command::Check { selector }
            | Command::Uncheck { selector }
            | Command::Click { selector, .. }
            | Command::Visible { selector }
            | Command::Text { selector }
            | Command::Attribute { selector, .. }
            | Command::Css { selector, .. }
            | Command::Count { selector } => Some(selector),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Reply {
    pub fn ok(id: u64, value: Value) -> Self {
        Self { id, ok: true, value, kind: None, error: None }
    }

    pub fn err(id: u64, kind: &str, error: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            value: Value::Null,
            kind: Some(kind.to_string()),
            error: Some(error.into()),
        }
    }
}

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One browser + page, owned by a single scenario run
pub struct Session {
    child: Option<Child>,
    writer: BoxedWriter,
    lines: Lines<BufReader<BoxedReader>>,
    next_id: u64,
    closed: bool,
}

impl Session {
    /// Spawn the Node driver and wait until the page is ready
    pub async fn launch(config: &PlaywrightConfig) -> E2eResult<Self> {
        let options = serde_json::to_string(&DriverOptions {
            browser: config.browser,
            headless: config.headless,
            viewport: config.viewport,
            timeout_ms: config.timeout_ms,
        })?;

        debug!(
            "Launching {} via {} in {}",
            config.browser.as_str(),
            config.node.display(),
            config.driver_dir.display()
        );

        let mut child = TokioCommand::new(&config.node)
            .arg("-e")
            .arg(DRIVER_JS)
            .env(DRIVER_OPTS_ENV, options)
            .current_dir(&config.driver_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    E2eError::PlaywrightNotFound
                } else {
                    E2eError::Driver(format!("failed to spawn {}: {}", config.node.display(), e))
                }
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Driver("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Driver("driver stdout unavailable".to_string()))?;

        let mut session = Self::from_transport(Box::new(stdout), Box::new(stdin)).await.map_err(
            |e| match e {
                E2eError::Driver(msg) if msg.contains("Cannot find module") => {
                    E2eError::PlaywrightNotFound
                }
                other => other,
            },
        )?;
        session.child = Some(child);

        info!("Browser session started ({})", config.browser.as_str());
        Ok(session)
    }

    /// Attach to an already running driver and wait for its ready line
    pub async fn from_transport(reader: BoxedReader, writer: BoxedWriter) -> E2eResult<Self> {
        let mut session = Self {
            child: None,
            writer,
            lines: BufReader::new(reader).lines(),
            next_id: 1,
            closed: false,
        };

        let ready = session.read_reply().await?;
        if !ready.ok {
            return Err(E2eError::Driver(
                ready.error.unwrap_or_else(|| "driver failed to start".to_string()),
            ));
        }
        Ok(session)
    }

    async fn read_reply(&mut self) -> E2eResult<Reply> {
        loop {
            let line = self.lines.next_line().await?.ok_or(E2eError::DriverExited)?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Reply>(&line) {
                Ok(reply) => return Ok(reply),
                Err(_) => debug!("[driver] {}", line),
            }
        }
    }

    /// Send one command and wait for its reply
    pub async fn call(&mut self, command: Command) -> E2eResult<Value> {
        if self.closed {
            return Err(E2eError::Driver("session already closed".to_string()));
        }

        let id = self.next_id;
        self.next_id += 1;

        let selector = command.selector().map(str::to_string);
        let mut line = serde_json::to_string(&Request { id, command })?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;

        let reply = loop {
            let reply = self.read_reply().await?;
            if reply.id == id {
                break reply;
            }
            warn!("Discarding stale driver reply {} (waiting for {})", reply.id, id);
        };

        if reply.ok {
            return Ok(reply.value);
        }

        let message = reply.error.unwrap_or_default();
        Err(match reply.kind.as_deref() {
            Some("timeout") => E2eError::Timeout(message),
            Some("not_found") => E2eError::ElementNotFound {
                selector: selector.unwrap_or(message),
            },
            _ => E2eError::Driver(message),
        })
    }

    pub async fn goto(&mut self, url: &str, wait_until: LoadState) -> E2eResult<()> {
        self.call(Command::Goto {
            url: url.to_string(),
            wait_until: wait_until.as_str().to_string(),
        })
        .await
        .map(drop)
    }

    pub async fn wait_for_url(&mut self, url: &str) -> E2eResult<()> {
        self.call(Command::WaitForUrl { url: url.to_string() }).await.map(drop)
    }

    pub async fn wait_for_load_state(&mut self, state: LoadState) -> E2eResult<()> {
        self.call(Command::WaitForLoadState {
            state: state.as_str().to_string(),
        })
        .await
        .map(drop)
    }

    pub async fn wait_for(&mut self, selector: &str, state: WaitState) -> E2eResult<()> {
        self.call(Command::WaitFor {
            selector: selector.to_string(),
            state: state.as_str().to_string(),
        })
        .await
        .map(drop)
    }

    pub async fn fill(&mut self, selector: &str, value: &str) -> E2eResult<()> {
        self.call(Command::Fill {
            selector: selector.to_string(),
            value: value.to_string(),
        })
        .await
        .map(drop)
    }

    pub async fn check(&mut self, selector: &str) -> E2eResult<()> {
        self.call(Command::Check { selector: selector.to_string() }).await.map(drop)
    }

    pub async fn uncheck(&mut self, selector: &str) -> E2eResult<()> {
        self.call(Command::Uncheck { selector: selector.to_string() }).await.map(drop)
    }

    pub async fn click(&mut self, selector: &str, position: Option<Position>) -> E2eResult<()> {
        self.call(Command::Click {
            selector: selector.to_string(),
            position,
        })
        .await
        .map(drop)
    }

    pub async fn evaluate(&mut self, script: &str) -> E2eResult<Value> {
        self.call(Command::Evaluate { script: script.to_string() }).await
    }

    pub async fn is_visible(&mut self, selector: &str) -> E2eResult<bool> {
        let value = self.call(Command::Visible { selector: selector.to_string() }).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub async fn text(&mut self, selector: &str) -> E2eResult<String> {
        let value = self.call(Command::Text { selector: selector.to_string() }).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// `None` when the element exists but has no such attribute
    pub async fn attribute(&mut self, selector: &str, name: &str) -> E2eResult<Option<String>> {
        let value = self
            .call(Command::Attribute {
                selector: selector.to_string(),
                name: name.to_string(),
            })
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    pub async fn computed_style(&mut self, selector: &str, property: &str) -> E2eResult<String> {
        let value = self
            .call(Command::Css {
                selector: selector.to_string(),
                property: property.to_string(),
            })
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn count(&mut self, selector: &str) -> E2eResult<usize> {
        let value = self.call(Command::Count { selector: selector.to_string() }).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    pub async fn url(&mut self) -> E2eResult<String> {
        let value = self.call(Command::Url).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn title(&mut self) -> E2eResult<String> {
        let value = self.call(Command::Title).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Write a PNG screenshot, creating parent directories as needed
    pub async fn screenshot(&mut self, path: &Path, full_page: bool) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.call(Command::Screenshot {
            path: path.to_string_lossy().into_owned(),
            full_page,
        })
        .await
        .map(drop)
    }

    /// Close the browser and wait for the driver to exit
    pub async fn close(mut self) -> E2eResult<()> {
        let result = self.call(Command::Close).await.map(drop);
        self.closed = true;

        if let Some(mut child) = self.child.take() {
            let _ = self.writer.shutdown().await;
            match child.wait().await {
                Ok(status) if !status.success() => {
                    warn!("Browser driver exited with {}", status);
                }
                Ok(_) => debug!("Browser driver exited"),
                Err(e) => warn!("Failed to wait for browser driver: {}", e),
            }
        }

        result
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            if let Some(child) = self.child.as_mut() {
                warn!("Browser session dropped without close; killing driver");
                let _ = child.start_kill();
            }
        }
    }
}
