use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use chromiumoxide::{Page, cdp};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use crate::utils::constants::{CHROME_USER_AGENT, CHROME_USER_AGENTS};

/// Minor fingerprint suppression installed on every new document.
///
/// Hides the automation flag, gives the page a plausible plugin list and
/// language set, and masks the WebGL vendor strings most often used by
/// bot-detection scripts.
const FINGERPRINT_SCRIPT: &str = r"
(() => {
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'languages', { get: () => ['zh-CN', 'zh', 'en-US', 'en'] });
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai' },
            { name: 'Native Client', filename: 'internal-nacl-plugin' }
        ]
    });
    if (!window.chrome) { window.chrome = {}; }
    if (!window.chrome.runtime) { window.chrome.runtime = {}; }
    const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
    if (originalQuery) {
        window.navigator.permissions.query = (p) =>
            p && p.name === 'notifications'
                ? Promise.resolve({ state: Notification.permission })
                : originalQuery.call(window.navigator.permissions, p);
    }
    if (window.WebGLRenderingContext) {
        const getParameter = WebGLRenderingContext.prototype.getParameter;
        WebGLRenderingContext.prototype.getParameter = function (param) {
            if (param === 37445) { return 'Intel Inc.'; }
            if (param === 37446) { return 'Intel Iris OpenGL Engine'; }
            return getParameter.call(this, param);
        };
    }
})();
";

/// Pick one of the rotated Chrome user agents.
#[must_use]
pub fn random_user_agent() -> &'static str {
    CHROME_USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(CHROME_USER_AGENT)
}

/// Flags for a small host: one navigation at a time, no background work.
const LAUNCH_ARGS: &[&str] = &[
    "--lang=zh-CN",
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-notifications",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-software-rasterizer",
    "--disable-setuid-sandbox",
    "--no-first-run",
    "--no-default-browser-check",
    "--no-sandbox",
    "--no-zygote",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-component-extensions-with-background-pages",
    "--disable-features=TranslateUI,MediaRouter",
    "--disable-hang-monitor",
    "--disable-prompt-on-repost",
    "--js-flags=--max-old-space-size=256",
    "--password-store=basic",
    "--use-mock-keychain",
    "--hide-scrollbars",
    "--mute-audio",
];

/// Binary names looked up on `PATH` when no well-known install exists.
const PATH_BINARIES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

fn install_locations() -> Vec<PathBuf> {
    let raw: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"%PROGRAMFILES%\Google\Chrome\Application\chrome.exe",
            r"%PROGRAMFILES(X86)%\Google\Chrome\Application\chrome.exe",
            r"%LOCALAPPDATA%\Google\Chrome\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "~/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    };

    raw.iter()
        .filter_map(|entry| match entry.strip_prefix("~/") {
            Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
            None => Some(PathBuf::from(expand_windows_env_vars(entry))),
        })
        .collect()
}

fn search_path_for_browser() -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        PATH_BINARIES.iter().find_map(|name| {
            let candidate = dir.join(name);
            candidate.is_file().then_some(candidate)
        })
    })
}

/// Locate a local Chrome or Chromium.
///
/// `CHROMIUM_PATH` wins when it points at an existing file, then the usual
/// install locations, then `PATH`.
pub async fn find_browser_executable() -> Result<PathBuf> {
    if let Some(configured) = std::env::var_os("CHROMIUM_PATH").map(PathBuf::from) {
        if configured.exists() {
            info!(path = %configured.display(), "Using browser from CHROMIUM_PATH");
            return Ok(configured);
        }
        warn!(path = %configured.display(), "CHROMIUM_PATH does not exist, ignoring");
    }

    if let Some(found) = install_locations().into_iter().find(|p| p.exists()) {
        info!(path = %found.display(), "Found installed browser");
        return Ok(found);
    }

    if let Some(found) = search_path_for_browser() {
        info!(path = %found.display(), "Found browser on PATH");
        return Ok(found);
    }

    warn!("No local Chrome/Chromium found");
    anyhow::bail!("Chrome/Chromium executable not found")
}

/// Expand `%VAR%` tokens; unknown variables are left as written.
fn expand_windows_env_vars(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut rest = path;

    while let Some(open) = rest.find('%') {
        result.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('%') else {
            result.push_str(&rest[open..]);
            return result;
        };

        let name = &after[..close];
        if name.is_empty() {
            result.push('%');
        } else if let Ok(value) = std::env::var(name) {
            result.push_str(&value);
        } else {
            result.push('%');
            result.push_str(name);
            result.push('%');
        }
        rest = &after[close + 1..];
    }

    result.push_str(rest);
    result
}

/// Fetch a managed Chromium into the user cache and return its executable.
pub async fn download_managed_browser() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("kodegen")
        .join("veracity")
        .join("chromium");
    info!(dir = %cache_dir.display(), "Downloading managed Chromium");

    tokio::fs::create_dir_all(&cache_dir)
        .await
        .with_context(|| format!("Failed to create {}", cache_dir.display()))?;

    let options = BrowserFetcherOptions::builder()
        .with_path(&cache_dir)
        .build()
        .context("Failed to build fetcher options")?;
    let installed = BrowserFetcher::new(options)
        .fetch()
        .await
        .context("Failed to fetch browser")?;

    info!(dir = %installed.folder_path.display(), "Managed Chromium ready");
    Ok(installed.executable_path)
}

/// Chrome emits CDP events chromiumoxide does not model; those surface as
/// deserialisation errors on the handler stream and carry no signal.
fn is_benign_handler_error(message: &str) -> bool {
    message.contains("data did not match any variant of untagged enum Message")
        || message.contains("Failed to deserialize WS response")
}

/// Find or download Chrome/Chromium and launch it with an isolated profile.
///
/// The caller owns `user_data_dir` and removes it after the browser exits.
pub async fn launch_browser(
    headless: bool,
    user_data_dir: PathBuf,
    user_agent: &str,
) -> Result<(Browser, JoinHandle<()>)> {
    let executable = match find_browser_executable().await {
        Ok(path) => path,
        Err(_) => download_managed_browser().await?,
    };

    std::fs::create_dir_all(&user_data_dir).context("Failed to create user data directory")?;

    let builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(1366, 900)
        .user_data_dir(user_data_dir)
        .chrome_executable(executable)
        .arg(format!("--user-agent={user_agent}"));
    let builder = if headless {
        builder.headless_mode(HeadlessMode::default())
    } else {
        builder.with_head()
    };
    let browser_config = LAUNCH_ARGS
        .iter()
        .fold(builder, |b, flag| b.arg(*flag))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

    info!(headless, "Launching browser");
    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .context("Failed to launch browser")?;

    let handler_task = task::spawn(async move {
        while let Some(event) = handler.next().await {
            let Err(e) = event else { continue };
            let message = e.to_string();
            if is_benign_handler_error(&message) {
                trace!("Ignoring unmodelled CDP message: {message}");
            } else {
                error!("Browser handler error: {e:?}");
            }
        }
        debug!("Browser handler stream ended");
    });

    Ok((browser, handler_task))
}

/// Install the fingerprint-suppression script so it runs before any page
/// script on every subsequent document.
pub async fn install_fingerprint_suppression(page: &Page) -> Result<()> {
    page.execute(
        cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams {
            source: FINGERPRINT_SCRIPT.to_string(),
            include_command_line_api: None,
            world_name: None,
            run_immediately: None,
        },
    )
    .await
    .context("Failed to install fingerprint suppression")?;

    log::debug!("Fingerprint suppression installed");
    Ok(())
}
