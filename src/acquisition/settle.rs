//! Post-navigation settle phase.
//!
//! Each step is bounded and best-effort: a failing script is logged and the
//! next step runs. The page is captured whatever state it ends up in.

use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::driver::PageDriver;
use super::page_timeout::with_page_timeout;
use crate::utils::{
    IMAGE_LOAD_TIMEOUT_MS, INTERSTITIAL_WAIT_SECS, MAX_SCROLL_ITERATIONS, SCROLL_STALL_LIMIT,
    SLOW_SITE_DELAY_MS, host_of,
};

/// Page titles shown while a challenge or visitor check redirects.
const INTERSTITIAL_TITLES: &[&str] = &[
    "Just a moment",
    "Sina Visitor System",
    "Attention Required",
    "请稍候",
    "安全验证",
];

/// Hosts whose content renders late enough to need an extra fixed wait.
const SLOW_SITE_HOSTS: &[&str] = &[
    "toutiao.com",
    "zhihu.com",
    "thepaper.cn",
    "sohu.com",
    "163.com",
    "m.weibo.cn",
];

const INTERSTITIAL_POLL: Duration = Duration::from_millis(500);
const SCROLL_PAUSE: Duration = Duration::from_millis(800);
const SCRIPT_TIMEOUT: Duration = Duration::from_secs(5);

const NUDGE_SCROLL_SCRIPT: &str = "window.scrollBy(0, Math.min(800, window.innerHeight)); true";

const SCROLL_STEP_SCRIPT: &str = r"
(() => {
    window.scrollBy(0, window.innerHeight);
    const height = document.documentElement.scrollHeight;
    const bottom = window.scrollY + window.innerHeight >= height - 2;
    return { height, bottom };
})()
";

const SCROLL_TOP_SCRIPT: &str = "window.scrollTo(0, 0); true";

/// Wait for every image to load or time out, recording natural sizes on
/// the element so extraction does not need to refetch.
const IMAGE_WAIT_SCRIPT: &str = r"
(async (timeoutMs) => {
    const images = Array.from(document.images);
    await Promise.all(images.map((img) => new Promise((resolve) => {
        const record = () => {
            if (img.naturalWidth > 0 && img.naturalHeight > 0) {
                img.setAttribute('data-natural-width', String(img.naturalWidth));
                img.setAttribute('data-natural-height', String(img.naturalHeight));
            } else {
                img.setAttribute('data-load-failed', 'true');
            }
            resolve();
        };
        if (img.complete) { record(); return; }
        const timer = setTimeout(resolve, timeoutMs);
        img.addEventListener('load', () => { clearTimeout(timer); record(); }, { once: true });
        img.addEventListener('error', () => {
            clearTimeout(timer);
            img.setAttribute('data-load-failed', 'true');
            resolve();
        }, { once: true });
    })));
    return images.length;
})(__TIMEOUT__)
";

#[derive(Debug, Deserialize)]
struct ScrollStep {
    height: u64,
    bottom: bool,
}

/// Height tracking across scroll steps.
#[derive(Debug, Default)]
struct ScrollProgress {
    last_height: u64,
    stalls: u32,
}

impl ScrollProgress {
    /// Feed one step; true once scrolling should stop.
    fn advance(&mut self, step: &ScrollStep) -> bool {
        if step.height > self.last_height {
            self.last_height = step.height;
            self.stalls = 0;
        } else {
            self.stalls += 1;
        }
        step.bottom || self.stalls >= SCROLL_STALL_LIMIT
    }
}

/// Run the full settle sequence for `url`.
pub async fn settle(page: &dyn PageDriver, url: &str, is_platform: bool) {
    wait_out_interstitial(page).await;

    if is_slow_site(url) {
        debug!("Slow site, waiting {SLOW_SITE_DELAY_MS}ms");
        tokio::time::sleep(Duration::from_millis(SLOW_SITE_DELAY_MS)).await;
    }

    let nudge = page.evaluate(NUDGE_SCROLL_SCRIPT);
    if let Err(e) = with_page_timeout(nudge, SCRIPT_TIMEOUT, "nudge scroll").await {
        debug!("Nudge scroll failed: {e}");
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    if is_platform {
        scroll_until_stable(page).await;
    }

    wait_for_images(page).await;
}

fn is_slow_site(url: &str) -> bool {
    host_of(url).is_some_and(|host| {
        SLOW_SITE_HOSTS
            .iter()
            .any(|s| host == *s || host.ends_with(&format!(".{s}")))
    })
}

fn is_interstitial_title(title: &str) -> bool {
    INTERSTITIAL_TITLES.iter().any(|t| title.contains(t))
}

/// Poll the title while it shows a known interstitial, up to the cap.
async fn wait_out_interstitial(page: &dyn PageDriver) {
    let deadline = Instant::now() + Duration::from_secs(INTERSTITIAL_WAIT_SECS);
    let mut announced = false;

    loop {
        let title = match with_page_timeout(page.title(), SCRIPT_TIMEOUT, "read title").await {
            Ok(title) => title.unwrap_or_default(),
            Err(e) => {
                debug!("Title poll failed: {e}");
                return;
            }
        };

        if !is_interstitial_title(&title) {
            if announced {
                debug!("Interstitial cleared");
            }
            return;
        }

        if !announced {
            debug!("Interstitial page detected ({title}), waiting");
            announced = true;
        }
        if Instant::now() >= deadline {
            warn!("Interstitial did not clear within {INTERSTITIAL_WAIT_SECS}s");
            return;
        }
        tokio::time::sleep(INTERSTITIAL_POLL).await;
    }
}

/// Scroll in viewport steps until the height stops growing.
async fn scroll_until_stable(page: &dyn PageDriver) {
    let mut progress = ScrollProgress::default();

    for iteration in 0..MAX_SCROLL_ITERATIONS {
        let scroll = page.evaluate(SCROLL_STEP_SCRIPT);
        let step = match with_page_timeout(scroll, SCRIPT_TIMEOUT, "scroll step").await {
            Ok(value) => serde_json::from_value::<ScrollStep>(value).ok(),
            Err(e) => {
                debug!("Scroll step failed: {e}");
                None
            }
        };
        let Some(step) = step else {
            break;
        };

        tokio::time::sleep(SCROLL_PAUSE).await;

        if progress.advance(&step) {
            debug!(iteration, height = progress.last_height, "Lazy-load scroll finished");
            break;
        }
    }

    if let Err(e) = page.evaluate(SCROLL_TOP_SCRIPT).await {
        debug!("Scroll reset failed: {e}");
    }
}

async fn wait_for_images(page: &dyn PageDriver) {
    let script = IMAGE_WAIT_SCRIPT.replace("__TIMEOUT__", &IMAGE_LOAD_TIMEOUT_MS.to_string());
    let cap = Duration::from_millis(IMAGE_LOAD_TIMEOUT_MS) + Duration::from_secs(2);

    match with_page_timeout(page.evaluate(&script), cap, "image wait").await {
        Ok(count) => debug!("Image wait finished for {} images", count),
        Err(e) => debug!("Image wait failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_interstitials() {
        assert!(is_interstitial_title("Just a moment..."));
        assert!(is_interstitial_title("Sina Visitor System"));
        assert!(!is_interstitial_title("新华社：今日要闻"));
    }

    #[test]
    fn scrolling_stops_at_bottom_or_after_stalls() {
        let mut progress = ScrollProgress::default();
        assert!(!progress.advance(&ScrollStep { height: 1000, bottom: false }));
        assert!(progress.advance(&ScrollStep { height: 1800, bottom: true }));

        let mut progress = ScrollProgress::default();
        assert!(!progress.advance(&ScrollStep { height: 1000, bottom: false }));
        for _ in 1..SCROLL_STALL_LIMIT {
            assert!(!progress.advance(&ScrollStep { height: 1000, bottom: false }));
        }
        assert!(progress.advance(&ScrollStep { height: 1000, bottom: false }));
    }

    #[test]
    fn slow_sites_by_suffix() {
        assert!(is_slow_site("https://www.toutiao.com/article/1"));
        assert!(is_slow_site("https://news.163.com/a.html"));
        assert!(!is_slow_site("https://example.com/"));
    }
}
