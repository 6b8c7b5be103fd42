//! Page acquisition with stub browser sessions

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{StubLauncher, stub_engine};
use kodegen_tools_veracity::{AcquisitionError, AcquisitionOutcome, AcquisitionRequest, SessionPool};

fn plausible_page() -> String {
    common::create_test_html(
        "新闻",
        &"<p>这是一段足够长的新闻正文，用来让页面看起来正常。</p>".repeat(30),
    )
}

#[tokio::test]
async fn direct_image_skips_the_browser() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let launcher = StubLauncher::serving(plausible_page());
    let launches = Arc::clone(&launcher.launches);
    let (engine, pool, _) = stub_engine(launcher, dir.path()).await?;

    let outcome = engine
        .acquire(&AcquisitionRequest::new("https://example.com/photo.jpg"))
        .await?;

    assert!(matches!(
        outcome,
        AcquisitionOutcome::DirectImage { ref url } if url == "https://example.com/photo.jpg"
    ));
    assert_eq!(launches.load(Ordering::SeqCst), 0);
    assert_eq!(pool.launch_count(), 0);
    Ok(())
}

#[tokio::test]
async fn short_block_page_is_anti_bot_and_recorded() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let mut html = String::from("<html><body><p>请输入验证码</p>");
    while html.len() < 486 {
        html.push_str("<i></i>");
    }
    html.push_str("</body></html>");
    assert!(html.len() >= 490 && html.len() <= 510);

    let (engine, _, anomalies) = stub_engine(StubLauncher::serving(html), dir.path()).await?;
    let url = "https://news.example.com/a/1.html";

    let err = engine
        .acquire(&AcquisitionRequest::new(url))
        .await
        .expect_err("block page must fail");
    assert!(matches!(err, AcquisitionError::AntiBot { .. }));

    let records = anomalies.list().await;
    assert_eq!(records.iter().filter(|r| r.url == url).count(), 1);
    assert!(records[0].has_dump);

    // Same URL again still leaves a single record
    let _ = engine.acquire(&AcquisitionRequest::new(url)).await;
    assert_eq!(anomalies.list().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn plausible_page_is_returned() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let (engine, _, anomalies) =
        stub_engine(StubLauncher::serving(plausible_page()), dir.path()).await?;

    let outcome = engine
        .acquire(&AcquisitionRequest::new("https://news.example.com/a/2.html"))
        .await?;
    let AcquisitionOutcome::Page(page) = outcome else {
        panic!("expected a page");
    };
    assert!(page.html.contains("新闻正文"));
    assert!(!page.is_platform);
    assert!(anomalies.list().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn article_with_captcha_widget_is_not_anti_bot() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let html = common::create_test_html(
        "新闻",
        &format!(
            "<script src=\"https://www.google.com/recaptcha/api.js\"></script>{}\
             <form class=\"comment\"><div class=\"g-recaptcha\"></div></form>",
            "<p>这是一段足够长的新闻正文，用来让页面看起来正常。</p>".repeat(30)
        ),
    );
    let (engine, _, anomalies) = stub_engine(StubLauncher::serving(html), dir.path()).await?;

    let outcome = engine
        .acquire(&AcquisitionRequest::new("https://news.example.com/a/3.html"))
        .await?;
    assert!(matches!(outcome, AcquisitionOutcome::Page(_)));
    assert!(anomalies.list().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn non_html_main_document_is_rejected() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let launcher = StubLauncher::serving(plausible_page()).with_content_type("application/json");
    let (engine, _, _) = stub_engine(launcher, dir.path()).await?;

    let err = engine
        .acquire(&AcquisitionRequest::new("https://api.example.com/data"))
        .await
        .expect_err("json is not a page");
    assert!(matches!(err, AcquisitionError::UnsupportedContentType(ref m) if m == "application/json"));
    Ok(())
}

#[tokio::test]
async fn validation_failures_never_launch() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let launcher = StubLauncher::serving(plausible_page());
    let launches = Arc::clone(&launcher.launches);
    let (engine, _, _) = stub_engine(launcher, dir.path()).await?;

    for url in [
        "https://example.com/setup.exe",
        "https://s.weibo.com/weibo?q=x",
        "not a url",
    ] {
        let err = engine
            .acquire(&AcquisitionRequest::new(url))
            .await
            .expect_err("must be rejected");
        assert!(matches!(err, AcquisitionError::Validation(_)), "{url}");
    }
    assert_eq!(launches.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn attempts_get_distinct_tokens() {
    let a = AcquisitionRequest::new("https://example.com/");
    let b = AcquisitionRequest::new("https://example.com/");
    assert_ne!(a.attempt_id, b.attempt_id);
}

#[tokio::test]
async fn pool_is_single_flight_and_reuses_session() -> anyhow::Result<()> {
    let mut launcher = StubLauncher::serving(plausible_page());
    launcher.launch_delay = Duration::from_millis(50);
    let launches = Arc::clone(&launcher.launches);
    let pool = SessionPool::new(Arc::new(launcher), Duration::from_secs(30));

    let first = pool.acquire().await?;
    let second = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire().await.map(|g| g.id()) })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!second.is_finished(), "second caller must queue");

    let first_id = first.id();
    drop(first);
    let second_id = second.await??;

    assert_eq!(second_id, first_id);
    assert_eq!(launches.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn idle_session_is_torn_down() -> anyhow::Result<()> {
    let launcher = StubLauncher::serving(plausible_page());
    let closes = Arc::clone(&launcher.closes);
    let pool = SessionPool::new(Arc::new(launcher), Duration::from_millis(100));

    drop(pool.acquire().await?);
    assert!(pool.has_idle_session());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!pool.has_idle_session());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn dead_session_is_relaunched() -> anyhow::Result<()> {
    let launcher = StubLauncher::serving(plausible_page());
    let alive = Arc::clone(&launcher.alive);
    let launches = Arc::clone(&launcher.launches);
    let pool = SessionPool::new(Arc::new(launcher), Duration::from_secs(30));

    drop(pool.acquire().await?);
    *alive.lock() = false;
    let guard = pool.acquire().await?;

    assert_eq!(launches.load(Ordering::SeqCst), 2);
    assert_eq!(guard.id(), Some(1));
    Ok(())
}

#[tokio::test]
async fn discarded_session_is_closed_not_cached() -> anyhow::Result<()> {
    let launcher = StubLauncher::serving(plausible_page());
    let closes = Arc::clone(&launcher.closes);
    let pool = SessionPool::new(Arc::new(launcher), Duration::from_secs(30));

    let mut guard = pool.acquire().await?;
    guard.discard();
    drop(guard);

    // The close runs on a spawned task; the next checkout waits for it
    let next = pool.acquire().await?;
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(next.id(), Some(1));
    Ok(())
}

#[tokio::test]
#[ignore = "requires a local Chrome and network access"]
async fn live_chromium_fetch() -> anyhow::Result<()> {
    use kodegen_tools_veracity::{AcquisitionEngine, AnomalyTracker, ChromiumLauncher};

    let dir = common::create_test_dir()?;
    let pool = SessionPool::new(Arc::new(ChromiumLauncher::new(true)), Duration::from_secs(5));
    let anomalies = Arc::new(AnomalyTracker::open(dir.path().join("anomalies")).await?);
    let engine = AcquisitionEngine::new(Arc::clone(&pool), anomalies, common::test_config(dir.path()));

    let outcome = engine
        .acquire(&AcquisitionRequest::new("https://example.com/"))
        .await?;
    let AcquisitionOutcome::Page(page) = outcome else {
        panic!("expected a page");
    };
    assert!(page.html.contains("Example Domain"));
    pool.shutdown().await?;
    Ok(())
}
