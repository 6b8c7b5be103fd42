//! Page acquisition
//!
//! One browser-driven fetch per request through the single-slot
//! [`SessionPool`](crate::browser_pool::SessionPool): pre-checks, resource
//! blocking, bounded navigation and settle, capture, and the anti-bot
//! anomaly check before any markup leaves this module.

pub mod chromium;
pub mod driver;
pub mod engine;
pub mod page_timeout;
pub mod settle;
pub mod types;

pub use chromium::ChromiumLauncher;
pub use driver::{BrowserSession, PageDriver, PageOptions, SessionLauncher};
pub use engine::{ATTEMPT_HEADER, AcquisitionEngine, FetchTarget, classify_request};
pub use types::{
    AcquisitionError, AcquisitionOutcome, AcquisitionRequest, AcquisitionResult, RawPage,
};
