//! Anti-bot anomaly detection and tracking

pub mod detect;
pub mod tracker;

pub use detect::{BLOCK_KEYWORDS, CHALLENGE_PHRASES, detect, find_block_keyword};
pub use tracker::{AnomalyRecord, AnomalyTracker};
