//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::format::FormatPreference;
use crate::journal::DEFAULT_ROTATE_AFTER;
use crate::retry::RetryConfig;

/// Configuration for an engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowerConfig {
    /// Where processed rounds are journaled; `None` = no persistence.
    pub progress_file: Option<PathBuf>,
    /// Raw or JSON blocks.
    pub format: FormatPreference,
    /// Retry policy for fetching the next block.
    pub retry: RetryConfig,
    /// Journal appends before the file is rotated.
    pub journal_rotate_after: u64,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            progress_file: None,
            format: FormatPreference::Json,
            retry: RetryConfig::default(),
            journal_rotate_after: DEFAULT_ROTATE_AFTER,
        }
    }
}
