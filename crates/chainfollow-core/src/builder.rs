//! Fluent builder API for creating engines.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chainfollow_core::{EngineBuilder, FormatPreference, MemoryNode};
//!
//! let engine = EngineBuilder::new()
//!     .node(Arc::new(MemoryNode::new()))
//!     .progress_file("progress.log")
//!     .format(FormatPreference::Raw)
//!     .retries(5)
//!     .build()
//!     .unwrap();
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::FollowerConfig;
use crate::engine::Engine;
use crate::error::FollowError;
use crate::fetcher::BlockFetcher;
use crate::format::{FormatNegotiator, FormatPreference};
use crate::handler::{BlockHandler, HandlerRegistry, TxnHandler};
use crate::journal::ProgressJournal;
use crate::node::NodeClient;
use crate::retry::RetryConfig;
use crate::shutdown::StopHandle;
use crate::source::FileSource;

/// Fluent builder for [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    config: FollowerConfig,
    node: Option<Arc<dyn NodeClient>>,
    block_files: Option<Vec<PathBuf>>,
    handlers: HandlerRegistry,
    stop: Option<StopHandle>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: FollowerConfig) -> Self {
        self.config = config;
        self
    }

    /// Node client to follow.
    pub fn node(mut self, node: Arc<dyn NodeClient>) -> Self {
        self.node = Some(node);
        self
    }

    /// Read blocks from these files, in this order, instead of polling the node.
    pub fn block_files(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
        self.block_files = Some(files.into_iter().collect());
        self
    }

    pub fn progress_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.progress_file = Some(path.into());
        self
    }

    pub fn format(mut self, format: FormatPreference) -> Self {
        self.config.format = format;
        self
    }

    /// Attempts per fetch, keeping the configured backoff.
    pub fn retries(mut self, max_attempts: u32) -> Self {
        self.config.retry.max_attempts = max_attempts;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn journal_rotate_after(mut self, writes: u64) -> Self {
        self.config.journal_rotate_after = writes;
        self
    }

    /// Register a block handler; handlers run in registration order.
    pub fn on_block(mut self, handler: Arc<dyn BlockHandler>) -> Self {
        self.handlers.on_block(handler);
        self
    }

    /// Register a transaction handler; handlers run in registration order.
    pub fn on_txn(mut self, handler: Arc<dyn TxnHandler>) -> Self {
        self.handlers.on_txn(handler);
        self
    }

    /// Share an existing stop handle instead of creating a new one.
    pub fn stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn build(self) -> Result<Engine, FollowError> {
        if self.config.retry.max_attempts == 0 {
            return Err(FollowError::Config("retry max_attempts must be at least 1".into()));
        }
        let stop = self.stop.unwrap_or_default();
        let fetcher = BlockFetcher::new(
            self.node,
            self.block_files.map(FileSource::new),
            FormatNegotiator::new(self.config.format),
            self.config.retry.clone(),
            stop.clone(),
        )?;
        let journal = ProgressJournal::new(
            self.config.progress_file.clone(),
            self.config.journal_rotate_after,
        );
        Ok(Engine::new(fetcher, self.handlers, journal, stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::MemoryNode;

    #[test]
    fn builder_requires_a_source() {
        assert!(matches!(EngineBuilder::new().build(), Err(FollowError::Config(_))));
    }

    #[test]
    fn builder_rejects_zero_retries() {
        let result = EngineBuilder::new()
            .node(Arc::new(MemoryNode::new()))
            .retries(0)
            .build();
        assert!(matches!(result, Err(FollowError::Config(_))));
    }

    #[test]
    fn builder_shares_stop_handle() {
        let stop = StopHandle::new();
        let engine = EngineBuilder::new()
            .block_files(Vec::new())
            .stop_handle(stop.clone())
            .build()
            .unwrap();
        stop.request_stop();
        assert!(engine.stop_handle().is_stopping());
    }
}
