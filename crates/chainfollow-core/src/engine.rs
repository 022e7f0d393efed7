//! The engine loop: recover, fetch, dispatch, record, until stopped.
//!
//! ```text
//! Idle ─run()─▶ Running ─stop flag─▶ Stopping ─▶ Stopped
//!                  │                                ▲
//!                  └──── end of block files / error ┘
//! ```
//!
//! The stop flag is checked only between rounds; a round whose fetch has
//! started is dispatched and recorded before the loop exits. The journal is
//! closed on every exit path.

use serde::{Deserialize, Serialize};

use crate::block::Round;
use crate::error::FollowError;
use crate::fetcher::{BlockFetcher, Fetched};
use crate::handler::{EngineContext, HandlerRegistry};
use crate::journal::ProgressJournal;
use crate::shutdown::StopHandle;

/// Lifecycle state of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Counters for one engine run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub rounds_processed: u64,
    pub txns_dispatched: u64,
    pub gaps_observed: u64,
    pub last_round: Option<Round>,
}

pub struct Engine {
    fetcher: BlockFetcher,
    handlers: HandlerRegistry,
    journal: ProgressJournal,
    stop: StopHandle,
    state: EngineState,
    stats: EngineStats,
}

impl Engine {
    pub fn new(
        fetcher: BlockFetcher,
        handlers: HandlerRegistry,
        journal: ProgressJournal,
        stop: StopHandle,
    ) -> Self {
        Self {
            fetcher,
            handlers,
            journal,
            stop,
            state: EngineState::Idle,
            stats: EngineStats::default(),
        }
    }

    /// Handle for requesting a stop from another task or a handler.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Run until stopped, the block files run out, or a fatal error.
    pub async fn run(&mut self) -> Result<(), FollowError> {
        let last = self.journal.recover();
        self.state = EngineState::Running;
        tracing::info!(?last, "engine starting");

        let result = self.run_inner(last).await;

        self.state = EngineState::Stopped;
        if let Err(e) = self.journal.close() {
            tracing::warn!(error = %e, "failed to close progress journal");
        }
        match &result {
            Ok(()) => tracing::info!(last = ?self.stats.last_round, "engine stopped"),
            Err(e) => tracing::error!(error = %e, last = ?self.stats.last_round, "engine failed"),
        }
        result
    }

    async fn run_inner(&mut self, mut last: Option<Round>) -> Result<(), FollowError> {
        loop {
            if self.stop.is_stopping() {
                self.state = EngineState::Stopping;
                tracing::info!(?last, "stop requested, leaving loop");
                return Ok(());
            }

            let block = match self.fetcher.next(last).await? {
                Fetched::Block(block) => block,
                Fetched::EndOfStream => {
                    tracing::info!(?last, "end of block stream");
                    return Ok(());
                }
                Fetched::Interrupted => {
                    self.state = EngineState::Stopping;
                    return Ok(());
                }
            };

            let round = block.round();
            if let Some(prev) = last {
                if round != prev + 1 {
                    self.stats.gaps_observed += 1;
                    tracing::info!(from = prev, to = round, "round jump");
                }
            }

            let ctx = EngineContext {
                round,
                node: self.fetcher.node(),
                stop: &self.stop,
                format: self.fetcher.format_state(),
            };
            let txns = self.handlers.dispatch(&ctx, &block).await?;
            self.journal.record(round)?;

            self.stats.rounds_processed += 1;
            self.stats.txns_dispatched += txns as u64;
            self.stats.last_round = Some(round);
            tracing::debug!(round, txns, format = %block.format(), "round processed");
            last = Some(round);
        }
    }
}
