//! Block fetcher: obtains the block after the last processed round.
//!
//! One attempt walks a small step machine:
//!
//! ```text
//! last = None     → Tip ──────────────┐
//! last = Some(r)  → Direct(r+1) ─fail─┤
//!                      │ ok           ▼
//!                      ▼           Wait(r) ── tip == r+1 ──▶ Fetch(tip)
//!                   block             │
//!                                     └─ tip > r+1 ─▶ CatchUp(r+1) ─fail─▶ Fetch(tip)
//!                                                        │ ok
//!                                                        ▼
//!                                                      block
//! ```
//!
//! `Direct` and `CatchUp` are fast paths: their failures are swallowed. A
//! failure in `Tip`, `Wait` or `Fetch` fails the attempt, and the whole
//! attempt is retried up to the configured bound for transient errors.

use std::sync::Arc;

use crate::block::{Block, Round};
use crate::error::FollowError;
use crate::format::{FormatNegotiator, FormatState};
use crate::node::NodeClient;
use crate::normalize::{normalize, WireBlock};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::shutdown::StopHandle;
use crate::source::FileSource;

/// Result of a successful `next()` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Block(Block),
    /// The block files are used up.
    EndOfStream,
    /// A stop was requested while retrying.
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Tip,
    Direct { last: Round },
    Wait { last: Round },
    CatchUp { last: Round, tip: Round },
    Fetch { round: Round },
}

pub struct BlockFetcher {
    node: Option<Arc<dyn NodeClient>>,
    files: Option<FileSource>,
    negotiator: FormatNegotiator,
    retry: RetryPolicy,
    stop: StopHandle,
}

impl BlockFetcher {
    pub fn new(
        node: Option<Arc<dyn NodeClient>>,
        files: Option<FileSource>,
        negotiator: FormatNegotiator,
        retry: RetryConfig,
        stop: StopHandle,
    ) -> Result<Self, FollowError> {
        if node.is_none() && files.is_none() {
            return Err(FollowError::Config(
                "no block source: configure a node client or block files".into(),
            ));
        }
        Ok(Self {
            node,
            files,
            negotiator,
            retry: RetryPolicy::new(retry),
            stop,
        })
    }

    pub fn node(&self) -> Option<&Arc<dyn NodeClient>> {
        self.node.as_ref()
    }

    pub fn format_state(&self) -> FormatState {
        self.negotiator.state()
    }

    /// Fetch the block following `last`, retrying transient failures.
    pub async fn next(&mut self, last: Option<Round>) -> Result<Fetched, FollowError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match self.next_once(last).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };
            match self.retry.next_delay(attempt) {
                Some(delay) => {
                    tracing::warn!(
                        ?last,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "error fetching next block (retrying)"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if self.stop.is_stopping() {
                        tracing::info!(?last, "stop requested while retrying fetch");
                        return Ok(Fetched::Interrupted);
                    }
                }
                None => {
                    return Err(FollowError::FetchExhausted {
                        attempts: attempt,
                        source: Box::new(err),
                    })
                }
            }
        }
    }

    async fn next_once(&mut self, last: Option<Round>) -> Result<Fetched, FollowError> {
        if let Some(files) = self.files.as_mut() {
            return Ok(match files.next_block().await? {
                Some(block) => Fetched::Block(block),
                None => Fetched::EndOfStream,
            });
        }
        let node = self.node_client()?;

        let mut step = match last {
            None => Step::Tip,
            Some(last) => Step::Direct { last },
        };
        loop {
            step = match step {
                Step::Tip => {
                    let tip = node.current_round().await?;
                    tracing::debug!(tip, "no previous round, starting at node tip");
                    Step::Wait { last: tip }
                }
                Step::Direct { last } => match self.block(&node, last + 1).await {
                    Ok(block) => return Ok(Fetched::Block(block)),
                    Err(e) => {
                        tracing::debug!(round = last + 1, error = %e, "direct fetch failed, waiting for next round");
                        Step::Wait { last }
                    }
                },
                Step::Wait { last } => {
                    let tip = node.wait_for_round_after(last).await?;
                    if tip > last + 1 {
                        Step::CatchUp { last, tip }
                    } else {
                        Step::Fetch { round: tip }
                    }
                }
                // tried once even when a stop is pending
                Step::CatchUp { last, tip } => match self.block(&node, last + 1).await {
                    Ok(block) => return Ok(Fetched::Block(block)),
                    Err(e) => {
                        tracing::info!(from = last, to = tip, error = %e, "round jump");
                        Step::Fetch { round: tip }
                    }
                },
                Step::Fetch { round } => return self.block(&node, round).await.map(Fetched::Block),
            };
        }
    }

    /// Fetch one round in the negotiated format.
    async fn block(&mut self, node: &Arc<dyn NodeClient>, round: Round) -> Result<Block, FollowError> {
        if self.negotiator.wants_raw() {
            let resp = node.block_raw(round).await?;
            match self.negotiator.observe(&resp.content_type) {
                Ok(()) => return normalize(WireBlock::Raw(resp.body)),
                Err(e) if e.is_unsupported_format() => {}
                Err(e) => return Err(e),
            }
        }
        let info = node.block_info(round).await?;
        normalize(WireBlock::Json(info))
    }

    fn node_client(&self) -> Result<Arc<dyn NodeClient>, FollowError> {
        self.node
            .clone()
            .ok_or_else(|| FollowError::Config("no node client configured".into()))
    }
}
