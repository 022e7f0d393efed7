//! Stock handlers wired up by the command line.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};

use chainfollow_core::{Block, BlockHandler, EngineContext, FollowError, Round, Transaction, TxnHandler};

/// Rounds between progress lines.
const PROGRESS_EVERY: Round = 10;

/// Logs a progress line every few rounds.
#[derive(Default)]
pub struct RoundCounter {
    blocks: AtomicU64,
    txns: AtomicU64,
}

#[async_trait]
impl BlockHandler for RoundCounter {
    async fn handle_block(&self, ctx: &EngineContext<'_>, block: &Block) -> Result<(), FollowError> {
        let blocks = self.blocks.fetch_add(1, Ordering::Relaxed) + 1;
        let txns = self.txns.fetch_add(block.tx_count() as u64, Ordering::Relaxed) + block.tx_count() as u64;
        if ctx.round % PROGRESS_EVERY == 0 {
            tracing::info!(round = ctx.round, blocks, txns, format = %ctx.format, "progress");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "round-counter"
    }
}

/// Prints blocks with transactions as JSON, and a bare round line every few rounds.
pub struct BlockPrinter;

impl BlockPrinter {
    fn render(round: Round, block: &Block) -> Option<String> {
        if block.tx_count() > 0 {
            Some(block.to_json().to_string())
        } else if round % PROGRESS_EVERY == 0 {
            Some(json!({ "round": round }).to_string())
        } else {
            None
        }
    }
}

#[async_trait]
impl BlockHandler for BlockPrinter {
    async fn handle_block(&self, ctx: &EngineContext<'_>, block: &Block) -> Result<(), FollowError> {
        if let Some(line) = Self::render(ctx.round, block) {
            println!("{line}");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "block-printer"
    }
}

/// Prints transactions moving more than `threshold`.
pub struct LargeTransferPrinter {
    pub threshold: u64,
}

impl LargeTransferPrinter {
    pub const DEFAULT_THRESHOLD: u64 = 10_000_000;

    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    fn matches(&self, txn: &Transaction<'_>) -> bool {
        txn.amount().is_some_and(|a| a > self.threshold)
    }
}

#[async_trait]
impl TxnHandler for LargeTransferPrinter {
    async fn handle_txn(
        &self,
        ctx: &EngineContext<'_>,
        _block: &Block,
        txn: &Transaction<'_>,
    ) -> Result<(), FollowError> {
        if self.matches(txn) {
            println!("{}", json!({ "round": ctx.round, "txn": txn.to_json() }));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "large-transfer-printer"
    }
}
