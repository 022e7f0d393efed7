//! Block and transaction handler traits + registry.
//!
//! Handlers run in registration order: every block handler for the block,
//! then, for each transaction in block order, every transaction handler.
//! A handler error is not caught; it ends the engine run.

use async_trait::async_trait;
use std::sync::Arc;

use crate::block::{Block, Round, Transaction};
use crate::error::FollowError;
use crate::format::FormatState;
use crate::node::NodeClient;
use crate::shutdown::StopHandle;

/// What a handler can see of the engine while a block is dispatched.
#[derive(Clone)]
pub struct EngineContext<'a> {
    /// Round of the block being dispatched.
    pub round: Round,
    /// The node client, absent when the engine reads block files only.
    pub node: Option<&'a Arc<dyn NodeClient>>,
    /// The engine's stop flag.
    pub stop: &'a StopHandle,
    /// Raw format support as known so far.
    pub format: FormatState,
}

/// Called once per block.
#[async_trait]
pub trait BlockHandler: Send + Sync {
    async fn handle_block(&self, ctx: &EngineContext<'_>, block: &Block) -> Result<(), FollowError>;

    /// Name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Called once per transaction.
#[async_trait]
pub trait TxnHandler: Send + Sync {
    async fn handle_txn(
        &self,
        ctx: &EngineContext<'_>,
        block: &Block,
        txn: &Transaction<'_>,
    ) -> Result<(), FollowError>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Ordered block and transaction handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    block_handlers: Vec<Arc<dyn BlockHandler>>,
    txn_handlers: Vec<Arc<dyn TxnHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a block handler (called for every block).
    pub fn on_block(&mut self, handler: Arc<dyn BlockHandler>) {
        self.block_handlers.push(handler);
    }

    /// Register a transaction handler (called for every transaction).
    pub fn on_txn(&mut self, handler: Arc<dyn TxnHandler>) {
        self.txn_handlers.push(handler);
    }

    pub fn is_empty(&self) -> bool {
        self.block_handlers.is_empty() && self.txn_handlers.is_empty()
    }

    /// Dispatch a block to all block handlers.
    pub async fn dispatch_block(
        &self,
        ctx: &EngineContext<'_>,
        block: &Block,
    ) -> Result<(), FollowError> {
        for handler in &self.block_handlers {
            handler.handle_block(ctx, block).await?;
        }
        Ok(())
    }

    /// Dispatch each transaction to all transaction handlers; returns how many
    /// transactions the block had.
    pub async fn dispatch_txns(
        &self,
        ctx: &EngineContext<'_>,
        block: &Block,
    ) -> Result<usize, FollowError> {
        let txns = block.transactions();
        if self.txn_handlers.is_empty() {
            return Ok(txns.len());
        }
        for txn in &txns {
            for handler in &self.txn_handlers {
                handler.handle_txn(ctx, block, txn).await?;
            }
        }
        Ok(txns.len())
    }

    /// Block handlers, then transaction handlers.
    pub async fn dispatch(&self, ctx: &EngineContext<'_>, block: &Block) -> Result<usize, FollowError> {
        self.dispatch_block(ctx, block).await?;
        self.dispatch_txns(ctx, block).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::JsonBlock;
    use std::sync::Mutex;

    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl BlockHandler for Recorder {
        async fn handle_block(&self, ctx: &EngineContext<'_>, _b: &Block) -> Result<(), FollowError> {
            self.log.lock().unwrap().push(format!("{}:block:{}", self.tag, ctx.round));
            Ok(())
        }
    }

    #[async_trait]
    impl TxnHandler for Recorder {
        async fn handle_txn(
            &self,
            _ctx: &EngineContext<'_>,
            _b: &Block,
            txn: &Transaction<'_>,
        ) -> Result<(), FollowError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:txn:{}", self.tag, txn.amount().unwrap_or_default()));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl BlockHandler for Failing {
        async fn handle_block(&self, ctx: &EngineContext<'_>, _b: &Block) -> Result<(), FollowError> {
            Err(FollowError::handler("failing", ctx.round, "boom"))
        }
    }

    fn block_with_amounts(amounts: &[u64]) -> Block {
        let txns: Vec<_> = amounts
            .iter()
            .map(|a| serde_json::json!({ "type": "pay", "payment": { "amount": a } }))
            .collect();
        let b: JsonBlock =
            serde_json::from_value(serde_json::json!({ "round": 9, "txns": { "transactions": txns } }))
                .unwrap();
        Block::Json(b)
    }

    fn ctx(stop: &StopHandle) -> EngineContext<'_> {
        EngineContext {
            round: 9,
            node: None,
            stop,
            format: FormatState::Unknown,
        }
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::new(Recorder { tag: "a", log: log.clone() });
        let second = Arc::new(Recorder { tag: "b", log: log.clone() });

        let mut registry = HandlerRegistry::new();
        registry.on_block(first.clone());
        registry.on_block(second.clone());
        registry.on_txn(first);
        registry.on_txn(second);

        let stop = StopHandle::new();
        let n = registry.dispatch(&ctx(&stop), &block_with_amounts(&[1, 2])).await.unwrap();
        assert_eq!(n, 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:block:9", "b:block:9", "a:txn:1", "b:txn:1", "a:txn:2", "b:txn:2"]
        );
    }

    #[tokio::test]
    async fn handler_error_stops_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.on_block(Arc::new(Failing));
        registry.on_txn(Arc::new(Recorder { tag: "a", log: log.clone() }));

        let stop = StopHandle::new();
        let err = registry.dispatch(&ctx(&stop), &block_with_amounts(&[1])).await.unwrap_err();
        assert!(matches!(err, FollowError::Handler { round: 9, .. }));
        assert!(log.lock().unwrap().is_empty());
    }
}
