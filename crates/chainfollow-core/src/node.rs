//! The node client contract, plus an in-memory node for tests and replays.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::block::Round;
use crate::error::FollowError;
use crate::normalize::{JSON_CONTENT_TYPE, RAW_BLOCK_CONTENT_TYPE};

/// Body of a raw-block request together with the content type the node chose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Operations the engine needs from a node.
///
/// Transport failures must be reported as [`FollowError::Transport`] or
/// [`FollowError::Timeout`] so the fetcher can retry them.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// The node's current last round.
    async fn current_round(&self) -> Result<Round, FollowError>;

    /// Request the raw format for `round`; the node may answer with JSON instead.
    async fn block_raw(&self, round: Round) -> Result<RawResponse, FollowError>;

    /// The block-info JSON document for `round`.
    async fn block_info(&self, round: Round) -> Result<JsonValue, FollowError>;

    /// Long-poll until the chain passes `round`; returns the new last round.
    async fn wait_for_round_after(&self, round: Round) -> Result<Round, FollowError>;

    /// Identifier for logs (URL or name).
    fn name(&self) -> &str;
}

// ─── In-memory node ───────────────────────────────────────────────────────────

/// Per-operation call counters of a [`MemoryNode`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeCalls {
    pub status: u32,
    pub raw: u32,
    pub info: u32,
    pub wait: u32,
}

impl NodeCalls {
    pub fn total(&self) -> u32 {
        self.status + self.raw + self.info + self.wait
    }
}

#[derive(Default)]
struct MemoryNodeState {
    tip: Round,
    json_blocks: BTreeMap<Round, JsonValue>,
    raw_blocks: BTreeMap<Round, Vec<u8>>,
    raw_content_type: Option<String>,
    fail_next: u32,
    calls: NodeCalls,
}

/// Scripted in-memory node.
///
/// `wait_for_round_after` returns immediately with the tip when the tip is
/// past the requested round and times out otherwise. Raw requests answer with
/// the raw block when one was pushed for the round, and with block-info JSON
/// otherwise, unless a content type is forced.
#[derive(Default)]
pub struct MemoryNode {
    state: Mutex<MemoryNodeState>,
}

impl MemoryNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block-info document; the tip follows the highest round pushed.
    pub fn push_json_block(&self, block: JsonValue) {
        let round = block["round"].as_u64().unwrap_or_default();
        let mut s = self.lock();
        s.json_blocks.insert(round, block);
        s.tip = s.tip.max(round);
    }

    /// Add a raw block envelope for `round`.
    pub fn push_raw_block(&self, round: Round, bytes: Vec<u8>) {
        let mut s = self.lock();
        s.raw_blocks.insert(round, bytes);
        s.tip = s.tip.max(round);
    }

    pub fn set_tip(&self, tip: Round) {
        self.lock().tip = tip;
    }

    /// Forget a block, as a node does once it is out of its cache.
    pub fn drop_block(&self, round: Round) {
        let mut s = self.lock();
        s.json_blocks.remove(&round);
        s.raw_blocks.remove(&round);
    }

    /// Answer every raw request with this content type.
    pub fn force_raw_content_type(&self, content_type: impl Into<String>) {
        self.lock().raw_content_type = Some(content_type.into());
    }

    /// Make the next `n` calls fail with a transport error.
    pub fn fail_next(&self, n: u32) {
        self.lock().fail_next = n;
    }

    pub fn calls(&self) -> NodeCalls {
        self.lock().calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryNodeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn injected_failure(s: &mut MemoryNodeState) -> Result<(), FollowError> {
        if s.fail_next > 0 {
            s.fail_next -= 1;
            return Err(FollowError::Transport("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeClient for MemoryNode {
    async fn current_round(&self) -> Result<Round, FollowError> {
        let mut s = self.lock();
        s.calls.status += 1;
        Self::injected_failure(&mut s)?;
        Ok(s.tip)
    }

    async fn block_raw(&self, round: Round) -> Result<RawResponse, FollowError> {
        let mut s = self.lock();
        s.calls.raw += 1;
        Self::injected_failure(&mut s)?;

        let content_type = match (&s.raw_content_type, s.raw_blocks.contains_key(&round)) {
            (Some(ct), _) => ct.clone(),
            (None, true) => RAW_BLOCK_CONTENT_TYPE.to_string(),
            (None, false) => JSON_CONTENT_TYPE.to_string(),
        };
        let body = if content_type == RAW_BLOCK_CONTENT_TYPE {
            s.raw_blocks.get(&round).cloned()
        } else {
            s.json_blocks
                .get(&round)
                .and_then(|b| serde_json::to_vec(b).ok())
        };
        match body {
            Some(body) => Ok(RawResponse { content_type, body }),
            None => Err(FollowError::Transport(format!("HTTP 404: no block {round}"))),
        }
    }

    async fn block_info(&self, round: Round) -> Result<JsonValue, FollowError> {
        let mut s = self.lock();
        s.calls.info += 1;
        Self::injected_failure(&mut s)?;
        s.json_blocks
            .get(&round)
            .cloned()
            .ok_or_else(|| FollowError::Transport(format!("HTTP 404: no block {round}")))
    }

    async fn wait_for_round_after(&self, round: Round) -> Result<Round, FollowError> {
        let mut s = self.lock();
        s.calls.wait += 1;
        Self::injected_failure(&mut s)?;
        if s.tip > round {
            Ok(s.tip)
        } else {
            Err(FollowError::Timeout { ms: 0 })
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}
