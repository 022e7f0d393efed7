//! chainfollow-core: a restart-safe block follower for algod nodes.
//!
//! # Architecture
//!
//! ```text
//! EngineBuilder → Engine (loop, stop flag)
//!                   ├── BlockFetcher      (direct → wait → fetch, bounded retry)
//!                   │     ├── NodeClient / FileSource
//!                   │     ├── FormatNegotiator (raw vs. JSON, sticky downgrade)
//!                   │     └── normalize      (wire → Block)
//!                   ├── HandlerRegistry   (block + transaction handlers, in order)
//!                   └── ProgressJournal   (append-only checkpoint, rotation)
//! ```

pub mod block;
pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod format;
pub mod handler;
pub mod journal;
pub mod node;
pub mod normalize;
pub mod retry;
pub mod shutdown;
pub mod source;

pub use block::{Block, BlockFormat, JsonBlock, RawBlock, Round, Transaction};
pub use builder::EngineBuilder;
pub use config::FollowerConfig;
pub use engine::{Engine, EngineState, EngineStats};
pub use error::FollowError;
pub use fetcher::{BlockFetcher, Fetched};
pub use format::{FormatNegotiator, FormatPreference, FormatState};
pub use handler::{BlockHandler, EngineContext, HandlerRegistry, TxnHandler};
pub use journal::ProgressJournal;
pub use node::{MemoryNode, NodeClient, RawResponse};
pub use retry::RetryConfig;
pub use shutdown::{StopHandle, StopRequest};
pub use source::FileSource;
