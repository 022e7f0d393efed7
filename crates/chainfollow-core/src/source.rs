//! Block files as an alternative block source.

use std::collections::VecDeque;
use std::path::PathBuf;

use crate::block::Block;
use crate::error::FollowError;
use crate::normalize::decode_block_file;

/// An ordered list of block files, consumed front to back.
///
/// Each file holds one block, either as a raw envelope or as block-info JSON.
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    files: VecDeque<PathBuf>,
}

impl FileSource {
    pub fn new(files: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            files: files.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.files.len()
    }

    /// Read the next file; `Ok(None)` once every file has been consumed.
    ///
    /// A file is popped before it is read, so a file that fails to decode is
    /// not retried.
    pub async fn next_block(&mut self) -> Result<Option<Block>, FollowError> {
        let Some(path) = self.files.pop_front() else {
            tracing::debug!("block files exhausted");
            return Ok(None);
        };
        tracing::debug!(file = %path.display(), "block from file");
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            FollowError::MalformedBlock(format!("{}: {e}", path.display()))
        })?;
        decode_block_file(&bytes).map(Some).map_err(|e| match e {
            FollowError::MalformedBlock(reason) => {
                FollowError::MalformedBlock(format!("{}: {reason}", path.display()))
            }
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::tests::raw_envelope;

    #[tokio::test]
    async fn files_are_read_in_order_then_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("b.json");
        let b = dir.path().join("a.msgp");
        std::fs::write(&a, r#"{"round": 1}"#).unwrap();
        std::fs::write(&b, raw_envelope(2, vec![])).unwrap();

        let mut source = FileSource::new([a, b]);
        assert_eq!(source.remaining(), 2);
        let first = source.next_block().await.unwrap().unwrap();
        assert!(matches!(first, Block::Json(_)));
        assert_eq!(first.round(), 1);
        let second = source.next_block().await.unwrap().unwrap();
        assert!(matches!(second, Block::Raw(_)));
        assert_eq!(second.round(), 2);
        assert!(source.next_block().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let mut source = FileSource::new([PathBuf::from("/nonexistent/block.json")]);
        assert!(source.next_block().await.is_err());
        assert!(source.next_block().await.unwrap().is_none());
    }
}
