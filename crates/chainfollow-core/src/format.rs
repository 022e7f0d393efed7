//! Raw/JSON format negotiation.
//!
//! The engine asks for raw blocks only when the operator prefers them. The
//! first raw response settles whether the node supports the format; a JSON
//! answer to a raw request disables raw blocks for the rest of the engine's
//! life.

use serde::{Deserialize, Serialize};

use crate::error::FollowError;
use crate::normalize::{JSON_CONTENT_TYPE, RAW_BLOCK_CONTENT_TYPE};

/// Which block format the operator asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatPreference {
    /// Raw blocks (with certificates) when the node serves them.
    Raw,
    /// Block-info JSON only.
    #[default]
    Json,
}

/// What the engine has learned about the node's raw block support.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatState {
    #[default]
    Unknown,
    RawSupported,
    RawUnsupported,
}

impl std::fmt::Display for FormatState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::RawSupported => write!(f, "raw-supported"),
            Self::RawUnsupported => write!(f, "raw-unsupported"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FormatNegotiator {
    preference: FormatPreference,
    state: FormatState,
}

impl FormatNegotiator {
    pub fn new(preference: FormatPreference) -> Self {
        Self {
            preference,
            state: FormatState::Unknown,
        }
    }

    pub fn state(&self) -> FormatState {
        self.state
    }

    /// Whether the next block request should ask for the raw format.
    pub fn wants_raw(&self) -> bool {
        self.preference == FormatPreference::Raw && self.state != FormatState::RawUnsupported
    }

    /// Record the content type of a raw-block response.
    ///
    /// Returns `UnsupportedFormat` (after switching to JSON for good) when the
    /// node answered with JSON, and `UnrecognizedProtocol` for anything else
    /// that is not the raw block type.
    pub fn observe(&mut self, content_type: &str) -> Result<(), FollowError> {
        let media = media_type(content_type);
        if media.eq_ignore_ascii_case(RAW_BLOCK_CONTENT_TYPE) {
            self.state = FormatState::RawSupported;
            return Ok(());
        }
        if media.eq_ignore_ascii_case(JSON_CONTENT_TYPE) {
            if self.state != FormatState::RawUnsupported {
                tracing::debug!("got json response to raw block request, disabling raw blocks");
            }
            self.state = FormatState::RawUnsupported;
            return Err(FollowError::UnsupportedFormat {
                content_type: content_type.to_string(),
            });
        }
        Err(FollowError::UnrecognizedProtocol {
            content_type: content_type.to_string(),
        })
    }
}

/// `"application/json; charset=utf-8"` → `"application/json"`.
fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_preference_never_asks_for_raw() {
        let n = FormatNegotiator::new(FormatPreference::Json);
        assert!(!n.wants_raw());
        assert_eq!(n.state(), FormatState::Unknown);
    }

    #[test]
    fn raw_content_type_marks_supported() {
        let mut n = FormatNegotiator::new(FormatPreference::Raw);
        n.observe(RAW_BLOCK_CONTENT_TYPE).unwrap();
        assert_eq!(n.state(), FormatState::RawSupported);
        assert!(n.wants_raw());
    }

    #[test]
    fn json_answer_downgrades_for_good() {
        let mut n = FormatNegotiator::new(FormatPreference::Raw);
        let err = n.observe("application/json; charset=utf-8").unwrap_err();
        assert!(err.is_unsupported_format());
        assert_eq!(n.state(), FormatState::RawUnsupported);
        assert!(!n.wants_raw());
    }

    #[test]
    fn unknown_content_type_is_protocol_error() {
        let mut n = FormatNegotiator::new(FormatPreference::Raw);
        let err = n.observe("text/html").unwrap_err();
        assert!(matches!(err, FollowError::UnrecognizedProtocol { .. }));
        assert_eq!(n.state(), FormatState::Unknown);
    }
}
