//! Wire response → [`Block`] normalization.
//!
//! Raw responses are a binary (MessagePack) envelope `{block, cert}` whose map
//! keys may arrive as byte strings. Keys are converted to text at every depth.
//! The `note` field is opportunistically decoded as a nested envelope, then as
//! UTF-8 text; `type` gets the text attempt only. A field that decodes neither
//! way is left as bytes. None of the opportunistic steps ever fail.

use rmpv::Value as RawValue;
use serde_json::Value as JsonValue;

use crate::block::{Block, JsonBlock, RawBlock, RawTxn};
use crate::error::FollowError;

/// Content type the node uses for raw blocks.
pub const RAW_BLOCK_CONTENT_TYPE: &str = "application/x-algorand-block-v1";

/// Content type of JSON responses.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// An undecoded block as received from the node or a file.
#[derive(Debug, Clone)]
pub enum WireBlock {
    Raw(Vec<u8>),
    Json(JsonValue),
}

/// Normalize a wire response into the variant its format calls for.
pub fn normalize(wire: WireBlock) -> Result<Block, FollowError> {
    match wire {
        WireBlock::Raw(bytes) => decode_raw_block(&bytes).map(Block::Raw),
        WireBlock::Json(value) => decode_json_block(value).map(Block::Json),
    }
}

/// Decode a raw block envelope.
pub fn decode_raw_block(bytes: &[u8]) -> Result<RawBlock, FollowError> {
    let value = decode_envelope(bytes)
        .map_err(|e| FollowError::MalformedBlock(format!("raw block envelope: {e}")))?;
    raw_block_from_value(normalize_value(value))
}

/// Decode a block-info JSON document.
pub fn decode_json_block(value: JsonValue) -> Result<JsonBlock, FollowError> {
    serde_json::from_value(value)
        .map_err(|e| FollowError::MalformedBlock(format!("json block: {e}")))
}

/// Decode a block file: binary envelope first, JSON text second.
pub fn decode_block_file(bytes: &[u8]) -> Result<Block, FollowError> {
    let raw_err = match decode_raw_block(bytes) {
        Ok(block) => return Ok(Block::Raw(block)),
        Err(e) => e,
    };
    tracing::debug!(error = %raw_err, "not a raw block, trying json");
    let value: JsonValue = serde_json::from_slice(bytes).map_err(|e| {
        FollowError::MalformedBlock(format!("neither raw ({raw_err}) nor json ({e})"))
    })?;
    decode_json_block(value).map(Block::Json)
}

/// Decode exactly one value spanning the whole input.
fn decode_envelope(bytes: &[u8]) -> Result<RawValue, String> {
    let mut rd = bytes;
    let value = rmpv::decode::read_value(&mut rd).map_err(|e| e.to_string())?;
    if !rd.is_empty() {
        return Err(format!("{} trailing bytes", rd.len()));
    }
    Ok(value)
}

/// Convert keys to text recursively and decode `note`/`type` fields.
pub fn normalize_value(value: RawValue) -> RawValue {
    match value {
        RawValue::Map(entries) => RawValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| {
                    let key = text_key(k);
                    let v = normalize_field(&key, v);
                    (RawValue::from(key), v)
                })
                .collect(),
        ),
        RawValue::Array(items) => RawValue::Array(items.into_iter().map(normalize_value).collect()),
        other => other,
    }
}

fn normalize_field(key: &str, value: RawValue) -> RawValue {
    if let RawValue::Binary(bytes) = &value {
        if key == "note" {
            if let Ok(inner) = decode_envelope(bytes) {
                return normalize_value(inner);
            }
        }
        if key == "note" || key == "type" {
            if let Ok(text) = std::str::from_utf8(bytes) {
                return RawValue::from(text);
            }
        }
    }
    normalize_value(value)
}

fn text_key(key: RawValue) -> String {
    match key {
        RawValue::String(s) => match s.as_str() {
            Some(text) => text.to_owned(),
            None => String::from_utf8_lossy(s.as_bytes()).into_owned(),
        },
        RawValue::Binary(b) => String::from_utf8_lossy(&b).into_owned(),
        other => other.to_string(),
    }
}

fn raw_block_from_value(value: RawValue) -> Result<RawBlock, FollowError> {
    let RawValue::Map(entries) = value else {
        return Err(FollowError::MalformedBlock("raw block is not a map".into()));
    };

    let mut payload = None;
    let mut cert = RawValue::Nil;
    for (k, v) in entries {
        match k.as_str() {
            Some("block") => payload = Some(v),
            Some("cert") => cert = v,
            _ => {}
        }
    }

    let Some(RawValue::Map(mut header)) = payload else {
        return Err(FollowError::MalformedBlock("raw block has no block payload".into()));
    };

    let round = header
        .iter()
        .find(|(k, _)| k.as_str() == Some("rnd"))
        .and_then(|(_, v)| v.as_u64())
        .ok_or_else(|| FollowError::MalformedBlock("block payload has no round".into()))?;

    let txns = match header.iter().position(|(k, _)| k.as_str() == Some("txns")) {
        Some(i) => match header.remove(i).1 {
            RawValue::Array(items) => items.into_iter().map(RawTxn).collect(),
            RawValue::Nil => Vec::new(),
            _ => {
                return Err(FollowError::MalformedBlock(format!(
                    "round {round}: txns is not a list"
                )))
            }
        },
        None => Vec::new(),
    };

    Ok(RawBlock {
        round,
        header: RawValue::Map(header),
        txns,
        cert,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn encode(value: &RawValue) -> Vec<u8> {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, value).unwrap();
        buf
    }

    fn bkey(k: &str) -> RawValue {
        RawValue::Binary(k.as_bytes().to_vec())
    }

    /// A raw envelope with byte-string keys, as older nodes emit it.
    pub(crate) fn raw_envelope(round: u64, txns: Vec<RawValue>) -> Vec<u8> {
        let block = RawValue::Map(vec![
            (bkey("rnd"), RawValue::from(round)),
            (bkey("gen"), RawValue::from("testnet-v1.0")),
            (bkey("txns"), RawValue::Array(txns)),
        ]);
        let cert = RawValue::Map(vec![(bkey("rnd"), RawValue::from(round))]);
        encode(&RawValue::Map(vec![(bkey("block"), block), (bkey("cert"), cert)]))
    }

    pub(crate) fn raw_pay(amount: u64, note: Option<Vec<u8>>) -> RawValue {
        let mut txn = vec![
            (bkey("amt"), RawValue::from(amount)),
            (bkey("type"), RawValue::Binary(b"pay".to_vec())),
        ];
        if let Some(note) = note {
            txn.push((bkey("note"), RawValue::Binary(note)));
        }
        RawValue::Map(vec![(bkey("txn"), RawValue::Map(txn))])
    }

    #[test]
    fn raw_block_keys_become_text() {
        let bytes = raw_envelope(1000, vec![raw_pay(5, None)]);
        let block = decode_raw_block(&bytes).unwrap();
        assert_eq!(block.round, 1000);
        assert_eq!(block.txns.len(), 1);
        assert_eq!(block.txns[0].amount(), Some(5));
        assert_eq!(block.txns[0].tx_type(), Some("pay"));
        assert!(crate::block::map_get(&block.header, "gen").is_some());
        assert!(crate::block::map_get(&block.header, "txns").is_none());
        assert!(crate::block::map_get(&block.cert, "rnd").is_some());
    }

    #[test]
    fn note_decodes_nested_envelope() {
        let inner = encode(&RawValue::Map(vec![(bkey("memo"), RawValue::from("hi"))]));
        let bytes = raw_envelope(1, vec![raw_pay(1, Some(inner))]);
        let block = decode_raw_block(&bytes).unwrap();
        let note = block.txns[0].note().unwrap();
        assert_eq!(
            crate::block::map_get(note, "memo").and_then(RawValue::as_str),
            Some("hi")
        );
    }

    #[test]
    fn note_falls_back_to_text() {
        let bytes = raw_envelope(1, vec![raw_pay(1, Some(b"hello world".to_vec()))]);
        let block = decode_raw_block(&bytes).unwrap();
        assert_eq!(block.txns[0].note().and_then(RawValue::as_str), Some("hello world"));
    }

    #[test]
    fn undecodable_note_stays_binary() {
        // 0xc1 is never valid msgpack and the bytes are not utf-8
        let junk = vec![0xc1, 0xff, 0xfe];
        let bytes = raw_envelope(1, vec![raw_pay(1, Some(junk.clone()))]);
        let block = decode_raw_block(&bytes).unwrap();
        assert_eq!(block.txns[0].note(), Some(&RawValue::Binary(junk)));
    }

    #[test]
    fn missing_round_is_malformed() {
        let bytes = encode(&RawValue::Map(vec![(
            bkey("block"),
            RawValue::Map(vec![(bkey("gen"), RawValue::from("x"))]),
        )]));
        let err = decode_raw_block(&bytes).unwrap_err();
        assert!(matches!(err, FollowError::MalformedBlock(_)));
    }

    #[test]
    fn json_missing_round_is_malformed() {
        let err = decode_json_block(json!({ "txns": {} })).unwrap_err();
        assert!(matches!(err, FollowError::MalformedBlock(_)));
    }

    #[test]
    fn block_file_falls_back_to_json() {
        let text = br#"{"round": 12, "txns": {"transactions": []}}"#;
        let block = decode_block_file(text).unwrap();
        assert!(matches!(block, Block::Json(_)));
        assert_eq!(block.round(), 12);

        let raw = raw_envelope(13, vec![]);
        let block = decode_block_file(&raw).unwrap();
        assert!(matches!(block, Block::Raw(_)));
        assert_eq!(block.round(), 13);
    }

    #[test]
    fn garbage_block_file_is_malformed() {
        let err = decode_block_file(b"not a block").unwrap_err();
        assert!(matches!(err, FollowError::MalformedBlock(_)));
    }
}
