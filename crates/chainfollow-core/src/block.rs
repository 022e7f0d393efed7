//! Canonical block model shared by both wire formats.
//!
//! A [`Block`] is either a [`RawBlock`] (decoded from the node's binary,
//! certificate-bearing format) or a [`JsonBlock`] (the simplified block-info
//! REST representation). The two keep their own layouts; handlers match on
//! the variant, or use the accessors on [`Block`] and [`Transaction`].

use rmpv::Value as RawValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Sequence number of a block in the chain.
pub type Round = u64;

/// Which wire format a block came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockFormat {
    Raw,
    Json,
}

impl std::fmt::Display for BlockFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Json => write!(f, "json"),
        }
    }
}

// ─── Block ────────────────────────────────────────────────────────────────────

/// A normalized block, tagged by wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Raw(RawBlock),
    Json(JsonBlock),
}

impl Block {
    /// The block's round, whichever format it came from.
    pub fn round(&self) -> Round {
        match self {
            Self::Raw(b) => b.round,
            Self::Json(b) => b.round,
        }
    }

    pub fn format(&self) -> BlockFormat {
        match self {
            Self::Raw(_) => BlockFormat::Raw,
            Self::Json(_) => BlockFormat::Json,
        }
    }

    /// Transactions in block order. Empty when the block carries none, including
    /// JSON blocks whose transactions section is absent.
    pub fn transactions(&self) -> Vec<Transaction<'_>> {
        match self {
            Self::Raw(b) => b.txns.iter().map(Transaction::Raw).collect(),
            Self::Json(b) => b.transactions().iter().map(Transaction::Json).collect(),
        }
    }

    pub fn tx_count(&self) -> usize {
        match self {
            Self::Raw(b) => b.txns.len(),
            Self::Json(b) => b.transactions().len(),
        }
    }

    /// JSON rendering for printing; binary values become hex strings.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Raw(b) => b.to_json(),
            Self::Json(b) => serde_json::to_value(b).unwrap_or(JsonValue::Null),
        }
    }
}

// ─── Raw format ───────────────────────────────────────────────────────────────

/// A block decoded from the node's binary format.
///
/// `header` is the block payload with its `txns` list moved into `txns`.
/// Map keys throughout are text; notes are decoded where possible.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    pub round: Round,
    pub header: RawValue,
    pub txns: Vec<RawTxn>,
    pub cert: RawValue,
}

impl RawBlock {
    pub fn to_json(&self) -> JsonValue {
        let mut block = match raw_to_json(&self.header) {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        if !self.txns.is_empty() {
            block.insert(
                "txns".into(),
                JsonValue::Array(self.txns.iter().map(RawTxn::to_json).collect()),
            );
        }
        let mut out = Map::new();
        out.insert("block".into(), JsonValue::Object(block));
        out.insert("cert".into(), raw_to_json(&self.cert));
        JsonValue::Object(out)
    }
}

/// A signed transaction as it appears inside a raw block.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTxn(pub RawValue);

impl RawTxn {
    /// Top-level field of the signed transaction (e.g. `"sig"`, `"txn"`).
    pub fn get(&self, key: &str) -> Option<&RawValue> {
        map_get(&self.0, key)
    }

    /// Field of the inner transaction body (e.g. `"amt"`, `"snd"`).
    pub fn txn_field(&self, key: &str) -> Option<&RawValue> {
        self.get("txn").and_then(|t| map_get(t, key))
    }

    pub fn amount(&self) -> Option<u64> {
        self.txn_field("amt").and_then(RawValue::as_u64)
    }

    pub fn tx_type(&self) -> Option<&str> {
        self.txn_field("type").and_then(RawValue::as_str)
    }

    /// Sender address bytes, hex encoded.
    pub fn sender(&self) -> Option<String> {
        match self.txn_field("snd")? {
            RawValue::Binary(b) => Some(hex::encode(b)),
            RawValue::String(s) => s.as_str().map(str::to_owned),
            _ => None,
        }
    }

    /// The note after normalization: nested structure, text, or raw bytes.
    pub fn note(&self) -> Option<&RawValue> {
        self.txn_field("note")
    }

    pub fn to_json(&self) -> JsonValue {
        raw_to_json(&self.0)
    }
}

// ─── JSON format ──────────────────────────────────────────────────────────────

/// A block in the simplified block-info JSON format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonBlock {
    pub round: Round,
    /// Absent for blocks without transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txns: Option<JsonTxnList>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl JsonBlock {
    pub fn transactions(&self) -> &[JsonTxn] {
        self.txns
            .as_ref()
            .map(|t| t.transactions.as_slice())
            .unwrap_or(&[])
    }
}

/// The `txns` section of a JSON block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonTxnList {
    #[serde(default)]
    pub transactions: Vec<JsonTxn>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// A transaction in the JSON format; payments carry a flattened `payment` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonTxn {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub tx_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<JsonPayment>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonPayment {
    #[serde(default)]
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

// ─── Transaction view ─────────────────────────────────────────────────────────

/// Borrowed view of one transaction, tagged by the block's format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transaction<'a> {
    Raw(&'a RawTxn),
    Json(&'a JsonTxn),
}

impl Transaction<'_> {
    /// Transferred amount; `None` when the transaction moves no amount.
    pub fn amount(&self) -> Option<u64> {
        match self {
            Self::Raw(t) => t.amount(),
            Self::Json(t) => t.payment.as_ref().map(|p| p.amount),
        }
    }

    pub fn tx_type(&self) -> Option<&str> {
        match self {
            Self::Raw(t) => t.tx_type(),
            Self::Json(t) => t.tx_type.as_deref(),
        }
    }

    pub fn sender(&self) -> Option<String> {
        match self {
            Self::Raw(t) => t.sender(),
            Self::Json(t) => t.from.clone(),
        }
    }

    /// The note as JSON; raw notes keep whatever normalization made of them.
    pub fn note(&self) -> Option<JsonValue> {
        match self {
            Self::Raw(t) => t.note().map(raw_to_json),
            Self::Json(t) => t.extra.get("note").cloned(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Raw(t) => t.to_json(),
            Self::Json(t) => serde_json::to_value(t).unwrap_or(JsonValue::Null),
        }
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Look up a text key in a raw map value.
pub fn map_get<'v>(value: &'v RawValue, key: &str) -> Option<&'v RawValue> {
    value
        .as_map()?
        .iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
}

/// Render a raw value as JSON. Binary becomes hex; non-text keys use their
/// display form.
pub fn raw_to_json(value: &RawValue) -> JsonValue {
    match value {
        RawValue::Nil => JsonValue::Null,
        RawValue::Boolean(b) => JsonValue::Bool(*b),
        RawValue::Integer(i) => match (i.as_u64(), i.as_i64()) {
            (Some(u), _) => JsonValue::from(u),
            (None, Some(s)) => JsonValue::from(s),
            _ => JsonValue::Null,
        },
        RawValue::F32(f) => serde_json::Number::from_f64(f64::from(*f))
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        RawValue::F64(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        RawValue::String(s) => match s.as_str() {
            Some(text) => JsonValue::String(text.to_owned()),
            None => JsonValue::String(hex::encode(s.as_bytes())),
        },
        RawValue::Binary(b) => JsonValue::String(hex::encode(b)),
        RawValue::Array(items) => JsonValue::Array(items.iter().map(raw_to_json).collect()),
        RawValue::Map(entries) => JsonValue::Object(
            entries
                .iter()
                .map(|(k, v)| {
                    let key = k.as_str().map(str::to_owned).unwrap_or_else(|| k.to_string());
                    (key, raw_to_json(v))
                })
                .collect(),
        ),
        RawValue::Ext(tag, data) => serde_json::json!({ "ext": tag, "data": hex::encode(data) }),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
