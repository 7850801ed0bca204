//! Shared types for extracted block content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::ArgError;

/// Ledger-internal chaincodes whose writes are never extracted.
pub const SYSTEM_NAMESPACES: [&str; 3] = ["lscc", "qscc", "cscc"];

/// Returns `true` for lifecycle, query and config system chaincodes.
pub fn is_system_namespace(namespace: &str) -> bool {
    SYSTEM_NAMESPACES.contains(&namespace)
}

/// A single chaincode argument.
///
/// Serializes as a JSON string for text and as an array of byte values for
/// raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChaincodeArg {
    Text(String),
    Bytes(Vec<u8>),
}

impl ChaincodeArg {
    /// Classify raw bytes: valid UTF-8 becomes text.
    pub fn from_raw(raw: Vec<u8>) -> Self {
        match String::from_utf8(raw) {
            Ok(s) => Self::Text(s),
            Err(e) => Self::Bytes(e.into_bytes()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Bytes(b) => b,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(s) => s.into_bytes(),
            Self::Bytes(b) => b,
        }
    }

    /// Build an argument from a JSON value: strings are text, arrays of
    /// `0..=255` integers are bytes. Anything else is rejected.
    pub fn from_json(index: usize, value: &serde_json::Value) -> Result<Self, ArgError> {
        use serde_json::Value;
        match value {
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or(ArgError::ByteOutOfRange { index })
                })
                .collect::<Result<Vec<u8>, _>>()
                .map(Self::Bytes),
            other => Err(ArgError::UnsupportedKind {
                index,
                kind: json_kind(other).to_string(),
            }),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl From<&str> for ChaincodeArg {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ChaincodeArg {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for ChaincodeArg {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<&[u8]> for ChaincodeArg {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl fmt::Display for ChaincodeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

/// Ordered chaincode argument list. The first argument names the function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChaincodeArgs(Vec<ChaincodeArg>);

impl ChaincodeArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an argument (builder style).
    pub fn arg(mut self, arg: impl Into<ChaincodeArg>) -> Self {
        self.0.push(arg.into());
        self
    }

    /// Validate a JSON argument list, e.g. `["transfer", "a", [1, 2]]`.
    pub fn from_json(values: &[serde_json::Value]) -> Result<Self, ArgError> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| ChaincodeArg::from_json(i, v))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Wrap raw argument bytes as decoded from a chaincode input.
    pub fn from_raw(raw: Vec<Vec<u8>>) -> Self {
        Self(raw.into_iter().map(ChaincodeArg::from_raw).collect())
    }

    /// Wire form: one byte vector per argument.
    pub fn to_bytes(&self) -> Vec<Vec<u8>> {
        self.0.iter().map(|a| a.as_bytes().to_vec()).collect()
    }

    /// The function name (first argument), if it is text.
    pub fn function(&self) -> Option<&str> {
        match self.0.first() {
            Some(ChaincodeArg::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChaincodeArg> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ChaincodeArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{arg}")?;
        }
        Ok(())
    }
}

/// A chaincode invocation found in an endorser transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Position of the transaction in the block.
    pub tx_index: usize,
    pub tx_id: String,
    /// Target chaincode name.
    pub namespace: String,
    /// Function name plus arguments.
    pub args: ChaincodeArgs,
}

impl Invocation {
    pub fn function(&self) -> Option<&str> {
        self.args.function()
    }
}

/// One committed key write (or delete) under a business namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRecord {
    pub tx_index: usize,
    pub tx_id: String,
    pub namespace: String,
    pub key: String,
    #[serde(serialize_with = "ser_value", deserialize_with = "de_value")]
    pub value: Vec<u8>,
    pub is_delete: bool,
}

fn ser_value<S: Serializer>(value: &[u8], s: S) -> Result<S::Ok, S::Error> {
    ChaincodeArg::from_raw(value.to_vec()).serialize(s)
}

fn de_value<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    ChaincodeArg::deserialize(d).map(ChaincodeArg::into_bytes)
}

/// Everything extracted from one block; the unit handed to the publisher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockWrites {
    pub channel_id: String,
    pub block_number: u64,
    /// Timestamp of the first endorser transaction, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Application chaincode invocations; system chaincodes are only logged.
    pub invocations: Vec<Invocation>,
    pub records: Vec<WriteRecord>,
}

impl BlockWrites {
    pub fn new(channel_id: impl Into<String>, block_number: u64) -> Self {
        Self {
            channel_id: channel_id.into(),
            block_number,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn system_namespaces() {
        assert!(is_system_namespace("lscc"));
        assert!(is_system_namespace("qscc"));
        assert!(is_system_namespace("cscc"));
        assert!(!is_system_namespace("app"));
        assert!(!is_system_namespace("_lifecycle"));
    }

    #[test]
    fn args_builder_and_function() {
        let args = ChaincodeArgs::new()
            .arg("transfer")
            .arg("alice")
            .arg(vec![0xffu8, 0x00]);
        assert_eq!(args.len(), 3);
        assert_eq!(args.function(), Some("transfer"));
        assert_eq!(args.to_bytes()[2], vec![0xff, 0x00]);
    }

    #[test]
    fn args_from_json_accepts_text_and_bytes() {
        let args = ChaincodeArgs::from_json(&[json!("set"), json!("k"), json!([1, 2, 255])]).unwrap();
        assert_eq!(args.to_bytes(), vec![b"set".to_vec(), b"k".to_vec(), vec![1, 2, 255]]);
    }

    #[test]
    fn args_from_json_rejects_unsupported_kinds() {
        let err = ChaincodeArgs::from_json(&[json!("set"), json!(42)]).unwrap_err();
        assert_eq!(
            err,
            ArgError::UnsupportedKind { index: 1, kind: "number".into() }
        );
        let err = ChaincodeArgs::from_json(&[json!([1, 300])]).unwrap_err();
        assert_eq!(err, ArgError::ByteOutOfRange { index: 0 });
    }

    #[test]
    fn raw_args_classified_by_utf8() {
        let args = ChaincodeArgs::from_raw(vec![b"invoke".to_vec(), vec![0xc3, 0x28]]);
        let kinds: Vec<_> = args.iter().cloned().collect();
        assert_eq!(kinds[0], ChaincodeArg::Text("invoke".into()));
        assert_eq!(kinds[1], ChaincodeArg::Bytes(vec![0xc3, 0x28]));
        assert_eq!(args.to_string().split(' ').next(), Some("invoke"));
    }

    #[test]
    fn write_record_value_serialized_as_text_when_utf8() {
        let record = WriteRecord {
            tx_index: 0,
            tx_id: "tx1".into(),
            namespace: "app".into(),
            key: "k".into(),
            value: b"{\"a\":1}".to_vec(),
            is_delete: false,
        };
        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(v["value"], json!("{\"a\":1}"));
        let back: WriteRecord = serde_json::from_value(v).unwrap();
        assert_eq!(back, record);
    }
}
