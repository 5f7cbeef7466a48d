//! Row records and their stored representation

use crate::error::Result;

/// One data row of a delimited file, identified by its key field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowRecord {
    pub key: String,
    pub fields: Vec<String>,
}

impl RowRecord {
    pub fn new(key: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            key: key.into(),
            fields,
        }
    }

    /// Build a record from parsed fields, taking the key at `key_index`.
    ///
    /// Returns `None` when the row is too short to hold the key.
    pub fn from_fields(fields: Vec<String>, key_index: usize) -> Option<Self> {
        let key = fields.get(key_index)?.clone();
        Some(Self { key, fields })
    }
}

/// Row as written into a dataset table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub key: String,
    /// blake3 over `encoded`; identical rows share a fingerprint
    pub fingerprint: String,
    /// JSON array of the fields
    pub encoded: String,
}

impl StoredRow {
    pub fn encode(record: &RowRecord) -> Result<Self> {
        let encoded = serde_json::to_string(&record.fields)?;
        let fingerprint = blake3::hash(encoded.as_bytes()).to_hex().to_string();
        Ok(Self {
            key: record.key.clone(),
            fingerprint,
            encoded,
        })
    }

    pub fn decode(key: String, encoded: &str) -> Result<RowRecord> {
        let fields: Vec<String> = serde_json::from_str(encoded)?;
        Ok(RowRecord { key, fields })
    }
}
