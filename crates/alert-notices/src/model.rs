use std::collections::BTreeMap;
use std::ops::Range;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Alert notice number, e.g. 601 for `aavso-alert-notice-601`.
pub type NoticeId = u32;

/// Message stored for a notice whose extraction failed for good.
pub const EXTRACTION_FAILED: &str = "Failed to extract information";

/// Outcome of processing one notice.
///
/// On disk a success is the plain field object and a failure is
/// `{"error": "<message>"}`. Any stored object with an `error` key, and any
/// stored value that is not an object, reads back as `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedRecord {
    Success(Map<String, Value>),
    Error(String),
}

impl ExtractedRecord {
    pub fn empty() -> Self {
        ExtractedRecord::Success(Map::new())
    }

    pub fn failed() -> Self {
        ExtractedRecord::Error(EXTRACTION_FAILED.to_string())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ExtractedRecord::Error(_))
    }
}

impl Serialize for ExtractedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ExtractedRecord::Success(fields) => fields.serialize(serializer),
            ExtractedRecord::Error(message) => {
                let mut marker = Map::with_capacity(1);
                marker.insert("error".to_string(), Value::String(message.clone()));
                marker.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for ExtractedRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = match Value::deserialize(deserializer)? {
            Value::Object(fields) => fields,
            other => return Ok(ExtractedRecord::Error(format!("not a record: {other}"))),
        };
        match fields.remove("error") {
            Some(Value::String(message)) => Ok(ExtractedRecord::Error(message)),
            Some(other) => Ok(ExtractedRecord::Error(other.to_string())),
            None => Ok(ExtractedRecord::Success(fields)),
        }
    }
}

/// All records of a run, keyed and ordered by notice id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultStore {
    records: BTreeMap<NoticeId, ExtractedRecord>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NoticeId) -> Option<&ExtractedRecord> {
        self.records.get(&id)
    }

    pub fn insert(&mut self, id: NoticeId, record: ExtractedRecord) -> Option<ExtractedRecord> {
        self.records.insert(id, record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn error_count(&self) -> usize {
        self.records.values().filter(|r| r.is_error()).count()
    }

    /// Ids in `ids` that still need work: error-marked or never recorded.
    /// Successful records are never selected.
    pub fn pending(&self, ids: Range<NoticeId>) -> Vec<NoticeId> {
        ids.filter(|id| self.get(*id).map_or(true, ExtractedRecord::is_error))
            .collect()
    }
}

impl FromIterator<(NoticeId, ExtractedRecord)> for ResultStore {
    fn from_iter<I: IntoIterator<Item = (NoticeId, ExtractedRecord)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
