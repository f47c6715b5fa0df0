//! User edits and the table that classifies their keys.
//!
//! An edit is a flat key -> value map (the same shape [`crate::flat`]
//! produces). Each key is one of:
//!
//! | Key | Class |
//! |-----|-------|
//! | `<attribute>` | mappable value, normalised to the attribute's kind |
//! | `<attribute>_source` | provenance override (snapshot id) |
//! | `match_type`, `confidence` | metadata, copied onto the new snapshot |
//! | structural keys (`id`, `parents`, `lineage_id`, …) | ignored |
//! | anything else | extension-map entry |

use std::{collections::BTreeMap, str::FromStr};

use serde_json::Value;
use uuid::Uuid;

use crate::{
  Error, Result,
  attribute::{Attribute, AttributeValue},
  snapshot::MatchType,
};

/// Keys that describe a snapshot's identity or structure rather than its
/// data. Edits never change them.
const EXCLUDED_KEYS: &[&str] = &[
  "id",
  "pk",
  "model",
  "snapshot_id",
  "created_at",
  "source_kind",
  "origin",
  "parents",
  "children",
  "lineage_id",
  "canonical_building",
  "tenant_id",
  "import_batch_id",
  "last_modified_by",
  "meters",
  "extra_data",
  "extra_data_sources",
];

/// The class a single edit key falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
  Mappable(Attribute),
  Source(Attribute),
  MatchType,
  Confidence,
  Excluded,
  Extra,
}

pub fn classify_key(key: &str) -> KeyClass {
  if let Some(base) = key.strip_suffix("_source")
    && let Ok(attr) = Attribute::from_str(base)
  {
    return KeyClass::Source(attr);
  }
  match key {
    "match_type" => KeyClass::MatchType,
    "confidence" => KeyClass::Confidence,
    k if EXCLUDED_KEYS.contains(&k) => KeyClass::Excluded,
    k => match Attribute::from_str(k) {
      Ok(attr) => KeyClass::Mappable(attr),
      Err(_) => KeyClass::Extra,
    },
  }
}

/// A set of edited values for one snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotEdit {
  pub values: serde_json::Map<String, Value>,
}

impl SnapshotEdit {
  pub fn new() -> Self { Self::default() }

  pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.values.insert(key.into(), value.into());
    self
  }

  /// Partition the edit and parse every value. Mappable values are
  /// normalised (dates parsed, identifiers truncated).
  pub fn classify(&self, identifier_max_len: usize) -> Result<ClassifiedEdit> {
    let mut out = ClassifiedEdit::default();

    for (key, value) in &self.values {
      match classify_key(key) {
        KeyClass::Mappable(attr) => {
          let parsed = AttributeValue::from_json(attr, value)?
            .map(|v| v.normalize(attr, identifier_max_len))
            .transpose()?;
          out.mappable.insert(attr, parsed);
        }
        KeyClass::Source(attr) => {
          if let Some(source) = parse_source(key, value)? {
            out.sources.insert(attr, source);
          }
        }
        KeyClass::MatchType => out.match_type = Some(parse_match_type(value)?),
        KeyClass::Confidence => out.confidence = Some(parse_confidence(value)?),
        KeyClass::Excluded => {}
        KeyClass::Extra => {
          out.extra.insert(key.clone(), value.clone());
        }
      }
    }

    Ok(out)
  }
}

/// An edit split by [`classify_key`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedEdit {
  /// `None` clears the attribute's value but keeps its attribution.
  pub mappable:   BTreeMap<Attribute, Option<AttributeValue>>,
  /// Provenance overrides; `null` overrides are dropped.
  pub sources:    BTreeMap<Attribute, Uuid>,
  pub match_type: Option<Option<MatchType>>,
  pub confidence: Option<Option<f64>>,
  pub extra:      BTreeMap<String, Value>,
}

fn parse_source(key: &str, value: &Value) -> Result<Option<Uuid>> {
  match value {
    Value::Null => Ok(None),
    Value::String(s) => Uuid::parse_str(s)
      .map(Some)
      .map_err(|e| Error::Validation(format!("{key}: {e}"))),
    other => Err(Error::Validation(format!("{key}: expected a snapshot id, got {other}"))),
  }
}

fn parse_match_type(value: &Value) -> Result<Option<MatchType>> {
  match value {
    Value::Null => Ok(None),
    Value::String(s) => MatchType::from_str(s)
      .map(Some)
      .map_err(|_| Error::Validation(format!("unknown match type {s:?}"))),
    other => Err(Error::Validation(format!("match_type: unexpected {other}"))),
  }
}

pub(crate) fn check_confidence(c: f64) -> Result<f64> {
  if (0.0..=1.0).contains(&c) {
    Ok(c)
  } else {
    Err(Error::Validation(format!("confidence {c} is outside [0, 1]")))
  }
}

fn parse_confidence(value: &Value) -> Result<Option<f64>> {
  match value {
    Value::Null => Ok(None),
    Value::Number(n) => n.as_f64().map(check_confidence).transpose(),
    other => Err(Error::Validation(format!("confidence: unexpected {other}"))),
  }
}
