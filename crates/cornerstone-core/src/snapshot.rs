//! Snapshot types. A snapshot is one immutable version of one building's attributes.
//!
//! Snapshots are never updated. Merges and edits produce new snapshots whose
//! [`Origin`] names their parents; the only post-creation state (which lineage
//! a snapshot belongs to) lives in the lineage index, not on the snapshot.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::attribute::{Attribute, AttributeValue};

// ─── Classification ──────────────────────────────────────────────────────────

/// Where a snapshot's data came from.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceKind {
  RawAssessed,
  RawPortfolio,
  CompositeAssessed,
  CompositePortfolio,
  CompositeMerged,
}

impl SourceKind {
  pub fn as_str(self) -> &'static str { self.into() }

  pub fn is_raw(self) -> bool { matches!(self, Self::RawAssessed | Self::RawPortfolio) }

  /// The kind given to a user edit of a snapshot of this kind.
  pub fn edited(self) -> Self {
    match self {
      Self::RawAssessed => Self::CompositeAssessed,
      Self::RawPortfolio => Self::CompositePortfolio,
      other => other,
    }
  }
}

/// How a merge was decided.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchType {
  SystemMatch,
  UserMatch,
  PossibleMatch,
}

impl MatchType {
  pub fn as_str(self) -> &'static str { self.into() }
}

// ─── Origin ──────────────────────────────────────────────────────────────────

/// The position of a snapshot in the DAG. A merge always has exactly two
/// parents and an edit exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
  Root,
  Merged { left: Uuid, right: Uuid },
  Edited { parent: Uuid },
}

impl Origin {
  /// Parent ids in edge order (left before right).
  pub fn parents(&self) -> Vec<Uuid> {
    match *self {
      Self::Root => vec![],
      Self::Merged { left, right } => vec![left, right],
      Self::Edited { parent } => vec![parent],
    }
  }
}

// ─── Provenance-carrying values ──────────────────────────────────────────────

/// One mappable attribute slot. A value never exists without a source; the
/// source survives when an edit clears the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
  pub value:  Option<AttributeValue>,
  /// The snapshot whose value is authoritative for this attribute.
  pub source: Uuid,
}

impl Field {
  pub fn new(value: AttributeValue, source: Uuid) -> Self { Self { value: Some(value), source } }
}

/// One extension-map entry with its contributing snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraField {
  pub value:  serde_json::Value,
  pub source: Uuid,
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// An immutable version of a building record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub snapshot_id:      Uuid,
  /// Server-assigned timestamp; never changes after creation.
  pub created_at:       DateTime<Utc>,
  pub source_kind:      SourceKind,
  pub origin:           Origin,
  pub tenant_id:        Option<Uuid>,
  pub import_batch_id:  Option<Uuid>,
  /// Set only on snapshots created by a merge (or carried through edits).
  pub match_type:       Option<MatchType>,
  pub confidence:       Option<f64>,
  pub last_modified_by: Option<String>,
  pub attributes:       BTreeMap<Attribute, Field>,
  pub extra_data:       BTreeMap<String, ExtraField>,
  /// Metering links; carried forward by merges and edits.
  pub meters:           BTreeSet<Uuid>,
}

impl Snapshot {
  /// The current value of `attr`, if any.
  pub fn value(&self, attr: Attribute) -> Option<&AttributeValue> {
    self.attributes.get(&attr).and_then(|f| f.value.as_ref())
  }

  /// The provenance source recorded for `attr`, if any.
  pub fn source(&self, attr: Attribute) -> Option<Uuid> {
    self.attributes.get(&attr).map(|f| f.source)
  }

  pub fn text(&self, attr: Attribute) -> Option<&str> {
    self.value(attr).and_then(AttributeValue::as_text)
  }

  /// Every snapshot id this snapshot's provenance points at, with the field
  /// name it was found on.
  pub fn provenance(&self) -> impl Iterator<Item = (String, Uuid)> + '_ {
    let single = self.attributes.iter().map(|(a, f)| (a.to_string(), f.source));
    let plural = self
      .extra_data
      .iter()
      .map(|(k, f)| (format!("extra_data.{k}"), f.source));
    single.chain(plural)
  }
}

// ─── NewSnapshot ─────────────────────────────────────────────────────────────

/// Input to root creation. Ids, timestamps and provenance are always assigned
/// by the engine.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
  pub source_kind:     SourceKind,
  pub tenant_id:       Option<Uuid>,
  pub import_batch_id: Option<Uuid>,
  pub attributes:      BTreeMap<Attribute, AttributeValue>,
  pub extra_data:      BTreeMap<String, serde_json::Value>,
  pub meters:          BTreeSet<Uuid>,
  /// An existing lineage this root should join instead of opening a new one.
  pub lineage_id:      Option<Uuid>,
}

impl NewSnapshot {
  /// Convenience constructor with all optional fields empty.
  pub fn new(source_kind: SourceKind) -> Self {
    Self {
      source_kind,
      tenant_id: None,
      import_batch_id: None,
      attributes: BTreeMap::new(),
      extra_data: BTreeMap::new(),
      meters: BTreeSet::new(),
      lineage_id: None,
    }
  }

  pub fn with(mut self, attr: Attribute, value: AttributeValue) -> Self {
    self.attributes.insert(attr, value);
    self
  }

  pub fn with_text(self, attr: Attribute, value: &str) -> Self {
    self.with(attr, AttributeValue::text(value))
  }

  pub fn with_extra(mut self, key: &str, value: serde_json::Value) -> Self {
    self.extra_data.insert(key.to_owned(), value);
    self
  }
}

/// Options accepted by a merge.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
  /// Likelihood in `[0, 1]` that the two snapshots describe one building.
  pub confidence: Option<f64>,
  pub match_type: Option<MatchType>,
  pub actor:      Option<String>,
}

impl MergeOptions {
  pub fn system(confidence: f64) -> Self {
    Self {
      confidence: Some(confidence),
      match_type: Some(MatchType::SystemMatch),
      actor:      None,
    }
  }
}
