//! The flat representation of a snapshot used by exports and edit forms.
//!
//! Every attribute appears (as `null` when absent) next to an
//! `<attribute>_source` key, and extension entries are unpacked into the same
//! namespace. Feeding the map straight back into an update changes nothing.

use serde_json::{Map, Value, json};
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::{
  attribute::Attribute,
  edit::{KeyClass, classify_key},
  snapshot::Snapshot,
};

pub const MODEL_NAME: &str = "building_snapshot";

pub fn to_flat(snapshot: &Snapshot, lineage_id: Option<Uuid>) -> Map<String, Value> {
  let id = snapshot.snapshot_id.to_string();
  let mut map = Map::new();

  map.insert("id".into(), json!(id));
  map.insert("pk".into(), json!(id));
  map.insert("model".into(), json!(MODEL_NAME));
  map.insert("created_at".into(), json!(snapshot.created_at.to_rfc3339()));
  map.insert("source_kind".into(), json!(snapshot.source_kind.as_str()));
  map.insert("match_type".into(), json!(snapshot.match_type.map(|m| m.as_str())));
  map.insert("confidence".into(), json!(snapshot.confidence));
  map.insert("last_modified_by".into(), json!(snapshot.last_modified_by));
  map.insert("tenant_id".into(), json!(snapshot.tenant_id));
  map.insert("import_batch_id".into(), json!(snapshot.import_batch_id));
  map.insert("lineage_id".into(), json!(lineage_id));
  map.insert("parents".into(), json!(snapshot.origin.parents()));
  map.insert("meters".into(), json!(snapshot.meters));

  for attr in Attribute::iter() {
    let field = snapshot.attributes.get(&attr);
    let value = field
      .and_then(|f| f.value.as_ref())
      .map_or(Value::Null, |v| v.to_json());
    map.insert(attr.to_string(), value);
    map.insert(format!("{attr}_source"), json!(field.map(|f| f.source)));
  }

  let mut sources = Map::new();
  for (key, field) in &snapshot.extra_data {
    sources.insert(key.clone(), json!(field.source));
    // Keys that would read back as something else are only reachable
    // through `extra_data_sources`.
    if classify_key(key) == KeyClass::Extra && !map.contains_key(key) {
      map.insert(key.clone(), field.value.clone());
    }
  }
  map.insert("extra_data_sources".into(), Value::Object(sources));

  map
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use chrono::Utc;

  use super::*;
  use crate::{
    attribute::AttributeValue,
    snapshot::{ExtraField, Field, Origin, SourceKind},
  };

  fn snapshot() -> Snapshot {
    let id = Uuid::new_v4();
    let extra = |v: Value| ExtraField { value: v, source: id };
    Snapshot {
      snapshot_id:      id,
      created_at:       Utc::now(),
      source_kind:      SourceKind::RawAssessed,
      origin:           Origin::Root,
      tenant_id:        None,
      import_batch_id:  None,
      match_type:       None,
      confidence:       None,
      last_modified_by: None,
      attributes:       BTreeMap::from([(
        Attribute::TaxLotId,
        Field::new(AttributeValue::text("100"), id),
      )]),
      extra_data:       BTreeMap::from([
        ("Boiler Type".to_owned(), extra(json!("steam"))),
        ("model".to_owned(), extra(json!("shadowed"))),
      ]),
      meters:           Default::default(),
    }
  }

  #[test]
  fn every_attribute_and_source_is_present() {
    let s = snapshot();
    let flat = to_flat(&s, None);

    assert_eq!(flat["tax_lot_id"], json!("100"));
    assert_eq!(flat["tax_lot_id_source"], json!(s.snapshot_id));
    assert_eq!(flat["pm_property_id"], Value::Null);
    assert_eq!(flat["pm_property_id_source"], Value::Null);
    assert_eq!(flat["address_line_1"], Value::Null);
  }

  #[test]
  fn extra_data_never_overrides_fixed_keys() {
    let s = snapshot();
    let flat = to_flat(&s, None);

    assert_eq!(flat["Boiler Type"], json!("steam"));
    assert_eq!(flat["model"], json!(MODEL_NAME));
    assert_eq!(flat["extra_data_sources"]["model"], json!(s.snapshot_id));
  }
}
