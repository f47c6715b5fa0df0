//! The fixed set of mappable building attributes and their typed values.
//!
//! Every attribute carries exactly one provenance source per snapshot. The
//! attribute list mirrors the columns a building record is mapped onto during
//! ingestion; anything outside it lives in a snapshot's extension map.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, IntoStaticStr};

use crate::{Error, Result};

// ─── Attribute ───────────────────────────────────────────────────────────────

/// A mappable building attribute. The snake_case name is the key used in
/// edits, the flat representation, and storage.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  EnumIter,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Attribute {
  // ── Identifiers ─────────────────────────────────────────────────────────
  TaxLotId,
  PmPropertyId,
  #[serde(rename = "custom_id_1")]
  #[strum(serialize = "custom_id_1")]
  CustomId1,
  LotNumber,
  BlockNumber,

  // ── Ownership ───────────────────────────────────────────────────────────
  PropertyNotes,
  YearEnding,
  District,
  Owner,
  OwnerEmail,
  OwnerTelephone,
  OwnerAddress,
  OwnerCityState,
  OwnerPostalCode,

  // ── Property ────────────────────────────────────────────────────────────
  PropertyName,
  BuildingCount,
  GrossFloorArea,
  #[serde(rename = "address_line_1")]
  #[strum(serialize = "address_line_1")]
  AddressLine1,
  #[serde(rename = "address_line_2")]
  #[strum(serialize = "address_line_2")]
  AddressLine2,
  City,
  PostalCode,
  YearBuilt,
  RecentSaleDate,
  StateProvince,
  BuildingCertification,
  ConditionedFloorArea,
  OccupiedFloorArea,
  UseDescription,

  // ── Energy ──────────────────────────────────────────────────────────────
  EnergyScore,
  SiteEui,
  GenerationDate,
  ReleaseDate,
  SiteEuiWeatherNormalized,
  SourceEui,
  SourceEuiWeatherNormalized,
  EnergyAlerts,
  SpaceAlerts,
}

/// The storage type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
  Text,
  Integer,
  Float,
  Date,
  Timestamp,
}

impl Attribute {
  pub fn as_str(self) -> &'static str { self.into() }

  pub fn kind(self) -> ValueKind {
    use Attribute::*;
    match self {
      BuildingCount | YearBuilt | EnergyScore => ValueKind::Integer,
      GrossFloorArea
      | SiteEui
      | SiteEuiWeatherNormalized
      | SourceEui
      | SourceEuiWeatherNormalized
      | ConditionedFloorArea
      | OccupiedFloorArea => ValueKind::Float,
      YearEnding => ValueKind::Date,
      RecentSaleDate | GenerationDate | ReleaseDate => ValueKind::Timestamp,
      _ => ValueKind::Text,
    }
  }

  /// Identifier attributes are truncated to the configured storage limit
  /// instead of being rejected.
  pub fn is_identifier(self) -> bool {
    matches!(
      self,
      Self::TaxLotId
        | Self::PmPropertyId
        | Self::CustomId1
        | Self::LotNumber
        | Self::BlockNumber
    )
  }
}

impl std::fmt::Display for Attribute {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── AttributeValue ──────────────────────────────────────────────────────────

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
  Text(String),
  Integer(i64),
  Float(f64),
  Date(NaiveDate),
  Timestamp(DateTime<Utc>),
}

impl AttributeValue {
  pub fn text(s: impl Into<String>) -> Self { Self::Text(s.into()) }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  /// The plain JSON form used by the flat representation.
  pub fn to_json(&self) -> serde_json::Value {
    match self {
      Self::Text(s) => serde_json::Value::String(s.clone()),
      Self::Integer(i) => serde_json::Value::from(*i),
      Self::Float(f) => serde_json::Number::from_f64(*f)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null),
      Self::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
      Self::Timestamp(ts) => serde_json::Value::String(ts.to_rfc3339()),
    }
  }

  /// Parse an untyped JSON value into the kind `attr` stores.
  ///
  /// `null` and, for non-text kinds, blank strings parse to `None`.
  pub fn from_json(attr: Attribute, value: &serde_json::Value) -> Result<Option<Self>> {
    use serde_json::Value;

    let invalid = || {
      Error::Validation(format!("{attr}: {value} is not a valid {:?} value", attr.kind()))
    };

    if value.is_null() {
      return Ok(None);
    }
    if attr.kind() != ValueKind::Text
      && let Value::String(s) = value
      && s.trim().is_empty()
    {
      return Ok(None);
    }

    let parsed = match (attr.kind(), value) {
      (ValueKind::Text, Value::String(s)) => Self::Text(s.clone()),
      (ValueKind::Text, Value::Number(n)) => Self::Text(n.to_string()),
      (ValueKind::Text, Value::Bool(b)) => Self::Text(b.to_string()),

      (ValueKind::Integer, Value::Number(n)) => match n.as_i64() {
        Some(i) => Self::Integer(i),
        None => Self::Integer(whole(n.as_f64()).ok_or_else(invalid)?),
      },
      (ValueKind::Integer, Value::String(s)) => {
        let s = s.trim();
        match s.parse::<i64>() {
          Ok(i) => Self::Integer(i),
          Err(_) => Self::Integer(whole(s.parse::<f64>().ok()).ok_or_else(invalid)?),
        }
      }

      (ValueKind::Float, Value::Number(n)) => Self::Float(n.as_f64().ok_or_else(invalid)?),
      (ValueKind::Float, Value::String(s)) => {
        Self::Float(s.trim().parse::<f64>().map_err(|_| invalid())?)
      }

      (ValueKind::Date, Value::String(s)) => {
        Self::Date(parse_datestr(s).ok_or_else(|| date_error(attr, s))?.date_naive())
      }
      (ValueKind::Timestamp, Value::String(s)) => {
        Self::Timestamp(parse_datestr(s).ok_or_else(|| date_error(attr, s))?)
      }

      _ => return Err(invalid()),
    };

    Ok(Some(parsed))
  }

  /// Coerce a typed value into the kind `attr` stores and apply storage
  /// limits. Date-like text is parsed; over-long identifiers are truncated.
  pub fn normalize(self, attr: Attribute, identifier_max_len: usize) -> Result<Self> {
    let value = match (attr.kind(), self) {
      (ValueKind::Text, Self::Text(s)) => Self::Text(s),
      (ValueKind::Integer, v @ Self::Integer(_)) => v,
      (ValueKind::Float, v @ Self::Float(_)) => v,
      (ValueKind::Float, Self::Integer(i)) => Self::Float(i as f64),
      (ValueKind::Date, v @ Self::Date(_)) => v,
      (ValueKind::Date, Self::Timestamp(ts)) => Self::Date(ts.date_naive()),
      (ValueKind::Timestamp, v @ Self::Timestamp(_)) => v,
      (ValueKind::Timestamp, Self::Date(d)) => Self::Timestamp(d.and_time(NaiveTime::MIN).and_utc()),
      (_, Self::Text(s)) => {
        return Self::from_json(attr, &serde_json::Value::String(s))?
          .ok_or_else(|| Error::Validation(format!("{attr}: blank value")));
      }
      (kind, other) => {
        return Err(Error::Validation(format!(
          "{attr}: expected a {kind:?} value, got {other:?}"
        )));
      }
    };

    Ok(match value {
      Self::Text(s) if attr.is_identifier() && s.chars().count() > identifier_max_len => {
        Self::Text(s.chars().take(identifier_max_len).collect())
      }
      other => other,
    })
  }
}

/// `f` as an integer, if it is whole and fits in an `i64`.
fn whole(f: Option<f64>) -> Option<i64> {
  // 2^63 is exactly representable; anything at or above it would saturate.
  const LIMIT: f64 = 9_223_372_036_854_775_808.0;
  f.filter(|f| f.is_finite() && f.fract() == 0.0 && *f >= -LIMIT && *f < LIMIT)
    .map(|f| f as i64)
}

fn date_error(attr: Attribute, value: &str) -> Error {
  Error::InvalidDate { field: attr.to_string(), value: value.to_owned() }
}

// ─── Date strings ────────────────────────────────────────────────────────────

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Parse a date-like string. Naive inputs are taken to be UTC; date-only
/// inputs resolve to midnight.
pub fn parse_datestr(s: &str) -> Option<DateTime<Utc>> {
  let s = s.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  for fmt in DATETIME_FORMATS {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
      return Some(dt.and_utc());
    }
  }
  for fmt in DATE_FORMATS {
    if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
      return Some(d.and_time(NaiveTime::MIN).and_utc());
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use serde_json::json;
  use strum::IntoEnumIterator;

  use super::*;

  #[test]
  fn names_round_trip_through_strum_and_serde() {
    for attr in Attribute::iter() {
      assert_eq!(Attribute::from_str(attr.as_str()).unwrap(), attr);
      let json = serde_json::to_value(attr).unwrap();
      assert_eq!(json, json!(attr.as_str()));
    }
    assert_eq!(Attribute::CustomId1.as_str(), "custom_id_1");
    assert_eq!(Attribute::AddressLine1.as_str(), "address_line_1");
  }

  #[test]
  fn date_strings_normalise_to_dates() {
    let v = AttributeValue::from_json(Attribute::YearEnding, &json!("12/31/2013")).unwrap();
    assert_eq!(v, Some(AttributeValue::Date(NaiveDate::from_ymd_opt(2013, 12, 31).unwrap())));

    let v = AttributeValue::text("2014-03-01").normalize(Attribute::ReleaseDate, 128).unwrap();
    match v {
      AttributeValue::Timestamp(ts) => assert_eq!(ts.to_rfc3339(), "2014-03-01T00:00:00+00:00"),
      other => panic!("expected timestamp, got {other:?}"),
    }
  }

  #[test]
  fn integers_outside_i64_are_rejected_not_clamped() {
    let v = AttributeValue::from_json(Attribute::BuildingCount, &json!(12.0)).unwrap();
    assert_eq!(v, Some(AttributeValue::Integer(12)));

    for huge in [json!(1e20), json!("-1e20"), json!(9_223_372_036_854_775_808.0_f64)] {
      let err = AttributeValue::from_json(Attribute::BuildingCount, &huge).unwrap_err();
      assert!(matches!(err, Error::Validation(_)), "{huge} gave {err:?}");
    }
  }

  #[test]
  fn unparsable_date_is_rejected() {
    let err = AttributeValue::from_json(Attribute::YearEnding, &json!("last spring")).unwrap_err();
    assert!(matches!(err, Error::InvalidDate { .. }));
    assert!(err.is_recoverable());
  }

  #[test]
  fn identifiers_are_truncated_not_rejected() {
    let long = "x".repeat(200);
    let v = AttributeValue::text(long.clone()).normalize(Attribute::CustomId1, 128).unwrap();
    assert_eq!(v.as_text().unwrap().len(), 128);

    let v = AttributeValue::text(long).normalize(Attribute::PropertyNotes, 128).unwrap();
    assert_eq!(v.as_text().unwrap().len(), 200);
  }

  #[test]
  fn numbers_parse_from_strings() {
    assert_eq!(
      AttributeValue::from_json(Attribute::GrossFloorArea, &json!("1200.5")).unwrap(),
      Some(AttributeValue::Float(1200.5))
    );
    assert_eq!(
      AttributeValue::from_json(Attribute::YearBuilt, &json!(1931.0)).unwrap(),
      Some(AttributeValue::Integer(1931))
    );
    assert_eq!(AttributeValue::from_json(Attribute::YearBuilt, &json!(" ")).unwrap(), None);
    assert!(AttributeValue::from_json(Attribute::EnergyScore, &json!("high")).is_err());
  }
}
