//! The field-arbitration seam used by merges.
//!
//! Deciding which parent's value wins is an external concern; the engine only
//! asks a [`MergePolicy`] for a side and copies that side's [`Field`] verbatim,
//! so provenance keeps pointing at the original contributor rather than at the
//! intermediate parent.

use crate::{
  attribute::Attribute,
  settings::Side,
  snapshot::{ExtraField, Field},
};

/// The outcome of arbitrating one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
  Left,
  Right,
  /// Neither side contributes; the merged snapshot leaves the field empty.
  Neither,
}

impl From<Side> for Pick {
  fn from(side: Side) -> Self {
    match side {
      Side::Left => Self::Left,
      Side::Right => Self::Right,
    }
  }
}

/// Chooses, per field, which parent of a merge supplies the value.
///
/// Picking a side that has no entry for the field is a policy bug and aborts
/// the merge with [`Error::InvalidProvenance`](crate::Error::InvalidProvenance).
pub trait MergePolicy: Send + Sync {
  fn pick_attribute(&self, attr: Attribute, left: Option<&Field>, right: Option<&Field>) -> Pick;

  fn pick_extra(&self, key: &str, left: Option<&ExtraField>, right: Option<&ExtraField>) -> Pick;
}

/// Takes whichever side has a value; when both do, takes `prefer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferPopulated {
  pub prefer: Side,
}

impl PreferPopulated {
  pub fn new(prefer: Side) -> Self { Self { prefer } }

  fn choose(&self, left: bool, right: bool) -> Pick {
    match (left, right) {
      (true, true) => self.prefer.into(),
      (true, false) => Pick::Left,
      (false, true) => Pick::Right,
      (false, false) => Pick::Neither,
    }
  }
}

impl MergePolicy for PreferPopulated {
  fn pick_attribute(&self, _attr: Attribute, left: Option<&Field>, right: Option<&Field>) -> Pick {
    let populated = |f: Option<&Field>| f.is_some_and(|f| f.value.is_some());
    self.choose(populated(left), populated(right))
  }

  fn pick_extra(&self, _key: &str, left: Option<&ExtraField>, right: Option<&ExtraField>) -> Pick {
    let populated = |f: Option<&ExtraField>| f.is_some_and(|f| !f.value.is_null());
    match self.choose(populated(left), populated(right)) {
      // Both null: keep whichever key exists so it is not silently dropped.
      Pick::Neither if left.is_some() => Pick::Left,
      Pick::Neither if right.is_some() => Pick::Right,
      pick => pick,
    }
  }
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;
  use crate::attribute::AttributeValue;

  #[test]
  fn populated_side_wins() {
    let policy = PreferPopulated::default();
    let l = Field { value: None, source: Uuid::new_v4() };
    let r = Field::new(AttributeValue::text("P1"), Uuid::new_v4());
    assert_eq!(policy.pick_attribute(Attribute::PmPropertyId, Some(&l), Some(&r)), Pick::Right);
    assert_eq!(policy.pick_attribute(Attribute::PmPropertyId, None, None), Pick::Neither);
  }

  #[test]
  fn conflicts_follow_preferred_side() {
    let l = Field::new(AttributeValue::text("100"), Uuid::new_v4());
    let r = Field::new(AttributeValue::text("200"), Uuid::new_v4());
    assert_eq!(
      PreferPopulated::new(Side::Left).pick_attribute(Attribute::TaxLotId, Some(&l), Some(&r)),
      Pick::Left
    );
    assert_eq!(
      PreferPopulated::new(Side::Right).pick_attribute(Attribute::TaxLotId, Some(&l), Some(&r)),
      Pick::Right
    );
  }
}
