//! Engine tuning knobs. Every field has a default, so an empty config table
//! deserialises to [`EngineSettings::default`].

use serde::{Deserialize, Serialize};

/// Storage limit applied to identifier attributes unless configured.
pub const DEFAULT_IDENTIFIER_MAX_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
  /// Identifier attributes longer than this are truncated on write.
  pub identifier_max_len: usize,
  pub merge:              MergeSettings,
  pub unmerge:            UnmergeSettings,
}

impl Default for EngineSettings {
  fn default() -> Self {
    Self {
      identifier_max_len: DEFAULT_IDENTIFIER_MAX_LEN,
      merge:              MergeSettings::default(),
      unmerge:            UnmergeSettings::default(),
    }
  }
}

/// One side of a two-parent merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
  #[default]
  Left,
  Right,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSettings {
  /// Side the built-in policy favours when both parents carry a value.
  pub prefer: Side,
}

/// Which parent a leaf unmerge re-anchors on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentAnchor {
  #[default]
  FirstParent,
  LastParent,
}

/// Which surviving ancestors an unmerge folds back together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldScope {
  /// Every remaining ancestor of the old leaf, in merge order.
  #[default]
  Full,
  /// Only remaining ancestors that are not themselves ancestors of another
  /// remaining node.
  Frontier,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnmergeSettings {
  pub anchor: ParentAnchor,
  pub fold:   FoldScope,
}
