//! Store configuration, read from an optional TOML file overlaid with
//! `CORNERSTONE__*` environment variables.
//!
//! ```toml
//! store_path = "/var/lib/cornerstone/buildings.db"
//!
//! [engine]
//! identifier_max_len = 128
//!
//! [engine.merge]
//! prefer = "left"
//!
//! [engine.unmerge]
//! anchor = "first_parent"
//! fold   = "full"
//! ```
//!
//! Nested keys are separated by `__` in the environment, e.g.
//! `CORNERSTONE__ENGINE__UNMERGE__FOLD=frontier`.

use std::path::{Path, PathBuf};

use cornerstone_core::settings::EngineSettings;
use serde::Deserialize;

use crate::Result;

pub const ENV_PREFIX: &str = "CORNERSTONE";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  pub store_path: PathBuf,
  pub engine:     EngineSettings,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      store_path: PathBuf::from("cornerstone.db"),
      engine:     EngineSettings::default(),
    }
  }
}

impl StoreConfig {
  /// Load from `path` (if it exists) and the environment.
  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path.as_ref()).required(false))
      .add_source(
        config::Environment::with_prefix(ENV_PREFIX)
          .separator("__")
          .try_parsing(true),
      )
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  /// Parse a TOML document without consulting the environment.
  pub fn from_toml_str(toml: &str) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()?;
    Ok(settings.try_deserialize()?)
  }
}

#[cfg(test)]
mod tests {
  use cornerstone_core::settings::{FoldScope, ParentAnchor, Side};

  use super::*;

  #[test]
  fn empty_document_yields_defaults() {
    assert_eq!(StoreConfig::from_toml_str("").unwrap(), StoreConfig::default());
  }

  #[test]
  fn nested_engine_tables_are_read() {
    let cfg = StoreConfig::from_toml_str(
      r#"
        store_path = "/tmp/b.db"

        [engine]
        identifier_max_len = 64

        [engine.merge]
        prefer = "right"

        [engine.unmerge]
        anchor = "last_parent"
        fold = "frontier"
      "#,
    )
    .unwrap();

    assert_eq!(cfg.store_path, PathBuf::from("/tmp/b.db"));
    assert_eq!(cfg.engine.identifier_max_len, 64);
    assert_eq!(cfg.engine.merge.prefer, Side::Right);
    assert_eq!(cfg.engine.unmerge.anchor, ParentAnchor::LastParent);
    assert_eq!(cfg.engine.unmerge.fold, FoldScope::Frontier);
  }

  #[test]
  fn environment_overrides_the_file() {
    let path = std::env::temp_dir().join(format!("cornerstone-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(
      &path,
      "store_path = \"/tmp/file.db\"\n\n[engine]\nidentifier_max_len = 64\n\n[engine.unmerge]\nfold = \"full\"\n",
    )
    .unwrap();

    // No other test reads the environment.
    unsafe {
      std::env::set_var("CORNERSTONE__ENGINE__UNMERGE__FOLD", "frontier");
      std::env::set_var("CORNERSTONE__ENGINE__IDENTIFIER_MAX_LEN", "32");
    }
    let loaded = StoreConfig::load(&path);
    unsafe {
      std::env::remove_var("CORNERSTONE__ENGINE__UNMERGE__FOLD");
      std::env::remove_var("CORNERSTONE__ENGINE__IDENTIFIER_MAX_LEN");
    }
    let _ = std::fs::remove_file(&path);

    let cfg = loaded.unwrap();
    assert_eq!(cfg.store_path, PathBuf::from("/tmp/file.db"));
    assert_eq!(cfg.engine.unmerge.fold, FoldScope::Frontier);
    assert_eq!(cfg.engine.identifier_max_len, 32);
  }

  #[test]
  fn missing_file_falls_back_to_defaults() {
    let path = std::env::temp_dir().join(format!("cornerstone-{}.toml", uuid::Uuid::new_v4()));
    assert_eq!(StoreConfig::load(&path).unwrap(), StoreConfig::default());
  }

  #[test]
  fn unknown_enum_values_are_rejected() {
    let err = StoreConfig::from_toml_str("[engine.unmerge]\nfold = \"sideways\"").unwrap_err();
    assert!(matches!(err, crate::Error::Config(_)));
  }
}
