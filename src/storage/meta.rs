//! # Corpus Metadata
//!
//! The `meta.json` descriptor at the root of every version directory. It is
//! the only file deserialized at open: corpus dimensions, the type table in
//! level order, the feature catalog, text formats, section configuration
//! and per-file checksums. Everything else stays mapped and untouched until
//! accessed.
//!
//! The type table's order *is* the level order: index 0 is the most
//! embedding type (books before chapters before ... before words). Type ids
//! stored in `warp/otype.bin` are indices into this table.

use std::collections::BTreeMap;
use std::path::Path;

use eyre::{ensure, Result, WrapErr};
use serde::{Deserialize, Serialize};

use crate::error::FabricError;

pub const FORMAT_TAG: &str = "cfm";
pub const FORMAT_VERSION: u32 = 1;

/// Fallback format name when a corpus declares no default.
pub const DEFAULT_FORMAT: &str = "text-orig-full";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeEntry {
    pub name: String,
    /// Whether this is the slot type (exactly one entry has this set).
    #[serde(default)]
    pub slot: bool,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Node,
    Edge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int,
    Str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureEntry {
    pub kind: FeatureKind,
    pub value_type: ValueType,
    /// Path of the backing file, relative to the version directory.
    pub path: String,
    /// For edge features: whether edges carry values.
    #[serde(default)]
    pub has_values: bool,
    /// Exact number of nodes (or edges) carrying a value.
    #[serde(default)]
    pub present: u64,
    /// Exact number of distinct values.
    #[serde(default)]
    pub distinct: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionConfig {
    /// Section types outermost first, e.g. `["book", "chapter", "verse"]`.
    pub types: Vec<String>,
    /// The features naming each section level, parallel to `types`.
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub format: String,
    pub format_version: u32,
    pub node_count: u32,
    pub slot_count: u32,
    pub slot_type: String,
    /// Type table in level order; `otype.bin` ids index into it.
    pub types: Vec<TypeEntry>,
    pub features: BTreeMap<String, FeatureEntry>,
    /// Named text formats, e.g. `"text-orig-full" -> "{g_word}{trailer}"`.
    #[serde(default)]
    pub text_formats: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<SectionConfig>,
    /// CRC-32 per binary file, relative path -> checksum.
    #[serde(default)]
    pub checksums: BTreeMap<String, u32>,
}

impl Meta {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| FabricError::io(path, e))
            .wrap_err_with(|| format!("failed to read '{}'", path.display()))?;
        let meta: Meta = serde_json::from_slice(&bytes).map_err(|e| {
            FabricError::corrupt(format!("'{}': invalid meta.json: {e}", path.display()))
        })?;
        meta.validate()
            .wrap_err_with(|| format!("invalid corpus metadata in '{}'", path.display()))?;
        Ok(meta)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).wrap_err("failed to serialize meta.json")?;
        std::fs::write(path, json)
            .map_err(|e| FabricError::io(path, e))
            .wrap_err_with(|| format!("failed to write '{}'", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.format == FORMAT_TAG,
            FabricError::corrupt(format!("format tag '{}', expected '{FORMAT_TAG}'", self.format))
        );
        if self.format_version != FORMAT_VERSION {
            return Err(FabricError::VersionMismatch {
                expected: FORMAT_VERSION,
                found: self.format_version,
            }
            .into());
        }
        ensure!(
            self.slot_count <= self.node_count,
            FabricError::corrupt(format!(
                "slot_count {} exceeds node_count {}",
                self.slot_count, self.node_count
            ))
        );
        ensure!(
            self.types.len() <= u8::MAX as usize,
            FabricError::corrupt(format!("{} node types exceed the u8 type id space", self.types.len()))
        );
        let slot_entries = self.types.iter().filter(|t| t.slot).count();
        ensure!(
            slot_entries == 1,
            FabricError::corrupt(format!("{slot_entries} slot types in type table, expected 1"))
        );
        let total: u64 = self.types.iter().map(|t| t.count as u64).sum();
        ensure!(
            total == self.node_count as u64,
            FabricError::corrupt(format!(
                "type counts sum to {total}, node_count is {}",
                self.node_count
            ))
        );
        if let Some(sections) = &self.sections {
            ensure!(
                sections.types.len() == sections.features.len(),
                FabricError::corrupt("section types and features differ in length")
            );
            ensure!(
                !sections.types.is_empty() && sections.types.len() <= 3,
                FabricError::corrupt("section hierarchy must have 1 to 3 levels")
            );
        }
        Ok(())
    }

    /// Type id (level-order index) of a type name.
    pub fn type_id(&self, name: &str) -> Option<u8> {
        self.types
            .iter()
            .position(|t| t.name == name)
            .map(|i| i as u8)
    }

    pub fn type_name(&self, id: u8) -> Option<&str> {
        self.types.get(id as usize).map(|t| t.name.as_str())
    }

    pub fn feature(&self, name: &str) -> Result<&FeatureEntry> {
        self.features.get(name).ok_or_else(|| {
            eyre::Report::new(FabricError::UnknownFeature {
                name: name.to_string(),
            })
        })
    }

    /// The name of the default text format.
    pub fn default_format(&self) -> &str {
        self.default_format.as_deref().unwrap_or(DEFAULT_FORMAT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_kind;

    fn minimal_meta() -> Meta {
        Meta {
            format: FORMAT_TAG.into(),
            format_version: FORMAT_VERSION,
            node_count: 10,
            slot_count: 7,
            slot_type: "word".into(),
            types: vec![
                TypeEntry {
                    name: "clause".into(),
                    slot: false,
                    count: 3,
                },
                TypeEntry {
                    name: "word".into(),
                    slot: true,
                    count: 7,
                },
            ],
            features: BTreeMap::new(),
            text_formats: BTreeMap::new(),
            default_format: None,
            sections: None,
            checksums: BTreeMap::new(),
        }
    }

    #[test]
    fn valid_meta_passes() {
        minimal_meta().validate().unwrap();
    }

    #[test]
    fn version_mismatch_is_typed() {
        let mut meta = minimal_meta();
        meta.format_version = 99;
        let err = meta.validate().unwrap_err();
        assert!(matches!(
            error_kind(&err),
            Some(crate::FabricError::VersionMismatch {
                expected: FORMAT_VERSION,
                found: 99
            })
        ));
    }

    #[test]
    fn type_count_mismatch_rejected() {
        let mut meta = minimal_meta();
        meta.types[0].count = 5;
        assert!(meta.validate().is_err());
    }

    #[test]
    fn type_ids_follow_level_order() {
        let meta = minimal_meta();
        assert_eq!(meta.type_id("clause"), Some(0));
        assert_eq!(meta.type_id("word"), Some(1));
        assert_eq!(meta.type_name(1), Some("word"));
        assert_eq!(meta.type_id("verse"), None);
    }
}
