//! # Store Emission
//!
//! Serializes a validated [`CorpusSource`] plus its [`Precomputed`] warps
//! into a version directory. Every binary file gets a CRC-32 recorded in
//! `meta.json`; `meta.json` itself is written last, so a crashed compile
//! leaves a directory that `Store::open` refuses rather than a half-store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use tracing::{debug, info};

use super::precompute::{precompute, Precomputed};
use super::CorpusSource;
use crate::error::FabricError;
use crate::features::FeatureValue;
use crate::storage::{
    encode_csr, encode_csr_with_values, encode_i32_array, encode_u32_array, encode_u8_array,
    FeatureEntry, FeatureKind, Meta, StringPool, TypeEntry, ValueKind, ValueType, FORMAT_TAG,
    FORMAT_VERSION, MISSING_INT, MISSING_STR_INDEX, NONE_INT_VALUE,
};
use crate::Node;

const CRC32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// Compiles a corpus into `corpus_dir/v{version}`. Fails if that version
/// already exists: stores are append-only per version.
pub fn compile(source: &CorpusSource, corpus_dir: &Path, version: u32) -> Result<PathBuf> {
    source.validate().wrap_err("corpus source failed validation")?;

    let dest = corpus_dir.join(format!("v{version}"));
    ensure!(
        !dest.join("meta.json").exists(),
        "version v{version} already compiled at '{}'; stores are append-only per version",
        dest.display()
    );
    for sub in ["warp", "features", "edges"] {
        std::fs::create_dir_all(dest.join(sub))
            .map_err(|e| FabricError::io(dest.join(sub), e))?;
    }

    info!(corpus = %corpus_dir.display(), version, "compiling corpus");
    let pre = precompute(source);
    let mut writer = Writer {
        dest: &dest,
        checksums: BTreeMap::new(),
    };

    writer.emit_warps(source, &pre)?;
    let features = writer.emit_features(source)?;

    let slot_tid = pre
        .type_order
        .iter()
        .position(|t| *t == source.slot_type)
        .expect("slot type is in the type table");
    let types = pre
        .type_order
        .iter()
        .enumerate()
        .map(|(i, name)| TypeEntry {
            name: name.clone(),
            slot: i == slot_tid,
            count: pre.levels[i].2,
        })
        .collect();

    let meta = Meta {
        format: FORMAT_TAG.into(),
        format_version: FORMAT_VERSION,
        node_count: source.node_count(),
        slot_count: source.slot_count,
        slot_type: source.slot_type.clone(),
        types,
        features,
        text_formats: source.text_formats.clone(),
        default_format: source.default_format.clone(),
        sections: source.sections.clone(),
        checksums: writer.checksums,
    };
    meta.validate()?;
    meta.save(&dest.join("meta.json"))?;

    info!(nodes = meta.node_count, slots = meta.slot_count, "compilation complete");
    Ok(dest)
}

struct Writer<'a> {
    dest: &'a Path,
    checksums: BTreeMap<String, u32>,
}

impl Writer<'_> {
    fn write(&mut self, rel: &str, bytes: &[u8]) -> Result<()> {
        let path = self.dest.join(rel);
        std::fs::write(&path, bytes)
            .map_err(|e| FabricError::io(&path, e))
            .wrap_err_with(|| format!("failed to write '{rel}'"))?;
        self.checksums.insert(rel.to_string(), CRC32.checksum(bytes));
        Ok(())
    }

    fn emit_warps(&mut self, source: &CorpusSource, pre: &Precomputed) -> Result<()> {
        debug!("emitting warp arrays");
        self.write("warp/otype.bin", &encode_u8_array(&pre.otype_ids))?;
        self.write("warp/oslots.csr", &encode_csr(&source.oslots))?;
        self.write("warp/order.bin", &encode_u32_array(&pre.order))?;
        self.write("warp/rank.bin", &encode_u32_array(&pre.rank))?;

        let levels_flat: Vec<u32> = pre
            .levels
            .iter()
            .flat_map(|&(min, max, count)| [min, max, count])
            .collect();
        self.write("warp/levels.bin", &encode_u32_array(&levels_flat))?;

        self.write("warp/levUp.csr", &encode_csr(&pre.lev_up))?;
        self.write("warp/levDown.csr", &encode_csr(&pre.lev_down))?;

        let mut boundary = pre.first_slot.clone();
        boundary.extend_from_slice(&pre.last_slot);
        self.write("warp/boundary.bin", &encode_u32_array(&boundary))?;
        Ok(())
    }

    fn emit_features(&mut self, source: &CorpusSource) -> Result<BTreeMap<String, FeatureEntry>> {
        let n = source.node_count() as usize;
        let mut catalog = BTreeMap::new();

        for (name, feat) in &source.node_features {
            debug!(feature = %name, "compiling node feature");
            let (rel, present, distinct) = match feat.value_type {
                ValueType::Int => {
                    let mut values = vec![MISSING_INT; n];
                    let mut distinct: BTreeMap<i32, ()> = BTreeMap::new();
                    let mut present = 0u64;
                    for (&node, value) in &feat.values {
                        let FeatureValue::Int(v) = value else {
                            unreachable!("validated")
                        };
                        // Out-of-range nodes are importer noise; they read
                        // as absent everywhere, so nothing is emitted.
                        if node >= 1 && (node as usize) <= n {
                            values[(node - 1) as usize] = *v;
                            distinct.insert(*v, ());
                            present += 1;
                        }
                    }
                    let rel = format!("features/{name}.bin");
                    self.write(&rel, &encode_i32_array(&values))?;
                    (rel, present, distinct.len() as u64)
                }
                ValueType::Str => {
                    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
                    for (&node, value) in &feat.values {
                        let FeatureValue::Str(v) = value else {
                            unreachable!("validated")
                        };
                        if node >= 1 && (node as usize) <= n {
                            *counts.entry(v.as_str()).or_insert(0) += 1;
                        }
                    }
                    let pool = StringPool::from_counts(
                        counts.iter().map(|(v, c)| (v.to_string(), *c)).collect(),
                    );

                    let mut indices = vec![MISSING_STR_INDEX; n];
                    let mut present = 0u64;
                    for (&node, value) in &feat.values {
                        let FeatureValue::Str(v) = value else {
                            unreachable!("validated")
                        };
                        if node >= 1 && (node as usize) <= n {
                            indices[(node - 1) as usize] =
                                pool.lookup(v).expect("pooled above");
                            present += 1;
                        }
                    }
                    let rel = format!("features/{name}.str");
                    self.write(&rel, &encode_u32_array(&indices))?;
                    pool.save(&self.dest.join(format!("features/{name}.pool.json")))?;
                    (rel, present, pool.len() as u64)
                }
            };
            catalog.insert(
                name.clone(),
                FeatureEntry {
                    kind: FeatureKind::Node,
                    value_type: feat.value_type,
                    path: rel,
                    has_values: false,
                    present,
                    distinct,
                    description: feat.description.clone(),
                },
            );
        }

        for (name, feat) in &source.edge_features {
            debug!(feature = %name, "compiling edge feature");
            let (rel, present, distinct) = self.emit_edge(name, feat, n)?;
            catalog.insert(
                name.clone(),
                FeatureEntry {
                    kind: FeatureKind::Edge,
                    value_type: feat.value_type,
                    path: rel,
                    has_values: feat.has_values,
                    present,
                    distinct,
                    description: feat.description.clone(),
                },
            );
        }

        Ok(catalog)
    }

    fn emit_edge(
        &mut self,
        name: &str,
        feat: &super::EdgeFeatureSource,
        n: usize,
    ) -> Result<(String, u64, u64)> {
        let rel = format!("edges/{name}.csr");
        let mut rows: Vec<Vec<Node>> = vec![Vec::new(); n];
        let mut present = 0u64;

        if !feat.has_values {
            for (&src, targets) in &feat.edges {
                if src < 1 || src as usize > n {
                    continue;
                }
                for &dst in targets.keys() {
                    rows[(src - 1) as usize].push(dst);
                    present += 1;
                }
            }
            for row in &mut rows {
                row.sort_unstable();
            }
            self.write(&rel, &encode_csr(&rows))?;
            return Ok((rel, present, 0));
        }

        // Valued edges: a parallel word section. Int values are stored as
        // their bit pattern; string values as pool indices.
        let pool = if feat.value_type == ValueType::Str {
            let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
            for targets in feat.edges.values() {
                for value in targets.values().flatten() {
                    if let FeatureValue::Str(v) = value {
                        *counts.entry(v.as_str()).or_insert(0) += 1;
                    }
                }
            }
            Some(StringPool::from_counts(
                counts.iter().map(|(v, c)| (v.to_string(), *c)).collect(),
            ))
        } else {
            None
        };

        let mut words: Vec<Vec<u32>> = vec![Vec::new(); n];
        let mut distinct: BTreeMap<u32, ()> = BTreeMap::new();
        for (&src, targets) in &feat.edges {
            if src < 1 || src as usize > n {
                continue;
            }
            let i = (src - 1) as usize;
            // BTreeMap iteration keeps targets ascending.
            for (&dst, value) in targets {
                let word = match (value, &pool) {
                    (None, None) => NONE_INT_VALUE as u32,
                    (None, Some(_)) => MISSING_STR_INDEX,
                    (Some(FeatureValue::Int(v)), None) => *v as u32,
                    (Some(FeatureValue::Str(v)), Some(p)) => {
                        p.lookup(v).expect("pooled above")
                    }
                    _ => unreachable!("validated"),
                };
                rows[i].push(dst);
                words[i].push(word);
                if value.is_some() {
                    distinct.insert(word, ());
                }
                present += 1;
            }
        }

        let kind = match feat.value_type {
            ValueType::Int => ValueKind::Int,
            ValueType::Str => ValueKind::StrIndex,
        };
        self.write(&rel, &encode_csr_with_values(&rows, &words, kind))?;
        if let Some(pool) = &pool {
            pool.save(&self.dest.join(format!("edges/{name}.pool.json")))?;
        }
        Ok((rel, present, distinct.len() as u64))
    }
}
