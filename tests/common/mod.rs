//! Shared fixture: a small BHSA-shaped corpus with the full type ladder
//! `book / chapter / verse / clause / phrase / word`.
//!
//! Layout: 2 books; Genesis has chapters 1-2, Exodus has chapter 1; every
//! chapter has 2 verses; every verse is one clause of two phrases with two
//! words each. Slots are words `1..=24`.
//!
//! Word features follow a fixed cycle per verse: `verb subs subs prep`,
//! with `vt` (`perf`/`impf`, alternating per verse) on verbs only. The
//! first phrase of every clause has `function=Pred`, the second
//! `function=Subj`. The `distance` edge chains verses with int values and
//! deliberately includes an edge to the non-existent node 999999 plus one
//! valueless edge, and the `number` int feature covers only slots 1..=10.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use context_fabric::compile::{compile, CorpusSource, EdgeFeatureSource, NodeFeatureSource};
use context_fabric::storage::{SectionConfig, ValueType};
use context_fabric::{Api, Fabric, FeatureSpec, FeatureValue};

pub const SLOTS: u32 = 24;
pub const BOOK1: u32 = 25;
pub const BOOK2: u32 = 26;
pub const CHAPTER1: u32 = 27;
pub const VERSE1: u32 = 30;
pub const CLAUSE1: u32 = 36;
pub const PHRASE1: u32 = 42;
pub const NODE_COUNT: u32 = 53;

fn str_feature(values: BTreeMap<u32, FeatureValue>) -> NodeFeatureSource {
    NodeFeatureSource {
        value_type: ValueType::Str,
        description: String::new(),
        values,
    }
}

fn int_feature(values: BTreeMap<u32, FeatureValue>) -> NodeFeatureSource {
    NodeFeatureSource {
        value_type: ValueType::Int,
        description: String::new(),
        values,
    }
}

/// The fixture corpus as compiler input.
pub fn build_source() -> CorpusSource {
    let mut node_types = Vec::new();
    let mut oslots: Vec<Vec<u32>> = Vec::new();

    // Books 25-26.
    node_types.extend(["book".to_string(), "book".to_string()]);
    oslots.push((1..=16).collect());
    oslots.push((17..=24).collect());

    // Chapters 27-29.
    for range in [(1..=8), (9..=16), (17..=24)] {
        node_types.push("chapter".to_string());
        oslots.push(range.collect());
    }

    // Verses 30-35 and clauses 36-41 cover the same four slots each.
    for kind in ["verse", "clause"] {
        for v in 0..6u32 {
            node_types.push(kind.to_string());
            oslots.push((4 * v + 1..=4 * v + 4).collect());
        }
    }

    // Phrases 42-53: two per clause.
    for v in 0..6u32 {
        node_types.push("phrase".to_string());
        oslots.push(vec![4 * v + 1, 4 * v + 2]);
        node_types.push("phrase".to_string());
        oslots.push(vec![4 * v + 3, 4 * v + 4]);
    }

    let mut book = BTreeMap::new();
    book.insert(BOOK1, FeatureValue::from("Genesis"));
    book.insert(BOOK2, FeatureValue::from("Exodus"));

    let mut chapter = BTreeMap::new();
    chapter.insert(CHAPTER1, FeatureValue::Int(1));
    chapter.insert(CHAPTER1 + 1, FeatureValue::Int(2));
    chapter.insert(CHAPTER1 + 2, FeatureValue::Int(1));

    let mut verse = BTreeMap::new();
    for v in 0..6u32 {
        verse.insert(VERSE1 + v, FeatureValue::Int(v as i32 % 2 + 1));
    }

    let mut g_word = BTreeMap::new();
    let mut trailer = BTreeMap::new();
    let mut sp = BTreeMap::new();
    let mut vt = BTreeMap::new();
    let mut number = BTreeMap::new();
    for i in 1..=SLOTS {
        g_word.insert(i, FeatureValue::Str(format!("w{i:02}")));
        trailer.insert(
            i,
            FeatureValue::from(if i % 4 == 0 { "" } else { " " }),
        );
        sp.insert(
            i,
            FeatureValue::from(match i % 4 {
                1 => "verb",
                2 | 3 => "subs",
                _ => "prep",
            }),
        );
        if i % 4 == 1 {
            let verse_index = (i - 1) / 4;
            vt.insert(
                i,
                FeatureValue::from(if verse_index % 2 == 0 { "perf" } else { "impf" }),
            );
        }
        if i <= 10 {
            number.insert(i, FeatureValue::Int(i as i32));
        }
    }

    let mut function = BTreeMap::new();
    for p in 0..12u32 {
        function.insert(
            PHRASE1 + p,
            FeatureValue::from(if p % 2 == 0 { "Pred" } else { "Subj" }),
        );
    }

    let mut node_features = BTreeMap::new();
    node_features.insert("book".to_string(), str_feature(book));
    node_features.insert("chapter".to_string(), int_feature(chapter));
    node_features.insert("verse".to_string(), int_feature(verse));
    node_features.insert("g_word".to_string(), str_feature(g_word));
    node_features.insert("trailer".to_string(), str_feature(trailer));
    node_features.insert("sp".to_string(), str_feature(sp));
    node_features.insert("vt".to_string(), str_feature(vt));
    node_features.insert("number".to_string(), int_feature(number));
    node_features.insert("function".to_string(), str_feature(function));

    // mother: second phrase of a clause points at the first.
    let mut mother_edges: BTreeMap<u32, BTreeMap<u32, Option<FeatureValue>>> = BTreeMap::new();
    for v in 0..6u32 {
        mother_edges
            .entry(PHRASE1 + 2 * v + 1)
            .or_default()
            .insert(PHRASE1 + 2 * v, None);
    }

    // distance: verse chain with int values, one edge out of bounds, one
    // edge without a value.
    let mut distance_edges: BTreeMap<u32, BTreeMap<u32, Option<FeatureValue>>> = BTreeMap::new();
    for v in 0..5u32 {
        distance_edges
            .entry(VERSE1 + v)
            .or_default()
            .insert(VERSE1 + v + 1, Some(FeatureValue::Int(v as i32 + 1)));
    }
    distance_edges
        .entry(VERSE1)
        .or_default()
        .insert(999_999, Some(FeatureValue::Int(9)));
    distance_edges
        .entry(VERSE1 + 5)
        .or_default()
        .insert(VERSE1, None);

    let mut edge_features = BTreeMap::new();
    edge_features.insert(
        "mother".to_string(),
        EdgeFeatureSource {
            has_values: false,
            value_type: ValueType::Str,
            description: String::new(),
            edges: mother_edges,
        },
    );
    edge_features.insert(
        "distance".to_string(),
        EdgeFeatureSource {
            has_values: true,
            value_type: ValueType::Int,
            description: String::new(),
            edges: distance_edges,
        },
    );

    let mut text_formats = BTreeMap::new();
    text_formats.insert("text-orig-full".to_string(), "{g_word}{trailer}".to_string());
    text_formats.insert("text-alt".to_string(), "{vt/sp} ".to_string());

    CorpusSource {
        slot_type: "word".to_string(),
        slot_count: SLOTS,
        node_types,
        oslots,
        node_features,
        edge_features,
        text_formats,
        default_format: Some("text-orig-full".to_string()),
        sections: Some(SectionConfig {
            types: vec!["book".into(), "chapter".into(), "verse".into()],
            features: vec!["book".into(), "chapter".into(), "verse".into()],
        }),
    }
}

/// Compiles the fixture into `dir` and returns the version directory.
pub fn compile_fixture(dir: &Path) -> PathBuf {
    compile(&build_source(), dir, 1).expect("fixture compiles")
}

/// Compiles and opens the fixture with everything loaded.
pub fn open_fixture(dir: &Path) -> Api {
    compile_fixture(dir);
    let fabric = Fabric::open(dir).expect("fixture opens");
    fabric.load(FeatureSpec::All).expect("fixture loads")
}
