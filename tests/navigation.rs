//! # Navigation and Feature Integration Tests
//!
//! The N / L / T operators and the feature backends against the fixture
//! corpus: canonical walks, locality, byte-exact text assembly, section
//! resolution in both directions, bulk-filter equivalence and edge
//! traversal with out-of-bounds targets.

mod common;

use context_fabric::error::error_kind;
use context_fabric::{FabricError, FeatureValue};
use tempfile::tempdir;

#[test]
fn full_walk_starts_with_the_outermost_container() {
    let dir = tempdir().unwrap();
    let api = common::open_fixture(dir.path());

    let walk: Vec<u32> = api.n().walk().collect();
    assert_eq!(walk.len(), common::NODE_COUNT as usize);
    // Book 1 covers slot 1 with the widest span; then its chapter, then
    // the slot-1 clause/verse pair, the first phrase, and word 1 itself.
    assert_eq!(
        &walk[..6],
        &[
            common::BOOK1,
            common::CHAPTER1,
            common::CLAUSE1,
            common::VERSE1,
            common::PHRASE1,
            1
        ]
    );
}

#[test]
fn typed_walk_clips_to_type_ranges() {
    let dir = tempdir().unwrap();
    let api = common::open_fixture(dir.path());

    let verses = api.n().walk_types(&["verse"]).unwrap();
    assert_eq!(verses, (common::VERSE1..common::VERSE1 + 6).collect::<Vec<_>>());

    let mixed = api.n().walk_types(&["book", "chapter"]).unwrap();
    assert_eq!(mixed.len(), 5);
    // Canonical order interleaves books with their chapters.
    assert_eq!(mixed[0], common::BOOK1);
    assert_eq!(mixed[1], common::CHAPTER1);

    let err = api.n().walk_types(&["paragraph"]).unwrap_err();
    assert!(matches!(
        error_kind(&err),
        Some(FabricError::UnknownType { .. })
    ));
}

#[test]
fn locality_up_down_with_type_filter() {
    let dir = tempdir().unwrap();
    let api = common::open_fixture(dir.path());

    let l = api.l();
    assert_eq!(l.up(1, Some("phrase")).unwrap(), vec![common::PHRASE1]);
    assert_eq!(l.up(1, Some("book")).unwrap(), vec![common::BOOK1]);
    assert_eq!(
        l.down(common::CLAUSE1, Some("phrase")).unwrap(),
        vec![common::PHRASE1, common::PHRASE1 + 1]
    );
    assert_eq!(
        l.down(common::CLAUSE1, Some("word")).unwrap(),
        vec![1, 2, 3, 4]
    );
    // Co-extensive verse and clause embed each other.
    assert_eq!(
        l.up(common::CLAUSE1, Some("verse")).unwrap(),
        vec![common::VERSE1]
    );
    assert_eq!(
        l.down(common::VERSE1, Some("clause")).unwrap(),
        vec![common::CLAUSE1]
    );
}

#[test]
fn locality_prev_next_stay_within_type() {
    let dir = tempdir().unwrap();
    let api = common::open_fixture(dir.path());

    let l = api.l();
    assert_eq!(l.next(1), Some(2));
    assert_eq!(l.prev(2), Some(1));
    assert_eq!(l.prev(1), None);
    assert_eq!(l.next(common::PHRASE1), Some(common::PHRASE1 + 1));
    assert_eq!(l.next(common::BOOK1), Some(common::BOOK2));
    assert_eq!(l.next(common::BOOK2), None);
}

#[test]
fn text_is_byte_exact() {
    let dir = tempdir().unwrap();
    let api = common::open_fixture(dir.path());

    let t = api.t();
    assert_eq!(t.text(common::VERSE1, None).unwrap(), "w01 w02 w03 w04");
    assert_eq!(t.text(1, None).unwrap(), "w01 ");
    assert_eq!(t.text(4, None).unwrap(), "w04");
    // The whole first chapter: two verses, no separator between them
    // beyond what the trailers carry.
    assert_eq!(
        t.text(common::CHAPTER1, None).unwrap(),
        "w01 w02 w03 w04w05 w06 w07 w08"
    );
}

#[test]
fn text_alternatives_fall_back_per_slot() {
    let dir = tempdir().unwrap();
    let api = common::open_fixture(dir.path());

    // {vt/sp}: verbs carry vt, everything else falls back to sp.
    assert_eq!(
        api.t().text(common::VERSE1, Some("text-alt")).unwrap(),
        "perf subs subs prep "
    );
}

#[test]
fn unknown_format_is_a_typed_error() {
    let dir = tempdir().unwrap();
    let api = common::open_fixture(dir.path());

    let err = api.t().text(1, Some("no-such-format")).unwrap_err();
    match error_kind(&err) {
        Some(FabricError::UnknownFormat { name }) => assert_eq!(name, "no-such-format"),
        other => panic!("expected UnknownFormat, got {other:?}"),
    }
}

#[test]
fn section_refs_resolve_both_ways() {
    let dir = tempdir().unwrap();
    let api = common::open_fixture(dir.path());
    let t = api.t();

    assert_eq!(t.section_ref(1).unwrap().unwrap().to_string(), "Genesis 1:1");
    assert_eq!(t.section_ref(24).unwrap().unwrap().to_string(), "Exodus 1:2");
    assert_eq!(
        t.section_ref(common::CHAPTER1).unwrap().unwrap().to_string(),
        "Genesis 1"
    );
    // Exodus has a single chapter co-extensive with the book, so the book
    // node resolves one level deeper than its own type.
    assert_eq!(
        t.section_ref(common::BOOK2).unwrap().unwrap().to_string(),
        "Exodus 1"
    );
    assert_eq!(
        t.section_ref(common::BOOK1).unwrap().unwrap().to_string(),
        "Genesis"
    );

    let verse = t
        .node_from_section(&[
            FeatureValue::from("Genesis"),
            FeatureValue::Int(1),
            FeatureValue::Int(1),
        ])
        .unwrap();
    assert_eq!(verse, Some(common::VERSE1));
    assert_eq!(
        api.t().text(verse.unwrap(), None).unwrap(),
        "w01 w02 w03 w04"
    );

    let missing = t
        .node_from_section(&[FeatureValue::from("Genesis"), FeatureValue::Int(9)])
        .unwrap();
    assert_eq!(missing, None);
}

#[test]
fn bulk_filters_agree_with_scalar_access() {
    let dir = tempdir().unwrap();
    let api = common::open_fixture(dir.path());

    let all: Vec<u32> = (1..=common::NODE_COUNT).collect();
    for feature in ["sp", "vt", "number", "function"] {
        let handle = api.f(feature).unwrap();
        for (value, _) in handle.freq_list() {
            let filtered = handle.filter_eq(&all, &value);
            let scalar: Vec<u32> = all
                .iter()
                .copied()
                .filter(|&n| handle.value(n).as_ref() == Some(&value))
                .collect();
            assert_eq!(filtered, scalar, "filter_eq({feature}, {value})");
        }
        let present = handle.filter_present(&all);
        let absent = handle.filter_absent(&all);
        assert_eq!(present.len() + absent.len(), all.len());
    }
}

#[test]
fn filter_variants_cover_their_contracts() {
    let dir = tempdir().unwrap();
    let api = common::open_fixture(dir.path());
    let sp = api.f("sp").unwrap();
    let words: Vec<u32> = (1..=common::SLOTS).collect();

    assert_eq!(sp.filter_eq(&words, &FeatureValue::from("verb")).len(), 6);
    assert_eq!(
        sp.filter_in(
            &words,
            &[FeatureValue::from("verb"), FeatureValue::from("prep")]
        )
        .len(),
        12
    );
    // ne excludes absent cells: all words carry sp, so ne(verb) = 18.
    assert_eq!(sp.filter_ne(&words, &FeatureValue::from("verb")).len(), 18);
    // Unknown value matches nothing rather than failing.
    assert!(sp.filter_eq(&words, &FeatureValue::from("zzz")).is_empty());

    // vt exists only on the 6 verbs.
    let vt = api.f("vt").unwrap();
    assert_eq!(vt.filter_present(&words).len(), 6);
    assert_eq!(vt.filter_absent(&words).len(), 18);

    // Out-of-bounds bulk inputs are dropped silently.
    let with_junk = vec![1, 999_999, 5];
    assert_eq!(sp.filter_eq(&with_junk, &FeatureValue::from("verb")), vec![1, 5]);
}

#[test]
fn int_feature_scalar_and_filters() {
    let dir = tempdir().unwrap();
    let api = common::open_fixture(dir.path());
    let number = api.f("number").unwrap();

    assert_eq!(number.value(3), Some(FeatureValue::Int(3)));
    assert_eq!(number.value(11), None);
    assert_eq!(number.int_value(7), Some(7));

    let words: Vec<u32> = (1..=common::SLOTS).collect();
    assert_eq!(number.filter_eq(&words, &FeatureValue::Int(5)), vec![5]);
    assert_eq!(number.filter_present(&words).len(), 10);
}

#[test]
fn freq_list_orders_by_count_then_value() {
    let dir = tempdir().unwrap();
    let api = common::open_fixture(dir.path());

    let freqs = api.f("sp").unwrap().freq_list();
    assert_eq!(
        freqs,
        vec![
            (FeatureValue::from("subs"), 12),
            (FeatureValue::from("prep"), 6),
            (FeatureValue::from("verb"), 6),
        ]
    );
}

#[test]
fn nodes_with_value_come_back_in_canonical_order() {
    let dir = tempdir().unwrap();
    let api = common::open_fixture(dir.path());

    let verbs = api
        .f("sp")
        .unwrap()
        .nodes_with_value(&FeatureValue::from("verb"));
    assert_eq!(verbs, vec![1, 5, 9, 13, 17, 21]);
}

#[test]
fn edge_traversal_and_values() {
    let dir = tempdir().unwrap();
    let api = common::open_fixture(dir.path());

    let mother = api.e("mother").unwrap();
    assert_eq!(
        mother.edges_from(common::PHRASE1 + 1).unwrap(),
        vec![(common::PHRASE1, None)]
    );
    assert_eq!(
        mother.edges_to(common::PHRASE1).unwrap(),
        vec![(common::PHRASE1 + 1, None)]
    );
    assert_eq!(
        mother.both(common::PHRASE1).unwrap(),
        vec![(common::PHRASE1 + 1, None)]
    );
    assert!(mother.edges_from(1).unwrap().is_empty());

    let distance = api.e("distance").unwrap();
    assert_eq!(
        distance.value(common::VERSE1, common::VERSE1 + 1).unwrap(),
        Some(FeatureValue::Int(1))
    );
    // The trailing edge carries no value; the edge itself exists.
    assert!(distance.has(common::VERSE1 + 5, common::VERSE1));
    assert_eq!(
        distance.value(common::VERSE1 + 5, common::VERSE1).unwrap(),
        None
    );
    assert_eq!(distance.value(common::VERSE1, common::VERSE1 + 3).unwrap(), None);
}

#[test]
fn edges_to_missing_nodes_are_skipped_in_traversal() {
    let dir = tempdir().unwrap();
    let api = common::open_fixture(dir.path());

    // Verse 1 has a compiled edge to node 999999; traversal drops it.
    let distance = api.e("distance").unwrap();
    let targets: Vec<u32> = distance
        .edges_from(common::VERSE1)
        .unwrap()
        .into_iter()
        .map(|(t, _)| t)
        .collect();
    assert_eq!(targets, vec![common::VERSE1 + 1]);

    assert!(distance.edges_from(999_999).unwrap().is_empty());
    assert!(distance.edges_to(999_999).unwrap().is_empty());
}

#[test]
fn describe_summarizes_the_corpus() {
    let dir = tempdir().unwrap();
    let api = common::open_fixture(dir.path());

    let info = api.describe();
    assert_eq!(info.slot_type, "word");
    assert_eq!(info.node_count, common::NODE_COUNT);
    assert_eq!(info.slot_count, common::SLOTS);
    assert_eq!(info.section_types, vec!["book", "chapter", "verse"]);
    assert_eq!(info.edge_features, vec!["distance", "mother"]);
    assert!(info.node_features.contains(&"sp".to_string()));

    let words = info.types.iter().find(|t| t.name == "word").unwrap();
    assert_eq!(words.count, 24);
}

#[test]
fn feature_histogram_metadata_is_exact() {
    let dir = tempdir().unwrap();
    let api = common::open_fixture(dir.path());

    let entry = api.feature_info("vt").unwrap();
    assert_eq!(entry.present, 6);
    assert_eq!(entry.distinct, 2);

    let entry = api.feature_info("number").unwrap();
    assert_eq!(entry.present, 10);
    assert_eq!(entry.distinct, 10);
}
