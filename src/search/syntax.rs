//! # Template Syntax
//!
//! Parses the line-oriented search template into an atom tree:
//!
//! ```text
//! clause
//! % a comment
//!   phrase function=Pred
//!     word sp=verb vt=perf|impf
//!   <: phrase function=Subj
//! ```
//!
//! Each non-comment line declares an **atom**: a node type (`.` matches
//! any) followed by feature predicates (`f=v`, `f!=v`, `f=v1|v2`, `f~re`,
//! `f*` present, `f?` absent). Indentation embeds an atom in its parent;
//! same-indent siblings relate by canonical precedence `<` unless the line
//! opens with an explicit relation operator. Quantifier blocks
//! (`/where/../have/../-/`, `/without/../-/`, `/with/../or/../-/`) attach
//! to the preceding atom and carry sub-templates evaluated with that
//! atom's binding pinned.
//!
//! Parse failures report line, column, what was expected and what was
//! found; nothing executes on a parse error.

use eyre::Result;

use super::relation::{RelationOp, RELATION_OPS};
use crate::error::FabricError;

/// A parsed template: atoms plus the relation edges between them.
#[derive(Debug, Clone)]
pub struct Template {
    pub atoms: Vec<Atom>,
    pub edges: Vec<RelEdge>,
}

/// `atoms[left] op atoms[right]`.
#[derive(Debug, Clone, Copy)]
pub struct RelEdge {
    pub left: usize,
    pub right: usize,
    pub op: RelationOp,
}

#[derive(Debug, Clone)]
pub struct Atom {
    pub line: usize,
    pub indent: usize,
    /// `None` is the `.` wildcard.
    pub otype: Option<String>,
    pub preds: Vec<FeaturePred>,
    pub quants: Vec<Quantifier>,
}

#[derive(Debug, Clone)]
pub struct FeaturePred {
    pub line: usize,
    pub col: usize,
    pub feature: String,
    pub test: PredTest,
}

#[derive(Debug, Clone)]
pub enum PredTest {
    Eq(String),
    Ne(String),
    In(Vec<String>),
    Re(String),
    Present,
    Absent,
}

/// A quantifier block attached to an atom. Sub-templates start with a
/// pinned copy of the quantified atom at index 0.
#[derive(Debug, Clone)]
pub enum Quantifier {
    /// `/without/ .. /-/`: no match of the body may exist.
    Without(Template),
    /// `/where/ A /have/ B /-/`: every A-match extends to an A+B-match.
    Where { body: Template, have: Template },
    /// `/with/ A /or/ B /-/`: some alternative has a match.
    With(Vec<Template>),
}

const Q_WHERE: &str = "/where/";
const Q_HAVE: &str = "/have/";
const Q_WITHOUT: &str = "/without/";
const Q_WITH: &str = "/with/";
const Q_OR: &str = "/or/";
const Q_END: &str = "/-/";

fn perr(line: usize, col: usize, expected: &str, found: &str) -> eyre::Report {
    FabricError::TemplateParse {
        line,
        col,
        expected: expected.to_string(),
        found: found.to_string(),
    }
    .into()
}

/// Parses a template source into its atom tree.
pub fn parse(source: &str) -> Result<Template> {
    let lines: Vec<(usize, &str)> = source
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l))
        .collect();
    parse_lines(&lines)
}

fn is_skippable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('%')
}

fn parse_lines(lines: &[(usize, &str)]) -> Result<Template> {
    let mut atoms: Vec<Atom> = Vec::new();
    let mut parents: Vec<Option<usize>> = Vec::new();
    let mut edges: Vec<RelEdge> = Vec::new();
    // Ancestor chain of atom indices.
    let mut stack: Vec<usize> = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let (line_no, raw) = lines[i];
        if is_skippable(raw) {
            i += 1;
            continue;
        }

        let trimmed = raw.trim();
        if [Q_WHERE, Q_WITHOUT, Q_WITH].contains(&trimmed) {
            let consumed = parse_quantifier(&lines[i..], &mut atoms)?;
            i += consumed;
            continue;
        }
        if [Q_HAVE, Q_OR, Q_END].contains(&trimmed) {
            return Err(perr(line_no, 1, "an atom or quantifier opener", trimmed));
        }

        let atom_idx = atoms.len();
        let (atom, explicit_op) = parse_atom_line(line_no, raw)?;

        // The parent is the nearest shallower atom on the stack.
        while let Some(&top) = stack.last() {
            if atoms[top].indent >= atom.indent {
                stack.pop();
            } else {
                break;
            }
        }
        let parent = stack.last().copied();

        // The previous sibling is the last atom under the same parent; its
        // indent must agree or the tree is ambiguous.
        let sibling = (0..atoms.len()).rev().find(|&idx| parents[idx] == parent);
        if let Some(prev) = sibling {
            if atoms[prev].indent != atom.indent {
                return Err(perr(
                    line_no,
                    atom.indent + 1,
                    &format!("indentation of {} matching its sibling", atoms[prev].indent),
                    trimmed,
                ));
            }
        }

        if let Some(p) = parent {
            edges.push(RelEdge {
                left: atom_idx,
                right: p,
                op: RelationOp::EmbeddedIn,
            });
        }
        match (sibling, explicit_op) {
            (Some(prev), Some(op)) => edges.push(RelEdge {
                left: prev,
                right: atom_idx,
                op,
            }),
            (Some(prev), None) => edges.push(RelEdge {
                left: prev,
                right: atom_idx,
                op: RelationOp::Before,
            }),
            (None, Some(_)) => {
                return Err(perr(
                    line_no,
                    atom.indent + 1,
                    "a preceding sibling for the relation",
                    trimmed,
                ));
            }
            (None, None) => {}
        }

        atoms.push(atom);
        parents.push(parent);
        stack.push(atom_idx);
        i += 1;
    }

    if atoms.is_empty() {
        return Err(perr(1, 1, "at least one atom", "empty template"));
    }
    Ok(Template { atoms, edges })
}

/// Parses one atom line: optional relation operator, type, predicates.
fn parse_atom_line(line_no: usize, raw: &str) -> Result<(Atom, Option<RelationOp>)> {
    let indent = raw.len() - raw.trim_start_matches(' ').len();
    if raw[indent..].starts_with('\t') {
        return Err(perr(line_no, 1, "space indentation", "tab"));
    }
    let trimmed = raw.trim();
    let mut rest = trimmed;

    // Longest operator spelling first, so `<<` is not read as `<`.
    let mut explicit_op = None;
    let mut ops: Vec<(&&str, &RelationOp)> = RELATION_OPS.entries().collect();
    ops.sort_by_key(|(k, _)| std::cmp::Reverse(k.len()));
    for (key, op) in ops {
        if let Some(after) = rest.strip_prefix(*key) {
            if after.starts_with(' ') {
                explicit_op = Some(*op);
                rest = after.trim_start();
                break;
            }
        }
    }
    let col = indent + (trimmed.len() - rest.len()) + 1;

    let mut tokens = rest.split_whitespace();
    let Some(type_token) = tokens.next() else {
        return Err(perr(line_no, col, "a node type", ""));
    };
    let otype = if type_token == "." {
        None
    } else {
        if !is_name(type_token) {
            return Err(perr(line_no, col, "a node type or '.'", type_token));
        }
        Some(type_token.to_string())
    };

    let mut preds = Vec::new();
    for token in tokens {
        let col = raw.find(token).map(|p| p + 1).unwrap_or(1);
        preds.push(parse_pred(line_no, col, token)?);
    }

    Ok((
        Atom {
            line: line_no,
            indent,
            otype,
            preds,
            quants: Vec::new(),
        },
        explicit_op,
    ))
}

fn parse_pred(line: usize, col: usize, token: &str) -> Result<FeaturePred> {
    let build = |feature: &str, test: PredTest| -> Result<FeaturePred> {
        if !is_name(feature) {
            return Err(perr(line, col, "a feature name", token));
        }
        Ok(FeaturePred {
            line,
            col,
            feature: feature.to_string(),
            test,
        })
    };

    if let Some(name) = token.strip_suffix('*') {
        return build(name, PredTest::Present);
    }
    if let Some(name) = token.strip_suffix('?') {
        return build(name, PredTest::Absent);
    }
    if let Some((name, re)) = token.split_once('~') {
        return build(name, PredTest::Re(re.to_string()));
    }
    if let Some((name, value)) = token.split_once("!=") {
        return build(name, PredTest::Ne(value.to_string()));
    }
    if let Some((name, value)) = token.split_once('=') {
        if value.contains('|') {
            let values = value.split('|').map(str::to_string).collect();
            return build(name, PredTest::In(values));
        }
        return build(name, PredTest::Eq(value.to_string()));
    }
    Err(perr(
        line,
        col,
        "a feature predicate (f=v, f!=v, f~re, f*, f?)",
        token,
    ))
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses one quantifier block starting at `lines[0]` (the opener) and
/// attaches it to the last atom. Returns the number of lines consumed.
fn parse_quantifier(lines: &[(usize, &str)], atoms: &mut [Atom]) -> Result<usize> {
    let (open_line, opener_raw) = lines[0];
    let opener = opener_raw.trim();

    let Some(owner) = atoms.last_mut() else {
        return Err(perr(open_line, 1, "an atom before the quantifier", opener));
    };

    // Collect segments up to the matching /-/, tracking nesting.
    let mut segments: Vec<Vec<(usize, &str)>> = vec![Vec::new()];
    let mut separators: Vec<&str> = Vec::new();
    let mut depth = 0usize;
    let mut consumed = None;
    for (offset, &(line_no, raw)) in lines.iter().enumerate().skip(1) {
        let trimmed = raw.trim();
        if [Q_WHERE, Q_WITHOUT, Q_WITH].contains(&trimmed) {
            depth += 1;
        } else if trimmed == Q_END {
            if depth == 0 {
                consumed = Some(offset + 1);
                break;
            }
            depth -= 1;
        } else if depth == 0 && [Q_HAVE, Q_OR].contains(&trimmed) {
            separators.push(trimmed);
            segments.push(Vec::new());
            continue;
        }
        segments.last_mut().expect("non-empty").push((line_no, raw));
    }
    let Some(consumed) = consumed else {
        return Err(perr(open_line, 1, "a closing /-/", opener));
    };

    // Sub-templates open with a pinned copy of the owning atom: type only,
    // at the owner's indent, so the body lines nest under it.
    let pin_source = format!(
        "{}{}",
        " ".repeat(owner.indent),
        owner.otype.as_deref().unwrap_or(".")
    );
    let pin_line = (owner.line, pin_source.as_str());
    let sub = |segs: &[&[(usize, &str)]]| -> Result<Template> {
        let mut sub_lines = vec![pin_line];
        for seg in segs {
            sub_lines.extend_from_slice(seg);
        }
        parse_lines(&sub_lines)
    };

    let quant = match opener {
        Q_WITHOUT => {
            if !separators.is_empty() {
                return Err(perr(open_line, 1, "no separators in /without/", separators[0]));
            }
            Quantifier::Without(sub(&[segments[0].as_slice()])?)
        }
        Q_WHERE => {
            if separators != [Q_HAVE] {
                return Err(perr(open_line, 1, "exactly one /have/", opener));
            }
            Quantifier::Where {
                body: sub(&[segments[0].as_slice()])?,
                have: sub(&[segments[0].as_slice(), segments[1].as_slice()])?,
            }
        }
        Q_WITH => {
            if separators.iter().any(|s| *s != Q_OR) {
                return Err(perr(open_line, 1, "/or/ separators in /with/", opener));
            }
            let mut alternatives = Vec::new();
            for seg in &segments {
                alternatives.push(sub(&[seg.as_slice()])?);
            }
            Quantifier::With(alternatives)
        }
        _ => unreachable!("caller matched the opener"),
    };

    owner.quants.push(quant);
    Ok(consumed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_kind;
    use crate::FabricError;

    #[test]
    fn single_atom() {
        let t = parse("word sp=verb").unwrap();
        assert_eq!(t.atoms.len(), 1);
        assert_eq!(t.atoms[0].otype.as_deref(), Some("word"));
        assert_eq!(t.atoms[0].preds.len(), 1);
        assert!(matches!(&t.atoms[0].preds[0].test, PredTest::Eq(v) if v == "verb"));
        assert!(t.edges.is_empty());
    }

    #[test]
    fn wildcard_and_predicates() {
        let t = parse(". sp* vt? lex~^Q nu!=pl gn=f|m").unwrap();
        let preds = &t.atoms[0].preds;
        assert!(t.atoms[0].otype.is_none());
        assert!(matches!(preds[0].test, PredTest::Present));
        assert!(matches!(preds[1].test, PredTest::Absent));
        assert!(matches!(&preds[2].test, PredTest::Re(r) if r == "^Q"));
        assert!(matches!(&preds[3].test, PredTest::Ne(v) if v == "pl"));
        assert!(matches!(&preds[4].test, PredTest::In(vs) if vs == &["f", "m"]));
    }

    #[test]
    fn indentation_builds_embedding_edges() {
        let t = parse("clause\n  phrase function=Pred\n    word sp=verb").unwrap();
        assert_eq!(t.atoms.len(), 3);
        assert_eq!(t.edges.len(), 2);
        assert!(matches!(
            t.edges[0],
            RelEdge {
                left: 1,
                right: 0,
                op: RelationOp::EmbeddedIn
            }
        ));
        assert!(matches!(
            t.edges[1],
            RelEdge {
                left: 2,
                right: 1,
                op: RelationOp::EmbeddedIn
            }
        ));
    }

    #[test]
    fn siblings_default_to_precedence() {
        let t = parse("clause\n  phrase\n  phrase").unwrap();
        let sib: Vec<_> = t
            .edges
            .iter()
            .filter(|e| matches!(e.op, RelationOp::Before))
            .collect();
        assert_eq!(sib.len(), 1);
        assert_eq!((sib[0].left, sib[0].right), (1, 2));
    }

    #[test]
    fn explicit_relation_overrides_default() {
        let t = parse("clause\n  phrase\n  <: phrase").unwrap();
        assert!(t
            .edges
            .iter()
            .any(|e| matches!(e.op, RelationOp::AdjBefore) && e.left == 1 && e.right == 2));
        assert!(!t.edges.iter().any(|e| matches!(e.op, RelationOp::Before)));
    }

    #[test]
    fn relation_without_sibling_is_an_error() {
        let err = parse("<: word").unwrap_err();
        match error_kind(&err) {
            Some(FabricError::TemplateParse { line, .. }) => assert_eq!(*line, 1),
            other => panic!("expected TemplateParse, got {other:?}"),
        }
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let t = parse("% find verbs\n\nword sp=verb\n").unwrap();
        assert_eq!(t.atoms.len(), 1);
        assert_eq!(t.atoms[0].line, 3);
    }

    #[test]
    fn bad_predicate_reports_position() {
        let err = parse("word sp$verb").unwrap_err();
        match error_kind(&err) {
            Some(FabricError::TemplateParse { line, col, found, .. }) => {
                assert_eq!(*line, 1);
                assert_eq!(*col, 6);
                assert_eq!(found, "sp$verb");
            }
            other => panic!("expected TemplateParse, got {other:?}"),
        }
    }

    #[test]
    fn without_quantifier() {
        let t = parse("clause\n/without/\n  phrase function=Subj\n/-/").unwrap();
        assert_eq!(t.atoms.len(), 1);
        assert_eq!(t.atoms[0].quants.len(), 1);
        match &t.atoms[0].quants[0] {
            Quantifier::Without(body) => {
                assert_eq!(body.atoms.len(), 2);
                assert_eq!(body.atoms[0].otype.as_deref(), Some("clause"));
                assert_eq!(body.atoms[1].otype.as_deref(), Some("phrase"));
            }
            other => panic!("expected /without/, got {other:?}"),
        }
    }

    #[test]
    fn where_have_quantifier() {
        let t = parse("clause\n/where/\n  phrase\n/have/\n  function=Pred\n/-/");
        // The /have/ segment here is not a valid atom line; a correct
        // template repeats the atom shape.
        assert!(t.is_err());

        let t = parse("clause\n/where/\n  phrase\n/have/\n  . function=Pred\n/-/").unwrap();
        match &t.atoms[0].quants[0] {
            Quantifier::Where { body, have } => {
                assert_eq!(body.atoms.len(), 2);
                assert_eq!(have.atoms.len(), 3);
            }
            other => panic!("expected /where/, got {other:?}"),
        }
    }

    #[test]
    fn with_or_quantifier() {
        let t =
            parse("clause\n/with/\n  phrase function=Pred\n/or/\n  phrase function=Subj\n/-/")
                .unwrap();
        match &t.atoms[0].quants[0] {
            Quantifier::With(alternatives) => assert_eq!(alternatives.len(), 2),
            other => panic!("expected /with/, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_quantifier_is_an_error() {
        assert!(parse("clause\n/without/\n  phrase").is_err());
    }

    #[test]
    fn atoms_continue_after_a_quantifier_block() {
        let t = parse("clause\n/without/\n  phrase function=Subj\n/-/\n  word sp=verb").unwrap();
        assert_eq!(t.atoms.len(), 2);
        assert_eq!(t.atoms[1].otype.as_deref(), Some("word"));
        // The trailing word is embedded in the clause, not lost to the
        // quantifier block.
        assert!(t
            .edges
            .iter()
            .any(|e| e.left == 1 && e.right == 0 && matches!(e.op, RelationOp::EmbeddedIn)));
    }

    #[test]
    fn empty_template_is_an_error() {
        let err = parse("% only a comment\n").unwrap_err();
        assert!(matches!(
            error_kind(&err),
            Some(FabricError::TemplateParse { .. })
        ));
    }

    #[test]
    fn nested_quantifiers_resolve_to_matching_end() {
        let t = parse(
            "clause\n/without/\n  phrase\n  /without/\n    word sp=verb\n  /-/\n/-/",
        )
        .unwrap();
        match &t.atoms[0].quants[0] {
            Quantifier::Without(body) => {
                assert_eq!(body.atoms.len(), 2);
                assert_eq!(body.atoms[1].quants.len(), 1);
            }
            other => panic!("expected /without/, got {other:?}"),
        }
    }
}
