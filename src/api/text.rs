//! # Text Assembly and Sections
//!
//! Text is never stored assembled. A corpus declares named *formats* -
//! templates like `{g_word}{trailer}` - and rendering a node concatenates
//! the template over its slots in ascending order. Literal characters in a
//! template, including trailing whitespace, are preserved byte-exactly:
//! the rendered text of a verse must round-trip the source text.
//!
//! Template grammar: `{feature}` substitutes the feature's value for the
//! slot (absent renders as nothing); `{a/b}` renders `a` if present, else
//! `b`; everything outside braces is literal.
//!
//! Sections map nodes to human-readable references (`Genesis 1:1`) through
//! the corpus-declared section types and their naming features, and back.

use eyre::{ensure, Result};

use super::Api;
use crate::error::FabricError;
use crate::features::FeatureValue;
use crate::Node;

/// One parsed item of a text format template.
#[derive(Debug, Clone)]
pub(crate) enum FormatItem {
    Literal(String),
    /// Feature alternatives: first present value wins.
    Feature(Vec<String>),
}

/// A parsed text format, cached per fabric.
#[derive(Debug)]
pub struct TextFormat {
    pub(crate) items: Vec<FormatItem>,
}

impl TextFormat {
    /// Parses a template source. Malformed braces are a corpus defect.
    pub fn parse(source: &str) -> Result<TextFormat> {
        let mut items = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars();
        while let Some(c) = chars.next() {
            if c != '{' {
                ensure!(
                    c != '}',
                    FabricError::corrupt(format!("text format '{source}': unmatched '}}'"))
                );
                literal.push(c);
                continue;
            }
            if !literal.is_empty() {
                items.push(FormatItem::Literal(std::mem::take(&mut literal)));
            }
            let mut spec = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                spec.push(c);
            }
            ensure!(
                closed,
                FabricError::corrupt(format!("text format '{source}': unclosed '{{'"))
            );
            let alternatives: Vec<String> = spec
                .split('/')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            ensure!(
                !alternatives.is_empty(),
                FabricError::corrupt(format!("text format '{source}': empty substitution"))
            );
            items.push(FormatItem::Feature(alternatives));
        }
        if !literal.is_empty() {
            items.push(FormatItem::Literal(literal));
        }
        Ok(TextFormat { items })
    }

    /// Every feature name the format references.
    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.items.iter().flat_map(|item| {
            let alternatives: &[String] = match item {
                FormatItem::Literal(_) => &[],
                FormatItem::Feature(alts) => alts,
            };
            alternatives.iter().map(String::as_str)
        })
    }
}

/// A resolved section reference, outermost level first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRef {
    pub parts: Vec<FeatureValue>,
}

impl std::fmt::Display for SectionRef {
    /// `Genesis`, `Genesis 1`, `Genesis 1:1`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            match i {
                0 => write!(f, "{part}")?,
                1 => write!(f, " {part}")?,
                _ => write!(f, ":{part}")?,
            }
        }
        Ok(())
    }
}

pub struct Text<'a> {
    api: &'a Api,
}

impl<'a> Text<'a> {
    pub(crate) fn new(api: &'a Api) -> Self {
        Text { api }
    }

    /// Renders a node in the named format (default format when `None`).
    pub fn text(&self, n: Node, format: Option<&str>) -> Result<String> {
        let store = self.api.store();
        let name = format.unwrap_or_else(|| store.meta().default_format());
        let format = self.api.fabric().text_format(name)?;

        let mut out = String::new();
        let slots = store.slots(n)?;
        for slot in slots.iter() {
            for item in &format.items {
                match item {
                    FormatItem::Literal(lit) => out.push_str(lit),
                    FormatItem::Feature(alternatives) => {
                        for feature in alternatives {
                            let handle = self.api.f(feature)?;
                            if let Some(value) = handle.value(slot) {
                                out.push_str(&value.to_string());
                                break;
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Resolves a node to its section reference. `None` when the corpus
    /// declares no sections. Partial references are possible: a book node
    /// resolves to just its book part.
    pub fn section_ref(&self, n: Node) -> Result<Option<SectionRef>> {
        let store = self.api.store();
        let Some(sections) = store.meta().sections.clone() else {
            return Ok(None);
        };

        let mut parts = Vec::new();
        for (stype, sfeat) in sections.types.iter().zip(&sections.features) {
            let section_node = if store.type_of(n) == Some(stype.as_str()) {
                Some(n)
            } else {
                store
                    .lev_up(n)?
                    .iter()
                    .map(|v| v.get())
                    .find(|&m| store.type_of(m) == Some(stype.as_str()))
            };
            let Some(section_node) = section_node else {
                break;
            };
            let Some(value) = self.api.f(sfeat)?.value(section_node) else {
                break;
            };
            parts.push(value);
        }
        if parts.is_empty() {
            return Ok(None);
        }
        Ok(Some(SectionRef { parts }))
    }

    /// Resolves a section reference back to its node: the deepest section
    /// node matching all given parts, or `None` if the reference does not
    /// exist in this corpus.
    pub fn node_from_section(&self, parts: &[FeatureValue]) -> Result<Option<Node>> {
        let store = self.api.store();
        let Some(sections) = store.meta().sections.clone() else {
            eyre::bail!("corpus declares no section structure");
        };
        ensure!(
            !parts.is_empty() && parts.len() <= sections.types.len(),
            "section reference has {} parts, corpus declares {} levels",
            parts.len(),
            sections.types.len()
        );

        let top_feature = self.api.f(&sections.features[0])?;
        let mut current: Option<Node> = self
            .api
            .n()
            .walk_types(&[sections.types[0].as_str()])?
            .into_iter()
            .find(|&b| top_feature.value(b).as_ref() == Some(&parts[0]));

        for (level, part) in parts.iter().enumerate().skip(1) {
            let Some(parent) = current else {
                return Ok(None);
            };
            let stype = sections.types[level].as_str();
            let feature = self.api.f(&sections.features[level])?;
            current = store
                .lev_down(parent)?
                .iter()
                .map(|v| v.get())
                .filter(|&m| store.type_of(m) == Some(stype))
                .find(|&m| feature.value(m).as_ref() == Some(part));
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_literals_and_features() {
        let fmt = TextFormat::parse("{g_word}{trailer}").unwrap();
        assert_eq!(fmt.items.len(), 2);
        let fmt = TextFormat::parse("[{sp}] ").unwrap();
        assert!(matches!(&fmt.items[0], FormatItem::Literal(l) if l == "["));
        assert!(matches!(&fmt.items[2], FormatItem::Literal(l) if l == "] "));
    }

    #[test]
    fn parse_alternatives() {
        let fmt = TextFormat::parse("{g_cons/g_word}").unwrap();
        match &fmt.items[0] {
            FormatItem::Feature(alts) => assert_eq!(alts, &["g_cons", "g_word"]),
            other => panic!("expected feature item, got {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_unbalanced_braces() {
        assert!(TextFormat::parse("{open").is_err());
        assert!(TextFormat::parse("close}").is_err());
        assert!(TextFormat::parse("{}").is_err());
    }

    #[test]
    fn section_ref_display() {
        let r = SectionRef {
            parts: vec![
                FeatureValue::Str("Genesis".into()),
                FeatureValue::Int(1),
                FeatureValue::Int(1),
            ],
        };
        assert_eq!(r.to_string(), "Genesis 1:1");
        let r = SectionRef {
            parts: vec![FeatureValue::Str("Genesis".into()), FeatureValue::Int(2)],
        };
        assert_eq!(r.to_string(), "Genesis 2");
    }
}
