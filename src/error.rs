//! # Error Kinds
//!
//! Every externally observable failure carries a machine-readable kind from
//! this module at the root of its report chain. Internal plumbing uses
//! `eyre` context (`wrap_err_with`) to accumulate the human-readable trail;
//! callers that need to dispatch on the kind use [`error_kind`] to recover
//! the typed root cause.
//!
//! There are no hidden fallbacks: I/O and structural errors abort the
//! enclosing operation and surface here. The one deliberate exception is
//! out-of-bounds node ids in *scalar* feature access, which read as absent
//! (subset corpora legitimately reference nodes outside a feature's range).

use std::path::PathBuf;

use thiserror::Error;

/// Machine-readable failure kinds of the corpus engine.
#[derive(Debug, Error)]
pub enum FabricError {
    /// The store directory or one of its files is structurally invalid.
    #[error("corrupt store: {detail}")]
    CorruptStore { detail: String },

    /// The store was written by an unsupported format version.
    #[error("store format version {found} not supported (expected {expected})")]
    VersionMismatch { expected: u32, found: u32 },

    /// The catalog references a feature file that does not exist.
    #[error("feature '{name}' is catalogued but its file is missing: {}", path.display())]
    MissingFeature { name: String, path: PathBuf },

    /// A requested feature is not in the catalog.
    #[error("unknown feature '{name}'")]
    UnknownFeature { name: String },

    /// A requested node type is not in the type table.
    #[error("unknown node type '{name}'")]
    UnknownType { name: String },

    /// A requested text format is not declared in the corpus metadata.
    #[error("unknown text format '{name}'")]
    UnknownFormat { name: String },

    /// A CSR offset or dense index exceeds the declared bounds of its array.
    #[error("array access out of range: {detail}")]
    ArrayOutOfRange { detail: String },

    /// A search template failed to parse.
    #[error("template parse error at line {line}, col {col}: expected {expected}, found '{found}'")]
    TemplateParse {
        line: usize,
        col: usize,
        expected: String,
        found: String,
    },

    /// An atom references a name that does not exist in the corpus.
    #[error("unknown {kind} name '{name}' in template")]
    UnknownName { kind: NameKind, name: String },

    /// The per-call wall-clock budget was exceeded.
    #[error("query exceeded its time budget after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    /// The caller's cancel flag was raised.
    #[error("query cancelled")]
    Cancelled,

    /// An underlying I/O failure, annotated with the path involved.
    #[error("i/o error on '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },
}

/// What category of name an [`FabricError::UnknownName`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Feature,
    Type,
    Relation,
}

impl std::fmt::Display for NameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameKind::Feature => f.write_str("feature"),
            NameKind::Type => f.write_str("type"),
            NameKind::Relation => f.write_str("relation"),
        }
    }
}

impl FabricError {
    pub fn corrupt(detail: impl Into<String>) -> Self {
        FabricError::CorruptStore {
            detail: detail.into(),
        }
    }

    pub fn out_of_range(detail: impl Into<String>) -> Self {
        FabricError::ArrayOutOfRange {
            detail: detail.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, cause: std::io::Error) -> Self {
        FabricError::Io {
            path: path.into(),
            cause,
        }
    }
}

/// Recovers the typed error kind from an eyre report chain, if any.
pub fn error_kind(report: &eyre::Report) -> Option<&FabricError> {
    report.chain().find_map(|e| e.downcast_ref::<FabricError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    #[test]
    fn kind_survives_context_wrapping() {
        let base: eyre::Result<()> = Err(FabricError::UnknownFeature {
            name: "sp".into(),
        }
        .into());
        let wrapped = base.wrap_err("loading corpus").unwrap_err();
        match error_kind(&wrapped) {
            Some(FabricError::UnknownFeature { name }) => assert_eq!(name, "sp"),
            other => panic!("expected UnknownFeature, got {other:?}"),
        }
    }

    #[test]
    fn display_carries_actionable_detail() {
        let err = FabricError::TemplateParse {
            line: 3,
            col: 7,
            expected: "relation operator".into(),
            found: "<>".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("line 3"));
        assert!(msg.contains("col 7"));
        assert!(msg.contains("<>"));
    }
}
