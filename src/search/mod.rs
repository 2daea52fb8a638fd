//! # SPIN Search
//!
//! The S operator: pattern queries over the corpus graph. A query is a
//! line-oriented *template* of typed atoms, feature predicates and
//! structural relations; execution compiles it against the corpus, picks a
//! join order by estimated cardinality, narrows candidate sets through the
//! vectorized feature filters, and walks the relations.
//!
//! ```ignore
//! let outcome = api.s().search(
//!     "clause\n  phrase function=Pred\n    word sp=verb",
//!     ReturnType::Results,
//!     &SearchOptions::default(),
//! )?;
//! ```
//!
//! One plan serves all four return types: `Results` materializes tuples
//! (with offset/limit pagination over the deterministic enumeration),
//! `Count` short-circuits tuple storage into a running total,
//! `Statistics` aggregates feature histograms over the matches, and
//! `Passages` groups matches by their containing section.

mod exec;
mod plan;
mod relation;
mod spin;
mod syntax;

pub use relation::{RelationOp, RELATION_OPS};
pub use syntax::{parse, Atom, FeaturePred, PredTest, Quantifier, RelEdge, Template};

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::Result;
use tracing::{debug, warn};

use crate::api::Api;
use crate::config::constants::SEARCH_FAIL_FACTOR;
use crate::Node;
use exec::{execute, ExecEnv};
use spin::resolve;

/// Cooperative cancellation flag shared with long-running calls.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What a search call materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Results,
    Count,
    Statistics,
    Passages,
}

/// Per-call knobs. `Default` means: all results, no budget, no
/// aggregation features, top 50 histogram values.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Maximum tuples to return (`Results`, `Passages`).
    pub limit: Option<usize>,
    /// Tuples to skip first, over the deterministic enumeration.
    pub offset: usize,
    /// Features to aggregate for `Statistics`.
    pub aggregate_features: Vec<String>,
    /// Histogram values kept per feature (0 means the default of 50).
    pub top_n: usize,
    /// Wall-clock budget; falls back to the fabric-level default.
    pub budget: Option<Duration>,
    /// Cooperative cancellation.
    pub cancel: Option<CancelFlag>,
}

/// Histogram aggregation over matched nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistics {
    pub total: u64,
    /// Per feature: `(value, count)` by descending count. Counts over one
    /// feature sum to at most `total * atoms_carrying_the_feature`.
    pub features: BTreeMap<String, Vec<(String, u64)>>,
}

/// Matches grouped by their containing section.
#[derive(Debug, Clone)]
pub struct Passage {
    pub section: String,
    /// First matched node of the first tuple in this section.
    pub node: Node,
    pub tuples: Vec<Vec<Node>>,
}

#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Results {
        tuples: Vec<Vec<Node>>,
        has_more: bool,
    },
    Count(u64),
    Statistics(Statistics),
    Passages(Vec<Passage>),
}

pub struct Search<'a> {
    api: &'a Api,
}

impl<'a> Search<'a> {
    pub(crate) fn new(api: &'a Api) -> Self {
        Search { api }
    }

    /// Parses a template without executing it.
    pub fn parse(&self, template: &str) -> Result<Template> {
        syntax::parse(template)
    }

    /// All result tuples, in the deterministic plan order.
    pub fn tuples(&self, template: &str, limit: Option<usize>) -> Result<Vec<Vec<Node>>> {
        match self.search(
            template,
            ReturnType::Results,
            &SearchOptions {
                limit,
                ..Default::default()
            },
        )? {
            SearchOutcome::Results { tuples, .. } => Ok(tuples),
            _ => unreachable!("Results return type"),
        }
    }

    /// Number of matches.
    pub fn count(&self, template: &str) -> Result<u64> {
        match self.search(template, ReturnType::Count, &SearchOptions::default())? {
            SearchOutcome::Count(n) => Ok(n),
            _ => unreachable!("Count return type"),
        }
    }

    /// Runs a template with the given return type.
    pub fn search(
        &self,
        template: &str,
        return_type: ReturnType,
        options: &SearchOptions,
    ) -> Result<SearchOutcome> {
        let parsed = syntax::parse(template)?;
        let resolved = resolve(self.api, &parsed)?;
        debug!(
            atoms = resolved.atom_count,
            spin_order = ?resolved.spin_order,
            "executing search"
        );

        let budget = options
            .budget
            .or(self.api.fabric().config().query_budget);
        let deadline = budget.map(|b| Instant::now() + b);
        let env = ExecEnv::new(self.api.store(), deadline, options.cancel.as_ref());

        match return_type {
            ReturnType::Count => {
                let mut count = 0u64;
                execute(&env, &resolved, None, &mut |_| {
                    count += 1;
                    ControlFlow::Continue(())
                })?;
                Ok(SearchOutcome::Count(count))
            }
            ReturnType::Results => {
                let (tuples, has_more) = self.collect(&env, &resolved, options)?;
                Ok(SearchOutcome::Results { tuples, has_more })
            }
            ReturnType::Statistics => {
                let stats = self.aggregate(&env, &resolved, options)?;
                Ok(SearchOutcome::Statistics(stats))
            }
            ReturnType::Passages => {
                let (tuples, _) = self.collect(&env, &resolved, options)?;
                Ok(SearchOutcome::Passages(self.group_by_section(&tuples)?))
            }
        }
    }

    fn collect(
        &self,
        env: &ExecEnv<'_>,
        resolved: &spin::ResolvedTemplate,
        options: &SearchOptions,
    ) -> Result<(Vec<Vec<Node>>, bool)> {
        // Without an explicit limit, a hard ceiling keeps a runaway
        // template from materializing without end.
        let fail_limit = SEARCH_FAIL_FACTOR as usize * self.api.store().node_count() as usize;
        let want = options.limit.unwrap_or(fail_limit);

        let mut seen = 0usize;
        let mut tuples: Vec<Vec<Node>> = Vec::new();
        let mut has_more = false;
        execute(env, resolved, None, &mut |tuple| {
            if seen < options.offset {
                seen += 1;
                return ControlFlow::Continue(());
            }
            if tuples.len() == want {
                has_more = true;
                return ControlFlow::Break(());
            }
            tuples.push(tuple.to_vec());
            ControlFlow::Continue(())
        })?;
        if options.limit.is_none() && tuples.len() == fail_limit && has_more {
            warn!(fail_limit, "result set cut off; pass a limit to page through");
        }
        Ok((tuples, has_more))
    }

    fn aggregate(
        &self,
        env: &ExecEnv<'_>,
        resolved: &spin::ResolvedTemplate,
        options: &SearchOptions,
    ) -> Result<Statistics> {
        let top_n = if options.top_n == 0 { 50 } else { options.top_n };
        let handles: Vec<_> = options
            .aggregate_features
            .iter()
            .map(|name| self.api.f(name).map(|h| (name.clone(), h)))
            .collect::<Result<_>>()?;

        let mut total = 0u64;
        let mut histograms: BTreeMap<String, hashbrown::HashMap<String, u64>> = BTreeMap::new();
        execute(env, resolved, None, &mut |tuple| {
            total += 1;
            for (name, handle) in &handles {
                let hist = histograms.entry(name.clone()).or_default();
                for &node in tuple {
                    if let Some(value) = handle.value(node) {
                        *hist.entry(value.to_string()).or_insert(0) += 1;
                    }
                }
            }
            ControlFlow::Continue(())
        })?;

        let mut features = BTreeMap::new();
        for (name, hist) in histograms {
            let mut pairs: Vec<(String, u64)> = hist.into_iter().collect();
            pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            pairs.truncate(top_n);
            features.insert(name, pairs);
        }
        Ok(Statistics { total, features })
    }

    fn group_by_section(&self, tuples: &[Vec<Node>]) -> Result<Vec<Passage>> {
        let text = self.api.t();
        let mut groups: Vec<Passage> = Vec::new();
        let mut index: hashbrown::HashMap<String, usize> = hashbrown::HashMap::new();
        for tuple in tuples {
            let Some(&first) = tuple.first() else {
                continue;
            };
            let section = text
                .section_ref(first)?
                .map(|r| r.to_string())
                .unwrap_or_default();
            match index.get(&section) {
                Some(&i) => groups[i].tuples.push(tuple.clone()),
                None => {
                    index.insert(section.clone(), groups.len());
                    groups.push(Passage {
                        section,
                        node: first,
                        tuples: vec![tuple.clone()],
                    });
                }
            }
        }
        Ok(groups)
    }
}
