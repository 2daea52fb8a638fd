//! # Locality
//!
//! Structural neighborhood of a node, served from the precomputed
//! embedding CSRs: `up` walks to embedders (widest first), `down` to
//! embeddees (rank order), `prev`/`next` to the adjacent node of the same
//! type in canonical order.

use eyre::Result;

use super::Api;
use crate::error::FabricError;
use crate::Node;

pub struct Locality<'a> {
    api: &'a Api,
}

impl<'a> Locality<'a> {
    pub(crate) fn new(api: &'a Api) -> Self {
        Locality { api }
    }

    fn type_filter(&self, type_name: Option<&str>) -> Result<Option<u8>> {
        match type_name {
            None => Ok(None),
            Some(t) => self
                .api
                .store()
                .meta()
                .type_id(t)
                .map(Some)
                .ok_or_else(|| {
                    eyre::Report::new(FabricError::UnknownType {
                        name: t.to_string(),
                    })
                }),
        }
    }

    /// Embedders of `n`: every node whose slot set contains `n`'s, ordered
    /// widest span first, then by canonical rank.
    pub fn up(&self, n: Node, type_name: Option<&str>) -> Result<Vec<Node>> {
        let store = self.api.store();
        let filter = self.type_filter(type_name)?;
        let row = store.lev_up(n)?;
        Ok(row
            .iter()
            .map(|v| v.get())
            .filter(|&m| filter.map_or(true, |tid| store.otype_id(m) == Some(tid)))
            .collect())
    }

    /// Embeddees of `n`, in canonical order.
    pub fn down(&self, n: Node, type_name: Option<&str>) -> Result<Vec<Node>> {
        let store = self.api.store();
        let filter = self.type_filter(type_name)?;
        let row = store.lev_down(n)?;
        Ok(row
            .iter()
            .map(|v| v.get())
            .filter(|&m| filter.map_or(true, |tid| store.otype_id(m) == Some(tid)))
            .collect())
    }

    /// The previous node of the same type in canonical order.
    pub fn prev(&self, n: Node) -> Option<Node> {
        self.api.store().prev_same_type(n)
    }

    /// The next node of the same type in canonical order.
    pub fn next(&self, n: Node) -> Option<Node> {
        self.api.store().next_same_type(n)
    }
}
