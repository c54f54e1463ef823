use std::collections::{BTreeSet, HashMap};

/// Code-to-code adjacency built by replaying cached analyses. Edges are
/// typed and set-backed, so replaying the same observation is a no-op and
/// cycles are permitted.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    nodes: HashMap<String, NodeEdges>,
}

#[derive(Debug, Clone, Default)]
struct NodeEdges {
    related: BTreeSet<String>,
    prerequisites: BTreeSet<String>,
    follow_ups: BTreeSet<String>,
}

impl RelationshipGraph {
    /// Inserts typed directed edges from `code`. Idempotent: identical
    /// observations leave the edge set unchanged. Self-edges and blank
    /// codes are dropped.
    pub fn add_observation(
        &mut self,
        code: &str,
        related: &[String],
        prerequisites: &[String],
        follow_ups: &[String],
    ) {
        let code = code.trim();
        if code.is_empty() {
            return;
        }
        let edges = self.nodes.entry(code.to_string()).or_default();
        for target in related {
            insert_edge(&mut edges.related, code, target);
        }
        for target in prerequisites {
            insert_edge(&mut edges.prerequisites, code, target);
        }
        for target in follow_ups {
            insert_edge(&mut edges.follow_ups, code, target);
        }
    }

    /// Up to `limit` distinct codes one `related` hop away, in stable
    /// sorted order. Prerequisite and follow-up edges are kept for later
    /// use but do not feed the basic suggestion path.
    #[must_use]
    pub fn related_to(&self, code: &str, limit: usize) -> Vec<String> {
        let Some(edges) = self.nodes.get(code.trim()) else {
            return Vec::new();
        };
        edges.related.iter().take(limit).cloned().collect()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.nodes
            .values()
            .map(|edges| {
                edges.related.len() + edges.prerequisites.len() + edges.follow_ups.len()
            })
            .sum()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

fn insert_edge(set: &mut BTreeSet<String>, source: &str, target: &str) {
    let target = target.trim();
    if target.is_empty() || target == source {
        return;
    }
    set.insert(target.to_string());
}
