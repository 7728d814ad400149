//! The relational schema tree.
//!
//! A [`SchemaTree`] describes how peripheral tables join onto the
//! population: a rooted tree where each node names a table and each edge
//! carries the join-key columns on both sides, the optional time-stamp
//! columns defining a temporal join, an optional upper time stamp giving
//! the right edge of the window, and the `allow_lagged_targets` flag.
//!
//! The tree is stored as an arena of nodes with child-edge lists rather
//! than owned pointers, which keeps it trivially serializable and lets the
//! subfeature composer address subtrees by index.

use serde::{Deserialize, Serialize};

use crate::error::{RelPropError, Result};

/// Index of a node in the arena.
pub type NodeId = usize;

/// One join edge from a parent node to a child node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinEdge {
    /// Arena index of the child node.
    pub child: NodeId,
    /// Join-key column names on the parent side. Empty means the degenerate
    /// all-rows join.
    pub join_key: Vec<String>,
    /// Join-key column names on the child side; same arity as `join_key`.
    pub other_join_key: Vec<String>,
    /// Parent-side time-stamp column for the temporal join, if any.
    pub time_stamp: Option<String>,
    /// Child-side time-stamp column; must be set together with `time_stamp`.
    pub other_time_stamp: Option<String>,
    /// Parent-side time-stamp column giving the exclusive right edge of the
    /// time window: a match requires `child_ts < parent_upper_ts`.
    pub upper_time_stamp: Option<String>,
    /// Whether the child may expose target columns whose time stamps
    /// strictly precede the parent row's time stamp.
    pub allow_lagged_targets: bool,
}

/// One node in the tree: a table and its outgoing join edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableNode {
    /// Name of the table (the population for the root, a peripheral name
    /// otherwise).
    pub table: String,
    /// Outgoing edges to joined children.
    pub children: Vec<JoinEdge>,
}

/// The schema tree: an arena of nodes, node 0 being the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaTree {
    nodes: Vec<TableNode>,
}

impl SchemaTree {
    /// Create a tree whose root is the population table.
    pub fn new(population_table: impl Into<String>) -> Self {
        Self {
            nodes: vec![TableNode {
                table: population_table.into(),
                children: Vec::new(),
            }],
        }
    }

    /// The root node id.
    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &TableNode {
        &self.nodes[id]
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Join a child table onto `parent`, returning the new child's node id.
    #[allow(clippy::too_many_arguments)]
    pub fn join(
        &mut self,
        parent: NodeId,
        child_table: impl Into<String>,
        join_key: Vec<String>,
        other_join_key: Vec<String>,
        time_stamp: Option<String>,
        other_time_stamp: Option<String>,
        upper_time_stamp: Option<String>,
        allow_lagged_targets: bool,
    ) -> NodeId {
        let child = self.nodes.len();
        self.nodes.push(TableNode {
            table: child_table.into(),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(JoinEdge {
            child,
            join_key,
            other_join_key,
            time_stamp,
            other_time_stamp,
            upper_time_stamp,
            allow_lagged_targets,
        });
        child
    }

    /// Shorthand for a plain equi-join on a single key with no temporal
    /// constraint.
    pub fn join_on(
        &mut self,
        parent: NodeId,
        child_table: impl Into<String>,
        join_key: impl Into<String>,
        other_join_key: impl Into<String>,
    ) -> NodeId {
        self.join(
            parent,
            child_table,
            vec![join_key.into()],
            vec![other_join_key.into()],
            None,
            None,
            None,
            false,
        )
    }

    /// Validate the tree against the known peripheral names.
    ///
    /// Every non-root node must name a supplied peripheral table, join-key
    /// arities must agree on both sides of every edge, and temporal joins
    /// must name time stamps on both sides.
    pub fn check(&self, peripheral_names: &[String]) -> Result<()> {
        for (id, node) in self.nodes.iter().enumerate() {
            if id != self.root() && !peripheral_names.iter().any(|n| n == &node.table) {
                return Err(RelPropError::TableNotFound(node.table.clone()));
            }
            for edge in &node.children {
                if edge.join_key.len() != edge.other_join_key.len() {
                    return Err(RelPropError::InvalidHyperparameters(format!(
                        "join between '{}' and '{}' has mismatched key arity",
                        node.table,
                        self.nodes[edge.child].table
                    )));
                }
                if edge.time_stamp.is_some() != edge.other_time_stamp.is_some() {
                    return Err(RelPropError::InvalidHyperparameters(format!(
                        "temporal join between '{}' and '{}' must name time stamps on both sides",
                        node.table,
                        self.nodes[edge.child].table
                    )));
                }
                if edge.upper_time_stamp.is_some() && edge.time_stamp.is_none() {
                    return Err(RelPropError::InvalidHyperparameters(format!(
                        "upper time stamp on the join between '{}' and '{}' requires a temporal join",
                        node.table,
                        self.nodes[edge.child].table
                    )));
                }
            }
        }
        Ok(())
    }

    /// The subtree rooted at `node`, re-rooted as its own tree.
    ///
    /// Used by the subfeature composer: a child engine sees the joined
    /// table as its population and the grandchildren as its peripherals.
    pub fn subtree(&self, node: NodeId) -> SchemaTree {
        let mut out = SchemaTree::new(self.nodes[node].table.clone());
        self.copy_children(node, 0, &mut out);
        out
    }

    fn copy_children(&self, from: NodeId, to: NodeId, out: &mut SchemaTree) {
        for edge in &self.nodes[from].children {
            let child = out.nodes.len();
            out.nodes.push(TableNode {
                table: self.nodes[edge.child].table.clone(),
                children: Vec::new(),
            });
            out.nodes[to].children.push(JoinEdge {
                child,
                ..edge.clone()
            });
            self.copy_children(edge.child, child, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_level_tree() -> SchemaTree {
        let mut tree = SchemaTree::new("population");
        let orders = tree.join_on(tree.root(), "orders", "customer_id", "customer_id");
        tree.join_on(orders, "items", "order_id", "order_id");
        tree
    }

    #[test]
    fn test_join_builds_arena() {
        let tree = two_level_tree();
        assert_eq!(tree.num_nodes(), 3);
        assert_eq!(tree.node(0).table, "population");
        assert_eq!(tree.node(0).children.len(), 1);
        let orders = tree.node(0).children[0].child;
        assert_eq!(tree.node(orders).table, "orders");
        assert_eq!(tree.node(orders).children.len(), 1);
    }

    #[test]
    fn test_check_unknown_table() {
        let tree = two_level_tree();
        let err = tree.check(&["orders".to_string()]);
        assert!(matches!(err, Err(RelPropError::TableNotFound(t)) if t == "items"));
        assert!(
            tree.check(&["orders".to_string(), "items".to_string()])
                .is_ok()
        );
    }

    #[test]
    fn test_check_key_arity() {
        let mut tree = SchemaTree::new("p");
        tree.join(
            0,
            "orders",
            vec!["a".into(), "b".into()],
            vec!["a".into()],
            None,
            None,
            None,
            false,
        );
        assert!(tree.check(&["orders".to_string()]).is_err());
    }

    #[test]
    fn test_check_one_sided_temporal_join() {
        let mut tree = SchemaTree::new("p");
        tree.join(
            0,
            "orders",
            vec!["jk".into()],
            vec!["jk".into()],
            Some("ts".into()),
            None,
            None,
            false,
        );
        assert!(tree.check(&["orders".to_string()]).is_err());
    }

    #[test]
    fn test_subtree_rerooted() {
        let tree = two_level_tree();
        let orders_node = tree.node(0).children[0].child;
        let sub = tree.subtree(orders_node);
        assert_eq!(sub.node(sub.root()).table, "orders");
        assert_eq!(sub.num_nodes(), 2);
        assert_eq!(sub.node(sub.root()).children[0].join_key, vec!["order_id"]);
    }

    #[test]
    fn test_serde_roundtrip() {
        let tree = two_level_tree();
        let json = serde_json::to_string(&tree).unwrap();
        let back: SchemaTree = serde_json::from_str(&json).unwrap();
        assert_eq!(tree, back);
    }
}
