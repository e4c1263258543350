//! Location reconstruction
//!
//! [`ParsedTree`] stores child links only. To report where a finding lives,
//! a node-to-parent side-table is built in one traversal and then walked
//! upward from the target node. A segment gets a 1-based `[n]` ordinal only
//! when its parent has more than one child with the same tag, which yields
//! paths such as `/SAR/Transactions/Transaction[2]/Amount`.

use crate::document::{NodeId, ParsedTree};

/// Node-to-parent mapping for one [`ParsedTree`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentIndex {
    parents: Vec<Option<NodeId>>,
}

impl ParentIndex {
    pub fn build(tree: &ParsedTree) -> Self {
        let mut parents = vec![None; tree.len()];
        if tree.is_empty() {
            return Self { parents };
        }

        let mut pending = vec![tree.root()];
        while let Some(id) = pending.pop() {
            for &child in tree.element(id).children() {
                parents[child.index()] = Some(id);
                pending.push(child);
            }
        }

        Self { parents }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.parents.get(node.index()).copied().flatten()
    }

    /// Path-like location of `node`, root first.
    pub fn locate(&self, tree: &ParsedTree, node: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(node);

        while let Some(id) = current {
            let parent = self.parent(id);
            segments.push(segment(tree, id, parent));
            current = parent;
        }

        segments.reverse();
        format!("/{}", segments.join("/"))
    }
}

fn segment(tree: &ParsedTree, id: NodeId, parent: Option<NodeId>) -> String {
    let tag = tree.tag(id);
    let Some(parent) = parent else {
        return tag.to_string();
    };

    let siblings: Vec<NodeId> = tree.children_named(parent, tag).collect();
    if siblings.len() > 1 {
        let ordinal = siblings
            .iter()
            .position(|sibling| *sibling == id)
            .map_or(1, |position| position + 1);
        format!("{}[{}]", tag, ordinal)
    } else {
        tag.to_string()
    }
}

/// Locate a single node without keeping the index around.
pub fn locate(tree: &ParsedTree, node: NodeId) -> String {
    ParentIndex::build(tree).locate(tree, node)
}

/// Location of an attribute on an element location
pub fn attribute_location(element_location: &str, attribute: &str) -> String {
    format!("{}/@{}", element_location, attribute)
}
