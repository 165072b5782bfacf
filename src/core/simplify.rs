//! Removal of nodes with a single child.
//!
//! Detailed trees carry a unary node for every infection and onward transmission along a lineage.
//! Contracting them leaves a strictly binary tree whose leaves keep their calendar times, so
//! every distance from the start of the stem is preserved.

use super::tree::{Node, PhyloTree};

/// Contract all unary nodes of `tree`. Applying it twice changes nothing.
pub fn simplify(tree: &PhyloTree) -> PhyloTree {
    PhyloTree::new(tree.first_case(), tree.origin(), contract(tree.root().clone()))
}

impl PhyloTree {
    pub fn simplified(&self) -> PhyloTree {
        simplify(self)
    }
}

fn contract(root: Node) -> Node {
    let mut root = skip_unary(root);
    let mut stack: Vec<&mut Node> = vec![&mut root];
    while let Some(node) = stack.pop() {
        let children = std::mem::take(&mut node.children);
        node.children = children.into_iter().map(skip_unary).collect();
        stack.extend(node.children.iter_mut());
    }
    root
}

fn skip_unary(mut node: Node) -> Node {
    while node.children.len() == 1 {
        match node.children.pop() {
            Some(child) => node = child,
            None => break,
        }
    }
    node
}
