//! Phylogenies produced by the reconstruction.
//!
//! Nodes own their children and store the calendar time at which they occur. Branch lengths and
//! heights are derived from these times, so restructuring a tree never accumulates rounding
//! errors on the nodes that survive.

/// What a node stands for.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// A sampled pathogen sequence.
    Sample { label: String },

    /// The transmission of a lineage from the host to `infectee`. A leaf of a treelet until the
    /// subtree of the infectee is grafted onto it.
    Transmission { infectee: String, label: String },

    /// The common ancestor of two lineages within a host.
    Coalescence,

    /// The infection of the host that owns the node.
    Infection,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,

    /// Calendar time of the node.
    pub time: f64,

    /// Host whose treelet produced this node.
    pub host: String,

    pub children: Vec<Node>,
}

impl Node {
    pub fn new(kind: NodeKind, time: f64, host: &str) -> Self {
        Self {
            kind,
            time,
            host: host.to_string(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Label of leaves and transmission markers.
    pub fn label(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Sample { label } | NodeKind::Transmission { label, .. } => Some(label),
            NodeKind::Coalescence | NodeKind::Infection => None,
        }
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Node::node_count).sum::<usize>()
    }

    /// All leaves below this node, left to right.
    pub fn leaves(&self) -> Vec<&Node> {
        let mut leaves = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.is_leaf() {
                leaves.push(node);
            } else {
                stack.extend(node.children.iter().rev());
            }
        }
        leaves
    }

    /// Latest calendar time of any leaf below this node.
    pub fn latest_time(&self) -> f64 {
        self.leaves()
            .iter()
            .map(|leaf| leaf.time)
            .fold(self.time, f64::max)
    }
}

/// A whole-system phylogeny descending from one introduction.
#[derive(Clone, Debug, PartialEq)]
pub struct PhyloTree {
    first_case: String,
    origin: f64,
    root: Node,
}

impl PhyloTree {
    /// Wrap `root` as a tree whose stem starts at `origin`, the infection time of `first_case`.
    pub fn new(first_case: &str, origin: f64, root: Node) -> Self {
        Self {
            first_case: first_case.to_string(),
            origin,
            root,
        }
    }

    /// Introduction this tree descends from.
    pub fn first_case(&self) -> &str {
        &self.first_case
    }

    /// Calendar time at which the stem above the root begins.
    pub fn origin(&self) -> f64 {
        self.origin
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn leaves(&self) -> Vec<&Node> {
        self.root.leaves()
    }

    pub fn node_count(&self) -> usize {
        self.root.node_count()
    }

    /// Length of the stem above the root.
    pub fn root_length(&self) -> f64 {
        self.root.time - self.origin
    }

    /// Height of `node` above the most recent leaf of the tree.
    pub fn height(&self, node: &Node) -> f64 {
        self.root.latest_time() - node.time
    }

    /// Distance from the start of the stem to `node`.
    pub fn distance_from_origin(&self, node: &Node) -> f64 {
        node.time - self.origin
    }
}

/// Length of the branch from `parent` to `child`.
pub fn branch_length(parent: &Node, child: &Node) -> f64 {
    child.time - parent.time
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(label: &str, time: f64) -> Node {
        Node::new(
            NodeKind::Sample {
                label: label.to_string(),
            },
            time,
            "A",
        )
    }

    #[test]
    fn derived_lengths_and_heights() {
        let root = Node::new(NodeKind::Coalescence, 1., "A")
            .with_children(vec![sample("a", 3.), sample("b", 2.)]);
        let tree = PhyloTree::new("A", 0.5, root);

        assert_eq!(tree.root_length(), 0.5);
        assert_eq!(tree.height(tree.root()), 2.);
        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].label(), Some("a"));
        assert_eq!(tree.height(leaves[1]), 1.);
        assert_eq!(branch_length(tree.root(), leaves[0]), 2.);
        assert_eq!(tree.distance_from_origin(leaves[0]), 2.5);
        assert_eq!(tree.node_count(), 3);
    }
}
