//! Text output of phylogenies in Newick and Nexus format.

use itertools::Itertools;
use std::fs;
use std::io::{self, Write};

use crate::core::{Node, PhyloTree, branch_length};
use crate::errors::{Result, VirusTreeError};

/// Characters that force a label into single quotes.
const RESERVED: &[char] = &['(', ')', '[', ']', '\'', ':', ';', ',', '='];

pub trait TreeWriter {
    fn write(&self, writer: &mut dyn Write, trees: &[PhyloTree]) -> io::Result<()>;

    fn write_to_file(&self, path: &str, trees: &[PhyloTree]) -> Result<()> {
        let write = || -> io::Result<()> {
            let mut writer = io::BufWriter::new(fs::File::create(path)?);
            self.write(&mut writer, trees)?;
            writer.flush()
        };
        write().map_err(|err| VirusTreeError::WriteError(format!("Failed to write {path}: {err}")))
    }
}

/// Quote `label` if it cannot stand as a bare Newick label.
pub fn escape_label(label: &str) -> String {
    if !label.is_empty() && !label.contains(|c: char| c.is_whitespace() || RESERVED.contains(&c)) {
        return label.to_string();
    }
    format!("'{}'", label.replace('\'', "''"))
}

/// Writes one Newick string per tree and line.
#[derive(Clone, Copy, Debug, Default)]
pub struct NewickWriter {
    annotate_hosts: bool,
}

impl NewickWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a `[&host="..."]` comment to every node.
    pub fn with_host_annotations(mut self) -> Self {
        self.annotate_hosts = true;
        self
    }

    /// Newick representation of `tree` terminated by a semicolon. The root carries the length
    /// of the stem above it.
    pub fn to_newick(&self, tree: &PhyloTree) -> String {
        enum Step<'a> {
            Open(&'a Node, f64),
            Close(&'a Node, f64),
            Separator,
        }

        let mut newick = String::with_capacity(32 * tree.node_count());
        let mut stack = vec![Step::Open(tree.root(), tree.root_length())];
        while let Some(step) = stack.pop() {
            match step {
                Step::Open(node, length) if node.is_leaf() => self.push_node(&mut newick, node, length),
                Step::Open(node, length) => {
                    newick.push('(');
                    stack.push(Step::Close(node, length));
                    for (i, child) in node.children.iter().enumerate().rev() {
                        stack.push(Step::Open(child, branch_length(node, child)));
                        if i > 0 {
                            stack.push(Step::Separator);
                        }
                    }
                }
                Step::Close(node, length) => {
                    newick.push(')');
                    self.push_node(&mut newick, node, length);
                }
                Step::Separator => newick.push(','),
            }
        }
        newick.push(';');
        newick
    }

    fn push_node(&self, newick: &mut String, node: &Node, length: f64) {
        if let Some(label) = node.label() {
            newick.push_str(&escape_label(label));
        }
        if self.annotate_hosts {
            newick.push_str(&format!("[&host=\"{}\"]", node.host));
        }
        newick.push_str(&format!(":{length}"));
    }
}

impl TreeWriter for NewickWriter {
    fn write(&self, writer: &mut dyn Write, trees: &[PhyloTree]) -> io::Result<()> {
        for tree in trees {
            writeln!(writer, "{}", self.to_newick(tree))?;
        }
        Ok(())
    }
}

/// Writes a Nexus document with a taxa block over all leaves and one tree per phylogeny.
#[derive(Clone, Copy, Debug, Default)]
pub struct NexusWriter {
    newick: NewickWriter,
}

impl NexusWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host_annotations(mut self) -> Self {
        self.newick = self.newick.with_host_annotations();
        self
    }
}

impl TreeWriter for NexusWriter {
    fn write(&self, writer: &mut dyn Write, trees: &[PhyloTree]) -> io::Result<()> {
        let taxa: Vec<String> = trees
            .iter()
            .flat_map(PhyloTree::leaves)
            .filter_map(Node::label)
            .unique()
            .map(escape_label)
            .collect();

        writeln!(writer, "#NEXUS")?;
        writeln!(writer, "BEGIN TAXA;")?;
        writeln!(writer, "\tDIMENSIONS NTAX={};", taxa.len())?;
        writeln!(writer, "\tTAXLABELS {};", taxa.iter().join(" "))?;
        writeln!(writer, "END;")?;
        writeln!(writer, "BEGIN TREES;")?;
        for (i, tree) in trees.iter().enumerate() {
            writeln!(
                writer,
                "\tTREE TREE_{} = [&R] {}",
                i + 1,
                self.newick.to_newick(tree)
            )?;
        }
        writeln!(writer, "END;")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NodeKind;

    fn sample(label: &str, time: f64) -> Node {
        Node::new(
            NodeKind::Sample {
                label: label.to_string(),
            },
            time,
            "A",
        )
    }

    fn tree() -> PhyloTree {
        let root = Node::new(NodeKind::Coalescence, 1., "A")
            .with_children(vec![sample("a", 3.), sample("b", 2.)]);
        PhyloTree::new("A", 0.5, root)
    }

    #[test]
    fn newick_uses_time_differences() {
        assert_eq!(NewickWriter::new().to_newick(&tree()), "(a:2,b:1):0.5;");
    }

    #[test]
    fn newick_with_hosts() {
        assert_eq!(
            NewickWriter::new().with_host_annotations().to_newick(&tree()),
            "(a[&host=\"A\"]:2,b[&host=\"A\"]:1)[&host=\"A\"]:0.5;"
        );
    }

    #[test]
    fn newick_of_single_leaf() {
        let tree = PhyloTree::new("A", 0., sample("A_sampled_1_2.5", 2.5));
        assert_eq!(NewickWriter::new().to_newick(&tree), "A_sampled_1_2.5:2.5;");
    }

    #[test]
    fn nested_markers_keep_their_labels() {
        let marker = Node::new(
            NodeKind::Transmission {
                infectee: "B".to_string(),
                label: "B_infected_by_A_1_lineage_1".to_string(),
            },
            1.,
            "A",
        )
        .with_children(vec![sample("b", 2.)]);
        let root = Node::new(NodeKind::Infection, 0., "A").with_children(vec![marker]);
        let tree = PhyloTree::new("A", 0., root);
        assert_eq!(
            NewickWriter::new().to_newick(&tree),
            "((b:1)B_infected_by_A_1_lineage_1:1):0;"
        );
    }

    #[test]
    fn labels_are_escaped() {
        assert_eq!(escape_label("plain_label"), "plain_label");
        assert_eq!(escape_label("with space"), "'with space'");
        assert_eq!(escape_label("it's"), "'it''s'");
        assert_eq!(escape_label("a:b"), "'a:b'");
    }

    #[test]
    fn nexus_lists_taxa_and_trees() {
        let second = PhyloTree::new("A", 0.5, sample("c", 4.));
        let mut output = vec![];
        NexusWriter::new()
            .write(&mut output, &[tree(), second])
            .unwrap();
        let nexus = String::from_utf8(output).unwrap();
        let expected = "#NEXUS\n\
                        BEGIN TAXA;\n\
                        \tDIMENSIONS NTAX=3;\n\
                        \tTAXLABELS a b c;\n\
                        END;\n\
                        BEGIN TREES;\n\
                        \tTREE TREE_1 = [&R] (a:2,b:1):0.5;\n\
                        \tTREE TREE_2 = [&R] c:3.5;\n\
                        END;\n";
        assert_eq!(nexus, expected);
    }
}
