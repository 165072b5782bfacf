//! Assembly of whole-system phylogenies.
//!
//! Hosts are visited in post-order over the infection relation. Each host learns from its
//! infectees how many lineages they pass on, builds its own treelets with one placeholder tip per
//! such lineage, and grafts the subtrees of its infectees onto these placeholders. The subtrees
//! of an introduction are the final phylogenies.

use derive_more::{Deref, DerefMut};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::collections::HashMap;

use super::coalescent::CoalescentSimulator;
use super::transmission::{EventKind, HostId, TransmissionGraph};
use super::tree::{Node, NodeKind, PhyloTree};
use super::treelet::{RelevantEvent, TreeletBuilder};
use crate::errors::{Result, VirusTreeError};

/// Plausibility below which an introduction is flagged when coalescence is forced.
pub const PLAUSIBILITY_THRESHOLD: f64 = 0.9;

/// Phylogenies descending from one introduction.
#[derive(Clone, Debug)]
pub struct Introduction {
    pub first_case: String,

    /// More than one tree if the lineages of the introduction did not fully coalesce.
    pub trees: Vec<PhyloTree>,

    /// Product of the coalescence plausibilities of all simulated treelets.
    pub plausibility: f64,

    pub failed_attempts: usize,
}

/// Phylogenies of all introductions, in input order.
#[derive(Clone, Debug, Deref, DerefMut)]
pub struct Reconstruction(Vec<Introduction>);

impl Reconstruction {
    pub fn tree_count(&self) -> usize {
        self.iter().map(|introduction| introduction.trees.len()).sum()
    }

    /// Introductions whose plausibility falls below `threshold`.
    pub fn improbable(&self, threshold: f64) -> impl Iterator<Item = &Introduction> {
        self.iter()
            .filter(move |introduction| introduction.plausibility < threshold)
    }
}

/// Subtree roots of one host together with the diagnostics collected below it.
struct Assembled {
    roots: Vec<Node>,
    plausibility: f64,
    failed_attempts: usize,
}

pub struct Reconstructor<'a> {
    graph: &'a TransmissionGraph,
    simulator: CoalescentSimulator,
    plausibility_threshold: f64,
}

impl<'a> Reconstructor<'a> {
    pub fn new(graph: &'a TransmissionGraph, simulator: CoalescentSimulator) -> Self {
        Self {
            graph,
            simulator,
            plausibility_threshold: PLAUSIBILITY_THRESHOLD,
        }
    }

    pub fn with_plausibility_threshold(mut self, threshold: f64) -> Self {
        self.plausibility_threshold = threshold;
        self
    }

    /// Introductions with at least one child event.
    pub fn introductions(&self) -> Vec<HostId> {
        self.graph
            .introductions()
            .into_iter()
            .filter(|&id| !self.graph.host(id).events().is_empty())
            .collect()
    }

    /// Random number generator of the introduction at `index`, derived from the master seed.
    pub fn seeded_rng(seed: u64, index: usize) -> StdRng {
        StdRng::seed_from_u64(seed.wrapping_add(index as u64))
    }

    /// Reconstruct the phylogenies of all introductions.
    pub fn reconstruct_all(&self, seed: u64) -> Result<Reconstruction> {
        self.reconstruct_all_with(seed, |_| {})
    }

    /// Reconstruct the phylogenies of all introductions, reporting each finished introduction to
    /// `progress`.
    #[cfg(not(feature = "parallel"))]
    pub fn reconstruct_all_with<F>(&self, seed: u64, progress: F) -> Result<Reconstruction>
    where
        F: Fn(&Introduction) + Sync,
    {
        self.introductions()
            .into_iter()
            .enumerate()
            .map(|(index, id)| -> Result<Introduction> {
                let introduction = self.reconstruct(id, &mut Self::seeded_rng(seed, index))?;
                progress(&introduction);
                Ok(introduction)
            })
            .collect::<Result<Vec<_>>>()
            .map(Reconstruction)
    }

    /// Reconstruct the phylogenies of all introductions, reporting each finished introduction to
    /// `progress`.
    #[cfg(feature = "parallel")]
    pub fn reconstruct_all_with<F>(&self, seed: u64, progress: F) -> Result<Reconstruction>
    where
        F: Fn(&Introduction) + Sync,
    {
        self.introductions()
            .into_par_iter()
            .enumerate()
            .map(|(index, id)| -> Result<Introduction> {
                let introduction = self.reconstruct(id, &mut Self::seeded_rng(seed, index))?;
                progress(&introduction);
                Ok(introduction)
            })
            .collect::<Result<Vec<_>>>()
            .map(Reconstruction)
    }

    /// Reconstruct the phylogenies descending from `introduction`.
    pub fn reconstruct<R: Rng + ?Sized>(
        &self,
        introduction: HostId,
        rng: &mut R,
    ) -> Result<Introduction> {
        let host = self.graph.host(introduction);
        log::info!("Building tree(s) for descendants of {}", host.name());

        let assembled = self.assemble(introduction, rng)?;
        let trees: Vec<PhyloTree> = assembled
            .roots
            .into_iter()
            .map(|root| PhyloTree::new(host.name(), host.infection_time(), root))
            .collect();

        if trees.is_empty() {
            log::warn!("{} has no sampled descendants", host.name());
        }
        if self.simulator.force_coalescence() && assembled.plausibility < self.plausibility_threshold
        {
            log::warn!(
                "Any phylogeny for descendants of {} is quite improbable (p<{}) given this demographic function. Consider another.",
                host.name(),
                assembled.plausibility
            );
        }
        if trees.len() > 1 {
            log::info!(
                "Lineages of {} did not coalesce before its infection; emitting {} trees",
                host.name(),
                trees.len()
            );
        }

        Ok(Introduction {
            first_case: host.name().to_string(),
            trees,
            plausibility: assembled.plausibility,
            failed_attempts: assembled.failed_attempts,
        })
    }

    fn assemble<R: Rng + ?Sized>(&self, top: HostId, rng: &mut R) -> Result<Assembled> {
        let builder = TreeletBuilder::new(&self.simulator);
        let mut finished: HashMap<HostId, Assembled> = HashMap::new();

        for id in self.graph.post_order(top) {
            let host = self.graph.host(id);
            let mut relevant = Vec::with_capacity(host.events().len());
            let mut subtrees: HashMap<String, Vec<Node>> = HashMap::new();
            let mut plausibility = 1.;
            let mut failed_attempts = 0;

            for event in host.events() {
                match event.kind {
                    EventKind::Infection { infectee } => {
                        let child = finished.remove(&infectee).ok_or_else(|| {
                            VirusTreeError::CyclicTransmission(
                                self.graph.host(infectee).name().to_string(),
                            )
                        })?;
                        plausibility *= child.plausibility;
                        failed_attempts += child.failed_attempts;
                        if child.roots.is_empty() {
                            continue;
                        }
                        let name = self.graph.host(infectee).name().to_string();
                        relevant.push(RelevantEvent::Transmission {
                            time: event.time,
                            infectee: name.clone(),
                            instances: child.roots.len(),
                        });
                        subtrees.insert(name, child.roots);
                    }
                    EventKind::Sample { count } => relevant.push(RelevantEvent::Sample {
                        time: event.time,
                        count,
                    }),
                }
            }

            let treelets = builder.build(host, &relevant, rng)?;
            plausibility *= treelets.plausibility;
            failed_attempts += treelets.failed_attempts;

            let mut roots = treelets.roots;
            graft(host.name(), &mut roots, subtrees)?;

            finished.insert(
                id,
                Assembled {
                    roots,
                    plausibility,
                    failed_attempts,
                },
            );
        }

        finished
            .remove(&top)
            .ok_or_else(|| VirusTreeError::CyclicTransmission(self.graph.host(top).name().to_string()))
    }
}

/// Replace the placeholder tips of `roots` with the subtrees of the corresponding infectees.
///
/// The infection node on top of each subtree coincides with its placeholder and is dropped.
fn graft(host: &str, roots: &mut [Node], mut subtrees: HashMap<String, Vec<Node>>) -> Result<()> {
    let mut placeholders: HashMap<&str, usize> = HashMap::new();
    let mut stack: Vec<&Node> = roots.iter().collect();
    while let Some(node) = stack.pop() {
        if let NodeKind::Transmission { infectee, .. } = &node.kind
            && node.is_leaf()
        {
            *placeholders.entry(infectee.as_str()).or_default() += 1;
        }
        stack.extend(node.children.iter());
    }

    for (infectee, &found) in placeholders.iter() {
        let expected = subtrees.get(*infectee).map_or(0, Vec::len);
        if found != expected {
            return Err(mismatch(host, infectee, expected, found));
        }
    }
    for (infectee, subtree_roots) in subtrees.iter_mut() {
        let found = placeholders.get(infectee.as_str()).copied().unwrap_or(0);
        if found != subtree_roots.len() {
            return Err(mismatch(host, infectee, subtree_roots.len(), found));
        }
        // tips take subtrees in order
        subtree_roots.reverse();
    }

    let mut stack: Vec<&mut Node> = roots.iter_mut().collect();
    while let Some(node) = stack.pop() {
        if let NodeKind::Transmission { infectee, .. } = &node.kind
            && node.children.is_empty()
        {
            let subtree = subtrees
                .get_mut(infectee)
                .and_then(Vec::pop)
                .ok_or_else(|| mismatch(host, infectee, 0, 1))?;
            node.children = subtree.children;
            continue;
        }
        stack.extend(node.children.iter_mut());
    }
    Ok(())
}

fn mismatch(host: &str, infectee: &str, expected: usize, found: usize) -> VirusTreeError {
    VirusTreeError::InstanceMismatch {
        host: host.to_string(),
        infectee: infectee.to_string(),
        expected,
        found,
    }
}
