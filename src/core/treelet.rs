//! Local genealogies of single hosts.
//!
//! A treelet covers the time between the infection of a host and its latest relevant event.
//! Every sampled sequence and every onward transmission that leads to a sample becomes a tip;
//! the coalescent simulator joins them, and each resulting root hangs below a node marking the
//! infection of the host.

use rand::Rng;

use super::coalescent::{AttemptsExhausted, CoalescentSimulator};
use super::transmission::Host;
use super::tree::{Node, NodeKind};
use crate::errors::{Result, VirusTreeError};

/// An event that contributes lineages to a treelet.
#[derive(Clone, Debug, PartialEq)]
pub enum RelevantEvent {
    /// `count` sequences sampled at `time`.
    Sample { time: f64, count: usize },

    /// Transmission to `infectee` at `time`, carrying `instances` lineages that lead to samples.
    Transmission {
        time: f64,
        infectee: String,
        instances: usize,
    },
}

impl RelevantEvent {
    pub fn time(&self) -> f64 {
        match self {
            RelevantEvent::Sample { time, .. } | RelevantEvent::Transmission { time, .. } => *time,
        }
    }

    pub fn instances(&self) -> usize {
        match self {
            RelevantEvent::Sample { count, .. } => *count,
            RelevantEvent::Transmission { instances, .. } => *instances,
        }
    }

    /// One tip per instance of the event.
    fn tips(&self, host: &str) -> impl Iterator<Item = Node> + '_ {
        let host = host.to_string();
        (1..=self.instances()).map(move |lineage| match self {
            RelevantEvent::Sample { time, .. } => Node::new(
                NodeKind::Sample {
                    label: format!("{host}_sampled_{lineage}_{time}"),
                },
                *time,
                &host,
            ),
            RelevantEvent::Transmission { time, infectee, .. } => Node::new(
                NodeKind::Transmission {
                    infectee: infectee.clone(),
                    label: format!("{infectee}_infected_by_{host}_{time}_lineage_{lineage}"),
                },
                *time,
                &host,
            ),
        })
    }
}

/// Treelets of one host, each rooted at an infection node.
#[derive(Clone, Debug)]
pub struct Treelets {
    pub roots: Vec<Node>,
    pub plausibility: f64,
    pub failed_attempts: usize,
}

impl Treelets {
    fn empty() -> Self {
        Self {
            roots: Vec::new(),
            plausibility: 1.,
            failed_attempts: 0,
        }
    }
}

pub struct TreeletBuilder<'a> {
    simulator: &'a CoalescentSimulator,
}

impl<'a> TreeletBuilder<'a> {
    pub fn new(simulator: &'a CoalescentSimulator) -> Self {
        Self { simulator }
    }

    /// Build the treelets of `host` from its relevant events.
    ///
    /// Returns no treelet if there are no relevant events; the host then has no observable
    /// lineage.
    pub fn build<R: Rng + ?Sized>(
        &self,
        host: &Host,
        events: &[RelevantEvent],
        rng: &mut R,
    ) -> Result<Treelets> {
        if events.is_empty() {
            return Ok(Treelets::empty());
        }

        let infection_time = host.infection_time();
        let latest = events
            .iter()
            .map(RelevantEvent::time)
            .fold(f64::NEG_INFINITY, f64::max);
        let active_time = latest - infection_time;

        let tips: Vec<Node> = events
            .iter()
            .flat_map(|event| event.tips(host.name()))
            .collect();

        let mut treelets = Treelets::empty();
        let roots = match tips.len() {
            0 => return Ok(treelets),
            1 => tips,
            _ => {
                let heights: Vec<f64> = tips.iter().map(|tip| latest - tip.time).collect();
                let simulation = self
                    .simulator
                    .simulate(&heights, active_time, rng)
                    .map_err(|AttemptsExhausted(attempts)| {
                        VirusTreeError::CoalescenceExhausted {
                            host: host.name().to_string(),
                            attempts,
                        }
                    })?;
                if simulation.failed_attempts > 0 {
                    log::debug!(
                        "Lineages of {} coalesced after {} failed attempts",
                        host.name(),
                        simulation.failed_attempts
                    );
                }
                treelets.plausibility = simulation.plausibility;
                treelets.failed_attempts = simulation.failed_attempts;

                let genealogy = simulation.genealogy;
                let mut lineages: Vec<Option<Node>> = tips.into_iter().map(Some).collect();
                for ancestor in genealogy.tip_count()..genealogy.tip_count() + genealogy.merge_count()
                {
                    let children = genealogy
                        .children(ancestor)
                        .map(|(left, right)| [lineages[left].take(), lineages[right].take()])
                        .into_iter()
                        .flatten()
                        .flatten()
                        .collect();
                    let node = Node::new(
                        NodeKind::Coalescence,
                        latest - genealogy.height(ancestor),
                        host.name(),
                    )
                    .with_children(children);
                    lineages.push(Some(node));
                }
                genealogy
                    .roots()
                    .iter()
                    .filter_map(|&root| lineages[root].take())
                    .collect()
            }
        };

        treelets.roots = roots
            .into_iter()
            .map(|root| {
                Node::new(NodeKind::Infection, infection_time, host.name()).with_children(vec![root])
            })
            .collect();
        Ok(treelets)
    }
}
