//! Transmission history.
//!
//! The transmission graph is a forest of hosts. Every host has been infected exactly once, either
//! by another host or by an introduction from outside the observed population, and carries the
//! time-ordered events it is the source of: onward infections and pathogen samples.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use crate::errors::{Result, VirusTreeError};

/// Index of a host in the [`TransmissionGraph`].
pub type HostId = usize;

/// Value that marks a missing infector in transmission records.
pub const NO_INFECTOR: &str = "NA";

/// A single transmission: `infectee` was infected by `infector` at `time`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransmissionRecord {
    #[serde(rename = "IDREC")]
    pub infectee: String,
    #[serde(rename = "IDTR", deserialize_with = "deserialize_infector")]
    pub infector: Option<String>,
    #[serde(rename = "TIME_TR")]
    pub time: f64,
}

/// `count` pathogen sequences drawn from `host` at `time`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SamplingRecord {
    #[serde(rename = "IDPOP")]
    pub host: String,
    #[serde(rename = "TIME_SEQ")]
    pub time: f64,
    #[serde(rename = "SEQ_COUNT")]
    pub count: usize,
}

fn deserialize_infector<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    let value = value.trim();
    if value.is_empty() || value == NO_INFECTOR {
        return Ok(None);
    }
    Ok(Some(value.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    /// Onward transmission to `infectee`.
    Infection { infectee: HostId },
    /// `count` simultaneous samples.
    Sample { count: usize },
}

/// An event a host is the source of.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub time: f64,
    pub kind: EventKind,
}

#[derive(Debug, Clone)]
pub struct Host {
    name: String,
    infection_time: f64,
    infector: Option<HostId>,
    events: Vec<Event>,
}

impl Host {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn infection_time(&self) -> f64 {
        self.infection_time
    }

    /// The host that infected this one; `None` for introductions.
    pub fn infector(&self) -> Option<HostId> {
        self.infector
    }

    pub fn is_introduction(&self) -> bool {
        self.infector.is_none()
    }

    /// Child events ordered by time; simultaneous events keep their input order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }
}

#[derive(Debug, Clone)]
pub struct TransmissionGraph {
    hosts: Vec<Host>,
    index: HashMap<String, HostId>,
}

impl TransmissionGraph {
    /// Build and validate the graph from transmission and sampling records.
    pub fn from_records(
        transmissions: &[TransmissionRecord],
        samples: &[SamplingRecord],
    ) -> Result<Self> {
        let mut hosts: Vec<Host> = Vec::with_capacity(transmissions.len());
        let mut index: HashMap<String, HostId> = HashMap::with_capacity(transmissions.len());

        for record in transmissions {
            check_time(&record.infectee, record.time)?;
            if index.insert(record.infectee.clone(), hosts.len()).is_some() {
                return Err(VirusTreeError::DuplicateHost(record.infectee.clone()));
            }
            hosts.push(Host {
                name: record.infectee.clone(),
                infection_time: record.time,
                infector: None,
                events: Vec::new(),
            });
        }

        for (infectee, record) in transmissions.iter().enumerate() {
            let Some(infector_name) = &record.infector else {
                continue;
            };
            let infector = *index.get(infector_name).ok_or_else(|| {
                VirusTreeError::UnknownInfector {
                    infector: infector_name.clone(),
                    infectee: record.infectee.clone(),
                }
            })?;
            hosts[infectee].infector = Some(infector);
            hosts[infector].events.push(Event {
                time: record.time,
                kind: EventKind::Infection { infectee },
            });
        }

        for record in samples {
            check_time(&record.host, record.time)?;
            let host = *index
                .get(&record.host)
                .ok_or_else(|| VirusTreeError::UnknownHost(record.host.clone()))?;
            if record.count == 0 {
                log::warn!(
                    "Skipping empty sample of {} at {}",
                    record.host,
                    record.time
                );
                continue;
            }
            hosts[host].events.push(Event {
                time: record.time,
                kind: EventKind::Sample {
                    count: record.count,
                },
            });
        }

        for host in hosts.iter_mut() {
            if let Some(event) = host
                .events
                .iter()
                .find(|event| event.time < host.infection_time)
            {
                return Err(VirusTreeError::EventBeforeInfection {
                    host: host.name.clone(),
                    infection_time: host.infection_time,
                    event_time: event.time,
                });
            }
            host.events.sort_by(|a, b| a.time.total_cmp(&b.time));
        }

        let graph = Self { hosts, index };
        if graph.introductions().is_empty() {
            return Err(VirusTreeError::NoIntroduction);
        }
        graph.check_acyclic()?;

        log::info!(
            "Loaded transmission graph with {} hosts and {} introductions",
            graph.len(),
            graph.introductions().len()
        );
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn host(&self, id: HostId) -> &Host {
        &self.hosts[id]
    }

    pub fn id(&self, name: &str) -> Option<HostId> {
        self.index.get(name).copied()
    }

    /// Hosts without an infector, in input order.
    pub fn introductions(&self) -> Vec<HostId> {
        self.hosts
            .iter()
            .enumerate()
            .filter(|(_, host)| host.is_introduction())
            .map(|(id, _)| id)
            .collect()
    }

    /// The hosts infected directly by `id`, in event order.
    pub fn infectees(&self, id: HostId) -> impl Iterator<Item = HostId> + '_ {
        self.hosts[id].events.iter().filter_map(|event| match event.kind {
            EventKind::Infection { infectee } => Some(infectee),
            EventKind::Sample { .. } => None,
        })
    }

    /// All hosts in the transmission tree below `root` (inclusive), every host listed after
    /// the hosts it infected.
    pub fn post_order(&self, root: HostId) -> Vec<HostId> {
        let mut order = Vec::new();
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            let infectees: Vec<HostId> = self.infectees(id).collect();
            stack.extend(infectees.into_iter().rev().map(|infectee| (infectee, false)));
        }
        order
    }

    fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            Visiting,
            Rooted,
        }

        let mut marks = vec![Mark::Unvisited; self.hosts.len()];
        for start in 0..self.hosts.len() {
            let mut path = Vec::new();
            let mut current = Some(start);
            while let Some(id) = current {
                match marks[id] {
                    Mark::Rooted => break,
                    Mark::Visiting => {
                        return Err(VirusTreeError::CyclicTransmission(
                            self.hosts[id].name.clone(),
                        ));
                    }
                    Mark::Unvisited => {
                        marks[id] = Mark::Visiting;
                        path.push(id);
                        current = self.hosts[id].infector;
                    }
                }
            }
            for id in path {
                marks[id] = Mark::Rooted;
            }
        }
        Ok(())
    }
}

fn check_time(host: &str, time: f64) -> Result<()> {
    if time.is_finite() {
        return Ok(());
    }
    Err(VirusTreeError::InvalidParameter(format!(
        "time of {host} must be finite, got {time}"
    )))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn transmission(infectee: &str, infector: Option<&str>, time: f64) -> TransmissionRecord {
        TransmissionRecord {
            infectee: infectee.to_string(),
            infector: infector.map(str::to_string),
            time,
        }
    }

    pub(crate) fn sample(host: &str, time: f64, count: usize) -> SamplingRecord {
        SamplingRecord {
            host: host.to_string(),
            time,
            count,
        }
    }

    #[test]
    fn builds_events_in_time_order() {
        let graph = TransmissionGraph::from_records(
            &[
                transmission("A", None, 0.),
                transmission("B", Some("A"), 2.),
                transmission("C", Some("A"), 1.),
            ],
            &[sample("A", 1.5, 2), sample("B", 3., 1)],
        )
        .unwrap();

        let a = graph.id("A").unwrap();
        let times: Vec<f64> = graph.host(a).events().iter().map(|e| e.time).collect();
        assert_eq!(times, vec![1., 1.5, 2.]);
        assert_eq!(
            graph.host(a).events()[1].kind,
            EventKind::Sample { count: 2 }
        );
        assert_eq!(graph.introductions(), vec![a]);
        assert_eq!(graph.host(graph.id("B").unwrap()).infector(), Some(a));
    }

    #[test]
    fn post_order_lists_infectees_first() {
        let graph = TransmissionGraph::from_records(
            &[
                transmission("A", None, 0.),
                transmission("B", Some("A"), 1.),
                transmission("C", Some("B"), 2.),
                transmission("D", Some("A"), 3.),
            ],
            &[],
        )
        .unwrap();
        let names: Vec<&str> = graph
            .post_order(graph.id("A").unwrap())
            .into_iter()
            .map(|id| graph.host(id).name())
            .collect();
        assert_eq!(names, vec!["C", "B", "D", "A"]);
    }

    #[test]
    fn unknown_infector_is_fatal() {
        let result = TransmissionGraph::from_records(
            &[transmission("A", None, 0.), transmission("B", Some("Z"), 1.)],
            &[],
        );
        assert_eq!(
            result.unwrap_err(),
            VirusTreeError::UnknownInfector {
                infector: "Z".to_string(),
                infectee: "B".to_string()
            }
        );
    }

    #[test]
    fn missing_introduction_is_fatal() {
        let result = TransmissionGraph::from_records(
            &[
                transmission("A", Some("B"), 0.),
                transmission("B", Some("A"), 0.),
            ],
            &[],
        );
        assert_eq!(result.unwrap_err(), VirusTreeError::NoIntroduction);
    }

    #[test]
    fn cycles_are_fatal() {
        let result = TransmissionGraph::from_records(
            &[
                transmission("R", None, 0.),
                transmission("A", Some("B"), 1.),
                transmission("B", Some("A"), 1.),
            ],
            &[],
        );
        assert!(matches!(
            result.unwrap_err(),
            VirusTreeError::CyclicTransmission(_)
        ));
    }

    #[test]
    fn events_before_infection_are_fatal() {
        let result = TransmissionGraph::from_records(
            &[transmission("A", None, 2.)],
            &[sample("A", 1., 1)],
        );
        assert_eq!(
            result.unwrap_err(),
            VirusTreeError::EventBeforeInfection {
                host: "A".to_string(),
                infection_time: 2.,
                event_time: 1.
            }
        );

        let result = TransmissionGraph::from_records(
            &[transmission("A", None, 2.), transmission("B", Some("A"), 1.)],
            &[],
        );
        assert!(matches!(
            result.unwrap_err(),
            VirusTreeError::EventBeforeInfection { .. }
        ));
    }

    #[test]
    fn duplicate_and_unknown_hosts_are_fatal() {
        let result = TransmissionGraph::from_records(
            &[transmission("A", None, 0.), transmission("A", None, 1.)],
            &[],
        );
        assert_eq!(
            result.unwrap_err(),
            VirusTreeError::DuplicateHost("A".to_string())
        );

        let result =
            TransmissionGraph::from_records(&[transmission("A", None, 0.)], &[sample("B", 1., 1)]);
        assert_eq!(
            result.unwrap_err(),
            VirusTreeError::UnknownHost("B".to_string())
        );
    }

    #[test]
    fn empty_samples_are_skipped() {
        let graph =
            TransmissionGraph::from_records(&[transmission("A", None, 0.)], &[sample("A", 1., 0)])
                .unwrap();
        assert!(graph.host(0).events().is_empty());
    }
}
