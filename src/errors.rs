//! All errors that can occur in the virustree library.

use std::fmt;

pub type Result<T> = std::result::Result<T, VirusTreeError>;

#[derive(Clone, Debug, PartialEq)]
pub enum VirusTreeError {
    /// An infector id that never appears as an infectee.
    UnknownInfector { infector: String, infectee: String },
    /// A sampling record for a host that was never infected.
    UnknownHost(String),
    /// A host that appears more than once as an infectee.
    DuplicateHost(String),
    /// No host without an infector was found.
    NoIntroduction,
    /// An event recorded against a host before its own infection.
    EventBeforeInfection {
        host: String,
        infection_time: f64,
        event_time: f64,
    },
    /// A host that is its own ancestor in the infector relation.
    CyclicTransmission(String),
    /// Placeholder tips of a transmission do not match the grafted subtrees.
    InstanceMismatch {
        host: String,
        infectee: String,
        expected: usize,
        found: usize,
    },
    /// Forced coalescence did not succeed within the attempt budget.
    CoalescenceExhausted { host: String, attempts: usize },
    InvalidParameter(String),
    ReadError(String),
    WriteError(String),
    ConfigError(String),
}

impl fmt::Display for VirusTreeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VirusTreeError::UnknownInfector { infector, infectee } => write!(
                f,
                "UnknownInfector: {infector} (infector of {infectee}) does not appear as an infectee"
            ),
            VirusTreeError::UnknownHost(host) => {
                write!(f, "UnknownHost: {host} was never infected")
            }
            VirusTreeError::DuplicateHost(host) => {
                write!(f, "DuplicateHost: {host} is infected more than once")
            }
            VirusTreeError::NoIntroduction => {
                write!(f, "NoIntroduction: no host without an infector")
            }
            VirusTreeError::EventBeforeInfection {
                host,
                infection_time,
                event_time,
            } => write!(
                f,
                "EventBeforeInfection: event at {event_time} for {host} precedes its infection at {infection_time}"
            ),
            VirusTreeError::CyclicTransmission(host) => {
                write!(f, "CyclicTransmission: {host} is its own ancestor")
            }
            VirusTreeError::InstanceMismatch {
                host,
                infectee,
                expected,
                found,
            } => write!(
                f,
                "InstanceMismatch: {host} has {found} tips for the infection of {infectee}, expected {expected}"
            ),
            VirusTreeError::CoalescenceExhausted { host, attempts } => write!(
                f,
                "CoalescenceExhausted: lineages in {host} did not coalesce within {attempts} attempts"
            ),
            VirusTreeError::InvalidParameter(message) => {
                write!(f, "InvalidParameter: {message}")
            }
            VirusTreeError::ReadError(message) => write!(f, "ReadError: {message}"),
            VirusTreeError::WriteError(message) => write!(f, "WriteError: {message}"),
            VirusTreeError::ConfigError(message) => write!(f, "ConfigError: {message}"),
        }
    }
}

impl std::error::Error for VirusTreeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_variant() {
        let error = VirusTreeError::CoalescenceExhausted {
            host: "A".to_string(),
            attempts: 3,
        };
        assert_eq!(
            error.to_string(),
            "CoalescenceExhausted: lineages in A did not coalesce within 3 attempts"
        );
        assert_eq!(
            VirusTreeError::NoIntroduction.to_string(),
            "NoIntroduction: no host without an infector"
        );
    }
}
