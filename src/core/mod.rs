//! This module contains the core datatypes and algorithms of the library.

mod assembler;
mod coalescent;
mod demography;
mod simplify;
mod transmission;
mod tree;
mod treelet;

pub use assembler::{Introduction, PLAUSIBILITY_THRESHOLD, Reconstruction, Reconstructor};
pub use coalescent::{AttemptsExhausted, CoalescentSimulator, Genealogy, LineageId, Simulation};
pub use demography::Demography;
pub use simplify::simplify;
pub use transmission::{
    Event, EventKind, Host, HostId, NO_INFECTOR, SamplingRecord, TransmissionGraph,
    TransmissionRecord,
};
pub use tree::{Node, NodeKind, PhyloTree, branch_length};
pub use treelet::{RelevantEvent, TreeletBuilder, Treelets};
