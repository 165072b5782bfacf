//! IO of transmission records and phylogenies.

mod records;
mod writer;

pub use records::{InputRecord, RecordIO};
pub use writer::{NewickWriter, NexusWriter, TreeWriter, escape_label};
