//! CSV input of transmission and sampling records.

use serde::de::DeserializeOwned;
use std::io;

use crate::core::{SamplingRecord, TransmissionRecord};
use crate::errors::{Result, VirusTreeError};

pub trait RecordIO: Sized {
    fn read(path: &str) -> Result<Vec<Self>>;
    fn read_from(reader: impl io::Read, source: &str) -> Result<Vec<Self>>;
}

impl<T: DeserializeOwned> RecordIO for T
where
    T: InputRecord,
{
    /// Reads all records of a CSV file with a header row.
    fn read(path: &str) -> Result<Vec<Self>> {
        let file = std::fs::File::open(path)
            .map_err(|_err| VirusTreeError::ReadError(format!("Failed to read from {path}")))?;
        Self::read_from(io::BufReader::new(file), path)
    }

    fn read_from(reader: impl io::Read, source: &str) -> Result<Vec<Self>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let records = reader
            .deserialize()
            .enumerate()
            .map(|(row, record)| {
                record.map_err(|err| {
                    VirusTreeError::ReadError(format!(
                        "Failed to parse {} record {} in {source}: {err}",
                        T::KIND,
                        row + 1
                    ))
                })
            })
            .collect::<Result<Vec<T>>>()?;
        log::info!("Read {} {} records from {source}", records.len(), T::KIND);
        Ok(records)
    }
}

/// Records that can be read from the input tables.
pub trait InputRecord {
    const KIND: &'static str;
}

impl InputRecord for TransmissionRecord {
    const KIND: &'static str = "transmission";
}

impl InputRecord for SamplingRecord {
    const KIND: &'static str = "sampling";
}
