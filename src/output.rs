use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::errors::{AppError, AppResult};
use crate::listing::{CanonicalRecord, RawListing};

/// Reads one spider export: a JSON array of listing objects.
pub fn read_raw_batch(path: &Path) -> AppResult<Vec<RawListing>> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file)).map_err(|err| {
        AppError::Parse(format!(
            "{} is not a JSON listing array: {err}",
            path.display()
        ))
    })
}

pub fn write_merged(path: &Path, records: &[CanonicalRecord]) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

pub fn read_merged(path: &Path) -> AppResult<Vec<CanonicalRecord>> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file)).map_err(|err| {
        AppError::Parse(format!("{} is not a merged rentals file: {err}", path.display()))
    })
}
