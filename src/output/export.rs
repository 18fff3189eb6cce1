//! JSON Lines export of stored reviews

use crate::crawler::ReviewRecord;
use crate::storage::Storage;
use crate::CrawlError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes every stored review to `path`, one JSON object per line
///
/// # Returns
///
/// The number of reviews written
pub fn export_jsonl(storage: &dyn Storage, path: &Path) -> Result<usize, CrawlError> {
    let reviews = storage.load_reviews()?;
    let mut writer = BufWriter::new(File::create(path)?);
    let written = write_jsonl(&mut writer, &reviews)?;
    writer.flush()?;

    tracing::info!("Exported {} reviews to {}", written, path.display());
    Ok(written)
}

/// Serializes records as JSON Lines into any writer
pub fn write_jsonl<W: Write>(writer: &mut W, records: &[ReviewRecord]) -> Result<usize, CrawlError> {
    for record in records {
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
    }
    Ok(records.len())
}
