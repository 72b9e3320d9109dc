//! Tab-separated input and output of subtyping results and tile evidence

use crate::utils::{create_writer, open_reader};
use crate::{QcError, QcResult, ResultsTable, Subtype, TileHit};
use std::collections::HashMap;
use std::path::Path;

fn tsv_reader<P: AsRef<Path>>(path: P) -> QcResult<csv::Reader<Box<dyn std::io::BufRead>>> {
    let reader = open_reader(path)?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .from_reader(reader))
}

/// Read one subtyping result per sample
pub fn read_subtype_summaries<P: AsRef<Path>>(path: P) -> QcResult<Vec<Subtype>> {
    let mut reader = tsv_reader(&path)?;

    let mut subtypes = Vec::new();
    for result in reader.deserialize() {
        let subtype: Subtype = result?;
        subtypes.push(subtype);
    }

    log::debug!(
        "Read {} subtyping results from {:?}",
        subtypes.len(),
        path.as_ref()
    );
    Ok(subtypes)
}

/// Read per-tile evidence and group it by sample
pub fn read_tile_results<P: AsRef<Path>>(path: P) -> QcResult<HashMap<String, ResultsTable>> {
    let mut reader = tsv_reader(&path)?;

    let mut tables: HashMap<String, ResultsTable> = HashMap::new();
    let mut n_tiles = 0usize;
    for result in reader.deserialize() {
        let tile: TileHit = result?;
        n_tiles += 1;
        tables.entry(tile.sample.clone()).or_default().push(tile);
    }

    log::debug!(
        "Read {} tile results for {} samples from {:?}",
        n_tiles,
        tables.len(),
        path.as_ref()
    );
    Ok(tables)
}

/// Write subtyping results with their QC status and message
pub fn write_qc_report<P: AsRef<Path>>(subtypes: &[Subtype], path: P) -> QcResult<()> {
    let writer = create_writer(path)?;
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);

    for subtype in subtypes {
        csv_writer.serialize(subtype)?;
    }

    csv_writer
        .into_inner()
        .map_err(|e| QcError::Io(e.into_error()))?
        .finish()
}
