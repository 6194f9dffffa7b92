//! Report output and read-back verification

use anyhow::{bail, Context, Result};
use can_log_encoder::{BlfReader, ConversionReport};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Write the conversion report as pretty-printed JSON
pub fn write_json_report(path: &Path, report: &ConversionReport) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create report file: {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .with_context(|| format!("Failed to write report file: {:?}", path))?;
    log::info!("Report written to {:?}", path);
    Ok(())
}

/// Read the BLF file back and check it holds exactly the converted frames
///
/// Returns the number of frames read.
pub fn verify_output(path: &Path, report: &ConversionReport) -> Result<usize> {
    let reader = BlfReader::open(path)
        .with_context(|| format!("Failed to open BLF file for verification: {:?}", path))?;

    let declared = reader.stats().object_count as usize;
    let mut frames = 0;
    for frame in reader {
        frame.with_context(|| format!("Failed to read back frame {} of {:?}", frames + 1, path))?;
        frames += 1;
    }

    if frames != report.converted || declared != report.converted {
        bail!(
            "Verification failed: {} rows converted, header declares {}, {} frames read",
            report.converted,
            declared,
            frames
        );
    }
    Ok(frames)
}
