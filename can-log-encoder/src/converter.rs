//! Main converter API
//!
//! The [`Converter`] drives the pipeline: rows are read from a
//! [`CsvFrameReader`], converted one at a time, and the accepted frames are
//! appended to a [`FrameSink`] in input order. Rejected rows are collected in
//! the [`ConversionReport`] and never stop the run.

use crate::config::ConverterConfig;
use crate::formats::{BlfWriter, FrameSink};
use crate::parser::CsvFrameReader;
use crate::types::{ConversionReport, Rejection, Result};
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::Path;

/// CSV to BLF converter - entry point for all conversion operations
#[derive(Debug, Clone, Default)]
pub struct Converter {
    config: ConverterConfig,
}

impl Converter {
    /// Create a converter with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a converter with the given configuration
    pub fn with_config(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// The active configuration
    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Open a CSV input and consume its header
    ///
    /// Fails when the file is missing, empty, or has no data rows.
    pub fn open_input(&self, path: &Path) -> Result<CsvFrameReader<File>> {
        CsvFrameReader::from_path(path, &self.config)
    }

    /// Create the BLF output file
    pub fn create_output(&self, path: &Path) -> Result<BlfWriter<BufWriter<File>>> {
        Ok(BlfWriter::create(path, &self.config)?)
    }

    /// Convert every remaining row of `reader` into `sink`
    ///
    /// `on_reject` is called for each rejected row as soon as it is seen.
    /// The returned report has an empty summary; the caller owns the sink and
    /// fills it in when closing.
    ///
    /// # Example
    /// ```no_run
    /// use can_log_encoder::Converter;
    /// use std::path::Path;
    ///
    /// let converter = Converter::new();
    /// let mut reader = converter.open_input(Path::new("trace.csv")).unwrap();
    /// let mut writer = converter.create_output(Path::new("trace.blf")).unwrap();
    /// let mut report = converter
    ///     .run(&mut reader, &mut writer, |r| eprintln!("{}", r))
    ///     .unwrap();
    /// report.summary = writer.close().unwrap();
    /// ```
    pub fn run<R, S, F>(
        &self,
        reader: &mut CsvFrameReader<R>,
        sink: &mut S,
        mut on_reject: F,
    ) -> Result<ConversionReport>
    where
        R: Read,
        S: FrameSink,
        F: FnMut(&Rejection),
    {
        let mut report = ConversionReport {
            header: reader.header().to_vec(),
            ..ConversionReport::default()
        };

        for outcome in reader.by_ref() {
            let outcome = outcome?;
            match &outcome.result {
                Ok(frame) => {
                    sink.append(frame)?;
                    report.converted += 1;
                }
                Err(reason) => {
                    log::debug!("Rejected row {}: {}", outcome.row, reason);
                    let rejection = Rejection {
                        row: outcome.row,
                        reason: reason.clone(),
                        content: outcome.content,
                    };
                    on_reject(&rejection);
                    report.rejections.push(rejection);
                    report.rejected += 1;
                }
            }
        }

        log::info!(
            "Converted {} rows, rejected {}",
            report.converted,
            report.rejected
        );
        Ok(report)
    }

    /// Convert a CSV file into a BLF file
    ///
    /// The input is validated before the output is created, so a missing,
    /// empty, or header-only input leaves no output file behind. The output
    /// is sealed on every exit path.
    pub fn convert_files(&self, input: &Path, output: &Path) -> Result<ConversionReport> {
        let mut reader = self.open_input(input)?;
        let mut writer = self.create_output(output)?;

        let mut report = self.run(&mut reader, &mut writer, |_| {})?;
        report.summary = writer.close()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EncodeError, FrameRecord, RejectionReason};

    #[derive(Default)]
    struct CollectSink {
        frames: Vec<FrameRecord>,
        fail_after: Option<usize>,
    }

    impl FrameSink for CollectSink {
        fn append(&mut self, frame: &FrameRecord) -> std::result::Result<(), EncodeError> {
            if Some(self.frames.len()) == self.fail_after {
                return Err(EncodeError::SinkFailure(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.frames.push(frame.clone());
            Ok(())
        }
    }

    const INPUT: &str = "Timestamp,ArbitrationID,IsExtendedID,IsRemoteFrame,DLC,Data\n\
                         1678886400.123,10A,False,False,8,0102AABB\n\
                         bad,10A,False,False,,\n\
                         1678886400.456,1A2B3C4D,True,False,,DEADBEEF\n";

    #[test]
    fn test_run_counts_and_order() {
        let converter = Converter::new();
        let mut reader = CsvFrameReader::from_reader(INPUT.as_bytes(), converter.config()).unwrap();
        let mut sink = CollectSink::default();
        let mut seen = Vec::new();

        let report = converter
            .run(&mut reader, &mut sink, |r| seen.push(r.row))
            .unwrap();

        assert_eq!(report.converted, 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.rows(), 3);
        assert_eq!(report.header.len(), 6);
        assert_eq!(seen, vec![3]);
        assert!(matches!(
            report.rejections[0].reason,
            RejectionReason::InvalidTimestamp { .. }
        ));
        assert_eq!(sink.frames[0].arbitration_id, 0x10A);
        assert_eq!(sink.frames[1].arbitration_id, 0x1A2B3C4D);
    }

    #[test]
    fn test_all_rows_rejected_is_not_fatal() {
        let input = "h\nx,10A,False,False,,\ny,10B,False,False,,\n";
        let converter = Converter::new();
        let mut reader = CsvFrameReader::from_reader(input.as_bytes(), converter.config()).unwrap();
        let mut sink = CollectSink::default();

        let report = converter.run(&mut reader, &mut sink, |_| {}).unwrap();
        assert_eq!(report.converted, 0);
        assert_eq!(report.rejected, 2);
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn test_sink_failure_aborts_run() {
        let converter = Converter::new();
        let mut reader = CsvFrameReader::from_reader(INPUT.as_bytes(), converter.config()).unwrap();
        let mut sink = CollectSink {
            fail_after: Some(1),
            ..CollectSink::default()
        };

        let result = converter.run(&mut reader, &mut sink, |_| {});
        assert!(matches!(
            result,
            Err(crate::types::ConverterError::Encode(EncodeError::SinkFailure(_)))
        ));
        assert_eq!(sink.frames.len(), 1);
    }
}
