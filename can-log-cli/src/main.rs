//! CSV to BLF converter CLI
//!
//! Converts a CSV file of CAN messages into a Vector BLF file using the
//! can-log-encoder library, and adds:
//! - Console banners and per-row rejection messages
//! - TOML configuration with command-line overrides
//! - Optional JSON report and read-back verification

use anyhow::Result;
use can_log_encoder::{Converter, ConverterError, FlagParsing};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

mod config;
mod report;

/// Convert a CSV file containing CAN messages to a BLF file
#[derive(Parser, Debug)]
#[command(name = "csv-to-blf")]
#[command(about = "Convert a CSV file containing CAN messages to a BLF file", long_about = None)]
#[command(
    after_help = "Expected CSV columns: Timestamp (float), ArbitrationID (hex), IsExtendedID (bool), IsRemoteFrame (bool), DLC (int/str), Data (hex string)"
)]
#[command(version)]
struct Args {
    /// Path to the input CSV file
    #[arg(value_name = "INPUT_CSV")]
    input: PathBuf,

    /// Path where the output BLF file will be saved
    #[arg(value_name = "OUTPUT_BLF")]
    output: PathBuf,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Treat any flag value other than "true" as false instead of rejecting the row
    #[arg(long)]
    permissive_flags: bool,

    /// Reject rows whose DLC column disagrees with the payload length
    #[arg(long)]
    check_dlc: bool,

    /// Reject standard IDs above 0x7FF and remote frames carrying data
    #[arg(long)]
    strict_frames: bool,

    /// BLF channel number for all frames (1-based)
    #[arg(long, value_name = "N")]
    channel: Option<u16>,

    /// Write the conversion report as JSON to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Read the BLF file back after writing and check the frame count
    #[arg(long)]
    verify: bool,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress banners and log output; rejected rows and errors are still reported
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("CSV to BLF converter v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using encoder library v{}", can_log_encoder::VERSION);

    match convert(&args, &mut io::stdout().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", fatal_message(&e));
            ExitCode::FAILURE
        }
    }
}

/// Print a console banner unless `--quiet` is set
macro_rules! banner {
    ($out:expr, $quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            writeln!($out, $($arg)*)?;
        }
    };
}

/// Run one conversion, printing banners to `out`; any error is fatal for the process
fn convert<O: Write>(args: &Args, out: &mut O) -> Result<()> {
    let quiet = args.quiet;
    let mut app_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => config::AppConfig::default(),
    };

    // Command-line flags override the config file
    if args.permissive_flags {
        app_config.converter.flag_parsing = FlagParsing::Permissive;
    }
    if args.check_dlc {
        app_config.converter.check_dlc = true;
    }
    if args.strict_frames {
        app_config.converter.check_frame_consistency = true;
    }
    if let Some(channel) = args.channel {
        app_config.converter = app_config.converter.with_channel(channel);
    }
    if args.report.is_some() {
        app_config.output.report = args.report.clone();
    }
    if args.verify {
        app_config.output.verify = true;
    }

    banner!(out, quiet, "Input CSV file: {}", args.input.display());
    banner!(out, quiet, "Output BLF file: {}", args.output.display());

    let converter = Converter::with_config(app_config.converter);
    let mut reader = converter.open_input(&args.input)?;
    banner!(out, quiet, "CSV Header: {:?}", reader.header());

    let mut writer = converter.create_output(&args.output)?;

    banner!(out, quiet, "Starting CSV to BLF conversion...");
    let mut report = converter.run(&mut reader, &mut writer, |rejection| {
        eprintln!("{}", rejection);
    })?;
    report.summary = writer.close()?;

    if report.converted == 0 {
        if !quiet {
            eprintln!("Warning: No messages were successfully converted. Check CSV format and content.");
        }
    } else {
        banner!(
            out,
            quiet,
            "Successfully converted {} messages from CSV to BLF.",
            report.converted
        );
    }
    banner!(out, quiet, "BLF file generated: {}", args.output.display());

    if let Some(path) = &app_config.output.report {
        report::write_json_report(path, &report)?;
        banner!(out, quiet, "Report written: {}", path.display());
    }

    if app_config.output.verify {
        let frames = report::verify_output(&args.output, &report)?;
        banner!(out, quiet, "Verified {} frames in {}", frames, args.output.display());
    }

    Ok(())
}

/// Message printed to stderr for a fatal error
fn fatal_message(error: &anyhow::Error) -> String {
    match error.downcast_ref::<ConverterError>() {
        Some(ConverterError::InputNotFound(path)) => {
            format!("Error: Input CSV file not found: {}", path.display())
        }
        Some(ConverterError::EmptyInput) | Some(ConverterError::NoDataRows) => {
            "Error: CSV file is empty or contains only a header.".to_string()
        }
        _ => format!("An error occurred: {:#}", error),
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    // Warnings by default: rejections and banners already go to the console
    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn args(items: &[&str]) -> Args {
        Args::parse_from(std::iter::once("csv-to-blf").chain(items.iter().copied()))
    }

    #[test]
    fn test_args_parsing() {
        let args = args(&["in.csv", "out.blf", "--permissive-flags", "--channel", "2", "-vv"]);
        assert_eq!(args.input, PathBuf::from("in.csv"));
        assert_eq!(args.output, PathBuf::from("out.blf"));
        assert!(args.permissive_flags);
        assert_eq!(args.channel, Some(2));
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_convert_succeeds_with_rejected_rows() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.blf");
        fs::write(
            &input,
            "Timestamp,ArbitrationID,IsExtendedID,IsRemoteFrame,DLC,Data\n\
             1678886400.123,10A,False,False,8,0102AABB\n\
             bad,10A,False,False,,\n\
             1678886400.456,1A2B3C4D,True,False,,DEADBEEF\n",
        )
        .unwrap();

        let args = args(&[
            input.to_str().unwrap(),
            output.to_str().unwrap(),
            "--verify",
        ]);
        let mut out = Vec::new();
        assert!(convert(&args, &mut out).is_ok());
        assert!(output.exists());

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Starting CSV to BLF conversion..."));
        assert!(out.contains("Successfully converted 2 messages from CSV to BLF."));
        assert!(out.contains("Verified 2 frames in"));
    }

    #[test]
    fn test_convert_fails_on_header_only_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.csv");
        fs::write(&input, "Timestamp,ArbitrationID,IsExtendedID,IsRemoteFrame,DLC,Data\n").unwrap();
        let output = dir.path().join("out.blf");

        let args = args(&[input.to_str().unwrap(), output.to_str().unwrap()]);
        let err = convert(&args, &mut io::sink()).unwrap_err();
        assert_eq!(
            fatal_message(&err),
            "Error: CSV file is empty or contains only a header."
        );
    }

    #[test]
    fn test_convert_fails_on_missing_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("missing.csv");
        let output = dir.path().join("out.blf");

        let args = args(&[input.to_str().unwrap(), output.to_str().unwrap()]);
        let err = convert(&args, &mut io::sink()).unwrap_err();
        assert!(fatal_message(&err).starts_with("Error: Input CSV file not found:"));
    }

    #[test]
    fn test_quiet_suppresses_banners() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.blf");
        fs::write(
            &input,
            "Timestamp,ArbitrationID,IsExtendedID,IsRemoteFrame,DLC,Data\n\
             1678886400.123,10A,False,False,8,0102AABB\n",
        )
        .unwrap();

        let args = args(&[input.to_str().unwrap(), output.to_str().unwrap(), "-q"]);
        let mut out = Vec::new();
        convert(&args, &mut out).unwrap();
        assert!(out.is_empty());
        assert!(output.exists());
    }
}
