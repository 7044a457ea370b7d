//! PDF Stream Patch CLI tool
//!
//! A command-line tool for replacing text inside the compressed streams of a
//! PDF without changing the file's length.
//!
//! Exit status: 0 when the file was patched, 1 when the text was not found
//! (or the run failed), 2 when a patched stream could not keep its size.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use pdf_stream_patch::pdf::{replace_in_pdf, ReplaceOptions};

/// PDF Stream Patch - Replace text in compressed PDF streams in place
#[derive(Parser)]
#[command(name = "pdf-stream-patch")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Replace a word in the page content
    pdf-stream-patch invoice.pdf \"2023\" \"2024\"

    # Check whether a replacement would fit without touching the file
    pdf-stream-patch --dry-run contract.pdf \"Draft\" \"Final\"

    # Replace raw bytes given as hex
    pdf-stream-patch --hex form.pdf 48656c6c6f 4a656c6c6f")]
struct Cli {
    /// PDF file to patch in place
    file: PathBuf,

    /// Text to find (first occurrence in each compressed stream)
    old: String,

    /// Replacement text
    new: String,

    /// Interpret OLD and NEW as hexadecimal byte strings
    #[arg(long)]
    hex: bool,

    /// Report what would be patched without writing the file
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging (otherwise controlled by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            process::exit(1);
        }
    };

    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<pdf_stream_patch::Error>()
            .map_or(1, pdf_stream_patch::Error::exit_code);
        process::exit(code);
    }
}

/// Install the stderr log subscriber
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Decode a command-line pattern into bytes
fn pattern_bytes(arg: &str, hex: bool) -> Result<Vec<u8>> {
    if hex {
        hex::decode(arg).with_context(|| format!("Invalid hex pattern: {}", arg))
    } else {
        Ok(arg.as_bytes().to_vec())
    }
}

/// Patch the file and print a summary
fn run(cli: Cli) -> Result<()> {
    let options = ReplaceOptions {
        old: pattern_bytes(&cli.old, cli.hex)?,
        new: pattern_bytes(&cli.new, cli.hex)?,
        path: cli.file,
        dry_run: cli.dry_run,
    };

    let report = replace_in_pdf(&options)?;

    if report.written {
        eprintln!(
            "Patched {} of {} compressed streams in {}",
            report.patched.len(),
            report.streams_scanned,
            options.path.display()
        );
    } else {
        eprintln!(
            "Would patch {} of {} compressed streams in {} (dry run)",
            report.patched.len(),
            report.streams_scanned,
            options.path.display()
        );
    }

    Ok(())
}
