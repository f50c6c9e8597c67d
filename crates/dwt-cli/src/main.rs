//! dwt - wavelet preprocessing memory manager driver
//!
//! Drives the staging buffer and device image lifecycle against the emulated
//! device with synthetic frames.

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "dwt")]
#[command(author, version, about = "Wavelet preprocessing memory manager driver")]
#[command(long_about = "
Provisions host staging memory and device images for a wavelet pipeline,
refreshes them with synthetic frames and reports what the device sees.

Examples:
  dwt run -W 512 -H 512                       # gray f32 frame
  dwt run -W 640 -H 480 -c 3 -e i16 -f 4      # RGB, 16-bit device images, 4 frames
  dwt run -W 64 -H 64 --resize 128x128        # provision, then re-provision
  dwt run -W 8 -H 8 --dump staging.raw        # write the final staging image
  dwt -vv info                                # device and memory configuration
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (repeat for more)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Number of threads (0 = auto)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision and refresh device images with synthetic frames
    #[command(visible_alias = "r")]
    Run(RunArgs),

    /// Show device and memory configuration
    #[command(visible_alias = "i")]
    Info,
}

#[derive(Args)]
struct RunArgs {
    /// Frame width
    #[arg(short = 'W', long)]
    width: usize,

    /// Frame height
    #[arg(short = 'H', long)]
    height: usize,

    /// Planar components: 1 (gray) or 3 (RGB)
    #[arg(short, long, default_value = "1")]
    channels: usize,

    /// Device element type: f32, i16, f16
    #[arg(short, long, default_value = "f32")]
    element: String,

    /// Host sample type: f32, u16, i16, f16
    #[arg(short, long, default_value = "f32")]
    sample: String,

    /// Frames to push at each size
    #[arg(short, long, default_value = "1")]
    frames: usize,

    /// Further sizes to switch to, in order (WxH)
    #[arg(long, value_parser = commands::parse_size)]
    resize: Vec<(usize, usize)>,

    /// Write the last staging image (packed rows) to this file
    #[arg(long)]
    dump: Option<PathBuf>,
}

/// Install the fmt subscriber. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Configure thread pool
    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    match cli.command {
        Commands::Run(args) => commands::run::run(args, cli.verbose > 0),
        Commands::Info => commands::info::run(cli.verbose > 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "dwt", "-vv", "run", "-W", "64", "-H", "32", "-c", "3", "-e", "i16", "--resize",
            "128x64", "--resize", "16x16",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!((args.width, args.height), (64, 32));
        assert_eq!(args.channels, 3);
        assert_eq!(args.element, "i16");
        assert_eq!(args.sample, "f32");
        assert_eq!(args.frames, 1);
        assert_eq!(args.resize, vec![(128, 64), (16, 16)]);
        assert!(args.dump.is_none());
    }

    #[test]
    fn test_parse_rejects_bad_resize() {
        assert!(Cli::try_parse_from(["dwt", "run", "-W", "4", "-H", "4", "--resize", "4by4"]).is_err());
    }

    #[test]
    fn test_parse_info() {
        let cli = Cli::try_parse_from(["dwt", "info", "-j", "2"]).unwrap();
        assert!(matches!(cli.command, Commands::Info));
        assert_eq!(cli.threads, 2);
    }
}
