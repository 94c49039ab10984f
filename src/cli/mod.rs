//! wiiarc CLI - list, extract and test U8 / GFArch archives

pub mod extract;
pub mod list;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "wiiarc")]
#[command(about = "GameCube/Wii U8 (ARC) and GFArch archive tool", long_about = None)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress progress bar
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List archive contents
    List {
        /// Archive file
        archive: PathBuf,
    },

    /// Extract files to a directory
    Extract {
        /// Archive file
        archive: PathBuf,

        /// Output directory (defaults to the archive name without extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Replace files that already exist
        #[arg(long)]
        overwrite: bool,

        /// Item indices to extract (all when omitted)
        items: Vec<usize>,
    },

    /// Decode files without writing them
    Test {
        /// Archive file
        archive: PathBuf,

        /// Item indices to test (all when omitted)
        items: Vec<usize>,
    },
}

/// Run the wiiarc CLI
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::List { archive } => list::execute(&archive),
        Commands::Extract {
            archive,
            output,
            overwrite,
            items,
        } => {
            let output = output.unwrap_or_else(|| default_output(&archive));
            extract::execute(&archive, Some(&output), overwrite, &items, cli.quiet)
        }
        Commands::Test { archive, items } => {
            extract::execute(&archive, None, false, &items, cli.quiet)
        }
    }
}

fn default_output(archive: &std::path::Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("out"));
    match archive.parent() {
        Some(dir) => dir.join(stem),
        None => stem,
    }
}
