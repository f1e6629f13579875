use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use widepatch::catalog;
use widepatch::geometry::Scaling;
use widepatch::orchestrator::{self, PatchStatus};
use widepatch::safety::FileState;

#[derive(Parser)]
#[command(
    name = "widepatch",
    about = "Patch game engine binaries and UI layout files for a custom viewport resolution"
)]
struct Cli {
    /// Path to the game directory
    #[arg(long, global = true, default_value = ".")]
    game_dir: PathBuf,
    /// Verbosity level (none: warnings, '-v': info, '-vv': debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Patch the game files for the given display resolution
    Patch {
        /// Display resolution width
        width: u32,
        /// Display resolution height
        height: u32,
        /// Scaling mode (default: picked from the aspect ratio)
        #[arg(long, value_enum)]
        scaling: Option<ScalingArg>,
        /// Discard stale backups and repatch from the current files
        /// (to be used after a game update)
        #[arg(short, long)]
        force: bool,
    },
    /// Restore the game files from backed up originals
    Restore,
    /// Report whether the game files are currently patched
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScalingArg {
    FillWidth,
    FillHeight,
    Pixel,
}

impl From<ScalingArg> for Scaling {
    fn from(arg: ScalingArg) -> Self {
        match arg {
            ScalingArg::FillWidth => Scaling::FillWidth,
            ScalingArg::FillHeight => Scaling::FillHeight,
            ScalingArg::Pixel => Scaling::Pixel,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new().filter_level(level).init();

    match cli.command {
        Commands::Patch {
            width,
            height,
            scaling,
            force,
        } => {
            let scaling = scaling
                .map(Scaling::from)
                .unwrap_or_else(|| Scaling::autodetect(width, height));
            let report = orchestrator::patch(
                &cli.game_dir,
                catalog::default(),
                width,
                height,
                scaling,
                force,
            )?;

            println!("Patched successfully!");
            println!("  Viewport: {} ({} scaling)", report.viewport, scaling);
            println!("  Engine binaries patched: {}", report.engines_patched.len());
            println!("  Documents patched: {}", report.documents_patched.len());
            if !report.warnings.is_empty() {
                println!("  Warnings:");
                for warning in &report.warnings {
                    println!("    {warning}");
                }
            }
        }
        Commands::Restore => {
            let restored = orchestrator::restore(&cli.game_dir)?;
            if restored == 0 {
                println!("Nothing to restore.");
            } else {
                println!("Restored {restored} files from backups.");
            }
        }
        Commands::Status => {
            let report = orchestrator::status(&cli.game_dir, catalog::default())?;
            for file in &report.files {
                let state = match file.state {
                    FileState::Pristine => "pristine",
                    FileState::SafeToRepatch => "patched",
                    FileState::Drifted => "drifted",
                };
                println!("  {}: {}", file.path.display(), state);
            }
            match report.overall {
                PatchStatus::NotPatched => println!("The game is not patched."),
                PatchStatus::Patched => println!("The game looks correctly patched."),
                PatchStatus::Modified => println!(
                    "The game was patched, but files were modified since. Was the game updated?"
                ),
            }
        }
    }

    Ok(())
}
