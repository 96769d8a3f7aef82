//! miniso - minimal installer ISO builder.

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

use miniso::commands;
use miniso::config::Config;

#[derive(Parser)]
#[command(name = "miniso")]
#[command(about = "Builds minimal installer ISOs")]
#[command(
    after_help = "QUICK START:\n  miniso preflight  Check host tools\n  miniso build full.iso minimal.iso --rootfs-url URL --arch x86_64 --version 4.14"
)]
struct Cli {
    /// More logging (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a minimal ISO from a full one
    Build {
        full_iso: PathBuf,
        output: PathBuf,
        /// URL the live system fetches its rootfs from
        #[arg(long)]
        rootfs_url: String,
        /// Target architecture (ppc64le ISOs have no isolinux)
        #[arg(long)]
        arch: String,
        /// Product release, e.g. 4.14
        #[arg(long)]
        version: String,
        /// Scratch directory (default: MINISO_WORK_DIR or system temp)
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },

    /// Extract the ram disk tool from a rootfs image
    ExtractTool {
        rootfs_img: PathBuf,
        #[arg(long, default_value = "nmstatectl")]
        name: String,
        /// Destination (default: ./<name>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Wrap a binary in a reproducible cpio.gz ram disk
    Ramdisk {
        binary: PathBuf,
        output: PathBuf,
        /// Path of the binary inside the ram disk
        #[arg(long, default_value = "/usr/bin/nmstatectl")]
        path: String,
    },

    /// Patch the boot configs of an unpacked ISO tree in place
    Patch {
        tree: PathBuf,
        #[arg(long)]
        rootfs_url: String,
        /// Reference images/nmstate.img even if the tree lacks it
        #[arg(long)]
        with_ramdisk: bool,
        #[arg(long, default_value = "x86_64")]
        arch: String,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },

    /// Check host tools and the work directory
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config {
        #[arg(long)]
        json: bool,
    },
    /// List the entries of a ram disk image
    Ramdisk { file: PathBuf },
    /// Print the volume id of an ISO
    VolumeId { iso: PathBuf },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Load .env if present
    dotenvy::dotenv().ok();
    let base_dir = std::env::current_dir()?;
    let config = Config::load(&base_dir)?;

    match cli.command {
        Commands::Build {
            full_iso,
            output,
            rootfs_url,
            arch,
            version,
            work_dir,
        } => {
            commands::cmd_build(
                commands::build::BuildArgs {
                    full_iso,
                    output,
                    rootfs_url,
                    arch,
                    version,
                    work_dir,
                },
                &config,
            )?;
        }

        Commands::ExtractTool {
            rootfs_img,
            name,
            output,
        } => {
            commands::cmd_extract_tool(&rootfs_img, &name, output, &config)?;
        }

        Commands::Ramdisk {
            binary,
            output,
            path,
        } => {
            commands::cmd_ramdisk(&binary, &output, &path)?;
        }

        Commands::Patch {
            tree,
            rootfs_url,
            with_ramdisk,
            arch,
        } => {
            commands::cmd_patch(
                commands::patch::PatchArgs {
                    tree: &tree,
                    rootfs_url: &rootfs_url,
                    with_ram_disk: with_ramdisk,
                    arch: &arch,
                },
                &config,
            )?;
        }

        Commands::Show { what } => {
            let target = match what {
                ShowTarget::Config { json } => commands::show::ShowTarget::Config { json },
                ShowTarget::Ramdisk { file } => commands::show::ShowTarget::RamDisk(file),
                ShowTarget::VolumeId { iso } => commands::show::ShowTarget::VolumeId(iso),
            };
            commands::cmd_show(target, &config)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }
    }

    Ok(())
}
