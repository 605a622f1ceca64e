#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use fnpack_core::{Config, PresetKind};
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fnpack")]
#[command(author, version, about = "Package server-rendered apps into serverless functions", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Bundle every server bundle and package it for the configured preset
    Build {
        /// Deployment preset (overrides fnpack.json)
        #[arg(long, value_parser = parse_preset)]
        preset: Option<PresetKind>,

        /// Build manifest JSON describing routes and server bundles
        #[arg(long, value_name = "FILE")]
        manifest: Option<PathBuf>,

        /// Node.js major version of the target runtime
        #[arg(long, value_name = "MAJOR")]
        node_version: Option<u8>,

        /// Function region (vercel); repeat for several
        #[arg(long = "region", value_name = "REGION")]
        regions: Vec<String>,
    },

    /// Show which URL prefixes each server bundle serves
    Routes {
        /// Build manifest JSON describing routes and server bundles
        #[arg(long, value_name = "FILE")]
        manifest: Option<PathBuf>,
    },

    /// Package one bundled server file and its runtime dependencies
    Pack {
        /// Bundled server entry
        bundle: PathBuf,

        /// Destination directory
        #[arg(long, short = 'o', value_name = "DIR")]
        out: PathBuf,

        /// Trace base (defaults to the workspace root)
        #[arg(long, value_name = "DIR")]
        base: Option<PathBuf>,

        /// File next to the entry that must not be shipped; repeatable
        #[arg(long = "exclude-sibling", value_name = "NAME")]
        exclude_siblings: Vec<String>,
    },

    /// Serve public files and proxy app requests to a running dev server
    Dev {
        /// Application server to forward app requests to
        #[arg(long, env = "FNPACK_UPSTREAM", value_name = "URL")]
        upstream: String,

        /// Port to listen on
        #[arg(long, short = 'p', default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "localhost")]
        host: String,

        /// Extra exclusion (glob, or `re:<regex>`); repeatable
        #[arg(long = "exclude", value_name = "PATTERN")]
        exclude: Vec<String>,
    },
}

fn parse_preset(s: &str) -> Result<PresetKind, String> {
    PresetKind::parse(s).ok_or_else(|| format!("unknown preset `{s}` (expected node, vercel or netlify)"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Build {
            preset,
            manifest,
            node_version,
            regions,
        }) => commands::build::run(
            commands::build::BuildAction {
                cwd,
                preset,
                manifest,
                node_version,
                regions,
            },
            cli.json,
        ),
        Some(Commands::Routes { manifest }) => commands::routes::run(&cwd, manifest, cli.json),
        Some(Commands::Pack {
            bundle,
            out,
            base,
            exclude_siblings,
        }) => commands::pack::run(
            commands::pack::PackAction {
                cwd,
                bundle,
                out,
                base,
                exclude_siblings,
            },
            cli.json,
        ),
        Some(Commands::Dev {
            upstream,
            port,
            host,
            exclude,
        }) => {
            let action = commands::dev::DevAction {
                cwd,
                upstream,
                port,
                host,
                exclude,
            };
            let rt = tokio::runtime::Runtime::new().map_err(|e| miette::miette!("{e}"))?;
            rt.block_on(commands::dev::run(action))
        }
    }
}
