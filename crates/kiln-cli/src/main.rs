//! Kiln command-line tool
//!
//! Resolves types and instances from a directory of JSON modules:
//! printing resolved types, picking the best-ranked instance of a type,
//! listing registrations and checking configuration files.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use output::ColorMode;

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Resolve kiln types and instances", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./kiln.toml or ./kiln.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Module root, overriding the configuration
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Load modules asynchronously before resolving
    #[arg(long = "async", global = true)]
    use_async: bool,

    /// Debug logging (KILN_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// When to color output
    #[arg(long, global = true, value_enum, default_value_t = ColorMode::Auto)]
    color: ColorMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a type reference and print it
    Resolve {
        /// Type id or JSON type reference
        reference: String,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the best-ranked instance of a type
    Instance {
        /// Type id or JSON type reference
        type_ref: String,
        /// Fail when no instance is available
        #[arg(long)]
        required: bool,
    },

    /// List registered instances of a type, best first
    Instances {
        /// Type id or JSON type reference
        type_ref: String,
    },

    /// Validate a configuration file
    CheckConfig {
        /// File to check (defaults to the discovered configuration)
        path: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    kiln_runtime::logging::init(cli.verbose);

    let mut out = output::StyledOutput::new(cli.color);
    let ctx = commands::Context {
        config: cli.config,
        root: cli.root,
        use_async: cli.use_async,
    };

    match cli.command {
        Commands::Resolve { reference, json } => {
            commands::resolve::execute(&ctx, &mut out, &reference, json)
        }
        Commands::Instance { type_ref, required } => {
            commands::instance::execute(&ctx, &mut out, &type_ref, required)
        }
        Commands::Instances { type_ref } => commands::instances::execute(&ctx, &mut out, &type_ref),
        Commands::CheckConfig { path } => {
            commands::check_config::execute(&ctx, &mut out, path.as_deref())
        }
    }
}
