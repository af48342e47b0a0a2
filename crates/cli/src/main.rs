mod cmd;
mod output;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use flakes_lib::settings::Settings;

use crate::output::{format_error_chain, print_error};

/// flake - validate, inspect and archive flakes
#[derive(Parser)]
#[command(name = "flake")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log verbosity (-v info, -vv debug)
  #[arg(short, long, global = true, action = ArgAction::Count)]
  verbose: u8,

  /// Store directory
  #[arg(long, global = true, value_name = "DIR")]
  store: Option<PathBuf>,

  /// System to evaluate outputs for
  #[arg(long, global = true, value_name = "SYSTEM")]
  system: Option<String>,

  /// Resolve the flake reference FROM to TO, ahead of every registry
  #[arg(
    long = "override-flake",
    global = true,
    num_args = 2,
    value_names = ["FROM", "TO"],
    action = ArgAction::Append
  )]
  override_flake: Vec<String>,

  /// Do not look up indirect references in registries
  #[arg(long, global = true)]
  no_registries: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Check the structure of a flake's outputs and build its checks
  Check {
    #[arg(default_value = ".")]
    flake: String,

    /// Only evaluate, do not build anything
    #[arg(long)]
    no_build: bool,
  },

  /// Show the outputs of a flake
  Show {
    #[arg(default_value = ".")]
    flake: String,

    /// Show the contents of legacyPackages
    #[arg(long)]
    legacy: bool,

    /// Evaluate every output afresh
    #[arg(long)]
    no_eval_cache: bool,

    #[arg(long)]
    json: bool,
  },

  /// Show the locked inputs of a flake
  ListInputs {
    #[arg(default_value = ".")]
    flake: String,

    #[arg(long)]
    json: bool,
  },

  /// Show metadata about a flake
  Info {
    #[arg(default_value = ".")]
    flake: String,

    #[arg(long)]
    json: bool,
  },

  /// Copy a flake and all of its inputs to a store
  Archive {
    #[arg(default_value = ".")]
    flake: String,

    /// Destination store URI
    #[arg(long, value_name = "STORE_URI")]
    to: Option<String>,

    #[arg(long)]
    json: bool,

    /// Compute store paths without fetching or copying
    #[arg(long)]
    dry_run: bool,
  },

  /// Re-lock every input of a flake and write the lock file
  Update {
    #[arg(default_value = ".")]
    flake: String,
  },

  /// Add or replace a user registry entry
  Add { from: String, to: String },

  /// Remove a user registry entry
  Remove { url: String },

  /// Pin a flake reference to its current version in the user registry
  Pin { url: String },

  /// List the available flakes of every registry
  List,

  /// Create a flake in the current directory
  Init {
    /// Directory to create the flake in
    #[arg(long, value_name = "DIR", default_value = ".")]
    dir: PathBuf,
  },

  /// Clone a flake's source
  Clone {
    #[arg(default_value = ".")]
    flake: String,

    /// Directory to clone into
    #[arg(long, value_name = "PATH")]
    dest: Option<PathBuf>,
  },
}

fn init_tracing(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .without_time()
    .with_ansi(std::io::stderr().is_terminal())
    .with_writer(std::io::stderr)
    .init();
}

fn settings(cli: &Cli) -> Settings {
  let mut settings = Settings::from_env();
  if let Some(store) = &cli.store {
    settings.store_dir = store.clone();
  }
  if let Some(system) = &cli.system {
    settings.system = system.clone();
  }
  settings.use_registries = !cli.no_registries;
  settings.flake_overrides = cli
    .override_flake
    .chunks_exact(2)
    .map(|pair| (pair[0].clone(), pair[1].clone()))
    .collect();
  settings
}

fn run(cli: Cli) -> Result<()> {
  let settings = settings(&cli);

  match cli.command {
    Commands::Check { flake, no_build } => cmd::cmd_check(&settings, &flake, !no_build),
    Commands::Show {
      flake,
      legacy,
      no_eval_cache,
      json,
    } => cmd::cmd_show(&settings, &flake, legacy, !no_eval_cache, json),
    Commands::ListInputs { flake, json } => cmd::cmd_list_inputs(&settings, &flake, json),
    Commands::Info { flake, json } => cmd::cmd_info(&settings, &flake, json),
    Commands::Archive {
      flake,
      to,
      json,
      dry_run,
    } => cmd::cmd_archive(&settings, &flake, to, json, dry_run),
    Commands::Update { flake } => cmd::cmd_update(&settings, &flake),
    Commands::Add { from, to } => cmd::cmd_add(&settings, &from, &to),
    Commands::Remove { url } => cmd::cmd_remove(&settings, &url),
    Commands::Pin { url } => cmd::cmd_pin(&settings, &url),
    Commands::List => cmd::cmd_list(&settings),
    Commands::Init { dir } => cmd::cmd_init(&settings, &dir),
    Commands::Clone { flake, dest } => {
      let Some(dest) = dest else {
        Cli::command()
          .error(ErrorKind::MissingRequiredArgument, "missing flag '--dest'")
          .exit();
      };
      cmd::cmd_clone(&settings, &flake, &dest)
    }
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format_error_chain(&err));
      ExitCode::FAILURE
    }
  }
}
