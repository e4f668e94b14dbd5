use std::{fs, path::PathBuf};

use build::build_package;
use clap::Parser;
use cli::{Args, Commands, DepCommand, XpkgCommand};
use dep::{add_dependency, clean_cache, list_versions};
use error::{UpError, UpResult};
use logging::setup_logging;
use push::push_package;
use state::AppState;
use tracing::{info, warn};
use up_config::config::{default_config_path, generate_default_config, Config};
use up_oci::http_client::configure_http_client;
use utils::{absolute_path, set_flag, COLOR, JSON, PROGRESS};

mod build;
mod cli;
mod dep;
mod error;
mod logging;
mod progress;
mod push;
mod state;
mod utils;

fn config_path(args: &Args) -> UpResult<PathBuf> {
    match args.config.as_deref() {
        Some(path) => absolute_path(path),
        None => Ok(default_config_path()),
    }
}

fn print_config(state: &AppState) -> UpResult<()> {
    let content = match fs::read_to_string(&state.config_path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!("Config file {} not found", state.config_path.display());
            toml::to_string_pretty(&state.config)?
        }
        Err(err) => {
            return Err(UpError::IoError {
                action: format!("reading config {}", state.config_path.display()),
                source: err,
            })
        }
    };
    info!("{}", content.trim_end());
    info!("# effective cache directory: {}", state.cache_dir.display());
    Ok(())
}

fn run(args: Args) -> UpResult<()> {
    let path = config_path(&args)?;

    if let Commands::DefConfig = args.command {
        generate_default_config(&path)?;
        return Ok(());
    }

    let config = Config::load(&path)?;
    let state = AppState::new(&args, config, path)?;

    let timeout = state.timeout;
    configure_http_client(|config| config.timeout = Some(timeout));

    match args.command {
        Commands::Config => print_config(&state)?,
        Commands::DefConfig => unreachable!(),
        Commands::Xpkg {
            command,
        } => {
            match command {
                XpkgCommand::Build {
                    package_root,
                    examples_root,
                    ignore,
                    output,
                } => {
                    build_package(
                        &package_root,
                        examples_root.as_deref(),
                        &ignore,
                        output.as_deref(),
                    )?;
                }
                XpkgCommand::Push {
                    tag,
                    package,
                } => push_package(&state, &tag, package.as_deref())?,
                XpkgCommand::Dep {
                    clean_cache: clean,
                    command,
                } => {
                    if clean {
                        clean_cache(&state)?;
                    }
                    match command {
                        Some(DepCommand::Add {
                            package,
                            package_type,
                            package_root,
                        }) => add_dependency(&state, &package, package_type, &package_root)?,
                        Some(DepCommand::List {
                            package,
                        }) => list_versions(&state, &package)?,
                        None => {}
                    }
                }
            }
        }
    }

    progress::stop();
    Ok(())
}

async fn handle_cli() -> UpResult<()> {
    let args = Args::parse();

    setup_logging(&args);
    set_flag(&COLOR, !args.no_color);
    set_flag(&JSON, args.json);
    set_flag(&PROGRESS, !args.quiet && !args.json);

    tokio::task::spawn_blocking(move || run(args)).await?
}

#[tokio::main]
async fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli().await {
        progress::stop();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}
