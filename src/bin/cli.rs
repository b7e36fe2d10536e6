//! trawl CLI
//!
//! Every command talks to an already-running browser over its DevTools
//! endpoint. Start the browser yourself, log in, open the feed, then run.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use trawl::{
    cdp::CdpClient,
    error::{AppError, Result},
    export::{self, FeedArchive},
    harvest,
    models::{presets, Config, Template},
};

/// trawl - incremental harvester for virtualized feeds
#[derive(Parser, Debug)]
#[command(
    name = "trawl",
    version,
    about = "Harvest unbounded feeds through an attached browser"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "trawl.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List debuggable pages open in the attached browser
    Pages,

    /// Harvest the feed matching a template or preset
    Harvest {
        /// Path to a template TOML file
        #[arg(long, conflicts_with = "preset")]
        template: Option<PathBuf>,

        /// Built-in preset name (see `presets`)
        #[arg(long)]
        preset: Option<String>,

        /// Narrow a preset's URL pattern to one user or handle
        #[arg(long, requires = "preset")]
        user: Option<String>,
    },

    /// Load and validate a template file
    Validate {
        /// Path to the template TOML file
        template: PathBuf,
    },

    /// List built-in presets
    Presets,

    /// Write a starter template file to edit
    Init {
        /// Output path
        #[arg(default_value = "template.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    config.validate()?;

    let result = run(cli.command, &config).await;
    match &result {
        Err(AppError::Connectivity { endpoint, .. }) => {
            log::error!("could not reach the browser at {endpoint}");
            log::error!(
                "start it with: chrome --remote-debugging-port={} \
                 --remote-allow-origins='*' --user-data-dir=/tmp/trawl-profile",
                config.chrome.port
            );
            log::error!("then log in, open the feed, and run trawl again");
        }
        Err(AppError::PageNotFound { pattern }) => {
            log::error!("no open page matches '{pattern}'");
            log::error!("open the feed in the attached browser, then retry (see `trawl pages`)");
        }
        _ => {}
    }
    result
}

async fn run(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Pages => {
            let client = CdpClient::connect(&config.chrome).await?;
            let version = client.version().await?;
            log::info!(
                "attached to {} (protocol {})",
                version.browser,
                version.protocol_version
            );

            let pages = client.pages().await?;
            let mut shown = 0;
            for page in pages.iter().filter(|p| p.is_page()) {
                log::info!("[{}] {} - {}", page.id, page.title, page.url);
                shown += 1;
            }
            if shown == 0 {
                log::warn!("no pages open; open the feed in the browser first");
            }
        }

        Command::Harvest {
            template,
            preset,
            user,
        } => {
            let template = resolve_template(template, preset, user.as_deref())?;
            template.validate()?;

            let outcome = harvest::harvest_feed(config, template.clone()).await?;
            if outcome.expansion_aborted {
                log::warn!("expansion was disabled mid-run; some items may be truncated");
            }

            let archive = FeedArchive::new(&template, outcome);
            let written = export::write_archive(&archive, &template, &config.output).await?;
            for path in &written {
                log::info!("-> {}", path.display());
            }
        }

        Command::Validate { template } => {
            let template = Template::load(&template)?;
            template.validate()?;
            log::info!(
                "template '{}' is valid: {} field(s), identity '{}', {} expansion selector(s)",
                template.name,
                template.fields.len(),
                template.identity_field,
                template.expand_selectors.len()
            );
        }

        Command::Presets => {
            for name in presets::NAMES {
                let Some(template) = presets::by_name(name, None) else {
                    continue;
                };
                log::info!(
                    "{name}: matches /{}/, {} field(s), identity '{}'",
                    template.url_pattern,
                    template.fields.len(),
                    template.identity_field
                );
            }
        }

        Command::Init { path, force } => {
            if path.exists() && !force {
                log::warn!(
                    "{} already exists. Use --force to overwrite.",
                    path.display()
                );
                return Ok(());
            }

            let body = toml::to_string_pretty(&presets::twitter(None))?;
            let content = format!(
                "# trawl template\n\
                 # Point url_pattern at the feed's page URL and adjust the\n\
                 # selectors for its markup. Validate with: trawl validate <file>\n\n{body}"
            );
            std::fs::write(&path, content)?;
            log::info!("starter template written to {}", path.display());
        }
    }

    Ok(())
}

fn resolve_template(
    path: Option<PathBuf>,
    preset: Option<String>,
    user: Option<&str>,
) -> Result<Template> {
    match (path, preset) {
        (Some(path), _) => Template::load(path),
        (None, Some(name)) => presets::by_name(&name, user).ok_or_else(|| {
            AppError::config(format!("unknown preset '{name}' (run `trawl presets`)"))
        }),
        (None, None) => Err(AppError::config(
            "pass --template <file> or --preset <name>",
        )),
    }
}
