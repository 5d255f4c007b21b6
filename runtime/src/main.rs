use std::path::PathBuf;

use clap::{Parser, Subcommand};
use spot_harvest::cli::{fetch_cmd, fingerprint_cmd, ingest_cmd, output, sessions_cmd, setup};
use spot_harvest::pipeline::Capabilities;

#[derive(Parser)]
#[command(
    name = "spot-harvest",
    author,
    version,
    about = "Harvest geotagged spots from forums, social platforms and tourism sites"
)]
struct Cli {
    /// Path to harvest.toml (defaults to $SPOT_HARVEST_CONFIG or ~/.spot-harvest/harvest.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Spot database (defaults to $SPOT_HARVEST_DB or ~/.spot-harvest/spots.db).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Machine-readable JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, short, global = true)]
    quiet: bool,

    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest already-collected posts from a JSONL file.
    Ingest {
        /// One `{"text", "source_key", "source_url"}` object per line.
        input: PathBuf,
        /// Treat every post as coming from this source.
        #[arg(long)]
        source: Option<String>,
    },
    /// Fetch pages for one source and ingest the spots they mention.
    Fetch {
        /// Source key used for rate limiting, sessions and dedup.
        #[arg(long)]
        source: String,
        urls: Vec<String>,
        /// Read more URLs from a file, one per line.
        #[arg(long)]
        urls_file: Option<PathBuf>,
        /// Send the stored session with every request.
        #[arg(long)]
        authenticated: bool,
        /// Keep one identity for the whole run.
        #[arg(long)]
        long_running: bool,
        #[arg(long, default_value_t = 10)]
        batch_size: usize,
    },
    /// Inspect or clear stored sessions.
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
    /// Print a freshly generated client fingerprint.
    Fingerprint,
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List stored sessions and their remaining lifetime.
    List,
    /// Remove one session, or all of them with --all.
    Clear {
        key: Option<String>,
        #[arg(long, conflicts_with = "key")]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.json {
        std::env::set_var("SPOT_HARVEST_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("SPOT_HARVEST_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("SPOT_HARVEST_VERBOSE", "1");
    }
    setup::init_tracing(cli.log_json, cli.verbose);

    if let Command::Fingerprint = cli.command {
        fingerprint_cmd::run();
        return Ok(());
    }

    let config = setup::load_config(cli.config.as_deref())?;
    if !output::is_quiet() && !output::is_json() {
        output::print_header(&output::Styled::new());
    }

    match cli.command {
        Command::Ingest { input, source } => {
            ingest_cmd::run(&config, &input, source.as_deref(), cli.db).await
        }
        Command::Fetch {
            source,
            urls,
            urls_file,
            authenticated,
            long_running,
            batch_size,
        } => {
            let args = fetch_cmd::FetchArgs {
                source,
                urls,
                urls_file,
                capabilities: Capabilities {
                    authenticated,
                    long_running,
                },
                batch_size,
                db: cli.db,
            };
            fetch_cmd::run(&config, args).await
        }
        Command::Sessions { action } => match action {
            SessionsAction::List => sessions_cmd::list(&config),
            SessionsAction::Clear { key, all } => {
                if key.is_none() && !all {
                    anyhow::bail!("give a session key or --all");
                }
                sessions_cmd::clear(&config, key.as_deref())
            }
        },
        Command::Fingerprint => Ok(()),
    }
}
