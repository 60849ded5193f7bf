use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use vote_sentinel::catalog::Catalog;
use vote_sentinel::config::{Config, ConfigOverrides};
use vote_sentinel::output::render_json;
use vote_sentinel::output::table::{
    render_categories_table, render_gaps_table, render_history_table, render_ranking_table,
};
use vote_sentinel::ranking::{gaps, rank, ranking_table};
use vote_sentinel::server::run_server;
use vote_sentinel::service::{run, run_notify_loop, run_poll_loop};
use vote_sentinel::store::{HistoryQuery, VoteStore};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "vote-sentinel",
    about = "Fan-contest vote tracker with ranking gaps and push notifications"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    db: Option<String>,
    #[arg(long)]
    catalog: Option<String>,
    #[arg(long = "api-url")]
    api_url: Option<String>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Poll votes and dispatch notifications until interrupted.
    Run {
        #[arg(long)]
        cycles: Option<u64>,
    },
    /// Poll loop only; persists snapshots without notifying.
    Poll {
        #[arg(long)]
        cycles: Option<u64>,
    },
    /// Notification loop only, against whatever the poll loop has stored.
    Notify {
        #[arg(long)]
        cycles: Option<u64>,
    },
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Current leaderboard for one award, or one nominee's gap record.
    Ranking {
        #[arg(long)]
        award: String,
        #[arg(long)]
        nominee: Option<String>,
    },
    History {
        #[arg(long)]
        award: Option<String>,
        #[arg(long)]
        nominee: Option<String>,
        /// RFC 3339 lower bound, e.g. 2026-08-01T00:00:00Z
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    Categories,
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    config.apply_overrides(ConfigOverrides {
        vote_url: cli.api_url.clone(),
        catalog_path: cli.catalog.clone(),
        db_path: cli.db.clone(),
    });

    if matches!(cli.command, Commands::Config { .. }) {
        return handle_config_command(&cli.command, &config, &config_path);
    }

    let catalog = Catalog::load(&config.resolved_catalog_path())?;

    match &cli.command {
        Commands::Run { cycles } => run(config, catalog, *cycles).await?,
        Commands::Poll { cycles } => run_poll_loop(config, catalog, *cycles).await?,
        Commands::Notify { cycles } => run_notify_loop(config, catalog, *cycles).await?,
        Commands::Serve { host, port } => {
            let host = host.clone().unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let bind = format!("{host}:{port}");
            let addr: SocketAddr = bind
                .parse()
                .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
            run_server(config, catalog, addr).await?;
        }
        Commands::Ranking { award, nominee } => {
            if !catalog.awards.contains_key(award) {
                return Err(anyhow!("unknown award: {award}"));
            }
            let store = VoteStore::open(&config.resolved_db_path())?;
            let latest = store.latest_for_award(award)?;
            match nominee {
                Some(nominee_id) => {
                    let ranked = rank(&latest);
                    let record = gaps(&ranked, nominee_id).ok_or_else(|| {
                        anyhow!("no votes recorded for nominee {nominee_id} in award {award}")
                    })?;
                    match cli.output {
                        OutputFormat::Table => println!("{}", render_gaps_table(&record)),
                        OutputFormat::Json => println!("{}", render_json(&record)?),
                    }
                }
                None => {
                    let rows = ranking_table(&catalog, award, &latest);
                    match cli.output {
                        OutputFormat::Table => println!("{}", render_ranking_table(&rows)),
                        OutputFormat::Json => println!("{}", render_json(&rows)?),
                    }
                }
            }
        }
        Commands::History {
            award,
            nominee,
            since,
            limit,
        } => {
            let since = since
                .as_deref()
                .map(|raw| {
                    DateTime::parse_from_rfc3339(raw)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| anyhow!("invalid --since timestamp {raw}: {e}"))
                })
                .transpose()?;
            let store = VoteStore::open(&config.resolved_db_path())?;
            let observations = store.query_history(&HistoryQuery {
                award_id: award.clone(),
                nominee_id: nominee.clone(),
                since,
                limit: *limit,
            })?;
            match cli.output {
                OutputFormat::Table => println!("{}", render_history_table(&observations)),
                OutputFormat::Json => println!("{}", render_json(&observations)?),
            }
        }
        Commands::Categories => match cli.output {
            OutputFormat::Table => println!("{}", render_categories_table(&catalog)),
            OutputFormat::Json => println!("{}", render_json(&catalog)?),
        },
        Commands::Config { .. } => unreachable!("config command handled before dispatch"),
    }

    Ok(())
}

fn handle_config_command(command: &Commands, config: &Config, config_path: &PathBuf) -> Result<()> {
    let Commands::Config { init, show } = command else {
        return Ok(());
    };
    if *init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if *show || !*init {
        println!("{}", render_json(config)?);
    }
    Ok(())
}
