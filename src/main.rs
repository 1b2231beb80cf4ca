use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use inbox_index::{
    GitRepository, IndexJob, Indexer, IndexerConfig, MessageStore, ThreadService, init_logger,
};

#[derive(Parser, Debug)]
#[command(
    name = "inbox-index",
    about = "Index and thread a mailing-list archive stored one message per commit"
)]
struct Args {
    /// SQLite database file (defaults to `EMAIL_DB_PATH`).
    #[arg(long)]
    db: Option<PathBuf>,

    /// Archive git repository (defaults to `GIT_REPO_PATH`).
    #[arg(long)]
    git_repo: Option<PathBuf>,

    /// Branch to walk (defaults to `INDEX_BRANCH`).
    #[arg(long)]
    branch: Option<String>,

    /// Fetch the archive remote before indexing.
    #[arg(long)]
    fetch: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one incremental indexing pass.
    Index,
    /// Index periodically until interrupted.
    Watch {
        /// Seconds between passes (defaults to `INDEX_INTERVAL_SECS`).
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Print the thread containing a message as JSON.
    Thread {
        message_id: String,
    },
    /// Print matching threads as JSON.
    Search {
        query: Option<String>,
    },
}

impl Args {
    fn config(&self) -> IndexerConfig {
        let mut config = IndexerConfig::from_env();
        if let Some(db) = &self.db {
            config.db_path = db.clone();
        }
        if let Some(repo) = &self.git_repo {
            config.repo_path = repo.clone();
        }
        if let Some(branch) = &self.branch {
            config.branch = branch.clone();
        }
        if self.fetch {
            config.fetch_remote = true;
        }
        if let Command::Watch {
            interval: Some(secs),
        } = &self.command
        {
            config.interval = std::time::Duration::from_secs(*secs);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();

    let args = Args::parse();
    let config = args.config();

    let store = MessageStore::open(&config.db_path).await?;
    let repository = Arc::new(GitRepository::open(&config.repo_path)?.with_remote(config.remote.clone()));

    match args.command {
        Command::Index => {
            let indexer = Indexer::from_config(&config, store, repository);
            let stats = indexer.run().await?;
            writeln!(io::stdout(), "{}", serde_json::to_string_pretty(&stats)?)?;
        }
        Command::Watch { .. } => {
            let indexer = Arc::new(Indexer::from_config(&config, store, repository));
            let handle = IndexJob::spawn(indexer, config.interval);

            tokio::signal::ctrl_c().await?;
            log::info!("interrupt received, stopping index job");
            let state = handle.stop().await;
            writeln!(io::stdout(), "{}", serde_json::to_string_pretty(&state)?)?;
        }
        Command::Thread { message_id } => {
            let service = ThreadService::new(store, repository);
            match service.find_thread(&message_id).await? {
                Some(thread) => {
                    writeln!(io::stdout(), "{}", serde_json::to_string_pretty(&thread)?)?;
                }
                None => {
                    writeln!(io::stderr(), "error: no thread contains '{message_id}'")?;
                    std::process::exit(1);
                }
            }
        }
        Command::Search { query } => {
            let service = ThreadService::new(store, repository);
            let threads = service.search(query.as_deref()).await?;
            writeln!(io::stdout(), "{}", serde_json::to_string_pretty(&threads)?)?;
        }
    }

    Ok(())
}
