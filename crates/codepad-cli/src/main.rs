use clap::{Parser, Subcommand};
use codepad_runtime::RuntimeAdapter;
use std::path::PathBuf;

mod commands;
mod config;
mod context;

use config::CodepadConfig;
use context::StoreContext;

#[derive(Parser)]
#[command(name = "codepad")]
#[command(about = "Codepad - run, preview and share playground snippets", long_about = None)]
struct Cli {
    /// Config file (defaults to $CODEPAD_CONFIG, then ./codepad.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Languages,

    Run {
        /// Source file, or `-` for stdin
        file: PathBuf,

        #[arg(short, long)]
        lang: Option<String>,

        #[arg(long)]
        json: bool,
    },

    Preview {
        file: PathBuf,

        #[arg(short, long)]
        lang: Option<String>,

        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    Packages,

    Share {
        file: PathBuf,

        #[arg(short, long)]
        lang: Option<String>,

        #[arg(long)]
        function_name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    Show {
        id: String,

        #[arg(long)]
        json: bool,
    },

    Edit {
        id: String,

        file: PathBuf,

        #[arg(short, long)]
        lang: Option<String>,

        #[arg(short, long)]
        watch: bool,
    },

    Restore {
        id: String,

        /// Language whose default snippet is the last resort
        #[arg(short, long, default_value = "javascript")]
        lang: String,
    },

    Reset {
        id: String,

        #[arg(short, long, default_value = "javascript")]
        lang: String,
    },

    Discard {
        id: String,
    },

    Remove {
        id: String,
    },

    Stats {
        #[arg(long)]
        json: bool,
    },

    Entries {
        #[arg(long)]
        json: bool,
    },

    Cleanup {
        #[arg(long)]
        older_than_days: Option<u64>,

        #[arg(long, conflicts_with = "older_than_days")]
        stale: bool,
    },

    Clear {
        #[arg(long)]
        yes: bool,
    },

    Usage,

    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = CodepadConfig::load(cli.config)?;

    if config.runtime.preload_python {
        tokio::spawn(async {
            RuntimeAdapter::python().initialize().await;
        });
    }

    match cli.command {
        Commands::Languages => commands::run::languages(),
        Commands::Run { file, lang, json } => {
            if !commands::run::execute(file, lang, json).await? {
                std::process::exit(1);
            }
        }
        Commands::Preview { file, lang, out } => commands::run::preview(file, lang, out).await?,
        Commands::Packages => commands::run::packages().await?,
        Commands::Version => {
            println!("codepad {}", env!("CARGO_PKG_VERSION"));
        }
        store_command => run_store_command(config, store_command).await?,
    }

    Ok(())
}

async fn run_store_command(config: CodepadConfig, command: Commands) -> anyhow::Result<()> {
    let ctx = StoreContext::open(config).await?;

    let sweep = ctx.start_cleanup();

    match command {
        Commands::Share {
            file,
            lang,
            function_name,
            description,
        } => commands::share::share(&ctx, file, lang, function_name, description).await?,
        Commands::Show { id, json } => commands::share::show(&ctx, id, json).await?,
        Commands::Edit { id, file, lang, watch } => commands::share::edit(&ctx, id, file, lang, watch).await?,
        Commands::Restore { id, lang } => commands::share::restore(&ctx, id, lang).await?,
        Commands::Reset { id, lang } => commands::share::reset(&ctx, id, lang).await?,
        Commands::Discard { id } => commands::share::discard(&ctx, id).await?,
        Commands::Remove { id } => commands::share::remove(&ctx, id).await?,
        Commands::Stats { json } => commands::storage::stats(&ctx, json).await?,
        Commands::Entries { json } => commands::storage::entries(&ctx, json).await?,
        Commands::Cleanup { older_than_days, stale } => {
            commands::storage::cleanup(&ctx, older_than_days, stale).await?
        }
        Commands::Clear { yes } => commands::storage::clear(&ctx, yes).await?,
        Commands::Usage => commands::storage::usage(&ctx).await?,
        Commands::Languages
        | Commands::Run { .. }
        | Commands::Preview { .. }
        | Commands::Packages
        | Commands::Version => unreachable!("handled without opening the store"),
    }

    context::finish_cleanup(sweep).await;

    Ok(())
}
