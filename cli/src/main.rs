use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::TimeZone;
use clap::{Parser, Subcommand};
use colored::*;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use blog_sync::{
    is_owner, now_ms, AptosRestStore, BlogConfig, MemoryPostStore, PostSynchronizer, SyncError,
    SyncResult, WalletProvider,
};
use blog_types::{
    sample_posts, Account, Post, PostDraft, PostId, PostPatch, RemotePost, WalletSession,
};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// Path to the configuration file
    #[clap(long, env = "BLOG_CONFIG", default_value = "./blog.toml")]
    config: PathBuf,

    /// Log level or filter directive; RUST_LOG takes precedence
    #[clap(long)]
    log_level: Option<String>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration commands
    Config {
        #[clap(subcommand)]
        command: ConfigCommands,
    },

    /// Merge the sample posts with an account's on-chain posts
    Fetch {
        /// Account whose posts are fetched
        #[clap(long)]
        address: String,
    },

    /// Walk through connect, create, edit and delete against an in-memory store
    Demo {
        /// Account the demo wallet connects as
        #[clap(long, default_value = "0xABC")]
        address: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write the default configuration if none exists
    Init,

    /// Print the effective configuration
    Show,
}

/// Wallet that approves every connection request for one account
struct DemoWallet {
    account: Account,
}

#[async_trait]
impl WalletProvider for DemoWallet {
    async fn connect(&self) -> SyncResult<Account> {
        Ok(self.account.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Commands::Config {
            command: ConfigCommands::Init,
        } => BlogConfig::load_or_create(&cli.config)
            .with_context(|| format!("Failed to initialize {}", cli.config.display()))?,
        _ => load_config(&cli.config)?,
    };

    init_tracing(cli.log_level.as_deref().unwrap_or(&config.logging.level))?;
    debug!("Using configuration from {}", cli.config.display());

    match &cli.command {
        Commands::Config { command } => process_config_command(command, &cli.config, &config)?,
        Commands::Fetch { address } => fetch(&config, address).await?,
        Commands::Demo { address } => demo(&config, address).await?,
    }

    Ok(())
}

/// Load the config file, falling back to defaults when it does not exist
fn load_config(path: &Path) -> anyhow::Result<BlogConfig> {
    match BlogConfig::load(path) {
        Ok(config) => Ok(config),
        Err(SyncError::ConfigNotFound(_)) => Ok(BlogConfig::default()),
        Err(e) => Err(e).with_context(|| format!("Failed to load {}", path.display())),
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level: {}", level))?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn process_config_command(
    command: &ConfigCommands,
    path: &Path,
    config: &BlogConfig,
) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Init => {
            println!("{}", "Configuration ready:".green());
            println!("Path: {}", path.display().to_string().yellow());
        }
        ConfigCommands::Show => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

async fn fetch(config: &BlogConfig, address: &str) -> anyhow::Result<()> {
    let account = Account::parse(address)?;
    let store = AptosRestStore::new(config.node.clone())?;
    let sync = PostSynchronizer::new(store, &config.sync);
    sync.initialize(sample_posts(now_ms())).await;

    let session = WalletSession::connected(account);
    let report = sync.reconcile_session(&session).await?;

    println!(
        "{}",
        format!(
            "Fetched {} posts from {}, {} new",
            report.fetched,
            config.node.url,
            report.added.len()
        )
        .green()
    );
    print_posts(&sync.posts().await, &session);
    Ok(())
}

async fn demo(config: &BlogConfig, address: &str) -> anyhow::Result<()> {
    let wallet = DemoWallet {
        account: Account::parse(address)?,
    };

    // One post already on chain for the demo account
    let store = MemoryPostStore::new();
    store.insert(
        wallet.account.address(),
        RemotePost {
            id: Some(PostId::Text("genesis".to_string())),
            title: "Hello from the chain".to_string(),
            content: "Published before this session started.".to_string(),
            tags: vec!["aptos".to_string()],
            timestamp: now_ms(),
            author: address.to_string(),
        },
    );

    let sync = PostSynchronizer::new(store, &config.sync);
    sync.initialize(sample_posts(now_ms())).await;

    let mut session = WalletSession::disconnected();
    step("Sample posts");
    print_posts(&sync.posts().await, &session);

    step("Create while disconnected");
    let draft = PostDraft::new("Notes from the demo", "Written through blog-cli.", "demo, cli")?;
    if let Err(e) = sync.create(&session, &draft).await {
        println!("{}", e.to_string().red());
    }

    step("Connect wallet");
    let report = sync.connect(&wallet, &mut session).await?;
    println!("{} new posts from {}", report.added.len(), wallet.account.address().yellow());
    print_posts(&sync.posts().await, &session);

    step("Create");
    let created = sync.create(&session, &draft).await?;
    println!("Transaction: {}", created.transaction.to_string().yellow());
    print_posts(&sync.posts().await, &session);

    let Some(id) = created.reconcile.added.first().cloned() else {
        anyhow::bail!("the store did not return the created post");
    };

    step("Edit");
    let patch = PostPatch::default().title("Notes from the demo (edited)");
    let outcome = sync.edit(&session, &id, &patch).await?;
    println!("Remote outcome: {:?}", outcome);
    print_posts(&sync.posts().await, &session);

    step("Delete");
    let outcome = sync.delete(&session, &id).await?;
    println!("Remote outcome: {:?}", outcome);
    print_posts(&sync.posts().await, &session);

    println!();
    println!("Remote calls: {}", sync.store().call_count());
    Ok(())
}

fn step(name: &str) {
    println!();
    println!("{}", format!("== {} ==", name).cyan().bold());
}

fn print_posts(posts: &[Post], session: &WalletSession) {
    if posts.is_empty() {
        println!("{}", "No posts found.".yellow());
        return;
    }

    for post in posts {
        let when = chrono::Utc
            .timestamp_millis_opt(post.timestamp)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| post.timestamp.to_string());
        let marker = if is_owner(post, session) {
            " [owner]".green().to_string()
        } else {
            String::new()
        };

        println!(
            "- [{}] {} by {} ({}){}",
            post.id.to_string().yellow(),
            post.title.bold(),
            post.display_name(),
            when,
            marker
        );
        if !post.tags.is_empty() {
            println!("    tags: {}", post.tags.join(", "));
        }
    }
}
