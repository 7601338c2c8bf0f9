use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pixiv_feed::auth::{run_interactive, TokenEndpoint};
use pixiv_feed::config::Config;
use pixiv_feed::feed::FeedFormat;
use pixiv_feed::pixiv::AppApiClient;
use pixiv_feed::service::{FeedService, ServiceSettings, UserFeedRequest};
use pixiv_feed::session::SessionClient;
use pixiv_feed::storage::{FileTokenStore, TokenStore, TokenStoreError};

/// Get the config directory path (~/.config/pixiv-feed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("pixiv-feed"))
}

/// Get the cache directory path (~/.cache/pixiv-feed/), home of the token cache
fn get_cache_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".cache").join("pixiv-feed"))
}

#[derive(Parser, Debug)]
#[command(name = "pixiv-feed", about = "Serve pixiv user and follow timelines as RSS/Atom feeds")]
struct Args {
    /// Config file (default: ~/.config/pixiv-feed/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in through the browser and write the token cache
    Login {
        /// Only print the login URL, do not open a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Run the feed HTTP server
    Serve {
        /// Interface to bind (default from config: localhost)
        #[arg(long)]
        host: Option<String>,

        /// Port to serve feeds on (default from config: 5000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print one feed to stdout
    Generate {
        /// Generate an RSS feed (default)
        #[arg(long, conflicts_with = "atom")]
        rss: bool,

        /// Generate an Atom feed
        #[arg(long)]
        atom: bool,

        /// Page language, e.g. "en"
        #[arg(short, long)]
        lang: Option<String>,

        /// User id (required for the illust feed)
        #[arg(long)]
        id: Option<String>,

        /// Name shown in the feed title instead of the user's own
        #[arg(long)]
        name: Option<String>,

        #[arg(value_enum)]
        feed: FeedKind,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FeedKind {
    /// Works of one user
    Illust,
    /// Works of the users the account follows
    #[value(name = "new_illust")]
    NewIllust,
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")
}

fn build_service(config: &Config, store: Arc<dyn TokenStore>) -> Result<FeedService<AppApiClient>> {
    let api = AppApiClient::new(http_client()?).with_timeout(config.request_timeout());
    let settings = ServiceSettings {
        image_proxy_host: config.image_proxy_host.clone(),
    };
    Ok(FeedService::new(SessionClient::new(api, store), settings))
}

async fn login(config: &Config, store: &FileTokenStore, launch_browser: bool) -> Result<()> {
    let endpoint = TokenEndpoint::new(http_client()?).with_timeout(config.request_timeout());

    let stdin = std::io::stdin();
    let pair = run_interactive(&endpoint, stdin.lock(), std::io::stdout(), launch_browser)
        .await
        .context("Login failed")?;

    store.save(&pair).with_context(|| {
        format!(
            "Failed to write token cache '{}': check directory permissions",
            store.path().display()
        )
    })?;
    println!("Token cache written to {}", store.path().display());
    Ok(())
}

fn warn_if_logged_out(store: &FileTokenStore) {
    match store.load() {
        Ok(_) => {}
        Err(TokenStoreError::NotFound) => tracing::warn!(
            path = %store.path().display(),
            "No token cache found, feed requests will fail until `pixiv-feed login` is run"
        ),
        Err(e) => tracing::warn!(
            path = %store.path().display(),
            error = %e,
            "Token cache is unreadable"
        ),
    }
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("Failed to load config '{}'", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `generate` output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => get_config_dir()?.join("config.toml"),
    };
    let config = load_config(&config_path)?;
    let token_path = config.token_path_or(&get_cache_dir()?);
    let store = FileTokenStore::new(token_path);

    match args.command {
        Command::Login { no_browser } => login(&config, &store, !no_browser).await,

        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.host.clone());
            let port = port.unwrap_or(config.port);
            warn_if_logged_out(&store);

            let service = Arc::new(build_service(&config, Arc::new(store))?);
            let listener = tokio::net::TcpListener::bind((host.as_str(), port))
                .await
                .with_context(|| format!("Failed to bind {host}:{port}"))?;
            pixiv_feed::server::serve(listener, service)
                .await
                .context("HTTP server failed")
        }

        Command::Generate {
            rss: _,
            atom,
            lang,
            id,
            name,
            feed,
        } => {
            let kind = if atom { FeedFormat::Atom } else { FeedFormat::Rss }.as_str();
            let service = build_service(&config, Arc::new(store))?;

            let rendered = match feed {
                FeedKind::Illust => {
                    let id = id.context("--id is required for the illust feed")?;
                    let request = UserFeedRequest { id, lang, name };
                    service.user_feed(kind, &request).await
                }
                FeedKind::NewIllust => service.follow_feed(kind, lang.as_deref()).await,
            }
            .context("Failed to generate feed")?;

            println!("{}", rendered.body);
            Ok(())
        }
    }
}
