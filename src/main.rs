//! To-do list client.
//!
//! Signs in against Azure AD and manages the signed-in user's to-do list.

#![deny(clippy::all)]

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use todolist::auth::token_manager::{format_duration, time_until_expiry};
use todolist::auth::{BrowserPrompt, OAuth2Client, Token, TokenAcquirer, TokenCache};
use todolist::client::{SignInOutcome, TodoListClient, TodoSession};
use todolist::config::Config;
use todolist::error::AppError;
use todolist::models::TodoItemView;
use todolist::settings;

#[derive(Parser)]
#[command(name = "todolist")]
#[command(about = "To-do list client with Azure AD sign-in", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show your to-do items
    List,
    /// Add a to-do item
    Add {
        /// Item title
        title: String,
    },
    /// Sign in through the browser
    SignIn,
    /// Sign in with a username and password
    SignInPassword {
        /// Account name, e.g. user@contoso.onmicrosoft.com
        #[arg(long)]
        username: String,
        /// Account password
        #[arg(long, env = "TODOLIST_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget cached tokens
    SignOut,
    /// Show who is signed in
    Status,
}

fn main() -> ExitCode {
    // Load .env file (if present) before anything else
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let config = match load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config);
    info!("Starting {} v{}", config.app.name, env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        let session = match build_session(&config) {
            Ok(s) => s,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                eprintln!("{:#}", e);
                return ExitCode::FAILURE;
            }
        };

        match run(&session, cli.command).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{}", e.user_message());
                ExitCode::FAILURE
            }
        }
    })
}

fn load_config() -> Result<Config> {
    let config = Config::load()?;
    config.validate_client()?;
    Ok(config)
}

fn init_logging(config: &Config) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_session(config: &Config) -> Result<TodoSession> {
    let oauth_client =
        Arc::new(OAuth2Client::new(config).context("Failed to create OAuth client")?);
    let prompt = Arc::new(BrowserPrompt::new(Arc::clone(&oauth_client), config));

    let cache = if config.oauth.persist_cache {
        match settings::init_data_directory() {
            Ok(_) => TokenCache::open(settings::token_cache_path()),
            Err(e) => {
                warn!("Token cache will not be persisted: {:#}", e);
                TokenCache::in_memory()
            }
        }
    } else {
        TokenCache::in_memory()
    };

    let acquirer = TokenAcquirer::new(
        oauth_client.clone(),
        prompt,
        cache,
        oauth_client.resource(),
        oauth_client.client_id(),
        config.token.refresh_before_expiry_seconds,
    );

    let client = TodoListClient::new(&config.todo.base_address)
        .context("Failed to create to-do list client")?;

    Ok(TodoSession::new(Arc::new(acquirer), client))
}

async fn run(session: &TodoSession, command: Option<Commands>) -> Result<(), AppError> {
    match command {
        None => {
            match session.start().await {
                Some(token) => print_signed_in(&token),
                None => println!("Not signed in. Run `todolist sign-in` to sign in."),
            }
            Ok(())
        }
        Some(Commands::List) => {
            print_items(&session.list().await?);
            Ok(())
        }
        Some(Commands::Add { title }) => {
            print_items(&session.add(&title).await?);
            Ok(())
        }
        Some(Commands::SignIn) => {
            println!("Complete the sign-in in your browser...");
            match session.sign_in().await? {
                SignInOutcome::SignedIn(token) => print_signed_in(&token),
                SignInOutcome::Cancelled => println!("Sign-in cancelled."),
            }
            Ok(())
        }
        Some(Commands::SignInPassword { username, password }) => {
            let token = session.sign_in_with_password(&username, &password).await?;
            print_signed_in(&token);
            Ok(())
        }
        Some(Commands::SignOut) => {
            session.sign_out().await?;
            println!("Signed out.");
            Ok(())
        }
        Some(Commands::Status) => {
            match session.current_token().await {
                Some(token) => print_signed_in(&token),
                None => println!("Not signed in."),
            }
            Ok(())
        }
    }
}

fn print_signed_in(token: &Token) {
    let expiry = match time_until_expiry(token.expires_at, Utc::now()) {
        Some(remaining) => format!("expires in {}", format_duration(remaining)),
        None => "expired".to_string(),
    };
    println!("Signed in as {} (token {})", token.account, expiry);
}

fn print_items(items: &[TodoItemView]) {
    if items.is_empty() {
        println!("Your to-do list is empty.");
        return;
    }
    for item in items {
        println!("- {}", item.title);
    }
}
