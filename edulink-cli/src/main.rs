//! EduLink CLI - Command-line shell around the session controller
//!
//! Drives sign-in, sign-out and session restore against the configured
//! key-value store and remote session API.

use clap::{Parser, Subcommand};
use edulink_core::{
    config_error, init_logging, log_operation_error, log_operation_start, log_operation_success,
    with_timeout, EdulinkConfig, EdulinkError, EdulinkResult, ErrorContext, PeriodicTask,
    StorageBackend,
};
use edulink_session::{
    select, sign_in_with_credentials, Credentials, FileStore, HttpSessionApi, KeyValueStore,
    MemoryStore, Role, Session, SessionController,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "edulink")]
#[command(about = "Session shell for the EduLink school-communication client")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore the stored session and show where it routes
    Status {
        /// Print the session as JSON
        #[arg(long)]
        json: bool,

        /// Keep re-reading the store and print every change
        #[arg(long)]
        follow: bool,

        /// Seconds between reads with --follow
        #[arg(long, default_value = "5")]
        interval: u64,
    },

    /// Sign in with an already-resolved token and role
    SignIn {
        /// Session token
        #[arg(long)]
        token: String,

        /// User role (parent or teacher)
        #[arg(long)]
        role: String,

        /// User identifier
        #[arg(long)]
        user_id: Option<String>,
    },

    /// Sign in with email and password against the session API
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    /// Sign out and clear the stored session
    Logout,

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize default configuration
        #[arg(long)]
        init: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> EdulinkResult<()> {
    let cli = Cli::parse();

    let (config, config_source) = load_config(cli.config.as_ref())?;

    let logging_config = if cli.verbose {
        config.logging.clone().verbose()
    } else {
        config.logging.clone()
    };

    init_logging(&logging_config).map_err(|e| EdulinkError::Config {
        message: format!("Failed to initialize logging: {}", e),
        source: Some(e),
        context: ErrorContext::new("cli")
            .with_operation("init_logging")
            .with_suggestion("Check the [logging] section of the configuration"),
    })?;

    info!("Starting EduLink CLI v{}", env!("CARGO_PKG_VERSION"));
    match &config_source {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("No configuration file found, using defaults"),
    }

    match cli.command {
        Commands::Status {
            json,
            follow,
            interval,
        } => {
            handle_status(json, follow, interval, &config).await?;
        }
        Commands::SignIn {
            token,
            role,
            user_id,
        } => {
            handle_sign_in(token, role, user_id, &config).await?;
        }
        Commands::Login { email, password } => {
            handle_login(email, password, &config).await?;
        }
        Commands::Logout => {
            handle_logout(&config).await?;
        }
        Commands::Config {
            show,
            init,
            validate,
        } => {
            handle_config(show, init, validate, &config, config_source.as_ref())?;
        }
    }

    Ok(())
}

/// Resolve the configuration file and load it
///
/// Returns the path it was read from, or `None` when defaults are used.
fn load_config(config_path: Option<&PathBuf>) -> EdulinkResult<(EdulinkConfig, Option<PathBuf>)> {
    if let Some(path) = config_path {
        return Ok((EdulinkConfig::from_file(path)?, Some(path.clone())));
    }

    let default_paths = [
        dirs::config_dir().map(|d| d.join("edulink").join("config.toml")),
        dirs::home_dir().map(|d| d.join(".edulink").join("config.toml")),
        Some(PathBuf::from("edulink.toml")),
    ];

    for path in default_paths.into_iter().flatten() {
        if path.exists() {
            return Ok((EdulinkConfig::from_file(&path)?, Some(path)));
        }
    }

    Ok((EdulinkConfig::default(), None))
}

/// Default location written by `config --init`
fn default_config_path() -> EdulinkResult<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
        .map(|d| d.join("edulink").join("config.toml"))
        .ok_or_else(|| config_error!("Cannot determine the configuration directory", "cli"))
}

fn expand_home(path: &str) -> EdulinkResult<PathBuf> {
    match path.strip_prefix('~') {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| config_error!("Cannot determine the home directory", "cli"))?;
            Ok(home.join(rest.trim_start_matches('/')))
        }
        None => Ok(PathBuf::from(path)),
    }
}

fn open_store(config: &EdulinkConfig) -> EdulinkResult<Arc<dyn KeyValueStore>> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::File => {
            let path = expand_home(&config.storage.path)?;
            Ok(Arc::new(FileStore::new(path)?))
        }
    }
}

fn print_session(session: &Session, json: bool) {
    let selection = select(session);

    if json {
        let value = serde_json::json!({
            "state": session.state().to_string(),
            "role": session.role().map(Role::as_str),
            "user_id": session.user_id(),
            "graph": selection.graph,
            "transition": selection.transition,
        });
        println!("{}", value);
        return;
    }

    println!("🔐 State: {}", session.state());
    if let Some(user_id) = session.user_id() {
        println!("👤 User: {}", user_id);
    }
    println!("🧭 Screens: {} ({:?})", selection.graph, selection.transition);
}

async fn handle_status(
    json: bool,
    follow: bool,
    interval: u64,
    config: &EdulinkConfig,
) -> EdulinkResult<()> {
    let controller = Arc::new(SessionController::bootstrap(open_store(config)?).await);
    print_session(&controller.snapshot(), json);

    if !follow {
        return Ok(());
    }

    let last_seen = Mutex::new(controller.snapshot());
    let _subscription = controller.subscribe(move |session| {
        let mut last = last_seen.lock().unwrap_or_else(PoisonError::into_inner);
        if *last != *session {
            print_session(session, json);
            *last = session.clone();
        }
    });

    let period = Duration::from_secs(interval.max(1));
    let task_controller = Arc::clone(&controller);
    let task = PeriodicTask::spawn("session_follow", period, move || {
        refresh_session(Arc::clone(&task_controller), period)
    });

    tokio::signal::ctrl_c().await?;
    info!(runs = task.runs(), "Stopping session follow");
    task.stop().await;

    Ok(())
}

/// Re-read the stored session, giving up once `budget` has elapsed
async fn refresh_session(
    controller: Arc<SessionController>,
    budget: Duration,
) -> EdulinkResult<()> {
    let budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
    with_timeout(controller.restore(), budget_ms, "refresh_session").await?;
    Ok(())
}

async fn handle_sign_in(
    token: String,
    role: String,
    user_id: Option<String>,
    config: &EdulinkConfig,
) -> EdulinkResult<()> {
    log_operation_start!("sign_in", role = %role);

    let role = Role::from(role);
    if !role.is_known() {
        println!(
            "⚠️  Role '{}' is not recognized; the session will route to the login screens",
            role
        );
    }

    let controller = SessionController::new(open_store(config)?);
    let session = controller
        .sign_in(token, role, user_id)
        .await
        .map_err(|e| {
            log_operation_error!("sign_in", e);
            e
        })?;

    println!("✅ Signed in");
    print_session(&session, false);

    log_operation_success!("sign_in", state = %session.state());
    Ok(())
}

async fn handle_login(email: String, password: String, config: &EdulinkConfig) -> EdulinkResult<()> {
    log_operation_start!("login", email = %email);

    let api = HttpSessionApi::new(config.api.clone())?;
    let controller = SessionController::new(open_store(config)?);
    let credentials = Credentials::new(email, password);

    let session = sign_in_with_credentials(&controller, &api, &credentials)
        .await
        .map_err(|e| {
            println!("❌ Login failed: {}", e);
            if let Some(context) = e.context() {
                for suggestion in &context.recovery_suggestions {
                    println!("   💡 {}", suggestion);
                }
            }
            e
        })?;

    println!("✅ Logged in");
    print_session(&session, false);

    log_operation_success!("login", email = %credentials.email);
    Ok(())
}

async fn handle_logout(config: &EdulinkConfig) -> EdulinkResult<()> {
    let controller = SessionController::bootstrap(open_store(config)?).await;
    let was_signed_in = controller.is_authenticated();

    let session = controller.sign_out().await;

    if was_signed_in {
        println!("👋 Signed out");
    } else {
        println!("ℹ️  No active session; stored keys cleared");
    }
    print_session(&session, false);
    Ok(())
}

fn handle_config(
    show: bool,
    init: bool,
    validate: bool,
    config: &EdulinkConfig,
    source: Option<&PathBuf>,
) -> EdulinkResult<()> {
    if init {
        let config_path = default_config_path()?;
        if config_path.exists() {
            println!("⚠️  Configuration already exists at: {:?}", config_path);
        } else {
            EdulinkConfig::default().save_to_file(&config_path)?;
            println!("✅ Configuration initialized at: {:?}", config_path);
            println!("📝 Edit api.base_url to point at your school's server.");
        }
    }

    if show {
        match source {
            Some(path) => println!("📋 Current configuration ({:?}):", path),
            None => println!("📋 Current configuration (defaults):"),
        }
        println!("{}", config.to_toml_string()?);
    }

    if validate {
        match config.validate() {
            Ok(()) => println!("✅ Configuration is valid"),
            Err(e) => {
                println!("❌ Configuration validation failed: {}", e);
                return Err(e);
            }
        }
    }

    Ok(())
}
