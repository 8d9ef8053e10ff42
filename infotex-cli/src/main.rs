//! InfoTex CLI - Command-line access to an InfoTex backend
//!
//! Logs in, keeps the session between invocations the way a browser keeps
//! local storage and cookies, issues authorized requests and evaluates the
//! route guards against the current session.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use infotex_client::{ApiClient, ApiRequest, CookieScope, ReqwestTransport};
use infotex_core::{
    init_logging, log_operation_start, log_operation_success, InfotexConfig, InfotexError,
};
use infotex_session::{
    open_storage, AuthenticatedAreaGuard, DurableStorage, GuardDecision, GuestOnlyGuard,
    RoleGuard, RouteGuard, SessionStore, StatePersistence,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Durable key holding the cookies the backend set (the refresh credential)
const COOKIE_KEY: &str = "cookies";

#[derive(Parser)]
#[command(name = "infotex")]
#[command(about = "Session-aware client for the InfoTex job board API")]
#[command(version)]
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
    /// Log in with email and password
    Login {
        #[arg(short, long)]
        email: String,

        /// Password; read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Show the current session
    Status {
        /// Confirm the session with the backend, refreshing the token if needed
        #[arg(long)]
        check: bool,
    },

    /// End the session locally and on the backend
    Logout,

    /// Send an authorized request and print the response body
    Fetch {
        /// API path, e.g. /api/ofertas; with --profile, a suffix under the user's profile
        path: String,

        #[arg(short = 'X', long, value_enum, default_value = "get")]
        method: HttpMethod,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,

        /// Resolve PATH under /api/usuarios/{userId}/
        #[arg(long)]
        profile: bool,
    },

    /// Evaluate a route guard for a URL
    Guard {
        #[arg(value_enum)]
        kind: GuardKind,

        /// Route the navigation targets, e.g. /empresa/dashboard
        url: String,
    },

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

#[derive(Clone, Copy, ValueEnum)]
enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

#[derive(Clone, Copy, ValueEnum)]
enum GuardKind {
    /// Candidate area: signed-in users only, other roles sent to their home
    Authenticated,
    /// Login and registration pages
    GuestOnly,
    Admin,
    Company,
    Candidate,
}

/// Session, transport and client wired from configuration
struct App {
    config: InfotexConfig,
    storage: Arc<dyn DurableStorage>,
    transport: Arc<ReqwestTransport>,
    client: ApiClient,
}

impl App {
    fn open(config: InfotexConfig) -> anyhow::Result<Self> {
        let storage = open_storage(&config.storage);
        let session = SessionStore::new(StatePersistence::new(
            storage.clone(),
            config.storage.tracked_keys.clone(),
        ));

        let transport = Arc::new(ReqwestTransport::new(&config.api)?);
        match storage.get(COOKIE_KEY) {
            Ok(Some(stored)) => match serde_json::from_str::<Vec<CookieScope>>(&stored) {
                Ok(scopes) => transport.restore_cookies(&scopes),
                Err(e) => warn!(error = %e, "Ignoring unreadable stored cookies"),
            },
            Ok(None) => debug!("No stored cookies"),
            Err(e) => warn!(error = %e, "Failed to read stored cookies"),
        }

        let client = ApiClient::with_transport(&config, session, transport.clone());
        Ok(Self {
            config,
            storage,
            transport,
            client,
        })
    }

    /// Keep the cookie jar for the next invocation
    fn save_cookies(&self) {
        let scopes = self.transport.captured_cookies();
        let result = if scopes.is_empty() {
            self.storage.remove(COOKIE_KEY)
        } else {
            match serde_json::to_string(&scopes) {
                Ok(stored) => self.storage.set(COOKIE_KEY, &stored),
                Err(e) => {
                    warn!(error = %e, "Failed to serialize cookies");
                    return;
                }
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to store cookies");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_ref())?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting InfoTex CLI v{}", env!("CARGO_PKG_VERSION"));

    let result = run(cli.command, config).await;
    if let Err(e) = &result {
        if let Some(error) = e.downcast_ref::<InfotexError>() {
            error.log();
            eprintln!("{}", error.user_message());
        }
    }
    result
}

async fn run(command: Commands, config: InfotexConfig) -> anyhow::Result<()> {
    if let Commands::Config {
        show,
        init,
        validate,
    } = command
    {
        return handle_config(show, init, validate, &config);
    }

    config.validate()?;
    let app = App::open(config)?;

    let result = match command {
        Commands::Login { email, password } => handle_login(&app, &email, password).await,
        Commands::Status { check } => handle_status(&app, check).await,
        Commands::Logout => handle_logout(&app).await,
        Commands::Fetch {
            path,
            method,
            data,
            profile,
        } => handle_fetch(&app, &path, method, data, profile).await,
        Commands::Guard { kind, url } => handle_guard(&app, kind, &url).await,
        Commands::Config { .. } => Ok(()),
    };

    app.save_cookies();
    result
}

fn load_config(config_path: Option<&PathBuf>) -> anyhow::Result<InfotexConfig> {
    if let Some(path) = config_path {
        return InfotexConfig::from_file(path)
            .with_context(|| format!("Loading configuration from {}", path.display()));
    }

    let default_paths = [
        Some(get_config_path()),
        dirs::home_dir().map(|d| d.join(".infotex").join("config.toml")),
        Some(PathBuf::from("infotex.toml")),
    ];

    for path in default_paths.iter().flatten() {
        if path.exists() {
            return InfotexConfig::from_file(path)
                .with_context(|| format!("Loading configuration from {}", path.display()));
        }
    }

    Ok(InfotexConfig::default())
}

/// Default configuration file path
fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("infotex")
        .join("config.toml")
}

async fn handle_login(app: &App, email: &str, password: Option<String>) -> anyhow::Result<()> {
    log_operation_start!("login", email = email);

    let password = match password {
        Some(password) => password,
        None => {
            eprint!("Password: ");
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("Reading password from stdin")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    if password.is_empty() {
        bail!("A password is required");
    }

    let outcome = app.client.login(email, &password).await?;
    log_operation_success!("login", user_id = ?outcome.user_id);

    println!("Logged in");
    if let Some(user_id) = outcome.user_id {
        println!("  user id:   {}", user_id);
    }
    if let Some(user_type) = outcome.user_type {
        println!("  user type: {}", user_type);
        println!("  home:      {}", app.config.routes.home_for(user_type));
    }
    Ok(())
}

async fn handle_status(app: &App, check: bool) -> anyhow::Result<()> {
    let session = app.client.session();

    if check {
        let confirmed = app.client.ensure_authenticated().await;
        println!("Session confirmed by backend: {}", if confirmed { "yes" } else { "no" });
    }

    let snapshot = session.snapshot();
    println!("Authenticated: {}", if snapshot.logged_in { "yes" } else { "no" });
    println!(
        "Access token:  {}",
        if snapshot.access_token.is_some() { "held" } else { "none" }
    );
    match snapshot.user_id {
        Some(user_id) => println!("User id:       {}", user_id),
        None => println!("User id:       -"),
    }
    match snapshot.user_type {
        Some(user_type) => println!("User type:     {}", user_type),
        None => println!("User type:     -"),
    }
    Ok(())
}

async fn handle_logout(app: &App) -> anyhow::Result<()> {
    app.client.logout().await;
    println!("Logged out");
    Ok(())
}

async fn handle_fetch(
    app: &App,
    path: &str,
    method: HttpMethod,
    data: Option<String>,
    profile: bool,
) -> anyhow::Result<()> {
    let path = if profile {
        app.client.profile_path(path)?
    } else {
        path.to_string()
    };

    let mut request = match method {
        HttpMethod::Get => ApiRequest::get(path),
        HttpMethod::Post => ApiRequest::post(path),
        HttpMethod::Put => ApiRequest::put(path),
        HttpMethod::Delete => ApiRequest::delete(path),
    };
    if let Some(data) = data {
        let body: serde_json::Value =
            serde_json::from_str(&data).context("--data must be valid JSON")?;
        request = request.json(&body)?;
    }

    let response = app.client.send(request).await?;
    match response.json_value() {
        Ok(serde_json::Value::Null) => println!("{}", response.status),
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{}", response.body),
    }
    Ok(())
}

async fn handle_guard(app: &App, kind: GuardKind, url: &str) -> anyhow::Result<()> {
    let context = app.client.guard_context(&app.config);
    let guard: Box<dyn RouteGuard> = match kind {
        GuardKind::Authenticated => Box::new(AuthenticatedAreaGuard::candidate_area(context)),
        GuardKind::GuestOnly => Box::new(GuestOnlyGuard::new(context)),
        GuardKind::Admin => Box::new(RoleGuard::admin_only(context)),
        GuardKind::Company => Box::new(RoleGuard::company_only(context)),
        GuardKind::Candidate => Box::new(RoleGuard::candidate_only(context)),
    };

    match guard.check(url).await {
        GuardDecision::Allow => println!("allow"),
        GuardDecision::Redirect(target) => println!("redirect {}", target),
    }
    Ok(())
}

fn handle_config(
    show: bool,
    init: bool,
    validate: bool,
    config: &InfotexConfig,
) -> anyhow::Result<()> {
    if init {
        let config_path = get_config_path();
        InfotexConfig::default().save_to_file(&config_path)?;
        println!("Configuration initialized at: {}", config_path.display());
    }

    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    if validate {
        match config.validate() {
            Ok(()) => println!("Configuration is valid"),
            Err(e) => {
                println!("Configuration validation failed: {}", e);
                return Err(e.into());
            }
        }
    }

    if !(init || show || validate) {
        bail!("Nothing to do; pass --init, --show or --validate");
    }
    Ok(())
}
