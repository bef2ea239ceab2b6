//! OrbitKeys CLI - API key issuance and role-based permission checks
//!
//! Run `orbitkeys --help` for usage information.

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use orbitkeys::auth::{
    parse_permissions, ApiKeyMetadata, AuthGate, AuthManager, AuthRequest, ExpirationUpdate,
    KeyId, LastUsedRecorder, ROLE_ADMIN,
};
use orbitkeys::config::{Config, LogFormat, LoggingConfig};
use orbitkeys::storage::open_store;
use orbitkeys::web::WebServer;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "orbitkeys",
    about = "Issue API keys, bind them to roles and check their permissions",
    version
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a configuration file with a freshly generated root key
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Start the JSON API server
    Serve {
        /// Address to bind to (overrides the configuration)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Manage roles
    Role {
        #[command(subcommand)]
        command: RoleCommands,
    },

    /// Manage API keys
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },
}

#[derive(Subcommand)]
enum RoleCommands {
    /// Create a new role
    Create {
        /// Role name
        name: String,

        /// Permissions (comma-separated, e.g. "orders:read,users:*")
        #[arg(short, long, default_value = "")]
        permissions: String,

        /// Role description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List all roles
    List {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show role info
    Info {
        /// Role name or ID
        role: String,
    },

    /// Delete a role (fails while keys still use it)
    Delete {
        /// Role name or ID
        role: String,
    },

    /// Grant a permission to a role
    Grant {
        /// Role name or ID
        role: String,

        /// Permission to grant (e.g. "orders:write")
        permission: String,
    },

    /// Revoke a permission from a role
    Revoke {
        /// Role name or ID
        role: String,

        /// Permission to revoke
        permission: String,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Issue a new API key
    Create {
        /// Role to bind the key to (name or ID)
        #[arg(short, long)]
        role: String,

        /// Key description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Opaque data stored with the key
        #[arg(long)]
        data: Option<String>,

        /// Expiration (e.g. "30d", "24h", "1w", "never")
        #[arg(short, long, default_value = "never")]
        expires: String,
    },

    /// List all API keys
    List {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Revoke (delete) an API key
    Revoke {
        /// Key ID
        id: KeyId,
    },

    /// Change when a key expires
    Expire {
        /// Key ID
        id: KeyId,

        /// New expiration ("never", "now", or a duration like "30d")
        expires: String,
    },

    /// Authenticate a key, optionally requiring a permission
    Check {
        /// The full API key
        key: String,

        /// Permission the key must grant
        #[arg(short, long)]
        permission: Option<String>,
    },
}

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();

    // Load configuration; the file `init` writes usually does not exist yet
    let config = match (&cli.command, &cli.config) {
        (Commands::Init { .. }, _) => Config::default(),
        (_, Some(path)) => Config::load(path).await?,
        (_, None) => Config::load_or_default(Config::default_path()).await?,
    };

    init_logging(cli.verbose, &config.logging);

    match cli.command {
        Commands::Init { force } => {
            init_config(cli.config, force).await?;
        }
        Commands::Serve { bind } => {
            run_server(config, bind).await?;
        }
        Commands::Role { command } => {
            let manager = open_manager(&config).await?;
            match command {
                RoleCommands::Create {
                    name,
                    permissions,
                    description,
                } => create_role(&manager, name, permissions, description).await?,
                RoleCommands::List { format } => list_roles(&manager, format).await?,
                RoleCommands::Info { role } => show_role_info(&manager, role).await?,
                RoleCommands::Delete { role } => delete_role(&manager, role).await?,
                RoleCommands::Grant { role, permission } => {
                    let role = manager.resolve_role(&role).await?;
                    let role = manager.grant_permission(role.id, &permission).await?;
                    println!("Granted '{}' to role '{}'", permission, role.name);
                }
                RoleCommands::Revoke { role, permission } => {
                    let role = manager.resolve_role(&role).await?;
                    let role = manager.revoke_permission(role.id, &permission).await?;
                    println!("Revoked '{}' from role '{}'", permission, role.name);
                }
            }
        }
        Commands::Key { command } => {
            let manager = open_manager(&config).await?;
            match command {
                KeyCommands::Create {
                    role,
                    description,
                    data,
                    expires,
                } => create_api_key(&manager, role, description, data, expires).await?,
                KeyCommands::List { format } => list_api_keys(&manager, format).await?,
                KeyCommands::Revoke { id } => {
                    manager.revoke_api_key(id).await?;
                    println!("API key {} revoked", id);
                }
                KeyCommands::Expire { id, expires } => {
                    update_expiration(&manager, id, expires).await?
                }
                KeyCommands::Check { key, permission } => {
                    check_api_key(&config, &manager, key, permission).await?
                }
            }
        }
    }

    Ok(())
}

/// Install the tracing subscriber; `-v` flags win over the configured level
fn init_logging(verbose: u8, logging: &LoggingConfig) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level)),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

/// Open the configured store and make sure the admin role exists
async fn open_manager(config: &Config) -> CliResult<AuthManager> {
    let store = open_store(&config.storage).await?;
    let manager = AuthManager::new(store);
    manager.ensure_default_admin_role().await?;
    Ok(manager)
}

/// Write a fresh configuration file
async fn init_config(path: Option<PathBuf>, force: bool) -> CliResult {
    let config_path = path.unwrap_or_else(Config::default_path);

    if config_path.exists() && !force {
        return Err(format!(
            "Configuration already exists at {}. Use --force to overwrite.",
            config_path.display()
        )
        .into());
    }

    let mut config = Config::from_env()?;
    let generated = config.ensure_root_key()?;
    config.save(&config_path).await?;

    println!("Configuration initialized at {}", config_path.display());
    if generated {
        println!("\nRoot API key: {}", config.root_api_key.expose_secret());
        println!("\n*** The root key is stored in the configuration file; keep it private ***");
    }

    println!("\nNext steps:");
    println!("1. Create an admin key: orbitkeys key create --role {}", ROLE_ADMIN);
    println!("2. Start server: orbitkeys serve");

    Ok(())
}

/// Run the JSON API until Ctrl+C
async fn run_server(config: Config, bind: Option<String>) -> CliResult {
    let store = open_store(&config.storage).await?;
    let manager = AuthManager::new(store.clone());
    let admin = manager.ensure_default_admin_role().await?;

    if !config.has_root_key() {
        warn!("No root API key configured; /lookup and /validate will reject every request");
    }

    let mut server = WebServer::new(&config, store);
    if let Some(bind) = bind {
        server = server.with_bind(bind);
    }

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
        }
        shutdown.cancel();
    });

    info!(admin_role = admin.id, "Admin role ready");
    println!(
        "OrbitKeys API running at http://{}{}",
        server.bind_address(),
        config.base_url
    );
    println!("Press Ctrl+C to stop");

    server
        .run()
        .await
        .map_err(|e| -> Box<dyn std::error::Error> { e.to_string().into() })
}

// ==================== Role Management ====================

async fn create_role(
    manager: &AuthManager,
    name: String,
    permissions: String,
    description: Option<String>,
) -> CliResult {
    let permissions = parse_permissions(&permissions);
    let role = manager.create_role(name, permissions, description).await?;

    println!("Role '{}' created successfully", role.name);
    println!("ID: {}", role.id);
    println!("Permissions: {}", format_permissions(role.permissions()));

    Ok(())
}

async fn list_roles(manager: &AuthManager, format: String) -> CliResult {
    let roles = manager.list_roles().await?;

    if roles.is_empty() {
        println!("No roles found");
        return Ok(());
    }

    match format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&roles)?);
        }
        _ => {
            println!("{:<6} {:<20} {}", "ID", "NAME", "PERMISSIONS");
            println!("{}", "-".repeat(70));
            for role in roles {
                println!(
                    "{:<6} {:<20} {}",
                    role.id,
                    role.name,
                    format_permissions(role.permissions())
                );
            }
        }
    }

    Ok(())
}

async fn show_role_info(manager: &AuthManager, role: String) -> CliResult {
    let role = manager.resolve_role(&role).await?;
    let keys = manager.store().count_by_role(role.id).await?;

    println!("Name:        {}", role.name);
    println!("ID:          {}", role.id);
    if let Some(desc) = &role.description {
        println!("Description: {}", desc);
    }
    println!("Permissions: {}", format_permissions(role.permissions()));
    println!("Keys:        {}", keys);
    println!(
        "Created:     {}",
        role.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "Updated:     {}",
        role.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    Ok(())
}

async fn delete_role(manager: &AuthManager, role: String) -> CliResult {
    let role = manager.resolve_role(&role).await?;
    manager.delete_role(role.id).await?;
    println!("Role '{}' deleted", role.name);
    Ok(())
}

fn format_permissions(permissions: &[String]) -> String {
    if permissions.is_empty() {
        "(none)".to_string()
    } else {
        permissions.join(", ")
    }
}

// ==================== API Key Management ====================

/// Parse expiration duration
fn parse_expiration(s: &str) -> Result<Option<Duration>, String> {
    let s = s.trim().to_lowercase();
    if s == "never" || s.is_empty() {
        return Ok(None);
    }

    // Formats like "30d", "24h", "1w", "6m"
    let Some(unit) = s.chars().last() else {
        return Ok(None);
    };
    let num_str = &s[..s.len() - unit.len_utf8()];
    let num: i64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;
    if num <= 0 {
        return Err(format!("Duration must be positive: {}", s));
    }

    let duration = match unit {
        'h' => Duration::try_hours(num),
        'd' => Duration::try_days(num),
        'w' => Duration::try_weeks(num),
        // Approximate month
        'm' => num.checked_mul(30).and_then(Duration::try_days),
        _ => {
            return Err(format!(
                "Invalid duration format: {}. Use format like '30d', '24h', '1w'",
                s
            ))
        }
    };

    duration
        .map(Some)
        .ok_or_else(|| format!("Duration out of range: {}", s))
}

/// Parse an expiration change: "now", "never" or a duration
fn parse_expiration_update(s: &str) -> Result<ExpirationUpdate, String> {
    if s.trim().eq_ignore_ascii_case("now") {
        return Ok(ExpirationUpdate::Now);
    }

    Ok(match parse_expiration(s)? {
        Some(duration) => ExpirationUpdate::In(duration),
        None => ExpirationUpdate::Never,
    })
}

async fn create_api_key(
    manager: &AuthManager,
    role: String,
    description: String,
    data: Option<String>,
    expires: String,
) -> CliResult {
    let expires_in = parse_expiration(&expires)?;
    let role = manager.resolve_role(&role).await?;

    let api_key = manager
        .create_api_key(role.id, description, data, expires_in)
        .await?;

    println!("API key created successfully!\n");
    println!("Key: {}", api_key.key);
    println!("\n*** SAVE THIS KEY - IT WILL NOT BE SHOWN AGAIN ***\n");
    println!("ID:      {}", api_key.id);
    println!("Role:    {}", role.name);
    match api_key.expires_at {
        Some(expires_at) => println!("Expires: {}", expires_at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("Expires: Never"),
    }

    println!("\nUsage:");
    println!("  curl -H \"X-API-Key: {}\" ...", api_key.key);

    Ok(())
}

async fn list_api_keys(manager: &AuthManager, format: String) -> CliResult {
    let keys = manager.list_api_keys().await?;

    if keys.is_empty() {
        println!("No API keys found");
        return Ok(());
    }

    match format.as_str() {
        "json" => {
            let metadata: Vec<ApiKeyMetadata> = keys.iter().map(ApiKeyMetadata::from).collect();
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        _ => {
            let role_names: HashMap<_, _> = manager
                .list_roles()
                .await?
                .into_iter()
                .map(|r| (r.id, r.name))
                .collect();

            println!(
                "{:<6} {:<20} {:<16} {:<12} {:<18} {}",
                "ID", "KEY", "ROLE", "EXPIRES", "LAST USED", "DESCRIPTION"
            );
            println!("{}", "-".repeat(95));
            for key in keys {
                let role_name = role_names
                    .get(&key.role_id)
                    .cloned()
                    .unwrap_or_else(|| key.role_id.to_string());
                let expires = match key.expires_at {
                    Some(_) if key.is_expired() => "Expired".to_string(),
                    Some(e) => e.format("%Y-%m-%d").to_string(),
                    None => "Never".to_string(),
                };
                let last_used = key
                    .last_used_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "Never".to_string());

                println!(
                    "{:<6} {:<20} {:<16} {:<12} {:<18} {}",
                    key.id,
                    key.display_key(),
                    role_name,
                    expires,
                    last_used,
                    key.description
                );
            }
        }
    }

    Ok(())
}

async fn update_expiration(manager: &AuthManager, id: KeyId, expires: String) -> CliResult {
    let update = parse_expiration_update(&expires)?;
    let key = manager.update_api_key_expiration(id, update).await?;

    match key.expires_at {
        Some(expires_at) => println!(
            "API key {} now expires {}",
            id,
            expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => println!("API key {} no longer expires", id),
    }

    Ok(())
}

/// Run a key through the same gate the API uses
async fn check_api_key(
    config: &Config,
    manager: &AuthManager,
    key: String,
    permission: Option<String>,
) -> CliResult {
    let store = manager.store().clone();
    let gate = AuthGate::new(Arc::clone(&store))
        .with_timeout(config.auth.request_timeout)
        .without_usage_recording();

    let mut request = AuthRequest::new(Some(key.as_str()));
    if let Some(permission) = permission.as_deref() {
        request = request.require(permission);
    }

    let ctx = gate.authenticate(request).await?;

    // The process exits right after; wait for the touch
    LastUsedRecorder::new(store)
        .record(ctx.api_key.id, Utc::now())
        .await?;

    println!("Key is valid");
    println!("ID:          {}", ctx.api_key.id);
    println!("Role:        {}", ctx.role.name);
    println!("Permissions: {}", format_permissions(ctx.role.permissions()));
    if let Some(permission) = permission {
        println!("Granted:     {}", permission);
    }

    Ok(())
}
