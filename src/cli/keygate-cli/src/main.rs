//! Keygate CLI - Gateway discovery and backend checks.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

use keygate_auth::{check_htpasswd_user_password, AuthBackend, DirectoryBindConfig, LdapBackend};
use keygate_client::{fetch_login_info, SelectorConfig, ServerSelector};
use keygate_trust::{maybe_load_root_cas, ClientIdentity};

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "keygate")]
#[command(about = "Keygate CLI - Locate gateways and check authentication backends")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select a reachable gateway and show its login options
    Locate(LocateArgs),
    /// Check a password against an htpasswd file
    CheckHtpasswd {
        /// Path to the htpasswd file
        #[arg(long)]
        file: PathBuf,
        /// User to check
        username: String,
    },
    /// Check a password against an LDAPS directory
    CheckLdap(LdapArgs),
}

#[derive(Args)]
struct LocateArgs {
    /// Comma-separated gateway base URLs
    #[arg(long, env = "KEYGATE_SERVERS", value_delimiter = ',', required = true)]
    servers: Vec<String>,

    /// PEM bundle of trusted root CAs (platform store when unset)
    #[arg(long, env = "KEYGATE_ROOT_CA")]
    root_ca: Option<String>,

    /// Start each repeated selection one gateway further on
    #[arg(long, env = "KEYGATE_ROUND_ROBIN")]
    round_robin: bool,

    /// Number of selections to run with the same selector
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
    repeat: u32,

    /// Per-gateway probe timeout in seconds
    #[arg(long, default_value = "10")]
    probe_timeout: u64,

    /// Client certificate chain (PEM) for mutual TLS
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// Client private key (PEM) for mutual TLS
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,
}

#[derive(Args)]
struct LdapArgs {
    /// Directory URL (ldaps only)
    #[arg(long, env = "KEYGATE_LDAP_URL")]
    url: String,

    /// Service identity used for user lookups
    #[arg(long, env = "KEYGATE_LDAP_BIND_DN")]
    bind_dn: String,

    /// Service identity password
    #[arg(long, env = "KEYGATE_LDAP_BIND_PASSWORD", hide_env_values = true)]
    bind_password: String,

    /// Base DN to search, repeatable, searched in order
    #[arg(long = "base-dn", required = true)]
    base_dns: Vec<String>,

    /// Search filter with one %s slot for the username
    #[arg(long, default_value = "(uid=%s)")]
    filter: String,

    /// PEM bundle of trusted root CAs (platform store when unset)
    #[arg(long, env = "KEYGATE_ROOT_CA")]
    root_ca: Option<String>,

    /// Connect and operation timeout in seconds
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// User to check
    username: String,
}

// ============================================================================
// Helpers
// ============================================================================

fn read_password(prompt: &str) -> Result<Zeroizing<String>> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = Zeroizing::new(String::new());
    io::stdin().lock().read_line(&mut line)?;
    let password = Zeroizing::new(line.trim_end_matches(['\r', '\n']).to_string());
    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(password)
}

fn print_verdict(username: &str, accepted: bool) {
    if accepted {
        println!("Password accepted for '{username}'");
    } else {
        println!("Password rejected for '{username}'");
    }
}

// ============================================================================
// Command Handlers
// ============================================================================

async fn cmd_locate(args: LocateArgs) -> Result<()> {
    let identity = match (&args.cert, &args.key) {
        (Some(cert), Some(key)) => Some(
            ClientIdentity::from_pem_files(cert, key).context("Failed to load client identity")?,
        ),
        _ => None,
    };

    let config = SelectorConfig {
        candidates: args.servers,
        round_robin: args.round_robin,
        probe_timeout_secs: args.probe_timeout,
        root_ca_file: args.root_ca,
    };
    let selector = ServerSelector::from_config(&config, identity.as_ref())
        .context("Failed to configure gateway selection")?;

    for _ in 0..args.repeat {
        let server = selector.select().await?;
        let login = fetch_login_info(selector.client(), &server)
            .await
            .with_context(|| format!("Failed to fetch login options from {server}"))?;

        println!("Gateway: {server}");
        println!("  Message:  {}", login.message);
        println!("  Backends: {}", login.auth_backend.join(", "));
    }
    Ok(())
}

fn cmd_check_htpasswd(file: &Path, username: &str) -> Result<()> {
    let content =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let password = read_password("Password: ")?;

    let accepted = check_htpasswd_user_password(username, &password, &content)?;
    print_verdict(username, accepted);
    Ok(())
}

async fn cmd_check_ldap(args: LdapArgs) -> Result<()> {
    let mut config = DirectoryBindConfig::new(&args.url, &args.bind_dn, &args.bind_password);
    config.user_search_base_dns = args.base_dns;
    config.user_search_filter = args.filter;
    config.timeout_secs = args.timeout;
    if let Some(pool) = maybe_load_root_cas(args.root_ca.as_deref())? {
        config = config.with_root_cas(pool);
    }

    let backend = LdapBackend::new(config)?;
    let password = read_password("Password: ")?;

    let accepted = backend.password_authenticate(&args.username, &password).await?;
    print_verdict(&args.username, accepted);
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Locate(args) => cmd_locate(args).await,
        Commands::CheckHtpasswd { file, username } => cmd_check_htpasswd(&file, &username),
        Commands::CheckLdap(args) => cmd_check_ldap(args).await,
    }
}
