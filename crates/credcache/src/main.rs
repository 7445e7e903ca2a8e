//! credcache - Encrypted local cache for short-lived cloud credentials
//!
//! Commands:
//! - init: Write a default config file
//! - add: Cache a credential set (encrypted under your password)
//! - get: Print a cached credential set in a chosen format
//! - list: Show cached credential sets without their secrets

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use credcache::{Credentials, NewCredentials, OutputFormat, Vault};
use credcache_core::{Config, Paths};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

const PASSWORD_ENV: &str = "CREDCACHE_PASSWORD";

#[derive(Parser)]
#[command(name = "credcache")]
#[command(about = "Encrypted local cache for short-lived cloud access credentials")]
#[command(version)]
#[command(after_help = r#"OUTPUT FORMATS:
    env      export statements (eval "$(credcache get -o env)")
    docker   -e flags for docker run
    idea     KEY=value lines for IDE run configurations
    creds    write a profile into ~/.aws/credentials (-p NAME, -f to overwrite)
    json     JSON dump (also used for unknown formats)

SECURITY:
    - Every secret field is encrypted with AES-256-GCM under your password
    - Set CREDCACHE_PASSWORD to skip the password prompt
    - Expired credentials are deleted before every read"#)]
struct Cli {
    /// Use this config file instead of ~/.config/credcache/config.yaml
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Cache a credential set
    Add {
        #[arg(long)]
        access_key: String,
        #[arg(long)]
        secret_key: String,
        #[arg(long, default_value = "")]
        session_token: String,
        /// Account the credentials were issued for
        #[arg(long, default_value = "")]
        account: String,
        /// Role the credentials were issued for
        #[arg(long, default_value = "")]
        role: String,
        /// Lifetime, e.g. 30m, 1h, 12h, 7d
        #[arg(long, default_value = "1h")]
        ttl: String,
        /// Long-lived IAM credentials rather than session credentials
        #[arg(long)]
        iam: bool,
    },

    /// Print the longest-lived matching credential set
    Get {
        /// Output format (env, docker, idea, creds, json)
        #[arg(short, long)]
        output: Option<String>,
        /// Profile to write for the creds format
        #[arg(short, long)]
        profile: Option<String>,
        /// Overwrite an existing profile
        #[arg(short, long)]
        force: bool,
        /// Only credentials whose account contains this text
        #[arg(long)]
        account: Option<String>,
        /// Only credentials whose role contains this text
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        iam: bool,
    },

    /// List cached credential sets (secrets hidden)
    List {
        #[arg(long)]
        iam: bool,
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let paths = Paths::new();
    let (config_path, config) = match cli.config.clone() {
        Some(path) => {
            let config = Config::load_from(&path)?;
            (path, config)
        }
        None => (paths.config_file(), Config::load()?),
    };
    let vault = Vault::from_config(&config, &paths);

    match cli.command {
        Commands::Init { force } => cmd_init(&config_path, force),
        Commands::Add {
            access_key,
            secret_key,
            session_token,
            account,
            role,
            ttl,
            iam,
        } => {
            let expires_at = Utc::now() + parse_ttl(&ttl)?;
            let creds = NewCredentials {
                access_key,
                secret_key,
                session_token,
                issuing_account: account,
                issuing_role: role,
                expires_at,
            };
            cmd_add(&vault, &creds, iam)
        }
        Commands::Get {
            output,
            profile,
            force,
            account,
            role,
            iam,
        } => {
            let format = OutputFormat::parse(output.as_deref().unwrap_or(&config.default_output));
            let profile = profile.or_else(|| config.default_profile.clone());
            let filter = Filter { account, role };
            cmd_get(&vault, format, profile.as_deref(), force, &filter, iam)
        }
        Commands::List { iam, json } => cmd_list(&vault, iam, json),
    }
}

/// Write a default config
fn cmd_init(config_path: &std::path::Path, force: bool) -> Result<()> {
    Config::with_defaults().save_to(config_path, force)?;
    println!("success: Config written to {}", config_path.display());
    Ok(())
}

/// Cache a credential set
fn cmd_add(vault: &Vault, creds: &NewCredentials, iam: bool) -> Result<()> {
    let password = read_password()?;
    vault.add_key(creds, &password, iam)?;
    println!(
        "success: Credentials cached until {}",
        creds.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

struct Filter {
    account: Option<String>,
    role: Option<String>,
}

impl Filter {
    fn matches(&self, key: &Credentials) -> bool {
        let account_ok = self
            .account
            .as_deref()
            .map_or(true, |a| key.issuing_account.contains(a));
        let role_ok = self
            .role
            .as_deref()
            .map_or(true, |r| key.issuing_role.contains(r));
        account_ok && role_ok
    }
}

/// Print a credential set
fn cmd_get(
    vault: &Vault,
    format: OutputFormat,
    profile: Option<&str>,
    force: bool,
    filter: &Filter,
    iam: bool,
) -> Result<()> {
    let password = read_password()?;
    let report = vault.fetch(&password, iam)?;

    if report.password_rejected() {
        bail!("Invalid password");
    }

    // Sorted by expiry, so the last match lives longest
    let Some(key) = report.keys.iter().rev().find(|k| filter.matches(k)) else {
        bail!("No active credentials cached. Add some with: credcache add");
    };

    let output = vault.get_key_output(format, key, profile, force)?;
    println!("{}", output);
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListEntry<'a> {
    account: &'a str,
    role: &'a str,
    #[serde(rename = "isIAM")]
    is_iam: bool,
    expires_at: String,
}

/// List cached credential sets
fn cmd_list(vault: &Vault, iam: bool, json: bool) -> Result<()> {
    let password = read_password()?;
    let report = vault.fetch(&password, iam)?;

    if report.password_rejected() {
        bail!("Invalid password");
    }

    if json {
        let entries: Vec<_> = report
            .keys
            .iter()
            .map(|k| ListEntry {
                account: &k.issuing_account,
                role: &k.issuing_role,
                is_iam: k.is_iam,
                expires_at: k.expires_at.to_rfc3339(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if report.keys.is_empty() {
        println!("No active credentials cached. Add some with: credcache add");
        return Ok(());
    }

    println!("Cached Credentials");
    println!();

    let now = Utc::now();
    for key in &report.keys {
        let remaining = key.expires_at - now;
        println!(
            "  {:<32} {:<24} expires in {}m",
            key.issuing_account,
            key.issuing_role,
            remaining.num_minutes().max(0)
        );
    }

    if report.rejected > 0 {
        println!();
        println!("warning: {} entries did not open with this password", report.rejected);
    }

    Ok(())
}

fn read_password() -> Result<String> {
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Vault password: ")
            .context("Failed to read password")?,
    };
    check_password(password)
}

fn check_password(password: String) -> Result<String> {
    if password.is_empty() {
        bail!("Empty password not allowed");
    }
    Ok(password)
}

/// Parse a lifetime like `90s`, `30m`, `12h` or `7d`
fn parse_ttl(ttl: &str) -> Result<Duration> {
    let ttl = ttl.trim();
    let split = ttl
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(ttl.len());
    let (digits, unit) = ttl.split_at(split);

    let amount: i64 = digits
        .parse()
        .with_context(|| format!("Invalid TTL: {ttl}"))?;
    if amount <= 0 {
        bail!("TTL must be positive: {ttl}");
    }

    match unit {
        "s" => Ok(Duration::seconds(amount)),
        "m" | "" => Ok(Duration::minutes(amount)),
        "h" => Ok(Duration::hours(amount)),
        "d" => Ok(Duration::days(amount)),
        other => bail!("Unknown TTL unit '{other}' (use s, m, h or d)"),
    }
}
