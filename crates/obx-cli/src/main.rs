//! obx: opaquebox command-line client
//!
//! Commands:
//!   put <file>     - encrypt locally and upload
//!   get <id>       - download and decrypt
//!   rm <id>        - delete (proves passphrase knowledge when required)
//!   ls             - list your objects, newest first
//!   link <id>      - print a short-lived read URL for the ciphertext
//!   status         - check storage reachability
//!   config show    - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use obx_core::config::ObxConfig;
use obx_crypto::KdfParams;
use obx_storage::{open_record_store, OpendalBackend, S3Credentials};
use obx_transfer::{HttpTransport, RetryPolicy, TransferClient, DEFAULT_CONTENT_TYPE};
use obx_vault::{ObjectLifecycle, Vault};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "obx",
    version,
    about = "opaquebox client",
    long_about = "obx: store files in object storage, encrypted before they leave this machine"
)]
struct Cli {
    /// Path to config.toml
    #[arg(
        long,
        short = 'c',
        env = "OBX_CONFIG",
        default_value = "~/.config/obx/config.toml",
        global = true
    )]
    config: PathBuf,

    /// Owner id objects are filed under (default: $USER)
    #[arg(long, env = "OBX_OWNER", global = true)]
    owner: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides [logging]
    #[arg(long, env = "OBX_LOG", global = true)]
    log: Option<String>,

    /// Log format; overrides [logging]
    #[arg(long, env = "OBX_LOG_FORMAT", global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a local file and upload it
    Put {
        file: PathBuf,
        /// Display name (default: the file name)
        #[arg(long)]
        name: Option<String>,
        /// MIME type (default: guessed from the extension)
        #[arg(long)]
        mime: Option<String>,
    },

    /// Download and decrypt an object
    Get {
        id: String,
        /// Destination (default: the object's display name in the current dir)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Delete an object and its stored ciphertext
    Rm { id: String },

    /// List objects, newest first
    Ls {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print a short-lived read URL for an object's ciphertext
    Link { id: String },

    /// Check storage reachability
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = load_config(&config_path).await?;

    let level = cli.log.as_deref().unwrap_or(&config.logging.level);
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| match config.logging.format.as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        });
    init_logging(level, &format);

    if !config_path.exists() {
        warn!(
            "config file not found: {}  (using defaults)",
            config_path.display()
        );
    }

    match cli.command {
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
        Commands::Status => cmd_status(&config).await,
        Commands::Put { file, name, mime } => {
            let (vault, owner) = session(&config, cli.owner)?;
            cmd_put(&vault, &owner, &file, name, mime).await
        }
        Commands::Get { id, output } => {
            let (vault, owner) = session(&config, cli.owner)?;
            cmd_get(&vault, &owner, &id, output).await
        }
        Commands::Rm { id } => {
            let (vault, owner) = session(&config, cli.owner)?;
            cmd_rm(&vault, &owner, &id).await
        }
        Commands::Ls { json } => {
            let (vault, owner) = session(&config, cli.owner)?;
            cmd_ls(&vault, &owner, json).await
        }
        Commands::Link { id } => {
            let (vault, owner) = session(&config, cli.owner)?;
            cmd_link(&vault, &owner, &id).await
        }
    }
}

async fn load_config(path: &Path) -> Result<ObxConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(ObxConfig::default())
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so stdout stays clean for `ls --json` and `link`
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Wiring ────────────────────────────────────────────────────────────────────

/// S3 operator with credentials from AWS_* (or OBX_*) environment variables.
fn build_operator_from_env(config: &ObxConfig) -> Result<opendal::Operator> {
    let creds = S3Credentials::from_env()?;
    obx_storage::s3_operator(&config.storage, &creds).context("building storage operator")
}

fn build_vault(config: &ObxConfig) -> Result<Vault> {
    let op = build_operator_from_env(config)?;
    let backend = Arc::new(OpendalBackend::new(op.clone(), &config.storage.container));
    let records = open_record_store(&config.records, &op).context("opening record store")?;

    let lifecycle = ObjectLifecycle::new(backend, records).with_ttls(config.capability.clone());
    let transfer = TransferClient::new(
        Arc::new(HttpTransport::from_config(&config.transfer)),
        RetryPolicy::from(&config.transfer),
    );
    Ok(Vault::new(
        Arc::new(lifecycle),
        transfer,
        KdfParams::from(&config.crypto),
    ))
}

/// Everything an object command needs: the wired vault and the owner id.
fn session(config: &ObxConfig, owner: Option<String>) -> Result<(Vault, String)> {
    let owner = resolve_owner(owner)?;
    Ok((build_vault(config)?, owner))
}

fn resolve_owner(flag: Option<String>) -> Result<String> {
    let owner = flag
        .or_else(|| std::env::var("USER").ok())
        .filter(|o| !o.trim().is_empty())
        .context("no owner id: pass --owner or set OBX_OWNER")?;
    obx_core::types::validate_owner_id(&owner)?;
    Ok(owner)
}

/// OBX_PASSPHRASE, or an interactive prompt.
fn read_passphrase(prompt: &str) -> Result<SecretString> {
    let pw = match std::env::var("OBX_PASSPHRASE") {
        Ok(pw) => pw,
        Err(_) => rpassword::prompt_password(prompt).context("reading passphrase")?,
    };
    non_blank(pw)
}

/// An empty prompt answer is almost always a slip of the Enter key.
fn non_blank(pw: String) -> Result<SecretString> {
    if pw.trim().is_empty() {
        anyhow::bail!("passphrase must not be empty");
    }
    Ok(SecretString::from(pw))
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("txt" | "md" | "log") => "text/plain",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("zip") => "application/zip",
        Some("tar") => "application/x-tar",
        Some("gz") => "application/gzip",
        Some("mp4") => "video/mp4",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn cmd_put(
    vault: &Vault,
    owner: &str,
    file: &Path,
    name: Option<String>,
    mime: Option<String>,
) -> Result<()> {
    let plaintext = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let display_name = match name {
        Some(n) => n,
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("file has no name; pass --name")?,
    };
    let mime = mime.unwrap_or_else(|| guess_mime(file).to_string());
    let passphrase = read_passphrase("Passphrase: ")?;

    let pb = make_spinner("put");
    pb.set_message(format!("encrypting and uploading {display_name}"));
    let result = vault
        .upload(owner, &passphrase, &display_name, &mime, &plaintext)
        .await;
    pb.finish_and_clear();

    let summary = result?;
    println!(
        "{}  {}  {}",
        summary.id,
        human_size(summary.byte_size),
        summary.display_name
    );
    Ok(())
}

async fn cmd_get(vault: &Vault, owner: &str, id: &str, output: Option<PathBuf>) -> Result<()> {
    let passphrase = read_passphrase("Passphrase: ")?;

    let pb = make_spinner("get");
    pb.set_message(format!("downloading {id}"));
    let result = vault.download(owner, id, &passphrase).await;
    pb.finish_and_clear();

    let downloaded = result?;
    // Display names are user input; never let them pick a directory
    let dest = output.unwrap_or_else(|| {
        Path::new(&downloaded.object.display_name)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(id))
    });
    tokio::fs::write(&dest, &downloaded.plaintext)
        .await
        .with_context(|| format!("writing {}", dest.display()))?;
    println!(
        "{}  {}",
        dest.display(),
        human_size(downloaded.plaintext.len() as u64)
    );
    Ok(())
}

async fn cmd_rm(vault: &Vault, owner: &str, id: &str) -> Result<()> {
    let object = match vault.lifecycle().get(owner, id).await {
        Ok(object) => object,
        Err(obx_core::ObxError::ObjectNotFound(_)) => {
            println!("{id}: already absent");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let passphrase = if object.has_verifier {
        Some(read_passphrase("Passphrase (to authorize deletion): ")?)
    } else {
        None
    };
    vault.remove(owner, id, passphrase.as_ref()).await?;
    println!("{id}: deleted");
    Ok(())
}

async fn cmd_ls(vault: &Vault, owner: &str, json: bool) -> Result<()> {
    let objects = vault.lifecycle().list(owner).await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&objects).context("serializing listing")?
        );
        return Ok(());
    }
    if objects.is_empty() {
        println!("(no objects)");
        return Ok(());
    }
    for o in &objects {
        println!(
            "{:<26} {:>10}  {:<24} {}",
            o.id,
            human_size(o.byte_size),
            o.mime_type,
            o.display_name
        );
    }
    Ok(())
}

async fn cmd_link(vault: &Vault, owner: &str, id: &str) -> Result<()> {
    let cap = vault.lifecycle().link(owner, id).await?;
    println!("{}", cap.url);
    Ok(())
}

async fn cmd_status(config: &ObxConfig) -> Result<()> {
    println!("endpoint:  {}", config.storage.endpoint);
    println!("bucket:    {}", config.storage.bucket);
    println!("container: {}", config.storage.container);
    println!("records:   {:?}", config.records.backend);

    let op = build_operator_from_env(config)?;
    match obx_storage::check_health(&op, &config.storage.container).await {
        Ok(()) => {
            println!("storage:   ok");
            Ok(())
        }
        Err(e) => {
            println!("storage:   unreachable");
            Err(e.into())
        }
    }
}

fn cmd_config_show(config: &ObxConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
