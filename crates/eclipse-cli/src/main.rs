//! eclipse: backup, restore and cloud sync for the Eclipse new-tab page
//!
//! Commands:
//!   export [--space ID] [--encrypt] [--out DIR]  - write a backup file
//!   import FILE [--strategy] [--scope] [--dry-run] - restore a backup file
//!   push / pull / status                           - WebDAV cloud sync
//!   config show                                    - display current configuration

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::{Path, PathBuf};

use eclipse_core::config::EclipseConfig;
use eclipse_core::ids::TimestampIds;
use eclipse_core::policy::{ConflictPolicy, ImportStrategy, SearchEnginePolicy, SpaceNamePolicy};
use eclipse_core::section::SectionSet;
use eclipse_core::EclipseError;
use eclipse_storage::{DirectoryStore, OpendalTransport};
use eclipse_sync::{ImportOptions, ImportReport, PullOutcome, SyncOptions};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "eclipse",
    version,
    about = "Eclipse new-tab backup and sync",
    long_about = "eclipse: export, import and sync new-tab spaces, stickers and settings"
)]
struct Cli {
    /// Path to eclipse.toml configuration file
    #[arg(long, short = 'c', env = "ECLIPSE_CONFIG", default_value = "~/.config/eclipse/config.toml")]
    config: PathBuf,

    /// Log output format: text or json (overrides config)
    #[arg(long, env = "ECLIPSE_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a backup file of local state
    Export {
        /// Snapshot a single space instead of everything
        #[arg(long)]
        space: Option<String>,
        /// Encrypt with the backup password
        #[arg(long)]
        encrypt: bool,
        /// Output directory (default: current directory)
        #[arg(long, short = 'o', default_value = ".")]
        out: PathBuf,
    },

    /// Restore a backup file into local state
    Import {
        /// Backup file (.zip, .json or .enc.json)
        file: PathBuf,
        /// merge or overwrite (overrides config)
        #[arg(long)]
        strategy: Option<ImportStrategy>,
        /// Comma-separated sections: space, zenShelf, config, or all
        #[arg(long)]
        scope: Option<SectionSet>,
        #[command(flatten)]
        policy: PolicyArgs,
        /// Print what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Upload local state to the configured WebDAV file
    Push,

    /// Download the WebDAV file and import changed sections
    Pull {
        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Show which sections differ from the remote
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

#[derive(clap::Args, Debug, Default)]
struct PolicyArgs {
    /// keepBoth or keepLocal
    #[arg(long)]
    space_name_policy: Option<SpaceNamePolicy>,
    /// keepLocal or keepRemote
    #[arg(long)]
    search_engine_policy: Option<SearchEnginePolicy>,
}

impl PolicyArgs {
    fn resolve(&self, config: &EclipseConfig) -> ConflictPolicy {
        let base = config.merge.policy();
        ConflictPolicy {
            space_name: self.space_name_policy.unwrap_or(base.space_name),
            search_engine: self.search_engine_policy.unwrap_or(base.search_engine),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = EclipseConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let format = cli.log_format.as_deref().unwrap_or(&config.log.format);
    init_logging(&config.log.level, format);
    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "eclipse starting"
    );

    match cli.command {
        Commands::Export { space, encrypt, out } => {
            cmd_export(&config, space.as_deref(), encrypt, &out).await
        }
        Commands::Import { file, strategy, scope, policy, dry_run } => {
            cmd_import(&config, &file, strategy, scope, &policy, dry_run).await
        }
        Commands::Push => cmd_push(&config).await,
        Commands::Pull { policy } => cmd_pull(&config, &policy).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

fn open_store(config: &EclipseConfig) -> DirectoryStore {
    DirectoryStore::new(expand_tilde(&config.store.data_dir))
}

/// Read the backup password from `env_var`, prompting on the terminal when
/// `prompt` is set and the variable is empty.
fn backup_password(env_var: &str, prompt: bool) -> Result<Option<SecretString>> {
    if let Ok(value) = std::env::var(env_var) {
        if !value.is_empty() {
            return Ok(Some(SecretString::from(value)));
        }
    }
    if !prompt {
        return Ok(None);
    }
    let value = rpassword::prompt_password("Backup password: ").context("reading password")?;
    if value.is_empty() {
        anyhow::bail!("a backup password is required (set {env_var})");
    }
    Ok(Some(SecretString::from(value)))
}

fn open_transport(config: &EclipseConfig) -> Result<OpendalTransport> {
    if config.remote.endpoint.is_empty() {
        anyhow::bail!(
            "no remote configured\n\
             Set remote.endpoint in eclipse.toml (e.g. https://dav.example.com/remote.php/webdav)"
        );
    }
    let password = std::env::var(&config.remote.password_env)
        .ok()
        .filter(|v| !v.is_empty())
        .map(SecretString::from);
    let op = eclipse_storage::build_from_remote_config(&config.remote, password)
        .context("building WebDAV operator")?;
    Ok(OpendalTransport::new(op))
}

fn sync_options(config: &EclipseConfig, policy: ConflictPolicy, password: Option<SecretString>) -> SyncOptions {
    SyncOptions {
        remote_path: config.remote.file_name.clone(),
        password,
        import: ImportOptions {
            strategy: config.sync.strategy,
            scope: config.sync.import_scope,
            policy,
            now: Utc::now(),
        },
    }
}

fn print_report(report: &ImportReport) {
    println!("  strategy: {}", report.strategy);
    println!("  scope:    {}", report.scope);
    println!("  changes:  {}", report.preview.summary());
    for rename in &report.preview.space_renames {
        println!("  renamed:  {} → {}", rename.from, rename.to);
    }
    for name in &report.preview.skipped_spaces {
        println!("  skipped:  {name}");
    }
    for key in &report.preview.unreadable_entries {
        println!("  kept as is (unreadable): {key}");
    }
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ── `eclipse export` ──────────────────────────────────────────────────────────

async fn cmd_export(config: &EclipseConfig, space: Option<&str>, encrypt: bool, out: &Path) -> Result<()> {
    let store = open_store(config);
    let now = Utc::now();
    let package = match space {
        Some(id) => eclipse_sync::export_space_snapshot(&store, id, now)
            .await
            .with_context(|| format!("exporting space {id}"))?,
        None => eclipse_sync::export_full(&store, now)
            .await
            .context("exporting local state")?,
    };

    let password = if encrypt || config.sync.encrypt {
        backup_password(&config.sync.password_env, true)?
    } else {
        None
    };
    let file = eclipse_sync::write_backup_file(&package, password.as_ref())?;

    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("creating {}", out.display()))?;
    let path = out.join(&file.file_name);
    tokio::fs::write(&path, &file.bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;

    println!("Exported {}", path.display());
    println!("  kind:      {}", package.kind.as_str());
    println!("  encrypted: {}", password.is_some());
    println!("  size:      {}", fmt_bytes(file.bytes.len() as u64));
    Ok(())
}

// ── `eclipse import` ──────────────────────────────────────────────────────────

async fn cmd_import(
    config: &EclipseConfig,
    file: &Path,
    strategy: Option<ImportStrategy>,
    scope: Option<SectionSet>,
    policy: &PolicyArgs,
    dry_run: bool,
) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let env_password = backup_password(&config.sync.password_env, false)?;
    let package = match eclipse_sync::read_backup_file(&bytes, env_password.as_ref()) {
        Err(EclipseError::PasswordRequired) => {
            let password = backup_password(&config.sync.password_env, true)?;
            eclipse_sync::read_backup_file(&bytes, password.as_ref())
        }
        other => other,
    }
    .with_context(|| format!("opening backup {}", file.display()))?;

    let options = ImportOptions {
        strategy: strategy.unwrap_or(config.sync.strategy),
        scope: scope.unwrap_or(config.sync.import_scope),
        policy: policy.resolve(config),
        now: Utc::now(),
    };

    let store = open_store(config);
    let mut ids = TimestampIds;
    let report = if dry_run {
        println!("Dry run for {} (nothing written):", file.display());
        eclipse_sync::preview_import(&store, &package, &options, &mut ids).await?
    } else {
        println!("Importing {}:", file.display());
        eclipse_sync::import_package(&store, &package, &options, &mut ids)
            .await
            .context("import failed")?
    };
    print_report(&report);
    Ok(())
}

// ── `eclipse push` / `pull` / `status` ────────────────────────────────────────

async fn cmd_push(config: &EclipseConfig) -> Result<()> {
    let transport = open_transport(config)?;
    let store = open_store(config);
    let password = if config.sync.encrypt {
        backup_password(&config.sync.password_env, true)?
    } else {
        None
    };
    let options = sync_options(config, config.merge.policy(), password);

    let result = eclipse_sync::push(&transport, &store, &options)
        .await
        .context("push failed")?;
    println!("Pushed {} → {}{}", config.store.data_dir.display(), config.remote.endpoint, config.remote.root);
    println!("  file:      {}", result.remote_path);
    println!("  size:      {}", fmt_bytes(result.bytes as u64));
    println!("  encrypted: {}", result.encrypted);
    Ok(())
}

async fn cmd_pull(config: &EclipseConfig, policy: &PolicyArgs) -> Result<()> {
    let transport = open_transport(config)?;
    let store = open_store(config);
    let password = backup_password(&config.sync.password_env, config.sync.encrypt)?;
    let options = sync_options(config, policy.resolve(config), password);

    let outcome = eclipse_sync::pull(&transport, &store, &options, &mut TimestampIds)
        .await
        .context("pull failed")?;
    match outcome {
        PullOutcome::UpToDate => println!("Already up to date."),
        PullOutcome::Imported(report) => {
            println!("Pulled {}:", options.remote_path);
            print_report(&report);
        }
    }
    Ok(())
}

async fn cmd_status(config: &EclipseConfig) -> Result<()> {
    let transport = open_transport(config)?;
    let store = open_store(config);
    let password = backup_password(&config.sync.password_env, config.sync.encrypt)?;

    let status = eclipse_sync::status(&transport, &store, &config.remote.file_name, password.as_ref())
        .await
        .context("status failed")?;
    println!("Remote: {}{}/{}", config.remote.endpoint, config.remote.root, config.remote.file_name);
    if status.in_sync() {
        println!("  in sync");
    } else {
        println!("  changed: {}", status.changed);
    }
    Ok(())
}

// ── `eclipse config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &EclipseConfig, path: &Path) -> Result<()> {
    println!("# source: {}", path.display());
    let rendered = toml::to_string_pretty(config).context("rendering config")?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_import_flags() {
        let cli = Cli::try_parse_from([
            "eclipse",
            "import",
            "backup.zip",
            "--strategy",
            "overwrite",
            "--scope",
            "space,config",
            "--space-name-policy",
            "keepLocal",
            "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Commands::Import { strategy, scope, policy, dry_run, .. } => {
                assert_eq!(strategy, Some(ImportStrategy::Overwrite));
                assert_eq!(scope.unwrap().to_string(), "space,config");
                assert_eq!(policy.space_name_policy, Some(SpaceNamePolicy::KeepLocal));
                assert!(dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_policy_args_fall_back_to_config() {
        let mut config = EclipseConfig::default();
        config.merge.search_engine = SearchEnginePolicy::KeepRemote;
        let args = PolicyArgs {
            space_name_policy: Some(SpaceNamePolicy::KeepLocal),
            search_engine_policy: None,
        };
        let policy = args.resolve(&config);
        assert_eq!(policy.space_name, SpaceNamePolicy::KeepLocal);
        assert_eq!(policy.search_engine, SearchEnginePolicy::KeepRemote);
    }

    #[test]
    fn test_expand_tilde() {
        std::env::set_var("HOME", "/home/test");
        assert_eq!(expand_tilde(Path::new("~/x/y")), PathBuf::from("/home/test/x/y"));
        assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
