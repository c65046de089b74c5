use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use erddap_deploy::{
    ConfigCollection, DeployConfig, DeployError, MonitorSnapshot,
    MonitorSynchronizer, Reconciler, RuleSet, SaveSource, Secrets,
};

/// Exit status when `check` reports violations.
const EXIT_VIOLATIONS: u8 = 2;

/// Validate, reconcile and deploy ERDDAP datasets.xml configuration.
///
/// Settings are layered: built-in defaults, then the YAML file, then
/// ERDDAP_* environment variables, then command line options.
#[derive(Parser)]
#[command(name = "erddap-deploy")]
#[command(version, about, long_about = None)]
struct Cli {
    /// YAML settings file
    #[arg(long, global = true, env = "ERDDAP_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Glob expression(s) for the reference datasets.xml, `|`-separated
    #[arg(long, global = true, env = "ERDDAP_DATASETS_XML")]
    datasets_xml: Option<String>,

    /// Path to the active datasets.xml used by ERDDAP
    #[arg(long, global = true, env = "ERDDAP_ACTIVE_DATASETS_XML")]
    active_datasets_xml: Option<PathBuf>,

    /// ERDDAP bigParentDirectory
    #[arg(long, global = true, env = "bigParentDirectory")]
    big_parent_directory: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync the reference repository and update the active datasets.xml
    Sync(SyncArgs),

    /// Write the reference datasets.xml with secrets applied
    Save(SaveArgs),

    /// Validate datasets.xml and print a JSON report
    Check(CheckArgs),

    /// Preview monitor changes against an exported monitor snapshot
    Monitor(MonitorArgs),
}

#[derive(Args)]
struct SyncArgs {
    /// Git repository to clone the reference configuration from
    #[arg(short, long, env = "ERDDAP_DATASETS_REPO")]
    repo: Option<String>,

    /// Branch to check out
    #[arg(short, long, env = "ERDDAP_DATASETS_REPO_BRANCH")]
    branch: Option<String>,

    /// Pull from the remote before loading
    #[arg(long)]
    pull: bool,

    /// Where the repository is cloned
    #[arg(short = 'p', long, env = "ERDDAP_DATASETS_REPO_DIR")]
    local_repo_path: Option<PathBuf>,

    /// Write a hard flag for every changed dataset
    #[arg(short = 'f', long)]
    hard_flag: bool,

    /// Directory receiving hard flags; may contain {bigParentDirectory}
    #[arg(long, env = "ERDDAP_HARD_FLAG_DIR")]
    hard_flag_dir: Option<String>,
}

#[derive(Args)]
struct SaveArgs {
    /// Output file, defaults to the active datasets.xml
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct CheckArgs {
    /// Only run rules whose name contains this keyword (`not <keyword>` inverts)
    #[arg(short = 'k', long, env = "ERDDAP_TEST_FILTER")]
    test_filter: Option<String>,

    /// Validate the active datasets.xml instead of the reference one
    #[arg(long)]
    active: bool,
}

#[derive(Args)]
struct MonitorArgs {
    /// JSON export of the monitoring service (`monitors` and `statusPages`)
    #[arg(long)]
    snapshot: PathBuf,

    /// Public URL of the ERDDAP server
    #[arg(long, env = "ERDDAP_URL")]
    erddap_url: Option<String>,

    /// Instance name used as monitor group and path prefix
    #[arg(long)]
    erddap_name: Option<String>,

    /// Status page slug
    #[arg(long)]
    status_page_slug: Option<String>,

    /// Delete monitors that no longer match a dataset
    #[arg(long)]
    prune: bool,

    /// Read datasets from the active datasets.xml instead of the reference one
    #[arg(long)]
    active: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        // Route `log` records from the library into tracing.
        let _ = tracing_log::LogTracer::init();
    }
}

fn run(cli: Cli) -> erddap_deploy::Result<ExitCode> {
    let mut config = DeployConfig::from_sources(cli.config.as_deref(), std::env::vars())?;
    if let Some(datasets_xml) = cli.datasets_xml {
        config.datasets_xml = datasets_xml;
    }
    if let Some(active) = cli.active_datasets_xml {
        config.active_datasets_xml = active;
    }
    if let Some(dir) = cli.big_parent_directory {
        config.big_parent_directory = dir;
    }
    log_erddap_env();
    let secrets = config.load_secrets(std::env::vars())?;
    log::info!(
        "Load datasets.xml={} recursive={}",
        config.datasets_xml,
        config.recursive
    );

    match cli.command {
        Commands::Sync(args) => sync(config, secrets, args),
        Commands::Save(args) => save(config, secrets, args),
        Commands::Check(args) => check(config, secrets, args),
        Commands::Monitor(args) => monitor(config, secrets, args),
    }
}

fn sync(mut config: DeployConfig, secrets: Secrets, args: SyncArgs) -> erddap_deploy::Result<ExitCode> {
    if let Some(repo) = args.repo.filter(|r| !r.trim().is_empty()) {
        config.repository.repo = Some(repo);
    }
    if let Some(branch) = args.branch.filter(|b| !b.trim().is_empty()) {
        config.repository.branch = Some(branch);
    }
    if let Some(path) = args.local_repo_path {
        config.repository.local_repo_path = path;
    }
    if let Some(dir) = args.hard_flag_dir {
        config.hard_flag_dir = dir;
    }
    config.repository.pull |= args.pull;
    config.hard_flag |= args.hard_flag;

    let report = Reconciler::from_config(&config, secrets).run()?;
    if report.diff.is_empty() {
        log::info!("Active datasets.xml is up to date");
    } else {
        log::info!("Active datasets.xml has been updated:\n{}", report.diff);
    }
    Ok(ExitCode::SUCCESS)
}

fn save(config: DeployConfig, secrets: Secrets, args: SaveArgs) -> erddap_deploy::Result<ExitCode> {
    let collection = ConfigCollection::open(
        config.datasets_xml.clone(),
        secrets,
        config.collection_options(),
    )?;
    collection.ensure_unique_ids()?;
    let output = args
        .output
        .unwrap_or_else(|| config.active_datasets_xml.clone());
    if !collection.save(&output, SaveSource::Original, None)? {
        return Err(DeployError::NoReferenceConfig(config.datasets_xml));
    }
    Ok(ExitCode::SUCCESS)
}

fn check(config: DeployConfig, secrets: Secrets, args: CheckArgs) -> erddap_deploy::Result<ExitCode> {
    let collection = open_datasets(&config, secrets, args.active || config.check_active)?;
    let mut rules = RuleSet::new(config.rules.clone());
    if let Some(filter) = args.test_filter {
        rules = rules.with_filter(filter);
    }

    let report = rules.validate(&collection);
    for violation in &report.violations {
        log::warn!("{}", violation);
    }
    print_json(&report)?;
    if report.is_ok() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_VIOLATIONS))
    }
}

fn monitor(config: DeployConfig, secrets: Secrets, args: MonitorArgs) -> erddap_deploy::Result<ExitCode> {
    let mut settings = config.monitor.clone();
    if let Some(url) = args.erddap_url {
        settings.erddap_url = url;
    }
    if args.erddap_name.is_some() {
        settings.erddap_name = args.erddap_name;
    }
    if args.status_page_slug.is_some() {
        settings.status_page_slug = args.status_page_slug;
    }
    settings.prune |= args.prune;
    // A snapshot cannot be written back.
    settings.dry_run = true;

    let collection = open_datasets(&config, secrets, args.active)?;
    let snapshot = MonitorSnapshot::from_file(&args.snapshot)?;
    log::info!(
        "Planning monitors against {} ({} monitors)",
        args.snapshot.display(),
        snapshot.monitors.len()
    );
    let report = MonitorSynchronizer::new(snapshot, &settings)?.sync(collection.datasets())?;
    print_json(&report)?;
    Ok(ExitCode::SUCCESS)
}

/// Loads the reference datasets, or the active datasets.xml when `active` is set.
fn open_datasets(
    config: &DeployConfig,
    secrets: Secrets,
    active: bool,
) -> erddap_deploy::Result<ConfigCollection> {
    if active {
        ConfigCollection::open_file(
            &config.active_datasets_xml,
            secrets,
            config.active_collection_options(),
        )
    } else {
        ConfigCollection::open(
            config.datasets_xml.clone(),
            secrets,
            config.collection_options(),
        )
    }
}

fn print_json<T: Serialize>(value: &T) -> erddap_deploy::Result<()> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| DeployError::Config(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

/// Logs `ERDDAP*` variables at debug level with sensitive values masked.
fn log_erddap_env() {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    for (key, value) in std::env::vars().filter(|(k, _)| k.contains("ERDDAP")) {
        let lower = key.to_lowercase();
        let sensitive = ["secret", "token", "password"]
            .iter()
            .any(|s| lower.contains(s));
        let shown = if sensitive {
            format!("{}***", value.chars().take(3).collect::<String>())
        } else {
            value
        };
        log::debug!("{}={}", key, shown);
    }
}
