use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use argus_client::ReqwestFetcher;
use argus_core::controller::JobController;
use argus_core::history::{HistoryStore, MemoryHistoryStore};
use argus_core::job::{CreateScanJobRequest, JobStatus, WorkerConfig};
use argus_core::job_store::{JobStore, MemoryJobStore};
use argus_core::link::{LinkRecord, LinkStatus};
use argus_core::worker::{TracingWorkerReporter, WorkerService};
use argus_core::{AuthConfig, ScanConfig, recheck_url};
use argus_store::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "argus", version, about = "Website link auditor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a site and report broken links
    Scan {
        /// Seed URL to start from
        url: String,

        /// Maximum hops from the seed (0 = seed page only)
        #[arg(short, long, default_value_t = 3)]
        depth: u32,

        /// Maximum simultaneous requests (1-50)
        #[arg(short, long, default_value_t = 10)]
        concurrency: usize,

        /// Per-request timeout in milliseconds
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,

        /// Check every occurrence of a link instead of once per unique URL
        #[arg(long)]
        recheck_each_occurrence: bool,

        /// Literal URL to exclude (repeatable)
        #[arg(long = "exclude-url")]
        excluded_urls: Vec<String>,

        /// Regex exclusion pattern (repeatable)
        #[arg(long = "exclude-regex")]
        regex_exclusions: Vec<String>,

        /// Wildcard exclusion pattern, `*`/`?` globs (repeatable)
        #[arg(long = "exclude-wildcard")]
        wildcard_exclusions: Vec<String>,

        /// CSS selector marking excluded subtrees (repeatable)
        #[arg(long = "exclude-selector")]
        css_selectors: Vec<String>,

        /// Blacklist URLs seen inside excluded subtrees scan-wide
        #[arg(long)]
        force_exclude_css: bool,

        /// Crawl external hosts instead of marking them `external`
        #[arg(long)]
        follow_external: bool,

        /// Treat subdomains of the seed host as external
        #[arg(long)]
        exclude_subdomains: bool,

        /// Basic-Auth username
        #[arg(long, env = "ARGUS_AUTH_USER")]
        auth_user: Option<String>,

        /// Basic-Auth password
        #[arg(long, env = "ARGUS_AUTH_PASS", hide_env_values = true)]
        auth_pass: Option<String>,

        /// Attach credentials to every host, not only the seed host
        #[arg(long)]
        auth_all_domains: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Save the finished scan to history (requires DATABASE_URL)
        #[arg(long)]
        save: bool,
    },

    /// Re-verify a single URL from an earlier scan
    Recheck {
        /// URL to check
        url: String,

        /// Seed URL of the original scan (drives domain-scoped auth)
        #[arg(long)]
        scan_url: String,

        /// Per-request timeout in milliseconds
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,

        /// Basic-Auth username
        #[arg(long, env = "ARGUS_AUTH_USER")]
        auth_user: Option<String>,

        /// Basic-Auth password
        #[arg(long, env = "ARGUS_AUTH_PASS", hide_env_values = true)]
        auth_pass: Option<String>,

        /// Attach credentials to every host, not only the scan host
        #[arg(long)]
        auth_all_domains: bool,

        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Process queued scan jobs until interrupted (requires DATABASE_URL)
    Worker {
        /// Seconds to sleep between queue polls
        #[arg(long, default_value_t = 5)]
        poll_interval_secs: u64,

        /// Stable worker id (defaults to a random one)
        #[arg(long)]
        worker_id: Option<String>,
    },

    /// Show recent scans (requires DATABASE_URL)
    History {
        /// Number of scans to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("argus=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            url,
            depth,
            concurrency,
            timeout_ms,
            recheck_each_occurrence,
            excluded_urls,
            regex_exclusions,
            wildcard_exclusions,
            css_selectors,
            force_exclude_css,
            follow_external,
            exclude_subdomains,
            auth_user,
            auth_pass,
            auth_all_domains,
            json,
            save,
        } => {
            let config = ScanConfig {
                depth,
                concurrency,
                request_timeout_ms: timeout_ms,
                scan_same_link_once: !recheck_each_occurrence,
                excluded_urls,
                regex_exclusions,
                wildcard_exclusions,
                css_selectors,
                css_selectors_force_exclude: force_exclude_css,
                skip_external_domains: !follow_external,
                exclude_subdomains,
                auth: auth_config(auth_user, auth_pass),
                use_auth_for_all_domains: auth_all_domains,
            };
            if save {
                let db = connect_db().await?;
                cmd_scan(&url, config, db.history_store(), json).await?;
            } else {
                cmd_scan(&url, config, MemoryHistoryStore::new(), json).await?;
            }
        }
        Commands::Recheck {
            url,
            scan_url,
            timeout_ms,
            auth_user,
            auth_pass,
            auth_all_domains,
            json,
        } => {
            let config = ScanConfig {
                request_timeout_ms: timeout_ms,
                auth: auth_config(auth_user, auth_pass),
                use_auth_for_all_domains: auth_all_domains,
                ..Default::default()
            };
            cmd_recheck(&url, &scan_url, config, json).await?;
        }
        Commands::Worker {
            poll_interval_secs,
            worker_id,
        } => {
            cmd_worker(poll_interval_secs, worker_id).await?;
        }
        Commands::History { limit } => {
            let db = connect_db().await?;
            cmd_history(limit, &db.history_store()).await?;
        }
    }

    Ok(())
}

fn auth_config(username: Option<String>, password: Option<String>) -> Option<AuthConfig> {
    match (username, password) {
        (Some(username), Some(password)) => Some(AuthConfig { username, password }),
        _ => None,
    }
}

/// Connect to PostgreSQL using DATABASE_URL and run migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env()
        .context("DATABASE_URL not set. Required for --save, worker and history commands.")?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(db)
}

async fn cmd_scan<H: HistoryStore + 'static>(
    url: &str,
    config: ScanConfig,
    history: H,
    json: bool,
) -> Result<()> {
    let fetcher = ReqwestFetcher::new()
        .map_err(|e| anyhow::anyhow!(e))?
        .allow_private_urls();
    let store = MemoryJobStore::new();

    store
        .create_job(CreateScanJobRequest::new(url, config))
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    let job = store
        .claim_pending_job("argus-cli")
        .await
        .map_err(|e| anyhow::anyhow!(e))?
        .context("freshly created job disappeared from the in-memory store")?;

    // Ctrl-C suspends the scan like a pause; partial results are printed.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received; finishing in-flight checks");
            signal_cancel.cancel();
        }
    });

    let controller = JobController::new(store.clone(), history, fetcher);
    let outcome = controller
        .run(&job, &cancel)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    if outcome.status == JobStatus::Paused {
        eprintln!("Scan interrupted; showing partial results.");
    }
    print_records(&outcome.results, json)?;

    let broken = outcome.results.iter().filter(|r| r.is_broken()).count();
    if broken > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_recheck(url: &str, scan_url: &str, config: ScanConfig, json: bool) -> Result<()> {
    let fetcher = ReqwestFetcher::new()
        .map_err(|e| anyhow::anyhow!(e))?
        .allow_private_urls();
    let record = recheck_url(&fetcher, url, &config, scan_url)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!(
            "{:8} {:>4} {}",
            record.status.to_string(),
            record
                .status_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".into()),
            record.url
        );
        if let Some(error) = &record.error_message {
            println!("         {error}");
        }
        println!("         auth: {}", record.auth_decision);
    }

    if record.is_broken() {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_worker(poll_interval_secs: u64, worker_id: Option<String>) -> Result<()> {
    let db = connect_db().await?;
    let fetcher = ReqwestFetcher::new().map_err(|e| anyhow::anyhow!(e))?;

    let mut config =
        WorkerConfig::default().with_poll_interval(std::time::Duration::from_secs(poll_interval_secs));
    if let Some(id) = worker_id {
        config = config.with_worker_id(id);
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received; worker shutting down");
            signal_cancel.cancel();
        }
    });

    let worker = WorkerService::new(db.job_store(), db.history_store(), fetcher, config);
    worker
        .run(cancel, &TracingWorkerReporter)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}

async fn cmd_history<H: HistoryStore>(limit: usize, history: &H) -> Result<()> {
    let scans = history.list(limit).await.map_err(|e| anyhow::anyhow!(e))?;
    if scans.is_empty() {
        println!("No scans recorded.");
        return Ok(());
    }
    for scan in scans {
        println!(
            "{}  {}  {} links, {} broken, {}s",
            scan.id,
            scan.scan_date.format("%Y-%m-%d %H:%M:%S"),
            scan.total_count,
            scan.broken_count,
            scan.duration_seconds,
        );
        println!("    {}", scan.scan_url);
    }
    Ok(())
}

fn print_records(records: &[LinkRecord], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }

    let broken: Vec<_> = records
        .iter()
        .filter(|r| matches!(r.status, LinkStatus::Broken | LinkStatus::Error))
        .collect();

    println!(
        "{} links checked: {} ok, {} broken, {} errors, {} external, {} skipped",
        records.len(),
        records.iter().filter(|r| r.status == LinkStatus::Ok).count(),
        records.iter().filter(|r| r.status == LinkStatus::Broken).count(),
        records.iter().filter(|r| r.status == LinkStatus::Error).count(),
        records.iter().filter(|r| r.status == LinkStatus::External).count(),
        records.iter().filter(|r| r.status == LinkStatus::Skipped).count(),
    );

    for record in broken {
        let detail = match (record.status_code, &record.error_message) {
            (Some(code), _) => code.to_string(),
            (None, Some(error)) => error.clone(),
            (None, None) => "-".into(),
        };
        println!("\n  [{}] {} ({detail})", record.status, record.url);
        for page in &record.found_on {
            println!("      found on: {page}");
        }
    }
    Ok(())
}
