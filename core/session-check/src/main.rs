//! session-check: inspect the persisted session store and watch the sync core.
//!
//! ## Subcommands
//!
//! - `inspect`: Stored session validity and every cached profile
//! - `clear`: Wipes the store (same effect as "Clear data & reload")
//! - `simulate`: Runs the core against a scripted backend and prints each snapshot

mod logging;
mod scripted;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use session_core::{
    read_stored_session, Collaborators, CoreSnapshot, FileStore, KeyValueStore, MemoryStore,
    ProfileCache, SessionCore, StorageConfig, SyncConfig, SyncError, SystemClock,
};
use tokio::time::Instant;

use scripted::{PrintNavigator, Script, ScriptedBackend};

#[derive(Parser)]
#[command(name = "session-check")]
#[command(about = "Membership session store inspector and sync simulator")]
#[command(version)]
struct Cli {
    /// Store file (defaults to ~/.membership/store.json)
    #[arg(long, global = true, value_name = "PATH")]
    store: Option<PathBuf>,

    /// Sync config file (defaults to ~/.membership/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the stored session and cached profiles
    Inspect,

    /// Remove every entry from the store
    Clear,

    /// Drive the sync core against a scripted backend
    Simulate {
        /// Member id the scripted backend signs in
        #[arg(long, default_value = "demo-member")]
        user: String,

        /// Latency of the explicit session fetch
        #[arg(long, default_value_t = 200)]
        session_latency_ms: u64,

        /// Latency of the initial auth event (omit for "never")
        #[arg(long)]
        event_latency_ms: Option<u64>,

        /// Latency of each profile fetch
        #[arg(long, default_value_t = 500)]
        profile_latency_ms: u64,

        /// Profile fetches that fail before one succeeds
        #[arg(long, default_value_t = 0)]
        profile_failures: u32,

        /// Make the organization fetch fail
        #[arg(long)]
        org_fails: bool,

        /// Use the store file instead of an in-memory store
        #[arg(long)]
        persist: bool,
    },
}

#[tokio::main]
async fn main() {
    logging::init();
    let cli = Cli::parse();

    let storage = StorageConfig::from_home();
    let config_path = cli
        .config
        .clone()
        .or_else(|| storage.as_ref().map(StorageConfig::config_file));
    let config = config_path
        .as_deref()
        .map(SyncConfig::load)
        .unwrap_or_default();
    let store_path = cli
        .store
        .clone()
        .or_else(|| storage.as_ref().map(StorageConfig::store_file));

    let result = match cli.command {
        Commands::Inspect => require_store(store_path).and_then(|path| inspect(&path, &config)),
        Commands::Clear => require_store(store_path).and_then(|path| clear(&path)),
        Commands::Simulate {
            user,
            session_latency_ms,
            event_latency_ms,
            profile_latency_ms,
            profile_failures,
            org_fails,
            persist,
        } => {
            let script = Script {
                user,
                session_latency: Duration::from_millis(session_latency_ms),
                event_latency: event_latency_ms.map(Duration::from_millis),
                profile_latency: Duration::from_millis(profile_latency_ms),
                profile_failures,
                organization_fails: org_fails,
            };
            let store = if persist { store_path } else { None };
            simulate(script, config, store).await
        }
    };

    if let Err(err) = result {
        tracing::error!(error = %err, "session-check failed");
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn require_store(path: Option<PathBuf>) -> Result<PathBuf, SyncError> {
    path.ok_or_else(|| SyncError::Store {
        context: "resolving store path".to_string(),
        details: "home directory not found; pass --store".to_string(),
    })
}

fn banner(title: &str) {
    println!("═══════════════════════════════════════════════════════════");
    println!("  {}", title);
    println!("═══════════════════════════════════════════════════════════");
    println!();
}

fn inspect(path: &Path, config: &SyncConfig) -> Result<(), SyncError> {
    let store = Arc::new(FileStore::open(path)?);
    banner("Membership Session Check - Store Inspection");
    println!("Store file: {}", path.display());
    println!("Entries: {}", store.keys().len());
    println!();

    println!("── Stored Session ────────────────────────────────────────");
    match read_stored_session(store.as_ref(), config, Utc::now()) {
        Some(session) => {
            let expiry = session
                .expires_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            println!("  ✓ VALID   user {} (expires {})", session.user_id, expiry);
        }
        None => {
            let candidates = store
                .keys()
                .into_iter()
                .filter(|key| {
                    key.starts_with(&config.session_key_prefix)
                        && key.ends_with(&config.session_key_suffix)
                })
                .count();
            if candidates > 0 {
                println!("  ✗ {} session entr(y/ies), none valid (expired or unreadable)", candidates);
            } else {
                println!("  (no stored session)");
            }
        }
    }
    println!();

    println!("── Profile Cache ─────────────────────────────────────────");
    let store_handle: Arc<dyn KeyValueStore> = store;
    let cache = ProfileCache::new(store_handle, config.profile_cache_prefix.clone());
    let entries = cache.entries();
    if entries.is_empty() {
        println!("  (no cached profiles)");
    }
    for entry in entries {
        let name = entry.profile.display_name.as_deref().unwrap_or("?");
        let organization = entry
            .organization
            .as_ref()
            .map(|org| org.name.as_str())
            .unwrap_or("-");
        println!(
            "  {} → {} (org: {}, cached {})",
            entry.user_id,
            name,
            organization,
            entry.cached_at.to_rfc3339()
        );
    }
    Ok(())
}

fn clear(path: &Path) -> Result<(), SyncError> {
    let store = FileStore::open(path)?;
    let count = store.keys().len();
    store.clear_all()?;
    println!("Removed {} entr(y/ies) from {}", count, path.display());
    Ok(())
}

async fn simulate(
    script: Script,
    config: SyncConfig,
    store_path: Option<PathBuf>,
) -> Result<(), SyncError> {
    let store: Arc<dyn KeyValueStore> = match &store_path {
        Some(path) => Arc::new(FileStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    };
    let backend = Arc::new(ScriptedBackend::new(script.clone()));
    let collaborators = Collaborators {
        auth: backend.clone(),
        profiles: backend,
        store,
        clock: Arc::new(SystemClock),
        navigator: Arc::new(PrintNavigator),
    };

    banner("Membership Session Check - Sync Simulation");
    println!(
        "session fetch {}ms, auth event {}, profile {}ms, {} profile failure(s), org {}",
        script.session_latency.as_millis(),
        script
            .event_latency
            .map(|d| format!("{}ms", d.as_millis()))
            .unwrap_or_else(|| "never".to_string()),
        script.profile_latency.as_millis(),
        script.profile_failures,
        if script.organization_fails { "fails" } else { "ok" },
    );
    println!();

    let deadline_after = worst_case(&config);
    let core = SessionCore::new(collaborators, config);
    let mut updates = core.subscribe();
    let started = Instant::now();
    let deadline = started + deadline_after;
    core.start();

    let mut last: Option<CoreSnapshot> = None;
    loop {
        let snapshot = updates.current();
        if last.as_ref() != Some(&snapshot) {
            print_snapshot(started.elapsed(), &snapshot);
            last = Some(snapshot.clone());
        }
        if is_settled(&snapshot) {
            break;
        }
        match tokio::time::timeout_at(deadline, updates.changed()).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(_) => {
                println!("  (gave up waiting after {}ms)", deadline_after.as_millis());
                break;
            }
        }
    }

    // Let a trailing organization fetch land before the summary.
    tokio::time::sleep(script.profile_latency).await;
    let snapshot = core.snapshot();
    if last.as_ref() != Some(&snapshot) {
        print_snapshot(started.elapsed(), &snapshot);
    }
    core.shutdown();

    println!();
    println!("── Summary ───────────────────────────────────────────────");
    println!("  session:      {}", describe_session(&snapshot));
    println!(
        "  profile:      {}",
        snapshot
            .profile
            .as_ref()
            .and_then(|p| p.display_name.clone())
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "  organization: {}",
        snapshot
            .organization
            .as_ref()
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "-".to_string())
    );
    if let Some(err) = &snapshot.data_error {
        println!("  data error:   {}", err);
    }
    Ok(())
}

/// Longest the core can take to settle: the failsafe plus every profile attempt.
fn worst_case(config: &SyncConfig) -> Duration {
    let attempts = config.max_retries + 1;
    let delays: Duration = (0..config.max_retries as usize)
        .map(|index| {
            let delays = config.retry_delays();
            let clamped = index.min(delays.len().saturating_sub(1));
            delays.get(clamped).copied().unwrap_or(Duration::ZERO)
        })
        .sum();
    config.failsafe_timeout() + config.user_data_timeout() * attempts + delays + Duration::from_secs(1)
}

fn is_settled(snapshot: &CoreSnapshot) -> bool {
    if snapshot.loading || snapshot.data_loading {
        return false;
    }
    snapshot.session.is_none() || snapshot.profile_confirmed || snapshot.data_error.is_some()
}

fn describe_session(snapshot: &CoreSnapshot) -> String {
    match (&snapshot.session, snapshot.session_timed_out) {
        (_, true) => "timed out (retry or clear data)".to_string(),
        (Some(session), false) => format!("signed in as {}", session.user_id),
        (None, false) => "signed out".to_string(),
    }
}

fn print_snapshot(elapsed: Duration, snapshot: &CoreSnapshot) {
    let flag = |on: bool| if on { "✓" } else { "·" };
    println!(
        "[{:>6}ms] loading {}  timed-out {}  data-loading {}  data-timed-out {}  confirmed {}  user {}{}",
        elapsed.as_millis(),
        flag(snapshot.loading),
        flag(snapshot.session_timed_out),
        flag(snapshot.data_loading),
        flag(snapshot.data_timed_out),
        flag(snapshot.profile_confirmed),
        snapshot
            .session
            .as_ref()
            .map(|s| s.user_id.to_string())
            .unwrap_or_else(|| "-".to_string()),
        snapshot
            .data_error
            .as_ref()
            .map(|err| format!("  error: {}", err))
            .unwrap_or_default(),
    );
}
