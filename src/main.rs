//! Studio routing CLI
//!
//! Entry point for the `studio-routing` command-line tool.

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use studio_overrides::Provenance;
use studio_routing::config::{ConfigError, EffectiveSettings, PROJECT_CONFIG_FILE};
use studio_routing::routing::{
    apply_routes, check_exclusivity, compute_active_routes, filter_disabled_players,
    find_disabled_members, MappingsTable, PlayerId, RouteSetBehavior,
};
use studio_routing::{ActivationError, FsStore, OwnerLocks, RouteSetController, StoreError};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "studio-routing")]
#[command(about = "Route-set activation and layer routing", version)]
struct Cli {
    /// Project config file (default: ./studio-routing.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Directory of owner documents
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Owner lock timeout in milliseconds
    #[arg(long, global = true)]
    lock_timeout_ms: Option<u64>,

    /// Log filter directive (RUST_LOG wins when set)
    #[arg(long, global = true)]
    log_filter: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an owner's document from a JSON object of route sets
    Init {
        owner: String,
        /// JSON file holding the route-set defaults keyed by id
        defaults: PathBuf,
    },

    /// List route sets with their override provenance
    Show {
        owner: String,
        /// Include HIDDEN route sets
        #[arg(long)]
        all: bool,
    },

    /// Print the active routes, or the routed mapping table
    Routes {
        owner: String,
        /// JSON file of input layer mappings to route
        #[arg(long)]
        mappings: Option<PathBuf>,
    },

    /// Activate a route set, deactivating its group siblings
    Activate { owner: String, route_set: String },

    /// Deactivate a route set
    Deactivate { owner: String, route_set: String },

    /// Restore default activation states
    Reset { owner: String },

    /// Report exclusivity groups with more than one active member
    Check { owner: String },

    /// Filter pool players by route-set membership
    Pools {
        owner: String,
        pool: String,
        players: Vec<String>,
    },

    /// Show the effective settings and their sources
    Config,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Activation(#[from] ActivationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{path}: {message}")]
    Input { path: PathBuf, message: String },

    #[error("{0} exclusivity group(s) have more than one active route set")]
    Conflicts(usize),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Activation(ActivationError::NotFound { .. })
            | CliError::Activation(ActivationError::PolicyViolation { .. })
            | CliError::Store(StoreError::NotFound { .. })
            | CliError::Conflicts(_) => 1,
            CliError::Config(_) | CliError::Input { .. } => 2,
            CliError::Activation(_) | CliError::Store(_) => 3,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let effective = match load_settings(&cli) {
        Ok(effective) => effective,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(2);
        }
    };
    init_tracing(&effective.settings.log.filter);

    if let Err(e) = run(cli, &effective) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn init_tracing(configured: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(cli: &Cli) -> Result<EffectiveSettings, ConfigError> {
    let mut overrides = serde_json::Map::new();
    if let Some(dir) = &cli.store_dir {
        overrides.insert("store".into(), json!({ "dir": dir }));
    }
    if let Some(timeout_ms) = cli.lock_timeout_ms {
        overrides.insert("lock".into(), json!({ "timeout_ms": timeout_ms }));
    }
    if let Some(filter) = &cli.log_filter {
        overrides.insert("log".into(), json!({ "filter": filter }));
    }

    let project = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    if cli.config.is_some() && !project.exists() {
        return Err(ConfigError::IoError(format!(
            "{}: config file not found",
            project.display()
        )));
    }

    EffectiveSettings::build(
        EffectiveSettings::default_host_config_path().as_deref(),
        Some(&project),
        Some(Value::Object(overrides)),
    )
}

fn run(cli: Cli, effective: &EffectiveSettings) -> Result<(), CliError> {
    let store = FsStore::new(&effective.settings.store.dir);
    let controller = RouteSetController::new(
        store,
        OwnerLocks::new(effective.lock_timeout(), effective.lock_warn_after()),
    );
    let json_output = cli.json;

    match cli.command {
        Commands::Init { owner, defaults: path } => {
            let defaults = read_json(&path)?;
            if !defaults.is_object() {
                return Err(CliError::Input {
                    path,
                    message: "route-set defaults must be a JSON object keyed by id".to_string(),
                });
            }
            let stored = controller.store().init(&owner, defaults)?;
            let count = stored.defaults.as_object().map_or(0, |m| m.len());
            emit(json_output, &json!({ "owner": owner, "routeSets": count }), || {
                format!("Initialized {} with {} route set(s)", owner, count)
            });
        }

        Commands::Show { owner, all } => {
            let route_sets: Vec<_> = controller
                .route_sets(&owner)?
                .into_iter()
                .filter(|item| {
                    all || item
                        .computed
                        .as_ref()
                        .map_or(true, |set| set.behavior != RouteSetBehavior::Hidden)
                })
                .collect();
            let rows: Vec<Value> = route_sets
                .iter()
                .map(|item| {
                    let set = item.computed.as_ref();
                    json!({
                        "id": item.id,
                        "name": set.map(|s| s.name.as_str()),
                        "active": set.map(|s| s.active),
                        "behavior": set.map(|s| s.behavior),
                        "exclusivityGroup": set.and_then(|s| s.group()),
                        "provenance": item.provenance(),
                        "overrideOps": item.override_ops.len(),
                    })
                })
                .collect();
            emit(json_output, &rows, || {
                let mut out = String::new();
                for (row, item) in rows.iter().zip(route_sets.iter()) {
                    let state = match (item.provenance(), row["active"].as_bool()) {
                        (Provenance::Deleted, _) => "deleted",
                        (_, Some(true)) => "active",
                        _ => "inactive",
                    };
                    out.push_str(&format!(
                        "{:<20} {:<9} {:<14} {}\n",
                        item.id,
                        state,
                        row["exclusivityGroup"].as_str().unwrap_or("-"),
                        row["provenance"].as_str().unwrap_or("-"),
                    ));
                }
                out.trim_end().to_string()
            });
        }

        Commands::Routes { owner, mappings } => {
            let route_sets = controller.route_sets(&owner)?;
            let routes = compute_active_routes(&route_sets);
            match mappings {
                Some(path) => {
                    let input: MappingsTable = serde_json::from_value(read_json(&path)?)
                        .map_err(|e| CliError::Input {
                            path: path.clone(),
                            message: e.to_string(),
                        })?;
                    let output = apply_routes(&input, &routes);
                    emit(json_output, &output, || {
                        output
                            .iter()
                            .map(|(layer, mapping)| {
                                format!(
                                    "{:<20} {} {}",
                                    layer,
                                    mapping.device.as_deref().unwrap_or("-"),
                                    mapping.device_id.as_deref().unwrap_or("-")
                                )
                            })
                            .collect::<Vec<_>>()
                            .join("\n")
                    });
                }
                None => emit(json_output, &routes, || {
                    let mut lines: Vec<String> = routes
                        .existing
                        .iter()
                        .flat_map(|(layer, list)| {
                            list.iter().map(move |route| {
                                format!("{} -> {}", layer, route.output_layer().unwrap_or("-"))
                            })
                        })
                        .collect();
                    lines.extend(
                        routes
                            .inserted
                            .iter()
                            .map(|route| {
                                format!("(new) -> {}", route.output_layer().unwrap_or("-"))
                            }),
                    );
                    lines.join("\n")
                }),
            }
        }

        Commands::Activate { owner, route_set } => {
            let outcome = controller.set_route_set_active(&owner, &route_set, true)?;
            emit(json_output, &outcome, || {
                if outcome.deactivated.is_empty() {
                    format!("Activated {}", outcome.route_set_id)
                } else {
                    format!(
                        "Activated {} (deactivated {})",
                        outcome.route_set_id,
                        outcome.deactivated.join(", ")
                    )
                }
            });
        }

        Commands::Deactivate { owner, route_set } => {
            let outcome = controller.set_route_set_active(&owner, &route_set, false)?;
            emit(json_output, &outcome, || format!("Deactivated {}", outcome.route_set_id));
        }

        Commands::Reset { owner } => {
            let outcome = controller.reset_route_sets(&owner)?;
            emit(json_output, &outcome, || {
                format!(
                    "Reset {}: {} activated, {} deactivated",
                    owner,
                    outcome.activated.len(),
                    outcome.deactivated.len()
                )
            });
        }

        Commands::Check { owner } => {
            let conflicts = check_exclusivity(&controller.route_sets(&owner)?);
            emit(json_output, &conflicts, || {
                if conflicts.is_empty() {
                    "OK: every exclusivity group has at most one active route set".to_string()
                } else {
                    conflicts
                        .iter()
                        .map(|c| format!("group {}: {}", c.group, c.active.join(", ")))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            });
            if !conflicts.is_empty() {
                return Err(CliError::Conflicts(conflicts.len()));
            }
        }

        Commands::Pools { owner, pool, players } => {
            let members = find_disabled_members(&controller.route_sets(&owner)?);
            let players: Vec<PlayerId> = players
                .iter()
                .filter_map(|p| p.parse().ok())
                .collect();
            let enabled = filter_disabled_players(&pool, players, &members);
            emit(json_output, &enabled, || {
                enabled.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
            });
        }

        Commands::Config => {
            emit(json_output, effective, || {
                let mut out = format!(
                    "store.dir = {}\nlock.timeout_ms = {}\nlock.warn_after_ms = {}\nlog.filter = {}\n",
                    effective.settings.store.dir.display(),
                    effective.settings.lock.timeout_ms,
                    effective.settings.lock.warn_after_ms,
                    effective.settings.log.filter,
                );
                for source in &effective.sources {
                    out.push_str(&format!(
                        "source: {:?} {} {}\n",
                        source.origin,
                        source.path.as_deref().unwrap_or("-"),
                        source.digest.as_deref().unwrap_or("-"),
                    ));
                }
                out.trim_end().to_string()
            });
        }
    }

    Ok(())
}

fn read_json(path: &Path) -> Result<Value, CliError> {
    let input_error = |message: String| CliError::Input {
        path: path.to_path_buf(),
        message,
    };
    let bytes = fs::read(path).map_err(|e| input_error(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| input_error(e.to_string()))
}

fn emit<T: Serialize + ?Sized>(json_output: bool, value: &T, human: impl FnOnce() -> String) {
    if json_output {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error serializing output: {}", e),
        }
    } else {
        println!("{}", human());
    }
}
