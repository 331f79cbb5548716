//! invctl - Command-line interface for the inventory storage core

use clap::{Parser, Subcommand};
use invcore::config::{self, InventoryConfig};
use invcore::kind::ResourceKind;
use invcore::lifecycle::{CURRENT_STATE, DESIRED_STATE};
use invcore::metadata::MetadataPair;
use invcore::mutation::{DeleteOutcome, Mutator, UpdateOutcome};
use invcore::query::{ListRequest, QueryEngine};
use invcore::resource::{Draft, ResourceView};
use invcore::schema::Catalog;
use invcore::ui::{self, Icons};
use invcore::{Context, Role, SqliteStore};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "invctl")]
#[command(version = "0.0.1")]
#[command(about = "Inventory storage core - typed infrastructure resources on SQLite")]
#[command(long_about = r#"
invctl manages a multi-tenant infrastructure inventory:
  • Regions, OUs, sites, providers, hosts, instances, OSes, endpoints
  • Filter expressions compiled to SQL (e.g. 'has(site.region)')
  • Metadata inherited along the physical and logical hierarchies
  • Host and instance lifecycle with soft and hard deletion

Example usage:
  invctl init --tenant acme
  invctl create region --data '{"name":"eu","metadata":[{"key":"env","value":"prod"}]}'
  invctl list host --filter 'site.region.name = "eu"' --order-by 'name desc'
  invctl list site --metadata env=prod
"#)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Act with the manager role (may write privileged fields)
    #[arg(long, global = true)]
    privileged: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Tenant to act in (overrides config)
    #[arg(short, long, global = true)]
    tenant: Option<String>,

    /// Abort requests running longer than this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file and create the database
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Create a resource from a JSON payload
    Create {
        kind: ResourceKind,

        /// Resource fields as a JSON object
        #[arg(long)]
        data: String,
    },

    /// Show one resource with its effective metadata
    Get { kind: ResourceKind, id: String },

    /// List resources matching a filter
    List {
        kind: ResourceKind,
        #[command(flatten)]
        query: QueryArgs,
    },

    /// List IDs of resources matching a filter
    Find {
        kind: ResourceKind,
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Update the masked fields of a resource
    Update {
        kind: ResourceKind,
        id: String,

        /// Comma-separated fields to update; masked fields missing from --data are cleared
        #[arg(long, value_delimiter = ',', required = true)]
        mask: Vec<String>,

        /// New field values as a JSON object
        #[arg(long, default_value = "{}")]
        data: String,
    },

    /// Delete a resource (soft for hosts and instances)
    Delete { kind: ResourceKind, id: String },

    /// Show the filter identifiers declared for a kind
    Declarations { kind: ResourceKind },

    /// Show resource counts for the tenant
    Stats,
}

#[derive(clap::Args)]
struct QueryArgs {
    /// Filter expression
    #[arg(short, long, default_value = "")]
    filter: String,

    /// Comma-separated columns, each optionally followed by asc/desc
    #[arg(short, long, default_value = "")]
    order_by: String,

    #[arg(long, default_value = "0")]
    offset: usize,

    /// Page size; 0 means no limit
    #[arg(short, long)]
    limit: Option<usize>,

    /// Required effective metadata, repeatable key=value
    #[arg(short, long)]
    metadata: Vec<MetadataPair>,
}

impl QueryArgs {
    fn into_request(self, kind: ResourceKind, config: &InventoryConfig) -> ListRequest {
        let limit = self.limit.unwrap_or_else(|| config.page_size());
        ListRequest::new(kind)
            .filter(self.filter)
            .order_by(self.order_by)
            .page(self.offset, limit)
            .metadata(self.metadata)
    }
}

/// Resolved runtime settings
struct Session {
    config: InventoryConfig,
    database: PathBuf,
    ctx: Context,
    json: bool,
}

impl Session {
    fn open_store(&self) -> anyhow::Result<SqliteStore> {
        config::ensure_db_dir(&self.database)?;
        tracing::debug!(database = %self.database.display(), "opening store");
        Ok(SqliteStore::open(&self.database)?)
    }

    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce()) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human();
        }
        Ok(())
    }
}

fn resolve_session(cli: &GlobalArgs) -> anyhow::Result<Session> {
    let config = config::load_config(cli.config.as_deref())?.unwrap_or_default();

    let cwd = std::env::current_dir()?;
    let database = cli
        .database
        .clone()
        .or_else(|| config.database.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| config::default_database_path_in(&cwd));

    let tenant = cli
        .tenant
        .clone()
        .or_else(|| config.tenant.clone())
        .ok_or_else(|| anyhow::anyhow!("no tenant given (use --tenant or set `tenant` in the config)"))?;

    let role = if cli.privileged { Role::Manager } else { Role::Member };
    let mut ctx = Context::new(tenant).with_role(role);
    if let Some(secs) = cli.timeout {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }

    Ok(Session {
        config,
        database,
        ctx,
        json: cli.json,
    })
}

fn parse_draft(data: &str) -> anyhow::Result<Draft> {
    serde_json::from_str(data).map_err(|e| anyhow::anyhow!("invalid --data payload: {}", e))
}

fn print_view(view: &ResourceView) {
    let resource = &view.resource;
    ui::header(&format!("{} {}", Icons::for_kind(resource.kind()), resource.id));
    for state in [DESIRED_STATE, CURRENT_STATE] {
        if let Some(value) = resource.str_field(state) {
            ui::info(state, &ui::state(value));
        }
    }
    println!("{}", ui::resource_table(view));
}

fn init(cli: &GlobalArgs, force: bool) -> anyhow::Result<()> {
    let path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let cwd = std::env::current_dir()?;
    let database = cli
        .database
        .clone()
        .unwrap_or_else(|| config::default_database_path_in(&cwd));

    let config = InventoryConfig {
        database: Some(database.to_string_lossy().to_string()),
        tenant: cli.tenant.clone(),
        page_size: None,
    };
    config::write_config(&path, &config, force)?;
    config::ensure_db_dir(&database)?;
    SqliteStore::open(&database)?;

    ui::success("Initialized inventory");
    ui::info("Config", &path.display().to_string());
    ui::info("Database", &database.display().to_string());
    if config.tenant.is_none() {
        ui::warn("No tenant set; pass --tenant on every command or add it to the config");
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init { force } => init(&cli.global, force),
        command => execute(&cli.global, command),
    }
}

fn execute(global: &GlobalArgs, command: Commands) -> anyhow::Result<()> {
    let session = resolve_session(global)?;
    let ctx = &session.ctx;
    let catalog = Catalog::global();

    match command {
        Commands::Init { force } => return init(global, force),

        Commands::Create { kind, data } => {
            let draft = parse_draft(&data)?;
            let store = session.open_store()?;
            let mutator = Mutator::new(catalog);
            let view = store.write(ctx, |tx| mutator.create(tx, ctx, kind, draft))?;
            session.emit(&view, || {
                ui::resource_created(&view.resource.id);
                print_view(&view);
            })?;
        }

        Commands::Get { kind, id } => {
            let store = session.open_store()?;
            let engine = QueryEngine::new(catalog);
            let view = store.read(ctx, |tx| engine.get(tx, ctx, kind, &id))?;
            session.emit(&view, || print_view(&view))?;
        }

        Commands::List { kind, query } => {
            let req = query.into_request(kind, &session.config);
            let store = session.open_store()?;
            let engine = QueryEngine::new(catalog);
            let page = store.read(ctx, |tx| engine.list(tx, ctx, &req))?;
            session.emit(&page, || {
                if page.items.is_empty() {
                    println!("{} No {} resources found.", Icons::SEARCH, kind);
                } else {
                    println!("{}", ui::resources_table(&page.items));
                }
                ui::page_summary(kind, page.items.len(), page.total, page.has_next);
            })?;
        }

        Commands::Find { kind, query } => {
            let req = query.into_request(kind, &session.config);
            let store = session.open_store()?;
            let engine = QueryEngine::new(catalog);
            let page = store.read(ctx, |tx| engine.find(tx, ctx, &req))?;
            session.emit(&page, || {
                for id in &page.items {
                    println!("{} {}", Icons::for_kind(kind), ui::id(id));
                }
                ui::page_summary(kind, page.items.len(), page.total, page.has_next);
            })?;
        }

        Commands::Update { kind, id, mask, data } => {
            let draft = parse_draft(&data)?;
            let store = session.open_store()?;
            let mutator = Mutator::new(catalog);
            let outcome = store.write(ctx, |tx| mutator.update(tx, ctx, kind, &id, &mask, draft))?;
            session.emit(&outcome, || match &outcome {
                UpdateOutcome::Updated(view) => {
                    ui::resource_updated(&view.resource.id);
                    print_view(view);
                }
                UpdateOutcome::HardDeleted { resource_id } => ui::resource_deleted(resource_id, true),
            })?;
        }

        Commands::Delete { kind, id } => {
            let store = session.open_store()?;
            let mutator = Mutator::new(catalog);
            let outcome = store.write(ctx, |tx| mutator.delete(tx, ctx, kind, &id))?;
            session.emit(&outcome, || match &outcome {
                DeleteOutcome::SoftDeleted(view) => ui::resource_deleted(&view.resource.id, false),
                DeleteOutcome::HardDeleted { resource_id } => ui::resource_deleted(resource_id, true),
            })?;
        }

        Commands::Declarations { kind } => {
            let decls = catalog.declarations_for(kind)?;
            let idents: Vec<(String, String)> = decls
                .identifiers()
                .into_iter()
                .map(|(name, ty)| (name.to_string(), ty.to_string()))
                .collect();
            session.emit(&idents, || {
                ui::section(&format!(" {} identifiers ({}) ", kind, decls.len()));
                let rows: Vec<(&str, &str)> =
                    idents.iter().map(|(n, t)| (n.as_str(), t.as_str())).collect();
                println!("{}", ui::stats_table(&rows));
            })?;
        }

        Commands::Stats => {
            let store = session.open_store()?;
            let stats = store.stats(ctx)?;
            session.emit(&stats, || {
                ui::header(&format!("{} Inventory of {}", Icons::DATABASE, stats.tenant_id));
                let counts: Vec<(String, String)> = stats
                    .counts
                    .iter()
                    .map(|(kind, n)| (kind.to_string(), n.to_string()))
                    .chain(std::iter::once(("total".to_string(), stats.total().to_string())))
                    .collect();
                let rows: Vec<(&str, &str)> =
                    counts.iter().map(|(k, n)| (k.as_str(), n.as_str())).collect();
                println!("{}", ui::stats_table(&rows));
                ui::info("Database", &session.database.display().to_string());
            })?;
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.global.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(err) = run(cli) {
        match err.downcast_ref::<invcore::Error>() {
            Some(e) => ui::error(&format!("[{}] {}", e.kind(), e)),
            None => ui::error(&format!("{:#}", err)),
        }
        std::process::exit(1);
    }
}
