use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use refadmin::cascade::{filter_children, options_from_rows};
use refadmin::config::{self, Config, Overrides};
use refadmin::entity::{EntityRegistry, EntitySpec, FieldKind};
use refadmin::envelope;
use refadmin::{
    ApiError, AuthService, Backend, DeleteMode, EntityApi, FormDialogController,
    PaginatedListController, SubmitError, SubmitOutcome,
};

const LOG_ENV: &str = "REFADMIN_LOG";

#[derive(Parser, Debug)]
#[command(name = "refadmin", about = "Administer reference data through the REST backend")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Backend root URL, overrides `base_url` from the config file
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Bearer token, overrides REFADMIN_TOKEN and the config file
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the entities this console administers
    Entities,
    /// Show one page of records
    List(ListArgs),
    /// Show a single record
    Show(RecordArgs),
    /// Create a record from FIELD=VALUE pairs
    Create(CreateArgs),
    /// Update fields of an existing record
    Update(UpdateArgs),
    /// Deactivate a record, or remove it with --hard
    Delete(DeleteArgs),
    Activate(RecordArgs),
    Deactivate(RecordArgs),
    /// Number of records on the server
    Count(EntityArg),
    /// Dropdown options, optionally filtered by parent id
    Options(OptionsArgs),
}

#[derive(Args, Debug)]
struct EntityArg {
    entity: String,
}

#[derive(Args, Debug)]
struct ListArgs {
    entity: String,

    /// Zero-based page index
    #[arg(long, default_value_t = 0)]
    page: u64,

    #[arg(long)]
    size: Option<u64>,
}

#[derive(Args, Debug)]
struct RecordArgs {
    entity: String,
    id: i64,
}

#[derive(Args, Debug)]
struct CreateArgs {
    entity: String,

    #[arg(short = 's', long = "set", value_name = "FIELD=VALUE")]
    set: Vec<String>,
}

#[derive(Args, Debug)]
struct UpdateArgs {
    entity: String,
    id: i64,

    #[arg(short = 's', long = "set", value_name = "FIELD=VALUE")]
    set: Vec<String>,
}

#[derive(Args, Debug)]
struct DeleteArgs {
    entity: String,
    id: i64,

    /// Remove permanently instead of deactivating
    #[arg(long, default_value_t = false)]
    hard: bool,
}

#[derive(Args, Debug)]
struct OptionsArgs {
    entity: String,

    /// Only options belonging to this parent id
    #[arg(long)]
    parent: Option<i64>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(run(cli))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    if let Command::Entities = cli.command {
        print_entities(&EntityRegistry::builtin());
        return Ok(());
    }

    let overrides = Overrides {
        config_path: cli.config,
        base_url: cli.base_url,
        token: cli.token,
    };
    let config = config::load(&overrides)?;
    let auth = match config.token.as_deref() {
        Some(token) => AuthService::with_token(token),
        None => AuthService::new(),
    };
    let backend = Backend::new(&config.base_url, auth);

    let result = match cli.command {
        Command::Entities => Ok(()),
        Command::List(args) => handle_list(args, &config, &backend).await,
        Command::Show(args) => handle_show(args, &config, &backend).await,
        Command::Create(args) => handle_create(args, &config, &backend).await,
        Command::Update(args) => handle_update(args, &config, &backend).await,
        Command::Delete(args) => {
            let mode = if args.hard { DeleteMode::Hard } else { DeleteMode::Soft };
            handle_remove(&args.entity, args.id, mode, &config, &backend).await
        }
        Command::Activate(args) => handle_activation(args, true, &config, &backend).await,
        Command::Deactivate(args) => handle_activation(args, false, &config, &backend).await,
        Command::Count(args) => handle_count(args, &config, &backend).await,
        Command::Options(args) => handle_options(args, &config, &backend).await,
    };

    result.map_err(|err| {
        let auth_failure = err
            .downcast_ref::<ApiError>()
            .is_some_and(ApiError::is_auth_failure);
        if auth_failure {
            err.context("log in again and retry")
        } else {
            err
        }
    })
}

fn print_entities(registry: &EntityRegistry) {
    for spec in registry.iter() {
        let parents: Vec<&str> = spec
            .fields
            .iter()
            .filter_map(|field| match &field.kind {
                FieldKind::Reference { entity } => Some(entity.as_str()),
                _ => None,
            })
            .collect();
        if parents.is_empty() {
            println!("{}\t{}\t{}", spec.name, spec.label, spec.base_path);
        } else {
            println!(
                "{}\t{}\t{}\t(parents: {})",
                spec.name,
                spec.label,
                spec.base_path,
                parents.join(", ")
            );
        }
    }
}

fn entity<'a>(config: &'a Config, name: &str) -> Result<&'a EntitySpec> {
    config.entities.get(name).ok_or_else(|| {
        let known: Vec<&str> = config.entities.names().collect();
        anyhow!("unknown entity '{}', expected one of: {}", name, known.join(", "))
    })
}

async fn handle_list(args: ListArgs, config: &Config, backend: &Backend) -> Result<()> {
    let spec = entity(config, &args.entity)?;
    let api = backend.client(spec);
    let mut list = PaginatedListController::new(spec.clone(), args.size.unwrap_or(config.page_size));
    list.set_page(args.page);

    // missing lookups only degrade columns to their embedded names
    for lookup_name in spec.lookup_entities() {
        let Some(lookup) = config.entities.get(lookup_name) else {
            continue;
        };
        if let Err(err) = list.load_lookup(lookup, &backend.client(lookup)).await {
            if err.is_auth_failure() {
                return Err(err.into());
            }
            tracing::warn!(lookup = lookup_name, error = %err, "lookup unavailable");
        }
    }

    list.sync(&api)
        .await
        .with_context(|| format!("failed to list {}", spec.name))?;

    let labels: Vec<&str> = spec.columns.iter().map(|c| c.label.as_str()).collect();
    println!("{}", labels.join("\t"));
    for row in list.rows() {
        let cells: Vec<&str> = row.view.cells.iter().map(|(_, text)| text.as_str()).collect();
        println!("{}", cells.join("\t"));
    }
    println!(
        "Page {} of {} ({} total)",
        list.page() + 1,
        list.page_count().max(1),
        list.total_count()
    );
    Ok(())
}

async fn handle_show(args: RecordArgs, config: &Config, backend: &Backend) -> Result<()> {
    let spec = entity(config, &args.entity)?;
    let api = backend.client(spec);
    let list = PaginatedListController::new(spec.clone(), config.page_size);
    let mut dialog = FormDialogController::new(spec.clone(), list.refresh_handle());
    dialog
        .open_edit(&api, args.id)
        .await
        .with_context(|| format!("failed to load {} {}", spec.name, args.id))?;

    for (field, value) in dialog.record() {
        println!("{}\t{}", field, display_value(value));
    }
    Ok(())
}

async fn handle_create(args: CreateArgs, config: &Config, backend: &Backend) -> Result<()> {
    let spec = entity(config, &args.entity)?;
    let api = backend.client(spec);
    let list = PaginatedListController::new(spec.clone(), config.page_size);
    let mut dialog = FormDialogController::new(spec.clone(), list.refresh_handle());

    dialog.open_add();
    apply_assignments(&mut dialog, spec, &args.set)?;
    report_submit(spec, dialog.submit(&api).await)
}

async fn handle_update(args: UpdateArgs, config: &Config, backend: &Backend) -> Result<()> {
    let spec = entity(config, &args.entity)?;
    let api = backend.client(spec);
    let list = PaginatedListController::new(spec.clone(), config.page_size);
    let mut dialog = FormDialogController::new(spec.clone(), list.refresh_handle());

    dialog
        .open_edit(&api, args.id)
        .await
        .with_context(|| format!("failed to load {} {}", spec.name, args.id))?;
    apply_assignments(&mut dialog, spec, &args.set)?;
    report_submit(spec, dialog.submit(&api).await)
}

fn apply_assignments(dialog: &mut FormDialogController, spec: &EntitySpec, pairs: &[String]) -> Result<()> {
    for pair in pairs {
        let Some((field, value)) = pair.split_once('=') else {
            bail!("expected FIELD=VALUE, got '{}'", pair);
        };
        let field = field.trim();
        if spec.field_spec(field).is_none() {
            let known: Vec<&str> = spec.fields.iter().map(|f| f.name.as_str()).collect();
            bail!(
                "unknown field '{}' for {}, expected one of: {}",
                field,
                spec.name,
                known.join(", ")
            );
        }
        dialog.set_field_text(field, value);
    }
    Ok(())
}

fn report_submit(spec: &EntitySpec, result: Result<SubmitOutcome, SubmitError>) -> Result<()> {
    match result {
        Ok(SubmitOutcome::Created(reply)) => {
            println!("Created {}.", spec.label);
            if let Some(message) = reply.message {
                println!("{}", message);
            }
            Ok(())
        }
        Ok(SubmitOutcome::Updated { id, reply }) => {
            println!("Updated {} {}.", spec.label, id);
            if let Some(message) = reply.message {
                println!("{}", message);
            }
            Ok(())
        }
        Err(SubmitError::Invalid(errors)) => {
            for (field, message) in errors.iter() {
                eprintln!("{}: {}", field, message);
            }
            bail!("{} validation error(s); nothing was sent", errors.len())
        }
        Err(SubmitError::Api(err)) => {
            let message = err.user_message();
            Err(anyhow::Error::new(err).context(message))
        }
        Err(err) => Err(err.into()),
    }
}

async fn handle_remove(
    name: &str,
    id: i64,
    mode: DeleteMode,
    config: &Config,
    backend: &Backend,
) -> Result<()> {
    let spec = entity(config, name)?;
    let api = backend.client(spec);
    let mut list = PaginatedListController::new(spec.clone(), config.page_size);
    list.remove(&api, id, mode)
        .await
        .with_context(|| format!("failed to delete {} {}", spec.name, id))?;
    match mode {
        DeleteMode::Soft => println!("Deactivated {} {}.", spec.label, id),
        DeleteMode::Hard => println!("Deleted {} {}.", spec.label, id),
    }
    Ok(())
}

async fn handle_activation(args: RecordArgs, active: bool, config: &Config, backend: &Backend) -> Result<()> {
    let spec = entity(config, &args.entity)?;
    let api = backend.client(spec);
    let mut list = PaginatedListController::new(spec.clone(), config.page_size);
    list.set_active(&api, args.id, active)
        .await
        .with_context(|| format!("failed to update {} {}", spec.name, args.id))?;
    let verb = if active { "Activated" } else { "Deactivated" };
    println!("{} {} {}.", verb, spec.label, args.id);
    Ok(())
}

async fn handle_count(args: EntityArg, config: &Config, backend: &Backend) -> Result<()> {
    let spec = entity(config, &args.entity)?;
    let count = backend
        .client(spec)
        .count()
        .await
        .with_context(|| format!("failed to count {}", spec.name))?;
    println!("{}", count);
    Ok(())
}

async fn handle_options(args: OptionsArgs, config: &Config, backend: &Backend) -> Result<()> {
    let spec = entity(config, &args.entity)?;
    // the nearest parent is the last reference field (city -> state, topic -> module)
    let parent_field = spec
        .fields
        .iter()
        .rev()
        .find(|field| matches!(field.kind, FieldKind::Reference { .. }))
        .map(|field| field.name.as_str());
    if args.parent.is_some() && parent_field.is_none() {
        bail!("{} has no parent entity", spec.name);
    }

    let raw = backend
        .client(spec)
        .all()
        .await
        .with_context(|| format!("failed to load {} options", spec.name))?;
    let page = envelope::normalize(&raw, &spec.plural_keys);
    let mut options = options_from_rows(&page.rows, &spec.id_field, &spec.name_field, parent_field);
    if args.parent.is_some() {
        options = filter_children(&options, args.parent);
    }

    for option in options {
        println!("{}\t{}", option.id, option.name);
    }
    Ok(())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "N/A".to_string(),
        other => other.to_string(),
    }
}
