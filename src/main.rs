mod client;
mod config;
mod glob;
mod lookup;
mod search;

use crate::client::{ApiClient, Pager};
use crate::config::{Scope, resolve, save};
use crate::lookup::NameResolver;
use crate::search::{SearchQuery, get_by_id_or_name, search_pager};
use anyhow::{Context, Result, anyhow};
use chrono::DateTime;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{self, Write};

const ROUTER_COLUMNS: &[&str] = &[
    "name",
    "id",
    "ip_address",
    "mac",
    "state",
    "serial_number",
    "actual_firmware.version",
];
const ROUTER_SEARCH_FIELDS: &[&str] = &[
    "name",
    "desc",
    "mac",
    "asset_id",
    "ip_address",
    "serial_number",
];
const ACCOUNT_COLUMNS: &[&str] = &["name", "id", "account"];
const ACCOUNT_SEARCH_FIELDS: &[&str] = &["name"];
const GROUP_COLUMNS: &[&str] = &[
    "name",
    "id",
    "account",
    "statistics.online_count",
    "statistics.offline_count",
    "statistics.synched_count",
];
const GROUP_SEARCH_FIELDS: &[&str] = &["name"];
const USER_COLUMNS: &[&str] = &["name", "id", "email"];
const USER_SEARCH_FIELDS: &[&str] = &["username", "first_name", "last_name", "email"];

#[derive(Parser)]
#[command(
    name = "ecmctl",
    version,
    about = "CLI for the Cradlepoint ECM device-management API"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "ECM username override for this invocation (otherwise read from config)"
    )]
    api_username: Option<String>,

    #[arg(long, global = true, help = "ECM password override for this invocation")]
    api_password: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "URL",
        help = "ECM site URL (defaults to https://www.cradlepointecm.com)"
    )]
    api_site: Option<String>,

    #[arg(
        long,
        short = 'o',
        value_enum,
        default_value_t = OutputFormat::Pretty,
        global = true,
        help = "Output format (propagates to subcommands)"
    )]
    output: OutputFormat,

    #[arg(
        long,
        value_name = "COL1,COL2",
        global = true,
        help = "Override table columns (comma-separated, dotted paths allowed)"
    )]
    columns: Option<String>,

    #[arg(
        long,
        value_name = "COLUMN",
        global = true,
        help = "Sort table rows by column (ascending)"
    )]
    sort_by: Option<String>,

    #[arg(
        long,
        value_name = "TEXT",
        global = true,
        help = "Filter rows containing TEXT (case-insensitive)"
    )]
    filter: Option<String>,

    #[arg(
        long,
        value_name = "N",
        global = true,
        help = "Records fetched per API page"
    )]
    page_size: Option<u64>,

    #[arg(long, global = true, help = "Enable debug logging to stderr")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Persist ECM credentials to the chosen scope
    Configure {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long, value_name = "URL", help = "Optional site URL to store")]
        site: Option<String>,
        #[arg(
            long,
            value_enum,
            default_value_t = ScopeArg::User,
            help = "Where to write the config (local project dir or user config dir)"
        )]
        scope: ScopeArg,
    },
    /// Router fleet operations
    #[command(subcommand)]
    Routers(RoutersCommand),
    /// Account operations
    #[command(subcommand)]
    Accounts(AccountsCommand),
    /// Router group operations
    #[command(subcommand)]
    Groups(GroupsCommand),
    /// User operations
    #[command(subcommand)]
    Users(UsersCommand),
    /// Summarize recent alerts by type
    Alerts,
    /// Tabulate the activity log
    ActivityLog {
        #[arg(long, value_name = "N", default_value_t = 100)]
        limit: usize,
    },
    /// Validate stored credentials against the API
    Validate,
    /// Show current configuration (secrets masked)
    ConfigShow,
    /// Generate shell completion scripts
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand)]
enum RoutersCommand {
    /// List routers
    List,
    /// Search routers with glob patterns (`field:pattern` or bare pattern)
    Search {
        #[arg(value_name = "CRITERIA", required = true)]
        criteria: Vec<String>,
    },
    /// Show a router by id or name
    Show {
        #[arg(value_name = "ID_OR_NAME")]
        ident: String,
    },
    /// Edit router attributes
    Edit {
        #[arg(value_name = "ID_OR_NAME")]
        ident: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long)]
        asset_id: Option<String>,
        #[arg(long)]
        custom1: Option<String>,
        #[arg(long)]
        custom2: Option<String>,
    },
    /// Move a router into a different account
    Move {
        #[arg(value_name = "ID_OR_NAME")]
        ident: String,
        #[arg(value_name = "ACCOUNT_ID_OR_NAME")]
        account: String,
    },
    /// Delete a router
    Delete {
        #[arg(value_name = "ID_OR_NAME")]
        ident: String,
        #[arg(short, long, help = "Do not prompt for confirmation")]
        force: bool,
    },
}

#[derive(Subcommand)]
enum AccountsCommand {
    /// List accounts
    List,
    /// Search accounts with glob patterns
    Search {
        #[arg(value_name = "CRITERIA", required = true)]
        criteria: Vec<String>,
    },
    /// Create an account
    Create {
        #[arg(value_name = "NAME")]
        name: String,
        #[arg(long, value_name = "ID_OR_NAME", help = "Parent account")]
        parent: Option<String>,
    },
    /// Rename an account
    Rename {
        #[arg(value_name = "ID_OR_NAME")]
        ident: String,
        #[arg(value_name = "NEW_NAME")]
        new_name: String,
    },
    /// Delete an account
    Delete {
        #[arg(value_name = "ID_OR_NAME")]
        ident: String,
        #[arg(short, long, help = "Do not prompt for confirmation")]
        force: bool,
    },
}

#[derive(Subcommand)]
enum GroupsCommand {
    /// List groups with sync statistics
    List,
    /// Search groups with glob patterns
    Search {
        #[arg(value_name = "CRITERIA", required = true)]
        criteria: Vec<String>,
    },
}

#[derive(Subcommand)]
enum UsersCommand {
    /// List users
    List,
    /// Search users with glob patterns
    Search {
        #[arg(value_name = "CRITERIA", required = true)]
        criteria: Vec<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Pretty,
    Json,
    Raw,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScopeArg {
    Local,
    User,
}

impl From<ScopeArg> for Scope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Local => Scope::Local,
            ScopeArg::User => Scope::User,
        }
    }
}

#[derive(Clone)]
struct RenderOpts {
    columns_override: Option<Vec<String>>,
    sort_by: Option<String>,
    filter: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    let cwd = std::env::current_dir().context("reading current directory")?;

    match &cli.command {
        Commands::Configure {
            username,
            password,
            site,
            scope,
        } => {
            let mut existing = config::load_scope((*scope).into(), &cwd)?;
            existing.username = Some(username.clone());
            existing.password = Some(password.clone());
            if let Some(site) = site.clone() {
                existing.site = Some(site);
            }
            let path = save((*scope).into(), &existing, &cwd)?;
            println!("Saved credentials to {}", path.display());
            return Ok(());
        }
        Commands::ConfigShow => {
            let mut masked = config::load(&cwd)?;
            if masked.password.is_some() {
                masked.password = Some("*****".into());
            }
            println!("{}", serde_json::to_string_pretty(&masked)?);
            return Ok(());
        }
        Commands::Completion { shell } => {
            use clap_complete::{generate, shells};
            let mut cmd = Cli::command();
            let bin = cmd.get_name().to_string();
            match shell {
                CompletionShell::Bash => {
                    generate(shells::Bash, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::Zsh => {
                    generate(shells::Zsh, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::Fish => {
                    generate(shells::Fish, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::PowerShell => {
                    generate(shells::PowerShell, &mut cmd, bin, &mut std::io::stdout())
                }
            }
            return Ok(());
        }
        _ => {}
    }

    let effective = resolve(
        &cwd,
        cli.api_username.clone(),
        cli.api_password.clone(),
        cli.api_site.clone(),
    )?;
    let client = ApiClient::new(&effective.site, &effective.username, &effective.password)?;
    let render_opts = RenderOpts {
        columns_override: cli.columns.as_ref().map(|c| {
            c.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }),
        sort_by: cli.sort_by.clone(),
        filter: cli.filter.clone(),
    };
    let output = cli.output;
    let page_size = cli.page_size;

    match cli.command {
        Commands::Routers(command) => {
            // The firmware column comes from the expanded sub-resource.
            let expand = [("expand".to_string(), "actual_firmware".to_string())];
            match command {
                RoutersCommand::List => run_list(
                    &client,
                    "routers",
                    &expand,
                    output,
                    &render_opts,
                    ROUTER_COLUMNS,
                    page_size,
                )?,
                RoutersCommand::Search { criteria } => run_search(
                    &client,
                    "routers",
                    ROUTER_SEARCH_FIELDS,
                    &criteria,
                    &expand,
                    output,
                    &render_opts,
                    ROUTER_COLUMNS,
                    page_size,
                )?,
                RoutersCommand::Show { ident } => {
                    let router = get_by_id_or_name(&client, "routers", &ident)?;
                    render_record(&router, output)?;
                }
                RoutersCommand::Edit {
                    ident,
                    name,
                    desc,
                    asset_id,
                    custom1,
                    custom2,
                } => {
                    let router = get_by_id_or_name(&client, "routers", &ident)?;
                    let mut payload = serde_json::Map::new();
                    if let Some(name) = name {
                        payload.insert("name".into(), json!(name));
                    }
                    if let Some(desc) = desc {
                        payload.insert("desc".into(), json!(desc));
                    }
                    if let Some(asset_id) = asset_id {
                        payload.insert("asset_id".into(), json!(asset_id));
                    }
                    if let Some(custom1) = custom1 {
                        payload.insert("custom1".into(), json!(custom1));
                    }
                    if let Some(custom2) = custom2 {
                        payload.insert("custom2".into(), json!(custom2));
                    }
                    if payload.is_empty() {
                        return Err(anyhow!("Provide at least one field to update"));
                    }
                    let id = record_id(&router)?;
                    client.put(&format!("routers/{id}"), &Value::Object(payload))?;
                    println!("Updated router {id}");
                }
                RoutersCommand::Move { ident, account } => {
                    let router = get_by_id_or_name(&client, "routers", &ident)?;
                    let account = get_by_id_or_name(&client, "accounts", &account)?;
                    let id = record_id(&router)?;
                    client.put(
                        &format!("routers/{id}"),
                        &json!({"account": resource_uri(&account, "accounts")?}),
                    )?;
                    println!(
                        "Moved router {id} to account {}",
                        account.get("name").and_then(Value::as_str).unwrap_or("?")
                    );
                }
                RoutersCommand::Delete { ident, force } => {
                    let router = get_by_id_or_name(&client, "routers", &ident)?;
                    let id = record_id(&router)?;
                    confirm(
                        &format!(
                            "Delete router {} ({})",
                            router.get("name").and_then(Value::as_str).unwrap_or("?"),
                            id
                        ),
                        force,
                    )?;
                    client.delete(&format!("routers/{id}"))?;
                    println!("Deleted router {id}");
                }
            }
        }
        Commands::Accounts(command) => match command {
            AccountsCommand::List => run_list(
                &client,
                "accounts",
                &[],
                output,
                &render_opts,
                ACCOUNT_COLUMNS,
                page_size,
            )?,
            AccountsCommand::Search { criteria } => run_search(
                &client,
                "accounts",
                ACCOUNT_SEARCH_FIELDS,
                &criteria,
                &[],
                output,
                &render_opts,
                ACCOUNT_COLUMNS,
                page_size,
            )?,
            AccountsCommand::Create { name, parent } => {
                let mut payload = serde_json::Map::new();
                payload.insert("name".into(), json!(name));
                if let Some(parent) = parent {
                    let parent = get_by_id_or_name(&client, "accounts", &parent)?;
                    payload.insert("account".into(), json!(resource_uri(&parent, "accounts")?));
                }
                let created = client.post("accounts", &Value::Object(payload))?;
                render_record(&created.data, output)?;
            }
            AccountsCommand::Rename { ident, new_name } => {
                let account = get_by_id_or_name(&client, "accounts", &ident)?;
                let id = record_id(&account)?;
                client.put(&format!("accounts/{id}"), &json!({"name": new_name}))?;
                println!("Renamed account {id} to {new_name}");
            }
            AccountsCommand::Delete { ident, force } => {
                let account = get_by_id_or_name(&client, "accounts", &ident)?;
                let id = record_id(&account)?;
                confirm(
                    &format!(
                        "Delete account {} ({})",
                        account.get("name").and_then(Value::as_str).unwrap_or("?"),
                        id
                    ),
                    force,
                )?;
                client.delete(&format!("accounts/{id}"))?;
                println!("Deleted account {id}");
            }
        },
        Commands::Groups(command) => {
            let expand = [("expand".to_string(), "statistics".to_string())];
            match command {
                GroupsCommand::List => run_list(
                    &client,
                    "groups",
                    &expand,
                    output,
                    &render_opts,
                    GROUP_COLUMNS,
                    page_size,
                )?,
                GroupsCommand::Search { criteria } => run_search(
                    &client,
                    "groups",
                    GROUP_SEARCH_FIELDS,
                    &criteria,
                    &expand,
                    output,
                    &render_opts,
                    GROUP_COLUMNS,
                    page_size,
                )?,
            }
        }
        Commands::Users(command) => {
            let expand = [("expand".to_string(), "profile".to_string())];
            match command {
                UsersCommand::List => {
                    let rows: Vec<Value> = sized(client.get_pager("users", &expand), page_size)
                        .collect::<Result<_>>()?;
                    render_rows(&with_user_names(rows), output, &render_opts, Some(USER_COLUMNS))?
                }
                UsersCommand::Search { criteria } => {
                    let query = SearchQuery::build(USER_SEARCH_FIELDS, &criteria)?;
                    let rows: Vec<Value> =
                        search_pager(&client, "users", &query, &expand, page_size)
                            .collect::<Result<_>>()?;
                    if rows.is_empty() {
                        return Err(anyhow!("No matches."));
                    }
                    render_rows(&with_user_names(rows), output, &render_opts, Some(USER_COLUMNS))?
                }
            }
        }
        Commands::Alerts => run_alerts(&client, output, &render_opts, page_size)?,
        Commands::ActivityLog { limit } => {
            run_activity_log(&client, limit, output, &render_opts, page_size)?
        }
        Commands::Validate => {
            println!("Validating ECM credentials...");
            match client.get("login", &[]) {
                Ok(response) => {
                    let username = glob::field_value(&response.data, "user.username")
                        .and_then(Value::as_str)
                        .unwrap_or(effective.username.as_str());
                    println!("ECM API: ok ({username})");
                }
                Err(err) => println!("ECM API: FAILED ({err})"),
            }
        }
        Commands::Configure { .. } | Commands::ConfigShow | Commands::Completion { .. } => {
            unreachable!("handled earlier")
        }
    }

    Ok(())
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::EnvFilter;
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn sized(pager: Pager<'_>, page_size: Option<u64>) -> Pager<'_> {
    match page_size {
        Some(size) => pager.page_size(size),
        None => pager,
    }
}

#[allow(clippy::too_many_arguments)]
fn run_list(
    client: &ApiClient,
    resource: &str,
    query: &[(String, String)],
    output: OutputFormat,
    render_opts: &RenderOpts,
    columns: &[&str],
    page_size: Option<u64>,
) -> Result<()> {
    let rows: Vec<Value> = sized(client.get_pager(resource, query), page_size)
        .collect::<Result<_>>()?;
    render_rows(&rows, output, render_opts, Some(columns))
}

#[allow(clippy::too_many_arguments)]
fn run_search(
    client: &ApiClient,
    resource: &str,
    fields: &[&str],
    criteria: &[String],
    extra: &[(String, String)],
    output: OutputFormat,
    render_opts: &RenderOpts,
    columns: &[&str],
    page_size: Option<u64>,
) -> Result<()> {
    let query = SearchQuery::build(fields, criteria)?;
    let rows: Vec<Value> = search_pager(client, resource, &query, extra, page_size)
        .collect::<Result<_>>()?;
    if rows.is_empty() {
        return Err(anyhow!("No matches."));
    }
    render_rows(&rows, output, render_opts, Some(columns))
}

fn run_alerts(
    client: &ApiClient,
    output: OutputFormat,
    render_opts: &RenderOpts,
    page_size: Option<u64>,
) -> Result<()> {
    let order = [("order_by".to_string(), "-created_ts".to_string())];
    let pager = client
        .get_pager("alerts", &order)
        .page_size(page_size.unwrap_or(500));

    struct Bucket {
        count: usize,
        newest: String,
        oldest: String,
    }
    let mut seen_order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Bucket> = HashMap::new();
    for row in pager {
        let row = row?;
        let kind = row
            .get("alert_type")
            .map(value_to_str)
            .unwrap_or_else(|| "unknown".into());
        let ts = row
            .get("created_ts")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        // The stream is newest-first, so the first record of a type is the
        // newest and the last one seen is the oldest.
        match buckets.get_mut(&kind) {
            Some(bucket) => {
                bucket.count += 1;
                bucket.oldest = ts;
            }
            None => {
                seen_order.push(kind.clone());
                buckets.insert(
                    kind,
                    Bucket {
                        count: 1,
                        newest: ts.clone(),
                        oldest: ts,
                    },
                );
            }
        }
    }

    let rows: Vec<Value> = seen_order
        .iter()
        .map(|kind| {
            let bucket = &buckets[kind];
            json!({
                "alert_type": kind,
                "count": bucket.count,
                "most_recent": since(&bucket.newest),
                "oldest": since(&bucket.oldest),
            })
        })
        .collect();
    render_rows(
        &rows,
        output,
        render_opts,
        Some(&["alert_type", "count", "most_recent", "oldest"]),
    )
}

fn run_activity_log(
    client: &ApiClient,
    limit: usize,
    output: OutputFormat,
    render_opts: &RenderOpts,
    page_size: Option<u64>,
) -> Result<()> {
    let order = [("order_by".to_string(), "-created_ts".to_string())];
    let mut resolver = NameResolver::new(client);
    let mut rows = Vec::new();
    for row in sized(client.get_pager("activity_logs", &order), page_size) {
        if rows.len() >= limit {
            break;
        }
        let row = row?;
        let activity = int_field(&row, "activity_type")
            .and_then(lookup::activity_type)
            .map(str::to_string)
            .unwrap_or_else(|| value_to_str(row.get("activity_type").unwrap_or(&Value::Null)));
        let actor = match (int_field(&row, "actor_type"), int_field(&row, "actor_id")) {
            (Some(kind), Some(id)) => resolver.actor(kind, id),
            _ => String::new(),
        };
        let object = match (int_field(&row, "object_type"), int_field(&row, "object_id")) {
            (Some(kind), Some(id)) => format!(
                "{} ({id})",
                lookup::object_type(kind).unwrap_or("unknown")
            ),
            _ => String::new(),
        };
        rows.push(json!({
            "time": row.get("created_ts").cloned().unwrap_or(Value::Null),
            "activity": activity,
            "actor": actor,
            "object": object,
            "id": row.get("id").cloned().unwrap_or(Value::Null),
        }));
    }
    render_rows(
        &rows,
        output,
        render_opts,
        Some(&["time", "activity", "actor", "object"]),
    )
}

/// User records carry the display-name pieces separately; assemble the
/// `First Last (username)` form the listings print.
fn with_user_names(rows: Vec<Value>) -> Vec<Value> {
    rows.into_iter()
        .map(|mut row| {
            let first = row.get("first_name").and_then(Value::as_str).unwrap_or("");
            let last = row.get("last_name").and_then(Value::as_str).unwrap_or("");
            let username = row.get("username").and_then(Value::as_str).unwrap_or("");
            let name = format!("{first} {last} ({username})");
            if let Some(map) = row.as_object_mut() {
                map.insert("name".into(), json!(name));
            }
            row
        })
        .collect()
}

fn render_rows(
    rows: &[Value],
    output: OutputFormat,
    render_opts: &RenderOpts,
    columns: Option<&[&str]>,
) -> Result<()> {
    match output {
        OutputFormat::Raw => {
            for row in rows {
                println!("{}", serde_json::to_string(row)?);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Pretty => {
            if !print_table(rows, columns, render_opts) {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
        }
    }
    Ok(())
}

fn render_record(record: &Value, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Raw => println!("{}", serde_json::to_string(record)?),
        _ => println!("{}", serde_json::to_string_pretty(record)?),
    }
    Ok(())
}

fn print_table(rows: &[Value], columns_hint: Option<&[&str]>, render_opts: &RenderOpts) -> bool {
    if rows.is_empty() {
        println!("No resources found.");
        return true;
    }
    let Some(first) = rows[0].as_object() else {
        return false;
    };

    let has_values = |key: &str| {
        rows.iter()
            .any(|row| glob::field_value(row, key).map(is_non_empty).unwrap_or(false))
    };

    let mut columns: Vec<String> = Vec::new();
    if let Some(override_cols) = &render_opts.columns_override {
        for col in override_cols {
            if has_values(col) {
                columns.push(col.clone());
            }
        }
    }
    if columns.is_empty() {
        if let Some(hint) = columns_hint {
            for col in hint {
                if has_values(col) {
                    columns.push((*col).to_string());
                }
            }
        }
    }
    if columns.is_empty() {
        for key in first.keys() {
            if has_values(key) {
                columns.push(key.clone());
            }
            if columns.len() >= 8 {
                break;
            }
        }
    }
    if !columns.iter().any(|c| c == "id") && has_values("id") {
        columns.push("id".into());
    }
    if columns.is_empty() {
        return false;
    }

    let needle = render_opts.filter.as_ref().map(|f| f.to_ascii_lowercase());
    let mut table: Vec<Vec<String>> = Vec::new();
    for row in rows {
        if !row.is_object() {
            continue;
        }
        let cells: Vec<String> = columns
            .iter()
            .map(|col| {
                glob::field_value(row, col)
                    .map(value_to_str)
                    .unwrap_or_default()
            })
            .collect();
        if let Some(needle) = &needle {
            if !cells
                .iter()
                .any(|cell| cell.to_ascii_lowercase().contains(needle))
            {
                continue;
            }
        }
        table.push(cells);
    }
    if table.is_empty() {
        println!("No resources found.");
        return true;
    }

    if let Some(sort) = &render_opts.sort_by {
        if let Some(idx) = columns.iter().position(|c| c == sort) {
            table.sort_by(|a, b| a[idx].cmp(&b[idx]));
        }
    }

    let mut widths: Vec<usize> = columns.iter().map(String::len).collect();
    for row in &table {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    for (i, col) in columns.iter().enumerate() {
        if i > 0 {
            print!("  ");
        }
        print!("{:width$}", col, width = widths[i]);
    }
    println!();
    for (i, width) in widths.iter().enumerate() {
        if i > 0 {
            print!("  ");
        }
        print!("{:-<width$}", "", width = *width);
    }
    println!();
    for row in table {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                print!("  ");
            }
            print!("{:width$}", cell, width = widths[i]);
        }
        println!();
    }

    true
}

fn value_to_str(value: &Value) -> String {
    match value {
        Value::Null => "".into(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(_) => true,
        Value::Number(_) => true,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(arr) => !arr.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn int_field(row: &Value, key: &str) -> Option<u64> {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

fn record_id(record: &Value) -> Result<String> {
    match record.get("id") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(anyhow!("record has no id field")),
    }
}

fn resource_uri(record: &Value, resource: &str) -> Result<String> {
    if let Some(uri) = record.get("resource_uri").and_then(Value::as_str) {
        return Ok(uri.to_string());
    }
    Ok(format!(
        "/{}/{}/{}/",
        client::API_PREFIX,
        resource,
        record_id(record)?
    ))
}

/// Humanized age of an RFC 3339 timestamp; falls back to the raw string.
fn since(ts: &str) -> String {
    let Ok(then) = DateTime::parse_from_rfc3339(ts) else {
        return ts.to_string();
    };
    let delta = chrono::Utc::now()
        .signed_duration_since(then.with_timezone(&chrono::Utc))
        .to_std()
        .unwrap_or_default();
    timeago::Formatter::new().convert(delta)
}

fn confirm(msg: &str, force: bool) -> Result<()> {
    if force {
        return Ok(());
    }
    print!("{msg} (type \"yes\" to confirm)? ");
    io::stdout().flush().context("flushing prompt")?;
    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .context("reading confirmation")?;
    if answer.trim() != "yes" {
        return Err(anyhow!("Aborted"));
    }
    Ok(())
}
