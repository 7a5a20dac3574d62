use std::path::PathBuf;

use anyhow::{Context, Result};
use apprentice_hub_api::{ApprenticeHubApi, CreateEvidenceRequest, StoreConfig};
use apprentice_hub_core::{
    EvidenceEdit, EvidenceFilter, KsbId, NewKsb, NewProject, NewUser, ProjectId, UserId,
};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "ahub")]
#[command(about = "Apprentice Hub operator CLI")]
struct Cli {
    /// YAML file naming the store locations.
    #[arg(long, env = "APPRENTICE_HUB_CONFIG", global = true)]
    config: Option<PathBuf>,
    #[arg(long, env = "APPRENTICE_HUB_RELATIONAL_DB", global = true)]
    relational_db: Option<PathBuf>,
    #[arg(long, env = "APPRENTICE_HUB_DOCUMENT_DB", global = true)]
    document_db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    Ksb {
        #[command(subcommand)]
        command: KsbCommand,
    },
    Evidence {
        #[command(subcommand)]
        command: EvidenceCommand,
    },
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
    /// Coverage of the KSB taxonomy by one user's evidence.
    Dashboard(DashboardArgs),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum KsbCommand {
    /// Import every `*.md` file of a directory; the file stem is the KSB code.
    Import(KsbImportArgs),
    List,
    Add(KsbAddArgs),
    Show(IdArgs),
}

#[derive(Debug, Args)]
struct KsbImportArgs {
    #[arg(long)]
    dir: PathBuf,
}

#[derive(Debug, Args)]
struct KsbAddArgs {
    #[arg(long)]
    code: String,
    #[arg(long)]
    description: String,
}

#[derive(Debug, Args)]
struct IdArgs {
    #[arg(long)]
    id: i64,
}

#[derive(Debug, Subcommand)]
enum EvidenceCommand {
    Add(EvidenceAddArgs),
    List(EvidenceListArgs),
    Show(EvidenceShowArgs),
    Update(EvidenceUpdateArgs),
}

#[derive(Debug, Args)]
struct EvidenceAddArgs {
    #[arg(long)]
    user_id: i64,
    #[arg(long)]
    project_id: Option<i64>,
    #[arg(long)]
    title: String,
    #[arg(long)]
    content: String,
    #[arg(long)]
    content_type: Option<String>,
    #[arg(long = "ksb-id")]
    ksb_ids: Vec<i64>,
}

#[derive(Debug, Args)]
struct EvidenceListArgs {
    #[arg(long)]
    user_id: Option<i64>,
    #[arg(long)]
    project_id: Option<i64>,
}

#[derive(Debug, Args)]
struct EvidenceShowArgs {
    #[arg(long)]
    id: String,
}

#[derive(Debug, Args)]
struct EvidenceUpdateArgs {
    #[arg(long)]
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    content: Option<String>,
    #[arg(long)]
    content_type: Option<String>,
}

#[derive(Debug, Subcommand)]
enum UserCommand {
    Add(UserAddArgs),
    Show(IdArgs),
}

#[derive(Debug, Args)]
struct UserAddArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    name: Option<String>,
}

#[derive(Debug, Subcommand)]
enum ProjectCommand {
    Add(ProjectAddArgs),
    List(ProjectListArgs),
}

#[derive(Debug, Args)]
struct ProjectAddArgs {
    #[arg(long)]
    user_id: i64,
    #[arg(long)]
    name: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    status: Option<String>,
}

#[derive(Debug, Args)]
struct ProjectListArgs {
    #[arg(long)]
    user_id: Option<i64>,
}

#[derive(Debug, Args)]
struct DashboardArgs {
    #[arg(long)]
    user_id: i64,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<Value> {
    serde_json::to_value(value).with_context(|| format!("failed to serialize {what}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = StoreConfig::resolve(cli.config.as_deref(), cli.relational_db, cli.document_db)?;
    let api = ApprenticeHubApi::new(config);

    match cli.command {
        Command::Db { command } => run_db(command, &api),
        Command::Ksb { command } => run_ksb(command, &api),
        Command::Evidence { command } => run_evidence(command, &api),
        Command::User { command } => run_user(command, &api),
        Command::Project { command } => run_project(command, &api),
        Command::Dashboard(args) => {
            let overview = api.dashboard_overview(UserId(args.user_id))?;
            emit_json(to_json(&overview, "dashboard overview")?)
        }
    }
}

fn run_db(command: DbCommand, api: &ApprenticeHubApi) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => {
            let status = api.schema_status()?;
            let up_to_date = status.relational.pending_versions.is_empty()
                && status.document.pending_versions.is_empty();
            emit_json(serde_json::json!({
                "relational": status.relational,
                "document": status.document,
                "up_to_date": up_to_date
            }))
        }
        DbCommand::Migrate(args) => {
            let result = api.migrate(args.dry_run)?;
            emit_json(to_json(&result, "migration result")?)
        }
    }
}

fn run_ksb(command: KsbCommand, api: &ApprenticeHubApi) -> Result<()> {
    match command {
        KsbCommand::Import(args) => {
            let summary = api.import_ksbs(&args.dir)?;
            emit_json(to_json(&summary, "KSB import summary")?)
        }
        KsbCommand::List => {
            let ksbs = api.list_ksbs()?;
            emit_json(serde_json::json!({ "ksbs": ksbs }))
        }
        KsbCommand::Add(args) => {
            let ksb =
                api.create_ksb(&NewKsb { code: args.code, description: args.description })?;
            emit_json(to_json(&ksb, "KSB")?)
        }
        KsbCommand::Show(args) => {
            let ksb = api.get_ksb(KsbId(args.id))?;
            emit_json(to_json(&ksb, "KSB")?)
        }
    }
}

fn run_evidence(command: EvidenceCommand, api: &ApprenticeHubApi) -> Result<()> {
    match command {
        EvidenceCommand::Add(args) => {
            let record = api.create_evidence(CreateEvidenceRequest {
                user_id: UserId(args.user_id),
                project_id: args.project_id.map(ProjectId),
                title: args.title,
                content_type: args.content_type,
                content: args.content,
                ksb_ids: args.ksb_ids.into_iter().map(KsbId).collect(),
            })?;
            emit_json(to_json(&record, "evidence record")?)
        }
        EvidenceCommand::List(args) => {
            let records = api.list_evidence(&EvidenceFilter {
                user_id: args.user_id.map(UserId),
                project_id: args.project_id.map(ProjectId),
            })?;
            emit_json(serde_json::json!({ "evidence": records }))
        }
        EvidenceCommand::Show(args) => {
            let record = api.get_evidence(&args.id)?;
            emit_json(to_json(&record, "evidence record")?)
        }
        EvidenceCommand::Update(args) => {
            let record = api.update_evidence(
                &args.id,
                EvidenceEdit {
                    title: args.title,
                    content: args.content,
                    content_type: args.content_type,
                },
            )?;
            emit_json(to_json(&record, "evidence record")?)
        }
    }
}

fn run_user(command: UserCommand, api: &ApprenticeHubApi) -> Result<()> {
    match command {
        UserCommand::Add(args) => {
            let user =
                api.create_user(&NewUser { email: args.email, name: args.name, oauth_provider: None })?;
            emit_json(to_json(&user, "user")?)
        }
        UserCommand::Show(args) => {
            let user = api.get_user(UserId(args.id))?;
            emit_json(to_json(&user, "user")?)
        }
    }
}

fn run_project(command: ProjectCommand, api: &ApprenticeHubApi) -> Result<()> {
    match command {
        ProjectCommand::Add(args) => {
            let project = api.create_project(&NewProject {
                user_id: UserId(args.user_id),
                name: args.name,
                description: args.description,
                start_date: None,
                end_date: None,
                status: args.status,
            })?;
            emit_json(to_json(&project, "project")?)
        }
        ProjectCommand::List(args) => {
            let projects = api.list_projects(args.user_id.map(UserId))?;
            emit_json(serde_json::json!({ "projects": projects }))
        }
    }
}
