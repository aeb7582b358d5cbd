//! `function-unit-deployer` CLI entry-point.
//!
//! Available sub-commands:
//! - `migrate`: run pending database migrations.
//! - `deploy`: deploy a new version of a function unit.
//! - `impact`: show what a rollback would delete.
//! - `rollback`: roll a function unit back to an earlier version.
//! - `history`: list the versions of a function unit.
//! - `start-instance`: start a process instance of the active version.
//! - `engine ping`: check that the workflow engine answers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use db::{PgStore, PoolConfig, Variables};
use engine::{
    DeploymentConfig, DeploymentService, ProcessService, RollbackService, VersionService,
};
use flowable::{FlowableConfig, FlowableRestClient, WorkflowEngineClient};

#[derive(Parser)]
#[command(
    name = "function-unit-deployer",
    about = "Versioned deployment and rollback of function units",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct DbArgs {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,
}

#[derive(Args)]
struct EngineArgs {
    /// Flowable REST base URL, e.g. `http://localhost:8080/flowable-rest`.
    #[arg(long, env = "FLOWABLE_URL")]
    flowable_url: String,

    #[arg(long, env = "FLOWABLE_USER", default_value = "rest-admin")]
    flowable_user: String,

    #[arg(long, env = "FLOWABLE_PASSWORD", default_value = "")]
    flowable_password: String,

    /// Upper bound for one workflow-engine call.
    #[arg(long, env = "ENGINE_TIMEOUT_SECS", default_value_t = 30)]
    engine_timeout_secs: u64,
}

impl EngineArgs {
    fn client(&self) -> anyhow::Result<FlowableRestClient> {
        let config = FlowableConfig {
            base_url: self.flowable_url.clone(),
            username: self.flowable_user.clone(),
            password: self.flowable_password.clone(),
            ..FlowableConfig::default()
        };
        FlowableRestClient::new(config).context("failed to build Flowable client")
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run pending database migrations.
    Migrate {
        #[command(flatten)]
        db: DbArgs,
    },
    /// Deploy a new version of a function unit and activate it.
    Deploy {
        /// Function-unit name.
        name: String,
        /// Path to the BPMN 2.0 XML file.
        #[arg(long)]
        bpmn: PathBuf,
        /// `major`, `minor` or `patch`.
        #[arg(long, default_value = "minor")]
        change_type: String,
        /// Deployment metadata as a JSON object.
        #[arg(long, default_value = "{}")]
        metadata: String,
        #[command(flatten)]
        db: DbArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Show what rolling back to a version would delete.
    Impact {
        version_id: Uuid,
        #[command(flatten)]
        db: DbArgs,
    },
    /// Roll back to a version, deleting every newer one.
    Rollback {
        version_id: Uuid,
        /// Required; rollback deletes versions and process instances.
        #[arg(long)]
        yes: bool,
        #[command(flatten)]
        db: DbArgs,
    },
    /// List all versions of a function unit, newest first.
    History {
        name: String,
        #[command(flatten)]
        db: DbArgs,
    },
    /// Start a process instance bound to the active version.
    StartInstance {
        name: String,
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        user_name: String,
        /// Process variables as a JSON object.
        #[arg(long, default_value = "{}")]
        variables: String,
        #[command(flatten)]
        db: DbArgs,
    },
    /// Workflow-engine maintenance.
    Engine {
        #[command(subcommand)]
        command: EngineCommand,
    },
}

#[derive(Subcommand)]
enum EngineCommand {
    /// Check that the workflow engine answers.
    Ping {
        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Migrate { db } => {
            let store = connect(&db).await?;
            db::pool::run_migrations(store.pool())
                .await
                .context("migration failed")?;
            info!("Migrations applied successfully");
        }
        Command::Deploy { name, bpmn, change_type, metadata, db, engine } => {
            let bpmn_content = std::fs::read_to_string(&bpmn)
                .with_context(|| format!("cannot read BPMN file {}", bpmn.display()))?;
            let metadata: serde_json::Value =
                serde_json::from_str(&metadata).context("--metadata is not valid JSON")?;

            let store = Arc::new(connect(&db).await?);
            let config = DeploymentConfig {
                engine_timeout: Duration::from_secs(engine.engine_timeout_secs),
            };
            let deployments = DeploymentService::new(store, Arc::new(engine.client()?), config);

            let outcome = deployments
                .deploy_function_unit(&name, &bpmn_content, &change_type, metadata)
                .await?;
            print_json(&outcome)?;
        }
        Command::Impact { version_id, db } => {
            let rollback = RollbackService::new(Arc::new(connect(&db).await?));
            print_json(&rollback.calculate_rollback_impact(version_id).await?)?;
        }
        Command::Rollback { version_id, yes, db } => {
            let rollback = RollbackService::new(Arc::new(connect(&db).await?));
            if !yes {
                let impact = rollback.calculate_rollback_impact(version_id).await?;
                print_json(&impact)?;
                anyhow::bail!("{}; re-run with --yes to proceed", impact.warning);
            }
            print_json(&rollback.rollback_to_version(version_id).await?)?;
        }
        Command::History { name, db } => {
            let versions = VersionService::new(Arc::new(connect(&db).await?));
            print_json(&versions.get_version_history(&name).await?)?;
        }
        Command::StartInstance { name, user_id, user_name, variables, db } => {
            let variables: Variables =
                serde_json::from_str(&variables).context("--variables is not a JSON object")?;
            let processes = ProcessService::new(Arc::new(connect(&db).await?));
            let instance = processes
                .create_process_instance(&name, variables, &user_id, &user_name)
                .await?;
            print_json(&instance)?;
        }
        Command::Engine { command: EngineCommand::Ping { engine } } => {
            let client = engine.client()?;
            if !client.is_available().await {
                anyhow::bail!("workflow engine at {} is not available", engine.flowable_url);
            }
            println!("workflow engine at {} is available", engine.flowable_url);
        }
    }

    Ok(())
}

async fn connect(args: &DbArgs) -> anyhow::Result<PgStore> {
    let config = PoolConfig {
        max_connections: args.max_connections,
        ..PoolConfig::new(args.database_url.clone())
    };
    let pool = db::pool::create_pool(&config)
        .await
        .context("failed to connect to database")?;
    Ok(PgStore::new(pool))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
