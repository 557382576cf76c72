//! `taskboard`: the command-line entry point.
//!
//! Mirrors the host's clap derive `Cli`/`Commands` structure and
//! `#[tokio::main]` dispatch, but wires a `Board`/`Scheduler`/HTTP surface
//! instead of the host's single-shot dispatch-and-exit commands.

mod api;
mod claude_session;
mod config;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use taskboard_core::plan::PlanEvent;
use taskboard_core::{approve_and_create, plan, Board, EventBus, Scheduler, SchedulerConfig};
use taskboard_db::models::TaskStatus;
use taskboard_db::{pool, queries};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::claude_session::ClaudeCodeSessionManager;
use crate::config::{CliOverrides, TaskBoardConfig};

#[derive(Parser)]
#[command(name = "taskboard", about = "Decompose a goal into a DAG of agent tasks and run it to completion")]
struct Cli {
    /// Override the database path for this invocation.
    #[arg(long, global = true)]
    db_path: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler loop and HTTP observation surface until interrupted.
    Serve {
        #[arg(long)]
        bind_addr: Option<String>,
        #[arg(long)]
        tick_secs: Option<u64>,
    },
    /// Turn a goal into a plan, printing it for review.
    Plan {
        goal: String,
        #[arg(long, default_value = "")]
        context: String,
        /// Materialize the plan immediately instead of only printing it.
        #[arg(long)]
        approve: bool,
        #[arg(long, default_value = ".")]
        work_dir: String,
        #[arg(long)]
        auto_start: bool,
    },
    /// Workspace inspection and lifecycle commands.
    Workspace {
        #[command(subcommand)]
        command: WorkspaceCommands,
    },
    /// Task inspection and lifecycle commands.
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Apply the embedded SQL migrations and exit.
    DbInit,
}

#[derive(Subcommand)]
enum WorkspaceCommands {
    List,
    Show { id: Uuid },
    Pause { id: Uuid },
    Resume { id: Uuid },
}

#[derive(Subcommand)]
enum TaskCommands {
    List {
        #[arg(long)]
        workspace_id: Option<Uuid>,
        #[arg(long)]
        status: Option<String>,
    },
    Show { id: String },
    Start { id: String },
    Cancel { id: String },
    Retry { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let overrides = CliOverrides { db_path: cli.db_path, ..Default::default() };
    let config = TaskBoardConfig::resolve(&overrides)?;

    let db_pool = pool::create_pool_from_config(&config.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    match cli.command {
        Commands::DbInit => {
            println!("database ready at {}", config.db_config.db_path.display());
        }
        Commands::Serve { bind_addr, tick_secs } => {
            run_serve(db_pool.clone(), config, bind_addr, tick_secs).await?;
        }
        Commands::Plan { goal, context, approve, work_dir, auto_start } => {
            cmd_plan(&db_pool, goal, context, approve, work_dir, auto_start).await?;
        }
        Commands::Workspace { command } => {
            cmd_workspace(&db_pool, command).await?;
        }
        Commands::Task { command } => {
            cmd_task(&db_pool, command).await?;
        }
    }

    db_pool.close().await;
    Ok(())
}

async fn run_serve(
    db_pool: sqlx::SqlitePool,
    config: TaskBoardConfig,
    bind_addr: Option<String>,
    tick_secs: Option<u64>,
) -> Result<()> {
    let recovered = queries::tasks::recover_running_tasks(&db_pool).await?;
    if recovered > 0 {
        tracing::info!(count = recovered, "recovered tasks left running by a prior crash");
    }

    let bus = EventBus::new();
    let board = Arc::new(Board::new(db_pool.clone(), bus.clone()));
    let session_manager: Arc<dyn taskboard_core::SessionManager> = Arc::new(ClaudeCodeSessionManager::new());

    let scheduler_config = SchedulerConfig {
        tick_interval: std::time::Duration::from_secs(tick_secs.unwrap_or_else(|| config.tick_interval.as_secs())),
    };

    let (scheduler, handle) =
        Scheduler::new(db_pool.clone(), Arc::clone(&board), bus.clone(), session_manager, scheduler_config);
    board.set_scheduler(Arc::clone(&handle));

    let cancel = CancellationToken::new();
    let scheduler_cancel = cancel.clone();
    let scheduler_task = tokio::spawn(scheduler.run(scheduler_cancel));

    let router = api::build_router(Arc::clone(&board), handle);
    let bind_addr = bind_addr.unwrap_or(config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(bind_addr, "taskboard serving");

    let server = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal());
    server.await.context("http server failed")?;

    cancel.cancel();
    let _ = scheduler_task.await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

async fn cmd_plan(
    pool: &sqlx::SqlitePool,
    goal: String,
    context: String,
    approve: bool,
    work_dir: String,
    auto_start: bool,
) -> Result<()> {
    let manager: Arc<dyn taskboard_core::SessionManager> = Arc::new(ClaudeCodeSessionManager::new());
    let mut stream = plan(manager, goal.clone(), context);

    let mut result = None;
    while let Some(event) = stream.next().await {
        match event {
            PlanEvent::Thinking(text) => eprintln!("[thinking] {text}"),
            PlanEvent::Reading(detail) => eprintln!("[reading] {detail}"),
            PlanEvent::Error(message) => {
                anyhow::bail!("planning failed: {message}");
            }
            PlanEvent::PlanReady(plan_result) => result = Some(plan_result),
        }
    }

    let plan_result = result.context("planning session ended without producing a plan")?;
    let json = serde_json::to_string_pretty(&plan_result)?;
    std::io::stdout().write_all(json.as_bytes())?;
    println!();

    if approve {
        let bus = EventBus::new();
        let scheduler: Arc<dyn taskboard_core::SchedulerHandle> = Arc::new(taskboard_core::NoopSchedulerHandle);
        let (workspace_id, tasks) =
            approve_and_create(pool, &bus, scheduler.as_ref(), &plan_result, &goal, &work_dir, auto_start).await?;
        println!("created workspace {workspace_id} with {} tasks", tasks.len());
    }

    Ok(())
}

async fn cmd_workspace(pool: &sqlx::SqlitePool, command: WorkspaceCommands) -> Result<()> {
    let board = Board::new(pool.clone(), EventBus::new());
    match command {
        WorkspaceCommands::List => {
            let workspaces = board.list_workspaces().await?;
            for ws in workspaces {
                println!("{}  {}  {:?}", ws.id, ws.name, ws.status);
            }
        }
        WorkspaceCommands::Show { id } => {
            let ws = board.get_workspace(id).await?;
            println!("{}", serde_json::to_string_pretty(&ws)?);
        }
        WorkspaceCommands::Pause { id } => {
            let ws = board.pause_workspace(id).await?;
            println!("paused {}", ws.id);
        }
        WorkspaceCommands::Resume { id } => {
            let ws = board.resume_workspace(id).await?;
            println!("resumed {}", ws.id);
        }
    }
    Ok(())
}

async fn cmd_task(pool: &sqlx::SqlitePool, command: TaskCommands) -> Result<()> {
    let board = Board::new(pool.clone(), EventBus::new());
    match command {
        TaskCommands::List { workspace_id, status } => {
            let statuses = status.map(|s| parse_task_status(&s)).transpose()?.map(|s| vec![s]);
            let tasks = board.list_tasks(workspace_id, statuses.as_deref()).await?;
            for task in tasks {
                println!("{}  {:?}  {}", task.id, task.status, task.title);
            }
        }
        TaskCommands::Show { id } => {
            let task = board.get_task(&id).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskCommands::Start { id } => {
            let task = board.start_task(&id).await?;
            println!("started {}", task.id);
        }
        TaskCommands::Cancel { id } => {
            let task = board.cancel_task(&id).await?;
            println!("cancelled {}", task.id);
        }
        TaskCommands::Retry { id } => {
            let task = board.retry_task(&id).await?;
            println!("retrying {}", task.id);
        }
    }
    Ok(())
}

fn parse_task_status(s: &str) -> Result<TaskStatus> {
    s.parse::<TaskStatus>().map_err(|err| anyhow::anyhow!(err.to_string()))
}
