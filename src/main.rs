use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use clonecell::backend::{Conductor, ConductorServer, RoleManifest};
use clonecell::connection::config::{ADMIN_PORT_VAR, APP_ID_VAR, APP_PORT_VAR, DEFAULT_APP_ID};
use clonecell::protocol::InterfaceScope;
use clonecell::{
    ApplicationView, ChannelConfig, LifecycleConfig, LifecyclePlan, Modifiers, RunReport,
    RunStatus, run_session,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clonecell")]
#[command(about = "Create, archive and delete clone cells of an installed app")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run create → archive → delete once against a running backend
    Run {
        #[arg(long)]
        app_id: Option<String>,
        #[arg(long, default_value = "clones")]
        role: String,
        #[arg(long, default_value = "some_seed")]
        network_seed: String,
        #[arg(long)]
        name: Option<String>,
        /// Overrides HC_PORT
        #[arg(long)]
        app_port: Option<u16>,
        /// Overrides ADMIN_PORT
        #[arg(long)]
        admin_port: Option<u16>,
        #[arg(long)]
        host: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Serve an in-memory backend on an app and an admin port
    Serve {
        #[arg(long, default_value = DEFAULT_APP_ID)]
        app_id: String,
        #[arg(long, default_value = "clones")]
        role: String,
        #[arg(long, default_value_t = 4)]
        clone_limit: u32,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8888)]
        app_port: u16,
        #[arg(long, default_value_t = 8889)]
        admin_port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            app_id,
            role,
            network_seed,
            name,
            app_port,
            admin_port,
            host,
            json,
        } => {
            let config = resolve_config(app_id, app_port, admin_port, host.as_deref())?;
            let mut plan = LifecyclePlan::new(&role, Modifiers::new().network_seed(&network_seed));
            if let Some(name) = name.as_deref() {
                plan = plan.named(name);
            }
            let report = run(config, plan).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&report.to_json())?);
            } else {
                render(&report);
            }
            Ok(if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Serve {
            app_id,
            role,
            clone_limit,
            host,
            app_port,
            admin_port,
        } => {
            serve(&app_id, &role, clone_limit, &host, app_port, admin_port).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve_config(
    app_id: Option<String>,
    app_port: Option<u16>,
    admin_port: Option<u16>,
    host: Option<&str>,
) -> Result<LifecycleConfig> {
    let endpoint = |port: Option<u16>, var: &str| -> Result<ChannelConfig> {
        let config = match port {
            Some(port) => ChannelConfig::new(port),
            None => ChannelConfig::from_env_port(var)
                .with_context(|| format!("pass --{} or set {}", flag_for(var), var))?,
        };
        Ok(match host {
            Some(host) => config.host(host),
            None => config,
        })
    };

    let app_id = app_id
        .or_else(|| std::env::var(APP_ID_VAR).ok())
        .unwrap_or_else(|| DEFAULT_APP_ID.to_string());

    let config = LifecycleConfig::new(
        &app_id,
        endpoint(app_port, APP_PORT_VAR)?,
        endpoint(admin_port, ADMIN_PORT_VAR)?,
    );
    config.validate().map_err(|e| anyhow!(e))?;
    Ok(config)
}

fn flag_for(var: &str) -> &'static str {
    if var == ADMIN_PORT_VAR {
        "admin-port"
    } else {
        "app-port"
    }
}

async fn run(config: LifecycleConfig, plan: LifecyclePlan) -> RunReport {
    let (status, mut updates) = watch::channel(RunStatus::Idle);

    let progress = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let status = updates.borrow_and_update().clone();
            match status {
                RunStatus::Running(step) => info!("loading: {}", step),
                RunStatus::Finished(_) => break,
                RunStatus::Idle => {}
            }
        }
    });

    let report = run_session(&config, plan, Arc::new(status)).await;
    let _ = progress.await;
    report
}

fn render(report: &RunReport) {
    println!("{}", report.summary());
    if let Some(view) = &report.final_view {
        render_view(view);
    }
}

fn render_view(view: &ApplicationView) {
    println!("app {}", view.app_id);
    for role in view.roles.values() {
        println!(
            "  role {} ({} active, {} archived, limit {})",
            role.role_name,
            role.active().count(),
            role.archived().count(),
            role.clone_limit
        );
        for clone in &role.clones {
            println!("    {} [{}] {}", clone.clone_id, clone.state, clone.cell_id);
        }
    }
}

async fn serve(
    app_id: &str,
    role: &str,
    clone_limit: u32,
    host: &str,
    app_port: u16,
    admin_port: u16,
) -> Result<()> {
    let conductor = Arc::new(Conductor::new());
    conductor
        .install_app(app_id, vec![RoleManifest::new(role, clone_limit)])
        .await
        .with_context(|| format!("installing '{}'", app_id))?;

    let app = ConductorServer::new(Arc::clone(&conductor), InterfaceScope::App, host, app_port);
    let admin = ConductorServer::new(conductor, InterfaceScope::Admin, host, admin_port);

    tokio::try_join!(app.run(), admin.run()).context("backend server stopped")?;
    Ok(())
}
