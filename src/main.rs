//! service-supervisor
//!
//! Runs an arbitrary program as a resilient service: single instance per
//! pid-file, restarted after crashes, stopped gracefully on SIGINT, SIGHUP
//! or SIGUSR2.
//!
//! # Architecture Overview
//!
//! ```text
//!   service-supervisor --config svc.toml -- <program> [args..]
//!
//!   ┌──────────────────────────┐   stdin: "stop"   ┌──────────────────────────┐
//!   │        supervisor        │ ────────────────▶ │          worker          │
//!   │  pid-file, restart loop, │                   │  exit coordinator,       │
//!   │  exit coordinator        │ ◀──────────────── │  pre-exit hook (SIGTERM) │
//!   └──────────────────────────┘    exit status    └────────────┬─────────────┘
//!                                                               │ spawn
//!                                                               ▼
//!                                                           <program>
//! ```
//!
//! Both roles run this same binary; the worker is the supervisor
//! re-executed with `SERVICE_SUPERVISOR_ROLE=worker`.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

use service_supervisor::command::CommandTask;
use service_supervisor::config::{load_config, LoggingConfig};
use service_supervisor::error::BoxError;
use service_supervisor::observability::{logging, metrics};
use service_supervisor::service::{Role, Service};
use service_supervisor::worker::WorkerHooks;

#[derive(Parser)]
#[command(name = "service-supervisor", version)]
#[command(about = "Run a program as a supervised service", long_about = None)]
struct Cli {
    /// Service configuration file (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Program to supervise, followed by its arguments
    #[arg(last = true, required = true)]
    command: Vec<OsString>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging(&LoggingConfig::default());
            tracing::error!(path = ?cli.config, error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.logging);

    let role = Role::current();
    if role == Role::Supervisor {
        tracing::info!(
            service = %config.name,
            pid_file = ?config.pid_file,
            stop_timeout_ms = config.stop_timeout_ms,
            "service-supervisor v{} starting",
            env!("CARGO_PKG_VERSION")
        );

        if let Some(address) = &config.metrics.address {
            match address.parse() {
                Ok(addr) => metrics::init_metrics(addr),
                Err(e) => tracing::error!(
                    address = %address,
                    error = %e,
                    "Failed to parse metrics address"
                ),
            }
        }
    }

    let mut command = cli.command.into_iter();
    let Some(program) = command.next() else {
        tracing::error!("No program given");
        std::process::exit(1);
    };
    let (task, handle) = CommandTask::new(program, command);
    let killer = handle.clone();

    let hooks = WorkerHooks::default().pre_exit(move |_fault| {
        let handle = handle.clone();
        async move { handle.stop().await.map_err(BoxError::from) }
    });

    let code = Service::new(config)
        .worker_hooks(hooks)
        .run(move |ctx| async move { task.run(ctx.shutdown).await.map_err(BoxError::from) })
        .await;

    // process::exit skips destructors; make sure the program dies with us.
    if code != 0 {
        killer.kill();
    }
    std::process::exit(code);
}
