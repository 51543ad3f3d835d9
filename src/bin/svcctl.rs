use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;

use service_supervisor::config::load_config;
use service_supervisor::lifecycle::GRACEFUL_STOP;
use service_supervisor::liveness::{self, PidFile};
use service_supervisor::unit::{exec_start_for, ServiceUnit};

#[derive(Parser)]
#[command(name = "svcctl")]
#[command(about = "Management CLI for supervised services", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report whether the service recorded in a pid file is running
    Status {
        #[arg(short, long)]
        pid_file: PathBuf,
    },
    /// Ask the running service to stop and wait until it is gone
    Stop {
        #[arg(short, long)]
        pid_file: PathBuf,

        /// Give up after this many seconds (waits forever by default)
        #[arg(short, long)]
        timeout_secs: Option<u64>,
    },
    /// Print the systemd unit for a service
    Unit {
        #[arg(short, long)]
        config: PathBuf,

        /// Program the service runs, followed by its arguments
        #[arg(last = true)]
        command: Vec<OsString>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Status { pid_file } => {
            let pid = liveness::running_pid(&PidFile::new(pid_file));
            let status = json!({
                "running": pid.is_some(),
                "pid": pid.map(|pid| pid.as_raw()),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Stop {
            pid_file,
            timeout_secs,
        } => {
            let pid_file = PidFile::new(pid_file);
            let stop = liveness::request_stop(&pid_file, GRACEFUL_STOP);
            match timeout_secs {
                Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), stop).await {
                    Ok(result) => result?,
                    Err(_) => {
                        eprintln!("Error: service still running after {secs}s");
                        std::process::exit(1);
                    }
                },
                None => stop.await?,
            }
            println!("stopped");
        }
        Commands::Unit { config, command } => {
            let service = load_config(&config)?;
            let binary = std::env::current_exe()?.with_file_name("service-supervisor");
            let config_path = std::fs::canonicalize(&config)?;
            let exec_start = exec_start_for(&binary, &config_path, &command);
            print!("{}", ServiceUnit::from_config(&service, exec_start));
        }
    }

    Ok(())
}
