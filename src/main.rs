use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use satlog::manager::SystemProfile;
use satlog::server::{self, TelemetryServer};
use satlog::TelemetryStore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = "Satellite telemetry store", long_about = None)]
struct Args {
    #[clap(long, default_value = "127.0.0.1:8000")]
    addr: SocketAddr,

    /// Append-only data file
    #[clap(long, default_value = "telemetry.log")]
    data_file: PathBuf,

    /// Keep records in memory only
    #[clap(long)]
    in_memory: bool,

    /// Allowed CORS origin (repeatable)
    #[clap(long = "cors-origin", default_value = "http://localhost:5173")]
    cors_origins: Vec<String>,

    /// Override the detected worker thread count
    #[clap(long)]
    workers: Option<usize>,

    /// Skip fsync after each write
    #[clap(long)]
    buffered: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let profile = SystemProfile::detect().with_overrides(args.workers, args.buffered);

    println!("--- [Satlog Resource Manager] ---");
    println!("Detected Cores: {}", profile.logical_cores);
    println!("Worker Threads: {}", profile.worker_threads);
    println!("Durability Mode: {}", profile.durability);
    println!("---------------------------------");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
    .worker_threads(profile.worker_threads)
    .enable_all()
    .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(args, profile)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn async_main(args: Args, profile: SystemProfile) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,satlog=info"));
    tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_level(true)
    .init();

    for origin in &args.cors_origins {
        server::check_origin(origin)?;
    }

    let store = if args.in_memory {
        info!("Running with an in-memory store; records will not survive restart");
        TelemetryStore::in_memory()
    } else {
        info!(path = %args.data_file.display(), "Initializing Storage Engine...");
        let data_file = args.data_file.clone();
        let strict = profile.durability.is_strict();
        tokio::task::spawn_blocking(move || TelemetryStore::open(&data_file, strict)).await??
    };
    let store = Arc::new(store);

    println!("Satlog API listening on {}", args.addr);
    println!("Node is Ready.");

    let server = TelemetryServer::new(store.clone(), args.cors_origins.clone());
    server
    .run(args.addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
    })
    .await?;

    println!("Shutting down.");
    drop(store);
    Ok(())
}
