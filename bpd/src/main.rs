// bpd - headless JDWP breakpoint daemon
//
// Attaches to a JVM, installs the breakpoints from a JSON file and logs every
// hit. Stopped threads resume on Enter, or at once with --auto-resume.

use anyhow::{Context, Result};
use breakpoint_engine::{
    BreakpointRegistry, BreakpointSet, DebugSession, DirectorySourceResolver, JsonFileStore,
    PersistenceStore, SourceRoot,
};
use clap::Parser;
use jdwp_client::JdwpConnection;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

mod config;
mod facade;
mod listener;
mod session;

use config::DaemonConfig;
use facade::JdwpFacade;
use listener::LoggingListener;
use session::{EventPump, ResumeMode};

#[derive(Debug, Parser)]
#[command(name = "bpd", version, about = "Headless JDWP breakpoint daemon")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debuggee host
    #[arg(long)]
    host: Option<String>,

    /// Debuggee JDWP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Breakpoint file
    #[arg(short, long)]
    breakpoints: Option<PathBuf>,

    /// Source root used to map classes to files (repeatable)
    #[arg(long = "source-root")]
    source_roots: Vec<String>,

    /// Resume after each stop instead of waiting for Enter
    #[arg(long)]
    auto_resume: bool,

    /// Stop on exceptions nobody catches
    #[arg(long)]
    catch_uncaught: bool,
}

impl Cli {
    fn into_config(self) -> Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::load(path)?,
            None => DaemonConfig::default(),
        };
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(path) = self.breakpoints {
            config.breakpoints_file = path;
        }
        config
            .source_roots
            .extend(self.source_roots.into_iter().map(SourceRoot::new));
        config.auto_resume |= self.auto_resume;
        config.engine.catch_uncaught_exceptions |= self.catch_uncaught;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout stays free for the debuggee's console when run side by side
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bpd=info".parse()?)
                .add_directive("breakpoint_engine=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Cli::parse().into_config()?;
    run(config).await
}

async fn run(config: DaemonConfig) -> Result<()> {
    let store = JsonFileStore::new(&config.breakpoints_file);
    let breakpoints = BreakpointSet::new();
    let loaded = store
        .load_into(&breakpoints)
        .with_context(|| format!("loading {}", store.path().display()))?;
    info!(count = loaded.len(), "breakpoints loaded");

    info!(host = %config.host, port = config.port, "attaching");
    let conn = JdwpConnection::connect(&config.host, config.port)
        .await
        .with_context(|| format!("connecting to {}:{}", config.host, config.port))?;
    let facade = JdwpFacade::attach(conn).await.context("attaching to VM")?;

    let sources = Arc::new(DirectorySourceResolver::new(config.source_roots.clone()));
    let session = DebugSession::builder("bpd", facade.clone(), sources)
        .breakpoints(breakpoints.clone())
        .config(config.engine.clone())
        .build();
    session.add_listener(Arc::new(LoggingListener));

    let registry = BreakpointRegistry::new(session);
    registry.on_session_running().await?;
    registry.flush().await?;
    info!(engines = registry.engine_count(), "breakpoints submitted");

    let resume = if config.auto_resume {
        ResumeMode::Auto
    } else {
        ResumeMode::Manual(resume_on_enter())
    };
    let mut pump = EventPump::new(facade.clone(), resume);

    let interrupted = tokio::select! {
        result = pump.run(&registry) => {
            if let Err(e) = result {
                error!(error = %e, "event loop failed");
            }
            false
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, detaching");
            true
        }
    };

    registry.flush().await.ok();
    if let Err(e) = store.save_set(&breakpoints) {
        warn!(error = %e, "failed to save breakpoints");
    }
    if interrupted {
        // Detaching resumes the VM and drops every request
        if let Err(e) = facade.connection().dispose().await {
            warn!(error = %e, "dispose failed");
        }
    }
    registry.on_session_disconnected().await.ok();
    info!("detached");
    Ok(())
}

/// One signal per line typed on stdin
fn resume_on_enter() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });
    rx
}
