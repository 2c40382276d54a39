use clap::Parser;
use splitdns::config::{Config, LogConfig};
use splitdns::forward::Forwarder;
use std::path::PathBuf;

/// DNS forwarder that detects poisoned names and resolves them through a
/// tamper-resistant upstream.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "SPLITDNS_CONFIG")]
    config: Option<PathBuf>,
    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
    /// Reach the trusted resolver over plain UDP instead of TCP/SOCKS5
    /// (for resolvers listening on a non-standard port)
    #[arg(short = 'u', long)]
    trusted_udp: bool,
    /// Daemonize after initialization (handled by the service wrapper)
    #[arg(short, long)]
    daemon: bool,
    /// PID file used by the service wrapper
    #[arg(long)]
    pidfile: Option<PathBuf>,
    /// Log file
    #[arg(long)]
    logfile: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Config {
        let mut config = match &self.config {
            Some(path) => Config::load(path),
            None => Config::default(),
        };
        if self.verbose {
            config.log.verbose = true;
        }
        if self.trusted_udp {
            config.trusted.via_udp = true;
        }
        if self.daemon {
            config.process.daemon = true;
        }
        if let Some(pidfile) = self.pidfile {
            config.process.pidfile = Some(pidfile);
        }
        if let Some(logfile) = self.logfile {
            config.log.file = Some(logfile);
        }
        config
    }
}

fn init_logs(config: &LogConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, registry, EnvFilter};

    let default_level = if config.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match &config.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .expect("unable to open log file");
            let _ = registry()
                .with(filter)
                .with(fmt::layer().with_ansi(false).with_writer(std::sync::Arc::new(file)))
                .try_init();
        }
        None => {
            let _ = registry()
                .with(filter)
                .with(fmt::layer().with_ansi(cfg!(debug_assertions)))
                .try_init();
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::io::Result<()> {
    let config = Args::parse().into_config();
    init_logs(&config.log);

    if config.process.daemon {
        tracing::warn!("daemonization is left to the service manager");
    }
    if let Some(user) = &config.process.user {
        tracing::warn!("dropping privileges to {user:?} is left to the service manager");
    }

    let forwarder = Forwarder::bind(config).await?;
    let handle = forwarder.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.stop();
        }
    });
    forwarder.run().await;

    Ok(())
}
