//! `emberkv-server`: parses `-c`/`--config`, loads the TOML config,
//! installs logging and signal handling, and runs [`emberkv_engine::Server`]
//! until `SIGINT`/`SIGTERM`.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use config::Config;
use emberkv_engine::{install_signal_handlers, HotReloadConfig, Server};
use tracing::{error, warn};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "emberkv-server", version, about = "Single-threaded RESP-compatible key/value store")]
struct Args {
    /// Path to the TOML config file.
    #[arg(short = 'c', long = "config", default_value = "./config.toml")]
    config: PathBuf,
}

fn env_filter_for(loglevel: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(loglevel))
}

/// Logs a warning for any `SIGHUP`-ineligible field that actually
/// changed, rather than silently ignoring it (§4.12).
fn warn_on_structural_changes(old: &Config, new: &Config) {
    if old.bind != new.bind || old.port != new.port {
        warn!("config reload: bind/port changed but require a restart; ignoring");
    }
    if old.appendonly != new.appendonly {
        warn!("config reload: appendonly changed but requires a restart; ignoring");
    }
    if old.appendfilename != new.appendfilename {
        warn!("config reload: appendfilename changed but requires a restart; ignoring");
    }
    if old.databases != new.databases {
        warn!("config reload: databases changed but requires a restart; ignoring");
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (filter_layer, reload_handle) = reload::Layer::new(env_filter_for(&config.loglevel));

    let _log_guard = match config.logfile.as_deref() {
        Some(path) => {
            let log_path = PathBuf::from(path);
            let dir = log_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = log_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "emberkv.log".to_string());
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter_layer)
                .with(tracing_subscriber::fmt::layer().with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter_layer)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    };

    install_signal_handlers();

    let server_config = match config.to_server_config() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let mut server = match Server::bootstrap(server_config) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to start server");
            return ExitCode::FAILURE;
        }
    };

    let config_path = args.config.clone();
    let mut last_config = config;
    let on_reload = move || -> Option<HotReloadConfig> {
        match Config::load(&config_path) {
            Ok(new_config) => {
                warn_on_structural_changes(&last_config, &new_config);
                reload_handle
                    .reload(env_filter_for(&new_config.loglevel))
                    .unwrap_or_else(|e| warn!(error = %e, "failed to reload log filter"));
                let hot = new_config.to_hot_reload();
                last_config = new_config;
                match hot {
                    Ok(hot) => Some(hot),
                    Err(e) => {
                        warn!(error = %e, "invalid hot-reload config, keeping previous values");
                        None
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to reload config file");
                None
            }
        }
    };

    if let Err(e) = server.run(on_reload) {
        error!(error = %e, "server run loop failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
