use anyhow::{bail, Context, Result};
use axum::{routing::get, Router};
use clap::Parser;
use nad_core::Platform;
use nad_host::config::{default_env_file, default_ui_url, load_env_file};
use nad_host::{Host, HostConfig, HostInput};
use nad_store::{recover_settings_file, RecoveryKind, SettingsStore, SETTINGS_FILE_NAME};
use nad_supervisor::AgentBinaryConfig;
use std::{
    fs::OpenOptions,
    io::{self, Write},
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

mod shell;

use shell::{ShellSlot, ShellState, ShellWindowSystem};

const DEFAULT_SHELL_ADDR: &str = "127.0.0.1:6764";
const LOG_FILE_NAME: &str = "nad-desktop.log";
const HOST_STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    data_dir: PathBuf,
    resources_dir: PathBuf,
    agent_binary: Option<PathBuf>,
    dev: bool,
    ui_url: String,
    debug: bool,
    log_dir: PathBuf,
    write_timeout: Duration,
}

#[derive(Parser, Debug)]
#[command(name = "nad-desktop")]
struct Args {
    #[arg(long, default_value = "")]
    addr: String,
    #[arg(long, default_value = "")]
    data_dir: String,
    #[arg(long, default_value = "")]
    resources_dir: String,
    #[arg(long, default_value = "")]
    agent_binary: String,
    #[arg(long, default_value_t = false)]
    dev: bool,
    #[arg(long, default_value = "")]
    ui_url: String,
    #[arg(long, default_value_t = false)]
    debug: bool,
    #[arg(long, default_value = "")]
    log_dir: String,
    #[arg(long, default_value = "")]
    env_file: String,
    #[arg(long, default_value_t = 2)]
    write_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env_file = if args.env_file.trim().is_empty() {
        default_env_file()
    } else {
        PathBuf::from(&args.env_file)
    };
    // Before config resolution so the file can supply NAD_* variables.
    let env_loaded = load_env_file(&env_file);

    let config = load_config(&args);
    let _log_guard = init_logging(&config);
    match env_loaded {
        Ok(applied) => info!(event = "env_file", path = %env_file.display(), applied),
        Err(err) => warn!(event = "env_file_failed", path = %env_file.display(), error = %err),
    }
    install_panic_recovery(config.data_dir.join(SETTINGS_FILE_NAME));

    let addr: SocketAddr = config
        .addr
        .parse()
        .with_context(|| format!("invalid shell address {}", config.addr))?;
    if !addr.ip().is_loopback() {
        error!(event = "invalid_addr", addr = %config.addr);
        bail!("shell address {} is not a loopback address", config.addr);
    }

    let store = SettingsStore::open(&config.data_dir);
    let host_config = HostConfig::new(
        config.ui_url.clone(),
        AgentBinaryConfig {
            override_path: config.agent_binary.clone(),
            dev_mode: config.dev,
            resources_dir: config.resources_dir.clone(),
        },
        Platform::current(),
    );
    let slot = ShellSlot::default();
    let host = Host::new(host_config, store, Box::new(ShellWindowSystem::new(slot.clone())));
    let handle = host.handle();

    let stopped = Arc::new(Notify::new());
    let host_task = {
        let stopped = stopped.clone();
        tokio::spawn(async move {
            host.run().await;
            stopped.notify_one();
        })
    };

    let state = Arc::new(ShellState {
        host: handle.clone(),
        slot,
        write_timeout: config.write_timeout,
    });
    let app = Router::new()
        .route("/ws", get(shell::ws_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        event = "desktop_start",
        addr = %config.addr,
        data_dir = %config.data_dir.display(),
        ui_url = %config.ui_url,
        dev = config.dev
    );

    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(event = "signal_shutdown");
                let _ = handle.send(HostInput::Terminate);
            }
            _ = stopped.notified() => {}
        }
    };

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await;
    if let Err(err) = &served {
        error!(event = "shell_server_error", error = %err);
    }

    if tokio::time::timeout(HOST_STOP_TIMEOUT, host_task).await.is_err() {
        warn!(event = "host_stop_timeout");
    }
    info!(event = "desktop_stop");
    served.context("shell server")
}

fn load_config(args: &Args) -> Config {
    let dev = args.dev || env_true("NAD_DEV");
    let data_dir = resolve_data_dir(&args.data_dir);
    let resources_dir = resolve_resources_dir(&args.resources_dir);
    let ui_url = resolve_ui_url(&args.ui_url, dev, &resources_dir);
    Config {
        addr: resolve_addr(&args.addr),
        log_dir: resolve_log_dir(&args.log_dir, &data_dir),
        agent_binary: resolve_agent_binary(&args.agent_binary),
        debug: args.debug || env_true("NAD_DEBUG"),
        write_timeout: Duration::from_secs(args.write_timeout),
        data_dir,
        resources_dir,
        dev,
        ui_url,
    }
}

struct LogGuard {
    file: Option<Arc<Mutex<std::fs::File>>>,
}

fn init_logging(config: &Config) -> Option<LogGuard> {
    let level = if config.debug {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("NAD_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let writer = match open_log_file(&config.log_dir) {
        Ok(log_guard) => log_guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    let file = writer.file.clone();
    let stdout = !matches!(
        std::env::var("NAD_LOG_STDOUT").ok().as_deref().map(str::trim),
        Some("0" | "false" | "off" | "no")
    );
    let make_writer = BoxMakeWriter::new(move || MultiWriter::new(stdout, file.clone()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(writer)
}

struct MultiWriter {
    stdout: Option<io::Stdout>,
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl MultiWriter {
    fn new(stdout: bool, file: Option<Arc<Mutex<std::fs::File>>>) -> Self {
        Self {
            stdout: stdout.then(io::stdout),
            file,
        }
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(stdout) = &mut self.stdout {
            let _ = stdout.write_all(buf);
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(stdout) = &mut self.stdout {
            let _ = stdout.flush();
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

fn open_log_file(log_dir: &Path) -> io::Result<LogGuard> {
    if log_dir.as_os_str().is_empty() {
        return Ok(LogGuard { file: None });
    }
    if std::fs::create_dir_all(log_dir).is_err() {
        return Ok(LogGuard { file: None });
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE_NAME))?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
    })
}

/// Resets the settings file when a panic originates in the store, then hands
/// the panic to the previous hook.
fn install_panic_recovery(settings_path: PathBuf) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let message = panic
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();
        let location = panic
            .location()
            .map(|loc| loc.file().to_string())
            .unwrap_or_default();
        if panic_involves_store(&message, &location) {
            match recover_settings_file(&settings_path, RecoveryKind::Panic) {
                Ok(backup) => error!(
                    event = "store_panic_recovered",
                    backup = ?backup,
                    message = %message
                ),
                Err(err) => error!(event = "store_panic_recovery_failed", error = %err),
            }
        }
        previous(panic);
    }));
}

fn panic_involves_store(message: &str, location: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("settings")
        || message.contains(SETTINGS_FILE_NAME)
        || location.contains("nad-store")
        || location.contains("nad_store")
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn resolve_addr(addr_flag: &str) -> String {
    if !addr_flag.trim().is_empty() {
        return addr_flag.to_string();
    }
    env_non_empty("NAD_SHELL_ADDR").unwrap_or_else(|| DEFAULT_SHELL_ADDR.to_string())
}

fn resolve_data_dir(data_dir_flag: &str) -> PathBuf {
    if !data_dir_flag.trim().is_empty() {
        return PathBuf::from(data_dir_flag);
    }
    if let Some(value) = env_non_empty("NAD_DATA_DIR") {
        return PathBuf::from(value);
    }
    dirs::data_dir()
        .map(|dir| dir.join("neuralagent"))
        .unwrap_or_else(|| PathBuf::from(".neuralagent"))
}

fn resolve_resources_dir(resources_flag: &str) -> PathBuf {
    if !resources_flag.trim().is_empty() {
        return PathBuf::from(resources_flag);
    }
    if let Some(value) = env_non_empty("NAD_RESOURCES_DIR") {
        return PathBuf::from(value);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn resolve_agent_binary(binary_flag: &str) -> Option<PathBuf> {
    if !binary_flag.trim().is_empty() {
        return Some(PathBuf::from(binary_flag));
    }
    env_non_empty("NAD_AGENT_BINARY").map(PathBuf::from)
}

fn resolve_ui_url(ui_flag: &str, dev: bool, resources_dir: &Path) -> String {
    if !ui_flag.trim().is_empty() {
        return ui_flag.to_string();
    }
    env_non_empty("NAD_UI_URL").unwrap_or_else(|| default_ui_url(dev, resources_dir))
}

fn resolve_log_dir(log_dir_flag: &str, data_dir: &Path) -> PathBuf {
    if !log_dir_flag.trim().is_empty() {
        return PathBuf::from(log_dir_flag);
    }
    if let Some(value) = env_non_empty("NAD_LOG_DIR") {
        return PathBuf::from(value);
    }
    data_dir.join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_win_over_defaults() {
        assert_eq!(resolve_addr("127.0.0.1:9000"), "127.0.0.1:9000");
        assert_eq!(
            resolve_ui_url("http://localhost:3000", true, Path::new("/res")),
            "http://localhost:3000"
        );
        assert_eq!(
            resolve_log_dir("/tmp/nad-logs", Path::new("/data")),
            PathBuf::from("/tmp/nad-logs")
        );
        assert_eq!(
            resolve_agent_binary("/opt/agent"),
            Some(PathBuf::from("/opt/agent"))
        );
    }

    #[test]
    fn store_panics_are_recognised() {
        assert!(panic_involves_store("failed to parse settings", "src/main.rs"));
        assert!(panic_involves_store("boom", "crates/nad-store/src/lib.rs"));
        assert!(!panic_involves_store("index out of bounds", "crates/nad-host/src/overlay.rs"));
    }

    #[test]
    fn log_file_appends() {
        let dir = tempfile::tempdir().unwrap();
        let guard = open_log_file(dir.path()).unwrap();
        let mut writer = MultiWriter::new(false, guard.file.clone());
        writer.write_all(b"first\n").unwrap();
        writer.flush().unwrap();
        drop(guard);

        let guard = open_log_file(dir.path()).unwrap();
        let mut writer = MultiWriter::new(false, guard.file.clone());
        writer.write_all(b"second\n").unwrap();
        writer.flush().unwrap();

        let text = std::fs::read_to_string(dir.path().join(LOG_FILE_NAME)).unwrap();
        assert_eq!(text, "first\nsecond\n");
    }
}
