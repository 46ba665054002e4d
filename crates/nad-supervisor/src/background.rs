//! Background mode runs the worker inside an isolated environment. Only the
//! WSL-backed provider implements it; elsewhere background launches behave
//! like foreground ones.

use crate::binary::WorkerEnvironment;
use crate::process::{decode_output, run_captured, CommandSpec};
use nad_core::bridge::SetupResult;
use nad_core::Platform;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub const DEFAULT_DISTRIBUTION: &str = "NeuralOS";
pub const COMPANION_PORT: u16 = 39742;

const LAUNCH_SCRIPT: &str = "/agent/launch_bg_agent.sh";
const STOP_SCRIPT: &str = "/agent/stop_bg_agent.sh";
const AUTH_SCRIPT: &str = "/agent/background_mode_authentication.sh";
const AUTH_CLEANUP_SCRIPT: &str = "/agent/background_mode_authentication_cleanup.sh";
const SETUP_SCRIPT: &str = "/agent/setup_background_mode.sh";
const SETUP_FAILED: &str = "Setup Failed: Please ensure you have Windows 10 or higher and that virtualization is enabled in BIOS.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Virtualized,
    Unsupported,
}

pub trait BackgroundModeProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn supports_background(&self) -> bool {
        self.kind() == ProviderKind::Virtualized
    }

    /// Command that runs the worker inside the isolated environment.
    fn worker_command(&self, env: &WorkerEnvironment) -> Option<CommandSpec>;

    /// Local port the companion window content is served on.
    fn companion_port(&self) -> Option<u16>;

    fn teardown_command(&self) -> Option<CommandSpec>;

    fn auth_services_command(&self) -> Option<CommandSpec>;

    fn auth_cleanup_command(&self) -> Option<CommandSpec>;

    fn setup_command(&self) -> Option<CommandSpec>;

    fn readiness_command(&self) -> Option<CommandSpec>;

    /// Interprets the readiness command output.
    fn ready_from_output(&self, _stdout: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct VirtualizedProvider {
    pub distribution: String,
}

impl Default for VirtualizedProvider {
    fn default() -> Self {
        Self {
            distribution: DEFAULT_DISTRIBUTION.to_string(),
        }
    }
}

impl VirtualizedProvider {
    fn wsl_script(&self, script: &str) -> CommandSpec {
        CommandSpec::new("wsl").args(["-d", &self.distribution, "--", "bash", script])
    }
}

impl BackgroundModeProvider for VirtualizedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Virtualized
    }

    fn worker_command(&self, env: &WorkerEnvironment) -> Option<CommandSpec> {
        let mut vars = env.pairs();
        vars.retain(|(key, _)| key != crate::binary::ENV_AGENT_MODE);
        vars.push(("SKIP_LLM_API_KEY_VERIFICATION".to_string(), "true".to_string()));
        vars.push(("PYTHONUTF8".to_string(), "1".to_string()));
        let assignments: Vec<String> = vars
            .iter()
            .map(|(key, value)| format!("{key}=\"{}\"", escape_double_quoted(value)))
            .collect();
        let shell_command = format!("{} bash {LAUNCH_SCRIPT}", assignments.join(" "));
        Some(
            CommandSpec::new("wsl").args(["-d", &self.distribution, "--", "bash", "-c", &shell_command]),
        )
    }

    fn companion_port(&self) -> Option<u16> {
        Some(COMPANION_PORT)
    }

    fn teardown_command(&self) -> Option<CommandSpec> {
        Some(self.wsl_script(STOP_SCRIPT))
    }

    fn auth_services_command(&self) -> Option<CommandSpec> {
        Some(self.wsl_script(AUTH_SCRIPT))
    }

    fn auth_cleanup_command(&self) -> Option<CommandSpec> {
        Some(self.wsl_script(AUTH_CLEANUP_SCRIPT))
    }

    fn setup_command(&self) -> Option<CommandSpec> {
        Some(self.wsl_script(SETUP_SCRIPT))
    }

    fn readiness_command(&self) -> Option<CommandSpec> {
        Some(CommandSpec::new("wsl").args(["-l", "-q"]))
    }

    fn ready_from_output(&self, stdout: &str) -> bool {
        stdout
            .lines()
            .map(|line| line.trim().trim_matches('\0'))
            .any(|line| line.eq_ignore_ascii_case(&self.distribution))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedProvider;

impl BackgroundModeProvider for UnsupportedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Unsupported
    }

    fn worker_command(&self, _env: &WorkerEnvironment) -> Option<CommandSpec> {
        None
    }

    fn companion_port(&self) -> Option<u16> {
        None
    }

    fn teardown_command(&self) -> Option<CommandSpec> {
        None
    }

    fn auth_services_command(&self) -> Option<CommandSpec> {
        None
    }

    fn auth_cleanup_command(&self) -> Option<CommandSpec> {
        None
    }

    fn setup_command(&self) -> Option<CommandSpec> {
        None
    }

    fn readiness_command(&self) -> Option<CommandSpec> {
        None
    }
}

pub fn select_provider(platform: Platform) -> Box<dyn BackgroundModeProvider> {
    match platform {
        Platform::Windows => Box::new(VirtualizedProvider::default()),
        Platform::Macos | Platform::Linux => Box::new(UnsupportedProvider),
    }
}

fn escape_double_quoted(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$")
        .replace('`', "\\`")
}

pub async fn check_ready(provider: &dyn BackgroundModeProvider) -> bool {
    let Some(spec) = provider.readiness_command() else {
        return true;
    };
    match run_captured(&spec).await {
        Ok(captured) if captured.success() => {
            provider.ready_from_output(&decode_output(&captured.stdout))
        }
        Ok(captured) => {
            warn!(event = "background_ready_check_failed", code = ?captured.code);
            false
        }
        Err(err) => {
            warn!(event = "background_ready_check_failed", error = %err);
            false
        }
    }
}

/// Runs a maintenance script to completion, logging failures.
pub async fn run_best_effort(spec: Option<CommandSpec>, label: &'static str) {
    let Some(spec) = spec else {
        return;
    };
    match run_captured(&spec).await {
        Ok(captured) if captured.success() => info!(event = "script_done", script = label),
        Ok(captured) => warn!(
            event = "script_failed",
            script = label,
            code = ?captured.code,
            stderr = %decode_output(&captured.stderr).trim()
        ),
        Err(err) => warn!(event = "script_failed", script = label, error = %err),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupSignal {
    Status(String),
    Progress(u8),
}

pub fn parse_setup_line(line: &str) -> Option<SetupSignal> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(rest) = trimmed.strip_prefix("PROGRESS") {
        if let Ok(pct) = rest.trim().trim_end_matches('%').parse::<u8>() {
            return Some(SetupSignal::Progress(pct.min(100)));
        }
    }
    Some(SetupSignal::Status(trimmed.to_string()))
}

/// Runs the provider's setup script, reporting each output line.
pub async fn run_setup<F>(provider: &dyn BackgroundModeProvider, mut on_signal: F) -> SetupResult
where
    F: FnMut(SetupSignal),
{
    let Some(spec) = provider.setup_command() else {
        return SetupResult::ok();
    };
    let mut cmd = spec.to_command(false);
    cmd.stderr(Stdio::null());
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(event = "background_setup_spawn_failed", error = %err);
            return SetupResult::failed(SETUP_FAILED);
        }
    };
    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(signal) = parse_setup_line(&line) {
                on_signal(signal);
            }
        }
    }
    match child.wait().await {
        Ok(status) if status.success() => SetupResult::ok(),
        Ok(status) => {
            warn!(event = "background_setup_failed", code = ?status.code());
            SetupResult::failed(SETUP_FAILED)
        }
        Err(err) => SetupResult::failed(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nad_core::AgentMode;

    fn env() -> WorkerEnvironment {
        WorkerEnvironment {
            api_url: "http://192.168.8.101:8000".to_string(),
            thread_id: Some("thread-9".to_string()),
            access_token: "to\"k$en".to_string(),
            mode: AgentMode::BackgroundAgent,
        }
    }

    #[test]
    fn virtualized_worker_runs_launch_script_in_distribution() {
        let provider = VirtualizedProvider::default();
        let spec = provider.worker_command(&env()).expect("command");
        assert_eq!(spec.display_program(), "wsl");
        assert_eq!(&spec.args[..5], ["-d", "NeuralOS", "--", "bash", "-c"]);
        let script = &spec.args[5];
        assert!(script.starts_with("NEURALAGENT_API_URL=\"http://192.168.8.101:8000\""));
        assert!(script.contains("NEURALAGENT_THREAD_ID=\"thread-9\""));
        assert!(script.contains("NEURALAGENT_USER_ACCESS_TOKEN=\"to\\\"k\\$en\""));
        assert!(script.contains("SKIP_LLM_API_KEY_VERIFICATION=\"true\""));
        assert!(script.ends_with("bash /agent/launch_bg_agent.sh"));
    }

    #[test]
    fn unsupported_provider_has_no_commands() {
        let provider = UnsupportedProvider;
        assert!(!provider.supports_background());
        assert!(provider.worker_command(&env()).is_none());
        assert!(provider.companion_port().is_none());
        assert!(provider.teardown_command().is_none());
    }

    #[test]
    fn provider_selection_by_platform() {
        assert_eq!(select_provider(Platform::Windows).kind(), ProviderKind::Virtualized);
        assert_eq!(select_provider(Platform::Macos).kind(), ProviderKind::Unsupported);
        assert_eq!(select_provider(Platform::Linux).kind(), ProviderKind::Unsupported);
    }

    #[test]
    fn readiness_matches_distribution_line() {
        let provider = VirtualizedProvider::default();
        assert!(provider.ready_from_output("Ubuntu\r\nNeuralOS\r\n"));
        assert!(!provider.ready_from_output("Ubuntu\r\n"));
    }

    #[test]
    fn setup_lines_split_into_progress_and_status() {
        assert_eq!(parse_setup_line("PROGRESS 40"), Some(SetupSignal::Progress(40)));
        assert_eq!(parse_setup_line("PROGRESS 140%"), Some(SetupSignal::Progress(100)));
        assert_eq!(
            parse_setup_line("  Importing distribution "),
            Some(SetupSignal::Status("Importing distribution".to_string()))
        );
        assert_eq!(parse_setup_line("   "), None);
    }

    #[tokio::test]
    async fn unsupported_is_always_ready_and_setup_is_noop() {
        assert!(check_ready(&UnsupportedProvider).await);
        let mut seen = Vec::new();
        let result = run_setup(&UnsupportedProvider, |signal| seen.push(signal)).await;
        assert!(result.success);
        assert!(seen.is_empty());
    }
}
