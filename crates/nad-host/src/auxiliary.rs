//! Background-mode windows: setup progress, service authentication and the
//! live view of a background run. The last two show content served by the
//! background environment, so they only open once its port answers.

use crate::bridge::HostInput;
use crate::window::Windows;
use nad_core::shell::{WindowOp, WindowSpec};
use nad_core::WindowRole;
use nad_supervisor::background::{run_best_effort, BackgroundModeProvider};
use nad_supervisor::probe::{wait_for_port_ready, ProbeConfig};
use nad_supervisor::ServiceHandle;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub const SETUP_WIDTH: i32 = 600;
pub const SETUP_HEIGHT: i32 = 300;
pub const COMPANION_WIDTH: i32 = 1350;
pub const COMPANION_HEIGHT: i32 = 780;

/// Which window a readiness probe is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Companion {
    AgentWindow { run_id: u64 },
    AuthWindow,
}

pub fn setup_spec(url: String) -> WindowSpec {
    let mut spec = WindowSpec::page(url, SETUP_WIDTH, SETUP_HEIGHT).with_title("Setting up Background Mode");
    spec.resizable = false;
    spec.modal = true;
    spec
}

pub fn companion_spec(url: String, title: &str) -> WindowSpec {
    WindowSpec::page(url, COMPANION_WIDTH, COMPANION_HEIGHT).with_title(title)
}

/// Probes the companion port off the host task and reports the outcome.
pub fn spawn_companion_probe(
    inbox: mpsc::UnboundedSender<HostInput>,
    probe: ProbeConfig,
    companion: Companion,
) {
    tokio::spawn(async move {
        let input = match wait_for_port_ready(probe).await {
            Ok(()) => HostInput::CompanionReady(companion),
            Err(err) => {
                warn!(event = "companion_probe_failed", companion = ?companion, error = %err);
                HostInput::CompanionFailed(companion)
            }
        };
        let _ = inbox.send(input);
    });
}

#[derive(Default)]
pub struct AuxiliaryWindows {
    auth_services: Option<ServiceHandle>,
    auth_pending: bool,
}

impl AuxiliaryWindows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Auth services are starting or serving the auth window.
    pub fn auth_busy(&self) -> bool {
        self.auth_pending
            || self
                .auth_services
                .as_ref()
                .map(ServiceHandle::is_running)
                .unwrap_or(false)
    }

    pub fn auth_pending(&self) -> bool {
        self.auth_pending
    }

    /// Opens the setup window, or focuses it when setup is already running.
    /// Returns whether a new setup should start.
    pub fn open_setup(&mut self, windows: &mut Windows, url: String) -> bool {
        if windows.is_open(WindowRole::BackgroundSetup) {
            windows.apply(WindowRole::BackgroundSetup, WindowOp::Focus);
            return false;
        }
        windows.open(WindowRole::BackgroundSetup, setup_spec(url))
    }

    /// Starts the auth services. Returns false when an auth sequence is
    /// already underway or the auth window is open.
    pub fn begin_auth(&mut self, windows: &Windows, provider: &dyn BackgroundModeProvider) -> bool {
        if self.auth_pending || windows.is_open(WindowRole::BackgroundAuth) {
            return false;
        }
        if let Some(spec) = provider.auth_services_command() {
            match ServiceHandle::spawn(&spec, "bg-auth") {
                Ok(handle) => self.auth_services = Some(handle),
                Err(err) => warn!(event = "auth_services_spawn_failed", error = %err),
            }
        }
        self.auth_pending = true;
        true
    }

    pub fn auth_ready(&mut self, windows: &mut Windows, url: String) -> bool {
        if !std::mem::take(&mut self.auth_pending) {
            return false;
        }
        let opened = windows.open(
            WindowRole::BackgroundAuth,
            companion_spec(url, "NeuralAgent Background Auth"),
        );
        info!(event = "auth_window_ready", opened);
        opened
    }

    /// Runs the provider's auth cleanup and stops the services.
    pub fn end_auth(&mut self, provider: &dyn BackgroundModeProvider) {
        self.auth_pending = false;
        tokio::spawn(run_best_effort(
            provider.auth_cleanup_command(),
            "background_auth_cleanup",
        ));
        if let Some(mut handle) = self.auth_services.take() {
            handle.stop();
        }
    }

    pub fn open_agent_window(&mut self, windows: &mut Windows, url: String) -> bool {
        windows.open(
            WindowRole::BackgroundAgent,
            companion_spec(url, "NeuralAgent Background Task"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::fake::RecordingWindows;
    use nad_supervisor::background::UnsupportedProvider;

    #[test]
    fn setup_window_is_modal_and_fixed() {
        let spec = setup_spec("http://localhost:6763/#/background-setup".to_string());
        assert_eq!((spec.width, spec.height), (600, 300));
        assert!(spec.modal);
        assert!(!spec.resizable);
    }

    #[test]
    fn second_setup_focuses_existing_window() {
        let recorder = RecordingWindows::default();
        let mut windows = Windows::new(Box::new(recorder.clone()));
        let mut aux = AuxiliaryWindows::new();
        assert!(aux.open_setup(&mut windows, "u".to_string()));
        assert!(!aux.open_setup(&mut windows, "u".to_string()));
        assert_eq!(recorder.opened(WindowRole::BackgroundSetup).len(), 1);
        assert_eq!(
            recorder.ops(WindowRole::BackgroundSetup),
            vec![WindowOp::Focus]
        );
    }

    #[tokio::test]
    async fn auth_sequence_opens_once() {
        let recorder = RecordingWindows::default();
        let mut windows = Windows::new(Box::new(recorder.clone()));
        let mut aux = AuxiliaryWindows::new();
        assert!(aux.begin_auth(&windows, &UnsupportedProvider));
        assert!(!aux.begin_auth(&windows, &UnsupportedProvider));
        assert!(aux.auth_busy());
        assert!(aux.auth_ready(&mut windows, "u".to_string()));
        assert!(!aux.auth_ready(&mut windows, "u".to_string()));
        assert!(!aux.begin_auth(&windows, &UnsupportedProvider));

        aux.end_auth(&UnsupportedProvider);
        assert!(!aux.auth_busy());
        let spec = &recorder.opened(WindowRole::BackgroundAuth)[0];
        assert_eq!((spec.width, spec.height), (1350, 780));
    }
}
