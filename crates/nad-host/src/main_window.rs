use crate::window::Windows;
use nad_core::bridge::HostEvent;
use nad_core::shell::{WindowOp, WindowSpec};
use nad_core::WindowRole;
use tracing::{debug, info};

pub const MAIN_WIDTH: i32 = 1050;
pub const MAIN_HEIGHT: i32 = 750;

const ROLE: WindowRole = WindowRole::Main;

/// Close negotiation for the main window. The window only closes after the
/// renderer acknowledges that every running task was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Open,
    AwaitingAck,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseRequest {
    /// Cancellation was requested from the renderer.
    CancelRequested,
    /// A close is already being negotiated.
    Ignored,
    /// Nothing to negotiate with; close right away.
    CloseNow,
}

pub struct MainWindowController {
    url: String,
    shutdown: ShutdownState,
    minimized_for_worker: bool,
}

impl MainWindowController {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            shutdown: ShutdownState::Open,
            minimized_for_worker: false,
        }
    }

    pub fn shutdown_state(&self) -> ShutdownState {
        self.shutdown
    }

    pub fn create(&mut self, windows: &mut Windows) -> bool {
        let spec = WindowSpec::page(self.url.clone(), MAIN_WIDTH, MAIN_HEIGHT).with_title("NeuralAgent");
        if !windows.open(ROLE, spec) {
            return false;
        }
        self.shutdown = ShutdownState::Open;
        self.minimized_for_worker = false;
        info!(event = "main_window_created");
        true
    }

    pub fn on_close_requested(&mut self, windows: &mut Windows) -> CloseRequest {
        match self.shutdown {
            ShutdownState::Open => {
                if !windows.emit(ROLE, HostEvent::TriggerCancelAllTasks) {
                    self.shutdown = ShutdownState::Closing;
                    return CloseRequest::CloseNow;
                }
                self.shutdown = ShutdownState::AwaitingAck;
                info!(event = "main_close_deferred");
                CloseRequest::CancelRequested
            }
            ShutdownState::AwaitingAck | ShutdownState::Closing => {
                debug!(event = "main_close_repeat_ignored", state = ?self.shutdown);
                CloseRequest::Ignored
            }
        }
    }

    /// Returns true when the acknowledgment completes a pending close.
    pub fn on_cancel_all_done(&mut self) -> bool {
        if self.shutdown != ShutdownState::AwaitingAck {
            debug!(event = "cancel_ack_unsolicited");
            return false;
        }
        self.shutdown = ShutdownState::Closing;
        true
    }

    pub fn close(&mut self, windows: &mut Windows) -> bool {
        self.shutdown = ShutdownState::Closing;
        windows.close(ROLE)
    }

    pub fn forget(&mut self, windows: &mut Windows) {
        windows.forget(ROLE);
        self.shutdown = ShutdownState::Open;
        self.minimized_for_worker = false;
    }

    pub fn minimize_for_worker(&mut self, windows: &mut Windows) {
        if windows.apply(ROLE, WindowOp::Minimize) {
            self.minimized_for_worker = true;
        }
    }

    /// Brings the window forward once a worker run ends, undoing
    /// [`MainWindowController::minimize_for_worker`] first if it applied.
    /// Returns whether a restore was issued; a second call only refocuses.
    pub fn restore_after_worker(&mut self, windows: &mut Windows) -> bool {
        let restore = std::mem::take(&mut self.minimized_for_worker);
        if !windows.is_open(ROLE) {
            return false;
        }
        if restore {
            windows.apply(ROLE, WindowOp::Restore);
        }
        windows.apply(ROLE, WindowOp::Focus);
        restore
    }

    /// Second-instance activation: restore if minimized, then focus.
    pub fn activate(&mut self, windows: &mut Windows) -> bool {
        if !windows.is_open(ROLE) {
            return false;
        }
        if std::mem::take(&mut self.minimized_for_worker) {
            windows.apply(ROLE, WindowOp::Restore);
        }
        windows.apply(ROLE, WindowOp::Focus);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::fake::RecordingWindows;

    fn open() -> (MainWindowController, Windows, RecordingWindows) {
        let recorder = RecordingWindows::default();
        let mut windows = Windows::new(Box::new(recorder.clone()));
        let mut main = MainWindowController::new("http://localhost:6763");
        assert!(main.create(&mut windows));
        recorder.take();
        (main, windows, recorder)
    }

    #[test]
    fn repeated_close_requests_cancel_once() {
        let (mut main, mut windows, recorder) = open();
        assert_eq!(main.on_close_requested(&mut windows), CloseRequest::CancelRequested);
        assert_eq!(main.on_close_requested(&mut windows), CloseRequest::Ignored);
        assert_eq!(main.on_close_requested(&mut windows), CloseRequest::Ignored);
        assert_eq!(recorder.events(ROLE), vec![HostEvent::TriggerCancelAllTasks]);
        assert_eq!(main.shutdown_state(), ShutdownState::AwaitingAck);
        assert!(recorder.ops(ROLE).is_empty());
    }

    #[test]
    fn acknowledgment_without_close_is_ignored() {
        let (mut main, mut windows, _recorder) = open();
        assert!(!main.on_cancel_all_done());
        assert_eq!(main.shutdown_state(), ShutdownState::Open);
        main.on_close_requested(&mut windows);
        assert!(main.on_cancel_all_done());
        assert!(!main.on_cancel_all_done());
        assert_eq!(main.shutdown_state(), ShutdownState::Closing);
    }

    #[test]
    fn restore_only_after_minimize_and_only_once() {
        let (mut main, mut windows, recorder) = open();
        main.minimize_for_worker(&mut windows);
        assert!(main.restore_after_worker(&mut windows));
        assert!(!main.restore_after_worker(&mut windows));
        assert_eq!(
            recorder.ops(ROLE),
            vec![
                WindowOp::Minimize,
                WindowOp::Restore,
                WindowOp::Focus,
                WindowOp::Focus
            ]
        );
    }

    #[test]
    fn worker_end_focuses_even_without_minimize() {
        let (mut main, mut windows, recorder) = open();
        assert!(!main.restore_after_worker(&mut windows));
        assert_eq!(recorder.ops(ROLE), vec![WindowOp::Focus]);
    }

    #[test]
    fn worker_end_leaves_closed_window_alone() {
        let (mut main, mut windows, recorder) = open();
        main.minimize_for_worker(&mut windows);
        main.forget(&mut windows);
        recorder.take();
        assert!(!main.restore_after_worker(&mut windows));
        assert!(recorder.ops(ROLE).is_empty());
    }

    #[test]
    fn main_window_uses_fixed_size() {
        let recorder = RecordingWindows::default();
        let mut windows = Windows::new(Box::new(recorder.clone()));
        MainWindowController::new("file:///res/app/index.html").create(&mut windows);
        let spec = &recorder.opened(ROLE)[0];
        assert_eq!((spec.width, spec.height), (MAIN_WIDTH, MAIN_HEIGHT));
        assert_eq!(spec.url, "file:///res/app/index.html");
    }
}
