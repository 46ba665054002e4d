use nad_core::bridge::HostEvent;
use nad_core::shell::{WindowOp, WindowSpec};
use nad_core::WindowRole;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("no window system is attached")]
    Detached,
    #[error("window {0} is not open")]
    NotOpen(WindowRole),
    #[error("{0} is not supported by this window system")]
    Unsupported(&'static str),
}

/// The process that physically owns the windows. Every call is addressed
/// by role because at most one window per role exists.
pub trait WindowSystem: Send {
    fn open(&mut self, role: WindowRole, spec: WindowSpec) -> Result<(), WindowError>;

    fn apply(&mut self, role: WindowRole, op: WindowOp) -> Result<(), WindowError>;

    fn emit(&mut self, role: WindowRole, event: HostEvent) -> Result<(), WindowError>;

    fn open_external(&mut self, url: &str) -> Result<(), WindowError>;

    /// Asks the window system to terminate; nothing is sent after this.
    fn exit(&mut self);
}

fn op_name(op: &WindowOp) -> &'static str {
    match op {
        WindowOp::SetBounds { .. } => "setBounds",
        WindowOp::ShowInactive => "showInactive",
        WindowOp::Hide => "hide",
        WindowOp::SetIgnoreMouseEvents { .. } => "setIgnoreMouseEvents",
        WindowOp::SetContentProtection { .. } => "setContentProtection",
        WindowOp::Minimize => "minimize",
        WindowOp::Restore => "restore",
        WindowOp::Focus => "focus",
        WindowOp::Reload => "reload",
        WindowOp::Close => "close",
    }
}

/// Tracks which roles currently have a live window and turns every operation
/// on a missing window into a no-op.
pub struct Windows {
    system: Box<dyn WindowSystem>,
    open: BTreeSet<WindowRole>,
}

impl Windows {
    pub fn new(system: Box<dyn WindowSystem>) -> Self {
        Self {
            system,
            open: BTreeSet::new(),
        }
    }

    pub fn is_open(&self, role: WindowRole) -> bool {
        self.open.contains(&role)
    }

    pub fn any_open(&self) -> bool {
        !self.open.is_empty()
    }

    /// Opens a window for `role` unless one exists. Returns whether a window
    /// was created.
    pub fn open(&mut self, role: WindowRole, spec: WindowSpec) -> bool {
        if self.open.contains(&role) {
            return false;
        }
        match self.system.open(role, spec) {
            Ok(()) => {
                debug!(event = "window_open", window = %role);
                self.open.insert(role);
                true
            }
            Err(err) => {
                warn!(event = "window_open_failed", window = %role, error = %err);
                false
            }
        }
    }

    /// Applies `op` if the window exists. Failures are logged, never raised.
    pub fn apply(&mut self, role: WindowRole, op: WindowOp) -> bool {
        if !self.open.contains(&role) {
            return false;
        }
        let name = op_name(&op);
        match self.system.apply(role, op) {
            Ok(()) => true,
            Err(err) => {
                warn!(event = "window_op_failed", window = %role, op = name, error = %err);
                false
            }
        }
    }

    pub fn emit(&mut self, role: WindowRole, event: HostEvent) -> bool {
        if !self.open.contains(&role) {
            return false;
        }
        let name = event.name();
        match self.system.emit(role, event) {
            Ok(()) => true,
            Err(err) => {
                warn!(event = "window_emit_failed", window = %role, host_event = name, error = %err);
                false
            }
        }
    }

    /// Closes the window and forgets it.
    pub fn close(&mut self, role: WindowRole) -> bool {
        if !self.open.remove(&role) {
            return false;
        }
        if let Err(err) = self.system.apply(role, WindowOp::Close) {
            warn!(event = "window_close_failed", window = %role, error = %err);
        }
        true
    }

    /// Records that the window system destroyed the window on its own.
    pub fn forget(&mut self, role: WindowRole) -> bool {
        self.open.remove(&role)
    }

    pub fn forget_all(&mut self) {
        self.open.clear();
    }

    pub fn open_external(&mut self, url: &str) -> bool {
        match self.system.open_external(url) {
            Ok(()) => true,
            Err(err) => {
                warn!(event = "open_external_failed", url, error = %err);
                false
            }
        }
    }

    pub fn exit(&mut self) {
        self.open.clear();
        self.system.exit();
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Recorded {
        Open(WindowRole, WindowSpec),
        Op(WindowRole, WindowOp),
        Event(WindowRole, HostEvent),
        External(String),
        Exit,
    }

    /// Window system that records every call and can refuse selected ops.
    #[derive(Clone, Default)]
    pub struct RecordingWindows {
        log: Arc<Mutex<Vec<Recorded>>>,
        refuse_click_through: bool,
    }

    impl RecordingWindows {
        pub fn refusing_click_through() -> Self {
            Self {
                refuse_click_through: true,
                ..Self::default()
            }
        }

        pub fn take(&self) -> Vec<Recorded> {
            std::mem::take(&mut *self.log.lock().unwrap())
        }

        pub fn ops(&self, role: WindowRole) -> Vec<WindowOp> {
            self.log
                .lock()
                .unwrap()
                .iter()
                .filter_map(|entry| match entry {
                    Recorded::Op(r, op) if *r == role => Some(op.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn events(&self, role: WindowRole) -> Vec<HostEvent> {
            self.log
                .lock()
                .unwrap()
                .iter()
                .filter_map(|entry| match entry {
                    Recorded::Event(r, event) if *r == role => Some(event.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn opened(&self, role: WindowRole) -> Vec<WindowSpec> {
            self.log
                .lock()
                .unwrap()
                .iter()
                .filter_map(|entry| match entry {
                    Recorded::Open(r, spec) if *r == role => Some(spec.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn all(&self) -> Vec<Recorded> {
            self.log.lock().unwrap().clone()
        }

        fn push(&self, entry: Recorded) {
            self.log.lock().unwrap().push(entry);
        }
    }

    impl WindowSystem for RecordingWindows {
        fn open(&mut self, role: WindowRole, spec: WindowSpec) -> Result<(), WindowError> {
            self.push(Recorded::Open(role, spec));
            Ok(())
        }

        fn apply(&mut self, role: WindowRole, op: WindowOp) -> Result<(), WindowError> {
            if self.refuse_click_through && matches!(op, WindowOp::SetIgnoreMouseEvents { .. }) {
                return Err(WindowError::Unsupported("setIgnoreMouseEvents"));
            }
            self.push(Recorded::Op(role, op));
            Ok(())
        }

        fn emit(&mut self, role: WindowRole, event: HostEvent) -> Result<(), WindowError> {
            self.push(Recorded::Event(role, event));
            Ok(())
        }

        fn open_external(&mut self, url: &str) -> Result<(), WindowError> {
            self.push(Recorded::External(url.to_string()));
            Ok(())
        }

        fn exit(&mut self) {
            self.push(Recorded::Exit);
        }
    }
}
