//! Inbox of the host actor. The shell server and the host's own background
//! tasks talk to the host only through [`HostInput`] messages.

use crate::auxiliary::Companion;
use nad_core::bridge::{BridgeError, HostEvent, RendererCommand, SetupResult};
use nad_core::shell::MenuAction;
use nad_core::{Platform, WindowRole, WorkArea};
use nad_supervisor::background::SetupSignal;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

pub type Reply = oneshot::Sender<Value>;

#[derive(Debug)]
pub enum HostInput {
    ShellConnected {
        platform: Option<Platform>,
        work_area: WorkArea,
    },
    ShellDisconnected,
    Command {
        window: Option<WindowRole>,
        command: RendererCommand,
        reply: Option<Reply>,
    },
    CloseRequested(WindowRole),
    Closed(WindowRole),
    WorkArea(WorkArea),
    Activate,
    Menu(MenuAction),
    Quit,
    /// Process shutdown: stop the worker and exit without negotiating.
    Terminate,
    CompanionReady(Companion),
    CompanionFailed(Companion),
    Setup(SetupSignal),
    SetupFinished {
        result: SetupResult,
        reply: Option<Reply>,
    },
    Emit {
        window: WindowRole,
        event: HostEvent,
    },
}

#[derive(Debug, Clone)]
pub struct HostHandle {
    tx: mpsc::UnboundedSender<HostInput>,
}

impl HostHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<HostInput>) -> Self {
        Self { tx }
    }

    pub fn send(&self, input: HostInput) -> Result<(), BridgeError> {
        self.tx.send(input).map_err(|_| BridgeError::HostClosed)
    }

    /// Queues a command whose reply nobody waits for.
    pub fn notify(&self, window: Option<WindowRole>, command: RendererCommand) -> Result<(), BridgeError> {
        self.send(HostInput::Command {
            window,
            command,
            reply: None,
        })
    }

    /// Queues a command and returns a receiver for its reply. The command is
    /// in the inbox once this returns, so callers keep ordering even if they
    /// await replies elsewhere.
    pub fn submit(
        &self,
        window: Option<WindowRole>,
        command: RendererCommand,
    ) -> Result<oneshot::Receiver<Value>, BridgeError> {
        let (reply, rx) = oneshot::channel();
        self.send(HostInput::Command {
            window,
            command,
            reply: Some(reply),
        })?;
        Ok(rx)
    }

    pub async fn request(
        &self,
        window: Option<WindowRole>,
        command: RendererCommand,
    ) -> Result<Value, BridgeError> {
        let rx = self.submit(window, command)?;
        rx.await.map_err(|_| BridgeError::HostClosed)
    }
}

pub(crate) fn send_reply(reply: Option<Reply>, value: Value) {
    if let Some(reply) = reply {
        let _ = reply.send(value);
    }
}
