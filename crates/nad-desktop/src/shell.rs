use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, ConnectInfo, State},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use nad_core::bridge::{failure_reply, HostEvent};
use nad_core::shell::{ShellInbound, ShellOutbound, WindowOp, WindowSpec, MAX_SHELL_FRAME_BYTES};
use nad_core::WindowRole;
use nad_host::{HostHandle, HostInput, WindowError, WindowSystem};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type Outbound = mpsc::UnboundedSender<ShellOutbound>;

/// The attached shell connection, if any. Shared between the socket handler
/// and the host's window system.
#[derive(Clone, Default)]
pub struct ShellSlot {
    inner: Arc<Mutex<Option<Outbound>>>,
}

impl ShellSlot {
    fn lock(&self) -> MutexGuard<'_, Option<Outbound>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Attaches a connection unless a live one is already attached.
    fn attach(&self, tx: Outbound) -> bool {
        let mut slot = self.lock();
        if slot.as_ref().map(|current| !current.is_closed()).unwrap_or(false) {
            return false;
        }
        *slot = Some(tx);
        true
    }

    /// Detaches `tx` if it is still the attached connection.
    fn detach(&self, tx: &Outbound) -> bool {
        let mut slot = self.lock();
        if slot.as_ref().map(|current| current.same_channel(tx)).unwrap_or(false) {
            *slot = None;
            return true;
        }
        false
    }

    fn send(&self, frame: ShellOutbound) -> Result<(), WindowError> {
        let slot = self.lock();
        let tx = slot.as_ref().ok_or(WindowError::Detached)?;
        tx.send(frame).map_err(|_| WindowError::Detached)
    }
}

/// Window system backed by the connected shell process.
pub struct ShellWindowSystem {
    slot: ShellSlot,
}

impl ShellWindowSystem {
    pub fn new(slot: ShellSlot) -> Self {
        Self { slot }
    }
}

impl WindowSystem for ShellWindowSystem {
    fn open(&mut self, role: WindowRole, spec: WindowSpec) -> Result<(), WindowError> {
        self.slot.send(ShellOutbound::OpenWindow { window: role, spec })
    }

    fn apply(&mut self, role: WindowRole, op: WindowOp) -> Result<(), WindowError> {
        self.slot.send(ShellOutbound::Window { window: role, op })
    }

    fn emit(&mut self, role: WindowRole, event: HostEvent) -> Result<(), WindowError> {
        self.slot.send(ShellOutbound::Event {
            window: role,
            event,
        })
    }

    fn open_external(&mut self, url: &str) -> Result<(), WindowError> {
        self.slot.send(ShellOutbound::OpenExternal {
            url: url.to_string(),
        })
    }

    fn exit(&mut self) {
        if self.slot.send(ShellOutbound::Exit).is_err() {
            debug!(event = "shell_exit_unsent");
        }
    }
}

pub struct ShellState {
    pub host: HostHandle,
    pub slot: ShellSlot,
    pub write_timeout: Duration,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<ShellState>>,
) -> impl IntoResponse {
    if !addr.ip().is_loopback() {
        return axum::http::StatusCode::FORBIDDEN.into_response();
    }
    ws.max_message_size(MAX_SHELL_FRAME_BYTES)
        .on_upgrade(move |socket| async move {
            handle_socket(state, socket, addr).await;
        })
}

fn message_bytes(msg: Message) -> Option<Vec<u8>> {
    match msg {
        Message::Text(text) => Some(text.into_bytes()),
        Message::Binary(bytes) => Some(bytes),
        _ => None,
    }
}

async fn handle_socket(state: Arc<ShellState>, socket: WebSocket, remote: SocketAddr) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ShellOutbound>();
    let write_timeout = state.write_timeout;
    let write_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(err) => {
                    warn!(event = "shell_encode_failed", error = %err);
                    continue;
                }
            };
            let exiting = matches!(frame, ShellOutbound::Exit);
            let send = ws_sender.send(Message::Text(text));
            if tokio::time::timeout(write_timeout, send).await.is_err() {
                warn!(event = "shell_write_timeout");
                return;
            }
            if exiting {
                let _ = ws_sender.close().await;
                return;
            }
        }
    });

    let first = match ws_receiver.next().await {
        Some(Ok(msg)) => msg,
        _ => return,
    };
    let Some(data) = message_bytes(first) else {
        return;
    };
    if data.len() > MAX_SHELL_FRAME_BYTES {
        warn!(event = "hello_too_large", remote = %remote);
        return;
    }
    let (platform, work_area) = match serde_json::from_slice::<ShellInbound>(&data) {
        Ok(ShellInbound::Hello {
            platform,
            work_area,
        }) => (platform, work_area),
        Ok(_) => {
            warn!(event = "expected_hello", remote = %remote);
            return;
        }
        Err(err) => {
            warn!(event = "hello_parse", remote = %remote, error = %err);
            return;
        }
    };
    if !state.slot.attach(tx.clone()) {
        warn!(event = "shell_already_attached", remote = %remote);
        return;
    }
    info!(event = "handshake_ok", remote = %remote, platform = ?platform);
    if state
        .host
        .send(HostInput::ShellConnected {
            platform,
            work_area,
        })
        .is_err()
    {
        state.slot.detach(&tx);
        return;
    }

    while let Some(result) = ws_receiver.next().await {
        let msg = match result {
            Ok(value) => value,
            Err(err) => {
                warn!(event = "read_error", remote = %remote, error = %err);
                break;
            }
        };
        let data = match msg {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(bytes) => bytes,
            Message::Close(_) => {
                info!(event = "shell_close", remote = %remote);
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        if data.len() > MAX_SHELL_FRAME_BYTES {
            warn!(event = "message_too_large", remote = %remote, size = data.len());
            continue;
        }
        let inbound: ShellInbound = match serde_json::from_slice(&data) {
            Ok(value) => value,
            Err(err) => {
                warn!(event = "message_invalid", remote = %remote, error = %err);
                if let Some(reply) = reply_for_undecodable(&data, &err) {
                    let _ = tx.send(reply);
                }
                continue;
            }
        };
        if !dispatch(&state.host, &tx, inbound) {
            break;
        }
    }

    if state.slot.detach(&tx) {
        let _ = state.host.send(HostInput::ShellDisconnected);
    }
    drop(tx);
    let _ = write_task.await;
}

/// A command frame that failed to decode still owes its sender a reply when
/// it carries a request id.
fn reply_for_undecodable(data: &[u8], err: &serde_json::Error) -> Option<ShellOutbound> {
    let frame: Value = serde_json::from_slice(data).ok()?;
    if frame.get("type").and_then(Value::as_str) != Some("command") {
        return None;
    }
    let request_id = frame.get("requestId").and_then(Value::as_str)?;
    Some(ShellOutbound::Reply {
        request_id: request_id.to_string(),
        value: failure_reply(err),
    })
}

/// Forwards one shell frame to the host. Returns false once the host is gone.
fn dispatch(host: &HostHandle, tx: &Outbound, inbound: ShellInbound) -> bool {
    let input = match inbound {
        ShellInbound::Hello { .. } => {
            debug!(event = "hello_repeated");
            return true;
        }
        ShellInbound::Command {
            request_id,
            window,
            command,
        } => {
            let Some(request_id) = request_id else {
                return host.notify(window, command).is_ok();
            };
            // Submitting here keeps commands in read order; only the wait
            // for the reply moves off the read loop.
            let Ok(reply) = host.submit(window, command) else {
                return false;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Ok(value) = reply.await {
                    let _ = tx.send(ShellOutbound::Reply { request_id, value });
                }
            });
            return true;
        }
        ShellInbound::CloseRequested { window } => HostInput::CloseRequested(window),
        ShellInbound::Closed { window } => HostInput::Closed(window),
        ShellInbound::WorkArea { work_area } => HostInput::WorkArea(work_area),
        ShellInbound::Activate => HostInput::Activate,
        ShellInbound::Menu { action } => HostInput::Menu(action),
        ShellInbound::Quit => HostInput::Quit,
    };
    host.send(input).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_shell_rejects_window_calls() {
        let mut system = ShellWindowSystem::new(ShellSlot::default());
        assert!(matches!(
            system.apply(WindowRole::Main, WindowOp::Focus),
            Err(WindowError::Detached)
        ));
    }

    fn decode_error(data: &[u8]) -> serde_json::Error {
        serde_json::from_slice::<ShellInbound>(data).unwrap_err()
    }

    #[test]
    fn unknown_command_with_request_id_gets_failure_reply() {
        let data = br#"{"type":"command","requestId":"r-9","command":{"command":"noSuchCommand"}}"#;
        let err = decode_error(data);
        let Some(ShellOutbound::Reply { request_id, value }) = reply_for_undecodable(data, &err)
        else {
            panic!("expected a reply frame");
        };
        assert_eq!(request_id, "r-9");
        assert_eq!(value["success"], Value::Bool(false));
        assert!(value["error"].as_str().is_some_and(|e| !e.is_empty()));
    }

    #[test]
    fn undecodable_frames_without_request_id_stay_silent() {
        let fire_and_forget = br#"{"type":"command","command":{"command":"noSuchCommand"}}"#;
        assert!(reply_for_undecodable(fire_and_forget, &decode_error(fire_and_forget)).is_none());

        let not_a_command = br#"{"type":"closed","requestId":"r-1","window":"nowhere"}"#;
        assert!(reply_for_undecodable(not_a_command, &decode_error(not_a_command)).is_none());

        let garbage = b"{not json";
        assert!(reply_for_undecodable(garbage, &decode_error(garbage)).is_none());
    }

    #[test]
    fn slot_keeps_first_live_connection() {
        let slot = ShellSlot::default();
        let (first, mut first_rx) = mpsc::unbounded_channel();
        let (second, _second_rx) = mpsc::unbounded_channel();
        assert!(slot.attach(first.clone()));
        assert!(!slot.attach(second.clone()));
        assert!(!slot.detach(&second));

        let mut system = ShellWindowSystem::new(slot.clone());
        system.apply(WindowRole::Overlay, WindowOp::Hide).unwrap();
        assert_eq!(
            first_rx.try_recv().unwrap(),
            ShellOutbound::Window {
                window: WindowRole::Overlay,
                op: WindowOp::Hide
            }
        );

        assert!(slot.detach(&first));
        drop(first_rx);
        assert!(slot.attach(second));
    }
}
