use crate::auxiliary::{spawn_companion_probe, AuxiliaryWindows, Companion};
use crate::bridge::{send_reply, HostHandle, HostInput, Reply};
use crate::config::HostConfig;
use crate::main_window::{CloseRequest, MainWindowController};
use crate::overlay::OverlayController;
use crate::permissions::{probe_for, PermissionProbe};
use crate::updates::{DisabledUpdates, UpdateService};
use crate::window::{WindowSystem, Windows};
use nad_core::bridge::{failure_reply, success_reply, DownloadProgress, HostEvent, RendererCommand};
use nad_core::shell::{MenuAction, WindowOp};
use nad_core::{AgentLaunchRequest, AgentMode, Platform, WindowRole, WorkArea};
use nad_store::{keys, SettingsStore};
use nad_supervisor::background::{check_ready, run_best_effort, run_setup, BackgroundModeProvider, SetupSignal};
use nad_supervisor::suggestions::fetch_suggestions;
use nad_supervisor::{
    resolve_agent_binary, select_provider, CommandSpec, FinishedRun, RunMeta, WorkerEnvironment,
    WorkerNotice, WorkerPhase, WorkerSupervisor,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// The application context. One task owns it; every input is handled to
/// completion before the next one is read.
pub struct Host {
    config: HostConfig,
    store: SettingsStore,
    windows: Windows,
    main: MainWindowController,
    overlay: OverlayController,
    aux: AuxiliaryWindows,
    supervisor: WorkerSupervisor,
    provider: Arc<dyn BackgroundModeProvider>,
    permissions: Arc<dyn PermissionProbe>,
    updates: Arc<dyn UpdateService>,
    inbox_tx: mpsc::UnboundedSender<HostInput>,
    inbox: mpsc::UnboundedReceiver<HostInput>,
    notices: mpsc::UnboundedReceiver<WorkerNotice>,
    restores: mpsc::UnboundedReceiver<u64>,
    quit_requested: bool,
    exited: bool,
}

impl Host {
    pub fn new(config: HostConfig, store: SettingsStore, window_system: Box<dyn WindowSystem>) -> Self {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let (notice_tx, notices) = mpsc::unbounded_channel();
        let (restore_tx, restores) = mpsc::unbounded_channel();
        let platform = config.platform;
        Self {
            main: MainWindowController::new(config.page_url(WindowRole::Main)),
            overlay: OverlayController::new(config.page_url(WindowRole::Overlay), restore_tx),
            aux: AuxiliaryWindows::new(),
            supervisor: WorkerSupervisor::new(notice_tx),
            provider: Arc::from(select_provider(platform)),
            permissions: Arc::from(probe_for(platform)),
            updates: Arc::new(DisabledUpdates),
            windows: Windows::new(window_system),
            config,
            store,
            inbox_tx,
            inbox,
            notices,
            restores,
            quit_requested: false,
            exited: false,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn BackgroundModeProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionProbe>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_updates(mut self, updates: Arc<dyn UpdateService>) -> Self {
        self.updates = updates;
        self
    }

    pub fn handle(&self) -> HostHandle {
        HostHandle::new(self.inbox_tx.clone())
    }

    pub fn worker_phase(&self) -> WorkerPhase {
        self.supervisor.phase()
    }

    pub fn has_exited(&self) -> bool {
        self.exited
    }

    pub async fn run(mut self) {
        self.start();
        while !self.exited {
            if !self.next_input().await {
                break;
            }
        }
        if let Some(run) = self.supervisor.stop().await {
            info!(event = "worker_stopped_on_exit", run_id = run.run_id);
        }
        info!(event = "host_stopped");
    }

    /// Startup work that does not need a window.
    pub fn start(&mut self) {
        match self.store.ensure_device_id() {
            Ok(device_id) => info!(event = "host_start", device_id = %device_id, platform = ?self.config.platform),
            Err(err) => warn!(event = "device_id_failed", error = %err),
        }
        if let Some(delay) = self.config.update_check_delay {
            let updates = self.updates.clone();
            let inbox = self.inbox_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tokio::task::spawn_blocking(move || check_updates(updates.as_ref(), &inbox)).await;
            });
        }
    }

    /// Waits for and handles one input. Returns false once every source is
    /// closed.
    pub async fn next_input(&mut self) -> bool {
        tokio::select! {
            Some(input) = self.inbox.recv() => self.handle_input(input).await,
            Some(notice) = self.notices.recv() => self.on_worker_notice(notice),
            Some(generation) = self.restores.recv() => {
                self.overlay.on_restore_timer(&mut self.windows, generation);
            }
            else => return false,
        }
        true
    }

    pub async fn handle_input(&mut self, input: HostInput) {
        match input {
            HostInput::ShellConnected { platform, work_area } => {
                self.on_shell_connected(platform, work_area)
            }
            HostInput::ShellDisconnected => self.on_shell_disconnected().await,
            HostInput::Command {
                window,
                command,
                reply,
            } => self.handle_command(window, command, reply).await,
            HostInput::CloseRequested(role) => self.on_close_requested(role).await,
            HostInput::Closed(role) => self.on_window_closed(role).await,
            HostInput::WorkArea(area) => self.overlay.set_work_area(area),
            HostInput::Activate => self.on_activate(),
            HostInput::Menu(action) => self.on_menu(action).await,
            HostInput::Quit => self.request_quit().await,
            HostInput::Terminate => {
                self.stop_agent().await;
                self.exit();
            }
            HostInput::CompanionReady(companion) => self.on_companion_ready(companion),
            HostInput::CompanionFailed(companion) => self.on_companion_failed(companion),
            HostInput::Setup(signal) => {
                let event = match signal {
                    SetupSignal::Status(message) => HostEvent::SetupStatus(message),
                    SetupSignal::Progress(percent) => HostEvent::SetupProgress(percent),
                };
                self.windows.emit(WindowRole::BackgroundSetup, event);
            }
            HostInput::SetupFinished { result, reply } => {
                info!(event = "background_setup_finished", success = result.success);
                self.windows
                    .emit(WindowRole::BackgroundSetup, HostEvent::SetupComplete(result.clone()));
                if result.success {
                    self.launch_background_auth();
                }
                send_reply(reply, serde_json::to_value(&result).unwrap_or(Value::Null));
            }
            HostInput::Emit { window, event } => {
                self.windows.emit(window, event);
            }
        }
    }

    async fn handle_command(&mut self, window: Option<WindowRole>, command: RendererCommand, reply: Option<Reply>) {
        debug!(event = "renderer_command", command = command.name(), window = ?window);
        let value = match command {
            RendererCommand::SetToken { token } => {
                self.store_set(keys::ACCESS_TOKEN, token);
                self.overlay.create(&mut self.windows);
                Value::Null
            }
            RendererCommand::GetToken => self.store_value(keys::ACCESS_TOKEN),
            RendererCommand::DeleteToken => {
                self.store_delete(keys::ACCESS_TOKEN);
                self.overlay.close(&mut self.windows);
                Value::Null
            }
            RendererCommand::SetRefreshToken { token } => {
                self.store_set(keys::REFRESH_TOKEN, token);
                Value::Null
            }
            RendererCommand::GetRefreshToken => self.store_value(keys::REFRESH_TOKEN),
            RendererCommand::DeleteRefreshToken => {
                self.store_delete(keys::REFRESH_TOKEN);
                Value::Null
            }
            RendererCommand::SetDarkMode { enabled } => {
                self.store_set(keys::DARK_MODE, enabled.to_string());
                self.overlay.reload(&mut self.windows);
                Value::Null
            }
            RendererCommand::IsDarkMode => self.store_value(keys::DARK_MODE),
            RendererCommand::LaunchAiAgent(request) => {
                self.launch_agent(request).await;
                Value::Null
            }
            RendererCommand::StopAiAgent => {
                self.stop_agent().await;
                Value::Null
            }
            RendererCommand::ExpandOverlay { has_suggestions } => {
                self.overlay.set_expanded(&mut self.windows, true, has_suggestions);
                Value::Null
            }
            RendererCommand::MinimizeOverlay => {
                self.overlay.set_expanded(&mut self.windows, false, false);
                Value::Null
            }
            RendererCommand::HideOverlayTemporarily { duration_ms } => {
                self.overlay
                    .hide_temporarily(&mut self.windows, Duration::from_millis(duration_ms));
                Value::Null
            }
            RendererCommand::ShowOverlay => {
                self.overlay.show(&mut self.windows);
                Value::Null
            }
            RendererCommand::HideOverlay => {
                self.overlay.hide(&mut self.windows);
                Value::Null
            }
            RendererCommand::SetOverlayClickThrough { enabled } => {
                self.overlay.set_click_through(&mut self.windows, enabled);
                Value::Null
            }
            RendererCommand::GetSuggestions { base_url } => {
                return self.fetch_suggestions(base_url, reply);
            }
            RendererCommand::GetLastBackgroundModeValue => {
                self.store_value(keys::LAST_BACKGROUND_MODE_VALUE)
            }
            RendererCommand::StartBackgroundSetup => return self.start_background_setup(reply),
            RendererCommand::IsBackgroundModeReady => {
                let provider = self.provider.clone();
                tokio::spawn(async move {
                    let ready = check_ready(provider.as_ref()).await;
                    send_reply(reply, Value::Bool(ready));
                });
                return;
            }
            RendererCommand::CheckPermissions => {
                let probe = self.permissions.clone();
                return reply_blocking(reply, move || {
                    serde_json::to_value(probe.check_all()).unwrap_or(Value::Null)
                });
            }
            RendererCommand::RequestAccessibility => {
                let probe = self.permissions.clone();
                return reply_blocking(reply, move || Value::Bool(probe.request_accessibility()));
            }
            RendererCommand::RequestScreenRecording => {
                let probe = self.permissions.clone();
                return reply_blocking(reply, move || Value::Bool(probe.request_screen_recording()));
            }
            RendererCommand::OpenSystemPreferences { permission } => {
                let probe = self.permissions.clone();
                return reply_blocking(reply, move || {
                    Value::Bool(probe.open_system_preferences(&permission))
                });
            }
            RendererCommand::CheckForUpdates => {
                let updates = self.updates.clone();
                let inbox = self.inbox_tx.clone();
                return reply_blocking(reply, move || check_updates(updates.as_ref(), &inbox));
            }
            RendererCommand::DownloadUpdate => {
                let updates = self.updates.clone();
                let inbox = self.inbox_tx.clone();
                return reply_blocking(reply, move || download_update(updates.as_ref(), &inbox));
            }
            RendererCommand::InstallUpdate => {
                let updates = self.updates.clone();
                let inbox = self.inbox_tx.clone();
                return reply_blocking(reply, move || {
                    if let Err(err) = updates.install() {
                        warn!(event = "update_install_failed", error = %err);
                        emit_main(&inbox, HostEvent::UpdateError(err.to_string()));
                    }
                    Value::Null
                });
            }
            RendererCommand::GetAppVersion => Value::String(self.config.app_version.clone()),
            RendererCommand::OpenExternal { url } => {
                self.windows.open_external(&url);
                Value::Null
            }
            RendererCommand::GetAppManagementShown => {
                Value::String(self.store.get_or(keys::APP_MANAGEMENT_SHOWN, "false"))
            }
            RendererCommand::SetAppManagementShown => {
                self.store_set(keys::APP_MANAGEMENT_SHOWN, "true");
                Value::Null
            }
            RendererCommand::CancelAllTasksDone => {
                if self.main.on_cancel_all_done() {
                    self.close_main().await;
                }
                Value::Null
            }
        };
        send_reply(reply, value);
    }

    async fn launch_agent(&mut self, request: AgentLaunchRequest) {
        self.store_set(
            keys::LAST_BACKGROUND_MODE_VALUE,
            request.background_mode.to_string(),
        );
        if let Some(previous) = self.supervisor.stop().await {
            self.finish_run(previous);
        }

        let mode = AgentMode::for_launch(request.background_mode);
        let env = WorkerEnvironment {
            api_url: request.base_url.clone(),
            thread_id: Some(request.thread_id.clone()),
            access_token: self.store.get_string(keys::ACCESS_TOKEN).unwrap_or_default(),
            mode,
        };
        let provider_command = if request.background_mode && self.provider.supports_background() {
            self.provider.worker_command(&env)
        } else {
            None
        };
        let virtualized = provider_command.is_some();
        let spec = provider_command
            .unwrap_or_else(|| CommandSpec::new(self.agent_binary()).envs(env.pairs()));
        if !virtualized {
            self.main.minimize_for_worker(&mut self.windows);
        }

        let meta = RunMeta {
            thread_id: request.thread_id.clone(),
            mode,
            virtualized,
        };
        match self.supervisor.launch(&spec, meta).await {
            Ok(outcome) => {
                if virtualized {
                    if let Some(port) = self.provider.companion_port() {
                        spawn_companion_probe(
                            self.inbox_tx.clone(),
                            self.config.companion_probe(port),
                            Companion::AgentWindow {
                                run_id: outcome.run_id,
                            },
                        );
                    }
                }
                let event = HostEvent::AiAgentLaunch {
                    thread_id: request.thread_id,
                    background_mode: request.background_mode,
                    aux_payload: request.aux_payload,
                };
                self.windows.emit(WindowRole::Main, event.clone());
                self.windows.emit(WindowRole::Overlay, event);
                self.overlay.set_expanded(&mut self.windows, true, false);
            }
            Err(err) => {
                error!(event = "agent_launch_failed", error = %err);
                self.supervisor.settle();
                self.main.restore_after_worker(&mut self.windows);
                self.windows
                    .emit(WindowRole::Main, HostEvent::TriggerCancelAllTasks);
            }
        }
    }

    async fn stop_agent(&mut self) {
        match self.supervisor.stop().await {
            Some(run) => self.finish_run(run),
            None => debug!(event = "agent_stop_idle"),
        }
    }

    fn on_worker_notice(&mut self, notice: WorkerNotice) {
        if let Some(run) = self.supervisor.on_notice(notice) {
            self.finish_run(run);
        }
    }

    /// Exit cleanup for a run that is no longer current. Runs once per run.
    fn finish_run(&mut self, run: FinishedRun) {
        let abnormal = run.is_abnormal();
        info!(
            event = "agent_cleanup",
            run_id = run.run_id,
            thread_id = %run.meta.thread_id,
            stopped = run.exit.is_none(),
            abnormal
        );
        self.windows.close(WindowRole::BackgroundAgent);
        if run.meta.virtualized {
            tokio::spawn(run_best_effort(
                self.provider.teardown_command(),
                "stop_background_agent",
            ));
        }
        self.main.restore_after_worker(&mut self.windows);
        self.windows.emit(WindowRole::Main, HostEvent::AiAgentExit);
        self.windows.emit(WindowRole::Overlay, HostEvent::AiAgentExit);
        if abnormal {
            self.windows
                .emit(WindowRole::Main, HostEvent::TriggerCancelAllTasks);
        }
        self.supervisor.settle();
    }

    fn fetch_suggestions(&mut self, base_url: String, reply: Option<Reply>) {
        let env = WorkerEnvironment {
            api_url: base_url,
            thread_id: None,
            access_token: self.store.get_string(keys::ACCESS_TOKEN).unwrap_or_default(),
            mode: AgentMode::Suggestor,
        };
        let spec = CommandSpec::new(self.agent_binary()).envs(env.pairs());
        tokio::spawn(async move {
            let value = match fetch_suggestions(&spec).await {
                Ok(value) => value,
                Err(err) => failure_reply(err),
            };
            send_reply(reply, value);
        });
    }

    fn start_background_setup(&mut self, reply: Option<Reply>) {
        if !self.provider.supports_background() {
            return send_reply(reply, Value::Null);
        }
        let url = self.config.page_url(WindowRole::BackgroundSetup);
        if !self.aux.open_setup(&mut self.windows, url) {
            return send_reply(reply, Value::Null);
        }
        let provider = self.provider.clone();
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let signals = inbox.clone();
            let result = run_setup(provider.as_ref(), move |signal| {
                let _ = signals.send(HostInput::Setup(signal));
            })
            .await;
            let _ = inbox.send(HostInput::SetupFinished { result, reply });
        });
    }

    fn launch_background_auth(&mut self) {
        let Some(port) = self.provider.companion_port() else {
            return;
        };
        if !self.aux.begin_auth(&self.windows, self.provider.as_ref()) {
            return;
        }
        spawn_companion_probe(
            self.inbox_tx.clone(),
            self.config.companion_probe(port),
            Companion::AuthWindow,
        );
    }

    fn on_companion_ready(&mut self, companion: Companion) {
        match companion {
            Companion::AgentWindow { run_id } => {
                let current = self.supervisor.active().map(|active| active.run_id);
                if current != Some(run_id) {
                    debug!(event = "agent_window_stale", run_id);
                    return;
                }
                let url = self.config.page_url(WindowRole::BackgroundAgent);
                self.aux.open_agent_window(&mut self.windows, url);
            }
            Companion::AuthWindow => {
                let url = self.config.page_url(WindowRole::BackgroundAuth);
                if !self.aux.auth_ready(&mut self.windows, url) {
                    self.aux.end_auth(self.provider.as_ref());
                }
            }
        }
    }

    fn on_companion_failed(&mut self, companion: Companion) {
        if companion == Companion::AuthWindow && self.aux.auth_pending() {
            self.aux.end_auth(self.provider.as_ref());
        }
    }

    fn on_shell_connected(&mut self, platform: Option<Platform>, work_area: WorkArea) {
        info!(
            event = "shell_connected",
            platform = ?platform,
            width = work_area.width,
            height = work_area.height
        );
        self.overlay.set_work_area(work_area);
        if !self.windows.is_open(WindowRole::Main) {
            self.main.create(&mut self.windows);
        }
        if self.has_token() {
            self.overlay.create(&mut self.windows);
        }
    }

    async fn on_shell_disconnected(&mut self) {
        warn!(event = "shell_disconnected");
        self.main.forget(&mut self.windows);
        self.overlay.forget(&mut self.windows);
        self.windows.forget_all();
        if self.aux.auth_busy() {
            self.aux.end_auth(self.provider.as_ref());
        }
        self.after_window_closed().await;
    }

    fn on_activate(&mut self) {
        if self.windows.any_open() {
            self.main.activate(&mut self.windows);
            return;
        }
        self.main.create(&mut self.windows);
        self.overlay.create(&mut self.windows);
    }

    async fn on_menu(&mut self, action: MenuAction) {
        info!(event = "menu_action", action = ?action);
        match action {
            MenuAction::Logout => {
                self.overlay.close(&mut self.windows);
                self.windows.emit(WindowRole::Main, HostEvent::TriggerLogout);
            }
            MenuAction::BackgroundAuth => {
                if !self.provider.supports_background() {
                    return;
                }
                if self.supervisor.is_running() || self.aux.auth_busy() {
                    debug!(event = "background_auth_busy");
                    return;
                }
                self.launch_background_auth();
            }
            MenuAction::Quit => self.request_quit().await,
        }
    }

    async fn on_close_requested(&mut self, role: WindowRole) {
        match role {
            WindowRole::Main => match self.main.on_close_requested(&mut self.windows) {
                CloseRequest::CloseNow => self.close_main().await,
                CloseRequest::CancelRequested | CloseRequest::Ignored => {}
            },
            WindowRole::Overlay => {
                self.overlay.close(&mut self.windows);
                self.after_window_closed().await;
            }
            WindowRole::BackgroundAuth => {
                self.windows.close(role);
                self.aux.end_auth(self.provider.as_ref());
                self.after_window_closed().await;
            }
            WindowRole::BackgroundAgent | WindowRole::BackgroundSetup => {
                self.windows.close(role);
                self.after_window_closed().await;
            }
        }
    }

    async fn on_window_closed(&mut self, role: WindowRole) {
        match role {
            WindowRole::Main => {
                self.main.forget(&mut self.windows);
                self.close_dependents();
            }
            WindowRole::Overlay => self.overlay.forget(&mut self.windows),
            WindowRole::BackgroundAuth => {
                if self.windows.forget(role) {
                    self.aux.end_auth(self.provider.as_ref());
                }
            }
            WindowRole::BackgroundAgent | WindowRole::BackgroundSetup => {
                self.windows.forget(role);
            }
        }
        self.after_window_closed().await;
    }

    /// The acknowledged close: main first, then everything hanging off it.
    async fn close_main(&mut self) {
        info!(event = "main_window_closing");
        self.main.close(&mut self.windows);
        self.close_dependents();
        self.after_window_closed().await;
    }

    fn close_dependents(&mut self) {
        self.overlay.close(&mut self.windows);
        self.windows.close(WindowRole::BackgroundAgent);
        self.windows.close(WindowRole::BackgroundSetup);
        if self.windows.close(WindowRole::BackgroundAuth) || self.aux.auth_busy() {
            self.aux.end_auth(self.provider.as_ref());
        }
    }

    async fn after_window_closed(&mut self) {
        if self.exited || self.windows.any_open() {
            return;
        }
        if let Some(run) = self.supervisor.stop().await {
            info!(event = "worker_stopped_all_windows_closed", run_id = run.run_id);
            self.finish_run(run);
        }
        if self
            .config
            .platform
            .quits_when_windows_closed(self.quit_requested)
        {
            self.exit();
        }
    }

    async fn request_quit(&mut self) {
        info!(event = "quit_requested");
        self.quit_requested = true;
        self.overlay.cancel_restore();
        if self.windows.is_open(WindowRole::Main) {
            self.on_close_requested(WindowRole::Main).await;
            return;
        }
        self.close_dependents();
        self.after_window_closed().await;
    }

    fn exit(&mut self) {
        if self.exited {
            return;
        }
        info!(event = "host_exit");
        self.overlay.cancel_restore();
        if self.aux.auth_busy() {
            self.aux.end_auth(self.provider.as_ref());
        }
        self.windows.exit();
        self.exited = true;
    }

    fn agent_binary(&self) -> PathBuf {
        resolve_agent_binary(&self.config.agent_binary, self.config.platform)
    }

    fn has_token(&self) -> bool {
        self.store
            .get_string(keys::ACCESS_TOKEN)
            .map(|token| !token.is_empty())
            .unwrap_or(false)
    }

    fn store_value(&self, key: &str) -> Value {
        self.store
            .get_string(key)
            .map(Value::String)
            .unwrap_or(Value::Null)
    }

    fn store_set(&mut self, key: &str, value: impl Into<Value>) {
        if let Err(err) = self.store.set(key, value) {
            warn!(event = "store_write_failed", key, error = %err);
        }
    }

    fn store_delete(&mut self, key: &str) {
        if let Err(err) = self.store.delete(key) {
            warn!(event = "store_write_failed", key, error = %err);
        }
    }
}

fn reply_blocking<F>(reply: Option<Reply>, work: F)
where
    F: FnOnce() -> Value + Send + 'static,
{
    tokio::task::spawn_blocking(move || send_reply(reply, work()));
}

fn emit_main(inbox: &mpsc::UnboundedSender<HostInput>, event: HostEvent) {
    let _ = inbox.send(HostInput::Emit {
        window: WindowRole::Main,
        event,
    });
}

fn check_updates(updates: &dyn UpdateService, inbox: &mpsc::UnboundedSender<HostInput>) -> Value {
    match updates.check() {
        Ok(Some(info)) => {
            info!(event = "update_available", version = %info.version);
            let value = serde_json::to_value(&info).unwrap_or(Value::Null);
            emit_main(inbox, HostEvent::UpdateAvailable(info));
            success_reply(Some(("updateInfo", value)))
        }
        Ok(None) => {
            emit_main(inbox, HostEvent::UpdateNotAvailable);
            success_reply(Some(("updateInfo", Value::Null)))
        }
        Err(err) => {
            warn!(event = "update_check_failed", error = %err);
            emit_main(inbox, HostEvent::UpdateError(err.to_string()));
            failure_reply(err)
        }
    }
}

fn download_update(updates: &dyn UpdateService, inbox: &mpsc::UnboundedSender<HostInput>) -> Value {
    let progress_inbox = inbox.clone();
    let mut on_progress = move |progress: DownloadProgress| {
        emit_main(&progress_inbox, HostEvent::DownloadProgress(progress))
    };
    match updates.download(&mut on_progress) {
        Ok(info) => {
            emit_main(inbox, HostEvent::UpdateDownloaded(info));
            success_reply(None)
        }
        Err(err) => {
            warn!(event = "update_download_failed", error = %err);
            emit_main(inbox, HostEvent::UpdateError(err.to_string()));
            failure_reply(err)
        }
    }
}
