//! Renderer bridge protocol: the commands the UI may issue and the events the
//! host pushes back. Everything crossing the bridge is one of these types.

use crate::AgentLaunchRequest;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;

pub const DEFAULT_TEMPORARY_HIDE_MS: u64 = 3000;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid command: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("host is not running")]
    HostClosed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", content = "args", rename_all = "camelCase")]
pub enum RendererCommand {
    SetToken {
        token: String,
    },
    GetToken,
    DeleteToken,
    SetRefreshToken {
        token: String,
    },
    GetRefreshToken,
    DeleteRefreshToken,
    SetDarkMode {
        enabled: bool,
    },
    IsDarkMode,
    #[serde(rename = "launchAIAgent")]
    LaunchAiAgent(AgentLaunchRequest),
    #[serde(rename = "stopAIAgent")]
    StopAiAgent,
    ExpandOverlay {
        #[serde(default, rename = "hasSuggestions")]
        has_suggestions: bool,
    },
    MinimizeOverlay,
    HideOverlayTemporarily {
        #[serde(default = "default_hide_ms", rename = "durationMs")]
        duration_ms: u64,
    },
    ShowOverlay,
    HideOverlay,
    SetOverlayClickThrough {
        #[serde(default = "default_true")]
        enabled: bool,
    },
    GetSuggestions {
        #[serde(rename = "baseURL")]
        base_url: String,
    },
    GetLastBackgroundModeValue,
    StartBackgroundSetup,
    IsBackgroundModeReady,
    CheckPermissions,
    RequestAccessibility,
    RequestScreenRecording,
    OpenSystemPreferences {
        permission: String,
    },
    CheckForUpdates,
    DownloadUpdate,
    InstallUpdate,
    GetAppVersion,
    OpenExternal {
        url: String,
    },
    GetAppManagementShown,
    SetAppManagementShown,
    CancelAllTasksDone,
}

fn default_hide_ms() -> u64 {
    DEFAULT_TEMPORARY_HIDE_MS
}

fn default_true() -> bool {
    true
}

impl RendererCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RendererCommand::SetToken { .. } => "setToken",
            RendererCommand::GetToken => "getToken",
            RendererCommand::DeleteToken => "deleteToken",
            RendererCommand::SetRefreshToken { .. } => "setRefreshToken",
            RendererCommand::GetRefreshToken => "getRefreshToken",
            RendererCommand::DeleteRefreshToken => "deleteRefreshToken",
            RendererCommand::SetDarkMode { .. } => "setDarkMode",
            RendererCommand::IsDarkMode => "isDarkMode",
            RendererCommand::LaunchAiAgent(_) => "launchAIAgent",
            RendererCommand::StopAiAgent => "stopAIAgent",
            RendererCommand::ExpandOverlay { .. } => "expandOverlay",
            RendererCommand::MinimizeOverlay => "minimizeOverlay",
            RendererCommand::HideOverlayTemporarily { .. } => "hideOverlayTemporarily",
            RendererCommand::ShowOverlay => "showOverlay",
            RendererCommand::HideOverlay => "hideOverlay",
            RendererCommand::SetOverlayClickThrough { .. } => "setOverlayClickThrough",
            RendererCommand::GetSuggestions { .. } => "getSuggestions",
            RendererCommand::GetLastBackgroundModeValue => "getLastBackgroundModeValue",
            RendererCommand::StartBackgroundSetup => "startBackgroundSetup",
            RendererCommand::IsBackgroundModeReady => "isBackgroundModeReady",
            RendererCommand::CheckPermissions => "checkPermissions",
            RendererCommand::RequestAccessibility => "requestAccessibility",
            RendererCommand::RequestScreenRecording => "requestScreenRecording",
            RendererCommand::OpenSystemPreferences { .. } => "openSystemPreferences",
            RendererCommand::CheckForUpdates => "checkForUpdates",
            RendererCommand::DownloadUpdate => "downloadUpdate",
            RendererCommand::InstallUpdate => "installUpdate",
            RendererCommand::GetAppVersion => "getAppVersion",
            RendererCommand::OpenExternal { .. } => "openExternal",
            RendererCommand::GetAppManagementShown => "getAppManagementShown",
            RendererCommand::SetAppManagementShown => "setAppManagementShown",
            RendererCommand::CancelAllTasksDone => "cancelAllTasksDone",
        }
    }
}

pub fn decode_command(text: &str) -> Result<RendererCommand, BridgeError> {
    Ok(serde_json::from_str(text)?)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum HostEvent {
    TriggerLogout,
    AiAgentLaunch {
        #[serde(rename = "threadId")]
        thread_id: String,
        #[serde(rename = "backgroundMode")]
        background_mode: bool,
        #[serde(rename = "auxPayload")]
        aux_payload: Value,
    },
    AiAgentExit,
    TriggerCancelAllTasks,
    SetupStatus(String),
    SetupProgress(u8),
    SetupComplete(SetupResult),
    UpdateAvailable(UpdateInfo),
    UpdateNotAvailable,
    DownloadProgress(DownloadProgress),
    UpdateDownloaded(UpdateInfo),
    UpdateError(String),
}

impl HostEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HostEvent::TriggerLogout => "trigger-logout",
            HostEvent::AiAgentLaunch { .. } => "ai-agent-launch",
            HostEvent::AiAgentExit => "ai-agent-exit",
            HostEvent::TriggerCancelAllTasks => "trigger-cancel-all-tasks",
            HostEvent::SetupStatus(_) => "setup-status",
            HostEvent::SetupProgress(_) => "setup-progress",
            HostEvent::SetupComplete(_) => "setup-complete",
            HostEvent::UpdateAvailable(_) => "update-available",
            HostEvent::UpdateNotAvailable => "update-not-available",
            HostEvent::DownloadProgress(_) => "download-progress",
            HostEvent::UpdateDownloaded(_) => "update-downloaded",
            HostEvent::UpdateError(_) => "update-error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PermissionReport {
    pub all_granted: bool,
    pub missing: Vec<String>,
    pub results: BTreeMap<String, bool>,
}

impl PermissionReport {
    pub fn from_results(results: BTreeMap<String, bool>) -> Self {
        let missing: Vec<String> = results
            .iter()
            .filter(|(_, granted)| !**granted)
            .map(|(name, _)| name.clone())
            .collect();
        Self {
            all_granted: missing.is_empty(),
            missing,
            results,
        }
    }

    /// Report for platforms that do not gate on-screen control.
    pub fn unrestricted() -> Self {
        Self {
            all_granted: true,
            missing: Vec::new(),
            results: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetupResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SetupResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub percent: f64,
    pub transferred: u64,
    pub total: u64,
    pub bytes_per_second: u64,
}

/// `{success: true, ...extra}` reply used by update and setup commands.
pub fn success_reply(extra: Option<(&str, Value)>) -> Value {
    let mut reply = json!({ "success": true });
    if let Some((key, value)) = extra {
        reply[key] = value;
    }
    reply
}

pub fn failure_reply(error: impl std::fmt::Display) -> Value {
    json!({ "success": false, "error": error.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_commands_decode_without_args() {
        assert_eq!(
            decode_command(r#"{"command":"stopAIAgent"}"#).unwrap(),
            RendererCommand::StopAiAgent
        );
        assert_eq!(
            decode_command(r#"{"command":"cancelAllTasksDone"}"#).unwrap(),
            RendererCommand::CancelAllTasksDone
        );
    }

    #[test]
    fn launch_command_carries_request() {
        let command = decode_command(
            r#"{"command":"launchAIAgent","args":{"baseURL":"http://api","threadId":"42","backgroundMode":false,"auxPayload":null}}"#,
        )
        .unwrap();
        match command {
            RendererCommand::LaunchAiAgent(request) => {
                assert_eq!(request.thread_id, "42");
                assert!(!request.background_mode);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn overlay_command_defaults() {
        assert_eq!(
            decode_command(r#"{"command":"hideOverlayTemporarily","args":{}}"#).unwrap(),
            RendererCommand::HideOverlayTemporarily { duration_ms: 3000 }
        );
        assert_eq!(
            decode_command(r#"{"command":"setOverlayClickThrough","args":{}}"#).unwrap(),
            RendererCommand::SetOverlayClickThrough { enabled: true }
        );
        assert_eq!(
            decode_command(r#"{"command":"expandOverlay","args":{"hasSuggestions":true}}"#).unwrap(),
            RendererCommand::ExpandOverlay {
                has_suggestions: true
            }
        );
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(matches!(
            decode_command(r#"{"command":"formatDisk"}"#),
            Err(BridgeError::Decode(_))
        ));
    }

    #[test]
    fn events_use_renderer_channel_names() {
        let event = HostEvent::AiAgentLaunch {
            thread_id: "t".to_string(),
            background_mode: true,
            aux_payload: json!({"a": 1}),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "ai-agent-launch");
        assert_eq!(value["payload"]["threadId"], "t");
        assert_eq!(value["payload"]["backgroundMode"], true);
        assert_eq!(event.name(), "ai-agent-launch");

        let value = serde_json::to_value(HostEvent::TriggerCancelAllTasks).unwrap();
        assert_eq!(value["event"], "trigger-cancel-all-tasks");
    }

    #[test]
    fn permission_report_lists_missing_grants() {
        let mut results = BTreeMap::new();
        results.insert("accessibility".to_string(), true);
        results.insert("screenRecording".to_string(), false);
        let report = PermissionReport::from_results(results);
        assert!(!report.all_granted);
        assert_eq!(report.missing, vec!["screenRecording".to_string()]);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["allGranted"], false);
    }
}
