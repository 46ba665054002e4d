use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub mod bridge;
pub mod geometry;
pub mod shell;

pub use geometry::{overlay_bounds, Bounds, WorkArea};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    Agent,
    BackgroundAgent,
    Suggestor,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::Agent => "agent",
            AgentMode::BackgroundAgent => "background_agent",
            AgentMode::Suggestor => "suggestor",
        }
    }

    pub fn for_launch(background_mode: bool) -> Self {
        if background_mode {
            AgentMode::BackgroundAgent
        } else {
            AgentMode::Agent
        }
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentMode {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "agent" => Ok(AgentMode::Agent),
            "background_agent" | "background-agent" => Ok(AgentMode::BackgroundAgent),
            "suggestor" => Ok(AgentMode::Suggestor),
            other => Err(format!("Unknown agent mode: {other}")),
        }
    }
}

/// One "run" action from the UI. Consumed by a single launch, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentLaunchRequest {
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub thread_id: String,
    #[serde(default)]
    pub background_mode: bool,
    #[serde(default)]
    pub aux_payload: Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum WindowRole {
    Main,
    Overlay,
    BackgroundAgent,
    BackgroundAuth,
    BackgroundSetup,
}

impl WindowRole {
    pub const ALL: [WindowRole; 5] = [
        WindowRole::Main,
        WindowRole::Overlay,
        WindowRole::BackgroundAgent,
        WindowRole::BackgroundAuth,
        WindowRole::BackgroundSetup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowRole::Main => "main",
            WindowRole::Overlay => "overlay",
            WindowRole::BackgroundAgent => "background_agent",
            WindowRole::BackgroundAuth => "background_auth",
            WindowRole::BackgroundSetup => "background_setup",
        }
    }

    /// Hash route of the UI page rendered in this window.
    pub fn route(&self) -> &'static str {
        match self {
            WindowRole::Main => "",
            WindowRole::Overlay => "#/overlay",
            WindowRole::BackgroundAgent => "#/background-task",
            WindowRole::BackgroundAuth => "#/background-auth",
            WindowRole::BackgroundSetup => "#/background-setup",
        }
    }
}

impl fmt::Display for WindowRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Macos,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Macos
        } else {
            Platform::Linux
        }
    }

    /// Closing every window quits the app, except on macOS without an explicit quit.
    pub fn quits_when_windows_closed(&self, quit_requested: bool) -> bool {
        !matches!(self, Platform::Macos) || quit_requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_mode_uses_worker_env_names() {
        assert_eq!(AgentMode::for_launch(false).as_str(), "agent");
        assert_eq!(AgentMode::for_launch(true).as_str(), "background_agent");
        assert_eq!(
            serde_json::to_value(AgentMode::Suggestor).unwrap(),
            json!("suggestor")
        );
        assert_eq!("Background-Agent".parse::<AgentMode>(), Ok(AgentMode::BackgroundAgent));
        assert!("planner".parse::<AgentMode>().is_err());
    }

    #[test]
    fn launch_request_reads_renderer_field_names() {
        let request: AgentLaunchRequest = serde_json::from_value(json!({
            "baseURL": "http://localhost:8000",
            "threadId": "t-1",
            "backgroundMode": true,
            "auxPayload": {"plan": ["open browser"]}
        }))
        .unwrap();
        assert_eq!(request.base_url, "http://localhost:8000");
        assert_eq!(request.thread_id, "t-1");
        assert!(request.background_mode);
        assert_eq!(request.aux_payload["plan"][0], "open browser");
    }

    #[test]
    fn macos_keeps_running_after_last_window() {
        assert!(!Platform::Macos.quits_when_windows_closed(false));
        assert!(Platform::Macos.quits_when_windows_closed(true));
        assert!(Platform::Windows.quits_when_windows_closed(false));
        assert!(Platform::Linux.quits_when_windows_closed(false));
    }
}
