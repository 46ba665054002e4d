use nad_core::{AgentMode, Platform};
use std::path::PathBuf;

pub const ENV_API_URL: &str = "NEURALAGENT_API_URL";
pub const ENV_THREAD_ID: &str = "NEURALAGENT_THREAD_ID";
pub const ENV_ACCESS_TOKEN: &str = "NEURALAGENT_USER_ACCESS_TOKEN";
pub const ENV_AGENT_MODE: &str = "NEURALAGENT_AGENT_MODE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentBinaryConfig {
    pub override_path: Option<PathBuf>,
    pub dev_mode: bool,
    pub resources_dir: PathBuf,
}

/// Picks the agent executable for this platform and build flavour.
pub fn resolve_agent_binary(config: &AgentBinaryConfig, platform: Platform) -> PathBuf {
    if let Some(path) = &config.override_path {
        return path.clone();
    }
    let windows = matches!(platform, Platform::Windows);
    if config.dev_mode {
        return if windows {
            PathBuf::from("./aiagent/build/Release/agent.exe")
        } else {
            PathBuf::from("./aiagent/build/agent")
        };
    }
    if windows {
        config.resources_dir.join("agent.exe")
    } else {
        config.resources_dir.join("agent").join("agent")
    }
}

/// Environment handed to every worker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEnvironment {
    pub api_url: String,
    pub thread_id: Option<String>,
    pub access_token: String,
    pub mode: AgentMode,
}

impl WorkerEnvironment {
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut vars = vec![(ENV_API_URL.to_string(), self.api_url.clone())];
        if let Some(thread_id) = &self.thread_id {
            vars.push((ENV_THREAD_ID.to_string(), thread_id.clone()));
        }
        vars.push((ENV_ACCESS_TOKEN.to_string(), self.access_token.clone()));
        vars.push((ENV_AGENT_MODE.to_string(), self.mode.as_str().to_string()));
        vars
    }
}
