//! Everything that runs outside the host process: the agent worker, the
//! suggestor, background-mode maintenance scripts and the readiness probe.

pub mod background;
pub mod binary;
pub mod probe;
pub mod process;
pub mod suggestions;
mod supervisor;

pub use background::{select_provider, BackgroundModeProvider, ProviderKind};
pub use binary::{resolve_agent_binary, AgentBinaryConfig, WorkerEnvironment};
pub use process::{CommandSpec, ServiceHandle};
pub use supervisor::{
    ActiveWorker, FinishedRun, LaunchOutcome, RunMeta, SupervisorError, WorkerExit, WorkerNotice,
    WorkerPhase, WorkerSupervisor,
};
