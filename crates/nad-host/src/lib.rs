//! The desktop host: owns the windows, the settings store and the agent
//! worker, and answers the renderer bridge. A window shell connects to it and
//! carries out the window operations it decides on.

pub mod auxiliary;
pub mod bridge;
pub mod config;
mod host;
pub mod main_window;
pub mod overlay;
pub mod permissions;
pub mod updates;
pub mod window;

pub use bridge::{HostHandle, HostInput};
pub use config::HostConfig;
pub use host::Host;
pub use window::{WindowError, WindowSystem};
