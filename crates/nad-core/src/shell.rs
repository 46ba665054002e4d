//! Messages exchanged with the webview shell. The shell renders the UI and
//! performs window operations on the host's behalf.

use crate::bridge::{HostEvent, RendererCommand};
use crate::geometry::{Bounds, WorkArea};
use crate::{Platform, WindowRole};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_SHELL_FRAME_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WindowSpec {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub width: i32,
    pub height: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    #[serde(default = "default_true")]
    pub frame: bool,
    #[serde(default)]
    pub transparent: bool,
    #[serde(default)]
    pub always_on_top: bool,
    #[serde(default = "default_true")]
    pub resizable: bool,
    #[serde(default)]
    pub skip_taskbar: bool,
    #[serde(default)]
    pub modal: bool,
}

fn default_true() -> bool {
    true
}

impl WindowSpec {
    pub fn page(url: impl Into<String>, width: i32, height: i32) -> Self {
        Self {
            url: url.into(),
            title: None,
            width,
            height,
            x: None,
            y: None,
            frame: true,
            transparent: false,
            always_on_top: false,
            resizable: true,
            skip_taskbar: false,
            modal: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn at(mut self, bounds: Bounds) -> Self {
        self.x = Some(bounds.x);
        self.y = Some(bounds.y);
        self.width = bounds.width;
        self.height = bounds.height;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum WindowOp {
    SetBounds {
        bounds: Bounds,
        animate: bool,
    },
    ShowInactive,
    Hide,
    SetIgnoreMouseEvents {
        ignore: bool,
    },
    SetContentProtection {
        enabled: bool,
    },
    Minimize,
    Restore,
    Focus,
    Reload,
    Close,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ShellInbound {
    Hello {
        #[serde(default)]
        platform: Option<Platform>,
        #[serde(rename = "workArea")]
        work_area: WorkArea,
    },
    Command {
        #[serde(default, rename = "requestId")]
        request_id: Option<String>,
        #[serde(default)]
        window: Option<WindowRole>,
        command: RendererCommand,
    },
    CloseRequested {
        window: WindowRole,
    },
    Closed {
        window: WindowRole,
    },
    WorkArea {
        #[serde(rename = "workArea")]
        work_area: WorkArea,
    },
    Activate,
    Menu {
        action: MenuAction,
    },
    Quit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MenuAction {
    Logout,
    BackgroundAuth,
    Quit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ShellOutbound {
    OpenWindow {
        window: WindowRole,
        spec: WindowSpec,
    },
    Window {
        window: WindowRole,
        op: WindowOp,
    },
    Event {
        window: WindowRole,
        event: HostEvent,
    },
    Reply {
        #[serde(rename = "requestId")]
        request_id: String,
        value: Value,
    },
    OpenExternal {
        url: String,
    },
    Exit,
}
