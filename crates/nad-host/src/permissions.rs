//! OS capability grants the worker needs before it can drive the screen.
//! Only macOS gates them; elsewhere everything reports as granted.

use nad_core::bridge::PermissionReport;
use nad_core::Platform;
use std::collections::BTreeMap;
use std::process::{Command, Stdio};
use tracing::{info, warn};

pub const ACCESSIBILITY: &str = "accessibility";
pub const SCREEN_RECORDING: &str = "screenRecording";
pub const APP_MANAGEMENT: &str = "appManagement";

const PRIVACY_PANE: &str = "x-apple.systempreferences:com.apple.preference.security";

/// Settings pane for a permission name, if it is one we know.
pub fn preferences_url(permission: &str) -> Option<String> {
    let anchor = match permission {
        ACCESSIBILITY => "Privacy_Accessibility",
        SCREEN_RECORDING => "Privacy_ScreenCapture",
        APP_MANAGEMENT => "Privacy_AppManagement",
        _ => return None,
    };
    Some(format!("{PRIVACY_PANE}?{anchor}"))
}

/// Blocking probe; callers run it off the host task.
pub trait PermissionProbe: Send + Sync {
    fn check_all(&self) -> PermissionReport;

    fn request_accessibility(&self) -> bool;

    fn request_screen_recording(&self) -> bool;

    fn open_system_preferences(&self, permission: &str) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnrestrictedProbe;

impl PermissionProbe for UnrestrictedProbe {
    fn check_all(&self) -> PermissionReport {
        PermissionReport::unrestricted()
    }

    fn request_accessibility(&self) -> bool {
        true
    }

    fn request_screen_recording(&self) -> bool {
        true
    }

    fn open_system_preferences(&self, _permission: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone, Default)]
pub struct MacPermissionProbe;

impl MacPermissionProbe {
    fn accessibility_granted(&self) -> bool {
        run_quiet(
            "osascript",
            &["-e", "tell application \"System Events\" to get name of first process"],
        )
    }

    fn screen_recording_granted(&self) -> bool {
        let target = std::env::temp_dir().join(format!("nad-capture-{}.png", std::process::id()));
        let Some(target_str) = target.to_str() else {
            return false;
        };
        let granted = run_quiet("screencapture", &["-x", "-t", "png", target_str])
            && std::fs::metadata(&target).map(|m| m.len() > 0).unwrap_or(false);
        let _ = std::fs::remove_file(&target);
        granted
    }

    fn open_url(&self, url: &str) -> bool {
        run_quiet("open", &[url])
    }
}

impl PermissionProbe for MacPermissionProbe {
    fn check_all(&self) -> PermissionReport {
        let mut results = BTreeMap::new();
        results.insert(SCREEN_RECORDING.to_string(), self.screen_recording_granted());
        results.insert(ACCESSIBILITY.to_string(), self.accessibility_granted());
        let report = PermissionReport::from_results(results);
        info!(event = "permissions_checked", all_granted = report.all_granted, missing = ?report.missing);
        report
    }

    fn request_accessibility(&self) -> bool {
        if let Some(url) = preferences_url(ACCESSIBILITY) {
            self.open_url(&url);
        }
        false
    }

    fn request_screen_recording(&self) -> bool {
        if self.screen_recording_granted() {
            return true;
        }
        if let Some(url) = preferences_url(SCREEN_RECORDING) {
            self.open_url(&url);
        }
        false
    }

    fn open_system_preferences(&self, permission: &str) -> bool {
        match preferences_url(permission) {
            Some(url) => self.open_url(&url),
            None => {
                warn!(event = "unknown_permission", permission);
                false
            }
        }
    }
}

pub fn probe_for(platform: Platform) -> Box<dyn PermissionProbe> {
    match platform {
        Platform::Macos => Box::new(MacPermissionProbe),
        Platform::Windows | Platform::Linux => Box::new(UnrestrictedProbe),
    }
}

fn run_quiet(program: &str, args: &[&str]) -> bool {
    match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) => status.success(),
        Err(err) => {
            warn!(event = "permission_tool_failed", program, error = %err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_permissions_map_to_privacy_panes() {
        assert_eq!(
            preferences_url("screenRecording").as_deref(),
            Some("x-apple.systempreferences:com.apple.preference.security?Privacy_ScreenCapture")
        );
        assert!(preferences_url("appManagement")
            .unwrap()
            .ends_with("Privacy_AppManagement"));
        assert_eq!(preferences_url("camera"), None);
    }

    #[test]
    fn unrestricted_platforms_grant_everything() {
        let probe = probe_for(Platform::Linux);
        let report = probe.check_all();
        assert!(report.all_granted);
        assert!(report.missing.is_empty());
        assert!(probe.request_accessibility());
        assert!(probe.request_screen_recording());
    }

    #[test]
    fn report_lists_missing_grants() {
        let mut results = BTreeMap::new();
        results.insert(SCREEN_RECORDING.to_string(), false);
        results.insert(ACCESSIBILITY.to_string(), true);
        let report = PermissionReport::from_results(results);
        assert!(!report.all_granted);
        assert_eq!(report.missing, vec!["screenRecording".to_string()]);
    }
}
