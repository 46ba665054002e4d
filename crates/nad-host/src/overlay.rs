//! Floating status window in the bottom-right corner of the primary display.
//!
//! The overlay never takes focus on its own. A temporary hide schedules a
//! single restore; each schedule gets a fresh generation so a restore that
//! was superseded is dropped even if its timer already fired.

use crate::window::Windows;
use nad_core::geometry::{overlay_bounds, OVERLAY_COLLAPSED_SIZE};
use nad_core::shell::{WindowOp, WindowSpec};
use nad_core::{WindowRole, WorkArea};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const ROLE: WindowRole = WindowRole::Overlay;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverlayState {
    pub expanded: bool,
    pub has_suggestions: bool,
    pub hidden: bool,
    pub click_through: bool,
}

#[derive(Debug)]
struct PendingRestore {
    generation: u64,
    timer: JoinHandle<()>,
}

pub struct OverlayController {
    url: String,
    work_area: WorkArea,
    state: OverlayState,
    pending: Option<PendingRestore>,
    generation: u64,
    restore_tx: mpsc::UnboundedSender<u64>,
}

impl OverlayController {
    /// Restore timers report their generation on `restore_tx`; the owner
    /// hands it back through [`OverlayController::on_restore_timer`].
    pub fn new(url: impl Into<String>, restore_tx: mpsc::UnboundedSender<u64>) -> Self {
        Self {
            url: url.into(),
            work_area: WorkArea::default(),
            state: OverlayState::default(),
            pending: None,
            generation: 0,
            restore_tx,
        }
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    pub fn restore_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn set_work_area(&mut self, area: WorkArea) {
        self.work_area = area;
    }

    pub fn create(&mut self, windows: &mut Windows) -> bool {
        if windows.is_open(ROLE) {
            return false;
        }
        let bounds = overlay_bounds(self.work_area, false, false);
        let mut spec = WindowSpec::page(self.url.clone(), OVERLAY_COLLAPSED_SIZE, OVERLAY_COLLAPSED_SIZE)
            .at(bounds);
        spec.frame = false;
        spec.transparent = true;
        spec.always_on_top = true;
        spec.resizable = false;
        spec.skip_taskbar = true;
        if !windows.open(ROLE, spec) {
            return false;
        }
        self.state = OverlayState::default();
        // Best effort: unsupported platforms only log.
        windows.apply(ROLE, WindowOp::SetContentProtection { enabled: true });
        info!(event = "overlay_created", x = bounds.x, y = bounds.y);
        true
    }

    pub fn set_expanded(&mut self, windows: &mut Windows, expanded: bool, has_suggestions: bool) {
        if !windows.is_open(ROLE) {
            return;
        }
        self.state.expanded = expanded;
        self.state.has_suggestions = expanded && has_suggestions;
        let bounds = overlay_bounds(self.work_area, expanded, has_suggestions);
        windows.apply(
            ROLE,
            WindowOp::SetBounds {
                bounds,
                animate: true,
            },
        );
        if self.pending.is_none() {
            self.show_inactive(windows);
        }
    }

    pub fn hide_temporarily(&mut self, windows: &mut Windows, duration: Duration) {
        if !windows.is_open(ROLE) {
            return;
        }
        self.cancel_restore();
        windows.apply(ROLE, WindowOp::Hide);
        self.state.hidden = true;

        self.generation += 1;
        let generation = self.generation;
        let restore_tx = self.restore_tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = restore_tx.send(generation);
        });
        self.pending = Some(PendingRestore { generation, timer });
        debug!(event = "overlay_hidden_temporarily", generation, duration_ms = duration.as_millis() as u64);
    }

    /// Returns whether the restore was current and applied.
    pub fn on_restore_timer(&mut self, windows: &mut Windows, generation: u64) -> bool {
        match &self.pending {
            Some(pending) if pending.generation == generation => {}
            _ => {
                debug!(event = "overlay_restore_stale", generation);
                return false;
            }
        }
        self.pending = None;
        if windows.is_open(ROLE) {
            self.show_inactive(windows);
        }
        true
    }

    pub fn show(&mut self, windows: &mut Windows) {
        if self.pending.is_some() {
            debug!(event = "overlay_show_suppressed");
            return;
        }
        self.show_inactive(windows);
    }

    pub fn hide(&mut self, windows: &mut Windows) {
        if windows.apply(ROLE, WindowOp::Hide) {
            self.state.hidden = true;
        }
    }

    pub fn set_click_through(&mut self, windows: &mut Windows, enabled: bool) {
        if windows.apply(ROLE, WindowOp::SetIgnoreMouseEvents { ignore: enabled }) {
            self.state.click_through = enabled;
            info!(event = "overlay_click_through", enabled);
        }
    }

    pub fn reload(&mut self, windows: &mut Windows) {
        windows.apply(ROLE, WindowOp::Reload);
    }

    pub fn close(&mut self, windows: &mut Windows) -> bool {
        self.cancel_restore();
        windows.close(ROLE)
    }

    /// The window system destroyed the overlay.
    pub fn forget(&mut self, windows: &mut Windows) {
        self.cancel_restore();
        windows.forget(ROLE);
    }

    pub fn cancel_restore(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.timer.abort();
        }
    }

    fn show_inactive(&mut self, windows: &mut Windows) {
        if windows.apply(ROLE, WindowOp::ShowInactive) {
            self.state.hidden = false;
        }
    }
}
