use serde::{Deserialize, Serialize};

pub const OVERLAY_COLLAPSED_SIZE: i32 = 60;
pub const OVERLAY_EXPANDED_WIDTH: i32 = 350;
pub const OVERLAY_EXPANDED_HEIGHT: i32 = 500;
pub const OVERLAY_SUGGESTIONS_HEIGHT: i32 = 380;
pub const OVERLAY_MARGIN: i32 = 25;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WorkArea {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl WorkArea {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    /// Places a `width`x`height` box in the bottom-right corner of `area`.
    pub fn anchored_bottom_right(area: WorkArea, width: i32, height: i32, margin: i32) -> Self {
        Self {
            x: area.x + area.width - width - margin,
            y: area.y + area.height - height - margin,
            width,
            height,
        }
    }
}

pub fn overlay_size(expanded: bool, has_suggestions: bool) -> (i32, i32) {
    if !expanded {
        return (OVERLAY_COLLAPSED_SIZE, OVERLAY_COLLAPSED_SIZE);
    }
    let height = if has_suggestions {
        OVERLAY_SUGGESTIONS_HEIGHT
    } else {
        OVERLAY_EXPANDED_HEIGHT
    };
    (OVERLAY_EXPANDED_WIDTH, height)
}

pub fn overlay_bounds(area: WorkArea, expanded: bool, has_suggestions: bool) -> Bounds {
    let (width, height) = overlay_size(expanded, has_suggestions);
    Bounds::anchored_bottom_right(area, width, height, OVERLAY_MARGIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expanded_without_suggestions_on_full_hd() {
        let bounds = overlay_bounds(WorkArea::new(1920, 1080), true, false);
        assert_eq!(
            bounds,
            Bounds {
                x: 1545,
                y: 555,
                width: 350,
                height: 500
            }
        );
    }

    #[test]
    fn collapsed_ignores_suggestion_flag() {
        let area = WorkArea::new(1920, 1080);
        let expected = Bounds {
            x: 1835,
            y: 995,
            width: 60,
            height: 60,
        };
        assert_eq!(overlay_bounds(area, false, false), expected);
        assert_eq!(overlay_bounds(area, false, true), expected);
    }

    #[test]
    fn suggestions_use_shorter_panel() {
        let bounds = overlay_bounds(WorkArea::new(1920, 1080), true, true);
        assert_eq!((bounds.width, bounds.height), (350, 380));
        assert_eq!((bounds.x, bounds.y), (1545, 675));
    }

    #[test]
    fn work_area_offset_is_respected() {
        let area = WorkArea {
            x: 1920,
            y: 24,
            width: 1440,
            height: 876,
        };
        let bounds = overlay_bounds(area, false, false);
        assert_eq!((bounds.x, bounds.y), (1920 + 1440 - 85, 24 + 876 - 85));
    }
}
