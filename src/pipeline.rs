//! Ordered render stages and stale-request tracking.
//!
//! A render is `remove overlay -> resize -> composite`, each stage optional.
//! Removal runs first so it sees full-resolution source pixels (the overlay
//! tier depends on the capture resolution); resizing runs before compositing
//! so watermark placement and scale refer to the final output size.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::settings::{ProcessMode, RenderSettings, ResizeMode};

/// One step of a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Un-blend the known overlay.
    RemoveOverlay,
    /// Scale the image.
    Resize {
        /// Resize rule.
        mode: ResizeMode,
        /// Target size for the rule.
        value: u32,
    },
    /// Draw the watermark.
    Composite,
}

/// The stages `settings` enables, in execution order.
#[must_use]
pub fn plan(settings: &RenderSettings) -> Vec<Stage> {
    let mut stages = Vec::with_capacity(3);
    if settings.process_mode == ProcessMode::RemoveOverlay {
        stages.push(Stage::RemoveOverlay);
    }
    if settings.export.resize != ResizeMode::None {
        stages.push(Stage::Resize {
            mode: settings.export.resize,
            value: settings.export.resize_value,
        });
    }
    if settings.draws_watermark() {
        stages.push(Stage::Composite);
    }
    stages
}

/// Token identifying one render request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

/// Issues increasing request tokens so a caller can drop results that were
/// superseded while they were being produced.
///
/// This is advisory: nothing is aborted, a stale result is simply discarded.
#[derive(Debug, Default)]
pub struct RequestTracker {
    latest: AtomicU64,
}

impl RequestTracker {
    /// Create a tracker with no requests issued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request, superseding every earlier one.
    pub fn begin(&self) -> RequestToken {
        RequestToken(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether `token` is still the newest request.
    #[must_use]
    pub fn is_current(&self, token: RequestToken) -> bool {
        self.latest.load(Ordering::SeqCst) == token.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_mode_composites_only() {
        assert_eq!(plan(&RenderSettings::default()), vec![Stage::Composite]);
    }

    #[test]
    fn remove_mode_skips_composite() {
        let settings = RenderSettings {
            process_mode: ProcessMode::RemoveOverlay,
            ..RenderSettings::default()
        };
        assert_eq!(plan(&settings), vec![Stage::RemoveOverlay]);
    }

    #[test]
    fn remove_then_add_runs_every_stage_in_order() {
        let mut settings = RenderSettings {
            process_mode: ProcessMode::RemoveOverlay,
            remove_then_add: true,
            ..RenderSettings::default()
        };
        settings.export.resize = ResizeMode::Max;
        settings.export.resize_value = 640;
        assert_eq!(
            plan(&settings),
            vec![
                Stage::RemoveOverlay,
                Stage::Resize {
                    mode: ResizeMode::Max,
                    value: 640
                },
                Stage::Composite,
            ]
        );
    }

    #[test]
    fn remove_then_add_flag_is_ignored_in_add_mode() {
        let settings = RenderSettings {
            remove_then_add: true,
            ..RenderSettings::default()
        };
        assert_eq!(plan(&settings), vec![Stage::Composite]);
    }

    #[test]
    fn newer_request_supersedes_older() {
        let tracker = RequestTracker::new();
        let first = tracker.begin();
        assert!(tracker.is_current(first));
        let second = tracker.begin();
        assert!(second > first);
        assert!(!tracker.is_current(first));
        assert!(tracker.is_current(second));
    }
}
