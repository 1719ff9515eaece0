//! Proctoring signal classification.
//!
//! [`ViolationMonitor`] turns raw host signals into violations and tells the
//! host which default actions to suppress. This is best-effort detection,
//! not a security boundary: a determined user can defeat most of these
//! signals. The goal is friction plus an evidence trail (the running count
//! reported with the submission).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

//
// ─── HOST SIGNALS ──────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipboardAction {
    Copy,
    Cut,
    Paste,
}

/// A key press with its modifier state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyCombo {
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub meta: bool,
}

impl KeyCombo {
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    #[must_use]
    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    #[must_use]
    pub fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    #[must_use]
    pub fn meta(mut self) -> Self {
        self.meta = true;
        self
    }

    /// Developer tools, reload, print, save, and window switching accelerators.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        let key = self.key.to_ascii_uppercase();
        let command = self.ctrl || self.meta;
        match key.as_str() {
            "F12" | "F5" => true,
            "I" | "J" | "C" => command && self.shift,
            "U" | "R" | "P" | "S" => command,
            "TAB" => self.alt || self.ctrl || self.meta,
            "F4" => self.alt,
            _ => false,
        }
    }
}

/// Window geometry plus coarse device data, sampled on resize.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub outer_width: u32,
    pub outer_height: u32,
    pub inner_width: u32,
    pub inner_height: u32,
    #[serde(default)]
    pub user_agent: String,
}

/// Raw events delivered by the host environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformSignal {
    VisibilityHidden,
    VisibilityVisible,
    WindowBlur,
    WindowFocus,
    BeforePrint,
    AfterPrint,
    PrintMediaMatched,
    Clipboard { action: ClipboardAction },
    ContextMenu,
    KeyDown { combo: KeyCombo },
    Resize { metrics: WindowMetrics },
}

//
// ─── VIOLATIONS ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    TabHidden,
    WindowBlur,
    PrintAttempt,
    DevtoolsSuspected,
    ClipboardBlocked,
    ContextMenuBlocked,
    BlockedShortcut,
}

impl ViolationKind {
    /// Only leaving the test view counts toward the reported total.
    #[must_use]
    pub fn counts(self) -> bool {
        matches!(self, ViolationKind::TabHidden | ViolationKind::WindowBlur)
    }

    /// Kind raised by a signal on its own; resizes go through the devtools heuristic.
    fn raised_by(signal: &PlatformSignal) -> Option<ViolationKind> {
        match signal {
            PlatformSignal::VisibilityHidden => Some(ViolationKind::TabHidden),
            PlatformSignal::WindowBlur => Some(ViolationKind::WindowBlur),
            PlatformSignal::BeforePrint | PlatformSignal::PrintMediaMatched => {
                Some(ViolationKind::PrintAttempt)
            }
            PlatformSignal::Clipboard { .. } => Some(ViolationKind::ClipboardBlocked),
            PlatformSignal::ContextMenu => Some(ViolationKind::ContextMenuBlocked),
            PlatformSignal::KeyDown { combo } if combo.is_blocked() => {
                Some(ViolationKind::BlockedShortcut)
            }
            PlatformSignal::KeyDown { .. }
            | PlatformSignal::VisibilityVisible
            | PlatformSignal::WindowFocus
            | PlatformSignal::AfterPrint
            | PlatformSignal::Resize { .. } => None,
        }
    }

    /// The host must suppress the underlying platform action.
    #[must_use]
    pub fn prevents_default(self) -> bool {
        matches!(
            self,
            ViolationKind::PrintAttempt
                | ViolationKind::ClipboardBlocked
                | ViolationKind::ContextMenuBlocked
                | ViolationKind::BlockedShortcut
        )
    }

    fn action(self) -> MonitorAction {
        match self {
            ViolationKind::PrintAttempt => MonitorAction::HardReset,
            ViolationKind::TabHidden | ViolationKind::WindowBlur | ViolationKind::DevtoolsSuspected => {
                MonitorAction::Warn
            }
            ViolationKind::ClipboardBlocked
            | ViolationKind::ContextMenuBlocked
            | ViolationKind::BlockedShortcut => MonitorAction::None,
        }
    }

    /// User-facing warning text.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            ViolationKind::TabHidden => {
                "You switched away from the test tab. This has been recorded."
            }
            ViolationKind::WindowBlur => {
                "The test window lost focus. This has been recorded."
            }
            ViolationKind::PrintAttempt => "Printing is not allowed. The test will reload.",
            ViolationKind::DevtoolsSuspected => "Please close developer tools.",
            ViolationKind::ClipboardBlocked => "Copy and paste are disabled during the test.",
            ViolationKind::ContextMenuBlocked => "The context menu is disabled during the test.",
            ViolationKind::BlockedShortcut => "That shortcut is disabled during the test.",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ViolationKind::TabHidden => "tab-hidden",
            ViolationKind::WindowBlur => "window-blur",
            ViolationKind::PrintAttempt => "print-attempt",
            ViolationKind::DevtoolsSuspected => "devtools-suspected",
            ViolationKind::ClipboardBlocked => "clipboard-blocked",
            ViolationKind::ContextMenuBlocked => "context-menu-blocked",
            ViolationKind::BlockedShortcut => "blocked-shortcut",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorAction {
    None,
    /// Show a non-blocking warning.
    Warn,
    /// End the session and reload the page.
    HardReset,
}

/// What the host should do in response to one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorResponse {
    pub kind: Option<ViolationKind>,
    /// Call the platform's prevent-default primitive for this event.
    pub prevent_default: bool,
    pub action: MonitorAction,
    /// Running violation count after this signal.
    pub count: u32,
}

//
// ─── DEVTOOLS HEURISTICS ───────────────────────────────────────────────────────
//

/// Pluggable guess at whether developer tools are open.
///
/// No client-side check is reliable; implementations are heuristics only.
pub trait DevtoolsHeuristic: Send + Sync {
    fn suspects_devtools(&self, metrics: &WindowMetrics) -> bool;
}

/// Never reports devtools.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDevtoolsHeuristic;

impl DevtoolsHeuristic for NoDevtoolsHeuristic {
    fn suspects_devtools(&self, _metrics: &WindowMetrics) -> bool {
        false
    }
}

const MOBILE_MARKERS: [&str; 6] = ["android", "iphone", "ipad", "ipod", "mobile", "opera mini"];

/// Flags a docked devtools panel by the gap between outer and inner window size.
///
/// Suppressed on mobile, where browser chrome alone produces large deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionDelta {
    pub threshold_px: u32,
    pub mobile_max_width: u32,
}

impl Default for DimensionDelta {
    fn default() -> Self {
        Self {
            threshold_px: 160,
            mobile_max_width: 768,
        }
    }
}

impl DimensionDelta {
    #[must_use]
    pub fn with_threshold(threshold_px: u32) -> Self {
        Self {
            threshold_px,
            ..Self::default()
        }
    }

    fn is_mobile(&self, metrics: &WindowMetrics) -> bool {
        if metrics.inner_width <= self.mobile_max_width {
            return true;
        }
        let ua = metrics.user_agent.to_ascii_lowercase();
        MOBILE_MARKERS.iter().any(|m| ua.contains(m))
    }
}

impl DevtoolsHeuristic for DimensionDelta {
    fn suspects_devtools(&self, metrics: &WindowMetrics) -> bool {
        if self.is_mobile(metrics) {
            return false;
        }
        let width_gap = metrics.outer_width.saturating_sub(metrics.inner_width);
        let height_gap = metrics.outer_height.saturating_sub(metrics.inner_height);
        width_gap > self.threshold_px || height_gap > self.threshold_px
    }
}

//
// ─── MONITOR ───────────────────────────────────────────────────────────────────
//

/// Classifies host signals and keeps the running violation count.
pub struct ViolationMonitor {
    heuristic: Box<dyn DevtoolsHeuristic>,
    count: u32,
    tally: BTreeMap<ViolationKind, u32>,
    devtools_flagged: bool,
}

impl ViolationMonitor {
    #[must_use]
    pub fn new(heuristic: Box<dyn DevtoolsHeuristic>) -> Self {
        Self {
            heuristic,
            count: 0,
            tally: BTreeMap::new(),
            devtools_flagged: false,
        }
    }

    /// Monitor with devtools detection disabled.
    #[must_use]
    pub fn without_devtools() -> Self {
        Self::new(Box::new(NoDevtoolsHeuristic))
    }

    /// Violations that count toward the reported total.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Every classified signal by kind, including non-counting ones.
    #[must_use]
    pub fn tally(&self) -> &BTreeMap<ViolationKind, u32> {
        &self.tally
    }

    pub fn observe(&mut self, signal: &PlatformSignal) -> MonitorResponse {
        let kind = match signal {
            PlatformSignal::Resize { metrics } => {
                let suspected = self.heuristic.suspects_devtools(metrics);
                // Warn on the transition into the suspected state only.
                let rising = suspected && !self.devtools_flagged;
                self.devtools_flagged = suspected;
                rising.then_some(ViolationKind::DevtoolsSuspected)
            }
            other => ViolationKind::raised_by(other),
        };

        if let Some(kind) = kind {
            *self.tally.entry(kind).or_insert(0) += 1;
            if kind.counts() {
                self.count = self.count.saturating_add(1);
            }
        }
        self.respond(kind, kind.map_or(MonitorAction::None, ViolationKind::action))
    }

    /// Classify a signal without recording it.
    ///
    /// Blocked actions are still prevented and print still resets, but nothing
    /// is counted, tallied, or warned about, and resizes are ignored.
    #[must_use]
    pub fn screen(&self, signal: &PlatformSignal) -> MonitorResponse {
        let kind = ViolationKind::raised_by(signal);
        let action = match kind {
            Some(ViolationKind::PrintAttempt) => MonitorAction::HardReset,
            _ => MonitorAction::None,
        };
        self.respond(kind, action)
    }

    fn respond(&self, kind: Option<ViolationKind>, action: MonitorAction) -> MonitorResponse {
        MonitorResponse {
            kind,
            prevent_default: kind.is_some_and(ViolationKind::prevents_default),
            action,
            count: self.count,
        }
    }
}

impl fmt::Debug for ViolationMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViolationMonitor")
            .field("count", &self.count)
            .field("tally", &self.tally)
            .field("devtools_flagged", &self.devtools_flagged)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
