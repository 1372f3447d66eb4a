//! Time windows used to debounce flapping and noisy identities.
//!
//! Both windows are persisted as bare timestamp fields where `0` means "no
//! window". These types keep that sentinel at the document boundary.

/// Rolling window counting OK/alert flips of one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BagotWindow {
    opened_at: Option<i64>,
    flips: u32,
}

impl BagotWindow {
    /// A window that is not open and holds no flips.
    pub fn closed() -> Self {
        Self::default()
    }

    /// Rebuilds a window from its persisted `ts_first_bagot` / `bagot_freq`
    /// fields.
    pub fn from_fields(ts_first_bagot: i64, bagot_freq: u32) -> Self {
        Self { opened_at: (ts_first_bagot != 0).then_some(ts_first_bagot), flips: bagot_freq }
    }

    /// Counts a flip observed at `at`, opening the window if none is open.
    pub fn record_flip(&mut self, at: i64) {
        self.flips = self.flips.saturating_add(1);
        if self.opened_at.is_none() {
            self.opened_at = Some(at);
        }
    }

    /// Closes the window when it was opened more than `span` seconds before
    /// `now`.
    pub fn expire(&mut self, now: i64, span: i64) {
        if let Some(opened_at) = self.opened_at {
            if now.saturating_sub(opened_at) > span {
                *self = Self::closed();
            }
        }
    }

    /// Whether the identity flapped at least `threshold` times inside the
    /// window.
    pub fn is_flapping(&self, now: i64, span: i64, threshold: u32) -> bool {
        match self.opened_at {
            Some(opened_at) => now.saturating_sub(opened_at) <= span && self.flips >= threshold,
            None => false,
        }
    }

    /// The persisted `ts_first_bagot` value.
    pub fn ts_first_bagot(&self) -> i64 {
        self.opened_at.unwrap_or(0)
    }

    /// The persisted `bagot_freq` value.
    pub fn flips(&self) -> u32 {
        self.flips
    }
}

/// Grace period started by the last OK/alert flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StealthyWindow {
    entered_at: Option<i64>,
}

impl StealthyWindow {
    /// No grace period in progress.
    pub fn closed() -> Self {
        Self::default()
    }

    /// Rebuilds a window from its persisted `ts_first_stealthy` field.
    pub fn from_field(ts_first_stealthy: i64) -> Self {
        Self { entered_at: (ts_first_stealthy != 0).then_some(ts_first_stealthy) }
    }

    /// Starts the grace period at `at`.
    pub fn enter(&mut self, at: i64) {
        self.entered_at = Some(at);
    }

    /// Whether `now` is no more than `span` seconds after the window started.
    pub fn is_within(&self, now: i64, span: i64) -> bool {
        match self.entered_at {
            Some(entered_at) => now.saturating_sub(entered_at) <= span,
            None => false,
        }
    }

    /// Whether at least `span` seconds elapsed since the window started. An
    /// unset window has always elapsed.
    pub fn has_elapsed(&self, now: i64, span: i64) -> bool {
        match self.entered_at {
            Some(entered_at) => now.saturating_sub(entered_at) >= span,
            None => true,
        }
    }

    /// The persisted `ts_first_stealthy` value.
    pub fn ts_first_stealthy(&self) -> i64 {
        self.entered_at.unwrap_or(0)
    }
}
