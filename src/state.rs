//! Reconciled visibility state and the durable preference behind it.

use serde::{Deserialize, Serialize};

/// Storage key of the "always expand" preference.
pub const ALWAYS_EXPAND_KEY: &str = "alwaysExpand";

/// The durable user preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preference {
    #[serde(default)]
    pub always_expand: bool,
}

impl Preference {
    pub fn new(always_expand: bool) -> Self {
        Self { always_expand }
    }
}

/// Live, in-session state owned by the reconciliation engine.
///
/// `manual_collapse_active` is only ever cleared by an explicit expand or by a
/// change to the auto-expand preference, never by new widget content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationState {
    pub auto_expand_enabled: bool,
    pub manual_collapse_active: bool,
}

impl ReconciliationState {
    /// Seed the session state from the stored preference.
    pub fn seeded(preference: Preference) -> Self {
        Self {
            auto_expand_enabled: preference.always_expand,
            manual_collapse_active: false,
        }
    }

    /// Whether new widget content should be expanded automatically.
    pub fn should_auto_expand(&self) -> bool {
        self.auto_expand_enabled && !self.manual_collapse_active
    }

    pub fn apply_expand(&mut self) {
        self.manual_collapse_active = false;
    }

    pub fn apply_collapse(&mut self) {
        self.manual_collapse_active = true;
    }

    /// An explicit toggle, local or from another session.
    pub fn apply_auto_expand(&mut self, enabled: bool) {
        self.auto_expand_enabled = enabled;
        self.manual_collapse_active = false;
    }
}
