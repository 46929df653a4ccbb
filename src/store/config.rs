// (c) Copyright 2025 Helsing GmbH. All rights reserved.

/// Tunables of a [`Store`](crate::Store).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StoreConfig {
    /// How many rounds of `will` notifications a commit may run before it is rejected.
    ///
    /// Observers may make further changes while being notified. Every round notifies
    /// the changesets touched since the previous one, so observers that keep changing
    /// each other's targets would otherwise never let the commit finish.
    pub max_will_iterations: usize,
    /// Whether dropping a root scope without accepting it rejects its transaction.
    ///
    /// When disabled, the transaction stays open and can be entered again with
    /// [`Store::enter`](crate::Store::enter).
    pub rollback_on_drop: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_will_iterations: 10,
            rollback_on_drop: true,
        }
    }
}
