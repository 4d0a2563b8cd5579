//! Process-wide tensor sharing strategy.
//!
//! Worker processes that exchange tensors need one agreed strategy; it is set
//! once at startup and read everywhere else.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

static SHARING_STRATEGY: OnceLock<SharingStrategy> = OnceLock::new();

/// How tensors are shared between worker processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SharingStrategy {
    /// Share through open file descriptors.
    FileDescriptor,
    /// Share through named files; avoids descriptor limits.
    #[default]
    FileSystem,
}

/// Set the process-wide strategy.
///
/// Only the first call takes effect; the value in force is returned.
pub fn init_sharing_strategy(strategy: SharingStrategy) -> SharingStrategy {
    let set = *SHARING_STRATEGY.get_or_init(|| strategy);
    if set != strategy {
        tracing::warn!(
            "Sharing strategy already initialised to {:?}; ignoring {:?}",
            set,
            strategy
        );
    }
    set
}

/// The strategy in force; [`SharingStrategy::FileSystem`] if never initialised.
pub fn sharing_strategy() -> SharingStrategy {
    SHARING_STRATEGY.get().copied().unwrap_or_default()
}
