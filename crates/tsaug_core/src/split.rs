//! Data split types.

use serde::{Deserialize, Serialize};

/// The data split a batch belongs to.
///
/// Augmentations only run on [`Split::Train`]; the index mirrors the
/// `split_idx` convention (0 = train, 1 = valid).
///
/// ```rust
/// use tsaug_core::Split;
///
/// assert!(Split::Train.is_train());
/// assert_eq!(Split::Valid.index(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Split {
    /// Training split.
    #[default]
    Train,
    /// Validation split.
    Valid,
}

impl Split {
    /// Check if this is the training split.
    #[must_use]
    pub const fn is_train(&self) -> bool {
        matches!(self, Split::Train)
    }

    /// Check if this is an evaluation split.
    #[must_use]
    pub const fn is_eval(&self) -> bool {
        matches!(self, Split::Valid)
    }

    /// Get the split index.
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Split::Train => 0,
            Split::Valid => 1,
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Valid => write!(f, "valid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_checks() {
        assert!(Split::Train.is_train());
        assert!(!Split::Train.is_eval());
        assert!(Split::Valid.is_eval());
        assert_eq!(Split::default(), Split::Train);
        assert_eq!(format!("{}", Split::Valid), "valid");
    }
}
