//! Stage catalog
//!
//! The five ordered business stages a guest moves through. The order is
//! dense (0..=4) and there is exactly one back-edge: the final stage may
//! return to `booking` when the guest books again.

use serde::{Deserialize, Serialize};

use crate::error::JourneyError;

/// One named, ordered phase of the guest lifecycle.
///
/// Equality, hashing and ordering are by stage code; `order()` agrees with
/// the derived `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Guest has discovered the property
    Awareness,
    /// Guest is comparing offers
    Evaluation,
    /// Reservation is being made and paid for
    Booking,
    /// Guest is on site
    Experiencing,
    /// Post-stay review window
    Feedback,
}

/// Order value the final stage loops back to.
const REPEAT_ENTRY_ORDER: u8 = 2;

impl Stage {
    /// All stages in catalog order.
    pub const ALL: [Self; 5] = [
        Self::Awareness,
        Self::Evaluation,
        Self::Booking,
        Self::Experiencing,
        Self::Feedback,
    ];

    /// Returns the stable string code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Awareness => "awareness",
            Self::Evaluation => "evaluation",
            Self::Booking => "booking",
            Self::Experiencing => "experiencing",
            Self::Feedback => "feedback",
        }
    }

    /// Returns the human-readable name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Awareness => "Awareness",
            Self::Evaluation => "Evaluation",
            Self::Booking => "Booking",
            Self::Experiencing => "Experiencing",
            Self::Feedback => "Feedback",
        }
    }

    /// Returns the position of this stage in the catalog (0..=4).
    #[must_use]
    pub const fn order(self) -> u8 {
        match self {
            Self::Awareness => 0,
            Self::Evaluation => 1,
            Self::Booking => 2,
            Self::Experiencing => 3,
            Self::Feedback => 4,
        }
    }

    /// Looks up a stage by its order value.
    #[must_use]
    pub fn from_order(order: u8) -> Option<Self> {
        Self::ALL.get(usize::from(order)).copied()
    }

    /// Looks up a stage by its code.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::UnknownStage`] if `code` names no stage.
    pub fn from_code(code: &str) -> Result<Self, JourneyError> {
        Self::ALL
            .into_iter()
            .find(|s| s.code() == code)
            .ok_or_else(|| JourneyError::UnknownStage(code.to_string()))
    }

    /// Returns the stage that follows this one, or `None` for the last stage.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        Self::from_order(self.order() + 1)
    }

    /// Returns whether the catalog allows moving from `self` to `to`.
    ///
    /// Allowed: the immediately following stage, or the repeat-business
    /// loop from the last stage back to `booking`.
    #[must_use]
    pub fn can_transition(self, to: Self) -> bool {
        if self.next() == Some(to) {
            return true;
        }
        self.is_terminal() && to.order() == REPEAT_ENTRY_ORDER
    }

    /// Returns whether this is the last stage of the catalog.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Stage {
    type Err = JourneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_dense() {
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(usize::from(stage.order()), i);
        }
    }

    #[test]
    fn test_next() {
        assert_eq!(Stage::Awareness.next(), Some(Stage::Evaluation));
        assert_eq!(Stage::Experiencing.next(), Some(Stage::Feedback));
        assert_eq!(Stage::Feedback.next(), None);
    }

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(Stage::Awareness.can_transition(Stage::Evaluation));
        assert!(Stage::Evaluation.can_transition(Stage::Booking));
        assert!(Stage::Booking.can_transition(Stage::Experiencing));
        assert!(Stage::Experiencing.can_transition(Stage::Feedback));
    }

    #[test]
    fn test_repeat_loop_allowed() {
        assert!(Stage::Feedback.can_transition(Stage::Booking));
    }

    #[test]
    fn test_other_transitions_rejected() {
        assert!(!Stage::Awareness.can_transition(Stage::Booking));
        assert!(!Stage::Booking.can_transition(Stage::Evaluation));
        assert!(!Stage::Feedback.can_transition(Stage::Awareness));
        assert!(!Stage::Feedback.can_transition(Stage::Feedback));
        assert!(!Stage::Evaluation.can_transition(Stage::Evaluation));
    }

    #[test]
    fn test_only_feedback_is_terminal() {
        let terminal: Vec<_> = Stage::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![Stage::Feedback]);
    }

    #[test]
    fn test_from_code_round_trip() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_code(stage.code()).unwrap(), stage);
        }
    }

    #[test]
    fn test_from_code_unknown() {
        let err = Stage::from_code("checkout").unwrap_err();
        assert!(matches!(err, JourneyError::UnknownStage(ref c) if c == "checkout"));
    }

    #[test]
    fn test_serde_uses_code() {
        let json = serde_json::to_string(&Stage::Experiencing).unwrap();
        assert_eq!(json, "\"experiencing\"");
    }
}
