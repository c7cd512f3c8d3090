//! The projection contract shared by the storefront read models.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;

/// How far into the global event log a view has folded.
///
/// Views count every envelope they are handed, including the ones they
/// ignore, so the count lines up with the catch-up index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    pub events_processed: u64,
}

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn advance(&self) -> Self {
        Self {
            events_processed: self.events_processed.saturating_add(1),
        }
    }

    /// True when the envelope at the 1-based `index` has not been folded yet.
    pub fn is_behind(&self, index: u64) -> bool {
        self.events_processed < index
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "folded {} events", self.events_processed)
    }
}

/// Turns order, product, cart and coupon events into a query-side view.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Folds one envelope. Envelopes of other aggregate types still advance
    /// the position.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;

    /// Drops everything folded so far, ahead of a full replay.
    async fn reset(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_position_is_behind_the_first_event() {
        let pos = ProjectionPosition::zero();
        assert_eq!(pos.events_processed, 0);
        assert!(pos.is_behind(1));
    }

    #[test]
    fn advancing_catches_up_one_event_at_a_time() {
        let pos = ProjectionPosition::zero().advance();
        assert!(!pos.is_behind(1));
        assert!(pos.is_behind(2));
        assert_eq!(pos.advance().events_processed, 2);
    }

    #[test]
    fn advance_saturates() {
        let pos = ProjectionPosition {
            events_processed: u64::MAX,
        };
        assert_eq!(pos.advance().events_processed, u64::MAX);
    }

    #[test]
    fn position_display() {
        let pos = ProjectionPosition {
            events_processed: 42,
        };
        assert_eq!(pos.to_string(), "folded 42 events");
    }
}
