use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AggregateId, Version};

/// Serialized aggregate state at a known version.
///
/// Loading an aggregate starts from its latest snapshot and replays only the
/// events recorded after `version`. Hot aggregates such as products, whose
/// stock streams grow with every checkout, rely on this to keep loads short.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    pub state: serde_json::Value,
}

impl Snapshot {
    /// Captures a serializable aggregate state.
    pub fn from_state<T: Serialize>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        version: Version,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            version,
            timestamp: Utc::now(),
            state: serde_json::to_value(state)?,
        })
    }

    /// Restores the captured state.
    pub fn into_state<T: for<'de> Deserialize<'de>>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct StockState {
        quantity: u32,
        reserved: u32,
    }

    #[test]
    fn state_survives_capture_and_restore() {
        let state = StockState {
            quantity: 12,
            reserved: 3,
        };
        let snapshot =
            Snapshot::from_state(AggregateId::new(), "Product", Version::new(50), &state).unwrap();

        assert_eq!(snapshot.aggregate_type, "Product");
        assert_eq!(snapshot.version, Version::new(50));
        assert_eq!(snapshot.into_state::<StockState>().unwrap(), state);
    }
}
