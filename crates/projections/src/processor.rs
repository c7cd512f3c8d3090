//! Projection processor for feeding events to projections.

use event_store::{EventEnvelope, EventStore};
use futures_util::StreamExt;
use tokio::sync::Mutex;

use crate::Result;
use crate::projection::Projection;

/// Feeds stored events to the registered projections.
///
/// - Catch-up: streams the store and hands each projection the events it
///   hasn't seen yet
/// - Single event delivery
/// - Rebuild: resets every projection and replays from scratch
///
/// Catch-up and rebuild hold a lock for their whole run, so concurrent
/// callers never deliver the same event twice.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
    running: Mutex<()>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
            running: Mutex::new(()),
        }
    }

    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Runs catch-up processing: streams all events from the store and delivers
    /// them to each projection that hasn't already seen them.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<()> {
        let _running = self.running.lock().await;
        self.catch_up().await
    }

    async fn catch_up(&self) -> Result<()> {
        let mut stream = self.store.stream_all_events().await?;
        let mut event_index: u64 = 0;

        while let Some(result) = stream.next().await {
            let event = result?;
            event_index += 1;

            for projection in &self.projections {
                if projection.position().await.is_behind(event_index) {
                    projection.handle(&event).await?;
                    metrics::counter!("projections_events_processed", "projection" => projection.name())
                        .increment(1);
                }
            }
        }

        tracing::debug!(events_processed = event_index, "catch-up complete");

        Ok(())
    }

    /// Delivers a single event to all registered projections.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            projection.handle(event).await?;
        }
        Ok(())
    }

    /// Resets all projections and replays all events from the store.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<()> {
        let _running = self.running.lock().await;
        for projection in &self.projections {
            projection.reset().await?;
        }
        self.catch_up().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ProjectionPosition;
    use async_trait::async_trait;
    use common::AggregateId;
    use event_store::{AppendOptions, InMemoryEventStore, Version};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[derive(Clone)]
    struct CountingProjection {
        count: Arc<RwLock<u64>>,
        position: Arc<RwLock<ProjectionPosition>>,
    }

    impl CountingProjection {
        fn new() -> Self {
            Self {
                count: Arc::new(RwLock::new(0)),
                position: Arc::new(RwLock::new(ProjectionPosition::zero())),
            }
        }

        async fn count(&self) -> u64 {
            *self.count.read().await
        }
    }

    #[async_trait]
    impl Projection for CountingProjection {
        fn name(&self) -> &'static str {
            "CountingProjection"
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<()> {
            *self.count.write().await += 1;
            let mut pos = self.position.write().await;
            *pos = pos.advance();
            Ok(())
        }

        async fn position(&self) -> ProjectionPosition {
            *self.position.read().await
        }

        async fn reset(&self) -> Result<()> {
            *self.count.write().await = 0;
            *self.position.write().await = ProjectionPosition::zero();
            Ok(())
        }
    }

    fn stock_event(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Product")
            .event_type("StockRestocked")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({"type": "StockRestocked", "data": {"quantity": 1}}))
            .build()
            .unwrap()
    }

    async fn store_with(events: i64) -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        if events > 0 {
            let batch = (1..=events).map(|v| stock_event(id, v)).collect();
            store.append(batch, AppendOptions::new()).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn catch_up_delivers_every_event() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(3).await);
        processor.register(Box::new(projection.clone()));

        processor.run_catch_up().await.unwrap();

        assert_eq!(projection.count().await, 3);
    }

    #[tokio::test]
    async fn second_catch_up_skips_seen_events() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(3).await);
        processor.register(Box::new(projection.clone()));

        processor.run_catch_up().await.unwrap();
        processor.run_catch_up().await.unwrap();

        assert_eq!(projection.count().await, 3);
    }

    #[tokio::test]
    async fn concurrent_catch_ups_deliver_once() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(5).await);
        processor.register(Box::new(projection.clone()));

        let (a, b) = tokio::join!(processor.run_catch_up(), processor.run_catch_up());
        a.unwrap();
        b.unwrap();

        assert_eq!(projection.count().await, 5);
    }

    #[tokio::test]
    async fn single_event_reaches_all_projections() {
        let first = CountingProjection::new();
        let second = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new());
        processor.register(Box::new(first.clone()));
        processor.register(Box::new(second.clone()));
        assert_eq!(processor.projection_count(), 2);

        processor
            .process_event(&stock_event(AggregateId::new(), 1))
            .await
            .unwrap();

        assert_eq!(first.count().await, 1);
        assert_eq!(second.count().await, 1);
    }

    #[tokio::test]
    async fn rebuild_resets_and_replays() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(2).await);
        processor.register(Box::new(projection.clone()));

        processor.run_catch_up().await.unwrap();
        processor.rebuild_all().await.unwrap();

        assert_eq!(projection.count().await, 2);
        assert_eq!(projection.position().await.events_processed, 2);
    }

    #[tokio::test]
    async fn empty_store_is_a_no_op() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(0).await);
        processor.register(Box::new(projection.clone()));

        processor.run_catch_up().await.unwrap();

        assert_eq!(projection.count().await, 0);
    }
}
