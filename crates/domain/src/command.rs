//! Command handling infrastructure.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, EventStoreExt, Snapshot, Version};
use serde::Serialize;

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::error::DomainError;

/// Attempts `execute_with_retry` callers make before giving up on a contended
/// aggregate.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The new version of the aggregate after the command.
    pub new_version: Version,
}

/// Trait for commands that can be executed against an aggregate.
///
/// Commands represent an intention to perform an action. They may be rejected
/// if the aggregate's current state doesn't allow the action.
pub trait Command: Send + Sync {
    /// The type of aggregate this command targets.
    type Aggregate: Aggregate;

    /// Returns the ID of the aggregate this command targets.
    fn aggregate_id(&self) -> AggregateId;
}

/// Handler for executing commands against aggregates.
///
/// The handler is responsible for:
/// 1. Loading the aggregate from the event store (with optional snapshot)
/// 2. Executing the command to produce events
/// 3. Persisting the events to the event store
/// 4. Optionally saving a snapshot
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    /// Creates a new command handler with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate from the event store.
    ///
    /// If the aggregate doesn't exist, returns a default instance.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError>
    where
        A: for<'de> serde::Deserialize<'de>,
        A::Event: for<'de> serde::Deserialize<'de>,
    {
        let (snapshot, events) = self.store.load_aggregate(aggregate_id).await?;

        let mut aggregate = if let Some(snapshot) = snapshot {
            let version = snapshot.version;
            let mut restored = self.restore_from_snapshot(snapshot)?;
            restored.set_version(version);
            restored
        } else {
            A::default()
        };

        // Apply events after snapshot
        for envelope in events {
            let event: A::Event = serde_json::from_value(envelope.payload)?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError>
    where
        A: for<'de> serde::Deserialize<'de>,
        A::Event: for<'de> serde::Deserialize<'de>,
    {
        let aggregate = self.load(aggregate_id).await?;
        if aggregate.id().is_some() {
            Ok(Some(aggregate))
        } else {
            Ok(None)
        }
    }

    /// Executes a command and persists the resulting events.
    ///
    /// The command function receives the current aggregate state and returns
    /// either a list of events to apply, or an error.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        A: for<'de> serde::Deserialize<'de>,
        A::Event: for<'de> serde::Deserialize<'de> + Serialize,
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut aggregate = self.load(aggregate_id).await?;
        let current_version = aggregate.version();

        // Execute command to get events
        let events = command_fn(&aggregate)?;

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                new_version: current_version,
            });
        }

        // Build envelopes for persistence
        let envelopes = self.build_envelopes(aggregate_id, current_version, &events)?;

        // Persist events with optimistic concurrency
        let options = if current_version == Version::initial() {
            AppendOptions::expect_new()
        } else {
            AppendOptions::expect_version(current_version)
        };

        let new_version = self.store.append(envelopes, options).await?;

        // Apply events to aggregate
        for event in &events {
            aggregate.apply(event.clone());
        }
        aggregate.set_version(new_version);

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }

    /// Executes a command, reloading and re-running it whenever the append
    /// loses an optimistic-concurrency race.
    ///
    /// The command closure is re-evaluated against fresh state on every
    /// attempt, so any availability check it performs is repeated too.
    pub async fn execute_with_retry<F>(
        &self,
        aggregate_id: AggregateId,
        max_attempts: u32,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        A: for<'de> serde::Deserialize<'de>,
        A::Event: for<'de> serde::Deserialize<'de> + Serialize,
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.execute(aggregate_id, &command_fn).await {
                Err(err) if err.is_conflict() => {
                    if attempt >= max_attempts {
                        tracing::warn!(
                            aggregate_type = A::aggregate_type(),
                            %aggregate_id,
                            attempts = attempt,
                            "Giving up after repeated version conflicts"
                        );
                        return Err(DomainError::ConcurrencyExhausted {
                            aggregate_type: A::aggregate_type(),
                            aggregate_id,
                            attempts: attempt,
                        });
                    }
                    tracing::debug!(
                        aggregate_type = A::aggregate_type(),
                        %aggregate_id,
                        attempt,
                        "Version conflict, retrying against fresh state"
                    );
                    metrics::counter!(
                        "stock_conflict_retries_total",
                        "aggregate" => A::aggregate_type()
                    )
                    .increment(1);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Builds event envelopes from domain events.
    fn build_envelopes(
        &self,
        aggregate_id: AggregateId,
        current_version: Version,
        events: &[A::Event],
    ) -> Result<Vec<EventEnvelope>, DomainError>
    where
        A::Event: Serialize,
    {
        let mut envelopes = Vec::with_capacity(events.len());
        let mut version = current_version;

        for event in events {
            version = version.next();
            let envelope = EventEnvelope::builder()
                .aggregate_id(aggregate_id)
                .aggregate_type(A::aggregate_type())
                .event_type(event.event_type())
                .version(version)
                .payload(event)?
                .build()?;
            envelopes.push(envelope);
        }

        Ok(envelopes)
    }

    fn restore_from_snapshot(&self, snapshot: Snapshot) -> Result<A, DomainError>
    where
        A: for<'de> serde::Deserialize<'de>,
    {
        let aggregate: A = serde_json::from_value(snapshot.state)?;
        Ok(aggregate)
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: SnapshotCapable,
{
    /// Executes a command and optionally saves a snapshot.
    pub async fn execute_with_snapshot<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        A: for<'de> serde::Deserialize<'de>,
        A::Event: for<'de> serde::Deserialize<'de> + Serialize,
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let result = self.execute(aggregate_id, command_fn).await?;
        self.save_snapshot_if_due(aggregate_id, &result).await?;
        Ok(result)
    }

    /// Persists a snapshot when the command crossed a snapshot boundary.
    pub async fn save_snapshot_if_due(
        &self,
        aggregate_id: AggregateId,
        result: &CommandResult<A>,
    ) -> Result<(), DomainError> {
        if result.events.is_empty() || !result.aggregate.should_snapshot() {
            return Ok(());
        }
        let snapshot = Snapshot::from_state(
            aggregate_id,
            A::aggregate_type(),
            result.new_version,
            &result.aggregate,
        )?;
        self.store.save_snapshot(snapshot).await?;
        tracing::debug!(
            aggregate_type = A::aggregate_type(),
            %aggregate_id,
            version = result.new_version.as_i64(),
            "Saved snapshot"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use event_store::{EventStoreError, EventStream, InMemoryEventStore};
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum TallyEvent {
        Opened { name: String },
        Added { amount: u32 },
    }

    impl DomainEvent for TallyEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TallyEvent::Opened { .. } => "TallyOpened",
                TallyEvent::Added { .. } => "TallyAdded",
            }
        }
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct Tally {
        id: Option<AggregateId>,
        name: String,
        total: u32,
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    enum TallyError {
        #[error("tally over budget")]
        OverBudget,
    }

    impl Aggregate for Tally {
        type Event = TallyEvent;
        type Error = TallyError;

        fn aggregate_type() -> &'static str {
            "Tally"
        }

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                TallyEvent::Opened { name } => {
                    self.id = Some(AggregateId::from_key("tally", &name));
                    self.name = name;
                }
                TallyEvent::Added { amount } => self.total += amount,
            }
        }
    }

    impl SnapshotCapable for Tally {
        fn snapshot_interval() -> usize {
            3
        }
    }

    impl From<TallyError> for DomainError {
        fn from(e: TallyError) -> Self {
            DomainError::AggregateNotFound {
                aggregate_type: "Tally",
                aggregate_id: e.to_string(),
            }
        }
    }

    fn tally_id() -> AggregateId {
        AggregateId::from_key("tally", "t")
    }

    async fn opened(handler: &CommandHandler<impl EventStore, Tally>) {
        handler
            .execute(tally_id(), |_| {
                Ok(vec![TallyEvent::Opened {
                    name: "t".to_string(),
                }])
            })
            .await
            .unwrap();
    }

    /// Fails the first `remaining` appends with a version conflict.
    #[derive(Clone)]
    struct ContendedStore {
        inner: InMemoryEventStore,
        remaining: Arc<AtomicU32>,
    }

    #[async_trait]
    impl EventStore for ContendedStore {
        async fn append(
            &self,
            events: Vec<EventEnvelope>,
            options: AppendOptions,
        ) -> event_store::Result<Version> {
            let lose = self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if lose {
                let aggregate_id = events[0].aggregate_id;
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected: options.expected_version.unwrap_or_default(),
                    actual: options.expected_version.unwrap_or_default().next(),
                });
            }
            self.inner.append(events, options).await
        }

        async fn get_events_for_aggregate(
            &self,
            aggregate_id: AggregateId,
        ) -> event_store::Result<Vec<EventEnvelope>> {
            self.inner.get_events_for_aggregate(aggregate_id).await
        }

        async fn get_events_for_aggregate_from_version(
            &self,
            aggregate_id: AggregateId,
            from_version: Version,
        ) -> event_store::Result<Vec<EventEnvelope>> {
            self.inner
                .get_events_for_aggregate_from_version(aggregate_id, from_version)
                .await
        }

        async fn stream_all_events(&self) -> event_store::Result<EventStream> {
            self.inner.stream_all_events().await
        }

        async fn get_aggregate_version(
            &self,
            aggregate_id: AggregateId,
        ) -> event_store::Result<Option<Version>> {
            self.inner.get_aggregate_version(aggregate_id).await
        }

        async fn save_snapshot(&self, snapshot: Snapshot) -> event_store::Result<()> {
            self.inner.save_snapshot(snapshot).await
        }

        async fn get_snapshot(
            &self,
            aggregate_id: AggregateId,
        ) -> event_store::Result<Option<Snapshot>> {
            self.inner.get_snapshot(aggregate_id).await
        }
    }

    #[tokio::test]
    async fn execute_creates_then_updates() {
        let handler: CommandHandler<_, Tally> = CommandHandler::new(InMemoryEventStore::new());
        opened(&handler).await;

        let result = handler
            .execute(tally_id(), |_| Ok(vec![TallyEvent::Added { amount: 42 }]))
            .await
            .unwrap();

        assert_eq!(result.new_version, Version::new(2));
        assert_eq!(result.aggregate.total, 42);
        assert_eq!(result.aggregate.name, "t");
    }

    #[tokio::test]
    async fn rejected_command_appends_nothing() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Tally> = CommandHandler::new(store.clone());

        let result = handler
            .execute(tally_id(), |_| Err(TallyError::OverBudget))
            .await;

        assert!(result.is_err());
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn empty_event_list_is_a_no_op() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Tally> = CommandHandler::new(store.clone());

        let result = handler.execute(tally_id(), |_| Ok(vec![])).await.unwrap();

        assert!(result.events.is_empty());
        assert_eq!(result.new_version, Version::initial());
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn load_existing_distinguishes_missing_streams() {
        let handler: CommandHandler<_, Tally> = CommandHandler::new(InMemoryEventStore::new());
        assert!(handler.load_existing(tally_id()).await.unwrap().is_none());

        opened(&handler).await;
        let tally = handler.load_existing(tally_id()).await.unwrap().unwrap();
        assert_eq!(tally.name, "t");
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_conflicts() {
        let store = ContendedStore {
            inner: InMemoryEventStore::new(),
            remaining: Arc::new(AtomicU32::new(0)),
        };
        let handler: CommandHandler<_, Tally> = CommandHandler::new(store.clone());
        opened(&handler).await;

        store.remaining.store(2, Ordering::SeqCst);
        let evaluations = AtomicU32::new(0);
        let result = handler
            .execute_with_retry(tally_id(), 3, |_| {
                evaluations.fetch_add(1, Ordering::SeqCst);
                Ok(vec![TallyEvent::Added { amount: 1 }])
            })
            .await
            .unwrap();

        assert_eq!(result.aggregate.total, 1);
        assert_eq!(evaluations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let store = ContendedStore {
            inner: InMemoryEventStore::new(),
            remaining: Arc::new(AtomicU32::new(0)),
        };
        let handler: CommandHandler<_, Tally> = CommandHandler::new(store.clone());
        opened(&handler).await;

        store.remaining.store(10, Ordering::SeqCst);
        let err = handler
            .execute_with_retry(tally_id(), 3, |_| Ok(vec![TallyEvent::Added { amount: 1 }]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::ConcurrencyExhausted { attempts: 3, .. }
        ));
        let tally = handler.load(tally_id()).await.unwrap();
        assert_eq!(tally.total, 0);
    }

    #[tokio::test]
    async fn concurrent_writers_all_land_with_retry() {
        let store = InMemoryEventStore::new();
        let handler = Arc::new(CommandHandler::<_, Tally>::new(store.clone()));
        opened(handler.as_ref()).await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handler = Arc::clone(&handler);
            tasks.push(tokio::spawn(async move {
                handler
                    .execute_with_retry(tally_id(), 50, |_| {
                        Ok(vec![TallyEvent::Added { amount: 1 }])
                    })
                    .await
                    .map(|_| ())
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let tally = handler.load(tally_id()).await.unwrap();
        assert_eq!(tally.total, 8);
        assert_eq!(tally.version(), Version::new(9));
    }

    #[tokio::test]
    async fn snapshot_saved_on_boundary_and_used_on_load() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Tally> = CommandHandler::new(store.clone());
        opened(&handler).await;

        for _ in 0..2 {
            handler
                .execute_with_snapshot(tally_id(), |_| Ok(vec![TallyEvent::Added { amount: 5 }]))
                .await
                .unwrap();
        }

        let snapshot = store.get_snapshot(tally_id()).await.unwrap().unwrap();
        assert_eq!(snapshot.version, Version::new(3));

        handler
            .execute(tally_id(), |_| Ok(vec![TallyEvent::Added { amount: 1 }]))
            .await
            .unwrap();
        let tally = handler.load(tally_id()).await.unwrap();
        assert_eq!(tally.total, 11);
        assert_eq!(tally.version(), Version::new(4));
    }
}
