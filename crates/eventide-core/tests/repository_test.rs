//! End-to-end tests for `AggregateRepository` against the in-memory stores.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};
use eventide_core::aggregate::{AggregateRoot, Lifecycle, UnhandledEventPolicy};
use eventide_core::cancel::CancellationToken;
use eventide_core::command::CommandContext;
use eventide_core::error::{DomainError, RegistryError};
use eventide_core::policy::SnapshotPolicy;
use eventide_core::publisher::EventPublisher;
use eventide_core::repository::AggregateRepository;
use eventide_core::snapshot::{Snapshot, SnapshotStore};
use eventide_core::store::EventStore;
use eventide_core::upcast::UpcasterRegistry;
use eventide_event_store::{InMemoryEventStore, InMemorySnapshotStore};
use eventide_test_support::{
    EmptyEventStore, FailingEventStore, FailingPublisher, FailingSnapshotStore, FixedClock,
    ManualClock, PendingEventStore, Person, RecordingEventStore, RecordingPublisher,
    person_registry, person_upcasters, raw_event,
};
use uuid::Uuid;

fn fixed_clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap())
}

fn repository(events: Arc<dyn EventStore>) -> AggregateRepository<Person> {
    AggregateRepository::new(events, person_registry())
}

/// Saves a person with `renames` renames after creation, one save per event.
async fn seed_person(
    repo: &AggregateRepository<Person>,
    id: Uuid,
    renames: usize,
) -> Person {
    let clock = fixed_clock();
    let ctx = CommandContext::new(Uuid::new_v4(), &clock);
    let mut person = Person::create(id, "Ada", &ctx);
    repo.save(&mut person).await.unwrap();
    for i in 0..renames {
        person.rename(&format!("Ada {i}"), &ctx).unwrap();
        repo.save(&mut person).await.unwrap();
    }
    person
}

// --- round trip ---

#[tokio::test]
async fn test_save_then_get_by_id_restores_state() {
    // Arrange
    let repo = repository(Arc::new(InMemoryEventStore::new()));
    let clock = fixed_clock();
    let ctx = CommandContext::new(Uuid::new_v4(), &clock);
    let id = Uuid::new_v4();
    let mut person = Person::create(id, "Ada", &ctx);
    person.rename("Grace", &ctx).unwrap();

    // Act
    repo.save(&mut person).await.unwrap();
    let loaded = repo.get_by_id(id).await.unwrap();

    // Assert
    assert!(person.uncommitted_events().is_empty());
    assert_eq!(person.version(), 2);
    assert_eq!(loaded.aggregate_id(), id);
    assert_eq!(loaded.name, "Grace");
    assert_eq!(loaded.renames, 1);
    assert_eq!(loaded.version(), 2);
    assert_eq!(loaded.lifecycle(), Lifecycle::Active);
    assert!(loaded.uncommitted_events().is_empty());
}

#[tokio::test]
async fn test_save_sends_committed_version_as_expected_version() {
    let store = Arc::new(RecordingEventStore::new(InMemoryEventStore::new()));
    let repo = repository(Arc::clone(&store) as Arc<dyn EventStore>);
    let clock = fixed_clock();
    let ctx = CommandContext::new(Uuid::new_v4(), &clock);
    let id = Uuid::new_v4();

    let mut person = Person::create(id, "Ada", &ctx);
    person.rename("B", &ctx).unwrap();
    person.rename("C", &ctx).unwrap();
    repo.save(&mut person).await.unwrap();
    person.rename("D", &ctx).unwrap();
    repo.save(&mut person).await.unwrap();

    let appends = store.appends();
    assert_eq!(appends.len(), 2);
    assert_eq!(appends[0].expected_version, 0);
    assert_eq!(appends[0].events.len(), 3);
    assert_eq!(appends[0].aggregate_type, "person");
    assert_eq!(appends[1].expected_version, 3);
    assert_eq!(person.version(), 4);
}

#[tokio::test]
async fn test_save_without_uncommitted_events_does_not_touch_the_store() {
    let store = Arc::new(RecordingEventStore::new(InMemoryEventStore::new()));
    let repo = repository(Arc::clone(&store) as Arc<dyn EventStore>);
    let mut person = seed_person(&repo, Uuid::new_v4(), 0).await;

    repo.save(&mut person).await.unwrap();

    assert_eq!(store.appends().len(), 1);
    assert_eq!(person.version(), 1);
}

#[tokio::test]
async fn test_raised_events_carry_command_context() {
    let store = Arc::new(InMemoryEventStore::new());
    let repo = repository(Arc::clone(&store) as Arc<dyn EventStore>);
    let clock = fixed_clock();
    let correlation_id = Uuid::new_v4();
    let cause = Uuid::new_v4();
    let ctx = CommandContext::new(correlation_id, &clock).caused_by(cause);
    let id = Uuid::new_v4();

    let mut person = Person::create(id, "Ada", &ctx);
    repo.save(&mut person).await.unwrap();

    let records = store.load_events(id, "person", 0).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event_type, "person.created");
    assert_eq!(records[0].correlation_id, correlation_id);
    assert_eq!(records[0].causation_id, cause);
    assert_eq!(records[0].occurred_at, clock.0);
    assert_eq!(records[0].payload, serde_json::json!({"name": "Ada"}));
}

// --- not found ---

#[tokio::test]
async fn test_get_by_id_returns_not_found_for_unknown_aggregate() {
    let repo = repository(Arc::new(EmptyEventStore));
    let id = Uuid::new_v4();

    let result = repo.get_by_id(id).await;

    match result {
        Err(DomainError::AggregateNotFound {
            aggregate_type,
            aggregate_id,
        }) => {
            assert_eq!(aggregate_type, "person");
            assert_eq!(aggregate_id, id);
        }
        other => panic!("expected AggregateNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_find_by_id_returns_none_for_unknown_aggregate() {
    let repo = repository(Arc::new(InMemoryEventStore::new()));

    let found = repo.find_by_id(Uuid::new_v4()).await.unwrap();

    assert!(found.is_none());
}

// --- optimistic concurrency ---

#[tokio::test]
async fn test_stale_writer_gets_conflict_and_can_retry_after_reload() {
    // Arrange: a person at version 2, loaded by two writers.
    let repo = repository(Arc::new(InMemoryEventStore::new()));
    let clock = fixed_clock();
    let ctx = CommandContext::new(Uuid::new_v4(), &clock);
    let id = Uuid::new_v4();
    seed_person(&repo, id, 1).await;
    let mut first = repo.get_by_id(id).await.unwrap();
    let mut second = repo.get_by_id(id).await.unwrap();

    // Act
    first.rename("First", &ctx).unwrap();
    repo.save(&mut first).await.unwrap();
    second.rename("Second", &ctx).unwrap();
    let result = repo.save(&mut second).await;

    // Assert
    match result {
        Err(DomainError::ConcurrencyConflict {
            aggregate_id,
            expected,
            actual,
        }) => {
            assert_eq!(aggregate_id, id);
            assert_eq!(expected, 2);
            assert_eq!(actual, 3);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
    assert_eq!(second.uncommitted_events().len(), 1);
    assert_eq!(second.version(), 3);

    let mut reloaded = repo.get_by_id(id).await.unwrap();
    assert_eq!(reloaded.name, "First");
    reloaded.rename("Second", &ctx).unwrap();
    repo.save(&mut reloaded).await.unwrap();
    assert_eq!(repo.get_by_id(id).await.unwrap().version(), 4);
}

#[tokio::test]
async fn test_concurrent_saves_from_same_version_exactly_one_succeeds() {
    let repo = repository(Arc::new(InMemoryEventStore::new()));
    let clock = fixed_clock();
    let ctx = CommandContext::new(Uuid::new_v4(), &clock);
    let id = Uuid::new_v4();
    seed_person(&repo, id, 0).await;

    let mut a = repo.get_by_id(id).await.unwrap();
    let mut b = repo.get_by_id(id).await.unwrap();
    let mut c = repo.get_by_id(id).await.unwrap();
    a.rename("A", &ctx).unwrap();
    b.rename("B", &ctx).unwrap();
    c.rename("C", &ctx).unwrap();

    let (ra, rb, rc) = tokio::join!(repo.save(&mut a), repo.save(&mut b), repo.save(&mut c));

    let results = [ra, rb, rc];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.is_conflict()))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(conflicts, 2);
    assert_eq!(repo.get_by_id(id).await.unwrap().version(), 2);
}

// --- snapshots ---

#[tokio::test]
async fn test_snapshot_load_matches_full_replay() {
    // Arrange
    let events = Arc::new(RecordingEventStore::new(InMemoryEventStore::new()));
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let snapshotting = repository(Arc::clone(&events) as Arc<dyn EventStore>).with_snapshots(
        Arc::clone(&snapshots) as Arc<dyn SnapshotStore>,
        SnapshotPolicy::Frequency(2),
    );
    let plain = repository(Arc::clone(&events) as Arc<dyn EventStore>);
    let id = Uuid::new_v4();

    // Act: versions 1, 2 (snapshot), 3.
    seed_person(&snapshotting, id, 2).await;
    let from_snapshot = snapshotting.get_by_id(id).await.unwrap();
    let replayed = plain.get_by_id(id).await.unwrap();

    // Assert
    let stored = snapshots.latest_snapshot(id, "person").await.unwrap().unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(events.loads(), vec![2, 0]);
    assert_eq!(from_snapshot.version(), 3);
    assert_eq!(from_snapshot.version(), replayed.version());
    assert_eq!(from_snapshot.name, replayed.name);
    assert_eq!(from_snapshot.renames, replayed.renames);
}

#[tokio::test]
async fn test_frequency_policy_counts_from_loaded_snapshot() {
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let repo = repository(Arc::new(InMemoryEventStore::new())).with_snapshots(
        Arc::clone(&snapshots) as Arc<dyn SnapshotStore>,
        SnapshotPolicy::Frequency(2),
    );
    let clock = fixed_clock();
    let ctx = CommandContext::new(Uuid::new_v4(), &clock);
    let id = Uuid::new_v4();
    seed_person(&repo, id, 2).await;

    let mut person = repo.get_by_id(id).await.unwrap();
    person.rename("Later", &ctx).unwrap();
    repo.save(&mut person).await.unwrap();

    let stored = snapshots.latest_snapshot(id, "person").await.unwrap().unwrap();
    assert_eq!(stored.version, 4);
    assert_eq!(stored.data["name"], "Later");
}

#[tokio::test]
async fn test_time_interval_policy_uses_repository_clock() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap()));
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let repo = repository(Arc::new(InMemoryEventStore::new()))
        .with_snapshots(
            Arc::clone(&snapshots) as Arc<dyn SnapshotStore>,
            SnapshotPolicy::TimeInterval(Duration::hours(1)),
        )
        .with_clock(Arc::clone(&clock) as Arc<dyn eventide_core::clock::Clock>);
    let ctx = CommandContext::new(Uuid::new_v4(), clock.as_ref());
    let id = Uuid::new_v4();

    // First save: no snapshot yet, so one is taken.
    let mut person = Person::create(id, "Ada", &ctx);
    repo.save(&mut person).await.unwrap();
    assert_eq!(snapshots.latest_snapshot(id, "person").await.unwrap().unwrap().version, 1);

    // Ten minutes later: too soon.
    clock.advance(Duration::minutes(10));
    person.rename("B", &ctx).unwrap();
    repo.save(&mut person).await.unwrap();
    assert_eq!(snapshots.latest_snapshot(id, "person").await.unwrap().unwrap().version, 1);

    // Past the interval.
    clock.advance(Duration::hours(1));
    person.rename("C", &ctx).unwrap();
    repo.save(&mut person).await.unwrap();
    assert_eq!(snapshots.latest_snapshot(id, "person").await.unwrap().unwrap().version, 3);
}

#[tokio::test]
async fn test_snapshot_store_failures_do_not_fail_save_or_load() {
    let snapshots = Arc::new(FailingSnapshotStore::new());
    let repo = repository(Arc::new(InMemoryEventStore::new())).with_snapshots(
        Arc::clone(&snapshots) as Arc<dyn SnapshotStore>,
        SnapshotPolicy::Frequency(1),
    );
    let id = Uuid::new_v4();

    let person = seed_person(&repo, id, 1).await;
    let loaded = repo.get_by_id(id).await.unwrap();

    assert_eq!(snapshots.attempted_writes(), 2);
    assert_eq!(person.version(), 2);
    assert_eq!(loaded.version(), 2);
    assert_eq!(loaded.name, "Ada 0");
}

#[tokio::test]
async fn test_unreadable_snapshot_falls_back_to_full_replay() {
    let events = Arc::new(RecordingEventStore::new(InMemoryEventStore::new()));
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let repo = repository(Arc::clone(&events) as Arc<dyn EventStore>).with_snapshots(
        Arc::clone(&snapshots) as Arc<dyn SnapshotStore>,
        SnapshotPolicy::Never,
    );
    let id = Uuid::new_v4();
    seed_person(&repo, id, 2).await;
    snapshots
        .save_snapshot(&Snapshot {
            aggregate_id: id,
            aggregate_type: "person".to_owned(),
            version: 2,
            taken_at: Utc::now(),
            data: serde_json::json!({"unexpected": true}),
        })
        .await
        .unwrap();

    let loaded = repo.get_by_id(id).await.unwrap();

    assert_eq!(events.loads(), vec![0]);
    assert_eq!(loaded.version(), 3);
    assert_eq!(loaded.name, "Ada 1");
}

// --- upcasting and decoding ---

#[tokio::test]
async fn test_legacy_events_are_upcast_before_replay() {
    let store = Arc::new(InMemoryEventStore::new());
    let id = Uuid::new_v4();
    store
        .append(
            id,
            "person",
            0,
            &[
                raw_event("person.created", serde_json::json!({"name": "Ada"})),
                raw_event("person.renamed.v1", serde_json::json!({"new_name": "Grace"})),
            ],
        )
        .await
        .unwrap();
    let repo = repository(Arc::clone(&store) as Arc<dyn EventStore>)
        .with_upcasters(person_upcasters())
        .unwrap();

    let person = repo.get_by_id(id).await.unwrap();

    assert_eq!(person.name, "Grace");
    assert_eq!(person.renames, 1);
    assert_eq!(person.version(), 2);
}

#[tokio::test]
async fn test_cyclic_upcaster_registry_is_rejected_at_construction() {
    // Arrange
    let mut upcasters = UpcasterRegistry::new();
    upcasters
        .register_fn("person.renamed.v1", "person.renamed.v2", Ok)
        .unwrap()
        .register_fn("person.renamed.v2", "person.renamed.v1", Ok)
        .unwrap();

    // Act
    let result = repository(Arc::new(InMemoryEventStore::new()))
        .with_upcasters(Arc::new(upcasters));

    // Assert
    assert!(matches!(result, Err(RegistryError::CyclicUpcasterChain(_))));
}

#[tokio::test]
async fn test_unregistered_event_type_fails_the_load() {
    let store = Arc::new(InMemoryEventStore::new());
    let id = Uuid::new_v4();
    store
        .append(
            id,
            "person",
            0,
            &[raw_event("person.renamed.v1", serde_json::json!({"new_name": "Grace"}))],
        )
        .await
        .unwrap();
    let repo = repository(Arc::clone(&store) as Arc<dyn EventStore>);

    let result = repo.get_by_id(id).await;

    match result {
        Err(DomainError::UnregisteredEventType { event_type }) => {
            assert_eq!(event_type, "person.renamed.v1");
        }
        other => panic!("expected UnregisteredEventType, got {other:?}"),
    }
}

#[tokio::test]
async fn test_payload_mismatch_is_a_serialization_error() {
    let store = Arc::new(InMemoryEventStore::new());
    let id = Uuid::new_v4();
    store
        .append(
            id,
            "person",
            0,
            &[raw_event("person.created", serde_json::json!({"full_name": "Ada"}))],
        )
        .await
        .unwrap();
    let repo = repository(Arc::clone(&store) as Arc<dyn EventStore>);

    let result = repo.get_by_id(id).await;

    assert!(matches!(result, Err(DomainError::Serialization(_))), "got {result:?}");
}

// --- unhandled events ---

#[tokio::test]
async fn test_unhandled_event_advances_version_by_default() {
    let repo = repository(Arc::new(InMemoryEventStore::new()));
    let clock = fixed_clock();
    let ctx = CommandContext::new(Uuid::new_v4(), &clock);
    let id = Uuid::new_v4();
    let mut person = Person::create(id, "Ada", &ctx);
    person.audit("checked", &ctx);
    repo.save(&mut person).await.unwrap();

    let loaded = repo.get_by_id(id).await.unwrap();

    assert_eq!(loaded.version(), 2);
    assert_eq!(loaded.name, "Ada");
}

#[tokio::test]
async fn test_unhandled_event_fails_load_under_fail_fast() {
    let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let writer = repository(Arc::clone(&store));
    let strict = repository(Arc::clone(&store))
        .with_unhandled_event_policy(UnhandledEventPolicy::FailFast);
    let clock = fixed_clock();
    let ctx = CommandContext::new(Uuid::new_v4(), &clock);
    let id = Uuid::new_v4();
    let mut person = Person::create(id, "Ada", &ctx);
    person.audit("checked", &ctx);
    writer.save(&mut person).await.unwrap();

    let result = strict.get_by_id(id).await;

    match result {
        Err(DomainError::UnhandledEvent {
            aggregate_type,
            event_type,
        }) => {
            assert_eq!(aggregate_type, "person");
            assert_eq!(event_type, "person.audited");
        }
        other => panic!("expected UnhandledEvent, got {other:?}"),
    }
}

// --- publishing ---

#[tokio::test]
async fn test_publisher_receives_committed_events_only() {
    let publisher = Arc::new(RecordingPublisher::new());
    let repo = repository(Arc::new(InMemoryEventStore::new()))
        .with_publisher(Arc::clone(&publisher) as Arc<dyn EventPublisher>);
    let clock = fixed_clock();
    let ctx = CommandContext::new(Uuid::new_v4(), &clock);
    let id = Uuid::new_v4();
    let mut person = Person::create(id, "Ada", &ctx);
    person.rename("Grace", &ctx).unwrap();
    repo.save(&mut person).await.unwrap();

    let mut stale = Person::create(id, "Other", &ctx);
    let result = repo.save(&mut stale).await;

    assert!(matches!(result, Err(DomainError::ConcurrencyConflict { .. })));
    let batches = publisher.batches();
    assert_eq!(batches.len(), 1);
    let versions: Vec<i64> = batches[0].iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![1, 2]);
    assert!(batches[0].iter().all(|r| r.aggregate_id == id));
}

#[tokio::test]
async fn test_publisher_failure_does_not_fail_save() {
    let repo =
        repository(Arc::new(InMemoryEventStore::new())).with_publisher(Arc::new(FailingPublisher));
    let clock = fixed_clock();
    let ctx = CommandContext::new(Uuid::new_v4(), &clock);
    let id = Uuid::new_v4();
    let mut person = Person::create(id, "Ada", &ctx);

    repo.save(&mut person).await.unwrap();

    assert_eq!(repo.get_by_id(id).await.unwrap().version(), 1);
}

// --- storage failures and cancellation ---

#[tokio::test]
async fn test_storage_unavailable_propagates_and_keeps_uncommitted_events() {
    let repo = repository(Arc::new(FailingEventStore));
    let clock = fixed_clock();
    let ctx = CommandContext::new(Uuid::new_v4(), &clock);
    let mut person = Person::create(Uuid::new_v4(), "Ada", &ctx);

    let save = repo.save(&mut person).await;
    let load = repo.get_by_id(Uuid::new_v4()).await;

    assert!(matches!(save, Err(ref e) if e.is_transient()), "got {save:?}");
    assert!(matches!(load, Err(DomainError::StorageUnavailable(_))), "got {load:?}");
    assert_eq!(person.uncommitted_events().len(), 1);
}

#[tokio::test]
async fn test_save_cancellable_stops_a_pending_append() {
    let repo = repository(Arc::new(PendingEventStore));
    let clock = fixed_clock();
    let ctx = CommandContext::new(Uuid::new_v4(), &clock);
    let mut person = Person::create(Uuid::new_v4(), "Ada", &ctx);
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        canceller.cancel();
    });

    let result = repo.save_cancellable(&mut person, &token).await;

    assert!(matches!(result, Err(DomainError::Cancelled)), "got {result:?}");
    assert_eq!(person.uncommitted_events().len(), 1);
    assert_eq!(person.core().committed_version(), 0);
}

#[tokio::test]
async fn test_get_by_id_cancellable_with_cancelled_token() {
    let repo = repository(Arc::new(InMemoryEventStore::new()));
    let id = Uuid::new_v4();
    seed_person(&repo, id, 0).await;
    let token = CancellationToken::new();
    token.cancel();

    let result = repo.get_by_id_cancellable(id, &token).await;

    assert!(matches!(result, Err(DomainError::Cancelled)), "got {result:?}");
}
