//! Regression coverage for the session scheduling service.

use chrono::{Local, TimeZone};
use mockall::Sequence;
use rstest::{fixture, rstest};

use crate::domain::ErrorCode;
use crate::domain::ports::{
    MockPartitionStore, MockSessionRepository, PartitionOutcome,
};
use crate::domain::retry::{NoopSleeper, RetryPolicy};
use crate::domain::sessions::{Frequency, RecurrenceEnd};

use super::*;

fn fixture_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0)
        .single()
        .expect("valid fixture timestamp")
}

struct FixtureClock {
    utc_now: DateTime<Utc>,
}

impl Clock for FixtureClock {
    fn local(&self) -> chrono::DateTime<Local> {
        self.utc_now.with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.utc_now
    }
}

fn fixture_clock() -> Arc<dyn Clock> {
    Arc::new(FixtureClock {
        utc_now: fixture_now(),
    })
}

fn owner() -> OwnerId {
    OwnerId::from_uuid(Uuid::from_bytes([7; 16]))
}

fn service(
    ledger: MockSessionRepository,
    partitions: MockPartitionStore,
) -> SessionService<MockSessionRepository, MockPartitionStore> {
    let manager = PartitionManager::with_retry(
        Arc::new(partitions),
        RetryPolicy::default(),
        Arc::new(NoopSleeper),
    );
    SessionService::new(Arc::new(ledger), Arc::new(manager), fixture_clock())
}

#[fixture]
fn request() -> CreateSessionRequest {
    CreateSessionRequest {
        owner_id: owner(),
        plan_id: None,
        title: "Morning intervals".to_owned(),
        visibility: Visibility::Private,
        scheduled_at: Some(fixture_now() + Duration::days(1)),
        recurrence: None,
        exercises: vec![SessionExerciseDraft {
            id: Uuid::new_v4(),
            order_index: 1,
            exercise_id: None,
            notes: Some("5x800m".to_owned()),
        }],
    }
}

fn existing_session(scheduled_at: DateTime<Utc>) -> TrainingSession {
    TrainingSession::new(SessionDraft {
        id: Uuid::from_bytes([9; 16]),
        owner_id: owner(),
        plan_id: None,
        title: "Tempo run".to_owned(),
        visibility: Visibility::Private,
        scheduled_at,
        started_at: None,
        completed_at: None,
        status: SessionStatus::Planned,
        recurrence: None,
        calories_kcal: 0,
        points: 0,
        deleted_at: None,
        exercises: Vec::new(),
    })
    .expect("valid fixture session")
}

mod creation {
    use super::*;

    #[rstest]
    #[tokio::test]
    async fn secures_partition_coverage_before_inserting(request: CreateSessionRequest) {
        let mut seq = Sequence::new();
        let mut partitions = MockPartitionStore::new();
        let mut ledger = MockSessionRepository::new();
        partitions
            .expect_create_if_absent()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(PartitionOutcome::Created));
        ledger
            .expect_insert()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let created = service(ledger, partitions)
            .create_session(request)
            .await
            .expect("created");
        assert_eq!(created.anchor.status(), SessionStatus::Planned);
        assert!(created.occurrences.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn missing_scheduled_time_is_rejected_without_writes(mut request: CreateSessionRequest) {
        request.scheduled_at = None;

        let err = service(MockSessionRepository::new(), MockPartitionStore::new())
            .create_session(request)
            .await
            .expect_err("rejected");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[rstest]
    #[tokio::test]
    async fn zero_interval_recurrence_is_rejected_without_writes(
        mut request: CreateSessionRequest,
    ) {
        request.recurrence = Some(RecurrenceRuleDraft {
            frequency: Frequency::Weekly,
            interval: 0,
            end: None,
        });

        let err = service(MockSessionRepository::new(), MockPartitionStore::new())
            .create_session(request)
            .await
            .expect_err("rejected");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[rstest]
    #[tokio::test]
    async fn recurrence_materializes_planned_instances_within_the_horizon(
        mut request: CreateSessionRequest,
    ) {
        request.recurrence = Some(RecurrenceRuleDraft {
            frequency: Frequency::Weekly,
            interval: 1,
            end: Some(RecurrenceEnd::Count(3)),
        });

        let mut partitions = MockPartitionStore::new();
        let mut ledger = MockSessionRepository::new();
        // Anchor plus three weekly instances, each covered before insert.
        partitions
            .expect_create_if_absent()
            .times(4)
            .returning(|_| Ok(PartitionOutcome::AlreadyCovered));
        ledger.expect_insert().times(4).returning(|_| Ok(()));

        let created = service(ledger, partitions)
            .create_session(request)
            .await
            .expect("created");

        assert_eq!(created.occurrences.len(), 3);
        assert!(created.anchor.recurrence().is_some());
        let anchor_at = created.anchor.scheduled_at();
        for (index, instance) in created.occurrences.iter().enumerate() {
            let weeks = i64::try_from(index).expect("small index") + 1;
            assert_eq!(instance.scheduled_at(), anchor_at + Duration::weeks(weeks));
            assert_eq!(instance.status(), SessionStatus::Planned);
            assert!(instance.recurrence().is_none());
            assert_ne!(instance.id(), created.anchor.id());
        }
    }

    #[rstest]
    #[tokio::test]
    async fn expansion_stops_at_the_service_horizon(mut request: CreateSessionRequest) {
        // Unbounded weekly rule: the 90-day horizon caps materialization.
        request.recurrence = Some(RecurrenceRuleDraft {
            frequency: Frequency::Weekly,
            interval: 1,
            end: None,
        });

        let mut partitions = MockPartitionStore::new();
        let mut ledger = MockSessionRepository::new();
        partitions
            .expect_create_if_absent()
            .returning(|_| Ok(PartitionOutcome::AlreadyCovered));
        ledger.expect_insert().returning(|_| Ok(()));

        let horizon = fixture_now() + Duration::days(DEFAULT_EXPANSION_HORIZON_DAYS);
        let created = service(ledger, partitions)
            .create_session(request)
            .await
            .expect("created");

        assert!(!created.occurrences.is_empty());
        assert!(
            created
                .occurrences
                .iter()
                .all(|instance| instance.scheduled_at() <= horizon)
        );
    }

    #[rstest]
    #[tokio::test]
    async fn ledger_conflict_surfaces_as_conflict(request: CreateSessionRequest) {
        let mut partitions = MockPartitionStore::new();
        let mut ledger = MockSessionRepository::new();
        partitions
            .expect_create_if_absent()
            .returning(|_| Ok(PartitionOutcome::AlreadyCovered));
        ledger
            .expect_insert()
            .returning(|_| Err(SessionRepositoryError::conflict("duplicate key")));

        let err = service(ledger, partitions)
            .create_session(request)
            .await
            .expect_err("conflicted");
        assert_eq!(err.code(), ErrorCode::Conflict);
    }
}

mod updating {
    use super::*;

    fn ledger_returning(session: TrainingSession) -> MockSessionRepository {
        let mut ledger = MockSessionRepository::new();
        ledger
            .expect_find_by_id()
            .returning(move |_| Ok(Some(session.clone())));
        ledger
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let mut ledger = MockSessionRepository::new();
        ledger.expect_find_by_id().returning(|_| Ok(None));

        let err = service(ledger, MockPartitionStore::new())
            .update_session(&Uuid::new_v4(), SessionPatch::default())
            .await
            .expect_err("missing");
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[rstest]
    #[tokio::test]
    async fn rescheduling_through_a_patch_is_rejected() {
        let session = existing_session(fixture_now());
        let ledger = ledger_returning(session.clone());

        let err = service(ledger, MockPartitionStore::new())
            .update_session(
                &session.id(),
                SessionPatch {
                    scheduled_at: Some(fixture_now() + Duration::days(2)),
                    ..SessionPatch::default()
                },
            )
            .await
            .expect_err("immutable");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[rstest]
    #[tokio::test]
    async fn invalid_status_transition_is_a_conflict() {
        let session = existing_session(fixture_now());
        let ledger = ledger_returning(session.clone());

        // Planned sessions cannot jump straight to completed.
        let err = service(ledger, MockPartitionStore::new())
            .update_session(
                &session.id(),
                SessionPatch {
                    status: Some(SessionStatus::Completed),
                    ..SessionPatch::default()
                },
            )
            .await
            .expect_err("invalid transition");
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[rstest]
    #[tokio::test]
    async fn valid_patch_writes_only_the_named_fields() {
        let session = existing_session(fixture_now());
        let key = session.key();
        let mut ledger = ledger_returning(session.clone());
        ledger
            .expect_update()
            .withf(move |written_key, patch| {
                *written_key == key
                    && patch.title.as_deref() == Some("Evening intervals")
                    && patch.status.is_none()
                    && patch.points.is_none()
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let updated = service(ledger, MockPartitionStore::new())
            .update_session(
                &session.id(),
                SessionPatch {
                    title: Some("Evening intervals".to_owned()),
                    ..SessionPatch::default()
                },
            )
            .await
            .expect("updated");
        assert_eq!(updated.title(), "Evening intervals");
    }

    #[rstest]
    #[tokio::test]
    async fn restating_the_current_status_skips_the_ledger_write() {
        let session = existing_session(fixture_now());
        let ledger = ledger_returning(session.clone());
        // No expect_update: a status patch that changes nothing must not
        // reach the ledger, where it would trip the stale-write guard.

        let updated = service(ledger, MockPartitionStore::new())
            .update_session(
                &session.id(),
                SessionPatch {
                    status: Some(SessionStatus::Planned),
                    ..SessionPatch::default()
                },
            )
            .await
            .expect("no-op update");
        assert_eq!(updated.status(), SessionStatus::Planned);
    }

    #[rstest]
    #[tokio::test]
    async fn stale_status_write_surfaces_as_conflict() {
        let session = existing_session(fixture_now());
        let mut ledger = ledger_returning(session.clone());
        ledger.expect_update().times(1).returning(|_, _| {
            Err(SessionRepositoryError::conflict(
                "session row is missing or already reached a terminal status",
            ))
        });

        let err = service(ledger, MockPartitionStore::new())
            .update_session(
                &session.id(),
                SessionPatch {
                    status: Some(SessionStatus::Cancelled),
                    ..SessionPatch::default()
                },
            )
            .await
            .expect_err("stale write");
        assert_eq!(err.code(), ErrorCode::Conflict);
    }
}

mod cloning_and_deletion {
    use super::*;

    #[rstest]
    #[tokio::test]
    async fn clone_secures_coverage_for_the_target_month() {
        let session = existing_session(fixture_now());
        let target = fixture_now() + Duration::days(45);
        let mut ledger = MockSessionRepository::new();
        let fetched = session.clone();
        ledger
            .expect_find_by_id()
            .returning(move |_| Ok(Some(fetched.clone())));
        ledger
            .expect_insert()
            .withf(move |clone| {
                clone.scheduled_at() == target && clone.status() == SessionStatus::Planned
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut partitions = MockPartitionStore::new();
        partitions
            .expect_create_if_absent()
            .withf(move |spec| spec.covers(target))
            .times(1)
            .returning(|_| Ok(PartitionOutcome::Created));

        let clone = service(ledger, partitions)
            .clone_session(&session.id(), Some(target))
            .await
            .expect("cloned");
        assert_ne!(clone.id(), session.id());
        assert_eq!(clone.calories_kcal(), 0);
        assert_eq!(clone.points(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn soft_delete_stamps_the_current_instant() {
        let session = existing_session(fixture_now());
        let mut ledger = MockSessionRepository::new();
        let fetched = session.clone();
        ledger
            .expect_find_by_id()
            .returning(move |_| Ok(Some(fetched.clone())));
        let key = session.key();
        ledger
            .expect_mark_deleted()
            .withf(move |written_key, at| *written_key == key && *at == fixture_now())
            .times(1)
            .returning(|_, _| Ok(()));

        let deleted = service(ledger, MockPartitionStore::new())
            .soft_delete_session(&session.id())
            .await
            .expect("deleted");
        assert!(deleted.is_deleted());
    }

    #[rstest]
    #[tokio::test]
    async fn soft_delete_keeps_an_existing_marker() {
        let earlier = fixture_now() - Duration::days(3);
        let session = existing_session(fixture_now()).mark_deleted(earlier);
        let mut ledger = MockSessionRepository::new();
        let fetched = session.clone();
        ledger
            .expect_find_by_id()
            .returning(move |_| Ok(Some(fetched.clone())));
        ledger
            .expect_mark_deleted()
            .times(1)
            .returning(|_, _| Ok(()));

        let deleted = service(ledger, MockPartitionStore::new())
            .soft_delete_session(&session.id())
            .await
            .expect("idempotent delete");
        assert_eq!(deleted.deleted_at(), Some(earlier));
    }
}
