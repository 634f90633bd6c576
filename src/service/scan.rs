use crate::database::attendance::{AttendanceRepository, NewScan};
use crate::database::session::SessionRepository;
use crate::error::app_error::AppError;
use crate::models::attendance::{AttendanceRecord, AttendanceStatus};
use crate::models::qr::QrPayload;
use crate::models::session::Session;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

/// Turns a decoded QR string plus the scanning student into one attendance record.
pub struct ScanHandler<'a, R> {
    repository: &'a R,
    late_threshold: Duration,
}

impl<'a, R> ScanHandler<'a, R>
where
    R: SessionRepository + AttendanceRepository,
{
    pub fn new(repository: &'a R, late_threshold_minutes: i64) -> Self {
        ScanHandler {
            repository,
            late_threshold: Duration::minutes(late_threshold_minutes),
        }
    }

    pub async fn handle_scan(&self, raw_payload: &str, student_id: &Uuid) -> Result<AttendanceRecord, AppError> {
        self.handle_scan_at(raw_payload, student_id, Utc::now()).await
    }

    pub async fn handle_scan_at(&self, raw_payload: &str, student_id: &Uuid, now: DateTime<Utc>) -> Result<AttendanceRecord, AppError> {
        let result = self.accept(raw_payload, student_id, now).await;
        match &result {
            Ok(record) => info!(
                session_id = %record.session_id,
                student_id = %student_id,
                status = ?record.status,
                "Scan accepted"
            ),
            Err(err) if err.is_scan_rejection() => warn!(student_id = %student_id, reason = err.code(), "Scan rejected"),
            Err(_) => {}
        }
        result
    }

    async fn accept(&self, raw_payload: &str, student_id: &Uuid, now: DateTime<Utc>) -> Result<AttendanceRecord, AppError> {
        let payload = QrPayload::parse(raw_payload)?;

        let session = self
            .repository
            .get_session_by_id(&payload.session_id)
            .await?
            .ok_or(AppError::SessionNotFound)?;

        // Only the stored flag closes a session to scans. The countdown and the
        // expiry sweep are what flip it once `expires_at` passes.
        if !session.active {
            return Err(AppError::SessionEnded);
        }

        if payload.token != session.current_token {
            return Err(AppError::TokenExpired);
        }

        if let Some(existing) = self.repository.get_attendance(&session.id, student_id).await?
            && existing.status.is_recorded()
        {
            return Err(AppError::AlreadyRecorded);
        }

        let scan = NewScan {
            session_id: session.id,
            student_id: *student_id,
            course_id: session.course_id,
            status: self.classify(&session, now),
            scanned_at: now,
        };

        // The insert is conditional on the composite key, so a concurrent
        // duplicate still ends in AlreadyRecorded.
        self.repository.record_scan(&scan).await
    }

    /// Late once strictly more than the threshold has passed since the start,
    /// regardless of the session's configured duration.
    pub fn classify(&self, session: &Session, now: DateTime<Utc>) -> AttendanceStatus {
        if now - session.start_time > self.late_threshold {
            AttendanceStatus::Late
        } else {
            AttendanceStatus::Present
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::service::session::SessionService;
    use crate::test_utils::{Fixture, sample_request};

    fn payload_for(session: &Session, token: &str) -> String {
        QrPayload::new(session.id, session.course_id, token, session.start_time.timestamp_millis()).stringify()
    }

    async fn started(fixture: &Fixture, minutes: i32) -> Session {
        let config = SessionConfig::default();
        SessionService::new(&fixture.repo, &config)
            .start_session(&fixture.professor_id, &sample_request(fixture, minutes))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn immediate_scan_is_present() {
        let fixture = Fixture::new();
        let session = started(&fixture, 10).await;
        let handler = ScanHandler::new(&fixture.repo, 10);

        let record = handler
            .handle_scan_at(&payload_for(&session, &session.current_token), &fixture.student_ids[0], session.start_time)
            .await
            .unwrap();

        assert_eq!(record.status, AttendanceStatus::Present);
        let stored = fixture.repo.get_attendance(&session.id, &fixture.student_ids[0]).await.unwrap().unwrap();
        assert_eq!(stored.status, AttendanceStatus::Present);
    }

    #[tokio::test]
    async fn second_scan_by_same_student_is_already_recorded() {
        let fixture = Fixture::new();
        let session = started(&fixture, 10).await;
        let handler = ScanHandler::new(&fixture.repo, 10);
        let payload = payload_for(&session, &session.current_token);
        let student = fixture.student_ids[0];

        handler.handle_scan_at(&payload, &student, session.start_time).await.unwrap();
        let again = handler.handle_scan_at(&payload, &student, session.start_time + Duration::minutes(9)).await;

        assert!(matches!(again, Err(AppError::AlreadyRecorded)));
        assert_eq!(fixture.repo.list_for_session(&session.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn first_scan_after_threshold_is_late() {
        let fixture = Fixture::new();
        let session = started(&fixture, 30).await;
        let handler = ScanHandler::new(&fixture.repo, 10);

        let record = handler
            .handle_scan_at(
                &payload_for(&session, &session.current_token),
                &fixture.student_ids[1],
                session.start_time + Duration::minutes(11),
            )
            .await
            .unwrap();

        assert_eq!(record.status, AttendanceStatus::Late);
    }

    #[tokio::test]
    async fn late_threshold_boundary() {
        let fixture = Fixture::new();
        let session = started(&fixture, 30).await;
        let handler = ScanHandler::new(&fixture.repo, 10);
        let threshold = session.start_time + Duration::minutes(10);

        assert_eq!(handler.classify(&session, threshold - Duration::milliseconds(1)), AttendanceStatus::Present);
        assert_eq!(handler.classify(&session, threshold), AttendanceStatus::Present);
        assert_eq!(handler.classify(&session, threshold + Duration::milliseconds(1)), AttendanceStatus::Late);
    }

    #[tokio::test]
    async fn ended_session_rejects_any_token() {
        let fixture = Fixture::new();
        let session = started(&fixture, 10).await;
        let config = SessionConfig::default();
        SessionService::new(&fixture.repo, &config)
            .end_session(&session.id, &fixture.professor_id)
            .await
            .unwrap();
        let handler = ScanHandler::new(&fixture.repo, 10);

        for token in [session.current_token.as_str(), "stale"] {
            let result = handler.handle_scan(&payload_for(&session, token), &fixture.student_ids[2]).await;
            assert!(matches!(result, Err(AppError::SessionEnded)));
        }
    }

    #[tokio::test]
    async fn rescan_after_duration_is_already_recorded() {
        let fixture = Fixture::new();
        let session = started(&fixture, 10).await;
        let handler = ScanHandler::new(&fixture.repo, 10);
        let payload = payload_for(&session, &session.current_token);
        let student = fixture.student_ids[0];

        handler.handle_scan_at(&payload, &student, session.start_time).await.unwrap();
        let again = handler.handle_scan_at(&payload, &student, session.start_time + Duration::minutes(11)).await;

        assert!(matches!(again, Err(AppError::AlreadyRecorded)));
        assert_eq!(fixture.repo.list_for_session(&session.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn first_scan_past_duration_is_late_while_session_is_open() {
        let fixture = Fixture::new();
        let session = started(&fixture, 10).await;
        let handler = ScanHandler::new(&fixture.repo, 10);

        let record = handler
            .handle_scan_at(
                &payload_for(&session, &session.current_token),
                &fixture.student_ids[1],
                session.start_time + Duration::minutes(11),
            )
            .await
            .unwrap();

        assert_eq!(record.status, AttendanceStatus::Late);
    }

    #[tokio::test]
    async fn swept_session_rejects_scan() {
        let fixture = Fixture::new();
        let session = started(&fixture, 5).await;
        let config = SessionConfig::default();
        let after_expiry = session.expires_at + Duration::seconds(1);
        SessionService::new(&fixture.repo, &config).sweep_expired(after_expiry).await.unwrap();
        let handler = ScanHandler::new(&fixture.repo, 10);

        let result = handler
            .handle_scan_at(&payload_for(&session, &session.current_token), &fixture.student_ids[0], after_expiry)
            .await;

        assert!(matches!(result, Err(AppError::SessionEnded)));
    }

    #[tokio::test]
    async fn duplicate_scan_at_storage_keeps_first_record() {
        let fixture = Fixture::new();
        let session = started(&fixture, 10).await;
        let student = fixture.student_ids[0];
        let scan = |status, scanned_at| NewScan {
            session_id: session.id,
            student_id: student,
            course_id: session.course_id,
            status,
            scanned_at,
        };

        let first = fixture.repo.record_scan(&scan(AttendanceStatus::Present, session.start_time)).await.unwrap();
        let second = fixture
            .repo
            .record_scan(&scan(AttendanceStatus::Late, session.start_time + Duration::minutes(12)))
            .await;

        assert!(matches!(second, Err(AppError::AlreadyRecorded)));
        let stored = fixture.repo.get_attendance(&session.id, &student).await.unwrap().unwrap();
        assert_eq!(stored.status, AttendanceStatus::Present);
        assert_eq!(stored.scanned_at, first.scanned_at);
        assert_eq!(stored.scanned_at, Some(session.start_time));
    }

    #[tokio::test]
    async fn non_uuid_session_id_is_not_found() {
        let fixture = Fixture::new();
        let handler = ScanHandler::new(&fixture.repo, 10);
        let raw = format!(r#"{{"sessionId":"not-a-session","courseId":"{}","token":"t"}}"#, Uuid::new_v4());

        let result = handler.handle_scan(&raw, &fixture.student_ids[0]).await;
        assert!(matches!(result, Err(AppError::SessionNotFound)));
    }

    #[tokio::test]
    async fn rotated_token_makes_previous_one_stale() {
        let fixture = Fixture::new();
        let session = started(&fixture, 10).await;
        let config = SessionConfig::default();
        let rotated = SessionService::new(&fixture.repo, &config)
            .rotate_token(&session.id, &fixture.professor_id)
            .await
            .unwrap();
        let handler = ScanHandler::new(&fixture.repo, 10);

        let stale = handler.handle_scan(&payload_for(&session, &session.current_token), &fixture.student_ids[0]).await;
        assert!(matches!(stale, Err(AppError::TokenExpired)));

        let fresh = handler.handle_scan(&payload_for(&session, &rotated.token), &fixture.student_ids[0]).await;
        assert!(fresh.is_ok());
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let fixture = Fixture::new();
        let handler = ScanHandler::new(&fixture.repo, 10);
        let payload = QrPayload::new(Uuid::new_v4(), Uuid::new_v4(), "token", 0).stringify();

        let result = handler.handle_scan(&payload, &fixture.student_ids[0]).await;
        assert!(matches!(result, Err(AppError::SessionNotFound)));
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let fixture = Fixture::new();
        let handler = ScanHandler::new(&fixture.repo, 10);

        for raw in ["not json", r#"{"courseId":"x","token":"t"}"#, r#"{"sessionId":"","courseId":"","token":""}"#] {
            let result = handler.handle_scan(raw, &fixture.student_ids[0]).await;
            assert!(matches!(result, Err(AppError::InvalidPayload)));
        }
    }

    #[tokio::test]
    async fn scan_upgrades_an_absent_record() {
        let fixture = Fixture::new();
        let session = started(&fixture, 10).await;
        let student = fixture.student_ids[0];
        fixture.repo.mark_absent(&session.id, &student, &session.course_id).await.unwrap();
        let handler = ScanHandler::new(&fixture.repo, 10);

        let record = handler
            .handle_scan_at(&payload_for(&session, &session.current_token), &student, session.start_time)
            .await
            .unwrap();

        assert_eq!(record.status, AttendanceStatus::Present);
        assert!(record.scanned_at.is_some());
    }
}
