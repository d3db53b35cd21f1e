use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use voice_interview::bootstrap::{
    Analysis, BackendError, CreatedSession, HttpBackend, InterviewBackend, InterviewConfig,
    SessionBootstrapper,
};

fn config(role: &str) -> InterviewConfig {
    InterviewConfig {
        job_role: role.to_string(),
        experience_level: "Senior".to_string(),
        company: Some("Acme".to_string()),
        job_description: None,
        interview_type: "behavioral".to_string(),
        interview_role: None,
        difficulty: None,
        user_id: "user-1".to_string(),
        num_questions: Some(5),
        duration_minutes: None,
    }
}

/// Backend that counts creations and can be told to fail the next ones
struct CountingBackend {
    creates: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Duration,
}

impl CountingBackend {
    fn new(delay: Duration) -> Self {
        Self {
            creates: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            delay,
        }
    }

    fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl InterviewBackend for CountingBackend {
    async fn create_session(&self, _config: &InterviewConfig) -> Result<CreatedSession, BackendError> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;

        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            return Err(BackendError::Failed {
                status: Some(503),
                message: "backend unavailable".to_string(),
            });
        }

        Ok(CreatedSession {
            session_id: format!("session-{}", n),
            total_questions: 5,
            created_at: None,
        })
    }

    async fn fetch_analysis(&self, _session_id: &str) -> Result<Analysis, BackendError> {
        Err(BackendError::Failed {
            status: None,
            message: "not used".to_string(),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_identical_requests_create_once() {
    let backend = Arc::new(CountingBackend::new(Duration::from_millis(200)));
    let bootstrapper = Arc::new(SessionBootstrapper::new(backend.clone()));

    let mut calls = Vec::new();
    for _ in 0..4 {
        let bootstrapper = bootstrapper.clone();
        calls.push(tokio::spawn(async move {
            bootstrapper.create_session(&config("Backend Engineer")).await
        }));
    }

    for call in calls {
        let created = call.await.unwrap().unwrap();
        assert_eq!(created.session_id, "session-1");
    }
    assert_eq!(backend.creates(), 1);

    // Finished creations are reused too
    let again = bootstrapper.create_session(&config("Backend Engineer")).await.unwrap();
    assert_eq!(again.session_id, "session-1");
    assert_eq!(backend.creates(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_creation_is_not_cached() {
    let backend = Arc::new(CountingBackend::new(Duration::from_millis(50)));
    backend.failures_left.store(1, Ordering::SeqCst);
    let bootstrapper = SessionBootstrapper::new(backend.clone());

    let err = bootstrapper
        .create_session(&config("Backend Engineer"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert!(!bootstrapper.is_held(&config("Backend Engineer")).await);

    let created = bootstrapper.create_session(&config("Backend Engineer")).await.unwrap();
    assert_eq!(created.session_id, "session-2");
    assert_eq!(backend.creates(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_release_allows_a_new_session() {
    let backend = Arc::new(CountingBackend::new(Duration::from_millis(10)));
    let bootstrapper = SessionBootstrapper::new(backend.clone());
    let cfg = config("Backend Engineer");

    bootstrapper.create_session(&cfg).await.unwrap();
    assert!(bootstrapper.is_held(&cfg).await);

    assert!(bootstrapper.release(&cfg).await);
    assert!(!bootstrapper.release(&cfg).await);

    let created = bootstrapper.create_session(&cfg).await.unwrap();
    assert_eq!(created.session_id, "session-2");
    assert_eq!(backend.creates(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_different_configs_create_separately() {
    let backend = Arc::new(CountingBackend::new(Duration::from_millis(10)));
    let bootstrapper = SessionBootstrapper::new(backend.clone());

    let a = bootstrapper.create_session(&config("Backend Engineer")).await.unwrap();
    let b = bootstrapper.create_session(&config("Product Manager")).await.unwrap();

    assert_ne!(a.session_id, b.session_id);
    assert_eq!(backend.creates(), 2);
}

#[test]
fn test_fingerprint_covers_every_field() {
    let base = config("Backend Engineer");
    assert_eq!(base.fingerprint(), config("Backend Engineer").fingerprint());

    let mut changed = base.clone();
    changed.num_questions = Some(6);
    assert_ne!(base.fingerprint(), changed.fingerprint());

    let mut changed = base.clone();
    changed.company = None;
    assert_ne!(base.fingerprint(), changed.fingerprint());
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_http_backend_creates_session() {
    let app = Router::new()
        .route(
            "/api/v1/voice-interview/create",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["job_role"], "Backend Engineer");
                Json(json!({
                    "success": true,
                    "data": {"session_id": "abc123", "total_questions": 5}
                }))
            }),
        )
        .route(
            "/api/v1/voice-interview/:id/analysis",
            get(|| async {
                Json(json!({
                    "success": true,
                    "data": {
                        "session_id": "abc123",
                        "overall_score": 7.5,
                        "total_questions": 5,
                        "answered_questions": 5,
                        "communication_score": 8.0,
                        "content_score": 7.0,
                        "engagement_score": 7.5
                    }
                }))
            }),
        );
    let base_url = serve(app).await;

    let backend = HttpBackend::new(&base_url, Some("token".into()), Duration::from_secs(5)).unwrap();
    let created = backend.create_session(&config("Backend Engineer")).await.unwrap();
    assert_eq!(created.session_id, "abc123");
    assert_eq!(created.total_questions, 5);

    let analysis = backend.fetch_analysis("abc123").await.unwrap();
    assert_eq!(analysis.answered_questions, 5);
    assert!(analysis.strengths_summary.is_empty());
}

#[tokio::test]
async fn test_http_backend_classifies_failures() {
    let app = Router::new().route(
        "/api/v1/voice-interview/create",
        post(|Json(body): Json<serde_json::Value>| async move {
            match body["job_role"].as_str() {
                Some("broke") => (StatusCode::PAYMENT_REQUIRED, Json(json!({}))),
                Some("anon") => (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "Token expired"})),
                ),
                _ => (
                    StatusCode::OK,
                    Json(json!({"success": false, "error": "Role not supported"})),
                ),
            }
        }),
    );
    let base_url = serve(app).await;
    let backend = HttpBackend::new(&base_url, None, Duration::from_secs(5)).unwrap();

    let err = backend.create_session(&config("broke")).await.unwrap_err();
    assert!(matches!(err, BackendError::InsufficientCredits { .. }));
    assert!(err.message().contains("purchase more tokens"));

    let err = backend.create_session(&config("anon")).await.unwrap_err();
    assert_eq!(
        err,
        BackendError::Unauthenticated {
            message: "Token expired".to_string()
        }
    );

    let err = backend.create_session(&config("astronaut")).await.unwrap_err();
    assert_eq!(err.message(), "Role not supported");
    assert_eq!(err.status(), None);
}
