//! End-to-end offline lifecycle: a request queued while unauthenticated
//! survives a client restart and drains after validation succeeds.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use carrot_core::{
    AuthStatus, CarrotSession, Response, SessionConfig, Transport, TransportError, WireReply,
    WireRequest,
};
use secrecy::SecretString;
use tempfile::TempDir;

/// Scripted transport double; an unscripted send fails like a dead network.
#[derive(Default)]
struct ScriptedTransport {
    replies: Mutex<VecDeque<u16>>,
    calls: Mutex<Vec<WireRequest>>,
}

impl ScriptedTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn script(&self, status: u16) {
        self.replies.lock().unwrap().push_back(status);
    }

    fn calls(&self) -> Vec<WireRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &WireRequest) -> Result<WireReply, TransportError> {
        self.calls.lock().unwrap().push(request.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(status) => Ok(WireReply {
                status,
                body: format!(r#"{{"code":{status}}}"#),
            }),
            None => Err(TransportError::Http {
                message: "network unreachable".to_string(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn session_at(path: &std::path::Path, transport: Arc<ScriptedTransport>) -> CarrotSession {
    let config = SessionConfig::new("app-1", SecretString::from("app-secret".to_string()))
        .with_cache_path(path);
    CarrotSession::with_transport(config, "player-1", transport)
}

#[test]
fn queued_request_survives_restart_and_replays_after_validation() {
    let dir = TempDir::new().expect("temp dir");
    let db_path = dir.path().join("carrot.db");

    // First run: offline, the achievement only reaches the cache.
    let first_run = ScriptedTransport::new();
    let original_request_id = {
        let session = session_at(&db_path, Arc::clone(&first_run));
        let response = session.post_achievement("chicken").expect("dispatch");
        assert_eq!(response, Response::UnknownError);

        let pending = session.pending_requests();
        assert_eq!(pending.len(), 1);
        pending[0].request_id.clone()
    };
    assert!(first_run.calls().is_empty());

    // Second run: same database, fresh session. The row is still there.
    let second_run = ScriptedTransport::new();
    let session = session_at(&db_path, Arc::clone(&second_run));
    let pending = session.pending_requests();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request_id, original_request_id);

    // Validation succeeds and the replay loop drains the queue before
    // `validate_user` returns.
    second_run.script(200);
    second_run.script(200);
    let status = session.validate_user("token").expect("validation");
    assert_eq!(status, AuthStatus::Ready);
    assert!(session.pending_requests().is_empty());

    // The replayed request kept its original id for server-side dedup.
    let calls = second_run.calls();
    assert_eq!(calls.len(), 2);
    let replayed = &calls[1];
    assert_eq!(replayed.path, "/me/achievements.json");
    let request_id = replayed
        .fields
        .iter()
        .find(|(name, _)| name == "request_id")
        .map(|(_, value)| value.as_str());
    assert_eq!(request_id, Some(original_request_id.as_str()));
}

#[test]
fn transient_failure_during_replay_keeps_the_request_for_next_time() {
    let dir = TempDir::new().expect("temp dir");
    let db_path = dir.path().join("carrot.db");

    let transport = ScriptedTransport::new();
    let session = session_at(&db_path, Arc::clone(&transport));

    session.post_high_score(1000).expect("dispatch");

    // Validation succeeds but the replayed request dies on the wire.
    transport.script(200);
    let status = session.validate_user("token").expect("validation");
    assert_eq!(status, AuthStatus::Ready);

    let pending = session.pending_requests();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].retry_count, 1);
}
