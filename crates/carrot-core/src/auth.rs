//! Authentication state and request outcomes.
//!
//! The session tracks a single [`AuthStatus`] value. Transitions come from
//! two sources: an explicit [`validate_user`] call, and the status code of
//! any dispatched signed request (a write that comes back 401 downgrades the
//! session to [`AuthStatus::ReadOnly`] even though the caller only asked to
//! post a score). Every value change is delivered synchronously to the
//! observers registered on the session.
//!
//! [`validate_user`]: crate::session::CarrotSession::validate_user

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Authentication status of the current user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    /// The user has not authorized the app, or has deauthorized it.
    NotAuthorized,

    /// Initial state, or the user identity just changed.
    Undetermined,

    /// Authenticated, but the write permission was withheld.
    ReadOnly,

    /// Fully authorized; writes are permitted.
    Ready,
}

impl std::fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NotAuthorized => "user has not authorized the application",
            Self::Undetermined => "user status is undetermined",
            Self::ReadOnly => "user has not allowed the publish permission",
            Self::Ready => "user is authorized",
        };
        f.write_str(text)
    }
}

/// Outcome of a dispatched signed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// The server accepted the request.
    Ok,

    /// Write permission withheld; the request stays queued.
    ReadOnly,

    /// Service tier exceeded; not posted, stays queued.
    UserLimitHit,

    /// The app secret was rejected.
    BadAppSecret,

    /// Resource not found. Final: retrying verbatim cannot succeed.
    NotFound,

    /// The user is not authorized for the app.
    NotAuthorized,

    /// The server rejected the request parameters. Final.
    ParameterError,

    /// Transport failure or an unmapped status code.
    UnknownError,
}

impl Response {
    /// Whether the server rendered a final verdict. Final responses remove
    /// the cached request; everything else keeps it queued for replay.
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Ok | Self::NotFound | Self::ParameterError)
    }
}

/// Maps an HTTP status code from a signed request to its [`Response`] and the
/// resulting [`AuthStatus`], if the code determines one.
///
/// Unmapped codes (including 5xx) yield `UnknownError` and leave the status
/// unchanged.
pub(crate) fn classify_status(code: u16) -> (Response, Option<AuthStatus>) {
    match code {
        200 | 201 => (Response::Ok, Some(AuthStatus::Ready)),
        401 => (Response::ReadOnly, Some(AuthStatus::ReadOnly)),
        402 => (Response::UserLimitHit, Some(AuthStatus::Ready)),
        403 => (Response::BadAppSecret, Some(AuthStatus::Ready)),
        404 => (Response::NotFound, Some(AuthStatus::Ready)),
        405 => (Response::NotAuthorized, Some(AuthStatus::NotAuthorized)),
        424 => (Response::ParameterError, Some(AuthStatus::Ready)),
        _ => (Response::UnknownError, None),
    }
}

/// Handle for a registered auth-changed observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type AuthCallback = Arc<dyn Fn(AuthStatus) + Send + Sync>;

/// Session-scoped observer registry.
///
/// Callbacks run synchronously on the thread that triggered the transition,
/// against a snapshot taken at notification time. A callback may subscribe
/// or unsubscribe; the change takes effect from the next notification.
#[derive(Default)]
pub(crate) struct AuthObservers {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, AuthCallback)>>,
}

impl AuthObservers {
    pub(crate) fn subscribe(
        &self,
        callback: impl Fn(AuthStatus) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap()
            .push((id, Arc::new(callback)));
        SubscriptionId(id)
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id.0);
        subscribers.len() != before
    }

    pub(crate) fn notify(&self, status: AuthStatus) {
        // Snapshot under the lock, run outside it, so a callback can touch
        // the registry without deadlocking.
        let snapshot: Vec<AuthCallback> = self
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in snapshot {
            callback(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn status_table_matches_the_wire_contract() {
        assert_eq!(
            classify_status(200),
            (Response::Ok, Some(AuthStatus::Ready))
        );
        assert_eq!(
            classify_status(201),
            (Response::Ok, Some(AuthStatus::Ready))
        );
        assert_eq!(
            classify_status(401),
            (Response::ReadOnly, Some(AuthStatus::ReadOnly))
        );
        assert_eq!(
            classify_status(402),
            (Response::UserLimitHit, Some(AuthStatus::Ready))
        );
        assert_eq!(
            classify_status(403),
            (Response::BadAppSecret, Some(AuthStatus::Ready))
        );
        assert_eq!(
            classify_status(404),
            (Response::NotFound, Some(AuthStatus::Ready))
        );
        assert_eq!(
            classify_status(405),
            (Response::NotAuthorized, Some(AuthStatus::NotAuthorized))
        );
        assert_eq!(
            classify_status(424),
            (Response::ParameterError, Some(AuthStatus::Ready))
        );
        assert_eq!(classify_status(500), (Response::UnknownError, None));
        assert_eq!(classify_status(302), (Response::UnknownError, None));
    }

    #[test]
    fn final_verdicts_are_exactly_ok_notfound_parametererror() {
        assert!(Response::Ok.is_final());
        assert!(Response::NotFound.is_final());
        assert!(Response::ParameterError.is_final());
        assert!(!Response::ReadOnly.is_final());
        assert!(!Response::UserLimitHit.is_final());
        assert!(!Response::BadAppSecret.is_final());
        assert!(!Response::NotAuthorized.is_final());
        assert!(!Response::UnknownError.is_final());
    }

    #[test]
    fn observers_receive_notifications_until_unsubscribed() {
        let observers = AuthObservers::default();
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_clone = Arc::clone(&seen);
        let id = observers.subscribe(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        observers.notify(AuthStatus::Ready);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        assert!(observers.unsubscribe(id));
        observers.notify(AuthStatus::ReadOnly);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // Idempotent: removing again is a no-op.
        assert!(!observers.unsubscribe(id));
    }

    #[test]
    fn callbacks_may_unsubscribe_from_inside_a_notification() {
        let observers = Arc::new(AuthObservers::default());
        let seen = Arc::new(AtomicUsize::new(0));
        let own_id = Arc::new(Mutex::new(None));

        let observers_clone = Arc::clone(&observers);
        let seen_clone = Arc::clone(&seen);
        let own_id_clone = Arc::clone(&own_id);
        let id = observers.subscribe(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = own_id_clone.lock().unwrap().take() {
                observers_clone.unsubscribe(id);
            }
        });
        *own_id.lock().unwrap() = Some(id);

        // One-shot: the callback removes itself while being delivered to.
        observers.notify(AuthStatus::Ready);
        observers.notify(AuthStatus::ReadOnly);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscription_ids_are_distinct() {
        let observers = AuthObservers::default();
        let a = observers.subscribe(|_| {});
        let b = observers.subscribe(|_| {});
        assert_ne!(a, b);
    }
}
