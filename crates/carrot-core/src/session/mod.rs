//! The long-lived client session: signed dispatcher, replay loop, and the
//! caller-facing domain operations.
//!
//! # Dispatch flow
//!
//! Every domain call persists its request to the [`RequestCache`] before any
//! network attempt. If the session is not [`AuthStatus::Ready`] the call
//! short-circuits with [`Response::UnknownError`] and the request waits in
//! the cache. Whenever the status transitions to `Ready`, whether through
//! [`validate_user`] or as a side effect of a successful send, the replay
//! loop drains the cache in ascending retry-count order.
//!
//! # Threading
//!
//! [`CarrotSession`] is cheaply cloneable and safe to share across threads.
//! The `_async` variants run the same dispatch path on a spawned thread and
//! deliver the result to a caller-supplied callback. Cache mutations and
//! status transitions are mutually exclusive; network I/O never happens while
//! a lock is held. The replay loop is not re-entrant: a trigger arriving
//! while a drain is in progress is a no-op.
//!
//! [`validate_user`]: CarrotSession::validate_user

// Mutex poisoning indicates a panic in another thread, which is unrecoverable.
#![allow(clippy::missing_panics_doc)]

use std::sync::{Arc, Mutex};
use std::thread;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};

use crate::auth::{AuthObservers, AuthStatus, Response, SubscriptionId, classify_status};
use crate::cache::{CachedRequest, RequestCache};
use crate::config::SessionConfig;
use crate::error::{CarrotError, require_field};
use crate::sign::{self, IMAGE_BYTES_KEY};
use crate::transport::{HttpTransport, Transport, TransportError, WireReply, WireRequest};


const ACHIEVEMENTS_ENDPOINT: &str = "/me/achievements.json";
const SCORES_ENDPOINT: &str = "/me/scores.json";
const ACTIONS_ENDPOINT: &str = "/me/actions.json";
const LIKE_ENDPOINT: &str = "/me/like.json";

/// The long-lived Carrot client.
///
/// Construct one explicitly and hand references to whatever UI layer wraps
/// it; there is no process-wide instance.
#[derive(Clone)]
pub struct CarrotSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    app_id: String,
    app_secret: SecretString,
    hostname: String,
    user_id: Mutex<String>,
    status: Mutex<AuthStatus>,
    observers: AuthObservers,
    cache: RequestCache,
    transport: Arc<dyn Transport>,
    /// Held for the duration of a cache drain; `try_lock` keeps the replay
    /// loop non-re-entrant.
    replay_gate: Mutex<()>,
}

impl CarrotSession {
    /// Creates a session with the production HTTP transport.
    ///
    /// The request cache opens at `config.cache_path` (in memory when unset)
    /// and degrades to a non-durable pass-through if the database cannot be
    /// opened.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(config: SessionConfig, user_id: impl Into<String>) -> Result<Self, CarrotError> {
        let transport = Arc::new(HttpTransport::new(&config.http)?);
        Ok(Self::with_transport(config, user_id, transport))
    }

    /// Creates a session with an injected transport.
    #[must_use]
    pub fn with_transport(
        config: SessionConfig,
        user_id: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let cache = RequestCache::open_or_disabled(config.cache_path.as_deref());
        Self {
            inner: Arc::new(SessionInner {
                app_id: config.app_id,
                app_secret: config.app_secret,
                hostname: config.hostname,
                user_id: Mutex::new(user_id.into()),
                status: Mutex::new(AuthStatus::Undetermined),
                observers: AuthObservers::default(),
                cache,
                transport,
                replay_gate: Mutex::new(()),
            }),
        }
    }

    /// Current authentication status.
    #[must_use]
    pub fn status(&self) -> AuthStatus {
        *self.inner.status.lock().unwrap()
    }

    /// Current user id.
    #[must_use]
    pub fn user_id(&self) -> String {
        self.inner.user_id.lock().unwrap().clone()
    }

    /// Replaces the external user identity and resets the status to
    /// [`AuthStatus::Undetermined`]. Queued requests stay queued and will be
    /// signed for the new identity when replayed.
    pub fn set_user_id(&self, user_id: impl Into<String>) {
        *self.inner.user_id.lock().unwrap() = user_id.into();
        self.set_status(AuthStatus::Undetermined);
    }

    /// Registers an auth-changed observer. The callback runs synchronously on
    /// the thread that triggered the transition.
    pub fn subscribe(
        &self,
        callback: impl Fn(AuthStatus) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.observers.subscribe(callback)
    }

    /// Removes an observer. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.observers.unsubscribe(id)
    }

    /// Requests still waiting for a final server verdict.
    #[must_use]
    pub fn pending_requests(&self) -> Vec<CachedRequest> {
        self.inner.cache.list_pending()
    }

    /// Validates the current user against the backend with a platform access
    /// token and commits the result through the state machine. A transition
    /// to [`AuthStatus::Ready`] drains the request cache before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or no user id is assigned.
    pub fn validate_user(&self, access_token: &str) -> Result<AuthStatus, CarrotError> {
        require_field("access_token", access_token)?;
        let user_id = self.require_user()?;

        let request = WireRequest {
            host: self.inner.hostname.clone(),
            path: format!("/games/{}/users.json", self.inner.app_id),
            fields: vec![
                ("access_token".to_string(), access_token.to_string()),
                ("api_key".to_string(), user_id),
            ],
            image_bytes: None,
        };

        let status = match self.inner.transport.send(&request) {
            Ok(reply) => match reply.status {
                200 | 201 => AuthStatus::Ready,
                401 => AuthStatus::ReadOnly,
                405 | 422 => AuthStatus::NotAuthorized,
                other => {
                    tracing::warn!(status_code = other, "unexpected status from user validation");
                    AuthStatus::Undetermined
                },
            },
            Err(err) => {
                tracing::warn!(error = %err, "user validation failed in transport");
                AuthStatus::Undetermined
            },
        };

        self.set_status(status);
        Ok(status)
    }

    /// Asynchronous [`validate_user`]: argument validation happens before
    /// this returns, the network round trip on a background thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or no user id is assigned.
    ///
    /// [`validate_user`]: Self::validate_user
    pub fn validate_user_async(
        &self,
        access_token: impl Into<String>,
        complete: impl FnOnce(AuthStatus) + Send + 'static,
    ) -> Result<(), CarrotError> {
        let access_token = access_token.into();
        require_field("access_token", &access_token)?;
        self.require_user()?;

        let session = self.clone();
        thread::spawn(move || {
            // The user id can be cleared between spawn and execution; the
            // callback still fires so the caller is never left waiting.
            let status = match session.validate_user(&access_token) {
                Ok(status) => status,
                Err(err) => {
                    tracing::warn!(error = %err, "background user validation failed");
                    AuthStatus::Undetermined
                },
            };
            complete(status);
        });
        Ok(())
    }

    /// Posts an achievement.
    ///
    /// # Errors
    ///
    /// Returns an error if `achievement_id` is empty or no user id is
    /// assigned.
    pub fn post_achievement(&self, achievement_id: &str) -> Result<Response, CarrotError> {
        require_field("achievement_id", achievement_id)?;
        self.require_user()?;
        Ok(self.dispatch(ACHIEVEMENTS_ENDPOINT, achievement_parameters(achievement_id)))
    }

    /// Asynchronous [`post_achievement`].
    ///
    /// # Errors
    ///
    /// Returns an error if `achievement_id` is empty or no user id is
    /// assigned.
    ///
    /// [`post_achievement`]: Self::post_achievement
    pub fn post_achievement_async(
        &self,
        achievement_id: impl Into<String>,
        complete: impl FnOnce(Response) + Send + 'static,
    ) -> Result<(), CarrotError> {
        let achievement_id = achievement_id.into();
        require_field("achievement_id", &achievement_id)?;
        self.require_user()?;
        self.spawn_dispatch(ACHIEVEMENTS_ENDPOINT, achievement_parameters(&achievement_id), complete);
        Ok(())
    }

    /// Posts a high score.
    ///
    /// # Errors
    ///
    /// Returns an error if no user id is assigned.
    pub fn post_high_score(&self, value: u32) -> Result<Response, CarrotError> {
        self.require_user()?;
        Ok(self.dispatch(SCORES_ENDPOINT, score_parameters(value)))
    }

    /// Asynchronous [`post_high_score`].
    ///
    /// # Errors
    ///
    /// Returns an error if no user id is assigned.
    ///
    /// [`post_high_score`]: Self::post_high_score
    pub fn post_high_score_async(
        &self,
        value: u32,
        complete: impl FnOnce(Response) + Send + 'static,
    ) -> Result<(), CarrotError> {
        self.require_user()?;
        self.spawn_dispatch(SCORES_ENDPOINT, score_parameters(value), complete);
        Ok(())
    }

    /// Posts an action against an existing object instance.
    ///
    /// # Errors
    ///
    /// Returns an error if `action_id` or `object_instance_id` is empty, or
    /// no user id is assigned.
    pub fn post_action(
        &self,
        action_id: &str,
        action_properties: Option<Map<String, Value>>,
        object_instance_id: &str,
    ) -> Result<Response, CarrotError> {
        require_field("action_id", action_id)?;
        require_field("object_instance_id", object_instance_id)?;
        self.require_user()?;
        Ok(self.dispatch(
            ACTIONS_ENDPOINT,
            instance_action_parameters(action_id, action_properties, object_instance_id),
        ))
    }

    /// Asynchronous [`post_action`].
    ///
    /// # Errors
    ///
    /// Returns an error if `action_id` or `object_instance_id` is empty, or
    /// no user id is assigned.
    ///
    /// [`post_action`]: Self::post_action
    pub fn post_action_async(
        &self,
        action_id: impl Into<String>,
        action_properties: Option<Map<String, Value>>,
        object_instance_id: impl Into<String>,
        complete: impl FnOnce(Response) + Send + 'static,
    ) -> Result<(), CarrotError> {
        let action_id = action_id.into();
        let object_instance_id = object_instance_id.into();
        require_field("action_id", &action_id)?;
        require_field("object_instance_id", &object_instance_id)?;
        self.require_user()?;
        self.spawn_dispatch(
            ACTIONS_ENDPOINT,
            instance_action_parameters(&action_id, action_properties, &object_instance_id),
            complete,
        );
        Ok(())
    }

    /// Posts an action that creates (or reuses) a dynamic object from a
    /// [`ViralObject`]. An image attached as raw bytes travels through the
    /// multipart side-channel; its SHA-256 joins the signed parameter set in
    /// its place.
    ///
    /// # Errors
    ///
    /// Returns an error if `action_id` is empty or no user id is assigned.
    pub fn post_action_with_object(
        &self,
        action_id: &str,
        action_properties: Option<Map<String, Value>>,
        object: ViralObject,
        object_instance_id: Option<&str>,
    ) -> Result<Response, CarrotError> {
        require_field("action_id", action_id)?;
        self.require_user()?;
        Ok(self.dispatch(
            ACTIONS_ENDPOINT,
            object_action_parameters(action_id, action_properties, object, object_instance_id),
        ))
    }

    /// Asynchronous [`post_action_with_object`].
    ///
    /// # Errors
    ///
    /// Returns an error if `action_id` is empty or no user id is assigned.
    ///
    /// [`post_action_with_object`]: Self::post_action_with_object
    pub fn post_action_with_object_async(
        &self,
        action_id: impl Into<String>,
        action_properties: Option<Map<String, Value>>,
        object: ViralObject,
        object_instance_id: Option<String>,
        complete: impl FnOnce(Response) + Send + 'static,
    ) -> Result<(), CarrotError> {
        let action_id = action_id.into();
        require_field("action_id", &action_id)?;
        self.require_user()?;
        self.spawn_dispatch(
            ACTIONS_ENDPOINT,
            object_action_parameters(
                &action_id,
                action_properties,
                object,
                object_instance_id.as_deref(),
            ),
            complete,
        );
        Ok(())
    }

    /// Likes the game's page.
    ///
    /// # Errors
    ///
    /// Returns an error if no user id is assigned.
    pub fn like_game(&self) -> Result<Response, CarrotError> {
        self.require_user()?;
        Ok(self.dispatch(LIKE_ENDPOINT, like_parameters("game")))
    }

    /// Asynchronous [`like_game`].
    ///
    /// # Errors
    ///
    /// Returns an error if no user id is assigned.
    ///
    /// [`like_game`]: Self::like_game
    pub fn like_game_async(
        &self,
        complete: impl FnOnce(Response) + Send + 'static,
    ) -> Result<(), CarrotError> {
        self.require_user()?;
        self.spawn_dispatch(LIKE_ENDPOINT, like_parameters("game"), complete);
        Ok(())
    }

    /// Likes the publisher's page.
    ///
    /// # Errors
    ///
    /// Returns an error if no user id is assigned.
    pub fn like_publisher(&self) -> Result<Response, CarrotError> {
        self.require_user()?;
        Ok(self.dispatch(LIKE_ENDPOINT, like_parameters("publisher")))
    }

    /// Asynchronous [`like_publisher`].
    ///
    /// # Errors
    ///
    /// Returns an error if no user id is assigned.
    ///
    /// [`like_publisher`]: Self::like_publisher
    pub fn like_publisher_async(
        &self,
        complete: impl FnOnce(Response) + Send + 'static,
    ) -> Result<(), CarrotError> {
        self.require_user()?;
        self.spawn_dispatch(LIKE_ENDPOINT, like_parameters("publisher"), complete);
        Ok(())
    }

    /// Likes an achievement.
    ///
    /// # Errors
    ///
    /// Returns an error if `achievement_id` is empty or no user id is
    /// assigned.
    pub fn like_achievement(&self, achievement_id: &str) -> Result<Response, CarrotError> {
        require_field("achievement_id", achievement_id)?;
        self.require_user()?;
        Ok(self.dispatch(
            LIKE_ENDPOINT,
            like_parameters(&format!("achievement:{achievement_id}")),
        ))
    }

    /// Asynchronous [`like_achievement`].
    ///
    /// # Errors
    ///
    /// Returns an error if `achievement_id` is empty or no user id is
    /// assigned.
    ///
    /// [`like_achievement`]: Self::like_achievement
    pub fn like_achievement_async(
        &self,
        achievement_id: impl Into<String>,
        complete: impl FnOnce(Response) + Send + 'static,
    ) -> Result<(), CarrotError> {
        let achievement_id = achievement_id.into();
        require_field("achievement_id", &achievement_id)?;
        self.require_user()?;
        self.spawn_dispatch(
            LIKE_ENDPOINT,
            like_parameters(&format!("achievement:{achievement_id}")),
            complete,
        );
        Ok(())
    }

    /// Likes a dynamic object instance.
    ///
    /// # Errors
    ///
    /// Returns an error if `object_instance_id` is empty or no user id is
    /// assigned.
    pub fn like_object(&self, object_instance_id: &str) -> Result<Response, CarrotError> {
        require_field("object_instance_id", object_instance_id)?;
        self.require_user()?;
        Ok(self.dispatch(
            LIKE_ENDPOINT,
            like_parameters(&format!("object:{object_instance_id}")),
        ))
    }

    /// Asynchronous [`like_object`].
    ///
    /// # Errors
    ///
    /// Returns an error if `object_instance_id` is empty or no user id is
    /// assigned.
    ///
    /// [`like_object`]: Self::like_object
    pub fn like_object_async(
        &self,
        object_instance_id: impl Into<String>,
        complete: impl FnOnce(Response) + Send + 'static,
    ) -> Result<(), CarrotError> {
        let object_instance_id = object_instance_id.into();
        require_field("object_instance_id", &object_instance_id)?;
        self.require_user()?;
        self.spawn_dispatch(
            LIKE_ENDPOINT,
            like_parameters(&format!("object:{object_instance_id}")),
            complete,
        );
        Ok(())
    }

    fn require_user(&self) -> Result<String, CarrotError> {
        let user_id = self.user_id();
        if user_id.trim().is_empty() {
            return Err(CarrotError::MissingUserId);
        }
        Ok(user_id)
    }

    /// Dispatches a new request: persist first, then send if the session is
    /// ready; otherwise leave it queued for replay.
    fn dispatch(&self, endpoint: &str, parameters: Map<String, Value>) -> Response {
        let record = self.inner.cache.enqueue(endpoint, parameters);
        let status = self.status();
        if status != AuthStatus::Ready {
            tracing::debug!(endpoint = %record.endpoint, status = ?status, "session not ready; request queued");
            return Response::UnknownError;
        }
        self.resolve(&record)
    }

    fn spawn_dispatch(
        &self,
        endpoint: &'static str,
        parameters: Map<String, Value>,
        complete: impl FnOnce(Response) + Send + 'static,
    ) {
        let session = self.clone();
        thread::spawn(move || complete(session.dispatch(endpoint, parameters)));
    }

    /// Signs and sends one cached request, commits the retention decision,
    /// and applies the status side effect.
    fn resolve(&self, record: &CachedRequest) -> Response {
        let (response, next_status) = match self.send_signed(record) {
            Ok(reply) => {
                let (response, next_status) = classify_status(reply.status);
                tracing::debug!(
                    endpoint = %record.endpoint,
                    status_code = reply.status,
                    response = ?response,
                    "signed request resolved"
                );
                (response, next_status)
            },
            Err(err) => {
                tracing::warn!(endpoint = %record.endpoint, error = %err, "signed request failed in transport");
                (Response::UnknownError, None)
            },
        };

        if let Some(cache_id) = record.cache_id {
            if response.is_final() {
                self.inner.cache.remove(cache_id);
            } else {
                self.inner.cache.increment_retry(cache_id);
            }
        }

        if let Some(next) = next_status {
            self.set_status(next);
        }
        response
    }

    fn send_signed(&self, record: &CachedRequest) -> Result<WireReply, TransportError> {
        let user_id = self.user_id();
        let mut parameters = record.parameters.clone();
        let image_bytes = sign::extract_image(&mut parameters);
        let merged = sign::merge_envelope(
            &user_id,
            &self.inner.app_id,
            record.request_date,
            &record.request_id,
            parameters,
        );
        let fields = sign::build_signed_fields(
            "POST",
            &self.inner.hostname,
            &record.endpoint,
            &merged,
            self.inner.app_secret.expose_secret(),
        )
        .map_err(|err| TransportError::Http {
            message: err.to_string(),
        })?;

        let request = WireRequest {
            host: self.inner.hostname.clone(),
            path: record.endpoint.clone(),
            fields,
            image_bytes,
        };
        self.inner.transport.send(&request)
    }

    /// Commits a status value. On change, observers are notified outside the
    /// status lock, then a transition to `Ready` drains the cache.
    fn set_status(&self, next: AuthStatus) {
        let changed = {
            let mut current = self.inner.status.lock().unwrap();
            if *current == next {
                false
            } else {
                tracing::debug!(old = ?*current, new = ?next, "auth status changed");
                *current = next;
                true
            }
        };

        if changed {
            self.inner.observers.notify(next);
            if next == AuthStatus::Ready {
                self.replay_pending();
            }
        }
    }

    /// Re-dispatches every cached request in ascending retry-count order.
    /// Each record is fully resolved before the next is considered. A second
    /// trigger while a drain is running is skipped.
    fn replay_pending(&self) {
        let Ok(_gate) = self.inner.replay_gate.try_lock() else {
            tracing::debug!("replay already in progress; skipping trigger");
            return;
        };

        let pending = self.inner.cache.list_pending();
        if pending.is_empty() {
            return;
        }
        tracing::info!(count = pending.len(), "draining request cache");

        for record in &pending {
            if self.status() != AuthStatus::Ready {
                tracing::debug!("session left ready state mid-drain; remaining requests stay queued");
                break;
            }
            let response = self.resolve(record);
            tracing::debug!(request = %record, response = ?response, "replayed cached request");
        }
    }
}

/// A dynamic object to be created by an action post.
///
/// Title, description, and exactly one image source are required up front;
/// the backend rejects objects without them, so the client fails fast
/// instead.
#[derive(Debug, Clone, PartialEq)]
pub struct ViralObject {
    object_type: String,
    title: String,
    description: String,
    image: ViralImage,
    extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
enum ViralImage {
    Url(String),
    Bytes(Vec<u8>),
}

impl ViralObject {
    /// Creates an object whose image is hosted at a remote URL.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the required fields is empty.
    pub fn with_image_url(
        object_type: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        image_url: impl Into<String>,
    ) -> Result<Self, CarrotError> {
        let image_url = image_url.into();
        require_field("image_url", &image_url)?;
        Self::build(object_type, title, description, ViralImage::Url(image_url))
    }

    /// Creates an object with raw image bytes to upload.
    ///
    /// # Errors
    ///
    /// Returns an error if any required field is empty or `bytes` is empty.
    pub fn with_image_bytes(
        object_type: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, CarrotError> {
        if bytes.is_empty() {
            return Err(CarrotError::InvalidArgument {
                field: "bytes".to_string(),
                reason: "image must not be empty".to_string(),
            });
        }
        Self::build(object_type, title, description, ViralImage::Bytes(bytes))
    }

    fn build(
        object_type: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        image: ViralImage,
    ) -> Result<Self, CarrotError> {
        let object_type = object_type.into();
        let title = title.into();
        let description = description.into();
        require_field("object_type", &object_type)?;
        require_field("title", &title)?;
        require_field("description", &description)?;
        Ok(Self {
            object_type,
            title,
            description,
            image,
            extra: Map::new(),
        })
    }

    /// Attaches an additional object property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Splits into the signed `object_properties` map and, for byte images,
    /// the raw bytes for the multipart side-channel.
    fn into_parts(self) -> (Map<String, Value>, Option<Vec<u8>>) {
        let mut properties = self.extra;
        properties.insert("object_type".to_string(), json!(self.object_type));
        properties.insert("title".to_string(), json!(self.title));
        properties.insert("description".to_string(), json!(self.description));
        match self.image {
            ViralImage::Url(url) => {
                properties.insert("image_url".to_string(), json!(url));
                (properties, None)
            },
            ViralImage::Bytes(bytes) => (properties, Some(bytes)),
        }
    }
}

fn achievement_parameters(achievement_id: &str) -> Map<String, Value> {
    let mut parameters = Map::new();
    parameters.insert("achievement_id".to_string(), json!(achievement_id));
    parameters
}

fn score_parameters(value: u32) -> Map<String, Value> {
    let mut parameters = Map::new();
    parameters.insert("value".to_string(), json!(value));
    parameters
}

fn like_parameters(target: &str) -> Map<String, Value> {
    let mut parameters = Map::new();
    parameters.insert("object".to_string(), json!(target));
    parameters
}

fn instance_action_parameters(
    action_id: &str,
    action_properties: Option<Map<String, Value>>,
    object_instance_id: &str,
) -> Map<String, Value> {
    let mut parameters = Map::new();
    parameters.insert("action_id".to_string(), json!(action_id));
    parameters.insert(
        "action_properties".to_string(),
        Value::Object(action_properties.unwrap_or_default()),
    );
    parameters.insert("object_properties".to_string(), Value::Object(Map::new()));
    parameters.insert("object_instance_id".to_string(), json!(object_instance_id));
    parameters
}

fn object_action_parameters(
    action_id: &str,
    action_properties: Option<Map<String, Value>>,
    object: ViralObject,
    object_instance_id: Option<&str>,
) -> Map<String, Value> {
    let (mut object_properties, image_bytes) = object.into_parts();
    if let Some(instance_id) = object_instance_id {
        if !instance_id.trim().is_empty() {
            object_properties.insert("object_instance_id".to_string(), json!(instance_id));
        }
    }

    let mut parameters = Map::new();
    parameters.insert("action_id".to_string(), json!(action_id));
    parameters.insert(
        "action_properties".to_string(),
        Value::Object(action_properties.unwrap_or_default()),
    );
    parameters.insert("object_properties".to_string(), Value::Object(object_properties));
    if let Some(bytes) = image_bytes {
        // Base64 inside the persisted payload so a replay after restart can
        // resubmit the identical upload.
        parameters.insert(IMAGE_BYTES_KEY.to_string(), json!(BASE64.encode(bytes)));
    }
    parameters
}
