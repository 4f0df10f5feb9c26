//! Conference sessions
//!
//! Ad hoc group conversations between the user and agents. Posting a message
//! that mentions known agents asks each of them for a reply; replies and
//! failure notices are appended to the session history. Agents that want to
//! speak in order take the floor through a FIFO turn queue. Sessions expire
//! after a fixed lifetime and are swept when idle.

pub mod mentions;

pub use mentions::extract_mentions;

use crate::config::{ConferenceConfig, RemoteConfig};
use crate::error::{CoordinatorError, Result};
use crate::messaging::MessagingRouter;
use crate::remote::{with_fallback, Route, SessionStore};
use crate::types::{Message, Provenance, Role, SYSTEM_SENDER};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Id used for the human participant
pub const USER_ID: &str = "user";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub role: Role,
}

impl Participant {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let role = match id.as_str() {
            USER_ID => Role::User,
            SYSTEM_SENDER => Role::System,
            _ => Role::Agent,
        };
        Self { id, role }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Closed,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConferenceSession {
    pub id: String,
    pub name: String,
    pub participants: Vec<Participant>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    /// Time of the latest posted message
    #[serde(default = "Utc::now")]
    pub last_activity: DateTime<Utc>,
    /// None for sessions that never expire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Participant currently holding the floor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_turn: Option<String>,
    /// Participants waiting for the floor, oldest request first
    #[serde(default, skip_serializing_if = "VecDeque::is_empty")]
    pub turn_queue: VecDeque<String>,
}

impl ConferenceSession {
    fn new(id: impl Into<String>, name: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            participants: Vec::new(),
            messages: Vec::new(),
            status: SessionStatus::Active,
            created_at: now,
            last_activity: now,
            expires_at,
            current_turn: None,
            turn_queue: VecDeque::new(),
        }
    }

    pub fn has_participant(&self, id: &str) -> bool {
        self.participants.iter().any(|p| p.id == id)
    }

    /// Add a participant; false if already listed
    pub fn add_participant(&mut self, id: &str) -> bool {
        if self.has_participant(id) {
            return false;
        }
        self.participants.push(Participant::new(id));
        true
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Expired || self.expires_at.is_some_and(|at| now >= at)
    }

    fn is_idle(&self, now: DateTime<Utc>, idle_timeout: chrono::Duration) -> bool {
        now - self.last_activity >= idle_timeout
    }

    /// Whether this copy holds later messages than `other`
    fn is_newer_than(&self, other: &ConferenceSession) -> bool {
        let latest = |s: &ConferenceSession| (s.messages.last().map(|m| m.timestamp), s.messages.len());
        latest(self) > latest(other)
    }

    /// Append, trimming the oldest messages beyond `max_history`
    fn push_message(&mut self, message: Message, max_history: usize) {
        self.last_activity = self.last_activity.max(message.timestamp);
        self.messages.push(message);
        if self.messages.len() > max_history {
            let excess = self.messages.len() - max_history;
            self.messages.drain(..excess);
        }
    }
}

/// Result of posting a message
#[derive(Debug, Clone, PartialEq)]
pub struct PostOutcome {
    pub message: Message,
    /// Mention replies and failure notices, in mention order
    pub follow_ups: Vec<Message>,
    /// Agents that were mentioned
    pub mentioned: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConferenceStats {
    pub sessions: usize,
    pub messages: usize,
    pub participants: usize,
}

#[derive(Debug, Clone)]
pub struct ConferenceSettings {
    pub max_history: usize,
    /// Bound on session store calls
    pub store_timeout: Duration,
    /// Lifetime of a new session
    pub expiry: chrono::Duration,
    /// Silence after which a session is swept
    pub idle_timeout: chrono::Duration,
}

impl ConferenceSettings {
    pub fn from_config(conference: &ConferenceConfig, remote: &RemoteConfig) -> Self {
        Self {
            max_history: conference.max_history.max(1),
            store_timeout: remote.timeout(),
            expiry: chrono::Duration::hours(i64::from(conference.expiry_hours)),
            idle_timeout: chrono::Duration::minutes(i64::from(conference.idle_timeout_minutes)),
        }
    }
}

impl Default for ConferenceSettings {
    fn default() -> Self {
        Self::from_config(&ConferenceConfig::default(), &RemoteConfig::default())
    }
}

pub struct ConferenceManager {
    router: Arc<MessagingRouter>,
    store: Option<Arc<dyn SessionStore>>,
    sessions: RwLock<HashMap<String, ConferenceSession>>,
    /// Session currently in view
    active: RwLock<Option<String>>,
    settings: ConferenceSettings,
}

impl ConferenceManager {
    pub fn new(router: Arc<MessagingRouter>, store: Option<Arc<dyn SessionStore>>, settings: ConferenceSettings) -> Self {
        Self {
            router,
            store,
            sessions: RwLock::new(HashMap::new()),
            active: RwLock::new(None),
            settings,
        }
    }

    /// Create a session, make it the active one and save it
    pub async fn create(&self, name: &str, participant_ids: &[&str]) -> Result<ConferenceSession> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoordinatorError::Validation("session name must not be empty".into()));
        }
        let ids: Vec<&str> = participant_ids.iter().map(|p| p.trim()).filter(|p| !p.is_empty()).collect();
        if ids.is_empty() {
            return Err(CoordinatorError::Validation("a session needs at least one participant".into()));
        }

        self.cleanup_expired_sessions().await;

        let mut session = self.open_session(Uuid::new_v4().to_string(), name);
        for id in ids {
            session.add_participant(id);
        }
        let roster: Vec<&str> = session.participants.iter().map(|p| p.id.as_str()).collect();
        let welcome = Message::system(format!("Welcome to {}. Participants: {}", name, roster.join(", ")));
        session.push_message(welcome, self.settings.max_history);

        self.sessions.write().await.insert(session.id.clone(), session.clone());
        *self.active.write().await = Some(session.id.clone());
        info!("Created conference session '{}' ({})", session.name, session.id);

        self.persist(&session.id).await;
        Ok(session)
    }

    /// Attach a session, preferring the store's copy.
    ///
    /// A local copy with later messages than the store's wins and is written
    /// back, as is a local copy the store has never seen. If the store is
    /// unreachable the local copy is used, or an empty session when there is
    /// none. Expired sessions cannot be joined.
    pub async fn join(&self, session_id: &str) -> Result<ConferenceSession> {
        let local = self.sessions.read().await.get(session_id).cloned();

        let (session, write_back) = match &self.store {
            Some(store) => {
                let route =
                    with_fallback(self.settings.store_timeout, store.load(session_id), |_| async { Ok(None) }).await?;
                match route {
                    Route::Remote(Some(remote)) => match local {
                        Some(local) if local.is_newer_than(&remote) => {
                            warn!(
                                "Stored copy of session {} is behind ({} vs {} messages), keeping the local one",
                                session_id,
                                remote.messages.len(),
                                local.messages.len()
                            );
                            (local, true)
                        }
                        _ => (remote, false),
                    },
                    Route::Remote(None) => {
                        let local = local.ok_or_else(|| CoordinatorError::not_found("session", session_id))?;
                        (local, true)
                    }
                    Route::Fallback { reason, .. } => {
                        warn!("Session store unavailable ({}), joining {} from memory", reason, session_id);
                        (local.unwrap_or_else(|| self.open_session(session_id, session_id)), false)
                    }
                }
            }
            None => (local.ok_or_else(|| CoordinatorError::not_found("session", session_id))?, false),
        };

        if session.is_expired(Utc::now()) {
            return Err(CoordinatorError::Validation(format!("session {} has expired", session_id)));
        }

        self.sessions.write().await.insert(session.id.clone(), session.clone());
        *self.active.write().await = Some(session.id.clone());
        debug!("Joined session {}", session.id);

        if write_back {
            self.persist(&session.id).await;
        }
        Ok(session)
    }

    /// Drop a session from the active set, clearing the view if it was shown
    pub async fn leave(&self, session_id: &str) -> Result<()> {
        self.sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| CoordinatorError::not_found("session", session_id))?;

        let mut active = self.active.write().await;
        if active.as_deref() == Some(session_id) {
            *active = None;
        }
        debug!("Left session {}", session_id);
        Ok(())
    }

    /// Append a message, then collect replies from every mentioned agent
    pub async fn post_message(&self, session_id: &str, content: &str, sender_id: &str) -> Result<PostOutcome> {
        if content.trim().is_empty() {
            return Err(CoordinatorError::Validation("message content must not be empty".into()));
        }

        let message = Message::new(sender_id, content);
        self.with_session(session_id, |session| {
            session.push_message(message.clone(), self.settings.max_history);
        })
        .await?;

        let known = self.router.registry().ids().await;
        let mentioned = extract_mentions(content, &known, sender_id);

        let requests = mentioned.iter().map(|agent_id| async move {
            let reply = self.router.send_message(agent_id, content, sender_id).await;
            (agent_id.clone(), reply)
        });
        let replies = futures::future::join_all(requests).await;

        let follow_ups: Vec<Message> = replies
            .into_iter()
            .map(|(agent_id, reply)| match reply {
                Ok(delivery) => Message::new(agent_id, delivery.response).with_provenance(Provenance::MentionReply),
                Err(e) => Message::system(format!("{} could not respond: {}", agent_id, failure_reason(&e)))
                    .with_provenance(Provenance::MentionError),
            })
            .collect();

        if !mentioned.is_empty() {
            let stored = self
                .with_session(session_id, |session| {
                    for agent_id in &mentioned {
                        session.add_participant(agent_id);
                    }
                    for follow_up in &follow_ups {
                        session.push_message(follow_up.clone(), self.settings.max_history);
                    }
                })
                .await;
            if stored.is_err() {
                warn!("Session {} was closed before mention replies arrived", session_id);
            }
        }

        self.persist(session_id).await;
        Ok(PostOutcome { message, follow_ups, mentioned })
    }

    /// Ask for the floor.
    ///
    /// Granted at once when nobody holds it or the participant already does;
    /// otherwise the participant is queued (once) and `false` is returned.
    pub async fn request_turn(&self, session_id: &str, participant_id: &str) -> Result<bool> {
        let granted = self
            .with_session(session_id, |session| {
                if !session.has_participant(participant_id) {
                    return Err(CoordinatorError::Validation(format!(
                        "{} is not a participant of session {}",
                        participant_id, session.id
                    )));
                }
                match session.current_turn.as_deref() {
                    None => {
                        session.current_turn = Some(participant_id.to_string());
                        Ok(true)
                    }
                    Some(holder) if holder == participant_id => Ok(true),
                    Some(_) => {
                        if !session.turn_queue.iter().any(|queued| queued == participant_id) {
                            session.turn_queue.push_back(participant_id.to_string());
                        }
                        Ok(false)
                    }
                }
            })
            .await??;

        if granted {
            debug!("Turn granted to {} in session {}", participant_id, session_id);
        } else {
            debug!("{} queued for the floor in session {}", participant_id, session_id);
        }
        Ok(granted)
    }

    /// Give up the floor and hand it to the next queued participant, if any
    pub async fn release_turn(&self, session_id: &str, participant_id: &str) -> Result<Option<String>> {
        let next = self
            .with_session(session_id, |session| {
                if session.current_turn.as_deref() != Some(participant_id) {
                    return Err(CoordinatorError::Validation(format!(
                        "{} does not hold the floor in session {}",
                        participant_id, session.id
                    )));
                }
                session.current_turn = session.turn_queue.pop_front();
                Ok(session.current_turn.clone())
            })
            .await??;

        match &next {
            Some(next) => debug!("Turn passed from {} to {} in session {}", participant_id, next, session_id),
            None => debug!("Turn released by {} in session {}", participant_id, session_id),
        }
        Ok(next)
    }

    /// Participant holding the floor
    pub async fn current_turn(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self.session(session_id).await?.current_turn)
    }

    /// Push a session's expiry `hours` past now
    pub async fn extend_session(&self, session_id: &str, hours: u32) -> Result<ConferenceSession> {
        let expires_at = Utc::now().checked_add_signed(chrono::Duration::hours(i64::from(hours)));
        let session = self
            .with_session(session_id, |session| {
                session.expires_at = expires_at;
                session.clone()
            })
            .await?;
        info!("Extended session {} by {} hours", session_id, hours);
        self.persist(session_id).await;
        Ok(session)
    }

    /// Drop sessions that are past their expiry or idle beyond the idle
    /// timeout. Returns how many were removed.
    pub async fn cleanup_expired_sessions(&self) -> usize {
        let now = Utc::now();
        let removed: Vec<String> = {
            let mut sessions = self.sessions.write().await;
            let stale: Vec<String> = sessions
                .values()
                .filter(|s| s.is_expired(now) || s.is_idle(now, self.settings.idle_timeout))
                .map(|s| s.id.clone())
                .collect();
            for id in &stale {
                sessions.remove(id);
            }
            stale
        };
        if removed.is_empty() {
            return 0;
        }

        let mut active = self.active.write().await;
        if active.as_ref().is_some_and(|id| removed.contains(id)) {
            *active = None;
        }
        info!("Cleaned up {} expired conference sessions", removed.len());
        removed.len()
    }

    pub async fn session(&self, session_id: &str) -> Result<ConferenceSession> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::not_found("session", session_id))
    }

    pub async fn active_session(&self) -> Option<ConferenceSession> {
        let active = self.active.read().await.clone()?;
        self.sessions.read().await.get(&active).cloned()
    }

    /// Sessions, oldest first
    pub async fn list_sessions(&self) -> Vec<ConferenceSession> {
        let mut sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// Most recent `limit` messages, oldest first
    pub async fn history(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<Message>> {
        let session = self.session(session_id).await?;
        let skip = limit.map_or(0, |limit| session.messages.len().saturating_sub(limit));
        Ok(session.messages.into_iter().skip(skip).collect())
    }

    pub async fn stats(&self) -> ConferenceStats {
        let sessions = self.sessions.read().await;
        ConferenceStats {
            sessions: sessions.len(),
            messages: sessions.values().map(|s| s.messages.len()).sum(),
            participants: sessions.values().map(|s| s.participants.len()).sum(),
        }
    }

    fn open_session(&self, id: impl Into<String>, name: impl Into<String>) -> ConferenceSession {
        ConferenceSession::new(id, name, Utc::now().checked_add_signed(self.settings.expiry))
    }

    async fn with_session<F, R>(&self, session_id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut ConferenceSession) -> R,
    {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CoordinatorError::not_found("session", session_id))?;
        Ok(f(session))
    }

    /// Best-effort save to the session store
    async fn persist(&self, session_id: &str) {
        let Some(store) = &self.store else {
            return;
        };
        let Ok(snapshot) = self.session(session_id).await else {
            return;
        };
        match tokio::time::timeout(self.settings.store_timeout, store.save(&snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Could not save session {}: {}", session_id, e),
            Err(_) => warn!("Saving session {} timed out", session_id),
        }
    }
}

fn failure_reason(error: &CoordinatorError) -> String {
    match error {
        CoordinatorError::Delivery { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{Handlers, LocalPersonaHandler};
    use crate::registry::{AgentRecord, AgentRegistry, Allowlists};
    use crate::remote::{MockAgentTransport, MockSessionStore};
    use std::collections::{BTreeMap, BTreeSet};

    async fn router(transport: MockAgentTransport) -> Arc<MessagingRouter> {
        let mut external = BTreeMap::new();
        external.insert("kimi-k2".to_string(), "http://ext/kimi".to_string());
        let allowlists = Allowlists::new(external, BTreeSet::from(["alden".to_string()]), BTreeMap::new());
        let registry = Arc::new(AgentRegistry::new(allowlists));
        registry
            .merge(&[AgentRecord::new("alden", "Alden"), AgentRecord::new("kimi-k2", "Kimi K2")])
            .await;
        let handlers = Arc::new(Handlers::new(LocalPersonaHandler::new(Duration::ZERO), Arc::new(transport)));
        Arc::new(MessagingRouter::new(registry, handlers))
    }

    fn settings() -> ConferenceSettings {
        ConferenceSettings {
            max_history: 1000,
            store_timeout: Duration::from_millis(200),
            ..ConferenceSettings::default()
        }
    }

    async fn manager(store: Option<Arc<dyn SessionStore>>) -> ConferenceManager {
        ConferenceManager::new(router(MockAgentTransport::new()).await, store, settings())
    }

    #[tokio::test]
    async fn test_create_seeds_welcome() {
        let manager = manager(None).await;
        let session = manager.create("Standup", &["user", "alden"]).await.unwrap();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].provenance, Some(Provenance::System));
        assert_eq!(session.participants[0].role, Role::User);
        assert_eq!(manager.active_session().await.unwrap().id, session.id);
    }

    #[tokio::test]
    async fn test_create_validation_registers_nothing() {
        let manager = manager(None).await;
        assert!(matches!(manager.create("Standup", &[]).await, Err(CoordinatorError::Validation(_))));
        assert!(matches!(manager.create("  ", &["user"]).await, Err(CoordinatorError::Validation(_))));
        assert_eq!(manager.stats().await.sessions, 0);
    }

    #[tokio::test]
    async fn test_mentions_add_replies_and_participants() {
        let mut transport = MockAgentTransport::new();
        transport
            .expect_call()
            .returning(|agent_id, _, _| Err(CoordinatorError::delivery(agent_id, "HTTP 503")));
        let manager = ConferenceManager::new(router(transport).await, None, settings());
        let session = manager.create("Planning", &["user"]).await.unwrap();

        let outcome = manager
            .post_message(&session.id, "@alden and kimi-k2, thoughts?", "user")
            .await
            .unwrap();
        assert_eq!(outcome.mentioned, vec!["alden", "kimi-k2"]);
        assert_eq!(outcome.follow_ups[0].provenance, Some(Provenance::MentionReply));
        assert_eq!(outcome.follow_ups[1].provenance, Some(Provenance::MentionError));
        assert!(outcome.follow_ups[1].content.contains("kimi-k2"));
        assert!(outcome.follow_ups[1].content.contains("HTTP 503"));

        let session = manager.session(&session.id).await.unwrap();
        assert!(session.has_participant("alden"));
        assert!(session.has_participant("kimi-k2"));
        // welcome + post + two follow-ups
        assert_eq!(session.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let manager = ConferenceManager::new(
            router(MockAgentTransport::new()).await,
            None,
            ConferenceSettings { max_history: 3, ..settings() },
        );
        let session = manager.create("Chat", &["user"]).await.unwrap();
        for i in 0..5 {
            manager.post_message(&session.id, &format!("note {}", i), "user").await.unwrap();
        }
        let history = manager.history(&session.id, None).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "note 2");
        assert_eq!(manager.history(&session.id, Some(1)).await.unwrap()[0].content, "note 4");
    }

    #[tokio::test]
    async fn test_leave_clears_active_view() {
        let manager = manager(None).await;
        let session = manager.create("Chat", &["user"]).await.unwrap();
        manager.leave(&session.id).await.unwrap();
        assert!(manager.active_session().await.is_none());
        assert!(manager.list_sessions().await.is_empty());
        assert!(matches!(
            manager.leave(&session.id).await,
            Err(CoordinatorError::NotFound { kind: "session", .. })
        ));
    }

    #[tokio::test]
    async fn test_join_falls_back_to_empty_session() {
        let mut store = MockSessionStore::new();
        store
            .expect_load()
            .returning(|_| Err(CoordinatorError::RemoteUnavailable("store down".into())));
        let manager = manager(Some(Arc::new(store))).await;

        let session = manager.join("remote-only").await.unwrap();
        assert!(session.messages.is_empty());
        assert!(session.participants.is_empty());
        assert_eq!(manager.active_session().await.unwrap().id, "remote-only");
    }

    #[tokio::test]
    async fn test_join_prefers_store_copy() {
        let mut stored = ConferenceSession::new("s1", "From store", None);
        stored.add_participant("alden");
        let mut store = MockSessionStore::new();
        store.expect_load().returning(move |_| Ok(Some(stored.clone())));
        let manager = manager(Some(Arc::new(store))).await;

        let session = manager.join("s1").await.unwrap();
        assert_eq!(session.name, "From store");
        assert!(session.has_participant("alden"));
    }

    #[tokio::test]
    async fn test_join_unknown_without_store() {
        let manager = manager(None).await;
        assert!(matches!(
            manager.join("nope").await,
            Err(CoordinatorError::NotFound { kind: "session", .. })
        ));
    }

    #[tokio::test]
    async fn test_post_saves_to_store() {
        let mut store = MockSessionStore::new();
        // once on create, once on post
        store.expect_save().times(2).returning(|_| Ok(()));
        let manager = manager(Some(Arc::new(store))).await;
        let session = manager.create("Chat", &["user"]).await.unwrap();
        manager.post_message(&session.id, "hello", "user").await.unwrap();
    }

    #[tokio::test]
    async fn test_join_writes_back_newer_local_copy() {
        let manager = manager(None).await;
        let local = manager.create("Chat", &["user"]).await.unwrap();
        manager.post_message(&local.id, "posted while the store was down", "user").await.unwrap();

        let mut stale = manager.session(&local.id).await.unwrap();
        stale.messages.truncate(1);
        let mut store = MockSessionStore::new();
        store.expect_load().returning(move |_| Ok(Some(stale.clone())));
        store
            .expect_save()
            .withf(|session| session.messages.len() == 2)
            .times(1)
            .returning(|_| Ok(()));
        let manager = ConferenceManager {
            store: Some(Arc::new(store)),
            ..manager
        };

        let joined = manager.join(&local.id).await.unwrap();
        assert_eq!(joined.messages.len(), 2);
        assert_eq!(joined.messages[1].content, "posted while the store was down");
    }

    #[tokio::test]
    async fn test_join_rejects_expired_session() {
        let mut stored = ConferenceSession::new("old", "Old", Some(Utc::now() - chrono::Duration::hours(1)));
        stored.add_participant("user");
        let mut store = MockSessionStore::new();
        store.expect_load().returning(move |_| Ok(Some(stored.clone())));
        let manager = manager(Some(Arc::new(store))).await;

        assert!(matches!(manager.join("old").await, Err(CoordinatorError::Validation(_))));
        assert!(manager.active_session().await.is_none());
    }

    #[tokio::test]
    async fn test_turns_pass_in_request_order() {
        let manager = manager(None).await;
        let session = manager.create("Panel", &["user", "alden", "kimi-k2"]).await.unwrap();

        assert!(manager.request_turn(&session.id, "alden").await.unwrap());
        assert!(manager.request_turn(&session.id, "alden").await.unwrap());
        assert!(!manager.request_turn(&session.id, "kimi-k2").await.unwrap());
        assert!(!manager.request_turn(&session.id, "user").await.unwrap());
        // queued once only
        assert!(!manager.request_turn(&session.id, "kimi-k2").await.unwrap());
        assert_eq!(manager.session(&session.id).await.unwrap().turn_queue.len(), 2);

        assert_eq!(manager.current_turn(&session.id).await.unwrap().as_deref(), Some("alden"));
        assert_eq!(
            manager.release_turn(&session.id, "alden").await.unwrap().as_deref(),
            Some("kimi-k2")
        );
        assert_eq!(manager.release_turn(&session.id, "kimi-k2").await.unwrap().as_deref(), Some("user"));
        assert_eq!(manager.release_turn(&session.id, "user").await.unwrap(), None);
        assert_eq!(manager.current_turn(&session.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_turn_rules() {
        let manager = manager(None).await;
        let session = manager.create("Panel", &["user", "alden"]).await.unwrap();

        assert!(matches!(
            manager.request_turn(&session.id, "vault").await,
            Err(CoordinatorError::Validation(_))
        ));
        manager.request_turn(&session.id, "user").await.unwrap();
        // only the holder can release
        assert!(matches!(
            manager.release_turn(&session.id, "alden").await,
            Err(CoordinatorError::Validation(_))
        ));
        assert_eq!(manager.current_turn(&session.id).await.unwrap().as_deref(), Some("user"));
        assert!(matches!(
            manager.request_turn("nope", "user").await,
            Err(CoordinatorError::NotFound { kind: "session", .. })
        ));
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_and_idle_sessions() {
        let manager = manager(None).await;
        let expired = manager.create("Expired", &["user"]).await.unwrap();
        let idle = manager.create("Idle", &["user"]).await.unwrap();
        let live = manager.create("Live", &["user"]).await.unwrap();

        manager
            .with_session(&expired.id, |s| s.expires_at = Some(Utc::now() - chrono::Duration::minutes(1)))
            .await
            .unwrap();
        manager
            .with_session(&idle.id, |s| s.last_activity = Utc::now() - chrono::Duration::hours(3))
            .await
            .unwrap();

        assert_eq!(manager.cleanup_expired_sessions().await, 2);
        let remaining: Vec<_> = manager.list_sessions().await.into_iter().map(|s| s.id).collect();
        assert_eq!(remaining, vec![live.id.clone()]);
        assert_eq!(manager.active_session().await.unwrap().id, live.id);
        assert_eq!(manager.cleanup_expired_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_clears_active_view() {
        let manager = manager(None).await;
        let session = manager.create("Chat", &["user"]).await.unwrap();
        manager
            .with_session(&session.id, |s| s.expires_at = Some(Utc::now() - chrono::Duration::minutes(1)))
            .await
            .unwrap();

        assert_eq!(manager.cleanup_expired_sessions().await, 1);
        assert!(manager.active_session().await.is_none());
    }

    #[tokio::test]
    async fn test_extend_session_moves_expiry() {
        let manager = manager(None).await;
        let session = manager.create("Chat", &["user"]).await.unwrap();
        let default_expiry = session.expires_at.unwrap();
        assert!(default_expiry > session.created_at);

        let extended = manager.extend_session(&session.id, 48).await.unwrap();
        assert!(extended.expires_at.unwrap() > default_expiry);
    }

    #[tokio::test]
    async fn test_failed_save_does_not_fail_post() {
        let mut store = MockSessionStore::new();
        store
            .expect_save()
            .returning(|_| Err(CoordinatorError::RemoteUnavailable("store down".into())));
        let manager = manager(Some(Arc::new(store))).await;
        let session = manager.create("Chat", &["user"]).await.unwrap();
        assert!(manager.post_message(&session.id, "hello", "user").await.is_ok());
    }
}
