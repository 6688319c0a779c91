//! `SessionRegistry`: keyed map of every generation the view knows about.
//!
//! The registry is the only writer of the message list. Sessions and
//! messages sit behind one lock so two concurrently streaming sessions can
//! never lose each other's updates, and the terminal-status fence is checked
//! in the same critical section as the mutation it guards.
//!
//! # Locking discipline
//!
//! The lock is a `std::sync::Mutex` and is never held across an `.await`.
//! Every mutation that changes a message publishes a fresh snapshot through
//! a `watch` channel while still holding the lock, so observers see
//! snapshots in mutation order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::domain::{
    Conversation, FrameOutcome, Message, MessageId, Session, SessionContext, SessionId,
    SessionStatus, TextFrame,
};

/// Result of [`SessionRegistry::attach_existing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    /// A new entry was created; a subscription may now be opened.
    Attached(Session),
    /// The id was already tracked; nothing changed.
    AlreadyAttached,
}

/// Exclusive right to run the single subscription of a session.
#[derive(Debug, Clone)]
pub struct SubscriptionClaim {
    pub ticket: u64,
    pub cancel: CancellationToken,
}

struct ActiveSubscription {
    ticket: u64,
    cancel: CancellationToken,
}

struct SessionEntry {
    session: Session,
    message_id: MessageId,
    subscription: Option<ActiveSubscription>,
    /// Creation order, used to find the most recent live session.
    order: u64,
}

impl SessionEntry {
    fn close_subscription(&mut self) {
        if let Some(active) = self.subscription.take() {
            active.cancel.cancel();
        }
    }
}

struct RegistryInner {
    card_context_id: String,
    sessions: HashMap<SessionId, SessionEntry>,
    conversation: Conversation,
    next_order: u64,
    next_ticket: u64,
}

impl RegistryInner {
    /// Copy the session's text and the given flags onto its bound message.
    fn sync_message(&mut self, id: &SessionId, pending: bool, error: bool) {
        let Some(entry) = self.sessions.get(id) else {
            return;
        };
        if let Some(message) = self.conversation.get_mut(entry.message_id) {
            message.content = entry.session.accumulated_text().to_string();
            message.pending = pending;
            message.error = error;
        }
    }
}

/// Tracks every session with an in-flight or recoverable generation.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    messages_tx: Arc<watch::Sender<Vec<Message>>>,
}

impl SessionRegistry {
    /// Create an empty registry for one flashcard view.
    pub fn new(card_context_id: impl Into<String>) -> Self {
        let (messages_tx, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                card_context_id: card_context_id.into(),
                sessions: HashMap::new(),
                conversation: Conversation::new(),
                next_order: 0,
                next_ticket: 0,
            })),
            messages_tx: Arc::new(messages_tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &RegistryInner) {
        self.messages_tx
            .send_replace(inner.conversation.messages().to_vec());
    }

    /// The card this registry serves.
    pub fn card_context_id(&self) -> String {
        self.lock().card_context_id.clone()
    }

    // ── Conversation ───────────────────────────────────────────────

    /// Append a finished user message.
    pub fn push_user_message(&self, content: impl Into<String>) -> MessageId {
        let mut inner = self.lock();
        let id = inner.conversation.next_id();
        inner.conversation.push(Message::user(id, content));
        self.publish(&inner);
        id
    }

    /// Append an empty pending assistant message.
    pub fn push_pending_assistant(&self) -> MessageId {
        let mut inner = self.lock();
        let id = inner.conversation.next_id();
        inner.conversation.push(Message::pending_assistant(id));
        self.publish(&inner);
        id
    }

    /// Mark a message errored when its session could not even start.
    pub fn fail_message(&self, message_id: MessageId) {
        let mut inner = self.lock();
        if let Some(message) = inner.conversation.get_mut(message_id) {
            message.pending = false;
            message.error = true;
        }
        self.publish(&inner);
    }

    /// Replace the message list with persisted history.
    ///
    /// Messages bound to a session this registry already tracks take the
    /// live session's state, which is never older than the persisted copy.
    pub fn replace_history(&self, messages: Vec<Message>) {
        let mut inner = self.lock();
        inner.conversation.replace(messages);

        let rebound: Vec<(SessionId, MessageId)> = inner
            .conversation
            .messages()
            .iter()
            .filter_map(|m| {
                let id = m.session_id.as_ref()?;
                inner.sessions.contains_key(id).then(|| (id.clone(), m.id))
            })
            .collect();

        for (session_id, message_id) in rebound {
            let Some(entry) = inner.sessions.get_mut(&session_id) else {
                continue;
            };
            entry.message_id = message_id;
            let status = entry.session.status;
            inner.sync_message(
                &session_id,
                !status.is_terminal(),
                status == SessionStatus::Error,
            );
        }
        self.publish(&inner);
    }

    /// Snapshot of the message list.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().conversation.messages().to_vec()
    }

    /// Subscribe to message-list snapshots.
    pub fn subscribe_messages(&self) -> watch::Receiver<Vec<Message>> {
        self.messages_tx.subscribe()
    }

    /// The message bound to a session.
    pub fn message_for(&self, session_id: &SessionId) -> Option<Message> {
        let inner = self.lock();
        let entry = inner.sessions.get(session_id)?;
        inner.conversation.get(entry.message_id).cloned()
    }

    // ── Sessions ───────────────────────────────────────────────────

    /// Register a session the backend just created and bind it to its
    /// assistant message. Status starts at `pending`.
    pub fn create_session(
        &self,
        session_id: SessionId,
        context: SessionContext,
        message_id: MessageId,
        has_audio: bool,
    ) -> Session {
        let mut inner = self.lock();
        if let Some(existing) = inner.sessions.get(&session_id) {
            tracing::warn!(%session_id, "Backend reused a session id, keeping existing entry");
            return existing.session.clone();
        }

        let session = Session::new(session_id.clone(), context, has_audio);
        if let Some(message) = inner.conversation.get_mut(message_id) {
            message.session_id = Some(session_id.clone());
        }
        inner.next_order += 1;
        let order = inner.next_order;
        inner.sessions.insert(
            session_id.clone(),
            SessionEntry {
                session: session.clone(),
                message_id,
                subscription: None,
                order,
            },
        );
        self.publish(&inner);
        tracing::debug!(%session_id, %message_id, has_audio, "Session created");
        session
    }

    /// Track a session discovered during history replay.
    ///
    /// Idempotent: a second call for the same id is a no-op. This is what
    /// keeps a view that mounts, re-renders, and mounts again from opening
    /// duplicate subscriptions.
    pub fn attach_existing(&self, session_id: SessionId, message: Message) -> AttachOutcome {
        let mut inner = self.lock();
        if inner.sessions.contains_key(&session_id) {
            tracing::trace!(%session_id, "Session already attached");
            return AttachOutcome::AlreadyAttached;
        }

        let message_id = message.id;
        let persisted_text = message.content.clone();
        if !inner.conversation.contains(message_id) {
            inner.conversation.push(message);
        }
        if let Some(bound) = inner.conversation.get_mut(message_id) {
            bound.session_id = Some(session_id.clone());
            bound.pending = true;
            bound.error = false;
        }

        let context = SessionContext::new(inner.card_context_id.clone(), None);
        let mut session = Session::new(session_id.clone(), context, false);
        // Persisted text stands until the stream replays `existing_content`.
        if !persisted_text.is_empty() {
            session.seed_existing(persisted_text);
        }
        inner.next_order += 1;
        let order = inner.next_order;
        inner.sessions.insert(
            session_id.clone(),
            SessionEntry {
                session: session.clone(),
                message_id,
                subscription: None,
                order,
            },
        );
        self.publish(&inner);
        tracing::debug!(%session_id, %message_id, "Attached existing session");
        AttachOutcome::Attached(session)
    }

    pub fn get(&self, session_id: &SessionId) -> Option<Session> {
        self.lock()
            .sessions
            .get(session_id)
            .map(|entry| entry.session.clone())
    }

    /// Whether a subscription currently runs for the session.
    pub fn is_processing(&self, session_id: &SessionId) -> bool {
        self.lock()
            .sessions
            .get(session_id)
            .is_some_and(|entry| entry.subscription.is_some())
    }

    /// Flag whether the session carries audio.
    pub fn set_has_audio(&self, session_id: &SessionId, has_audio: bool) {
        if let Some(entry) = self.lock().sessions.get_mut(session_id) {
            entry.session.has_audio = has_audio;
        }
    }

    /// The most recently created session that is still live.
    pub fn active_session(&self) -> Option<SessionId> {
        self.lock()
            .sessions
            .values()
            .filter(|entry| !entry.session.status.is_terminal())
            .max_by_key(|entry| entry.order)
            .map(|entry| entry.session.session_id.clone())
    }

    // ── Subscriptions ──────────────────────────────────────────────

    /// Reserve the single subscription slot of a session.
    ///
    /// Returns `None` when the session is unknown, terminal, or already
    /// has a subscription.
    pub fn claim_subscription(&self, session_id: &SessionId) -> Option<SubscriptionClaim> {
        let mut inner = self.lock();
        inner.next_ticket += 1;
        let ticket = inner.next_ticket;
        let entry = inner.sessions.get_mut(session_id)?;
        if entry.session.status.is_terminal() || entry.subscription.is_some() {
            return None;
        }
        let cancel = CancellationToken::new();
        entry.subscription = Some(ActiveSubscription {
            ticket,
            cancel: cancel.clone(),
        });
        Some(SubscriptionClaim { ticket, cancel })
    }

    /// Free the slot taken by `claim_subscription`, if still held by `ticket`.
    pub fn release_subscription(&self, session_id: &SessionId, ticket: u64) {
        let mut inner = self.lock();
        if let Some(entry) = inner.sessions.get_mut(session_id)
            && entry
                .subscription
                .as_ref()
                .is_some_and(|active| active.ticket == ticket)
        {
            entry.subscription = None;
        }
    }

    /// Close a session's subscription, keeping its record and text.
    pub fn detach(&self, session_id: &SessionId) {
        if let Some(entry) = self.lock().sessions.get_mut(session_id) {
            entry.close_subscription();
        }
    }

    /// Close every subscription (view teardown).
    pub fn detach_all(&self) {
        let mut inner = self.lock();
        for entry in inner.sessions.values_mut() {
            entry.close_subscription();
        }
    }

    // ── Frame application ──────────────────────────────────────────

    /// Apply one decoded frame, unless the session is already terminal.
    pub fn apply_frame(&self, session_id: &SessionId, frame: TextFrame) -> FrameOutcome {
        let mut inner = self.lock();
        let Some(entry) = inner.sessions.get_mut(session_id) else {
            tracing::trace!(%session_id, "Dropping frame for unknown session");
            return FrameOutcome::Dropped;
        };
        if entry.session.status.is_terminal() {
            tracing::trace!(
                %session_id,
                status = %entry.session.status,
                event = frame.event_name(),
                "Dropping frame for terminal session"
            );
            return FrameOutcome::Dropped;
        }

        let outcome = match frame {
            TextFrame::ExistingContent(content) => {
                entry.session.seed_existing(content);
                inner.sync_message(session_id, true, false);
                FrameOutcome::Applied
            }
            TextFrame::Delta(delta) => {
                entry.session.append_delta(&delta);
                inner.sync_message(session_id, true, false);
                FrameOutcome::Applied
            }
            TextFrame::Complete(authoritative) => {
                entry.session.complete(authoritative);
                entry.subscription = None;
                inner.sync_message(session_id, false, false);
                tracing::debug!(%session_id, "Session complete");
                FrameOutcome::Terminated
            }
            TextFrame::Error(reason) => {
                entry.session.fail();
                entry.subscription = None;
                inner.sync_message(session_id, false, true);
                tracing::warn!(%session_id, %reason, "Backend reported generation error");
                FrameOutcome::Terminated
            }
        };
        self.publish(&inner);
        outcome
    }

    /// Mark a session errored (transport or protocol failure).
    ///
    /// Keeps the accumulated text and closes the subscription. Returns
    /// `false` if the session was unknown or already terminal.
    pub fn fail(&self, session_id: &SessionId, reason: &str) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.sessions.get_mut(session_id) else {
            return false;
        };
        if !entry.session.fail() {
            return false;
        }
        entry.close_subscription();
        inner.sync_message(session_id, false, true);
        self.publish(&inner);
        tracing::warn!(%session_id, reason, "Session failed");
        true
    }

    /// Fence a session after an interrupt: status `interrupted`, pending
    /// cleared, subscription closed. Later frames are dropped.
    pub fn mark_interrupted(&self, session_id: &SessionId) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.sessions.get_mut(session_id) else {
            return false;
        };
        if !entry.session.interrupt() {
            return false;
        }
        entry.close_subscription();
        inner.sync_message(session_id, false, false);
        self.publish(&inner);
        tracing::debug!(%session_id, "Session interrupted");
        true
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("SessionRegistry")
            .field("card_context_id", &inner.card_context_id)
            .field("sessions", &inner.sessions.len())
            .field("messages", &inner.conversation.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageRole;

    fn registry_with_session() -> (SessionRegistry, SessionId, MessageId) {
        let registry = SessionRegistry::new("card-1");
        registry.push_user_message("Explain card");
        let message_id = registry.push_pending_assistant();
        let id = SessionId::new("s-1");
        registry.create_session(
            id.clone(),
            SessionContext::new("card-1", None),
            message_id,
            false,
        );
        (registry, id, message_id)
    }

    #[test]
    fn create_session_binds_assistant_message() {
        let (registry, id, _) = registry_with_session();
        let message = registry.message_for(&id).unwrap();
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.session_id.as_ref(), Some(&id));
        assert!(message.pending);
        assert_eq!(registry.get(&id).unwrap().status, SessionStatus::Pending);
    }

    #[test]
    fn deltas_then_complete_without_payload_concatenate() {
        let (registry, id, _) = registry_with_session();
        for delta in ["The ", "mitochondria ", "is ", "the powerhouse"] {
            assert_eq!(
                registry.apply_frame(&id, TextFrame::Delta(delta.into())),
                FrameOutcome::Applied
            );
        }
        assert_eq!(
            registry.apply_frame(&id, TextFrame::Complete(None)),
            FrameOutcome::Terminated
        );

        let message = registry.message_for(&id).unwrap();
        assert_eq!(message.content, "The mitochondria is the powerhouse");
        assert!(!message.pending);
    }

    #[test]
    fn authoritative_payload_replaces_text_once() {
        let (registry, id, _) = registry_with_session();
        registry.apply_frame(&id, TextFrame::Delta("Helo".into()));
        registry.apply_frame(&id, TextFrame::Complete(Some("Hello".into())));
        assert_eq!(registry.message_for(&id).unwrap().content, "Hello");

        assert_eq!(
            registry.apply_frame(&id, TextFrame::Complete(Some("again".into()))),
            FrameOutcome::Dropped
        );
        assert_eq!(registry.message_for(&id).unwrap().content, "Hello");
    }

    #[test]
    fn existing_content_replaces_instead_of_appending() {
        let (registry, id, _) = registry_with_session();
        registry.apply_frame(&id, TextFrame::Delta("Hel".into()));
        registry.apply_frame(&id, TextFrame::ExistingContent("Hello wor".into()));
        registry.apply_frame(&id, TextFrame::Delta("ld".into()));
        assert_eq!(registry.message_for(&id).unwrap().content, "Hello world");
    }

    #[test]
    fn interrupted_session_drops_late_frames() {
        let (registry, id, _) = registry_with_session();
        registry.apply_frame(&id, TextFrame::Delta("partial".into()));
        assert!(registry.mark_interrupted(&id));

        let before = registry.message_for(&id).unwrap();
        assert_eq!(
            registry.apply_frame(&id, TextFrame::Delta(" late".into())),
            FrameOutcome::Dropped
        );
        assert_eq!(
            registry.apply_frame(&id, TextFrame::Complete(Some("final".into()))),
            FrameOutcome::Dropped
        );
        assert_eq!(registry.message_for(&id).unwrap(), before);
        assert!(!before.pending);
        assert!(!before.error);
    }

    #[test]
    fn fail_keeps_partial_text_and_marks_error() {
        let (registry, id, _) = registry_with_session();
        registry.apply_frame(&id, TextFrame::Delta("half an ans".into()));
        assert!(registry.fail(&id, "connection reset"));

        let message = registry.message_for(&id).unwrap();
        assert_eq!(message.content, "half an ans");
        assert!(message.error);
        assert!(!message.pending);
        assert!(!registry.fail(&id, "again"));
    }

    #[test]
    fn attach_existing_is_idempotent() {
        let registry = SessionRegistry::new("card-1");
        let mut message = Message::pending_assistant(MessageId(5));
        message.session_id = Some(SessionId::new("open"));

        let first = registry.attach_existing(SessionId::new("open"), message.clone());
        let second = registry.attach_existing(SessionId::new("open"), message);

        assert!(matches!(first, AttachOutcome::Attached(_)));
        assert_eq!(second, AttachOutcome::AlreadyAttached);
        assert_eq!(registry.messages().len(), 1);
    }

    #[test]
    fn subscription_slot_is_exclusive() {
        let (registry, id, _) = registry_with_session();
        let claim = registry.claim_subscription(&id).unwrap();
        assert!(registry.is_processing(&id));
        assert!(registry.claim_subscription(&id).is_none());

        registry.release_subscription(&id, claim.ticket + 100);
        assert!(registry.is_processing(&id), "foreign ticket must not release");

        registry.release_subscription(&id, claim.ticket);
        assert!(!registry.is_processing(&id));
        assert!(registry.claim_subscription(&id).is_some());
    }

    #[test]
    fn interrupt_cancels_claimed_subscription() {
        let (registry, id, _) = registry_with_session();
        let claim = registry.claim_subscription(&id).unwrap();
        registry.mark_interrupted(&id);
        assert!(claim.cancel.is_cancelled());
        assert!(registry.claim_subscription(&id).is_none());
    }

    #[test]
    fn active_session_is_most_recent_live_one() {
        let (registry, first, _) = registry_with_session();
        let message_id = registry.push_pending_assistant();
        let second = SessionId::new("s-2");
        registry.create_session(
            second.clone(),
            SessionContext::new("card-1", None),
            message_id,
            false,
        );

        assert_eq!(registry.active_session(), Some(second.clone()));
        registry.apply_frame(&second, TextFrame::Complete(None));
        assert_eq!(registry.active_session(), Some(first.clone()));
        registry.mark_interrupted(&first);
        assert_eq!(registry.active_session(), None);
    }

    #[test]
    fn replace_history_prefers_live_session_state() {
        let (registry, id, message_id) = registry_with_session();
        registry.apply_frame(&id, TextFrame::Delta("live text".into()));

        let mut persisted = Message::pending_assistant(message_id);
        persisted.content = "stale".into();
        persisted.session_id = Some(id.clone());
        registry.replace_history(vec![persisted]);

        let message = registry.message_for(&id).unwrap();
        assert_eq!(message.content, "live text");
        assert!(message.pending);
    }

    #[test]
    fn watchers_see_each_mutation() {
        let (registry, id, _) = registry_with_session();
        let mut rx = registry.subscribe_messages();
        registry.apply_frame(&id, TextFrame::Delta("x".into()));
        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.last().unwrap().content, "x");
    }
}
