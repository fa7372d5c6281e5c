//! Session identity shared by every bridge and the orchestrator.

use std::sync::RwLock;

use ledgerplay_shared::{Actor, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::client_keys::KeyPair;
use crate::storage::FileStore;
use crate::sync::{read, write};

const STORAGE_KEY: &str = "ledgerplay_session";

/// Who the current viewer is. `user_id == UserId::ANONYMOUS` means no session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
    pub level: u32,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            user_id: UserId::ANONYMOUS,
            display_name: String::new(),
            level: 0,
        }
    }

    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id,
            display_name: self.display_name.clone(),
            level: self.level,
        }
    }
}

/// Whether an inbound event is about the viewer or someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    Own,
    Community,
}

/// Classify an event's subject against the session user.
///
/// The no-session sentinel never matches, so anonymous/system events
/// (`user_id: 0`) are not attributed to a logged-out viewer.
pub fn attribute(session: UserId, subject: UserId) -> Attribution {
    if !session.is_anonymous() && session == subject {
        Attribution::Own
    } else {
        Attribution::Community
    }
}

/// Read-only accessor for the current session.
pub trait IdentityProvider: Send + Sync {
    fn current(&self) -> Identity;

    fn attribute(&self, subject: UserId) -> Attribution {
        attribute(self.current().user_id, subject)
    }

    fn is_own(&self, subject: UserId) -> bool {
        self.attribute(subject) == Attribution::Own
    }
}

/// Identity that never changes; used by tools and tests.
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub Identity);

impl StaticIdentity {
    pub fn user(user_id: u64, display_name: &str, level: u32) -> Self {
        Self(Identity {
            user_id: UserId(user_id),
            display_name: display_name.to_string(),
            level,
        })
    }

    pub fn anonymous() -> Self {
        Self(Identity::anonymous())
    }
}

impl IdentityProvider for StaticIdentity {
    fn current(&self) -> Identity {
        self.0.clone()
    }
}

/// Stored session data
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AuthSession {
    pub user_id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub keys: Option<KeyPair>,
}

/// Session holder with optional on-disk persistence.
///
/// Login and logout publish the new user id on a `watch` channel so the
/// orchestrator can tear channels down when the session ends.
pub struct SessionIdentity {
    session: RwLock<Option<AuthSession>>,
    store: Option<FileStore>,
    user_tx: watch::Sender<UserId>,
}

impl SessionIdentity {
    pub fn new(store: Option<FileStore>) -> Self {
        let (user_tx, _) = watch::channel(UserId::ANONYMOUS);
        Self {
            session: RwLock::new(None),
            store,
            user_tx,
        }
    }

    /// Restore a previously persisted session, if any.
    pub fn restore(store: FileStore) -> Self {
        let session = store.load::<AuthSession>(STORAGE_KEY);
        let identity = Self::new(Some(store));
        if let Some(session) = session {
            crate::log_info!("Restored session for user {}", session.user_id);
            identity.user_tx.send_replace(session.user_id);
            *write(&identity.session) = Some(session);
        }
        identity
    }

    pub fn login(&self, session: AuthSession) {
        if let Some(store) = &self.store {
            if !store.save(STORAGE_KEY, &session) {
                crate::log_warn!("Failed to persist session for user {}", session.user_id);
            }
        }
        let user_id = session.user_id;
        *write(&self.session) = Some(session);
        self.user_tx.send_replace(user_id);
    }

    pub fn logout(&self) {
        if let Some(store) = &self.store {
            store.remove(STORAGE_KEY);
        }
        *write(&self.session) = None;
        self.user_tx.send_replace(UserId::ANONYMOUS);
    }

    pub fn session(&self) -> Option<AuthSession> {
        read(&self.session).clone()
    }

    pub fn keys(&self) -> Option<KeyPair> {
        read(&self.session).as_ref().and_then(|s| s.keys.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        read(&self.session).is_some()
    }

    /// Receiver that yields the user id after every login/logout.
    pub fn subscribe(&self) -> watch::Receiver<UserId> {
        self.user_tx.subscribe()
    }
}

impl IdentityProvider for SessionIdentity {
    fn current(&self) -> Identity {
        match read(&self.session).as_ref() {
            Some(session) => Identity {
                user_id: session.user_id,
                display_name: session.display_name.clone(),
                level: session.level,
            },
            None => Identity::anonymous(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: u64) -> AuthSession {
        AuthSession {
            user_id: UserId(id),
            display_name: format!("player{id}"),
            level: 3,
            keys: None,
        }
    }

    #[test]
    fn matching_ids_are_own_events() {
        assert_eq!(attribute(UserId(5), UserId(5)), Attribution::Own);
        assert_eq!(attribute(UserId(5), UserId(6)), Attribution::Community);
    }

    #[test]
    fn sentinel_never_matches() {
        assert_eq!(attribute(UserId::ANONYMOUS, UserId(9)), Attribution::Community);
        assert_eq!(
            attribute(UserId::ANONYMOUS, UserId::ANONYMOUS),
            Attribution::Community
        );
    }

    #[test]
    fn no_session_resolves_to_anonymous() {
        let identity = SessionIdentity::new(None);
        assert_eq!(identity.current(), Identity::anonymous());
        assert!(!identity.is_own(UserId::ANONYMOUS));
    }

    #[test]
    fn login_and_logout_publish_user_id() {
        let identity = SessionIdentity::new(None);
        let rx = identity.subscribe();

        identity.login(session(21));
        assert_eq!(*rx.borrow(), UserId(21));
        assert!(identity.is_own(UserId(21)));
        assert_eq!(identity.current().actor().display_name, "player21");

        identity.logout();
        assert_eq!(*rx.borrow(), UserId::ANONYMOUS);
        assert!(!identity.is_authenticated());
    }

    #[test]
    fn session_survives_restore() {
        let tmp = tempfile::tempdir().unwrap();
        let first = SessionIdentity::new(Some(FileStore::new(tmp.path())));
        first.login(session(8));

        let restored = SessionIdentity::restore(FileStore::new(tmp.path()));
        assert_eq!(restored.current().user_id, UserId(8));
        assert_eq!(*restored.subscribe().borrow(), UserId(8));

        restored.logout();
        let empty = SessionIdentity::restore(FileStore::new(tmp.path()));
        assert!(!empty.is_authenticated());
    }
}
