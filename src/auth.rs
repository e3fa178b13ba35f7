//! Static credential check and the session gate in front of every page.

use crate::error::{Result, TrackerError};
use crate::types::Timestamp;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

/// One entry of the credential list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
    pub role: Role,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            role,
        }
    }
}

/// The credentials every fresh install accepts.
pub fn default_credentials() -> Vec<Credential> {
    vec![
        Credential::new("admin", "admin123", Role::Admin),
        Credential::new("user", "user123", Role::User),
    ]
}

/// A signed-in user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub username: String,
    pub role: Role,
    pub login_time: Timestamp,
}

/// Checks usernames and passwords against a fixed list.
#[derive(Clone, Debug)]
pub struct AuthContext {
    users: Vec<Credential>,
}

impl AuthContext {
    pub fn new(users: Vec<Credential>) -> Self {
        Self { users }
    }

    /// Exact match on both username and password.
    pub fn login(&self, username: &str, password: &str) -> Result<Session> {
        let user = self
            .users
            .iter()
            .find(|u| u.username == username && u.password == password)
            .ok_or_else(|| {
                warn!(username, "rejected login");
                TrackerError::InvalidCredentials
            })?;

        info!(username, role = ?user.role, "signed in");
        Ok(Session {
            username: user.username.clone(),
            role: user.role,
            login_time: Timestamp::now(),
        })
    }
}

impl Default for AuthContext {
    fn default() -> Self {
        Self::new(default_credentials())
    }
}

/// Holds at most one session, kept as its JSON encoding.
#[derive(Debug, Default)]
pub struct SessionStorage {
    entry: Mutex<Option<String>>,
}

impl SessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any current session.
    pub fn sign_in(&self, session: &Session) -> Result<()> {
        let encoded = serde_json::to_string(session)?;
        *self.entry.lock() = Some(encoded);
        Ok(())
    }

    pub fn sign_out(&self) {
        if self.entry.lock().take().is_some() {
            info!("signed out");
        }
    }

    /// The stored session. An entry that no longer decodes reads as signed
    /// out.
    pub fn current(&self) -> Option<Session> {
        let entry = self.entry.lock();
        let raw = entry.as_deref()?;
        match serde_json::from_str(raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "discarding unreadable session entry");
                None
            }
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.current().is_some()
    }
}

/// Pages of the app, as far as the gate is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Page {
    Login,
    Main,
    Customers,
}

impl Page {
    pub fn is_login(self) -> bool {
        matches!(self, Page::Login)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    Allow,
    Redirect(Page),
}

/// Decide whether `page` may be shown.
///
/// Without a session every page except the login page redirects to login.
/// With a session the login page redirects to the main page.
pub fn gate(page: Page, session: Option<&Session>) -> Gate {
    match (session, page.is_login()) {
        (None, false) => Gate::Redirect(Page::Login),
        (Some(_), true) => Gate::Redirect(Page::Main),
        _ => Gate::Allow,
    }
}
