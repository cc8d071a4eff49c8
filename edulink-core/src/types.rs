//! Core data type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Store key holding the bearer token
pub const TOKEN_KEY: &str = "userToken";
/// Store key holding the role string
pub const ROLE_KEY: &str = "userRole";
/// Store key holding the user id
pub const USER_ID_KEY: &str = "userId";

/// Every key the session layer persists: token, role, user id
pub const SESSION_KEYS: [&str; 3] = [TOKEN_KEY, ROLE_KEY, USER_ID_KEY];

/// Authorization category of a signed-in user
///
/// Values other than `parent` and `teacher` are kept verbatim so a caller can
/// see what the backend sent, but they never unlock a privileged screen graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Parent,
    Teacher,
    Unrecognized(String),
}

impl Role {
    /// Whether this is one of the two roles the application knows about
    pub fn is_known(&self) -> bool {
        matches!(self, Role::Parent | Role::Teacher)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Parent => "parent",
            Role::Teacher => "teacher",
            Role::Unrecognized(raw) => raw,
        }
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        match value {
            "parent" => Role::Parent,
            "teacher" => Role::Teacher,
            other => Role::Unrecognized(other.to_string()),
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "parent" => Role::Parent,
            "teacher" => Role::Teacher,
            _ => Role::Unrecognized(value),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Unrecognized(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory record of the current authentication status
///
/// Fields are private: the only way to hold credentials is through
/// [`Session::authenticated`], so a role or user id without a token cannot be
/// represented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    token: Option<String>,
    role: Option<Role>,
    user_id: Option<String>,
    is_bootstrapping: bool,
    is_signing_out: bool,
}

impl Session {
    /// Process-start snapshot, before the persisted session has been read
    pub fn bootstrapping() -> Self {
        Self {
            token: None,
            role: None,
            user_id: None,
            is_bootstrapping: true,
            is_signing_out: false,
        }
    }

    /// Nobody is signed in
    pub fn unauthenticated() -> Self {
        Self {
            is_bootstrapping: false,
            ..Self::bootstrapping()
        }
    }

    /// Nobody is signed in, and that is because of an explicit sign-out
    pub fn signed_out() -> Self {
        Self {
            is_signing_out: true,
            ..Self::unauthenticated()
        }
    }

    pub fn authenticated(
        token: impl Into<String>,
        role: impl Into<Role>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            token: Some(token.into()),
            role: Some(role.into()),
            user_id,
            is_bootstrapping: false,
            is_signing_out: false,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn role(&self) -> Option<&Role> {
        self.role.as_ref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn is_bootstrapping(&self) -> bool {
        self.is_bootstrapping
    }

    pub fn is_signing_out(&self) -> bool {
        self.is_signing_out
    }

    /// Collapse the snapshot into the controller's state machine position
    ///
    /// A token paired with an unknown role is `Unauthenticated`, matching
    /// [`is_authenticated`](Self::is_authenticated) and the screens it routes to.
    pub fn state(&self) -> SessionState {
        if self.is_bootstrapping {
            return SessionState::Bootstrapping;
        }
        match (&self.token, &self.role) {
            (Some(_), Some(role)) if role.is_known() => SessionState::Authenticated(role.clone()),
            _ => SessionState::Unauthenticated,
        }
    }

    /// Token present and the role is one the application knows
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.role.as_ref().is_some_and(Role::is_known)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::bootstrapping()
    }
}

/// Position of the session state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Bootstrapping,
    Unauthenticated,
    Authenticated(Role),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Bootstrapping => f.write_str("bootstrapping"),
            SessionState::Unauthenticated => f.write_str("unauthenticated"),
            SessionState::Authenticated(role) => write!(f, "authenticated ({})", role),
        }
    }
}

/// Login form input exchanged for a token
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Profile of the signed-in user as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub role: Role,
}
