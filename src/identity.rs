//! Identity handle for the current session
//!
//! Every component receives an explicit [`IdentityHandle`] instead of
//! reaching into a global auth context. The core treats "loading" and
//! "unauthenticated" as blocking preconditions for every operation.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::config::IdentityConfig;
use crate::error::{ChatlineError, Result};

/// The authenticated user the client acts on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque user identifier used to scope queries
    pub id: String,
    /// Human-readable name, if known
    #[serde(default)]
    pub display_name: Option<String>,
    /// Contact address, if known
    #[serde(default)]
    pub email: Option<String>,
    /// Bearer token attached to backend requests
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,
}

impl Identity {
    /// Create an identity with only an identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            email: None,
            access_token: None,
        }
    }

    /// Attach a bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Name to show in prompts and banners
    ///
    /// Falls back to the local part of the email, then to the identifier.
    pub fn label(&self) -> &str {
        if let Some(name) = self.display_name.as_deref() {
            return name;
        }
        if let Some(email) = self.email.as_deref() {
            return email.split('@').next().unwrap_or(email);
        }
        &self.id
    }
}

/// Authentication phase reported by an identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// The provider has not resolved the identity yet
    Loading,
    /// No identity is available
    Unauthenticated,
    /// An identity is available
    Authenticated(Identity),
}

/// Source of the current identity
pub trait IdentityProvider: Send + Sync {
    /// Current authentication phase
    fn auth_state(&self) -> AuthState;

    /// Resolve the identity or fail with an authorization error
    fn require(&self) -> Result<Identity> {
        match self.auth_state() {
            AuthState::Authenticated(identity) => Ok(identity),
            AuthState::Loading => Err(ChatlineError::Authorization(
                "identity is still loading".to_string(),
            )
            .into()),
            AuthState::Unauthenticated => {
                Err(ChatlineError::Authorization("not signed in".to_string()).into())
            }
        }
    }
}

/// Shared handle threaded through every component
pub type IdentityHandle = Arc<dyn IdentityProvider>;

/// Identity provider backed by in-process state
///
/// Starts in whatever phase it is constructed with; `set_state` lets the
/// host (or a test) move it between phases.
#[derive(Debug)]
pub struct StaticIdentityProvider {
    state: RwLock<AuthState>,
}

impl StaticIdentityProvider {
    /// Create a provider in the given phase
    pub fn new(state: AuthState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Create an authenticated provider
    pub fn authenticated(identity: Identity) -> Self {
        Self::new(AuthState::Authenticated(identity))
    }

    /// Build a provider from configuration
    ///
    /// A missing or blank `user_id` yields an unauthenticated provider.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatline::config::IdentityConfig;
    /// use chatline::identity::{AuthState, IdentityProvider, StaticIdentityProvider};
    ///
    /// let provider = StaticIdentityProvider::from_config(&IdentityConfig::default());
    /// assert_eq!(provider.auth_state(), AuthState::Unauthenticated);
    /// ```
    pub fn from_config(config: &IdentityConfig) -> Self {
        let user_id = config
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        match user_id {
            Some(id) => Self::authenticated(Identity {
                id: id.to_string(),
                display_name: config.display_name.clone(),
                email: config.email.clone(),
                access_token: config.access_token.clone(),
            }),
            None => Self::new(AuthState::Unauthenticated),
        }
    }

    /// Replace the current phase
    pub fn set_state(&self, state: AuthState) {
        match self.state.write() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn auth_state(&self) -> AuthState {
        match self.state.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
