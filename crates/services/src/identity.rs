use quiz_core::model::UserId;

/// Source of the signed-in user's identifier.
///
/// Returning `None` means nobody is signed in; persisting tracker operations
/// are refused in that case.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<UserId>;
}

/// Identity fixed at construction, e.g. from configuration or a test.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user: Option<UserId>,
}

impl StaticIdentity {
    #[must_use]
    pub fn signed_in(user: UserId) -> Self {
        Self { user: Some(user) }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self { user: None }
    }

    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }

    /// Reads `QUIZ_USER_ID`; blank or unset means signed out.
    #[must_use]
    pub fn from_env() -> Self {
        let user = std::env::var("QUIZ_USER_ID")
            .ok()
            .and_then(|raw| raw.parse::<UserId>().ok());
        Self { user }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<UserId> {
        self.user.clone()
    }
}
