//! Session store configuration.

/// Persistence keys and auth endpoint paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Key holding the raw bearer token.
    pub credential_key: String,
    /// Key holding the JSON user record.
    pub user_key: String,
    pub login_path: String,
    pub register_path: String,
    /// Remote invalidation endpoint called after a local logout.
    pub logout_path: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credential_key: "token".to_string(),
            user_key: "user".to_string(),
            login_path: "/auth/login".to_string(),
            register_path: "/auth/register".to_string(),
            logout_path: None,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_keys(
        mut self,
        credential_key: impl Into<String>,
        user_key: impl Into<String>,
    ) -> Self {
        self.credential_key = credential_key.into();
        self.user_key = user_key.into();
        self
    }

    #[must_use]
    pub fn with_logout_path(mut self, path: impl Into<String>) -> Self {
        self.logout_path = Some(path.into());
        self
    }
}
