use secrecy::SecretString;

/// Authenticated upstream session, threaded through every call and never
/// persisted by this crate. The caller owns storage between conversation
/// turns and must persist any renewed copy the executor hands back.
#[derive(Clone, Debug)]
pub struct SessionDescriptor {
    pub session_id: String,
    pub user_id: i64,
    pub username: Option<String>,
    /// Present only when the caller opted to cache credentials for renewal;
    /// absent means renewal goes through the credential vault.
    pub password: Option<SecretString>,
}

impl SessionDescriptor {
    pub fn new(session_id: impl Into<String>, user_id: i64) -> Self {
        Self { session_id: session_id.into(), user_id, username: None, password: None }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password);
        self
    }
}

/// Decrypted credential pair returned by the vault bridge.
#[derive(Clone, Debug)]
pub struct VaultCredentials {
    pub user_id: i64,
    pub username: String,
    pub password: SecretString,
}

#[cfg(test)]
mod tests {
    use super::SessionDescriptor;

    #[test]
    fn debug_output_redacts_cached_password() {
        let session = SessionDescriptor::new("abc123", 7)
            .with_credentials("jane@example.com", "hunter2".into());
        let debug = format!("{session:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("abc123"));
    }
}
