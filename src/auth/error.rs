/// Credential and token lifecycle errors
///
/// `Clone` so one refresh outcome can be handed to every waiting caller.
#[derive(Debug, PartialEq, Clone)]
pub enum AuthError {
    /// No AppID/AppSecret configured
    NotConfigured,
    /// Credential rejected before reaching the store (empty field)
    InvalidCredential(String),
    /// Token endpoint answered with an error code
    Authority { code: i64, message: String },
    /// Token endpoint unreachable, timed out or returned garbage
    Transport(String),
    /// Credential storage failed
    Store(String),
}

impl AuthError {
    /// Wraps an `anyhow` chain from the store, keeping every context line.
    pub fn store(err: anyhow::Error) -> Self {
        AuthError::Store(format!("{:#}", err))
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::NotConfigured => write!(
                f,
                "WeChat credential not configured, run wechat_auth with action \"configure\" first"
            ),
            AuthError::InvalidCredential(reason) => write!(f, "Invalid credential: {}", reason),
            AuthError::Authority { code, message } => write!(
                f,
                "Token authority rejected the credentials (code {}): {}",
                code, message
            ),
            AuthError::Transport(reason) => {
                write!(f, "Token authority unreachable: {}", reason)
            }
            AuthError::Store(reason) => write!(f, "Credential storage unavailable: {}", reason),
        }
    }
}

impl std::error::Error for AuthError {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn not_configured_message_names_the_fix() {
        let message = AuthError::NotConfigured.to_string();
        assert!(message.contains("not configured"));
        assert!(message.contains("configure"));
    }

    #[test]
    fn authority_message_carries_code() {
        let err = AuthError::Authority {
            code: 40125,
            message: "invalid appsecret".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Token authority rejected the credentials (code 40125): invalid appsecret"
        );
    }

    #[test]
    fn store_keeps_context_chain() {
        let err: anyhow::Result<()> = Err(anyhow::anyhow!("disk full")).context("Failed to store");
        let wrapped = AuthError::store(err.unwrap_err());
        assert_eq!(wrapped, AuthError::Store("Failed to store: disk full".to_string()));
    }
}
