use thiserror::Error;

/// Terminal session outcomes. None of these are retried: each one is
/// reported exactly once through the failure callback, after which the
/// background task ends.
#[derive(Debug, Error)]
pub enum SessionFault {
    /// The login poll reached a status that can never confirm.
    #[error("login timeout")]
    LoginTimeout,
    /// Unexpected transport or parse error while logging in.
    #[error("login exception: {source}")]
    Login { source: anyhow::Error },
    /// Error while establishing the session and loading contacts.
    #[error("initialization exception: {source}")]
    Init { source: anyhow::Error },
    /// Error inside the long-poll loop.
    #[error("listen exception: {source}")]
    Listen { source: anyhow::Error },
}
