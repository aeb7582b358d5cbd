//! Engine-client error type.

use thiserror::Error;

/// Errors returned by a [`crate::WorkflowEngineClient`].
///
/// A deployment the engine simply did not produce is *not* an error; it is
/// reported as `Ok(None)` by `deploy_process`.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (connect, TLS, timeout, body decode).
    #[error("HTTP request to workflow engine failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The engine answered with an unexpected status.
    #[error("workflow engine returned {status}: {body}")]
    Api { status: u16, body: String },

    /// Failure produced by [`crate::mock::MockEngineClient`].
    #[error("mock engine failure: {0}")]
    Mock(String),
}
