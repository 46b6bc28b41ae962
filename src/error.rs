//! Failure kinds callers need to tell apart.
//!
//! Everything else travels as [`anyhow::Error`]. These variants are the ones
//! the orchestrator, the CLI, or the tests match on after a downcast.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    /// Bootstrap never ran (or its output was removed).
    #[error(
        "no saved session at {}; run `pdigest --init-auth` once to log in and save it",
        path.display()
    )]
    MissingSession { path: PathBuf },

    /// The response-complete affordance never appeared.
    #[error("response did not complete within {}s", waited.as_secs())]
    ResponseTimeout { waited: Duration },

    /// Waiting finished but there was no text to keep.
    #[error("assistant returned no extractable text")]
    EmptyResponse,

    #[error("selector `{selector}` not found within {}s", waited.as_secs())]
    SelectorTimeout { selector: String, waited: Duration },
}
