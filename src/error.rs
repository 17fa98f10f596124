// Error types of the instrumentation surface

use thiserror::Error;

use crate::host::TestId;

/// Misuse of a [`Recorder`](crate::state::Recorder)'s open-node stack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecorderError {
    #[error("no test case is open")]
    NoOpenCase,

    #[error("no step is open; end_step called without a matching begin_step")]
    NoOpenStep,

    #[error("test case '{open}' was never finalized before '{requested}' began")]
    CaseAlreadyOpen { open: String, requested: String },

    #[error("test case '{0}' is already finalized")]
    CaseFinalized(String),
}

/// Errors surfaced to code that reports through a listener.
#[derive(Debug, Error)]
pub enum AdaptorError {
    #[error(transparent)]
    Protocol(#[from] RecorderError),

    #[error("unknown test '{0}'; it was never started or already finished")]
    UnknownTest(TestId),

    #[error("no test is bound to the current thread")]
    Unbound,

    #[error("report sink rejected the case: {0:#}")]
    Sink(anyhow::Error),
}
