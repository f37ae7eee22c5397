//! Lifecycle of an asynchronous operation as plain data.
//!
//! Connection requests, accepts and pings are all tracked as a [`Task`]
//! stored in state, so reducers can pattern-match on lifecycle instead of
//! holding futures.

/// Lifecycle of one asynchronous operation.
///
/// `Error` carries a message rather than a source error so the whole state
/// tree stays `Clone + PartialEq` for watch-channel publication.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Task<T = ()> {
    /// Not yet started.
    #[default]
    Idle,
    /// In flight.
    Running,
    /// Finished successfully.
    Success(T),
    /// Finished with a failure.
    Error(String),
}

impl<T> Task<T> {
    /// Shorthand for a failed task.
    pub fn failed(msg: impl Into<String>) -> Self {
        Task::Error(msg.into())
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Task::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Task::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Task::Error(_))
    }

    /// Finished, one way or the other.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Task::Success(_) | Task::Error(_))
    }
}

impl Task<()> {
    /// Shorthand for a successful unit task.
    pub fn done() -> Self {
        Task::Success(())
    }
}
