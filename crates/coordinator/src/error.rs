use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error(transparent)]
    Hash(#[from] corelib::Error),

    /// The event loop has stopped.
    #[error("coordinator is shut down")]
    Closed,

    #[error("rebalance task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
