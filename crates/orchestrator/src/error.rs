//! Run-level error type.

use cola_kernel::{CommError, KernelError};
use thiserror::Error;

/// Every way a simulation run can fail. All of them are fatal; a task that
/// hits one aborts every other task.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Invalid or inconsistent parameters, detected before any compute.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A fixed-size buffer is too small or an allocation failed.
    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),

    /// A peer vanished or aborted.
    #[error("communication failure: {0}")]
    Communication(CommError),

    /// A compute routine failed.
    #[error("kernel error: {0}")]
    Kernel(KernelError),

    /// A task thread panicked.
    #[error("task {task} panicked")]
    TaskPanicked {
        /// Task whose thread panicked.
        task: usize,
    },

    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was being read.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`crate::SimulationConfig`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl SimulationError {
    /// Whether this error only reports that some other task failed first.
    pub fn is_peer_abort(&self) -> bool {
        matches!(
            self,
            SimulationError::Communication(CommError::PeerAborted { .. })
                | SimulationError::Kernel(KernelError::Comm(CommError::PeerAborted { .. }))
        )
    }
}

impl From<CommError> for SimulationError {
    fn from(e: CommError) -> Self {
        SimulationError::Communication(e)
    }
}

impl From<KernelError> for SimulationError {
    fn from(e: KernelError) -> Self {
        match e {
            KernelError::Comm(c) => SimulationError::Communication(c),
            KernelError::Partition { planes, tasks } => SimulationError::Configuration(format!(
                "cannot decompose {} mesh planes over {} tasks",
                planes, tasks
            )),
            KernelError::Allocation { values } => SimulationError::ResourceExhaustion(format!(
                "grid allocation of {} values failed",
                values
            )),
            other => SimulationError::Kernel(other),
        }
    }
}
