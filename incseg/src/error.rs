use backbones::UnknownBackbone;
use thiserror::Error;

/// The error type for incremental segmentation operations.
///
/// Covers configuration problems and inconsistent task class lists. Tensor shape
/// errors inside the network itself are left to Burn.
#[derive(Error, Debug)]
pub enum IncSegError {
    /// Error for when an unsupported backbone network is specified.
    #[error("Unsupported backbone: {backbone}")]
    UnsupportedBackbone {
        /// The name of the unsupported backbone.
        backbone: String,
    },

    /// Error for when an invalid model configuration is provided.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// Error for when the per-task class list is empty or holds a zero entry.
    #[error("Invalid task classes {classes:?}: {reason}")]
    InvalidClasses {
        /// The offending class list.
        classes: Vec<usize>,
        /// The reason why the list was rejected.
        reason: String,
    },

    /// Error for when a task head cannot consume the backbone features.
    #[error(
        "Classifier for task {task} expects {expected} feature channels, backbone produces {actual}"
    )]
    ChannelMismatch {
        /// Index of the task.
        task: usize,
        /// Input channels of the task head.
        expected: usize,
        /// Channels produced by the backbone.
        actual: usize,
    },
}

impl From<UnknownBackbone> for IncSegError {
    fn from(err: UnknownBackbone) -> Self {
        Self::UnsupportedBackbone { backbone: err.0 }
    }
}

/// A specialized `Result` type for incremental segmentation operations.
pub type IncSegResult<T> = Result<T, IncSegError>;
