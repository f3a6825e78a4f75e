//! Error types for the animation core.

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum AnimError {
    /// A key already occupies the target frame.
    #[error("a key already exists at frame {frame}")]
    DuplicateKey { frame: i32 },

    /// No key exists at the requested frame.
    #[error("no key at frame {frame}")]
    KeyNotFound { frame: i32 },

    /// The scheduler cannot honor the requested transition.
    #[error("invalid scheduler state: {current} -> {requested}")]
    InvalidState {
        current: String,
        requested: String,
    },
}
