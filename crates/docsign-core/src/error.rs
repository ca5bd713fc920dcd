use thiserror::Error;

/// Fatal failures: the whole composite run is aborted
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("could not fetch source document: {0}")]
    Fetch(#[from] FetchError),

    #[error("could not decode source document: {0}")]
    Decode(String),

    #[error("could not serialize signed document: {0}")]
    Serialize(String),

    #[error("compose task did not finish: {0}")]
    Interrupted(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("source fetch returned status {status} for {location}")]
    Status { status: u16, location: String },

    #[error("source fetch transport error: {0}")]
    Transport(String),

    #[error("source read error: {0}")]
    Io(String),

    #[error("unknown source location: {0}")]
    InvalidLocation(String),
}

/// Per-field failures. These are logged and the field is left off the output.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("malformed image payload: {0}")]
    MalformedImage(String),

    #[error("unsupported image: {0}")]
    UnsupportedImage(String),

    #[error("draw failed: {0}")]
    Draw(String),

    #[error("field geometry is not finite")]
    NonFiniteGeometry,

    #[error("field geometry exceeds the drawable range")]
    GeometryOutOfRange,
}

/// Failures from the collaborators the completion step talks to
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("blob upload failed: {0}")]
    Upload(String),

    #[error("notification failed: {0}")]
    Notify(String),
}
