use thiserror::Error;

/// Errors raised by scene graph mutation.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("game object no longer exists")]
    UnknownGameObject,
    #[error("component no longer exists")]
    UnknownComponent,
    #[error("cannot parent an object under its own descendant")]
    Cycle,
    #[error("search exhausted after {limit} attempts")]
    SearchExhausted { limit: usize },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Errors produced while reading or writing a serialized scene.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not an ember scene archive")]
    BadMagic,
    #[error("unsupported archive version {0}")]
    UnsupportedVersion(u32),
    #[error("field `{0}` is missing")]
    MissingField(String),
    #[error("field `{key}` is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },
    #[error("archive is truncated")]
    Truncated,
    #[error("block stack is unbalanced")]
    Unbalanced,
    #[error("invalid value for `{key}`: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors reported by resource libraries.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("failed to load {path}: {message}")]
    Load { path: String, message: String },
}

/// Errors reported by a graphics backend.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("shader {name} failed to compile: {message}")]
    ShaderCompile { name: String, message: String },
    #[error("render target unavailable: {0}")]
    Target(String),
    #[error("graphics backend error: {0}")]
    Backend(String),
}

/// Errors reported by the audio collaborator.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio clip not found: {0}")]
    ClipNotFound(String),
    #[error("audio device error: {0}")]
    Device(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors reported by the background job pool.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job pool has shut down")]
    ShutDown,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
