use thiserror::Error;

/// Request-level failures of the ingestion pipeline.
///
/// Per-artifact execution failures are not errors: they are recorded as
/// failed `Outcome`s. A degraded intent parse is not an error either.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No repository could be resolved from the instruction.
    #[error("ambiguous intent: {0}")]
    AmbiguousIntent(String),

    /// Clone failed: unreachable host, missing branch, or local disk trouble.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// A specifically requested file was not present in the workspace.
    #[error("not found: {0}")]
    NotFound(String),

    /// The text-generation backend failed on a path with no fallback.
    #[error("backend error: {0}")]
    Backend(String),

    /// A generated manifest was not valid YAML.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable snake_case tag, used by the HTTP adapter and CLI JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::AmbiguousIntent(_) => "ambiguous_intent",
            PipelineError::Retrieval(_) => "retrieval",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Backend(_) => "backend",
            PipelineError::InvalidManifest(_) => "invalid_manifest",
            PipelineError::Io(_) => "io",
        }
    }
}
