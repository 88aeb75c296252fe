use thiserror::Error;

/// Failures surfaced by the load, name resolution and save pipelines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectError {
    /// The container could not be read or written, or its manifest is missing or unparseable.
    #[error("Malformed archive: {message}")]
    MalformedArchive { message: String },

    /// No archive entry matched the asset id under any candidate extension.
    #[error("Asset {id} not found (tried {})", tried.join(", "))]
    AssetNotFound { id: i64, tried: Vec<String> },

    /// Several distinct parameter lists were declared for one custom block signature.
    #[error("Ambiguous custom block definition '{signature}' ({candidates} candidates)")]
    AmbiguousDefinition { signature: String, candidates: usize },

    #[error("Could not find a free {kind} name for '{name}' after {attempts} attempts")]
    NameCollisionUnresolvable {
        kind: String,
        name: String,
        attempts: usize,
    },

    #[error("Could not decode {extension} image: {message}")]
    ImageDecode { extension: String, message: String },

    #[error("Timed out after {waited_ms}ms waiting for {extension} image dimensions")]
    DecodeTimeout { extension: String, waited_ms: u128 },
}

impl ProjectError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedArchive {
            message: message.into(),
        }
    }
}

impl From<zip::result::ZipError> for ProjectError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::malformed(err.to_string())
    }
}

impl From<std::io::Error> for ProjectError {
    fn from(err: std::io::Error) -> Self {
        Self::malformed(err.to_string())
    }
}
