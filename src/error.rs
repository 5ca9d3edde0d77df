//! Error types for the particle morph core.

use thiserror::Error;

/// Errors raised while preparing models or driving transitions.
#[derive(Debug, Error)]
pub enum MorphError {
    /// No models were requested
    #[error("Configuration error: at least one model is required")]
    NoModels,

    /// A source mesh has no vertices, so it cannot be padded
    #[error("Configuration error: model {model} has no vertices")]
    EmptyMesh { model: usize },

    /// Position and UV attribute counts disagree
    #[error("Configuration error: model {model} has {positions} positions but {uvs} uvs")]
    MismatchedAttributes {
        model: usize,
        positions: usize,
        uvs: usize,
    },

    /// The appearance texture is empty or larger than a 2D texture may be
    #[error("Configuration error: model {model} has a {width}x{height} texture, sides must be within 1..={limit}")]
    InvalidTexture {
        model: usize,
        width: u32,
        height: u32,
        limit: u32,
    },

    /// A model index outside the loaded set
    #[error("Configuration error: model index {index} is out of range ({count} models loaded)")]
    InvalidModelIndex { index: usize, count: usize },

    /// Per-model inputs disagree on how many models there are
    #[error("Configuration error: expected {expected} models, got {actual}")]
    ModelCountMismatch { expected: usize, actual: usize },

    /// The normalized particle count does not fit in a simulation texture
    #[error("Configuration error: {particles} particles need a {side}x{side} texture, limit is {limit}")]
    TooManyParticles { particles: usize, side: u32, limit: u32 },

    /// A transition is already in flight
    #[error("Busy: transition to model {in_flight_target} is still in flight")]
    Busy { in_flight_target: usize },

    /// A mesh or its texture failed to load
    #[error("Resource error: failed to load model '{model}': {source}")]
    Resource {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl MorphError {
    /// Busy is the only condition the caller can simply retry later.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MorphError::Busy { .. })
    }

    pub fn resource(model: impl Into<String>, source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        MorphError::Resource {
            model: model.into(),
            source: source.into(),
        }
    }
}
