//! Typed errors for the parts of the crate that need to propagate a reason
//! rather than collapse to a bool/`Option::None` (see the error-handling
//! design: invalid handles and unknown properties stay silent no-ops,
//! parse and Vulkan object creation failures are reported).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("malformed shader description: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("shader description missing required attribute `{0}`")]
    MissingAttribute(String),
    #[error("unknown resource type `{0}`")]
    UnknownResourceType(String),
    #[error("unknown field type `{0}`")]
    UnknownFieldType(String),
    #[error("shader declares neither passes nor compute shaders")]
    NoPasses,
    #[error("shader mixes graphics passes and compute shaders")]
    MixedPassKinds,
    #[error("failed to read shader file `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("vulkan object creation failed: {0}")]
    Vulkan(String),
    #[error(transparent)]
    Shader(#[from] ShaderError),
}
