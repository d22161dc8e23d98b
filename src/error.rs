use crate::shader::ShaderStage;

/// Convenience result type used across the engine.
pub type FxResult<T> = Result<T, FxError>;

/// Error taxonomy for the effects engine.
///
/// Compile, link and init errors are fatal to the surface that raised them and
/// to nothing else. Parameter errors never escape the parameter bus unless the
/// caller asks for them through [`crate::params::ParameterBus::try_set`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FxError {
    /// A shader stage failed to compile. `log` is the driver's info log.
    #[error("{stage} shader failed to compile: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    /// Both stages compiled but the program did not link.
    #[error("program failed to link: {log}")]
    ProgramLink { log: String },

    /// No usable graphics context, or program creation bubbled up a failure.
    #[error("surface init failed: {0}")]
    SurfaceInit(String),

    /// Unknown parameter name or non-finite value.
    #[error("parameter rejected: {0}")]
    ParamValidation(String),

    /// Malformed parameter JSON.
    #[error("serialization error: {0}")]
    Serde(String),
}

impl FxError {
    pub fn shader_compile(stage: ShaderStage, log: impl Into<String>) -> Self {
        Self::ShaderCompile {
            stage,
            log: log.into(),
        }
    }

    pub fn program_link(log: impl Into<String>) -> Self {
        Self::ProgramLink { log: log.into() }
    }

    pub fn surface_init(msg: impl Into<String>) -> Self {
        Self::SurfaceInit(msg.into())
    }

    pub fn param(msg: impl Into<String>) -> Self {
        Self::ParamValidation(msg.into())
    }

    /// True for errors that leave the surface unusable and call for a fallback.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ShaderCompile { .. } | Self::ProgramLink { .. } | Self::SurfaceInit(_)
        )
    }
}

impl From<serde_json::Error> for FxError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}

impl From<FxError> for wasm_bindgen::JsValue {
    fn from(err: FxError) -> Self {
        wasm_bindgen::JsValue::from_str(&err.to_string())
    }
}
