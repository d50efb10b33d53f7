//! Error taxonomy shared by generation and execution

use crate::model::{ApiCall, SimplifiedException};

#[derive(Debug, thiserror::Error)]
pub enum FuzzError {
    /// The value generator cannot build the requested type. Aborts the run.
    #[error("Cannot create value of type '{0}'")]
    UnsupportedType(String),

    /// Construction depth or cycle bound hit; callers receive a default value instead.
    #[error("Recursion limit reached while building '{0}'")]
    RecursionLimitReached(String),

    /// The target answered with its standard API exception shape.
    #[error("Target returned {status_code} ({type_name}): {message}")]
    TargetInvocationFailure {
        status_code: u16,
        type_name: String,
        message: String,
    },

    /// Any other failure while invoking the target. Carries the offending call.
    #[error("Unexpected failure invoking '{}': {message}", call.method_name)]
    UnexpectedInvocationFailure {
        call: Box<ApiCall>,
        message: String,
    },

    /// An enrichment phase failed; its contribution is skipped.
    #[error("{phase} generation failed: {message}")]
    GenerationPhaseFailure { phase: String, message: String },

    /// Call names an operation missing from the catalog.
    #[error("Unknown operation '{0}'")]
    UnknownOperation(String),
}

impl FuzzError {
    /// Short variant name, used as the exception type in session metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedType(_) => "UnsupportedType",
            Self::RecursionLimitReached(_) => "RecursionLimitReached",
            Self::TargetInvocationFailure { .. } => "TargetInvocationFailure",
            Self::UnexpectedInvocationFailure { .. } => "UnexpectedInvocationFailure",
            Self::GenerationPhaseFailure { .. } => "GenerationPhaseFailure",
            Self::UnknownOperation(_) => "UnknownOperation",
        }
    }

    /// Fatal errors abort a single-pass run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedType(_)
                | Self::UnexpectedInvocationFailure { .. }
                | Self::UnknownOperation(_)
        )
    }

    /// Exception recorded as the call's result. Only target invocation
    /// failures are recorded; everything else propagates.
    #[must_use]
    pub fn recorded_exception(&self) -> Option<SimplifiedException> {
        match self {
            Self::TargetInvocationFailure {
                status_code,
                type_name,
                message,
            } => Some(SimplifiedException::new(*status_code, message, type_name.clone())),
            _ => None,
        }
    }

    pub fn phase(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GenerationPhaseFailure {
            phase: phase.into(),
            message: message.into(),
        }
    }
}
