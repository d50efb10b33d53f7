//! Invoker seam: the one capability the fuzzer needs from a target

use drillfuzz_core::{ApiCall, FuzzError, Operation, ParameterValue};

/// Type name recorded for failures in the target's standard exception shape.
pub const API_EXCEPTION: &str = "ApiException";

#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    /// The target answered with its standard API exception shape.
    #[error("{type_name} ({status_code}): {message}")]
    Api {
        status_code: u16,
        message: String,
        type_name: String,
    },

    /// Transport failures, malformed responses, anything else.
    #[error("{0}")]
    Unexpected(String),
}

impl InvocationError {
    #[must_use]
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
            type_name: API_EXCEPTION.to_string(),
        }
    }

    /// Lift into the run's error taxonomy; unexpected failures carry `call`.
    #[must_use]
    pub fn into_fuzz_error(self, call: &ApiCall) -> FuzzError {
        match self {
            Self::Api {
                status_code,
                message,
                type_name,
            } => FuzzError::TargetInvocationFailure {
                status_code,
                type_name,
                message,
            },
            Self::Unexpected(message) => FuzzError::UnexpectedInvocationFailure {
                call: Box::new(call.clone()),
                message,
            },
        }
    }
}

/// Executes one operation with its ordered argument list.
pub trait Invoker {
    /// # Errors
    ///
    /// [`InvocationError::Api`] is recorded as the call's result;
    /// [`InvocationError::Unexpected`] aborts a single-pass run.
    fn invoke(
        &self,
        operation: &Operation,
        args: &[ParameterValue],
    ) -> Result<serde_json::Value, InvocationError>;
}

impl<F> Invoker for F
where
    F: Fn(&Operation, &[ParameterValue]) -> Result<serde_json::Value, InvocationError>,
{
    fn invoke(
        &self,
        operation: &Operation,
        args: &[ParameterValue],
    ) -> Result<serde_json::Value, InvocationError> {
        self(operation, args)
    }
}
