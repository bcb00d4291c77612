use serde::Serialize;
use thiserror::Error;

pub const ERR_VALIDATION: &str = "ERR_VALIDATION";
pub const ERR_DEPENDENCY: &str = "ERR_DEPENDENCY";
pub const ERR_SYSTEM: &str = "ERR_SYSTEM";
pub const ERR_TIMEOUT: &str = "ERR_TIMEOUT";
pub const ERR_DISPOSED: &str = "ERR_DISPOSED";

#[derive(Debug, Clone, Serialize, Error)]
#[error("{error} ({code})")]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_VALIDATION, message, trace_id)
    }

    pub fn dependency(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_DEPENDENCY, message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_SYSTEM, message, trace_id)
    }

    /// The command budget elapsed before a prompt line was seen.
    pub fn timeout(trace_id: impl Into<String>) -> Self {
        Self::new(ERR_TIMEOUT, "Command execution timed out", trace_id)
    }

    /// The caller used a shell session after disposing it.
    pub fn disposed(trace_id: impl Into<String>) -> Self {
        Self::new(ERR_DISPOSED, "Shell session is already disposed", trace_id)
    }

    pub fn is_timeout(&self) -> bool {
        self.code == ERR_TIMEOUT
    }

    pub fn is_disposed(&self) -> bool {
        self.code == ERR_DISPOSED
    }
}
