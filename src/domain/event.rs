//! The slice of a log event the renderer needs.

use crate::domain::exception::ExceptionProxy;

/// A log event as handed over by the host pipeline.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: String,
    pub logger: String,
    pub message: String,
    pub exception: Option<ExceptionProxy>,
}

impl LogEvent {
    pub fn new(level: impl Into<String>, logger: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            logger: logger.into(),
            message: message.into(),
            exception: None,
        }
    }

    pub fn with_exception(mut self, exception: ExceptionProxy) -> Self {
        self.exception = Some(exception);
        self
    }
}
