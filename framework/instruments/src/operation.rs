use std::time::{Duration, Instant};

/// Timing record for a single operation, such as one HTTP request.
///
/// Create the record immediately before starting the operation and call
/// [OperationRecord::finish] as soon as the result is available. The record is then handed to
/// [crate::Reporter::add_operation].
#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub(crate) operation_id: String,
    started: Instant,
    pub(crate) elapsed: Option<Duration>,
    pub(crate) is_error: bool,
    pub(crate) attr: Vec<(String, String)>,
}

impl OperationRecord {
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            started: Instant::now(),
            elapsed: None,
            is_error: false,
            attr: Vec::new(),
        }
    }

    /// Tag the operation. Every tag produces an additional duration series named
    /// `<operation_id>_duration{<key>:<value>}`.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attr.push((key.into(), value.into()));
        self
    }

    pub fn finish(&mut self, is_error: bool) -> Duration {
        let elapsed = self.started.elapsed();
        self.elapsed = Some(elapsed);
        self.is_error = is_error;
        elapsed
    }

    /// Finish with a duration measured by the operation itself, such as a transport's own timing.
    pub fn finish_with(&mut self, elapsed: Duration, is_error: bool) -> Duration {
        self.elapsed = Some(elapsed);
        self.is_error = is_error;
        elapsed
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// The measured duration, or the time since the record was created if it has not finished.
    pub fn duration(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.started.elapsed())
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }
}
