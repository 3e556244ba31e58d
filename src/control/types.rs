use serde_json::Value as JsonValue;

use crate::error::{DynSecError, FailureKind};

/// Uniform outcome of one control-plane command.
///
/// `success` holds when the broker answered the matching command without an
/// error, or when the error was an already-satisfied phrase for that command
/// (`normalized` is then set).
#[derive(Clone, Debug, PartialEq)]
pub struct CommandResult {
    /// Overall success after idempotency normalization.
    pub success: bool,
    /// Command that was sent.
    pub command: String,
    /// Command named in the response, when one was decoded.
    pub matched_command: Option<String>,
    /// Error text reported by the broker, if any.
    pub error_text: Option<String>,
    /// Typed error for failed results.
    pub error: Option<DynSecError>,
    /// The decoded `responses[0]` object.
    pub response: Option<JsonValue>,
    /// Response payload as received (lossy UTF-8). Kept for every decoded
    /// payload, including ones that could not be parsed.
    pub raw_response: Option<String>,
    /// True when a broker error was treated as success.
    pub normalized: bool,
}

impl CommandResult {
    /// Broker answered without an error.
    pub fn ok(command: impl Into<String>, response: JsonValue) -> Self {
        let command = command.into();
        Self {
            success: true,
            matched_command: Some(command.clone()),
            command,
            error_text: None,
            error: None,
            response: Some(response),
            raw_response: None,
            normalized: false,
        }
    }

    /// Broker answered the matching command with an error.
    pub fn broker_error(command: impl Into<String>, message: String, response: JsonValue) -> Self {
        let command = command.into();
        Self {
            success: false,
            matched_command: Some(command.clone()),
            error: Some(DynSecError::Broker { command: command.clone(), message: message.clone() }),
            command,
            error_text: Some(message),
            response: Some(response),
            raw_response: None,
            normalized: false,
        }
    }

    /// The exchange itself failed (timeout, decoding, link, cancellation).
    pub fn failed(command: impl Into<String>, error: DynSecError) -> Self {
        let matched_command = match &error {
            DynSecError::CommandMismatch { actual, .. } => Some(actual.clone()),
            _ => None,
        };
        Self {
            success: false,
            command: command.into(),
            matched_command,
            error_text: None,
            error: Some(error),
            response: None,
            raw_response: None,
            normalized: false,
        }
    }

    /// Attach the payload the result was decoded from.
    pub(crate) fn with_raw(mut self, raw: &[u8]) -> Self {
        self.raw_response = Some(String::from_utf8_lossy(raw).into_owned());
        self
    }

    /// Mark a broker error as already satisfied.
    pub(crate) fn normalize(mut self) -> Self {
        self.success = true;
        self.normalized = true;
        self.error = None;
        self
    }

    /// Whether the command is considered successful.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Failure discriminant, `None` on success.
    pub fn failure(&self) -> Option<FailureKind> {
        self.error.as_ref().map(DynSecError::failure_kind)
    }

    /// Payload returned by getters (`responses[0].data`).
    pub fn data(&self) -> Option<&JsonValue> {
        self.response.as_ref().and_then(|r| r.get("data"))
    }

    /// Convert into a `Result` so callers can use `?`.
    pub fn into_result(self) -> Result<Self, DynSecError> {
        if self.success {
            return Ok(self);
        }
        match self.error {
            Some(err) => Err(err),
            None => Err(DynSecError::Broker {
                command: self.command,
                message: self.error_text.unwrap_or_default(),
            }),
        }
    }
}
