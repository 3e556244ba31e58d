//! Wire envelopes of the dynamic-security control plane.
//!
//! Requests are `{"commands":[{...}]}` with exactly one command; responses are
//! `{"responses":[{"command": ..., "error"?: ..., "data"?: ...}]}`. Sending a single
//! command per request keeps response correlation unambiguous.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::command::DynSecCommand;
use super::types::CommandResult;
use crate::error::DynSecError;

/// Request envelope published on the control channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Commands in the request.
    pub commands: Vec<DynSecCommand>,
}

/// Response envelope received on the response channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// One response object per command, in order.
    pub responses: Vec<JsonValue>,
}

/// Stateless translation between commands and wire payloads.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommandCodec;

#[derive(Serialize)]
struct SingleCommand<'a> {
    commands: [&'a DynSecCommand; 1],
}

impl CommandCodec {
    /// Encode one command into a request payload.
    pub fn encode(command: &DynSecCommand) -> Result<Vec<u8>, DynSecError> {
        serde_json::to_vec(&SingleCommand { commands: [command] })
            .map_err(|e| DynSecError::Encode(format!("{}: {e}", command.name())))
    }

    /// Decode a response payload for the command named `expected`.
    ///
    /// Never fails: undecodable payloads and responses for other commands become
    /// failed results carrying `MalformedResponse` or `CommandMismatch`.
    pub fn decode(expected: &str, raw: &[u8]) -> CommandResult {
        Self::decode_parsed(expected, raw).with_raw(raw)
    }

    fn decode_parsed(expected: &str, raw: &[u8]) -> CommandResult {
        match Self::parse_first(raw) {
            Ok((name, response)) => {
                if name != expected {
                    return CommandResult::failed(
                        expected,
                        DynSecError::CommandMismatch { expected: expected.to_string(), actual: name },
                    );
                }
                match response.get("error") {
                    Some(JsonValue::String(msg)) => {
                        let msg = msg.clone();
                        CommandResult::broker_error(expected, msg, response)
                    }
                    Some(JsonValue::Null) | None => CommandResult::ok(expected, response),
                    Some(other) => {
                        let msg = other.to_string();
                        CommandResult::broker_error(expected, msg, response)
                    }
                }
            }
            Err(err) => CommandResult::failed(expected, err),
        }
    }

    fn parse_first(raw: &[u8]) -> Result<(String, JsonValue), DynSecError> {
        let envelope: ResponseEnvelope = serde_json::from_slice(raw)
            .map_err(|e| DynSecError::MalformedResponse(e.to_string()))?;
        let first = envelope
            .responses
            .into_iter()
            .next()
            .ok_or_else(|| DynSecError::MalformedResponse("missing responses[0]".into()))?;
        let name = first
            .get("command")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| DynSecError::MalformedResponse("responses[0].command missing".into()))?
            .to_string();
        Ok((name, first))
    }
}
