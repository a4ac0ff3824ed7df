//! Request and response schemas
//!
//! Incoming requests are decoded field by field by the command processor so
//! each missing or malformed field maps to its own error text. Outgoing
//! requests (relay, gossip, clients) are built from [`Request`].
use std::path::PathBuf;

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{CommandError, Result};
use crate::registry::{Peer, Resource};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Publish,
    Remove,
    Share,
    Query,
    Fetch,
    Exchange,
}

impl std::str::FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PUBLISH" => Ok(Command::Publish),
            "REMOVE" => Ok(Command::Remove),
            "SHARE" => Ok(Command::Share),
            "QUERY" => Ok(Command::Query),
            "FETCH" => Ok(Command::Fetch),
            "EXCHANGE" => Ok(Command::Exchange),
            _ => Err(CommandError::InvalidCommand),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Publish => write!(f, "PUBLISH"),
            Command::Remove => write!(f, "REMOVE"),
            Command::Share => write!(f, "SHARE"),
            Command::Query => write!(f, "QUERY"),
            Command::Fetch => write!(f, "FETCH"),
            Command::Exchange => write!(f, "EXCHANGE"),
        }
    }
}

/// Outbound request, one per connection
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "command", rename_all = "UPPERCASE")]
pub enum Request {
    Publish {
        resource: Resource,
    },
    Remove {
        resource: Resource,
    },
    Share {
        secret: String,
        resource: Resource,
    },
    Query {
        relay: bool,
        #[serde(rename = "resourceTemplate")]
        resource_template: Resource,
    },
    Fetch {
        #[serde(rename = "resourceTemplate")]
        resource_template: Resource,
    },
    Exchange {
        #[serde(rename = "serverList")]
        server_list: Vec<Peer>,
    },
}

impl Request {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Status and count frames
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Success,
    Error(CommandError),
    ResultSize(usize),
}

impl Response {
    pub fn to_json(&self) -> String {
        match self {
            Response::Success => json!({ "response": "success" }).to_string(),
            Response::Error(err) => json!({
                "response": "error",
                "errorMessage": err.message(),
            })
            .to_string(),
            Response::ResultSize(n) => json!({ "resultSize": n }).to_string(),
        }
    }
}

/// One unit written back to a client, in order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundMessage {
    /// A JSON text frame
    Frame(String),
    /// Raw file bytes, exactly `size` of them
    File { path: PathBuf, size: u64 },
}

impl From<Response> for OutboundMessage {
    fn from(response: Response) -> Self {
        OutboundMessage::Frame(response.to_json())
    }
}

impl From<CommandError> for OutboundMessage {
    fn from(err: CommandError) -> Self {
        Response::Error(err).into()
    }
}

impl OutboundMessage {
    pub fn as_frame(&self) -> Option<&str> {
        match self {
            OutboundMessage::Frame(text) => Some(text),
            OutboundMessage::File { .. } => None,
        }
    }
}

fn parse(frame: &str) -> Option<Value> {
    serde_json::from_str(frame).ok()
}

/// `{"response":"success"}`
pub fn is_success(frame: &str) -> bool {
    parse(frame).is_some_and(|v| v.get("response").and_then(Value::as_str) == Some("success"))
}

/// `errorMessage` of an error frame
pub fn error_message(frame: &str) -> Option<String> {
    let value = parse(frame)?;
    if value.get("response")?.as_str()? != "error" {
        return None;
    }
    value.get("errorMessage")?.as_str().map(str::to_string)
}

/// `resultSize` of a trailing count frame
pub fn result_size(frame: &str) -> Option<u64> {
    parse(frame)?.get("resultSize")?.as_u64()
}
