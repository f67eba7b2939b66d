//! Wire protocol shared by the host and every context.
//!
//! Messages travel as `serde_json::Value` trees. Anything that does not parse
//! as a [`Message`] with the [`ACTION_GLOBAL`] tag and a non-empty id is
//! foreign traffic and is left alone by the router.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Action tag carried by every bridge message.
pub const ACTION_GLOBAL: &str = "global";

/// Error text sent when the executor has no such callable.
pub const NO_SUCH_METHOD: &str = "NO_SUCH_METHOD";

/// Name of the distinguished default context.
pub const MAIN_CONTEXT: &str = "main";

/// One unit exchanged over a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub action: String,
    pub payload: Payload,
}

/// Call or response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Present on calls only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    /// `Some(Value::Null)` when the key is present with a null value.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Context name; absent for the default context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_module: Option<bool>,
}

/// Keeps a present key distinct from an absent one, even when it is null.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Message {
    /// Build a call message.
    pub fn call(
        id: impl Into<String>,
        method: impl Into<String>,
        args: Vec<Value>,
        worker_name: Option<String>,
        is_module: bool,
    ) -> Self {
        Self::global(Payload {
            id: Some(id.into()),
            method: Some(method.into()),
            args: Some(args),
            worker_name,
            is_module: Some(is_module),
            ..Payload::default()
        })
    }

    /// Build a successful response.
    pub fn result(
        id: impl Into<String>,
        method: Option<String>,
        result: Value,
        worker_name: Option<String>,
    ) -> Self {
        Self::global(Payload {
            id: Some(id.into()),
            method,
            result: Some(result),
            worker_name,
            ..Payload::default()
        })
    }

    /// Build a failed response.
    pub fn error(
        id: impl Into<String>,
        method: Option<String>,
        error: impl Into<String>,
        worker_name: Option<String>,
    ) -> Self {
        Self::global(Payload {
            id: Some(id.into()),
            method,
            error: Some(error.into()),
            worker_name,
            ..Payload::default()
        })
    }

    fn global(payload: Payload) -> Self {
        Self {
            action: ACTION_GLOBAL.to_string(),
            payload,
        }
    }

    /// Parse raw channel data, returning `None` for anything that is not a
    /// bridge message: wrong shape, foreign action, or missing/empty id.
    pub fn parse(raw: Value) -> Option<Self> {
        let message: Message = serde_json::from_value(raw).ok()?;
        if message.action != ACTION_GLOBAL {
            return None;
        }
        match message.payload.id.as_deref() {
            Some(id) if !id.is_empty() => Some(message),
            _ => None,
        }
    }

    /// The correlation id. Only valid on messages returned by [`Message::parse`]
    /// or built through the constructors above.
    pub fn id(&self) -> &str {
        self.payload.id.as_deref().unwrap_or_default()
    }

    /// Calls name a method or carry arguments, and never carry an outcome.
    /// A call without `args` runs with an empty argument list.
    pub fn is_call(&self) -> bool {
        let payload = &self.payload;
        payload.result.is_none()
            && payload.error.is_none()
            && (payload.method.is_some() || payload.args.is_some())
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Sending half of a channel, as seen by the router and by call stubs.
pub trait Outbox: Send + Sync + 'static {
    /// Post a message to the other side.
    fn post(&self, message: &Message) -> Result<()>;

    /// Post arbitrary data, bypassing the bridge protocol.
    fn post_raw(&self, data: Value) -> Result<()>;
}

impl Outbox for mpsc::UnboundedSender<Value> {
    fn post(&self, message: &Message) -> Result<()> {
        self.post_raw(message.to_value()?)
    }

    fn post_raw(&self, data: Value) -> Result<()> {
        self.send(data)
            .map_err(|_| Error::ContextClosed("receiving side has hung up".to_string()))
    }
}
