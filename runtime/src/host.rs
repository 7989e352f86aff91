//! Bridge to the embedding host (the extension's background side).
//!
//! The `background` command sends `{target, command, payload}` messages
//! through a [`HostBridge`] and prints the JSON response.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures_lite::future::BoxedLocal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::error::Result;

/// Key/value arguments of a host message.
pub type Payload = Map<String, Json>;

/// Host reply. A non-empty `errors` list marks a failed request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,

    #[serde(flatten)]
    pub data: Map<String, Json>,
}

impl HostResponse {
    pub fn ok(data: Map<String, Json>) -> Self {
        Self {
            errors: Vec::new(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            data: Map::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub trait HostBridge {
    fn send_message(
        &self,
        target: &str,
        command: &str,
        payload: Payload,
    ) -> BoxedLocal<Result<HostResponse>>;
}

/// Bridge for a shell with no host attached; every request fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl HostBridge for NullHost {
    fn send_message(
        &self,
        target: &str,
        command: &str,
        _payload: Payload,
    ) -> BoxedLocal<Result<HostResponse>> {
        let message = format!("no host attached for {}:{}", target, command);
        Box::pin(async move { Ok(HostResponse::error(message)) })
    }
}

type Handler = Rc<dyn Fn(&Payload) -> HostResponse>;

/// In-process host answering from registered handlers.
///
/// `listCommands` on any target lists the commands registered for it.
#[derive(Default, Clone)]
pub struct LocalHost {
    handlers: Rc<RefCell<HashMap<(String, String), Handler>>>,
}

impl LocalHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        &self,
        target: &str,
        command: &str,
        handler: impl Fn(&Payload) -> HostResponse + 'static,
    ) -> &Self {
        self.handlers
            .borrow_mut()
            .insert((target.to_string(), command.to_string()), Rc::new(handler));
        self
    }

    fn list_commands(&self, target: &str) -> HostResponse {
        let mut commands: Vec<String> = self
            .handlers
            .borrow()
            .keys()
            .filter(|(t, _)| t == target)
            .map(|(_, c)| c.clone())
            .collect();
        commands.sort();
        let mut data = Map::new();
        data.insert(
            "commands".to_string(),
            Json::Array(commands.into_iter().map(Json::String).collect()),
        );
        HostResponse::ok(data)
    }
}

impl HostBridge for LocalHost {
    fn send_message(
        &self,
        target: &str,
        command: &str,
        payload: Payload,
    ) -> BoxedLocal<Result<HostResponse>> {
        let handler = self
            .handlers
            .borrow()
            .get(&(target.to_string(), command.to_string()))
            .cloned();
        let response = match handler {
            Some(handler) => handler(&payload),
            None if command == "listCommands" => self.list_commands(target),
            None => HostResponse::error(format!("unknown command {}:{}", target, command)),
        };
        Box::pin(async move { Ok(response) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::block_on;

    #[test]
    fn test_response_json_shape() {
        let mut data = Map::new();
        data.insert("ok".into(), Json::Bool(true));
        let json = serde_json::to_string(&HostResponse::ok(data)).unwrap();
        assert_eq!(json, r#"{"ok":true}"#);

        let parsed: HostResponse = serde_json::from_str(r#"{"errors":["nope"]}"#).unwrap();
        assert!(parsed.is_error());
    }

    #[test]
    fn test_local_host_dispatch() {
        let host = LocalHost::new();
        host.on("background", "echo", |payload| HostResponse::ok(payload.clone()));
        let mut payload = Map::new();
        payload.insert("a".into(), Json::String("1".into()));

        let res = block_on(host.send_message("background", "echo", payload)).unwrap();
        assert_eq!(res.data.get("a"), Some(&Json::String("1".into())));

        let res = block_on(host.send_message("background", "listCommands", Map::new())).unwrap();
        assert_eq!(res.data["commands"], serde_json::json!(["echo"]));

        let res = block_on(host.send_message("tabs", "close", Map::new())).unwrap();
        assert!(res.is_error());
    }

    #[test]
    fn test_null_host_fails() {
        let res = block_on(NullHost.send_message("background", "x", Map::new())).unwrap();
        assert_eq!(res.errors, vec!["no host attached for background:x"]);
    }
}
