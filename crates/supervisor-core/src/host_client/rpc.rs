//! RPC abstraction over the streaming host's control surface.
//!
//! Mirrors the "depend on a trait, not a concrete transport" shape used
//! throughout this codebase's Sonos client: callers hold an
//! `Arc<dyn HostRpc>` so that tests can substitute a fake host without
//! touching a real socket.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::HostRpcError;
use crate::protocol_constants::{
    EVENT_STREAM_STATE_CHANGED, HOST_RPC_TIMEOUT_SECS, RPC_GET_CURRENT_PROGRAM_SCENE,
    RPC_GET_INPUT_SETTINGS, RPC_GET_SCENE_ITEM_ENABLED, RPC_GET_SCENE_ITEM_LIST,
    RPC_GET_STREAM_STATUS, RPC_SET_INPUT_SETTINGS, RPC_SET_SCENE_ITEM_ENABLED, RPC_START_STREAM,
    RPC_STOP_STREAM,
};

/// Settings of a browser source input, as returned by `GetInputSettings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSettings {
    pub url: String,
    #[serde(flatten)]
    pub extra: Value,
}

/// A single item within a scene, as returned by `GetSceneItemList`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItem {
    pub source_name: String,
    pub scene_item_id: i64,
}

/// Current streaming output status, as returned by `GetStreamStatus`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamStatus {
    pub active: bool,
}

/// Abstraction over the host's JSON-RPC control surface.
///
/// Implemented concretely by [`HttpHostRpc`]; consumed everywhere else as
/// a trait object for testability.
#[async_trait]
pub trait HostRpc: Send + Sync {
    /// Opens (or verifies) the underlying connection.
    async fn connect(&self) -> Result<(), HostRpcError>;

    /// Fetches the current settings of a named input (browser source).
    async fn get_input_settings(&self, input_name: &str) -> Result<InputSettings, HostRpcError>;

    /// Overwrites a named input's settings.
    async fn set_input_settings(
        &self,
        input_name: &str,
        settings: InputSettings,
    ) -> Result<(), HostRpcError>;

    /// Returns the name of the currently active scene.
    async fn get_current_program_scene(&self) -> Result<String, HostRpcError>;

    /// Lists the items within a scene.
    async fn get_scene_item_list(&self, scene: &str) -> Result<Vec<SceneItem>, HostRpcError>;

    /// Returns whether a scene item is enabled (visible).
    async fn get_scene_item_enabled(
        &self,
        scene: &str,
        item_id: i64,
    ) -> Result<bool, HostRpcError>;

    /// Sets whether a scene item is enabled (visible).
    async fn set_scene_item_enabled(
        &self,
        scene: &str,
        item_id: i64,
        enabled: bool,
    ) -> Result<(), HostRpcError>;

    /// Fetches the current stream output status.
    async fn get_stream_status(&self) -> Result<StreamStatus, HostRpcError>;

    /// Starts the output stream.
    async fn start_stream(&self) -> Result<(), HostRpcError>;

    /// Stops the output stream.
    async fn stop_stream(&self) -> Result<(), HostRpcError>;

    /// Blocks until the host reports its next `StreamStateChanged` event,
    /// returning the raw `outputState` value (§6).
    ///
    /// The real host protocols this was grounded on push events over a
    /// persistent authenticated WebSocket; since this client deliberately
    /// trades that for plain request/response HTTP (see the module doc),
    /// the event feed is adapted as a long-poll: the call is expected to
    /// hang on the host side until an event is available rather than
    /// returning immediately.
    async fn next_stream_state_event(&self) -> Result<String, HostRpcError>;
}

/// `HostRpc` implementation that speaks JSON-RPC over an HTTP endpoint.
///
/// Real host control protocols (e.g. the one this was grounded on) use a
/// persistent authenticated WebSocket, but the request/response shape is
/// the same "named request + JSON params" contract this client targets;
/// an HTTP POST transport keeps this crate's dependency surface to
/// `reqwest`, already used for the outbound webhook notifier.
pub struct HttpHostRpc {
    endpoint: String,
    password: Option<String>,
    client: reqwest::Client,
    event_client: reqwest::Client,
}

impl HttpHostRpc {
    /// Creates a client targeting `endpoint`, optionally authenticating
    /// with `password`.
    pub fn new(endpoint: impl Into<String>, password: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HOST_RPC_TIMEOUT_SECS))
            .build()
            .expect("failed to build host RPC HTTP client");
        // The event long-poll is expected to hang until the host has
        // something to report, so it cannot share the request/response
        // client's short timeout.
        let event_client = reqwest::Client::builder()
            .build()
            .expect("failed to build host RPC event HTTP client");
        Self {
            endpoint: endpoint.into(),
            password,
            client,
            event_client,
        }
    }

    async fn call(&self, request_type: &str, params: Value) -> Result<Value, HostRpcError> {
        self.call_with(&self.client, request_type, params).await
    }

    async fn call_with(
        &self,
        client: &reqwest::Client,
        request_type: &str,
        params: Value,
    ) -> Result<Value, HostRpcError> {
        let mut body = json!({
            "requestType": request_type,
            "requestData": params,
        });
        if let Some(ref password) = self.password {
            body["password"] = json!(password);
        }

        let response = client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HostRpcError::Timeout(HOST_RPC_TIMEOUT_SECS)
                } else {
                    HostRpcError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(HostRpcError::Rpc(format!(
                "request {} returned status {}",
                request_type,
                response.status()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| HostRpcError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl HostRpc for HttpHostRpc {
    async fn connect(&self) -> Result<(), HostRpcError> {
        self.call(RPC_GET_CURRENT_PROGRAM_SCENE, json!({})).await?;
        Ok(())
    }

    async fn get_input_settings(&self, input_name: &str) -> Result<InputSettings, HostRpcError> {
        let data = self
            .call(RPC_GET_INPUT_SETTINGS, json!({ "inputName": input_name }))
            .await?;
        serde_json::from_value(data).map_err(|e| HostRpcError::MalformedResponse(e.to_string()))
    }

    async fn set_input_settings(
        &self,
        input_name: &str,
        settings: InputSettings,
    ) -> Result<(), HostRpcError> {
        self.call(
            RPC_SET_INPUT_SETTINGS,
            json!({ "inputName": input_name, "inputSettings": settings }),
        )
        .await?;
        Ok(())
    }

    async fn get_current_program_scene(&self) -> Result<String, HostRpcError> {
        let data = self
            .call(RPC_GET_CURRENT_PROGRAM_SCENE, json!({}))
            .await?;
        data.get("sceneName")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| HostRpcError::MalformedResponse("missing sceneName".into()))
    }

    async fn get_scene_item_list(&self, scene: &str) -> Result<Vec<SceneItem>, HostRpcError> {
        let data = self
            .call(RPC_GET_SCENE_ITEM_LIST, json!({ "sceneName": scene }))
            .await?;
        let items = data
            .get("sceneItems")
            .cloned()
            .ok_or_else(|| HostRpcError::MalformedResponse("missing sceneItems".into()))?;
        serde_json::from_value(items).map_err(|e| HostRpcError::MalformedResponse(e.to_string()))
    }

    async fn get_scene_item_enabled(
        &self,
        scene: &str,
        item_id: i64,
    ) -> Result<bool, HostRpcError> {
        let data = self
            .call(
                RPC_GET_SCENE_ITEM_ENABLED,
                json!({ "sceneName": scene, "sceneItemId": item_id }),
            )
            .await?;
        data.get("sceneItemEnabled")
            .and_then(Value::as_bool)
            .ok_or_else(|| HostRpcError::MalformedResponse("missing sceneItemEnabled".into()))
    }

    async fn set_scene_item_enabled(
        &self,
        scene: &str,
        item_id: i64,
        enabled: bool,
    ) -> Result<(), HostRpcError> {
        self.call(
            RPC_SET_SCENE_ITEM_ENABLED,
            json!({ "sceneName": scene, "sceneItemId": item_id, "sceneItemEnabled": enabled }),
        )
        .await?;
        Ok(())
    }

    async fn get_stream_status(&self) -> Result<StreamStatus, HostRpcError> {
        let data = self.call(RPC_GET_STREAM_STATUS, json!({})).await?;
        let active = data
            .get("outputActive")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(StreamStatus { active })
    }

    async fn start_stream(&self) -> Result<(), HostRpcError> {
        self.call(RPC_START_STREAM, json!({})).await?;
        Ok(())
    }

    async fn stop_stream(&self) -> Result<(), HostRpcError> {
        self.call(RPC_STOP_STREAM, json!({})).await?;
        Ok(())
    }

    async fn next_stream_state_event(&self) -> Result<String, HostRpcError> {
        let data = self
            .call_with(&self.event_client, EVENT_STREAM_STATE_CHANGED, json!({}))
            .await?;
        data.get("outputState")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| HostRpcError::MalformedResponse("missing outputState".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_host_rpc_builds_with_timeout() {
        // Constructing the client must not panic even without a reachable
        // endpoint; connection errors surface later, on first call.
        let _client = HttpHostRpc::new("http://127.0.0.1:4455", None);
    }
}
