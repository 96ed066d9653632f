//! Request and response bodies of the stream-creation operations.

use serde::{Deserialize, Serialize};

/// `{"input": {...}}` envelope around an operation's input.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest<T> {
    /// Operation input.
    #[serde(alias = "sal-remote:input")]
    pub input: T,
}

/// `{"sal-remote:output": {...}}` envelope around an operation's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcResponse<T> {
    /// Operation output.
    #[serde(rename = "sal-remote:output")]
    pub output: T,
}

/// Input of `create-data-change-event-subscription`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DataChangeSubscriptionInput {
    /// Instance path to watch, for example `/toaster:toaster`.
    pub path: Option<String>,
    /// `CONFIGURATION` or `OPERATIONAL`, any case.
    #[serde(alias = "sal-remote-augment:datastore")]
    pub datastore: Option<String>,
    /// `BASE`, `ONE` or `SUBTREE`, any case.
    #[serde(alias = "sal-remote-augment:scope")]
    pub scope: Option<String>,
}

/// Output of `create-data-change-event-subscription`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataChangeSubscriptionOutput {
    /// Registered stream name.
    #[serde(rename = "stream-name")]
    pub stream_name: String,
}

/// Input of `create-notification-stream`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NotificationStreamInput {
    /// Notification identifiers, `module:name`.
    #[serde(alias = "notification-type-names")]
    pub notifications: Option<Vec<String>>,
}

/// Output of `create-notification-stream`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationStreamOutput {
    /// Registered stream name.
    #[serde(rename = "notification-stream-identifier")]
    pub notification_stream_identifier: String,
}
