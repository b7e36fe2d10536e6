//! DevTools wire types.
//!
//! Only the slices of the protocol this crate touches: the two HTTP
//! discovery endpoints (`/json/version`, `/json/list`) and the
//! `Runtime.evaluate` reply envelope on the WebSocket channel.

use serde::Deserialize;

/// Reply from `/json/version`.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserVersion {
    #[serde(rename = "Browser", default)]
    pub browser: String,

    #[serde(rename = "Protocol-Version", default)]
    pub protocol_version: String,
}

/// One debuggable target from `/json/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct PageTab {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub url: String,

    #[serde(rename = "type", default)]
    pub kind: String,

    /// Absent when another DevTools client is already attached.
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub ws_url: Option<String>,
}

impl PageTab {
    /// Whether this target is an ordinary page (not a worker or extension).
    pub fn is_page(&self) -> bool {
        self.kind == "page"
    }
}

/// One frame received on the DevTools socket. Command replies carry `id`;
/// protocol events carry `method` and no `id`.
#[derive(Debug, Deserialize)]
pub struct WsReply {
    #[serde(default)]
    pub id: Option<u64>,

    #[serde(default)]
    pub result: Option<serde_json::Value>,

    #[serde(default)]
    pub error: Option<WsError>,

    #[serde(default)]
    pub method: Option<String>,
}

/// Protocol-level command failure.
#[derive(Debug, Deserialize)]
pub struct WsError {
    pub code: i64,
    pub message: String,
}
