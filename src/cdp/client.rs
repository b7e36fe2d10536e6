// src/cdp/client.rs

//! Client for an already-running browser's DevTools endpoint.
//!
//! Nothing here launches a browser. The operator starts Chrome with
//! `--remote-debugging-port`, logs into whatever the feed needs, and this
//! client attaches to that session: discovery over the HTTP endpoints,
//! script evaluation over a persistent WebSocket per page.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{AppError, Result};
use crate::models::ChromeConfig;

use super::protocol::{BrowserVersion, PageTab, WsReply};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Discovery-side client over the DevTools HTTP endpoints.
pub struct CdpClient {
    http: reqwest::Client,
    base_url: String,
    evaluate_timeout: Duration,
}

impl CdpClient {
    /// Connect to the DevTools endpoint and verify it answers.
    ///
    /// An unreachable endpoint is a fatal connectivity error: there is
    /// nothing to harvest without a browser.
    pub async fn connect(config: &ChromeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        let client = Self {
            http,
            base_url: config.base_url(),
            evaluate_timeout: Duration::from_secs(config.evaluate_timeout_secs),
        };
        let version = client.version().await?;
        log::info!(
            "Attached to {} at {} (protocol {})",
            version.browser,
            client.base_url,
            version.protocol_version
        );
        Ok(client)
    }

    /// Browser identification from `/json/version`.
    pub async fn version(&self) -> Result<BrowserVersion> {
        let text = self.get_text("/json/version").await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// All debuggable targets from `/json/list`.
    pub async fn pages(&self) -> Result<Vec<PageTab>> {
        let text = self.get_text("/json/list").await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Find the first open page whose URL matches the pattern.
    pub async fn locate(&self, url_pattern: &str) -> Result<Option<PageTab>> {
        let pattern = regex::Regex::new(url_pattern)
            .map_err(|e| AppError::template(format!("url_pattern: {e}")))?;
        let pages = self.pages().await?;
        Ok(match_page(pages, &pattern))
    }

    /// Open a persistent evaluation session against a located page.
    pub async fn open_session(&self, tab: &PageTab) -> Result<CdpSession> {
        let ws_url = tab.ws_url.clone().ok_or_else(|| {
            AppError::connectivity(
                &tab.url,
                "page exposes no webSocketDebuggerUrl (another client attached?)",
            )
        })?;
        log::debug!("Opening DevTools session for {} ({})", tab.title, tab.url);
        CdpSession::connect(ws_url, self.evaluate_timeout).await
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::connectivity(&self.base_url, e))?;
        Ok(response
            .text()
            .await
            .map_err(|e| AppError::connectivity(&self.base_url, e))?)
    }
}

/// Pick the first real page matching the pattern. DevTools' own UI pages
/// match broad patterns and must never be harvested.
fn match_page(pages: Vec<PageTab>, pattern: &regex::Regex) -> Option<PageTab> {
    pages.into_iter().find(|tab| {
        tab.is_page()
            && !tab.url.contains("devtools")
            && tab.ws_url.is_some()
            && pattern.is_match(&tab.url)
    })
}

/// A persistent `Runtime.evaluate` channel to one page.
///
/// Requests are matched to replies by id; interleaved protocol events are
/// skipped. After a transport error the socket is dropped and re-dialed on
/// the next call, so one bad exchange costs one round, not the run.
pub struct CdpSession {
    ws_url: String,
    stream: Option<WsStream>,
    next_id: u64,
    timeout: Duration,
}

impl CdpSession {
    async fn connect(ws_url: String, timeout: Duration) -> Result<Self> {
        let mut session = Self {
            ws_url,
            stream: None,
            next_id: 0,
            timeout,
        };
        session.redial().await?;
        Ok(session)
    }

    async fn redial(&mut self) -> Result<()> {
        let (stream, _) = connect_async(self.ws_url.as_str()).await?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Evaluate a script in the page, returning its JSON value.
    ///
    /// `context` names the operation for error messages and logs.
    pub async fn evaluate(&mut self, context: &str, script: &str) -> Result<serde_json::Value> {
        self.next_id += 1;
        let id = self.next_id;

        if self.stream.is_none() {
            log::debug!("Re-dialing DevTools socket {}", self.ws_url);
            self.redial().await?;
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(AppError::evaluate(context, "socket unavailable"));
        };

        match tokio::time::timeout(self.timeout, exchange(stream, id, context, script)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                // Page-side failures leave the channel usable; transport
                // failures force a re-dial on the next call.
                if !matches!(e, AppError::Evaluate { .. }) {
                    self.stream = None;
                }
                Err(e)
            }
            Err(_) => {
                // An unanswered call leaves the channel out of sync.
                self.stream = None;
                Err(AppError::evaluate(
                    context,
                    format!("no reply within {:?}", self.timeout),
                ))
            }
        }
    }
}

/// One request/reply exchange on the socket.
async fn exchange(
    stream: &mut WsStream,
    id: u64,
    context: &str,
    script: &str,
) -> Result<serde_json::Value> {
    let request = serde_json::json!({
        "id": id,
        "method": "Runtime.evaluate",
        "params": {
            "expression": script,
            "returnByValue": true,
            "awaitPromise": true,
        }
    });
    stream.send(Message::Text(request.to_string())).await?;

    loop {
        let frame = match stream.next().await {
            Some(frame) => frame?,
            None => return Err(AppError::Ws(tungstenite::Error::ConnectionClosed)),
        };
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => return Err(AppError::Ws(tungstenite::Error::ConnectionClosed)),
            _ => continue,
        };

        let reply: WsReply = serde_json::from_str(&text)?;
        let Some(reply_id) = reply.id else {
            // Unsolicited protocol event.
            continue;
        };
        if reply_id != id {
            continue;
        }

        if let Some(error) = reply.error {
            return Err(AppError::evaluate(
                context,
                format!("{} (code {})", error.message, error.code),
            ));
        }

        let result = reply.result.unwrap_or(serde_json::Value::Null);
        if let Some(details) = result.get("exceptionDetails") {
            let description = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or("script raised an exception");
            return Err(AppError::evaluate(context, description));
        }

        return Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(serde_json::Value::Null));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(url: &str, kind: &str, ws: bool) -> PageTab {
        PageTab {
            id: "1".into(),
            title: String::new(),
            url: url.into(),
            kind: kind.into(),
            ws_url: ws.then(|| format!("ws://127.0.0.1:9222/devtools/page/{url}")),
        }
    }

    #[test]
    fn match_page_skips_devtools_and_non_pages() {
        let pattern = regex::Regex::new(r"x\.com").unwrap();
        let pages = vec![
            tab("devtools://devtools/bundled/inspector.html?ws=x.com", "page", true),
            tab("https://x.com/home", "service_worker", true),
            tab("https://x.com/rustlang", "page", true),
        ];
        let found = match_page(pages, &pattern).unwrap();
        assert_eq!(found.url, "https://x.com/rustlang");
    }

    #[test]
    fn match_page_requires_socket_url() {
        let pattern = regex::Regex::new(r"x\.com").unwrap();
        let pages = vec![tab("https://x.com/rustlang", "page", false)];
        assert!(match_page(pages, &pattern).is_none());
    }

    #[test]
    fn match_page_returns_none_without_candidates() {
        let pattern = regex::Regex::new(r"zhihu\.com").unwrap();
        let pages = vec![tab("https://x.com/rustlang", "page", true)];
        assert!(match_page(pages, &pattern).is_none());
    }
}
