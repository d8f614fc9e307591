//! Chrome DevTools Protocol Transport
//!
//! Speaks the DevTools JSON protocol over the browser-level WebSocket
//! (`ws://host:port/devtools/browser/<id>`). Each attach creates a
//! flattened target session, so every tab gets its own session id on the
//! one shared socket.
//!
//! # Architecture
//!
//! ```text
//! CdpTransport::call ──> sink (Mutex) ──────────────> browser
//!        │                                               │
//!        └── pending[id] <── oneshot ── reader task <────┘
//! ```
//!
//! Commands carry an increasing `id`; the reader task routes each response
//! back to the waiting caller and ignores protocol events. If the socket
//! closes, every waiting caller gets a connection error.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::{Session, TargetId, Transport};
use crate::error::{Error, Result};
use crate::input::KeyEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = HashMap<u64, oneshot::Sender<std::result::Result<Value, CommandError>>>;

/// Failure of a single DevTools command
#[derive(Error, Debug, Clone)]
enum CommandError {
    #[error("{method} failed ({code}): {message}")]
    Protocol {
        method: String,
        code: i64,
        message: String,
    },

    #[error("{0}")]
    Connection(String),

    #[error("{0} timed out")]
    Timeout(String),
}

impl CommandError {
    /// Map to the crate error, wrapping protocol failures with `context`
    fn into_error(self, context: fn(String) -> Error) -> Error {
        match self {
            CommandError::Protocol { .. } => context(self.to_string()),
            CommandError::Connection(message) => Error::Connection(message),
            CommandError::Timeout(method) => Error::Timeout(method),
        }
    }
}

/// Page target as reported by `Target.getTargets`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Target identifier
    pub target_id: String,
    /// Target type (`page`, `iframe`, `service_worker`, ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// Document title
    #[serde(default)]
    pub title: String,
    /// Document URL
    #[serde(default)]
    pub url: String,
    /// Whether some client is already attached
    #[serde(default)]
    pub attached: bool,
}

impl TargetInfo {
    /// Whether this target is a top-level page (tab)
    pub fn is_page(&self) -> bool {
        self.kind == "page"
    }
}

struct Connection {
    sink: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    pending: Mutex<PendingMap>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// DevTools transport over one browser WebSocket
pub struct CdpTransport {
    endpoint: String,
    conn: Arc<Connection>,
    reader: JoinHandle<()>,
    command_timeout: Duration,
}

impl CdpTransport {
    /// Connect to the browser-level DevTools endpoint
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the WebSocket handshake fails.
    pub async fn connect(endpoint: &str, command_timeout: Duration) -> Result<Self> {
        info!("Connecting to DevTools endpoint {}", endpoint);

        let (stream, _response) = connect_async(endpoint)
            .await
            .map_err(|e| Error::Connection(format!("{}: {}", endpoint, e)))?;

        let (sink, source) = stream.split();
        let conn = Arc::new(Connection {
            sink: tokio::sync::Mutex::new(sink),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        });

        let reader = tokio::spawn(read_loop(source, Arc::clone(&conn)));

        Ok(Self {
            endpoint: endpoint.to_string(),
            conn,
            reader,
            command_timeout,
        })
    }

    /// Endpoint this transport is connected to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// List page targets
    pub async fn list_targets(&self) -> Result<Vec<TargetInfo>> {
        let result = self
            .call("Target.getTargets", json!({}), None)
            .await
            .map_err(|e| e.into_error(Error::Connection))?;

        let infos: Vec<TargetInfo> = serde_json::from_value(
            result.get("targetInfos").cloned().unwrap_or(Value::Array(vec![])),
        )
        .map_err(|e| Error::Connection(format!("unexpected Target.getTargets reply: {}", e)))?;

        Ok(infos.into_iter().filter(TargetInfo::is_page).collect())
    }

    async fn resolve(&self, target: &TargetId) -> Result<TargetInfo> {
        let pages = self.list_targets().await?;

        let found = if target.is_first_page() {
            pages.into_iter().next()
        } else {
            pages
                .into_iter()
                .find(|info| info.target_id == target.as_str())
        };

        found.ok_or_else(|| Error::TargetUnavailable(target.to_string()))
    }

    async fn call(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> std::result::Result<Value, CommandError> {
        if self.conn.closed.load(Ordering::Acquire) {
            return Err(CommandError::Connection("DevTools socket is closed".to_string()));
        }

        let id = self.conn.next_id.fetch_add(1, Ordering::Relaxed);
        let mut command = json!({ "id": id, "method": method, "params": params });
        if let Some(session_id) = session_id {
            command["sessionId"] = Value::String(session_id.to_string());
        }

        let (tx, rx) = oneshot::channel();
        self.conn.pending.lock().insert(id, tx);

        trace!("CDP -> {}", command);
        let sent = self
            .conn
            .sink
            .lock()
            .await
            .send(Message::Text(command.to_string()))
            .await;

        if let Err(e) = sent {
            self.conn.pending.lock().remove(&id);
            return Err(CommandError::Connection(format!("write failed: {}", e)));
        }

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(CommandError::Connection(
                "DevTools socket closed before reply".to_string(),
            )),
            Err(_) => {
                self.conn.pending.lock().remove(&id);
                Err(CommandError::Timeout(method.to_string()))
            }
        }
    }
}

impl Drop for CdpTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl Transport for CdpTransport {
    fn name(&self) -> &'static str {
        "cdp"
    }

    async fn attach(&self, target: &TargetId) -> Result<Session> {
        let info = self.resolve(target).await?;

        let result = self
            .call(
                "Target.attachToTarget",
                json!({ "targetId": info.target_id, "flatten": true }),
                None,
            )
            .await
            .map_err(|e| e.into_error(Error::AttachFailed))?;

        let session_id = result
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::AttachFailed("reply carried no sessionId".to_string()))?;

        info!(
            "Attached to target {} ({}) as session {}",
            info.target_id, info.url, session_id
        );

        Ok(Session {
            target: TargetId::new(info.target_id),
            id: session_id.to_string(),
        })
    }

    async fn send(&self, session: &Session, event: &KeyEvent) -> Result<()> {
        let params = serde_json::to_value(event)
            .map_err(|e| Error::SendFailed(format!("cannot encode event: {}", e)))?;

        self.call(KeyEvent::METHOD, params, Some(&session.id))
            .await
            .map(|_| ())
            .map_err(|e| e.into_error(Error::SendFailed))
    }

    async fn detach(&self, session: &Session) {
        let result = self
            .call(
                "Target.detachFromTarget",
                json!({ "sessionId": session.id }),
                None,
            )
            .await;

        match result {
            Ok(_) => debug!("Detached session {}", session.id),
            Err(e) => warn!("Detach of session {} failed (ignored): {}", session.id, e),
        }
    }
}

async fn read_loop(mut source: SplitStream<WsStream>, conn: Arc<Connection>) {
    while let Some(frame) = source.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("DevTools socket error: {}", e);
                break;
            }
        };

        match parse_reply(&text) {
            Some((id, reply)) => {
                if let Some(waiter) = conn.pending.lock().remove(&id) {
                    let _ = waiter.send(reply);
                }
            }
            None => trace!("CDP <- event {}", text),
        }
    }

    conn.closed.store(true, Ordering::Release);
    let waiters: Vec<_> = conn.pending.lock().drain().collect();
    for (_, waiter) in waiters {
        let _ = waiter.send(Err(CommandError::Connection(
            "DevTools socket closed".to_string(),
        )));
    }
    info!("DevTools connection closed");
}

/// Split a frame into `(id, reply)`; `None` for events and garbage
fn parse_reply(text: &str) -> Option<(u64, std::result::Result<Value, CommandError>)> {
    let value: Value = serde_json::from_str(text).ok()?;
    let id = value.get("id")?.as_u64()?;

    if let Some(error) = value.get("error") {
        return Some((
            id,
            Err(CommandError::Protocol {
                method: format!("command {}", id),
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            }),
        ));
    }

    Some((id, Ok(value.get("result").cloned().unwrap_or(Value::Null))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{KeyEventType, Modifier};

    #[test]
    fn test_parse_result_reply() {
        let (id, reply) = parse_reply(r#"{"id":7,"result":{"sessionId":"S1"}}"#).unwrap();
        assert_eq!(id, 7);
        assert_eq!(reply.unwrap()["sessionId"], "S1");
    }

    #[test]
    fn test_parse_error_reply() {
        let (id, reply) =
            parse_reply(r#"{"id":3,"error":{"code":-32000,"message":"No target with given id"}}"#)
                .unwrap();
        assert_eq!(id, 3);
        match reply {
            Err(CommandError::Protocol { code, message, .. }) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "No target with given id");
            }
            other => panic!("Expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_events_are_not_replies() {
        assert!(parse_reply(r#"{"method":"Target.targetCreated","params":{}}"#).is_none());
        assert!(parse_reply("not json").is_none());
    }

    #[test]
    fn test_command_error_mapping() {
        let protocol = CommandError::Protocol {
            method: "Input.dispatchKeyEvent".to_string(),
            code: -32602,
            message: "Invalid parameters".to_string(),
        };
        assert!(matches!(protocol.into_error(Error::SendFailed), Error::SendFailed(_)));

        let timeout = CommandError::Timeout("Target.attachToTarget".to_string());
        assert!(matches!(timeout.into_error(Error::AttachFailed), Error::Timeout(_)));
    }

    #[test]
    fn test_target_info_parse() {
        let infos: Vec<TargetInfo> = serde_json::from_str(
            r#"[
                {"targetId":"A","type":"page","title":"Docs","url":"https://example.com","attached":false},
                {"targetId":"B","type":"service_worker","title":"","url":"","attached":false}
            ]"#,
        )
        .unwrap();

        let pages: Vec<_> = infos.into_iter().filter(TargetInfo::is_page).collect();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].target_id, "A");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let result = CdpTransport::connect("ws://127.0.0.1:1/devtools/browser", Duration::from_millis(200)).await;
        assert!(matches!(result, Err(Error::Connection(_))));
    }

    mod browser {
        //! Scripted DevTools peer on a loopback socket

        use super::*;
        use tokio::net::TcpListener;

        /// What the peer does with one command
        pub enum Action {
            Reply(Value),
            Silent,
            Close,
        }

        pub type Script = fn(&Value) -> Action;

        /// Serve one connection; returns the endpoint and every command received
        pub async fn spawn(script: Script) -> (String, Arc<Mutex<Vec<Value>>>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let endpoint = format!(
                "ws://{}/devtools/browser/test",
                listener.local_addr().unwrap()
            );
            let received = Arc::new(Mutex::new(Vec::new()));
            let log = Arc::clone(&received);

            tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

                while let Some(Ok(frame)) = ws.next().await {
                    let Message::Text(text) = frame else {
                        continue;
                    };
                    let command: Value = serde_json::from_str(&text).unwrap();
                    log.lock().push(command.clone());

                    match script(&command) {
                        Action::Reply(result) => {
                            // Unsolicited events interleave with replies
                            let event = json!({ "method": "Target.targetInfoChanged", "params": {} });
                            ws.send(Message::Text(event.to_string())).await.unwrap();
                            let reply = json!({ "id": command["id"], "result": result });
                            ws.send(Message::Text(reply.to_string())).await.unwrap();
                        }
                        Action::Silent => {}
                        Action::Close => {
                            let _ = ws.close(None).await;
                            break;
                        }
                    }
                }
            });

            (endpoint, received)
        }

        /// One page `T1` plus a worker; attaching yields session `S1`
        pub fn one_page(command: &Value) -> Action {
            match command["method"].as_str().unwrap_or_default() {
                "Target.getTargets" => Action::Reply(json!({
                    "targetInfos": [
                        {"targetId": "W1", "type": "service_worker", "title": "", "url": ""},
                        {"targetId": "T1", "type": "page", "title": "Docs", "url": "https://example.com"}
                    ]
                })),
                "Target.attachToTarget" => Action::Reply(json!({ "sessionId": "S1" })),
                _ => Action::Reply(json!({})),
            }
        }
    }

    fn session() -> Session {
        Session {
            target: TargetId::new("T1"),
            id: "S1".to_string(),
        }
    }

    fn shifted_a() -> KeyEvent {
        KeyEvent::new(KeyEventType::Char, "A", "KeyA", Modifier::Shift.into()).with_text("A")
    }

    #[tokio::test]
    async fn test_attach_and_send_route_through_session() {
        let (endpoint, received) = browser::spawn(browser::one_page).await;
        let transport = CdpTransport::connect(&endpoint, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(transport.endpoint(), endpoint);

        let pages = transport.list_targets().await.unwrap();
        assert_eq!(pages.len(), 1);

        let session = transport.attach(&TargetId::default()).await.unwrap();
        assert_eq!(session.id, "S1");
        assert_eq!(session.target, TargetId::new("T1"));

        transport.send(&session, &shifted_a()).await.unwrap();
        transport.detach(&session).await;

        let missing = transport.attach(&TargetId::new("T9")).await;
        assert_eq!(missing, Err(Error::TargetUnavailable("T9".to_string())));

        let commands = received.lock().clone();
        let methods: Vec<_> = commands
            .iter()
            .map(|c| c["method"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            methods,
            vec![
                "Target.getTargets",
                "Target.getTargets",
                "Target.attachToTarget",
                "Input.dispatchKeyEvent",
                "Target.detachFromTarget",
                "Target.getTargets",
            ]
        );

        // Every command got its own id
        let mut ids: Vec<_> = commands.iter().map(|c| c["id"].as_u64().unwrap()).collect();
        ids.dedup();
        assert_eq!(ids.len(), commands.len());

        assert_eq!(commands[2]["params"], json!({"targetId": "T1", "flatten": true}));
        assert!(commands[2].get("sessionId").is_none());

        assert_eq!(commands[3]["sessionId"], "S1");
        assert_eq!(
            commands[3]["params"],
            json!({"type": "char", "modifiers": 8, "key": "A", "code": "KeyA", "text": "A"})
        );

        assert_eq!(commands[4]["params"], json!({"sessionId": "S1"}));
    }

    #[tokio::test]
    async fn test_silent_browser_times_out() {
        fn ignore_keys(command: &Value) -> browser::Action {
            match command["method"].as_str() {
                Some(KeyEvent::METHOD) => browser::Action::Silent,
                _ => browser::one_page(command),
            }
        }

        let (endpoint, _) = browser::spawn(ignore_keys).await;
        let transport = CdpTransport::connect(&endpoint, Duration::from_millis(100))
            .await
            .unwrap();

        let result = transport.send(&session(), &shifted_a()).await;
        assert_eq!(result, Err(Error::Timeout(KeyEvent::METHOD.to_string())));
        assert!(transport.conn.pending.lock().is_empty());

        // The connection stays usable after a timeout
        assert_eq!(transport.list_targets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_socket_close_fails_pending_and_later_commands() {
        fn hang_up_on_keys(command: &Value) -> browser::Action {
            match command["method"].as_str() {
                Some(KeyEvent::METHOD) => browser::Action::Close,
                _ => browser::one_page(command),
            }
        }

        let (endpoint, _) = browser::spawn(hang_up_on_keys).await;
        let transport = CdpTransport::connect(&endpoint, Duration::from_secs(5))
            .await
            .unwrap();

        let session = transport.attach(&TargetId::new("T1")).await.unwrap();

        let pending = transport.send(&session, &shifted_a()).await;
        assert!(matches!(pending, Err(Error::Connection(_))));

        let later = tokio::time::timeout(Duration::from_millis(500), transport.list_targets())
            .await
            .expect("command on a closed socket should fail at once");
        assert!(matches!(later, Err(Error::Connection(_))));

        // Detach on a dead socket is swallowed
        transport.detach(&session).await;
    }
}
