//! Async TCP client for the manager interface.
//!
//! A background reader task decodes inbound blocks, completes pending
//! actions by `ActionID` and forwards events to the registered listeners.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::codec::{encode_action, parse_banner, Message, MessageDecoder};
use crate::connection::{AmiConnection, EventListener, ListenerId, ListenerSet};
use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{ActionId, ActionRequest, Response};

type PendingMap = DashMap<ActionId, oneshot::Sender<Response>>;

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
}

impl ClientConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5038,
            connect_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(10),
        }
    }
}

struct Transport {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    reader: JoinHandle<()>,
}

/// TCP implementation of [`AmiConnection`].
pub struct AmiClient {
    config: ClientConfig,
    id_prefix: String,
    id_counter: AtomicU64,
    listeners: Arc<ListenerSet>,
    pending: Arc<PendingMap>,
    transport: Mutex<Option<Arc<Transport>>>,
    banner: RwLock<Option<String>>,
}

impl AmiClient {
    pub fn new(config: ClientConfig) -> Self {
        let mut id_prefix = uuid::Uuid::new_v4().simple().to_string();
        id_prefix.truncate(8);

        Self {
            config,
            id_prefix,
            id_counter: AtomicU64::new(0),
            listeners: Arc::new(ListenerSet::new()),
            pending: Arc::new(DashMap::new()),
            transport: Mutex::new(None),
            banner: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Protocol version announced by the server on the last connect.
    pub fn banner(&self) -> Option<String> {
        self.banner.read().clone()
    }

    fn transport(&self) -> ProtocolResult<Arc<Transport>> {
        self.transport
            .lock()
            .clone()
            .ok_or(ProtocolError::NotConnected)
    }
}

#[async_trait]
impl AmiConnection for AmiClient {
    async fn connect(&self) -> ProtocolResult<()> {
        let addr = self.config.addr();
        let timeout_ms = self.config.connect_timeout.as_millis() as u64;

        let stream = match tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(&addr),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ProtocolError::Connect { addr, source }),
            Err(_) => return Err(ProtocolError::ConnectTimeout { addr, timeout_ms }),
        };

        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut buf = Vec::new();

        let banner = next_line(&mut reader, &mut buf);
        let greeting = match tokio::time::timeout(self.config.connect_timeout, banner).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => return Err(ProtocolError::ConnectionClosed),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ProtocolError::ConnectTimeout { addr, timeout_ms }),
        };
        let version = parse_banner(&greeting)
            .ok_or_else(|| ProtocolError::UnexpectedBanner(greeting.clone()))?
            .to_string();

        info!(addr = %addr, version = %version, "Connected to Asterisk manager");
        *self.banner.write() = Some(version);

        let reader = tokio::spawn(read_loop(
            reader,
            self.listeners.clone(),
            self.pending.clone(),
        ));
        let transport = Arc::new(Transport {
            writer: tokio::sync::Mutex::new(write_half),
            reader,
        });

        if let Some(previous) = self.transport.lock().replace(transport) {
            previous.reader.abort();
        }
        Ok(())
    }

    async fn disconnect(&self) {
        let transport = self.transport.lock().take();
        if let Some(transport) = transport {
            transport.reader.abort();
            if let Err(e) = transport.writer.lock().await.shutdown().await {
                debug!(error = %e, "Error while shutting down AMI socket");
            }
            debug!(addr = %self.config.addr(), "Disconnected from Asterisk manager");
        }
        self.pending.clear();
    }

    async fn login(&self, username: &str, secret: &str) -> ProtocolResult<Option<Response>> {
        let action = ActionRequest::new("Login")
            .header("Username", username)
            .header("Secret", secret);
        self.send_action(action, self.config.response_timeout).await
    }

    async fn logoff(&self) -> ProtocolResult<()> {
        let result = self
            .send_action(ActionRequest::new("Logoff"), self.config.response_timeout)
            .await;
        self.disconnect().await;
        result.map(|_| ())
    }

    async fn send_action(
        &self,
        mut action: ActionRequest,
        timeout: Duration,
    ) -> ProtocolResult<Option<Response>> {
        let transport = self.transport()?;
        if transport.reader.is_finished() {
            return Err(ProtocolError::ConnectionClosed);
        }

        let action_id = match action.action_id() {
            Some(id) => id.to_string(),
            None => {
                let id = self.next_action_id();
                action.set_action_id(id.clone());
                id
            }
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(action_id.clone(), tx);

        trace!(action = action.name(), action_id = %action_id, "Sending action");
        let frame = encode_action(&action);
        let written = {
            let mut writer = transport.writer.lock().await;
            match writer.write_all(frame.as_bytes()).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            self.pending.remove(&action_id);
            return Err(e.into());
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(Some(response)),
            Ok(Err(_)) => Err(ProtocolError::ConnectionClosed),
            Err(_) => {
                self.pending.remove(&action_id);
                debug!(action = action.name(), action_id = %action_id, "No response before timeout");
                Ok(None)
            }
        }
    }

    fn add_event_listener(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn clear_event_listeners(&self) {
        self.listeners.clear();
    }

    fn next_action_id(&self) -> ActionId {
        let n = self.id_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{}", self.id_prefix, n)
    }

    fn is_event_loop_alive(&self) -> bool {
        self.transport
            .lock()
            .as_ref()
            .is_some_and(|transport| !transport.reader.is_finished())
    }

    fn response_timeout(&self) -> Duration {
        self.config.response_timeout
    }
}

/// Read one line, decoding invalid UTF-8 lossily. The manager passes
/// channel variables through untouched, so Latin-1 values do occur.
async fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

async fn read_loop(
    mut reader: BufReader<OwnedReadHalf>,
    listeners: Arc<ListenerSet>,
    pending: Arc<PendingMap>,
) {
    let mut decoder = MessageDecoder::new();
    let mut buf = Vec::new();

    loop {
        match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => match decoder.push_line(&line) {
                Some(Message::Event(event)) => listeners.dispatch(&event),
                Some(Message::Response(response)) => route_response(&pending, response),
                None => {}
            },
            Ok(None) => {
                warn!("AMI connection closed by peer");
                break;
            }
            Err(e) => {
                warn!(error = %e, "AMI read failed");
                break;
            }
        }
    }

    // Dropping the senders wakes every waiter with ConnectionClosed.
    pending.clear();
}

fn route_response(pending: &PendingMap, response: Response) {
    let Some(action_id) = response.action_id().map(str::to_string) else {
        debug!(status = %response.status(), "Dropping response without ActionID");
        return;
    };

    match pending.remove(&action_id) {
        Some((_, tx)) => {
            let _ = tx.send(response);
        }
        None => debug!(action_id = %action_id, "Dropping response for unknown action"),
    }
}
