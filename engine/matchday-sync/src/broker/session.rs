//! STOMP 1.2 session over TCP

use super::frame::{Command, Frame, StompCodec, StompItem};
use super::{BrokerListener, BrokerSession, Connector};
use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use async_trait::async_trait;
use futures_util::{FutureExt, SinkExt, StreamExt};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Interval, MissedTickBehavior};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, trace, warn};

/// How long `disconnect` waits for the DISCONNECT frame to go out
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens STOMP sessions with the configured broker
pub struct StompConnector {
    config: BrokerConfig,
}

impl StompConnector {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for StompConnector {
    async fn connect(&self) -> BrokerResult<Arc<dyn BrokerSession>> {
        let session = StompSession::connect(&self.config).await?;
        Ok(Arc::new(session))
    }
}

/// Negotiated heartbeat intervals; `None` means disabled in that direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub send: Option<Duration>,
    pub receive: Option<Duration>,
}

/// Combine our `heart-beat` wish with the broker's reply.
///
/// We send every max(cx, sy) and expect data every max(cy, sx); zero on either side disables
/// that direction.
pub fn negotiate_heartbeat(send_ms: u64, receive_ms: u64, server: Option<&str>) -> Heartbeat {
    let (sx, sy) = server
        .and_then(|value| value.split_once(','))
        .map(|(sx, sy)| (sx.trim().parse().unwrap_or(0u64), sy.trim().parse().unwrap_or(0u64)))
        .unwrap_or((0, 0));

    let pick = |ours: u64, theirs: u64| {
        (ours != 0 && theirs != 0).then(|| Duration::from_millis(ours.max(theirs)))
    };

    Heartbeat { send: pick(send_ms, sy), receive: pick(receive_ms, sx) }
}

enum Outbound {
    Frame(Frame, oneshot::Sender<BrokerResult<()>>),
    Close(oneshot::Sender<()>),
}

/// State shared with the reader task
struct Shared {
    listener: RwLock<Option<Arc<dyn BrokerListener>>>,
    connected: AtomicBool,
    closing: AtomicBool,
}

pub struct StompSession {
    outbound: mpsc::UnboundedSender<Outbound>,
    shared: Arc<Shared>,
    subscriptions: Mutex<HashSet<String>>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl StompSession {
    /// Open the TCP connection and complete the CONNECT handshake
    pub async fn connect(config: &BrokerConfig) -> BrokerResult<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        debug!("Connecting to broker at {}", addr);

        let stream = timeout(config.connect_timeout(), TcpStream::connect(&addr))
            .await
            .map_err(|_| BrokerError::timeout(format!("connecting to {addr}")))??;
        let (read_half, write_half) = stream.into_split();

        let mut reader = FramedRead::new(read_half, StompCodec);
        let mut writer = FramedWrite::new(write_half, StompCodec);

        let connect = Frame::new(Command::Connect)
            .header("accept-version", "1.2")
            .header("host", config.host.as_str())
            .header("login", config.user.as_str())
            .header("passcode", config.password.as_str())
            .header(
                "heart-beat",
                format!("{},{}", config.heartbeat_send_ms, config.heartbeat_receive_ms),
            );
        writer.send(StompItem::Frame(connect)).await?;

        let reply = timeout(config.connect_timeout(), next_frame(&mut reader))
            .await
            .map_err(|_| BrokerError::timeout(format!("waiting for CONNECTED from {addr}")))??;

        match reply.command {
            Command::Connected => {}
            Command::Error => {
                let message = reply
                    .get_header("message")
                    .map(str::to_string)
                    .unwrap_or_else(|| reply.body_text().into_owned());
                return Err(BrokerError::Rejected(message));
            }
            other => {
                return Err(BrokerError::protocol(format!(
                    "expected CONNECTED, got {}",
                    other.as_str()
                )))
            }
        }

        let heartbeat = negotiate_heartbeat(
            config.heartbeat_send_ms,
            config.heartbeat_receive_ms,
            reply.get_header("heart-beat"),
        );
        info!(
            "Connected to broker at {} (heartbeat out: {:?}, in: {:?})",
            addr, heartbeat.send, heartbeat.receive
        );

        let shared = Arc::new(Shared {
            listener: RwLock::new(None),
            connected: AtomicBool::new(true),
            closing: AtomicBool::new(false),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_loop(writer, rx, heartbeat.send));
        let reader_task =
            tokio::spawn(read_loop(reader, shared.clone(), heartbeat.receive.map(|d| d * 2)));

        Ok(Self {
            outbound: tx,
            shared,
            subscriptions: Mutex::new(HashSet::new()),
            reader_task,
            writer_task,
        })
    }

    async fn submit(&self, frame: Frame) -> BrokerResult<()> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }

        let (done_tx, done_rx) = oneshot::channel();
        self.outbound
            .send(Outbound::Frame(frame, done_tx))
            .map_err(|_| BrokerError::NotConnected)?;

        done_rx.await.map_err(|_| BrokerError::NotConnected)?
    }
}

#[async_trait]
impl BrokerSession for StompSession {
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn set_listener(&self, listener: Arc<dyn BrokerListener>) {
        *self.shared.listener.write().await = Some(listener);
    }

    async fn subscribe(&self, destination: &str) -> BrokerResult<()> {
        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.contains(destination) {
            debug!("Already subscribed to {}", destination);
            return Ok(());
        }

        let frame = Frame::new(Command::Subscribe)
            .header("id", destination)
            .header("destination", destination)
            .header("ack", "auto");
        self.submit(frame).await?;

        subscriptions.insert(destination.to_string());
        info!("Subscribed to {}", destination);
        Ok(())
    }

    async fn send(
        &self,
        destination: &str,
        headers: Vec<(String, String)>,
        body: String,
    ) -> BrokerResult<()> {
        let mut frame = Frame::new(Command::Send).header("destination", destination);
        frame.headers.extend(headers);
        self.submit(frame.with_body(body)).await
    }

    async fn disconnect(&self) -> BrokerResult<()> {
        self.shared.closing.store(true, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);

        let (done_tx, done_rx) = oneshot::channel();
        if self.outbound.send(Outbound::Close(done_tx)).is_ok()
            && timeout(CLOSE_TIMEOUT, done_rx).await.is_err()
        {
            warn!("Timed out sending DISCONNECT to broker");
        }

        self.reader_task.abort();
        info!("Disconnected from broker");
        Ok(())
    }
}

impl Drop for StompSession {
    fn drop(&mut self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

/// Next real frame, skipping heartbeats
async fn next_frame(reader: &mut FramedRead<OwnedReadHalf, StompCodec>) -> BrokerResult<Frame> {
    loop {
        match reader.next().await {
            Some(Ok(StompItem::Heartbeat)) => continue,
            Some(Ok(StompItem::Frame(frame))) => return Ok(frame),
            Some(Err(e)) => return Err(e),
            None => {
                return Err(BrokerError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "broker closed the connection",
                )))
            }
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn write_loop(
    mut writer: FramedWrite<OwnedWriteHalf, StompCodec>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    send_every: Option<Duration>,
) {
    let mut ticker = send_every.map(|every| {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        let outbound = tokio::select! {
            outbound = rx.recv() => outbound,
            _ = tick(&mut ticker) => {
                if let Err(e) = writer.send(StompItem::Heartbeat).await {
                    warn!("Failed to send heartbeat: {}", e);
                    break;
                }
                continue;
            }
        };

        match outbound {
            Some(Outbound::Frame(frame, done)) => {
                let result = writer.send(StompItem::Frame(frame)).await;
                let failed = result.is_err();
                let _ = done.send(result);
                if failed {
                    break;
                }
            }
            Some(Outbound::Close(done)) => {
                let disconnect = Frame::new(Command::Disconnect).header("receipt", "disconnect");
                if let Err(e) = writer.send(StompItem::Frame(disconnect)).await {
                    debug!("DISCONNECT not delivered: {}", e);
                }
                let _ = done.send(());
                break;
            }
            None => break,
        }
    }
}

/// Deliver inbound frames until the connection ends, then report an unrequested drop.
///
/// A panic while receiving (codec or listener callback) counts as a dropped connection.
async fn read_loop(
    mut reader: FramedRead<OwnedReadHalf, StompCodec>,
    shared: Arc<Shared>,
    deadline: Option<Duration>,
) {
    let received = AssertUnwindSafe(receive(&mut reader, &shared, deadline)).catch_unwind().await;
    if received.is_err() {
        error!("Broker reader panicked, dropping the connection");
    }

    shared.connected.store(false, Ordering::SeqCst);
    if shared.closing.load(Ordering::SeqCst) {
        return;
    }

    let listener = shared.listener.read().await.clone();
    if let Some(listener) = listener {
        listener.on_disconnected().await;
    }
}

async fn receive(
    reader: &mut FramedRead<OwnedReadHalf, StompCodec>,
    shared: &Shared,
    deadline: Option<Duration>,
) {
    loop {
        let next = match deadline {
            Some(limit) => match timeout(limit, reader.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!("Nothing received from broker for {:?}, heartbeat lost", limit);
                    break;
                }
            },
            None => reader.next().await,
        };

        match next {
            Some(Ok(StompItem::Heartbeat)) => trace!("Heartbeat from broker"),
            Some(Ok(StompItem::Frame(frame))) => dispatch(shared, frame).await,
            Some(Err(e)) => {
                error!("Broker connection error: {}", e);
                break;
            }
            None => {
                info!("Broker closed the connection");
                break;
            }
        }
    }
}

async fn dispatch(shared: &Shared, frame: Frame) {
    let listener = shared.listener.read().await.clone();

    match frame.command {
        Command::Message => {
            let destination = frame.get_header("destination").unwrap_or_default();
            match listener {
                Some(listener) => listener.on_message(destination, &frame.body_text()).await,
                None => debug!("No listener for message on {}", destination),
            }
        }
        Command::Error => {
            let message = frame.get_header("message").unwrap_or_default();
            match listener {
                Some(listener) => listener.on_error(message, &frame.body_text()).await,
                None => error!("Broker error: {} {}", message, frame.body_text()),
            }
        }
        Command::Receipt => debug!("Receipt {:?}", frame.get_header("receipt-id")),
        other => debug!("Ignoring {} frame from broker", other.as_str()),
    }
}
