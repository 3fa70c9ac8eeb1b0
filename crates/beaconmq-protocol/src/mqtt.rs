//! MQTT 3.1.1 transport over TCP.
//!
//! A reader task owns the socket's read half and forwards decoded packets
//! through a channel; everything else happens on the caller's task. QoS 0
//! only, clean sessions only.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, trace, warn};

use crate::error::{PacketError, TransportError};
use crate::packet::{is_publish, Connect, Packet, SUBACK_FAILURE};
use crate::transport::{BrokerTransport, ConnectOptions, InboundMessage};
use crate::MAX_MESSAGE_SIZE;

/// Bound on the wait for CONNACK/SUBACK when keep-alive is disabled.
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// An MQTT client connection.
pub struct MqttTransport {
    max_message_size: usize,
    session: Option<Session>,
    pending: VecDeque<InboundMessage>,
    next_packet_id: u16,
}

struct Session {
    writer: OwnedWriteHalf,
    packets: mpsc::Receiver<Packet>,
    reader: JoinHandle<()>,
    alive: Arc<AtomicBool>,
    keep_alive: Duration,
    last_sent: Instant,
    ping_sent_at: Option<Instant>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl Default for MqttTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttTransport {
    pub fn new() -> Self {
        Self::with_max_message_size(MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            session: None,
            pending: VecDeque::new(),
            next_packet_id: 0,
        }
    }

    fn allocate_packet_id(&mut self) -> u16 {
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        self.next_packet_id
    }

    /// Move everything the reader task has delivered into `pending`.
    fn drain_packets(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        while let Ok(packet) = session.packets.try_recv() {
            match packet {
                Packet::Publish { topic, payload } => {
                    self.pending.push_back(InboundMessage { topic, payload });
                }
                Packet::PingResp => session.ping_sent_at = None,
                other => trace!(?other, "ignoring packet"),
            }
        }
    }

    async fn write_packet(&mut self, packet: &Packet) -> Result<(), TransportError> {
        let session = self.session.as_mut().ok_or(TransportError::NotConnected)?;
        let bytes = packet.encode()?;
        if let Err(e) = session.writer.write_all(&bytes).await {
            session.alive.store(false, Ordering::SeqCst);
            return Err(TransportError::Io(e));
        }
        session.last_sent = Instant::now();
        Ok(())
    }
}

#[async_trait]
impl BrokerTransport for MqttTransport {
    async fn connect(&mut self, options: &ConnectOptions) -> Result<(), TransportError> {
        self.disconnect().await;
        self.pending.clear();

        let response_timeout = response_timeout(options.keep_alive);
        let stream = timeout(
            response_timeout,
            TcpStream::connect((options.host.as_str(), options.port)),
        )
        .await
        .map_err(|_| TransportError::Timeout("TCP connect"))?
        .map_err(|e| TransportError::Connection(e.to_string()))?;
        stream.set_nodelay(true)?;

        let (mut read_half, mut writer) = stream.into_split();

        let connect = Packet::Connect(Connect {
            client_id: options.client_id.clone(),
            username: options.credentials.username().map(str::to_string),
            password: options.credentials.password().map(str::to_string),
            keep_alive_secs: u16::try_from(options.keep_alive.as_secs()).unwrap_or(u16::MAX),
        });
        writer.write_all(&connect.encode()?).await?;

        let mut buf = Vec::with_capacity(256);
        let connack = timeout(
            response_timeout,
            read_packet(&mut read_half, &mut buf, self.max_message_size),
        )
        .await
        .map_err(|_| TransportError::Timeout("CONNACK"))??;

        match connack {
            Packet::ConnAck { return_code: 0, .. } => {}
            Packet::ConnAck { return_code, .. } => return Err(TransportError::Refused(return_code)),
            other => {
                return Err(TransportError::Connection(format!(
                    "expected CONNACK, got {other:?}"
                )))
            }
        }

        let alive = Arc::new(AtomicBool::new(true));
        let (packet_tx, packets) = mpsc::channel(64);
        let reader = tokio::spawn(reader_loop(
            read_half,
            buf,
            self.max_message_size,
            packet_tx,
            alive.clone(),
        ));

        self.session = Some(Session {
            writer,
            packets,
            reader,
            alive,
            keep_alive: options.keep_alive,
            last_sent: Instant::now(),
            ping_sent_at: None,
        });

        info!(host = %options.host, port = options.port, client_id = %options.client_id, "connected to broker");
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let packet_id = self.allocate_packet_id();
        self.write_packet(&Packet::Subscribe {
            packet_id,
            topic: topic.to_string(),
        })
        .await?;

        let session = self.session.as_mut().ok_or(TransportError::NotConnected)?;
        let wait = response_timeout(session.keep_alive);
        let deadline = Instant::now() + wait;
        loop {
            let packet = tokio::time::timeout_at(deadline, session.packets.recv())
                .await
                .map_err(|_| TransportError::Timeout("SUBACK"))?;
            match packet {
                Some(Packet::SubAck {
                    packet_id: id,
                    return_codes,
                }) if id == packet_id => {
                    if return_codes.contains(&SUBACK_FAILURE) {
                        return Err(TransportError::SubscribeRejected(topic.to_string()));
                    }
                    debug!(topic, "subscribed");
                    return Ok(());
                }
                Some(Packet::Publish {
                    topic: inbound_topic,
                    payload,
                }) => {
                    self.pending.push_back(InboundMessage {
                        topic: inbound_topic,
                        payload,
                    });
                }
                Some(Packet::PingResp) => session.ping_sent_at = None,
                Some(other) => trace!(?other, "ignoring packet while awaiting SUBACK"),
                None => {
                    session.alive.store(false, Ordering::SeqCst);
                    return Err(TransportError::Connection(
                        "connection closed while awaiting SUBACK".to_string(),
                    ));
                }
            }
        }
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > self.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: payload.len(),
                max: self.max_message_size,
            });
        }
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.write_packet(&Packet::Publish {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        })
        .await?;
        trace!(topic, len = payload.len(), "published");
        Ok(())
    }

    async fn service(&mut self) -> Result<(), TransportError> {
        self.drain_packets();

        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if !session.alive.load(Ordering::SeqCst) || session.keep_alive.is_zero() {
            return Ok(());
        }

        let now = Instant::now();
        if let Some(sent_at) = session.ping_sent_at {
            if now.duration_since(sent_at) > session.keep_alive * 3 / 2 {
                warn!("broker did not answer keep-alive ping");
                session.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::Timeout("PINGRESP"));
            }
        } else if now.duration_since(session.last_sent) >= session.keep_alive {
            self.write_packet(&Packet::PingReq).await?;
            if let Some(session) = self.session.as_mut() {
                session.ping_sent_at = Some(now);
            }
            trace!("sent keep-alive ping");
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Option<InboundMessage> {
        self.drain_packets();
        self.pending.pop_front()
    }

    fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.alive.load(Ordering::SeqCst))
    }

    async fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            if session.alive.load(Ordering::SeqCst) {
                if let Ok(bytes) = Packet::Disconnect.encode() {
                    let _ = session.writer.write_all(&bytes).await;
                }
            }
            let _ = session.writer.shutdown().await;
            debug!("broker session closed");
        }
    }

    fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

fn response_timeout(keep_alive: Duration) -> Duration {
    if keep_alive.is_zero() {
        DEFAULT_RESPONSE_TIMEOUT
    } else {
        keep_alive
    }
}

/// Read until one whole packet is buffered, leaving any excess in `buf`.
///
/// PUBLISH packets larger than `max_size` are read off the socket and
/// discarded; the session stays up.
async fn read_packet(
    stream: &mut OwnedReadHalf,
    buf: &mut Vec<u8>,
    max_size: usize,
) -> Result<Packet, TransportError> {
    let mut chunk = [0u8; 512];
    let mut discard = 0usize;
    loop {
        if discard > 0 {
            let n = discard.min(buf.len());
            buf.drain(..n);
            discard -= n;
        }
        if discard == 0 {
            match Packet::decode(buf, max_size) {
                Ok(Some((packet, used))) => {
                    buf.drain(..used);
                    return Ok(packet);
                }
                Ok(None) => {}
                Err(PacketError::TooLarge { size, max })
                    if buf.first().is_some_and(|h| is_publish(*h)) =>
                {
                    warn!(size, max, "dropping oversized inbound message");
                    discard = size;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(TransportError::Connection(
                "broker closed the connection".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

async fn reader_loop(
    mut stream: OwnedReadHalf,
    mut buf: Vec<u8>,
    max_size: usize,
    tx: mpsc::Sender<Packet>,
    alive: Arc<AtomicBool>,
) {
    loop {
        match read_packet(&mut stream, &mut buf, max_size).await {
            Ok(packet) => {
                if tx.send(packet).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "broker reader stopped");
                break;
            }
        }
    }
    alive.store(false, Ordering::SeqCst);
}
