//! # Modbus TCP Session
//!
//! A [`Session`] owns one byte stream and runs strictly sequential
//! request/response exchanges over it, wrapping every PDU in an MBAP header.
//!
//! ## Frame Layout
//!
//! ```text
//! ┌────────────────┬─────────────┬────────────┬─────────┬─────────────┐
//! │ Transaction ID │ Protocol ID │   Length   │ Unit ID │     PDU     │
//! │   (2 bytes)    │ (2 bytes)=0 │ (2 bytes)  │ (1 byte)│  (N bytes)  │
//! └────────────────┴─────────────┴────────────┴─────────┴─────────────┘
//!                                  = N + 1
//! ```
//!
//! All header fields are big-endian. The transaction ID starts at 1 on a
//! fresh session and wraps from 65535 to 0.
//!
//! ## Session Health
//!
//! A failed write, a failed or short read, an expired deadline, a
//! transaction ID mismatch or an invalid response header leaves the stream
//! in an unknown position. The session marks itself broken and refuses
//! further exchanges; close it and open a new one. There is no automatic
//! reconnection.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use modbus_client::{ClientConfig, ModbusClient, Session};
//!
//! #[tokio::main]
//! async fn main() -> modbus_client::ModbusResult<()> {
//!     let session = Session::open(&ClientConfig::new("192.168.1.100:502")).await?;
//!
//!     let registers = session.read_holding_registers(1, 0, 5).await?;
//!     println!("Holding registers 0-4: {:?}", registers);
//!
//!     session.write_single_coil(1, 0, true).await?;
//!     session.close().await
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::batch::{self, BatchItem, BatchOutcome};
use crate::client::ModbusClient;
use crate::codec::{self, Pdu};
use crate::config::ClientConfig;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{ModbusRequest, ModbusResponse, UnitId};
use crate::{DEFAULT_TIMEOUT_MS, MAX_PDU_SIZE, MBAP_HEADER_SIZE};

/// Modbus protocol identifier, always zero
const MODBUS_PROTOCOL_ID: u16 = 0;

/// Format raw bytes as hex string for packet logging
fn format_hex_packet(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn log_packet(direction: &str, data: &[u8], peer: &str, unit_id: UnitId) {
    debug!("[MODBUS-TCP] {} {} unit:{} {}", direction, peer, unit_id, format_hex_packet(data));
}

/// MBAP (Modbus Application Protocol) header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Byte count of the unit ID plus the PDU
    pub length: u16,
    pub unit_id: UnitId,
}

impl MbapHeader {
    pub const SIZE: usize = MBAP_HEADER_SIZE;

    /// Header for a request carrying `pdu`
    pub fn for_request(transaction_id: u16, unit_id: UnitId, pdu: &Pdu) -> Self {
        Self {
            transaction_id,
            protocol_id: MODBUS_PROTOCOL_ID,
            length: (pdu.len() + 1) as u16,
            unit_id,
        }
    }

    pub fn from_bytes(bytes: &[u8; MBAP_HEADER_SIZE]) -> Self {
        Self {
            transaction_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            protocol_id: u16::from_be_bytes([bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
            unit_id: bytes[6],
        }
    }

    pub fn put(&self, buf: &mut BytesMut) {
        buf.put_u16(self.transaction_id);
        buf.put_u16(self.protocol_id);
        buf.put_u16(self.length);
        buf.put_u8(self.unit_id);
    }

    /// Header followed by `pdu`, ready to write
    pub fn frame(&self, pdu: &Pdu) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE + pdu.len());
        self.put(&mut buf);
        buf.put_slice(pdu.as_bytes());
        buf.freeze()
    }
}

/// Per-session communication statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

struct SessionState<S> {
    stream: S,
    transaction_id: u16,
    stats: SessionStats,
}

/// One Modbus TCP connection
///
/// Exchanges are serialized by an internal async mutex, so a session can be
/// shared by reference between tasks; they will simply take turns. For
/// parallelism use several sessions, e.g. through a
/// [`ConnectionPool`](crate::pool::ConnectionPool).
pub struct Session<S = TcpStream> {
    state: Mutex<SessionState<S>>,
    broken: AtomicBool,
    timeout: Duration,
    peer: String,
    packet_logging: bool,
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.peer)
            .field("timeout", &self.timeout)
            .field("broken", &self.broken.load(Ordering::Relaxed))
            .finish()
    }
}

impl Session<TcpStream> {
    /// Connect to `config.address`
    ///
    /// The connect attempt is bounded by the configured timeout.
    pub async fn open(config: &ClientConfig) -> ModbusResult<Self> {
        let timeout_duration = config.timeout();
        let stream = match timeout(timeout_duration, TcpStream::connect(config.address.as_str())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ModbusError::connection(format!(
                    "Failed to connect to {}: {}",
                    config.address, e
                )));
            },
            Err(_) => {
                return Err(ModbusError::timeout(
                    format!("connect to {}", config.address),
                    timeout_duration.as_millis() as u64,
                ));
            },
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("TCP_NODELAY on {}: {}", config.address, e);
        }

        info!("Modbus TCP session opened: {}", config.address);
        let mut session = Self::from_stream(stream, timeout_duration);
        session.peer = config.address.clone();
        session.packet_logging = config.packet_logging;
        Ok(session)
    }

    /// Connect to `address` with the given timeout
    pub async fn connect(address: &str, timeout: Duration) -> ModbusResult<Self> {
        Self::open(&ClientConfig::new(address).with_timeout(timeout)).await
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already connected stream
    ///
    /// A zero `timeout` selects the library default.
    pub fn from_stream(stream: S, timeout: Duration) -> Self {
        let timeout = if timeout.is_zero() {
            Duration::from_millis(DEFAULT_TIMEOUT_MS)
        } else {
            timeout
        };

        Self {
            state: Mutex::new(SessionState {
                stream,
                transaction_id: 0,
                stats: SessionStats::default(),
            }),
            broken: AtomicBool::new(false),
            timeout,
            peer: "stream".to_string(),
            packet_logging: false,
        }
    }

    /// Enable or disable hex dumps of every frame
    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    /// Deadline applied to each write and each read
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Remote address, or `"stream"` for sessions built from a raw stream
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// `false` once an exchange has left the stream in an unknown state
    pub fn is_connected(&self) -> bool {
        !self.broken.load(Ordering::Acquire)
    }

    /// Snapshot of the communication statistics
    pub async fn stats(&self) -> SessionStats {
        self.state.lock().await.stats.clone()
    }

    /// Send one PDU to `unit_id` and return the response PDU
    ///
    /// Exception responses are returned as-is; decoding them is the codec's
    /// job. Apart from an empty or oversized `pdu`, which is rejected before
    /// any I/O, every error returned from here marks the session broken.
    pub async fn exchange(&self, unit_id: UnitId, pdu: &Pdu) -> ModbusResult<Pdu> {
        if pdu.is_empty() || pdu.len() > MAX_PDU_SIZE {
            return Err(ModbusError::invalid_argument(format!(
                "PDU length {} outside 1..={}",
                pdu.len(),
                MAX_PDU_SIZE
            )));
        }

        let mut state = self.state.lock().await;

        if !self.is_connected() {
            return Err(ModbusError::connection(format!(
                "session to {} is broken; close it and open a new one",
                self.peer
            )));
        }

        state.transaction_id = state.transaction_id.wrapping_add(1);
        let transaction_id = state.transaction_id;

        let result = self.transact(&mut state, transaction_id, unit_id, pdu).await;
        if let Err(ref error) = result {
            state.stats.errors += 1;
            if matches!(error, ModbusError::Timeout { .. }) {
                state.stats.timeouts += 1;
            }
            self.broken.store(true, Ordering::Release);
            warn!("Modbus session to {} broken (transaction {}): {}", self.peer, transaction_id, error);
        }

        result
    }

    async fn transact(
        &self,
        state: &mut SessionState<S>,
        transaction_id: u16,
        unit_id: UnitId,
        pdu: &Pdu,
    ) -> ModbusResult<Pdu> {
        let timeout_ms = self.timeout.as_millis() as u64;
        let frame = MbapHeader::for_request(transaction_id, unit_id, pdu).frame(pdu);

        if self.packet_logging {
            log_packet("send", &frame, &self.peer, unit_id);
        }

        let stream = &mut state.stream;
        let send = async {
            stream.write_all(&frame).await?;
            stream.flush().await
        };
        match timeout(self.timeout, send).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => return Err(ModbusError::io(format!("Failed to send request: {}", e))),
            Err(_) => return Err(ModbusError::timeout("send request", timeout_ms)),
        }
        state.stats.requests_sent += 1;
        state.stats.bytes_sent += frame.len() as u64;

        let mut header_buf = [0u8; MBAP_HEADER_SIZE];
        match timeout(self.timeout, state.stream.read_exact(&mut header_buf)).await {
            Ok(Ok(_)) => {},
            Ok(Err(e)) => return Err(ModbusError::io(format!("Failed to read response header: {}", e))),
            Err(_) => return Err(ModbusError::timeout("read response header", timeout_ms)),
        }

        let header = MbapHeader::from_bytes(&header_buf);
        if header.transaction_id != transaction_id {
            return Err(ModbusError::correlation_mismatch(transaction_id, header.transaction_id));
        }
        if header.protocol_id != MODBUS_PROTOCOL_ID {
            return Err(ModbusError::malformed(format!(
                "unexpected protocol ID {} in response header",
                header.protocol_id
            )));
        }
        let length = usize::from(header.length);
        if !(2..=MAX_PDU_SIZE + 1).contains(&length) {
            return Err(ModbusError::malformed(format!(
                "invalid MBAP length {} in response header",
                length
            )));
        }

        let mut pdu_buf = vec![0u8; length - 1];
        match timeout(self.timeout, state.stream.read_exact(&mut pdu_buf)).await {
            Ok(Ok(_)) => {},
            Ok(Err(e)) => return Err(ModbusError::io(format!("Failed to read response data: {}", e))),
            Err(_) => return Err(ModbusError::timeout("read response data", timeout_ms)),
        }

        state.stats.responses_received += 1;
        state.stats.bytes_received += (MBAP_HEADER_SIZE + pdu_buf.len()) as u64;

        if self.packet_logging {
            let mut received = header_buf.to_vec();
            received.extend_from_slice(&pdu_buf);
            log_packet("receive", &received, &self.peer, header.unit_id);
        }

        Ok(Pdu::from_bytes(pdu_buf))
    }

    /// Run `items` in order over this session
    pub async fn execute_batch(&self, items: &[BatchItem]) -> Vec<BatchOutcome> {
        batch::run(self, items).await
    }

    /// Shut the stream down; the session cannot be used afterwards
    ///
    /// The stream is released even when the shutdown itself fails.
    pub async fn close(self) -> ModbusResult<()> {
        let mut state = self.state.into_inner();
        state
            .stream
            .shutdown()
            .await
            .map_err(|e| ModbusError::io(format!("Failed to shut down {}: {}", self.peer, e)))?;
        info!("Modbus session closed: {}", self.peer);
        Ok(())
    }
}

#[async_trait]
impl<S> ModbusClient for Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn execute(&self, unit_id: UnitId, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        let pdu = codec::encode_request(request)?;
        debug!(
            "Modbus request -> unit: {}, function: {}, address: {}, quantity: {}",
            unit_id, request.function(), request.address(), request.quantity()
        );

        let response = self.exchange(unit_id, &pdu).await?;
        codec::decode_response(request, &response)
    }
}
