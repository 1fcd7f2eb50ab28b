//! # Modbus Client - Async Modbus TCP Client Library
//!
//! An async Modbus TCP client built on Tokio: a stateless PDU codec, a
//! session that frames and correlates exchanges over one connection, a
//! bounded connection pool for concurrent callers and a batch executor that
//! runs a list of operations over one session.
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Quantity |
//! |------|----------|----------|
//! | 0x01 | Read Coils | 1-2000 |
//! | 0x02 | Read Discrete Inputs | 1-2000 |
//! | 0x03 | Read Holding Registers | 1-125 |
//! | 0x04 | Read Input Registers | 1-125 |
//! | 0x05 | Write Single Coil | 1 |
//! | 0x06 | Write Single Register | 1 |
//! | 0x0F | Write Multiple Coils | 1-1968 |
//! | 0x10 | Write Multiple Registers | 1-123 |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modbus_client::{ClientConfig, ModbusClient, ModbusResult, Session};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let config = ClientConfig::new("127.0.0.1:502").with_timeout(Duration::from_secs(5));
//!     let session = Session::open(&config).await?;
//!
//!     let values = session.read_03(1, 0, 10).await?;
//!     println!("Read registers: {:?}", values);
//!
//!     session.write_06(1, 100, 0x1234).await?;
//!     session.close().await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐
//! │   Application   │    │ Batch Executor  │
//! └─────────────────┘    └─────────────────┘
//!          │                       │
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────┐
//! │ Connection Pool │───►│ Session (MBAP)  │
//! └─────────────────┘    └─────────────────┘
//!                                  │
//!                        ┌─────────────────┐
//!                        │   PDU Codec     │
//!                        └─────────────────┘
//! ```

/// Core error types and result handling
pub mod error;

/// Modbus protocol definitions and message shapes
pub mod protocol;

/// Stateless PDU encoding and decoding
pub mod codec;

/// Typed client trait
pub mod client;

/// MBAP framing over one TCP connection
pub mod session;

/// Bounded pool of sessions to one address
pub mod pool;

/// Ordered multi-request execution
pub mod batch;

/// Client and pool configuration
pub mod config;

// Re-export main types for convenience
pub use batch::{BatchItem, BatchOutcome, RawBatchRequest, RawValues};
pub use client::ModbusClient;
pub use codec::{Pdu, WordOrder};
pub use config::{ClientConfig, PoolConfig};
pub use error::{ModbusError, ModbusResult};
pub use pool::ConnectionPool;
pub use protocol::{ModbusAddress, ModbusException, ModbusFunction, ModbusRequest, ModbusResponse, ModbusValue, UnitId};
pub use session::{MbapHeader, Session, SessionStats};

/// Default timeout for operations (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Modbus TCP default port
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Default number of sessions in a connection pool
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Maximum number of coils or discrete inputs in one read
pub const MAX_READ_COILS: u16 = 2000;

/// Maximum number of registers in one read
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum number of coils in one write
pub const MAX_WRITE_COILS: u16 = 1968;

/// Maximum number of registers in one write
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// MBAP header size
pub const MBAP_HEADER_SIZE: usize = 7;

/// Maximum PDU size
pub const MAX_PDU_SIZE: usize = 253;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!("Modbus Client v{} - async Modbus TCP client library", VERSION)
}
