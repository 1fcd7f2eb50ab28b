//! # Error Handling
//!
//! Every fallible operation in this crate returns [`ModbusResult`]. The error
//! enumeration is split into the failure classes a Modbus TCP client can
//! actually observe:
//!
//! ### Invalid Arguments
//! - Quantity outside the legal range for the function code
//! - Address range running past the end of the 16-bit address space
//! - Batch items whose operation name or value list does not fit
//!
//! These are always detected before anything is written to the network.
//!
//! ### Transport Errors
//! - **I/O Errors**: socket failures, short reads, peer resets
//! - **Connection Errors**: connection refused, session already broken
//! - **Timeout Errors**: a read or write deadline expired
//!
//! ### Framing Errors
//! - **Correlation Mismatch**: the response carried a transaction ID other
//!   than the one just sent; the session is desynchronized
//! - **Malformed Response**: echo or byte-count invariants violated
//!
//! ### Device Errors
//! - **Exception Responses**: the device answered with a Modbus exception
//!
//! ## Session Health
//!
//! Transport and correlation failures leave the byte stream in an unknown
//! state. Callers should close the session and open a new one:
//!
//! ```rust
//! use modbus_client::ModbusError;
//!
//! fn should_reopen(error: &ModbusError) -> bool {
//!     error.invalidates_session()
//! }
//!
//! assert!(should_reopen(&ModbusError::correlation_mismatch(7, 9)));
//! assert!(!should_reopen(&ModbusError::exception(0x03, 0x02)));
//! ```
//!
//! ## Matching on Device Exceptions
//!
//! ```rust
//! use modbus_client::{ModbusClient, ModbusError};
//!
//! async fn read_with_error_handling(client: &impl ModbusClient) {
//!     match client.read_holding_registers(1, 0, 10).await {
//!         Ok(registers) => println!("Read {} registers", registers.len()),
//!         Err(ModbusError::Exception { function, code, message }) => {
//!             println!("Device exception: {} (function={:02X}, code={:02X})",
//!                      message, function, code);
//!         },
//!         Err(error) => println!("Other error: {}", error),
//!     }
//! }
//! ```

use thiserror::Error;

use crate::protocol::ModbusException;

/// Result type alias for Modbus operations
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Modbus client error types
///
/// Each variant carries enough context to reconstruct the failure: the
/// function and exception code for device exceptions, expected and actual
/// sizes for length mismatches, and both transaction IDs for correlation
/// failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModbusError {
    /// I/O related errors
    ///
    /// Covers socket-level failures including short reads (peer closed the
    /// connection mid-frame) and write failures.
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Connection errors
    ///
    /// # Examples
    /// - Connection refused by remote host
    /// - Exchange attempted on a session that was already marked broken
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// A read, write, connect or pool acquire deadline expired
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Request parameters violate the function's legal range or shape
    ///
    /// # Examples
    /// - Reading 126 holding registers (max 125)
    /// - Writing zero coils
    /// - A batch item named `"write_registers"` carrying boolean values
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Response transaction ID does not match the request
    ///
    /// The session is desynchronized: a late response to an earlier request
    /// may still be sitting in the stream. The session must not be reused.
    #[error("Transaction ID mismatch: expected {expected}, got {actual}")]
    CorrelationMismatch { expected: u16, actual: u16 },

    /// Response violates an echo or framing invariant
    ///
    /// # Examples
    /// - Write echo carries a different address than the request
    /// - Response function code differs from the request's
    /// - MBAP protocol identifier is not zero
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    /// Response byte count disagrees with the data actually present or
    /// with the quantity requested
    #[error("Response length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Modbus exception response
    ///
    /// `function` is the original function code (top bit cleared) and
    /// `code` the raw exception code reported by the device.
    ///
    /// # Standard Exception Codes
    /// - 0x01: Illegal Function
    /// - 0x02: Illegal Data Address
    /// - 0x03: Illegal Data Value
    /// - 0x04: Server Device Failure
    #[error("Modbus exception: function=0x{function:02X}, exception=0x{code:02X} ({message})")]
    Exception { function: u8, code: u8, message: String },

    /// Configuration errors
    ///
    /// # Examples
    /// - Unparseable JSON/YAML configuration file
    /// - Unknown configuration file extension
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The connection pool has been shut down
    #[error("Connection pool is shut down")]
    PoolClosed,
}

impl ModbusError {
    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io { message: message.into() }
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection { message: message.into() }
    }

    /// Create a new timeout error
    ///
    /// # Arguments
    ///
    /// * `operation` - Description of the operation that timed out
    /// * `timeout_ms` - Timeout duration in milliseconds
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    /// Create a correlation mismatch error
    ///
    /// # Arguments
    ///
    /// * `expected` - Transaction ID that was sent
    /// * `actual` - Transaction ID found in the response header
    pub fn correlation_mismatch(expected: u16, actual: u16) -> Self {
        Self::CorrelationMismatch { expected, actual }
    }

    /// Create a malformed response error
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse { message: message.into() }
    }

    /// Create a length mismatch error
    pub fn length_mismatch(expected: usize, actual: usize) -> Self {
        Self::LengthMismatch { expected, actual }
    }

    /// Create a Modbus exception error
    ///
    /// Standard exception codes are mapped to their names; unknown codes
    /// are kept verbatim with a generic description.
    ///
    /// # Arguments
    ///
    /// * `function` - Original function code that caused the exception
    /// * `code` - Modbus exception code
    pub fn exception(function: u8, code: u8) -> Self {
        let message = ModbusException::from_u8(code)
            .map(|exception| exception.name())
            .unwrap_or("Unknown Exception")
            .to_string();

        Self::Exception { function, code, message }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Check if the error is a network/transport issue
    ///
    /// ```rust
    /// use modbus_client::ModbusError;
    ///
    /// let connection_error = ModbusError::connection("Connection refused");
    /// assert!(connection_error.is_transport_error());
    ///
    /// let exception_error = ModbusError::exception(0x03, 0x02);
    /// assert!(!exception_error.is_transport_error());
    /// ```
    pub fn is_transport_error(&self) -> bool {
        matches!(self,
            Self::Io { .. } |
            Self::Connection { .. } |
            Self::Timeout { .. }
        )
    }

    /// Check if the device reported a Modbus exception
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Exception { .. })
    }

    /// Check if the response violated an echo or length invariant
    pub fn is_malformed_response(&self) -> bool {
        matches!(self,
            Self::MalformedResponse { .. } |
            Self::LengthMismatch { .. }
        )
    }

    /// Check if the request was rejected before reaching the network
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// Check if a session that produced this error must be discarded
    ///
    /// Transport failures and correlation mismatches leave unread or
    /// half-written frames on the stream.
    pub fn invalidates_session(&self) -> bool {
        self.is_transport_error() || matches!(self, Self::CorrelationMismatch { .. })
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_json::Error> for ModbusError {
    fn from(err: serde_json::Error) -> Self {
        Self::configuration(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for ModbusError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::configuration(format!("YAML error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = ModbusError::timeout("read response header", 5000);
        assert!(err.is_transport_error());
        assert!(err.invalidates_session());

        let err = ModbusError::exception(0x03, 0x02);
        assert!(err.is_protocol_error());
        assert!(!err.invalidates_session());

        let err = ModbusError::correlation_mismatch(1, 2);
        assert!(!err.is_transport_error());
        assert!(err.invalidates_session());

        assert!(ModbusError::length_mismatch(4, 3).is_malformed_response());
        assert!(ModbusError::malformed("bad echo").is_malformed_response());
        assert!(ModbusError::invalid_argument("quantity 0").is_invalid_argument());
    }

    #[test]
    fn test_exception_display() {
        let err = ModbusError::exception(0x03, 0x02);
        let msg = format!("{}", err);
        assert!(msg.contains("function=0x03"));
        assert!(msg.contains("exception=0x02"));
        assert!(msg.contains("Illegal Data Address"));

        match ModbusError::exception(0x01, 0x7E) {
            ModbusError::Exception { code, message, .. } => {
                assert_eq!(code, 0x7E);
                assert_eq!(message, "Unknown Exception");
            },
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_length_mismatch_display() {
        let msg = ModbusError::length_mismatch(10, 8).to_string();
        assert!(msg.contains("expected 10"));
        assert!(msg.contains("got 8"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "early eof");
        let err: ModbusError = io.into();
        assert!(matches!(err, ModbusError::Io { .. }));
        assert!(err.invalidates_session());
    }
}
