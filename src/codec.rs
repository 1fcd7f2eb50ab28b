//! # PDU Codec
//!
//! Stateless translation between typed [`ModbusRequest`]s and protocol data
//! units, and from response PDUs back to typed [`ModbusResponse`]s. Nothing
//! in this module performs I/O; the session layer treats PDUs as opaque
//! byte ranges.
//!
//! ## Request Layouts
//!
//! | Function | PDU |
//! |----------|-----|
//! | 0x01-0x04 | `fc, address(2), quantity(2)` |
//! | 0x05 | `fc, address(2), 0xFF00 / 0x0000` |
//! | 0x06 | `fc, address(2), value(2)` |
//! | 0x0F | `fc, address(2), quantity(2), byte_count, packed coils` |
//! | 0x10 | `fc, address(2), quantity(2), byte_count, registers` |
//!
//! ## Example
//!
//! ```rust
//! use modbus_client::codec;
//! use modbus_client::protocol::ModbusRequest;
//!
//! let request = ModbusRequest::ReadHoldingRegisters { address: 0, quantity: 5 };
//! let pdu = codec::encode_request(&request).unwrap();
//! assert_eq!(pdu.as_bytes(), &[0x03, 0x00, 0x00, 0x00, 0x05]);
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{ModbusRequest, ModbusResponse};

/// Wire value of a coil switched on
pub const COIL_ON: u16 = 0xFF00;

/// Wire value of a coil switched off
pub const COIL_OFF: u16 = 0x0000;

/// Bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Size of a write echo: function code, address and value/quantity
const WRITE_ECHO_SIZE: usize = 5;

/// Protocol data unit: function code followed by function-specific fields
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pdu(Bytes);

impl Pdu {
    /// Wrap raw PDU bytes
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// First byte of the PDU, if any
    pub fn function_code(&self) -> Option<u8> {
        self.0.first().copied()
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Pdu {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Encode a typed request into a PDU
///
/// Quantity and address-range limits are checked first; an invalid request
/// never produces bytes.
pub fn encode_request(request: &ModbusRequest) -> ModbusResult<Pdu> {
    request.validate()?;

    let mut buf = BytesMut::with_capacity(6 + 2 * usize::from(request.quantity()));
    buf.put_u8(request.function().to_u8());
    buf.put_u16(request.address());

    match request {
        ModbusRequest::ReadCoils { quantity, .. }
        | ModbusRequest::ReadDiscreteInputs { quantity, .. }
        | ModbusRequest::ReadHoldingRegisters { quantity, .. }
        | ModbusRequest::ReadInputRegisters { quantity, .. } => {
            buf.put_u16(*quantity);
        },
        ModbusRequest::WriteSingleCoil { value, .. } => {
            buf.put_u16(coil_value(*value));
        },
        ModbusRequest::WriteSingleRegister { value, .. } => {
            buf.put_u16(*value);
        },
        ModbusRequest::WriteMultipleCoils { values, .. } => {
            let packed = pack_coils(values);
            buf.put_u16(request.quantity());
            buf.put_u8(packed.len() as u8);
            buf.put_slice(&packed);
        },
        ModbusRequest::WriteMultipleRegisters { values, .. } => {
            let data = registers_to_bytes(values);
            buf.put_u16(request.quantity());
            buf.put_u8(data.len() as u8);
            buf.put_slice(&data);
        },
    }

    Ok(Pdu(buf.freeze()))
}

/// Decode the response PDU for `request`
///
/// Exception responses surface as [`ModbusError::Exception`]. Read responses
/// must declare a byte count equal to both the bytes present and the count
/// implied by the requested quantity. Write responses must echo the request.
pub fn decode_response(request: &ModbusRequest, response: &Pdu) -> ModbusResult<ModbusResponse> {
    check_exception(response)?;

    let expected_function = request.function().to_u8();
    match response.function_code() {
        None => return Err(ModbusError::malformed("empty response PDU")),
        Some(code) if code != expected_function => {
            return Err(ModbusError::malformed(format!(
                "function code mismatch: expected 0x{:02X}, got 0x{:02X}",
                expected_function, code
            )));
        },
        Some(_) => {},
    }

    let data = response.as_bytes();
    match request {
        ModbusRequest::ReadCoils { quantity, .. } | ModbusRequest::ReadDiscreteInputs { quantity, .. } => {
            let count = usize::from(*quantity);
            let payload = read_payload(data, (count + 7) / 8)?;
            Ok(ModbusResponse::Coils(unpack_coils(payload, count)))
        },
        ModbusRequest::ReadHoldingRegisters { quantity, .. } | ModbusRequest::ReadInputRegisters { quantity, .. } => {
            let payload = read_payload(data, usize::from(*quantity) * 2)?;
            Ok(ModbusResponse::Registers(bytes_to_registers(payload)?))
        },
        ModbusRequest::WriteSingleCoil { .. }
        | ModbusRequest::WriteSingleRegister { .. }
        | ModbusRequest::WriteMultipleCoils { .. }
        | ModbusRequest::WriteMultipleRegisters { .. } => {
            verify_write_echo(request, data)?;
            Ok(ModbusResponse::WriteConfirmed)
        },
    }
}

/// Report an exception response as [`ModbusError::Exception`]
///
/// The function code in the error has the exception flag cleared.
pub fn check_exception(response: &Pdu) -> ModbusResult<()> {
    match response.as_bytes() {
        [code, rest @ ..] if code & EXCEPTION_FLAG != 0 => match rest.first() {
            Some(&exception_code) => Err(ModbusError::exception(code & !EXCEPTION_FLAG, exception_code)),
            None => Err(ModbusError::malformed(format!(
                "exception response for function 0x{:02X} carries no exception code",
                code & !EXCEPTION_FLAG
            ))),
        },
        _ => Ok(()),
    }
}

/// Split a read response into its data bytes after checking the byte count
fn read_payload(data: &[u8], expected_count: usize) -> ModbusResult<&[u8]> {
    if data.len() < 2 {
        return Err(ModbusError::length_mismatch(2 + expected_count, data.len()));
    }

    let declared = usize::from(data[1]);
    let payload = &data[2..];
    if declared != payload.len() {
        return Err(ModbusError::length_mismatch(declared, payload.len()));
    }
    if declared != expected_count {
        return Err(ModbusError::length_mismatch(expected_count, declared));
    }

    Ok(payload)
}

/// The five bytes a device must send back for a write request
fn expected_echo(request: &ModbusRequest) -> [u8; WRITE_ECHO_SIZE] {
    let field = match request {
        ModbusRequest::WriteSingleCoil { value, .. } => coil_value(*value),
        ModbusRequest::WriteSingleRegister { value, .. } => *value,
        _ => request.quantity(),
    };

    let mut echo = [0u8; WRITE_ECHO_SIZE];
    echo[0] = request.function().to_u8();
    echo[1..3].copy_from_slice(&request.address().to_be_bytes());
    echo[3..5].copy_from_slice(&field.to_be_bytes());
    echo
}

fn verify_write_echo(request: &ModbusRequest, data: &[u8]) -> ModbusResult<()> {
    if data.len() != WRITE_ECHO_SIZE {
        return Err(ModbusError::length_mismatch(WRITE_ECHO_SIZE, data.len()));
    }

    let expected = expected_echo(request);
    if data != expected {
        return Err(ModbusError::malformed(format!(
            "write echo mismatch: expected {:02X?}, got {:02X?}",
            expected, data
        )));
    }

    Ok(())
}

/// Wire value of a single coil
pub fn coil_value(on: bool) -> u16 {
    if on { COIL_ON } else { COIL_OFF }
}

/// Pack coil states into bytes, least significant bit first
///
/// Trailing bits of the last byte are zero.
pub fn pack_coils(coils: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; (coils.len() + 7) / 8];

    for (i, &coil) in coils.iter().enumerate() {
        if coil {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }

    bytes
}

/// Unpack `count` coil states from packed bytes
///
/// Bits beyond `count` are ignored; missing bytes read as off.
pub fn unpack_coils(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| bytes.get(i / 8).map_or(false, |byte| byte & (1 << (i % 8)) != 0))
        .collect()
}

/// Convert register values to bytes (big-endian)
pub fn registers_to_bytes(registers: &[u16]) -> Vec<u8> {
    registers.iter().flat_map(|register| register.to_be_bytes()).collect()
}

/// Convert bytes to register values (big-endian)
pub fn bytes_to_registers(bytes: &[u8]) -> ModbusResult<Vec<u16>> {
    if bytes.len() % 2 != 0 {
        return Err(ModbusError::malformed(format!(
            "register data has odd length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
        .collect())
}

/// Order of the two 16-bit words making up a 32-bit value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordOrder {
    /// Most significant word at the lower address
    #[default]
    HighWordFirst,
    /// Least significant word at the lower address
    LowWordFirst,
}

/// Convert two registers to an IEEE 754 f32
pub fn registers_to_f32(registers: &[u16], order: WordOrder) -> ModbusResult<f32> {
    let [first, second] = match registers {
        [first, second] => [*first, *second],
        _ => {
            return Err(ModbusError::invalid_argument(format!(
                "f32 needs exactly 2 registers, got {}",
                registers.len()
            )));
        },
    };

    let (high, low) = match order {
        WordOrder::HighWordFirst => (first, second),
        WordOrder::LowWordFirst => (second, first),
    };
    Ok(f32::from_bits((u32::from(high) << 16) | u32::from(low)))
}

/// Convert an IEEE 754 f32 to two registers
pub fn f32_to_registers(value: f32, order: WordOrder) -> [u16; 2] {
    let bits = value.to_bits();
    let high = (bits >> 16) as u16;
    let low = bits as u16;
    match order {
        WordOrder::HighWordFirst => [high, low],
        WordOrder::LowWordFirst => [low, high],
    }
}
