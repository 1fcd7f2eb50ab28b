//! Modbus protocol definitions and data structures
//!
//! This module contains the function and exception code tables together with
//! the typed request/response shapes shared by the codec, the session and the
//! batch executor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use crate::error::{ModbusError, ModbusResult};

/// Modbus address type (0-65535)
pub type ModbusAddress = u16;

/// Modbus value type (16-bit register value)
pub type ModbusValue = u16;

/// Modbus unit identifier (the "slave id" multiplexed over one connection)
pub type UnitId = u8;

/// Modbus function codes
///
/// Each code carries its fixed wire identifier and legal quantity range as
/// plain data; nothing else in the crate hard-codes these limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ModbusFunction {
    /// Read Coils (0x01)
    ReadCoils = 0x01,
    /// Read Discrete Inputs (0x02)
    ReadDiscreteInputs = 0x02,
    /// Read Holding Registers (0x03)
    ReadHoldingRegisters = 0x03,
    /// Read Input Registers (0x04)
    ReadInputRegisters = 0x04,
    /// Write Single Coil (0x05)
    WriteSingleCoil = 0x05,
    /// Write Single Register (0x06)
    WriteSingleRegister = 0x06,
    /// Write Multiple Coils (0x0F)
    WriteMultipleCoils = 0x0F,
    /// Write Multiple Registers (0x10)
    WriteMultipleRegisters = 0x10,
}

impl ModbusFunction {
    /// All supported function codes, in wire-identifier order
    pub const ALL: [ModbusFunction; 8] = [
        ModbusFunction::ReadCoils,
        ModbusFunction::ReadDiscreteInputs,
        ModbusFunction::ReadHoldingRegisters,
        ModbusFunction::ReadInputRegisters,
        ModbusFunction::WriteSingleCoil,
        ModbusFunction::WriteSingleRegister,
        ModbusFunction::WriteMultipleCoils,
        ModbusFunction::WriteMultipleRegisters,
    ];

    /// Convert from u8 to ModbusFunction
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|function| function.to_u8() == value)
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Legal quantity range for this function
    ///
    /// `None` for single writes, which always address exactly one unit.
    pub fn quantity_range(self) -> Option<RangeInclusive<u16>> {
        match self {
            ModbusFunction::ReadCoils | ModbusFunction::ReadDiscreteInputs => {
                Some(1..=crate::MAX_READ_COILS)
            },
            ModbusFunction::ReadHoldingRegisters | ModbusFunction::ReadInputRegisters => {
                Some(1..=crate::MAX_READ_REGISTERS)
            },
            ModbusFunction::WriteMultipleCoils => Some(1..=crate::MAX_WRITE_COILS),
            ModbusFunction::WriteMultipleRegisters => Some(1..=crate::MAX_WRITE_REGISTERS),
            ModbusFunction::WriteSingleCoil | ModbusFunction::WriteSingleRegister => None,
        }
    }

    /// Check a quantity against this function's legal range
    pub fn validate_quantity(self, quantity: u16) -> ModbusResult<()> {
        match self.quantity_range() {
            Some(range) if !range.contains(&quantity) => Err(ModbusError::invalid_argument(format!(
                "invalid quantity for {}: {} (must be {}-{})",
                self, quantity, range.start(), range.end()
            ))),
            _ => Ok(()),
        }
    }

    /// Check if this is a read function
    pub fn is_read_function(self) -> bool {
        matches!(self,
            ModbusFunction::ReadCoils |
            ModbusFunction::ReadDiscreteInputs |
            ModbusFunction::ReadHoldingRegisters |
            ModbusFunction::ReadInputRegisters
        )
    }

    /// Check if this is a write function
    pub fn is_write_function(self) -> bool {
        !self.is_read_function()
    }

    /// Check if this function addresses single-bit values
    pub fn is_bit_function(self) -> bool {
        matches!(self,
            ModbusFunction::ReadCoils |
            ModbusFunction::ReadDiscreteInputs |
            ModbusFunction::WriteSingleCoil |
            ModbusFunction::WriteMultipleCoils
        )
    }
}

impl fmt::Display for ModbusFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModbusFunction::ReadCoils => "Read Coils",
            ModbusFunction::ReadDiscreteInputs => "Read Discrete Inputs",
            ModbusFunction::ReadHoldingRegisters => "Read Holding Registers",
            ModbusFunction::ReadInputRegisters => "Read Input Registers",
            ModbusFunction::WriteSingleCoil => "Write Single Coil",
            ModbusFunction::WriteSingleRegister => "Write Single Register",
            ModbusFunction::WriteMultipleCoils => "Write Multiple Coils",
            ModbusFunction::WriteMultipleRegisters => "Write Multiple Registers",
        };
        write!(f, "{} (0x{:02X})", name, *self as u8)
    }
}

/// Modbus exception codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModbusException {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetDeviceFailedToRespond = 0x0B,
}

impl ModbusException {
    /// Convert from u8 to ModbusException
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(ModbusException::IllegalFunction),
            0x02 => Some(ModbusException::IllegalDataAddress),
            0x03 => Some(ModbusException::IllegalDataValue),
            0x04 => Some(ModbusException::ServerDeviceFailure),
            0x05 => Some(ModbusException::Acknowledge),
            0x06 => Some(ModbusException::ServerDeviceBusy),
            0x08 => Some(ModbusException::MemoryParityError),
            0x0A => Some(ModbusException::GatewayPathUnavailable),
            0x0B => Some(ModbusException::GatewayTargetDeviceFailedToRespond),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Short name used in error messages
    pub fn name(self) -> &'static str {
        match self {
            ModbusException::IllegalFunction => "Illegal Function",
            ModbusException::IllegalDataAddress => "Illegal Data Address",
            ModbusException::IllegalDataValue => "Illegal Data Value",
            ModbusException::ServerDeviceFailure => "Server Device Failure",
            ModbusException::Acknowledge => "Acknowledge",
            ModbusException::ServerDeviceBusy => "Server Device Busy",
            ModbusException::MemoryParityError => "Memory Parity Error",
            ModbusException::GatewayPathUnavailable => "Gateway Path Unavailable",
            ModbusException::GatewayTargetDeviceFailedToRespond => "Gateway Target Device Failed to Respond",
        }
    }
}

impl fmt::Display for ModbusException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modbus Exception 0x{:02X}: {}", self.to_u8(), self.name())
    }
}

/// Typed Modbus request
///
/// One variant per function code, carrying exactly the fields that function
/// puts on the wire. The unit identifier travels separately in the MBAP
/// header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "function", rename_all = "snake_case")]
pub enum ModbusRequest {
    ReadCoils { address: ModbusAddress, quantity: u16 },
    ReadDiscreteInputs { address: ModbusAddress, quantity: u16 },
    ReadHoldingRegisters { address: ModbusAddress, quantity: u16 },
    ReadInputRegisters { address: ModbusAddress, quantity: u16 },
    WriteSingleCoil { address: ModbusAddress, value: bool },
    WriteSingleRegister { address: ModbusAddress, value: ModbusValue },
    WriteMultipleCoils { address: ModbusAddress, values: Vec<bool> },
    WriteMultipleRegisters { address: ModbusAddress, values: Vec<ModbusValue> },
}

impl ModbusRequest {
    /// Function code of this request
    pub fn function(&self) -> ModbusFunction {
        match self {
            ModbusRequest::ReadCoils { .. } => ModbusFunction::ReadCoils,
            ModbusRequest::ReadDiscreteInputs { .. } => ModbusFunction::ReadDiscreteInputs,
            ModbusRequest::ReadHoldingRegisters { .. } => ModbusFunction::ReadHoldingRegisters,
            ModbusRequest::ReadInputRegisters { .. } => ModbusFunction::ReadInputRegisters,
            ModbusRequest::WriteSingleCoil { .. } => ModbusFunction::WriteSingleCoil,
            ModbusRequest::WriteSingleRegister { .. } => ModbusFunction::WriteSingleRegister,
            ModbusRequest::WriteMultipleCoils { .. } => ModbusFunction::WriteMultipleCoils,
            ModbusRequest::WriteMultipleRegisters { .. } => ModbusFunction::WriteMultipleRegisters,
        }
    }

    /// Starting address of this request
    pub fn address(&self) -> ModbusAddress {
        match *self {
            ModbusRequest::ReadCoils { address, .. }
            | ModbusRequest::ReadDiscreteInputs { address, .. }
            | ModbusRequest::ReadHoldingRegisters { address, .. }
            | ModbusRequest::ReadInputRegisters { address, .. }
            | ModbusRequest::WriteSingleCoil { address, .. }
            | ModbusRequest::WriteSingleRegister { address, .. }
            | ModbusRequest::WriteMultipleCoils { address, .. }
            | ModbusRequest::WriteMultipleRegisters { address, .. } => address,
        }
    }

    /// Number of coils or registers addressed
    ///
    /// Saturates at `u16::MAX` for oversized value lists so validation still
    /// rejects them.
    pub fn quantity(&self) -> u16 {
        match self {
            ModbusRequest::ReadCoils { quantity, .. }
            | ModbusRequest::ReadDiscreteInputs { quantity, .. }
            | ModbusRequest::ReadHoldingRegisters { quantity, .. }
            | ModbusRequest::ReadInputRegisters { quantity, .. } => *quantity,
            ModbusRequest::WriteSingleCoil { .. } | ModbusRequest::WriteSingleRegister { .. } => 1,
            ModbusRequest::WriteMultipleCoils { values, .. } => saturating_len(values.len()),
            ModbusRequest::WriteMultipleRegisters { values, .. } => saturating_len(values.len()),
        }
    }

    /// Validate the request against its function's limits
    pub fn validate(&self) -> ModbusResult<()> {
        let function = self.function();
        let quantity = self.quantity();
        function.validate_quantity(quantity)?;

        let end = u32::from(self.address()) + u32::from(quantity);
        if end > 0x1_0000 {
            return Err(ModbusError::invalid_argument(format!(
                "address range {}+{} exceeds 65535",
                self.address(), quantity
            )));
        }

        Ok(())
    }
}

fn saturating_len(len: usize) -> u16 {
    u16::try_from(len).unwrap_or(u16::MAX)
}

/// Typed Modbus response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModbusResponse {
    /// Coil or discrete input states, one per requested address
    Coils(Vec<bool>),
    /// Holding or input register values, one per requested address
    Registers(Vec<ModbusValue>),
    /// The device echoed the write back correctly
    WriteConfirmed,
}

impl ModbusResponse {
    /// Borrow the coil states, if this is a bit response
    pub fn as_coils(&self) -> Option<&[bool]> {
        match self {
            ModbusResponse::Coils(coils) => Some(coils),
            _ => None,
        }
    }

    /// Borrow the register values, if this is a register response
    pub fn as_registers(&self) -> Option<&[ModbusValue]> {
        match self {
            ModbusResponse::Registers(registers) => Some(registers),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_conversion() {
        assert_eq!(ModbusFunction::from_u8(0x03), Some(ModbusFunction::ReadHoldingRegisters));
        assert_eq!(ModbusFunction::from_u8(0x0F), Some(ModbusFunction::WriteMultipleCoils));
        assert_eq!(ModbusFunction::ReadHoldingRegisters.to_u8(), 0x03);
        assert_eq!(ModbusFunction::WriteMultipleRegisters.to_u8(), 0x10);

        assert!(ModbusFunction::from_u8(0x07).is_none());
        assert!(ModbusFunction::from_u8(0x83).is_none());
    }

    #[test]
    fn test_exception_conversion() {
        assert_eq!(ModbusException::from_u8(0x02), Some(ModbusException::IllegalDataAddress));
        assert_eq!(ModbusException::IllegalDataAddress.to_u8(), 0x02);
        assert!(ModbusException::from_u8(0x07).is_none());
    }

    #[test]
    fn test_quantity_limits() {
        let cases = [
            (ModbusFunction::ReadCoils, 1, 2000),
            (ModbusFunction::ReadDiscreteInputs, 1, 2000),
            (ModbusFunction::ReadHoldingRegisters, 1, 125),
            (ModbusFunction::ReadInputRegisters, 1, 125),
            (ModbusFunction::WriteMultipleCoils, 1, 1968),
            (ModbusFunction::WriteMultipleRegisters, 1, 123),
        ];

        for (function, min, max) in cases {
            assert!(function.validate_quantity(min).is_ok(), "{} min", function);
            assert!(function.validate_quantity(max).is_ok(), "{} max", function);
            assert!(function.validate_quantity(min - 1).unwrap_err().is_invalid_argument());
            assert!(function.validate_quantity(max + 1).unwrap_err().is_invalid_argument());
        }

        assert!(ModbusFunction::WriteSingleCoil.quantity_range().is_none());
        assert!(ModbusFunction::WriteSingleRegister.validate_quantity(0).is_ok());
    }

    #[test]
    fn test_request_validation() {
        let valid = ModbusRequest::ReadHoldingRegisters { address: 100, quantity: 10 };
        assert!(valid.validate().is_ok());

        let too_many = ModbusRequest::ReadHoldingRegisters { address: 100, quantity: 126 };
        assert!(too_many.validate().is_err());

        let empty = ModbusRequest::WriteMultipleRegisters { address: 0, values: vec![] };
        assert!(empty.validate().is_err());

        let at_end = ModbusRequest::ReadCoils { address: 0xFFFF, quantity: 1 };
        assert!(at_end.validate().is_ok());

        let past_end = ModbusRequest::ReadCoils { address: 0xFFFF, quantity: 2 };
        assert!(past_end.validate().unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_request_accessors() {
        let request = ModbusRequest::WriteMultipleCoils { address: 20, values: vec![true; 10] };
        assert_eq!(request.function(), ModbusFunction::WriteMultipleCoils);
        assert_eq!(request.address(), 20);
        assert_eq!(request.quantity(), 10);

        let request = ModbusRequest::WriteSingleRegister { address: 3, value: 0xBEEF };
        assert_eq!(request.quantity(), 1);
        assert!(request.function().is_write_function());
    }
}
