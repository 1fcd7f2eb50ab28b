//! High-level Modbus client interface
//!
//! [`ModbusClient`] exposes one typed async method per function code. The
//! only implementation in this crate is [`Session`](crate::session::Session);
//! the batch executor is written against the trait so it works with any
//! implementation.

use async_trait::async_trait;

use crate::codec::{self, WordOrder};
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{ModbusAddress, ModbusRequest, ModbusResponse, UnitId};

/// Trait defining the interface for Modbus client operations
///
/// All methods take `&self`: implementations serialize concurrent callers
/// internally, one exchange at a time.
#[async_trait]
pub trait ModbusClient: Send + Sync {
    /// Encode, send and decode one typed request
    ///
    /// The typed methods below are thin wrappers around this one.
    async fn execute(&self, unit_id: UnitId, request: &ModbusRequest) -> ModbusResult<ModbusResponse>;

    /// Read coils (function code 0x01)
    async fn read_coils(&self, unit_id: UnitId, address: ModbusAddress, quantity: u16) -> ModbusResult<Vec<bool>> {
        let request = ModbusRequest::ReadCoils { address, quantity };
        into_coils(self.execute(unit_id, &request).await?)
    }

    /// Read discrete inputs (function code 0x02)
    async fn read_discrete_inputs(&self, unit_id: UnitId, address: ModbusAddress, quantity: u16) -> ModbusResult<Vec<bool>> {
        let request = ModbusRequest::ReadDiscreteInputs { address, quantity };
        into_coils(self.execute(unit_id, &request).await?)
    }

    /// Read holding registers (function code 0x03)
    async fn read_holding_registers(&self, unit_id: UnitId, address: ModbusAddress, quantity: u16) -> ModbusResult<Vec<u16>> {
        let request = ModbusRequest::ReadHoldingRegisters { address, quantity };
        into_registers(self.execute(unit_id, &request).await?)
    }

    /// Read input registers (function code 0x04)
    async fn read_input_registers(&self, unit_id: UnitId, address: ModbusAddress, quantity: u16) -> ModbusResult<Vec<u16>> {
        let request = ModbusRequest::ReadInputRegisters { address, quantity };
        into_registers(self.execute(unit_id, &request).await?)
    }

    /// Write single coil (function code 0x05)
    async fn write_single_coil(&self, unit_id: UnitId, address: ModbusAddress, value: bool) -> ModbusResult<()> {
        let request = ModbusRequest::WriteSingleCoil { address, value };
        into_write(self.execute(unit_id, &request).await?)
    }

    /// Write single register (function code 0x06)
    async fn write_single_register(&self, unit_id: UnitId, address: ModbusAddress, value: u16) -> ModbusResult<()> {
        let request = ModbusRequest::WriteSingleRegister { address, value };
        into_write(self.execute(unit_id, &request).await?)
    }

    /// Write multiple coils (function code 0x0F)
    async fn write_multiple_coils(&self, unit_id: UnitId, address: ModbusAddress, values: &[bool]) -> ModbusResult<()> {
        let request = ModbusRequest::WriteMultipleCoils { address, values: values.to_vec() };
        into_write(self.execute(unit_id, &request).await?)
    }

    /// Write multiple registers (function code 0x10)
    async fn write_multiple_registers(&self, unit_id: UnitId, address: ModbusAddress, values: &[u16]) -> ModbusResult<()> {
        let request = ModbusRequest::WriteMultipleRegisters { address, values: values.to_vec() };
        into_write(self.execute(unit_id, &request).await?)
    }

    /// Read an f32 from two consecutive holding registers
    async fn read_f32(&self, unit_id: UnitId, address: ModbusAddress, order: WordOrder) -> ModbusResult<f32> {
        let registers = self.read_holding_registers(unit_id, address, 2).await?;
        codec::registers_to_f32(&registers, order)
    }

    /// Write an f32 to two consecutive holding registers
    async fn write_f32(&self, unit_id: UnitId, address: ModbusAddress, value: f32, order: WordOrder) -> ModbusResult<()> {
        let registers = codec::f32_to_registers(value, order);
        self.write_multiple_registers(unit_id, address, &registers).await
    }

    // Function-code names, matching device manuals
    async fn read_01(&self, unit_id: UnitId, address: ModbusAddress, quantity: u16) -> ModbusResult<Vec<bool>> {
        self.read_coils(unit_id, address, quantity).await
    }

    async fn read_02(&self, unit_id: UnitId, address: ModbusAddress, quantity: u16) -> ModbusResult<Vec<bool>> {
        self.read_discrete_inputs(unit_id, address, quantity).await
    }

    async fn read_03(&self, unit_id: UnitId, address: ModbusAddress, quantity: u16) -> ModbusResult<Vec<u16>> {
        self.read_holding_registers(unit_id, address, quantity).await
    }

    async fn read_04(&self, unit_id: UnitId, address: ModbusAddress, quantity: u16) -> ModbusResult<Vec<u16>> {
        self.read_input_registers(unit_id, address, quantity).await
    }

    async fn write_05(&self, unit_id: UnitId, address: ModbusAddress, value: bool) -> ModbusResult<()> {
        self.write_single_coil(unit_id, address, value).await
    }

    async fn write_06(&self, unit_id: UnitId, address: ModbusAddress, value: u16) -> ModbusResult<()> {
        self.write_single_register(unit_id, address, value).await
    }

    async fn write_0f(&self, unit_id: UnitId, address: ModbusAddress, values: &[bool]) -> ModbusResult<()> {
        self.write_multiple_coils(unit_id, address, values).await
    }

    async fn write_10(&self, unit_id: UnitId, address: ModbusAddress, values: &[u16]) -> ModbusResult<()> {
        self.write_multiple_registers(unit_id, address, values).await
    }
}

fn into_coils(response: ModbusResponse) -> ModbusResult<Vec<bool>> {
    match response {
        ModbusResponse::Coils(coils) => Ok(coils),
        other => Err(unexpected(other)),
    }
}

fn into_registers(response: ModbusResponse) -> ModbusResult<Vec<u16>> {
    match response {
        ModbusResponse::Registers(registers) => Ok(registers),
        other => Err(unexpected(other)),
    }
}

fn into_write(response: ModbusResponse) -> ModbusResult<()> {
    match response {
        ModbusResponse::WriteConfirmed => Ok(()),
        other => Err(unexpected(other)),
    }
}

fn unexpected(response: ModbusResponse) -> ModbusError {
    ModbusError::malformed(format!("unexpected response shape: {:?}", response))
}
