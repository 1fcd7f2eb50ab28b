//! # Batch Executor
//!
//! Runs an ordered list of requests over one client and records one outcome
//! per request. A failing item never stops the batch; its error is kept in
//! that item's outcome and execution continues with the next one.
//!
//! Batches come in two forms:
//!
//! - [`BatchItem`]: a unit ID plus a typed [`ModbusRequest`]
//! - [`RawBatchRequest`]: the loosely typed form found in configuration
//!   files and job descriptions (an operation name, an optional quantity and
//!   an untyped value list). It is converted with `TryFrom`; conversion
//!   failures become that item's outcome.
//!
//! ```rust,no_run
//! use modbus_client::batch::{self, RawBatchRequest};
//! use modbus_client::{ClientConfig, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::open(&ClientConfig::new("127.0.0.1:502")).await?;
//!     let jobs: Vec<RawBatchRequest> = serde_json::from_str(r#"[
//!         {"operation": "read_holding", "unit_id": 1, "address": 0, "quantity": 10},
//!         {"operation": "write_coils", "unit_id": 1, "address": 0, "values": [true, false]}
//!     ]"#)?;
//!
//!     for outcome in batch::run_raw(&session, jobs).await {
//!         println!("{:?}", outcome);
//!     }
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::ModbusClient;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{ModbusAddress, ModbusFunction, ModbusRequest, ModbusResponse, ModbusValue, UnitId};

/// One typed batch entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub unit_id: UnitId,
    #[serde(flatten)]
    pub request: ModbusRequest,
}

impl BatchItem {
    pub fn new(unit_id: UnitId, request: ModbusRequest) -> Self {
        Self { unit_id, request }
    }
}

/// Result of one batch entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Function of the item; `None` when a raw operation name was not recognised
    pub function: Option<ModbusFunction>,
    pub result: ModbusResult<ModbusResponse>,
}

impl BatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&ModbusError> {
        self.result.as_ref().err()
    }
}

/// Execute `items` in order over `client`
///
/// The returned vector has one outcome per item, in item order.
pub async fn run<C>(client: &C, items: &[BatchItem]) -> Vec<BatchOutcome>
where
    C: ModbusClient + ?Sized,
{
    let mut outcomes = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let result = client.execute(item.unit_id, &item.request).await;
        if let Err(ref e) = result {
            debug!("Batch item {} ({}) failed: {}", index, item.request.function(), e);
        }
        outcomes.push(BatchOutcome {
            function: Some(item.request.function()),
            result,
        });
    }
    outcomes
}

/// Convert and execute raw requests in order over `client`
///
/// Items that fail conversion are not sent; their outcome carries the
/// Invalid-Argument error.
pub async fn run_raw<C, I>(client: &C, raw_items: I) -> Vec<BatchOutcome>
where
    C: ModbusClient + ?Sized,
    I: IntoIterator<Item = RawBatchRequest>,
{
    let mut outcomes = Vec::new();
    for (index, raw) in raw_items.into_iter().enumerate() {
        let function = operation_function(&raw.operation);
        let outcome = match BatchItem::try_from(raw) {
            Ok(item) => BatchOutcome {
                function,
                result: client.execute(item.unit_id, &item.request).await,
            },
            Err(e) => BatchOutcome { function, result: Err(e) },
        };
        if let Some(e) = outcome.error() {
            debug!("Batch item {} failed: {}", index, e);
        }
        outcomes.push(outcome);
    }
    outcomes
}

/// Untyped value list of a raw request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValues {
    Bits(Vec<bool>),
    Registers(Vec<ModbusValue>),
}

/// Loosely typed batch entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBatchRequest {
    /// Operation name, e.g. `read_holding` or `write_multiple_coils`
    pub operation: String,
    #[serde(default = "default_unit_id", alias = "slave_id")]
    pub unit_id: UnitId,
    pub address: ModbusAddress,
    #[serde(default)]
    pub quantity: Option<u16>,
    #[serde(default)]
    pub values: Option<RawValues>,
}

fn default_unit_id() -> UnitId {
    1
}

/// Map an operation name to its function
///
/// Both the short names (`read_holding`, `write_coils`, ...) and the full
/// snake_case function names are accepted.
pub fn operation_function(name: &str) -> Option<ModbusFunction> {
    let function = match name {
        "read_coils" => ModbusFunction::ReadCoils,
        "read_discrete_inputs" | "read_discrete" => ModbusFunction::ReadDiscreteInputs,
        "read_holding" | "read_holding_registers" => ModbusFunction::ReadHoldingRegisters,
        "read_input" | "read_input_registers" => ModbusFunction::ReadInputRegisters,
        "write_coil" | "write_single_coil" => ModbusFunction::WriteSingleCoil,
        "write_register" | "write_single_register" => ModbusFunction::WriteSingleRegister,
        "write_coils" | "write_multiple_coils" => ModbusFunction::WriteMultipleCoils,
        "write_registers" | "write_multiple_registers" => ModbusFunction::WriteMultipleRegisters,
        _ => return None,
    };
    Some(function)
}

impl TryFrom<RawBatchRequest> for BatchItem {
    type Error = ModbusError;

    fn try_from(raw: RawBatchRequest) -> ModbusResult<Self> {
        let function = operation_function(&raw.operation)
            .ok_or_else(|| ModbusError::invalid_argument(format!("unknown operation: {}", raw.operation)))?;
        let address = raw.address;

        let request = if function.is_read_function() {
            let quantity = raw.quantity.ok_or_else(|| {
                ModbusError::invalid_argument(format!("{} requires a quantity", raw.operation))
            })?;
            match function {
                ModbusFunction::ReadCoils => ModbusRequest::ReadCoils { address, quantity },
                ModbusFunction::ReadDiscreteInputs => ModbusRequest::ReadDiscreteInputs { address, quantity },
                ModbusFunction::ReadHoldingRegisters => ModbusRequest::ReadHoldingRegisters { address, quantity },
                _ => ModbusRequest::ReadInputRegisters { address, quantity },
            }
        } else if function.is_bit_function() {
            let values = bit_values(&raw.operation, raw.values)?;
            match function {
                ModbusFunction::WriteSingleCoil => ModbusRequest::WriteSingleCoil {
                    address,
                    value: single(&raw.operation, values)?,
                },
                _ => ModbusRequest::WriteMultipleCoils { address, values },
            }
        } else {
            let values = register_values(&raw.operation, raw.values)?;
            match function {
                ModbusFunction::WriteSingleRegister => ModbusRequest::WriteSingleRegister {
                    address,
                    value: single(&raw.operation, values)?,
                },
                _ => ModbusRequest::WriteMultipleRegisters { address, values },
            }
        };

        Ok(BatchItem::new(raw.unit_id, request))
    }
}

// An empty JSON list deserializes as `Bits`, so it is accepted for either kind.
fn bit_values(operation: &str, values: Option<RawValues>) -> ModbusResult<Vec<bool>> {
    match values {
        Some(RawValues::Bits(bits)) => Ok(bits),
        Some(RawValues::Registers(_)) => Err(ModbusError::invalid_argument(format!(
            "invalid values type for {}: expected booleans",
            operation
        ))),
        None => Err(ModbusError::invalid_argument(format!("{} requires values", operation))),
    }
}

fn register_values(operation: &str, values: Option<RawValues>) -> ModbusResult<Vec<ModbusValue>> {
    match values {
        Some(RawValues::Registers(registers)) => Ok(registers),
        Some(RawValues::Bits(bits)) if bits.is_empty() => Ok(Vec::new()),
        Some(RawValues::Bits(_)) => Err(ModbusError::invalid_argument(format!(
            "invalid values type for {}: expected register values",
            operation
        ))),
        None => Err(ModbusError::invalid_argument(format!("{} requires values", operation))),
    }
}

fn single<T: Copy>(operation: &str, values: Vec<T>) -> ModbusResult<T> {
    match values.as_slice() {
        [value] => Ok(*value),
        _ => Err(ModbusError::invalid_argument(format!(
            "{} takes exactly one value, got {}",
            operation,
            values.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Client that records requests and answers with canned data
    #[derive(Default)]
    struct RecordingClient {
        requests: Mutex<Vec<(UnitId, ModbusRequest)>>,
    }

    #[async_trait]
    impl ModbusClient for RecordingClient {
        async fn execute(&self, unit_id: UnitId, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
            request.validate()?;
            self.requests.lock().unwrap().push((unit_id, request.clone()));
            match request {
                ModbusRequest::ReadCoils { quantity, .. } | ModbusRequest::ReadDiscreteInputs { quantity, .. } => {
                    Ok(ModbusResponse::Coils(vec![true; *quantity as usize]))
                },
                ModbusRequest::ReadHoldingRegisters { address: 9999, .. } => Err(ModbusError::exception(0x03, 0x02)),
                ModbusRequest::ReadHoldingRegisters { quantity, .. } | ModbusRequest::ReadInputRegisters { quantity, .. } => {
                    Ok(ModbusResponse::Registers((0..*quantity).collect()))
                },
                _ => Ok(ModbusResponse::WriteConfirmed),
            }
        }
    }

    fn raw(json: &str) -> RawBatchRequest {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_run_preserves_order_and_isolates_failures() {
        let client = RecordingClient::default();
        let items = vec![
            BatchItem::new(1, ModbusRequest::ReadHoldingRegisters { address: 0, quantity: 3 }),
            BatchItem::new(1, ModbusRequest::ReadCoils { address: 0, quantity: 0 }),
            BatchItem::new(2, ModbusRequest::ReadHoldingRegisters { address: 9999, quantity: 1 }),
            BatchItem::new(2, ModbusRequest::WriteSingleCoil { address: 4, value: true }),
        ];

        let outcomes = run(&client, &items).await;
        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes[0].result, Ok(ModbusResponse::Registers(vec![0, 1, 2])));
        assert!(outcomes[1].error().unwrap().is_invalid_argument());
        assert!(outcomes[2].error().unwrap().is_protocol_error());
        assert_eq!(outcomes[3].result, Ok(ModbusResponse::WriteConfirmed));
        assert_eq!(outcomes[3].function, Some(ModbusFunction::WriteSingleCoil));

        // The invalid item was rejected before reaching the client
        assert_eq!(client.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_run_raw_mismatched_values() {
        let client = RecordingClient::default();
        let jobs = vec![
            raw(r#"{"operation": "read_coils", "unit_id": 1, "address": 0, "quantity": 2}"#),
            raw(r#"{"operation": "write_registers", "unit_id": 1, "address": 0, "values": [true, false]}"#),
            raw(r#"{"operation": "write_registers", "unit_id": 1, "address": 0, "values": [10, 20]}"#),
            raw(r#"{"operation": "read_input", "slave_id": 3, "address": 5, "quantity": 1}"#),
        ];

        let outcomes = run_raw(&client, jobs).await;
        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes[0].result, Ok(ModbusResponse::Coils(vec![true, true])));
        assert_eq!(outcomes[1].function, Some(ModbusFunction::WriteMultipleRegisters));
        assert!(outcomes[1].error().unwrap().is_invalid_argument());
        assert!(outcomes[2].is_ok());
        assert_eq!(outcomes[3].result, Ok(ModbusResponse::Registers(vec![0])));

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].1, ModbusRequest::WriteMultipleRegisters { address: 0, values: vec![10, 20] });
        assert_eq!(requests[2].0, 3);
    }

    #[tokio::test]
    async fn test_run_raw_unknown_operation() {
        let client = RecordingClient::default();
        let outcomes = run_raw(&client, vec![raw(r#"{"operation": "read_fifo", "address": 0}"#)]).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].function, None);
        assert!(outcomes[0].error().unwrap().is_invalid_argument());
        assert!(client.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_raw_conversion() {
        let item = BatchItem::try_from(raw(r#"{"operation": "write_coil", "address": 7, "values": [true]}"#)).unwrap();
        assert_eq!(item.unit_id, 1);
        assert_eq!(item.request, ModbusRequest::WriteSingleCoil { address: 7, value: true });

        let item = BatchItem::try_from(raw(r#"{"operation": "write_single_register", "address": 1, "values": [513]}"#)).unwrap();
        assert_eq!(item.request, ModbusRequest::WriteSingleRegister { address: 1, value: 513 });

        let err = BatchItem::try_from(raw(r#"{"operation": "write_register", "address": 1, "values": [1, 2]}"#)).unwrap_err();
        assert!(err.is_invalid_argument());

        let err = BatchItem::try_from(raw(r#"{"operation": "read_holding", "address": 1}"#)).unwrap_err();
        assert!(err.is_invalid_argument());

        let err = BatchItem::try_from(raw(r#"{"operation": "write_coils", "address": 1, "values": [1]}"#)).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_typed_item_serde() {
        let item: BatchItem = serde_json::from_str(
            r#"{"unit_id": 2, "function": "write_multiple_registers", "address": 10, "values": [1, 2]}"#,
        )
        .unwrap();
        assert_eq!(item.request.quantity(), 2);
        assert_eq!(item.request.function(), ModbusFunction::WriteMultipleRegisters);
    }
}
