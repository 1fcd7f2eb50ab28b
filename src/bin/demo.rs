/// Modbus Client Demo
///
/// Builds a connection pool, runs a small batch over one pooled session and
/// prints every outcome.
///
/// Usage: `demo [pool-config.{json,yaml}] [address]`
/// Set `RUST_LOG=modbus_client=debug` to see frame-level logging.

use std::time::Duration;

use anyhow::Context;
use modbus_client::{
    batch, BatchItem, ConnectionPool, ModbusClient, ModbusRequest, PoolConfig, RawBatchRequest, WordOrder,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("🚀 {}", modbus_client::info());
    println!("=====================");

    let mut args = std::env::args().skip(1);
    let mut config = match args.next() {
        Some(path) => PoolConfig::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => PoolConfig::new("127.0.0.1:502", 2, Duration::from_secs(5)),
    };
    if let Some(address) = args.next() {
        config.address = address;
    }

    println!("Connecting {} sessions to {}...", config.capacity(), config.address);
    let pool = ConnectionPool::from_config(&config)
        .await
        .with_context(|| format!("make sure a Modbus server is running on {}", config.address))?;
    println!("✅ Pool ready, {} sessions idle", pool.available());

    let session = pool.acquire(Duration::from_secs(1)).await?;
    let unit_id = 1;

    println!("\n📦 Typed batch...");
    let items = vec![
        BatchItem::new(unit_id, ModbusRequest::ReadHoldingRegisters { address: 100, quantity: 5 }),
        BatchItem::new(unit_id, ModbusRequest::ReadCoils { address: 0, quantity: 8 }),
        BatchItem::new(unit_id, ModbusRequest::WriteSingleRegister { address: 100, value: 0x1234 }),
        BatchItem::new(unit_id, ModbusRequest::WriteMultipleCoils { address: 0, values: vec![true, false, true] }),
    ];
    for (i, outcome) in session.execute_batch(&items).await.iter().enumerate() {
        match &outcome.result {
            Ok(response) => println!("  [{}] ✅ {:?}: {:?}", i, outcome.function, response),
            Err(e) => println!("  [{}] ❌ {:?}: {}", i, outcome.function, e),
        }
    }

    println!("\n📦 Raw batch...");
    let jobs: Vec<RawBatchRequest> = serde_json::from_str(
        r#"[
            {"operation": "read_input", "unit_id": 1, "address": 200, "quantity": 3},
            {"operation": "write_registers", "unit_id": 1, "address": 110, "values": [true]},
            {"operation": "read_discrete_inputs", "unit_id": 1, "address": 0, "quantity": 4}
        ]"#,
    )?;
    for (i, outcome) in batch::run_raw(&session, jobs).await.iter().enumerate() {
        match &outcome.result {
            Ok(response) => println!("  [{}] ✅ {:?}: {:?}", i, outcome.function, response),
            Err(e) => println!("  [{}] ❌ {:?}: {}", i, outcome.function, e),
        }
    }

    println!("\n🔢 Float values...");
    match session.write_f32(unit_id, 120, 23.5, WordOrder::HighWordFirst).await {
        Ok(()) => match session.read_f32(unit_id, 120, WordOrder::HighWordFirst).await {
            Ok(value) => println!("  Register 120-121: {}", value),
            Err(e) => println!("  ❌ Failed to read float: {}", e),
        },
        Err(e) => println!("  ❌ Failed to write float: {}", e),
    }

    let stats = session.stats().await;
    println!(
        "\n📊 Session: {} requests, {} responses, {} errors",
        stats.requests_sent, stats.responses_received, stats.errors
    );

    if session.is_connected() {
        pool.release(session).await;
    } else {
        session.close().await?;
    }
    pool.shutdown().await;

    println!("\n✅ Demo completed");
    Ok(())
}
