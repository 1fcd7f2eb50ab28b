//! # Connection Pool
//!
//! A fixed set of [`Session`]s to one remote address. All sessions are
//! opened when the pool is built; callers check one out with
//! [`ConnectionPool::acquire`], use it exclusively and hand it back with
//! [`ConnectionPool::release`].
//!
//! Idle sessions live in a lock-guarded deque. A semaphore counts them, so
//! waiting callers are woken in FIFO order and [`ConnectionPool::shutdown`]
//! can wake every waiter at once.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use modbus_client::{ConnectionPool, ModbusClient};
//!
//! #[tokio::main]
//! async fn main() -> modbus_client::ModbusResult<()> {
//!     let pool = Arc::new(ConnectionPool::new("192.168.1.100:502", 4, Duration::from_secs(2)).await?);
//!
//!     let session = pool.acquire(Duration::from_secs(1)).await?;
//!     let values = session.read_input_registers(1, 100, 4).await;
//!     pool.release(session).await;
//!
//!     println!("{:?}", values?);
//!     pool.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, PoolConfig};
use crate::error::{ModbusError, ModbusResult};
use crate::session::Session;

/// Bounded pool of Modbus TCP sessions
pub struct ConnectionPool {
    address: String,
    capacity: usize,
    timeout: Duration,
    idle: Mutex<VecDeque<Session>>,
    /// One permit per idle session; closed on shutdown
    idle_permits: Semaphore,
}

impl ConnectionPool {
    /// Open `capacity` sessions to `address`
    ///
    /// A zero capacity or timeout selects the library default. If any
    /// connection attempt fails the sessions already opened are closed and
    /// the first error is returned.
    pub async fn new<S: Into<String>>(address: S, capacity: usize, timeout: Duration) -> ModbusResult<Self> {
        Self::from_config(&PoolConfig::new(address, capacity, timeout)).await
    }

    pub async fn from_config(config: &PoolConfig) -> ModbusResult<Self> {
        let capacity = config.capacity();
        let client_config: ClientConfig = config.client_config();

        debug!("Opening {} Modbus sessions to {}", capacity, config.address);
        let sessions = open_all(&config.address, capacity, |_| Session::open(&client_config)).await?;

        info!("Connection pool ready: {} sessions to {}", capacity, config.address);
        Ok(Self {
            address: config.address.clone(),
            capacity,
            timeout: config.timeout(),
            idle: Mutex::new(sessions),
            idle_permits: Semaphore::new(capacity),
        })
    }

    /// Check out an idle session, waiting at most `timeout`
    ///
    /// A zero `timeout` uses the pool's configured timeout.
    pub async fn acquire(&self, timeout: Duration) -> ModbusResult<Session> {
        let wait = if timeout.is_zero() { self.timeout } else { timeout };

        let permit = match tokio::time::timeout(wait, self.idle_permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(ModbusError::PoolClosed),
            Err(_) => {
                debug!("No idle session to {} within {:?}", self.address, wait);
                return Err(ModbusError::timeout("acquire session", wait.as_millis() as u64));
            },
        };
        // Dropping this future before the permit is forgotten hands the
        // permit back.
        let mut idle = self.idle.lock().await;
        // Empty only if shutdown drained the deque after our permit was granted
        let session = idle.pop_front().ok_or(ModbusError::PoolClosed)?;
        // The permit now belongs to the checked-out session and is given
        // back by `release`.
        permit.forget();
        Ok(session)
    }

    /// Return a session to the pool
    ///
    /// The session is closed instead when the pool is already full or has
    /// been shut down.
    pub async fn release(&self, session: Session) {
        let mut idle = self.idle.lock().await;

        if self.idle_permits.is_closed() {
            drop(idle);
            debug!("Pool to {} is shut down; closing released session", self.address);
            let _ = session.close().await;
            return;
        }

        if idle.len() >= self.capacity {
            drop(idle);
            warn!("Pool to {} is full ({}); closing released session", self.address, self.capacity);
            let _ = session.close().await;
            return;
        }

        idle.push_back(session);
        drop(idle);
        self.idle_permits.add_permits(1);
    }

    /// Close every idle session and refuse further acquisitions
    ///
    /// Sessions checked out at this point are closed when released.
    pub async fn shutdown(&self) {
        let drained: Vec<Session> = {
            let mut idle = self.idle.lock().await;
            self.idle_permits.close();
            idle.drain(..).collect()
        };

        let count = drained.len();
        for session in drained {
            if let Err(e) = session.close().await {
                warn!("Failed to close session to {}: {}", self.address, e);
            }
        }
        info!("Connection pool to {} shut down, {} idle sessions closed", self.address, count);
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Number of sessions the pool was built with
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of idle sessions ready to be acquired
    pub fn available(&self) -> usize {
        if self.idle_permits.is_closed() {
            0
        } else {
            self.idle_permits.available_permits()
        }
    }

    pub fn is_closed(&self) -> bool {
        self.idle_permits.is_closed()
    }
}

/// Run `open` once per slot concurrently
///
/// All-or-nothing: on any failure the sessions that did open are closed and
/// the first error is returned.
async fn open_all<F, Fut>(address: &str, capacity: usize, open: F) -> ModbusResult<VecDeque<Session>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = ModbusResult<Session>>,
{
    let results = join_all((0..capacity).map(open)).await;

    let mut sessions = VecDeque::with_capacity(capacity);
    let mut first_error = None;
    for result in results {
        match result {
            Ok(session) => sessions.push_back(session),
            Err(e) if first_error.is_none() => first_error = Some(e),
            Err(_) => {},
        }
    }

    let Some(error) = first_error else {
        return Ok(sessions);
    };

    warn!(
        "Connection pool to {} failed ({} of {} sessions opened): {}",
        address,
        sessions.len(),
        capacity,
        error
    );
    for session in sessions {
        if let Err(e) = session.close().await {
            debug!("Cleanup close to {} failed: {}", address, e);
        }
    }
    Err(error)
}
