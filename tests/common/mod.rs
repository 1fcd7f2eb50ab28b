//! In-process Modbus TCP device for integration tests
//!
//! Listens on an ephemeral localhost port and serves every accepted
//! connection from one shared memory image. The [`Behavior`] selects how the
//! device answers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use modbus_client::codec::{pack_coils, unpack_coils};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// How the fake device answers requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Serve reads and writes from memory
    Normal,
    /// Answer every request with this exception code
    Exception(u8),
    /// Serve normally but bump the transaction ID of every response
    WrongTransactionId,
    /// Read requests and never answer
    Silent,
}

struct Memory {
    coils: Vec<bool>,
    registers: Vec<u16>,
}

pub struct FakeDevice {
    address: String,
    memory: Arc<Mutex<Memory>>,
    connections: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl FakeDevice {
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let memory = Arc::new(Mutex::new(Memory {
            coils: vec![false; 0x1_0000],
            registers: vec![0; 0x1_0000],
        }));
        let connections = Arc::new(AtomicUsize::new(0));

        let handle = {
            let memory = memory.clone();
            let connections = connections.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(stream, behavior, memory.clone()));
                }
            })
        };

        Self {
            address,
            memory,
            connections,
            handle,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Number of TCP connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn set_register(&self, address: u16, value: u16) {
        self.memory.lock().unwrap().registers[usize::from(address)] = value;
    }

    pub fn register(&self, address: u16) -> u16 {
        self.memory.lock().unwrap().registers[usize::from(address)]
    }

    pub fn coil(&self, address: u16) -> bool {
        self.memory.lock().unwrap().coils[usize::from(address)]
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut stream: TcpStream, behavior: Behavior, memory: Arc<Mutex<Memory>>) {
    loop {
        let mut header = [0u8; 7];
        if stream.read_exact(&mut header).await.is_err() {
            return;
        }
        let length = usize::from(u16::from_be_bytes([header[4], header[5]]));
        let mut pdu = vec![0u8; length.saturating_sub(1)];
        if stream.read_exact(&mut pdu).await.is_err() {
            return;
        }

        let response = match behavior {
            Behavior::Silent => continue,
            Behavior::Exception(code) => vec![pdu[0] | 0x80, code],
            Behavior::Normal | Behavior::WrongTransactionId => handle(&pdu, &mut memory.lock().unwrap()),
        };

        let mut transaction_id = u16::from_be_bytes([header[0], header[1]]);
        if behavior == Behavior::WrongTransactionId {
            transaction_id = transaction_id.wrapping_add(1);
        }

        let mut frame = Vec::with_capacity(7 + response.len());
        frame.extend_from_slice(&transaction_id.to_be_bytes());
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(&((response.len() + 1) as u16).to_be_bytes());
        frame.push(header[6]);
        frame.extend_from_slice(&response);
        if stream.write_all(&frame).await.is_err() {
            return;
        }
    }
}

fn word(pdu: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([pdu[offset], pdu[offset + 1]])
}

fn handle(pdu: &[u8], memory: &mut Memory) -> Vec<u8> {
    let function = pdu[0];
    let address = usize::from(word(pdu, 1));
    let quantity = usize::from(word(pdu, 3));

    match function {
        0x01 => {
            let packed = pack_coils(&memory.coils[address..address + quantity]);
            [vec![function, packed.len() as u8], packed].concat()
        },
        // Discrete inputs read as "even addresses on"
        0x02 => {
            let inputs: Vec<bool> = (address..address + quantity).map(|a| a % 2 == 0).collect();
            let packed = pack_coils(&inputs);
            [vec![function, packed.len() as u8], packed].concat()
        },
        0x03 => {
            let mut response = vec![function, (quantity * 2) as u8];
            for register in &memory.registers[address..address + quantity] {
                response.extend_from_slice(&register.to_be_bytes());
            }
            response
        },
        // Input registers read back their own address
        0x04 => {
            let mut response = vec![function, (quantity * 2) as u8];
            for register in address..address + quantity {
                response.extend_from_slice(&(register as u16).to_be_bytes());
            }
            response
        },
        0x05 => {
            memory.coils[address] = word(pdu, 3) == 0xFF00;
            pdu.to_vec()
        },
        0x06 => {
            memory.registers[address] = word(pdu, 3);
            pdu.to_vec()
        },
        0x0F => {
            let values = unpack_coils(&pdu[6..], quantity);
            memory.coils[address..address + quantity].copy_from_slice(&values);
            pdu[..5].to_vec()
        },
        0x10 => {
            for i in 0..quantity {
                memory.registers[address + i] = word(pdu, 6 + i * 2);
            }
            pdu[..5].to_vec()
        },
        _ => vec![function | 0x80, 0x01],
    }
}
