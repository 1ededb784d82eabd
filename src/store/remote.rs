//! Remote KvStore
//!
//! Pooled TCP client for `atlaslock-server`.
//!
//! Each operation borrows one connection, writes one command frame and
//! reads one response frame. A connection that fails mid-request is marked
//! broken so the pool discards it rather than reusing a half-read stream.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::Config;
use crate::error::{LockError, Result};
use crate::protocol::{read_response, write_command, Command, Response, Status};

use super::pool::{ConnectionPool, ManageConnection};
use super::{ttl_millis, KeyTtl, KvStore};

/// A single client connection to the store server
pub struct TcpConnection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,
}

impl TcpConnection {
    /// Wrap a connected stream
    pub fn new(stream: TcpStream, io_timeout: Option<Duration>) -> Result<Self> {
        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;
        stream.set_read_timeout(io_timeout)?;
        stream.set_write_timeout(io_timeout)?;

        let read_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    /// Send one command and wait for its response
    pub fn request(&mut self, command: &Command) -> Result<Response> {
        write_command(&mut self.writer, command)?;
        read_response(&mut self.reader)
    }
}

/// Opens TCP connections for the pool
#[derive(Debug, Clone)]
pub struct TcpConnectionManager {
    addr: String,
    connect_timeout: Duration,
    io_timeout: Option<Duration>,
}

impl TcpConnectionManager {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration, io_timeout: Option<Duration>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            io_timeout,
        }
    }

    /// Target address
    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn resolve(&self) -> Result<SocketAddr> {
        self.addr
            .to_socket_addrs()
            .map_err(|e| LockError::ConnectionUnavailable(format!("{}: {}", self.addr, e)))?
            .next()
            .ok_or_else(|| {
                LockError::ConnectionUnavailable(format!("{}: no address resolved", self.addr))
            })
    }
}

impl ManageConnection for TcpConnectionManager {
    type Connection = TcpConnection;

    fn connect(&self) -> Result<TcpConnection> {
        let addr = self.resolve()?;
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|e| {
            LockError::ConnectionUnavailable(format!("connect to {} failed: {}", self.addr, e))
        })?;
        tracing::debug!("Connected to store at {}", self.addr);
        TcpConnection::new(stream, self.io_timeout)
    }

    fn is_valid(&self, conn: &mut TcpConnection) -> Result<()> {
        conn.request(&Command::Ping)?.into_result().map(|_| ())
    }
}

/// KvStore backed by a remote `atlaslock-server`
#[derive(Clone)]
pub struct RemoteStore {
    pool: ConnectionPool<TcpConnectionManager>,
}

impl RemoteStore {
    /// Build a store client from config (`store_addr`, `pool`)
    pub fn connect(config: &Config) -> Result<Self> {
        config.validate()?;
        let io_timeout = match config.client_io_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        let manager = TcpConnectionManager::new(
            config.store_addr.clone(),
            config.pool.connection_timeout,
            io_timeout,
        );
        Ok(Self::with_pool(ConnectionPool::new(manager, config.pool)?))
    }

    /// Build a store client over an existing pool
    pub fn with_pool(pool: ConnectionPool<TcpConnectionManager>) -> Self {
        Self { pool }
    }

    /// The underlying connection pool
    pub fn pool(&self) -> &ConnectionPool<TcpConnectionManager> {
        &self.pool
    }

    /// Release pooled connections; later calls fail with `ConnectionUnavailable`
    pub fn close(&self) {
        self.pool.close();
    }

    /// Run one command on a borrowed connection
    fn execute(&self, command: Command) -> Result<Response> {
        let mut conn = self.pool.get()?;

        match conn.request(&command) {
            Ok(response) => response.into_result(),
            Err(e) => {
                conn.mark_broken();
                tracing::debug!(
                    "Request {:?} to {} failed: {}",
                    command.command_type(),
                    self.pool.manager().addr(),
                    e
                );
                Err(match e {
                    LockError::Io(io) => LockError::StoreOperationFailed(io.to_string()),
                    other => other,
                })
            }
        }
    }
}

impl KvStore for RemoteStore {
    fn conditional_set(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.execute(Command::SetNxPx {
            key: key.to_string(),
            value: value.to_string(),
            ttl_ms: ttl_millis(ttl),
        })?
        .as_flag()
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let response = self.execute(Command::Get {
            key: key.to_string(),
        })?;
        match response.status {
            Status::NotFound => Ok(None),
            _ => response.as_text().map(Some),
        }
    }

    fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        self.execute(Command::CompareAndDelete {
            key: key.to_string(),
            expected: expected.to_string(),
        })?
        .as_flag()
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.execute(Command::PExpire {
            key: key.to_string(),
            ttl_ms: ttl_millis(ttl),
        })?
        .as_flag()
    }

    fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let pttl = self
            .execute(Command::PTtl {
                key: key.to_string(),
            })?
            .as_integer()?;
        Ok(KeyTtl::from_pttl(pttl))
    }

    fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool> {
        self.execute(Command::CompareAndPExpire {
            key: key.to_string(),
            expected: expected.to_string(),
            ttl_ms: ttl_millis(ttl),
        })?
        .as_flag()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.execute(Command::Set {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        Ok(())
    }

    fn ping(&self) -> Result<()> {
        let reply = self.execute(Command::Ping)?.as_text()?;
        if reply != "PONG" {
            return Err(LockError::Protocol(format!("Unexpected PING reply: {}", reply)));
        }
        Ok(())
    }
}
