use tokio::io::BufReader;
use tokio::net::TcpStream;

use crate::error::KvError;
use crate::resp::{RespValue, read_value, write_command};

/// A single authenticated connection to the KV store. Owns a `BufReader`
/// wrapping the socket so `read_value` can use buffered line reads.
pub struct KvConnection {
    stream: BufReader<TcpStream>,
    /// Set once an I/O error or a protocol error has been observed — the
    /// pool discards rather than reuses a poisoned connection (§4.1 "Return:
    /// if the connection has seen an I/O error ... discard").
    pub(crate) poisoned: bool,
}

impl KvConnection {
    pub async fn connect(host: &str, port: u16) -> Result<Self, KvError> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true).ok();
        Ok(Self {
            stream: BufReader::new(stream),
            poisoned: false,
        })
    }

    /// Dial then run the health check (`PING`) and, if a password is
    /// configured, authenticate — matches §4.1 "each freshly dialled
    /// connection issues PING".
    pub async fn dial(host: &str, port: u16, password: &str) -> Result<Self, KvError> {
        let mut conn = Self::connect(host, port).await?;
        if !password.is_empty() {
            conn.auth(password).await?;
        }
        conn.ping().await?;
        Ok(conn)
    }

    async fn run(&mut self, args: &[&[u8]]) -> Result<RespValue, KvError> {
        if let Err(e) = write_command(&mut self.stream, args).await {
            self.poisoned = true;
            return Err(e);
        }
        match read_value(&mut self.stream).await {
            Ok(v) => Ok(v),
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    pub async fn ping(&mut self) -> Result<(), KvError> {
        let reply = self.run(&[b"PING"]).await?;
        if reply.is_ok_simple() {
            Ok(())
        } else {
            Err(KvError::Protocol(format!("unexpected PING reply: {reply:?}")))
        }
    }

    pub async fn auth(&mut self, password: &str) -> Result<(), KvError> {
        let reply = self.run(&[b"AUTH", password.as_bytes()]).await?;
        match reply {
            RespValue::Simple(_) => Ok(()),
            RespValue::Error(_) => Err(KvError::AuthFailed),
            other => Err(KvError::Protocol(format!("unexpected AUTH reply: {other:?}"))),
        }
    }

    pub async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let reply = self.run(&[b"GET", key.as_bytes()]).await?;
        match reply {
            RespValue::Bulk(v) => Ok(v),
            RespValue::Error(e) => Err(KvError::Server(e)),
            other => Err(KvError::Protocol(format!("unexpected GET reply: {other:?}"))),
        }
    }

    pub async fn set(&mut self, key: &str, value: &[u8], ex_seconds: Option<u64>) -> Result<(), KvError> {
        let reply = match ex_seconds {
            Some(secs) => {
                let secs = secs.to_string();
                self.run(&[b"SET", key.as_bytes(), value, b"EX", secs.as_bytes()])
                    .await?
            }
            None => self.run(&[b"SET", key.as_bytes(), value]).await?,
        };
        expect_ok(reply)
    }

    pub async fn setex(&mut self, key: &str, seconds: u64, value: &[u8]) -> Result<(), KvError> {
        let secs = seconds.to_string();
        let reply = self
            .run(&[b"SETEX", key.as_bytes(), secs.as_bytes(), value])
            .await?;
        expect_ok(reply)
    }

    /// Returns the number of keys removed (0 or 1 for a single key).
    pub async fn del(&mut self, key: &str) -> Result<i64, KvError> {
        let reply = self.run(&[b"DEL", key.as_bytes()]).await?;
        match reply {
            RespValue::Integer(n) => Ok(n),
            RespValue::Error(e) => Err(KvError::Server(e)),
            other => Err(KvError::Protocol(format!("unexpected DEL reply: {other:?}"))),
        }
    }

    pub async fn flushdb(&mut self) -> Result<(), KvError> {
        let reply = self.run(&[b"FLUSHDB"]).await?;
        expect_ok(reply)
    }
}

fn expect_ok(reply: RespValue) -> Result<(), KvError> {
    match reply {
        RespValue::Simple(_) => Ok(()),
        RespValue::Error(e) => Err(KvError::Server(e)),
        other => Err(KvError::Protocol(format!("unexpected reply: {other:?}"))),
    }
}
