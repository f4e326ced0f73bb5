use thiserror::Error;

/// Errors from the KV wire protocol, the connection pool, or the store
/// itself. Per §4.1/§7, most of these are meant to be swallowed by the
/// caller (fail-open: treat as "not found / not stored") — `PoolExhausted`
/// in particular maps onto `DependencyDegraded`, never a 5xx on its own.
#[derive(Error, Debug)]
pub enum KvError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server returned error: {0}")]
    Server(String),

    #[error("authentication failed")]
    AuthFailed,

    #[error("pool exhausted (waited past conn_wait_timeout)")]
    PoolExhausted,

    #[error("connection closed by peer")]
    ConnectionClosed,
}
