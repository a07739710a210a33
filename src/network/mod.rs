//! Network Adapter
//!
//! Cache adapter talking to a remote key-value server over the RESP wire
//! protocol. One connection per adapter, opened on the first command and
//! closed when the adapter is dropped. Failures are never retried.

mod connection;
pub mod protocol;

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::cache::{key, ttl_millis, Cache, Expiration, DEFAULT_TTL};
use crate::error::{CacheError, Result};

pub use connection::{Connection, Endpoint};
pub use protocol::Reply;

// == Network Config ==
/// Connection settings for [`NetworkCache`].
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    /// Hostname or IP, or the socket path when `port` is `None`
    pub host: String,
    /// TCP port; `None` selects a Unix domain socket at `host`
    pub port: Option<u16>,
    /// Sent with `AUTH` right after connecting
    pub password: Option<String>,
    /// Bound on connection setup
    pub timeout: Duration,
}

impl NetworkConfig {
    pub fn endpoint(&self) -> Endpoint {
        match self.port {
            Some(port) => Endpoint::Tcp {
                host: self.host.clone(),
                port,
            },
            None => Endpoint::Unix(PathBuf::from(&self.host)),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: Some(6379),
            password: None,
            timeout: Duration::from_millis(2500),
        }
    }
}

// == Network Cache ==
/// Cache adapter over a single lazily opened server connection.
#[derive(Debug)]
pub struct NetworkCache {
    config: NetworkConfig,
    connection: Option<Connection>,
}

impl NetworkCache {
    // == Constructor ==
    /// Creates the adapter. No connection is made until the first command.
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            connection: None,
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    // == Command ==
    /// Sends a command and returns the JSON-post-processed reply.
    pub fn command(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        Ok(self.call(name, args)?.into_value())
    }

    /// Sends a command and returns the raw reply.
    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Reply> {
        let result = self.connection()?.call(name, args);
        if let Err(e) = &result {
            // Stream position is unknown after a transport failure
            if matches!(e, CacheError::Io(_) | CacheError::Protocol(_)) {
                debug!(error = %e, "dropping broken connection");
                self.connection = None;
            }
        }
        result
    }

    fn connection(&mut self) -> Result<&mut Connection> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => self.connect()?,
        };
        Ok(self.connection.insert(connection))
    }

    /// Opens the socket and authenticates when a password is configured.
    fn connect(&self) -> Result<Connection> {
        let endpoint = self.config.endpoint();
        let mut connection = Connection::open(&endpoint, self.config.timeout)?;
        debug!(%endpoint, "connected to cache server");

        if let Some(password) = &self.config.password {
            connection.call("auth", &[Value::String(password.clone())])?;
        }
        Ok(connection)
    }

    fn pexpire(&mut self, key: String, ttl_ms: i64) -> Result<()> {
        self.call("pexpire", &[Value::String(key), Value::from(ttl_ms)])?;
        Ok(())
    }
}

impl Drop for NetworkCache {
    fn drop(&mut self) {
        if self.connection.take().is_some() {
            debug!(endpoint = %self.config.endpoint(), "cache server connection closed");
        }
    }
}

impl Cache for NetworkCache {
    // == Set ==
    /// `SET` followed by `PEXPIRE`.
    fn set(&mut self, key: &Value, value: &Value, ttl: Option<Duration>) -> Result<()> {
        let key = key::identity(key)?;
        self.call("set", &[Value::String(key.clone()), value.clone()])?;
        let ttl_ms = ttl_millis(ttl.unwrap_or(DEFAULT_TTL));
        self.pexpire(key, i64::try_from(ttl_ms).unwrap_or(i64::MAX))
    }

    fn get(&mut self, key: &Value, default: Value) -> Result<Value> {
        let key = key::identity(key)?;
        match self.command("get", &[Value::String(key)])? {
            Value::Null => Ok(default),
            value => Ok(value),
        }
    }

    /// A negative TTL makes the server drop the key.
    fn expire(&mut self, key: &Value) -> Result<()> {
        let key = key::identity(key)?;
        self.pexpire(key, -1)
    }

    /// `FLUSHALL`: empties every database on the server.
    fn clear(&mut self) -> Result<()> {
        self.call("flushall", &[])?;
        Ok(())
    }

    fn exists(&mut self, key: &Value) -> Result<bool> {
        let key = key::identity(key)?;
        match self.call("exists", &[Value::String(key)])? {
            Reply::Integer(n) => Ok(n > 0),
            Reply::Ok => Ok(true),
            Reply::Null => Ok(false),
            other => Err(CacheError::Protocol(format!(
                "unexpected reply to EXISTS: {other:?}"
            ))),
        }
    }

    /// `PEXPIRE` with `ttl`, or the default TTL when `None`.
    fn touch(&mut self, key: &Value, ttl: Option<Duration>) -> Result<()> {
        let key = key::identity(key)?;
        let ttl_ms = ttl_millis(ttl.unwrap_or(DEFAULT_TTL));
        self.pexpire(key, i64::try_from(ttl_ms).unwrap_or(i64::MAX))
    }

    /// Derived from `PTTL`. The server only knows the remaining time, so
    /// the reported TTL is the remaining milliseconds.
    fn expiration(&mut self, key: &Value) -> Result<Option<Expiration>> {
        let key = key::identity(key)?;
        match self.call("pttl", &[Value::String(key)])? {
            // -2: missing, -1: no expiry
            Reply::Integer(ms) if ms < 0 => Ok(None),
            Reply::Integer(ms) => Ok(Some(Expiration::from_ttl_ms(ms as u64))),
            other => Err(CacheError::Protocol(format!(
                "unexpected reply to PTTL: {other:?}"
            ))),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serves one connection, answering each request with the next scripted
    /// reply and returning the requests it saw.
    fn scripted_server(replies: Vec<&'static str>) -> (u16, thread::JoinHandle<Vec<Reply>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(socket.try_clone().unwrap());
            let mut writer = socket;
            let mut seen = Vec::new();
            for reply in replies {
                match protocol::read_reply(&mut reader) {
                    Ok(request) => seen.push(request),
                    Err(_) => break,
                }
                writer.write_all(reply.as_bytes()).unwrap();
            }
            seen
        });
        (port, handle)
    }

    fn bulk_args(request: &Reply) -> Vec<String> {
        match request {
            Reply::Array(items) => items
                .iter()
                .map(|item| match item {
                    Reply::Bulk(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                    other => panic!("non-bulk argument {other:?}"),
                })
                .collect(),
            other => panic!("request is not an array: {other:?}"),
        }
    }

    fn config(port: u16) -> NetworkConfig {
        NetworkConfig {
            port: Some(port),
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = NetworkConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, Some(6379));
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(
            NetworkConfig { port: None, host: "/tmp/s.sock".into(), ..config }.endpoint(),
            Endpoint::Unix(PathBuf::from("/tmp/s.sock"))
        );
    }

    #[test]
    fn test_connects_lazily() {
        let cache = NetworkCache::new(config(1));
        assert!(!cache.is_connected());
    }

    #[test]
    fn test_auth_sent_before_first_command() {
        let (port, server) = scripted_server(vec!["+OK\r\n", ":1\r\n"]);
        let mut cache = NetworkCache::new(NetworkConfig {
            password: Some("secret".to_string()),
            ..config(port)
        });

        assert!(cache.exists(&json!("key")).unwrap());
        drop(cache);

        let requests = server.join().unwrap();
        assert_eq!(bulk_args(&requests[0]), vec!["AUTH", "secret"]);
        assert_eq!(bulk_args(&requests[1]), vec!["EXISTS", "key"]);
    }

    #[test]
    fn test_auth_failure_surfaces() {
        let (port, _server) = scripted_server(vec!["-ERR invalid password\r\n"]);
        let mut cache = NetworkCache::new(NetworkConfig {
            password: Some("wrong".to_string()),
            ..config(port)
        });

        let err = cache.get(&json!("key"), Value::Null).unwrap_err();
        assert!(matches!(err, CacheError::Server(ref m) if m.contains("invalid password")));
        assert!(!cache.is_connected());
    }

    #[test]
    fn test_set_issues_set_then_pexpire() {
        let (port, server) = scripted_server(vec!["+OK\r\n", ":1\r\n"]);
        let mut cache = NetworkCache::new(config(port));

        cache
            .set(&json!("key"), &json!({"foo": "bar"}), Some(Duration::from_millis(1500)))
            .unwrap();
        drop(cache);

        let requests = server.join().unwrap();
        assert_eq!(bulk_args(&requests[0]), vec!["SET", "key", r#"{"foo":"bar"}"#]);
        assert_eq!(bulk_args(&requests[1]), vec!["PEXPIRE", "key", "1500"]);
    }

    #[test]
    fn test_get_falls_back_to_default() {
        let (port, _server) = scripted_server(vec!["$-1\r\n", "$13\r\n{\"foo\":\"bar\"}\r\n"]);
        let mut cache = NetworkCache::new(config(port));

        assert_eq!(cache.get(&json!("k"), json!("dflt")).unwrap(), json!("dflt"));
        assert_eq!(cache.get(&json!("k"), json!("dflt")).unwrap(), json!({"foo": "bar"}));
    }

    #[test]
    fn test_expire_and_touch_commands() {
        let (port, server) = scripted_server(vec![":1\r\n", ":1\r\n", "+OK\r\n"]);
        let mut cache = NetworkCache::new(config(port));

        cache.expire(&json!("k")).unwrap();
        cache.touch(&json!("k"), None).unwrap();
        cache.clear().unwrap();
        drop(cache);

        let requests = server.join().unwrap();
        assert_eq!(bulk_args(&requests[0]), vec!["PEXPIRE", "k", "-1"]);
        assert_eq!(bulk_args(&requests[1]), vec!["PEXPIRE", "k", "300000"]);
        assert_eq!(bulk_args(&requests[2]), vec!["FLUSHALL"]);
    }

    #[test]
    fn test_expiration_from_pttl() {
        let (port, _server) = scripted_server(vec![":-2\r\n", ":-1\r\n", ":5000\r\n"]);
        let mut cache = NetworkCache::new(config(port));

        assert!(cache.expiration(&json!("k")).unwrap().is_none());
        assert!(cache.expiration(&json!("k")).unwrap().is_none());
        let expiration = cache.expiration(&json!("k")).unwrap().unwrap();
        assert_eq!(expiration.expiration(), 5000);
        assert!(expiration.is_live());
    }

    #[test]
    fn test_structured_key_sent_as_json() {
        let (port, server) = scripted_server(vec![":0\r\n"]);
        let mut cache = NetworkCache::new(config(port));

        assert!(!cache.exists(&json!(["user", 1])).unwrap());
        drop(cache);

        let requests = server.join().unwrap();
        assert_eq!(bulk_args(&requests[0]), vec!["EXISTS", r#"["user",1]"#]);
    }

    #[test]
    fn test_zero_ttl_sends_pexpire_zero() {
        let (port, server) = scripted_server(vec!["+OK\r\n", ":1\r\n"]);
        let mut cache = NetworkCache::new(config(port));

        cache.set(&json!("key"), &json!(1), Some(Duration::ZERO)).unwrap();
        drop(cache);

        let requests = server.join().unwrap();
        assert_eq!(bulk_args(&requests[1]), vec!["PEXPIRE", "key", "0"]);
    }

    #[test]
    fn test_unexpected_marker_drops_connection() {
        let (port, _server) = scripted_server(vec!["!oops\r\n"]);
        let mut cache = NetworkCache::new(config(port));

        let err = cache.exists(&json!("k")).unwrap_err();
        assert!(matches!(err, CacheError::Protocol(_)));
        assert!(!cache.is_connected());
    }

    #[test]
    fn test_error_inside_array_keeps_stream_in_sync() {
        let (port, server) = scripted_server(vec!["*2\r\n-ERR inner\r\n:7\r\n", ":0\r\n"]);
        let mut cache = NetworkCache::new(config(port));

        let err = cache.command("mget", &[json!("a"), json!("b")]).unwrap_err();
        assert!(matches!(err, CacheError::Server(_)));
        assert!(cache.is_connected());

        assert!(!cache.exists(&json!("k")).unwrap());
        drop(cache);
        assert_eq!(server.join().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_key_never_connects() {
        let mut cache = NetworkCache::new(config(1));
        assert!(matches!(
            cache.set(&json!(""), &json!(1), None),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(!cache.is_connected());
    }
}
