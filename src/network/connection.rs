//! Connection Module
//!
//! Blocking socket transport (TCP or Unix domain socket) carrying the wire
//! protocol.

use std::io::{self, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use super::protocol::{encode_command, read_reply, Reply};
use crate::error::{CacheError, Result};

// == Endpoint ==
/// Where the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

#[derive(Debug)]
enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Stream::Unix(s) => s.flush(),
        }
    }
}

// == Connection ==
/// One open socket to the server.
#[derive(Debug)]
pub struct Connection {
    stream: BufReader<Stream>,
}

impl Connection {
    // == Open ==
    /// Connects to `endpoint`. `timeout` bounds TCP connection setup; zero
    /// means no bound.
    pub fn open(endpoint: &Endpoint, timeout: Duration) -> Result<Self> {
        let stream = match endpoint {
            Endpoint::Tcp { host, port } => Stream::Tcp(connect_tcp(host, *port, timeout)?),
            Endpoint::Unix(path) => connect_unix(path)?,
        };
        Ok(Self {
            stream: BufReader::new(stream),
        })
    }

    // == Call ==
    /// Sends one command and waits for its reply.
    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Reply> {
        let frame = encode_command(name, args)?;
        let writer = self.stream.get_mut();
        writer.write_all(&frame)?;
        writer.flush()?;
        read_reply(&mut self.stream)
    }
}

fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let addrs = (host, port).to_socket_addrs().map_err(connect_error)?;

    let mut last_error = None;
    for addr in addrs {
        let attempt = if timeout.is_zero() {
            TcpStream::connect(addr)
        } else {
            TcpStream::connect_timeout(&addr, timeout)
        };
        match attempt {
            Ok(stream) => {
                stream.set_nodelay(true).map_err(connect_error)?;
                return Ok(stream);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(match last_error {
        Some(e) => connect_error(e),
        None => CacheError::Connection {
            code: -1,
            message: format!("no address found for {host}"),
        },
    })
}

#[cfg(unix)]
fn connect_unix(path: &Path) -> Result<Stream> {
    UnixStream::connect(path)
        .map(Stream::Unix)
        .map_err(connect_error)
}

#[cfg(not(unix))]
fn connect_unix(path: &Path) -> Result<Stream> {
    Err(CacheError::Connection {
        code: -1,
        message: format!("unix sockets are not supported here: {}", path.display()),
    })
}

fn connect_error(e: io::Error) -> CacheError {
    CacheError::Connection {
        code: e.raw_os_error().unwrap_or(-1),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{BufRead, BufReader as StdBufReader};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_endpoint_display() {
        let tcp = Endpoint::Tcp {
            host: "127.0.0.1".to_string(),
            port: 6379,
        };
        assert_eq!(tcp.to_string(), "tcp://127.0.0.1:6379");
        assert_eq!(
            Endpoint::Unix(PathBuf::from("/tmp/cache.sock")).to_string(),
            "unix:///tmp/cache.sock"
        );
    }

    #[test]
    fn test_refused_connection() {
        // Bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let endpoint = Endpoint::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        };
        let err = Connection::open(&endpoint, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CacheError::Connection { code, .. } if code != 0));
    }

    #[test]
    fn test_call_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            let mut reader = StdBufReader::new(socket.try_clone().unwrap());
            let request = read_reply(&mut reader).unwrap();
            let mut socket = socket;
            socket.write_all(b"+PONG\r\n").unwrap();
            // Drain until the client hangs up
            let mut rest = String::new();
            let _ = reader.read_line(&mut rest);
            request
        });

        let endpoint = Endpoint::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        };
        let mut connection = Connection::open(&endpoint, Duration::from_secs(1)).unwrap();
        let reply = connection.call("ping", &[json!("hi")]).unwrap();
        assert_eq!(reply, Reply::Status("PONG".to_string()));
        drop(connection);

        let request = server.join().unwrap();
        assert_eq!(
            request,
            Reply::Array(vec![Reply::Bulk(b"PING".to_vec()), Reply::Bulk(b"hi".to_vec())])
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_socket_missing() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::Unix(dir.path().join("missing.sock"));
        let err = Connection::open(&endpoint, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CacheError::Connection { .. }));
    }
}
