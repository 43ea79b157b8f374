//! This module declares the redis reader. It speaks RESP, the redis
//! serialization protocol, over a Unix socket or a TCP connection.
//!
//! Reference: https://redis.io/docs/reference/protocol-spec/

use std::io::prelude::*;
use std::io::{BufReader, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

use log::{debug, error, trace, warn};

use super::KbStore;
use crate::errors::CacheError;

/// A RESP value.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    /// None is the null bulk string.
    BulkString(Option<Vec<u8>>),
    /// None is the null array.
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Encodes a command as an array of bulk strings.
    pub fn command(args: &[&str]) -> Self {
        RespValue::Array(Some(
            args.iter()
                .map(|arg| RespValue::BulkString(Some(arg.as_bytes().to_vec())))
                .collect(),
        ))
    }

    /// Encode RESP value to bytes
    pub fn encode(&self) -> Vec<u8> {
        match self {
            RespValue::SimpleString(s) => format!("+{}\r\n", s).into_bytes(),
            RespValue::Error(e) => format!("-{}\r\n", e).into_bytes(),
            RespValue::Integer(i) => format!(":{}\r\n", i).into_bytes(),
            RespValue::BulkString(None) => b"$-1\r\n".to_vec(),
            RespValue::BulkString(Some(data)) => {
                let mut bytes = format!("${}\r\n", data.len()).into_bytes();
                bytes.extend_from_slice(data);
                bytes.extend_from_slice(b"\r\n");
                bytes
            }
            RespValue::Array(None) => b"*-1\r\n".to_vec(),
            RespValue::Array(Some(arr)) => {
                let mut bytes = format!("*{}\r\n", arr.len()).into_bytes();
                for val in arr {
                    bytes.extend_from_slice(&val.encode());
                }
                bytes
            }
        }
    }

    /// Extract a string, None for the null bulk string.
    pub fn into_string(self) -> Result<Option<String>, CacheError> {
        match self {
            RespValue::SimpleString(s) => Ok(Some(s)),
            RespValue::BulkString(Some(data)) => match String::from_utf8(data) {
                Ok(s) => Ok(Some(s)),
                Err(e) => {
                    debug!("Replacing invalid UTF-8 in a stored value: {}", e);
                    Ok(Some(String::from_utf8_lossy(e.as_bytes()).to_string()))
                }
            },
            RespValue::BulkString(None) => Ok(None),
            other => Err(unexpected("a string", &other)),
        }
    }

    /// Extract an integer.
    pub fn into_integer(self) -> Result<i64, CacheError> {
        match self {
            RespValue::Integer(i) => Ok(i),
            other => Err(unexpected("an integer", &other)),
        }
    }

    /// Extract an array of strings. The null array is empty.
    pub fn into_strings(self) -> Result<Vec<String>, CacheError> {
        match self {
            RespValue::Array(None) => Ok(Vec::new()),
            RespValue::Array(Some(values)) => values
                .into_iter()
                .map(|v| v.into_string().map(Option::unwrap_or_default))
                .collect(),
            other => Err(unexpected("an array", &other)),
        }
    }

    /// Checks the reply is +OK.
    pub fn expect_ok(self) -> Result<(), CacheError> {
        match self {
            RespValue::SimpleString(ref s) if s == "OK" => Ok(()),
            other => Err(unexpected("OK", &other)),
        }
    }
}

fn unexpected(wanted: &str, got: &RespValue) -> CacheError {
    CacheError::UnexpectedReply(format!("wanted {}, got {:?}", wanted, got))
}

fn io_error(e: std::io::Error) -> CacheError {
    match e.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => {
            CacheError::StoreUnavailable("timed out".to_string())
        }
        _ => CacheError::StoreUnavailable(e.to_string()),
    }
}

/// The longest bulk string redis accepts (proto-max-bulk-len).
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Arrays are not pre-sized beyond this, their length comes from the wire.
const MAX_PREALLOCATED: i64 = 1024;

/// Reads a line and strips its CRLF.
fn read_line<R: BufRead>(reader: &mut R) -> Result<String, CacheError> {
    let mut line = String::new();
    let read = reader.read_line(&mut line).map_err(io_error)?;
    if read == 0 {
        return Err(CacheError::StoreUnavailable(
            "connection closed by the store".to_string(),
        ));
    }
    Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
}

fn parse_length(text: &str) -> Result<i64, CacheError> {
    text.parse::<i64>()
        .map_err(|_| CacheError::UnexpectedReply(format!("invalid length {:?}", text)))
}

/// Reads one RESP value.
pub fn read_value<R: BufRead>(reader: &mut R) -> Result<RespValue, CacheError> {
    let line = read_line(reader)?;
    let mut chars = line.chars();
    let kind = chars
        .next()
        .ok_or_else(|| CacheError::UnexpectedReply("empty line".to_string()))?;
    let rest = chars.as_str();

    match kind {
        '+' => Ok(RespValue::SimpleString(rest.to_string())),
        '-' => Ok(RespValue::Error(rest.to_string())),
        ':' => Ok(RespValue::Integer(parse_length(rest)?)),
        '$' => {
            let len = parse_length(rest)?;
            if len < 0 {
                return Ok(RespValue::BulkString(None));
            }
            if len > MAX_BULK_LEN {
                return Err(CacheError::UnexpectedReply(format!(
                    "bulk string of {} bytes",
                    len
                )));
            }
            // The data and its trailing CRLF
            let size = (len as usize).checked_add(2).ok_or_else(|| {
                CacheError::UnexpectedReply(format!("bulk string of {} bytes", len))
            })?;
            let mut data = vec![0u8; size];
            reader.read_exact(&mut data).map_err(io_error)?;
            data.truncate(len as usize);
            Ok(RespValue::BulkString(Some(data)))
        }
        '*' => {
            let len = parse_length(rest)?;
            if len < 0 {
                return Ok(RespValue::Array(None));
            }
            let mut elements = Vec::with_capacity(len.min(MAX_PREALLOCATED) as usize);
            for _ in 0..len {
                elements.push(read_value(reader)?);
            }
            Ok(RespValue::Array(Some(elements)))
        }
        other => Err(CacheError::UnexpectedReply(format!(
            "unknown RESP type {:?}",
            other
        ))),
    }
}

/// The socket under a redis connection.
enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Transport {
    fn try_clone(&self) -> std::io::Result<Self> {
        match self {
            Transport::Tcp(s) => s.try_clone().map(Transport::Tcp),
            #[cfg(unix)]
            Transport::Unix(s) => s.try_clone().map(Transport::Unix),
        }
    }

    fn set_timeouts(&self, timeout: Duration) -> std::io::Result<()> {
        match self {
            Transport::Tcp(s) => {
                s.set_read_timeout(Some(timeout))?;
                s.set_write_timeout(Some(timeout))
            }
            #[cfg(unix)]
            Transport::Unix(s) => {
                s.set_read_timeout(Some(timeout))?;
                s.set_write_timeout(Some(timeout))
            }
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Transport::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Transport::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Transport::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Transport::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Transport::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Transport::Unix(s) => s.flush(),
        }
    }
}

/// A connection to a redis server.
pub struct RedisKb {
    /// Where the connection goes, for logs
    address: String,
    writer: Transport,
    reader: BufReader<Transport>,
    /// Set once a request failed half way. The stream may still hold the
    /// reply of that request, so nothing else is read from it.
    broken: bool,
}

impl RedisKb {
    /// Connects to redis.
    /// An address starting with a / is a Unix socket, anything else is
    /// host:port. Every round-trip is bounded by `timeout`, and so is the
    /// TCP connection. Connecting to a Unix socket does not block on a
    /// local server, so it is done without a timeout.
    pub fn connect(address: &str, timeout: Duration) -> Result<Self, CacheError> {
        trace!("Running RedisKb::connect()");
        let transport = if address.starts_with('/') {
            connect_unix(address)?
        } else {
            let socket_addr = address
                .to_socket_addrs()
                .map_err(io_error)?
                .next()
                .ok_or_else(|| {
                    CacheError::StoreUnavailable(format!("unable to resolve {}", address))
                })?;
            Transport::Tcp(TcpStream::connect_timeout(&socket_addr, timeout).map_err(io_error)?)
        };
        transport.set_timeouts(timeout).map_err(io_error)?;
        let reader = BufReader::new(transport.try_clone().map_err(io_error)?);
        debug!("Connected to the knowledge base at {}", address);

        Ok(RedisKb {
            address: address.to_string(),
            writer: transport,
            reader,
            broken: false,
        })
    }

    /// Sends a command and reads its reply.
    /// An error reply is turned into [`CacheError::UnexpectedReply`].
    /// After a failed round-trip every command fails with
    /// [`CacheError::StoreUnavailable`], a new connection is needed.
    pub fn send_command(&mut self, args: &[&str]) -> Result<RespValue, CacheError> {
        trace!("Sending {:?} to {}", args.first(), self.address);
        if self.broken {
            return Err(CacheError::StoreUnavailable(format!(
                "the connection to {} is out of sync",
                self.address
            )));
        }

        let reply = self.round_trip(args);
        if let Err(e) = &reply {
            warn!("Giving up the connection to {}: {}", self.address, e);
            self.broken = true;
        }

        match reply? {
            RespValue::Error(e) => {
                error!("{} replied with an error: {}", self.address, e);
                Err(CacheError::UnexpectedReply(e))
            }
            value => Ok(value),
        }
    }

    fn round_trip(&mut self, args: &[&str]) -> Result<RespValue, CacheError> {
        let bytes = RespValue::command(args).encode();
        self.writer.write_all(&bytes).map_err(io_error)?;
        self.writer.flush().map_err(io_error)?;
        read_value(&mut self.reader)
    }
}

#[cfg(unix)]
fn connect_unix(path: &str) -> Result<Transport, CacheError> {
    UnixStream::connect(path)
        .map(Transport::Unix)
        .map_err(io_error)
}

#[cfg(not(unix))]
fn connect_unix(path: &str) -> Result<Transport, CacheError> {
    Err(CacheError::StoreUnavailable(format!(
        "unix sockets are not supported here: {}",
        path
    )))
}

impl KbStore for RedisKb {
    fn select(&mut self, index: usize) -> Result<(), CacheError> {
        self.send_command(&["SELECT", &index.to_string()])?.expect_ok()
    }

    fn dbsize(&mut self) -> Result<usize, CacheError> {
        let size = self.send_command(&["DBSIZE"])?.into_integer()?;
        Ok(size.max(0) as usize)
    }

    fn keys(&mut self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.send_command(&["KEYS", pattern])?.into_strings()
    }

    fn config_get(&mut self, parameter: &str) -> Result<Option<String>, CacheError> {
        // The reply is [name, value], or empty for an unknown parameter
        let pair = self
            .send_command(&["CONFIG", "GET", parameter])?
            .into_strings()?;
        Ok(pair.into_iter().nth(1))
    }

    fn get(&mut self, key: &str) -> Result<Option<String>, CacheError> {
        self.send_command(&["GET", key])?.into_string()
    }

    fn lrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, CacheError> {
        self.send_command(&["LRANGE", key, &start.to_string(), &stop.to_string()])?
            .into_strings()
    }

    fn lindex(&mut self, key: &str, index: i64) -> Result<Option<String>, CacheError> {
        self.send_command(&["LINDEX", key, &index.to_string()])?
            .into_string()
    }

    fn hsetnx(&mut self, key: &str, field: &str, value: &str) -> Result<bool, CacheError> {
        Ok(self.send_command(&["HSETNX", key, field, value])?.into_integer()? == 1)
    }

    fn hdel(&mut self, key: &str, field: &str) -> Result<bool, CacheError> {
        Ok(self.send_command(&["HDEL", key, field])?.into_integer()? > 0)
    }

    fn flushdb(&mut self) -> Result<(), CacheError> {
        self.send_command(&["FLUSHDB"])?.expect_ok()
    }
}
