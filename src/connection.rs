use crate::broker::AsyncClose;
use crate::error::ConnectError;
use crate::frame::{self, Frame};

use bytes::{Buf, BytesMut};
use std::io::{self, Cursor};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tracing::instrument;

/// Send and receive `Frame` values with a remote peer.
///
/// Frames are read into an internal buffer until a full one is available,
/// and written through a `BufWriter` so each `Frame` only costs a single
/// flush, not one syscall per field.
///
/// The broker holds connections behind `Arc`, shared across every caller
/// racing to use the same node - so the read/write state lives behind a
/// `Mutex` rather than requiring `&mut self`. A connection is still meant
/// to be driven by one reader/writer pipeline at a time; the lock exists
/// for safe sharing, not for concurrent frame interleaving.
#[derive(Debug)]
pub struct Connection {
    io: Mutex<ConnectionIo>,
}

#[derive(Debug)]
struct ConnectionIo {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl Connection {
    /// Create a new `Connection`, backed by `socket`. Read and write buffers
    /// are initialized.
    pub fn new(socket: TcpStream) -> Connection {
        Connection {
            io: Mutex::new(ConnectionIo {
                stream: BufWriter::new(socket),
                // 4KB is plenty for mini-redis-sized frames; a real
                // deployment would size this to its payloads.
                buffer: BytesMut::with_capacity(4 * 1024),
            }),
        }
    }

    /// Read a single `Frame` from the underlying stream, blocking until
    /// enough data has arrived to parse one. Returns `Ok(None)` on a clean
    /// EOF between frames, and an error if the peer disappears mid-frame.
    pub async fn read_frame(&self) -> crate::Result<Option<Frame>> {
        let mut io = self.io.lock().await;
        loop {
            if let Some(frame) = io.parse_frame()? {
                return Ok(Some(frame));
            }

            if 0 == io.stream.read_buf(&mut io.buffer).await? {
                if io.buffer.is_empty() {
                    return Ok(None);
                } else {
                    return Err("connection reset by peer".into());
                }
            }
        }
    }

    /// Write a single `Frame` to the underlying stream.
    pub async fn write_frame(&self, frame: &Frame) -> io::Result<()> {
        let mut io = self.io.lock().await;
        io.write_frame(frame).await
    }
}

impl ConnectionIo {
    /// Tries to parse a frame out of the buffer. `Ok(None)` means more data
    /// is needed; the caller then reads more off the socket.
    fn parse_frame(&mut self) -> crate::Result<Option<Frame>> {
        use frame::Error::Incomplete;

        let mut cursor = Cursor::new(&self.buffer[..]);

        match Frame::check(&mut cursor) {
            Ok(_) => {
                let len = cursor.position() as usize;
                cursor.set_position(0);
                let frame = Frame::parse(&mut cursor)?;
                self.buffer.advance(len);
                Ok(Some(frame))
            }
            Err(Incomplete) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        // Arrays are encoded by encoding their entries; mini-redis's wire
        // format does not need recursive array encoding.
        match frame {
            Frame::Array(vec) => {
                self.stream.write_u8(b'*').await?;
                self.write_decimal(vec.len() as u64).await?;
                for entry in &*vec {
                    self.write_value(entry).await?;
                }
            }
            _ => self.write_value(frame).await?,
        }

        self.stream.flush().await
    }

    async fn write_value(&mut self, frame: &Frame) -> io::Result<()> {
        match frame {
            Frame::Simple(val) => {
                self.stream.write_u8(b'+').await?;
                self.stream.write_all(val.as_bytes()).await?;
                self.stream.write_all(b"\r\n").await?;
            }
            Frame::Error(val) => {
                self.stream.write_u8(b'-').await?;
                self.stream.write_all(val.as_bytes()).await?;
                self.stream.write_all(b"\r\n").await?;
            }
            Frame::Integer(val) => {
                self.stream.write_u8(b':').await?;
                self.write_decimal(*val).await?;
            }
            Frame::Null => {
                self.stream.write_all(b"$-1\r\n").await?;
            }
            Frame::Bulk(val) => {
                let len = val.len();
                self.stream.write_u8(b'$').await?;
                self.write_decimal(len as u64).await?;
                self.stream.write_all(val).await?;
                self.stream.write_all(b"\r\n").await?;
            }
            // Not reachable from `write_frame`'s own `Frame::Array` arm -
            // async fns can't recurse, and nested arrays aren't part of
            // the wire format this connection speaks.
            Frame::Array(_val) => unreachable!(),
        }
        Ok(())
    }

    async fn write_decimal(&mut self, val: u64) -> io::Result<()> {
        use std::io::Write;

        let mut buf = [0u8; 20];
        let mut buf = Cursor::new(&mut buf[..]);
        write!(&mut buf, "{}", val)?;

        let pos = buf.position() as usize;
        self.stream.write_all(&buf.get_ref()[..pos]).await?;
        self.stream.write_all(b"\r\n").await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl AsyncClose for Connection {
    async fn close(&self) {
        let mut io = self.io.lock().await;
        let _ = io.stream.shutdown().await;
    }
}

/// Establishes one TCP connection to `addr` and wraps it in a `Connection`.
///
/// This is the `ConnectionFactory` the broker calls at most once per node
/// key per establishment cycle; it does not retry, pool, or authenticate -
/// those concerns belong above the core, same as in the standalone client.
#[instrument(name = "connect", skip(addr))]
pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Connection, ConnectError> {
    let socket = TcpStream::connect(addr).await?;
    Ok(Connection::new(socket))
}
