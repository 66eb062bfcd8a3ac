//! Length-prefixed framing used by the broker (and by Kerberos over TCP).
//!
//! ```not_rust
//! +-------------------------+----------------------+
//! | length (u32 big-endian) | payload (length) ... |
//! +-------------------------+----------------------+
//! ```

use std::io::{self, Read, Write};
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{GssapiError, Result};

/// Size of the length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest payload whose frame still fits in a signed 32-bit length.
pub const MAX_PAYLOAD_LEN: usize = i32::MAX as usize - FRAME_HEADER_LEN;

/// Exclusive blocking access to the broker byte stream for the duration of one handshake.
pub trait BrokerConnection: Read + Write {
    /// Broker address as `host[:port]`.
    fn broker_addr(&self) -> &str;

    fn update_outgoing_metrics(&mut self, _bytes_written: usize) {}

    fn update_incoming_metrics(&mut self, _bytes_read: usize, _latency: Duration) {}
}

/// Traffic counters of a [`BrokerStream`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrafficMetrics {
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub requests: u64,
    pub responses: u64,
    pub last_latency: Option<Duration>,
}

/// [`BrokerConnection`] over any blocking stream (`TcpStream`, TLS stream, ...).
///
/// Deadlines are configured on the inner stream.
#[derive(Debug)]
pub struct BrokerStream<S> {
    stream: S,
    addr: String,
    metrics: TrafficMetrics,
}

impl<S: Read + Write> BrokerStream<S> {
    pub fn new(stream: S, addr: impl Into<String>) -> Self {
        Self {
            stream,
            addr: addr.into(),
            metrics: TrafficMetrics::default(),
        }
    }

    pub fn metrics(&self) -> &TrafficMetrics {
        &self.metrics
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read> Read for BrokerStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl<S: Write> Write for BrokerStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl<S: Read + Write> BrokerConnection for BrokerStream<S> {
    fn broker_addr(&self) -> &str {
        &self.addr
    }

    fn update_outgoing_metrics(&mut self, bytes_written: usize) {
        self.metrics.bytes_written += bytes_written as u64;
        self.metrics.requests += 1;
    }

    fn update_incoming_metrics(&mut self, bytes_read: usize, latency: Duration) {
        self.metrics.bytes_read += bytes_read as u64;
        self.metrics.responses += 1;
        self.metrics.last_latency = Some(latency);
    }
}

/// Encodes `payload` into a single frame.
///
/// Fails with [`GssapiError::Oversize`] when the frame would not fit in a signed 32-bit length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let size = frame_size(payload.len())?;

    let mut frame = vec![0; size];
    BigEndian::write_u32(&mut frame[..FRAME_HEADER_LEN], payload.len() as u32);
    frame[FRAME_HEADER_LEN..].copy_from_slice(payload);

    Ok(frame)
}

fn frame_size(payload_len: usize) -> Result<usize> {
    check_payload_len(payload_len)?;

    Ok(payload_len + FRAME_HEADER_LEN)
}

fn check_payload_len(payload_len: usize) -> Result<()> {
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(GssapiError::Oversize { len: payload_len });
    }

    Ok(())
}

/// Writes one frame and returns the number of bytes written.
pub fn write_frame(mut to: impl Write, payload: &[u8]) -> Result<usize> {
    let frame = encode_frame(payload)?;

    to.write_all(&frame)?;
    to.flush()?;

    Ok(frame.len())
}

/// Reads one frame and returns its payload with the total number of bytes read.
pub fn read_frame(from: impl Read) -> Result<(Vec<u8>, usize)> {
    let mut read = 0;
    let payload = read_frame_counting(from, &mut read)?;

    Ok((payload, read))
}

/// Reads one frame, adding every byte consumed to `read`, also when the frame is rejected.
///
/// The declared length is checked against [`MAX_PAYLOAD_LEN`] before anything is allocated and the
/// payload buffer only grows with the bytes actually received.
pub fn read_frame_counting(mut from: impl Read, read: &mut usize) -> Result<Vec<u8>> {
    let mut header = [0; FRAME_HEADER_LEN];
    read_header(&mut from, &mut header, read)?;

    let payload_len = BigEndian::read_u32(&header) as usize;
    check_payload_len(payload_len)?;

    let mut payload = Vec::new();
    let result = from.by_ref().take(payload_len as u64).read_to_end(&mut payload);
    *read += payload.len();
    result?;

    if payload.len() < payload_len {
        return Err(GssapiError::TruncatedRead {
            expected: payload_len,
            read: payload.len(),
        });
    }

    Ok(payload)
}

fn read_header(mut from: impl Read, header: &mut [u8; FRAME_HEADER_LEN], total: &mut usize) -> Result<()> {
    let mut read = 0;

    while read < header.len() {
        match from.read(&mut header[read..]) {
            Ok(0) => {
                return Err(GssapiError::TruncatedRead {
                    expected: header.len(),
                    read,
                })
            }
            Ok(n) => {
                read += n;
                *total += n;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
