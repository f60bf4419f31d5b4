use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{OvtError, Result};
use crate::metrics::StreamMetrics;
use crate::protocol::{HEADER_SIZE, OvtPacket};

/// Client side of one origin TCP connection.
///
/// Owns the read side of the socket. Every read is bounded by the
/// configured receive timeout and counted into the metrics sink, so bytes
/// reported always equal bytes consumed. Packet headers are validated
/// before any payload byte is read.
pub struct OriginConnection {
    stream: TcpStream,
    max_packet_size: usize,
    recv_timeout: Duration,
    metrics: Option<Arc<dyn StreamMetrics>>,
}

impl std::fmt::Debug for OriginConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginConnection").finish_non_exhaustive()
    }
}

impl OriginConnection {
    /// Connect to `host:port` with a bounded connect timeout, then arm the
    /// per-read receive timeout.
    pub fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        recv_timeout: Duration,
        max_packet_size: usize,
        metrics: Option<Arc<dyn StreamMetrics>>,
    ) -> Result<Self> {
        let addr_display = format!("{host}:{port}");
        let addrs: Vec<_> = (host, port)
            .to_socket_addrs()
            .map_err(|e| OvtError::ConnectFailed {
                addr: addr_display.clone(),
                reason: format!("address resolution failed: {e}"),
            })?
            .collect();

        let mut last_error = None;
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, connect_timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(recv_timeout))
                        .map_err(|e| OvtError::ConnectFailed {
                            addr: addr_display.clone(),
                            reason: format!("cannot set receive timeout: {e}"),
                        })?;
                    tracing::debug!(addr = %addr, "connected to origin");
                    return Ok(Self {
                        stream,
                        max_packet_size,
                        recv_timeout,
                        metrics,
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(OvtError::ConnectFailed {
            addr: addr_display,
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no addresses resolved".to_string()),
        })
    }

    /// Receive timeout this connection was armed with.
    pub fn recv_timeout(&self) -> Duration {
        self.recv_timeout
    }

    /// Send one packet in full. A short or failed write is [`OvtError::SendFailed`].
    pub fn send_packet(&mut self, packet: &OvtPacket) -> Result<()> {
        send_on(&mut self.stream, packet)
    }

    /// Receive one packet: read and validate the fixed header, then read
    /// exactly the announced payload.
    ///
    /// An oversize or otherwise invalid header fails before any payload
    /// byte is consumed.
    pub fn receive_packet(&mut self) -> Result<OvtPacket> {
        let mut header = [0u8; HEADER_SIZE];
        self.read_full(&mut header)?;

        let mut packet = OvtPacket::parse_header(&header, self.max_packet_size)?;
        let payload_length = packet.payload_length() as usize;
        if payload_length > 0 {
            let mut payload = vec![0u8; payload_length];
            self.read_full(&mut payload)?;
            packet.set_payload(payload);
        }
        Ok(packet)
    }

    /// Receive one logical message: packet payloads concatenated until the
    /// marker packet arrives. Payload content is not inspected.
    pub fn receive_message(&mut self) -> Result<Vec<u8>> {
        let mut message = Vec::new();
        loop {
            let mut packet = self.receive_packet()?;
            message.append(&mut packet.take_payload());
            if packet.marker {
                return Ok(message);
            }
        }
    }

    /// Clone the write half, for sending Stop while the worker owns reads.
    pub fn writer(&self) -> Result<OriginWriter> {
        let stream = self
            .stream
            .try_clone()
            .map_err(|e| OvtError::SendFailed(format!("cannot clone socket: {e}")))?;
        Ok(OriginWriter { stream })
    }

    /// Fill `buf` completely, counting every byte into the metrics sink.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < buf.len() {
            match self.stream.read(&mut buf[offset..]) {
                Ok(0) => {
                    return Err(OvtError::RecvFailed(
                        "connection closed by origin".to_string(),
                    ));
                }
                Ok(n) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.increase_bytes_in(n as u64);
                    }
                    offset += n;
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    return Err(OvtError::RecvFailed(
                        "no data from origin within receive timeout".to_string(),
                    ));
                }
                Err(e) => return Err(OvtError::RecvFailed(e.to_string())),
            }
        }
        Ok(())
    }
}

/// Write half of an origin connection, split off for the Stop request.
pub struct OriginWriter {
    stream: TcpStream,
}

impl OriginWriter {
    /// Send one packet in full.
    pub fn send_packet(&mut self, packet: &OvtPacket) -> Result<()> {
        send_on(&mut self.stream, packet)
    }
}

fn send_on(stream: &mut TcpStream, packet: &OvtPacket) -> Result<()> {
    let wire = packet.serialize();
    stream
        .write_all(&wire)
        .and_then(|_| stream.flush())
        .map_err(|e| OvtError::SendFailed(e.to_string()))
}
