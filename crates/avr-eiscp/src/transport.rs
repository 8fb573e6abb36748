//! Async framing of eISCP packets over TCP streams and UDP sockets

use anyhow::Result;
use avr_core::DriverError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::trace;

use crate::packet::{self, Message, PacketError, HEADER_SIZE};

impl From<PacketError> for DriverError {
    fn from(e: PacketError) -> Self {
        DriverError::Io(e.to_string())
    }
}

/// Read one packet from a stream
pub async fn read_message<R>(reader: &mut R) -> Result<Message, DriverError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;
    let data_size = packet::decode_header(&header)?;

    let mut body = vec![0u8; data_size];
    reader.read_exact(&mut body).await?;

    let message = packet::decode_body(&body)?;
    trace!(message = %message.to_iscp(), "<- eISCP");
    Ok(message)
}

/// Write one packet to a stream
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), DriverError>
where
    W: AsyncWrite + Unpin,
{
    trace!(message = %message.to_iscp(), "-> eISCP");
    writer.write_all(&packet::encode(message)).await?;
    writer.flush().await?;
    Ok(())
}

/// Broadcast a message over UDP and collect every decodable reply until the window closes
pub async fn broadcast_collect(
    socket: &UdpSocket,
    targets: &[SocketAddr],
    message: &Message,
    window: Duration,
) -> Result<Vec<(SocketAddr, Message)>> {
    let packet = packet::encode(message);
    for target in targets {
        socket.send_to(&packet, target).await?;
        trace!(target = %target, message = %message.to_iscp(), "-> eISCP broadcast");
    }

    let mut replies = Vec::new();
    let mut buf = [0u8; 1024];
    let deadline = tokio::time::Instant::now() + window;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, from))) => match packet::decode(&buf[..len]) {
                Ok(reply) => {
                    trace!(from = %from, message = %reply.to_iscp(), "<- eISCP broadcast");
                    replies.push((from, reply));
                }
                Err(e) => trace!(from = %from, error = %e, "Ignoring non-eISCP datagram"),
            },
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => break,
        }
    }

    Ok(replies)
}
