use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;

/// Outbound path for encoded responses, shared by every session of a tunnel.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn send_response(&self, packet: &[u8], target: SocketAddr) -> std::io::Result<()>;
}

#[async_trait]
impl ResponseSink for UdpSocket {
    async fn send_response(&self, packet: &[u8], target: SocketAddr) -> std::io::Result<()> {
        let sent = self.send_to(packet, target).await?;
        if sent != packet.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short send to {target}: {sent} of {} bytes", packet.len()),
            ));
        }
        Ok(())
    }
}

/// Captures responses on a channel instead of a socket.
#[cfg(test)]
pub struct ChannelSink(pub tokio::sync::mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>);

#[cfg(test)]
#[async_trait]
impl ResponseSink for ChannelSink {
    async fn send_response(&self, packet: &[u8], target: SocketAddr) -> std::io::Result<()> {
        self.0
            .send((packet.to_vec(), target))
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "sink closed"))
    }
}
