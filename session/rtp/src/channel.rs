use std::{io, net::SocketAddr};

/// Socket options the session forwards to the transport at bind time.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelConfig {
    pub send_buffer_size: Option<usize>,
    pub receive_buffer_size: Option<usize>,
}

/// Seam between the session and whatever actually moves datagrams.
/// The session binds one channel for data and one for control and
/// never learns anything else about the transport.
pub trait DatagramTransport: Send + Sync {
    fn bind(
        &self,
        address: SocketAddr,
        config: &ChannelConfig,
    ) -> io::Result<Box<dyn DatagramChannel>>;
}

pub trait DatagramChannel: Send + Sync {
    fn local_addr(&self) -> SocketAddr;
    /// Best effort, a false return means the datagram was dropped.
    fn send(&self, payload: &[u8], destination: SocketAddr) -> bool;
    fn close(&self);
}
