//! In-memory duplex stream between the handshake task and the request handler

use super::{TunnelError, TunnelEvent};
use std::io;
use tokio::sync::mpsc;

/// The handshake engine's view of the peer.
///
/// Reads block on the inbound channel until the request handler delivers the
/// next reassembled message. Writes accumulate in a bounded buffer; the
/// accumulated flight is sent to the request handler just before the engine
/// blocks on its next read, so every inbound message is answered by exactly
/// one flight, possibly empty.
#[derive(Debug)]
pub struct BuffConn {
    inbound: mpsc::Receiver<Vec<u8>>,
    events: mpsc::Sender<TunnelEvent>,
    outbound: Vec<u8>,
    max_outbound: usize,
    owes_flight: bool,
}

impl BuffConn {
    pub fn new(
        inbound: mpsc::Receiver<Vec<u8>>,
        events: mpsc::Sender<TunnelEvent>,
        max_outbound: usize,
    ) -> Self {
        BuffConn {
            inbound,
            events,
            outbound: Vec::new(),
            max_outbound,
            owes_flight: false,
        }
    }

    /// Next inbound message, in arrival order.
    ///
    /// Returns [`TunnelError::ChannelClosed`] once the request side has gone,
    /// which is how an abandoned handshake unwinds.
    pub async fn read(&mut self) -> Result<Vec<u8>, TunnelError> {
        if self.owes_flight {
            self.owes_flight = false;
            let flight = self.take_outbound();
            self.events
                .send(TunnelEvent::Flight(flight))
                .await
                .map_err(|_| TunnelError::ChannelClosed)?;
        }

        let message = self.inbound.recv().await.ok_or(TunnelError::ChannelClosed)?;
        self.owes_flight = true;
        Ok(message)
    }

    /// Everything written since the last flight
    pub fn take_outbound(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound)
    }

    pub fn pending_outbound(&self) -> usize {
        self.outbound.len()
    }
}

impl io::Write for BuffConn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.outbound.len() + buf.len() > self.max_outbound {
            return Err(io::Error::other(TunnelError::BufferOverflow {
                max: self.max_outbound,
            }));
        }
        self.outbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
