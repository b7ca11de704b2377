//! Per-conversation tunnel state machine

use super::{
    BuffConn, EMSK_LENGTH, HandshakeEngine, KEY_EXPORT_LABEL, KeyMaterial, MSK_LENGTH, PeerInfo,
    TlsSession, TunnelError, TunnelEvent,
};
use crate::config::MethodSettings;
use eap_proto::EapType;
use eap_proto::eap::tls::{EapTlsPacket, TlsFragmentAssembler, fragment_tls_message};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of one round through the tunnel
#[derive(Debug)]
pub enum TunnelStep {
    /// Deliver this fragment to the peer
    Send(EapTlsPacket),
    /// Handshake complete and every outbound fragment acknowledged
    Ready,
    /// Decrypted application data from the peer
    Data(Vec<u8>),
    Failed(TunnelError),
}

/// Request-side half of the handshake task
struct Bridge {
    inbound: mpsc::Sender<Vec<u8>>,
    events: mpsc::Receiver<TunnelEvent>,
    task: JoinHandle<()>,
}

impl Bridge {
    fn spawn(engine: Box<dyn HandshakeEngine>, max_outbound: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(1);
        let (events_tx, events_rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            let mut conn = BuffConn::new(inbound_rx, events_tx.clone(), max_outbound);
            let event = match engine.handshake(&mut conn).await {
                Ok((session, peer)) => TunnelEvent::Done {
                    flight: conn.take_outbound(),
                    session,
                    peer,
                },
                Err(TunnelError::ChannelClosed) => {
                    debug!("Handshake abandoned");
                    return;
                }
                Err(e) => TunnelEvent::Failed(e),
            };
            let _ = events_tx.send(event).await;
        });

        Bridge {
            inbound: inbound_tx,
            events: events_rx,
            task,
        }
    }

    /// Hand one message to the task and wait for its answer
    async fn exchange(
        &mut self,
        message: Vec<u8>,
        timeout: Duration,
    ) -> Result<TunnelEvent, TunnelError> {
        let round = async {
            self.inbound
                .send(message)
                .await
                .map_err(|_| TunnelError::ChannelClosed)?;
            self.events.recv().await.ok_or(TunnelError::ChannelClosed)
        };
        tokio::time::timeout(timeout, round)
            .await
            .map_err(|_| TunnelError::Timeout(timeout))?
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum Phase {
    /// Start sent, engine not yet running
    Idle(Option<Box<dyn HandshakeEngine>>),
    Handshaking(Bridge),
    Established(Box<dyn TlsSession>),
    Failed,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Idle(_) => "idle",
            Phase::Handshaking(_) => "handshaking",
            Phase::Established(_) => "established",
            Phase::Failed => "failed",
        }
    }
}

/// Fragmentation and handshake progress of one TLS-based method.
///
/// Outbound fragments still owed to the peer are always delivered, one per
/// acknowledgement, before anything new reaches the engine. Dropping the
/// state aborts a running handshake task.
pub struct TunnelState {
    eap_type: EapType,
    version: u8,
    fragment_size: usize,
    max_message_size: usize,
    timeout: Duration,
    assembler: TlsFragmentAssembler,
    pending: VecDeque<EapTlsPacket>,
    phase: Phase,
    peer: Option<PeerInfo>,
    keys: Option<KeyMaterial>,
}

impl TunnelState {
    pub fn new(
        eap_type: EapType,
        version: u8,
        engine: Box<dyn HandshakeEngine>,
        settings: &MethodSettings,
    ) -> Self {
        TunnelState {
            eap_type,
            version,
            fragment_size: settings.fragment_size,
            max_message_size: settings.max_tls_message_size,
            timeout: settings.handshake_timeout,
            assembler: TlsFragmentAssembler::new(settings.max_tls_message_size),
            pending: VecDeque::new(),
            phase: Phase::Idle(Some(engine)),
            peer: None,
            keys: None,
        }
    }

    pub fn is_established(&self) -> bool {
        matches!(self.phase, Phase::Established(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.phase, Phase::Failed)
    }

    /// Outbound fragments not yet delivered
    pub fn pending_fragments(&self) -> usize {
        self.pending.len()
    }

    pub fn peer(&self) -> Option<&PeerInfo> {
        self.peer.as_ref()
    }

    pub fn keys(&self) -> Option<&KeyMaterial> {
        self.keys.as_ref()
    }

    /// Process the peer's TLS payload for this round. `None` before the
    /// first exchange asks for the Start packet.
    pub async fn step(&mut self, inbound: Option<&EapTlsPacket>) -> TunnelStep {
        match self.advance(inbound).await {
            Ok(step) => step,
            Err(e) => {
                warn!(method = ?self.eap_type, phase = self.phase.name(), error = %e, "Tunnel failed");
                self.fail();
                TunnelStep::Failed(e)
            }
        }
    }

    /// Encrypt application data for the peer and return its first fragment
    pub fn seal(&mut self, plaintext: &[u8]) -> TunnelStep {
        let sealed = match &mut self.phase {
            Phase::Established(session) => session.seal(plaintext),
            _ => Err(TunnelError::Unexpected("tunnel not established")),
        };
        match sealed {
            Ok(records) => {
                self.queue(&records);
                TunnelStep::Send(self.next_fragment())
            }
            Err(e) => {
                warn!(method = ?self.eap_type, error = %e, "Failed to seal tunnel data");
                self.fail();
                TunnelStep::Failed(e)
            }
        }
    }

    async fn advance(&mut self, inbound: Option<&EapTlsPacket>) -> Result<TunnelStep, TunnelError> {
        let Some(packet) = inbound else {
            return match self.phase {
                Phase::Idle(_) => Ok(TunnelStep::Send(EapTlsPacket::start(self.version))),
                _ => Err(TunnelError::Unexpected("round without TLS payload")),
            };
        };

        if !self.pending.is_empty() {
            if !packet.is_ack() {
                return Err(TunnelError::Unexpected("data while fragments are pending"));
            }
            return Ok(TunnelStep::Send(self.next_fragment()));
        }

        let Some(message) = self.assembler.add_fragment(packet)? else {
            debug!(method = ?self.eap_type, "Fragment received, acknowledging");
            return Ok(TunnelStep::Send(EapTlsPacket::ack(self.version)));
        };

        if let Phase::Idle(engine) = &mut self.phase {
            let engine = engine
                .take()
                .ok_or(TunnelError::Unexpected("handshake engine already used"))?;
            debug!(method = ?self.eap_type, "Starting handshake task");
            self.phase = Phase::Handshaking(Bridge::spawn(engine, self.max_message_size));
        }

        match &mut self.phase {
            Phase::Handshaking(bridge) => {
                if message.is_empty() {
                    return Err(TunnelError::Unexpected("acknowledgement outside a fragmented flight"));
                }
                let event = bridge.exchange(message, self.timeout).await?;
                self.on_event(event)
            }
            Phase::Established(session) => {
                if message.is_empty() {
                    return Ok(TunnelStep::Ready);
                }
                Ok(TunnelStep::Data(session.open(&message)?))
            }
            Phase::Idle(_) | Phase::Failed => Err(TunnelError::Unexpected("tunnel is not running")),
        }
    }

    fn on_event(&mut self, event: TunnelEvent) -> Result<TunnelStep, TunnelError> {
        match event {
            TunnelEvent::Flight(flight) => {
                debug!(method = ?self.eap_type, bytes = flight.len(), "Handshake flight");
                self.queue(&flight);
                Ok(TunnelStep::Send(self.next_fragment()))
            }
            TunnelEvent::Done {
                flight,
                session,
                peer,
            } => {
                let exported =
                    session.export_keying_material(KEY_EXPORT_LABEL, MSK_LENGTH + EMSK_LENGTH)?;
                self.keys = Some(KeyMaterial::from_exported(exported)?);
                info!(
                    method = ?self.eap_type,
                    version = ?peer.protocol_version,
                    cipher_suite = ?peer.cipher_suite,
                    client = ?peer.client_common_name,
                    "TLS handshake complete"
                );
                self.peer = Some(peer);
                self.phase = Phase::Established(session);

                if flight.is_empty() {
                    Ok(TunnelStep::Ready)
                } else {
                    self.queue(&flight);
                    Ok(TunnelStep::Send(self.next_fragment()))
                }
            }
            TunnelEvent::Failed(e) => Err(e),
        }
    }

    fn queue(&mut self, data: &[u8]) {
        self.pending
            .extend(fragment_tls_message(data, self.fragment_size, self.version));
    }

    /// Next owed fragment, or an acknowledgement when nothing is owed
    fn next_fragment(&mut self) -> EapTlsPacket {
        self.pending
            .pop_front()
            .unwrap_or_else(|| EapTlsPacket::ack(self.version))
    }

    fn fail(&mut self) {
        self.pending.clear();
        self.assembler.reset();
        self.phase = Phase::Failed;
    }
}

impl fmt::Debug for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelState")
            .field("eap_type", &self.eap_type)
            .field("phase", &self.phase.name())
            .field("pending", &self.pending.len())
            .field("peer", &self.peer)
            .finish()
    }
}
