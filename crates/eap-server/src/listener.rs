use crate::config::{Config, ConfigError};
use crate::negotiate::Negotiator;
use crate::response::{EapRadiusHandler, ResponseError};
use crate::session::MemorySessionStore;
use eap_proto::{Packet, PacketError};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("Response error: {0}")]
    Response(#[from] ResponseError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid client")]
    InvalidClient,
}

/// UDP front end feeding Access-Requests into an [`EapRadiusHandler`]
pub struct EapServer {
    config: Arc<Config>,
    handler: Arc<EapRadiusHandler>,
    socket: Arc<UdpSocket>,
}

impl EapServer {
    pub async fn new(config: Config, handler: EapRadiusHandler) -> Result<Self, ServerError> {
        let bind_addr = config.socket_addr()?;
        Self::bind(bind_addr, config, handler).await
    }

    /// Listen on `bind_addr` instead of the configured address
    pub async fn bind(
        bind_addr: SocketAddr,
        config: Config,
        handler: EapRadiusHandler,
    ) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(bind_addr).await?;
        info!("EAP RADIUS server listening on {}", socket.local_addr()?);

        Ok(EapServer {
            config: Arc::new(config),
            handler: Arc::new(handler),
            socket: Arc::new(socket),
        })
    }

    /// Server with the default methods, an in-memory session store and the
    /// configured users and certificate
    pub async fn from_config(config: Config) -> Result<Self, ServerError> {
        let negotiator = Negotiator::from_config(&config)?;
        let store = MemorySessionStore::new(config.eap.session_ttl());
        let handler = EapRadiusHandler::new(Arc::new(negotiator), Arc::new(store));
        Self::new(config, handler).await
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.socket.local_addr().map_err(ServerError::from)
    }

    pub async fn run(&self) -> Result<(), ServerError> {
        let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];

        loop {
            let (len, addr) = self.socket.recv_from(&mut buf).await?;
            let data = buf[..len].to_vec();

            let config = Arc::clone(&self.config);
            let handler = Arc::clone(&self.handler);
            let socket = Arc::clone(&self.socket);

            tokio::spawn(async move {
                if let Err(e) = Self::handle_datagram(data, addr, config, handler, socket).await {
                    debug!("Error handling request from {}: {}", addr, e);
                }
            });
        }
    }

    async fn handle_datagram(
        data: Vec<u8>,
        addr: SocketAddr,
        config: Arc<Config>,
        handler: Arc<EapRadiusHandler>,
        socket: Arc<UdpSocket>,
    ) -> Result<(), ServerError> {
        if !is_client_authorized(&config, addr.ip()) {
            warn!(client_ip = %addr.ip(), "Rejected request from unauthorized client");
            return Err(ServerError::InvalidClient);
        }

        let request = Packet::decode(&data)?;
        debug!(
            client_ip = %addr.ip(),
            request_id = request.identifier,
            attributes = request.attributes.len(),
            "Received Access-Request"
        );

        let secret = config.get_secret_for_client(addr.ip());
        let response = handler.handle_access_request(&request, secret).await?;

        socket.send_to(&response.encode()?, addr).await?;
        debug!(
            client_ip = %addr.ip(),
            request_id = response.identifier,
            code = ?response.code,
            "Sent reply"
        );
        Ok(())
    }
}

/// Every source is allowed while no client is configured
fn is_client_authorized(config: &Config, source_ip: IpAddr) -> bool {
    config.clients.is_empty() || config.find_client(source_ip).is_some()
}
