//! NetworkSink - one UDP datagram per frame
//!
//! Delivery is best-effort: a failed `send` is logged and counted, but the
//! write still succeeds so the consumer keeps receiving later frames.
//! Frames that do not fit in a datagram are rejected as write failures.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;

use contracts::{ContractError, DataSink, Frame};
use tokio::net::UdpSocket;
use tracing::{debug, instrument, warn};

/// Largest UDP payload over IPv4
pub const MAX_DATAGRAM: usize = 65_507;

const DEFAULT_MAX_PACKET: usize = 65_000;

/// Wire encoding of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkFormat {
    #[default]
    Json,
    Bincode,
}

impl NetworkFormat {
    fn encode(self, frame: &Frame) -> Result<Vec<u8>, String> {
        match self {
            Self::Json => serde_json::to_vec(frame).map_err(|e| e.to_string()),
            Self::Bincode => bincode::serialize(frame).map_err(|e| e.to_string()),
        }
    }
}

impl FromStr for NetworkFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "bincode" => Ok(Self::Bincode),
            other => Err(format!("unknown format '{other}' (expected json or bincode)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    pub addr: SocketAddr,
    pub format: NetworkFormat,
    /// Payloads above this size are refused, capped at [`MAX_DATAGRAM`]
    pub max_packet_size: usize,
}

impl NetworkSinkConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            format: NetworkFormat::default(),
            max_packet_size: DEFAULT_MAX_PACKET,
        }
    }

    /// Read `addr`, `format` and `max_packet_size` from sink params
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr = params
            .get("addr")
            .ok_or("missing 'addr' parameter")?;
        let addr = addr
            .parse::<SocketAddr>()
            .map_err(|e| format!("invalid address '{addr}': {e}"))?;

        let format = params
            .get("format")
            .map(|f| f.parse::<NetworkFormat>())
            .transpose()?
            .unwrap_or_default();

        let max_packet_size = match params.get("max_packet_size") {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|e| format!("invalid max_packet_size '{raw}': {e}"))?
                .min(MAX_DATAGRAM),
            None => DEFAULT_MAX_PACKET,
        };

        Ok(Self {
            addr,
            format,
            max_packet_size,
        })
    }
}

pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    socket: Option<UdpSocket>,
    sent: u64,
    send_errors: u64,
}

impl NetworkSink {
    /// Bind an ephemeral local port matching the target's address family
    #[instrument(name = "network_sink_new", skip(name, config), fields(target = %config.addr))]
    pub async fn new(name: impl Into<String>, config: NetworkSinkConfig) -> std::io::Result<Self> {
        let name = name.into();
        let local: SocketAddr = if config.addr.is_ipv6() {
            "[::]:0".parse().map_err(std::io::Error::other)?
        } else {
            "0.0.0.0:0".parse().map_err(std::io::Error::other)?
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(config.addr).await?;
        debug!(sink = %name, local = ?socket.local_addr().ok(), "NetworkSink ready");

        Ok(Self {
            name,
            config,
            socket: Some(socket),
            sent: 0,
            send_errors: 0,
        })
    }

    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = NetworkSinkConfig::from_params(params)
            .map_err(|e| ContractError::sink_write(&name, e))?;

        Self::new(name.clone(), config)
            .await
            .map_err(|e| ContractError::sink_connection(name, e.to_string()))
    }

    /// Datagrams handed to the OS so far
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn send_errors(&self) -> u64 {
        self.send_errors
    }

    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, ContractError> {
        let payload = self
            .config
            .format
            .encode(frame)
            .map_err(|e| ContractError::sink_write(&self.name, e))?;

        if payload.len() > self.config.max_packet_size {
            return Err(ContractError::sink_write(
                &self.name,
                format!(
                    "frame {} encodes to {} bytes, limit is {}",
                    frame.seq,
                    payload.len(),
                    self.config.max_packet_size
                ),
            ));
        }
        Ok(payload)
    }
}

impl DataSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "network_sink_write", skip_all, fields(sink = %self.name, seq = frame.seq))]
    async fn write(&mut self, frame: &Frame) -> Result<(), ContractError> {
        let payload = self.encode(frame)?;
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| ContractError::sink_write(&self.name, "sink is closed"))?;

        match socket.send(&payload).await {
            Ok(bytes) => {
                self.sent += 1;
                debug!(bytes, "Datagram sent");
            }
            Err(e) => {
                self.send_errors += 1;
                warn!(error = %e, "Datagram lost");
            }
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        if self.socket.take().is_some() {
            debug!(
                sink = %self.name,
                sent = self.sent,
                send_errors = self.send_errors,
                "NetworkSink closed"
            );
        }
        Ok(())
    }
}
