use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::telemetry::TelemetrySnapshot;

pub mod command;
pub mod sim;
pub mod transport;

pub use command::{CommandResponse, Direction, FlipDirection, VehicleCommand};
pub use transport::{Connector, Transport, UdpConnector};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_TELEMETRY_TIMEOUT: Duration = Duration::from_secs(2);

/// Observable connection status of a [`VehicleLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Disconnected,
    Connected,
    Disconnecting,
}

enum Connection {
    Disconnected,
    Connected(Arc<Session>),
    Disconnecting,
}

struct Session {
    address: String,
    transport: Box<dyn Transport>,
    closed: watch::Sender<bool>,
}

impl Session {
    fn close(&self) {
        self.closed.send_replace(true);
    }
}

async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}

/// Owns the transport session to one vehicle.
///
/// Requests are strictly serialised: at most one frame is in flight, and
/// callers are served in the order they acquire the exchange.
pub struct VehicleLink {
    connector: Arc<dyn Connector>,
    connection: Mutex<Connection>,
    exchange: tokio::sync::Mutex<()>,
    connect_timeout: Duration,
    telemetry_timeout: Duration,
}

impl VehicleLink {
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self::with_connector(Arc::new(connector))
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            connection: Mutex::new(Connection::Disconnected),
            exchange: tokio::sync::Mutex::new(()),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            telemetry_timeout: DEFAULT_TELEMETRY_TIMEOUT,
        }
    }

    pub fn udp() -> Self {
        Self::new(UdpConnector)
    }

    pub fn with_timeouts(mut self, connect: Duration, telemetry: Duration) -> Self {
        self.connect_timeout = connect;
        self.telemetry_timeout = telemetry;
        self
    }

    pub fn status(&self) -> LinkStatus {
        match &*self.connection.lock() {
            Connection::Disconnected => LinkStatus::Disconnected,
            Connection::Connected(_) => LinkStatus::Connected,
            Connection::Disconnecting => LinkStatus::Disconnecting,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status() == LinkStatus::Connected
    }

    fn session(&self) -> Result<Arc<Session>, LinkError> {
        match &*self.connection.lock() {
            Connection::Connected(session) => Ok(session.clone()),
            _ => Err(LinkError::NotConnected),
        }
    }

    /// Open a session and switch the vehicle into SDK mode.
    ///
    /// Returns immediately when a session is already established.
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), LinkError> {
        let _turn = self.exchange.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let address = format!("{}:{}", host, port);
        let unreachable = |reason: String| LinkError::Unreachable {
            address: address.clone(),
            reason,
        };

        let transport = self
            .connector
            .open(host, port)
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        let handshake = VehicleCommand::Enable;
        let reply = match timeout(
            self.connect_timeout,
            transport.request(handshake.encode().as_bytes()),
        )
        .await
        {
            Ok(Ok(frame)) => CommandResponse::from_frame(&handshake, &frame)
                .map_err(|e| unreachable(format!("handshake refused: {}", e))),
            Ok(Err(e)) => Err(unreachable(e.to_string())),
            Err(_) => Err(unreachable(format!(
                "no handshake reply within {:?}",
                self.connect_timeout
            ))),
        };
        if let Err(err) = reply {
            transport.close().await;
            warn!(%address, error = %err, "connection failed");
            return Err(err);
        }

        let (closed, _) = watch::channel(false);
        *self.connection.lock() = Connection::Connected(Arc::new(Session {
            address: address.clone(),
            transport,
            closed,
        }));
        info!(%address, "connected to vehicle");
        Ok(())
    }

    /// Tear down the session. Requests still in flight fail with
    /// [`LinkError::Disconnected`].
    pub async fn disconnect(&self) {
        let session = {
            let mut connection = self.connection.lock();
            match std::mem::replace(&mut *connection, Connection::Disconnecting) {
                Connection::Connected(session) => session,
                previous => {
                    *connection = previous;
                    return;
                }
            }
        };

        session.close();
        session.transport.close().await;

        let mut connection = self.connection.lock();
        if matches!(*connection, Connection::Disconnecting) {
            *connection = Connection::Disconnected;
        }
        info!(address = %session.address, "disconnected from vehicle");
    }

    /// Send one command and wait up to `limit` for its reply.
    pub async fn send_command(
        &self,
        command: VehicleCommand,
        limit: Duration,
    ) -> Result<CommandResponse, LinkError> {
        let session = self.session()?;
        let mut closed = session.closed.subscribe();
        let _turn = self.exchange.lock().await;
        if *closed.borrow() {
            return Err(LinkError::Disconnected);
        }

        let frame = command.encode();
        debug!(address = %session.address, command = %frame, "sending");

        let reply = tokio::select! {
            reply = timeout(limit, session.transport.request(frame.as_bytes())) => reply,
            _ = wait_closed(&mut closed) => return Err(LinkError::Disconnected),
        };

        match reply {
            Err(_) => {
                warn!(command = %frame, ?limit, "command timed out");
                Err(LinkError::Timeout(limit))
            }
            Ok(Err(_)) if *closed.borrow() => Err(LinkError::Disconnected),
            Ok(Err(e)) => Err(LinkError::Unreachable {
                address: session.address.clone(),
                reason: e.to_string(),
            }),
            Ok(Ok(bytes)) => {
                let response = CommandResponse::from_frame(&command, &bytes)?;
                debug!(command = %frame, reply = %response.message, "acknowledged");
                Ok(response)
            }
        }
    }

    /// Query the current telemetry. Read-only on the vehicle side.
    pub async fn get_telemetry(&self) -> Result<TelemetrySnapshot, LinkError> {
        let response = self
            .send_command(VehicleCommand::QueryTelemetry, self.telemetry_timeout)
            .await?;
        TelemetrySnapshot::parse(&response.message)
    }
}
