//! Client connections to a Diameter server
//!
//! A [`Connection`] is one open TCP association after a successful
//! capabilities exchange. It runs two tasks:
//! - the reader answers DWR/DPR itself and hands everything else to a
//!   [`MessageHandler`]
//! - the writer serialises outbound messages and sends a DWR every watchdog
//!   interval, closing the connection once too many go unanswered
//!
//! [`ConnectionManager`] owns at most one connection to one server, opening
//! it lazily and replacing it once it closes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{DiameterClientConfig, DiameterServerConfig};
use crate::error::{DiameterError, DiameterResult};
use crate::message::{base_cmd, DiameterMessage};
use crate::peer::{initiate_capabilities, LocalPeer, RemotePeer};
use crate::transport::{DiameterReader, DiameterTransport, DiameterWriter};

/// Outbound queue depth per connection
const OUTBOUND_QUEUE_SIZE: usize = 256;

/// Receives application messages from a connection
pub trait MessageHandler: Send + Sync {
    /// An answer to a request sent on this connection
    fn handle_answer(&self, answer: DiameterMessage);

    /// A request initiated by the server; the returned answer is sent back
    fn handle_request(&self, request: DiameterMessage) -> Option<DiameterMessage>;
}

type Outbound = (DiameterMessage, Option<oneshot::Sender<DiameterResult<()>>>);

struct Shared {
    local: Arc<LocalPeer>,
    server: String,
    closed: watch::Sender<bool>,
    missed_watchdogs: AtomicU32,
}

impl Shared {
    fn close(&self) {
        self.closed.send_replace(true);
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// An open connection to a Diameter server
pub struct Connection {
    shared: Arc<Shared>,
    remote: RemotePeer,
    outbound: mpsc::Sender<Outbound>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    /// Connect, exchange capabilities and start the reader and writer tasks
    pub async fn open(
        local: Arc<LocalPeer>,
        client: &DiameterClientConfig,
        server: &DiameterServerConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> DiameterResult<Self> {
        let server_name = server.address.to_string();
        let mut transport = tokio::time::timeout(client.connect_timeout, DiameterTransport::connect(server.address))
            .await
            .map_err(|_| DiameterError::ConnectTimeout(server_name.clone()))??;
        let remote = initiate_capabilities(&mut transport, &local, client.connect_timeout).await?;
        log::info!(
            "Diameter connection established to {} ({}, realm {})",
            server_name,
            remote.host,
            remote.realm
        );

        let (closed, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            local,
            server: server_name,
            closed,
            missed_watchdogs: AtomicU32::new(0),
        });
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        let (read_half, write_half) = transport.into_split();

        let reader = tokio::spawn(run_reader(read_half, shared.clone(), outbound.clone(), handler));
        let writer = tokio::spawn(run_writer(
            write_half,
            shared.clone(),
            outbound_rx,
            client.watchdog_interval,
            client.retry_count,
        ));

        Ok(Self {
            shared,
            remote,
            outbound,
            reader,
            writer,
        })
    }

    /// Identity the server reported in its CEA
    pub fn remote(&self) -> &RemotePeer {
        &self.remote
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Queue `msg` with fresh identifiers and wait until it is written
    pub async fn send(&self, mut msg: DiameterMessage) -> DiameterResult<()> {
        if self.is_closed() {
            return Err(DiameterError::ConnectionClosed(self.shared.server.clone()));
        }
        self.shared.local.stamp(&mut msg);

        let (done_tx, done_rx) = oneshot::channel();
        self.outbound
            .send((msg, Some(done_tx)))
            .await
            .map_err(|_| DiameterError::ConnectionClosed(self.shared.server.clone()))?;
        done_rx
            .await
            .map_err(|_| DiameterError::ConnectionClosed(self.shared.server.clone()))?
    }

    /// Close the connection and stop its tasks
    pub fn close(&self) {
        self.shared.close();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.close();
        self.reader.abort();
        self.writer.abort();
    }
}

async fn run_reader(
    mut reader: DiameterReader,
    shared: Arc<Shared>,
    outbound: mpsc::Sender<Outbound>,
    handler: Arc<dyn MessageHandler>,
) {
    let mut closed = shared.closed.subscribe();
    loop {
        if shared.is_closed() {
            break;
        }
        let msg = tokio::select! {
            _ = closed.changed() => continue,
            res = reader.recv() => match res {
                Ok(msg) => msg,
                Err(e) => {
                    log::warn!("Diameter connection to {} lost: {}", shared.server, e);
                    break;
                }
            },
        };

        let command = msg.header.command_code;
        log::debug!(
            "Rx command {} (request={}) from {}",
            command,
            msg.header.is_request(),
            shared.server
        );

        let reply = match (command, msg.header.is_request()) {
            (base_cmd::DEVICE_WATCHDOG, true) => Some(shared.local.dwa(&msg)),
            (base_cmd::DEVICE_WATCHDOG, false) => {
                shared.missed_watchdogs.store(0, Ordering::Relaxed);
                None
            }
            (base_cmd::DISCONNECT_PEER, true) => {
                log::info!("Server {} requested disconnect", shared.server);
                let dpa = shared.local.dpa(&msg);
                let (done_tx, done_rx) = oneshot::channel();
                if outbound.send((dpa, Some(done_tx))).await.is_ok() {
                    let _ = done_rx.await;
                }
                break;
            }
            (base_cmd::CAPABILITIES_EXCHANGE, _) | (base_cmd::DISCONNECT_PEER, false) => None,
            (_, true) => handler.handle_request(msg),
            (_, false) => {
                handler.handle_answer(msg);
                None
            }
        };

        if let Some(reply) = reply {
            if outbound.send((reply, None)).await.is_err() {
                break;
            }
        }
    }
    shared.close();
}

async fn run_writer(
    mut writer: DiameterWriter,
    shared: Arc<Shared>,
    mut outbound: mpsc::Receiver<Outbound>,
    watchdog_interval: Duration,
    max_missed_watchdogs: u32,
) {
    let mut closed = shared.closed.subscribe();
    let mut watchdog = tokio::time::interval_at(Instant::now() + watchdog_interval, watchdog_interval);

    loop {
        if shared.is_closed() {
            break;
        }
        tokio::select! {
            _ = closed.changed() => continue,
            _ = watchdog.tick() => {
                let missed = shared.missed_watchdogs.fetch_add(1, Ordering::Relaxed);
                if missed >= max_missed_watchdogs {
                    log::warn!(
                        "Server {} missed {} watchdogs, closing connection",
                        shared.server,
                        missed
                    );
                    break;
                }
                if let Err(e) = writer.send(&shared.local.dwr()).await {
                    log::warn!("Failed to send watchdog to {}: {}", shared.server, e);
                    break;
                }
            }
            item = outbound.recv() => {
                let Some((msg, done)) = item else { break };
                log::debug!(
                    "Tx command {} (request={}) to {}",
                    msg.header.command_code,
                    msg.header.is_request(),
                    shared.server
                );
                let res = writer.send(&msg).await;
                let failed = res.is_err();
                match done {
                    Some(done) => {
                        let _ = done.send(res);
                    }
                    None => {
                        if let Err(e) = res {
                            log::warn!("Failed to write to {}: {}", shared.server, e);
                        }
                    }
                }
                if failed {
                    break;
                }
            }
        }
    }

    shared.close();
    let _ = writer.shutdown().await;
}

struct ManagerState {
    connection: Option<Arc<Connection>>,
    disabled_until: Option<Instant>,
}

/// Lazily established, replaceable connection to one Diameter server
pub struct ConnectionManager {
    local: Arc<LocalPeer>,
    client: DiameterClientConfig,
    server: DiameterServerConfig,
    handler: Arc<dyn MessageHandler>,
    state: Mutex<ManagerState>,
}

impl ConnectionManager {
    pub fn new(
        local: Arc<LocalPeer>,
        client: DiameterClientConfig,
        server: DiameterServerConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            local,
            client,
            server,
            handler,
            state: Mutex::new(ManagerState {
                connection: None,
                disabled_until: None,
            }),
        }
    }

    pub fn client(&self) -> &DiameterClientConfig {
        &self.client
    }

    pub fn server(&self) -> &DiameterServerConfig {
        &self.server
    }

    /// Current live connection, opening a new one if needed
    pub async fn connection(&self) -> DiameterResult<Arc<Connection>> {
        let mut state = self.state.lock().await;

        if let Some(until) = state.disabled_until {
            let now = Instant::now();
            if now < until {
                return Err(DiameterError::ConnectionDisabled {
                    server: self.server.address.to_string(),
                    remaining: until - now,
                });
            }
            log::info!("Connections to {} re-enabled after disable period", self.server.address);
            state.disabled_until = None;
        }

        if let Some(conn) = state.connection.as_ref().filter(|c| !c.is_closed()) {
            return Ok(conn.clone());
        }

        let conn = Arc::new(
            Connection::open(self.local.clone(), &self.client, &self.server, self.handler.clone()).await?,
        );
        state.connection = Some(conn.clone());
        Ok(conn)
    }

    /// Send `msg`, retrying on a fresh connection up to `retries` more times
    pub async fn send_request(&self, msg: &DiameterMessage, retries: u32) -> DiameterResult<()> {
        let mut attempt = 0;
        loop {
            let res = match self.connection().await {
                Ok(conn) => {
                    let res = conn.send(msg.clone()).await;
                    if res.is_err() {
                        conn.close();
                    }
                    res
                }
                Err(e) => Err(e),
            };

            match res {
                Ok(()) => return Ok(()),
                Err(e @ DiameterError::ConnectionDisabled { .. }) => return Err(e),
                Err(e) if attempt >= retries => return Err(e),
                Err(e) => {
                    attempt += 1;
                    log::warn!(
                        "Send to {} failed ({}), retry {}/{}",
                        self.server.address,
                        e,
                        attempt,
                        retries
                    );
                }
            }
        }
    }

    /// Drop the connection and refuse new ones for `period`
    pub async fn disable_for(&self, period: Duration) {
        let mut state = self.state.lock().await;
        if let Some(conn) = state.connection.take() {
            conn.close();
        }
        state.disabled_until = Some(Instant::now() + period);
        log::info!("Connections to {} disabled for {:?}", self.server.address, period);
    }

    /// Lift a previous `disable_for`
    pub async fn enable(&self) {
        let mut state = self.state.lock().await;
        if state.disabled_until.take().is_some() {
            log::info!("Connections to {} enabled", self.server.address);
        }
    }

    /// Make sure a live connection exists, opening one if necessary
    pub async fn check_connection(&self) -> DiameterResult<()> {
        self.connection().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::accept_capabilities;
    use crate::swx::{cmd, SWX_APPLICATION_ID};
    use crate::transport::DiameterListener;
    use std::net::SocketAddr;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        answers: StdMutex<Vec<DiameterMessage>>,
        requests: StdMutex<Vec<DiameterMessage>>,
    }

    impl MessageHandler for Recorder {
        fn handle_answer(&self, answer: DiameterMessage) {
            self.answers.lock().unwrap().push(answer);
        }

        fn handle_request(&self, request: DiameterMessage) -> Option<DiameterMessage> {
            let answer = DiameterMessage::new_answer_with_result(&request, "aaa", "example.com", 2001);
            self.requests.lock().unwrap().push(request);
            Some(answer)
        }
    }

    fn local() -> Arc<LocalPeer> {
        Arc::new(LocalPeer::new("aaa.example.com", "example.com", "test").with_application(SWX_APPLICATION_ID))
    }

    fn client_config() -> DiameterClientConfig {
        DiameterClientConfig {
            host: "aaa.example.com".into(),
            realm: "example.com".into(),
            watchdog_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    async fn listener() -> (DiameterListener, SocketAddr) {
        let listener = DiameterListener::bind(([127, 0, 0, 1], 0).into()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[tokio::test]
    async fn test_request_answer_reaches_handler() {
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            let hss = LocalPeer::new("hss.example.com", "example.com", "hss");
            let mut transport = listener.accept().await.unwrap();
            accept_capabilities(&mut transport, &hss).await.unwrap();
            let req = transport.recv().await.unwrap();
            transport.send(&DiameterMessage::new_answer(&req)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let recorder = Arc::new(Recorder::default());
        let manager = ConnectionManager::new(
            local(),
            client_config(),
            DiameterServerConfig::new(addr, "example.com"),
            recorder.clone(),
        );

        let req = DiameterMessage::new_request(cmd::MULTIMEDIA_AUTH, SWX_APPLICATION_ID);
        manager.send_request(&req, 0).await.unwrap();

        for _ in 0..50 {
            if !recorder.answers.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let answers = recorder.answers.lock().unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].header.command_code, cmd::MULTIMEDIA_AUTH);
    }

    #[tokio::test]
    async fn test_server_request_is_answered_by_handler() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let hss = LocalPeer::new("hss.example.com", "example.com", "hss");
            let mut transport = listener.accept().await.unwrap();
            accept_capabilities(&mut transport, &hss).await.unwrap();

            let mut rtr = DiameterMessage::new_request(cmd::REGISTRATION_TERMINATION, SWX_APPLICATION_ID);
            hss.stamp(&mut rtr);
            transport.send(&rtr).await.unwrap();
            let rta = transport.recv().await.unwrap();
            assert!(rta.header.is_answer());
            assert_eq!(rta.header.hop_by_hop_id, rtr.header.hop_by_hop_id);
        });

        let recorder = Arc::new(Recorder::default());
        let manager = ConnectionManager::new(
            local(),
            client_config(),
            DiameterServerConfig::new(addr, "example.com"),
            recorder.clone(),
        );
        manager.check_connection().await.unwrap();

        server.await.unwrap();
        assert_eq!(recorder.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_watchdog_is_answered_by_connection() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let hss = LocalPeer::new("hss.example.com", "example.com", "hss");
            let mut transport = listener.accept().await.unwrap();
            accept_capabilities(&mut transport, &hss).await.unwrap();

            let dwr = hss.dwr();
            transport.send(&dwr).await.unwrap();
            let dwa = transport.recv().await.unwrap();
            assert_eq!(dwa.header.command_code, base_cmd::DEVICE_WATCHDOG);
            assert_eq!(dwa.result_code(), Some(2001));
        });

        let manager = ConnectionManager::new(
            local(),
            client_config(),
            DiameterServerConfig::new(addr, "example.com"),
            Arc::new(Recorder::default()),
        );
        manager.check_connection().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unanswered_watchdogs_close_connection() {
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            let hss = LocalPeer::new("hss.example.com", "example.com", "hss");
            let mut transport = listener.accept().await.unwrap();
            accept_capabilities(&mut transport, &hss).await.unwrap();
            // Read and ignore everything
            while transport.recv().await.is_ok() {}
        });

        let config = DiameterClientConfig {
            watchdog_interval: Duration::from_millis(20),
            retry_count: 2,
            ..client_config()
        };
        let manager = ConnectionManager::new(
            local(),
            config,
            DiameterServerConfig::new(addr, "example.com"),
            Arc::new(Recorder::default()),
        );
        let conn = manager.connection().await.unwrap();
        assert!(!conn.is_closed());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_disable_and_enable() {
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            let hss = LocalPeer::new("hss.example.com", "example.com", "hss");
            loop {
                let Ok(mut transport) = listener.accept().await else { break };
                if accept_capabilities(&mut transport, &hss).await.is_ok() {
                    tokio::spawn(async move { while transport.recv().await.is_ok() {} });
                }
            }
        });

        let manager = ConnectionManager::new(
            local(),
            client_config(),
            DiameterServerConfig::new(addr, "example.com"),
            Arc::new(Recorder::default()),
        );
        manager.check_connection().await.unwrap();

        manager.disable_for(Duration::from_secs(60)).await;
        let err = manager.check_connection().await.unwrap_err();
        assert!(matches!(err, DiameterError::ConnectionDisabled { .. }));

        // Disabled sends are not retried
        let req = DiameterMessage::new_request(cmd::SERVER_ASSIGNMENT, SWX_APPLICATION_ID);
        assert!(manager.send_request(&req, 3).await.is_err());

        manager.enable().await;
        manager.check_connection().await.unwrap();
    }

    #[tokio::test]
    async fn test_disable_period_expires() {
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            let hss = LocalPeer::new("hss.example.com", "example.com", "hss");
            let mut transport = listener.accept().await.unwrap();
            accept_capabilities(&mut transport, &hss).await.unwrap();
            while transport.recv().await.is_ok() {}
        });

        let manager = ConnectionManager::new(
            local(),
            client_config(),
            DiameterServerConfig::new(addr, "example.com"),
            Arc::new(Recorder::default()),
        );
        manager.disable_for(Duration::from_millis(30)).await;
        assert!(manager.check_connection().await.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.check_connection().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_after_retries() {
        let (listener, addr) = listener().await;
        drop(listener);

        let manager = ConnectionManager::new(
            local(),
            client_config(),
            DiameterServerConfig::new(addr, "example.com"),
            Arc::new(Recorder::default()),
        );
        let req = DiameterMessage::new_request(cmd::MULTIMEDIA_AUTH, SWX_APPLICATION_ID);
        assert!(manager.send_request(&req, 2).await.is_err());
    }
}
