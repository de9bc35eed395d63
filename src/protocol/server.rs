use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU8, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, info, warn};
use thiserror::Error;

use super::{
    Dispatcher, ThreadPool,
    gate::{AdmissionGate, Permit},
    session::Session,
};

pub const DEFAULT_MAX_CLIENTS: usize = 10;
pub const DEFAULT_WORKERS: usize = 15;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid server configuration: {0}")]
    Config(String),
    #[error("server cannot be started at {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: SocketAddr,
    /// Upper bound on concurrently connected clients.
    pub max_clients: usize,
    /// Size of the worker pool shared by every session.
    pub workers: usize,
}

impl ServerConfig {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            max_clients: DEFAULT_MAX_CLIENTS,
            workers: DEFAULT_WORKERS,
        }
    }

    fn validate(&self) -> Result<(), ServerError> {
        if self.max_clients == 0 {
            return Err(ServerError::Config(
                "max clients must be greater than zero".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(ServerError::Config(
                "worker count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    Running = 0,
    Stopping = 1,
    Stopped = 2,
}

impl From<u8> for ListenerState {
    fn from(value: u8) -> Self {
        match value {
            0 => ListenerState::Running,
            1 => ListenerState::Stopping,
            _ => ListenerState::Stopped,
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    gate: AdmissionGate,
    /// Read halves of live sessions, keyed by session id.
    sessions: Mutex<HashMap<u64, TcpStream>>,
}

impl Shared {
    fn sessions(&self) -> MutexGuard<'_, HashMap<u64, TcpStream>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable control handle for a running [`Server`].
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    /// Requests a shutdown. Returns immediately; [`Server::run`] returns
    /// once every connected session has drained.
    pub fn stop(&self) {
        let res = self.shared.state.compare_exchange(
            ListenerState::Running as u8,
            ListenerState::Stopping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        match res {
            Ok(_) => {
                info!("stopping the server");
                self.shared.gate.close();
            }
            Err(_) => debug!("server is already stopping"),
        }
    }

    pub fn state(&self) -> ListenerState {
        self.shared.state.load(Ordering::SeqCst).into()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ListenerState::Running
    }

    pub fn active_sessions(&self) -> usize {
        self.shared.sessions().len()
    }

    pub fn available_permits(&self) -> usize {
        self.shared.gate.available()
    }

    pub(super) fn unregister(&self, id: u64) {
        self.shared.sessions().remove(&id);
    }

    fn register(&self, id: u64, stream: TcpStream) {
        self.shared.sessions().insert(id, stream);
    }

    /// Wakes sessions blocked on reading their next request. A session
    /// busy with a request still writes its response first.
    fn interrupt_sessions(&self) {
        for (id, stream) in self.shared.sessions().iter() {
            if let Err(e) = stream.shutdown(Shutdown::Read) {
                debug!("session {id}: failed to interrupt: {e}");
            }
        }
    }

    fn finish(&self) {
        self.shared
            .state
            .store(ListenerState::Stopped as u8, Ordering::SeqCst);
    }
}

/// Accepts clients and runs one session thread per connection.
pub struct Server {
    listener: TcpListener,
    address: SocketAddr,
    dispatcher: Arc<dyn Dispatcher>,
    pool: Arc<ThreadPool>,
    handle: ServerHandle,
}

impl Server {
    pub fn bind(config: ServerConfig, dispatcher: Arc<dyn Dispatcher>) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = TcpListener::bind(config.address)
            .and_then(|listener| {
                listener.set_nonblocking(true)?;
                Ok(listener)
            })
            .map_err(|source| ServerError::Bind {
                address: config.address,
                source,
            })?;
        let address = listener.local_addr().map_err(|source| ServerError::Bind {
            address: config.address,
            source,
        })?;

        Ok(Self {
            listener,
            address,
            dispatcher,
            pool: Arc::new(ThreadPool::new(config.workers)),
            handle: ServerHandle {
                shared: Arc::new(Shared {
                    state: AtomicU8::new(ListenerState::Running as u8),
                    gate: AdmissionGate::new(config.max_clients),
                    sessions: Mutex::new(HashMap::new()),
                }),
            },
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Serves clients until [`ServerHandle::stop`] is called, then waits
    /// for every session to finish.
    pub fn run(self) {
        info!("listening at {}", self.address);

        let mut sessions: Vec<JoinHandle<()>> = Vec::new();
        let mut next_id = 0u64;

        while self.handle.is_running() {
            let Some(permit) = self.handle.shared.gate.acquire() else {
                break;
            };
            debug!("permission for a new connection received");

            let Some((stream, peer)) = self.accept() else {
                break;
            };

            sessions.retain(|session| !session.is_finished());
            match self.spawn_session(next_id, stream, peer, permit) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!("failed to start session for {peer}: {e}"),
            }
            next_id += 1;
        }

        self.drain(sessions);
    }

    /// Polls the listener until a client arrives or a stop is requested.
    fn accept(&self) -> Option<(TcpStream, SocketAddr)> {
        while self.handle.is_running() {
            match self.listener.accept() {
                Ok((stream, peer)) => match stream.set_nonblocking(false) {
                    Ok(()) => return Some((stream, peer)),
                    Err(e) => warn!("dropping connection from {peer}: {e}"),
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
                Err(e) => {
                    warn!("error occurred while connecting to a client: {e}");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
        None
    }

    fn spawn_session(
        &self,
        id: u64,
        stream: TcpStream,
        peer: SocketAddr,
        permit: Permit,
    ) -> io::Result<JoinHandle<()>> {
        self.handle.register(id, stream.try_clone()?);

        let session = Session::new(
            id,
            peer,
            stream,
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.pool),
            self.handle.clone(),
            permit,
        );
        thread::Builder::new()
            .name(format!("session-{id}"))
            .spawn(move || session.run())
            .inspect_err(|_| self.handle.unregister(id))
    }

    fn drain(self, sessions: Vec<JoinHandle<()>>) {
        let Server {
            listener,
            pool,
            handle,
            dispatcher,
            ..
        } = self;

        handle.stop();
        drop(listener);

        info!(
            "ending work with {} connected clients",
            handle.active_sessions()
        );
        handle.interrupt_sessions();
        for session in sessions {
            if session.join().is_err() {
                warn!("a session thread panicked");
            }
        }

        drop(dispatcher);
        drop(pool);
        handle.finish();
        info!("server work is complete");
    }
}
