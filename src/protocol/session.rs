use std::{
    io::ErrorKind,
    net::{Shutdown, SocketAddr, TcpStream},
    sync::Arc,
};

use log::{debug, error, info, warn};
use thiserror::Error;

use super::{
    Dispatcher, ProtocolTransport, Response, ResponseCode, ServerHandle, ThreadPool,
    gate::Permit, transport::TransportError,
};

#[derive(Debug, Error)]
enum SessionError {
    #[error("handshake with client failed: {0}")]
    Handshake(TransportError),
    #[error("failed to read request: {0}")]
    Read(TransportError),
    #[error("failed to send response to client: {0}")]
    Write(TransportError),
}

impl SessionError {
    fn is_disconnect(&self) -> bool {
        match self {
            SessionError::Read(TransportError::Io(e)) => matches!(
                e.kind(),
                ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

/// One accepted connection and its request/response loop.
///
/// Requests are handled strictly one at a time: the next request is not
/// read until the previous response has been written.
pub(super) struct Session {
    id: u64,
    peer: SocketAddr,
    transport: ProtocolTransport<TcpStream>,
    dispatcher: Arc<dyn Dispatcher>,
    pool: Arc<ThreadPool>,
    server: ServerHandle,
    permit: Permit,
}

impl Session {
    pub(super) fn new(
        id: u64,
        peer: SocketAddr,
        stream: TcpStream,
        dispatcher: Arc<dyn Dispatcher>,
        pool: Arc<ThreadPool>,
        server: ServerHandle,
        permit: Permit,
    ) -> Self {
        Self {
            id,
            peer,
            transport: ProtocolTransport::new(stream),
            dispatcher,
            pool,
            server,
            permit,
        }
    }

    pub(super) fn run(mut self) {
        info!("session {}: client {} connected", self.id, self.peer);

        let outcome = self.serve();
        match &outcome {
            Ok(code) => debug!("session {}: ended with {code:?}", self.id),
            Err(e) if e.is_disconnect() => {
                info!("session {}: connection closed by client", self.id)
            }
            Err(e @ SessionError::Write(_)) => error!("session {}: {e}", self.id),
            Err(e) => warn!("session {}: {e}", self.id),
        }

        let Session {
            id,
            peer,
            transport,
            server,
            permit,
            ..
        } = self;

        if let Err(e) = transport.get_ref().shutdown(Shutdown::Both) {
            debug!("session {id}: socket already closed: {e}");
        }
        server.unregister(id);
        info!("session {id}: client {peer} disconnected");

        if matches!(outcome, Ok(ResponseCode::ServerExit)) {
            server.stop();
        }
        drop(permit);
    }

    fn serve(&mut self) -> Result<ResponseCode, SessionError> {
        self.transport.handshake().map_err(SessionError::Handshake)?;

        loop {
            let request = match self.transport.read_request() {
                Ok(request) => request,
                Err(e) if e.is_recoverable() => {
                    warn!("session {}: malformed request: {e}", self.id);
                    self.transport
                        .write_response(&Response::error(format!("malformed request: {e}")))
                        .map_err(SessionError::Write)?;
                    continue;
                }
                Err(e) => return Err(SessionError::Read(e)),
            };

            let name = request.command_name.clone();
            let dispatcher = Arc::clone(&self.dispatcher);
            let response = match self.pool.submit(move || dispatcher.execute(request)) {
                Ok(response) => response,
                Err(e) => {
                    warn!("session {}: failed to process '{name}': {e}", self.id);
                    Response::error("the server failed to process the request, try again")
                }
            };
            info!("session {}: request '{name}' processed", self.id);

            self.transport
                .write_response(&response)
                .map_err(SessionError::Write)?;

            if response.code.is_exit() {
                return Ok(response.code);
            }
        }
    }
}
