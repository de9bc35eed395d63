use std::{
    io::{self, ErrorKind},
    net::TcpStream,
    thread,
    time::Duration,
};

use log::{debug, info};
use thiserror::Error;

use crate::Output;

use super::{
    LOGIN_COMMAND, ProtocolTransport, REGISTER_COMMAND, Request, Response, ResponseCode,
    TransportError, User,
};

pub const DEFAULT_RECONNECTION_TIMEOUT_MS: i64 = 5000;
pub const DEFAULT_MAX_RECONNECTION_ATTEMPTS: u32 = 3;

/// Produces authentication requests. An empty request means "ask again".
pub trait AuthHandler {
    fn handle(&mut self) -> io::Result<Request>;
}

/// Produces the next command to send, given the previous response code
/// and the authenticated user. An empty request means "ask again".
pub trait UserHandler {
    fn handle(&mut self, last: Option<ResponseCode>, user: Option<&User>) -> io::Result<Request>;
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("server address '{0}' is invalid")]
    Config(String),
    #[error("failed to connect to the server: {0}")]
    Connection(#[from] TransportError),
    #[error("input stream closed: {0}")]
    Input(#[source] io::Error),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Pause between reconnection attempts. Negative values retry at once.
    pub reconnection_timeout_ms: i64,
    pub max_reconnection_attempts: u32,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            reconnection_timeout_ms: DEFAULT_RECONNECTION_TIMEOUT_MS,
            max_reconnection_attempts: DEFAULT_MAX_RECONNECTION_ATTEMPTS,
        }
    }
}

/// A single client's connection to the server.
///
/// [`Client::run`] connects (retrying per [`ClientConfig`]), authenticates
/// and then forwards commands until the user sends `exit`.
pub struct Client<A, U, O> {
    config: ClientConfig,
    auth: A,
    handler: U,
    output: O,
    transport: Option<ProtocolTransport<TcpStream>>,
    attempts: u32,
    user: Option<User>,
}

impl<A, U, O> Client<A, U, O>
where
    A: AuthHandler,
    U: UserHandler,
    O: Output,
{
    pub fn new(config: ClientConfig, auth: A, handler: U, output: O) -> Self {
        Self {
            config,
            auth,
            handler,
            output,
            transport: None,
            attempts: 0,
            user: None,
        }
    }

    pub fn reconnection_attempts(&self) -> u32 {
        self.attempts
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn run(&mut self) {
        loop {
            match self.session() {
                Ok(()) => break,
                Err(ClientError::Connection(e)) => {
                    debug!("connection attempt {} failed: {e}", self.attempts + 1);
                    if self.attempts >= self.config.max_reconnection_attempts {
                        self.output.print_error("Maximum connection attempts exceeded!");
                        break;
                    }
                    self.wait_before_reconnect();
                }
                Err(e @ ClientError::Config(_)) => {
                    self.output.print_error(&e.to_string());
                    self.output.print_error("The client cannot be started!");
                    break;
                }
                Err(e @ ClientError::Input(_)) => {
                    self.output.print_error(&e.to_string());
                    break;
                }
            }
            self.attempts += 1;
        }

        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.get_ref().shutdown(std::net::Shutdown::Both) {
                debug!("socket already closed: {e}");
            }
        }
        self.output.print("Client work completed.");
    }

    fn session(&mut self) -> Result<(), ClientError> {
        self.connect()?;
        self.authenticate()?;
        self.process_requests()
    }

    fn connect(&mut self) -> Result<(), ClientError> {
        self.transport = None;

        let host = self.config.host.trim();
        if host.is_empty() || self.config.port == 0 {
            return Err(ClientError::Config(format!(
                "{}:{}",
                self.config.host, self.config.port
            )));
        }

        if self.attempts >= 1 {
            self.output.print("Reconnecting to server...");
        }
        let stream = match TcpStream::connect((host, self.config.port)) {
            Ok(stream) => stream,
            Err(e) => {
                self.output
                    .print_error("An error occurred while connecting to the server!");
                return Err(ClientError::Connection(e.into()));
            }
        };
        self.output.print("Connected to server.");
        self.output.print("Waiting for permission to exchange data...");

        let mut transport = ProtocolTransport::new(stream);
        if let Err(e) = transport.handshake() {
            self.output
                .print_error("An error occurred while connecting to the server!");
            return Err(ClientError::Connection(e));
        }
        self.output.print("Permission to exchange data received.");
        info!("connected to {}:{}", self.config.host, self.config.port);

        self.transport = Some(transport);
        Ok(())
    }

    fn wait_before_reconnect(&mut self) {
        let timeout = self.config.reconnection_timeout_ms;
        match u64::try_from(timeout) {
            Ok(ms) => thread::sleep(Duration::from_millis(ms)),
            Err(_) => {
                self.output.print_error(&format!(
                    "Connection timeout '{timeout}' is out of possible range!"
                ));
                self.output.print("Reconnecting immediately.");
            }
        }
    }

    fn authenticate(&mut self) -> Result<(), ClientError> {
        loop {
            let request = self.auth.handle().map_err(ClientError::Input)?;
            if request.is_empty() {
                continue;
            }
            if !is_auth_command(&request) {
                self.output.print_error(&format!(
                    "'{}' is not available before authentication, log in or register first",
                    request.command_name
                ));
                continue;
            }

            match self.exchange(&request) {
                Ok(response) => {
                    self.output.print(&response.body);
                    if response.code == ResponseCode::Ok {
                        self.user = request.user;
                        return Ok(());
                    }
                }
                Err(e) if e.is_recoverable() => self.report(&e),
                Err(e) => {
                    self.report(&e);
                    if self.connect().is_err() {
                        self.output.print("Try repeating authentication later.");
                    }
                }
            }
        }
    }

    fn process_requests(&mut self) -> Result<(), ClientError> {
        let mut last_code = None;
        loop {
            let request = self
                .handler
                .handle(last_code, self.user.as_ref())
                .map_err(ClientError::Input)?;
            if request.is_empty() {
                continue;
            }

            match self.exchange(&request) {
                Ok(response) => {
                    self.output.print(&response.body);
                    last_code = Some(response.code);
                }
                Err(e) if e.is_recoverable() => self.report(&e),
                Err(e) => {
                    self.report(&e);
                    if self.connect().is_err() {
                        if request.is_exit() {
                            self.output
                                .print("The command will not be registered on the server.");
                        } else {
                            self.output.print("Try repeating the command later.");
                        }
                    }
                }
            }

            if request.is_exit() {
                return Ok(());
            }
        }
    }

    fn exchange(&mut self, request: &Request) -> Result<Response, TransportError> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| TransportError::Io(ErrorKind::NotConnected.into()))?;
        transport.write_request(request)?;
        transport.read_response()
    }

    fn report(&mut self, e: &TransportError) {
        debug!("exchange failed: {e}");
        let message = match e {
            TransportError::Serialize(_) => "An error occurred while sending data to the server!",
            TransportError::Deserialize(_) => "An error occurred while reading received data!",
            _ => "The connection to the server has been terminated!",
        };
        self.output.print_error(message);
    }
}

fn is_auth_command(request: &Request) -> bool {
    matches!(request.command_name.as_str(), LOGIN_COMMAND | REGISTER_COMMAND)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        net::{SocketAddr, TcpListener},
        sync::{Arc, Mutex},
        thread::JoinHandle,
    };

    use crate::protocol::{BasicDispatcher, Server, ServerConfig};

    use super::*;

    #[derive(Debug, Default, Clone)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Recorder {
        fn lines(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        fn count(&self, text: &str) -> usize {
            self.lines().iter().filter(|line| line.contains(text)).count()
        }
    }

    impl Output for Recorder {
        fn print(&mut self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }

        fn print_error(&mut self, text: &str) {
            self.0.lock().unwrap().push(format!("error: {text}"));
        }
    }

    struct ScriptedAuth(VecDeque<Request>);

    impl AuthHandler for ScriptedAuth {
        fn handle(&mut self) -> io::Result<Request> {
            self.0
                .pop_front()
                .ok_or_else(|| ErrorKind::UnexpectedEof.into())
        }
    }

    #[derive(Default)]
    struct ScriptedCommands {
        names: VecDeque<&'static str>,
        seen: Vec<Option<ResponseCode>>,
    }

    impl UserHandler for &mut ScriptedCommands {
        fn handle(&mut self, last: Option<ResponseCode>, user: Option<&User>) -> io::Result<Request> {
            self.seen.push(last);
            let name = self.names.pop_front().ok_or(ErrorKind::UnexpectedEof)?;
            Ok(Request::new(name, vec![], user.cloned()))
        }
    }

    fn unused_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn config(port: u16, attempts: u32, timeout: i64) -> ClientConfig {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            port,
            reconnection_timeout_ms: timeout,
            max_reconnection_attempts: attempts,
        }
    }

    fn login(login: &str) -> Request {
        Request::new("login", vec![], Some(User::new(login, "pw")))
    }

    type Script = Box<dyn FnOnce(ProtocolTransport<TcpStream>) + Send>;

    /// Serves each accepted connection with the matching script entry.
    fn fake_server(scripts: Vec<Script>) -> (SocketAddr, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            for script in scripts {
                let (stream, _) = listener.accept().unwrap();
                let mut transport = ProtocolTransport::new(stream);
                transport.handshake().unwrap();
                script(transport);
            }
        });
        (address, server)
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let output = Recorder::default();
        let mut commands = ScriptedCommands::default();
        let mut client = Client::new(
            config(unused_port(), 2, 0),
            ScriptedAuth(VecDeque::new()),
            &mut commands,
            output.clone(),
        );

        client.run();

        assert_eq!(client.reconnection_attempts(), 2);
        assert_eq!(output.count("error occurred while connecting"), 3);
        assert_eq!(output.count("Reconnecting to server..."), 2);
        assert_eq!(output.count("Maximum connection attempts exceeded!"), 1);
    }

    #[test]
    fn negative_timeout_retries_immediately() {
        let output = Recorder::default();
        let mut commands = ScriptedCommands::default();
        let mut client = Client::new(
            config(unused_port(), 1, -5),
            ScriptedAuth(VecDeque::new()),
            &mut commands,
            output.clone(),
        );

        client.run();

        assert_eq!(output.count("error occurred while connecting"), 2);
        assert_eq!(output.count("'-5' is out of possible range"), 1);
        assert_eq!(output.count("Reconnecting immediately."), 1);
    }

    #[test]
    fn invalid_address_is_not_retried() {
        let output = Recorder::default();
        let mut commands = ScriptedCommands::default();
        let mut client = Client::new(
            config(0, 5, 0),
            ScriptedAuth(VecDeque::new()),
            &mut commands,
            output.clone(),
        );

        client.run();

        assert_eq!(client.reconnection_attempts(), 0);
        assert_eq!(output.count("The client cannot be started!"), 1);
        assert_eq!(output.count("error occurred while connecting"), 0);
    }

    #[test]
    fn full_session_against_server() {
        let server = Server::bind(
            ServerConfig::new("127.0.0.1:0".parse().unwrap()),
            Arc::new(BasicDispatcher::new()),
        )
        .unwrap();
        let port = server.local_addr().port();
        let handle = server.handle();
        let runner = thread::spawn(move || server.run());

        let alice = User::new("alice", "pw");
        let auth = ScriptedAuth(VecDeque::from([
            Request::empty(),
            Request::new("help", vec![], None),
            login("alice"),
            Request::new("register", vec![], Some(alice.clone())),
        ]));
        let mut commands = ScriptedCommands {
            names: VecDeque::from(["", "ping", "exit"]),
            ..Default::default()
        };
        let output = Recorder::default();

        let mut client = Client::new(config(port, 0, 0), auth, &mut commands, output.clone());
        client.run();
        assert_eq!(client.user(), Some(&alice));
        drop(client);

        assert_eq!(commands.seen, vec![None, None, Some(ResponseCode::Ok)]);
        assert_eq!(output.count("'help' is not available before authentication"), 1);
        assert_eq!(output.count("log in first"), 0);
        assert_eq!(output.count("wrong login or password"), 1);
        assert_eq!(output.count("user 'alice' registered"), 1);
        assert_eq!(output.count("pong"), 1);
        assert_eq!(output.count("goodbye"), 1);
        assert_eq!(output.count("Client work completed."), 1);

        handle.stop();
        runner.join().unwrap();
    }

    #[test]
    fn authentication_survives_a_dropped_connection() {
        let scripts: Vec<Script> = vec![
            Box::new(|mut transport: ProtocolTransport<TcpStream>| {
                transport.read_request().unwrap();
            }),
            Box::new(|mut transport: ProtocolTransport<TcpStream>| {
                let request = transport.read_request().unwrap();
                assert_eq!(request.command_name, "login");
                transport.write_response(&Response::ok("welcome")).unwrap();

                let request = transport.read_request().unwrap();
                assert!(request.is_exit());
                assert_eq!(request.user, Some(User::new("bob", "pw")));
                transport
                    .write_response(&Response::new(ResponseCode::ClientExit, "bye"))
                    .unwrap();
            }),
        ];
        let (address, server) = fake_server(scripts);

        let output = Recorder::default();
        let mut commands = ScriptedCommands {
            names: VecDeque::from(["exit"]),
            ..Default::default()
        };
        let mut client = Client::new(
            config(address.port(), 0, 0),
            ScriptedAuth(VecDeque::from([login("bob"), login("bob")])),
            &mut commands,
            output.clone(),
        );
        client.run();
        server.join().unwrap();

        assert_eq!(output.count("connection to the server has been terminated"), 1);
        assert_eq!(output.count("Connected to server."), 2);
        assert_eq!(output.count("welcome"), 1);
        assert_eq!(output.count("bye"), 1);
    }

    #[test]
    fn authentication_never_sends_other_commands() {
        let scripts: Vec<Script> = vec![Box::new(|mut transport: ProtocolTransport<TcpStream>| {
            let request = transport.read_request().unwrap();
            assert_eq!(request.command_name, "login");
            transport.write_response(&Response::ok("welcome")).unwrap();

            let request = transport.read_request().unwrap();
            assert!(request.is_exit());
            transport
                .write_response(&Response::new(ResponseCode::ClientExit, "bye"))
                .unwrap();
        })];
        let (address, server) = fake_server(scripts);

        let output = Recorder::default();
        let mut commands = ScriptedCommands {
            names: VecDeque::from(["exit"]),
            ..Default::default()
        };
        let mut client = Client::new(
            config(address.port(), 0, 0),
            ScriptedAuth(VecDeque::from([
                Request::new("help", vec![], None),
                Request::new("ping", vec![], Some(User::new("bob", "pw"))),
                login("bob"),
            ])),
            &mut commands,
            output.clone(),
        );
        client.run();
        server.join().unwrap();

        assert_eq!(output.count("not available before authentication"), 2);
        assert_eq!(client.user(), Some(&User::new("bob", "pw")));
        assert_eq!(output.count("bye"), 1);
    }

    #[test]
    fn exit_is_not_resent_when_reconnect_fails() {
        let scripts: Vec<Script> = vec![Box::new(|mut transport: ProtocolTransport<TcpStream>| {
                transport.read_request().unwrap();
                transport.write_response(&Response::ok("welcome")).unwrap();
                transport.read_request().unwrap();
            })];
        let (address, server) = fake_server(scripts);

        let output = Recorder::default();
        let mut commands = ScriptedCommands {
            names: VecDeque::from(["exit"]),
            ..Default::default()
        };
        let mut client = Client::new(
            config(address.port(), 0, 0),
            ScriptedAuth(VecDeque::from([login("carol")])),
            &mut commands,
            output.clone(),
        );
        // The listener closes right after the script, so the reconnect fails.
        client.run();
        server.join().unwrap();

        assert_eq!(
            output.count("The command will not be registered on the server."),
            1
        );
        assert_eq!(output.count("Client work completed."), 1);
    }
}
