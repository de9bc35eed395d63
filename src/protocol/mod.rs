//! Client-server communication protocol.
//!
//! This module defines everything that travels between a Berth client and
//! server, and the machinery on both ends that keeps a connection alive:
//! the wire types, the framed codec, the client session loop, and the
//! server's listener, admission gate and per-connection sessions.
//!
//! # Overview
//!
//! A client opens one TCP connection, completes a handshake, authenticates
//! and then exchanges strictly alternating [`Request`]/[`Response`] pairs
//! until it sends the `exit` command. The server accepts up to a fixed
//! number of concurrent connections, runs each on its own thread and hands
//! the computation of every response to a shared worker pool through the
//! [`Dispatcher`] trait.
//!
//! # Key Components
//!
//! - [`Request`], [`Response`], [`ResponseCode`], [`User`]: wire types.
//! - [`ProtocolTransport`]: framed bincode codec over any bidirectional stream.
//! - [`Client`]: connect/reconnect, authentication and request loops.
//! - [`Server`]: admission-gated listener with cooperative shutdown via [`ServerHandle`].
//! - [`AdmissionGate`]: counting permit pool bounding live connections.
//!
//! # Binary Format
//!
//! - Each frame starts with a 4-byte big-endian payload length.
//! - The payload is a bincode value encoded big-endian with fixed-width integers.
//! - Both ends exchange a hello frame carrying a magic tag and protocol
//!   version before any request is sent.
//!
//! A frame whose payload cannot be decoded is skipped as a whole, so a
//! single malformed message never desynchronizes the stream.
mod client;
mod dispatch;
mod gate;
mod request;
mod response;
mod server;
mod session;
mod thread;
mod transport;

use thread::ThreadPool;

pub use client::{AuthHandler, Client, ClientConfig, ClientError, UserHandler};
pub use dispatch::{
    BasicDispatcher, Dispatcher, LOGIN_COMMAND, REGISTER_COMMAND, SERVER_EXIT_COMMAND,
};
pub use gate::{AdmissionGate, Permit};
pub use request::{EXIT_COMMAND, Request, User};
pub use response::{Response, ResponseCode};
pub use server::{
    DEFAULT_MAX_CLIENTS, DEFAULT_WORKERS, ListenerState, Server, ServerConfig, ServerError,
    ServerHandle,
};
pub use thread::PoolError;
pub use transport::{MAX_FRAME_SIZE, ProtocolTransport, TransportError};
