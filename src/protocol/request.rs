use bincode::{Decode, Encode, error::DecodeError};

use crate::Command;

use super::transport::wire_config;

/// Command name that ends a client session.
pub const EXIT_COMMAND: &str = "exit";

/// Credentials identifying the user behind a request.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct User {
    pub login: String,
    pub password: String,
}

impl User {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

/// A single command sent from a client to the server.
///
/// An empty request means "nothing to send, ask again" and is never
/// written to the wire by the client.
#[derive(Debug, Clone, Default, Encode, Decode, PartialEq, Eq)]
pub struct Request {
    pub command_name: String,
    pub command_args: Vec<u8>,
    pub user: Option<User>,
}

impl Request {
    pub fn new(command_name: impl Into<String>, command_args: Vec<u8>, user: Option<User>) -> Self {
        Self {
            command_name: command_name.into(),
            command_args,
            user,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.command_name.is_empty() && self.command_args.is_empty()
    }

    /// Builds a request out of a parsed command, encoding its arguments
    /// as a list of strings.
    pub fn from_command(command: Command, user: Option<User>) -> Self {
        // Encoding a Vec<String> into memory cannot fail.
        let args = bincode::encode_to_vec(&command.args, wire_config()).unwrap_or_default();
        Self::new(command.name, args, user)
    }

    /// Decodes the argument payload.
    pub fn args<T: Decode<()>>(&self) -> Result<T, DecodeError> {
        let (args, _) = bincode::decode_from_slice(&self.command_args, wire_config())?;
        Ok(args)
    }

    pub fn is_exit(&self) -> bool {
        self.command_name == EXIT_COMMAND
    }
}
