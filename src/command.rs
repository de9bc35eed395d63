//! High-level command module for communication.
//!
//! This module defines the [`Command`] struct, a user-typed command line
//! split into a command name and its arguments. Commands are turned into
//! [`Request`](crate::protocol::Request)s before they travel to the server,
//! which decides what each name means.
//!
//! # Example
//! ```rust
//! use berth::Command;
//!
//! let cmd: Command = "echo hello".try_into().unwrap();
//! assert_eq!(cmd.name, "echo");
//! assert_eq!(cmd.args, vec!["hello".to_string()]);
//! ```
use thiserror::Error;

/// List of possible error that a command can throw.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid command name '{0}'")]
    InvalidName(String),

    #[error("no command provided")]
    Empty,
}

/// A user supplied command and its whitespace separated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut parts = value.split_whitespace();
        let name = parts.next().ok_or(CommandError::Empty)?;

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(CommandError::InvalidName(name.to_string()));
        }

        Ok(Command {
            name: name.to_lowercase(),
            args: parts.map(str::to_string).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_from_string() {
        let inputs = vec![
            ("exit", "exit", vec![]),
            ("  HELP  ", "help", vec![]),
            ("echo a  b", "echo", vec!["a", "b"]),
            ("server_exit", "server_exit", vec![]),
        ];

        for (line, name, args) in inputs {
            let command: Command = line.try_into().unwrap();
            assert_eq!(command.name, name);
            assert_eq!(command.args, args);
        }
    }

    #[test]
    fn empty_command() {
        let res: Result<Command, _> = "   ".try_into();
        assert_eq!(res, Err(CommandError::Empty));
    }

    #[test]
    #[should_panic(expected = "InvalidName")]
    fn invalid_command_name() {
        let _: Command = ".structure".try_into().unwrap();
    }
}
