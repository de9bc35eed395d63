//! CLI utilities for Berth.
//!
//! Interactive implementations of the client's input collaborators: an
//! [`AuthAsker`] for the login phase and a [`CommandAsker`] for everything
//! after it. Both read lines from any [`BufRead`] and prompt on any [`Write`].
use std::io::{self, BufRead, ErrorKind, Write};

use crate::{
    Command,
    protocol::{
        AuthHandler, LOGIN_COMMAND, REGISTER_COMMAND, Request, ResponseCode, User, UserHandler,
    },
};

/// Prompt user for a single line of input.
///
/// Fails with [`ErrorKind::UnexpectedEof`] once the input is closed.
pub fn prompt<R, W>(reader: &mut R, writer: &mut W, marker: &str) -> io::Result<String>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(writer, "{marker}")?;
    writer.flush()?;

    if reader.read_line(&mut s)? == 0 {
        return Err(io::Error::new(ErrorKind::UnexpectedEof, "input stream closed"));
    }
    Ok(s.trim().to_string())
}

/// Asks for credentials until the server accepts them.
pub struct AuthAsker<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> AuthAsker<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl<R: BufRead, W: Write> AuthHandler for AuthAsker<R, W> {
    fn handle(&mut self) -> io::Result<Request> {
        let answer = prompt(
            &mut self.reader,
            &mut self.writer,
            "log in or register? [l/r]: ",
        )?;
        let command = match answer.to_lowercase().as_str() {
            "l" | LOGIN_COMMAND => LOGIN_COMMAND,
            "r" | REGISTER_COMMAND => REGISTER_COMMAND,
            other => {
                writeln!(self.writer, "unknown answer '{other}', expected 'l' or 'r'")?;
                return Ok(Request::empty());
            }
        };

        let login = prompt(&mut self.reader, &mut self.writer, "login: ")?;
        if login.is_empty() {
            writeln!(self.writer, "login cannot be empty")?;
            return Ok(Request::empty());
        }
        let password = prompt(&mut self.reader, &mut self.writer, "password: ")?;

        Ok(Request::new(
            command,
            Vec::new(),
            Some(User::new(login, password)),
        ))
    }
}

/// Reads one command per line and attaches the session's user to it.
pub struct CommandAsker<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> CommandAsker<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl<R: BufRead, W: Write> UserHandler for CommandAsker<R, W> {
    fn handle(&mut self, last: Option<ResponseCode>, user: Option<&User>) -> io::Result<Request> {
        if last == Some(ResponseCode::Error) {
            writeln!(self.writer, "type 'help' for the list of commands")?;
        }

        let line = prompt(&mut self.reader, &mut self.writer, "> ")?;
        match <&str as TryInto<Command>>::try_into(line.as_str()) {
            Ok(command) => Ok(Request::from_command(command, user.cloned())),
            Err(crate::CommandError::Empty) => Ok(Request::empty()),
            Err(e) => {
                writeln!(self.writer, "error: {e}")?;
                Ok(Request::empty())
            }
        }
    }
}
