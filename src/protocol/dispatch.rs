use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use log::{debug, info};

use super::{EXIT_COMMAND, Request, Response, ResponseCode, User};

/// Computes the response for a decoded request.
///
/// Sessions call this concurrently from the shared worker pool, so
/// implementations guard their own state.
pub trait Dispatcher: Send + Sync {
    fn execute(&self, request: Request) -> Response;
}

pub const REGISTER_COMMAND: &str = "register";
pub const LOGIN_COMMAND: &str = "login";
pub const SERVER_EXIT_COMMAND: &str = "server_exit";

const HELP: &str = "\
help          show this message
ping          check that the server answers
echo <words>  repeat the given words
exit          end this session
server_exit   end this session and shut the server down";

/// In-memory dispatcher with a user registry and a handful of session
/// commands. Anything but `register`/`login` requires known credentials.
#[derive(Debug, Default)]
pub struct BasicDispatcher {
    users: Mutex<HashMap<String, String>>,
}

impl BasicDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, user: &User) -> Response {
        if user.login.is_empty() {
            return Response::error("login cannot be empty");
        }

        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        if users.contains_key(&user.login) {
            return Response::error(format!("user '{}' already exists", user.login));
        }
        users.insert(user.login.clone(), user.password.clone());
        info!("registered user '{}'", user.login);
        Response::ok(format!("user '{}' registered", user.login))
    }

    fn is_authorized(&self, user: &User) -> bool {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user.login)
            .is_some_and(|password| *password == user.password)
    }
}

impl Dispatcher for BasicDispatcher {
    fn execute(&self, request: Request) -> Response {
        debug!("executing '{}'", request.command_name);

        if request.is_empty() {
            return Response::error("empty request");
        }

        let Some(user) = request.user.as_ref() else {
            return Response::error("user is not authorized, log in first");
        };

        match request.command_name.as_str() {
            REGISTER_COMMAND => return self.register(user),
            _ if !self.is_authorized(user) => {
                return Response::error("wrong login or password");
            }
            LOGIN_COMMAND => return Response::ok(format!("welcome, {}", user.login)),
            _ => {}
        }

        match request.command_name.as_str() {
            "help" => Response::ok(HELP),
            "ping" => Response::ok("pong"),
            "echo" => match request.args::<Vec<String>>() {
                Ok(words) => Response::ok(words.join(" ")),
                Err(e) => Response::error(format!("invalid arguments: {e}")),
            },
            EXIT_COMMAND => Response::new(ResponseCode::ClientExit, "goodbye"),
            SERVER_EXIT_COMMAND => {
                Response::new(ResponseCode::ServerExit, "server is shutting down")
            }
            name => Response::error(format!("unknown command '{name}', try 'help'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Command;

    use super::*;

    fn request(line: &str, user: Option<User>) -> Request {
        let command: Command = line.try_into().unwrap();
        Request::from_command(command, user)
    }

    #[test]
    fn commands_require_a_user() {
        let dispatcher = BasicDispatcher::new();

        let resp = dispatcher.execute(request("help", None));
        assert_eq!(resp.code, ResponseCode::Error);
    }

    #[test]
    fn register_then_login() {
        let dispatcher = BasicDispatcher::new();
        let user = User::new("alice", "pw");

        let resp = dispatcher.execute(request("login", Some(user.clone())));
        assert_eq!(resp.code, ResponseCode::Error);

        let resp = dispatcher.execute(request("register", Some(user.clone())));
        assert_eq!(resp.code, ResponseCode::Ok);

        let resp = dispatcher.execute(request("register", Some(user.clone())));
        assert_eq!(resp.code, ResponseCode::Error);

        let resp = dispatcher.execute(request("login", Some(user)));
        assert_eq!(resp.code, ResponseCode::Ok);

        let resp = dispatcher.execute(request("login", Some(User::new("alice", "nope"))));
        assert_eq!(resp.code, ResponseCode::Error);
    }

    #[test]
    fn session_commands() {
        let dispatcher = BasicDispatcher::new();
        let user = User::new("bob", "pw");
        dispatcher.execute(request("register", Some(user.clone())));

        let resp = dispatcher.execute(request("echo a b", Some(user.clone())));
        assert_eq!(resp, Response::ok("a b"));

        let resp = dispatcher.execute(request("exit", Some(user.clone())));
        assert_eq!(resp.code, ResponseCode::ClientExit);

        let resp = dispatcher.execute(request("server_exit", Some(user.clone())));
        assert_eq!(resp.code, ResponseCode::ServerExit);

        let resp = dispatcher.execute(request("fly", Some(user)));
        assert_eq!(resp.code, ResponseCode::Error);
    }
}
