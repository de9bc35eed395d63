use bincode::{Decode, Encode};

#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub enum ResponseCode {
    Ok,
    Error,
    /// The client asked to end its session.
    ClientExit,
    /// The client asked the whole server to shut down.
    ServerExit,
}

impl ResponseCode {
    /// Exit codes end the session that produced them.
    pub fn is_exit(self) -> bool {
        matches!(self, ResponseCode::ClientExit | ResponseCode::ServerExit)
    }
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct Response {
    pub code: ResponseCode,
    pub body: String,
}

impl Response {
    pub fn new(code: ResponseCode, body: impl Into<String>) -> Self {
        Self {
            code,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(ResponseCode::Ok, body)
    }

    pub fn error(body: impl Into<String>) -> Self {
        Self::new(ResponseCode::Error, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_exit_codes_are_terminal() {
        assert!(ResponseCode::ClientExit.is_exit());
        assert!(ResponseCode::ServerExit.is_exit());
        assert!(!ResponseCode::Ok.is_exit());
        assert!(!ResponseCode::Error.is_exit());
    }
}
