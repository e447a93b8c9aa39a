use crate::api::codes;
use crate::error::{Error, Result};

/// A session that can obtain a fresh token.
pub trait Reauthenticate {
    fn reauthenticate(&mut self) -> Result<()>;
}

/// Decides whether a failed data operation is retried after logging in again.
///
/// Only an expired or invalid token (server code 952) qualifies, and only one
/// retry is made per call; a second failure is returned unchanged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReloginPolicy {
    enabled: bool,
}

impl ReloginPolicy {
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn should_relogin(&self, error: &Error) -> bool {
        self.enabled && error.is_remote(codes::INVALID_DAPI_TOKEN)
    }

    /// Runs `operation`; on a token error, reauthenticates `session` and runs it once more.
    pub fn run<S, R, F>(&self, session: &mut S, mut operation: F) -> Result<R>
    where
        S: Reauthenticate,
        F: FnMut(&mut S) -> Result<R>,
    {
        let error = match operation(session) {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if !self.should_relogin(&error) {
            return Err(error);
        }
        tracing::warn!(
            code = codes::INVALID_DAPI_TOKEN,
            "session token rejected, logging in again"
        );
        session.reauthenticate()?;
        operation(session)
    }
}
