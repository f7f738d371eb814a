//! Password acquisition for encrypted archives.
//!
//! A [`PasswordOracle`] is consumed when asked, so a single extraction can
//! prompt at most once. [`ChannelOracle`] hands the question from the
//! extraction worker to whichever task owns the user interface.

use crate::error::ExtractError;
use std::fmt;
use std::sync::atomic::{compiler_fence, Ordering};
use tokio::sync::{mpsc, oneshot};

/// A password typed in by the user. The bytes are overwritten on drop.
pub struct Password(Vec<u8>);

impl Password {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self(value.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<String> for Password {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

impl Drop for Password {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
        compiler_fence(Ordering::SeqCst);
    }
}

/// Supplies the password for an archive, on demand.
///
/// Returning `None` means the user declined; extraction then fails with
/// [`ExtractError::PasswordRequired`].
pub trait PasswordOracle {
    fn obtain_password(self) -> Option<Password>;
}

impl<F> PasswordOracle for F
where
    F: FnOnce() -> Option<Password>,
{
    fn obtain_password(self) -> Option<Password> {
        self()
    }
}

/// Oracle for callers that have no way to ask.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPassword;

impl PasswordOracle for NoPassword {
    fn obtain_password(self) -> Option<Password> {
        None
    }
}

/// A pending question from the extraction worker.
#[derive(Debug)]
pub struct PasswordRequest {
    pub archive_name: String,
    reply: oneshot::Sender<Option<Password>>,
}

impl PasswordRequest {
    /// Answer the request. Dropping the request unanswered counts as a cancel.
    pub fn respond(self, password: Option<Password>) {
        if self.reply.send(password).is_err() {
            tracing::debug!(archive = %self.archive_name, "password reply dropped, extraction already gone");
        }
    }
}

/// Oracle that forwards the question over a channel and blocks for the reply.
///
/// Must be used from a thread that may block, such as a
/// `tokio::task::spawn_blocking` worker.
#[derive(Debug)]
pub struct ChannelOracle {
    archive_name: String,
    requests: mpsc::Sender<PasswordRequest>,
}

impl ChannelOracle {
    pub fn new(archive_name: impl Into<String>, requests: mpsc::Sender<PasswordRequest>) -> Self {
        Self {
            archive_name: archive_name.into(),
            requests,
        }
    }
}

impl PasswordOracle for ChannelOracle {
    fn obtain_password(self) -> Option<Password> {
        let (reply, answer) = oneshot::channel();
        let request = PasswordRequest {
            archive_name: self.archive_name,
            reply,
        };

        if self.requests.blocking_send(request).is_err() {
            tracing::warn!("password prompt unavailable, treating as cancelled");
            return None;
        }

        answer.blocking_recv().ok().flatten()
    }
}

/// Lazily obtained password, shared by every encrypted entry of one archive.
pub(crate) struct PasswordSlot<O> {
    oracle: Option<O>,
    password: Option<Password>,
}

impl<O: PasswordOracle> PasswordSlot<O> {
    pub(crate) fn new(oracle: O) -> Self {
        Self {
            oracle: Some(oracle),
            password: None,
        }
    }

    /// The archive password, asking the oracle the first time only.
    pub(crate) fn get(&mut self) -> Result<&Password, ExtractError> {
        if self.password.is_none() {
            let oracle = self.oracle.take().ok_or(ExtractError::PasswordRequired)?;
            tracing::info!("encrypted entry found, requesting password");
            self.password = oracle.obtain_password();
        }
        self.password.as_ref().ok_or(ExtractError::PasswordRequired)
    }
}
