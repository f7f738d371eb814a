//! One extraction, end to end: pre-check, prompt, extract, report.
//!
//! The session runs the blocking work on tokio's blocking pool and keeps the
//! calling task free to drive the user interface. Password requests and
//! progress updates travel from the worker over channels.

use crate::error::ExtractError;
use crate::extract::extract_stream;
use crate::password::{ChannelOracle, Password, PasswordRequest};
use crate::probe::is_first_entry_encrypted;
use crate::types::{ExtractOptions, Extraction};
use std::fs::File;
use std::future::Future;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;

/// The only content type a session accepts.
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// What to extract and where to stage it.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    /// Display name of the archive, used in prompts and messages
    pub archive_name: String,
    /// Declared content type of the source
    pub content_type: String,
    /// Cache directory that receives the staging root
    pub staging_parent: PathBuf,
}

/// A byte stream that can be opened from the start more than once.
pub trait ArchiveSource: Send + Sync + 'static {
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;
}

impl ArchiveSource for PathBuf {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(self)?))
    }
}

impl ArchiveSource for Arc<[u8]> {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(Arc::clone(self))))
    }
}

/// The user-facing side of a session.
pub trait SessionUi {
    /// Show the (non-cancelable) progress indicator.
    fn show_progress(&mut self, archive_name: &str);

    /// Hide the progress indicator. Called exactly once after `show_progress`.
    fn dismiss_progress(&mut self);

    /// Ask for the archive password. `None` means the user dismissed the prompt.
    fn prompt_password(
        &mut self,
        archive_name: &str,
    ) -> impl Future<Output = Option<Password>> + Send;

    /// A file has been written.
    fn on_progress(&mut self, _file: &str, _bytes_written: u64) {}

    /// The session failed; `message` is the text meant for the user.
    fn report_failure(&mut self, archive_name: &str, message: &str, error: &ExtractError);

    fn on_success(&mut self, _extraction: &Extraction) {}
}

/// Drives a single extraction request to a terminal result.
#[derive(Debug)]
pub struct ExtractionSession {
    request: ExtractRequest,
    options: ExtractOptions,
    cancel_flag: Arc<AtomicBool>,
}

impl ExtractionSession {
    pub fn new(request: ExtractRequest, options: ExtractOptions) -> Self {
        Self {
            request,
            options,
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn request(&self) -> &ExtractRequest {
        &self.request
    }

    /// Flag that cancels this session's extraction when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel_flag.clone()
    }

    /// Run the session. Failures are reported to `ui` and also returned.
    pub async fn run<S, U>(self, source: S, ui: &mut U) -> Result<Extraction, ExtractError>
    where
        S: ArchiveSource,
        U: SessionUi,
    {
        let name = self.request.archive_name.clone();
        let mut progress_shown = false;

        let result = self.drive(source, ui, &mut progress_shown).await;

        if progress_shown {
            ui.dismiss_progress();
        }

        match &result {
            Ok(extraction) => ui.on_success(extraction),
            Err(e) => {
                tracing::warn!(archive = %name, kind = ?e.kind(), "extraction failed: {}", e);
                ui.report_failure(&name, &format!("Failed to open archive {}", name), e);
            }
        }

        result
    }

    async fn drive<S, U>(
        &self,
        source: S,
        ui: &mut U,
        progress_shown: &mut bool,
    ) -> Result<Extraction, ExtractError>
    where
        S: ArchiveSource,
        U: SessionUi,
    {
        let name = self.request.archive_name.clone();

        if self.request.content_type != ZIP_CONTENT_TYPE {
            return Err(ExtractError::UnsupportedContentType(
                self.request.content_type.clone(),
            ));
        }

        let source = Arc::new(source);

        // Encryption pre-check on its own stream
        let probe_source = source.clone();
        let encrypted = tokio::task::spawn_blocking(move || {
            let mut reader = probe_source.open()?;
            is_first_entry_encrypted(&mut reader)
        })
        .await
        .map_err(join_error)??;
        tracing::info!(archive = %name, encrypted, "checked archive encryption");

        if !encrypted {
            ui.show_progress(&name);
            *progress_shown = true;
        }

        let (password_tx, mut password_rx) = mpsc::channel::<PasswordRequest>(1);
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<(String, u64)>();

        let oracle = ChannelOracle::new(name.clone(), password_tx);
        let options = self.options.clone();
        let staging_parent = self.request.staging_parent.clone();
        let cancel_flag = self.cancel_flag.clone();

        let mut worker = tokio::task::spawn_blocking(move || {
            let reader = source.open()?;
            let progress_cb = move |file: &str, bytes_written: u64, _total: Option<u64>| {
                // The receiver only goes away once the session is finished.
                let _ = progress_tx.send((file.to_string(), bytes_written));
                true
            };
            extract_stream(
                reader,
                &staging_parent,
                oracle,
                &options,
                &progress_cb,
                cancel_flag,
            )
        });

        let mut requests_open = true;
        let mut updates_open = true;

        loop {
            tokio::select! {
                joined = &mut worker => {
                    // Files written just before the worker finished
                    while let Ok((file, bytes_written)) = progress_rx.try_recv() {
                        if !*progress_shown {
                            ui.show_progress(&name);
                            *progress_shown = true;
                        }
                        ui.on_progress(&file, bytes_written);
                    }
                    return joined.map_err(join_error)?;
                }
                request = password_rx.recv(), if requests_open => match request {
                    Some(request) => {
                        let password = ui.prompt_password(&request.archive_name).await;
                        let answered = password.is_some();
                        request.respond(password);

                        if !answered {
                            tracing::info!(archive = %name, "password prompt dismissed");
                        } else if !*progress_shown {
                            ui.show_progress(&name);
                            *progress_shown = true;
                        }
                    }
                    None => requests_open = false,
                },
                update = progress_rx.recv(), if updates_open => match update {
                    Some((file, bytes_written)) => {
                        if !*progress_shown {
                            ui.show_progress(&name);
                            *progress_shown = true;
                        }
                        ui.on_progress(&file, bytes_written);
                    }
                    None => updates_open = false,
                },
            }
        }
    }
}

fn join_error(e: JoinError) -> ExtractError {
    ExtractError::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("Task join error: {}", e),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[derive(Default)]
    struct RecordingUi {
        events: Vec<String>,
    }

    impl SessionUi for RecordingUi {
        fn show_progress(&mut self, _archive_name: &str) {
            self.events.push("show".to_string());
        }

        fn dismiss_progress(&mut self) {
            self.events.push("dismiss".to_string());
        }

        async fn prompt_password(&mut self, _archive_name: &str) -> Option<Password> {
            self.events.push("prompt".to_string());
            None
        }

        fn report_failure(&mut self, _archive_name: &str, message: &str, _error: &ExtractError) {
            self.events.push(format!("failure: {}", message));
        }
    }

    fn request(content_type: &str, parent: PathBuf) -> ExtractRequest {
        ExtractRequest {
            archive_name: "bundle.zip".to_string(),
            content_type: content_type.to_string(),
            staging_parent: parent,
        }
    }

    #[tokio::test]
    async fn test_rejects_other_content_types() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let session = ExtractionSession::new(
            request("application/pdf", temp_dir.path().to_path_buf()),
            ExtractOptions::default(),
        );
        let mut ui = RecordingUi::default();

        let source: Arc<[u8]> = Arc::from(&b"PK"[..]);
        let err = session.run(source, &mut ui).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        // Never got far enough to show progress
        assert_eq!(ui.events, vec!["failure: Failed to open archive bundle.zip"]);
    }

    #[tokio::test]
    async fn test_malformed_stream_fails_before_progress() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let session = ExtractionSession::new(
            request(ZIP_CONTENT_TYPE, temp_dir.path().to_path_buf()),
            ExtractOptions::default(),
        );
        let mut ui = RecordingUi::default();

        let source: Arc<[u8]> = Arc::from(&b"definitely not a zip"[..]);
        let err = session.run(source, &mut ui).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MalformedHeader);
        assert_eq!(ui.events, vec!["failure: Failed to open archive bundle.zip"]);
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}
