//! Emission data page client
//!
//! Retrieves the real-time emission data page and hands back its markup
//! once the readings table is present. The page fills its table in after
//! the initial response, so the fetcher re-polls until the table shows up
//! or the fetch timeout (15 s by default) runs out.
//!
//! Each request runs on its own worker thread so that a shutdown request
//! ends the wait at once; an abandoned request finishes on its own timeout.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::extract::has_readings_table;
use crate::model::FetchError;
use crate::shutdown::Shutdown;

// ============================================================================
// Fetch capability
// ============================================================================

/// Turns a URL into markup that contains the readings table.
pub trait PageFetcher {
    /// Blocks until the readings table is present, or fails.
    fn fetch(&mut self, url: &str) -> Result<String, FetchError>;

    /// Releases the underlying client. Called once before the fetcher is dropped.
    fn close(&mut self) {}
}

impl<F: PageFetcher + ?Sized> PageFetcher for Box<F> {
    fn fetch(&mut self, url: &str) -> Result<String, FetchError> {
        (**self).fetch(url)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// How often a caller blocked on an in-flight request checks for shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Settings for [`HttpPageFetcher`].
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Total budget for the table to appear.
    pub timeout: Duration,
    /// Pause between re-polls while the table is still missing.
    pub retry_delay: Duration,
    pub user_agent: String,
}

pub struct HttpPageFetcher {
    client: Option<reqwest::blocking::Client>,
    settings: FetchSettings,
    shutdown: Shutdown,
}

impl HttpPageFetcher {
    /// Builds a fresh client session.
    ///
    /// A failure here means no session can be had at all, so it is reported
    /// as `SessionLost`.
    pub fn connect(settings: FetchSettings, shutdown: Shutdown) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| FetchError::SessionLost(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            client: Some(client),
            settings,
            shutdown,
        })
    }

    fn get_once(
        client: &reqwest::blocking::Client,
        url: &str,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let response = client
            .get(url)
            .header("Accept", "text/html")
            .timeout(timeout)
            .send()
            .map_err(|e| classify_request_error(&e, timeout))?;

        if !response.status().is_success() {
            return Err(FetchError::Http(response.status().as_u16()));
        }

        response
            .text()
            .map_err(|e| classify_request_error(&e, timeout))
    }

    /// `get_once` on a worker thread, abandoned if shutdown is requested.
    fn get_interruptible(
        &self,
        client: &reqwest::blocking::Client,
        url: &str,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let (tx, rx) = mpsc::channel();
        let client = client.clone();
        let url = url.to_string();
        thread::spawn(move || {
            // The receiver is gone if the caller gave up; nothing to report.
            let _ = tx.send(Self::get_once(&client, &url, timeout));
        });

        loop {
            match rx.recv_timeout(SHUTDOWN_POLL) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => {
                    if self.shutdown.is_triggered() {
                        return Err(FetchError::Interrupted);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(FetchError::Network("request worker exited".to_string()));
                }
            }
        }
    }
}

impl PageFetcher for HttpPageFetcher {
    fn fetch(&mut self, url: &str) -> Result<String, FetchError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| FetchError::SessionLost("client already closed".to_string()))?;

        let budget = self.settings.timeout;
        let deadline = Instant::now() + budget;

        loop {
            if self.shutdown.is_triggered() {
                return Err(FetchError::Interrupted);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(FetchError::Timeout {
                    secs: budget.as_secs(),
                });
            }

            let markup = self.get_interruptible(client, url, remaining)?;
            if has_readings_table(&markup) {
                return Ok(markup);
            }

            let pause = self
                .settings
                .retry_delay
                .min(deadline.saturating_duration_since(Instant::now()));
            if self.shutdown.wait_timeout(pause) {
                return Err(FetchError::Interrupted);
            }
        }
    }

    fn close(&mut self) {
        self.client = None;
    }
}

fn classify_request_error(err: &reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            secs: timeout.as_secs().max(1),
        }
    } else if let Some(status) = err.status() {
        FetchError::Http(status.as_u16())
    } else if err.is_builder() {
        FetchError::SessionLost(err.to_string())
    } else {
        FetchError::Network(err.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
