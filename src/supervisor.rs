//! Outermost resilience boundary.
//!
//! ```text
//! STARTING --client ok--> RUNNING --fault--> COOLDOWN --elapsed--> STARTING
//!     |   \--client failed-----------------> COOLDOWN
//!     \--------------- shutdown (any state) ---------------> STOPPED
//! ```
//!
//! A fault is anything that ends the polling loop other than a shutdown
//! request: a dead fetch client, or a panic inside the loop. Each restart
//! gets a freshly built client; the old one is closed first.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use crate::ingest::page::PageFetcher;
use crate::logging::{self, Component};
use crate::model::FetchError;
use crate::recorder::RecordSink;
use crate::runner::CycleRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Running,
    Cooldown,
    Stopped,
}

pub struct Supervisor<S, F> {
    runner: CycleRunner<S>,
    make_fetcher: F,
    cooldown: Duration,
    state: SupervisorState,
    restarts: u32,
}

impl<S, F> Supervisor<S, F>
where
    S: RecordSink,
    F: FnMut() -> Result<Box<dyn PageFetcher>, FetchError>,
{
    pub fn new(runner: CycleRunner<S>, make_fetcher: F, cooldown: Duration) -> Self {
        Self {
            runner,
            make_fetcher,
            cooldown,
            state: SupervisorState::Starting,
            restarts: 0,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Number of times the loop has gone through COOLDOWN.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn runner(&self) -> &CycleRunner<S> {
        &self.runner
    }

    /// Runs until shutdown is requested. Always ends in `Stopped`.
    pub fn serve(&mut self) -> SupervisorState {
        logging::info(
            Component::Supervisor,
            "Air-quality monitor starting (auto-restarts on crash)...",
        );

        let mut fetcher: Option<Box<dyn PageFetcher>> = None;

        while self.state != SupervisorState::Stopped {
            if self.runner.shutdown().is_triggered() {
                self.transition(SupervisorState::Stopped);
                break;
            }

            let next = match self.state {
                SupervisorState::Starting => match (self.make_fetcher)() {
                    Ok(client) => {
                        fetcher = Some(client);
                        SupervisorState::Running
                    }
                    Err(e) => {
                        logging::error(
                            Component::Supervisor,
                            &format!("Could not create fetch client: {}", e),
                        );
                        SupervisorState::Cooldown
                    }
                },
                SupervisorState::Running => match fetcher.as_mut() {
                    Some(client) => self.run_guarded(&mut **client),
                    None => SupervisorState::Starting,
                },
                SupervisorState::Cooldown => {
                    release(&mut fetcher);
                    self.restarts += 1;
                    logging::status(&restarting_line(self.cooldown));
                    if self.runner.shutdown().wait_timeout(self.cooldown) {
                        SupervisorState::Stopped
                    } else {
                        SupervisorState::Starting
                    }
                }
                SupervisorState::Stopped => SupervisorState::Stopped,
            };
            self.transition(next);
        }

        release(&mut fetcher);
        self.state
    }

    /// Runs the polling loop, turning a dead client or a panic into COOLDOWN.
    fn run_guarded(&self, fetcher: &mut dyn PageFetcher) -> SupervisorState {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.runner.run_forever(fetcher)));

        match outcome {
            Ok(Ok(())) => SupervisorState::Stopped,
            Ok(Err(e)) => {
                logging::error(Component::Supervisor, &format!("Polling loop crashed: {}", e));
                SupervisorState::Cooldown
            }
            Err(payload) => {
                logging::error(
                    Component::Supervisor,
                    &format!("Polling loop panicked: {}", panic_message(payload.as_ref())),
                );
                SupervisorState::Cooldown
            }
        }
    }

    fn transition(&mut self, next: SupervisorState) {
        if next != self.state {
            logging::debug(
                Component::Supervisor,
                &format!("{:?} -> {:?}", self.state, next),
            );
            self.state = next;
        }
    }
}

fn release(fetcher: &mut Option<Box<dyn PageFetcher>>) {
    if let Some(mut client) = fetcher.take() {
        client.close();
        logging::info(Component::Fetch, "Fetch client released.");
    }
}

/// Console line announcing the cooldown before a restart.
pub fn restarting_line(cooldown: Duration) -> String {
    logging::status_line(
        "RESTARTING",
        &format!("Waiting {} seconds before retrying...", cooldown.as_secs()),
    )
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
