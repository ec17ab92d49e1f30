//! The polling loop: wait for the next boundary, then fetch -> extract ->
//! record, once per boundary, strictly one cycle at a time.
//!
//! Every cycle failure is logged and absorbed here. The one exception is a
//! fetch client that reports itself dead (`FetchError::SessionLost`): that
//! ends `run_forever` so the supervisor can rebuild the client.

use chrono::NaiveDateTime;
use scraper::Html;

use crate::extract::extract_detailed;
use crate::ingest::page::PageFetcher;
use crate::logging::{self, Component};
use crate::model::{CycleError, FetchError, Sample, TIMESTAMP_FORMAT};
use crate::recorder::RecordSink;
use crate::schedule::{local_now, time_until, Scheduler, WaitOutcome};
use crate::shutdown::Shutdown;

pub struct CycleRunner<S> {
    url: String,
    scheduler: Scheduler,
    sink: S,
    shutdown: Shutdown,
    clock: fn() -> NaiveDateTime,
}

impl<S: RecordSink> CycleRunner<S> {
    pub fn new(url: impl Into<String>, scheduler: Scheduler, sink: S, shutdown: Shutdown) -> Self {
        Self {
            url: url.into(),
            scheduler,
            sink,
            shutdown,
            clock: local_now,
        }
    }

    /// Replaces the wall clock used for capture timestamps and boundaries.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Fetches and extracts without recording.
    pub fn probe(&self, fetcher: &mut dyn PageFetcher) -> Result<Sample, CycleError> {
        let markup = fetcher.fetch(&self.url)?;
        let doc = Html::parse_document(&markup);
        let extraction = extract_detailed(&doc, (self.clock)());

        for skipped in &extraction.skipped_rows {
            logging::warn(Component::Extract, &skipped.to_string());
        }
        Ok(extraction.result?)
    }

    /// One fetch -> extract -> record pass.
    pub fn run_cycle(&self, fetcher: &mut dyn PageFetcher) -> Result<Sample, CycleError> {
        let sample = self.probe(fetcher)?;
        self.sink.record(&sample)?;
        Ok(sample)
    }

    /// Runs one cycle and reports its outcome; only a dead client escapes.
    /// A cycle cut short by shutdown is not a failure and is not logged as one.
    pub fn run_isolated(&self, fetcher: &mut dyn PageFetcher) -> Result<Option<Sample>, FetchError> {
        match self.run_cycle(fetcher) {
            Ok(sample) => {
                logging::status(&saved_line(&sample));
                Ok(Some(sample))
            }
            Err(CycleError::Fetch(FetchError::Interrupted)) => {
                logging::debug(Component::Fetch, "Fetch abandoned on shutdown");
                Ok(None)
            }
            Err(CycleError::Fetch(err)) if err.is_fatal() => Err(err),
            Err(_) if self.shutdown.is_triggered() => Ok(None),
            Err(err) => {
                logging::log_cycle_failure(&err);
                Ok(None)
            }
        }
    }

    /// Loops until shutdown is requested (`Ok`) or the client dies (`Err`).
    pub fn run_forever(&self, fetcher: &mut dyn PageFetcher) -> Result<(), FetchError> {
        logging::info(
            Component::Schedule,
            &format!(
                "Starting polling every {}s...",
                self.scheduler.interval().as_secs()
            ),
        );

        loop {
            if self.shutdown.is_triggered() {
                return Ok(());
            }

            let now = (self.clock)();
            let next = self.scheduler.next_boundary(now);
            logging::status(&waiting_line(next, now));

            if self.scheduler.wait_until(next, now, &self.shutdown) == WaitOutcome::Interrupted {
                return Ok(());
            }

            self.run_isolated(fetcher)?;
        }
    }
}

/// Console line for a recorded sample.
pub fn saved_line(sample: &Sample) -> String {
    logging::status_line(
        "SAVED CSV",
        &format!(
            "{}: {:?} | Last Update: {}",
            sample.timestamp.format(TIMESTAMP_FORMAT),
            sample.stations(),
            sample.last_update
        ),
    )
}

/// Console line announcing the wait for the next boundary.
pub fn waiting_line(next: NaiveDateTime, now: NaiveDateTime) -> String {
    logging::status_line(
        "WAITING",
        &format!(
            "Sleeping {}s \u{2192} Next run at {}",
            time_until(next, now).as_secs(),
            next.format(TIMESTAMP_FORMAT)
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RejectionReason, SinkError};
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 5, 0)
            .unwrap()
    }

    /// Replays canned fetch results in order.
    struct Scripted(VecDeque<Result<String, FetchError>>);

    impl PageFetcher for Scripted {
        fn fetch(&mut self, _url: &str) -> Result<String, FetchError> {
            self.0
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::SessionLost("script exhausted".into())))
        }
    }

    #[derive(Default)]
    struct MemorySink {
        rows: RefCell<Vec<Sample>>,
        broken: bool,
    }

    impl RecordSink for MemorySink {
        fn record(&self, sample: &Sample) -> Result<(), SinkError> {
            if self.broken {
                return Err(SinkError {
                    path: "mem".into(),
                    source: std::io::Error::other("read-only"),
                });
            }
            self.rows.borrow_mut().push(sample.clone());
            Ok(())
        }
    }

    fn page(values: &[&str]) -> String {
        let rows: String = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                format!(
                    "<tr><td>#{}</td><td>Benzene</td><td>{}</td><td>2024-01-01 10:00</td></tr>",
                    i + 1,
                    v
                )
            })
            .collect();
        format!(
            "<div class=\"c-table-container\"><table><tbody>{}</tbody></table></div>",
            rows
        )
    }

    fn runner(sink: MemorySink) -> CycleRunner<MemorySink> {
        CycleRunner::new("http://test/", Scheduler::default(), sink, Shutdown::new())
            .with_clock(fixed_now)
    }

    #[test]
    fn test_good_page_is_recorded() {
        let runner = runner(MemorySink::default());
        let mut fetcher = Scripted(VecDeque::from([Ok(page(&["1.0", "2.0", "3.0", "4.0", "5.0"]))]));

        let sample = runner.run_cycle(&mut fetcher).expect("cycle should succeed");
        assert_eq!(sample.stations(), &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(sample.timestamp, fixed_now());
        assert_eq!(runner.sink().rows.borrow().len(), 1);
    }

    #[test]
    fn test_rejection_records_nothing() {
        let runner = runner(MemorySink::default());
        let mut fetcher = Scripted(VecDeque::from([Ok(page(&["1", "2", "3"]))]));

        let err = runner.run_cycle(&mut fetcher).unwrap_err();
        assert!(matches!(
            err,
            CycleError::ExtractionRejected(RejectionReason::WrongCount(3))
        ));
        assert!(runner.sink().rows.borrow().is_empty());
    }

    #[test]
    fn test_transient_failures_are_absorbed() {
        let runner = runner(MemorySink::default());
        let mut fetcher = Scripted(VecDeque::from([
            Err(FetchError::Timeout { secs: 15 }),
            Err(FetchError::Http(502)),
            Ok("<html>still loading</html>".to_string()),
        ]));

        for _ in 0..3 {
            assert_eq!(runner.run_isolated(&mut fetcher), Ok(None));
        }
    }

    #[test]
    fn test_sink_failure_is_absorbed() {
        let runner = runner(MemorySink {
            broken: true,
            ..Default::default()
        });
        let mut fetcher = Scripted(VecDeque::from([Ok(page(&["1", "2", "3", "4", "5"]))]));
        assert_eq!(runner.run_isolated(&mut fetcher), Ok(None));
    }

    #[test]
    fn test_dead_session_escapes() {
        let runner = runner(MemorySink::default());
        let mut fetcher = Scripted(VecDeque::from([Err(FetchError::SessionLost("gone".into()))]));
        assert!(matches!(
            runner.run_isolated(&mut fetcher),
            Err(FetchError::SessionLost(_))
        ));
    }

    #[test]
    fn test_interrupted_fetch_is_not_a_failure() {
        let runner = runner(MemorySink::default());
        runner.shutdown().trigger();
        let mut fetcher = Scripted(VecDeque::from([Err(FetchError::Interrupted)]));
        assert_eq!(runner.run_isolated(&mut fetcher), Ok(None));
        assert!(runner.sink().rows.borrow().is_empty());
    }

    #[test]
    fn test_probe_does_not_record() {
        let runner = runner(MemorySink::default());
        let mut fetcher = Scripted(VecDeque::from([Ok(page(&["1", "2", "3", "4", "5"]))]));
        assert!(runner.probe(&mut fetcher).is_ok());
        assert!(runner.sink().rows.borrow().is_empty());
    }

    #[test]
    fn test_status_lines_carry_their_tags() {
        let sample = Sample::new(fixed_now(), vec![1.0, 2.0, 3.0, 4.0, 5.0], "x".into()).unwrap();
        assert_eq!(
            saved_line(&sample),
            "[SAVED CSV] 2024-01-01 10:05:00: [1.0, 2.0, 3.0, 4.0, 5.0] | Last Update: x"
        );

        let next = fixed_now() + chrono::Duration::seconds(300);
        assert_eq!(
            waiting_line(next, fixed_now()),
            "[WAITING] Sleeping 300s \u{2192} Next run at 2024-01-01 10:10:00"
        );
    }

    #[test]
    fn test_run_forever_returns_on_shutdown() {
        let runner = runner(MemorySink::default());
        runner.shutdown().trigger();
        let mut fetcher = Scripted(VecDeque::new());
        assert_eq!(runner.run_forever(&mut fetcher), Ok(()));
    }
}
