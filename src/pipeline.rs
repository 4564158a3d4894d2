//! Background conversion worker.
//!
//! Jobs are converted one at a time in submission order on a dedicated thread.
//! A job that is already running is never cancelled; the UI applies whatever
//! comes back, even if the buffer has moved on since.

use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use crate::convert::{ConvertError, Converter};
use crate::diagnostics::{self, Diagnostic};

/// Converted output and the diagnostics found in it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rendered {
    pub html: String,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug)]
pub struct Outcome {
    pub generation: u64,
    pub elapsed: Duration,
    pub result: Result<Rendered, ConvertError>,
}

struct Job {
    generation: u64,
    source: String,
}

/// Converts `source` and extracts its diagnostics.
pub fn run_once(converter: &dyn Converter, source: &str) -> Result<Rendered, ConvertError> {
    let html = converter.render(source)?;
    let diagnostics = diagnostics::extract(&html);
    Ok(Rendered { html, diagnostics })
}

pub struct Pipeline {
    jobs: Sender<Job>,
    outcomes: Receiver<Outcome>,
    converter_name: String,
    in_flight: usize,
}

impl Pipeline {
    pub fn spawn(converter: Box<dyn Converter>) -> io::Result<Self> {
        let converter_name = converter.name().to_string();
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (outcome_tx, outcome_rx) = mpsc::channel();

        thread::Builder::new()
            .name("rstlive-convert".to_string())
            .spawn(move || {
                for job in job_rx {
                    let started = Instant::now();
                    let result = run_once(converter.as_ref(), &job.source);
                    let elapsed = started.elapsed();
                    match &result {
                        Ok(rendered) => tracing::debug!(
                            generation = job.generation,
                            diagnostics = rendered.diagnostics.len(),
                            elapsed_ms = elapsed.as_millis() as u64,
                            "conversion finished"
                        ),
                        Err(err) => tracing::warn!(
                            generation = job.generation,
                            error = %err,
                            "conversion failed"
                        ),
                    }
                    let outcome = Outcome {
                        generation: job.generation,
                        elapsed,
                        result,
                    };
                    if outcome_tx.send(outcome).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            jobs: job_tx,
            outcomes: outcome_rx,
            converter_name,
            in_flight: 0,
        })
    }

    pub fn converter_name(&self) -> &str {
        &self.converter_name
    }

    /// Queues a snapshot of the source. Returns `false` if the worker is gone.
    pub fn submit(&mut self, generation: u64, source: String) -> bool {
        tracing::debug!(generation, bytes = source.len(), "submitting conversion");
        if self.jobs.send(Job { generation, source }).is_err() {
            return false;
        }
        self.in_flight += 1;
        true
    }

    /// Next finished conversion, without blocking.
    pub fn poll(&mut self) -> Option<Outcome> {
        match self.outcomes.try_recv() {
            Ok(outcome) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                Some(outcome)
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Next finished conversion, waiting up to `timeout`.
    pub fn wait(&mut self, timeout: Duration) -> Option<Outcome> {
        match self.outcomes.recv_timeout(timeout) {
            Ok(outcome) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                Some(outcome)
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}
