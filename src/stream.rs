//! Incremental step streaming.
//!
//! A generation can run in the background and surface each tool invocation
//! as it happens over a bounded channel, terminated by a sentinel carrying
//! the final result. The producer never blocks indefinitely: an enqueue
//! that cannot complete within the configured window drops the event and
//! the worker moves on, so a consumer that stops polling cannot wedge the
//! generation.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

use crate::agent::{GenerationMode, GenerationRequest, SqlAgent};
use crate::types::{AgentStep, SqlGenerationResult};

/// One event on the stream. `Finished` is always the last event delivered.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Step(AgentStep),
    Finished(Box<SqlGenerationResult>),
}

/// Producer half handed to the generation worker.
pub(crate) struct StepSink {
    tx: mpsc::Sender<StreamEvent>,
    enqueue_timeout: Duration,
}

impl StepSink {
    async fn send(&self, event: StreamEvent) -> bool {
        match self.tx.send_timeout(event, self.enqueue_timeout).await {
            Ok(()) => true,
            Err(_) => {
                warn!("stream consumer stalled, dropping event");
                false
            }
        }
    }

    pub async fn send_step(&self, step: AgentStep) -> bool {
        self.send(StreamEvent::Step(step)).await
    }

    async fn send_finished(&self, result: SqlGenerationResult) -> bool {
        self.send(StreamEvent::Finished(Box::new(result))).await
    }
}

/// Consumer half returned to the caller. `next` polls cooperatively and
/// yields `None` once the channel is closed after the sentinel.
pub struct StepStream {
    rx: mpsc::Receiver<StreamEvent>,
    poll_interval: Duration,
    finished: bool,
}

impl StepStream {
    /// Next event, or `None` when the stream is exhausted.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    if matches!(event, StreamEvent::Finished(_)) {
                        self.finished = true;
                    }
                    return Some(event);
                }
                Err(mpsc::error::TryRecvError::Empty) => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(mpsc::error::TryRecvError::Disconnected) => return None,
            }
        }
    }
}

impl SqlAgent {
    /// Run a generation in the background, streaming each step as it is
    /// recorded and closing with a `Finished` sentinel. Uses the tighter
    /// streaming budget so the consumer sees an outcome sooner.
    pub fn stream(&self, request: GenerationRequest, mode: GenerationMode) -> StepStream {
        let config = self.config().clone();
        let (tx, rx) = mpsc::channel(config.stream_capacity);
        let sink = StepSink {
            tx,
            enqueue_timeout: Duration::from_secs(config.stream_enqueue_timeout_seconds),
        };
        let budget = config.streaming_budget;
        let poll_interval = Duration::from_millis(config.stream_poll_interval_ms);
        let agent = self.clone();

        tokio::spawn(async move {
            let result = agent
                .run_generation(request, mode, budget, Some(&sink))
                .await;
            let result = match result {
                Ok(result) => result,
                Err(e) => SqlGenerationResult::failed(e.to_string(), Default::default(), vec![]),
            };
            sink.send_finished(result).await;
        });

        StepStream {
            rx,
            poll_interval,
            finished: false,
        }
    }
}
