use std::thread;
use std::time::Instant;

use relay_contracts::runs::{RunHandle, RunStatus};
use relay_contracts::{RelayError, RelayResult};

use crate::api::AssistantApi;
use crate::config::PollSettings;

/// Something observed while waiting on a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    StatusChanged {
        run_id: String,
        from: RunStatus,
        to: RunStatus,
    },
    Cancelled {
        run_id: String,
        status: RunStatus,
    },
    CancelFailed {
        run_id: String,
        error: String,
    },
}

/// The session's conversation on the remote service.
///
/// The thread is created lazily on the first turn and reused for every turn
/// after that.
#[derive(Debug, Clone, Default)]
pub struct ConversationThread {
    thread_id: Option<String>,
}

impl ConversationThread {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn ensure_thread(&mut self, api: &dyn AssistantApi) -> RelayResult<String> {
        if let Some(thread_id) = &self.thread_id {
            return Ok(thread_id.clone());
        }
        let thread_id = api.create_thread()?;
        self.thread_id = Some(thread_id.clone());
        Ok(thread_id)
    }

    /// Appends `utterance` as a user message, with `attachments` handed to
    /// the assistant alongside it, and starts a run for `assistant_id`.
    pub fn send_and_run(
        &mut self,
        api: &dyn AssistantApi,
        assistant_id: &str,
        utterance: &str,
        attachments: &[String],
    ) -> RelayResult<RunHandle> {
        let thread_id = self.ensure_thread(api)?;
        api.create_message(&thread_id, utterance, attachments)?;
        api.create_run(&thread_id, assistant_id)
    }

    /// Polls `handle` at a fixed interval until it reaches a terminal status.
    ///
    /// When the timeout passes the run is cancelled first (if enabled) and
    /// `RelayError::Timeout` is returned either way. A cancelled run is polled
    /// a few more times until it settles; if it is still `cancelling` after
    /// that, the next message on this thread may be rejected by the service.
    pub fn await_completion(
        &self,
        api: &dyn AssistantApi,
        handle: RunHandle,
        poll: &PollSettings,
        on_event: &mut dyn FnMut(RunEvent),
    ) -> RelayResult<RunHandle> {
        let started = Instant::now();
        let mut current = handle;
        loop {
            if current.status.is_terminal() {
                return Ok(current);
            }
            if started.elapsed() >= poll.timeout {
                let waited_s = started.elapsed().as_secs_f64();
                if poll.cancel_on_timeout {
                    match cancel_and_settle(api, &current, poll) {
                        Ok(cancelled) => on_event(RunEvent::Cancelled {
                            run_id: cancelled.run_id,
                            status: cancelled.status,
                        }),
                        Err(err) => on_event(RunEvent::CancelFailed {
                            run_id: current.run_id.clone(),
                            error: err.to_string(),
                        }),
                    }
                }
                return Err(RelayError::Timeout {
                    run_id: current.run_id,
                    waited_s,
                });
            }
            thread::sleep(poll.interval);
            let next = api.retrieve_run(&current.thread_id, &current.run_id)?;
            if next.status != current.status {
                on_event(RunEvent::StatusChanged {
                    run_id: next.run_id.clone(),
                    from: current.status,
                    to: next.status,
                });
            }
            current = next;
        }
    }
}

/// Retrieves after a cancel request at most this many times.
const CANCEL_SETTLE_POLLS: usize = 10;

fn cancel_and_settle(
    api: &dyn AssistantApi,
    run: &RunHandle,
    poll: &PollSettings,
) -> RelayResult<RunHandle> {
    let mut settled = api.cancel_run(&run.thread_id, &run.run_id)?;
    for _ in 0..CANCEL_SETTLE_POLLS {
        if settled.status.is_terminal() {
            break;
        }
        thread::sleep(poll.interval);
        settled = api.retrieve_run(&run.thread_id, &run.run_id)?;
    }
    Ok(settled)
}
