//! Response framing for a single command exchange.
//!
//! A reply ends either at the first line equal to the caller's terminator
//! or, when no terminator is given, once the device has stayed quiet for the
//! session's `quiet_timeout` after producing at least one line.

use crate::core::communication::lines::Line;
use crate::core::session::session::ExchangeGuard;
use crate::core::session::Session;
use crate::domain::error::{ExecutorError, TransportError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, Instrument};

/// Timer resolution; the quiet timer fires this long after the deadline
const QUIET_TICK: Duration = Duration::from_millis(1);

/// Where an exchange currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePhase {
    Idle,
    Writing,
    AwaitingResponse,
    /// Resolved by a terminator line
    Terminated,
    /// Resolved by inactivity
    Draining,
}

/// Mutable state owned by one in-flight exchange
#[derive(Debug)]
pub struct ExchangeState {
    pub last_line_received_at: Option<Instant>,
    pub terminator_condition: Option<String>,
    phase: ExchangePhase,
    response: Vec<Line>,
}

impl ExchangeState {
    pub fn new(terminator: Option<&str>) -> Self {
        Self {
            last_line_received_at: None,
            terminator_condition: terminator.map(str::to_string),
            phase: ExchangePhase::Idle,
            response: Vec::new(),
        }
    }

    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    pub fn lines(&self) -> &[Line] {
        &self.response
    }

    fn transition(&mut self, next: ExchangePhase) {
        debug!("{:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    /// Append a line; true when it satisfies the terminator.
    pub fn record(&mut self, line: Line, now: Instant) -> bool {
        let terminal = self
            .terminator_condition
            .as_deref()
            .is_some_and(|terminator| line.matches_terminator(terminator));

        self.last_line_received_at = Some(now);
        self.response.push(line);
        terminal
    }

    /// When the inactivity check should fire next.
    ///
    /// `None` while a terminator is set or before the first line arrived.
    pub fn quiet_deadline(&self, quiet_timeout: Duration) -> Option<Instant> {
        if self.terminator_condition.is_some() {
            return None;
        }
        self.last_line_received_at.map(|last| last + quiet_timeout)
    }

    /// Whether the silence since the last line exceeds `quiet_timeout`.
    ///
    /// Strictly greater: at exactly `quiet_timeout` the device is still
    /// considered to be answering.
    pub fn quiet_elapsed(&self, now: Instant, quiet_timeout: Duration) -> bool {
        self.quiet_deadline(quiet_timeout)
            .is_some_and(|deadline| now > deadline)
    }

    /// Collected lines joined with `\n`
    pub fn into_response(self) -> String {
        self.response
            .into_iter()
            .map(Line::into_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs one command exchange against a [`Session`]
pub struct CommandExecutor<'a> {
    session: &'a Session,
}

impl<'a> CommandExecutor<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub async fn execute(&self, command: &str, terminator: Option<&str>) -> Result<String, ExecutorError> {
        let guard = self.session.begin_exchange()?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let span = tracing::debug_span!("exchange", id = %&id[..8], command = %command);

        let started = Instant::now();
        let result = self.run(&guard, command, terminator).instrument(span).await;
        self.session
            .record_exchange(result.as_ref().ok().map(|_| started.elapsed()));
        result
    }

    async fn run(
        &self,
        guard: &ExchangeGuard<'_>,
        command: &str,
        terminator: Option<&str>,
    ) -> Result<String, ExecutorError> {
        if !self.session.is_open() {
            return Err(TransportError::NotOpen.into());
        }

        let mut state = ExchangeState::new(terminator);
        let quiet_timeout = self.session.config().quiet_timeout();

        // Subscribe first so a fast reply cannot slip past us.
        let mut lines = self.session.subscribe_exchange(guard);

        state.transition(ExchangePhase::Writing);
        if let Err(e) = self.session.write_line(command).await {
            lines.unsubscribe();
            state.transition(ExchangePhase::Idle);
            return Err(ExecutorError::WriteFailed(e));
        }

        // Lines buffered during the drain are stamped as they are consumed
        // here, so the quiet clock never starts before the drain finished.
        state.transition(ExchangePhase::AwaitingResponse);
        let quiet = tokio::time::sleep(quiet_timeout);
        tokio::pin!(quiet);

        loop {
            let armed = state.quiet_deadline(quiet_timeout).is_some();

            tokio::select! {
                biased;

                next = lines.next() => {
                    let Some(line) = next else {
                        state.transition(ExchangePhase::Idle);
                        return Err(ExecutorError::StreamClosed);
                    };

                    let now = Instant::now();
                    if state.record(line, now) {
                        lines.unsubscribe();
                        state.transition(ExchangePhase::Terminated);
                        return Ok(state.into_response());
                    }
                    if let Some(deadline) = state.quiet_deadline(quiet_timeout) {
                        quiet.as_mut().reset(deadline + QUIET_TICK);
                    }
                }
                _ = &mut quiet, if armed => {
                    if state.quiet_elapsed(Instant::now(), quiet_timeout) {
                        lines.unsubscribe();
                        state.transition(ExchangePhase::Draining);
                        debug!("Quiet for {:?}, {} line(s) collected", quiet_timeout, state.lines().len());
                        return Ok(state.into_response());
                    }
                    if let Some(deadline) = state.quiet_deadline(quiet_timeout) {
                        quiet.as_mut().reset(deadline + QUIET_TICK);
                    }
                }
            }
        }
    }
}
