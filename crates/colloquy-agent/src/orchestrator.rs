use crate::config::ChatConfig;
use crate::context::ContextWindow;
use crate::gateway::CompletionGateway;
use colloquy_core::{
    Attachment, ColloquyError, ColloquyResult, CompletionError, SessionId, Transcript, Turn,
};
use colloquy_session::{SessionStore, TranscriptHandle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where a request cycle currently is.
///
/// `Failed` is only reachable from `Invoking`; validation and append errors
/// return immediately without entering a terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// Checking the session id and message.
    Validating,
    /// Recording the user turn.
    AppendingUser,
    /// Waiting on the completion gateway.
    Invoking,
    /// Recording the assistant reply.
    AppendingReply,
    /// Reply recorded.
    Done,
    /// Completion failed; the user turn stays pending.
    Failed,
}

struct Cycle<'a> {
    session_id: &'a str,
    phase: CyclePhase,
}

impl<'a> Cycle<'a> {
    fn start(session_id: &'a str) -> Self {
        debug!(session_id, phase = ?CyclePhase::Validating, "Cycle started");
        Self {
            session_id,
            phase: CyclePhase::Validating,
        }
    }

    fn advance(&mut self, next: CyclePhase) {
        debug!(session_id = self.session_id, from = ?self.phase, to = ?next, "Cycle phase");
        self.phase = next;
    }
}

/// The Response Orchestrator: runs one request cycle per inbound message.
/// Validate → append user turn → complete with full history → append reply.
///
/// The whole cycle runs under the session's exclusion slot, so cycles on
/// the same session are totally ordered and never observe each other's
/// half-finished state. Cycles on different sessions run in parallel.
pub struct ResponseOrchestrator {
    store: Arc<SessionStore>,
    gateway: Arc<dyn CompletionGateway>,
    system_prompt: String,
    context: ContextWindow,
    request_timeout: Duration,
}

impl ResponseOrchestrator {
    /// Builds an orchestrator over `store`. A zero timeout is raised to one
    /// second; call [`ChatConfig::validate`] to reject it instead.
    pub fn new(
        store: Arc<SessionStore>,
        gateway: Arc<dyn CompletionGateway>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            system_prompt: config.system_prompt.clone(),
            context: ContextWindow::new(config.max_context_turns),
            request_timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
        }
    }

    /// Overrides the completion deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The store backing this orchestrator.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Point-in-time copy of a session's transcript.
    pub async fn read_transcript(&self, session_id: &str) -> ColloquyResult<Transcript> {
        self.store.read_transcript(session_id).await
    }

    /// Turns one inbound message into one assistant turn.
    ///
    /// On `CompletionFailed` the user turn stays recorded. Resubmitting the
    /// same text and attachments while that turn is still unanswered does
    /// not append it again; completion is re-attempted against the existing
    /// transcript. Different text is a new message. [`retry_pending`]
    /// re-attempts without resending anything.
    ///
    /// [`retry_pending`]: ResponseOrchestrator::retry_pending
    pub async fn handle_message(
        &self,
        session_id: &str,
        user_text: &str,
        attachments: Vec<Attachment>,
    ) -> ColloquyResult<Turn> {
        let mut cycle = Cycle::start(session_id);

        SessionId::parse(session_id)?;
        if user_text.trim().is_empty() && attachments.is_empty() {
            return Err(ColloquyError::EmptyMessage);
        }

        let handle = self.store.get_or_create(session_id).await?;
        let _slot = handle.acquire_slot().await?;

        cycle.advance(CyclePhase::AppendingUser);
        let transcript = handle.snapshot().await;
        if is_resubmission(&transcript, user_text, &attachments) {
            info!(session_id, "Resubmitted pending message; not appending it again");
        } else {
            let user_turn = Turn::user(user_text, attachments);
            self.store.append_to(&handle, user_turn).await?;
        }

        info!(session_id, "Routing message to completion gateway");
        self.complete_and_record(&handle, &mut cycle).await
    }

    /// Re-attempts completion for a session whose last turn is an
    /// unanswered user turn, without appending anything new first.
    pub async fn retry_pending(&self, session_id: &str) -> ColloquyResult<Turn> {
        let mut cycle = Cycle::start(session_id);

        let Some(handle) = self.store.get(session_id).await? else {
            return Err(ColloquyError::NothingToRetry(session_id.to_string()));
        };
        let _slot = handle.acquire_slot().await?;

        if !handle.snapshot().await.has_pending_user_turn() {
            return Err(ColloquyError::NothingToRetry(session_id.to_string()));
        }

        info!(session_id, "Retrying pending message");
        self.complete_and_record(&handle, &mut cycle).await
    }

    /// Invokes the gateway with the current transcript and appends the
    /// reply. The caller must hold the session's slot.
    async fn complete_and_record(
        &self,
        handle: &TranscriptHandle,
        cycle: &mut Cycle<'_>,
    ) -> ColloquyResult<Turn> {
        cycle.advance(CyclePhase::Invoking);
        let transcript = handle.snapshot().await;
        let window = self.context.select(transcript.turns());
        debug!(
            session_id = cycle.session_id,
            turns = transcript.len(),
            sent = window.len(),
            est_tokens = ContextWindow::estimated_tokens(&self.system_prompt, window),
            "Invoking completion"
        );

        let reply = match tokio::time::timeout(
            self.request_timeout,
            self.gateway.complete(&self.system_prompt, window),
        )
        .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(self.fail(cycle, e)),
            Err(_) => {
                let e = CompletionError::timeout(format!(
                    "no reply within {}s",
                    self.request_timeout.as_secs_f64()
                ));
                return Err(self.fail(cycle, e));
            }
        };

        cycle.advance(CyclePhase::AppendingReply);
        let assistant_turn = Turn::assistant(reply);
        self.store.append_to(handle, assistant_turn.clone()).await?;

        cycle.advance(CyclePhase::Done);
        info!(session_id = cycle.session_id, "Cycle completed");
        Ok(assistant_turn)
    }

    fn fail(&self, cycle: &mut Cycle<'_>, cause: CompletionError) -> ColloquyError {
        cycle.advance(CyclePhase::Failed);
        warn!(
            session_id = cycle.session_id,
            error = %cause,
            retryable = cause.is_retryable(),
            "Completion failed; user turn kept"
        );
        ColloquyError::CompletionFailed(cause)
    }
}

/// Whether `user_text` repeats the transcript's unanswered last user turn.
fn is_resubmission(transcript: &Transcript, user_text: &str, attachments: &[Attachment]) -> bool {
    transcript.has_pending_user_turn()
        && transcript
            .last()
            .is_some_and(|last| last.content() == user_text && last.attachments() == attachments)
}
