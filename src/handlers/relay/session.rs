//! Per-call session state machine.
//!
//! A [`SessionController`] is owned by the connection task and is the only
//! place session state changes. Model events, tool outcomes and silence
//! expiries reach it as values through that task's `select!` loop.
//!
//! ```text
//! Uninitialized --setup ok--> Active --close--> Closed
//!       |                                         ^
//!       +-------------- close --------------------+
//! ```

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::assistant::{Assistant, AssistantResolver};
use crate::core::llm::{BoxedModelStream, CompletionRequest, ModelEvent, ModelStreamFactory, Role};
use crate::core::tools::{ToolContext, ToolExecutorFactory};

use super::messages::{
    DtmfFrame, InboundFrame, InterruptFrame, OutboundFrame, PromptFrame, RelayRoute, SetupFrame,
};
use super::processor::FrameHandler;
use super::silence::{SilenceConfig, SilenceEvent, SilenceMonitor};
use super::tool_bridge::{ToolDispatchBridge, ToolOutcome};

/// Buffered model events per session
pub const MODEL_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Buffered tool outcomes per session
pub const TOOL_OUTCOME_CHANNEL_CAPACITY: usize = 32;

/// Collaborators shared by every session of the process.
pub struct SessionServices {
    pub assistants: Arc<dyn AssistantResolver>,
    pub models: Arc<dyn ModelStreamFactory>,
    pub tools: Arc<dyn ToolExecutorFactory>,
    pub silence: SilenceConfig,
}

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "uninitialized"),
            SessionState::Active => write!(f, "active"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ConnectionClosed,
    TransportError,
    SetupFailed,
    SetupTimeout,
    SilenceTimeout,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ConnectionClosed => write!(f, "connection_closed"),
            CloseReason::TransportError => write!(f, "transport_error"),
            CloseReason::SetupFailed => write!(f, "setup_failed"),
            CloseReason::SetupTimeout => write!(f, "setup_timeout"),
            CloseReason::SilenceTimeout => write!(f, "silence_timeout"),
        }
    }
}

/// Last barge-in reported by the gateway. Recorded only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptMarker {
    pub utterance_until_interrupt: Option<String>,
    pub duration_until_interrupt_ms: Option<u64>,
    /// Interaction count when the interrupt arrived
    pub interaction: u64,
}

/// Receiving halves of the session's channels, polled by the connection task.
pub struct SessionReceivers {
    pub model_events: mpsc::Receiver<ModelEvent>,
    pub tool_outcomes: mpsc::Receiver<ToolOutcome>,
}

struct ActiveSession {
    assistant: Arc<Assistant>,
    tool_context: ToolContext,
    model: BoxedModelStream,
    tools: ToolDispatchBridge,
    silence: SilenceMonitor,
    last_interrupt: Option<InterruptMarker>,
}

enum Phase {
    Uninitialized,
    Active(Box<ActiveSession>),
    Closed,
}

pub struct SessionController {
    connection_id: Uuid,
    services: Arc<SessionServices>,
    outbound: mpsc::Sender<RelayRoute>,
    model_tx: mpsc::Sender<ModelEvent>,
    tool_tx: mpsc::Sender<ToolOutcome>,
    phase: Phase,
    call_sid: Option<String>,
    interaction_count: u64,
}

impl SessionController {
    /// Create a controller in `Uninitialized` writing frames to `outbound`.
    pub fn open(
        services: Arc<SessionServices>,
        outbound: mpsc::Sender<RelayRoute>,
    ) -> (Self, SessionReceivers) {
        let (model_tx, model_events) = mpsc::channel(MODEL_EVENT_CHANNEL_CAPACITY);
        let (tool_tx, tool_outcomes) = mpsc::channel(TOOL_OUTCOME_CHANNEL_CAPACITY);

        let controller = Self {
            connection_id: Uuid::new_v4(),
            services,
            outbound,
            model_tx,
            tool_tx,
            phase: Phase::Uninitialized,
            call_sid: None,
            interaction_count: 0,
        };

        (
            controller,
            SessionReceivers {
                model_events,
                tool_outcomes,
            },
        )
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Uninitialized => SessionState::Uninitialized,
            Phase::Active(_) => SessionState::Active,
            Phase::Closed => SessionState::Closed,
        }
    }

    pub fn call_sid(&self) -> Option<&str> {
        self.call_sid.as_deref()
    }

    /// Number of prompts handed to the model stream.
    pub fn interaction_count(&self) -> u64 {
        self.interaction_count
    }

    pub fn assistant(&self) -> Option<&Arc<Assistant>> {
        match &self.phase {
            Phase::Active(session) => Some(&session.assistant),
            _ => None,
        }
    }

    pub fn last_interrupt(&self) -> Option<&InterruptMarker> {
        match &self.phase {
            Phase::Active(session) => session.last_interrupt.as_ref(),
            _ => None,
        }
    }

    pub fn pending_tool_calls(&self) -> usize {
        match &self.phase {
            Phase::Active(session) => session.tools.pending_count(),
            _ => 0,
        }
    }

    pub fn silence_retry_count(&self) -> u32 {
        match &self.phase {
            Phase::Active(session) => session.silence.retry_count(),
            _ => 0,
        }
    }

    // =========================================================================
    // Setup
    // =========================================================================

    async fn setup(&mut self, setup: SetupFrame) -> bool {
        let call_sid = setup.call_sid;

        let Some(name) = setup
            .custom_parameters
            .assistant
            .as_deref()
            .filter(|name| !name.trim().is_empty())
        else {
            error!(
                connection_id = %self.connection_id,
                call_sid = %call_sid,
                "Setup frame does not name an assistant"
            );
            return false;
        };

        let Some(assistant) = self.services.assistants.get_assistant(name).await else {
            error!(
                connection_id = %self.connection_id,
                call_sid = %call_sid,
                assistant = %name,
                "Assistant not found"
            );
            return false;
        };

        let mut model =
            match self
                .services
                .models
                .create(&call_sid, &assistant, self.model_tx.clone())
            {
                Ok(model) => model,
                Err(e) => {
                    error!(
                        connection_id = %self.connection_id,
                        call_sid = %call_sid,
                        assistant = %assistant.name,
                        error = %e,
                        "Failed to create model stream"
                    );
                    return false;
                }
            };

        let executor = self.services.tools.create(&assistant);
        let tools = ToolDispatchBridge::new(executor, self.tool_tx.clone());

        info!(
            connection_id = %self.connection_id,
            call_sid = %call_sid,
            from = setup.from.as_deref().unwrap_or("unknown"),
            to = setup.to.as_deref().unwrap_or("unknown"),
            assistant = %assistant.name,
            "Call setup"
        );

        if let Some(from) = &setup.from {
            model.add_context(&format!("The caller's phone number is {from}"), Role::System);
        }
        model.add_context(&format!("The call SID is {call_sid}"), Role::System);
        // Spoken by the assistant, so it enters history as its own turn
        model.add_context(&assistant.initial_message, Role::Assistant);

        let tool_context = ToolContext {
            call_sid: call_sid.clone(),
            from: setup.from,
            assistant_name: assistant.name.clone(),
        };
        let greeting = OutboundFrame::text(assistant.initial_message.clone(), true);

        let mut silence = SilenceMonitor::new(self.services.silence.clone());
        silence.start_monitoring();

        self.call_sid = Some(call_sid);
        self.phase = Phase::Active(Box::new(ActiveSession {
            assistant,
            tool_context,
            model,
            tools,
            silence,
            last_interrupt: None,
        }));

        self.send(greeting).await;
        true
    }

    // =========================================================================
    // Model & Tool Events
    // =========================================================================

    /// Forward a model stream event to the gateway or the tool bridge.
    pub async fn handle_model_event(&mut self, event: ModelEvent) {
        let Phase::Active(session) = &mut self.phase else {
            debug!(connection_id = %self.connection_id, "Model event for inactive session dropped");
            return;
        };

        match event {
            ModelEvent::Token { text, .. } => {
                self.send(OutboundFrame::text(text, false)).await;
            }
            ModelEvent::Complete { interaction } => {
                debug!(call_sid = ?self.call_sid, interaction, "Model turn complete");
                self.send(OutboundFrame::end_of_turn()).await;
            }
            ModelEvent::ToolRequest(call) => {
                session.tools.dispatch(&session.tool_context, call);
            }
            ModelEvent::Failed {
                message,
                interaction,
            } => {
                error!(
                    call_sid = ?self.call_sid,
                    interaction,
                    error = %message,
                    "Model stream request failed"
                );
            }
        }
    }

    /// Feed a finished tool execution back to the model.
    pub fn handle_tool_outcome(&mut self, outcome: ToolOutcome) {
        let Phase::Active(session) = &mut self.phase else {
            debug!(
                connection_id = %self.connection_id,
                tool_call_id = %outcome.tool_call_id,
                "Tool outcome for inactive session dropped"
            );
            return;
        };

        // Tool turns belong to the most recent prompt
        let interaction = self.interaction_count.saturating_sub(1);
        session
            .tools
            .on_result(outcome, interaction, session.model.as_mut());
    }

    // =========================================================================
    // Silence
    // =========================================================================

    /// Next silence expiry. Pending forever unless the session is active.
    pub async fn next_silence_event(&mut self) -> SilenceEvent {
        match &mut self.phase {
            Phase::Active(session) => session.silence.next_event().await,
            _ => std::future::pending().await,
        }
    }

    /// Speak a reminder, or end the call when reminders are exhausted.
    ///
    /// Returns false when the connection must be torn down.
    pub async fn handle_silence_event(&mut self, event: SilenceEvent) -> bool {
        match event {
            SilenceEvent::Reminder { attempt, frame } => {
                debug!(call_sid = ?self.call_sid, attempt, "Sending silence reminder");
                self.send(frame).await;
                true
            }
            SilenceEvent::Exhausted { retries } => {
                warn!(
                    call_sid = ?self.call_sid,
                    retries,
                    "Ending call after caller silence"
                );
                self.send(OutboundFrame::silence_timeout(retries)).await;
                let _ = self.outbound.send(RelayRoute::Close).await;
                self.close(CloseReason::SilenceTimeout);
                false
            }
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Release the timer, pending tool calls and the model stream. Idempotent.
    pub fn close(&mut self, reason: CloseReason) {
        match std::mem::replace(&mut self.phase, Phase::Closed) {
            Phase::Closed => {}
            Phase::Uninitialized => {
                info!(
                    connection_id = %self.connection_id,
                    reason = %reason,
                    "Session closed before setup"
                );
            }
            Phase::Active(mut session) => {
                session.silence.cleanup();
                session.tools.cleanup();
                session.model.destroy();
                info!(
                    connection_id = %self.connection_id,
                    call_sid = ?self.call_sid,
                    reason = %reason,
                    interactions = self.interaction_count,
                    "Session closed"
                );
            }
        }
    }

    async fn send(&self, frame: OutboundFrame) {
        if self.outbound.send(RelayRoute::Outgoing(frame)).await.is_err() {
            debug!(connection_id = %self.connection_id, "Writer gone, dropping frame");
        }
    }
}

impl ActiveSession {
    fn prompt(&mut self, prompt: PromptFrame, interaction_count: &mut u64) {
        debug!(
            call_sid = %self.tool_context.call_sid,
            interaction = *interaction_count,
            lang = prompt.lang.as_deref().unwrap_or(""),
            prompt = %prompt.voice_prompt,
            "Caller prompt"
        );

        match self.model.completion(CompletionRequest::user(
            prompt.voice_prompt,
            *interaction_count,
        )) {
            Ok(()) => *interaction_count += 1,
            Err(e) => error!(
                call_sid = %self.tool_context.call_sid,
                error = %e,
                "Failed to hand prompt to model stream"
            ),
        }
    }

    fn interrupt(&mut self, interrupt: InterruptFrame, interaction: u64) {
        info!(
            call_sid = %self.tool_context.call_sid,
            utterance = interrupt.utterance_until_interrupt.as_deref().unwrap_or(""),
            duration_ms = interrupt.duration_until_interrupt_ms,
            "Caller interrupted"
        );
        self.last_interrupt = Some(InterruptMarker {
            utterance_until_interrupt: interrupt.utterance_until_interrupt,
            duration_until_interrupt_ms: interrupt.duration_until_interrupt_ms,
            interaction,
        });
    }

    fn dtmf(&self, dtmf: DtmfFrame) {
        info!(call_sid = %self.tool_context.call_sid, digit = %dtmf.digit, "DTMF received");
    }
}

#[async_trait]
impl FrameHandler for SessionController {
    async fn handle_frame(&mut self, frame: InboundFrame) -> bool {
        if matches!(self.phase, Phase::Uninitialized) {
            return match frame {
                InboundFrame::Setup(setup) => self.setup(setup).await,
                other => {
                    warn!(
                        connection_id = %self.connection_id,
                        frame_type = %other.frame_type(),
                        "Session not ready, dropping frame"
                    );
                    true
                }
            };
        }

        let Phase::Active(session) = &mut self.phase else {
            warn!(
                connection_id = %self.connection_id,
                frame_type = %frame.frame_type(),
                "Frame received after session closed"
            );
            return true;
        };

        session.silence.reset_timer(frame.frame_type());

        match frame {
            InboundFrame::Setup(_) => {
                warn!(call_sid = ?self.call_sid, "Duplicate setup frame ignored");
            }
            InboundFrame::Prompt(prompt) => session.prompt(prompt, &mut self.interaction_count),
            InboundFrame::Info(fields) => {
                debug!(call_sid = ?self.call_sid, info = ?fields, "Gateway info");
            }
            InboundFrame::Interrupt(interrupt) => {
                session.interrupt(interrupt, self.interaction_count)
            }
            InboundFrame::Dtmf(dtmf) => session.dtmf(dtmf),
            InboundFrame::Unknown { frame_type } => {
                warn!(call_sid = ?self.call_sid, frame_type = %frame_type, "Unknown frame type");
            }
        }

        true
    }

    fn handle_rejected_frame(&mut self, frame_type: &str) {
        if let Phase::Active(session) = &mut self.phase {
            session.silence.reset_timer(frame_type);
        }
    }
}
