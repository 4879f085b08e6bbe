use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use cyberloop_client::{ChatStream, ClientError, LLMClient};
use cyberloop_common::chat::{Conversation, Message, MessageRole};
use cyberloop_common::client::{ChatRequest, ChatResponse, FinishReason, ToolChoice, Usage};
use cyberloop_common::tools::{Tool, ToolCall, ToolCallAccumulator, ToolResult};
use cyberloop_tools::ToolExecutor;

use crate::error::CoreError;
use crate::events::{CoreEvent, ToolCallUpdate};
use crate::fallback::FallbackStrategy;
use crate::metrics::TokenTotals;

/// Completion requests allowed per run unless overridden.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Returned when a run ends without any answer text.
pub const NO_RESPONSE: &str = "No response generated";

/// Result of [`Core::run_with_history`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Final answer, or the best text available when the iteration ceiling was hit.
    pub text: String,
    /// Full history including the seeded turns, the query, and every message the run appended.
    pub messages: Vec<Message>,
    /// Completion requests made, counting a fallback retry as part of its turn.
    pub iterations: u32,
    /// Finish reason of the last response.
    pub finish_reason: Option<FinishReason>,
    /// Whether the run stopped because it reached the iteration ceiling.
    pub hit_ceiling: bool,
}

#[derive(Default)]
struct Turn {
    content: String,
    reasoning: String,
    tool_calls: Vec<ToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

enum Reply {
    Stream(ChatStream),
    Complete(Box<ChatResponse>),
}

struct RunState {
    model: String,
    fallback_used: bool,
    totals: TokenTotals,
    started: Instant,
}

/// Drives a tool-calling conversation to a final answer.
///
/// Each turn sends the whole history plus the tool declarations, folds the reply, and either
/// stops on a final answer or runs the requested tools and goes again. Tool failures are handed
/// back to the model; only endpoint failures and cancellation end a run early.
pub struct Core<C: LLMClient> {
    client: C,
    executor: ToolExecutor,
    max_iterations: u32,
    streaming: bool,
    tool_choice: ToolChoice,
    system_prompt: Option<String>,
    fallback: Option<Box<dyn FallbackStrategy>>,
    cancellation: CancellationToken,
}

impl<C: LLMClient> Core<C> {
    #[must_use]
    pub fn new(client: C, executor: ToolExecutor) -> Self {
        Self {
            client,
            executor,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            streaming: true,
            tool_choice: ToolChoice::Auto,
            system_prompt: None,
            fallback: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Caps the number of completion requests per run. Zero is treated as one.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Switches between streamed (default) and whole-response turns.
    ///
    /// A client whose `supports_streaming` is false always gets whole-response turns.
    #[must_use]
    pub const fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    #[must_use]
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    /// Prepends a system message unless the seeded history already has one.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: impl FallbackStrategy + 'static) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Token that aborts in-flight runs when cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Replaces the cancellation token between runs.
    pub fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancellation = token;
    }

    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }

    #[must_use]
    pub const fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// Answers `query` in a fresh conversation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Client`] if the completion endpoint fails and
    /// [`CoreError::Cancelled`] if the cancellation token fires.
    pub async fn run<F>(&self, query: &str, on_progress: F) -> Result<String, CoreError>
    where
        F: FnMut(CoreEvent) + Send,
    {
        self.run_with_history(Vec::new(), query, on_progress)
            .await
            .map(|outcome| outcome.text)
    }

    /// Answers `query` after the prior turns in `history`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Client`] if the completion endpoint fails and
    /// [`CoreError::Cancelled`] if the cancellation token fires.
    pub async fn run_with_history<F>(
        &self,
        history: Vec<Message>,
        query: &str,
        mut on_progress: F,
    ) -> Result<RunOutcome, CoreError>
    where
        F: FnMut(CoreEvent) + Send,
    {
        let mut conversation = Conversation::with_history(history);
        if let Some(prompt) = &self.system_prompt
            && !conversation
                .messages()
                .iter()
                .any(|m| m.role == MessageRole::System)
        {
            let system = conversation.system_message(prompt.as_str());
            conversation.messages.insert(0, system);
        }
        let user = conversation.user_message(query);
        conversation.add_message(user)?;

        let tools = self.executor.definitions();
        let mut state = RunState {
            model: self.client.config().model.clone(),
            fallback_used: false,
            totals: TokenTotals::default(),
            started: Instant::now(),
        };
        let mut last_content = String::new();
        let mut finish_reason = None;

        for iteration in 1..=self.max_iterations {
            info!("Executing chat turn ({iteration}/{})", self.max_iterations);

            let turn = self
                .turn(&conversation, &tools, &mut state, &mut on_progress)
                .await?;
            finish_reason = turn.finish_reason;
            if !turn.content.is_empty() {
                last_content.clone_from(&turn.content);
            }

            let wants_tools =
                turn.finish_reason == Some(FinishReason::ToolCalls) && !turn.tool_calls.is_empty();
            let assistant = conversation
                .assistant_message(turn.content)
                .with_reasoning(turn.reasoning);

            if !wants_tools {
                if !turn.tool_calls.is_empty() {
                    warn!(
                        "Dropping {} tool call(s) sent with finish reason {finish_reason:?}",
                        turn.tool_calls.len()
                    );
                }
                let text = if assistant.content.is_empty() {
                    NO_RESPONSE.to_string()
                } else {
                    assistant.content.clone()
                };
                conversation.add_message(assistant)?;
                debug!(
                    "Run finished after {iteration} turn(s) ({:.2?})",
                    state.started.elapsed()
                );
                return Ok(RunOutcome {
                    text,
                    messages: conversation.messages,
                    iterations: iteration,
                    finish_reason,
                    hit_ceiling: false,
                });
            }

            debug!("Model requested {} tool call(s)", turn.tool_calls.len());
            conversation.add_message(assistant.with_tool_calls(turn.tool_calls.clone())?)?;
            for call in turn.tool_calls {
                self.run_tool(&mut conversation, call, &mut on_progress)
                    .await?;
            }
        }

        warn!(
            "Reached the iteration ceiling ({}) without a final answer",
            self.max_iterations
        );
        Ok(RunOutcome {
            text: if last_content.is_empty() {
                NO_RESPONSE.to_string()
            } else {
                last_content
            },
            messages: conversation.messages,
            iterations: self.max_iterations,
            finish_reason,
            hit_ceiling: true,
        })
    }

    /// One completion request, including a single fallback retry if one applies.
    async fn turn<F>(
        &self,
        conversation: &Conversation,
        tools: &Arc<[Tool]>,
        state: &mut RunState,
        on_progress: &mut F,
    ) -> Result<Turn, CoreError>
    where
        F: FnMut(CoreEvent) + Send,
    {
        let messages: Arc<[Message]> = Arc::from(conversation.messages());

        let reply = loop {
            let mut request = ChatRequest::from((self.client.config(), Arc::clone(&messages)))
                .with_model(state.model.as_str())
                .with_streaming(self.streams());
            if self.client.supports_tools() && !tools.is_empty() {
                request = request
                    .with_tools(Arc::clone(tools))
                    .with_tool_choice(self.tool_choice.clone());
            }
            debug!("Sending {} message(s) to {}", messages.len(), state.model);

            match self.cancellable(self.open(&request)).await? {
                Ok(reply) => break reply,
                Err(err) => {
                    let Some(to) = self.fallback_model(state, &err) else {
                        return Err(err.into());
                    };
                    warn!(
                        "Model {} failed ({}: {err}), falling back to {to}",
                        state.model,
                        err.kind()
                    );
                    let from = std::mem::replace(&mut state.model, to.clone());
                    on_progress(CoreEvent::ModelFallback { from, to });
                }
            }
        };

        let turn = match reply {
            Reply::Stream(stream) => self.read_stream(stream, state, on_progress).await?,
            Reply::Complete(response) => Self::read_response(*response, state, on_progress),
        };
        if let Some(usage) = &turn.usage {
            state.totals.add(usage);
        }
        Ok(turn)
    }

    /// Streaming is used only when both the driver and the client want it.
    fn streams(&self) -> bool {
        self.streaming && self.client.supports_streaming()
    }

    async fn open(&self, request: &ChatRequest) -> Result<Reply, ClientError> {
        if request.is_streaming() {
            self.client.chat_stream(request).await.map(Reply::Stream)
        } else {
            self.client
                .chat(request)
                .await
                .map(|response| Reply::Complete(Box::new(response)))
        }
    }

    fn fallback_model(&self, state: &mut RunState, error: &ClientError) -> Option<String> {
        if state.fallback_used {
            return None;
        }
        let to = self
            .fallback
            .as_ref()?
            .fallback_model(&state.model, error)?;
        state.fallback_used = true;
        Some(to)
    }

    async fn read_stream<F>(
        &self,
        mut stream: ChatStream,
        state: &RunState,
        on_progress: &mut F,
    ) -> Result<Turn, CoreError>
    where
        F: FnMut(CoreEvent) + Send,
    {
        let mut turn = Turn::default();
        let mut calls = ToolCallAccumulator::new();

        while let Some(chunk) = self.cancellable(stream.next()).await? {
            let chunk = chunk?;

            if let Some(text) = chunk.delta_reasoning_content.filter(|t| !t.is_empty()) {
                turn.reasoning.push_str(&text);
                on_progress(CoreEvent::Thinking(text));
            }
            if let Some(text) = chunk.delta_content.filter(|t| !t.is_empty()) {
                turn.content.push_str(&text);
                on_progress(CoreEvent::Content(text));
            }
            calls.extend(&chunk.delta_tool_calls);
            if chunk.finish_reason.is_some() {
                turn.finish_reason = chunk.finish_reason;
            }
            if let Some(usage) = chunk.usage {
                let snapshot = state
                    .totals
                    .snapshot(&usage, calls.len(), state.started.elapsed());
                on_progress(CoreEvent::Metrics(snapshot));
                turn.usage = Some(usage);
            }
        }

        turn.tool_calls = calls.finish();
        Ok(turn)
    }

    fn read_response<F>(response: ChatResponse, state: &RunState, on_progress: &mut F) -> Turn
    where
        F: FnMut(CoreEvent) + Send,
    {
        let message = response.message;
        let reasoning = message.reasoning.unwrap_or_default();
        if !reasoning.is_empty() {
            on_progress(CoreEvent::Thinking(reasoning.clone()));
        }
        if !message.content.is_empty() {
            on_progress(CoreEvent::Content(message.content.clone()));
        }

        let tool_calls: Vec<ToolCall> = message
            .tool_calls
            .into_iter()
            .map(|call| {
                if call.id.is_empty() {
                    ToolCall::new(call.function.name, call.function.arguments)
                } else {
                    call
                }
            })
            .collect();

        if let Some(usage) = &response.usage {
            let snapshot = state
                .totals
                .snapshot(usage, tool_calls.len(), state.started.elapsed());
            on_progress(CoreEvent::Metrics(snapshot));
        }

        Turn {
            content: message.content,
            reasoning,
            tool_calls,
            finish_reason: response.finish_reason,
            usage: response.usage,
        }
    }

    async fn run_tool<F>(
        &self,
        conversation: &mut Conversation,
        call: ToolCall,
        on_progress: &mut F,
    ) -> Result<(), CoreError>
    where
        F: FnMut(CoreEvent) + Send,
    {
        debug!(
            "Tool call {}: {}({})",
            call.id, call.function.name, call.function.arguments
        );
        let mut result = ToolResult::pending(call.id.as_str());
        on_progress(CoreEvent::ToolCall(ToolCallUpdate {
            call: call.clone(),
            result: result.clone(),
        }));

        let output = self
            .cancellable(self.executor.execute_tool_call(&call))
            .await?;
        result
            .resolve(output.status, output.content.as_str())
            .map_err(anyhow::Error::from)?;

        // A call whose name fragment never arrived still needs a named answer.
        let name = if call.function.name.is_empty() {
            "unknown".to_string()
        } else {
            call.function.name.clone()
        };
        let message = conversation.tool_message(output.content, call.id.clone(), name)?;
        conversation.add_message(message)?;

        on_progress(CoreEvent::ToolCall(ToolCallUpdate { call, result }));
        Ok(())
    }

    async fn cancellable<T>(&self, future: impl Future<Output = T>) -> Result<T, CoreError> {
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(CoreError::Cancelled),
            output = future => Ok(output),
        }
    }
}
