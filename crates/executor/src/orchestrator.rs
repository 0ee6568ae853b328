//! The execution pipeline.
//!
//! Every call runs the same sequence: resolve the adapter, validate the
//! tool, build the request, inject auth, wait for admission, then run
//! attempts under a timeout with retry and backoff until a terminal
//! outcome. [`Executor::execute_stream`] reports each step as an
//! [`ExecutionEvent`]; [`Executor::execute`] drains that same stream and
//! returns only the final result.

use crate::admission::{AdmissionError, AdmissionPermit};
use crate::policy::{resolve_retry_policy, resolve_timeout_ms, should_retry, AttemptOutcome};
use crate::queue::QueueTracker;
use crate::runtime::ExecutionRuntime;
use futures::stream::{BoxStream, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use toolrelay_core::{
    compute_backoff_ms, ActionType, AdapterError, AdapterStreamEvent, Attachment,
    CancellationToken, Clock, CredentialResolver, ErrorCode, ExecutionError, ExecutionEvent,
    ExecutionRequest, ExecutionResult, ExecutionStatus, ExecutionSuccess, RawResponse,
    RetryPolicy, RetryPolicyOverride, SystemClock, Tool,
};
use toolrelay_plugins::auth::{apply_auth_headers, resolve_auth_headers};
use toolrelay_plugins::{AdapterLookup, BuildInput, ToolAdapter};
use tracing::{debug, info, warn};

/// One call into the pipeline.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub tool: Tool,
    pub action: ActionType,
    pub payload: Option<Value>,
    pub attachments: Vec<Attachment>,
    /// Per-call timeout; a tool-level timeout still wins.
    pub timeout_ms: Option<u64>,
    /// Per-call retry override; tool-level fields still win.
    pub retry: Option<RetryPolicyOverride>,
    pub cancel: Option<CancellationToken>,
    /// Prefer the adapter's streaming mode when it has one.
    pub streaming: bool,
}

impl ExecuteRequest {
    pub fn new(tool: Tool, action: ActionType) -> Self {
        Self {
            tool,
            action,
            payload: None,
            attachments: Vec::new(),
            timeout_ms: None,
            retry: None,
            cancel: None,
            streaming: false,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicyOverride) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

type EventSink = mpsc::UnboundedSender<ExecutionEvent>;

enum Step {
    Event(Option<ExecutionEvent>),
    Settled(ExecutionResult),
}

fn emit(events: &EventSink, event: ExecutionEvent) {
    // The receiver only goes away when the caller stopped listening.
    let _ = events.send(event);
}

fn cancelled_error() -> ExecutionError {
    ExecutionError::new(ErrorCode::Cancelled, "Execution cancelled")
}

fn timeout_error(timeout_ms: u64) -> ExecutionError {
    ExecutionError::new(
        ErrorCode::Timeout,
        format!("Execution timed out after {}ms", timeout_ms),
    )
}

/// Map an adapter error onto the result taxonomy.
fn classify(error: AdapterError, cancel: &CancellationToken) -> ExecutionError {
    if cancel.is_cancelled() {
        return cancelled_error();
    }
    match error {
        AdapterError::Cancelled => cancelled_error(),
        AdapterError::Timeout => ExecutionError::new(ErrorCode::Timeout, error.to_string()),
        other => ExecutionError::new(ErrorCode::ExecutionError, other.to_string()),
    }
}

/// Holds admission for one call and keeps the queue counters in step.
struct AdmissionTicket {
    queue: QueueTracker,
    tool_id: String,
    running: bool,
    permits: Vec<AdmissionPermit>,
}

impl AdmissionTicket {
    fn queued(queue: QueueTracker, tool_id: &str) -> Self {
        queue.enqueue(tool_id);
        Self {
            queue,
            tool_id: tool_id.to_string(),
            running: false,
            permits: Vec::with_capacity(2),
        }
    }

    fn mark_running(&mut self) {
        self.running = true;
        self.queue.start(&self.tool_id);
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        // Counters move before the permits are released below.
        if self.running {
            self.queue.finish(&self.tool_id);
        } else {
            self.queue.abandon(&self.tool_id);
        }
    }
}

/// Everything an attempt needs, resolved once per call.
struct AttemptPlan<'a> {
    adapter: &'a Arc<dyn ToolAdapter>,
    request: &'a ExecutionRequest,
    policy: RetryPolicy,
    timeout_ms: u64,
    streaming: bool,
    cancel: &'a CancellationToken,
    events: &'a EventSink,
}

#[derive(Clone)]
pub struct Executor {
    adapters: Arc<dyn AdapterLookup>,
    credentials: Arc<dyn CredentialResolver>,
    runtime: Arc<ExecutionRuntime>,
    clock: Arc<dyn Clock>,
}

impl Executor {
    pub fn new(
        adapters: Arc<dyn AdapterLookup>,
        credentials: Arc<dyn CredentialResolver>,
        runtime: Arc<ExecutionRuntime>,
    ) -> Self {
        Self {
            adapters,
            credentials,
            runtime,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn runtime(&self) -> &Arc<ExecutionRuntime> {
        &self.runtime
    }

    /// Run the pipeline to completion. Never fails: every outcome is an
    /// [`ExecutionResult`].
    pub async fn execute(&self, request: ExecuteRequest) -> ExecutionResult {
        let started = self.clock.now_ms();
        let mut events = self.execute_stream(request);
        let mut settled = None;
        while let Some(event) = events.next().await {
            if let ExecutionEvent::Result { result } = event {
                settled = Some(result);
            }
        }
        settled.unwrap_or_else(|| {
            ExecutionResult::failure(
                None,
                ExecutionError::new(
                    ErrorCode::ExecutionError,
                    "Execution stream ended without a result",
                ),
                self.clock.now_ms().saturating_sub(started),
            )
        })
    }

    /// Run the pipeline, yielding status and adapter events as they happen.
    /// The last item is always [`ExecutionEvent::Result`].
    pub fn execute_stream(&self, request: ExecuteRequest) -> BoxStream<'static, ExecutionEvent> {
        let executor = self.clone();
        Box::pin(async_stream::stream! {
            let started = executor.clock.now_ms();
            let (sink, mut events) = mpsc::unbounded_channel();
            let pipeline = executor.run(request, sink);
            tokio::pin!(pipeline);

            let mut settled = None;
            loop {
                let step = tokio::select! {
                    biased;
                    event = events.recv() => Step::Event(event),
                    result = &mut pipeline, if settled.is_none() => Step::Settled(result),
                };
                match step {
                    Step::Event(Some(event)) => yield event,
                    Step::Event(None) => break,
                    Step::Settled(result) => settled = Some(result),
                }
            }

            let result = settled.unwrap_or_else(|| {
                ExecutionResult::failure(
                    None,
                    ExecutionError::new(ErrorCode::ExecutionError, "Execution pipeline stopped early"),
                    executor.clock.now_ms().saturating_sub(started),
                )
            });
            yield ExecutionEvent::Result { result };
        })
    }

    async fn run(&self, call: ExecuteRequest, events: EventSink) -> ExecutionResult {
        let started = self.clock.now_ms();
        let cancel = call.cancel.clone().unwrap_or_default();
        let tool = &call.tool;
        let settings = self.runtime.settings();

        emit(&events, ExecutionEvent::status(ExecutionStatus::Queued));
        info!("Executing {} on tool {} ({})", call.action.as_str(), tool.id, tool.tool_type);

        let Some(adapter) = self.adapters.adapter(&tool.tool_type) else {
            let error = ExecutionError::new(
                ErrorCode::AdapterNotFound,
                format!("No adapter registered for tool type '{}'", tool.tool_type),
            );
            return self.settle(started, None, error, &events);
        };
        let capabilities = adapter.capabilities();

        emit(&events, ExecutionEvent::status(ExecutionStatus::ValidatingConfig));
        let mut problems = adapter.validate_config(tool, call.action);
        if !capabilities.allows(call.action) {
            problems.push(format!(
                "Adapter '{}' does not support the {} action",
                tool.tool_type,
                call.action.as_str()
            ));
        }
        if !problems.is_empty() {
            let error = ExecutionError::new(ErrorCode::InvalidToolConfiguration, problems.join("; "))
                .with_details(json!({ "errors": problems }));
            return self.settle(started, None, error, &events);
        }

        emit(&events, ExecutionEvent::status(ExecutionStatus::BuildingRequest));
        let attachments: &[Attachment] = if capabilities.supports_file_attachments {
            &call.attachments
        } else {
            if !call.attachments.is_empty() {
                emit(
                    &events,
                    ExecutionEvent::status_with(
                        ExecutionStatus::BuildingRequest,
                        format!(
                            "Ignoring {} attachment(s): adapter does not accept files",
                            call.attachments.len()
                        ),
                    ),
                );
            }
            &[]
        };
        let payload = call.payload.as_ref().filter(|_| capabilities.supports_payload);
        let mut request = match adapter.build_request(BuildInput {
            tool,
            action: call.action,
            payload,
            attachments,
        }) {
            Ok(request) => request,
            Err(e) => {
                let error = ExecutionError::new(ErrorCode::ExecutionError, e.to_string());
                return self.settle(started, None, error, &events);
            }
        };

        match resolve_auth_headers(tool, self.credentials.as_ref()).await {
            Ok(headers) => apply_auth_headers(&mut request, headers),
            Err(e) => {
                let error = ExecutionError::new(ErrorCode::ExecutionError, e.to_string());
                return self.settle(started, None, error, &events);
            }
        }

        let policy = resolve_retry_policy(&settings.default_retry, tool, call.retry.as_ref());
        let timeout_ms = resolve_timeout_ms(settings.default_timeout_ms, tool, call.timeout_ms);

        emit(
            &events,
            ExecutionEvent::status_with(ExecutionStatus::Queued, "Waiting for an execution slot"),
        );
        let _ticket = match self.admit(tool, &cancel).await {
            Ok(ticket) => ticket,
            Err(e) => {
                let error = ExecutionError::new(ErrorCode::Cancelled, e.to_string());
                return self.settle(started, Some(request), error, &events);
            }
        };
        emit(&events, ExecutionEvent::status(ExecutionStatus::Running));

        let plan = AttemptPlan {
            adapter: &adapter,
            request: &request,
            policy,
            timeout_ms,
            streaming: call.streaming && capabilities.supports_streaming,
            cancel: &cancel,
            events: &events,
        };
        let outcome = self.run_attempts(&plan).await;
        match outcome {
            Ok(raw) => {
                emit(&events, ExecutionEvent::status(ExecutionStatus::NormalizingResponse));
                let response = adapter.normalize_response(raw);
                let success = ExecutionSuccess {
                    request_summary: request.summary(),
                    response_summary: response.summary(),
                    duration_ms: self.clock.now_ms().saturating_sub(started),
                    request,
                    response,
                };
                emit(&events, ExecutionEvent::status(ExecutionStatus::Completed));
                info!(
                    "Tool {} completed: {} in {}ms",
                    tool.id, success.response_summary, success.duration_ms
                );
                ExecutionResult::Success(success)
            }
            Err(error) => self.settle(started, Some(request), error, &events),
        }
    }

    async fn admit(
        &self,
        tool: &Tool,
        cancel: &CancellationToken,
    ) -> Result<AdmissionTicket, AdmissionError> {
        let mut ticket = AdmissionTicket::queued(self.runtime.queue().clone(), &tool.id);
        let global = self.runtime.global_admission().acquire(Some(cancel)).await?;
        ticket.permits.push(global);
        if let Some(limit) = tool.max_concurrent_runs() {
            let per_tool = self.runtime.tool_admission(&tool.id, limit);
            ticket.permits.push(per_tool.acquire(Some(cancel)).await?);
        }
        ticket.mark_running();
        Ok(ticket)
    }

    async fn run_attempts(&self, plan: &AttemptPlan<'_>) -> Result<RawResponse, ExecutionError> {
        let attempts = plan.policy.max_retries.saturating_add(1);
        for attempt in 0..attempts {
            emit(
                plan.events,
                ExecutionEvent::status_with(
                    ExecutionStatus::Executing,
                    format!("Attempt {}/{}", attempt + 1, attempts),
                ),
            );
            let outcome = self.run_attempt(plan).await;

            if should_retry(&plan.policy, attempt, &outcome) {
                let delay = compute_backoff_ms(&plan.policy, attempt);
                let reason = match &outcome {
                    AttemptOutcome::Response(raw) => format!("HTTP {}", raw.status),
                    AttemptOutcome::Failed(e) | AttemptOutcome::Rejected(e) => e.message.clone(),
                };
                warn!(
                    "Attempt {} for {} failed ({}), retrying in {}ms",
                    attempt + 1,
                    plan.request.summary(),
                    reason,
                    delay
                );
                emit(
                    plan.events,
                    ExecutionEvent::status_with(
                        ExecutionStatus::Executing,
                        format!("Retrying in {}ms", delay),
                    ),
                );
                tokio::select! {
                    _ = plan.cancel.cancelled() => return Err(cancelled_error()),
                    _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                }
                continue;
            }

            return match outcome {
                AttemptOutcome::Response(raw) => Ok(raw),
                AttemptOutcome::Failed(error) | AttemptOutcome::Rejected(error) => Err(error),
            };
        }

        Err(ExecutionError::new(
            ErrorCode::ExecutionError,
            "Retries exhausted without a terminal result",
        ))
    }

    /// One attempt, bounded by the attempt timeout and the caller's token.
    async fn run_attempt(&self, plan: &AttemptPlan<'_>) -> AttemptOutcome {
        let attempt_cancel = plan.cancel.child_token();
        let work = async {
            if plan.streaming {
                self.drive_stream(plan, &attempt_cancel).await
            } else {
                match plan.adapter.execute(plan.request, &attempt_cancel).await {
                    Ok(raw) => AttemptOutcome::Response(raw),
                    Err(e) => AttemptOutcome::Failed(classify(e, plan.cancel)),
                }
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = plan.cancel.cancelled() => AttemptOutcome::Failed(cancelled_error()),
            _ = tokio::time::sleep(Duration::from_millis(plan.timeout_ms)) => {
                AttemptOutcome::Failed(timeout_error(plan.timeout_ms))
            }
            outcome = work => outcome,
        };
        attempt_cancel.cancel();
        outcome
    }

    /// Forward intermediate adapter events and settle on the terminal one.
    async fn drive_stream(
        &self,
        plan: &AttemptPlan<'_>,
        attempt_cancel: &CancellationToken,
    ) -> AttemptOutcome {
        let mut stream = plan
            .adapter
            .execute_stream(plan.request.clone(), attempt_cancel.clone());
        while let Some(event) = stream.next().await {
            match event {
                AdapterStreamEvent::Completed { response } => {
                    return AttemptOutcome::Response(response);
                }
                AdapterStreamEvent::Failed { message } => {
                    if plan.cancel.is_cancelled() {
                        return AttemptOutcome::Failed(cancelled_error());
                    }
                    return AttemptOutcome::Rejected(ExecutionError::new(
                        ErrorCode::ExecutionError,
                        message,
                    ));
                }
                intermediate => emit(plan.events, ExecutionEvent::Adapter { event: intermediate }),
            }
        }
        AttemptOutcome::Failed(ExecutionError::new(
            ErrorCode::ExecutionError,
            "Adapter stream ended without a terminal event",
        ))
    }

    fn settle(
        &self,
        started: u64,
        request: Option<ExecutionRequest>,
        error: ExecutionError,
        events: &EventSink,
    ) -> ExecutionResult {
        let status = match error.code {
            ErrorCode::Cancelled | ErrorCode::Timeout => ExecutionStatus::Cancelled,
            _ => ExecutionStatus::Failed,
        };
        emit(events, ExecutionEvent::status_with(status, error.message.clone()));
        match error.code {
            ErrorCode::Cancelled => debug!("Execution cancelled: {}", error.message),
            _ => warn!("Execution failed [{}]: {}", error.code, error.message),
        }
        ExecutionResult::failure(request, error, self.clock.now_ms().saturating_sub(started))
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}
