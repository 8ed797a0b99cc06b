//! Tool dispatch: validation, routing, and session checks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::agent::{self, DiffTracker, ListingOptions, RefManager};
use crate::client::Backend;
use crate::config::DEFAULT_DISCOVERY_TIMEOUT;
use crate::error::{Error, Result};
use crate::normalize::{normalize, ToolOutput, ToolResult};
use crate::session::SessionState;
use crate::tools::{
    Arguments, ParamType, ResponseShape, SessionOp, SnapshotScope, ToolAction, ToolMode,
    ToolRegistry, ToolSpec,
};

/// Refs and snapshot baselines shared by all invocations.
#[derive(Debug, Default)]
struct AgentState {
    refs: RefManager,
    control: DiffTracker,
    sdk: DiffTracker,
}

impl AgentState {
    fn tracker(&mut self, scope: SnapshotScope) -> &mut DiffTracker {
        match scope {
            SnapshotScope::Control => &mut self.control,
            SnapshotScope::Sdk => &mut self.sdk,
        }
    }
}

/// Routes tool invocations to the runner.
pub struct Dispatcher {
    registry: ToolRegistry,
    backend: Arc<dyn Backend>,
    session: SessionState,
    agent: Mutex<AgentState>,
    discovery_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher over `registry` and `backend`.
    pub fn new(registry: ToolRegistry, backend: Arc<dyn Backend>) -> Self {
        Self {
            registry,
            backend,
            session: SessionState::new(),
            agent: Mutex::new(AgentState::default()),
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }

    /// Override the timeout used by discovery tools.
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Registered tools.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// SDK session.
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Run one tool invocation. Always produces exactly one result.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> ToolResult {
        let started = Instant::now();
        let result = normalize(self.invoke(name, arguments).await);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result.error_kind() {
            None => tracing::info!(tool = name, elapsed_ms, "Tool succeeded"),
            Some(kind) if kind.is_local() => {
                tracing::info!(tool = name, kind = %kind, elapsed_ms, "Tool rejected")
            }
            Some(kind) => tracing::warn!(tool = name, kind = %kind, elapsed_ms, "Tool failed"),
        }
        result
    }

    async fn invoke(&self, name: &str, arguments: Value) -> Result<ToolOutput> {
        let spec = self
            .registry
            .get(name)
            .ok_or_else(|| Error::UnknownTool(name.to_owned()))?;
        let mut args = spec.validate(arguments)?;

        if spec.mode == ToolMode::LegacyExtension {
            tracing::warn!(
                tool = name,
                "Deprecated extension tool invoked; migrate to the sdk_* tools"
            );
        }
        tracing::debug!(tool = name, mode = %spec.mode, "Dispatching");

        match spec.action {
            ToolAction::Session(op) => self.session_op(op, &args).await,
            ToolAction::Forward(ref route) => {
                if spec.mode == ToolMode::Sdk {
                    self.session.require_connected().await?;
                }
                self.resolve_refs(&spec, &mut args).await?;

                let request = route.request(&args, self.discovery_timeout)?;
                let response = self.backend.request(request).await?;
                self.shape(&spec, &args, response.body).await
            }
        }
    }

    /// Replace `@eN` refs in element-id arguments with the ids they stand for.
    async fn resolve_refs(&self, spec: &ToolSpec, args: &mut Arguments) -> Result<()> {
        let element_params = spec
            .params
            .iter()
            .filter(|p| p.ty == ParamType::ElementId);
        let state = self.agent.lock().await;
        for param in element_params {
            if let Some(Value::String(given)) = args.get_mut(param.name) {
                let resolved = state.refs.resolve(given)?;
                *given = resolved;
            }
        }
        Ok(())
    }

    async fn shape(&self, spec: &ToolSpec, args: &Arguments, payload: Value) -> Result<ToolOutput> {
        match spec.response {
            ResponseShape::Passthrough => Ok(ToolOutput::new(payload)),
            ResponseShape::Snapshot {
                scope,
                style,
                title,
            } => {
                let options = ListingOptions::from_args(args);
                let selected = options.select(agent::snapshot_elements(&payload));
                let mut state = self.agent.lock().await;
                state.tracker(scope).update_and_diff(&selected);

                let agent_mode = args.get("agent_mode").and_then(Value::as_bool) == Some(true);
                let summary = agent_mode.then(|| {
                    let listing = options.trim(selected);
                    agent::format_snapshot(title, &listing, &options, &mut state.refs, style)
                });
                drop(state);

                let output = ToolOutput::new(payload);
                Ok(match summary {
                    Some(summary) => output.with_summary(summary),
                    None => output,
                })
            }
            ResponseShape::Element => {
                let mut payload = payload;
                let max_len = ListingOptions::from_args(args).max_content_length;
                agent::prepare_element(&mut payload, max_len);
                Ok(ToolOutput::new(payload))
            }
            ResponseShape::Diff(scope) => {
                let elements = agent::snapshot_elements(&payload);
                let mut state = self.agent.lock().await;
                match state.tracker(scope).update_and_diff(elements) {
                    Some(diff) => {
                        let summary = agent::format_diff(&diff, &state.refs);
                        Ok(ToolOutput::new(serde_json::to_value(&diff)?).with_summary(summary))
                    }
                    None => {
                        let hint = match scope {
                            SnapshotScope::Control => "ui_snapshot",
                            SnapshotScope::Sdk => "sdk_snapshot",
                        };
                        let message = format!(
                            "No previous snapshot to diff against; baseline recorded. \
                             Call {} again after the UI changes.",
                            spec.name
                        );
                        tracing::debug!(tool = %spec.name, hint, "Diff baseline recorded");
                        Ok(ToolOutput::new(json!({
                            "baseline": true,
                            "elements": elements.len(),
                            "message": message,
                        }))
                        .with_summary(format!("{message} ({hint} also records a baseline.)")))
                    }
                }
            }
        }
    }

    async fn session_op(&self, op: SessionOp, args: &Arguments) -> Result<ToolOutput> {
        match op {
            SessionOp::Connect => {
                let url = args.get("url").and_then(Value::as_str).unwrap_or_default();
                let outcome = self.session.connect(self.backend.as_ref(), url).await?;
                self.agent.lock().await.sdk = DiffTracker::new();

                Ok(ToolOutput::new(json!({
                    "connected": true,
                    "target_url": outcome.connection.target_url,
                    "connection_id": outcome.connection.connection_id,
                    "connected_at": outcome.connection.connected_at,
                    "runner": outcome.runner,
                })))
            }
            SessionOp::Disconnect => {
                let outcome = self.session.disconnect(self.backend.as_ref()).await;
                self.agent.lock().await.sdk = DiffTracker::new();

                let teardown = match outcome.teardown {
                    Ok(runner) => json!({"ok": true, "runner": runner}),
                    Err(ref e) => json!({
                        "ok": false,
                        "kind": e.kind(),
                        "message": e.to_string(),
                    }),
                };
                Ok(ToolOutput::new(json!({
                    "connected": false,
                    "previous_target_url": outcome.previous.map(|c| c.target_url),
                    "teardown": teardown,
                })))
            }
            SessionOp::Status => Ok(ToolOutput::new(serde_json::to_value(
                self.session.status().await,
            )?)),
        }
    }
}
