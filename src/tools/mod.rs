//! Tool definitions and registry for the MCP server.
//!
//! Every tool is plain data: a [`ToolSpec`] naming its mode, parameters, and
//! what the dispatcher does with it. Nothing here talks to the runner; the
//! specs only know how to validate arguments and how to turn validated
//! arguments into a [`BackendRequest`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use url::Url;

use crate::agent::ListingStyle;
use crate::client::{BackendRequest, HttpMethod};
use crate::error::{Error, Result};
use crate::protocol::ToolDefinition;

pub mod control;
pub mod legacy;
pub mod sdk;

/// Validated tool arguments.
pub type Arguments = Map<String, Value>;

/// Which family a tool belongs to. Decides routing and session checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolMode {
    /// Runner reachability.
    Health,
    /// The runner's own webview (`/ui-bridge/control/*`).
    Control,
    /// An SDK-integrated app the runner is connected to (`/ui-bridge/sdk/*`).
    Sdk,
    /// Deprecated browser-extension bridge (`/extension/*`).
    LegacyExtension,
}

impl ToolMode {
    /// Name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolMode::Health => "health",
            ToolMode::Control => "control",
            ToolMode::Sdk => "sdk",
            ToolMode::LegacyExtension => "legacy-extension",
        }
    }
}

impl fmt::Display for ToolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// Any string.
    String,
    /// Non-empty element id, or an `@eN` ref from an agent-mode snapshot.
    ElementId,
    /// Whole number.
    Integer,
    /// Any number.
    Number,
    /// `true` / `false`.
    Boolean,
    /// Array of strings.
    StringArray,
    /// JSON object, passed on unchanged.
    Object,
}

impl ParamType {
    fn schema(&self) -> Value {
        match self {
            ParamType::String | ParamType::ElementId => json!({"type": "string"}),
            ParamType::Integer => json!({"type": "integer"}),
            ParamType::Number => json!({"type": "number"}),
            ParamType::Boolean => json!({"type": "boolean"}),
            ParamType::StringArray => json!({"type": "array", "items": {"type": "string"}}),
            ParamType::Object => json!({"type": "object"}),
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::ElementId => value.as_str().is_some_and(|s| !s.trim().is_empty()),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            ParamType::Object => value.is_object(),
        }
    }

    fn expected(&self) -> &'static str {
        match self {
            ParamType::String => "a string",
            ParamType::ElementId => "a non-empty element id",
            ParamType::Integer => "an integer",
            ParamType::Number => "a number",
            ParamType::Boolean => "a boolean",
            ParamType::StringArray => "an array of strings",
            ParamType::Object => "an object",
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Argument name.
    pub name: &'static str,
    /// Declared type.
    pub ty: ParamType,
    /// Whether the argument must be present.
    pub required: bool,
    /// Human-readable description.
    pub description: &'static str,
    /// Allowed values, for string enums and arrays of them.
    pub one_of: &'static [&'static str],
    /// Value used when the argument is absent.
    pub default: Option<Value>,
}

impl ParamSpec {
    /// A required parameter.
    pub fn required(name: &'static str, ty: ParamType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: true,
            description,
            one_of: &[],
            default: None,
        }
    }

    /// An optional parameter.
    pub fn optional(name: &'static str, ty: ParamType, description: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(name, ty, description)
        }
    }

    /// The `element_id` parameter shared by element tools.
    pub fn element_id() -> Self {
        Self::required(
            "element_id",
            ParamType::ElementId,
            "Element id (data-ui-id) or an @eN ref from an agent-mode snapshot",
        )
    }

    /// Optional `element_id`, for tools that work on one element or on the whole page.
    pub fn optional_element_id() -> Self {
        Self {
            required: false,
            ..Self::element_id()
        }
    }

    /// Restrict a string (or each string of an array) to a fixed set of values.
    pub fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.one_of = values;
        self
    }

    /// Value used when the argument is absent.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    fn schema(&self) -> Value {
        let mut schema = self.ty.schema();
        schema["description"] = Value::from(self.description);
        if !self.one_of.is_empty() {
            match self.ty {
                ParamType::StringArray => schema["items"]["enum"] = json!(self.one_of),
                _ => schema["enum"] = json!(self.one_of),
            }
        }
        if let Some(ref default) = self.default {
            schema["default"] = default.clone();
        }
        schema
    }
}

/// Session operations handled locally by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOp {
    /// Attach to an SDK app.
    Connect,
    /// Detach from the SDK app.
    Disconnect,
    /// Report the session.
    Status,
}

/// Where an argument goes in the outgoing request.
///
/// `wire` is a dotted path into the JSON body (`params.target.elementId`) for
/// POST requests, or a query parameter name for GET requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Argument name.
    pub arg: &'static str,
    /// Location on the wire.
    pub wire: &'static str,
}

/// Shorthand for a [`Field`].
pub const fn field(arg: &'static str, wire: &'static str) -> Field {
    Field { arg, wire }
}

/// How long a forwarded call may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTimeout {
    /// The client default.
    Default,
    /// The discovery timeout.
    Discovery,
    /// Seconds taken from an argument, plus slack for the runner's own work.
    ArgumentSeconds {
        /// Argument holding the seconds.
        arg: &'static str,
        /// Added on top.
        slack: Duration,
    },
}

/// A runner endpoint and how to fill it from arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// HTTP method.
    pub method: HttpMethod,
    /// Path template; `{name}` segments are replaced by arguments.
    pub path: String,
    /// Constant values written before the fields.
    pub fixed: Vec<(&'static str, Value)>,
    /// Arguments copied into the request when present.
    pub fields: Vec<Field>,
    /// Timeout policy.
    pub timeout: RequestTimeout,
    /// Route used instead when an optional path parameter is absent.
    pub fallback: Option<Box<Route>>,
}

impl Route {
    /// GET route.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            fixed: Vec::new(),
            fields: Vec::new(),
            timeout: RequestTimeout::Default,
            fallback: None,
        }
    }

    /// POST route.
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            ..Self::get(path)
        }
    }

    /// Add a constant value.
    pub fn fixed(mut self, wire: &'static str, value: impl Into<Value>) -> Self {
        self.fixed.push((wire, value.into()));
        self
    }

    /// Add argument mappings.
    pub fn fields(mut self, fields: &[Field]) -> Self {
        self.fields.extend_from_slice(fields);
        self
    }

    /// Set the timeout policy.
    pub fn timeout(mut self, timeout: RequestTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use `route` when a path parameter of this one is missing.
    pub fn or_else(mut self, route: Route) -> Self {
        self.fallback = Some(Box::new(route));
        self
    }

    fn path_params(&self) -> impl Iterator<Item = &str> {
        self.path
            .split('/')
            .filter_map(|s| s.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
    }

    /// Build the request for validated `args`.
    pub fn request(&self, args: &Arguments, discovery_timeout: Duration) -> Result<BackendRequest> {
        if let Some(ref fallback) = self.fallback {
            if self.path_params().any(|p| !args.contains_key(p)) {
                return fallback.request(args, discovery_timeout);
            }
        }

        let mut url = Url::parse("http://runner.invalid/")
            .map_err(|e| Error::Internal(format!("path builder: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::Internal("path builder cannot hold segments".into()))?;
            segments.clear();
            for segment in self.path.trim_start_matches('/').split('/') {
                match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Some(param) => {
                        let value = args.get(param).and_then(Value::as_str).ok_or_else(|| {
                            Error::InvalidArguments(format!("missing path parameter: {param}"))
                        })?;
                        segments.push(value);
                    }
                    None => {
                        segments.push(segment);
                    }
                }
            }
        }

        let mut request = match self.method {
            HttpMethod::Get => {
                {
                    let mut query = url.query_pairs_mut();
                    for (wire, value) in &self.fixed {
                        query.append_pair(wire, &query_value(value));
                    }
                    for f in &self.fields {
                        if let Some(value) = args.get(f.arg) {
                            query.append_pair(f.wire, &query_value(value));
                        }
                    }
                }
                if url.query() == Some("") {
                    url.set_query(None);
                }
                BackendRequest::get(&url[url::Position::BeforePath..])
            }
            HttpMethod::Post => {
                let mut body = Value::Object(Map::new());
                for (wire, value) in &self.fixed {
                    insert_at(&mut body, wire, value.clone());
                }
                for f in &self.fields {
                    if let Some(value) = args.get(f.arg) {
                        insert_at(&mut body, f.wire, value.clone());
                    }
                }
                BackendRequest::post(&url[url::Position::BeforePath..], body)
            }
        };

        match self.timeout {
            RequestTimeout::Default => {}
            RequestTimeout::Discovery => request = request.with_timeout(discovery_timeout),
            RequestTimeout::ArgumentSeconds { arg, slack } => {
                if let Some(secs) = args.get(arg).and_then(Value::as_u64) {
                    let timeout = Duration::from_secs(secs)
                        .checked_add(slack)
                        .ok_or_else(|| Error::InvalidArguments(format!("{arg} is too large")))?;
                    request = request.with_timeout(timeout);
                }
            }
        }

        Ok(request)
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(query_value)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

/// Write `value` at a dotted path, creating intermediate objects.
fn insert_at(target: &mut Value, path: &str, value: Value) {
    let mut current = target;
    let mut keys = path.split('.').peekable();
    while let Some(key) = keys.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if keys.peek().is_none() {
            map.insert(key.to_owned(), value);
            return;
        }
        current = map
            .entry(key.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Which snapshot history a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotScope {
    /// Control-mode snapshots.
    Control,
    /// SDK-mode snapshots.
    Sdk,
}

/// What the dispatcher does with a successful runner payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    /// Return it as-is.
    Passthrough,
    /// Return it as-is, remember the filtered elements as the diff
    /// baseline, and render a compact listing when `agent_mode` is set.
    Snapshot {
        /// History the snapshot belongs to.
        scope: SnapshotScope,
        /// Layout of the compact listing.
        style: ListingStyle,
        /// Heading of the compact listing.
        title: &'static str,
    },
    /// A single element: mark page text and apply `max_content_length`.
    Element,
    /// Diff against the previous snapshot of the scope.
    Diff(SnapshotScope),
}

/// What invoking a tool does.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolAction {
    /// Forward to the runner.
    Forward(Route),
    /// Operate on the SDK session.
    Session(SessionOp),
}

/// An immutable tool definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    /// Unique tool name.
    pub name: String,
    /// Description shown to the agent.
    pub description: String,
    /// Tool family.
    pub mode: ToolMode,
    /// Declared parameters.
    pub params: Vec<ParamSpec>,
    /// What invoking the tool does.
    pub action: ToolAction,
    /// How a successful payload is presented.
    pub response: ResponseShape,
}

impl ToolSpec {
    /// A tool forwarded to `route` with a pass-through response.
    pub fn forward(
        name: impl Into<String>,
        mode: ToolMode,
        description: impl Into<String>,
        route: Route,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            mode,
            params: Vec::new(),
            action: ToolAction::Forward(route),
            response: ResponseShape::Passthrough,
        }
    }

    /// A session tool.
    pub fn session(name: impl Into<String>, description: impl Into<String>, op: SessionOp) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            mode: ToolMode::Sdk,
            params: Vec::new(),
            action: ToolAction::Session(op),
            response: ResponseShape::Passthrough,
        }
    }

    /// Add a parameter.
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Set the response shape.
    pub fn shape(mut self, response: ResponseShape) -> Self {
        self.response = response;
        self
    }

    /// MCP listing entry.
    pub fn definition(&self) -> ToolDefinition {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.to_owned(), p.schema()))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }

    /// Check `arguments` against the declared parameters.
    ///
    /// `null` counts as no arguments. Undeclared keys are dropped, an
    /// explicit `null` counts as absent, and defaults fill in absent
    /// optional parameters.
    pub fn validate(&self, arguments: Value) -> Result<Arguments> {
        let mut given = match arguments {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(Error::InvalidArguments(format!(
                    "arguments must be an object, got {}",
                    json_type(&other)
                )))
            }
        };

        let mut validated = Map::new();
        for param in &self.params {
            match given.remove(param.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    if !param.ty.accepts(&value) {
                        return Err(Error::InvalidArguments(format!(
                            "{} must be {}, got {}",
                            param.name,
                            param.ty.expected(),
                            json_type(&value)
                        )));
                    }
                    if !param.one_of.is_empty() {
                        let allowed_str = |v: &Value| v.as_str().is_some_and(|s| param.one_of.contains(&s));
                        let allowed = match value {
                            Value::Array(ref items) => items.iter().all(allowed_str),
                            ref other => allowed_str(other),
                        };
                        if !allowed {
                            return Err(Error::InvalidArguments(format!(
                                "{} must be one of {}",
                                param.name,
                                param.one_of.join(", ")
                            )));
                        }
                    }
                    validated.insert(param.name.to_owned(), value);
                }
                None if param.required => {
                    return Err(Error::InvalidArguments(format!(
                        "missing required parameter: {}",
                        param.name
                    )));
                }
                None => {
                    if let Some(ref default) = param.default {
                        validated.insert(param.name.to_owned(), default.clone());
                    }
                }
            }
        }

        if !given.is_empty() {
            let ignored: Vec<&str> = given.keys().map(String::as_str).collect();
            tracing::debug!(tool = %self.name, ignored = ?ignored, "Ignoring undeclared arguments");
        }

        Ok(validated)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Element action tools shared by control and SDK mode.
///
/// Each becomes `POST {base}/element/{element_id}/action` with
/// `{"action": <wire action>, "params": {...}}`.
pub(crate) fn element_actions(mode: ToolMode, prefix: &str, base: &str) -> Vec<ToolSpec> {
    let path = format!("{base}/element/{{element_id}}/action");
    let action = |suffix: &str, wire: &'static str, description: &str| {
        ToolSpec::forward(
            format!("{prefix}_{suffix}"),
            mode,
            description,
            Route::post(path.clone()).fixed("action", wire),
        )
        .param(ParamSpec::element_id())
    };
    let with_fields = |mut spec: ToolSpec, fields: &[Field]| {
        if let ToolAction::Forward(ref mut route) = spec.action {
            route.fields.extend_from_slice(fields);
        }
        spec
    };

    vec![
        action("click", "click", "Click an element."),
        with_fields(
            action("type", "type", "Type text into an input element.")
                .param(ParamSpec::required("text", ParamType::String, "Text to type")),
            &[field("text", "params.text")],
        ),
        action("focus", "focus", "Focus an element."),
        action("blur", "blur", "Remove focus from an element."),
        action("hover", "hover", "Hover over an element."),
        action("double_click", "doubleClick", "Double-click an element."),
        action("right_click", "rightClick", "Right-click an element (context menu)."),
        action("clear", "clear", "Clear the value of an input element."),
        with_fields(
            action("select", "select", "Select an option in a select element.")
                .param(ParamSpec::required("value", ParamType::String, "Option value (or label with by_label)"))
                .param(ParamSpec::optional("by_label", ParamType::Boolean, "Match the option by its visible label")),
            &[field("value", "params.value"), field("by_label", "params.byLabel")],
        ),
        with_fields(
            action("scroll", "scroll", "Scroll an element or container.")
                .param(
                    ParamSpec::optional("direction", ParamType::String, "Scroll direction")
                        .one_of(&["up", "down", "left", "right"]),
                )
                .param(ParamSpec::optional("amount", ParamType::Integer, "Scroll distance in pixels")),
            &[field("direction", "params.direction"), field("amount", "params.amount")],
        ),
        action("check", "check", "Check a checkbox."),
        action("uncheck", "uncheck", "Uncheck a checkbox."),
        action("toggle", "toggle", "Toggle a checkbox or switch."),
        with_fields(
            action("set_value", "setValue", "Set the value of an input directly, without typing.")
                .param(ParamSpec::required("value", ParamType::String, "New value")),
            &[field("value", "params.value")],
        ),
        with_fields(
            action("drag", "drag", "Drag an element onto another element.")
                .param(ParamSpec::required(
                    "target_element_id",
                    ParamType::ElementId,
                    "Drop target element id or @eN ref",
                ))
                .param(ParamSpec::optional("steps", ParamType::Integer, "Intermediate pointer moves"))
                .param(ParamSpec::optional("hold_delay", ParamType::Integer, "Milliseconds to hold before moving")),
            &[
                field("target_element_id", "params.target.elementId"),
                field("steps", "params.steps"),
                field("hold_delay", "params.holdDelay"),
            ],
        ),
        action("submit", "submit", "Submit the form containing an element."),
        action("reset", "reset", "Reset the form containing an element."),
    ]
}

/// Registry of available tools.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    order: Vec<Arc<ToolSpec>>,
    tools: HashMap<String, Arc<ToolSpec>>,
}

impl ToolRegistry {
    /// A registry with no tools.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry with every built-in tool.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::empty();
        let specs = control::tools()
            .into_iter()
            .chain(sdk::tools())
            .chain(legacy::tools());
        for spec in specs {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, spec: ToolSpec) -> Result<()> {
        if self.tools.contains_key(&spec.name) {
            return Err(Error::Internal(format!(
                "tool registered twice: {}",
                spec.name
            )));
        }
        let spec = Arc::new(spec);
        self.tools.insert(spec.name.clone(), Arc::clone(&spec));
        self.order.push(spec);
        Ok(())
    }

    /// Look up a tool.
    pub fn get(&self, name: &str) -> Option<Arc<ToolSpec>> {
        self.tools.get(name).cloned()
    }

    /// Get tool definitions, in registration order.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.order.iter().map(|t| t.definition()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
