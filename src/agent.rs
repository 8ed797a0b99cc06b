//! Agent-mode helpers: compact element refs and snapshot diffs.
//!
//! Runner element ids are long (`sidebar-nav-item-settings`). Agent mode
//! hands out short refs (`@e1`, `@e2`, …) for the elements of the latest
//! snapshot, which can then be used anywhere an element id is accepted.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

const REF_PREFIX: &str = "@e";

/// Element state properties compared between snapshots.
pub const TRACKED_PROPS: &[&str] = &[
    "visible",
    "enabled",
    "focused",
    "checked",
    "value",
    "textContent",
];

/// Element list inside a runner snapshot payload.
///
/// The runner wraps data as `{"success", "data": {"elements": [...]}}`; a bare
/// `{"elements": [...]}` is accepted too.
pub fn snapshot_elements(payload: &Value) -> &[Value] {
    payload
        .pointer("/data/elements")
        .or_else(|| payload.get("elements"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn element_id(element: &Value) -> Option<&str> {
    element.get("id").and_then(Value::as_str)
}

// ============================================================================
// Refs
// ============================================================================

/// Assigns compact refs to element ids.
#[derive(Debug, Default)]
pub struct RefManager {
    counter: usize,
    ref_to_id: HashMap<String, String>,
    id_to_ref: HashMap<String, String>,
}

impl RefManager {
    /// Create an empty ref table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all refs; numbering restarts at `@e1`.
    pub fn reset(&mut self) {
        self.counter = 0;
        self.ref_to_id.clear();
        self.id_to_ref.clear();
    }

    /// Ref for `element_id`, assigning the next one if needed.
    pub fn assign(&mut self, element_id: &str) -> String {
        if let Some(existing) = self.id_to_ref.get(element_id) {
            return existing.clone();
        }
        self.counter += 1;
        let r = format!("{REF_PREFIX}{}", self.counter);
        self.ref_to_id.insert(r.clone(), element_id.to_owned());
        self.id_to_ref.insert(element_id.to_owned(), r.clone());
        r
    }

    /// Existing ref for `element_id`, without assigning one.
    pub fn ref_for(&self, element_id: &str) -> Option<&str> {
        self.id_to_ref.get(element_id).map(String::as_str)
    }

    /// Resolve `@eN` to its element id; anything else passes through.
    pub fn resolve(&self, ref_or_id: &str) -> Result<String> {
        if !ref_or_id.starts_with(REF_PREFIX) {
            return Ok(ref_or_id.to_owned());
        }
        self.ref_to_id.get(ref_or_id).cloned().ok_or_else(|| {
            Error::InvalidArguments(format!(
                "unknown ref {ref_or_id}; take a new snapshot with agent_mode=true to refresh refs"
            ))
        })
    }
}

// ============================================================================
// Diffs
// ============================================================================

/// Change of one property between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropChange {
    /// Previous value (`null` when absent).
    pub from: Value,
    /// New value (`null` when absent).
    pub to: Value,
}

/// An element present in both snapshots whose tracked state changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModifiedElement {
    /// Element id.
    pub id: String,
    /// Changed properties, keyed by name.
    pub changes: BTreeMap<String, PropChange>,
}

/// Difference between two consecutive snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnapshotDiff {
    /// Ids present now but not before.
    pub appeared: Vec<String>,
    /// Ids present before but not now.
    pub disappeared: Vec<String>,
    /// Elements whose tracked state changed.
    pub modified: Vec<ModifiedElement>,
}

impl SnapshotDiff {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.appeared.is_empty() && self.disappeared.is_empty() && self.modified.is_empty()
    }
}

/// Remembers the last snapshot of one mode.
#[derive(Debug, Default)]
pub struct DiffTracker {
    // Ordered by first appearance so diffs list ids in page order.
    last: Option<Vec<(String, Value)>>,
}

impl DiffTracker {
    /// Create a tracker with no baseline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `elements` as the new baseline and diff against the previous one.
    ///
    /// Returns `None` for the first snapshot.
    pub fn update_and_diff(&mut self, elements: &[Value]) -> Option<SnapshotDiff> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(elements.len());
        let current: Vec<(String, Value)> = elements
            .iter()
            .filter_map(|element| element_id(element).map(|id| (id, element)))
            .filter(|(id, _)| seen.insert(*id))
            .map(|(id, element)| (id.to_owned(), element.clone()))
            .collect();
        let diff = self.last.as_ref().map(|old| compute_diff(old, &current));
        self.last = Some(current);
        diff
    }
}

fn compute_diff(old: &[(String, Value)], new: &[(String, Value)]) -> SnapshotDiff {
    let old_map: HashMap<&str, &Value> = old.iter().map(|(id, el)| (id.as_str(), el)).collect();
    let new_map: HashMap<&str, &Value> = new.iter().map(|(id, el)| (id.as_str(), el)).collect();

    let appeared = new
        .iter()
        .filter(|(id, _)| !old_map.contains_key(id.as_str()))
        .map(|(id, _)| id.clone())
        .collect();
    let disappeared = old
        .iter()
        .filter(|(id, _)| !new_map.contains_key(id.as_str()))
        .map(|(id, _)| id.clone())
        .collect();
    let modified = new
        .iter()
        .filter_map(|(id, el)| {
            let before = old_map.get(id.as_str())?;
            let changes = prop_changes(before, el);
            (!changes.is_empty()).then(|| ModifiedElement {
                id: id.clone(),
                changes,
            })
        })
        .collect();

    SnapshotDiff {
        appeared,
        disappeared,
        modified,
    }
}

fn prop_changes(old: &Value, new: &Value) -> BTreeMap<String, PropChange> {
    let state = |el: &Value, prop: &str| {
        el.get("state")
            .and_then(|s| s.get(prop))
            .cloned()
            .unwrap_or(Value::Null)
    };
    TRACKED_PROPS
        .iter()
        .filter_map(|prop| {
            let from = state(old, prop);
            let to = state(new, prop);
            (from != to).then(|| (prop.to_string(), PropChange { from, to }))
        })
        .collect()
}

// ============================================================================
// Listing options
// ============================================================================

/// Opening marker around page-supplied text.
pub const CONTENT_START: &str = "<<CONTENT>>";
/// Closing marker around page-supplied text.
pub const CONTENT_END: &str = "<</CONTENT>>";

/// State fields holding text that came from the page.
const PAGE_TEXT_FIELDS: &[&str] = &["textContent", "innerHTML", "value"];

/// Cut `text` to `max_len` characters, noting the original length.
///
/// `abcdefghij` with 5 becomes `abcde... [10 chars total]`.
pub fn truncate_field(text: &str, max_len: usize) -> String {
    let total = text.chars().count();
    if total <= max_len {
        return text.to_owned();
    }
    let head: String = text.chars().take(max_len).collect();
    format!("{head}... [{total} chars total]")
}

fn truncate_in_place(value: &mut Value, max_len: usize) {
    if let Value::String(text) = value {
        *text = truncate_field(text, max_len);
    }
}

/// Wrap non-empty page text in [`CONTENT_START`] / [`CONTENT_END`] so an
/// agent can tell page content apart from tool output.
pub fn sanitize_element_content(element: &mut Value) {
    let Some(state) = element.get_mut("state").and_then(Value::as_object_mut) else {
        return;
    };
    for field in PAGE_TEXT_FIELDS {
        if let Some(Value::String(text)) = state.get_mut(*field) {
            if !text.is_empty() {
                *text = format!("{CONTENT_START}{text}{CONTENT_END}");
            }
        }
    }
}

/// Mark and optionally truncate the element inside a single-element payload.
///
/// The element is the `data` object of a wrapped response, or the payload
/// itself.
pub fn prepare_element(payload: &mut Value, max_content_length: Option<usize>) {
    let wrapped = payload.get("data").is_some_and(Value::is_object);
    let element = if wrapped { &mut payload["data"] } else { payload };
    sanitize_element_content(element);
    let (Some(max_len), Some(state)) = (
        max_content_length,
        element.get_mut("state").and_then(Value::as_object_mut),
    ) else {
        return;
    };
    for field in PAGE_TEXT_FIELDS {
        if let Some(value) = state.get_mut(*field) {
            truncate_in_place(value, max_len);
        }
    }
}

fn positive(args: &Map<String, Value>, key: &str) -> Option<usize> {
    args.get(key)
        .and_then(Value::as_u64)
        .filter(|n| *n > 0)
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
}

/// Client-side filtering and trimming for element listings.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingOptions {
    /// Drop content elements (headings, text, tables).
    pub interactive_only: bool,
    /// `false` also drops content elements, without the listing saying so.
    pub include_content: bool,
    /// Keep only content elements.
    pub content_only: bool,
    /// Keep only elements whose content role or type is listed.
    pub content_types: Vec<String>,
    /// List at most this many elements.
    pub max_elements: Option<usize>,
    /// Truncate labels and page text to this many characters.
    pub max_content_length: Option<usize>,
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self {
            interactive_only: false,
            include_content: true,
            content_only: false,
            content_types: Vec::new(),
            max_elements: None,
            max_content_length: None,
        }
    }
}

/// Elements left after [`ListingOptions::trim`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    /// Elements to list.
    pub elements: Vec<Value>,
    /// Elements cut by `max_elements`.
    pub overflow: usize,
}

impl Listing {
    /// Elements before the cut.
    pub fn total(&self) -> usize {
        self.elements.len() + self.overflow
    }
}

impl ListingOptions {
    /// Read options from tool arguments. Zero limits count as unset.
    pub fn from_args(args: &Map<String, Value>) -> Self {
        let flag = |key: &str| args.get(key).and_then(Value::as_bool);
        Self {
            interactive_only: flag("interactive_only").unwrap_or(false),
            include_content: flag("include_content").unwrap_or(true),
            content_only: flag("content_only").unwrap_or(false),
            content_types: args
                .get("content_types")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            max_elements: positive(args, "max_elements"),
            max_content_length: positive(args, "max_content_length"),
        }
    }

    /// Elements that pass the category and type filters.
    ///
    /// This is what snapshot baselines are built from.
    pub fn select(&self, elements: &[Value]) -> Vec<Value> {
        fn category(el: &Value) -> &str {
            el.get("category").and_then(Value::as_str).unwrap_or("")
        }
        let drop_content = self.interactive_only || !self.include_content;
        let types: HashSet<&str> = self.content_types.iter().map(String::as_str).collect();

        elements
            .iter()
            .filter(|&el| !(drop_content && category(el) == "content"))
            .filter(|&el| !self.content_only || category(el) == "content")
            .filter(|&el| {
                if types.is_empty() {
                    return true;
                }
                let role = el
                    .pointer("/contentMetadata/contentRole")
                    .and_then(Value::as_str);
                let ty = el.get("type").and_then(Value::as_str);
                role.is_some_and(|r| types.contains(r)) || ty.is_some_and(|t| types.contains(t))
            })
            .cloned()
            .collect()
    }

    /// Truncate text fields, then cut the list to `max_elements`.
    pub fn trim(&self, mut elements: Vec<Value>) -> Listing {
        if let Some(max_len) = self.max_content_length {
            for element in &mut elements {
                if let Some(label) = element.get_mut("label") {
                    truncate_in_place(label, max_len);
                }
                if let Some(state) = element.get_mut("state").and_then(Value::as_object_mut) {
                    for field in ["textContent", "value"] {
                        if let Some(value) = state.get_mut(field) {
                            truncate_in_place(value, max_len);
                        }
                    }
                }
            }
        }

        let overflow = match self.max_elements {
            Some(max) if elements.len() > max => {
                let overflow = elements.len() - max;
                elements.truncate(max);
                overflow
            }
            _ => 0,
        };
        Listing { elements, overflow }
    }

    fn filter_description(&self) -> String {
        if self.content_only {
            " (content only)".to_owned()
        } else if !self.content_types.is_empty() {
            format!(" (filtered: {})", self.content_types.join(", "))
        } else {
            String::new()
        }
    }
}

// ============================================================================
// Formatting
// ============================================================================

/// Single-line compact description of an element.
///
/// `@e1 btn-submit (button) "Submit" [100,200 40x40] hidden disabled`
pub fn format_element_compact(element: &Value, r: &str) -> String {
    let str_field = |key: &str| element.get(key).and_then(Value::as_str).unwrap_or("");
    let state = element.get("state");
    let state_flag = |key: &str| state.and_then(|s| s.get(key)).and_then(Value::as_bool);

    let id = element_id(element).unwrap_or("?");
    let ty = element.get("type").and_then(Value::as_str).unwrap_or("?");
    let mut parts = vec![r.to_owned(), id.to_owned(), format!("({ty})")];

    let label = str_field("label");
    if !label.is_empty() {
        parts.push(format!("\"{label}\""));
    }

    if let Some(rect) = state.and_then(|s| s.get("rect")).filter(|r| r.is_object()) {
        let n = |key: &str| rect.get(key).and_then(Value::as_f64).unwrap_or(0.0);
        parts.push(format!(
            "[{:.0},{:.0} {:.0}x{:.0}]",
            n("x"),
            n("y"),
            n("width"),
            n("height")
        ));
    }

    if str_field("category") == "content" {
        let role = element
            .pointer("/contentMetadata/contentRole")
            .and_then(Value::as_str)
            .unwrap_or("");
        if !role.is_empty() {
            parts.push(format!("content:{role}"));
        }
    }

    let mut flags = Vec::new();
    if state_flag("visible") == Some(false) {
        flags.push("hidden");
    }
    if state_flag("enabled") == Some(false) {
        flags.push("disabled");
    }
    let has_value = state
        .and_then(|s| s.get("value"))
        .is_some_and(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            _ => true,
        });
    if has_value {
        flags.push("has-value");
    }
    if state_flag("checked") == Some(true) {
        flags.push("checked");
    }
    if state_flag("focused") == Some(true) {
        flags.push("focused");
    }
    if !flags.is_empty() {
        parts.push(flags.join(" "));
    }

    parts.join(" ")
}

/// Layout of an agent-mode listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingStyle {
    /// `## <type> (<n>)` sections in type order. Used by snapshots.
    Grouped,
    /// One line per element in runner order. Used by element lists.
    Flat,
}

/// Compact listing of `listing`, assigning fresh refs.
///
/// Refs are assigned in listing order, so with [`ListingStyle::Grouped`]
/// `@e1` is the first element of the first type.
pub fn format_snapshot(
    title: &str,
    listing: &Listing,
    options: &ListingOptions,
    refs: &mut RefManager,
    style: ListingStyle,
) -> String {
    refs.reset();
    let total = listing.total();
    let mut lines = Vec::with_capacity(listing.elements.len() + 2);

    match style {
        ListingStyle::Grouped => {
            let mode = if options.interactive_only {
                "agent mode, interactive only"
            } else {
                "agent mode"
            };
            lines.push(format!("{title} ({total} elements, {mode})"));
            lines.push(String::new());

            let mut by_type: BTreeMap<&str, Vec<&Value>> = BTreeMap::new();
            for element in &listing.elements {
                let ty = element.get("type").and_then(Value::as_str).unwrap_or("unknown");
                by_type.entry(ty).or_default().push(element);
            }
            for (ty, group) in by_type {
                lines.push(format!("## {ty} ({})", group.len()));
                for element in group {
                    let r = refs.assign(element_id(element).unwrap_or("?"));
                    lines.push(format_element_compact(element, &r));
                }
                lines.push(String::new());
            }
        }
        ListingStyle::Flat => {
            lines.push(format!(
                "{title} ({total}){} [agent mode]:",
                options.filter_description()
            ));
            lines.push(String::new());
            for element in &listing.elements {
                let r = refs.assign(element_id(element).unwrap_or("?"));
                lines.push(format_element_compact(element, &r));
            }
        }
    }

    let mut text = lines.join("\n").trim_end().to_owned();
    if listing.overflow > 0 {
        text.push_str(&format!("\n\n+{} more elements not shown", listing.overflow));
    }
    text
}

/// Human-readable rendering of a diff, naming refs where known.
pub fn format_diff(diff: &SnapshotDiff, refs: &RefManager) -> String {
    if diff.is_empty() {
        return "No changes detected.".into();
    }

    let label = |id: &str| match refs.ref_for(id) {
        Some(r) => format!("{r} ({id})"),
        None => id.to_owned(),
    };

    let mut lines = vec!["UI Diff:".to_owned()];
    if !diff.appeared.is_empty() {
        let ids: Vec<_> = diff.appeared.iter().map(|id| label(id)).collect();
        lines.push(format!("Appeared ({}): {}", ids.len(), ids.join(", ")));
    }
    if !diff.disappeared.is_empty() {
        let ids: Vec<_> = diff.disappeared.iter().map(|id| label(id)).collect();
        lines.push(format!("Disappeared ({}): {}", ids.len(), ids.join(", ")));
    }
    if !diff.modified.is_empty() {
        lines.push(format!("Modified ({}):", diff.modified.len()));
        for m in &diff.modified {
            let changes: Vec<_> = m
                .changes
                .iter()
                .map(|(prop, c)| format!("{prop} {} -> {}", c.from, c.to))
                .collect();
            lines.push(format!("  {}: {}", label(&m.id), changes.join(", ")));
        }
    }
    lines.join("\n")
}
