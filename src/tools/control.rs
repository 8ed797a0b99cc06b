//! Health and control-mode tools (the runner's own webview).

use serde_json::json;

use crate::agent::ListingStyle;

use super::{
    element_actions, field, ParamSpec, ParamType, RequestTimeout, ResponseShape, Route,
    SnapshotScope, ToolMode, ToolSpec,
};

const BASE: &str = "/ui-bridge/control";

pub(super) fn agent_mode_param() -> ParamSpec {
    ParamSpec::optional(
        "agent_mode",
        ParamType::Boolean,
        "Return a compact listing with @eN refs usable as element ids",
    )
    .default_value(json!(false))
}

pub(super) fn max_elements_param() -> ParamSpec {
    ParamSpec::optional(
        "max_elements",
        ParamType::Integer,
        "List at most this many elements in agent mode; the rest are counted",
    )
}

pub(super) fn max_content_length_param() -> ParamSpec {
    ParamSpec::optional(
        "max_content_length",
        ParamType::Integer,
        "Truncate labels and text content to this many characters",
    )
}

pub(super) fn listing_interactive_only_param() -> ParamSpec {
    ParamSpec::optional(
        "interactive_only",
        ParamType::Boolean,
        "Leave content elements (headings, text, tables) out of the listing",
    )
    .default_value(json!(false))
}

/// Health and control-mode tools.
pub fn tools() -> Vec<ToolSpec> {
    let mut tools = vec![
        ToolSpec::forward(
            "ui_health",
            ToolMode::Health,
            "Check that the runner is running and reachable.",
            Route::get("/health"),
        ),
        ToolSpec::forward(
            "ui_snapshot",
            ToolMode::Control,
            "Get a full snapshot of the runner's UI: every registered element with its \
             state, position and text. Use agent_mode for a compact listing with @eN refs.",
            Route::get(format!("{BASE}/snapshot")),
        )
        .param(agent_mode_param())
        .param(listing_interactive_only_param())
        .param(max_elements_param())
        .param(max_content_length_param())
        .shape(ResponseShape::Snapshot {
            scope: SnapshotScope::Control,
            style: ListingStyle::Grouped,
            title: "UI Snapshot",
        }),
        ToolSpec::forward(
            "ui_discover",
            ToolMode::Control,
            "Force element discovery in the runner's UI (re-registers all elements).",
            Route::post(format!("{BASE}/discover"))
                .fields(&[field("interactive_only", "interactive_only")])
                .timeout(RequestTimeout::Discovery),
        )
        .param(
            ParamSpec::optional(
                "interactive_only",
                ParamType::Boolean,
                "Only register interactive elements",
            )
            .default_value(json!(false)),
        ),
        ToolSpec::forward(
            "ui_get_element",
            ToolMode::Control,
            "Get details of one element in the runner's UI. Page text is wrapped in \
             <<CONTENT>>...<</CONTENT>> markers.",
            Route::get(format!("{BASE}/element/{{element_id}}")),
        )
        .param(ParamSpec::element_id())
        .param(max_content_length_param())
        .shape(ResponseShape::Element),
        ToolSpec::forward(
            "ui_diff",
            ToolMode::Control,
            "Show what changed in the runner's UI since the last snapshot or diff.",
            Route::get(format!("{BASE}/snapshot")),
        )
        .shape(ResponseShape::Diff(SnapshotScope::Control)),
    ];
    tools.extend(element_actions(ToolMode::Control, "ui", BASE));
    tools
}
