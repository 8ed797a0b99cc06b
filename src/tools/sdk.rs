//! SDK-mode tools (an external app integrated with the UI Bridge SDK).
//!
//! Everything except the three session tools requires an active connection.

use serde_json::json;

use crate::agent::ListingStyle;

use super::control::{
    agent_mode_param, listing_interactive_only_param, max_content_length_param,
    max_elements_param,
};
use super::{
    element_actions, field, ParamSpec, ParamType, RequestTimeout, ResponseShape, Route,
    SessionOp, SnapshotScope, ToolMode, ToolSpec,
};

const BASE: &str = "/ui-bridge/sdk";

fn sdk(name: &str, description: &str, route: Route) -> ToolSpec {
    ToolSpec::forward(name, ToolMode::Sdk, description, route)
}

/// SDK-mode tools.
pub fn tools() -> Vec<ToolSpec> {
    let mut tools = vec![
        ToolSpec::session(
            "sdk_connect",
            "Connect to an app that embeds the UI Bridge SDK. Only one app can be \
             connected at a time; disconnect before switching.",
            SessionOp::Connect,
        )
        .param(ParamSpec::required(
            "url",
            ParamType::String,
            "URL of the app, e.g. http://localhost:3001",
        )),
        ToolSpec::session(
            "sdk_disconnect",
            "Disconnect from the SDK app. Always clears the local session.",
            SessionOp::Disconnect,
        ),
        ToolSpec::session(
            "sdk_status",
            "Report whether an SDK app is connected, and which.",
            SessionOp::Status,
        ),
        sdk(
            "sdk_snapshot",
            "Get a full snapshot of the connected app's UI. Use agent_mode for a compact \
             listing with @eN refs.",
            Route::get(format!("{BASE}/snapshot"))
                .fields(&[field("include_content", "include_content")]),
        )
        .param(
            ParamSpec::optional(
                "include_content",
                ParamType::Boolean,
                "Include content elements (headings, text, tables)",
            )
            .default_value(json!(true)),
        )
        .param(agent_mode_param())
        .param(listing_interactive_only_param())
        .param(max_elements_param())
        .param(max_content_length_param())
        .shape(ResponseShape::Snapshot {
            scope: SnapshotScope::Sdk,
            style: ListingStyle::Grouped,
            title: "SDK Snapshot",
        }),
        sdk(
            "sdk_elements",
            "List the elements registered in the connected app.",
            Route::get(format!("{BASE}/elements")).fields(&[
                field("content_only", "content_only"),
                field("content_types", "content_types"),
            ]),
        )
        .param(ParamSpec::optional(
            "content_only",
            ParamType::Boolean,
            "Only list content elements",
        ))
        .param(ParamSpec::optional(
            "content_types",
            ParamType::StringArray,
            "Only list elements with these content roles or types, e.g. [\"heading\", \"table\"]",
        ))
        .param(agent_mode_param())
        .param(max_elements_param())
        .param(max_content_length_param())
        .shape(ResponseShape::Snapshot {
            scope: SnapshotScope::Sdk,
            style: ListingStyle::Flat,
            title: "SDK Elements",
        }),
        sdk(
            "sdk_discover",
            "Force element discovery in the connected app.",
            Route::post(format!("{BASE}/discover"))
                .fields(&[
                    field("interactive_only", "interactive_only"),
                    field("include_content", "include_content"),
                    field("content_roles", "content_roles"),
                ])
                .timeout(RequestTimeout::Discovery),
        )
        .param(
            ParamSpec::optional(
                "interactive_only",
                ParamType::Boolean,
                "Only register interactive elements",
            )
            .default_value(json!(false)),
        )
        .param(
            ParamSpec::optional(
                "include_content",
                ParamType::Boolean,
                "Register content elements too",
            )
            .default_value(json!(true)),
        )
        .param(ParamSpec::optional(
            "content_roles",
            ParamType::StringArray,
            "Only register content elements with these roles",
        )),
        sdk(
            "sdk_get_element",
            "Get details of one element in the connected app. Page text is wrapped in \
             <<CONTENT>>...<</CONTENT>> markers.",
            Route::get(format!("{BASE}/element/{{element_id}}")),
        )
        .param(ParamSpec::element_id())
        .param(max_content_length_param())
        .shape(ResponseShape::Element),
        sdk(
            "sdk_diff",
            "Show what changed in the connected app since the last snapshot or diff.",
            Route::get(format!("{BASE}/snapshot")),
        )
        .shape(ResponseShape::Diff(SnapshotScope::Sdk)),
        // page
        sdk(
            "sdk_page_refresh",
            "Reload the connected app's page.",
            Route::post(format!("{BASE}/page/refresh")),
        ),
        sdk(
            "sdk_page_navigate",
            "Navigate the connected app to a URL.",
            Route::post(format!("{BASE}/page/navigate")).fields(&[field("url", "url")]),
        )
        .param(ParamSpec::required("url", ParamType::String, "Destination URL")),
        sdk(
            "sdk_page_go_back",
            "Go back in the connected app's history.",
            Route::post(format!("{BASE}/page/back")),
        ),
        sdk(
            "sdk_page_go_forward",
            "Go forward in the connected app's history.",
            Route::post(format!("{BASE}/page/forward")),
        ),
        sdk(
            "sdk_screenshot",
            "Capture a screenshot of the connected app.",
            Route::get(format!("{BASE}/screenshot")),
        ),
        sdk(
            "sdk_page_summary",
            "Get the runner's natural-language summary of the current page.",
            Route::get(format!("{BASE}/ai/summary")),
        ),
        // runner-side AI helpers
        sdk(
            "sdk_ai_search",
            "Find elements by a natural-language description.",
            Route::post(format!("{BASE}/ai/search")).fields(&[field("text", "text")]),
        )
        .param(ParamSpec::required(
            "text",
            ParamType::String,
            "What to look for, e.g. \"the save button\"",
        )),
        sdk(
            "sdk_ai_execute",
            "Perform an action described in natural language.",
            Route::post(format!("{BASE}/ai/execute"))
                .fields(&[field("instruction", "instruction")]),
        )
        .param(ParamSpec::required(
            "instruction",
            ParamType::String,
            "e.g. \"click the login button\"",
        )),
        sdk(
            "sdk_ai_assert",
            "Assert that an element described in natural language is in a given state.",
            Route::post(format!("{BASE}/ai/assert"))
                .fields(&[field("text", "text"), field("state", "state")]),
        )
        .param(ParamSpec::required(
            "text",
            ParamType::String,
            "Element description",
        ))
        .param(
            ParamSpec::optional("state", ParamType::String, "Expected state").one_of(&[
                "visible", "hidden", "enabled", "disabled", "checked", "unchecked", "focused",
            ]),
        ),
        // page analysis
        sdk(
            "sdk_analyze_data",
            "Extract labelled data values (prices, dates, counts) from the current page.",
            Route::post(format!("{BASE}/ai/analyze/data")),
        ),
        sdk(
            "sdk_analyze_regions",
            "Detect page regions (header, navigation, main, sidebar, footer).",
            Route::post(format!("{BASE}/ai/analyze/regions")),
        ),
        sdk(
            "sdk_analyze_structured_data",
            "Extract tables and lists from the current page.",
            Route::post(format!("{BASE}/ai/analyze/structured-data")),
        ),
        // design review
        sdk(
            "sdk_design_styles",
            "Computed styles of one element, or a style snapshot of every element when \
             element_id is omitted.",
            Route::get(format!("{BASE}/design/element/{{element_id}}/styles"))
                .fields(&[field("include_state_variations", "includeStateVariations")])
                .or_else(Route::get(format!("{BASE}/design/snapshot"))),
        )
        .param(ParamSpec::optional_element_id())
        .param(
            ParamSpec::optional(
                "include_state_variations",
                ParamType::Boolean,
                "Also report how styles change on hover, focus and other states",
            )
            .default_value(json!(false)),
        ),
        sdk(
            "sdk_design_state_styles",
            "Styles of an element in interaction states, as differences from its default state.",
            Route::post(format!("{BASE}/design/element/{{element_id}}/state-styles"))
                .fields(&[field("states", "states")]),
        )
        .param(ParamSpec::element_id())
        .param(
            ParamSpec::optional("states", ParamType::StringArray, "States to capture")
                .one_of(&["hover", "focus", "active", "disabled", "pressed"]),
        ),
        sdk(
            "sdk_design_responsive",
            "Capture element layout and styles at several viewport widths.",
            Route::post(format!("{BASE}/design/responsive"))
                .fields(&[field("viewports", "viewports"), field("element_ids", "elementIds")]),
        )
        .param(ParamSpec::optional(
            "viewports",
            ParamType::Object,
            "Viewport widths by label, e.g. {\"mobile\": 375, \"desktop\": 1280}",
        ))
        .param(ParamSpec::optional(
            "element_ids",
            ParamType::StringArray,
            "Only capture these elements",
        )),
        sdk(
            "sdk_design_audit",
            "Audit element styles against a style guide and report rule violations.",
            Route::post(format!("{BASE}/design/audit"))
                .fields(&[field("guide", "guide"), field("element_ids", "elementIds")]),
        )
        .param(ParamSpec::optional(
            "guide",
            ParamType::Object,
            "Style guide rules; the runner's loaded guide is used when omitted",
        ))
        .param(ParamSpec::optional(
            "element_ids",
            ParamType::StringArray,
            "Only audit these elements",
        )),
    ];
    tools.extend(element_actions(ToolMode::Sdk, "sdk", BASE));
    tools
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolAction;

    #[test]
    fn only_session_tools_skip_forwarding() {
        let session: Vec<String> = tools()
            .into_iter()
            .filter(|t| matches!(t.action, ToolAction::Session(_)))
            .map(|t| t.name)
            .collect();
        assert_eq!(session, ["sdk_connect", "sdk_disconnect", "sdk_status"]);
    }

    #[test]
    fn listing_styles() {
        let style = |name: &str| {
            let spec = tools().into_iter().find(|t| t.name == name).unwrap();
            match spec.response {
                ResponseShape::Snapshot { style, .. } => style,
                other => panic!("{name} has shape {other:?}"),
            }
        };
        assert_eq!(style("sdk_snapshot"), ListingStyle::Grouped);
        assert_eq!(style("sdk_elements"), ListingStyle::Flat);
    }

    #[test]
    fn every_tool_is_sdk_mode() {
        for tool in tools() {
            assert_eq!(tool.mode, ToolMode::Sdk, "{}", tool.name);
            assert!(tool.name.starts_with("sdk_"));
        }
    }
}
