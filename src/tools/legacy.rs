//! Deprecated browser-extension tools.
//!
//! These drive a browser tab through the runner's Chrome extension bridge and
//! take CSS selectors rather than element ids. They are kept apart from the
//! SDK tools so the whole family can be dropped in one place.

use std::time::Duration;

use serde_json::json;

use super::{field, ParamSpec, ParamType, RequestTimeout, Route, ToolMode, ToolSpec};

const STATUS_PATH: &str = "/extension/status";
const COMMAND_PATH: &str = "/extension/command";

/// Extra time the runner gets on top of the extension's own timeout.
const COMMAND_SLACK: Duration = Duration::from_secs(10);

fn deprecated(name: &str, description: &str, route: Route) -> ToolSpec {
    ToolSpec::forward(
        name,
        ToolMode::LegacyExtension,
        format!("[DEPRECATED] {description} Prefer the sdk_* tools."),
        route,
    )
}

fn command(action: &'static str) -> Route {
    Route::post(COMMAND_PATH).fixed("action", action)
}

fn selector_timeout() -> ParamSpec {
    ParamSpec::optional(
        "timeout_secs",
        ParamType::Integer,
        "Seconds to wait for the element",
    )
    .default_value(json!(10))
}

/// Legacy extension tools.
pub fn tools() -> Vec<ToolSpec> {
    vec![
        deprecated(
            "extension_status",
            "Check whether the Chrome extension is connected.",
            Route::get(STATUS_PATH),
        ),
        deprecated(
            "extension_list_tabs",
            "List browser tabs.",
            command("listTabs"),
        ),
        deprecated(
            "extension_select_tab",
            "Select the tab subsequent extension tools act on.",
            command("selectTab").fields(&[field("tab_id", "params.tabId")]),
        )
        .param(ParamSpec::required(
            "tab_id",
            ParamType::Integer,
            "Tab id from extension_list_tabs",
        )),
        deprecated(
            "extension_get_active_tab",
            "Get the active browser tab.",
            command("getActiveTab"),
        ),
        deprecated(
            "extension_get_elements",
            "Get the elements of the selected tab.",
            command("getElements")
                .fields(&[field("timeout_secs", "timeout_secs")])
                .timeout(RequestTimeout::ArgumentSeconds {
                    arg: "timeout_secs",
                    slack: COMMAND_SLACK,
                }),
        )
        .param(
            ParamSpec::optional(
                "timeout_secs",
                ParamType::Integer,
                "Seconds the extension may spend collecting elements",
            )
            .default_value(json!(30)),
        ),
        deprecated(
            "extension_click",
            "Click an element in the selected tab by CSS selector.",
            command("click").fields(&[
                field("selector", "params.selector"),
                field("timeout_secs", "timeout_secs"),
            ]),
        )
        .param(ParamSpec::required("selector", ParamType::String, "CSS selector"))
        .param(selector_timeout()),
        deprecated(
            "extension_type",
            "Type into an element in the selected tab by CSS selector.",
            command("type").fields(&[
                field("selector", "params.selector"),
                field("text", "params.text"),
                field("timeout_secs", "timeout_secs"),
            ]),
        )
        .param(ParamSpec::required("selector", ParamType::String, "CSS selector"))
        .param(ParamSpec::required("text", ParamType::String, "Text to type"))
        .param(selector_timeout()),
        deprecated(
            "extension_screenshot",
            "Capture the selected tab as a base64 PNG.",
            command("screenshot"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolAction;

    #[test]
    fn commands_go_to_the_command_endpoint() {
        for tool in tools() {
            assert_eq!(tool.mode, ToolMode::LegacyExtension);
            let ToolAction::Forward(route) = tool.action else {
                panic!("{} is not forwarded", tool.name);
            };
            if tool.name == "extension_status" {
                assert_eq!(route.path, STATUS_PATH);
            } else {
                assert_eq!(route.path, COMMAND_PATH);
                assert!(route.fixed.iter().any(|(wire, _)| *wire == "action"));
            }
        }
    }

    #[test]
    fn click_body_matches_extension_protocol() {
        let tools = tools();
        let click = tools.iter().find(|t| t.name == "extension_click").unwrap();
        let args = click.validate(json!({"selector": "#save"})).unwrap();
        let ToolAction::Forward(ref route) = click.action else {
            unreachable!()
        };
        let request = route.request(&args, Duration::from_secs(60)).unwrap();
        assert_eq!(
            request.body,
            Some(json!({"action": "click", "params": {"selector": "#save"}, "timeout_secs": 10}))
        );
        assert_eq!(request.timeout, None);
    }
}
