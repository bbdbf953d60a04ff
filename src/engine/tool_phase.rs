//! Tool phase of a turn: run each requested call and record its result.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::error::SyllabusError;
use crate::tools::{ToolArguments, ToolRegistry};
use crate::types::ToolCallRecord;

/// Result text for a call whose arguments were not valid JSON.
pub const INVALID_JSON_ARGUMENTS: &str = "Error: Invalid json arguments";

/// Execute calls sequentially in index order. Failures become result text.
pub(crate) async fn execute_tool_calls(
    registry: &ToolRegistry,
    calls: &mut [ToolCallRecord],
) -> Result<(), SyllabusError> {
    for call in calls.iter_mut() {
        let result = run_one(registry, call).await;
        call.set_result(result)?;
    }
    Ok(())
}

async fn run_one(registry: &ToolRegistry, call: &ToolCallRecord) -> String {
    let args = match call.parsed_arguments() {
        Ok(value) => ToolArguments::new(value),
        Err(e) => {
            warn!(tool = %call.name, call_id = %call.id, error = %e, "invalid tool arguments");
            return INVALID_JSON_ARGUMENTS.to_string();
        }
    };

    let execution = AssertUnwindSafe(registry.execute(&call.name, &args)).catch_unwind();
    match execution.await {
        Ok(Ok(output)) => {
            debug!(tool = %call.name, call_id = %call.id, "tool succeeded");
            output
        }
        Ok(Err(e)) => {
            warn!(tool = %call.name, call_id = %call.id, error = %e, "tool failed");
            format!("Error: {}", e.message)
        }
        Err(_) => {
            warn!(tool = %call.name, call_id = %call.id, "tool panicked");
            format!("Error: tool {} panicked", call.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FnTool, ToolError, ToolParameters};

    fn registry() -> ToolRegistry {
        ToolRegistry::new()
            .with_tool(FnTool::new(
                "weather",
                "Current weather",
                ToolParameters::object().string("city", "City", true).build(),
                |args| async move {
                    let city = args.get_str("city")?;
                    Ok(format!("72F in {city}"))
                },
            ))
            .with_tool(FnTool::new(
                "broken",
                "Always fails",
                ToolParameters::empty(),
                |_args| async move { Err(ToolError::new("disk on fire")) },
            ))
            .with_tool(FnTool::new(
                "panics",
                "Panics",
                ToolParameters::empty(),
                |_args| async move {
                    if true {
                        panic!("boom");
                    }
                    Ok(String::new())
                },
            ))
    }

    fn call(index: u32, name: &str, args: &str) -> ToolCallRecord {
        let mut record = ToolCallRecord::new(index, format!("call_{index}"), name);
        record.arguments = args.to_string();
        record
    }

    #[tokio::test]
    async fn each_failure_kind_becomes_text() {
        let mut calls = vec![
            call(0, "weather", r#"{"city":"NYC"}"#),
            call(1, "weather", r#"{"city":"#),
            call(2, "broken", "{}"),
            call(3, "missing", "{}"),
            call(4, "panics", "{}"),
            call(5, "weather", "{}"),
        ];
        execute_tool_calls(&registry(), &mut calls).await.unwrap();

        let results: Vec<_> = calls.iter().map(|c| c.result.clone().unwrap()).collect();
        assert_eq!(
            results,
            vec![
                "72F in NYC".to_string(),
                INVALID_JSON_ARGUMENTS.to_string(),
                "Error: disk on fire".to_string(),
                "Error: Unknown tool: missing".to_string(),
                "Error: tool panics panicked".to_string(),
                "Error: Missing string argument: city".to_string(),
            ]
        );
    }
}
