use chrono::{SecondsFormat, Utc};
use futures::future::BoxFuture;

use agentflow_core::error::Result;
use agentflow_core::traits::Tool;

/// Current time in UTC.
pub struct GetTimeTool;

impl Tool for GetTimeTool {
    fn name(&self) -> &str {
        "get_time"
    }

    fn description(&self) -> &str {
        "Get the current time (RFC 3339, UTC) and Unix timestamp."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    fn timeout_secs(&self) -> u64 {
        5
    }

    fn execute(&self, _input: serde_json::Value) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let now = Utc::now();
            let out = serde_json::json!({
                "time": now.to_rfc3339_opts(SecondsFormat::Secs, true),
                "timestamp": now.timestamp(),
                "timezone": "UTC",
            });
            Ok(out.to_string())
        })
    }
}
