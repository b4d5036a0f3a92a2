//! Answer submission: HTTP POST with quiz-aware response handling.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{required_str, Tool, ToolContext, ToolOutput};

/// Seconds a quiz task may take before the server's next URL is followed
/// regardless of correctness.
pub const QUIZ_TIME_LIMIT_SECS: f64 = 180.0;

const SEPARATOR: &str = "================================================================================";

/// Send a JSON POST request.
pub struct PostRequest;

#[async_trait]
impl Tool for PostRequest {
    fn name(&self) -> &str {
        "post_request"
    }

    fn description(&self) -> &str {
        "Send an HTTP POST request with a JSON payload to the given URL and return the server's response. Use this to submit answers to the endpoint named on the quiz page. This call blocks until the server answers. The response tells you whether the answer was correct and, if there is one, the next quiz URL."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The endpoint to send the POST request to"
                },
                "payload": {
                    "type": "object",
                    "description": "The JSON request body"
                },
                "headers": {
                    "type": "object",
                    "additionalProperties": { "type": "string" },
                    "description": "Optional HTTP headers. Defaults to Content-Type: application/json"
                }
            },
            "required": ["url", "payload"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        let url = match required_str(&args, "url") {
            Ok(url) => url,
            Err(e) => return ToolOutput::text(e.to_string()),
        };

        match post(url, &args, ctx).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("{}", SEPARATOR);
                tracing::error!("UNEXPECTED ERROR during POST request");
                tracing::error!("URL: {}", url);
                tracing::error!("Error: {:#}", e);
                tracing::error!("{}", SEPARATOR);
                ToolOutput::text(format!("{:#}", e))
            }
        }
    }
}

async fn post(url: &str, args: &Value, ctx: &ToolContext) -> anyhow::Result<ToolOutput> {
    let payload = payload_from(args);
    let headers = headers_from(args);

    tracing::info!("{}", SEPARATOR);
    tracing::info!("POST REQUEST");
    tracing::info!("URL: {}", url);
    tracing::info!("Headers: {}", serde_json::to_string_pretty(&headers)?);
    tracing::info!("Payload (JSON):");
    for line in serde_json::to_string_pretty(&payload)?.lines() {
        tracing::info!("  {}", line);
    }
    tracing::info!("{}", "-".repeat(80));

    let mut request = ctx.http.post(url);
    for (name, value) in &headers {
        request = request.header(name.as_str(), value.as_str());
    }
    let response = request.json(&payload).send().await?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        tracing::error!("{}", SEPARATOR);
        tracing::error!("HTTP ERROR: {}", status);
        tracing::error!("URL: {}", url);
        let output = match serde_json::from_str::<Value>(&body) {
            Ok(data) => {
                tracing::error!("Error Response (JSON):");
                for line in serde_json::to_string_pretty(&data)?.lines() {
                    tracing::error!("  {}", line);
                }
                ToolOutput::Json(data)
            }
            Err(_) => {
                tracing::error!("Error Response (Text): {}", body);
                ToolOutput::Text(body)
            }
        };
        tracing::error!("{}", SEPARATOR);
        return Ok(output);
    }

    tracing::info!("Response Status: {}", status);

    let data = match serde_json::from_str::<Value>(&body) {
        Ok(data) => data,
        Err(_) => {
            tracing::info!("Response (Text): {}", body);
            tracing::info!("{}", SEPARATOR);
            return Ok(ToolOutput::Text(body));
        }
    };

    log_quiz_response(&data)?;

    Ok(ToolOutput::Json(filter_quiz_response(data)))
}

/// The payload may arrive as an object or as JSON text.
fn payload_from(args: &Value) -> Value {
    match &args["payload"] {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
        other => other.clone(),
    }
}

fn headers_from(args: &Value) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = args["headers"]
        .as_object()
        .map(|h| {
            h.iter()
                .filter_map(|(k, v)| match v {
                    Value::String(s) => Some((k.clone(), s.clone())),
                    Value::Null => None,
                    other => Some((k.clone(), other.to_string())),
                })
                .collect()
        })
        .unwrap_or_default();
    if headers.is_empty() {
        headers.insert("Content-Type".to_string(), "application/json".to_string());
    }
    headers
}

fn log_quiz_response(data: &Value) -> anyhow::Result<()> {
    if data.is_object() {
        tracing::info!("Answer Correct: {}", data["correct"]);
        tracing::info!("Time Elapsed: {}s", delay_of(data));
        if let Some(message) = data["message"].as_str().filter(|m| !m.is_empty()) {
            tracing::info!("Server Message: {}", message);
        }
        if let Some(next) = data["url"].as_str().filter(|u| !u.is_empty()) {
            tracing::info!("Next URL: {}", next);
        }
    }
    tracing::info!("Full Response (JSON):");
    for line in serde_json::to_string_pretty(data)?.lines() {
        tracing::info!("  {}", line);
    }
    tracing::info!("{}", SEPARATOR);
    Ok(())
}

/// `delay` as seconds; anything non-numeric counts as zero.
fn delay_of(data: &Value) -> f64 {
    data.get("delay").and_then(Value::as_f64).unwrap_or(0.0)
}

/// Apply the quiz retry policy to a server response before the model sees it.
///
/// - wrong answer within the time limit: `url` is removed so the model retries
///   the same task;
/// - time limit reached: only `url` survives, so the model moves on.
///
/// Non-object values are returned unchanged.
pub fn filter_quiz_response(data: Value) -> Value {
    let delay = delay_of(&data);
    let mut map = match data {
        Value::Object(map) => map,
        other => return other,
    };

    if delay >= QUIZ_TIME_LIMIT_SECS {
        let next = map.remove("url").unwrap_or(Value::Null);
        return json!({ "url": next });
    }

    let correct = map.get("correct").and_then(Value::as_bool).unwrap_or(false);
    if !correct {
        map.remove("url");
    }

    Value::Object(map)
}
