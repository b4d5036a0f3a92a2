//! OpenAI-compatible chat completions provider.
//!
//! Works against any endpoint speaking the `/chat/completions` dialect with
//! function tools (Gemini's compatibility layer is the default).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::types::{Content, ContentPart, Message, ToolCall, ToolSchema};
use super::{CompletionRequest, LlmClient, LlmError};

pub struct OpenAiCompatClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl OpenAiCompatClient {
    /// `base_url` is the API root, e.g. `https://api.openai.com/v1`.
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn chat_completion(&self, request: CompletionRequest<'_>) -> Result<Message, LlmError> {
        let body = build_request(&request);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Never echo auth failures verbatim; bodies may quote the key.
            let message = if status.as_u16() == 401 || status.as_u16() == 403 {
                format!("authentication failed (HTTP {})", status.as_u16())
            } else {
                response
                    .text()
                    .await
                    .unwrap_or_else(|e| format!("<body read error: {e}>"))
            };
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: ChatCompletionResponse = response.json().await?;
        into_message(api_response)
    }
}

// --- Request building: our types → OpenAI format ---

fn build_request(request: &CompletionRequest<'_>) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if !request.system.is_empty() {
        messages.push(json!({
            "role": "system",
            "content": request.system,
        }));
    }

    for msg in request.messages {
        match msg {
            Message::User { content } => messages.push(json!({
                "role": "user",
                "content": content.as_text(),
            })),
            Message::Assistant {
                content,
                tool_calls,
            } => {
                // `content` may only be null when tool calls carry the turn.
                let text = content.as_text();
                let text = if text.is_empty() && !tool_calls.is_empty() {
                    Value::Null
                } else {
                    Value::String(text)
                };
                let mut msg_json = json!({
                    "role": "assistant",
                    "content": text,
                });
                if !tool_calls.is_empty() {
                    msg_json["tool_calls"] = tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments,
                                }
                            })
                        })
                        .collect();
                }
                messages.push(msg_json);
            }
            Message::Tool {
                tool_call_id,
                name,
                content,
            } => messages.push(json!({
                "role": "tool",
                "tool_call_id": tool_call_id,
                "name": name,
                "content": content,
            })),
        }
    }

    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });

    if !request.tools.is_empty() {
        body["tools"] = request.tools.iter().map(tool_to_openai).collect();
        body["tool_choice"] = Value::String("auto".to_string());
    }

    body
}

fn tool_to_openai(tool: &ToolSchema) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// --- Response parsing: OpenAI format → our types ---

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

fn into_message(response: ChatCompletionResponse) -> Result<Message, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

    let content = parse_content(choice.message.content)?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall {
            id: call
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
            name: call.function.name,
            arguments: match call.function.arguments {
                Some(Value::String(s)) => s,
                Some(Value::Null) | None => "{}".to_string(),
                Some(other) => other.to_string(),
            },
        })
        .collect();

    Ok(Message::assistant_with_tool_calls(content, tool_calls))
}

fn parse_content(raw: Option<Value>) -> Result<Content, LlmError> {
    match raw {
        None | Some(Value::Null) => Ok(Content::default()),
        Some(Value::String(s)) => Ok(Content::Text(s)),
        Some(Value::Array(items)) => {
            let parts = items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(ContentPart::text(s)),
                    other => serde_json::from_value::<ContentPart>(other)
                        .map_err(|e| LlmError::InvalidResponse(format!("content part: {e}"))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Content::Parts(parts))
        }
        Some(other) => Err(LlmError::InvalidResponse(format!(
            "unexpected content shape: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ToolSchema {
        ToolSchema {
            name: "download_file".into(),
            description: "Download a file".into(),
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    #[test]
    fn request_includes_system_tools_and_history() {
        let messages = vec![
            Message::user("http://quiz.test/1"),
            Message::assistant_with_tool_calls(
                "",
                vec![ToolCall {
                    id: "c1".into(),
                    name: "download_file".into(),
                    arguments: r#"{"url":"http://x/a.csv","filename":"a.csv"}"#.into(),
                }],
            ),
            Message::tool_result("c1", "download_file", "data/downloads/a.csv"),
        ];
        let tools = vec![schema()];
        let body = build_request(&CompletionRequest {
            model: "gemini-2.5-flash",
            system: "be precise",
            messages: &messages,
            tools: &tools,
        });

        assert_eq!(body["model"], "gemini-2.5-flash");
        let msgs = body["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[1]["content"], "http://quiz.test/1");
        assert_eq!(msgs[2]["content"], Value::Null);
        assert_eq!(msgs[2]["tool_calls"][0]["function"]["name"], "download_file");
        assert_eq!(msgs[3]["role"], "tool");
        assert_eq!(msgs[3]["tool_call_id"], "c1");
        assert_eq!(body["tools"][0]["function"]["name"], "download_file");
    }

    #[test]
    fn blank_assistant_reply_is_sent_as_empty_string() {
        let messages = vec![
            Message::user("http://quiz.test/1"),
            Message::assistant(""),
            Message::user("continue"),
        ];
        let body = build_request(&CompletionRequest {
            model: "m",
            system: "s",
            messages: &messages,
            tools: &[],
        });
        let msgs = body["messages"].as_array().unwrap();
        assert_eq!(msgs[2]["role"], "assistant");
        assert_eq!(msgs[2]["content"], "");
        assert!(msgs[2].get("tool_calls").is_none());
    }

    #[test]
    fn request_without_tools_omits_tool_fields() {
        let messages = vec![Message::user("hi")];
        let body = build_request(&CompletionRequest {
            model: "m",
            system: "",
            messages: &messages,
            tools: &[],
        });
        assert!(body.get("tools").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn parses_tool_calls() {
        let resp: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "a", "type": "function", "function": {"name": "run_code", "arguments": "{\"code\":\"print(1)\"}"}},
                        {"type": "function", "function": {"name": "post_request", "arguments": {"url": "u"}}}
                    ]
                }
            }]
        }))
        .unwrap();
        let msg = into_message(resp).unwrap();
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[0].arguments, "{\"code\":\"print(1)\"}");
        assert!(calls[1].id.starts_with("call_"));
        assert_eq!(calls[1].arguments, "{\"url\":\"u\"}");
    }

    #[test]
    fn parses_string_and_list_content() {
        let text: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "END"}}]
        }))
        .unwrap();
        let msg = into_message(text).unwrap();
        assert!(matches!(&msg, Message::Assistant { content: Content::Text(t), .. } if t == "END"));

        let parts: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": [{"type": "text", "text": "END"}]}}]
        }))
        .unwrap();
        let msg = into_message(parts).unwrap();
        assert!(matches!(&msg, Message::Assistant { content: Content::Parts(p), .. } if p.len() == 1));
    }

    #[test]
    fn empty_choices_is_an_error() {
        let resp: ChatCompletionResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(
            into_message(resp),
            Err(LlmError::InvalidResponse(_))
        ));
    }
}
