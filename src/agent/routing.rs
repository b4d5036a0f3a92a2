//! Decide what follows a message.

use crate::llm::Message;

/// Text the model emits once the last quiz is done.
pub const TERMINATION_TOKEN: &str = "END";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Run the requested tool calls, then ask the model again.
    ExecuteTools,
    /// Ask the model again.
    Continue,
    /// Stop the run.
    Terminate,
}

/// Route on the latest message. Tool calls always win; otherwise the run
/// ends only on an assistant reply whose trimmed text is exactly `END`.
pub fn route(message: &Message) -> Route {
    match message {
        Message::Assistant { tool_calls, .. } if !tool_calls.is_empty() => Route::ExecuteTools,
        Message::Assistant { content, .. } if content.as_text().trim() == TERMINATION_TOKEN => {
            Route::Terminate
        }
        _ => Route::Continue,
    }
}
