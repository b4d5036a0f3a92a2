//! Conversation state: the append-only message log and the task counter.

use std::collections::HashSet;

use thiserror::Error;

use crate::llm::Message;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("Conversation is empty")]
    Empty,

    #[error("Tool result references unknown tool call id '{0}'")]
    UnknownToolCall(String),
}

/// Messages exchanged with the model, in order, plus the number of quiz
/// tasks seen so far.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    task_counter: usize,
    /// Ids of every tool call requested so far.
    requested_calls: HashSet<String>,
}

impl Conversation {
    /// Start a conversation from the seed URL.
    pub fn new(seed_url: &str) -> Self {
        let seed = Message::user(seed_url);
        Self {
            task_counter: usize::from(starts_task(&seed)),
            messages: vec![seed],
            requested_calls: HashSet::new(),
        }
    }

    /// Append a message.
    ///
    /// Returns the new task number when the message is a URL-shaped user
    /// message.
    pub fn push(&mut self, message: Message) -> Result<Option<usize>, ConversationError> {
        if let Message::Tool { tool_call_id, .. } = &message {
            if !self.requested_calls.contains(tool_call_id) {
                return Err(ConversationError::UnknownToolCall(tool_call_id.clone()));
            }
        }

        self.requested_calls
            .extend(message.tool_calls().iter().map(|c| c.id.clone()));

        let started = starts_task(&message);
        self.messages.push(message);

        if started {
            self.task_counter += 1;
            Ok(Some(self.task_counter))
        } else {
            Ok(None)
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn task_counter(&self) -> usize {
        self.task_counter
    }
}

/// A user message whose text starts with `http` opens a new quiz task.
fn starts_task(message: &Message) -> bool {
    matches!(message, Message::User { .. }) && message.text().trim_start().starts_with("http")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolCall;

    fn call(id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "post_request".to_string(),
            arguments: "{}".to_string(),
        }
    }

    #[test]
    fn seed_url_is_task_one() {
        let conv = Conversation::new("http://quiz.test/1");
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.task_counter(), 1);
        assert_eq!(conv.last(), Some(&Message::user("http://quiz.test/1")));
    }

    #[test]
    fn only_url_shaped_user_messages_count() {
        let mut conv = Conversation::new("http://quiz.test/1");
        assert_eq!(conv.push(Message::user("please continue")).unwrap(), None);
        assert_eq!(conv.push(Message::assistant("http://quiz.test/9")).unwrap(), None);
        assert_eq!(conv.push(Message::user("https://quiz.test/2")).unwrap(), Some(2));
        assert_eq!(conv.task_counter(), 2);
    }

    #[test]
    fn tool_result_must_match_a_request() {
        let mut conv = Conversation::new("http://quiz.test/1");
        let err = conv
            .push(Message::tool_result("c1", "post_request", "{}"))
            .unwrap_err();
        assert_eq!(err, ConversationError::UnknownToolCall("c1".to_string()));
        assert_eq!(conv.len(), 1);

        conv.push(Message::assistant_with_tool_calls("", vec![call("c1")]))
            .unwrap();
        conv.push(Message::tool_result("c1", "post_request", "{}"))
            .unwrap();
        assert_eq!(conv.len(), 3);
    }
}
