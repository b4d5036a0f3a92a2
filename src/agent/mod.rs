//! Agent module - the core autonomous agent logic.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Seed the conversation with the starting quiz URL
//! 2. Call the model with the system prompt and available tools
//! 3. If the model requests tool calls, execute them in order and feed the results back
//! 4. Repeat until the model replies `END` or max iterations is reached

mod agent_loop;
mod prompt;
mod routing;
mod state;

pub use agent_loop::{Agent, AgentError, RunSummary};
pub use prompt::build_system_prompt;
pub use routing::{route, Route, TERMINATION_TOKEN};
pub use state::{Conversation, ConversationError};
