//! Core agent loop implementation.

use std::sync::Arc;

use thiserror::Error;

use crate::config::Config;
use crate::llm::{
    CompletionRequest, LlmClient, LlmError, Message, OpenAiCompatClient, RateLimiter, ToolSchema,
};
use crate::logging::{log_task_end, log_task_start};
use crate::tools::{truncate_for_log, ToolContext, ToolRegistry};

use super::prompt::build_system_prompt;
use super::routing::{route, Route};
use super::state::{Conversation, ConversationError};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Conversation(#[from] ConversationError),

    #[error("Max iterations ({0}) reached without completion")]
    IterationLimit(usize),
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Quiz tasks started.
    pub tasks: usize,
    /// Model calls plus tool steps.
    pub steps: usize,
    /// Messages in the final conversation.
    pub messages: usize,
}

/// The autonomous agent.
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    tool_schemas: Vec<ToolSchema>,
    ctx: ToolContext,
    limiter: RateLimiter,
    model: String,
    system_prompt: String,
    max_iterations: usize,
}

impl Agent {
    /// Create an agent talking to the configured model endpoint.
    pub fn new(config: &Config) -> Self {
        let llm = Arc::new(OpenAiCompatClient::new(
            config.api_key.clone(),
            &config.llm_base_url,
        ));
        Self::with_llm(config, llm, ToolRegistry::new())
    }

    /// Create an agent with an explicit model client and tool set.
    pub fn with_llm(config: &Config, llm: Arc<dyn LlmClient>, tools: ToolRegistry) -> Self {
        let system_prompt = build_system_prompt(&config.email, &config.secret, &tools);
        let tool_schemas = tools.get_tool_schemas();
        Self {
            llm,
            tool_schemas,
            tools,
            ctx: ToolContext::from_config(config),
            limiter: RateLimiter::new(config.rate_limit),
            model: config.default_model.clone(),
            system_prompt,
            max_iterations: config.max_iterations,
        }
    }

    /// Solve quizzes starting at `start_url` until the model says it is done.
    pub async fn run(&self, start_url: &str) -> Result<RunSummary, AgentError> {
        let mut conversation = Conversation::new(start_url);
        if conversation.task_counter() > 0 {
            log_task_start(start_url, conversation.task_counter());
        }

        match self.run_conversation(&mut conversation).await {
            Ok(summary) => {
                log_task_end(
                    true,
                    &format!(
                        "{} task(s), {} steps, {} messages",
                        summary.tasks, summary.steps, summary.messages
                    ),
                );
                Ok(summary)
            }
            Err(e) => {
                log_task_end(false, &format!("Error: {}", e));
                Err(e)
            }
        }
    }

    /// Drive an existing conversation to termination.
    pub async fn run_conversation(
        &self,
        conversation: &mut Conversation,
    ) -> Result<RunSummary, AgentError> {
        let mut steps = 0usize;

        loop {
            self.count_step(&mut steps)?;
            tracing::debug!("Agent iteration {}", steps);
            self.invoke_model(conversation).await?;

            let Some(last) = conversation.last() else {
                return Err(ConversationError::Empty.into());
            };
            match route(last) {
                Route::ExecuteTools => {
                    self.count_step(&mut steps)?;
                    self.execute_tools(conversation).await?;
                }
                Route::Continue => {
                    tracing::info!("No tool calls and no END, asking the model again");
                }
                Route::Terminate => {
                    tracing::info!("Model signalled END after {} steps", steps);
                    return Ok(RunSummary {
                        tasks: conversation.task_counter(),
                        steps,
                        messages: conversation.len(),
                    });
                }
            }
        }
    }

    fn count_step(&self, steps: &mut usize) -> Result<(), AgentError> {
        if *steps >= self.max_iterations {
            return Err(AgentError::IterationLimit(self.max_iterations));
        }
        *steps += 1;
        Ok(())
    }

    /// Call the model once and append its reply.
    async fn invoke_model(&self, conversation: &mut Conversation) -> Result<(), AgentError> {
        if conversation.is_empty() {
            return Err(ConversationError::Empty.into());
        }

        self.limiter.acquire().await;
        tracing::debug!(
            "Calling model {} with {} messages",
            self.model,
            conversation.len()
        );

        let reply = self
            .llm
            .chat_completion(CompletionRequest {
                model: &self.model,
                system: &self.system_prompt,
                messages: conversation.messages(),
                tools: &self.tool_schemas,
            })
            .await?;

        let text = reply.text();
        if !text.trim().is_empty() {
            tracing::info!("Model: {}", truncate_for_log(text.trim(), 500));
        }

        conversation.push(reply)?;
        Ok(())
    }

    /// Run every tool call of the last message in request order.
    async fn execute_tools(&self, conversation: &mut Conversation) -> Result<(), AgentError> {
        let calls = conversation
            .last()
            .map(|m| m.tool_calls().to_vec())
            .unwrap_or_default();

        for call in calls {
            tracing::info!(
                "Calling tool: {} with args: {}",
                call.name,
                truncate_for_log(&call.arguments, 200)
            );

            let output = self
                .tools
                .execute(&call.name, &call.arguments, &self.ctx)
                .await
                .into_content();

            tracing::info!(
                "Tool {} returned: {}",
                call.name,
                truncate_for_log(&output, 200)
            );

            conversation.push(Message::tool_result(call.id, call.name, output))?;
        }
        Ok(())
    }
}
