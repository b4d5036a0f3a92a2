//! # Quiz Agent
//!
//! An autonomous agent that solves chains of web quizzes.
//!
//! This library provides:
//! - A tool-based agent loop driven by a hosted LLM
//! - Tools for rendering pages, downloading files, running Python, installing
//!   packages, transcribing audio, analyzing images and submitting answers
//! - An OpenAI-compatible model client behind a rate limiter
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Seed the conversation with the starting quiz URL
//! 2. Call the model, route on its reply
//! 3. Execute any tool calls and feed the results back
//! 4. Stop when the model replies `END`
//!
//! ## Example
//!
//! ```rust,ignore
//! use quiz_agent::{agent::Agent, config::Config};
//!
//! let config = Config::from_env()?;
//! let agent = Agent::new(&config);
//! let summary = agent.run("https://quiz.example/start").await?;
//! ```

pub mod agent;
pub mod config;
pub mod llm;
pub mod logging;
pub mod pkg_manager;
pub mod tools;

pub use config::Config;
