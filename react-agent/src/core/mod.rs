//! The ReAct control loop.
//!
//! Each step asks the model for a `Thought:`/`Action:` pair, dispatches the
//! action to the tool registry and feeds the observation back through the
//! history until the model answers with `Finish[...]` or the step budget runs
//! out.

use crate::clients::{LLMClient, Message};
use crate::memory::History;
use crate::prompts::build_react_prompt;
use crate::tools::ToolManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_MAX_STEPS: usize = 5;

const THOUGHT_LABEL: &str = "Thought: ";
const ACTION_LABEL: &str = "Action: ";
const FINISH_PREFIX: &str = "Finish[";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOutput {
    pub thought: Option<String>,
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedAction {
    Finish { answer: String },
    Tool { name: String, input: String },
}

/// Rest of the line after the first occurrence of `label`, trimmed.
fn labeled_field(text: &str, label: &str) -> Option<String> {
    let start = text.find(label)? + label.len();
    let line = text[start..].split('\n').next().unwrap_or_default().trim();
    (!line.is_empty()).then(|| line.to_string())
}

pub fn parse_output(text: &str) -> ParsedOutput {
    ParsedOutput {
        thought: labeled_field(text, THOUGHT_LABEL),
        action: labeled_field(text, ACTION_LABEL),
    }
}

/// Classifies an action line.
///
/// Bracketed payloads run from the first `[` to the last `]`, so nested
/// brackets stay inside the input. `None` means the action is malformed.
pub fn parse_action(action: &str) -> Option<ParsedAction> {
    if let Some(rest) = action.strip_prefix(FINISH_PREFIX)
        && let Some(end) = rest.rfind(']')
    {
        return Some(ParsedAction::Finish {
            answer: rest[..end].trim().to_string(),
        });
    }

    let open = action.find('[')?;
    let close = action.rfind(']')?;
    let name = &action[..open];
    if close < open || name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }

    let input = &action[open + 1..close];
    if input.is_empty() {
        return None;
    }

    Some(ParsedAction::Tool {
        name: name.to_string(),
        input: input.to_string(),
    })
}

pub fn tool_not_found(name: &str) -> String {
    format!("Error: Tool named '{}' not found.", name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub thought: Option<String>,
    pub action: String,
    pub observation: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("model call failed")]
    ModelCallFailed,
    #[error("no action parsed from model output")]
    NoActionParsed,
    #[error("max steps ({0}) reached without a final answer")]
    MaxStepsExceeded(usize),
}

pub type StepCallback = Arc<dyn Fn(usize, Step) + Send + Sync>;

/// Drives one question at a time through the ReAct loop.
///
/// The history belongs to the agent, so concurrent runs need separate
/// agents; the client and the registry can be shared between them.
pub struct ReactAgent {
    client: Arc<dyn LLMClient>,
    tools: Arc<ToolManager>,
    max_steps: usize,
    temperature: f32,
    step_callback: Option<StepCallback>,
    history: History,
}

impl ReactAgent {
    pub fn new(client: Arc<dyn LLMClient>, tools: Arc<ToolManager>, max_steps: Option<usize>) -> Self {
        Self {
            client,
            tools,
            max_steps: max_steps.unwrap_or(DEFAULT_MAX_STEPS),
            temperature: 0.0,
            step_callback: None,
            history: History::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_step_callback(mut self, callback: StepCallback) -> Self {
        self.step_callback = Some(callback);
        self
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Returns the final answer, or `None` when the run aborted for any reason.
    pub async fn run(&mut self, question: &str) -> Option<String> {
        match self.execute(question).await {
            Ok(answer) => Some(answer),
            Err(e) => {
                tracing::warn!(reason = %e, "process terminated");
                None
            }
        }
    }

    pub async fn execute(&mut self, question: &str) -> Result<String, AgentError> {
        self.history.clear();
        let tools_desc = self.tools.describe();
        let mut current_step = 0;

        while current_step < self.max_steps {
            current_step += 1;
            tracing::info!(step = current_step, max_steps = self.max_steps, "starting step");

            let prompt = build_react_prompt(&tools_desc, question, &self.history.render());
            let messages = [Message::user(prompt)];

            // Whitespace-only text is still a reply; it just carries no action.
            let response = self
                .client
                .think(&messages, self.temperature)
                .await
                .filter(|text| !text.is_empty())
                .ok_or(AgentError::ModelCallFailed)?;

            let ParsedOutput { thought, action } = parse_output(&response);
            if let Some(thought) = &thought {
                tracing::info!(thought = %thought, "thought");
            }
            let action = action.ok_or(AgentError::NoActionParsed)?;

            let (name, input) = match parse_action(&action) {
                Some(ParsedAction::Finish { answer }) => {
                    tracing::info!(answer = %answer, "final answer");
                    return Ok(answer);
                }
                Some(ParsedAction::Tool { name, input }) => (name, input),
                None => {
                    // Skipped steps still count against the budget.
                    tracing::warn!(action = %action, "malformed action, skipping step");
                    continue;
                }
            };

            tracing::info!(tool = %name, input = %input, "action");
            let observation = match self.tools.get(&name) {
                Some(tool) => tool.invoke(&input).await,
                None => tool_not_found(&name),
            };
            tracing::info!(observation = %observation, "observation");

            self.history.record(&action, &observation);

            if let Some(callback) = &self.step_callback {
                callback(
                    current_step,
                    Step {
                        thought,
                        action,
                        observation,
                    },
                );
            }
        }

        Err(AgentError::MaxStepsExceeded(self.max_steps))
    }
}
