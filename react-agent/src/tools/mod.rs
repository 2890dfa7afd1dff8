//! Tool registry consumed by the ReAct loop.
//!
//! A tool is anything that turns an input string into an observation string.
//! Tools never fail from the caller's point of view: faults are reported in the
//! returned text so the model can read them and adjust.

pub mod search;

use futures::Future;
use std::pin::Pin;

pub use search::{DuckDuckGoSearch, SerpApiSearch};

pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = String> + Send + 'a>>;

pub trait ToolTrait: Send + Sync {
    fn invoke<'a>(&'a self, input: &'a str) -> ToolFuture<'a>;
}

/// Wraps a plain closure as a tool.
pub struct FnTool<F> {
    func: F,
}

impl<F> FnTool<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> ToolTrait for FnTool<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn invoke<'a>(&'a self, input: &'a str) -> ToolFuture<'a> {
        let output = (self.func)(input);
        Box::pin(async move { output })
    }
}

struct RegisteredTool {
    name: String,
    description: String,
    tool: Box<dyn ToolTrait>,
}

/// Name-keyed tool table that remembers registration order.
///
/// Not synchronized. Do not mutate a registry while a run that uses it is in
/// progress; agents hold it behind an `Arc`, which enforces this in practice.
#[derive(Default)]
pub struct ToolManager {
    tools: Vec<RegisteredTool>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registers `tool` under `name`, replacing any previous entry in place.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        tool: Box<dyn ToolTrait>,
    ) {
        let name = name.into();
        let description = description.into();

        match self.tools.iter_mut().find(|t| t.name == name) {
            Some(existing) => {
                tracing::warn!(tool = %name, "tool already exists and will be overwritten");
                existing.description = description;
                existing.tool = tool;
            }
            None => {
                self.tools.push(RegisteredTool {
                    name: name.clone(),
                    description,
                    tool,
                });
            }
        }

        tracing::info!(tool = %name, "tool registered");
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, description: impl Into<String>, func: F)
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.register(name, description, Box::new(FnTool::new(func)));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ToolTrait> {
        self.tools
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.tool.as_ref())
    }

    pub fn description(&self, name: &str) -> Option<&str> {
        self.tools
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.description.as_str())
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// One `- {name}: {description}` line per tool, in registration order.
    pub fn describe(&self) -> String {
        self.tools
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub const SEARCH_TOOL_NAME: &str = "Search";
pub const SEARCH_TOOL_DESCRIPTION: &str = "A web search engine. Use this tool when you need to answer questions about current events, facts, and information not found in your knowledge base.";

/// Registry with a single `Search` tool backed by `search`.
pub fn default_tools(search: Box<dyn ToolTrait>) -> ToolManager {
    let mut manager = ToolManager::new();
    manager.register(SEARCH_TOOL_NAME, SEARCH_TOOL_DESCRIPTION, search);
    manager
}
