pub mod clients;
pub mod core;
pub mod memory;
pub mod prompts;
pub mod tools;

pub use crate::clients::{
    ChunkStream, ClientConfig, LLMClient, LLMError, Message, MessageRole, OpenAIClient, StreamChunk,
    create_llm_client,
};
pub use crate::core::{AgentError, ParsedAction, ParsedOutput, ReactAgent, Step, parse_action, parse_output};
pub use crate::memory::History;
pub use crate::prompts::build_react_prompt;
pub use crate::tools::{DuckDuckGoSearch, FnTool, SerpApiSearch, ToolManager, ToolTrait, default_tools};
