/// Slots: `{tools}`, `{question}`, `{history}`.
pub const REACT_PROMPT_TEMPLATE: &str = r#"
Please note that you are an intelligent assistant capable of calling external tools.

Available tools are as follows:
{tools}

Please respond strictly in the following format:

Thought: Your thinking process, used to analyze problems, decompose tasks, and plan the next action.
Action: The action you decide to take, must be in one of the following formats:
- `{tool_name}[{tool_input}]`: Call an available tool.
- `Finish[final answer]`: When you believe you have obtained the final answer.
- When you have collected enough information to answer the user's final question, you must use `Finish[final answer]` after the Action: field to output the final answer.

Now, please start solving the following problem:
Question: {question}
History: {history}
"#;

const NO_TOOLS: &str = "(no tools available)";

pub fn build_react_prompt(tools: &str, question: &str, history: &str) -> String {
    let tools = if tools.is_empty() { NO_TOOLS } else { tools };

    // Single pass so that braces inside the question or history are left alone.
    let mut prompt = String::with_capacity(REACT_PROMPT_TEMPLATE.len() + tools.len() + question.len() + history.len());
    let mut rest = REACT_PROMPT_TEMPLATE;
    while let Some(start) = rest.find('{') {
        prompt.push_str(&rest[..start]);
        let after = &rest[start..];
        let (value, consumed) = if after.starts_with("{tools}") {
            (tools, "{tools}".len())
        } else if after.starts_with("{question}") {
            (question, "{question}".len())
        } else if after.starts_with("{history}") {
            (history, "{history}".len())
        } else {
            ("{", 1)
        };
        prompt.push_str(value);
        rest = &after[consumed..];
    }
    prompt.push_str(rest);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_react_prompt_fills_slots() {
        let prompt = build_react_prompt(
            "- Search: web search",
            "What is the capital of France?",
            "Action: Search[capital of France]\nObservation: Paris",
        );

        assert!(prompt.contains("Available tools are as follows:\n- Search: web search\n"));
        assert!(prompt.contains("Question: What is the capital of France?\n"));
        assert!(prompt.contains("History: Action: Search[capital of France]\nObservation: Paris\n"));
        assert!(prompt.contains("`Finish[final answer]`"));
        assert!(prompt.contains("`{tool_name}[{tool_input}]`"));
    }

    #[test]
    fn test_build_react_prompt_empty_history() {
        let prompt = build_react_prompt("- Search: web search", "q", "");
        assert!(prompt.ends_with("Question: q\nHistory: \n"));
    }

    #[test]
    fn test_build_react_prompt_no_tools() {
        let prompt = build_react_prompt("", "q", "");
        assert!(prompt.contains("(no tools available)"));
    }

    #[test]
    fn test_build_react_prompt_leaves_user_braces_alone() {
        let prompt = build_react_prompt("- T: t", "what is {history}?", "");
        assert!(prompt.contains("Question: what is {history}?\n"));
    }
}
