//! System prompt assembly.
//!
//! The prompt is rebuilt before every completion so the model always sees
//! the document as its own tool calls have left it.

use dandiclaw_core::tool::ToolRegistry;
use serde_json::Value;

const BASE_INSTRUCTIONS: &str = "\
You are DandiClaw, an assistant that helps scientists curate the metadata of a \
dandiset on a DANDI archive instance.

Work only through the tools. Read before you write, keep edits minimal, and \
never invent facts such as names, ORCIDs, grant numbers or licenses: ask the \
user instead. When a tool reports a failure, fix the cause and retry only the \
failed part. Finish by summarizing what you changed.";

/// Build the system prompt for the next completion.
pub fn build_system_prompt(tools: &ToolRegistry, document: &Value) -> String {
    let mut prompt = String::from(BASE_INSTRUCTIONS);

    let guides = tools.usage_guides();
    if !guides.is_empty() {
        prompt.push_str("\n\n## Tools\n");
        for (name, guide) in guides {
            prompt.push_str(&format!("\n### {name}\n{guide}\n"));
        }
    }

    let pretty = serde_json::to_string_pretty(document).unwrap_or_else(|_| document.to_string());
    prompt.push_str("\n\n## Current metadata\n\n```json\n");
    prompt.push_str(&pretty);
    prompt.push_str("\n```\n");
    prompt
}
