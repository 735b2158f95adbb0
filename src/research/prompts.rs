//! Stage prompts and supervisor tool definitions.

use crate::types::ToolDefinition;
use serde_json::json;

pub const CONDUCT_RESEARCH: &str = "conduct_research";
pub const THINK: &str = "think";
pub const RESEARCH_COMPLETE: &str = "research_complete";

pub const CLARIFY_SYSTEM: &str = "You are a research assistant. Decide whether the user's \
request is specific enough to research. If it is, reply with a one-sentence confirmation of \
the scope you will cover. If not, reply with the single most important clarifying question.";

pub const BRIEF_SYSTEM: &str = "You turn a user's request into a detailed research brief. \
State the research question, the dimensions to investigate, constraints the user stated, and \
what a complete answer must contain. Do not invent constraints the user did not give.";

pub const SUPERVISOR_SYSTEM: &str = "You are a research supervisor. Break the research brief \
into focused sub-topics and delegate each with the conduct_research tool. Use the think tool \
to reflect on what has been found and what is missing. Call research_complete once the \
findings are sufficient to write a comprehensive report.";

pub const RESEARCHER_SYSTEM: &str = "You are a focused researcher. Investigate the given topic \
thoroughly and return a concise summary of your findings. Cite every source inline with its \
full URL.";

pub const REPORT_SYSTEM: &str = "You write the final research report. Using the research brief \
and the findings provided, produce a well-structured, comprehensive markdown report that \
answers the brief. Cite sources inline with their full URLs and end with a Sources section.";

pub fn clarify_prompt(query: &str) -> String {
    format!("User request:\n{}", query)
}

pub fn brief_prompt(query: &str) -> String {
    format!("Write the research brief for this request:\n{}", query)
}

pub fn supervisor_prompt(brief: &str, findings: &[String], notes: &[String]) -> String {
    let mut prompt = format!("Research brief:\n{}\n", brief);
    if !findings.is_empty() {
        prompt.push_str("\nFindings so far:\n");
        for (i, finding) in findings.iter().enumerate() {
            prompt.push_str(&format!("[{}] {}\n", i + 1, finding));
        }
    }
    if !notes.is_empty() {
        prompt.push_str("\nYour earlier reflections:\n");
        for note in notes {
            prompt.push_str(&format!("- {}\n", note));
        }
    }
    prompt
}

pub fn researcher_prompt(topic: &str) -> String {
    format!("Research topic:\n{}", topic)
}

pub fn report_prompt(query: &str, brief: &str, findings: &[String]) -> String {
    let mut prompt = format!("Original request:\n{}\n\nResearch brief:\n{}\n\nFindings:\n", query, brief);
    if findings.is_empty() {
        prompt.push_str("(no delegated findings; rely on the brief)\n");
    }
    for (i, finding) in findings.iter().enumerate() {
        prompt.push_str(&format!("\n## Finding {}\n{}\n", i + 1, finding));
    }
    prompt
}

/// Tools offered to the supervisor during execution.
pub fn supervisor_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: CONDUCT_RESEARCH.to_string(),
            description: "Delegate research on one focused sub-topic.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "research_topic": {
                        "type": "string",
                        "description": "The topic to research, described in detail"
                    }
                },
                "required": ["research_topic"]
            }),
        },
        ToolDefinition {
            name: THINK.to_string(),
            description: "Reflect on progress and plan the next step.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "reflection": {"type": "string"}
                },
                "required": ["reflection"]
            }),
        },
        ToolDefinition {
            name: RESEARCH_COMPLETE.to_string(),
            description: "Signal that research is complete.".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        },
    ]
}
