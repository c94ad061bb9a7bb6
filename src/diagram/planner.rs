use std::sync::LazyLock;

use regex::Regex;

use super::{DiagramError, DiagramSpec};
use crate::llm::LlmClient;

const PLANNING_SYSTEM: &str = "You are a UML expert.";

/// `- Type: description` or `* Type: description`, anchored at column 0.
static PLAN_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-*]\s*(.+?):\s*(.+)$").unwrap());

/// Asks the language model which diagrams describe a system.
pub struct DiagramPlanner<'a> {
    llm: &'a dyn LlmClient,
}

impl<'a> DiagramPlanner<'a> {
    pub fn new(llm: &'a dyn LlmClient) -> Self {
        Self { llm }
    }

    /// Plan diagrams for `description`. An empty plan is a valid result; only
    /// a failed LLM call is an error.
    pub fn plan(&self, description: &str, instructions: &str) -> Result<Vec<DiagramSpec>, DiagramError> {
        let prompt = planning_prompt(description, instructions);
        tracing::debug!(model = self.llm.model(), prompt_len = prompt.len(), "Planning diagrams");

        let reply = self
            .llm
            .generate(&prompt, PLANNING_SYSTEM)
            .map_err(DiagramError::Planning)?;

        let specs = parse_plan(&reply);
        if specs.is_empty() {
            tracing::warn!(reply_len = reply.len(), "No diagram specs parsed from plan");
        } else {
            tracing::info!(count = specs.len(), "Diagram plan ready");
        }
        Ok(specs)
    }
}

pub fn planning_prompt(description: &str, instructions: &str) -> String {
    let mut prompt = format!(
        "From this description, list ALL useful UML diagram types and a one-line \
         description each, in format:\n- Type: desc\n\nSystem description:\n{}",
        description.trim()
    );
    let instructions = instructions.trim();
    if !instructions.is_empty() {
        prompt.push_str("\n\nAdditional instructions:\n");
        prompt.push_str(instructions);
    }
    prompt
}

/// Parse `- Type: description` bullet lines, in order. Anything else is
/// dropped.
pub fn parse_plan(reply: &str) -> Vec<DiagramSpec> {
    reply
        .lines()
        .filter_map(|line| {
            let caps = PLAN_LINE.captures(line.trim_end())?;
            let diagram_type = caps[1].trim();
            let description = caps[2].trim();
            (!diagram_type.is_empty() && !description.is_empty())
                .then(|| DiagramSpec::new(diagram_type, description))
        })
        .collect()
}
