use super::code_summary::CodeSummary;

/// Report outline used when a request carries no instructions.
pub const DEFAULT_INSTRUCTIONS: &str = "\
You are an expert technical documentation agent tasked with generating professional, concise, and academically styled project reports for software engineering deliverables (e.g., AI systems, mobile apps, web applications).

For each section below, produce 3-5 formal paragraphs in clear academic English. Use bolded section titles, numbered subheadings, consistent indentation, and realistic examples or technical explanations wherever relevant. Ensure coherence, clarity, and logical flow across sections.

### Table of Contents
1. Introduction
 1.1 Motivation
 1.2 Problem Definition
 1.3 Objectives
 1.4 Scope & Limitations

2. Literature Survey
 2.1 Overview of Related Work
 2.2 Existing Systems & Their Drawbacks
 2.3 Proposed System & Innovations
 2.4 Feasibility Analysis
 2.5 Key Features
 2.6 Required Technologies

3. Analysis
 3.1 Analytical Overview
 3.2 Requirements Specification
  3.2.1 Functional Requirements
  3.2.2 Non-functional Requirements
  3.2.3 Software & Hardware Specifications

4. Design
 4.1 Architectural Overview
 4.2 System Architecture Diagram
 4.3 Module Organization & Interfaces

5. Implementation
 5.1 Implementation Strategy
 5.2 Core Functional Modules
 5.3 Representative Code Snippets
 5.4 Deployment & Execution

6. Testing, Validation & Results
 6.1 Testing Overview
 6.2 Test Methodologies
 6.3 Test Case Design & Scenarios
 6.4 Validation of Outcomes

7. Conclusion & Future Work
 7.1 Summary of Achievements
 7.2 Limitations & Lessons Learned
 7.3 Recommendations for Future Enhancements
";

pub const NARRATIVE_SYSTEM: &str =
    "You write technical reports in Markdown. Output only the report.";

pub fn narrative_prompt(
    code: &str,
    project_info: &str,
    instructions: &str,
    pages: u32,
    summary: &CodeSummary,
) -> String {
    let plural = if pages > 1 { "s" } else { "" };
    format!(
        "Use the following to generate a **Markdown** technical report of approximately {pages} page{plural}:\n\n\
         **Project Description:**\n\"\"\"{project_info}\"\"\"\n\n\
         **User Instructions:**\n\"\"\"{instructions}\"\"\"\n\n\
         **Code Structure:** {structure}\n\n\
         **Source Code (for context):**\n\"\"\"{code}\"\"\"\n\n\
         Produce only the final well-structured Markdown text with bolded headings, numbered sections, and consistent formatting.",
        instructions = instructions.trim(),
        structure = summary.describe(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_inputs() {
        let summary = CodeSummary {
            functions: vec!["main".into()],
            classes: vec![],
            lines: 3,
        };
        let prompt = narrative_prompt("fn main() {}", "A CLI tool", "  Be brief. ", 1, &summary);
        assert!(prompt.contains("approximately 1 page:"));
        assert!(prompt.contains("\"\"\"A CLI tool\"\"\""));
        assert!(prompt.contains("\"\"\"Be brief.\"\"\""));
        assert!(prompt.contains("functions: main"));
        assert!(prompt.contains("\"\"\"fn main() {}\"\"\""));
    }

    #[test]
    fn page_count_pluralizes() {
        let prompt = narrative_prompt("x", "y", "z", 4, &CodeSummary::default());
        assert!(prompt.contains("approximately 4 pages:"));
    }

    #[test]
    fn default_outline_has_all_sections() {
        for heading in ["1. Introduction", "4. Design", "7. Conclusion & Future Work"] {
            assert!(DEFAULT_INSTRUCTIONS.contains(heading));
        }
    }
}
