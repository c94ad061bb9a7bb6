use chrono::NaiveDate;

use crate::clients::{DiagramRecord, PlanningResponse};
use crate::diagram::{sanitize_type, title_case};
use crate::document::{markdown_blocks, AssembledDocument, Block, DiagramBlock, DiagramImage};

pub const REPORT_TITLE: &str = "Technical Report";
pub const DEFAULT_SUBTITLE: &str = "AI-Generated Documentation";
pub const FOOTER: &str = "DocuAgent | Confidential";

/// A diagram slot in the assembled document. `index` selects the file
/// `{diagram_type}_{index}.png` under the build directory; `None` is a
/// planned diagram with no rendered file, shown as heading and description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramEntry {
    pub diagram_type: String,
    pub description: String,
    pub index: Option<u32>,
}

/// Diagram slots in planner order.
///
/// Each planned spec yields one slot per rendered record that belongs to it
/// (ascending index), or a single file-less slot so failed diagrams still
/// get their heading. A record belongs to the spec at its `position`; records
/// without one fall back to the first unclaimed spec of the same type.
/// Responses without `planned` use the rendered list as-is.
pub fn diagram_entries(response: &PlanningResponse) -> Vec<DiagramEntry> {
    let rendered = |record: &DiagramRecord| DiagramEntry {
        diagram_type: sanitize_type(&record.diagram_type),
        description: record.description.clone(),
        index: Some(record.index),
    };

    if response.planned.is_empty() {
        return response.diagrams.iter().map(rendered).collect();
    }

    let mut entries = Vec::new();
    let mut used = vec![false; response.diagrams.len()];
    for (position, spec) in response.planned.iter().enumerate() {
        let diagram_type = sanitize_type(&spec.diagram_type);
        let belongs = |record: &DiagramRecord| match record.position {
            Some(p) => p == position,
            None => sanitize_type(&record.diagram_type) == diagram_type,
        };
        let mut matches: Vec<(usize, DiagramEntry)> = response
            .diagrams
            .iter()
            .enumerate()
            .filter(|(i, r)| !used[*i] && belongs(r))
            .map(|(i, r)| (i, rendered(r)))
            .collect();

        if matches.is_empty() {
            entries.push(DiagramEntry {
                diagram_type,
                description: spec.description.clone(),
                index: None,
            });
            continue;
        }
        matches.sort_by_key(|(_, e)| e.index);
        for (i, entry) in matches {
            used[i] = true;
            entries.push(entry);
        }
    }

    // Rendered records with no matching plan line keep their relative order.
    entries.extend(
        response
            .diagrams
            .iter()
            .enumerate()
            .filter(|(i, _)| !used[*i])
            .map(|(_, r)| rendered(r)),
    );
    entries
}

/// First line of the build instructions, or the default subtitle.
pub fn subtitle(instructions: Option<&str>) -> String {
    instructions
        .and_then(|text| text.lines().next())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .unwrap_or(DEFAULT_SUBTITLE)
        .to_string()
}

/// Cover page, narrative body, then the diagrams section.
///
/// `load_image` returns the decoded image for an entry, or `None` to emit
/// only its heading and description.
pub fn assemble_document(
    instructions: Option<&str>,
    markdown: &str,
    entries: &[DiagramEntry],
    today: NaiveDate,
    mut load_image: impl FnMut(&DiagramEntry) -> Option<DiagramImage>,
) -> AssembledDocument {
    let mut doc = AssembledDocument::new(REPORT_TITLE);
    doc.footer = Some(FOOTER.to_string());

    doc.push(Block::Title(REPORT_TITLE.to_string()));
    doc.push(Block::Subtitle(subtitle(instructions)));
    doc.push(Block::Caption(format!("Generated on: {}", today.format("%B %d, %Y"))));
    doc.push(Block::PageBreak);

    doc.blocks.extend(markdown_blocks(markdown));

    if !entries.is_empty() {
        doc.push(Block::Heading {
            level: 1,
            text: "Diagrams".to_string(),
        });
    }
    for entry in entries {
        doc.push(Block::Diagram(DiagramBlock {
            title: title_case(&entry.diagram_type),
            description: entry.description.clone(),
            image: load_image(entry),
        }));
    }
    doc
}
