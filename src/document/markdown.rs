use super::Block;

const FENCE: &str = "```";

/// Line-oriented markdown scan.
///
/// A line containing a fence marker toggles code mode; code lines are kept
/// verbatim (trailing whitespace trimmed). Outside code, `# `, `## ` and
/// `### ` start headings and every other non-blank line is a paragraph with
/// `*` emphasis markers removed. An unterminated fence still yields its code.
pub fn markdown_blocks(markdown: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut code: Option<Vec<String>> = None;

    for line in markdown.lines() {
        let clean = line.trim();

        if clean.contains(FENCE) {
            match code.take() {
                Some(lines) => blocks.push(Block::Code(lines)),
                None => code = Some(Vec::new()),
            }
            continue;
        }

        if let Some(lines) = code.as_mut() {
            lines.push(line.trim_end().to_string());
            continue;
        }

        if let Some((level, text)) = heading(clean) {
            blocks.push(Block::Heading { level, text });
        } else if !clean.is_empty() {
            let text = strip_emphasis(clean);
            if !text.trim().is_empty() {
                blocks.push(Block::Paragraph(text));
            }
        }
    }

    if let Some(lines) = code {
        blocks.push(Block::Code(lines));
    }
    blocks
}

fn heading(line: &str) -> Option<(u8, String)> {
    let (level, rest) = if let Some(rest) = line.strip_prefix("### ") {
        (3, rest)
    } else if let Some(rest) = line.strip_prefix("## ") {
        (2, rest)
    } else if let Some(rest) = line.strip_prefix("# ") {
        (1, rest)
    } else {
        return None;
    };
    Some((level, strip_emphasis(rest.trim())))
}

fn strip_emphasis(text: &str) -> String {
    text.replace('*', "")
}
