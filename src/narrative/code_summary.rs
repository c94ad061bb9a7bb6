//! Lightweight structural summary of submitted source code.
//!
//! Line-based pattern matching only; the result is prompt context, not a
//! parse. Unknown extensions yield just a line count.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodeSummary {
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub lines: usize,
}

struct LanguagePatterns {
    functions: Regex,
    classes: Regex,
}

static PYTHON: LazyLock<LanguagePatterns> = LazyLock::new(|| LanguagePatterns {
    functions: Regex::new(r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)").unwrap(),
    classes: Regex::new(r"^\s*class\s+([A-Za-z_]\w*)").unwrap(),
});

static RUST: LazyLock<LanguagePatterns> = LazyLock::new(|| LanguagePatterns {
    functions: Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+([A-Za-z_]\w*)").unwrap(),
    classes: Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait)\s+([A-Za-z_]\w*)").unwrap(),
});

static JAVASCRIPT: LazyLock<LanguagePatterns> = LazyLock::new(|| LanguagePatterns {
    functions: Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)").unwrap(),
    classes: Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)").unwrap(),
});

static JVM: LazyLock<LanguagePatterns> = LazyLock::new(|| LanguagePatterns {
    functions: Regex::new(r"^\s*(?:(?:public|private|protected|static|final|abstract|synchronized|override|internal)\s+)*(?:fun\s+)?[\w<>\[\],\s]*?\b([A-Za-z_]\w*)\s*\([^;]*\)\s*(?:throws\s+[\w,\s]+)?\{?\s*$").unwrap(),
    classes: Regex::new(r"^\s*(?:(?:public|private|protected|static|final|abstract|sealed|data|open|internal)\s+)*(?:class|interface|enum|record|object)\s+([A-Za-z_]\w*)").unwrap(),
});

static GO: LazyLock<LanguagePatterns> = LazyLock::new(|| LanguagePatterns {
    functions: Regex::new(r"^func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)").unwrap(),
    classes: Regex::new(r"^type\s+([A-Za-z_]\w*)\s+(?:struct|interface)").unwrap(),
});

const CONTROL_KEYWORDS: &[&str] = &["if", "for", "while", "switch", "catch", "return", "new", "else"];

fn patterns_for(extension: &str) -> Option<&'static LanguagePatterns> {
    let ext = extension.trim().trim_start_matches('.').to_ascii_lowercase();
    match ext.as_str() {
        "py" => Some(&PYTHON),
        "rs" => Some(&RUST),
        "js" | "jsx" | "ts" | "tsx" | "mjs" => Some(&JAVASCRIPT),
        "java" | "kt" | "cs" | "scala" => Some(&JVM),
        "go" => Some(&GO),
        _ => None,
    }
}

/// Summarize `code` using patterns chosen by file `extension`.
pub fn summarize(code: &str, extension: &str) -> CodeSummary {
    let mut summary = CodeSummary {
        lines: code.lines().count(),
        ..Default::default()
    };
    let Some(patterns) = patterns_for(extension) else {
        return summary;
    };

    for line in code.lines() {
        if let Some(caps) = patterns.classes.captures(line) {
            summary.classes.push(caps[1].to_string());
        } else if let Some(caps) = patterns.functions.captures(line) {
            let name = &caps[1];
            if !CONTROL_KEYWORDS.contains(&name) {
                summary.functions.push(name.to_string());
            }
        }
    }
    summary
}

impl CodeSummary {
    /// One-paragraph rendering for the prompt.
    pub fn describe(&self) -> String {
        let list = |items: &[String]| {
            if items.is_empty() {
                "none detected".to_string()
            } else {
                items.join(", ")
            }
        };
        format!(
            "{} lines; functions: {}; classes/types: {}",
            self.lines,
            list(&self.functions),
            list(&self.classes)
        )
    }
}
