//! Jupyter notebook parsing and cleaning.
//!
//! Accepts both current (v4, top-level `cells`) and legacy (v3,
//! `worksheets[0].cells` with `input` for code) notebook layouts, and
//! normalizes cell bodies for downstream rendering: blank cells are dropped,
//! runs of blank lines are collapsed, and embedded base64 images are
//! truncated to a stub.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use kaggleingest_shared::{IngestError, NotebookContent, Result};

/// Parse raw `.ipynb` JSON into cleaned markdown and code cells.
pub fn parse_notebook(raw: &str) -> Result<NotebookContent> {
    let doc: Value = serde_json::from_str(raw)
        .map_err(|e| IngestError::parse(format!("invalid notebook JSON: {e}")))?;

    let nbformat = doc.get("nbformat").and_then(Value::as_i64).unwrap_or(4);
    let mut content = NotebookContent::default();

    if nbformat >= 4 {
        let cells = doc
            .get("cells")
            .and_then(Value::as_array)
            .ok_or_else(|| IngestError::parse("notebook has no cells array"))?;
        for cell in cells {
            collect_v4_cell(cell, &mut content);
        }
    } else {
        let cells = doc
            .get("worksheets")
            .and_then(Value::as_array)
            .and_then(|ws| ws.first())
            .and_then(|w| w.get("cells"))
            .and_then(Value::as_array)
            .ok_or_else(|| IngestError::parse("legacy notebook has no worksheet cells"))?;
        for cell in cells {
            collect_v3_cell(cell, &mut content);
        }
    }

    debug!(
        nbformat,
        markdown_cells = content.markdown.len(),
        code_cells = content.code.len(),
        "parsed notebook"
    );
    Ok(content)
}

fn collect_v4_cell(cell: &Value, content: &mut NotebookContent) {
    let source = join_source(cell.get("source"));
    match cell.get("cell_type").and_then(Value::as_str) {
        Some("markdown") => push_markdown(&source, content),
        Some("code") => push_code(&source, content),
        _ => {}
    }
}

fn collect_v3_cell(cell: &Value, content: &mut NotebookContent) {
    match cell.get("cell_type").and_then(Value::as_str) {
        Some("markdown") => {
            let source = join_source(cell.get("source"));
            push_markdown(&source, content);
        }
        // Legacy heading cells carry a level; render as a markdown heading.
        Some("heading") => {
            let level = cell.get("level").and_then(Value::as_i64).unwrap_or(1).clamp(1, 6);
            let text = join_source(cell.get("source"));
            if !text.trim().is_empty() {
                let heading = format!("{} {}", "#".repeat(level as usize), text.trim());
                content.markdown.push(heading);
            }
        }
        Some("code") => {
            let source = join_source(cell.get("input"));
            push_code(&source, content);
        }
        _ => {}
    }
}

/// Cell sources come as either a single string or an array of line strings.
fn join_source(source: Option<&Value>) -> String {
    match source {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(lines)) => lines
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .concat(),
        _ => String::new(),
    }
}

fn push_markdown(source: &str, content: &mut NotebookContent) {
    let cleaned = clean_markdown(source);
    if !cleaned.is_empty() {
        content.markdown.push(cleaned);
    }
}

fn push_code(source: &str, content: &mut NotebookContent) {
    let trimmed = source.trim_end();
    if !trimmed.trim().is_empty() {
        content.code.push(trimmed.to_string());
    }
}

/// Clean one markdown cell: truncate inline base64 images and collapse runs
/// of blank lines.
fn clean_markdown(source: &str) -> String {
    static BASE64_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(data:image/[A-Za-z.+-]+;base64,)[A-Za-z0-9+/=\s]{64,}").expect("valid regex")
    });
    static MULTI_BLANK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\n{3,}").expect("valid regex")
    });

    let truncated = BASE64_RE.replace_all(source, "$1<truncated>");
    let collapsed = MULTI_BLANK_RE.replace_all(&truncated, "\n\n");
    collapsed.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_v4_notebook() {
        let raw = r##"{
            "nbformat": 4,
            "cells": [
                {"cell_type": "markdown", "source": ["# Intro\n", "Some text."]},
                {"cell_type": "code", "source": "import pandas as pd\n"},
                {"cell_type": "raw", "source": "ignored"}
            ]
        }"##;
        let content = parse_notebook(raw).expect("parse");
        assert_eq!(content.markdown, vec!["# Intro\nSome text."]);
        assert_eq!(content.code, vec!["import pandas as pd"]);
    }

    #[test]
    fn parses_v3_notebook_with_headings() {
        let raw = r#"{
            "nbformat": 3,
            "worksheets": [{
                "cells": [
                    {"cell_type": "heading", "level": 2, "source": ["Feature engineering"]},
                    {"cell_type": "code", "input": ["df = load()\n", "df.head()"]},
                    {"cell_type": "markdown", "source": "Closing notes."}
                ]
            }]
        }"#;
        let content = parse_notebook(raw).expect("parse");
        assert_eq!(content.markdown[0], "## Feature engineering");
        assert_eq!(content.markdown[1], "Closing notes.");
        assert_eq!(content.code, vec!["df = load()\ndf.head()"]);
    }

    #[test]
    fn blank_cells_are_dropped() {
        let raw = r#"{
            "nbformat": 4,
            "cells": [
                {"cell_type": "markdown", "source": "   \n  "},
                {"cell_type": "code", "source": ""},
                {"cell_type": "code", "source": "print(1)"}
            ]
        }"#;
        let content = parse_notebook(raw).expect("parse");
        assert!(content.markdown.is_empty());
        assert_eq!(content.code.len(), 1);
    }

    #[test]
    fn base64_images_are_truncated() {
        let payload = "A".repeat(200);
        let raw = format!(
            r#"{{"nbformat": 4, "cells": [{{"cell_type": "markdown", "source": "![plot](data:image/png;base64,{payload})"}}]}}"#
        );
        let content = parse_notebook(&raw).expect("parse");
        assert_eq!(content.markdown[0], "![plot](data:image/png;base64,<truncated>)");
    }

    #[test]
    fn blank_line_runs_collapse() {
        let raw = r#"{
            "nbformat": 4,
            "cells": [{"cell_type": "markdown", "source": "a\n\n\n\n\nb"}]
        }"#;
        let content = parse_notebook(raw).expect("parse");
        assert_eq!(content.markdown[0], "a\n\nb");
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let err = parse_notebook("not json").unwrap_err();
        assert!(matches!(err, IngestError::Parse { .. }));

        let err = parse_notebook(r#"{"nbformat": 4}"#).unwrap_err();
        assert!(err.to_string().contains("no cells"));
    }
}
