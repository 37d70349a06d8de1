//! Renderers over [`IngestionResult`].
//!
//! All three formats (TOON, plain text, Markdown) consume the same in-memory
//! result structure and are pure: identical input yields byte-identical
//! output, which the result cache relies on.

use std::fmt::Write as _;

use kaggleingest_shared::{
    DatasetFileSchema, IngestError, IngestionResult, NotebookOutcome, OutputFormat, Result,
};

use crate::encode::{Document, Value};

/// Maximum sample rows shown per file in the Markdown rendering.
const MD_SAMPLE_ROW_LIMIT: usize = 5;

/// Maximum characters per Markdown table cell before truncation.
const MD_CELL_LIMIT: usize = 50;

/// Render an ingestion result in the requested format.
pub fn render(result: &IngestionResult, format: OutputFormat) -> Result<String> {
    check_consistency(result)?;

    Ok(match format {
        OutputFormat::Toon => render_toon(result),
        OutputFormat::Txt => render_txt(result),
        OutputFormat::Md => render_md(result),
    })
}

/// Reject results whose statistics disagree with their outcome list; a
/// renderer must never paper over a malformed aggregate.
fn check_consistency(result: &IngestionResult) -> Result<()> {
    let successes = result.notebooks.iter().filter(|n| n.is_success()).count();
    let failures = result.notebooks.len() - successes;

    if successes != result.stats.successful || failures != result.stats.failed {
        return Err(IngestError::Render(format!(
            "statistics disagree with outcomes: stats say {}/{} but outcomes hold {}/{}",
            result.stats.successful, result.stats.failed, successes, failures
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// TOON
// ---------------------------------------------------------------------------

fn render_toon(result: &IngestionResult) -> String {
    let mut doc = Document::new();
    let meta = &result.metadata;

    doc.key_value(
        "metadata",
        vec![
            ("title".into(), Value::str(&meta.title)),
            ("url".into(), Value::str(&meta.url)),
            ("description".into(), Value::str(&meta.description)),
            ("source".into(), Value::str(meta.kind.to_string())),
        ],
    );

    // Competition extras get their own section so the required metadata
    // header stays fixed.
    if meta.category.is_some()
        || meta.prize.is_some()
        || meta.evaluation_metric.is_some()
        || meta.deadline.is_some()
    {
        let opt = |v: &Option<String>| match v {
            Some(s) => Value::str(s),
            None => Value::Null,
        };
        doc.key_value(
            "competition",
            vec![
                ("category".into(), opt(&meta.category)),
                ("prize".into(), opt(&meta.prize)),
                ("evaluation_metric".into(), opt(&meta.evaluation_metric)),
                ("deadline".into(), opt(&meta.deadline)),
            ],
        );
    }

    if !result.schemas.is_empty() {
        let rows = result
            .schemas
            .iter()
            .map(|file| {
                vec![
                    Value::str(&file.filename),
                    Value::List(
                        file.columns
                            .iter()
                            .map(|c| Value::str(format!("{}:{}", c.name, c.dtype)))
                            .collect(),
                    ),
                    Value::List(
                        file.sample_rows
                            .iter()
                            .map(|row| {
                                Value::List(row.iter().map(Value::str).collect())
                            })
                            .collect(),
                    ),
                ]
            })
            .collect();
        doc.table(
            "schema",
            vec!["filename".into(), "columns".into(), "sample_rows".into()],
            rows,
        );
    }

    let notebook_rows: Vec<Vec<Value>> = result
        .notebooks
        .iter()
        .filter_map(|outcome| match outcome {
            NotebookOutcome::Success { index, meta, .. } => Some(vec![
                Value::from(*index),
                Value::str(&meta.title),
                Value::str(&meta.author),
                Value::Int(meta.votes),
                Value::str(&meta.url),
            ]),
            NotebookOutcome::Failure(_) => None,
        })
        .collect();
    if !notebook_rows.is_empty() {
        doc.table(
            "notebooks",
            vec![
                "index".into(),
                "title".into(),
                "author".into(),
                "votes".into(),
                "url".into(),
            ],
            notebook_rows,
        );
    }

    if !result.stats.failures.is_empty() {
        let rows = result
            .stats
            .failures
            .iter()
            .map(|f| {
                vec![
                    Value::str(&f.reference),
                    Value::str(&f.title),
                    Value::str(&f.reason),
                ]
            })
            .collect();
        doc.table(
            "failures",
            vec!["reference".into(), "title".into(), "reason".into()],
            rows,
        );
    }

    doc.table(
        "statistics",
        vec![
            "requested".into(),
            "successful".into(),
            "failed".into(),
            "duration_seconds".into(),
        ],
        vec![vec![
            Value::from(result.stats.requested),
            Value::from(result.stats.successful),
            Value::from(result.stats.failed),
            Value::Float(round2(result.stats.duration_seconds)),
        ]],
    );

    // Cell bodies are large and multi-line; they live in prose blocks
    // correlated by notebook index, never inside tabular rows.
    for outcome in &result.notebooks {
        if let NotebookOutcome::Success { index, content, .. } = outcome {
            if !content.markdown.is_empty() {
                doc.block(
                    format!("notebook {index} markdown"),
                    content.markdown.join("\n\n"),
                );
            }
            if !content.code.is_empty() {
                doc.block(format!("notebook {index} code"), content.code.join("\n\n"));
            }
        }
    }

    doc.encode()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Plain text
// ---------------------------------------------------------------------------

fn render_txt(result: &IngestionResult) -> String {
    let mut out = String::new();
    let meta = &result.metadata;

    let _ = writeln!(out, "# Metadata\n");
    let _ = writeln!(out, "title: {}", meta.title);
    let _ = writeln!(out, "url: {}", meta.url);
    let _ = writeln!(out, "source: {}", meta.kind);
    if !meta.description.is_empty() {
        let _ = writeln!(out, "description: {}", meta.description);
    }
    for (key, value) in [
        ("category", &meta.category),
        ("prize", &meta.prize),
        ("evaluation_metric", &meta.evaluation_metric),
        ("deadline", &meta.deadline),
    ] {
        if let Some(v) = value {
            let _ = writeln!(out, "{key}: {v}");
        }
    }

    if !result.schemas.is_empty() {
        let _ = writeln!(out, "\n-----\n\n# Datasets\n");
        for file in &result.schemas {
            let _ = writeln!(out, "File: {}", file.filename);
            let cols: Vec<String> = file
                .columns
                .iter()
                .map(|c| format!("{} ({})", c.name, c.dtype))
                .collect();
            let _ = writeln!(out, "Columns: {}", cols.join(", "));
            if !file.sample_rows.is_empty() {
                let _ = writeln!(out, "Sample Rows:");
                for row in &file.sample_rows {
                    let _ = writeln!(out, "[{}]", row.join(", "));
                }
            }
            out.push('\n');
        }
    }

    let _ = writeln!(out, "\n-----\n");
    for outcome in &result.notebooks {
        match outcome {
            NotebookOutcome::Success {
                index,
                meta,
                content,
            } => {
                let _ = writeln!(out, "# Notebook {index}\n");
                let _ = writeln!(out, "Title: {}", meta.title);
                let _ = writeln!(out, "Author: {}", meta.author);
                let _ = writeln!(out, "Votes: {}\n", meta.votes);

                if !content.markdown.is_empty() {
                    let _ = writeln!(out, "## Markdown");
                    let _ = writeln!(out, "{}\n", content.markdown.join("\n"));
                }
                if !content.code.is_empty() {
                    let _ = writeln!(out, "## Code");
                    let _ = writeln!(out, "{}\n", content.code.join("\n"));
                }
                let _ = writeln!(out, "-----\n");
            }
            NotebookOutcome::Failure(f) => {
                let _ = writeln!(out, "# Notebook (failed)\n");
                let _ = writeln!(out, "Reference: {}", f.reference);
                let _ = writeln!(out, "Reason: {}\n", f.reason);
                let _ = writeln!(out, "-----\n");
            }
        }
    }

    let stats = &result.stats;
    let _ = writeln!(out, "# Statistics\n");
    let _ = writeln!(out, "requested: {}", stats.requested);
    let _ = writeln!(out, "successful: {}", stats.successful);
    let _ = writeln!(out, "failed: {}", stats.failed);
    let _ = writeln!(out, "duration_seconds: {:.2}", stats.duration_seconds);

    out
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

fn md_escape(s: &str) -> String {
    s.replace('\n', " ").replace('|', "\\|")
}

fn md_cell(s: &str) -> String {
    let escaped = md_escape(s);
    if escaped.chars().count() > MD_CELL_LIMIT {
        escaped.chars().take(MD_CELL_LIMIT).collect()
    } else {
        escaped
    }
}

fn render_md(result: &IngestionResult) -> String {
    let mut out = String::new();
    let meta = &result.metadata;

    let _ = writeln!(out, "# {}\n", meta.title);
    let _ = writeln!(out, "| Metadata | Value |\n|---|---|");
    let _ = writeln!(out, "| **url** | {} |", md_escape(&meta.url));
    let _ = writeln!(out, "| **source** | {} |", meta.kind);
    if !meta.description.is_empty() {
        let _ = writeln!(out, "| **description** | {} |", md_escape(&meta.description));
    }
    for (key, value) in [
        ("category", &meta.category),
        ("prize", &meta.prize),
        ("evaluation_metric", &meta.evaluation_metric),
        ("deadline", &meta.deadline),
    ] {
        if let Some(v) = value {
            let _ = writeln!(out, "| **{key}** | {} |", md_escape(v));
        }
    }
    let _ = writeln!(out, "\n---\n");

    if !result.schemas.is_empty() {
        let _ = writeln!(out, "## Dataset Schema\n");
        for file in &result.schemas {
            render_md_schema(&mut out, file);
        }
        let _ = writeln!(out, "---\n");
    }

    let _ = writeln!(out, "## Top Notebooks\n");
    for outcome in &result.notebooks {
        match outcome {
            NotebookOutcome::Success {
                index,
                meta,
                content,
            } => {
                let _ = writeln!(out, "### {index}. {}", meta.title);
                let _ = writeln!(
                    out,
                    "**Author:** {} | **Votes:** {}\n",
                    meta.author, meta.votes
                );

                if !content.markdown.is_empty() {
                    let _ = writeln!(out, "#### Insights\n");
                    let _ = writeln!(out, "{}\n", content.markdown.join("\n\n"));
                }
                if !content.code.is_empty() {
                    let _ = writeln!(out, "#### Code\n");
                    let _ = writeln!(out, "```python\n{}\n```\n", content.code.join("\n\n"));
                }
                let _ = writeln!(out, "---\n");
            }
            NotebookOutcome::Failure(f) => {
                let _ = writeln!(out, "### {} (failed)", f.title);
                let _ = writeln!(out, "`{}`: {}\n", f.reference, md_escape(&f.reason));
                let _ = writeln!(out, "---\n");
            }
        }
    }

    let stats = &result.stats;
    let _ = writeln!(out, "## Statistics\n");
    let _ = writeln!(out, "| Requested | Successful | Failed | Duration (s) |");
    let _ = writeln!(out, "|---|---|---|---|");
    let _ = writeln!(
        out,
        "| {} | {} | {} | {:.2} |",
        stats.requested, stats.successful, stats.failed, stats.duration_seconds
    );

    out
}

fn render_md_schema(out: &mut String, file: &DatasetFileSchema) {
    let _ = writeln!(out, "### File: `{}`", file.filename);
    let cols: Vec<String> = file
        .columns
        .iter()
        .map(|c| format!("`{}` ({})", c.name, c.dtype))
        .collect();
    let _ = writeln!(out, "**Columns:** {}\n", cols.join(", "));

    if !file.sample_rows.is_empty() {
        let names: Vec<String> = file.columns.iter().map(|c| md_cell(&c.name)).collect();
        let _ = writeln!(out, "**Sample Data:**\n");
        let _ = writeln!(out, "| {} |", names.join(" | "));
        let _ = writeln!(out, "| {} |", vec!["---"; names.len()].join(" | "));
        for row in file.sample_rows.iter().take(MD_SAMPLE_ROW_LIMIT) {
            let cells: Vec<String> = row.iter().map(|c| md_cell(c)).collect();
            let _ = writeln!(out, "| {} |", cells.join(" | "));
        }
    }
    out.push('\n');
}
