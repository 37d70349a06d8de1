//! TOON verification decoder.
//!
//! Parses a TOON document back into sections, headers, and row values. Used
//! by tests to prove the encoder round-trips, and by the CLI `toon`
//! subcommand to validate files and convert them to JSON.

use kaggleingest_shared::{IngestError, Result};

use crate::encode::{BLOCK_MARKER, Value};

/// A parsed `name{col,...}` section with its data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSection {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// A parsed prose block.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBlock {
    pub heading: String,
    pub body: String,
}

/// A fully parsed TOON document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    pub sections: Vec<ParsedSection>,
    pub blocks: Vec<ParsedBlock>,
}

impl ParsedDocument {
    /// Find a section by name.
    pub fn section(&self, name: &str) -> Option<&ParsedSection> {
        self.sections.iter().find(|s| s.name == name)
    }
}

/// Parse a TOON document. Lenient: rows wider or narrower than their header
/// are kept as-is (use [`validate`] for strict column checking).
pub fn decode(text: &str) -> Result<ParsedDocument> {
    let mut doc = ParsedDocument::default();
    let mut lines = text.lines().peekable();

    while let Some(line) = lines.next() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(heading) = trimmed.strip_prefix(BLOCK_MARKER) {
            let mut body = String::new();
            while let Some(next) = lines.peek() {
                if next.trim_end().starts_with(BLOCK_MARKER) || parse_header(next.trim_end()).is_some() {
                    break;
                }
                if !body.is_empty() {
                    body.push('\n');
                }
                body.push_str(lines.next().unwrap_or_default());
            }
            doc.blocks.push(ParsedBlock {
                heading: heading.to_string(),
                body: body.trim_end().to_string(),
            });
            continue;
        }

        let Some((name, columns)) = parse_header(trimmed) else {
            return Err(IngestError::parse(format!(
                "expected a section header, got {trimmed:?}"
            )));
        };

        let mut rows = Vec::new();
        while let Some(next) = lines.peek() {
            let row_line = next.trim_end();
            if row_line.is_empty()
                || row_line.starts_with(BLOCK_MARKER)
                || parse_header(row_line).is_some()
            {
                break;
            }
            rows.push(
                split_top_level_commas(row_line)
                    .iter()
                    .map(|tok| parse_value(tok))
                    .collect(),
            );
            lines.next();
        }

        doc.sections.push(ParsedSection {
            name,
            columns,
            rows,
        });
    }

    Ok(doc)
}

/// Strictly validate a TOON document: every data row must have exactly as
/// many columns as its section header declares.
pub fn validate(text: &str) -> Result<()> {
    let doc = decode(text)?;
    for section in &doc.sections {
        for (i, row) in section.rows.iter().enumerate() {
            if row.len() != section.columns.len() {
                return Err(IngestError::parse(format!(
                    "section {:?}: row {} has {} columns, expected {}",
                    section.name,
                    i + 1,
                    row.len(),
                    section.columns.len()
                )));
            }
        }
    }
    Ok(())
}

/// Convert a parsed document to JSON. Single-row sections become objects,
/// multi-row sections become arrays of objects.
pub fn to_json(doc: &ParsedDocument) -> serde_json::Value {
    let mut root = serde_json::Map::new();

    for section in &doc.sections {
        let row_to_obj = |row: &Vec<Value>| {
            let mut obj = serde_json::Map::new();
            for (col, val) in section.columns.iter().zip(row.iter()) {
                obj.insert(col.clone(), value_to_json(val));
            }
            serde_json::Value::Object(obj)
        };

        let json = if section.rows.len() == 1 {
            row_to_obj(&section.rows[0])
        } else {
            serde_json::Value::Array(section.rows.iter().map(row_to_obj).collect())
        };
        root.insert(section.name.clone(), json);
    }

    if !doc.blocks.is_empty() {
        let blocks: Vec<serde_json::Value> = doc
            .blocks
            .iter()
            .map(|b| {
                serde_json::json!({
                    "heading": b.heading,
                    "body": b.body,
                })
            })
            .collect();
        root.insert("blocks".into(), serde_json::Value::Array(blocks));
    }

    serde_json::Value::Object(root)
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Value::from(*f),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
    }
}

// ---------------------------------------------------------------------------
// Token parsing
// ---------------------------------------------------------------------------

/// Parse a `name{col1,col2}` header line. Returns `None` for anything else.
fn parse_header(line: &str) -> Option<(String, Vec<String>)> {
    if !line.ends_with('}') {
        return None;
    }
    let brace = line.find('{')?;
    let name = &line[..brace];
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        || name.starts_with(|c: char| c.is_ascii_digit())
    {
        return None;
    }

    let inner = &line[brace + 1..line.len() - 1];
    if inner.contains(['{', '}']) {
        return None;
    }
    let columns = inner
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    Some((name.to_string(), columns))
}

/// Split a data line by commas, respecting quotes and brackets.
pub(crate) fn split_top_level_commas(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escaped = false;
    let mut current = String::new();

    for ch in text.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => {
                current.push(ch);
                escaped = true;
            }
            '"' => {
                current.push(ch);
                in_quotes = !in_quotes;
            }
            '[' | '{' if !in_quotes => {
                current.push(ch);
                depth += 1;
            }
            ']' | '}' if !in_quotes => {
                current.push(ch);
                depth = depth.saturating_sub(1);
            }
            ',' if !in_quotes && depth == 0 => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(ch),
        }
    }
    parts.push(current.trim().to_string());
    parts
}

/// Parse one TOON token to a value.
pub fn parse_value(token: &str) -> Value {
    let tok = token.trim();
    if tok.is_empty() {
        return Value::Null;
    }

    match tok.to_ascii_lowercase().as_str() {
        "null" | "none" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if tok.len() >= 2 && tok.starts_with('"') && tok.ends_with('"') {
        return Value::Str(tok[1..tok.len() - 1].replace("\\\"", "\""));
    }

    if tok.starts_with('[') && tok.ends_with(']') {
        let inner = tok[1..tok.len() - 1].trim();
        if inner.is_empty() {
            return Value::List(Vec::new());
        }
        return Value::List(
            split_top_level_commas(inner)
                .iter()
                .map(|t| parse_value(t))
                .collect(),
        );
    }

    if let Ok(i) = tok.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = tok.parse::<f64>() {
        if tok.contains('.') {
            return Value::Float(f);
        }
    }

    Value::Str(tok.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::Document;

    #[test]
    fn parses_values() {
        assert_eq!(parse_value("null"), Value::Null);
        assert_eq!(parse_value("true"), Value::Bool(true));
        assert_eq!(parse_value("42"), Value::Int(42));
        assert_eq!(parse_value("-3.5"), Value::Float(-3.5));
        assert_eq!(parse_value("Titanic"), Value::Str("Titanic".into()));
        assert_eq!(
            parse_value("\"a, b\""),
            Value::Str("a, b".into())
        );
        assert_eq!(
            parse_value("[1, 2, three]"),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Str("three".into())])
        );
    }

    #[test]
    fn split_respects_quotes_and_brackets() {
        let parts = split_top_level_commas(r#"1,"EDA, advanced",[a, b],done"#);
        assert_eq!(parts, vec!["1", r#""EDA, advanced""#, "[a, b]", "done"]);
    }

    #[test]
    fn header_detection() {
        assert!(parse_header("metadata{title,url}").is_some());
        assert!(parse_header("plain text line").is_none());
        assert!(parse_header("1bad{a}").is_none());
        assert!(parse_header("Caps{a}").is_none());
    }

    #[test]
    fn round_trip_preserves_sections_headers_and_rows() {
        let mut doc = Document::new();
        doc.key_value(
            "metadata",
            vec![
                ("title".into(), Value::str("Titanic - ML from Disaster")),
                ("url".into(), Value::str("https://www.kaggle.com/c/titanic")),
                ("description".into(), Value::str("Predict survival, given features")),
                ("source".into(), Value::str("competition")),
            ],
        );
        doc.table(
            "notebooks",
            vec!["index".into(), "title".into(), "votes".into()],
            vec![
                vec![Value::Int(1), Value::str("Top EDA"), Value::Int(812)],
                vec![Value::Int(2), Value::str("Stacking [v2]"), Value::Int(455)],
            ],
        );
        doc.block("notebook 1 code", "import pandas as pd\n\ndf = pd.read_csv('train.csv')");

        let text = doc.encode();
        let parsed = decode(&text).expect("decode");

        assert_eq!(parsed.sections.len(), 2);
        let meta = parsed.section("metadata").expect("metadata section");
        assert_eq!(meta.columns, vec!["title", "url", "description", "source"]);
        assert_eq!(meta.rows.len(), 1);
        assert_eq!(
            meta.rows[0][2],
            Value::Str("Predict survival, given features".into())
        );

        let notebooks = parsed.section("notebooks").expect("notebooks section");
        assert_eq!(notebooks.rows.len(), 2);
        assert_eq!(notebooks.rows[1][1], Value::Str("Stacking [v2]".into()));
        assert_eq!(notebooks.rows[1][2], Value::Int(455));

        assert_eq!(parsed.blocks.len(), 1);
        assert_eq!(parsed.blocks[0].heading, "notebook 1 code");
        assert!(parsed.blocks[0].body.contains("read_csv"));
    }

    #[test]
    fn validate_rejects_misaligned_rows() {
        let bad = "notebooks{index,title}\n1,EDA\n2,Stacking,extra\n";
        let err = validate(bad).unwrap_err();
        assert!(err.to_string().contains("expected 2"));

        let good = "notebooks{index,title}\n1,EDA\n2,Stacking\n";
        assert!(validate(good).is_ok());
    }

    #[test]
    fn to_json_shapes() {
        let text = "metadata{title,source}\nTitanic,competition\n\nnotebooks{index,title}\n1,EDA\n2,FE\n";
        let doc = decode(text).expect("decode");
        let json = to_json(&doc);

        assert_eq!(json["metadata"]["title"], "Titanic");
        assert!(json["notebooks"].is_array());
        assert_eq!(json["notebooks"][1]["index"], 2);
    }

    #[test]
    fn empty_document_decodes_empty() {
        let doc = decode("").expect("decode empty");
        assert!(doc.sections.is_empty());
        assert!(doc.blocks.is_empty());
    }
}
