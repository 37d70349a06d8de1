//! TOON (Token-Oriented Object Notation) encoder.
//!
//! TOON is a compact, LLM-friendly text format. A document is a sequence of
//! sections, each introduced by a header line `name{key1,key2,...}` followed
//! by comma-separated data lines, plus optional free-form prose blocks for
//! large multi-line content that must never live inside a tabular row.
//!
//! ```text
//! notebooks{index,title,votes}
//! 1,Titanic EDA,812
//! 2,"Feature engineering, advanced",455
//! ```

use std::fmt::Write as _;

/// Marker prefix for free-form prose blocks.
pub(crate) const BLOCK_MARKER: &str = "--- ";

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single TOON cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Encode one value to its TOON cell representation.
///
/// The output of this function never breaks the row structure: strings that
/// would confuse a naive comma-split are quoted, and embedded newlines are
/// flattened to spaces first (multi-line content belongs in a prose block,
/// not a cell).
pub fn encode_value(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(true) => "true".into(),
        Value::Bool(false) => "false".into(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => {
            if f.is_finite() {
                format!("{f}")
            } else {
                "null".into()
            }
        }
        Value::Str(s) => encode_str(s),
        Value::List(items) => {
            let inner: Vec<String> = items.iter().map(encode_value).collect();
            format!("[{}]", inner.join(", "))
        }
    }
}

fn encode_str(s: &str) -> String {
    // Newlines may not survive inside a cell; flatten before quoting.
    let flat: String = if s.contains('\n') || s.contains('\r') {
        s.replace(['\n', '\r'], " ")
    } else {
        s.to_string()
    };

    let needs_quoting =
        // Numeric-looking strings would decode as numbers.
        flat.starts_with(|c: char| c.is_ascii_digit())
            || (flat.starts_with('-')
                && flat[1..].starts_with(|c: char| c.is_ascii_digit()))
            // Structural characters would confuse the comma/bracket split.
            || flat.contains([',', '[', ']', '{', '}', '"'])
            // Boolean-like strings would decode as keywords.
            || matches!(
                flat.to_ascii_lowercase().as_str(),
                "true" | "false" | "null" | "none"
            )
            || flat.is_empty();

    if needs_quoting {
        format!("\"{}\"", flat.replace('"', "\\\""))
    } else {
        flat
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// One section of a TOON document.
#[derive(Debug, Clone)]
pub enum Section {
    /// Header plus exactly one data line.
    KeyValue {
        name: String,
        fields: Vec<(String, Value)>,
    },
    /// Header plus zero or more data rows.
    Table {
        name: String,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    /// Free-form multi-line prose, emitted outside any tabular structure and
    /// correlated back to a row by its heading (e.g. `notebook 3 code`).
    Block { heading: String, body: String },
}

/// An ordered TOON document under construction.
#[derive(Debug, Clone, Default)]
pub struct Document {
    sections: Vec<Section>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key-value section (one data line).
    pub fn key_value(&mut self, name: impl Into<String>, fields: Vec<(String, Value)>) -> &mut Self {
        self.sections.push(Section::KeyValue {
            name: name.into(),
            fields,
        });
        self
    }

    /// Append a tabular section.
    pub fn table(
        &mut self,
        name: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    ) -> &mut Self {
        self.sections.push(Section::Table {
            name: name.into(),
            columns,
            rows,
        });
        self
    }

    /// Append a prose block.
    pub fn block(&mut self, heading: impl Into<String>, body: impl Into<String>) -> &mut Self {
        self.sections.push(Section::Block {
            heading: heading.into(),
            body: body.into(),
        });
        self
    }

    /// Render the document to its textual form. Deterministic: identical
    /// documents always encode to byte-identical output.
    pub fn encode(&self) -> String {
        let mut out = String::new();

        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            match section {
                Section::KeyValue { name, fields } => {
                    let keys: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
                    let values: Vec<String> =
                        fields.iter().map(|(_, v)| encode_value(v)).collect();
                    let _ = writeln!(out, "{name}{{{}}}", keys.join(","));
                    let _ = writeln!(out, "{}", values.join(","));
                }
                Section::Table {
                    name,
                    columns,
                    rows,
                } => {
                    let _ = writeln!(out, "{name}{{{}}}", columns.join(","));
                    for row in rows {
                        debug_assert_eq!(row.len(), columns.len(), "row width mismatch in {name}");
                        let cells: Vec<String> = row.iter().map(encode_value).collect();
                        let _ = writeln!(out, "{}", cells.join(","));
                    }
                }
                Section::Block { heading, body } => {
                    let _ = writeln!(out, "{BLOCK_MARKER}{heading}");
                    let _ = writeln!(out, "{}", body.trim_end());
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_encode_bare() {
        assert_eq!(encode_value(&Value::Null), "null");
        assert_eq!(encode_value(&Value::Bool(true)), "true");
        assert_eq!(encode_value(&Value::Int(-7)), "-7");
        assert_eq!(encode_value(&Value::Float(1.5)), "1.5");
        assert_eq!(encode_value(&Value::str("Titanic")), "Titanic");
    }

    #[test]
    fn strings_with_structural_chars_are_quoted() {
        assert_eq!(
            encode_value(&Value::str("EDA, feature engineering")),
            "\"EDA, feature engineering\""
        );
        assert_eq!(encode_value(&Value::str("a[0]")), "\"a[0]\"");
        assert_eq!(encode_value(&Value::str("say \"hi\"")), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn ambiguous_strings_are_quoted() {
        assert_eq!(encode_value(&Value::str("42nd street")), "\"42nd street\"");
        assert_eq!(encode_value(&Value::str("-1 result")), "\"-1 result\"");
        assert_eq!(encode_value(&Value::str("true")), "\"true\"");
        assert_eq!(encode_value(&Value::str("")), "\"\"");
    }

    #[test]
    fn newlines_never_reach_a_cell() {
        let encoded = encode_value(&Value::str("line one\nline two"));
        assert!(!encoded.contains('\n'));
    }

    #[test]
    fn lists_encode_bracketed() {
        let v = Value::List(vec![Value::str("PassengerId"), Value::str("Survived")]);
        assert_eq!(encode_value(&v), "[PassengerId, Survived]");

        let nested = Value::List(vec![
            Value::List(vec![Value::Int(1), Value::Int(0)]),
            Value::List(vec![Value::Int(2), Value::Int(1)]),
        ]);
        assert_eq!(encode_value(&nested), "[[1, 0], [2, 1]]");
    }

    #[test]
    fn document_layout() {
        let mut doc = Document::new();
        doc.key_value(
            "metadata",
            vec![
                ("title".into(), Value::str("Titanic")),
                ("url".into(), Value::str("https://www.kaggle.com/c/titanic")),
            ],
        );
        doc.table(
            "notebooks",
            vec!["index".into(), "title".into()],
            vec![
                vec![Value::Int(1), Value::str("EDA")],
                vec![Value::Int(2), Value::str("Ensembles, stacked")],
            ],
        );
        doc.block("notebook 1 code", "import pandas as pd\nprint(df.head())");

        let text = doc.encode();
        let expected = "metadata{title,url}\n\
                        Titanic,https://www.kaggle.com/c/titanic\n\
                        \n\
                        notebooks{index,title}\n\
                        1,EDA\n\
                        2,\"Ensembles, stacked\"\n\
                        \n\
                        --- notebook 1 code\n\
                        import pandas as pd\nprint(df.head())\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn encoding_is_deterministic() {
        let mut doc = Document::new();
        doc.table(
            "statistics",
            vec!["requested".into(), "successful".into()],
            vec![vec![Value::Int(3), Value::Int(2)]],
        );
        assert_eq!(doc.encode(), doc.encode());
    }
}
