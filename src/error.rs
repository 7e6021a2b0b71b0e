use serde_json::{json, Value};

/// One failed check on one field. `field` is the dotted path (`contact_info.email`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub problem: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: problem.into(),
        }
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{} {}", i.field, i.problem))
        .collect::<Vec<_>>()
        .join("; ")
}

fn row_label(row: &usize, name: &Option<String>) -> String {
    match name {
        Some(n) => format!("row {} ({})", row, n),
        None => format!("row {}", row),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("validation failed: {}", join_issues(.issues))]
    Validation { issues: Vec<FieldIssue> },

    #[error("duplicate {field}: {value} already exists")]
    Duplicate { field: String, value: String },

    #[error("record not found: {id}")]
    NotFound { id: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("import failed at {}: {source}", row_label(.row, .name))]
    Import {
        row: usize,
        name: Option<String>,
        #[source]
        source: Box<StoreError>,
    },

    #[error("remote error: {0}")]
    Remote(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn parse(message: impl Into<String>) -> Self {
        StoreError::Parse(message.into())
    }

    /// Stable code used in IPC error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Validation { .. } => "validation_failed",
            StoreError::Duplicate { .. } => "duplicate",
            StoreError::NotFound { .. } => "not_found",
            StoreError::Parse(_) => "parse_failed",
            StoreError::Import { .. } => "import_failed",
            StoreError::Remote(_) => "remote_failed",
            StoreError::Io(_) => "io_failed",
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            StoreError::Validation { issues } => Some(json!({
                "fields": issues
                    .iter()
                    .map(|i| json!({ "field": i.field, "problem": i.problem }))
                    .collect::<Vec<_>>()
            })),
            StoreError::Duplicate { field, value } => {
                Some(json!({ "field": field, "value": value }))
            }
            StoreError::NotFound { id } => Some(json!({ "id": id })),
            StoreError::Import { row, name, source } => Some(json!({
                "row": row,
                "name": name,
                "cause": source.code(),
                "causeDetails": source.details(),
            })),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_field() {
        let e = StoreError::Validation {
            issues: vec![
                FieldIssue::new("name", "is required"),
                FieldIssue::new("contact_info.email", "is not a valid email"),
            ],
        };
        let msg = e.to_string();
        assert!(msg.contains("name is required"), "{msg}");
        assert!(msg.contains("contact_info.email is not a valid email"), "{msg}");
        assert_eq!(e.code(), "validation_failed");
        assert_eq!(e.details().unwrap()["fields"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn import_error_carries_row_and_name() {
        let e = StoreError::Import {
            row: 3,
            name: Some("North Campus".to_string()),
            source: Box::new(StoreError::Validation {
                issues: vec![FieldIssue::new("code", "is required")],
            }),
        };
        assert!(e.to_string().starts_with("import failed at row 3 (North Campus)"));
        let d = e.details().unwrap();
        assert_eq!(d["row"], 3);
        assert_eq!(d["cause"], "validation_failed");
    }
}
