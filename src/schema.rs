use crate::error::{FieldIssue, StoreError, StoreResult};
use crate::record::{get_path, Record};
use chrono::Datelike;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
    List,
}

impl FieldKind {
    /// Kind guessed from a flattened column name, used for columns no schema declares.
    pub fn infer(column: &str) -> FieldKind {
        let c = column.to_ascii_lowercase();
        if c.contains("is_") || c.contains("_available") {
            FieldKind::Boolean
        } else if c.contains("year")
            || c.contains("capacity")
            || c.contains("semester")
            || c.contains("num_")
        {
            FieldKind::Integer
        } else {
            FieldKind::Text
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Email,
    Phone,
    Url,
    PostalCode,
}

impl Format {
    fn regex(self) -> &'static Regex {
        static EMAIL: OnceLock<Regex> = OnceLock::new();
        static PHONE: OnceLock<Regex> = OnceLock::new();
        static URL: OnceLock<Regex> = OnceLock::new();
        static POSTAL: OnceLock<Regex> = OnceLock::new();
        let (cell, pattern) = match self {
            Format::Email => (&EMAIL, r"^[^\s@]+@[^\s@]+\.[^\s@]+$"),
            Format::Phone => (&PHONE, r"^\+?[0-9][0-9\s\-()]{6,19}$"),
            Format::Url => (&URL, r"^https?://[^\s/$.?#][^\s]*$"),
            Format::PostalCode => (&POSTAL, r"^[A-Za-z0-9][A-Za-z0-9\s\-]{2,9}$"),
        };
        cell.get_or_init(|| Regex::new(pattern).expect("static pattern"))
    }

    pub fn accepts(self, value: &str) -> bool {
        self.regex().is_match(value.trim())
    }

    pub fn label(self) -> &'static str {
        match self {
            Format::Email => "email",
            Format::Phone => "phone number",
            Format::Url => "URL",
            Format::PostalCode => "postal code",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Empty,
    Zero,
    False,
    True,
    EmptyList,
    CurrentYear,
    Now,
}

impl DefaultValue {
    pub fn for_kind(kind: FieldKind) -> DefaultValue {
        match kind {
            FieldKind::Text => DefaultValue::Empty,
            FieldKind::Integer => DefaultValue::Zero,
            FieldKind::Boolean => DefaultValue::False,
            FieldKind::List => DefaultValue::EmptyList,
        }
    }

    pub fn value(self) -> Value {
        match self {
            DefaultValue::Empty => Value::String(String::new()),
            DefaultValue::Zero => Value::from(0),
            DefaultValue::False => Value::Bool(false),
            DefaultValue::True => Value::Bool(true),
            DefaultValue::EmptyList => Value::Array(Vec::new()),
            DefaultValue::CurrentYear => Value::from(chrono::Utc::now().year()),
            DefaultValue::Now => Value::String(crate::record::now_iso()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Dotted path into the nested record (`contact_info.email`).
    pub path: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub format: Option<Format>,
    pub default: DefaultValue,
}

impl FieldSpec {
    pub fn new(path: &'static str, kind: FieldKind) -> Self {
        Self {
            path,
            kind,
            required: false,
            format: None,
            default: DefaultValue::for_kind(kind),
        }
    }

    pub fn text(path: &'static str) -> Self {
        Self::new(path, FieldKind::Text)
    }

    /// Kind inferred from the name, the same way unknown import columns are treated.
    pub fn auto(path: &'static str) -> Self {
        Self::new(path, FieldKind::infer(path))
    }

    pub fn list(path: &'static str) -> Self {
        Self::new(path, FieldKind::List)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn default_to(mut self, default: DefaultValue) -> Self {
        self.default = default;
        self
    }

    /// Flattened column name: dots become underscores.
    pub fn column(&self) -> String {
        self.path.replace('.', "_")
    }
}

/// Numeric id scheme: fixed prefix plus a zero-padded counter.
#[derive(Debug, Clone)]
pub struct IdScheme {
    pub prefix: &'static str,
    pub width: usize,
    pub floor: u64,
}

impl IdScheme {
    pub fn format(&self, n: u64) -> String {
        format!("{}{:0width$}", self.prefix, n, width = self.width)
    }

    pub fn numeric_part(&self, id: &str) -> Option<u64> {
        let rest = id.trim().strip_prefix(self.prefix)?;
        if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        rest.parse().ok()
    }

    /// `max(existing) + 1`, or the floor for an empty collection. Fails once the
    /// counter cannot grow any further.
    pub fn next<'a>(&self, existing: impl IntoIterator<Item = &'a str>) -> StoreResult<String> {
        let max = existing
            .into_iter()
            .filter_map(|id| self.numeric_part(id))
            .max();
        match max {
            None => Ok(self.format(self.floor)),
            Some(m) => m.checked_add(1).map(|n| self.format(n)).ok_or_else(|| {
                StoreError::Validation {
                    issues: vec![FieldIssue::new(
                        "id",
                        format!("no ids left after {}", self.format(m)),
                    )],
                }
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    pub name: &'static str,
    /// Backing file, e.g. `entity.json`.
    pub resource: &'static str,
    pub write_endpoint: &'static str,
    pub id_field: &'static str,
    pub ids: IdScheme,
    /// Field holding the display name; reported in import errors.
    pub name_field: &'static str,
    pub groups: Vec<&'static str>,
    pub fields: Vec<FieldSpec>,
    /// Checked on create in this order, after the primary id.
    pub unique: Vec<&'static str>,
    /// Secondary identity check used by the import merger.
    pub identity: Vec<&'static str>,
    pub aliases: Vec<(&'static str, &'static str)>,
}

impl Schema {
    pub fn field_by_column(&self, column: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.column() == column)
    }

    pub fn columns(&self) -> Vec<String> {
        self.fields.iter().map(FieldSpec::column).collect()
    }

    /// Maps a flattened column to its nested path, using the declared groups for
    /// columns that are not fields.
    pub fn path_for_column(&self, column: &str) -> String {
        if let Some(f) = self.field_by_column(column) {
            return f.path.to_string();
        }
        for g in &self.groups {
            if let Some(rest) = column.strip_prefix(g).and_then(|r| r.strip_prefix('_')) {
                if !rest.is_empty() {
                    return format!("{}.{}", g, rest);
                }
            }
        }
        column.to_string()
    }

    pub fn kind_for_column(&self, column: &str) -> FieldKind {
        self.field_by_column(column)
            .map(|f| f.kind)
            .unwrap_or_else(|| FieldKind::infer(column))
    }

    /// Every violated required/format check, in field order.
    pub fn validate(&self, record: &Record) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        for f in &self.fields {
            let value = get_path(record, f.path);
            let text = value.and_then(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
            let present = match (f.kind, value) {
                (FieldKind::List, Some(Value::Array(a))) => !a.is_empty(),
                (_, Some(Value::Bool(_))) => true,
                _ => text.as_deref().map(|s| !s.is_empty()).unwrap_or(false),
            };
            if f.required && !present {
                issues.push(FieldIssue::new(f.path, "is required"));
                continue;
            }
            if let (Some(format), Some(t)) = (f.format, text.as_deref()) {
                if !t.is_empty() && !format.accepts(t) {
                    issues.push(FieldIssue::new(
                        f.path,
                        format!("is not a valid {}", format.label()),
                    ));
                }
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use serde_json::json;

    #[test]
    fn infer_kind_from_column_names() {
        assert_eq!(FieldKind::infer("is_active"), FieldKind::Boolean);
        assert_eq!(FieldKind::infer("is_available_for_guidance"), FieldKind::Boolean);
        assert_eq!(FieldKind::infer("lab_available"), FieldKind::Boolean);
        assert_eq!(FieldKind::infer("academic_info_established_year"), FieldKind::Integer);
        assert_eq!(FieldKind::infer("intake_capacity"), FieldKind::Integer);
        assert_eq!(FieldKind::infer("num_sections"), FieldKind::Integer);
        assert_eq!(FieldKind::infer("name"), FieldKind::Text);
    }

    #[test]
    fn id_scheme_skips_foreign_ids_and_pads() {
        let s = IdScheme {
            prefix: "INST",
            width: 4,
            floor: 1001,
        };
        assert_eq!(s.next(Vec::<&str>::new()).unwrap(), "INST1001");
        assert_eq!(
            s.next(["INST1001", "INST1009", "OTHER77", "INSTx"]).unwrap(),
            "INST1010"
        );
        assert_eq!(s.next(["INST0005"]).unwrap(), "INST0006");
    }

    #[test]
    fn id_scheme_reports_an_exhausted_counter() {
        let s = IdScheme {
            prefix: "INST",
            width: 4,
            floor: 1001,
        };
        let top = format!("INST{}", u64::MAX);
        let e = s.next([top.as_str(), "INST1001"]).unwrap_err();
        assert_eq!(e.code(), "validation_failed");
        assert!(e.to_string().contains("no ids left"), "{e}");
    }

    #[test]
    fn validate_reports_every_failure() {
        let schema = catalog::entities();
        let rec = json!({
            "name": "",
            "code": "ABC",
            "contact_info": { "email": "not-an-email", "phone": "12", "website": "ftp://x" }
        });
        let issues = schema.validate(rec.as_object().unwrap());
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert!(fields.contains(&"name"));
        assert!(fields.contains(&"type"));
        assert!(fields.contains(&"contact_info.email"));
        assert!(fields.contains(&"contact_info.phone"));
        assert!(fields.contains(&"contact_info.website"));
    }

    #[test]
    fn group_columns_resolve_to_nested_paths() {
        let schema = catalog::entities();
        assert_eq!(schema.path_for_column("contact_info_email"), "contact_info.email");
        assert_eq!(schema.path_for_column("contact_info_fax"), "contact_info.fax");
        assert_eq!(schema.path_for_column("motto"), "motto");
    }
}
