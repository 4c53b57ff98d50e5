//! Delimited text import: parsing, column typing and column to field matching

use crate::models::{text_to_adf, AdfDocument, FieldMetadata, FieldShape, ImportConfig};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportValueType {
    Number,
    Boolean,
    RichText,
    String,
    Unknown,
}

/// Infers the type of a single cell value
pub fn interpret_value_type(value: &str) -> ImportValueType {
    if value.parse::<f64>().map(f64::is_finite).unwrap_or(false) {
        return ImportValueType::Number;
    }
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
        return ImportValueType::Boolean;
    }
    match serde_json::from_str::<serde_json::Value>(value) {
        Ok(serde_json::Value::Array(_)) => {
            warn!("Cell value {:?} is an array, which is not supported", value);
            ImportValueType::Unknown
        }
        Ok(parsed @ serde_json::Value::Object(_)) => {
            if AdfDocument::is_adf_value(&parsed) {
                ImportValueType::RichText
            } else {
                warn!("Cell value {:?} is an object but not a document", value);
                ImportValueType::Unknown
            }
        }
        _ => ImportValueType::String,
    }
}

fn merge_types(previous: Option<ImportValueType>, next: ImportValueType) -> ImportValueType {
    match previous {
        None | Some(ImportValueType::Unknown) => next,
        Some(prev) if prev == next => prev,
        Some(_) => ImportValueType::String,
    }
}

/// 1-based physical line of the record starting at byte `offset`.
///
/// The reader reports the offset before the blank lines it skipped, so those
/// are stepped over first.
fn line_at(content: &str, offset: u64) -> u64 {
    let bytes = content.as_bytes();
    let mut start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
    while start < bytes.len() && matches!(bytes[start], b'\n' | b'\r') {
        start += 1;
    }
    bytes[..start].iter().filter(|b| **b == b'\n').count() as u64 + 1
}

/// Parsed file: header plus the body rows that matched the header width
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportTable {
    pub file_name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// 1-based line numbers of rows that were skipped
    pub skipped_rows: Vec<u64>,
    pub column_types: Vec<ImportValueType>,
}

impl ImportTable {
    pub fn parse(file_name: &str, content: &str, config: &ImportConfig) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(config.delimiter as u8)
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let mut header: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        let mut skipped_rows = Vec::new();
        let mut column_types: Vec<Option<ImportValueType>> = Vec::new();

        for record in reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    let line = e
                        .position()
                        .map(|p| line_at(content, p.byte()))
                        .unwrap_or_default();
                    warn!("Skipping unreadable line {}: {}", line, e);
                    skipped_rows.push(line);
                    continue;
                }
            };
            let line = record
                .position()
                .map(|p| line_at(content, p.byte()))
                .unwrap_or_default();

            if record.iter().all(str::is_empty) {
                continue;
            }

            let cells: Vec<String> = record.iter().map(str::to_string).collect();
            let Some(columns) = header.as_ref() else {
                column_types = vec![None; cells.len()];
                header = Some(cells);
                continue;
            };

            if cells.len() != columns.len() {
                warn!(
                    "Line {} has {} columns, expected {}; skipping",
                    line,
                    cells.len(),
                    columns.len()
                );
                skipped_rows.push(line);
                continue;
            }

            for (index, cell) in cells.iter().enumerate() {
                if !cell.is_empty() {
                    column_types[index] = Some(merge_types(column_types[index], interpret_value_type(cell)));
                }
            }
            rows.push(cells);

            if rows.len() >= config.max_issues {
                warn!("Reached the limit of {} issues, ignoring the rest of the file", config.max_issues);
                break;
            }
        }

        let header = header.ok_or_else(|| Error::InvalidData(format!("{} has no header line", file_name)))?;
        debug!(
            "Parsed {}: {} columns, {} rows, {} skipped",
            file_name,
            header.len(),
            rows.len(),
            skipped_rows.len()
        );

        Ok(Self {
            file_name: file_name.to_string(),
            header,
            rows,
            skipped_rows,
            column_types: column_types
                .into_iter()
                .map(|t| t.unwrap_or(ImportValueType::Unknown))
                .collect(),
        })
    }

    pub fn issue_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, column_name: &str) -> Option<usize> {
        self.header.iter().position(|c| c == column_name)
    }

    pub fn column_type(&self, column_name: &str) -> Option<ImportValueType> {
        self.column_index(column_name)
            .and_then(|i| self.column_types.get(i).copied())
    }

    /// Field values of one body row keyed by field key; unconvertible cells are skipped
    pub fn field_values_for_row(
        &self,
        row_index: usize,
        matcher: &ColumnMatcher,
    ) -> Result<serde_json::Map<String, serde_json::Value>> {
        let row = self
            .rows
            .get(row_index)
            .ok_or_else(|| Error::InvalidData(format!("Row {} is out of range", row_index)))?;

        let mut values = serde_json::Map::new();
        for column_match in matcher.matches() {
            let Some(cell) = self
                .column_index(&column_match.column_name)
                .and_then(|i| row.get(i))
            else {
                continue;
            };
            if cell.is_empty() {
                continue;
            }
            match convert_cell(cell, &column_match.field) {
                Some(value) => {
                    values.insert(column_match.field.key.clone(), value);
                }
                None => warn!(
                    "Row {}: value {:?} cannot be used for field {}",
                    row_index, cell, column_match.field.name
                ),
            }
        }
        Ok(values)
    }
}

fn convert_cell(cell: &str, field: &FieldMetadata) -> Option<serde_json::Value> {
    use serde_json::{json, Value};

    match field.shape() {
        FieldShape::Number => cell.parse::<f64>().ok().map(|n| json!(n)),
        FieldShape::SingleOption => Some(json!({ "value": cell })),
        FieldShape::MultiOption => Some(Value::Array(
            cell.split(';')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| json!({ "value": v }))
                .collect(),
        )),
        FieldShape::PlainText => Some(Value::String(cell.to_string())),
        FieldShape::RichText => match serde_json::from_str::<Value>(cell) {
            Ok(doc) if AdfDocument::is_adf_value(&doc) => Some(doc),
            _ => serde_json::to_value(text_to_adf(cell)).ok(),
        },
        FieldShape::Unsupported(_) => None,
    }
}

/// Column assigned to a target field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMatch {
    pub column_name: String,
    pub field: FieldMetadata,
    pub user_selected: bool,
}

/// Column to field assignments keyed by field key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMatcher {
    field_keys_to_matches: BTreeMap<String, ColumnMatch>,
}

impl ColumnMatcher {
    /// Matches columns to fields by case-insensitive name or key
    pub fn auto_match(columns: &[String], fields: &[FieldMetadata]) -> Self {
        let mut matcher = Self::default();
        for field in fields {
            let found = columns.iter().find(|column| {
                let column = column.trim();
                !column.is_empty()
                    && (column.eq_ignore_ascii_case(&field.name) || column.eq_ignore_ascii_case(&field.key))
            });
            if let Some(column) = found {
                matcher.field_keys_to_matches.insert(
                    field.key.clone(),
                    ColumnMatch {
                        column_name: column.clone(),
                        field: field.clone(),
                        user_selected: false,
                    },
                );
            }
        }
        matcher
    }

    /// Records an explicit user choice, replacing any automatic match
    pub fn select_column(&mut self, field: &FieldMetadata, column_name: &str) {
        self.field_keys_to_matches.insert(
            field.key.clone(),
            ColumnMatch {
                column_name: column_name.to_string(),
                field: field.clone(),
                user_selected: true,
            },
        );
    }

    pub fn clear_field(&mut self, field_key: &str) -> Option<ColumnMatch> {
        self.field_keys_to_matches.remove(field_key)
    }

    pub fn match_for_field(&self, field_key: &str) -> Option<&ColumnMatch> {
        self.field_keys_to_matches.get(field_key)
    }

    pub fn match_for_column(&self, column_name: &str) -> Option<&ColumnMatch> {
        self.field_keys_to_matches
            .values()
            .find(|m| m.column_name == column_name)
    }

    pub fn matches(&self) -> impl Iterator<Item = &ColumnMatch> {
        self.field_keys_to_matches.values()
    }

    /// True when every required field without a server default has a column
    pub fn all_mandatory_fields_have_column_mappings(&self, fields: &[FieldMetadata]) -> bool {
        fields
            .iter()
            .filter(|f| f.needs_user_default())
            .all(|f| self.field_keys_to_matches.contains_key(&f.key))
    }
}
