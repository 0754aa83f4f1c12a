//! Turning backend preview rows into display columns and rendered cells

use super::{PreviewStatus, TablePreview};
use serde_json::Value;
use std::collections::HashMap;

/// Render one cell the way a JavaScript `String(value)` would
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "null".to_string(),
        // numbers, booleans, and compact JSON for arrays and objects
        other => other.to_string(),
    }
}

/// Build a ready preview from raw rows.
///
/// Columns follow the first row's key order; keys first seen in later rows
/// are appended. Rows past `limit` are dropped. Fails on any non-object row.
pub fn build_preview(table: &str, data: Vec<Value>, limit: usize) -> Result<TablePreview, String> {
    let mut columns: Vec<String> = Vec::new();
    let mut rows = Vec::with_capacity(data.len().min(limit));

    for (index, row) in data.into_iter().take(limit).enumerate() {
        let Value::Object(fields) = row else {
            return Err(format!("row {} of table '{}' is not an object", index, table));
        };

        let mut rendered = HashMap::with_capacity(fields.len());
        for (column, value) in fields {
            if !columns.contains(&column) {
                columns.push(column.clone());
            }
            rendered.insert(column, render_value(&value));
        }
        rows.push(rendered);
    }

    Ok(TablePreview {
        table: Some(table.to_string()),
        columns,
        rows,
        status: PreviewStatus::Ready,
        error_message: None,
    })
}
