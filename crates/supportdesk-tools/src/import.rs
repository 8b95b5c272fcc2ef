use std::path::{Path, PathBuf};

use rusqlite::{params_from_iter, Connection};
use tracing::info;

use supportdesk_core::error::{Result, SupportError};

/// Summary of one CSV import.
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub db_path: PathBuf,
    pub table: String,
    pub columns: Vec<String>,
    pub rows: usize,
}

/// Load a CSV file into `<db_dir>/<db_name>.db` as table `table`.
///
/// The table is dropped and recreated with one TEXT column per header and all
/// rows are inserted in a single transaction. Short rows are padded with NULL.
pub fn import_csv(csv_path: &Path, db_dir: &Path, db_name: &str, table: &str) -> Result<ImportReport> {
    if db_name.is_empty() || db_name.contains(['/', '\\']) {
        return Err(SupportError::InvalidInput(format!(
            "invalid database name: '{}'",
            db_name
        )));
    }
    if table.trim().is_empty() {
        return Err(SupportError::InvalidInput("table name is empty".into()));
    }

    let text = std::fs::read_to_string(csv_path).map_err(|e| {
        SupportError::NotFound(format!("CSV file {}: {}", csv_path.display(), e))
    })?;
    let mut records = parse_csv(&text)?.into_iter();
    let columns = records
        .next()
        .ok_or_else(|| SupportError::InvalidInput("CSV file has no header row".into()))?;
    if columns.iter().all(|c| c.trim().is_empty()) {
        return Err(SupportError::InvalidInput("CSV header is empty".into()));
    }

    std::fs::create_dir_all(db_dir)?;
    let db_name = db_name.strip_suffix(".db").unwrap_or(db_name);
    let db_path = db_dir.join(format!("{}.db", db_name));

    let mut conn = Connection::open(&db_path).map_err(|e| SupportError::Database(e.to_string()))?;
    let tx = conn
        .transaction()
        .map_err(|e| SupportError::Database(e.to_string()))?;

    let table_ident = quote_ident(table);
    let column_defs: Vec<String> = columns
        .iter()
        .map(|c| format!("{} TEXT", quote_ident(c)))
        .collect();
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {t}; CREATE TABLE {t} ({cols});",
        t = table_ident,
        cols = column_defs.join(", ")
    ))
    .map_err(|e| SupportError::Database(e.to_string()))?;

    let placeholders = vec!["?"; columns.len()].join(", ");
    let mut rows = 0;
    {
        let mut stmt = tx
            .prepare(&format!("INSERT INTO {} VALUES ({})", table_ident, placeholders))
            .map_err(|e| SupportError::Database(e.to_string()))?;
        for (line, record) in records.enumerate() {
            if record.len() > columns.len() {
                return Err(SupportError::InvalidInput(format!(
                    "row {} has {} fields, header has {}",
                    line + 2,
                    record.len(),
                    columns.len()
                )));
            }
            let values = (0..columns.len()).map(|i| record.get(i).cloned());
            stmt.execute(params_from_iter(values))
                .map_err(|e| SupportError::Database(e.to_string()))?;
            rows += 1;
        }
    }
    tx.commit()
        .map_err(|e| SupportError::Database(e.to_string()))?;

    info!(db = %db_path.display(), table, rows, "CSV imported");
    Ok(ImportReport {
        db_path,
        table: table.to_string(),
        columns,
        rows,
    })
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Split CSV text into records. Handles quoted fields with commas,
/// doubled quotes and embedded newlines. Blank lines are skipped.
fn parse_csv(text: &str) -> Result<Vec<Vec<String>>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                if !(record.len() == 1 && record[0].is_empty()) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            _ => field.push(c),
        }
    }
    if in_quotes {
        return Err(SupportError::InvalidInput(
            "CSV ends inside a quoted field".into(),
        ));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}
