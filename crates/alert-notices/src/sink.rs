use std::io::ErrorKind;
use std::path::Path;

use serde_json::Value;

use crate::error::AppError;
use crate::model::ResultStore;

pub const CSV_DELIMITER: u8 = b'|';

/// CSV header labels; every label except `ID` is also the record field read
/// for that column.
pub const CSV_COLUMNS: [&str; 9] = [
    "ID",
    "Title",
    "Principal Investigator",
    "Abstract",
    "Justification",
    "Target Object",
    "Start Date",
    "End Date",
    "Status",
];

/// Rewrite the whole store at `path` through a sibling temp file and rename,
/// so readers only ever see a complete document.
pub async fn write_json(store: &ResultStore, path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(store)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, &json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// `None` when nothing has been written at `path` yet.
pub async fn load_store(path: &Path) -> Result<Option<ResultStore>, AppError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&raw)?))
}

/// Flatten a persisted result file into a pipe-delimited CSV. Returns the
/// number of data rows written.
pub async fn project_to_csv(json_path: &Path, csv_path: &Path) -> Result<usize, AppError> {
    let raw = tokio::fs::read(json_path).await?;
    let document: Value = serde_json::from_slice(&raw)?;
    let rows = document.as_object().map_or(0, |entries| entries.len());
    if let Some(parent) = csv_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(csv_path, render_csv(&document)?).await?;
    Ok(rows)
}

/// Header plus one row per entry, ordered by numeric id where ids parse.
/// Missing fields, error markers and non-object records give empty cells.
/// Cells holding the delimiter, a quote or a line break are quoted.
pub fn render_csv(document: &Value) -> Result<String, AppError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(CSV_DELIMITER)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(CSV_COLUMNS)?;

    if let Some(entries) = document.as_object() {
        let mut ids: Vec<&String> = entries.keys().collect();
        ids.sort_by(|a, b| numeric_id(a).cmp(&numeric_id(b)).then_with(|| a.cmp(b)));

        for id in ids {
            let record = entries[id.as_str()].as_object();
            let cells = CSV_COLUMNS[1..].iter().map(|field| {
                record
                    .and_then(|fields| fields.get(*field))
                    .map(cell_text)
                    .unwrap_or_default()
            });
            writer.write_record(std::iter::once(id.clone()).chain(cells))?;
        }
    }

    let bytes = writer.into_inner().map_err(|e| AppError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn numeric_id(id: &str) -> u64 {
    id.parse().unwrap_or(u64::MAX)
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(cell_text).collect::<Vec<_>>().join("; "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::ExtractedRecord;

    fn rendered(document: &Value) -> String {
        render_csv(document).unwrap()
    }

    const HEADER: &str =
        "ID|Title|Principal Investigator|Abstract|Justification|Target Object|Start Date|End Date|Status";

    #[test]
    fn missing_fields_become_empty_cells() {
        let csv = rendered(&json!({"601": {"Title": "X", "Status": "Active"}}));
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec![HEADER, "601|X|||||||Active"]);
    }

    #[test]
    fn error_markers_and_odd_records_render_blank() {
        let csv = rendered(&json!({
            "602": {"error": "Failed to extract information"},
            "603": "not an object",
            "604": {}
        }));
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[1], "602||||||||");
        assert_eq!(lines[2], "603||||||||");
        assert_eq!(lines[3], "604||||||||");
    }

    #[test]
    fn rows_follow_numeric_id_order() {
        let csv = rendered(&json!({"1000": {}, "99": {}, "600": {}}));
        let ids: Vec<&str> = csv
            .lines()
            .skip(1)
            .map(|l| l.split('|').next().unwrap())
            .collect();
        assert_eq!(ids, vec!["99", "600", "1000"]);
    }

    #[test]
    fn quotes_cells_with_delimiters_and_newlines() {
        let csv = rendered(&json!({
            "7": {"Title": "A | B", "Abstract": "line one\nline \"two\"", "Target Object": ["SS Cyg", "U Gem"]}
        }));
        let row = csv.split_once('\n').unwrap().1;
        assert_eq!(
            row,
            "7|\"A | B\"||\"line one\nline \"\"two\"\"\"||SS Cyg; U Gem|||\n"
        );
    }

    #[test]
    fn non_string_scalars_render_as_json_text() {
        let csv = rendered(&json!({"8": {"Title": 42, "Status": null, "Abstract": false}}));
        assert_eq!(csv.lines().nth(1), Some("8|42||false|||||"));
    }

    #[test]
    fn non_object_document_yields_header_only() {
        assert_eq!(rendered(&json!([1, 2])), format!("{HEADER}\n"));
    }

    #[tokio::test]
    async fn write_then_load_round_trips_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("results.json");
        let store: ResultStore = [(601, ExtractedRecord::failed())].into_iter().collect();

        write_json(&store, &path).await.unwrap();

        assert_eq!(load_store(&path).await.unwrap(), Some(store));
        assert!(!dir.path().join("nested").join("results.json.tmp").exists());
    }

    #[tokio::test]
    async fn load_tolerates_non_object_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        tokio::fs::write(&path, r#"{"601": "junk", "602": {"Title": "A"}}"#)
            .await
            .unwrap();

        let store = load_store(&path).await.unwrap().unwrap();

        assert_eq!(store.error_count(), 1);
        assert_eq!(store.pending(601..603), vec![601]);
    }

    #[tokio::test]
    async fn load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_store(&dir.path().join("absent.json")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn projects_persisted_file() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("data.json");
        let csv_path = dir.path().join("out").join("campaigns.csv");
        tokio::fs::write(&json_path, r#"{"601": {"Title": "X", "Status": "Active"}}"#)
            .await
            .unwrap();

        let rows = project_to_csv(&json_path, &csv_path).await.unwrap();

        assert_eq!(rows, 1);
        let csv = tokio::fs::read_to_string(&csv_path).await.unwrap();
        assert_eq!(csv, format!("{HEADER}\n601|X|||||||Active\n"));
    }
}
