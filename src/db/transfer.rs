//! 导出 / 导入子模块
//!
//! ## 职责
//! - 将全部条目写为 JSON 数组（字段同 `ClipItem` 记录格式）
//! - 从 JSON 数组导入条目，单条无效时跳过
//!
//! ## 错误语义
//! - 文件不可读写、顶层不是数组：返回错误，数据库不变
//! - 单条记录无效（缺内容、类型未知、时间戳非法）：记录告警，计入 `skipped`

use std::fs;
use std::path::Path;

use rusqlite::Connection;
use serde_json::Value;

use crate::error::AppError;
use crate::model::ClipItem;
use crate::paths::write_atomic;

use super::history::add_item;
use super::ImportReport;

pub(super) fn write_records(destination: &Path, items: &[ClipItem]) -> Result<usize, AppError> {
    let records = items
        .iter()
        .map(ClipItem::to_record)
        .collect::<Result<Vec<_>, _>>()?;
    let json = serde_json::to_vec_pretty(&records)?;
    write_atomic(destination, &json)?;
    log::info!("📤 已导出 {} 条历史到 {}", records.len(), destination.display());
    Ok(records.len())
}

pub(super) fn read_records(source: &Path) -> Result<Vec<Value>, AppError> {
    let raw = fs::read(source)?;
    let parsed: Value = serde_json::from_slice(&raw)?;
    match parsed {
        Value::Array(records) => Ok(records),
        _ => Err(AppError::Storage(format!(
            "导入文件格式错误，应为记录数组: {}",
            source.display()
        ))),
    }
}

fn record_to_item(record: Value) -> Result<ClipItem, AppError> {
    let has_content = record
        .get("content")
        .and_then(Value::as_str)
        .is_some_and(|content| !content.trim().is_empty());
    if !has_content {
        return Err(AppError::Storage("记录缺少内容".to_string()));
    }
    ClipItem::from_record(record)
}

pub(super) fn import_records(conn: &Connection, records: Vec<Value>) -> Result<ImportReport, AppError> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| AppError::Database(format!("开启事务失败: {}", e)))?;

    let mut report = ImportReport::default();
    for (index, record) in records.into_iter().enumerate() {
        match record_to_item(record).and_then(|item| add_item(&tx, &item)) {
            Ok(true) => report.imported += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                log::warn!("⚠️ 跳过第 {} 条导入记录: {}", index + 1, e);
                report.skipped += 1;
            }
        }
    }

    tx.commit()
        .map_err(|e| AppError::Database(format!("提交导入事务失败: {}", e)))?;

    log::info!("📥 导入完成: 成功 {} 条，跳过 {} 条", report.imported, report.skipped);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::db::history::{count_items, get_item, load_all};

    fn setup_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        super::super::schema::initialize_schema(&conn).expect("init schema");
        conn
    }

    #[test]
    fn export_then_import_into_empty_store_restores_items() {
        let source = setup_conn();
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).single().expect("valid time");
        let fav = ClipItem::new("favorite", ts).with_favorite(true).with_tags(vec!["t".to_string()]);
        let long = ClipItem::new("x".repeat(5000), ts);
        add_item(&source, &fav).expect("add fav");
        add_item(&source, &long).expect("add long");

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("export.json");
        let written = write_records(&path, &load_all(&source).expect("load all")).expect("export");
        assert_eq!(written, 2);
        assert!(!path.with_extension("tmp").exists());

        let target = setup_conn();
        let report = import_records(&target, read_records(&path).expect("read")).expect("import");
        assert_eq!(report, ImportReport { imported: 2, skipped: 0 });

        let restored = get_item(&target, &fav.content_hash).expect("get").expect("present");
        assert_eq!(restored, fav);
        let restored_long = get_item(&target, &long.content_hash).expect("get").expect("present");
        assert_eq!(restored_long.content.len(), 5000);
    }

    #[test]
    fn invalid_records_are_skipped() {
        let conn = setup_conn();
        let records = vec![
            json!({"content": "ok", "timestamp": "2024-01-01T00:00:00Z"}),
            json!({"timestamp": "2024-01-01T00:00:00Z"}),
            json!({"content": "bad kind", "timestamp": "2024-01-01T00:00:00Z", "content_type": "video"}),
            json!({"content": "bad time", "timestamp": "not a time"}),
            json!("not an object"),
        ];
        let report = import_records(&conn, records).expect("import");
        assert_eq!(report, ImportReport { imported: 1, skipped: 4 });
        assert_eq!(count_items(&conn).expect("count"), 1);
    }

    #[test]
    fn importing_existing_content_does_not_duplicate() {
        let conn = setup_conn();
        let record = json!({"content": "dup", "timestamp": "2024-01-01T00:00:00Z"});
        import_records(&conn, vec![record.clone(), record]).expect("import");
        assert_eq!(count_items(&conn).expect("count"), 1);
    }

    #[test]
    fn non_array_file_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("bad.json");
        fs::write(&path, br#"{"content": "x"}"#).expect("write file");
        assert!(read_records(&path).is_err());
        assert!(read_records(&dir.path().join("missing.json")).is_err());
    }
}
