//! 保留策略子模块
//!
//! ## 职责
//! - 按保留天数删除过期条目
//! - 按数量上限淘汰最旧条目
//!
//! 两种策略都只作用于非收藏条目。

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::AppError;

use super::codec::to_nanos;

pub(super) fn delete_expired_before(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize, AppError> {
    let deleted = conn
        .execute(
            "DELETE FROM history WHERE timestamp < ?1 AND is_favorite = 0",
            params![to_nanos(&cutoff)?],
        )
        .map_err(|e| AppError::Database(format!("清理过期历史失败: {}", e)))?;

    if deleted > 0 {
        log::info!("🧹 已清理 {} 条过期历史", deleted);
    }
    Ok(deleted)
}

pub(super) fn evict_over_limit(conn: &Connection, max_history: usize) -> Result<usize, AppError> {
    let total: i64 = conn
        .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
        .map_err(|e| AppError::Database(format!("查询总数失败: {}", e)))?;

    let max = i64::try_from(max_history).unwrap_or(i64::MAX);
    let excess = total - max;
    if excess <= 0 {
        return Ok(0);
    }

    let deleted = conn
        .execute(
            "DELETE FROM history WHERE id IN (
                SELECT id FROM history WHERE is_favorite = 0
                ORDER BY timestamp ASC, id ASC
                LIMIT ?1
            )",
            params![excess],
        )
        .map_err(|e| AppError::Database(format!("淘汰超额历史失败: {}", e)))?;

    if deleted > 0 {
        log::info!("🧹 历史超出上限 {}，已淘汰 {} 条", max_history, deleted);
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::db::history::{add_item, count_items, query_items, toggle_favorite};
    use crate::db::HistoryQuery;
    use crate::model::ClipItem;

    fn setup_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        super::super::schema::initialize_schema(&conn).expect("init schema");
        conn
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).single().expect("valid time")
    }

    fn add_days_ago(conn: &Connection, content: &str, days: i64) -> ClipItem {
        let item = ClipItem::new(content, now() - Duration::days(days));
        add_item(conn, &item).expect("add item");
        item
    }

    #[test]
    fn expired_non_favorites_are_removed() {
        let conn = setup_conn();
        add_days_ago(&conn, "ancient", 40);
        let fav = add_days_ago(&conn, "ancient favorite", 40);
        add_days_ago(&conn, "recent", 1);
        toggle_favorite(&conn, &fav.content_hash).expect("toggle");

        let deleted = delete_expired_before(&conn, now() - Duration::days(30)).expect("clean");
        assert_eq!(deleted, 1);

        let remaining: Vec<String> = query_items(&conn, &HistoryQuery::default())
            .expect("query")
            .into_iter()
            .map(|item| item.content)
            .collect();
        assert_eq!(remaining, vec!["ancient favorite", "recent"]);
    }

    #[test]
    fn eviction_removes_oldest_non_favorites_first() {
        let conn = setup_conn();
        let oldest = add_days_ago(&conn, "oldest", 5);
        add_days_ago(&conn, "old", 4);
        add_days_ago(&conn, "mid", 3);
        add_days_ago(&conn, "new", 2);
        add_days_ago(&conn, "newest", 1);
        toggle_favorite(&conn, &oldest.content_hash).expect("toggle");

        assert_eq!(evict_over_limit(&conn, 3).expect("evict"), 2);
        let remaining: Vec<String> = query_items(&conn, &HistoryQuery::default())
            .expect("query")
            .into_iter()
            .map(|item| item.content)
            .collect();
        assert_eq!(remaining, vec!["oldest", "newest", "new"]);
    }

    #[test]
    fn eviction_is_noop_under_limit() {
        let conn = setup_conn();
        add_days_ago(&conn, "a", 1);
        assert_eq!(evict_over_limit(&conn, 10).expect("evict"), 0);
        assert_eq!(count_items(&conn).expect("count"), 1);
    }

    #[test]
    fn favorites_may_exceed_limit() {
        let conn = setup_conn();
        for i in 0..4 {
            let item = add_days_ago(&conn, &format!("fav-{i}"), i);
            toggle_favorite(&conn, &item.content_hash).expect("toggle");
        }
        add_days_ago(&conn, "plain", 0);

        assert_eq!(evict_over_limit(&conn, 2).expect("evict"), 1);
        assert_eq!(count_items(&conn).expect("count"), 4);
    }
}
