use tokio::task::JoinSet;

use super::{repository, Database};
use crate::aggregate::{RawDailyRecord, SourceTag};
use crate::error::{Error, Result};
use crate::period::CalendarRange;

/// Fetch every source's records of a store for `range`, one list per source.
///
/// Sources are fetched concurrently; the returned lists come back in
/// completion order, which the merge step does not depend on.
pub async fn fetch_source_records(
    db: &Database,
    store_id: &str,
    range: &CalendarRange,
) -> Result<Vec<Vec<RawDailyRecord>>> {
    let sources = list_store_sources(db, store_id).await?;
    log::debug!("fetching {} sources of {store_id}", sources.len());

    let mut tasks = JoinSet::new();
    for source in sources {
        let db = db.clone();
        let store_id = store_id.to_string();
        let (start, end) = (range.start_date, range.end_date);
        tasks.spawn(async move {
            db.reader()
                .call(move |conn| repository::records_for_source(conn, &store_id, &source, start, end))
                .await
        });
    }

    let mut lists = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        let records = joined.map_err(|e| Error::Other(format!("fetch task failed: {e}")))??;
        lists.push(records);
    }
    Ok(lists)
}

/// Sources registered for a store.
pub async fn list_store_sources(db: &Database, store_id: &str) -> Result<Vec<SourceTag>> {
    let store_id = store_id.to_string();
    let sources = db
        .reader()
        .call(move |conn| repository::list_sources(conn, &store_id))
        .await?;
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::month_range;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_fetch_one_list_per_source() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                repository::upsert_store(conn, "paris", None)?;
                let tags = [
                    SourceTag::Manager,
                    SourceTag::Seller("alice".into()),
                    SourceTag::Seller("bob".into()),
                ];
                for (i, tag) in tags.iter().enumerate() {
                    repository::upsert_source(conn, "paris", tag)?;
                    let record = RawDailyRecord {
                        revenue: 10.0 * (i as f64 + 1.0),
                        ..RawDailyRecord::empty(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(), tag.clone())
                    };
                    repository::upsert_daily_record(conn, "paris", &record)?;
                }
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let range = month_range("2024-06").unwrap();
        let lists = fetch_source_records(&db, "paris", &range).await.unwrap();
        assert_eq!(lists.len(), 3);
        let total: f64 = lists.iter().flatten().map(|r| r.revenue).sum();
        assert_eq!(total, 60.0);

        let other = month_range("2024-07").unwrap();
        let lists = fetch_source_records(&db, "paris", &other).await.unwrap();
        assert_eq!(lists.len(), 3);
        assert!(lists.iter().all(|l| l.is_empty()));

        assert!(fetch_source_records(&db, "nowhere", &range).await.unwrap().is_empty());
    }
}
