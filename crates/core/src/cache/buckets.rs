//! SQLite implementation of [`CacheStorage`].

use async_trait::async_trait;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;
use url::Url;

use super::connection::CacheDb;
use super::hash::RequestKey;
use super::storage::{BucketSummary, CacheStorage, EntryMeta, MatchOptions, check_storable};
use crate::Error;
use crate::net::{AssetRequest, AssetResponse};

/// A validated entry ready to be written.
struct PendingEntry {
    key: RequestKey,
    method: String,
    url: String,
    status: i64,
    headers_json: String,
    body: Vec<u8>,
}

impl PendingEntry {
    fn new(request: &AssetRequest, response: &AssetResponse) -> Result<Self, Error> {
        check_storable(request, response)?;
        let headers_json = serde_json::to_string(&response.headers)
            .map_err(|e| Error::InvalidInput(format!("failed to serialize headers: {e}")))?;
        Ok(Self {
            key: RequestKey::of(request),
            method: request.method.clone(),
            url: request.url.to_string(),
            status: i64::from(response.status),
            headers_json,
            body: response.body.to_vec(),
        })
    }
}

type StoredRow = (String, i64, String, Vec<u8>);

fn into_response(row: StoredRow) -> Result<AssetResponse, Error> {
    let (url, status, headers_json, body) = row;
    let url = Url::parse(&url).map_err(|e| Error::InvalidUrl(format!("stored url {url}: {e}")))?;
    let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)
        .map_err(|e| Error::InvalidInput(format!("stored headers for {url}: {e}")))?;
    let status = u16::try_from(status).map_err(|_| Error::InvalidInput(format!("stored status {status}")))?;
    Ok(AssetResponse::new(url, status, headers, body))
}

fn content_type_of(headers_json: &str) -> Option<String> {
    let headers: Vec<(String, String)> = serde_json::from_str(headers_json).ok()?;
    headers
        .into_iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v)
}

fn bucket_exists(conn: &rusqlite::Connection, name: &str) -> Result<bool, Error> {
    let exists: bool =
        conn.query_row("SELECT EXISTS(SELECT 1 FROM buckets WHERE name = ?1)", params![name], |row| row.get(0))?;
    Ok(exists)
}

fn upsert(conn: &rusqlite::Connection, bucket: &str, entry: &PendingEntry, now: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO entries (
            bucket, key_hash, search_hash, method, url,
            status_code, headers_json, body, body_size, stored_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(bucket, key_hash) DO UPDATE SET
            search_hash = excluded.search_hash,
            method = excluded.method,
            url = excluded.url,
            status_code = excluded.status_code,
            headers_json = excluded.headers_json,
            body = excluded.body,
            body_size = excluded.body_size,
            stored_at = excluded.stored_at",
        params![
            bucket,
            &entry.key.exact,
            &entry.key.search,
            &entry.method,
            &entry.url,
            entry.status,
            &entry.headers_json,
            &entry.body,
            entry.body.len() as i64,
            now,
        ],
    )?;
    Ok(())
}

/// Fail if the bytes stored across all buckets exceed the quota.
fn enforce_quota(conn: &rusqlite::Connection, quota: u64) -> Result<(), Error> {
    let used: i64 = conn.query_row("SELECT COALESCE(SUM(body_size), 0) FROM entries", [], |row| row.get(0))?;
    let used = used.max(0) as u64;
    if used > quota {
        return Err(Error::QuotaExceeded { needed: used, available: quota });
    }
    Ok(())
}

impl CacheDb {
    async fn write_batch(&self, bucket: &str, entries: Vec<PendingEntry>) -> Result<(), Error> {
        let bucket = bucket.to_string();
        let quota = self.quota_bytes;
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                if !bucket_exists(&tx, &bucket)? {
                    return Err(Error::BucketNotFound(bucket));
                }
                for entry in &entries {
                    upsert(&tx, &bucket, entry, &now)?;
                }
                enforce_quota(&tx, quota)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl CacheStorage for CacheDb {
    async fn open(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO buckets (name, created_at) VALUES (?1, ?2)",
                    params![name, now],
                )?;
                Ok(inserted == 1)
            })
            .await
            .map_err(Error::from)
    }

    async fn has(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> { bucket_exists(conn, &name) })
            .await
            .map_err(Error::from)
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM buckets ORDER BY rowid ASC")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM entries WHERE bucket = ?1", params![name])?;
                let deleted = tx.execute("DELETE FROM buckets WHERE name = ?1", params![name])?;
                tx.commit()?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn match_request(
        &self, bucket: &str, request: &AssetRequest, options: MatchOptions,
    ) -> Result<Option<AssetResponse>, Error> {
        let bucket = bucket.to_string();
        let key = RequestKey::of(request);
        self.conn
            .call(move |conn| -> Result<Option<AssetResponse>, Error> {
                let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<StoredRow> {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                };

                let result = if options.ignore_search {
                    conn.query_row(
                        "SELECT url, status_code, headers_json, body FROM entries
                         WHERE bucket = ?1 AND search_hash = ?2
                         ORDER BY (key_hash = ?3) DESC, rowid ASC
                         LIMIT 1",
                        params![bucket, key.search, key.exact],
                        map_row,
                    )
                } else {
                    conn.query_row(
                        "SELECT url, status_code, headers_json, body FROM entries
                         WHERE bucket = ?1 AND key_hash = ?2",
                        params![bucket, key.exact],
                        map_row,
                    )
                };

                match result {
                    Ok(row) => into_response(row).map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn put(&self, bucket: &str, request: &AssetRequest, response: &AssetResponse) -> Result<(), Error> {
        let entry = PendingEntry::new(request, response)?;
        self.write_batch(bucket, vec![entry]).await
    }

    async fn put_all(&self, bucket: &str, entries: &[(AssetRequest, AssetResponse)]) -> Result<(), Error> {
        let pending = entries
            .iter()
            .map(|(req, resp)| PendingEntry::new(req, resp))
            .collect::<Result<Vec<_>, _>>()?;
        self.write_batch(bucket, pending).await
    }

    async fn entries(&self, bucket: &str) -> Result<Vec<EntryMeta>, Error> {
        let bucket = bucket.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<EntryMeta>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, status_code, headers_json, body_size, stored_at
                     FROM entries WHERE bucket = ?1 ORDER BY rowid ASC",
                )?;
                let rows = stmt
                    .query_map(params![bucket], |row| {
                        let headers_json: String = row.get(3)?;
                        Ok(EntryMeta {
                            method: row.get(0)?,
                            url: row.get(1)?,
                            status: row.get::<_, i64>(2)?.clamp(0, i64::from(u16::MAX)) as u16,
                            content_type: content_type_of(&headers_json),
                            body_size: row.get::<_, i64>(4)?.max(0) as u64,
                            stored_at: row.get(5)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }

    async fn summaries(&self) -> Result<Vec<BucketSummary>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<BucketSummary>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT b.name, COUNT(e.key_hash), COALESCE(SUM(e.body_size), 0)
                     FROM buckets b LEFT JOIN entries e ON e.bucket = b.name
                     GROUP BY b.name
                     ORDER BY MIN(b.rowid) ASC",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(BucketSummary {
                            name: row.get(0)?,
                            entries: row.get::<_, i64>(1)?.max(0) as u64,
                            bytes: row.get::<_, i64>(2)?.max(0) as u64,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUCKET: &str = "btx-offline-v1";

    fn url(path: &str) -> Url {
        Url::parse("http://127.0.0.1:8080/").unwrap().join(path).unwrap()
    }

    fn pair(path: &str, body: &str) -> (AssetRequest, AssetResponse) {
        let u = url(path);
        let resp = AssetResponse::new(
            u.clone(),
            200,
            vec![("Content-Type".to_string(), "text/html".to_string())],
            body.to_string(),
        );
        (AssetRequest::get(u), resp)
    }

    async fn db_with_bucket() -> CacheDb {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.open(BUCKET).await.unwrap());
        db
    }

    #[tokio::test]
    async fn test_open_creates_once() {
        let db = db_with_bucket().await;
        assert!(!db.open(BUCKET).await.unwrap());
        assert!(db.has(BUCKET).await.unwrap());
        assert_eq!(db.keys().await.unwrap(), vec![BUCKET.to_string()]);
    }

    #[tokio::test]
    async fn test_put_and_match_exact() {
        let db = db_with_bucket().await;
        let (req, resp) = pair("/index.html", "<html>hi</html>");
        db.put(BUCKET, &req, &resp).await.unwrap();

        let hit = db.match_request(BUCKET, &req, MatchOptions::default()).await.unwrap().unwrap();
        assert_eq!(hit.body, resp.body);
        assert_eq!(hit.status, 200);
        assert_eq!(hit.content_type(), Some("text/html"));
    }

    #[tokio::test]
    async fn test_match_ignore_search() {
        let db = db_with_bucket().await;
        let (req, resp) = pair("/index.html", "<html>hi</html>");
        db.put(BUCKET, &req, &resp).await.unwrap();

        for query in ["/index.html?x=1", "/index.html?x=2"] {
            let lookup = AssetRequest::get(url(query));
            let exact = db.match_request(BUCKET, &lookup, MatchOptions::default()).await.unwrap();
            assert!(exact.is_none());
            let hit = db.match_request(BUCKET, &lookup, MatchOptions::ignore_search()).await.unwrap();
            assert_eq!(hit.unwrap().body, resp.body);
        }
    }

    #[tokio::test]
    async fn test_ignore_search_prefers_exact_url() {
        let db = db_with_bucket().await;
        let (a, a_resp) = pair("/app.js?v=1", "one");
        let (b, b_resp) = pair("/app.js?v=2", "two");
        db.put(BUCKET, &a, &a_resp).await.unwrap();
        db.put(BUCKET, &b, &b_resp).await.unwrap();

        let hit = db.match_request(BUCKET, &b, MatchOptions::ignore_search()).await.unwrap().unwrap();
        assert_eq!(hit.body, b_resp.body);

        let lookup = AssetRequest::get(url("/app.js?v=3"));
        let hit = db.match_request(BUCKET, &lookup, MatchOptions::ignore_search()).await.unwrap().unwrap();
        assert_eq!(hit.body, a_resp.body);
    }

    #[tokio::test]
    async fn test_put_overwrites_wholesale() {
        let db = db_with_bucket().await;
        let (req, first) = pair("/styles.css", "body{}");
        db.put(BUCKET, &req, &first).await.unwrap();
        let second = AssetResponse::new(req.url.clone(), 200, Vec::new(), "main{}");
        db.put(BUCKET, &req, &second).await.unwrap();

        let entries = db.entries(BUCKET).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content_type, None);

        let hit = db.match_request(BUCKET, &req, MatchOptions::default()).await.unwrap().unwrap();
        assert_eq!(hit.body, second.body);
        assert!(hit.headers.is_empty());
    }

    #[tokio::test]
    async fn test_put_missing_bucket() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (req, resp) = pair("/app.js", "x");
        let result = db.put("nope", &req, &resp).await;
        assert!(matches!(result, Err(Error::BucketNotFound(name)) if name == "nope"));
    }

    #[tokio::test]
    async fn test_put_rejects_non_get() {
        let db = db_with_bucket().await;
        let (req, resp) = pair("/api", "x");
        let post = AssetRequest::new("POST", req.url);
        let result = db.put(BUCKET, &post, &resp).await;
        assert!(matches!(result, Err(Error::NotCacheable(_))));
    }

    #[tokio::test]
    async fn test_put_all_is_atomic() {
        let db = db_with_bucket().await;
        let good = pair("/index.html", "ok");
        let (bad_req, _) = pair("/missing.png", "");
        let bad = (bad_req.clone(), AssetResponse::new(bad_req.url, 404, Vec::new(), "not found"));

        let result = db.put_all(BUCKET, &[good, bad]).await;
        assert!(result.is_err());
        assert!(db.entries(BUCKET).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quota_exceeded_rolls_back() {
        let db = CacheDb::open_in_memory().await.unwrap().with_quota(8);
        db.open(BUCKET).await.unwrap();
        let (small, small_resp) = pair("/a", "1234");
        db.put(BUCKET, &small, &small_resp).await.unwrap();

        let (big, big_resp) = pair("/b", "123456789");
        let result = db.put(BUCKET, &big, &big_resp).await;
        assert!(matches!(result, Err(Error::QuotaExceeded { available: 8, .. })));

        let entries = db.entries(BUCKET).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "http://127.0.0.1:8080/a");
    }

    #[tokio::test]
    async fn test_delete_bucket_removes_entries() {
        let db = db_with_bucket().await;
        db.open("btx-offline-v2").await.unwrap();
        let (req, resp) = pair("/index.html", "hi");
        db.put(BUCKET, &req, &resp).await.unwrap();

        assert!(db.delete(BUCKET).await.unwrap());
        assert!(!db.delete(BUCKET).await.unwrap());
        assert_eq!(db.keys().await.unwrap(), vec!["btx-offline-v2".to_string()]);
        assert!(db.match_request(BUCKET, &req, MatchOptions::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_summaries() {
        let db = db_with_bucket().await;
        db.open("btx-offline-v2").await.unwrap();
        let (req, resp) = pair("/index.html", "hello");
        db.put(BUCKET, &req, &resp).await.unwrap();

        let summaries = db.summaries().await.unwrap();
        assert_eq!(
            summaries,
            vec![
                BucketSummary { name: BUCKET.into(), entries: 1, bytes: 5 },
                BucketSummary { name: "btx-offline-v2".into(), entries: 0, bytes: 0 },
            ]
        );
    }

    #[tokio::test]
    async fn test_corrupt_headers_surface_as_error() {
        let db = db_with_bucket().await;
        let (req, resp) = pair("/index.html", "<html>hi</html>");
        db.put(BUCKET, &req, &resp).await.unwrap();
        db.conn
            .call(|conn| -> Result<(), Error> {
                conn.execute("UPDATE entries SET headers_json = 'not json'", [])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
            .unwrap();

        let result = db.match_request(BUCKET, &req, MatchOptions::default()).await;
        assert!(matches!(result, Err(Error::InvalidInput(ref msg)) if msg.contains("stored headers")));
    }
}
