//! sqlite-backed implementation of the category repository port.
//!
//! Two tables, `categories` and `files`, with `(category_id, seq)` as the
//! files ordering key. Every mutating operation runs in a single write
//! transaction so concurrent callers only ever observe committed state.

use std::{fs, path::Path, str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};

use csb_core::{
    domain::{Category, CategoryId, FileHandle, FileRecord, NewFile, UserId},
    ports::CategoryRepository,
    Error, Result,
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    /// Opens (creating if missing) the database at `database_url` and runs
    /// migrations. `acquire_timeout` bounds every wait on the pool; expiry
    /// surfaces as `Error::Persistence`.
    pub async fn connect(database_url: &str, acquire_timeout: Duration) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(persistence)?
            .create_if_missing(true)
            .busy_timeout(acquire_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .map_err(persistence)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(persistence)?;

        tracing::info!("sqlite storage ready at {database_url}");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Inserts a category under an explicit id. A duplicate id is a
    /// `Conflict`. Exposed separately from the trait method (which generates
    /// the id) so collision handling is testable with deterministic ids.
    pub async fn insert_category(
        &self,
        id: &CategoryId,
        name: &str,
        creator: UserId,
    ) -> Result<()> {
        sqlx::query("INSERT INTO categories (id, name, created_by, created_at) VALUES (?, ?, ?, ?)")
            .bind(id.as_str())
            .bind(name)
            .bind(creator.0)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, id))?;
        Ok(())
    }

    async fn files_for<'e, E>(executor: E, id: &CategoryId) -> Result<Vec<FileRecord>>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query(
            "SELECT seq, handle, display_name, size_bytes, caption, uploaded_at
             FROM files WHERE category_id = ? ORDER BY seq ASC",
        )
        .bind(id.as_str())
        .fetch_all(executor)
        .await
        .map_err(persistence)?;

        rows.iter().map(file_from_row).collect()
    }
}

#[async_trait]
impl CategoryRepository for Storage {
    async fn create_category(&self, name: &str, creator: UserId) -> Result<CategoryId> {
        let id = CategoryId::generate();
        self.insert_category(&id, name, creator).await?;
        Ok(id)
    }

    async fn category(&self, id: &CategoryId) -> Result<Category> {
        let row = sqlx::query(
            "SELECT id, name, created_by, created_at FROM categories WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?;

        let Some(row) = row else {
            return Err(Error::NotFound(format!("category {id}")));
        };

        let files = Self::files_for(&self.pool, id).await?;
        category_from_row(&row, files)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query(
            "SELECT id, name, created_by, created_at FROM categories ORDER BY rowid ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(persistence)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id = CategoryId::parse(&row.get::<String, _>("id"))?;
            let files = Self::files_for(&self.pool, &id).await?;
            out.push(category_from_row(&row, files)?);
        }
        Ok(out)
    }

    async fn append_files(&self, id: &CategoryId, files: &[NewFile]) -> Result<u32> {
        if files.is_empty() {
            return Err(Error::Validation(
                "append_files requires at least one file".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await.map_err(persistence)?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM categories WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(persistence)?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("category {id}")));
        }

        let max_seq: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(seq), -1) FROM files WHERE category_id = ?")
                .bind(id.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(persistence)?;

        let uploaded_at = Utc::now();
        for (offset, file) in files.iter().enumerate() {
            sqlx::query(
                "INSERT INTO files (category_id, seq, handle, display_name, size_bytes, caption, uploaded_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(id.as_str())
            .bind(max_seq + 1 + offset as i64)
            .bind(file.handle.as_str())
            .bind(&file.display_name)
            .bind(file.size_bytes)
            .bind(&file.caption)
            .bind(uploaded_at)
            .execute(&mut *tx)
            .await
            .map_err(persistence)?;
        }

        tx.commit().await.map_err(persistence)?;
        Ok(files.len() as u32)
    }

    async fn delete_file_at(&self, id: &CategoryId, index: u32) -> Result<FileRecord> {
        let mut tx = self.pool.begin().await.map_err(persistence)?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM categories WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(persistence)?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("category {id}")));
        }

        // Resolve the positional index against ascending seq at this moment.
        let row = sqlx::query(
            "SELECT seq, handle, display_name, size_bytes, caption, uploaded_at
             FROM files WHERE category_id = ? ORDER BY seq ASC LIMIT 1 OFFSET ?",
        )
        .bind(id.as_str())
        .bind(i64::from(index))
        .fetch_optional(&mut *tx)
        .await
        .map_err(persistence)?;

        let Some(row) = row else {
            return Err(Error::NotFound(format!(
                "file at index {index} in category {id}"
            )));
        };
        let record = file_from_row(&row)?;

        sqlx::query("DELETE FROM files WHERE category_id = ? AND seq = ?")
            .bind(id.as_str())
            .bind(record.seq)
            .execute(&mut *tx)
            .await
            .map_err(persistence)?;

        tx.commit().await.map_err(persistence)?;
        Ok(record)
    }

    async fn delete_category(&self, id: &CategoryId) -> Result<Category> {
        let category = self.category(id).await?;

        let mut tx = self.pool.begin().await.map_err(persistence)?;

        sqlx::query("DELETE FROM files WHERE category_id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(persistence)?;

        let res = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(persistence)?;
        if res.rows_affected() == 0 {
            // Deleted concurrently between the read above and this transaction.
            return Err(Error::NotFound(format!("category {id}")));
        }

        tx.commit().await.map_err(persistence)?;
        Ok(category)
    }
}

fn category_from_row(row: &SqliteRow, files: Vec<FileRecord>) -> Result<Category> {
    Ok(Category {
        id: CategoryId::parse(&row.get::<String, _>("id"))?,
        name: row.get("name"),
        creator: UserId(row.get::<i64, _>("created_by")),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        files,
    })
}

fn file_from_row(row: &SqliteRow) -> Result<FileRecord> {
    Ok(FileRecord {
        seq: row.get("seq"),
        handle: FileHandle(row.get("handle")),
        display_name: row.get("display_name"),
        size_bytes: row.get("size_bytes"),
        caption: row.get("caption"),
        uploaded_at: row.get::<DateTime<Utc>, _>("uploaded_at"),
    })
}

fn persistence<E: std::fmt::Display>(e: E) -> Error {
    Error::Persistence(e.to_string())
}

fn map_unique_violation(e: sqlx::Error, id: &CategoryId) -> Error {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return Error::Conflict(format!("category id {id} already exists"));
        }
    }
    persistence(e)
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    if path.is_empty() || path.starts_with(':') {
        return Ok(()); // in-memory
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_storage() -> (Storage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/csb.db", dir.path().display());
        let storage = Storage::connect(&url, Duration::from_secs(5))
            .await
            .unwrap();
        (storage, dir)
    }

    fn cat_id(s: &str) -> CategoryId {
        CategoryId::parse(s).unwrap()
    }

    fn file(name: &str, caption: Option<&str>) -> NewFile {
        NewFile {
            handle: FileHandle(format!("handle-{name}")),
            display_name: name.to_string(),
            size_bytes: 2048,
            caption: caption.map(|s| s.to_string()),
        }
    }

    fn names(category: &Category) -> Vec<&str> {
        category
            .files
            .iter()
            .map(|f| f.display_name.as_str())
            .collect()
    }

    #[tokio::test]
    async fn create_then_fetch_returns_empty_category() {
        let (storage, _dir) = test_storage().await;

        let id = storage.create_category("Docs", UserId(1)).await.unwrap();
        let category = storage.category(&id).await.unwrap();
        assert_eq!(category.id, id);
        assert_eq!(category.name, "Docs");
        assert_eq!(category.creator, UserId(1));
        assert!(category.files.is_empty());
    }

    #[tokio::test]
    async fn missing_category_is_not_found() {
        let (storage, _dir) = test_storage().await;
        let err = storage.category(&cat_id("deadbeef")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn duplicate_id_is_a_conflict() {
        let (storage, _dir) = test_storage().await;

        let id = cat_id("a1b2c3d4");
        storage.insert_category(&id, "One", UserId(1)).await.unwrap();
        let err = storage
            .insert_category(&id, "Two", UserId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // The original survives the collision.
        assert_eq!(storage.category(&id).await.unwrap().name, "One");
    }

    #[tokio::test]
    async fn append_assigns_consecutive_sequences_continuing_from_max() {
        let (storage, _dir) = test_storage().await;
        let id = storage.create_category("Docs", UserId(1)).await.unwrap();

        let n = storage
            .append_files(&id, &[file("a", Some("first")), file("b", None)])
            .await
            .unwrap();
        assert_eq!(n, 2);

        storage.append_files(&id, &[file("c", None)]).await.unwrap();

        let category = storage.category(&id).await.unwrap();
        assert_eq!(names(&category), vec!["a", "b", "c"]);
        let seqs: Vec<i64> = category.files.iter().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(category.files[0].caption.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn append_to_missing_category_is_not_found_and_writes_nothing() {
        let (storage, _dir) = test_storage().await;

        let err = storage
            .append_files(&cat_id("deadbeef"), &[file("a", None)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        // Creating that id afterwards shows a clean slate: nothing leaked in.
        storage
            .insert_category(&cat_id("deadbeef"), "Late", UserId(1))
            .await
            .unwrap();
        let category = storage.category(&cat_id("deadbeef")).await.unwrap();
        assert!(category.files.is_empty());
    }

    #[tokio::test]
    async fn append_of_empty_batch_is_rejected() {
        let (storage, _dir) = test_storage().await;
        let id = storage.create_category("Docs", UserId(1)).await.unwrap();
        let err = storage.append_files(&id, &[]).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn delete_file_at_removes_the_positional_file_and_reindexes() {
        let (storage, _dir) = test_storage().await;
        let id = storage.create_category("Docs", UserId(1)).await.unwrap();
        storage
            .append_files(&id, &[file("a", None), file("b", None), file("c", None)])
            .await
            .unwrap();

        let removed = storage.delete_file_at(&id, 1).await.unwrap();
        assert_eq!(removed.display_name, "b");

        let category = storage.category(&id).await.unwrap();
        assert_eq!(names(&category), vec!["a", "c"]);

        // Former index-2 file now occupies index 1.
        let removed = storage.delete_file_at(&id, 1).await.unwrap();
        assert_eq!(removed.display_name, "c");
        assert_eq!(names(&storage.category(&id).await.unwrap()), vec!["a"]);
    }

    #[tokio::test]
    async fn sequences_stay_ascending_across_interleaved_deletions() {
        let (storage, _dir) = test_storage().await;
        let id = storage.create_category("Docs", UserId(1)).await.unwrap();

        storage
            .append_files(&id, &[file("a", None), file("b", None)])
            .await
            .unwrap();
        storage.delete_file_at(&id, 0).await.unwrap();
        storage
            .append_files(&id, &[file("c", None), file("d", None)])
            .await
            .unwrap();

        let category = storage.category(&id).await.unwrap();
        assert_eq!(names(&category), vec!["b", "c", "d"]);
        let seqs: Vec<i64> = category.files.iter().map(|f| f.seq).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]), "seqs: {seqs:?}");
        // New sequences continue past the old max even though "a" is gone.
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn delete_file_out_of_bounds_is_not_found_without_mutation() {
        let (storage, _dir) = test_storage().await;
        let id = storage.create_category("Docs", UserId(1)).await.unwrap();
        storage.append_files(&id, &[file("a", None)]).await.unwrap();

        let err = storage.delete_file_at(&id, 1).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(storage.category(&id).await.unwrap().files.len(), 1);
    }

    #[tokio::test]
    async fn delete_category_cascades_to_files() {
        let (storage, _dir) = test_storage().await;
        let id = storage.create_category("Docs", UserId(1)).await.unwrap();
        storage
            .append_files(&id, &[file("a", None), file("b", None)])
            .await
            .unwrap();

        let removed = storage.delete_category(&id).await.unwrap();
        assert_eq!(removed.files.len(), 2);

        assert!(matches!(
            storage.category(&id).await.unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(
            storage.delete_file_at(&id, 0).await.unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(
            storage.delete_category(&id).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn list_categories_preserves_insertion_order() {
        let (storage, _dir) = test_storage().await;

        storage
            .insert_category(&cat_id("cccccccc"), "Third-created-first", UserId(1))
            .await
            .unwrap();
        storage
            .insert_category(&cat_id("aaaaaaaa"), "Second", UserId(1))
            .await
            .unwrap();
        storage
            .insert_category(&cat_id("bbbbbbbb"), "Last", UserId(2))
            .await
            .unwrap();

        let listed = storage.list_categories().await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["cccccccc", "aaaaaaaa", "bbbbbbbb"]);
    }
}
