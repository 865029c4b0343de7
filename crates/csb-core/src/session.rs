//! Per-admin upload sessions.
//!
//! A session accumulates file descriptors in process memory until a single
//! atomic commit attaches them to the target category. One session per
//! caller; starting a new one discards whatever the previous one had
//! accumulated. Rejecting `start` while a session is active would also be
//! defensible; that remains an open product decision.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::{
    domain::{Category, CategoryId, NewFile, UserId},
    errors::Error,
    ports::CategoryRepository,
    Result,
};

#[derive(Clone, Debug)]
struct UploadSession {
    category_id: CategoryId,
    files: Vec<NewFile>,
}

/// Shared session map. A single lock over the whole map is enough here:
/// contention is a handful of admins, and holding it across the commit's
/// repository call is what guarantees same-caller operations never
/// interleave destructively.
///
/// TODO: evict abandoned sessions after a TTL; right now they live until the
/// caller commits, cancels or restarts one.
#[derive(Default)]
pub struct UploadSessions {
    inner: Mutex<HashMap<UserId, UploadSession>>,
}

impl UploadSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the caller to `Collecting` for `category_id`, verifying the
    /// category exists first. Returns the target category plus the number of
    /// files a replaced session was holding, so the orchestrator can tell the
    /// caller what was discarded.
    pub async fn start(
        &self,
        repo: &dyn CategoryRepository,
        caller: UserId,
        category_id: CategoryId,
    ) -> Result<(Category, Option<usize>)> {
        let category = repo.category(&category_id).await?;

        let mut map = self.inner.lock().await;
        let discarded = map
            .insert(
                caller,
                UploadSession {
                    category_id,
                    files: Vec::new(),
                },
            )
            .map(|prev| prev.files.len())
            .filter(|n| *n > 0);
        Ok((category, discarded))
    }

    /// Appends to the caller's accumulator and returns the running count.
    /// `None` when the caller is idle: submissions outside a session are
    /// ignored by design, the UI never solicits them.
    pub async fn add_file(&self, caller: UserId, file: NewFile) -> Option<usize> {
        let mut map = self.inner.lock().await;
        let session = map.get_mut(&caller)?;
        session.files.push(file);
        Some(session.files.len())
    }

    /// Commits the accumulated files in one repository transaction.
    ///
    /// `Error::EmptySession` if nothing was accumulated (session kept).
    /// On repository failure the session is left intact so the caller can
    /// retry `commit` without re-uploading anything. On success the caller
    /// returns to idle and the committed count comes back with the target id.
    pub async fn commit(
        &self,
        repo: &dyn CategoryRepository,
        caller: UserId,
    ) -> Result<(CategoryId, u32)> {
        let mut map = self.inner.lock().await;
        let Some(session) = map.get(&caller) else {
            return Err(Error::NotFound(format!(
                "no upload session in progress for user {}",
                caller.0
            )));
        };
        if session.files.is_empty() {
            return Err(Error::EmptySession);
        }

        let category_id = session.category_id.clone();
        let count = repo.append_files(&category_id, &session.files).await?;

        map.remove(&caller);
        Ok((category_id, count))
    }

    /// Discards the caller's session unconditionally. True if one existed.
    pub async fn cancel(&self, caller: UserId) -> bool {
        self.inner.lock().await.remove(&caller).is_some()
    }

    /// Peek at the caller's session for status text.
    pub async fn pending(&self, caller: UserId) -> Option<(CategoryId, usize)> {
        self.inner
            .lock()
            .await
            .get(&caller)
            .map(|s| (s.category_id.clone(), s.files.len()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::domain::{FileHandle, FileRecord};

    /// In-memory repository: one known category, append counting, and an
    /// injectable number of forced `Persistence` failures.
    struct FakeRepo {
        known: CategoryId,
        fail_appends: AtomicUsize,
        appended: Mutex<Vec<Vec<NewFile>>>,
    }

    impl FakeRepo {
        fn new(known: CategoryId) -> Self {
            Self {
                known,
                fail_appends: AtomicUsize::new(0),
                appended: Mutex::new(Vec::new()),
            }
        }

        fn fail_next_appends(&self, n: usize) {
            self.fail_appends.store(n, Ordering::SeqCst);
        }

        async fn append_batches(&self) -> Vec<Vec<NewFile>> {
            self.appended.lock().await.clone()
        }

        fn category_value(&self) -> Category {
            Category {
                id: self.known.clone(),
                name: "Docs".to_string(),
                creator: UserId(1),
                created_at: Utc::now(),
                files: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl CategoryRepository for FakeRepo {
        async fn create_category(&self, _name: &str, _creator: UserId) -> Result<CategoryId> {
            Ok(self.known.clone())
        }

        async fn category(&self, id: &CategoryId) -> Result<Category> {
            if *id != self.known {
                return Err(Error::NotFound(format!("category {id}")));
            }
            Ok(self.category_value())
        }

        async fn list_categories(&self) -> Result<Vec<Category>> {
            Ok(vec![self.category_value()])
        }

        async fn append_files(&self, id: &CategoryId, files: &[NewFile]) -> Result<u32> {
            if *id != self.known {
                return Err(Error::NotFound(format!("category {id}")));
            }
            if self
                .fail_appends
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::Persistence("disk on fire".to_string()));
            }
            self.appended.lock().await.push(files.to_vec());
            Ok(files.len() as u32)
        }

        async fn delete_file_at(&self, id: &CategoryId, _index: u32) -> Result<FileRecord> {
            Err(Error::NotFound(format!("file in category {id}")))
        }

        async fn delete_category(&self, id: &CategoryId) -> Result<Category> {
            if *id != self.known {
                return Err(Error::NotFound(format!("category {id}")));
            }
            Ok(self.category_value())
        }
    }

    fn cat_id() -> CategoryId {
        CategoryId::parse("a1b2c3d4").unwrap()
    }

    fn file(name: &str) -> NewFile {
        NewFile {
            handle: FileHandle(format!("handle-{name}")),
            display_name: name.to_string(),
            size_bytes: 1024,
            caption: None,
        }
    }

    #[tokio::test]
    async fn start_requires_existing_category() {
        let repo = FakeRepo::new(cat_id());
        let sessions = UploadSessions::new();

        let missing = CategoryId::parse("ffffffff").unwrap();
        let err = sessions.start(&repo, UserId(1), missing).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(sessions.pending(UserId(1)).await.is_none());
    }

    #[tokio::test]
    async fn add_file_is_ignored_when_idle() {
        let sessions = UploadSessions::new();
        assert_eq!(sessions.add_file(UserId(1), file("a")).await, None);
    }

    #[tokio::test]
    async fn restart_discards_accumulated_files() {
        let repo = FakeRepo::new(cat_id());
        let sessions = UploadSessions::new();

        sessions.start(&repo, UserId(1), cat_id()).await.unwrap();
        sessions.add_file(UserId(1), file("a")).await;
        sessions.add_file(UserId(1), file("b")).await;

        let (_, discarded) = sessions.start(&repo, UserId(1), cat_id()).await.unwrap();
        assert_eq!(discarded, Some(2));
        assert_eq!(sessions.pending(UserId(1)).await, Some((cat_id(), 0)));
    }

    #[tokio::test]
    async fn commit_with_nothing_pending_is_an_empty_session_error() {
        let repo = FakeRepo::new(cat_id());
        let sessions = UploadSessions::new();

        sessions.start(&repo, UserId(1), cat_id()).await.unwrap();
        let err = sessions.commit(&repo, UserId(1)).await.unwrap_err();
        assert!(matches!(err, Error::EmptySession));

        // Session survives the failed commit.
        assert_eq!(sessions.pending(UserId(1)).await, Some((cat_id(), 0)));
        assert!(repo.append_batches().await.is_empty());
    }

    #[tokio::test]
    async fn commit_without_session_is_not_found() {
        let repo = FakeRepo::new(cat_id());
        let sessions = UploadSessions::new();
        let err = sessions.commit(&repo, UserId(1)).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn successful_commit_returns_count_and_goes_idle() {
        let repo = FakeRepo::new(cat_id());
        let sessions = UploadSessions::new();

        sessions.start(&repo, UserId(1), cat_id()).await.unwrap();
        assert_eq!(sessions.add_file(UserId(1), file("a")).await, Some(1));
        assert_eq!(sessions.add_file(UserId(1), file("b")).await, Some(2));

        let (id, count) = sessions.commit(&repo, UserId(1)).await.unwrap();
        assert_eq!(id, cat_id());
        assert_eq!(count, 2);
        assert!(sessions.pending(UserId(1)).await.is_none());

        let batches = repo.append_batches().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][0].display_name, "a");
        assert_eq!(batches[0][1].display_name, "b");
    }

    #[tokio::test]
    async fn persistence_failure_keeps_session_for_retry() {
        let repo = FakeRepo::new(cat_id());
        let sessions = UploadSessions::new();

        sessions.start(&repo, UserId(1), cat_id()).await.unwrap();
        sessions.add_file(UserId(1), file("a")).await;

        repo.fail_next_appends(1);
        let err = sessions.commit(&repo, UserId(1)).await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(sessions.pending(UserId(1)).await, Some((cat_id(), 1)));

        // Retry without re-uploading succeeds.
        let (_, count) = sessions.commit(&repo, UserId(1)).await.unwrap();
        assert_eq!(count, 1);
        assert!(sessions.pending(UserId(1)).await.is_none());
    }

    #[tokio::test]
    async fn cancel_discards_unconditionally() {
        let repo = FakeRepo::new(cat_id());
        let sessions = UploadSessions::new();

        assert!(!sessions.cancel(UserId(1)).await);

        sessions.start(&repo, UserId(1), cat_id()).await.unwrap();
        sessions.add_file(UserId(1), file("a")).await;
        assert!(sessions.cancel(UserId(1)).await);
        assert!(sessions.pending(UserId(1)).await.is_none());
    }

    #[tokio::test]
    async fn callers_are_independent() {
        let repo = FakeRepo::new(cat_id());
        let sessions = UploadSessions::new();

        sessions.start(&repo, UserId(1), cat_id()).await.unwrap();
        sessions.start(&repo, UserId(2), cat_id()).await.unwrap();
        sessions.add_file(UserId(1), file("a")).await;

        assert_eq!(sessions.pending(UserId(1)).await, Some((cat_id(), 1)));
        assert_eq!(sessions.pending(UserId(2)).await, Some((cat_id(), 0)));

        sessions.cancel(UserId(1)).await;
        assert!(sessions.pending(UserId(1)).await.is_none());
        assert_eq!(sessions.pending(UserId(2)).await, Some((cat_id(), 0)));
    }
}
