//! File-backed list store.
//!
//! Each queue is persisted as a JSON-lines file of ids, left end first, under
//! one directory. Lists are loaded on first use. Every mutation is applied to a
//! copy, written to a temporary file and renamed over the list file; the cached
//! list only changes once the rename succeeded, so a failed write leaves both
//! the cache and the file as they were.
//!
//! Each mutation rewrites the whole list, so this backend suits development and
//! single-node deployments with short queues. Use the Postgres queue for shared
//! or long queues.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::core::{ControlError, QueueBackend};

fn backend_err(e: impl std::fmt::Display) -> ControlError {
    ControlError::Queue(e.to_string())
}

/// File-backed list store using JSON lines for durability.
pub struct FileQueue {
    dir: PathBuf,
    lists: Mutex<HashMap<String, VecDeque<String>>>,
}

impl FileQueue {
    /// Open (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Queue`] when the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ControlError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(backend_err)?;
        Ok(Self {
            dir,
            lists: Mutex::new(HashMap::new()),
        })
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, queue: &str) -> PathBuf {
        let stem: String = queue
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{stem}.jsonl"))
    }

    async fn load(&self, queue: &str) -> Result<VecDeque<String>, ControlError> {
        let contents = match tokio::fs::read_to_string(self.file_path(queue)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(VecDeque::new()),
            Err(e) => return Err(backend_err(e)),
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<String>(line).map_err(backend_err))
            .collect()
    }

    async fn persist(&self, queue: &str, list: &VecDeque<String>) -> Result<(), ControlError> {
        let mut contents = String::new();
        for id in list {
            contents.push_str(&serde_json::to_string(id).map_err(backend_err)?);
            contents.push('\n');
        }
        let file_path = self.file_path(queue);
        let mut tmp_path = file_path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        tokio::fs::write(&tmp_path, contents)
            .await
            .map_err(backend_err)?;
        if let Err(err) = tokio::fs::rename(&tmp_path, &file_path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
                warn!(path = %tmp_path.display(), error = %cleanup, "failed to remove temporary queue file");
            }
            return Err(backend_err(err));
        }
        Ok(())
    }

    /// Run `f` on a copy of the list of `queue`. When `f` reports a change the
    /// copy is persisted and only then replaces the cached list.
    async fn with_list<T>(
        &self,
        queue: &str,
        f: impl FnOnce(&mut VecDeque<String>) -> (T, bool) + Send,
    ) -> Result<T, ControlError> {
        let mut lists = self.lists.lock().await;
        if !lists.contains_key(queue) {
            let loaded = self.load(queue).await?;
            lists.insert(queue.to_owned(), loaded);
        }
        let Some(current) = lists.get(queue) else {
            return Err(ControlError::Queue(format!("queue `{queue}` not loaded")));
        };
        let mut next = current.clone();
        let (result, changed) = f(&mut next);
        if changed {
            self.persist(queue, &next).await?;
            lists.insert(queue.to_owned(), next);
        }
        Ok(result)
    }
}

#[async_trait]
impl QueueBackend for FileQueue {
    async fn push_left(&self, queue: &str, ids: &[String]) -> Result<(), ControlError> {
        self.with_list(queue, |list| {
            for id in ids {
                list.push_front(id.clone());
            }
            ((), !ids.is_empty())
        })
        .await
    }

    async fn push_right(&self, queue: &str, ids: &[String]) -> Result<(), ControlError> {
        self.with_list(queue, |list| {
            list.extend(ids.iter().cloned());
            ((), !ids.is_empty())
        })
        .await
    }

    async fn pop_right(&self, queue: &str) -> Result<Option<String>, ControlError> {
        self.with_list(queue, |list| {
            let id = list.pop_back();
            let changed = id.is_some();
            (id, changed)
        })
        .await
    }

    async fn remove_one(&self, queue: &str, id: &str) -> Result<u64, ControlError> {
        self.with_list(queue, |list| match list.iter().position(|q| q == id) {
            Some(index) => {
                list.remove(index);
                (1, true)
            }
            None => (0, false),
        })
        .await
    }

    async fn remove_each(&self, queue: &str, ids: &[String]) -> Result<Vec<u64>, ControlError> {
        self.with_list(queue, |list| {
            let removed: Vec<u64> = ids
                .iter()
                .map(|id| match list.iter().position(|q| q == id) {
                    Some(index) => {
                        list.remove(index);
                        1
                    }
                    None => 0,
                })
                .collect();
            let changed = removed.iter().any(|n| *n > 0);
            (removed, changed)
        })
        .await
    }

    async fn size(&self, queue: &str) -> Result<u64, ControlError> {
        self.with_list(queue, |list| (list.len() as u64, false)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("polling-file-queue-{name}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[tokio::test]
    async fn test_contents_survive_reopen() {
        let dir = temp_dir("reopen");
        {
            let q = FileQueue::open(&dir).unwrap();
            q.push_left("orders", &ids(&["a", "b", "c"])).await.unwrap();
            assert_eq!(q.pop_right("orders").await.unwrap().as_deref(), Some("a"));
        }
        let q = FileQueue::open(&dir).unwrap();
        assert_eq!(q.size("orders").await.unwrap(), 2);
        assert_eq!(q.pop_right("orders").await.unwrap().as_deref(), Some("b"));
        assert_eq!(q.pop_right("orders").await.unwrap().as_deref(), Some("c"));
        assert!(q.pop_right("orders").await.unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_remove_each_and_sanitized_names() {
        let dir = temp_dir("remove");
        let q = FileQueue::open(&dir).unwrap();
        let name = "com.example/Order";
        q.push_right(name, &ids(&["a", "b"])).await.unwrap();
        assert_eq!(q.remove_each(name, &ids(&["b", "z"])).await.unwrap(), vec![1, 0]);
        assert!(dir.join("com.example_Order.jsonl").exists());
        assert_eq!(q.size(name).await.unwrap(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_failed_write_keeps_list_unchanged() {
        let dir = temp_dir("failed-write");
        let q = FileQueue::open(&dir).unwrap();
        q.push_left("q", &ids(&["a", "b", "c"])).await.unwrap();

        // A directory in place of the list file makes the rename fail.
        let list_file = dir.join("q.jsonl");
        std::fs::remove_file(&list_file).unwrap();
        std::fs::create_dir(&list_file).unwrap();
        assert!(matches!(q.pop_right("q").await, Err(ControlError::Queue(_))));
        assert_eq!(q.size("q").await.unwrap(), 3);
        assert!(!dir.join("q.jsonl.tmp").exists());

        std::fs::remove_dir(&list_file).unwrap();
        assert_eq!(q.pop_right("q").await.unwrap().as_deref(), Some("a"));

        let reopened = FileQueue::open(&dir).unwrap();
        assert_eq!(reopened.size("q").await.unwrap(), 2);
        assert_eq!(reopened.pop_right("q").await.unwrap().as_deref(), Some("b"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
