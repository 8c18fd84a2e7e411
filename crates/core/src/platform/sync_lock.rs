//! Sync attempt gate.
//!
//! A [`SyncLock`] decides whether a sync attempt may start. Acquisition is
//! attempt-and-fail: it never queues and never waits for the current holder.

use async_trait::async_trait;
use log::{debug, warn};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(not(target_arch = "wasm32"))]
use fs2::FileExt;
#[cfg(not(target_arch = "wasm32"))]
use std::fs::{File, OpenOptions};
#[cfg(not(target_arch = "wasm32"))]
use std::path::{Path, PathBuf};
#[cfg(not(target_arch = "wasm32"))]
use std::sync::Mutex;

static NEXT_LEASE: AtomicU64 = AtomicU64::new(1);

/// Proof of holding a [`SyncLock`], handed out by a successful `acquire`.
///
/// Lease ids are unique within the process, so a lock can tell its holder
/// apart from anyone else calling `release`.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "dropping a lease without releasing it keeps the sync lock held"]
pub struct SyncLockLease {
    id: u64,
}

impl SyncLockLease {
    /// Issue a fresh lease. Lock implementations call this on acquisition.
    pub fn issue() -> Self {
        Self {
            id: NEXT_LEASE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Mutual exclusion for sync attempts.
///
/// Every lease returned by `acquire` must be handed back to `release` exactly
/// once, on success and failure paths alike; [`SyncLockGuard`] does that on
/// drop. Releasing a lease that does not hold the lock (stale, or issued by
/// another lock) is a no-op and leaves the current holder in place.
#[async_trait]
pub trait SyncLock: Send + Sync {
    /// Try to take the lock. Returns `None` immediately when it is held.
    async fn acquire(&self) -> Option<SyncLockLease>;

    /// Give the lock back.
    fn release(&self, lease: SyncLockLease);
}

/// Holds a [`SyncLock`] until dropped.
///
/// Dropping the guard releases the lock, whether the scope ends normally,
/// unwinds from a panic, or the future owning the guard is cancelled.
pub struct SyncLockGuard<'a, L: SyncLock + ?Sized> {
    lock: &'a L,
    lease: Option<SyncLockLease>,
}

impl<'a, L: SyncLock + ?Sized> SyncLockGuard<'a, L> {
    /// Try to take `lock`. Returns `None` when another attempt holds it.
    pub async fn acquire(lock: &'a L) -> Option<Self> {
        let lease = lock.acquire().await?;
        Some(Self {
            lock,
            lease: Some(lease),
        })
    }

    /// Release now instead of at the end of the scope.
    pub fn release(mut self) {
        self.release_lease();
    }

    fn release_lease(&mut self) {
        if let Some(lease) = self.lease.take() {
            self.lock.release(lease);
        }
    }
}

impl<L: SyncLock + ?Sized> Drop for SyncLockGuard<'_, L> {
    fn drop(&mut self) {
        self.release_lease();
    }
}

/// Run `work` while holding `lock`.
///
/// Returns `None` without polling `work` when the lock is already held. The
/// lock is released on every exit path, including a panic inside `work` and
/// the returned future being dropped before it completes.
pub async fn with_sync_lock<L, F, T>(lock: &L, work: F) -> Option<T>
where
    L: SyncLock + ?Sized,
    F: Future<Output = T>,
{
    let _guard = SyncLockGuard::acquire(lock).await?;
    Some(work.await)
}

const FREE: u64 = 0;

/// Lock visible to a single process.
#[derive(Debug, Default)]
pub struct InProcessSyncLock {
    holder: AtomicU64,
}

impl InProcessSyncLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.holder.load(Ordering::Acquire) != FREE
    }
}

#[async_trait]
impl SyncLock for InProcessSyncLock {
    async fn acquire(&self) -> Option<SyncLockLease> {
        let lease = SyncLockLease::issue();
        match self
            .holder
            .compare_exchange(FREE, lease.id(), Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Some(lease),
            Err(_) => {
                debug!("[SyncLock] Sync already in progress");
                None
            }
        }
    }

    fn release(&self, lease: SyncLockLease) {
        if self
            .holder
            .compare_exchange(lease.id(), FREE, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("[SyncLock] Release of lease {} ignored: not the holder", lease.id());
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
struct HeldFile {
    lease: u64,
    file: File,
}

/// Lock shared by every process of the same client through an exclusive
/// advisory lock on a file.
///
/// The lock file is created on first use and never removed. The OS drops the
/// advisory lock when the holding process exits, so a crashed holder cannot
/// wedge other processes.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
pub struct FileSyncLock {
    path: PathBuf,
    held: Mutex<Option<HeldFile>>,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileSyncLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            held: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_lock_file(&self) -> std::io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl SyncLock for FileSyncLock {
    async fn acquire(&self) -> Option<SyncLockLease> {
        let Ok(mut held) = self.held.lock() else {
            warn!("[SyncLock] Lock state poisoned for {}", self.path.display());
            return None;
        };
        if held.is_some() {
            debug!("[SyncLock] Sync already in progress in this process");
            return None;
        }

        let file = match self.open_lock_file() {
            Ok(file) => file,
            Err(err) => {
                warn!(
                    "[SyncLock] Cannot open lock file {}: {}",
                    self.path.display(),
                    err
                );
                return None;
            }
        };

        // Non-blocking: another process holding the lock means "not now".
        if file.try_lock_exclusive().is_err() {
            debug!(
                "[SyncLock] Sync already in progress in another process ({})",
                self.path.display()
            );
            return None;
        }

        let lease = SyncLockLease::issue();
        *held = Some(HeldFile {
            lease: lease.id(),
            file,
        });
        Some(lease)
    }

    fn release(&self, lease: SyncLockLease) {
        let file = match self.held.lock() {
            Ok(mut held) => match held.take() {
                Some(current) if current.lease == lease.id() => current.file,
                other => {
                    *held = other;
                    debug!("[SyncLock] Release of lease {} ignored: not the holder", lease.id());
                    return;
                }
            },
            Err(_) => {
                warn!("[SyncLock] Lock state poisoned for {}", self.path.display());
                return;
            }
        };

        if let Err(err) = file.unlock() {
            warn!(
                "[SyncLock] Failed to unlock {}: {}",
                self.path.display(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn second_acquire_fails_until_release() {
        let lock = InProcessSyncLock::new();
        let lease = lock.acquire().await.expect("free lock");
        assert!(lock.acquire().await.is_none());
        assert!(lock.acquire().await.is_none());

        lock.release(lease);
        let lease = lock.acquire().await.expect("released lock");
        assert!(lock.acquire().await.is_none());
        lock.release(lease);
    }

    #[tokio::test]
    async fn release_without_acquire_is_a_noop() {
        let lock = InProcessSyncLock::new();
        lock.release(SyncLockLease::issue());
        lock.release(SyncLockLease::issue());
        assert!(!lock.is_held());
        assert!(lock.acquire().await.is_some());
        assert!(lock.is_held());
    }

    #[tokio::test]
    async fn release_by_non_holder_keeps_lock_held() {
        let lock = InProcessSyncLock::new();
        let stale = lock.acquire().await.expect("first holder");
        let stale_id = stale.id();
        lock.release(stale);

        let holder = lock.acquire().await.expect("second holder");
        assert_ne!(holder.id(), stale_id);

        // Neither an unrelated lease nor another lock's lease frees it.
        lock.release(SyncLockLease::issue());
        let other = InProcessSyncLock::new();
        lock.release(other.acquire().await.expect("other lock"));

        assert!(lock.is_held());
        assert!(lock.acquire().await.is_none());
        lock.release(holder);
        assert!(!lock.is_held());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn exactly_one_concurrent_acquirer_wins() {
        let lock = Arc::new(InProcessSyncLock::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let lock = Arc::clone(&lock);
            let winners = Arc::clone(&winners);
            handles.push(tokio::spawn(async move {
                // Leases are kept so no winner frees the lock for a later task.
                let lease = lock.acquire().await;
                if lease.is_some() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
                lease
            }));
        }
        let mut leases = Vec::new();
        for handle in handles {
            leases.extend(handle.await.expect("acquire task"));
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(leases.len(), 1);
    }

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let lock = InProcessSyncLock::new();
        {
            let _guard = SyncLockGuard::acquire(&lock).await.expect("free lock");
            assert!(lock.is_held());
            assert!(SyncLockGuard::acquire(&lock).await.is_none());
        }
        assert!(!lock.is_held());

        let guard = SyncLockGuard::acquire(&lock).await.expect("released lock");
        guard.release();
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn with_sync_lock_skips_when_held() {
        let lock = InProcessSyncLock::new();
        let _lease = lock.acquire().await.expect("free lock");

        let ran = with_sync_lock(&lock, async { 7 }).await;
        assert_eq!(ran, None);
        assert!(lock.is_held());
    }

    #[tokio::test]
    async fn with_sync_lock_releases_after_failed_work() {
        let lock = InProcessSyncLock::new();
        let result = with_sync_lock(&lock, async { Err::<(), _>("push rejected") }).await;

        assert_eq!(result, Some(Err("push rejected")));
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn with_sync_lock_releases_after_panic() {
        let lock = Arc::new(InProcessSyncLock::new());
        let task_lock = Arc::clone(&lock);
        let explode = true;
        let joined = tokio::spawn(async move {
            with_sync_lock(task_lock.as_ref(), async move {
                if explode {
                    panic!("sync round blew up");
                }
            })
            .await
        })
        .await;

        assert!(joined.is_err());
        assert!(!lock.is_held());
        assert!(lock.acquire().await.is_some());
    }

    #[tokio::test]
    async fn with_sync_lock_releases_when_cancelled() {
        let lock = InProcessSyncLock::new();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            with_sync_lock(&lock, tokio::time::sleep(Duration::from_secs(5))),
        )
        .await;

        assert!(timed_out.is_err());
        assert!(!lock.is_held());
        assert!(lock.acquire().await.is_some());
    }

    #[tokio::test]
    async fn aborted_holder_task_frees_the_lock() {
        let lock = Arc::new(InProcessSyncLock::new());
        let task_lock = Arc::clone(&lock);
        let task = tokio::spawn(async move {
            with_sync_lock(task_lock.as_ref(), std::future::pending::<()>()).await
        });

        while !lock.is_held() {
            tokio::task::yield_now().await;
        }
        task.abort();
        assert!(task.await.expect_err("aborted").is_cancelled());

        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn file_lock_excludes_second_instance() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("sync.lock");
        let first = FileSyncLock::new(&path);
        let second = FileSyncLock::new(&path);

        let lease = first.acquire().await.expect("first");
        assert!(first.acquire().await.is_none());
        assert!(second.acquire().await.is_none());

        first.release(lease);
        let lease = second.acquire().await.expect("second");
        assert!(first.acquire().await.is_none());
        second.release(lease);
    }

    #[tokio::test]
    async fn file_lock_ignores_foreign_lease() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("sync.lock");
        let first = FileSyncLock::new(&path);
        let second = FileSyncLock::new(&path);

        first.release(SyncLockLease::issue());
        let lease = first.acquire().await.expect("first");
        first.release(SyncLockLease::issue());
        assert!(second.acquire().await.is_none());

        first.release(lease);
        assert!(second.acquire().await.is_some());
    }

    #[tokio::test]
    async fn file_lock_releases_when_scope_is_cancelled() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("sync.lock");
        let first = FileSyncLock::new(&path);
        let second = FileSyncLock::new(&path);

        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            with_sync_lock(&first, tokio::time::sleep(Duration::from_secs(5))),
        )
        .await;

        assert!(timed_out.is_err());
        assert!(second.acquire().await.is_some());
    }

    #[tokio::test]
    async fn file_lock_reports_none_when_path_is_unusable() {
        let dir = tempdir().expect("tempdir");
        let lock = FileSyncLock::new(dir.path().join("missing").join("sync.lock"));
        assert!(lock.acquire().await.is_none());
    }
}
