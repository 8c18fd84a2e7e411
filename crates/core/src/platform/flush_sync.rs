//! Synchronous UI flush capability.

/// Runs `callback` and forces pending UI updates to be applied before
/// returning. Only DOM-bound UI bindings need a real flush.
pub trait FlushSync: Send + Sync {
    fn flush_sync(&self, callback: Box<dyn FnOnce() + Send + '_>);
}

/// Flush for UI bindings that render synchronously anyway: just runs the
/// callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateFlushSync;

impl FlushSync for ImmediateFlushSync {
    fn flush_sync(&self, callback: Box<dyn FnOnce() + Send + '_>) {
        callback();
    }
}
