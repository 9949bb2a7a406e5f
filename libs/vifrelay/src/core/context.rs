// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Interface execution context ("schedule token").
//!
//! The network stack behind an interface expects to be entered from exactly
//! one execution context at a time. Relay workers therefore acquire a token
//! before delivering a frame and give it back afterwards. The token is shared
//! by every device of a [`crate::Relay`]: it is one system-wide resource, not
//! a per-device lock.

use std::thread::ThreadId;

use parking_lot::{Condvar, Mutex};

/// Two-call protocol for entering and leaving the interface context.
///
/// Calls are always paired: every `schedule` is followed by an `unschedule`
/// on the same thread. Use [`ContextToken`] and [`ContextReleased`] rather
/// than calling these directly.
pub trait ExecutionContext: Send + Sync {
    /// Enter the interface context, blocking until it is available.
    fn schedule(&self);

    /// Leave the interface context.
    fn unschedule(&self);

    /// Whether the calling thread is currently inside the context.
    fn is_held_by_current_thread(&self) -> bool;
}

#[derive(Debug, Default)]
struct Holder {
    owner: Option<ThreadId>,
    depth: usize,
}

/// Process-local implementation of the token: a single owner slot guarded by
/// a mutex, with waiters parked on a condvar.
///
/// Re-entrant on the owning thread; the context is released when the
/// outermost `unschedule` runs.
#[derive(Debug, Default)]
pub struct GlobalContext {
    holder: Mutex<Holder>,
    released: Condvar,
}

impl GlobalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Thread currently inside the context, if any.
    pub fn owner(&self) -> Option<ThreadId> {
        self.holder.lock().owner
    }
}

impl ExecutionContext for GlobalContext {
    fn schedule(&self) {
        let me = std::thread::current().id();
        let mut holder = self.holder.lock();

        if holder.owner == Some(me) {
            holder.depth += 1;
            return;
        }

        while holder.owner.is_some() {
            self.released.wait(&mut holder);
        }
        holder.owner = Some(me);
        holder.depth = 1;
    }

    fn unschedule(&self) {
        let me = std::thread::current().id();
        let mut holder = self.holder.lock();

        if holder.owner != Some(me) {
            tracing::warn!(
                "unschedule from {:?} which does not hold the interface context (owner {:?})",
                me,
                holder.owner
            );
            return;
        }

        holder.depth -= 1;
        if holder.depth == 0 {
            holder.owner = None;
            self.released.notify_one();
        }
    }

    fn is_held_by_current_thread(&self) -> bool {
        self.holder.lock().owner == Some(std::thread::current().id())
    }
}

/// Holds the interface context for its lifetime.
#[must_use = "the context is released as soon as the token is dropped"]
pub struct ContextToken<'a> {
    context: &'a dyn ExecutionContext,
}

impl<'a> ContextToken<'a> {
    pub fn acquire(context: &'a dyn ExecutionContext) -> Self {
        context.schedule();
        Self { context }
    }
}

impl Drop for ContextToken<'_> {
    fn drop(&mut self) {
        self.context.unschedule();
    }
}

/// Gives the interface context up for its lifetime, if the calling thread
/// held it, and takes it back on drop.
///
/// Re-entrant holds are unwound completely and restored to the same depth,
/// so a worker blocked on the context can always make progress meanwhile.
/// Long-running setup (thread creation, joins) runs inside one of these so
/// it never holds the interface hostage.
#[must_use = "the context is reacquired as soon as the guard is dropped"]
pub struct ContextReleased<'a> {
    context: &'a dyn ExecutionContext,
    depth: usize,
}

impl<'a> ContextReleased<'a> {
    pub fn new(context: &'a dyn ExecutionContext) -> Self {
        let mut depth = 0;
        while context.is_held_by_current_thread() {
            context.unschedule();
            depth += 1;
        }
        Self { context, depth }
    }

    pub fn was_held(&self) -> bool {
        self.depth > 0
    }
}

impl Drop for ContextReleased<'_> {
    fn drop(&mut self) {
        for _ in 0..self.depth {
            self.context.schedule();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_token_marks_current_thread_as_holder() {
        let ctx = GlobalContext::new();
        assert!(!ctx.is_held_by_current_thread());
        {
            let _token = ContextToken::acquire(&ctx);
            assert!(ctx.is_held_by_current_thread());
        }
        assert!(!ctx.is_held_by_current_thread());
        assert!(ctx.owner().is_none());
    }

    #[test]
    fn test_reentrant_schedule_releases_on_outermost() {
        let ctx = GlobalContext::new();
        let outer = ContextToken::acquire(&ctx);
        {
            let _inner = ContextToken::acquire(&ctx);
        }
        assert!(ctx.is_held_by_current_thread());
        drop(outer);
        assert!(!ctx.is_held_by_current_thread());
    }

    #[test]
    fn test_released_guard_gives_up_and_reacquires() {
        let ctx = Arc::new(GlobalContext::new());
        let _token = ContextToken::acquire(&*ctx);

        {
            let released = ContextReleased::new(&*ctx);
            assert!(released.was_held());
            assert!(ctx.owner().is_none());

            // Another thread can enter while we are released.
            let other = Arc::clone(&ctx);
            std::thread::spawn(move || {
                let _token = ContextToken::acquire(&*other);
            })
            .join()
            .unwrap();
        }

        assert!(ctx.is_held_by_current_thread());
    }

    #[test]
    fn test_released_guard_unwinds_nested_holds() {
        let ctx = GlobalContext::new();
        let outer = ContextToken::acquire(&ctx);
        let inner = ContextToken::acquire(&ctx);
        {
            let _released = ContextReleased::new(&ctx);
            assert!(ctx.owner().is_none());
        }

        drop(inner);
        assert!(ctx.is_held_by_current_thread());
        drop(outer);
        assert!(ctx.owner().is_none());
    }

    #[test]
    fn test_released_guard_is_noop_when_not_held() {
        let ctx = GlobalContext::new();
        {
            let released = ContextReleased::new(&ctx);
            assert!(!released.was_held());
        }
        assert!(ctx.owner().is_none());
    }

    #[test]
    fn test_unschedule_from_non_owner_is_ignored() {
        let ctx = Arc::new(GlobalContext::new());
        let _token = ContextToken::acquire(&*ctx);

        let other = Arc::clone(&ctx);
        std::thread::spawn(move || other.unschedule())
            .join()
            .unwrap();

        assert!(ctx.is_held_by_current_thread());
    }

    #[test]
    fn test_mutual_exclusion_across_threads() {
        let ctx = Arc::new(GlobalContext::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let ctx = Arc::clone(&ctx);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let _token = ContextToken::acquire(&*ctx);
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_micros(50));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
