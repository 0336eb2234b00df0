//! Host selection.
//!
//! A [`HostResolver`] owns the shared "current host" index and is safe to
//! use from many in-flight requests at once. Each logical request walks the
//! host set through its own [`HostAttempts`], which remembers the hosts that
//! failed during that request so they are never handed out again within it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use adb_domain::config::ResolverStrategy;
use adb_domain::error::{Error, Result};

pub trait HostResolver: Send + Sync + std::fmt::Debug {
    /// Number of configured hosts. Always at least 1.
    fn host_count(&self) -> usize;

    /// Index of the host the next attempt should use.
    fn next_index(&self) -> usize;

    /// Record a connection-level failure on `index`.
    fn mark_unreachable(&self, index: usize);
}

/// Sticks to one host and moves to the next only when it fails.
#[derive(Debug)]
pub struct SingleHostResolver {
    count: usize,
    index: AtomicUsize,
}

impl SingleHostResolver {
    pub fn new(count: usize) -> Result<Self> {
        check_count(count)?;
        Ok(Self {
            count,
            index: AtomicUsize::new(0),
        })
    }
}

impl HostResolver for SingleHostResolver {
    fn host_count(&self) -> usize {
        self.count
    }

    fn next_index(&self) -> usize {
        self.index.load(Ordering::Acquire)
    }

    fn mark_unreachable(&self, index: usize) {
        // Only the first request to notice the failure advances the index.
        let _ = self.index.compare_exchange(
            index,
            (index + 1) % self.count,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Hands out hosts in turn, one per attempt.
#[derive(Debug)]
pub struct RoundRobinHostResolver {
    count: usize,
    index: AtomicUsize,
}

impl RoundRobinHostResolver {
    pub fn new(count: usize) -> Result<Self> {
        check_count(count)?;
        Ok(Self {
            count,
            index: AtomicUsize::new(0),
        })
    }
}

impl HostResolver for RoundRobinHostResolver {
    fn host_count(&self) -> usize {
        self.count
    }

    fn next_index(&self) -> usize {
        let count = self.count;
        match self
            .index
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % count))
        {
            Ok(prev) | Err(prev) => prev,
        }
    }

    fn mark_unreachable(&self, _index: usize) {}
}

pub fn get_resolver(strategy: ResolverStrategy, host_count: usize) -> Result<Arc<dyn HostResolver>> {
    let resolver: Arc<dyn HostResolver> = match strategy {
        ResolverStrategy::Single => Arc::new(SingleHostResolver::new(host_count)?),
        ResolverStrategy::RoundRobin => Arc::new(RoundRobinHostResolver::new(host_count)?),
    };
    Ok(resolver)
}

fn check_count(count: usize) -> Result<()> {
    if count == 0 {
        return Err(Error::InvalidArgument(
            "at least one host is required".into(),
        ));
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-request attempt tracking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Failover budget for one logical request: one attempt per host.
#[derive(Debug)]
pub struct HostAttempts<'a> {
    resolver: &'a dyn HostResolver,
    failed: Vec<bool>,
    remaining: usize,
    used: usize,
}

impl<'a> HostAttempts<'a> {
    pub fn new(resolver: &'a dyn HostResolver) -> Self {
        let count = resolver.host_count().max(1);
        Self {
            resolver,
            failed: vec![false; count],
            remaining: count,
            used: 0,
        }
    }

    /// Next host to try, skipping hosts that failed earlier in this request.
    /// `None` once every host has failed.
    pub fn next_host(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let count = self.failed.len();
        let start = self.resolver.next_index() % count;
        let index = (0..count)
            .map(|offset| (start + offset) % count)
            .find(|&i| !self.failed[i])?;
        self.used += 1;
        Some(index)
    }

    pub fn mark_unreachable(&mut self, index: usize) {
        if let Some(slot) = self.failed.get_mut(index) {
            if !*slot {
                *slot = true;
                self.remaining -= 1;
            }
        }
        self.resolver.mark_unreachable(index);
    }

    /// Attempts handed out so far.
    pub fn used(&self) -> usize {
        self.used
    }
}
