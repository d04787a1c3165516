use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::state::AgentState;

/// Threads kept by [`MemoryCheckpointer::new`]
pub const DEFAULT_MAX_THREADS: usize = 1000;

/// Persists thread state between graph nodes and between turns
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn load(&self, thread_id: &str) -> Option<AgentState>;

    async fn save(&self, state: &AgentState);
}

struct Entry {
    state: AgentState,
    /// Save sequence number; the lowest is the least recently updated thread
    updated_at: u64,
}

#[derive(Default)]
struct Threads {
    entries: HashMap<String, Entry>,
    clock: u64,
}

/// In-process checkpointer holding at most `capacity` threads
///
/// Saving past the capacity evicts the least recently updated thread.
#[derive(Clone)]
pub struct MemoryCheckpointer {
    inner: Arc<RwLock<Threads>>,
    capacity: usize,
}

impl Default for MemoryCheckpointer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_THREADS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::default(),
            capacity: capacity.max(1),
        }
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn load(&self, thread_id: &str) -> Option<AgentState> {
        let guard = self.inner.read().await;
        guard.entries.get(thread_id).map(|e| e.state.clone())
    }

    async fn save(&self, state: &AgentState) {
        let mut guard = self.inner.write().await;
        guard.clock += 1;
        let updated_at = guard.clock;
        guard.entries.insert(
            state.thread_id.clone(),
            Entry {
                state: state.clone(),
                updated_at,
            },
        );

        while guard.entries.len() > self.capacity {
            let Some(oldest) = guard
                .entries
                .iter()
                .min_by_key(|(_, e)| e.updated_at)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            guard.entries.remove(&oldest);
            debug!(thread_id = %oldest, "Evicted idle thread");
        }
    }
}
