//! A small state graph in the LangGraph style
//!
//! Each node mutates the shared [`AgentState`] and names the node to run
//! next. The state is checkpointed after every node, and the run is capped
//! at `max_steps` transitions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::checkpoint::Checkpointer;
use super::state::AgentState;
use super::AgentContext;
use crate::types::{AppError, AppResult};

pub const DEFAULT_MAX_STEPS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    Route,
    ToolCall,
    Pipeline,
    Chat,
    Report,
    End,
}

#[async_trait]
pub trait GraphNode: Send + Sync {
    fn id(&self) -> NodeId;

    /// Run the node and return the next node
    async fn run(&self, state: &mut AgentState, ctx: &AgentContext) -> AppResult<NodeId>;
}

pub struct StateGraph {
    nodes: HashMap<NodeId, Arc<dyn GraphNode>>,
    entry: NodeId,
    max_steps: usize,
    checkpointer: Arc<dyn Checkpointer>,
}

impl StateGraph {
    pub fn new(entry: NodeId, checkpointer: Arc<dyn Checkpointer>) -> Self {
        Self {
            nodes: HashMap::new(),
            entry,
            max_steps: DEFAULT_MAX_STEPS,
            checkpointer,
        }
    }

    pub fn add_node(mut self, node: Arc<dyn GraphNode>) -> Self {
        self.nodes.insert(node.id(), node);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn checkpointer(&self) -> &Arc<dyn Checkpointer> {
        &self.checkpointer
    }

    /// Run from the entry node until `End`; returns the visited nodes
    pub async fn invoke(&self, state: &mut AgentState, ctx: &AgentContext) -> AppResult<Vec<NodeId>> {
        let mut current = self.entry;
        let mut visited = Vec::new();

        while current != NodeId::End {
            if visited.len() >= self.max_steps {
                error!(thread_id = %state.thread_id, path = ?visited, "Graph exceeded step limit");
                return Err(AppError::Internal(format!(
                    "agent graph exceeded {} steps",
                    self.max_steps
                )));
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| AppError::Internal(format!("no graph node registered for {:?}", current)))?;

            debug!(thread_id = %state.thread_id, node = ?current, "Running graph node");
            let next = node.run(state, ctx).await;
            self.checkpointer.save(state).await;
            visited.push(current);
            current = next?;
        }

        Ok(visited)
    }
}
