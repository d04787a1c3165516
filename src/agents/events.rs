use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::state::Route;
use crate::pipeline::{StepObserver, StepOutcome};
use crate::tools::ToolOutput;

/// One server-sent event of a conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Text { content: String },
    Link { url: String, content: String },
    Route { route: Route },
    ToolStart { name: String, arguments: serde_json::Value },
    ToolEnd { name: String, output: ToolOutput },
    Step { outcome: StepOutcome },
    Done { thread_id: String },
}

impl AgentEvent {
    pub fn text(content: impl Into<String>) -> Self {
        AgentEvent::Text { content: content.into() }
    }

    pub fn from_output(output: &ToolOutput) -> Self {
        match output {
            ToolOutput::Text { content } => AgentEvent::Text { content: content.clone() },
            ToolOutput::Link { url, content } => AgentEvent::Link {
                url: url.clone(),
                content: content.clone(),
            },
        }
    }
}

/// Sending half of a turn's event channel
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<AgentEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<AgentEvent>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AgentEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// A receiver that went away is not an error; the turn still completes
    pub async fn send(&self, event: AgentEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("Event receiver closed, dropping event");
        }
    }
}

#[async_trait]
impl StepObserver for EventSink {
    async fn on_step(&self, outcome: &StepOutcome) {
        self.send(AgentEvent::Step {
            outcome: outcome.clone(),
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let text = serde_json::to_value(AgentEvent::text("hello")).unwrap();
        assert_eq!(text, serde_json::json!({"type": "text", "content": "hello"}));

        let route = serde_json::to_value(AgentEvent::Route { route: Route::Pipeline }).unwrap();
        assert_eq!(route, serde_json::json!({"type": "route", "route": "pipeline"}));

        let link = AgentEvent::from_output(&ToolOutput::link("http://x/r.pdf", "Report"));
        assert_eq!(
            serde_json::to_value(link).unwrap(),
            serde_json::json!({"type": "link", "url": "http://x/r.pdf", "content": "Report"})
        );
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (sink, rx) = EventSink::channel(1);
        drop(rx);
        sink.send(AgentEvent::text("ignored")).await;
    }
}
