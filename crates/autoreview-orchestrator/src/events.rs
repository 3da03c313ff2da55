use autoreview_core::review::ReviewResult;
use autoreview_core::types::ReviewKey;
use serde::Serialize;
use subprocess_runner::AuthFailureInfo;
use tokio::sync::broadcast;

/// Coarse stage of a review, carried on progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStage {
    Fetching,
    WaitingForCi,
    Validating,
    Analyzing,
    Saving,
}

/// Notification for UI subscribers, scoped to one review item.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReviewEvent {
    #[serde(rename_all = "camelCase")]
    Progress {
        project_id: String,
        item_number: u64,
        stage: ReviewStage,
        percent: u8,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        project_id: String,
        item_number: u64,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        project_id: String,
        item_number: u64,
        result: Box<ReviewResult>,
    },
    #[serde(rename_all = "camelCase")]
    AuthFailure {
        project_id: String,
        item_number: u64,
        info: AuthFailureInfo,
    },
}

impl ReviewEvent {
    pub fn progress(key: &ReviewKey, stage: ReviewStage, percent: u8, message: impl Into<String>) -> Self {
        ReviewEvent::Progress {
            project_id: key.project_id().to_string(),
            item_number: key.item_number(),
            stage,
            percent,
            message: message.into(),
        }
    }

    pub fn error(key: &ReviewKey, error: impl Into<String>) -> Self {
        ReviewEvent::Error {
            project_id: key.project_id().to_string(),
            item_number: key.item_number(),
            error: error.into(),
        }
    }

    pub fn complete(key: &ReviewKey, result: ReviewResult) -> Self {
        ReviewEvent::Complete {
            project_id: key.project_id().to_string(),
            item_number: key.item_number(),
            result: Box::new(result),
        }
    }

    pub fn auth_failure(key: &ReviewKey, info: AuthFailureInfo) -> Self {
        ReviewEvent::AuthFailure {
            project_id: key.project_id().to_string(),
            item_number: key.item_number(),
            info,
        }
    }

    pub fn project_id(&self) -> &str {
        match self {
            ReviewEvent::Progress { project_id, .. }
            | ReviewEvent::Error { project_id, .. }
            | ReviewEvent::Complete { project_id, .. }
            | ReviewEvent::AuthFailure { project_id, .. } => project_id,
        }
    }

    pub fn item_number(&self) -> u64 {
        match self {
            ReviewEvent::Progress { item_number, .. }
            | ReviewEvent::Error { item_number, .. }
            | ReviewEvent::Complete { item_number, .. }
            | ReviewEvent::AuthFailure { item_number, .. } => *item_number,
        }
    }

    pub fn is_for(&self, key: &ReviewKey) -> bool {
        self.project_id() == key.project_id() && self.item_number() == key.item_number()
    }
}

/// Broadcast bus for [`ReviewEvent`]s. Sending with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ReviewEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReviewEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ReviewEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_camel_case_with_scope() {
        let key = ReviewKey::new("app", 12).unwrap();
        let json = serde_json::to_value(ReviewEvent::progress(
            &key,
            ReviewStage::WaitingForCi,
            5,
            "Waiting for CI",
        ))
        .unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["projectId"], "app");
        assert_eq!(json["itemNumber"], 12);
        assert_eq!(json["stage"], "waiting_for_ci");
    }

    #[test]
    fn scope_filtering() {
        let a = ReviewKey::new("app", 1).unwrap();
        let b = ReviewKey::new("app", 2).unwrap();
        let ev = ReviewEvent::error(&a, "boom");
        assert!(ev.is_for(&a));
        assert!(!ev.is_for(&b));
    }

    #[tokio::test]
    async fn bus_delivers_to_subscribers() {
        let bus = EventBus::default();
        bus.emit(ReviewEvent::error(&ReviewKey::new("x", 1).unwrap(), "dropped"));
        let mut rx = bus.subscribe();
        let key = ReviewKey::new("x", 2).unwrap();
        bus.emit(ReviewEvent::error(&key, "seen"));
        let ev = rx.recv().await.unwrap();
        assert!(ev.is_for(&key));
    }
}
