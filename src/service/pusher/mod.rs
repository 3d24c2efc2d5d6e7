// =============================================================================
// FitPulse Social Fitness Backend - Push Notification Dispatch
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   Best-effort push dispatch for users without an open connection. The
//   provider integration is an external collaborator behind a narrow trait;
//   failures are logged and never surfaced to the sender.
//
// =============================================================================

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::Result;

#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn push(&self, user_ids: &[i64], title: &str, body: &str) -> Result<()>;
}

/// Provider used when no push gateway is wired up.
#[derive(Debug, Default)]
pub struct LogOnlyProvider;

#[async_trait]
impl PushProvider for LogOnlyProvider {
    async fn push(&self, user_ids: &[i64], title: &str, body: &str) -> Result<()> {
        debug!(?user_ids, title, body, "push suppressed (no provider configured)");
        Ok(())
    }
}

pub struct Service {
    provider: Arc<dyn PushProvider>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("pusher::Service").finish()
    }
}

impl Service {
    pub fn log_only() -> Self {
        Self {
            provider: Arc::new(LogOnlyProvider),
        }
    }

    pub fn with_provider(provider: Arc<dyn PushProvider>) -> Self {
        Self { provider }
    }

    /// Fire-and-forget dispatch. The send happens on its own task so a slow
    /// provider never delays the message broadcast that triggered it.
    pub fn dispatch(&self, user_ids: Vec<i64>, title: String, body: String) {
        if user_ids.is_empty() {
            return;
        }
        let provider = Arc::clone(&self.provider);
        tokio::spawn(async move {
            if let Err(e) = provider.push(&user_ids, &title, &body).await {
                warn!(error = %e, ?user_ids, "push notification failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingProvider {
        sent: Mutex<Vec<(Vec<i64>, String)>>,
    }

    #[async_trait]
    impl PushProvider for RecordingProvider {
        async fn push(&self, user_ids: &[i64], title: &str, _body: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((user_ids.to_vec(), title.to_owned()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_reaches_provider() {
        let provider = Arc::new(RecordingProvider {
            sent: Mutex::new(Vec::new()),
        });
        let pusher = Service::with_provider(provider.clone());
        pusher.dispatch(vec![1, 2], "runner".to_owned(), "hello".to_owned());

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let sent = provider.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_empty_recipient_list_is_skipped() {
        let provider = Arc::new(RecordingProvider {
            sent: Mutex::new(Vec::new()),
        });
        let pusher = Service::with_provider(provider.clone());
        pusher.dispatch(Vec::new(), "t".to_owned(), "b".to_owned());

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(provider.sent.lock().unwrap().is_empty());
    }
}
