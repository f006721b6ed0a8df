//! Single-shot connectivity broadcast

use tokio_util::sync::CancellationToken;

/// Fired once when the transport reports it is connected.
///
/// Every clone observes the same signal; waiters that arrive after it fired
/// resolve immediately. Firing more than once has no effect.
#[derive(Debug, Clone, Default)]
pub struct ConnectivitySignal {
    token: CancellationToken,
}

impl ConnectivitySignal {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn fire(&self) {
        self.token.cancel();
    }

    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn wait(&self) {
        self.token.cancelled().await
    }
}
