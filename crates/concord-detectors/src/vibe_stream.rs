use std::time::Duration;

use concord_core::types::{ChangeEvent, ChangeKind, TrackerSource};
use futures_util::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use tracing::{info, warn};

/// Raw shape of one Vibe task-change SSE frame.
#[derive(Debug, Clone, Deserialize)]
struct VibeTaskChangeFrame {
    id: String,
    kind: String,
}

fn change_kind_from_str(raw: &str) -> ChangeKind {
    match raw {
        "create" | "created" => ChangeKind::Create,
        "update" | "updated" => ChangeKind::Update,
        "delete" | "deleted" => ChangeKind::Delete,
        _ => ChangeKind::Unknown,
    }
}

/// Long-lived SSE connection to the Vibe server stream endpoint (§4.4, §6).
/// Reconnects with exponential backoff (1s -> 30s, capped) whenever the
/// underlying connection drops; each successfully parsed frame yields one
/// [`ChangeEvent`].
pub struct VibeEventStream {
    url: String,
    token: String,
    backoff: Duration,
}

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

impl VibeEventStream {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            backoff: MIN_BACKOFF,
        }
    }

    fn reset_backoff(&mut self) {
        self.backoff = MIN_BACKOFF;
    }

    fn bump_backoff(&mut self) -> Duration {
        let wait = self.backoff;
        self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
        wait
    }

    /// Run forever, sending each decoded [`ChangeEvent`] on `tx`. Returns
    /// only if `tx` is closed (the dispatcher shut down) — connection drops
    /// are retried internally, never propagated as an error.
    pub async fn run(&mut self, tx: flume::Sender<ChangeEvent>) {
        loop {
            match self.connect_once(&tx).await {
                ConnectOutcome::ChannelClosed => return,
                ConnectOutcome::Disconnected => {
                    let wait = self.bump_backoff();
                    warn!(?wait, "vibe event stream disconnected, reconnecting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    async fn connect_once(&mut self, tx: &flume::Sender<ChangeEvent>) -> ConnectOutcome {
        let client = reqwest::Client::new();
        let request = client.get(&self.url).bearer_auth(&self.token);
        let mut source = match EventSource::new(request) {
            Ok(source) => source,
            Err(e) => {
                warn!(error = %e, "failed to build vibe event source");
                return ConnectOutcome::Disconnected;
            }
        };

        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => {
                    info!("vibe event stream connected");
                    self.reset_backoff();
                }
                Ok(Event::Message(message)) => {
                    let Ok(frame) = serde_json::from_str::<VibeTaskChangeFrame>(&message.data) else {
                        warn!(data = %message.data, "unparseable vibe sse frame, skipping");
                        continue;
                    };
                    let change_event = ChangeEvent::new(
                        TrackerSource::Vibe,
                        frame.id.clone(),
                        change_kind_from_str(&frame.kind),
                        serde_json::json!({ "id": frame.id, "kind": frame.kind }),
                    );
                    if tx.send_async(change_event).await.is_err() {
                        return ConnectOutcome::ChannelClosed;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "vibe event stream error");
                    source.close();
                    return ConnectOutcome::Disconnected;
                }
            }
        }
        ConnectOutcome::Disconnected
    }
}

enum ConnectOutcome {
    Disconnected,
    ChannelClosed,
}
