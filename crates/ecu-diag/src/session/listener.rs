//! Broadcast frame listener

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::EventSink;
use crate::signals::{BroadcastDecoder, SignalHub, SignalMap, SignalUpdate};
use crate::transport::{CanTransport, FrameSubscription};

/// Decode broadcast frames into the signal map until `cancel` fires
///
/// The subscription is taken before this returns, so no frame sent after
/// the call is missed.
pub(crate) fn spawn_broadcast_listener(
    transport: &Arc<dyn CanTransport>,
    decoder: Arc<dyn BroadcastDecoder>,
    map: SignalMap,
    hub: SignalHub,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut frames = FrameSubscription::new(transport.subscribe(), decoder.frame_ids());

    tokio::spawn(async move {
        loop {
            let incoming = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                incoming = frames.recv() => incoming,
            };

            match incoming {
                Ok(incoming) => {
                    for signal in decoder.decode(&incoming.frame) {
                        if let Some(text) = signal.text {
                            map.set(signal.name, text);
                        }
                        sink.set_value(signal.name, signal.value);
                        hub.publish(SignalUpdate::new(signal.name, signal.value));
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Broadcast listener stopped");
                    break;
                }
            }
        }
        debug!("Broadcast listener finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockConfig;
    use crate::events::NullSink;
    use crate::signals::Trionic7Broadcast;
    use crate::transport::{CanFrame, MockTransport};

    #[tokio::test]
    async fn test_frames_update_map_and_hub() {
        let mock = Arc::new(MockTransport::new(&MockConfig::default()));
        let transport: Arc<dyn CanTransport> = mock.clone();
        let map = SignalMap::new();
        let hub = SignalHub::new();
        let mut speed = hub.subscribe(["In.v_Vehicle"], 4);
        let cancel = CancellationToken::new();

        let handle = spawn_broadcast_listener(
            &transport,
            Arc::new(Trionic7Broadcast),
            map.clone(),
            hub.clone(),
            Arc::new(NullSink),
            cancel.clone(),
        );

        mock.inject_frame(CanFrame::new(0x3A0, vec![0x00, 0x00, 0x00, 0x01, 0xF4]));
        let update = speed.recv().await.unwrap();
        assert_eq!(update.value, 50.0);
        assert_eq!(map.get("In.v_Vehicle").as_deref(), Some("50.0"));

        cancel.cancel();
        handle.await.unwrap();
    }
}
