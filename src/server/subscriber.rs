use std::sync::Arc;

use futures::SinkExt;
use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use warp::ws::Message;
use warp::ws::WebSocket;

use crate::SubscriberHub;

/// Lifetime of one push-channel connection.
///
/// Registered with the hub on connect and removed on disconnect, whichever
/// side ends it. Inbound frames are drained and ignored.
pub async fn serve_subscriber(
    socket: WebSocket,
    hub: Arc<SubscriberHub>,
) {
    let (id, rx) = hub.register();
    let (mut outbound, mut inbound) = socket.split();
    let mut frames = ReceiverStream::new(rx);

    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(frame) => {
                    if let Err(e) = outbound.send(Message::text(frame)).await {
                        debug!(subscriber_id = %id, "send failed: {}", e);
                        break;
                    }
                }
                // hub dropped our sender: shutdown, or we fell too far behind
                None => {
                    let _ = outbound.close().await;
                    break;
                }
            },
            msg = inbound.next() => match msg {
                Some(Ok(msg)) if msg.is_close() => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(subscriber_id = %id, "receive failed: {}", e);
                    break;
                }
                None => break,
            },
        }
    }

    hub.unregister(&id);
}
