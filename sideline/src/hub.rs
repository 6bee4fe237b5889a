use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use serde_json::Value;
use tokio::{
    net::TcpStream,
    select,
    sync::watch,
    task::JoinHandle,
    time::{Duration, sleep},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Factory for push-channel subscriptions. One instance per process,
/// constructed explicitly and passed to whoever subscribes.
pub struct HubClient {
    base_url: String,
}

impl HubClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Opens one transport connection for the topic and dispatches every
    /// well-formed message to `on_message`. Returns `None` when the initial
    /// connection cannot be established; nothing propagates to the caller's
    /// control flow.
    pub async fn subscribe<F>(&self, topic: &str, on_message: F) -> Option<ChannelHandle>
    where
        F: Fn(Value) + Send + 'static,
    {
        let url = self.base_url.clone();
        let mut socket = match connect_async(url.as_str()).await {
            Ok((socket, _response)) => socket,
            Err(e) => {
                warn!("Connection to hub failed for topic {topic}: {e}");
                return None;
            }
        };

        if let Err(e) = socket
            .send(Message::Text(subscribe_frame(topic).into()))
            .await
        {
            warn!("Subscribing to topic {topic} failed: {e}");
            return None;
        }
        info!("Subscribed to hub topic {topic}");

        let (stop_tx, stop_rx) = watch::channel(false);
        let join = tokio::spawn(channel_loop(
            socket,
            url,
            topic.to_string(),
            on_message,
            stop_rx,
        ));

        Some(ChannelHandle {
            topic: topic.to_string(),
            stop_tx: Some(stop_tx),
            join: Some(join),
        })
    }
}

/// Owner handle for one live subscription. Must be stopped when the session
/// is torn down; an unstopped handle keeps the reconnect loop alive.
#[derive(Debug)]
pub struct ChannelHandle {
    topic: String,
    stop_tx: Option<watch::Sender<bool>>,
    join: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Idempotent; never panics after the owning session is torn down.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
            info!("Stopping channel for topic {}", self.topic);
        }
        self.join.take();
    }

    #[cfg(test)]
    pub(crate) fn dummy(topic: &str) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let _ = stop_rx.changed().await;
        });
        Self {
            topic: topic.to_string(),
            stop_tx: Some(stop_tx),
            join: Some(join),
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn subscribe_frame(topic: &str) -> String {
    serde_json::json!({ "subscribe": topic }).to_string()
}

async fn channel_loop<F>(
    mut socket: WsStream,
    url: String,
    topic: String,
    on_message: F,
    mut stop_rx: watch::Receiver<bool>,
) where
    F: Fn(Value) + Send + 'static,
{
    loop {
        select! {
            _ = stop_rx.changed() => {
                let _ = socket.close(None).await;
                info!("Channel for topic {topic} closed");
                return;
            }
            next = socket.next() => {
                match next {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<Value>(&text) {
                        Ok(payload) => on_message(payload),
                        Err(_) => warn!("Corrupted update on topic {topic} discarded"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("Hub connection lost for topic {topic}, reconnecting");
                        match reconnect(&url, &topic, &mut stop_rx).await {
                            Some(new_socket) => socket = new_socket,
                            None => return,
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Hub read error on topic {topic}: {e}, reconnecting");
                        match reconnect(&url, &topic, &mut stop_rx).await {
                            Some(new_socket) => socket = new_socket,
                            None => return,
                        }
                    }
                }
            }
        }
    }
}

/// Retries until reconnected and resubscribed, or until stopped (`None`).
async fn reconnect(url: &str, topic: &str, stop_rx: &mut watch::Receiver<bool>) -> Option<WsStream> {
    loop {
        select! {
            _ = stop_rx.changed() => return None,
            _ = sleep(RECONNECT_DELAY) => {}
        }

        match connect_async(url).await {
            Ok((mut socket, _response)) => {
                match socket.send(Message::Text(subscribe_frame(topic).into())).await {
                    Ok(()) => {
                        info!("Reconnected to hub topic {topic}");
                        return Some(socket);
                    }
                    Err(e) => warn!("Resubscribing to topic {topic} failed: {e}"),
                }
            }
            Err(e) => warn!("Hub reconnect failed for topic {topic}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut handle = ChannelHandle::dummy("team-totals/1");
        assert_eq!(handle.topic(), "team-totals/1");
        handle.stop();
        handle.stop();
        handle.stop();
    }

    #[tokio::test]
    async fn test_stop_ends_the_task() {
        let mut handle = ChannelHandle::dummy("action-list/1");
        let join = handle.join.take().unwrap();
        handle.stop();
        join.await.unwrap();
    }
}
