// Redis Event Bus - publisher and resilient subscriber

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tagsmith_core::application::admission::EventAdmission;
use tagsmith_core::application::pipeline::Shutdown;
use tagsmith_core::error::{AppError, Result};
use tagsmith_core::port::{EventPublisher, OutboundEvent};
use tokio::time::sleep;
use tracing::{info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

fn map_redis_error(err: redis::RedisError) -> AppError {
    AppError::Queue(err.to_string())
}

/// Publisher half of the events channel.
pub struct RedisEventBus {
    conn: ConnectionManager,
    channel: String,
}

impl RedisEventBus {
    pub async fn connect(url: &str, channel: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(map_redis_error)?;
        Ok(Self {
            conn,
            channel: channel.into(),
        })
    }
}

#[async_trait]
impl EventPublisher for RedisEventBus {
    async fn publish(&self, event: &OutboundEvent) -> Result<()> {
        let mut conn = self.conn.clone();
        let message = serde_json::to_string(event)?;
        let _: () = conn
            .publish(&self.channel, message)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }
}

/// Subscriber half: feeds raw channel messages into event admission.
/// Connection loss reconnects after a short delay; message-level errors
/// never terminate the subscription. On shutdown the channel is
/// unsubscribed before the connection drops.
pub struct RedisEventSubscriber {
    client: redis::Client,
    channel: String,
}

impl RedisEventSubscriber {
    pub fn new(url: &str, channel: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        Ok(Self {
            client,
            channel: channel.into(),
        })
    }

    pub async fn run(&self, admission: Arc<EventAdmission>, mut shutdown: Shutdown) {
        loop {
            if shutdown.is_signalled() {
                break;
            }

            let mut pubsub = match self.client.get_async_pubsub().await {
                Ok(pubsub) => pubsub,
                Err(e) => {
                    warn!(error = %e, "Pub/sub connect failed");
                    if !Self::pause_or_shutdown(&mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            if let Err(e) = pubsub.subscribe(&self.channel).await {
                warn!(channel = %self.channel, error = %e, "Subscribe failed");
                if !Self::pause_or_shutdown(&mut shutdown).await {
                    break;
                }
                continue;
            }
            info!(channel = %self.channel, "Subscribed to events channel");

            let connection_lost = {
                let mut stream = pubsub.on_message();
                loop {
                    tokio::select! {
                        maybe_msg = stream.next() => match maybe_msg {
                            Some(msg) => {
                                match msg.get_payload::<String>() {
                                    Ok(payload) => admission.handle_message(&payload).await,
                                    Err(e) => warn!(error = %e, "Undecodable bus message"),
                                }
                            }
                            None => break true,
                        },
                        _ = shutdown.wait() => break false,
                    }
                }
            };

            if connection_lost {
                warn!(channel = %self.channel, "Pub/sub connection lost, reconnecting");
                if !Self::pause_or_shutdown(&mut shutdown).await {
                    break;
                }
                continue;
            }

            if let Err(e) = pubsub.unsubscribe(&self.channel).await {
                warn!(channel = %self.channel, error = %e, "Unsubscribe failed during shutdown");
            } else {
                info!(channel = %self.channel, "Unsubscribed from events channel");
            }
            break;
        }

        info!("Event subscriber stopped");
    }

    /// Returns false when shutdown arrived during the pause.
    async fn pause_or_shutdown(shutdown: &mut Shutdown) -> bool {
        tokio::select! {
            _ = sleep(RECONNECT_DELAY) => true,
            _ = shutdown.wait() => false,
        }
    }
}
