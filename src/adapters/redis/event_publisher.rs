//! Redis-backed event publisher for production deployments.
//!
//! Publishes each event as its JSON form with `PUBLISH` on the channel
//! `<channel_prefix><kind>`. Redis acknowledges a `PUBLISH` once the message
//! is handed to current subscribers, which is the acceptance point the
//! outbox waits for. A publish no subscriber received fails with
//! `PublishFailed` and the entry is retried.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RedisConfig;
use crate::domain::foundation::{DomainError, ErrorCode, Event};
use crate::ports::EventPublisher;

/// Redis pub/sub publisher.
///
/// Tracks connectivity from the outcome of the last broker call so the
/// publisher loop can wait out an outage instead of failing every event.
/// A dropped connection is re-established by `reconnect`, which the health
/// check task calls while the broker is unavailable.
pub struct RedisEventPublisher {
    client: Client,
    conn: RwLock<MultiplexedConnection>,
    channel_prefix: String,
    timeout: Duration,
    connected: AtomicBool,
}

impl RedisEventPublisher {
    /// Create a publisher over an established connection of `client`.
    pub fn new(
        client: Client,
        conn: MultiplexedConnection,
        channel_prefix: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            conn: RwLock::new(conn),
            channel_prefix: channel_prefix.into(),
            timeout,
            connected: AtomicBool::new(true),
        }
    }

    /// Open a multiplexed connection as configured.
    ///
    /// # Errors
    ///
    /// - `BrokerUnavailable` if the URL is invalid or the connection cannot
    ///   be established within the configured timeout
    pub async fn connect(config: &RedisConfig) -> Result<Self, DomainError> {
        let client = Client::open(config.url.as_str()).map_err(map_redis_error)?;
        let conn = open_connection(&client, config.timeout()).await?;

        info!(channel_prefix = %config.channel_prefix, "Connected to Redis broker");
        Ok(Self::new(
            client,
            conn,
            config.channel_prefix.clone(),
            config.timeout(),
        ))
    }

    /// Channel the event is published on.
    pub fn channel_for(&self, kind: &str) -> String {
        channel_name(&self.channel_prefix, kind)
    }

    /// Round-trips a `PING` and refreshes the connectivity flag.
    pub async fn ping(&self) -> Result<(), DomainError> {
        let mut conn = self.conn.read().await.clone();
        let result = redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ());
        self.track(result)
    }

    /// Replaces the connection with a freshly opened one.
    ///
    /// # Errors
    ///
    /// - `BrokerUnavailable` if Redis cannot be reached within the timeout
    pub async fn reconnect(&self) -> Result<(), DomainError> {
        let conn = open_connection(&self.client, self.timeout).await?;
        *self.conn.write().await = conn;
        self.ping().await
    }

    /// Spawns a task that pings every `interval` and reconnects while the
    /// broker is unavailable. Stops on shutdown or when the sender is dropped.
    pub fn spawn_health_check(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let publisher = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                let healthy = match publisher.ping().await {
                    Ok(()) => true,
                    Err(err) if err.code == ErrorCode::BrokerUnavailable => {
                        match publisher.reconnect().await {
                            Ok(()) => true,
                            Err(err) => {
                                debug!(error = %err, "Redis reconnect failed");
                                false
                            }
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "Redis health check failed");
                        true
                    }
                };
                if !healthy {
                    publisher.connected.store(false, Ordering::SeqCst);
                }
            }
        })
    }

    fn track<T>(&self, result: Result<T, RedisError>) -> Result<T, DomainError> {
        match result {
            Ok(value) => {
                if !self.connected.swap(true, Ordering::SeqCst) {
                    info!("Redis broker connection restored");
                }
                Ok(value)
            }
            Err(e) => {
                let err = map_redis_error(e);
                if err.code == ErrorCode::BrokerUnavailable
                    && self.connected.swap(false, Ordering::SeqCst)
                {
                    warn!(error = %err, "Redis broker connection lost");
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    async fn publish(&self, event: &Event) -> Result<(), DomainError> {
        let channel = self.channel_for(event.kind());
        let payload = event.to_json()?;

        let mut conn = self.conn.read().await.clone();
        let receivers: i64 = self
            .track(conn.publish(&channel, payload).await)
            .map_err(|e| e.with_detail("event_id", event.id().to_string()))?;

        ensure_received(receivers, &channel)
            .map_err(|e| e.with_detail("event_id", event.id().to_string()))?;

        debug!(event_id = %event.id(), channel = %channel, receivers, "Event published to Redis");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

async fn open_connection(
    client: &Client,
    timeout: Duration,
) -> Result<MultiplexedConnection, DomainError> {
    tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
        .await
        .map_err(|_| {
            DomainError::new(
                ErrorCode::BrokerUnavailable,
                format!("Redis connection not established within {:?}", timeout),
            )
        })?
        .map_err(map_redis_error)
}

/// Pub/sub keeps nothing for absent subscribers, so a `PUBLISH` nobody
/// received is a failed delivery the outbox must retry.
fn ensure_received(receivers: i64, channel: &str) -> Result<(), DomainError> {
    if receivers > 0 {
        return Ok(());
    }
    Err(DomainError::new(
        ErrorCode::PublishFailed,
        format!("No subscriber received the event on channel '{}'", channel),
    )
    .with_detail("channel", channel))
}

fn channel_name(prefix: &str, kind: &str) -> String {
    format!("{}{}", prefix, kind)
}

/// Connection-level failures make the broker unavailable; anything else is
/// a rejected publish.
fn map_redis_error(err: RedisError) -> DomainError {
    let unavailable = err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout();
    if unavailable {
        DomainError::new(
            ErrorCode::BrokerUnavailable,
            format!("Redis unavailable: {}", err),
        )
    } else {
        DomainError::new(ErrorCode::PublishFailed, format!("Redis rejected publish: {}", err))
    }
}
