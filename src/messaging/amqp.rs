//! # AMQP Transport
//!
//! RabbitMQ implementation of the transport traits on top of lapin.
//!
//! lapin reports connection failures through a single `on_error` callback; it
//! is installed once at connect time and fans out to every registered
//! [`ConnectionListener`] as an `Error` event followed by `Closed`, since a
//! lapin connection that raised an error is no longer usable.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection, ConnectionProperties};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::errors::{ConnectError, MessagingError, MessagingResult};
use super::transport::{
    BrokerChannel, BrokerConnection, ConnectionEvent, ConnectionListener, ConsumeOptions,
    Connector, Delivery, DeliveryStream, ExchangeKind, ExchangeOptions, QueueOptions,
};
use crate::config::ConnectOptions;

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> Self {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
        }
    }
}

/// Opens RabbitMQ connections
#[derive(Debug, Clone, Copy, Default)]
pub struct AmqpConnector;

#[async_trait]
impl Connector for AmqpConnector {
    type Connection = AmqpConnection;

    async fn connect(&self, options: &ConnectOptions) -> Result<AmqpConnection, ConnectError> {
        let mut properties = ConnectionProperties::default();
        if let Some(name) = &options.connection_name {
            properties = properties.with_connection_name(name.clone().into());
        }

        info!(broker = %options.redacted_uri(), "🔌 Connecting to message broker");
        let connection = Connection::connect(&options.amqp_uri(), properties)
            .await
            .map_err(|e| ConnectError::Failed(MessagingError::connection(e.to_string())))?;

        let listeners: Arc<Mutex<Vec<ConnectionListener>>> = Arc::new(Mutex::new(Vec::new()));
        let fanout = listeners.clone();
        connection.on_error(move |err| {
            error!(error = %err, "❌ AMQP connection error");
            let listeners = fanout.lock();
            for listener in listeners.iter() {
                listener(ConnectionEvent::Error(err.to_string()));
            }
            for listener in listeners.iter() {
                listener(ConnectionEvent::Closed);
            }
        });

        info!("✅ Connected to message broker");
        Ok(AmqpConnection {
            connection,
            listeners,
        })
    }
}

/// An open RabbitMQ connection
pub struct AmqpConnection {
    connection: Connection,
    listeners: Arc<Mutex<Vec<ConnectionListener>>>,
}

impl AmqpConnection {
    /// Close the connection with a normal reply code
    pub async fn close(&self) -> MessagingResult<()> {
        self.connection
            .close(200, "closing")
            .await
            .map_err(MessagingError::from)
    }
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    type Channel = AmqpChannel;

    async fn create_channel(&self) -> MessagingResult<AmqpChannel> {
        let channel = self.connection.create_channel().await?;
        debug!(channel_id = channel.id(), "AMQP channel opened");
        Ok(AmqpChannel { channel })
    }

    fn on_event(&self, listener: ConnectionListener) {
        self.listeners.lock().push(listener);
    }
}

/// An open RabbitMQ channel
pub struct AmqpChannel {
    channel: lapin::Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn assert_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeOptions,
    ) -> MessagingResult<()> {
        self.channel
            .exchange_declare(
                name,
                kind.into(),
                ExchangeDeclareOptions {
                    durable: options.durable,
                    auto_delete: options.auto_delete,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::channel_operation("exchange_declare", e.to_string()))
    }

    async fn assert_queue(&self, name: &str, options: QueueOptions) -> MessagingResult<String> {
        let queue = self
            .channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    exclusive: options.exclusive,
                    durable: options.durable,
                    auto_delete: options.auto_delete,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::channel_operation("queue_declare", e.to_string()))?;

        Ok(queue.name().as_str().to_string())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> MessagingResult<()> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::channel_operation("queue_bind", e.to_string()))
    }

    async fn consume(
        &self,
        queue: &str,
        options: ConsumeOptions,
    ) -> MessagingResult<DeliveryStream> {
        let consumer_tag = format!("{queue}-{}", Uuid::new_v4());
        let consumer = self
            .channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions {
                    no_ack: options.no_ack,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::channel_operation("basic_consume", e.to_string()))?;

        debug!(queue = queue, consumer_tag = %consumer_tag, "AMQP consumer attached");

        // A delivery error ends the stream the same way a consumer cancel does
        let deliveries = consumer
            .take_while(|delivery| {
                if let Err(e) = delivery {
                    warn!(error = %e, "⚠️ AMQP consumer stopped");
                }
                futures::future::ready(delivery.is_ok())
            })
            .filter_map(|delivery| {
                futures::future::ready(delivery.ok().map(|delivery| {
                    Delivery::new(
                        delivery.exchange.as_str(),
                        delivery.routing_key.as_str(),
                        Bytes::from(delivery.data),
                    )
                }))
            });

        Ok(deliveries.boxed())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Bytes,
    ) -> MessagingResult<()> {
        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| MessagingError::channel_operation("basic_publish", e.to_string()))?;
        Ok(())
    }
}
