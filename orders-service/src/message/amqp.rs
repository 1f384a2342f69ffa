//! RabbitMQ source (AMQP 0-9-1 via lapin)
//!
//! - queue declared durable, optionally with `x-dead-letter-exchange`
//! - channel prefetch (`basic.qos`) equals the consumer's in-flight bound
//! - manual acknowledgment; `x-delivery-count` feeds the poison-message guard.
//!   Only quorum queues set that header: on a classic queue a redelivery has an
//!   unknown count and the guard never fires.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker as LapinAcker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};

use super::{Acker, Delivery, MessageSource};
use crate::utils::AppError;

/// Header set by quorum queues: number of previous delivery attempts
const DELIVERY_COUNT_HEADER: &str = "x-delivery-count";

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct AmqpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    pub queue: String,
    pub dead_letter_exchange: Option<String>,
    /// Declare the queue with `x-queue-type: quorum`
    pub quorum: bool,
    /// Unacknowledged deliveries the broker may push to this consumer
    pub prefetch: u16,
    pub consumer_tag: String,
}

impl AmqpConfig {
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            urlencoding::encode(&self.vhost)
        )
    }

    /// `queue.declare` arguments
    fn queue_arguments(&self) -> FieldTable {
        let mut arguments = FieldTable::default();
        if self.quorum {
            arguments.insert("x-queue-type".into(), AMQPValue::LongString("quorum".into()));
        }
        if let Some(exchange) = &self.dead_letter_exchange {
            arguments.insert(
                "x-dead-letter-exchange".into(),
                AMQPValue::LongString(exchange.as_str().into()),
            );
        }
        arguments
    }
}

/// [`MessageSource`] consuming one RabbitMQ queue
pub struct AmqpSource {
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
    queue: String,
}

impl AmqpSource {
    pub async fn connect(config: &AmqpConfig) -> Result<Self, AppError> {
        let connection = Connection::connect(&config.uri(), ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .queue_declare(
                &config.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                config.queue_arguments(),
            )
            .await?;

        channel
            .basic_qos(config.prefetch, BasicQosOptions::default())
            .await?;

        let consumer = channel
            .basic_consume(
                &config.queue,
                &config.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        if !config.quorum {
            tracing::warn!(
                queue = %config.queue,
                "Classic queue: redeliveries carry no delivery count, poison guard inactive"
            );
        }

        tracing::info!(
            queue = %config.queue,
            quorum = config.quorum,
            prefetch = config.prefetch,
            dead_letter_exchange = ?config.dead_letter_exchange,
            "Consuming from RabbitMQ"
        );

        Ok(Self {
            connection,
            channel,
            consumer,
            queue: config.queue.clone(),
        })
    }
}

/// Total deliveries of a message including the current one.
///
/// Quorum queues report previous attempts in `x-delivery-count`. Without the
/// header a first delivery is known to be the first; a redelivery is unknown.
fn delivery_count(properties: &BasicProperties, redelivered: bool) -> Option<u32> {
    let previous = properties
        .headers()
        .as_ref()
        .and_then(|headers| {
            headers
                .inner()
                .iter()
                .find(|(key, _)| key.as_str() == DELIVERY_COUNT_HEADER)
                .and_then(|(_, value)| amqp_int(value))
        });

    match previous {
        Some(previous) => Some(previous.saturating_add(1)),
        None if !redelivered => Some(1),
        None => None,
    }
}

fn amqp_int(value: &AMQPValue) -> Option<u32> {
    let n: i64 = match value {
        AMQPValue::ShortShortInt(v) => (*v).into(),
        AMQPValue::ShortShortUInt(v) => (*v).into(),
        AMQPValue::ShortInt(v) => (*v).into(),
        AMQPValue::ShortUInt(v) => (*v).into(),
        AMQPValue::LongInt(v) => (*v).into(),
        AMQPValue::LongUInt(v) => (*v).into(),
        AMQPValue::LongLongInt(v) => *v,
        _ => return None,
    };
    u32::try_from(n).ok()
}

#[async_trait]
impl MessageSource for AmqpSource {
    async fn next(&mut self) -> Option<Result<Delivery, AppError>> {
        let delivery = match self.consumer.next().await? {
            Ok(delivery) => delivery,
            Err(e) => return Some(Err(e.into())),
        };

        let count = delivery_count(&delivery.properties, delivery.redelivered);
        Some(Ok(Delivery::new(
            delivery.delivery_tag,
            delivery.data,
            delivery.redelivered,
            count,
            Box::new(AmqpAcker(delivery.acker)),
        )))
    }

    async fn close(&mut self) -> Result<(), AppError> {
        tracing::info!(queue = %self.queue, "Closing RabbitMQ channel");
        self.channel.close(200, "consumer shutdown").await?;
        self.connection.close(200, "consumer shutdown").await?;
        Ok(())
    }
}

struct AmqpAcker(LapinAcker);

#[async_trait]
impl Acker for AmqpAcker {
    async fn ack(self: Box<Self>) -> Result<(), AppError> {
        self.0.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), AppError> {
        self.0
            .nack(BasicNackOptions {
                requeue,
                ..BasicNackOptions::default()
            })
            .await?;
        Ok(())
    }
}
