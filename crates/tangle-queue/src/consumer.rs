//! The single long-lived queue consumer.
//!
//! Registered once at startup. Each delivery is decoded, persisted off the
//! async runtime, and acknowledged only after the insert succeeds. A failed
//! insert is nacked and redelivered up to [`MAX_DELIVERIES`](crate::MAX_DELIVERIES)
//! times, after which the waiting producer is failed explicitly.

use std::sync::Arc;

use tangle_db::models::ThreadRow;
use tangle_db::{Database, now_rfc3339};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{MAX_DELIVERIES, QueueError, QueueMessage, QueueReceiver, THREAD_QUEUE, ThreadQueue};

pub async fn run_consumer(mut receiver: QueueReceiver, queue: ThreadQueue, db: Arc<Database>) {
    info!(queue = THREAD_QUEUE, "thread consumer started");

    while let Some(delivery) = receiver.recv().await {
        let correlation_id = delivery.correlation_id();

        let message = match delivery.message() {
            Ok(message) => message,
            Err(e) => {
                // An undecodable body can never succeed, settle it now.
                warn!(%correlation_id, error = %e, "discarding undecodable message");
                queue.complete(correlation_id, Err(e)).await;
                delivery.ack();
                continue;
            }
        };

        match persist_thread(&db, &message).await {
            Ok(row) => {
                // Ack strictly after the row is durable.
                delivery.ack();
                info!(%correlation_id, thread_id = %row.id, "queued thread persisted");
                queue.complete(correlation_id, Ok(row)).await;
            }
            Err(e) => {
                let attempt = delivery.attempt();
                error!(%correlation_id, attempt, error = %e, "persisting queued thread failed");
                if attempt >= MAX_DELIVERIES {
                    queue
                        .complete(correlation_id, Err(QueueError::Persist(e.to_string())))
                        .await;
                    delivery.ack();
                } else {
                    delivery.nack();
                }
            }
        }
    }

    info!(queue = THREAD_QUEUE, "thread consumer stopped");
}

async fn persist_thread(db: &Arc<Database>, message: &QueueMessage) -> anyhow::Result<ThreadRow> {
    let row = ThreadRow {
        id: Uuid::new_v4().to_string(),
        author_id: message.user.to_string(),
        content: message.content.clone(),
        images: serde_json::to_string(&message.image)?,
        created_at: now_rfc3339(),
    };

    let db = db.clone();
    let insert = row.clone();
    tokio::task::spawn_blocking(move || db.insert_thread(&insert)).await??;

    Ok(row)
}
