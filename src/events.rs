//! Domain event publishing over NATS.
//!
//! Publishing is fire-and-forget: a dead broker degrades to a warning, never
//! to a failed checkout. The client is optional so local setups run without
//! a broker at all.

use serde::Serialize;

use crate::domain::Order;

pub const ORDER_PLACED_SUBJECT: &str = "loomcart.orders.placed";

#[derive(Serialize)]
struct OrderPlaced<'a> {
    order_id: &'a str,
    customer_id: &'a str,
    total: i64,
    item_count: usize,
}

#[derive(Clone)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self {
        Self { nats }
    }

    pub fn disabled() -> Self {
        Self { nats: None }
    }

    pub async fn order_placed(&self, order: &Order) {
        let Some(client) = &self.nats else {
            return;
        };
        let event = OrderPlaced {
            order_id: &order.id,
            customer_id: &order.customer_id,
            total: order.total,
            item_count: order.items.len(),
        };
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode order event");
                return;
            }
        };
        if let Err(err) = client
            .publish(ORDER_PLACED_SUBJECT.to_string(), payload.into())
            .await
        {
            tracing::warn!(order_id = %order.id, error = %err, "failed to publish order event");
        }
    }
}
