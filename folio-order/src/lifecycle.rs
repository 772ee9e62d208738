use chrono::{DateTime, Utc};
use folio_core::repository::{ConflictKind, CourierRepository, OrderRepository, OrderTransition, StoreError};
use folio_core::{
    CoreError, CoreResult, Courier, Delivery, DeliveryStatus, Order, OrderStatus, RejectReason,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::notifier::Notifier;

/// What a status change or courier change will write
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    pub status: OrderStatus,
    pub delivery: Option<Delivery>,
    /// The delivery was created, changed status, or changed courier
    pub notify: bool,
}

impl TransitionPlan {
    /// Transition guarded by the order and delivery the plan was made from.
    pub fn into_transition(self, order: &Order, delivery: Option<&Delivery>) -> OrderTransition {
        OrderTransition {
            order_id: order.id,
            expected_status: order.status,
            expected_delivery: delivery.map(|d| d.updated_at),
            status: self.status,
            delivery: self.delivery,
        }
    }
}

/// How many times a write refused as stale is replanned before giving up
pub(crate) const STALE_WRITE_ATTEMPTS: u32 = 3;

pub(crate) fn is_stale(err: &StoreError) -> bool {
    matches!(err, StoreError::Conflict(ConflictKind::StaleState))
}

/// Delivery status that follows an order status, if any.
pub fn mirrored_delivery_status(status: OrderStatus) -> Option<DeliveryStatus> {
    match status {
        OrderStatus::Pending => Some(DeliveryStatus::Pending),
        OrderStatus::Assigned => Some(DeliveryStatus::Assigned),
        OrderStatus::PickedUp => Some(DeliveryStatus::PickedUp),
        OrderStatus::InTransit => Some(DeliveryStatus::InTransit),
        OrderStatus::Delivered => Some(DeliveryStatus::Delivered),
        OrderStatus::Cancelled => Some(DeliveryStatus::Failed),
        OrderStatus::Confirmed | OrderStatus::Processing => None,
    }
}

/// Move the delivery to `status`, stamping each progress timestamp only once.
fn enter_delivery_status(delivery: &mut Delivery, status: DeliveryStatus, now: DateTime<Utc>) {
    delivery.status = status;
    delivery.updated_at = now;

    match status {
        DeliveryStatus::Assigned => {
            delivery.assigned_at.get_or_insert(now);
        }
        DeliveryStatus::PickedUp | DeliveryStatus::InTransit => {
            delivery.picked_up_at.get_or_insert(now);
        }
        DeliveryStatus::Delivered => {
            delivery.picked_up_at.get_or_insert(now);
            delivery.delivered_at.get_or_insert(now);
        }
        DeliveryStatus::Pending | DeliveryStatus::Failed => {}
    }
}

fn ensure_not_terminal(order: &Order, target: &str) -> CoreResult<()> {
    if order.status.is_terminal() {
        return Err(CoreError::rejected(
            RejectReason::InvalidTransition,
            format!("Order {} is {} and cannot move to {}", order.order_number, order.status, target),
        ));
    }
    Ok(())
}

/// Plan `order` moving to `new_status`.
pub fn plan_status_change(
    order: &Order,
    delivery: Option<&Delivery>,
    new_status: OrderStatus,
    now: DateTime<Utc>,
) -> CoreResult<TransitionPlan> {
    if order.status != new_status {
        ensure_not_terminal(order, new_status.as_str())?;
    }

    let planned = match delivery {
        Some(existing) => mirrored_delivery_status(new_status).map(|status| {
            let mut next = existing.clone();
            enter_delivery_status(&mut next, status, now);
            let changed = existing.status != next.status;
            (next, changed)
        }),
        // Payment confirmation opens the delivery
        None if new_status == OrderStatus::Confirmed => Some((Delivery::new(order.id, now), true)),
        None => None,
    };

    let (delivery, notify) = match planned {
        Some((delivery, notify)) => (Some(delivery), notify),
        None => (None, false),
    };

    Ok(TransitionPlan { status: new_status, delivery, notify })
}

/// Plan attaching `courier` (or detaching with `None`).
pub fn plan_courier_change(
    order: &Order,
    delivery: Option<&Delivery>,
    courier: Option<&Courier>,
    now: DateTime<Utc>,
) -> CoreResult<TransitionPlan> {
    ensure_not_terminal(order, "a courier change")?;

    let Some(courier) = courier else {
        let Some(existing) = delivery else {
            return Ok(TransitionPlan { status: order.status, delivery: None, notify: false });
        };
        let mut next = existing.clone();
        next.courier_id = None;
        next.assigned_at = None;
        next.status = DeliveryStatus::Pending;
        next.updated_at = now;
        let notify = existing.status != next.status;
        return Ok(TransitionPlan { status: order.status, delivery: Some(next), notify });
    };

    if !courier.is_active {
        return Err(CoreError::rejected(
            RejectReason::InactiveCourier,
            format!("Courier {} is not active", courier.name),
        ));
    }

    let previous = delivery.cloned();
    let mut next = previous.clone().unwrap_or_else(|| Delivery::new(order.id, now));
    next.courier_id = Some(courier.id);
    next.updated_at = now;
    if next.status == DeliveryStatus::Pending {
        next.status = DeliveryStatus::Assigned;
    }
    next.assigned_at.get_or_insert(now);

    let notify = match &previous {
        None => true,
        Some(prev) => prev.courier_id != next.courier_id || prev.status != next.status,
    };

    let status = match order.status {
        OrderStatus::Confirmed | OrderStatus::Processing => OrderStatus::Assigned,
        other => other,
    };

    Ok(TransitionPlan { status, delivery: Some(next), notify })
}

/// Order with its delivery after a committed transition
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub order: Order,
    pub delivery: Option<Delivery>,
}

/// Dashboard operations driving the order/delivery state machine
pub struct OrderLifecycle {
    orders: Arc<dyn OrderRepository>,
    couriers: Arc<dyn CourierRepository>,
    notifier: Arc<Notifier>,
}

impl OrderLifecycle {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        couriers: Arc<dyn CourierRepository>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self { orders, couriers, notifier }
    }

    async fn load(&self, order_id: Uuid) -> CoreResult<(Order, Option<Delivery>)> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| CoreError::NotFoundError(format!("Order {}", order_id)))?;
        let delivery = self.orders.get_delivery(order_id).await?;
        Ok((order, delivery))
    }

    /// Load, plan and write until the write lands on the state it was planned
    /// from. Only the call whose write landed sends the notification.
    async fn apply<F>(&self, order_id: Uuid, plan: F) -> CoreResult<(OrderStatus, TransitionOutcome)>
    where
        F: Fn(&Order, Option<&Delivery>, DateTime<Utc>) -> CoreResult<TransitionPlan>,
    {
        for attempt in 1..=STALE_WRITE_ATTEMPTS {
            let (mut order, current) = self.load(order_id).await?;
            let planned = plan(&order, current.as_ref(), Utc::now())?;
            let notify = planned.notify;
            let transition = planned.into_transition(&order, current.as_ref());

            match self.orders.save_transition(&transition).await {
                Ok(()) => {}
                Err(e) if is_stale(&e) => {
                    debug!(order_number = %order.order_number, attempt, "Order changed while planning, replanning");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let previous = order.status;
            order.update_status(transition.status);
            let delivery = transition.delivery.or(current);

            if notify {
                if let Some(delivery) = &delivery {
                    self.notifier.notify(&order, delivery).await;
                }
            }

            return Ok((previous, TransitionOutcome { order, delivery }));
        }

        Err(CoreError::ConflictError(format!("Order {} is being updated concurrently", order_id)))
    }

    /// `status` is the wire value; unknown values are rejected before any write.
    pub async fn set_order_status(&self, order_id: Uuid, status: &str) -> CoreResult<TransitionOutcome> {
        let new_status = status
            .parse::<OrderStatus>()
            .map_err(|e| CoreError::rejected(RejectReason::InvalidStatus, e.to_string()))?;

        let (previous, outcome) = self
            .apply(order_id, |order, delivery, now| plan_status_change(order, delivery, new_status, now))
            .await?;

        info!(
            order_number = %outcome.order.order_number,
            from = previous.as_str(),
            to = new_status.as_str(),
            "Order status updated"
        );

        Ok(outcome)
    }

    pub async fn assign_courier(&self, order_id: Uuid, courier_id: Option<Uuid>) -> CoreResult<TransitionOutcome> {
        let courier = match courier_id {
            Some(id) => Some(
                self.couriers
                    .get_courier(id)
                    .await?
                    .ok_or_else(|| CoreError::NotFoundError(format!("Courier {}", id)))?,
            ),
            None => None,
        };

        let (_, outcome) = self
            .apply(order_id, |order, delivery, now| plan_courier_change(order, delivery, courier.as_ref(), now))
            .await?;

        match &courier {
            Some(c) => info!(order_number = %outcome.order.order_number, courier = %c.name, "Courier assigned"),
            None => info!(order_number = %outcome.order.order_number, "Courier removed"),
        }

        Ok(outcome)
    }
}
