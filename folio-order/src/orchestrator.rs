use chrono::Utc;
use folio_core::payment::{GatewayCallback, GatewayRedirect, GatewayRequest, PaymentGateway};
use folio_core::repository::{OrderRepository, OrderTransition, PaymentRepository};
use folio_core::{CoreError, CoreResult, Order, OrderStatus, Payment, PaymentStatus, RejectReason};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::lifecycle::{is_stale, plan_status_change, STALE_WRITE_ATTEMPTS};
use crate::notifier::Notifier;

const DECLINED_MESSAGE: &str = "Payment declined by user or bank.";

/// Result of processing a gateway callback
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub payment: Payment,
    pub order: Order,
    /// False when the callback repeated an already completed payment
    pub applied: bool,
}

/// Drives an order's payment through the configured gateway
pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<dyn OrderRepository>,
    payments: Arc<dyn PaymentRepository>,
    notifier: Arc<Notifier>,
    currency: String,
}

impl PaymentOrchestrator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<dyn OrderRepository>,
        payments: Arc<dyn PaymentRepository>,
        notifier: Arc<Notifier>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            orders,
            payments,
            notifier,
            currency: currency.into(),
        }
    }

    /// Get the customer a payment page for a pending order.
    ///
    /// Repeated calls reuse the open transaction; a failed payment gets a new one.
    pub async fn create_payment(&self, order: &Order) -> CoreResult<GatewayRedirect> {
        if order.status != OrderStatus::Pending {
            return Err(CoreError::rejected(
                RejectReason::OrderNotPayable,
                format!("Order {} is {}", order.order_number, order.status),
            ));
        }

        let mut payment = self
            .payments
            .get_or_create_payment(order.id, order.total_amount, &self.currency)
            .await?;

        match payment.status {
            PaymentStatus::Pending | PaymentStatus::Processing => {
                if let (Some(transaction_id), Some(redirect_url)) = (&payment.transaction_id, &payment.redirect_url) {
                    return Ok(GatewayRedirect {
                        transaction_id: transaction_id.clone(),
                        redirect_url: redirect_url.clone(),
                    });
                }
            }
            PaymentStatus::Failed => {
                info!(order_number = %order.order_number, "Retrying failed payment with a new transaction");
                payment.status = PaymentStatus::Pending;
                payment.transaction_id = None;
                payment.redirect_url = None;
                payment.error_message.clear();
                payment.amount = order.total_amount;
            }
            PaymentStatus::Completed | PaymentStatus::Refunded => {
                return Err(CoreError::rejected(
                    RejectReason::OrderNotPayable,
                    format!("Payment for order {} is already {}", order.order_number, payment.status.as_str()),
                ));
            }
        }

        let request = GatewayRequest {
            order_number: order.order_number.clone(),
            amount: payment.amount,
            currency: payment.currency.clone(),
            description: format!("Order #{}", order.order_number),
        };

        match self.gateway.create_payment(&request).await {
            Ok(redirect) => {
                payment.transaction_id = Some(redirect.transaction_id.clone());
                payment.redirect_url = Some(redirect.redirect_url.clone());
                self.payments.save_payment(&payment).await?;
                info!(
                    order_number = %order.order_number,
                    transaction_id = %redirect.transaction_id,
                    "Payment created"
                );
                Ok(redirect)
            }
            Err(e) => {
                error!(order_number = %order.order_number, "Payment gateway call failed: {}", e);
                payment.status = PaymentStatus::Failed;
                payment.error_message = e.to_string();
                self.payments.save_payment(&payment).await?;
                Err(CoreError::ExternalServiceError(e.to_string()))
            }
        }
    }

    /// Apply a gateway callback. Signature is checked before anything is read.
    ///
    /// Overlapping deliveries of the same callback settle the payment once;
    /// the others report `applied: false` and send nothing.
    pub async fn reconcile(&self, callback: &GatewayCallback) -> CoreResult<Reconciliation> {
        self.gateway.verify_callback(callback)?;

        for attempt in 1..=STALE_WRITE_ATTEMPTS {
            match self.try_reconcile(callback).await? {
                Some(reconciliation) => return Ok(reconciliation),
                None => debug!(
                    transaction_id = %callback.transaction_id,
                    attempt,
                    "Payment changed during callback, rereading"
                ),
            }
        }

        Err(CoreError::ConflictError(format!(
            "Transaction {} is being updated concurrently",
            callback.transaction_id
        )))
    }

    /// One read-plan-write pass. `None` means the write found the payment or
    /// order changed since the read.
    async fn try_reconcile(&self, callback: &GatewayCallback) -> CoreResult<Option<Reconciliation>> {
        let mut payment = self
            .payments
            .find_payment_by_transaction(&callback.transaction_id)
            .await?
            .ok_or_else(|| CoreError::NotFoundError(format!("Transaction {}", callback.transaction_id)))?;

        let order = self
            .orders
            .get_order(payment.order_id)
            .await?
            .ok_or_else(|| CoreError::NotFoundError(format!("Order {}", payment.order_id)))?;

        if payment.status == PaymentStatus::Completed {
            info!(transaction_id = %callback.transaction_id, "Duplicate callback for completed payment");
            return Ok(Some(Reconciliation { payment, order, applied: false }));
        }

        let read_status = payment.status;
        payment.response_data = serde_json::to_value(&callback.raw)
            .map_err(|e| CoreError::InternalError(e.to_string()))?;

        if !callback.is_success() {
            payment.status = PaymentStatus::Failed;
            payment.error_message = callback
                .error_msg
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DECLINED_MESSAGE.to_string());
            if !self.settle(&payment, read_status, None).await? {
                return Ok(None);
            }
            warn!(
                order_number = %order.order_number,
                transaction_id = %callback.transaction_id,
                "Payment failed: {}",
                payment.error_message
            );
            return Ok(Some(Reconciliation { payment, order, applied: true }));
        }

        let now = Utc::now();
        payment.status = PaymentStatus::Completed;
        payment.completed_at = Some(now);
        payment.error_message.clear();

        // Staff may already have moved the order on; only a pending order is confirmed.
        if order.status != OrderStatus::Pending {
            if !self.settle(&payment, read_status, None).await? {
                return Ok(None);
            }
            warn!(
                order_number = %order.order_number,
                status = order.status.as_str(),
                "Payment completed for an order that is no longer pending"
            );
            return Ok(Some(Reconciliation { payment, order, applied: true }));
        }

        let delivery = self.orders.get_delivery(order.id).await?;
        let plan = plan_status_change(&order, delivery.as_ref(), OrderStatus::Confirmed, now)?;
        let notify = plan.notify;
        let transition = plan.into_transition(&order, delivery.as_ref());

        if !self.settle(&payment, read_status, Some(&transition)).await? {
            return Ok(None);
        }

        let mut order = order;
        order.update_status(OrderStatus::Confirmed);
        info!(order_number = %order.order_number, transaction_id = %callback.transaction_id, "Payment completed");

        if notify {
            if let Some(delivery) = &transition.delivery {
                self.notifier.notify(&order, delivery).await;
            }
        }

        Ok(Some(Reconciliation { payment, order, applied: true }))
    }

    /// Write the outcome; false when the stored state moved on since it was read.
    async fn settle(
        &self,
        payment: &Payment,
        read_status: PaymentStatus,
        transition: Option<&OrderTransition>,
    ) -> CoreResult<bool> {
        match self.payments.save_reconciliation(payment, read_status, transition).await {
            Ok(()) => Ok(true),
            Err(e) if is_stale(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Payment and order behind a transaction, for the sandbox payment page.
    pub async fn describe_transaction(&self, transaction_id: &str) -> CoreResult<(Payment, Order)> {
        let payment = self
            .payments
            .find_payment_by_transaction(transaction_id)
            .await?
            .ok_or_else(|| CoreError::NotFoundError(format!("Transaction {}", transaction_id)))?;
        let order = self
            .orders
            .get_order(payment.order_id)
            .await?
            .ok_or_else(|| CoreError::NotFoundError(format!("Order {}", payment.order_id)))?;
        Ok((payment, order))
    }

    pub async fn payment_for_order(&self, order: &Order) -> CoreResult<Option<Payment>> {
        Ok(self.payments.get_payment_for_order(order.id).await?)
    }
}
