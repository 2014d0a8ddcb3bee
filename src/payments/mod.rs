//! Fee payments.
//!
//! A payment moves a fee record (or a payment request and the months it
//! covers) from pending to paid. The transition is one-way. Charging is
//! delegated to a [`PaymentGateway`]; the bundled [`MockGateway`] stands in
//! for a real provider.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::filter::Targeted;
use crate::models::{keys, FeeRecord, FeeStatus, PaymentRequest, Role, Viewer};
use crate::presence::Clock;
use crate::records::{load, update_matching, update_record};
use crate::store::{KvStore, RemoteStore};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("Payment record {0} not found")]
    NotFound(String),
    #[error("Payment record {0} is already paid")]
    AlreadyPaid(String),
    #[error("Payment record {0} has no amount to charge")]
    InvalidAmount(String),
    #[error("Payment for {0} was declined")]
    Declined(String),
}

/// What the gateway is asked to collect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    /// Id of the record being paid
    pub reference: String,
    pub amount: u64,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_id: String,
}

pub trait PaymentGateway: Send + Sync + 'static {
    fn charge(&self, charge: &Charge) -> impl Future<Output = Result<Receipt, PaymentError>> + Send;
}

/// Approves every positive charge.
#[derive(Debug, Clone, Default)]
pub struct MockGateway {
    decline_all: bool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declining() -> Self {
        Self { decline_all: true }
    }
}

impl PaymentGateway for MockGateway {
    async fn charge(&self, charge: &Charge) -> Result<Receipt, PaymentError> {
        if charge.amount == 0 {
            return Err(PaymentError::InvalidAmount(charge.reference.clone()));
        }
        if self.decline_all {
            return Err(PaymentError::Declined(charge.reference.clone()));
        }

        let transaction_id = format!("txn_{}", Uuid::new_v4().simple());
        tracing::info!(
            reference = %charge.reference,
            amount = charge.amount,
            method = %charge.method,
            transaction_id = %transaction_id,
            "Mock charge approved"
        );
        Ok(Receipt { transaction_id })
    }
}

/// A settled payment request with the fee records it paid off.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub request: PaymentRequest,
    pub fees: Vec<FeeRecord>,
}

pub struct Payments<R, G> {
    store: Arc<KvStore<R>>,
    gateway: G,
    clock: Arc<dyn Clock>,
    // One payment at a time, so a record cannot be charged twice.
    in_flight: Mutex<()>,
}

impl<R: RemoteStore, G: PaymentGateway> Payments<R, G> {
    pub fn new(store: Arc<KvStore<R>>, gateway: G, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            gateway,
            clock,
            in_flight: Mutex::new(()),
        }
    }

    /// Pay one pending fee record.
    pub async fn process_payment(
        &self,
        fee_id: &str,
        payer: &Viewer,
        method: &str,
    ) -> Result<FeeRecord, PaymentError> {
        let _guard = self.in_flight.lock().await;

        let fees: Vec<FeeRecord> = load(&self.store, keys::FEE_RECORDS).await;
        let fee = fees
            .into_iter()
            .find(|fee| fee.id == fee_id && may_pay(fee, payer))
            .ok_or_else(|| PaymentError::NotFound(fee_id.to_string()))?;
        if fee.status == FeeStatus::Paid {
            return Err(PaymentError::AlreadyPaid(fee.id));
        }

        let receipt = self
            .gateway
            .charge(&Charge {
                reference: fee.id.clone(),
                amount: fee.amount,
                method: method.to_string(),
            })
            .await?;
        let paid_at = self.clock.now();

        let paid = update_record(&self.store, keys::FEE_RECORDS, fee_id, |record: &mut FeeRecord| {
            settle_fee(record, &receipt, method, paid_at);
            Ok::<_, PaymentError>(())
        })
        .await?
        .ok_or_else(|| PaymentError::NotFound(fee_id.to_string()))?;

        tracing::info!(
            fee_id = %paid.id,
            student_id = %paid.student_id,
            month = %paid.month,
            "Fee paid"
        );
        Ok(paid)
    }

    /// Pay a payment request and every pending fee month it covers.
    pub async fn settle_request(
        &self,
        request_id: &str,
        payer: &Viewer,
        method: &str,
    ) -> Result<Settlement, PaymentError> {
        let _guard = self.in_flight.lock().await;

        let requests: Vec<PaymentRequest> = load(&self.store, keys::PAYMENT_REQUESTS).await;
        let request = requests
            .into_iter()
            .find(|request| request.id == request_id && may_pay(request, payer))
            .ok_or_else(|| PaymentError::NotFound(request_id.to_string()))?;
        if request.status == FeeStatus::Paid {
            return Err(PaymentError::AlreadyPaid(request.id));
        }

        let receipt = self
            .gateway
            .charge(&Charge {
                reference: request.id.clone(),
                amount: request.amount,
                method: method.to_string(),
            })
            .await?;
        let paid_at = self.clock.now();

        let request = update_record(
            &self.store,
            keys::PAYMENT_REQUESTS,
            request_id,
            |record: &mut PaymentRequest| {
                record.status = FeeStatus::Paid;
                record.payment_date = Some(paid_at);
                record.transaction_id = Some(receipt.transaction_id.clone());
                Ok::<_, PaymentError>(())
            },
        )
        .await?
        .ok_or_else(|| PaymentError::NotFound(request_id.to_string()))?;

        let fees = update_matching(
            &self.store,
            keys::FEE_RECORDS,
            |fee: &FeeRecord| {
                fee.student_id == request.student_id
                    && fee.status == FeeStatus::Pending
                    && request.months.contains(&fee.month)
            },
            |fee: &mut FeeRecord| settle_fee(fee, &receipt, method, paid_at),
        )
        .await;

        tracing::info!(
            request_id = %request.id,
            student_id = %request.student_id,
            months = fees.len(),
            "Payment request settled"
        );
        Ok(Settlement { request, fees })
    }
}

fn may_pay<T: Targeted>(record: &T, payer: &Viewer) -> bool {
    payer.role == Role::Principal || record.visible_to(payer)
}

fn settle_fee(fee: &mut FeeRecord, receipt: &Receipt, method: &str, paid_at: DateTime<Utc>) {
    fee.status = FeeStatus::Paid;
    fee.payment_date = Some(paid_at);
    fee.transaction_id = Some(receipt.transaction_id.clone());
    fee.payment_method = Some(method.to_string());
}
