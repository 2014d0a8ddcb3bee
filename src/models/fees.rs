//! Fee bookkeeping records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeStatus {
    #[default]
    Pending,
    Paid,
}

/// One month of fees owed by a student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRecord {
    pub id: String,
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    pub class: String,
    pub section: String,
    pub month: String,
    pub amount: u64,
    #[serde(default)]
    pub status: FeeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub notes: String,
}

/// A principal-issued request asking a student to pay for one or more months.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub id: String,
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    pub class: String,
    pub section: String,
    pub months: Vec<String>,
    pub amount: u64,
    #[serde(default)]
    pub status: FeeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub notes: String,
    pub created_at: String,
}
