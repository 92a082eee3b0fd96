//! Target record types.
//!
//! Every migrated record carries `legacyId`, the sole idempotency key: a
//! record with that key already in the store is skipped, otherwise inserted.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Records addressable by their legacy id.
pub trait LegacyKeyed {
    fn legacy_id(&self) -> i64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub legacy_id: i64,
    /// Human-facing display id, e.g. `PAT001042`.
    pub patient_id: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub gender: Gender,
    pub age: Option<i64>,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Address,
    pub emergency_contact: Option<EmergencyContact>,
    pub medical_history: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub legacy_id: i64,
    pub legacy_patient_id: Option<i64>,
    pub legacy_doctor_id: Option<i64>,
    /// Resolved patient `_id`; null when unresolved.
    pub patient: Option<String>,
    /// Resolved doctor `_id`; null when unresolved.
    pub doctor: Option<String>,
    pub appointment_date: Option<NaiveDate>,
    /// `HH:MM`
    pub appointment_time: String,
    pub chief_complaint: Option<String>,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Partial,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Upi,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    /// Same value as the owning appointment's legacy id.
    pub legacy_id: i64,
    pub legacy_appointment_id: i64,
    pub bill_number: String,
    /// Foreign keys, always copied from the owning appointment.
    pub appointment: Option<String>,
    pub patient: Option<String>,
    pub doctor: Option<String>,
    pub subtotal: f64,
    pub tax: f64,
    pub discount: f64,
    pub grand_total: f64,
    pub paid_amount: f64,
    pub due_amount: f64,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub payment_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    Laboratory,
    Radiology,
    Procedure,
    Other,
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceCategory::Laboratory => write!(f, "laboratory"),
            ServiceCategory::Radiology => write!(f, "radiology"),
            ServiceCategory::Procedure => write!(f, "procedure"),
            ServiceCategory::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceItem {
    pub legacy_id: i64,
    pub name: String,
    pub category: ServiceCategory,
    pub price: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A doctor already present in the target store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub legacy_id: Option<i64>,
}

impl LegacyKeyed for Patient {
    fn legacy_id(&self) -> i64 {
        self.legacy_id
    }
}

impl LegacyKeyed for Appointment {
    fn legacy_id(&self) -> i64 {
        self.legacy_id
    }
}

impl LegacyKeyed for Bill {
    fn legacy_id(&self) -> i64 {
        self.legacy_id
    }
}

impl LegacyKeyed for ServiceItem {
    fn legacy_id(&self) -> i64 {
        self.legacy_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bill_serializes_camel_case() {
        let now = Utc::now();
        let bill = Bill {
            legacy_id: 5,
            legacy_appointment_id: 5,
            bill_number: "BILL-5".into(),
            appointment: None,
            patient: None,
            doctor: None,
            subtotal: 100.0,
            tax: 0.0,
            discount: 0.0,
            grand_total: 100.0,
            paid_amount: 100.0,
            due_amount: 0.0,
            payment_status: PaymentStatus::Paid,
            payment_method: PaymentMethod::Upi,
            payment_date: None,
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_value(&bill).unwrap();
        assert_eq!(value["legacyId"], 5);
        assert_eq!(value["paymentStatus"], "paid");
        assert_eq!(value["paymentMethod"], "upi");
        assert!(value["patient"].is_null());
    }

    #[test]
    fn test_doctor_from_document() {
        let doc = serde_json::json!({
            "_id": "d1",
            "name": "Dr. Ankita Sharma",
            "specialization": "Pediatrics"
        });
        let doctor: Doctor = serde_json::from_value(doc).unwrap();
        assert_eq!(doctor.id, "d1");
        assert_eq!(doctor.legacy_id, None);
    }
}
