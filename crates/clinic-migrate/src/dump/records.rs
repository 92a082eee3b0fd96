//! Typed records, one per legacy table.
//!
//! Rows are converted right after parsing so transformers work with typed
//! fields instead of column-name lookups.

use super::row::LegacyRow;

/// Conversion from a parsed row into a typed legacy record.
pub trait FromLegacyRow: Sized {
    /// Column order used when the INSERT marker carries no column list.
    const COLUMNS: &'static [&'static str];

    /// Returns `None` when the row has no usable legacy id.
    fn from_row(row: &LegacyRow) -> Option<Self>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyPatient {
    pub id: i64,
    pub unique_id: Option<String>,
    pub name: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub dob: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub emergency_name: Option<String>,
    pub emergency_phone: Option<String>,
    pub history: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl FromLegacyRow for LegacyPatient {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "unique_id",
        "name",
        "gender",
        "age",
        "dob",
        "phone",
        "email",
        "address",
        "city",
        "state",
        "pincode",
        "emergency_name",
        "emergency_phone",
        "history",
        "status",
        "created_at",
        "updated_at",
    ];

    fn from_row(row: &LegacyRow) -> Option<Self> {
        Some(Self {
            id: row.int("id")?,
            unique_id: row.text("unique_id"),
            name: row.text("name"),
            gender: row.text("gender"),
            age: row.int("age"),
            dob: row.text("dob"),
            phone: row.text("phone"),
            email: row.text("email"),
            address: row.text("address"),
            city: row.text("city"),
            state: row.text("state"),
            pincode: row.text("pincode"),
            emergency_name: row.text("emergency_name"),
            emergency_phone: row.text("emergency_phone"),
            history: row.text("history"),
            status: row.text("status"),
            created_at: row.text("created_at"),
            updated_at: row.text("updated_at"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyAppointment {
    pub id: i64,
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub appointment_date: Option<String>,
    pub complaint: Option<String>,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
    pub amount: Option<f64>,
    pub discount: Option<f64>,
    pub payment_mode: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<String>,
}

impl FromLegacyRow for LegacyAppointment {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "patient_id",
        "doctor_id",
        "appointment_date",
        "complaint",
        "diagnosis",
        "notes",
        "amount",
        "discount",
        "payment_mode",
        "status",
        "created_at",
    ];

    fn from_row(row: &LegacyRow) -> Option<Self> {
        Some(Self {
            id: row.int("id")?,
            patient_id: row.int("patient_id"),
            doctor_id: row.int("doctor_id"),
            appointment_date: row.text("appointment_date"),
            complaint: row.text("complaint"),
            diagnosis: row.text("diagnosis"),
            notes: row.text("notes"),
            amount: row.float("amount"),
            discount: row.float("discount"),
            payment_mode: row.text("payment_mode"),
            status: row.text("status"),
            created_at: row.text("created_at"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyCharge {
    pub id: i64,
    pub name: Option<String>,
    pub category: Option<String>,
    pub amount: Option<f64>,
    pub status: Option<String>,
    pub created_at: Option<String>,
}

impl FromLegacyRow for LegacyCharge {
    const COLUMNS: &'static [&'static str] =
        &["id", "name", "category", "amount", "status", "created_at"];

    fn from_row(row: &LegacyRow) -> Option<Self> {
        Some(Self {
            id: row.int("id")?,
            name: row.text("name"),
            category: row.text("category"),
            amount: row.float("amount"),
            status: row.text("status"),
            created_at: row.text("created_at"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyDoctor {
    pub id: i64,
    pub name: Option<String>,
    pub specialization: Option<String>,
    pub phone: Option<String>,
}

impl FromLegacyRow for LegacyDoctor {
    const COLUMNS: &'static [&'static str] = &["id", "name", "specialization", "phone"];

    fn from_row(row: &LegacyRow) -> Option<Self> {
        Some(Self {
            id: row.int("id")?,
            name: row.text("name"),
            specialization: row.text("specialization"),
            phone: row.text("phone"),
        })
    }
}
