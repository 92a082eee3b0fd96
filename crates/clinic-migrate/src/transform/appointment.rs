use super::normalize::{money, parse_date, time_of_day, timestamp_or};
use super::TransformContext;
use crate::dump::LegacyAppointment;
use crate::model::{Appointment, AppointmentStatus, Bill, PaymentMethod, PaymentStatus};

/// Map a legacy appointment status.
///
/// The legacy system mostly recorded settled encounters, so anything not
/// explicitly cancelled or pending counts as completed.
pub fn appointment_status(raw: Option<&str>) -> AppointmentStatus {
    let status = raw.map(|s| s.trim().to_ascii_lowercase()).unwrap_or_default();
    if status.starts_with("cancel") {
        AppointmentStatus::Cancelled
    } else if matches!(
        status.as_str(),
        "pending" | "scheduled" | "booked" | "upcoming"
    ) {
        AppointmentStatus::Scheduled
    } else {
        AppointmentStatus::Completed
    }
}

pub fn payment_method(raw: Option<&str>) -> PaymentMethod {
    let mode = raw.map(|s| s.trim().to_ascii_lowercase()).unwrap_or_default();
    if mode.is_empty() || mode == "cash" {
        PaymentMethod::Cash
    } else if mode.contains("upi") || mode.contains("gpay") || mode.contains("paytm") {
        PaymentMethod::Upi
    } else if mode.contains("card") || mode.contains("debit") || mode.contains("credit") {
        PaymentMethod::Card
    } else {
        PaymentMethod::Other
    }
}

/// Produce the appointment and, when the legacy amount is positive, its bill.
///
/// Patient and doctor references stay null; the loader resolves them once
/// per run and the bill copies them from its appointment.
pub fn transform_appointment(
    row: &LegacyAppointment,
    ctx: &TransformContext,
) -> (Appointment, Option<Bill>) {
    let appointment_date = row.appointment_date.as_deref().and_then(parse_date);
    let created_at = timestamp_or(
        row.created_at.as_deref().or(row.appointment_date.as_deref()),
        ctx.migrated_at,
    );

    let appointment = Appointment {
        legacy_id: row.id,
        legacy_patient_id: row.patient_id,
        legacy_doctor_id: row.doctor_id,
        patient: None,
        doctor: None,
        appointment_date,
        appointment_time: time_of_day(row.appointment_date.as_deref()),
        chief_complaint: row.complaint.clone(),
        diagnosis: row.diagnosis.clone(),
        notes: row.notes.clone(),
        status: appointment_status(row.status.as_deref()),
        created_at,
        updated_at: created_at,
    };

    let subtotal = money(row.amount);
    if subtotal <= 0.0 {
        return (appointment, None);
    }

    let discount = money(row.discount).min(subtotal);
    let grand_total = subtotal - discount;
    let bill = Bill {
        legacy_id: row.id,
        legacy_appointment_id: row.id,
        bill_number: format!("BILL-{}", row.id),
        appointment: None,
        patient: None,
        doctor: None,
        subtotal,
        tax: 0.0,
        discount,
        grand_total,
        paid_amount: grand_total,
        due_amount: 0.0,
        payment_status: PaymentStatus::Paid,
        payment_method: payment_method(row.payment_mode.as_deref()),
        payment_date: appointment_date,
        created_at,
        updated_at: created_at,
    };

    (appointment, Some(bill))
}
