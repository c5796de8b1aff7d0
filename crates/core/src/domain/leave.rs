use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::record::LinkedRecord;

/// Validated allocation record relevant to balance computation.
#[derive(Clone, Debug, PartialEq)]
pub struct LeaveAllocation {
    pub leave_type: Option<LinkedRecord>,
    pub days: f64,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// Approved (or pending-approval) leave record relevant to balance
/// computation. `days` is the upstream-reported total for the whole span.
#[derive(Clone, Debug, PartialEq)]
pub struct LeaveTaken {
    pub leave_type: Option<LinkedRecord>,
    pub days: f64,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// Attachment staged for upload alongside a leave request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentPayload {
    pub name: String,
    pub base64_data: String,
    pub mime_type: String,
}

/// Custom-hour span for a single-day request. Values are decimal hours
/// already rounded to the half hour (the only granularity the upstream
/// accepts).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomHours {
    pub from: Decimal,
    pub to: Decimal,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeaveRequestDraft {
    pub leave_type_id: i64,
    pub leave_type_name: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub custom_hours: Option<CustomHours>,
    /// Relation selection for compassionate leave; upstream selection values
    /// are case sensitive and expect an initial capital.
    pub relation: Option<String>,
    pub description: Option<String>,
    pub attachments: Vec<AttachmentPayload>,
}

impl LeaveRequestDraft {
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.leave_type_id <= 0 {
            missing.push("leave_type_id".to_owned());
        }
        if self.date_to < self.date_from && self.custom_hours.is_none() {
            missing.push("date_to".to_owned());
        }
        if let Some(hours) = &self.custom_hours {
            if hours.to <= hours.from {
                missing.push("hour_to".to_owned());
            }
        }
        missing
    }
}

/// Convert a `HH:MM` clock string to decimal hours rounded to the nearest
/// half hour. Returns `None` for unparseable input.
pub fn hour_to_decimal(hhmm: &str) -> Option<Decimal> {
    let mut parts = hhmm.split(':');
    let hour: i64 = parts.next()?.trim().parse().ok()?;
    let minute: i64 = match parts.next() {
        Some(raw) => raw.trim().parse().ok()?,
        None => 0,
    };
    if !(0..=23).contains(&hour) || !(0..=59).contains(&minute) {
        return None;
    }
    // Round minutes to the nearest half hour; 45+ rolls into the next hour.
    let half_steps = (hour * 60 + minute + 15) / 30;
    Some(Decimal::new(half_steps * 5, 1))
}

/// Render a decimal hour the way the upstream hour selection expects it:
/// `"9"` for whole hours, `"9.5"` for half hours.
pub fn decimal_hour_field(value: Decimal) -> String {
    value.normalize().to_string()
}
