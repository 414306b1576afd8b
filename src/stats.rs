use serde::Serialize;

use crate::attendance::{AttendanceRecord, Period};

/// Half-up rounding to 2 decimal places:
/// `Int(100*x + 0.5) / 100`
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total_sessions: u64,
    pub attended_sessions: u64,
    pub absent_sessions: u64,
    pub attendance_percentage: f64,
}

/// The one attendance reduction. Every surface that shows session counts or
/// a percentage (day sheet, student insight, report) goes through here.
///
/// Per record and period: a session occurred when at least one slot is
/// non-Unmarked, and was attended when at least one slot is Present. The
/// percentage is 0 (not NaN) when no sessions occurred.
pub fn attendance_summary<'a, I>(records: I) -> AttendanceSummary
where
    I: IntoIterator<Item = &'a AttendanceRecord>,
{
    let mut total: u64 = 0;
    let mut attended: u64 = 0;

    for rec in records {
        for period in Period::ALL {
            let (theory, practical) = rec.period_slots(period);
            if theory.is_marked() || practical.is_marked() {
                total += 1;
            }
            if theory.is_present() || practical.is_present() {
                attended += 1;
            }
        }
    }

    let attendance_percentage = if total > 0 {
        round_off_2_decimals(100.0 * (attended as f64) / (total as f64))
    } else {
        0.0
    };

    AttendanceSummary {
        total_sessions: total,
        attended_sessions: attended,
        absent_sessions: total - attended,
        attendance_percentage,
    }
}
