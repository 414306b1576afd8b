use chrono::NaiveDate;

/// Tri-state mark for one (period, activity) slot. `Unmarked` means no
/// attendance decision has been recorded yet; it is distinct from `Absent`
/// and is excluded from session counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotMark {
    Present,
    Absent,
    #[default]
    Unmarked,
}

impl SlotMark {
    pub fn is_marked(self) -> bool {
        !matches!(self, SlotMark::Unmarked)
    }

    pub fn is_present(self) -> bool {
        matches!(self, SlotMark::Present)
    }

    /// Stored column value. The store schema has non-null slot columns, so
    /// Unmarked degrades to 0 on write.
    pub fn to_db(self) -> i64 {
        match self {
            SlotMark::Present => 1,
            SlotMark::Absent | SlotMark::Unmarked => 0,
        }
    }

    pub fn from_db(v: Option<i64>) -> SlotMark {
        match v {
            None => SlotMark::Unmarked,
            Some(0) => SlotMark::Absent,
            Some(_) => SlotMark::Present,
        }
    }

    /// Wire value: true / false / null.
    pub fn to_json(self) -> serde_json::Value {
        match self {
            SlotMark::Present => serde_json::Value::Bool(true),
            SlotMark::Absent => serde_json::Value::Bool(false),
            SlotMark::Unmarked => serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Forenoon,
    Afternoon,
}

impl Period {
    pub const ALL: [Period; 2] = [Period::Forenoon, Period::Afternoon];

    pub fn parse(s: &str) -> Option<Period> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FN" | "FORENOON" => Some(Period::Forenoon),
            "AN" | "AFTERNOON" => Some(Period::Afternoon),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Theory,
    Practical,
}

impl Activity {
    pub fn parse(s: &str) -> Option<Activity> {
        match s.trim().to_ascii_lowercase().as_str() {
            "theory" => Some(Activity::Theory),
            "practical" => Some(Activity::Practical),
            _ => None,
        }
    }

    /// The other activity of the same period.
    pub fn sibling(self) -> Activity {
        match self {
            Activity::Theory => Activity::Practical,
            Activity::Practical => Activity::Theory,
        }
    }
}

/// One student's attendance for one calendar day. (student_id, date) is the
/// natural key; at most one record exists per key.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub student_id: String,
    pub date: NaiveDate,
    pub fn_theory: SlotMark,
    pub fn_practical: SlotMark,
    pub an_theory: SlotMark,
    pub an_practical: SlotMark,
}

impl AttendanceRecord {
    pub fn unmarked(student_id: &str, date: NaiveDate) -> AttendanceRecord {
        AttendanceRecord {
            student_id: student_id.to_string(),
            date,
            fn_theory: SlotMark::Unmarked,
            fn_practical: SlotMark::Unmarked,
            an_theory: SlotMark::Unmarked,
            an_practical: SlotMark::Unmarked,
        }
    }

    pub fn slot(&self, period: Period, activity: Activity) -> SlotMark {
        match (period, activity) {
            (Period::Forenoon, Activity::Theory) => self.fn_theory,
            (Period::Forenoon, Activity::Practical) => self.fn_practical,
            (Period::Afternoon, Activity::Theory) => self.an_theory,
            (Period::Afternoon, Activity::Practical) => self.an_practical,
        }
    }

    fn slot_mut(&mut self, period: Period, activity: Activity) -> &mut SlotMark {
        match (period, activity) {
            (Period::Forenoon, Activity::Theory) => &mut self.fn_theory,
            (Period::Forenoon, Activity::Practical) => &mut self.fn_practical,
            (Period::Afternoon, Activity::Theory) => &mut self.an_theory,
            (Period::Afternoon, Activity::Practical) => &mut self.an_practical,
        }
    }

    pub fn period_slots(&self, period: Period) -> (SlotMark, SlotMark) {
        (
            self.slot(period, Activity::Theory),
            self.slot(period, Activity::Practical),
        )
    }

    /// A record is eligible for persistence once any slot is marked.
    pub fn is_dirty(&self) -> bool {
        self.fn_theory.is_marked()
            || self.fn_practical.is_marked()
            || self.an_theory.is_marked()
            || self.an_practical.is_marked()
    }
}

/// Applies one present/absent decision to a record.
///
/// Within a period the two activities are mutually exclusive: marking one
/// Present forces the sibling slot to Absent (never back to Unmarked) in the
/// same update. Marking a slot Absent touches only that slot.
///
/// All (period, activity, bool) combinations are valid here; unrecognized
/// enum spellings are rejected at the protocol boundary.
pub fn toggle(record: &mut AttendanceRecord, period: Period, activity: Activity, present: bool) {
    *record.slot_mut(period, activity) = if present {
        SlotMark::Present
    } else {
        SlotMark::Absent
    };
    if present {
        *record.slot_mut(period, activity.sibling()) = SlotMark::Absent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AttendanceRecord {
        AttendanceRecord::unmarked("s1", NaiveDate::from_ymd_opt(2025, 6, 2).expect("date"))
    }

    #[test]
    fn present_forces_sibling_absent() {
        let mut rec = record();
        toggle(&mut rec, Period::Forenoon, Activity::Theory, true);
        assert_eq!(rec.fn_theory, SlotMark::Present);
        assert_eq!(rec.fn_practical, SlotMark::Absent);
        assert_eq!(rec.an_theory, SlotMark::Unmarked);
        assert_eq!(rec.an_practical, SlotMark::Unmarked);

        toggle(&mut rec, Period::Forenoon, Activity::Practical, true);
        assert_eq!(rec.fn_theory, SlotMark::Absent);
        assert_eq!(rec.fn_practical, SlotMark::Present);
    }

    #[test]
    fn present_forces_sibling_absent_in_every_period() {
        for period in Period::ALL {
            for activity in [Activity::Theory, Activity::Practical] {
                let mut rec = record();
                toggle(&mut rec, period, activity, true);
                assert_eq!(rec.slot(period, activity), SlotMark::Present);
                assert_eq!(rec.slot(period, activity.sibling()), SlotMark::Absent);
            }
        }
    }

    #[test]
    fn toggle_is_idempotent() {
        let mut once = record();
        toggle(&mut once, Period::Afternoon, Activity::Practical, true);
        let mut twice = once.clone();
        toggle(&mut twice, Period::Afternoon, Activity::Practical, true);
        assert_eq!(once, twice);
    }

    #[test]
    fn absent_leaves_sibling_untouched() {
        let mut rec = record();
        toggle(&mut rec, Period::Afternoon, Activity::Theory, false);
        assert_eq!(rec.an_theory, SlotMark::Absent);
        assert_eq!(rec.an_practical, SlotMark::Unmarked);

        // An earlier Present survives the sibling going Absent.
        let mut rec = record();
        toggle(&mut rec, Period::Forenoon, Activity::Theory, true);
        toggle(&mut rec, Period::Forenoon, Activity::Practical, false);
        assert_eq!(rec.fn_theory, SlotMark::Present);
        assert_eq!(rec.fn_practical, SlotMark::Absent);
    }

    #[test]
    fn other_period_is_never_affected() {
        let mut rec = record();
        toggle(&mut rec, Period::Forenoon, Activity::Theory, true);
        toggle(&mut rec, Period::Forenoon, Activity::Theory, false);
        assert_eq!(rec.period_slots(Period::Afternoon), (SlotMark::Unmarked, SlotMark::Unmarked));
    }

    #[test]
    fn dirty_tracks_any_marked_slot() {
        let mut rec = record();
        assert!(!rec.is_dirty());
        toggle(&mut rec, Period::Afternoon, Activity::Theory, false);
        assert!(rec.is_dirty());
    }

    #[test]
    fn enum_parsing_accepts_both_spellings() {
        assert_eq!(Period::parse("fn"), Some(Period::Forenoon));
        assert_eq!(Period::parse("Afternoon"), Some(Period::Afternoon));
        assert_eq!(Period::parse("evening"), None);
        assert_eq!(Activity::parse("THEORY"), Some(Activity::Theory));
        assert_eq!(Activity::parse("practical "), Some(Activity::Practical));
        assert_eq!(Activity::parse("lab"), None);
    }
}
