use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::attendance::{toggle, Activity, AttendanceRecord, Period};

/// In-memory working set of attendance records for the current viewing
/// context, keyed by (student_id, date). Toggles land here; nothing touches
/// the database until an explicit save.
#[derive(Debug, Default)]
pub struct DayBook {
    records: BTreeMap<(String, NaiveDate), AttendanceRecord>,
}

impl DayBook {
    pub fn new() -> DayBook {
        DayBook::default()
    }

    /// Never missing: an unknown key reads as a fresh all-Unmarked record.
    pub fn get(&self, student_id: &str, date: NaiveDate) -> AttendanceRecord {
        self.records
            .get(&(student_id.to_string(), date))
            .cloned()
            .unwrap_or_else(|| AttendanceRecord::unmarked(student_id, date))
    }

    /// Looks up or creates the record, runs the toggle engine, writes the
    /// result back. No other key is affected. Returns the updated record.
    pub fn apply(
        &mut self,
        student_id: &str,
        date: NaiveDate,
        period: Period,
        activity: Activity,
        present: bool,
    ) -> AttendanceRecord {
        let rec = self
            .records
            .entry((student_id.to_string(), date))
            .or_insert_with(|| AttendanceRecord::unmarked(student_id, date));
        toggle(rec, period, activity, present);
        rec.clone()
    }

    /// Records eligible for persistence: at least one non-Unmarked slot.
    pub fn list_dirty(&self) -> Vec<&AttendanceRecord> {
        self.records.values().filter(|r| r.is_dirty()).collect()
    }

    pub fn dirty_for_date(&self, date: NaiveDate) -> Vec<AttendanceRecord> {
        self.list_dirty()
            .into_iter()
            .filter(|r| r.date == date)
            .cloned()
            .collect()
    }

    pub fn records_for_date(&self, date: NaiveDate) -> Vec<&AttendanceRecord> {
        self.records.values().filter(|r| r.date == date).collect()
    }

    /// Replaces every entry for `date` with the freshly loaded records.
    /// Entries for other dates are untouched.
    pub fn absorb_date(&mut self, date: NaiveDate, loaded: Vec<AttendanceRecord>) {
        self.records.retain(|key, _| key.1 != date);
        for rec in loaded {
            self.records
                .insert((rec.student_id.clone(), rec.date), rec);
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::SlotMark;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).expect("date")
    }

    #[test]
    fn get_returns_fresh_record_for_unknown_key() {
        let book = DayBook::new();
        let rec = book.get("s1", day(2));
        assert_eq!(rec.student_id, "s1");
        assert!(!rec.is_dirty());
    }

    #[test]
    fn apply_creates_and_updates_in_place() {
        let mut book = DayBook::new();
        let rec = book.apply("s1", day(2), Period::Forenoon, Activity::Theory, true);
        assert_eq!(rec.fn_theory, SlotMark::Present);
        assert_eq!(rec.fn_practical, SlotMark::Absent);

        // The write-back is visible through get.
        let rec = book.get("s1", day(2));
        assert_eq!(rec.fn_theory, SlotMark::Present);
    }

    #[test]
    fn apply_touches_no_other_key() {
        let mut book = DayBook::new();
        book.apply("s1", day(2), Period::Forenoon, Activity::Theory, true);
        book.apply("s2", day(2), Period::Afternoon, Activity::Practical, true);

        assert_eq!(book.get("s1", day(2)).an_practical, SlotMark::Unmarked);
        assert_eq!(book.get("s2", day(2)).fn_theory, SlotMark::Unmarked);
        assert!(!book.get("s1", day(3)).is_dirty());
    }

    #[test]
    fn dirty_set_excludes_all_unmarked_records() {
        let mut book = DayBook::new();
        book.apply("s1", day(2), Period::Forenoon, Activity::Theory, true);
        // Reading a key does not materialize it.
        let _ = book.get("s2", day(2));

        assert_eq!(book.list_dirty().len(), 1);
        assert_eq!(book.dirty_for_date(day(2)).len(), 1);
        assert!(book.dirty_for_date(day(3)).is_empty());
    }

    #[test]
    fn absorb_date_replaces_only_that_date() {
        let mut book = DayBook::new();
        book.apply("s1", day(2), Period::Forenoon, Activity::Theory, true);
        book.apply("s1", day(3), Period::Forenoon, Activity::Theory, true);

        book.absorb_date(day(2), vec![AttendanceRecord::unmarked("s9", day(2))]);

        assert!(!book.get("s1", day(2)).is_dirty());
        assert_eq!(book.records_for_date(day(2)).len(), 1);
        assert_eq!(book.get("s1", day(3)).fn_theory, SlotMark::Present);
    }
}
