use anyhow::Context;
use chrono::NaiveDate;
use rusqlite::Connection;

use crate::attendance::{AttendanceRecord, SlotMark};

pub const DATE_FMT: &str = "%Y-%m-%d";

fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

type RawRow = (String, String, Option<i64>, Option<i64>, Option<i64>, Option<i64>);

fn record_from_raw(raw: RawRow) -> anyhow::Result<AttendanceRecord> {
    let (student_id, date, fn_theory, fn_practical, an_theory, an_practical) = raw;
    let date = NaiveDate::parse_from_str(&date, DATE_FMT)
        .with_context(|| format!("bad stored date: {}", date))?;
    Ok(AttendanceRecord {
        student_id,
        date,
        fn_theory: SlotMark::from_db(fn_theory),
        fn_practical: SlotMark::from_db(fn_practical),
        an_theory: SlotMark::from_db(an_theory),
        an_practical: SlotMark::from_db(an_practical),
    })
}

fn collect_records<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> anyhow::Result<Vec<AttendanceRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let raw_rows = stmt
        .query_map(params, |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<i64>>(2)?,
                r.get::<_, Option<i64>>(3)?,
                r.get::<_, Option<i64>>(4)?,
                r.get::<_, Option<i64>>(5)?,
            ))
        })?
        .collect::<Result<Vec<RawRow>, _>>()?;
    raw_rows.into_iter().map(record_from_raw).collect()
}

pub fn load_for_date(conn: &Connection, date: NaiveDate) -> anyhow::Result<Vec<AttendanceRecord>> {
    collect_records(
        conn,
        "SELECT student_id, date, fn_theory, fn_practical, an_theory, an_practical
         FROM attendance_days
         WHERE date = ?
         ORDER BY student_id",
        [date_key(date)],
    )
}

pub fn load_for_student(
    conn: &Connection,
    student_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> anyhow::Result<Vec<AttendanceRecord>> {
    collect_records(
        conn,
        "SELECT student_id, date, fn_theory, fn_practical, an_theory, an_practical
         FROM attendance_days
         WHERE student_id = ? AND date >= ? AND date <= ?
         ORDER BY date",
        (student_id, date_key(from), date_key(to)),
    )
}

pub fn load_range(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
) -> anyhow::Result<Vec<AttendanceRecord>> {
    collect_records(
        conn,
        "SELECT student_id, date, fn_theory, fn_practical, an_theory, an_practical
         FROM attendance_days
         WHERE date >= ? AND date <= ?
         ORDER BY student_id, date",
        (date_key(from), date_key(to)),
    )
}

/// Insert-or-full-overwrite keyed by (student_id, date), one transaction for
/// the whole batch. Every slot column is rewritten on conflict, so repeating
/// the same batch leaves the stored state unchanged, and a failure anywhere
/// rolls the whole batch back.
pub fn upsert_batch(conn: &Connection, records: &[AttendanceRecord]) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    for rec in records {
        tx.execute(
            "INSERT INTO attendance_days(
                student_id, date, fn_theory, fn_practical, an_theory, an_practical)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, date) DO UPDATE SET
               fn_theory = excluded.fn_theory,
               fn_practical = excluded.fn_practical,
               an_theory = excluded.an_theory,
               an_practical = excluded.an_practical",
            (
                &rec.student_id,
                date_key(rec.date),
                rec.fn_theory.to_db(),
                rec.fn_practical.to_db(),
                rec.an_theory.to_db(),
                rec.an_practical.to_db(),
            ),
        )?;
    }
    tx.commit()?;
    Ok(())
}
