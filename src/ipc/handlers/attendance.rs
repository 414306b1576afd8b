use crate::attendance::{Activity, AttendanceRecord, Period};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::repo;
use crate::stats::{attendance_summary, AttendanceSummary};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    fn invalid(message: impl Into<String>) -> HandlerErr {
        HandlerErr {
            code: "invalid_input",
            message: message.into(),
            details: None,
        }
    }

    fn storage(e: impl std::fmt::Display) -> HandlerErr {
        HandlerErr {
            code: "storage_unavailable",
            message: e.to_string(),
            details: None,
        }
    }

    fn no_workspace() -> HandlerErr {
        HandlerErr {
            code: "no_workspace",
            message: "select a workspace first".to_string(),
            details: None,
        }
    }
}

#[derive(Debug, Clone)]
struct RosterStudent {
    id: String,
    display_name: String,
    sort_order: i64,
    active: bool,
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::invalid(format!("missing {}", key)))
}

fn parse_date_param(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = get_required_str(params, key)?;
    NaiveDate::parse_from_str(&raw, repo::DATE_FMT).map_err(|_| HandlerErr {
        code: "invalid_input",
        message: format!("{} must be YYYY-MM-DD", key),
        details: Some(json!({ key: raw })),
    })
}

fn parse_period_param(params: &serde_json::Value) -> Result<Period, HandlerErr> {
    let raw = get_required_str(params, "period")?;
    Period::parse(&raw).ok_or_else(|| HandlerErr {
        code: "invalid_input",
        message: "period must be FN or AN".to_string(),
        details: Some(json!({ "period": raw })),
    })
}

fn parse_activity_param(params: &serde_json::Value) -> Result<Activity, HandlerErr> {
    let raw = get_required_str(params, "activity")?;
    Activity::parse(&raw).ok_or_else(|| HandlerErr {
        code: "invalid_input",
        message: "activity must be theory or practical".to_string(),
        details: Some(json!({ "activity": raw })),
    })
}

fn get_required_bool(params: &serde_json::Value, key: &str) -> Result<bool, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::invalid(format!("missing {}", key)))
}

fn list_roster(conn: &Connection) -> Result<Vec<RosterStudent>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, last_name, first_name, sort_order, active
             FROM students
             ORDER BY sort_order",
        )
        .map_err(HandlerErr::storage)?;
    stmt.query_map([], |r| {
        let last: String = r.get(1)?;
        let first: String = r.get(2)?;
        Ok(RosterStudent {
            id: r.get(0)?,
            display_name: format!("{}, {}", last, first),
            sort_order: r.get(3)?,
            active: r.get::<_, i64>(4)? != 0,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::storage)
}

fn student_display_name(conn: &Connection, student_id: &str) -> Result<Option<String>, HandlerErr> {
    conn.query_row(
        "SELECT last_name, first_name FROM students WHERE id = ?",
        [student_id],
        |r| {
            let last: String = r.get(0)?;
            let first: String = r.get(1)?;
            Ok(format!("{}, {}", last, first))
        },
    )
    .optional()
    .map_err(HandlerErr::storage)
}

fn student_not_found(student_id: &str) -> HandlerErr {
    HandlerErr {
        code: "not_found",
        message: "student not found".to_string(),
        details: Some(json!({ "studentId": student_id })),
    }
}

fn record_row_json(rec: &AttendanceRecord) -> serde_json::Value {
    json!({
        "studentId": rec.student_id,
        "date": rec.date.format(repo::DATE_FMT).to_string(),
        "fnTheory": rec.fn_theory.to_json(),
        "fnPractical": rec.fn_practical.to_json(),
        "anTheory": rec.an_theory.to_json(),
        "anPractical": rec.an_practical.to_json(),
    })
}

fn summary_json(summary: &AttendanceSummary) -> serde_json::Value {
    serde_json::to_value(summary).unwrap_or_else(|_| json!({}))
}

fn day_summary(state: &AppState, date: NaiveDate) -> AttendanceSummary {
    attendance_summary(state.book.records_for_date(date).into_iter())
}

fn attendance_day_open(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let date = parse_date_param(params, "date")?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::no_workspace());
    };

    let roster = list_roster(conn)?;
    let loaded = repo::load_for_date(conn, date).map_err(|e| {
        tracing::error!(error = %e, %date, "load for date failed");
        HandlerErr::storage(e)
    })?;
    state.book.absorb_date(date, loaded);

    let students_json: Vec<serde_json::Value> = roster
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "displayName": s.display_name,
                "sortOrder": s.sort_order,
                "active": s.active
            })
        })
        .collect();
    let rows_json: Vec<serde_json::Value> = roster
        .iter()
        .map(|s| record_row_json(&state.book.get(&s.id, date)))
        .collect();
    let summary = day_summary(state, date);

    Ok(json!({
        "date": date.format(repo::DATE_FMT).to_string(),
        "students": students_json,
        "rows": rows_json,
        "summary": summary_json(&summary)
    }))
}

fn attendance_toggle(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let date = parse_date_param(params, "date")?;
    let student_id = get_required_str(params, "studentId")?;
    let period = parse_period_param(params)?;
    let activity = parse_activity_param(params)?;
    let present = get_required_bool(params, "present")?;

    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::no_workspace());
    };
    if student_display_name(conn, &student_id)?.is_none() {
        return Err(student_not_found(&student_id));
    }

    let rec = state.book.apply(&student_id, date, period, activity, present);
    let summary = day_summary(state, date);

    Ok(json!({
        "record": record_row_json(&rec),
        "summary": summary_json(&summary)
    }))
}

fn attendance_save(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let date = parse_date_param(params, "date")?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::no_workspace());
    };

    let batch = state.book.dirty_for_date(date);
    if batch.is_empty() {
        return Ok(json!({ "saved": 0, "nothingToSave": true }));
    }

    // Whole-batch transaction; a failure leaves both the stored state and
    // the working set exactly as they were so the caller can retry.
    repo::upsert_batch(conn, &batch).map_err(|e| {
        tracing::error!(error = %e, %date, count = batch.len(), "batch save failed");
        HandlerErr::storage(e)
    })?;
    tracing::debug!(%date, count = batch.len(), "batch saved");

    let reloaded = repo::load_for_date(conn, date).map_err(|e| {
        tracing::error!(error = %e, %date, "reload after save failed");
        HandlerErr::storage(e)
    })?;
    state.book.absorb_date(date, reloaded);

    Ok(json!({ "saved": batch.len(), "nothingToSave": false }))
}

fn attendance_student_insight(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let from = parse_date_param(params, "from")?;
    let to = parse_date_param(params, "to")?;
    if from > to {
        return Err(HandlerErr::invalid("from must not be after to"));
    }

    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::no_workspace());
    };
    let Some(display_name) = student_display_name(conn, &student_id)? else {
        return Err(student_not_found(&student_id));
    };

    let records = repo::load_for_student(conn, &student_id, from, to).map_err(|e| {
        tracing::error!(error = %e, %student_id, "load for student failed");
        HandlerErr::storage(e)
    })?;
    let summary = attendance_summary(records.iter());
    let rows: Vec<serde_json::Value> = records.iter().map(record_row_json).collect();

    Ok(json!({
        "studentId": student_id,
        "displayName": display_name,
        "from": from.format(repo::DATE_FMT).to_string(),
        "to": to.format(repo::DATE_FMT).to_string(),
        "rows": rows,
        "summary": summary_json(&summary)
    }))
}

fn attendance_report(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let from = parse_date_param(params, "from")?;
    let to = parse_date_param(params, "to")?;
    if from > to {
        return Err(HandlerErr::invalid("from must not be after to"));
    }

    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::no_workspace());
    };
    let roster = list_roster(conn)?;
    let records = repo::load_range(conn, from, to).map_err(|e| {
        tracing::error!(error = %e, "load range failed");
        HandlerErr::storage(e)
    })?;

    let mut by_student: HashMap<&str, Vec<&AttendanceRecord>> = HashMap::new();
    for rec in &records {
        by_student.entry(rec.student_id.as_str()).or_default().push(rec);
    }

    let per_student: Vec<serde_json::Value> = roster
        .iter()
        .map(|s| {
            let own = by_student.get(s.id.as_str()).cloned().unwrap_or_default();
            let summary = attendance_summary(own.into_iter());
            json!({
                "studentId": s.id,
                "displayName": s.display_name,
                "active": s.active,
                "summary": summary_json(&summary)
            })
        })
        .collect();
    let overall = attendance_summary(records.iter());

    Ok(json!({
        "from": from.format(repo::DATE_FMT).to_string(),
        "to": to.format(repo::DATE_FMT).to_string(),
        "perStudent": per_student,
        "overall": summary_json(&overall)
    }))
}

fn respond(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&mut AppState, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    match f(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.dayOpen" => Some(respond(state, req, attendance_day_open)),
        "attendance.toggle" => Some(respond(state, req, attendance_toggle)),
        "attendance.save" => Some(respond(state, req, attendance_save)),
        "attendance.studentInsight" => Some(respond(state, req, attendance_student_insight)),
        "attendance.report" => Some(respond(state, req, attendance_report)),
        _ => None,
    }
}
