use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

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
}

#[derive(Debug, Clone)]
struct StudentRow {
    id: String,
    last_name: String,
    first_name: String,
    active: bool,
    sort_order: i64,
}

impl StudentRow {
    fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "displayName": self.display_name(),
            "lastName": self.last_name,
            "firstName": self.first_name,
            "active": self.active,
            "sortOrder": self.sort_order
        })
    }
}

fn required_name(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let raw = params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::invalid(format!("missing {}", key)))?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(HandlerErr::invalid(format!("{} must not be blank", key)));
    }
    Ok(trimmed.to_string())
}

fn fetch_student(conn: &Connection, student_id: &str) -> Result<Option<StudentRow>, HandlerErr> {
    conn.query_row(
        "SELECT id, last_name, first_name, active, sort_order
         FROM students
         WHERE id = ?",
        [student_id],
        |r| {
            Ok(StudentRow {
                id: r.get(0)?,
                last_name: r.get(1)?,
                first_name: r.get(2)?,
                active: r.get::<_, i64>(3)? != 0,
                sort_order: r.get(4)?,
            })
        },
    )
    .optional()
    .map_err(HandlerErr::storage)
}

fn list_roster(conn: &Connection) -> Result<Vec<StudentRow>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, last_name, first_name, active, sort_order
             FROM students
             ORDER BY sort_order",
        )
        .map_err(HandlerErr::storage)?;
    stmt.query_map([], |r| {
        Ok(StudentRow {
            id: r.get(0)?,
            last_name: r.get(1)?,
            first_name: r.get(2)?,
            active: r.get::<_, i64>(3)? != 0,
            sort_order: r.get(4)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::storage)
}

fn students_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let roster = list_roster(conn)?;
    let students: Vec<serde_json::Value> = roster.iter().map(StudentRow::to_json).collect();
    Ok(json!({ "students": students }))
}

fn students_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let last_name = required_name(params, "lastName")?;
    let first_name = required_name(params, "firstName")?;
    let active = params
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    let next_sort: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students",
            [],
            |r| r.get(0),
        )
        .map_err(HandlerErr::storage)?;

    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, last_name, first_name, active, sort_order)
         VALUES(?, ?, ?, ?, ?)",
        (
            &student_id,
            &last_name,
            &first_name,
            active as i64,
            next_sort,
        ),
    )
    .map_err(HandlerErr::storage)?;

    Ok(json!({ "studentId": student_id }))
}

fn students_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = params
        .get("studentId")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::invalid("missing studentId"))?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::invalid("missing patch"));
    };

    let Some(mut row) = fetch_student(conn, student_id)? else {
        return Err(HandlerErr {
            code: "not_found",
            message: "student not found".to_string(),
            details: None,
        });
    };

    if let Some(v) = patch.get("lastName") {
        let s = v
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HandlerErr::invalid("patch.lastName must not be blank"))?;
        row.last_name = s.to_string();
    }
    if let Some(v) = patch.get("firstName") {
        let s = v
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HandlerErr::invalid("patch.firstName must not be blank"))?;
        row.first_name = s.to_string();
    }
    if let Some(v) = patch.get("active") {
        row.active = v
            .as_bool()
            .ok_or_else(|| HandlerErr::invalid("patch.active must be a boolean"))?;
    }

    conn.execute(
        "UPDATE students SET last_name = ?, first_name = ?, active = ? WHERE id = ?",
        (&row.last_name, &row.first_name, row.active as i64, &row.id),
    )
    .map_err(HandlerErr::storage)?;

    Ok(json!({ "student": row.to_json() }))
}

fn with_db(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(with_db(state, req, |conn, _| students_list(conn))),
        "students.create" => Some(with_db(state, req, students_create)),
        "students.update" => Some(with_db(state, req, students_update)),
        _ => None,
    }
}
