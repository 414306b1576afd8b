use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("attendance.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            active INTEGER NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_sort ON students(sort_order)",
        [],
    )?;

    // One row per (student, day); slot columns are non-null booleans, so an
    // Unmarked slot degrades to 0 when a dirty record is written.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_days(
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            fn_theory INTEGER NOT NULL,
            fn_practical INTEGER NOT NULL,
            an_theory INTEGER NOT NULL,
            an_practical INTEGER NOT NULL,
            PRIMARY KEY(student_id, date),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_days_date ON attendance_days(date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_days_student ON attendance_days(student_id)",
        [],
    )?;

    Ok(conn)
}
