use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendanced");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendanced");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "expected ok for {}: {}",
        method,
        value
    );
    value.get("result").cloned().expect("result")
}

fn summary_counts(summary: &serde_json::Value) -> (u64, u64, u64, f64) {
    (
        summary.get("totalSessions").and_then(|v| v.as_u64()).expect("total"),
        summary
            .get("attendedSessions")
            .and_then(|v| v.as_u64())
            .expect("attended"),
        summary.get("absentSessions").and_then(|v| v.as_u64()).expect("absent"),
        summary
            .get("attendancePercentage")
            .and_then(|v| v.as_f64())
            .expect("percentage"),
    )
}

/// Day sheet, student insight, and report all fold through the same
/// reduction; their numbers must line up for the same underlying rows.
#[test]
fn day_sheet_insight_and_report_agree() {
    let workspace = temp_dir("attendanced-stats-alignment");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let a = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({ "lastName": "Akter", "firstName": "Farzana" }),
    );
    let a = a.get("studentId").and_then(|v| v.as_str()).expect("id").to_string();
    let b = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "lastName": "Bose", "firstName": "Rohan" }),
    );
    let b = b.get("studentId").and_then(|v| v.as_str()).expect("id").to_string();

    // Day 1: A attends FN theory, misses AN; B attends FN practical.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.toggle",
        json!({
            "date": "2025-06-02", "studentId": a,
            "period": "FN", "activity": "theory", "present": true
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.toggle",
        json!({
            "date": "2025-06-02", "studentId": a,
            "period": "AN", "activity": "theory", "present": false
        }),
    );
    let last = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.toggle",
        json!({
            "date": "2025-06-02", "studentId": b,
            "period": "FN", "activity": "practical", "present": true
        }),
    );
    // Pre-save working-set summary: unmarked slots are excluded, so B's
    // afternoon contributes nothing yet.
    let (total, attended, absent, pct) = summary_counts(last.get("summary").expect("summary"));
    assert_eq!((total, attended, absent), (3, 2, 1));
    assert_eq!(pct, 66.67);

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.save",
        json!({ "date": "2025-06-02" }),
    );
    assert_eq!(saved.get("saved"), Some(&json!(2)));

    // Day 2: A marked absent in the forenoon only.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.toggle",
        json!({
            "date": "2025-06-03", "studentId": a,
            "period": "FN", "activity": "practical", "present": false
        }),
    );
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.save",
        json!({ "date": "2025-06-03" }),
    );
    assert_eq!(saved.get("saved"), Some(&json!(1)));

    // After the save both of A's day-2 periods read as absent sessions
    // (unmarked degraded on write).
    let day = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "attendance.dayOpen",
        json!({ "date": "2025-06-02" }),
    );
    let (total, attended, absent, pct) = summary_counts(day.get("summary").expect("summary"));
    assert_eq!((total, attended, absent), (4, 2, 2));
    assert_eq!(pct, 50.0);

    let insight = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "attendance.studentInsight",
        json!({ "studentId": a, "from": "2025-06-01", "to": "2025-06-30" }),
    );
    let insight_summary = insight.get("summary").expect("summary").clone();
    let (total, attended, absent, pct) = summary_counts(&insight_summary);
    assert_eq!((total, attended, absent), (4, 1, 3));
    assert_eq!(pct, 25.0);

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "attendance.report",
        json!({ "from": "2025-06-01", "to": "2025-06-30" }),
    );
    let per_student = report
        .get("perStudent")
        .and_then(|v| v.as_array())
        .expect("perStudent");
    let a_row = per_student
        .iter()
        .find(|r| r.get("studentId").and_then(|v| v.as_str()) == Some(a.as_str()))
        .expect("report row for a");
    // The report's per-student numbers are the insight's numbers.
    assert_eq!(a_row.get("summary"), Some(&insight_summary));

    let b_row = per_student
        .iter()
        .find(|r| r.get("studentId").and_then(|v| v.as_str()) == Some(b.as_str()))
        .expect("report row for b");
    let (total, attended, absent, pct) = summary_counts(b_row.get("summary").expect("summary"));
    assert_eq!((total, attended, absent), (2, 1, 1));
    assert_eq!(pct, 50.0);

    // Overall is the same reduction over the union of rows, and the
    // per-student session counts sum to it.
    let (total, attended, absent, pct) = summary_counts(report.get("overall").expect("overall"));
    assert_eq!((total, attended, absent), (6, 2, 4));
    assert_eq!(pct, 33.33);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
