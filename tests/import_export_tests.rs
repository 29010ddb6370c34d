/// Integration tests for the browser snapshot import and the CSV endpoints

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::{json, Value};

const COURSE_ID: &str = "0880d4ca-7232-42dc-abef-1223e00a5c6e";
const SECTION_ID: &str = "a75b7e0e-1130-486a-ae5e-6f7233e002bf";
const STUDENT_ID: &str = "5b1e7d0a-3c2f-4e8a-9d6b-1f2a3b4c5d6e";
const ASSIGNMENT_ID: &str = "9c8b7a6d-5e4f-4a3b-8c2d-1e0f9a8b7c6d";

const USERS_CSV: &str = "\
role,name,rut,email,username,password,course,section,subjects
student,Ana Pérez,12.345.678-5,ana@example.com,ana,pw1,4to Básico,A,
teacher,Pedro Soto,,,psoto,pw2,4to Básico,A,Matemáticas;Lenguaje
alumno,,,,sinnombre,pw3,,,
";

const GRADES_CSV: &str = "\
nombre,rut,curso,seccion,asignatura,tipo,fecha,nota,tema
Ana Pérez,12345678-5,4to Básico,A,Matemáticas,prueba,2025-04-10,85,Fracciones
Desconocido,11.111.111-1,4to Básico,A,Matemáticas,tarea,10/04/2025,\"60,5\",Fracciones
Sin Nota,12345678-5,4to Básico,A,Matemáticas,prueba,2025-04-10,,
";

fn snapshot() -> Value {
    json!({
        "smart-student-courses": [{ "id": COURSE_ID, "name": "2do Medio" }],
        "smart-student-sections": [{ "id": SECTION_ID, "name": "B", "courseId": COURSE_ID }],
        "smart-student-users": [
            { "id": STUDENT_ID, "username": "luis", "password": "1234", "role": "student", "displayName": "Luis" },
            { "id": "not-a-guid", "username": "mala", "role": "student", "displayName": "Mala" }
        ],
        "smart-student-student-assignments": json!([{
            "id": ASSIGNMENT_ID,
            "studentId": STUDENT_ID,
            "courseId": COURSE_ID,
            "sectionId": SECTION_ID,
            "createdAt": 1714557600000i64
        }]).to_string(),
        "some-other-key": 42
    })
}

fn report_for<'a>(reports: &'a Value, key: &str) -> &'a Value {
    reports
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["key"] == key)
        .unwrap_or_else(|| panic!("no report for {}", key))
}

#[tokio::test]
async fn test_users_csv_import_builds_roster() {
    let app = create_test_app();

    let (status, report, _) = send_text(&app, "POST", "/imports/users-csv", USERS_CSV).await;
    assert_eq!(status, StatusCode::OK);
    let report: Value = serde_json::from_str(&report).unwrap();
    assert_eq!(report["imported"], 2);
    assert_eq!(report["errors"].as_array().unwrap().len(), 1);
    assert_eq!(report["errors"][0]["line"], 4);

    let (_, courses) = send(&app, "GET", "/courses", None).await;
    assert_eq!(courses.as_array().unwrap().len(), 1);
    let course_id = id(&courses[0]);
    let (_, sections) = send(&app, "GET", &format!("/courses/{}/sections", course_id), None).await;
    let section_id = id(&sections[0]);

    let uri = format!("/course-sections/{}/{}/students", course_id, section_id);
    let (_, students) = send(&app, "GET", &uri, None).await;
    let students = students.as_array().unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["username"], "ana");
    assert_eq!(students[0]["rut"], "12345678-5");
    assert_eq!(students[0]["assigned_teachers"]["Matemáticas"], "psoto");
}

#[tokio::test]
async fn test_users_csv_import_skips_existing_usernames() {
    let app = create_test_app();
    send_text(&app, "POST", "/imports/users-csv", USERS_CSV).await;

    let (status, report, _) = send_text(&app, "POST", "/imports/users-csv", USERS_CSV).await;
    assert_eq!(status, StatusCode::OK);
    let report: Value = serde_json::from_str(&report).unwrap();
    assert_eq!(report["imported"], 0);
    assert_eq!(report["skipped"], 2);
}

#[tokio::test]
async fn test_grades_csv_import_and_export() {
    let app = create_test_app();
    send_text(&app, "POST", "/imports/users-csv", USERS_CSV).await;

    let (status, report, _) = send_text(&app, "POST", "/imports/grades-csv", GRADES_CSV).await;
    assert_eq!(status, StatusCode::OK);
    let report: Value = serde_json::from_str(&report).unwrap();
    assert_eq!(report["imported"], 2);
    assert_eq!(report["errors"][0]["line"], 4);

    let (_, grades) = send(&app, "GET", "/grades?year=2025", None).await;
    let grades = grades.as_array().unwrap();
    assert_eq!(grades.len(), 2);
    let linked = grades.iter().filter(|g| g["student_id"].is_string()).count();
    assert_eq!(linked, 1, "the unknown RUT stays unlinked");
    assert!(grades.iter().any(|g| g["score"] == 60.5));

    let (status, csv, content_type) = send_text(&app, "GET", "/exports/grades.csv?year=2025", "").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/csv"));
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("nombre,rut,curso,seccion,asignatura,tipo,fecha,nota,tema"));
    assert_eq!(lines.count(), 2);
    assert!(csv.contains("Ana Pérez,12345678-5,4to Básico,A,Matemáticas,prueba,2025-04-10,85,Fracciones"));

    let (_, csv_2024, _) = send_text(&app, "GET", "/exports/grades.csv?year=2024", "").await;
    assert_eq!(csv_2024.lines().count(), 1);
}

#[tokio::test]
async fn test_generated_attendance_imports_back() {
    let app = create_test_app();
    send_text(&app, "POST", "/imports/users-csv", USERS_CSV).await;

    let body = json!({ "year": 2025, "seed": 7 });
    let (status, csv, _) = send_json_for_text(&app, "/generate/attendance", &body).await;
    assert_eq!(status, StatusCode::OK);
    let (_, again, _) = send_json_for_text(&app, "/generate/attendance", &body).await;
    assert_eq!(csv, again, "a seed always gives the same file");

    let rows = csv.lines().count() - 1;
    assert!(rows > 100, "a school year has well over 100 days, got {}", rows);

    let (status, report, _) = send_text(&app, "POST", "/imports/attendance-csv", &csv).await;
    assert_eq!(status, StatusCode::OK);
    let report: Value = serde_json::from_str(&report).unwrap();
    assert_eq!(report["imported"], rows);
    assert!(report["errors"].as_array().unwrap().is_empty());

    let (_, records) = send(&app, "GET", "/attendance?year=2025", None).await;
    assert_eq!(records.as_array().unwrap().len(), rows);
}

/// Posts JSON and returns the reply as text (the generator answers with CSV)
async fn send_json_for_text(app: &axum::Router, uri: &str, body: &Value) -> (StatusCode, String, String) {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap(), content_type)
}

#[tokio::test]
async fn test_legacy_snapshot_import() {
    let app = create_test_app();

    let (status, reports) = send(&app, "POST", "/imports/legacy", Some(snapshot())).await;
    assert_eq!(status, StatusCode::OK);

    let users = report_for(&reports, "smart-student-users");
    assert_eq!(users["imported"], 1);
    assert_eq!(users["rejected"].as_array().unwrap().len(), 1);
    assert_eq!(report_for(&reports, "smart-student-student-assignments")["imported"], 1);

    let combined = format!("{}-{}", COURSE_ID, SECTION_ID);
    let (status, resolved) = send(&app, "GET", &format!("/course-sections/{}/resolve", combined), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["display_name"], "2do Medio Sección B");

    let uri = format!("/course-sections/{}/{}/students", COURSE_ID, SECTION_ID);
    let (_, students) = send(&app, "GET", &uri, None).await;
    assert_eq!(students[0]["id"], STUDENT_ID);
    assert!(students[0].get("password").is_none());
}

#[tokio::test]
async fn test_legacy_snapshot_import_is_repeatable() {
    let app = create_test_app();
    send(&app, "POST", "/imports/legacy", Some(snapshot())).await;

    let (status, reports) = send(&app, "POST", "/imports/legacy", Some(snapshot())).await;
    assert_eq!(status, StatusCode::OK);
    for report in reports.as_array().unwrap() {
        assert_eq!(report["imported"], 0, "{}", report);
    }
    assert_eq!(report_for(&reports, "smart-student-courses")["skipped"], 1);
}

#[tokio::test]
async fn test_legacy_snapshot_must_be_an_object() {
    let app = create_test_app();

    let (status, _) = send(&app, "POST", "/imports/legacy", Some(json!([1, 2, 3]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
