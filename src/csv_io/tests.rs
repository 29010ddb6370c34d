use super::*;
use crate::test_utils::setup_test_db;

const USERS: &str = "\
role,name,rut,email,username,password,course,section,subjects
student,Ana Pérez,12.345.678-5,ana@colegio.cl,ana,temporal123,4to Básico,A,
student,\"Soto, Luis\",11111111-1,,luis,temporal123,4to Básico,A,
teacher,Profesora Rojas,,,rojas,clave,4to Básico,A,Matemáticas;Lenguaje
student,Sin Curso,,,solo,temporal123,,,
apoderado,Papá,,,papa,x,,,
student,Mal Rut,12345678-9,,malrut,x,,,
";

#[test]
fn test_parse_csv_record_handles_quotes() {
    assert_eq!(parse_csv_record("a,b,,c"), vec!["a", "b", "", "c"]);
    assert_eq!(
        parse_csv_record("\"Soto, Luis\",\"dice \"\"hola\"\"\",x"),
        vec!["Soto, Luis", "dice \"hola\"", "x"]
    );
}

#[test]
fn test_csv_quote_only_when_needed() {
    assert_eq!(csv_quote("simple"), "simple");
    assert_eq!(csv_quote("a,b"), "\"a,b\"");
    assert_eq!(csv_quote("say \"hi\""), "\"say \"\"hi\"\"\"");
    let line = csv_line(["Soto, Luis", "x"]);
    assert_eq!(parse_csv_record(&line), vec!["Soto, Luis", "x"]);
}

#[test]
fn test_split_csv_records_keeps_quoted_line_breaks() {
    let text = "a,b\r\n1,\"dos\nlíneas\"\r\n\n3,x\n";
    let records = split_csv_records(text);

    assert_eq!(
        records,
        vec![
            (1, "a,b".to_string()),
            (2, "1,\"dos\nlíneas\"".to_string()),
            (4, String::new()),
            (5, "3,x".to_string()),
        ]
    );
}

#[test]
fn test_attendance_with_multiline_comment_reads_back() {
    let row = AttendanceRow {
        date: NaiveDate::from_ymd_opt(2025, 4, 7).unwrap(),
        course: "4to Básico".to_string(),
        section: "A".to_string(),
        student_username: "ana".to_string(),
        rut: "12345678-5".to_string(),
        name: "Ana Pérez".to_string(),
        status: AttendanceStatus::Late,
        comment: "llegó tarde\nsin justificativo".to_string(),
    };
    let mut next = row.clone();
    next.date = NaiveDate::from_ymd_opt(2025, 4, 8).unwrap();
    next.status = AttendanceStatus::Present;
    next.comment = String::new();

    let csv = write_attendance_csv(&[row.clone(), next.clone()]);
    let parsed = parse_attendance_csv(&csv);

    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    assert_eq!(parsed.rows, vec![(2, row), (4, next)]);
}

#[test]
fn test_line_errors_count_physical_lines() {
    let text = "\
date,course,section,studentUsername,rut,name,status,comment
2025-03-03,4to Básico,A,ana,,Ana,present,\"primera
segunda\"
2025-03-03,4to Básico,A,ana,,Ana,tal vez,
";
    let parsed = parse_attendance_csv(text);

    assert_eq!(parsed.rows.len(), 1);
    assert_eq!(parsed.rows[0].1.comment, "primera\nsegunda");
    assert_eq!(parsed.errors.len(), 1);
    assert_eq!(parsed.errors[0].line, 4);
}

#[test]
fn test_parse_flexible_date_formats() {
    let expected = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
    for raw in ["2025-03-14", "2025/3/14", "14-03-2025", "14/03/2025", "14.03.2025"] {
        assert_eq!(parse_flexible_date(raw), Some(expected), "{}", raw);
    }
    assert_eq!(parse_flexible_date("2025-03-14T23:30:00-03:00"), Some(expected));
    assert_eq!(parse_flexible_date("ayer"), None);
    assert_eq!(parse_flexible_date("2025-02-30"), None);
}

#[test]
fn test_parse_score_accepts_decimal_comma() {
    assert_eq!(parse_score("85"), Some(85.0));
    assert_eq!(parse_score("6,5"), Some(6.5));
    assert_eq!(parse_score("101"), None);
    assert_eq!(parse_score("-1"), None);
    assert_eq!(parse_score("n/a"), None);
}

#[test]
fn test_parse_users_csv_collects_line_errors() {
    let parsed = parse_users_csv(USERS);

    assert_eq!(parsed.rows.len(), 4);
    let (line, luis) = &parsed.rows[1];
    assert_eq!(*line, 3);
    assert_eq!(luis.name, "Soto, Luis");
    assert_eq!(luis.rut.as_deref(), Some("11111111-1"));

    let (_, teacher) = &parsed.rows[2];
    assert_eq!(teacher.role, UserRole::Teacher);
    assert_eq!(teacher.subjects, vec!["Matemáticas", "Lenguaje"]);

    let lines: Vec<usize> = parsed.errors.iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![6, 7]);
    assert!(parsed.errors[0].message.contains("apoderado"));
}

#[test]
fn test_parse_users_csv_requires_header_columns() {
    let parsed = parse_users_csv("role,email\nstudent,a@b.cl\n");
    assert!(parsed.rows.is_empty());
    assert_eq!(parsed.errors.len(), 1);
    assert!(parsed.errors[0].message.contains("name"));

    assert_eq!(parse_users_csv("").errors[0].message, "file is empty");
}

#[test]
fn test_parse_grades_csv_with_aliases() {
    let text = "\
Nombre,RUT,Curso,Seccion,Asignatura,Type,Date,Score,Topic
Ana,12.345.678-5,4to Básico,A,Matemáticas,prueba,2025-04-10,\"92,5\",Fracciones
Luis,11111111-1,4to Básico,A,Lenguaje,quiz,10/04/2025,70,
Nadie,,4to Básico,A,Lenguaje,tarea,2025-04-10,70,
Luis,11111111-1,4to Básico,A,Lenguaje,tarea,2025-04-10,700,
";
    let parsed = parse_grades_csv(text);

    assert_eq!(parsed.rows.len(), 2);
    let (_, ana) = &parsed.rows[0];
    assert_eq!(ana.rut, "12345678-5");
    assert_eq!(ana.score, 92.5);
    assert_eq!(ana.activity_type, ActivityType::Test);
    assert_eq!(ana.graded_at.to_rfc3339(), "2025-04-10T12:00:00+00:00");

    let (_, luis) = &parsed.rows[1];
    assert_eq!(luis.activity_type, ActivityType::Evaluation);
    assert!(luis.topic.is_empty());

    assert_eq!(parsed.errors.iter().map(|e| e.line).collect::<Vec<_>>(), vec![4, 5]);
}

#[test]
fn test_parse_attendance_csv_statuses() {
    let text = "\
date,course,section,studentUsername,rut,name,status,comment
2025-03-03,4to Básico,A,ana,,Ana,presente,
2025-03-03,4to Básico,A,,11111111-1,Luis,justificado,Médico
2025-03-03,4to Básico,A,,,,present,
2025-03-03,4to Básico,A,ana,,Ana,dormido,
";
    let parsed = parse_attendance_csv(text);

    assert_eq!(parsed.rows.len(), 2);
    assert_eq!(parsed.rows[0].1.status, AttendanceStatus::Present);
    assert_eq!(parsed.rows[1].1.status, AttendanceStatus::Excused);
    assert_eq!(parsed.rows[1].1.comment, "Médico");
    assert_eq!(parsed.errors.len(), 2);
}

#[tokio::test]
async fn test_import_users_csv_assigns_students_and_teachers() {
    let pool = setup_test_db();

    let report = import_users_csv(&pool, USERS).await.unwrap();

    assert_eq!(report.imported, 4);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.errors.len(), 2);

    let (course, section) = find_course_section(&pool, "4to Básico", "A").unwrap();
    let students = repo::get_students_for_course_section(&pool, &course.get_id(), &section.get_id()).unwrap();
    let usernames: Vec<String> = students.iter().map(|s| s.get_username()).collect();
    assert_eq!(usernames, vec!["ana", "luis"]);

    let ana = repo::get_user_by_username(&pool, "ana").unwrap().unwrap();
    assert_eq!(ana.get_active_courses(), vec!["4to Básico Sección A"]);
    assert!(ana.verify_password("temporal123"));
    let teachers = ana.get_assigned_teachers();
    assert_eq!(teachers.0.get("Matemáticas").map(String::as_str), Some("rojas"));
    assert_eq!(teachers.0.get("Lenguaje").map(String::as_str), Some("rojas"));

    let again = import_users_csv(&pool, USERS).await.unwrap();
    assert_eq!(again.imported, 0);
    assert_eq!(again.skipped, 4);
}

#[tokio::test]
async fn test_import_grades_csv_resolves_by_rut_and_names() {
    let pool = setup_test_db();
    import_users_csv(&pool, USERS).await.unwrap();

    let text = "\
nombre,rut,curso,seccion,asignatura,tipo,fecha,nota,tema
Ana,12345678-5,4to basico,a,Matemáticas,prueba,2025-04-10,90,Fracciones
Luis,11111111-1,4° Básico,,Lenguaje,tarea,2025-04-11,75,
Nuevo,22222222-2,4to Básico,A,Lenguaje,tarea,2025-04-11,60,
Ana,12345678-5,8vo Básico,A,Lenguaje,tarea,2025-04-11,60,
";
    let report = import_grades_csv(&pool, text).await.unwrap();

    assert_eq!(report.imported, 3, "{:?}", report.errors);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].line, 5);

    let grades = repo::list_grades(&pool, &GradeFilter { year: Some(2025), ..Default::default() }).unwrap();
    let ana = repo::get_user_by_username(&pool, "ana").unwrap().unwrap();
    let luis = repo::get_user_by_username(&pool, "luis").unwrap().unwrap();

    let ana_grade = grades.iter().find(|g| g.get_student_id() == Some(ana.get_id())).unwrap();
    assert_eq!(ana_grade.get_topic(), "Fracciones");
    // No section on the line: taken from the student's assignment
    let luis_grade = grades.iter().find(|g| g.get_student_id() == Some(luis.get_id())).unwrap();
    assert_eq!(luis_grade.get_section_id(), ana_grade.get_section_id());
    // Unknown RUT: kept, not linked
    assert!(grades.iter().any(|g| g.get_student_id().is_none()
        && g.get_student_rut().as_deref() == Some("22222222-2")));
}

#[tokio::test]
async fn test_import_and_export_attendance_csv() {
    let pool = setup_test_db();
    import_users_csv(&pool, USERS).await.unwrap();

    let text = "\
date,course,section,studentUsername,rut,name,status,comment
2025-03-03,4to Básico,A,ana,,Ana,present,
2025-03-03,4to Básico,,,11111111-1,Luis,late,\"Llegó tarde, 10 min\"
2025-03-03,4to Básico,A,fantasma,,X,present,
";
    let report = import_attendance_csv(&pool, text).await.unwrap();
    assert_eq!(report.imported, 2, "{:?}", report.errors);
    assert_eq!(report.errors[0].line, 4);

    let csv = export_attendance_csv(&pool, Some(2025)).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some(ATTENDANCE_HEADER));
    let rows: Vec<Vec<String>> = lines.map(parse_csv_record).collect();
    assert_eq!(rows.len(), 2);
    let luis = rows.iter().find(|r| r[3] == "luis").unwrap();
    assert_eq!(luis[6], "late");
    assert_eq!(luis[7], "Llegó tarde, 10 min");

    // The export reads back as the same rows
    let reparsed = parse_attendance_csv(&csv);
    assert!(reparsed.errors.is_empty());
    assert_eq!(reparsed.rows.len(), 2);
}

#[tokio::test]
async fn test_export_grades_csv_matches_import_format() {
    let pool = setup_test_db();
    import_users_csv(&pool, USERS).await.unwrap();
    import_grades_csv(
        &pool,
        "nombre,rut,curso,seccion,asignatura,tipo,fecha,nota,tema\n\
         Ana,12345678-5,4to Básico,A,Matemáticas,prueba,2025-04-10,90,\"Sumas, restas\"\n",
    )
    .await
    .unwrap();

    let csv = export_grades_csv(&pool, Some(2025)).unwrap();
    let reparsed = parse_grades_csv(&csv);

    assert!(reparsed.errors.is_empty(), "{:?}", reparsed.errors);
    let (_, row) = &reparsed.rows[0];
    assert_eq!(row.name, "Ana Pérez");
    assert_eq!(row.course, "4to Básico");
    assert_eq!(row.section, "A");
    assert_eq!(row.topic, "Sumas, restas");
    assert_eq!(row.score, 90.0);

    assert_eq!(export_grades_csv(&pool, Some(2024)).unwrap(), format!("{}\n", GRADES_HEADER));
}

#[tokio::test]
async fn test_generate_attendance_csv_covers_roster() {
    let pool = setup_test_db();
    import_users_csv(&pool, USERS).await.unwrap();

    let roster = roster_from_assignments(&pool).unwrap();
    assert_eq!(roster.iter().map(|r| r.username.as_str()).collect::<Vec<_>>(), vec!["ana", "luis"]);

    let first = generate_attendance_csv(&pool, 2025, 9).unwrap();
    let second = generate_attendance_csv(&pool, 2025, 9).unwrap();
    assert_eq!(first, second);

    let days = calendar::school_days(&SchoolCalendar::for_year(2025).unwrap()).len();
    assert_eq!(first.lines().count(), 1 + 2 * days);
    assert!(generate_attendance_csv(&pool, 300_000, 1).is_err());
}
