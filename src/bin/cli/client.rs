use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use smart_student::course_section::ResolvedCourseSection;
use smart_student::csv_io::CsvImportReport;
use smart_student::dto::{
    AssignStudentDto, AssignedDto, CreateNamedDto, DeleteByYearDto, DeleteByYearQuery,
    GenerateAttendanceDto, MarkReadDto,
};
use smart_student::legacy::ImportReport;
use smart_student::maintenance::{MaintenanceCommand, MaintenanceReport};
use smart_student::models::{
    AttendanceRecord, Course, Grade, NewGrade, NewTask, NewUser, Section, StudentAssignment, Task,
    TaskNotification, User, UserRole, UserUpdate,
};
use smart_student::images::{ImageSearchQuery, ImageSearchResponse};
use smart_student::ocr::{OcrRequest, OcrResponse};
use smart_student::repo::{AssignmentFilter, AttendanceFilter, GradeFilter, NewAttendance};
use smart_student::slides::{SlidesRequest, SlidesResponse};

/// Error type for CLI client operations
#[derive(Debug)]
pub enum ClientError {
    /// Server returned an error status with a message body
    Server { status: reqwest::StatusCode, message: String },
    /// Network/connection/request error
    Request(reqwest::Error),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Server { status, message } => {
                write!(f, "Server error ({}): {}", status.as_u16(), message)
            }
            ClientError::Request(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Request(err) => Some(err),
            ClientError::Server { .. } => None,
        }
    }
}

/// Extension trait for checking HTTP responses and extracting server error messages
trait ResponseExt {
    /// Checks for error status and extracts the server's error message body
    async fn check(self) -> Result<reqwest::Response, ClientError>;
}

impl ResponseExt for reqwest::Response {
    async fn check(self) -> Result<reqwest::Response, ClientError> {
        if self.status().is_success() {
            return Ok(self);
        }
        let status = self.status();
        let message = match self.json::<serde_json::Value>().await {
            Ok(body) => body.get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("Unknown error")
                .to_string(),
            Err(_) => format!("HTTP {}", status),
        };
        Err(ClientError::Server { status, message })
    }
}

/// HTTP client wrapper for communicating with the Smart Student server
pub struct SmartStudentClient {
    /// The base URL of the server (e.g. "http://localhost:3000")
    base_url: String,
    /// The underlying HTTP client
    client: Client,
}

impl SmartStudentClient {
    /// Creates a new SmartStudentClient
    ///
    /// ### Arguments
    ///
    /// * `base_url` - The base URL of the Smart Student server
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    async fn send(builder: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        builder.send().await.map_err(ClientError::Request)?.check().await
    }

    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ClientError> {
        Self::send(builder).await?.json().await.map_err(ClientError::Request)
    }

    async fn send_text(builder: RequestBuilder) -> Result<String, ClientError> {
        Self::send(builder).await?.text().await.map_err(ClientError::Request)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        Self::send_json(self.request(Method::GET, path)).await
    }

    async fn get_with<T: DeserializeOwned, Q: Serialize + ?Sized>(&self, path: &str, query: &Q) -> Result<T, ClientError> {
        Self::send_json(self.request(Method::GET, path).query(query)).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        Self::send_json(self.request(Method::POST, path).json(body)).await
    }

    async fn delete(&self, path: &str) -> Result<(), ClientError> {
        Self::send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    // ── Users ────────────────────────────────────────────────────────

    /// Lists users, optionally restricted to some roles
    pub async fn list_users(&self, roles: &[UserRole]) -> Result<Vec<User>, ClientError> {
        let params: Vec<(&str, &str)> = roles.iter().map(|r| ("role", r.as_str())).collect();
        self.get_with("/users", &params).await
    }

    pub async fn get_user(&self, id: &str) -> Result<User, ClientError> {
        self.get(&format!("/users/{}", id)).await
    }

    pub async fn create_user(&self, new_user: &NewUser) -> Result<User, ClientError> {
        self.post("/users", new_user).await
    }

    pub async fn update_user(&self, id: &str, update: &UserUpdate) -> Result<User, ClientError> {
        Self::send_json(self.request(Method::PUT, &format!("/users/{}", id)).json(update)).await
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), ClientError> {
        self.delete(&format!("/users/{}", id)).await
    }

    /// Lists the notifications of a user, given by id or username
    pub async fn list_notifications(&self, user: &str, unread_only: bool) -> Result<Vec<TaskNotification>, ClientError> {
        self.get_with(&format!("/users/{}/notifications", user), &[("unread_only", unread_only)])
            .await
    }

    pub async fn mark_notification_read(&self, id: &str, username: String) -> Result<TaskNotification, ClientError> {
        self.post(&format!("/notifications/{}/read", id), &MarkReadDto { username }).await
    }

    // ── Courses and sections ─────────────────────────────────────────

    pub async fn list_courses(&self) -> Result<Vec<Course>, ClientError> {
        self.get("/courses").await
    }

    pub async fn get_course(&self, id: &str) -> Result<Course, ClientError> {
        self.get(&format!("/courses/{}", id)).await
    }

    pub async fn create_course(&self, name: String) -> Result<Course, ClientError> {
        self.post("/courses", &CreateNamedDto { name }).await
    }

    pub async fn delete_course(&self, id: &str) -> Result<(), ClientError> {
        self.delete(&format!("/courses/{}", id)).await
    }

    pub async fn list_sections(&self, course_id: Option<&str>) -> Result<Vec<Section>, ClientError> {
        match course_id {
            Some(course_id) => self.get(&format!("/courses/{}/sections", course_id)).await,
            None => self.get("/sections").await,
        }
    }

    pub async fn create_section(&self, course_id: &str, name: String) -> Result<Section, ClientError> {
        self.post(&format!("/courses/{}/sections", course_id), &CreateNamedDto { name }).await
    }

    pub async fn resolve_course_section(&self, raw: &str) -> Result<ResolvedCourseSection, ClientError> {
        self.get(&format!("/course-sections/{}/resolve", raw)).await
    }

    pub async fn course_section_students(&self, course_id: &str, section_id: &str) -> Result<Vec<User>, ClientError> {
        self.get(&format!("/course-sections/{}/{}/students", course_id, section_id)).await
    }

    // ── Assignments ──────────────────────────────────────────────────

    pub async fn list_assignments(&self, filter: &AssignmentFilter) -> Result<Vec<StudentAssignment>, ClientError> {
        self.get_with("/assignments", filter).await
    }

    pub async fn assign_student(&self, dto: &AssignStudentDto) -> Result<StudentAssignment, ClientError> {
        self.post("/assignments", dto).await
    }

    pub async fn unassign_student(&self, student_id: &str, course_id: &str) -> Result<(), ClientError> {
        self.delete(&format!("/assignments/{}/{}", student_id, course_id)).await
    }

    // ── Tasks ────────────────────────────────────────────────────────

    pub async fn list_tasks(&self, created_by: Option<&str>) -> Result<Vec<Task>, ClientError> {
        let params: Vec<(&str, &str)> = created_by.map(|c| ("created_by", c)).into_iter().collect();
        self.get_with("/tasks", &params).await
    }

    pub async fn get_task(&self, id: &str) -> Result<Task, ClientError> {
        self.get(&format!("/tasks/{}", id)).await
    }

    pub async fn create_task(&self, new_task: &NewTask) -> Result<Task, ClientError> {
        self.post("/tasks", new_task).await
    }

    pub async fn delete_task(&self, id: &str) -> Result<(), ClientError> {
        self.delete(&format!("/tasks/{}", id)).await
    }

    pub async fn task_recipients(&self, id: &str) -> Result<Vec<User>, ClientError> {
        self.get(&format!("/tasks/{}/recipients", id)).await
    }

    pub async fn task_assigned(&self, id: &str, student_id: &str) -> Result<AssignedDto, ClientError> {
        self.get(&format!("/tasks/{}/students/{}/assigned", id, student_id)).await
    }

    // ── Grades and attendance ────────────────────────────────────────

    pub async fn list_grades(&self, filter: &GradeFilter) -> Result<Vec<Grade>, ClientError> {
        self.get_with("/grades", filter).await
    }

    pub async fn create_grade(&self, new_grade: &NewGrade) -> Result<Grade, ClientError> {
        self.post("/grades", new_grade).await
    }

    pub async fn list_attendance(&self, filter: &AttendanceFilter) -> Result<Vec<AttendanceRecord>, ClientError> {
        self.get_with("/attendance", filter).await
    }

    pub async fn record_attendance(&self, entry: &NewAttendance) -> Result<AttendanceRecord, ClientError> {
        self.post("/attendance", entry).await
    }

    /// Deletes a year of grades (`"grades"`) or attendance (`"attendance"`)
    pub async fn delete_by_year(
        &self,
        records: &str,
        year: i32,
        query: &DeleteByYearQuery,
    ) -> Result<DeleteByYearDto, ClientError> {
        let path = format!("/{}/by-year/{}", records, year);
        Self::send_json(self.request(Method::DELETE, &path).query(query)).await
    }

    pub async fn generate_attendance(&self, year: i32, seed: Option<u64>) -> Result<String, ClientError> {
        let dto = GenerateAttendanceDto { year, seed };
        Self::send_text(self.request(Method::POST, "/generate/attendance").json(&dto)).await
    }

    // ── Imports and exports ──────────────────────────────────────────

    pub async fn import_legacy(&self, snapshot: &Value) -> Result<Vec<ImportReport>, ClientError> {
        self.post("/imports/legacy", snapshot).await
    }

    /// Posts CSV text to `/imports/{kind}-csv`
    pub async fn import_csv(&self, kind: &str, text: String) -> Result<CsvImportReport, ClientError> {
        let builder = self
            .request(Method::POST, &format!("/imports/{}-csv", kind))
            .header(reqwest::header::CONTENT_TYPE, "text/csv; charset=utf-8")
            .body(text);
        Self::send_json(builder).await
    }

    /// Downloads `/exports/{kind}.csv`
    pub async fn export_csv(&self, kind: &str, year: Option<i32>) -> Result<String, ClientError> {
        let params: Vec<(&str, i32)> = year.map(|y| ("year", y)).into_iter().collect();
        Self::send_text(self.request(Method::GET, &format!("/exports/{}.csv", kind)).query(&params)).await
    }

    // ── Maintenance and OCR ──────────────────────────────────────────

    pub async fn list_maintenance_commands(&self) -> Result<Vec<MaintenanceCommand>, ClientError> {
        self.get("/maintenance").await
    }

    pub async fn run_maintenance(&self, command: MaintenanceCommand, dry_run: bool) -> Result<MaintenanceReport, ClientError> {
        let builder = self
            .request(Method::POST, &format!("/maintenance/{}", command))
            .query(&[("dry_run", dry_run)]);
        Self::send_json(builder).await
    }

    pub async fn analyze_answer_sheet(&self, request: &OcrRequest) -> Result<OcrResponse, ClientError> {
        self.post("/ocr/analyze", request).await
    }

    // ── Slides ───────────────────────────────────────────────────────

    pub async fn generate_slides(&self, request: &SlidesRequest) -> Result<SlidesResponse, ClientError> {
        self.post("/slides/generate", request).await
    }

    pub async fn search_images(&self, query: &ImageSearchQuery) -> Result<ImageSearchResponse, ClientError> {
        self.get_with("/images/search", query).await
    }
}
