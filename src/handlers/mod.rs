/// Web API Handlers
///
/// This module contains the handlers for the RESTful API endpoints.
/// Each handler is responsible for processing a specific type of HTTP request,
/// extracting the necessary data, calling the appropriate repository functions,
/// and returning a properly formatted response.

mod by_year;

mod user_handlers;
mod course_handlers;
mod subject_handlers;
mod assignment_handlers;
mod task_handlers;
mod grade_handlers;
mod attendance_handlers;
mod import_handlers;
mod maintenance_handlers;
mod ocr_handlers;
mod slide_handlers;

// Re-export all handlers
pub use user_handlers::*;
pub use course_handlers::*;
pub use subject_handlers::*;
pub use assignment_handlers::*;
pub use task_handlers::*;
pub use grade_handlers::*;
pub use attendance_handlers::*;
pub use import_handlers::*;
pub use maintenance_handlers::*;
pub use ocr_handlers::*;
pub use slide_handlers::*;
