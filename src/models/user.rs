use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::text_enum::text_enum;
use super::{StringList, StringMap};

text_enum! {
    /// The role a user plays in the school
    pub enum UserRole {
        Student => "student",
        Teacher => "teacher",
        Admin => "admin",
    }
}

/// Represents a user account (student, teacher or administrator)
///
/// This struct maps directly to the `users` table. The password is never
/// stored or serialized in plain text: `password_hash` holds
/// `<salt>$<sha256(salt + password)>` and is skipped on serialization.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    /// Unique identifier for the user (UUID v4 as string)
    id: String,

    /// Login name, unique across the school
    username: String,

    /// Salted password digest
    #[serde(skip_serializing, default)]
    password_hash: String,

    /// The user's role
    role: UserRole,

    /// Name shown in the UI
    display_name: String,

    /// Chilean national id in canonical form, if known
    rut: Option<String>,

    /// Contact email, if known
    email: Option<String>,

    /// Free-text course labels such as "4to Básico Sección A"
    active_courses: StringList,

    /// Subject → teacher username mapping for students
    assigned_teachers: StringMap,

    /// When this user was created
    created_at: NaiveDateTime,

    /// When this user was last updated
    updated_at: NaiveDateTime,
}

/// Fields needed to create a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub role: UserRole,
    pub display_name: String,
    #[serde(default)]
    pub rut: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub active_courses: Vec<String>,
}

/// Changes applied by an update; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    pub display_name: Option<String>,
    pub password: Option<String>,
    pub role: Option<UserRole>,
    pub rut: Option<String>,
    pub email: Option<String>,
    pub active_courses: Option<Vec<String>>,
    pub assigned_teachers: Option<StringMap>,
}

/// Produces the stored digest for `password` under `salt`
fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hashes a password with a fresh random salt
pub fn hash_password(password: &str) -> String {
    let salt: String = format!("{:016x}", rand::rng().random::<u64>());
    format!("{}${}", salt, digest_password(&salt, password))
}

impl User {
    /// Creates a new user, hashing the given plain-text password
    ///
    /// ### Arguments
    ///
    /// * `username` - Login name
    /// * `password` - Plain-text password (only its salted digest is kept)
    /// * `role` - The user's role
    /// * `display_name` - Name shown in the UI
    ///
    /// ### Returns
    ///
    /// A new `User` with no RUT, email, active courses or teachers
    pub fn new(username: String, password: &str, role: UserRole, display_name: String) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            username,
            password_hash: hash_password(password),
            role,
            display_name,
            rut: None,
            email: None,
            active_courses: StringList::default(),
            assigned_teachers: StringMap::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a user from its creation fields
    pub fn from_new(fields: NewUser) -> Self {
        Self::new(fields.username, &fields.password, fields.role, fields.display_name)
            .with_rut(fields.rut)
            .with_email(fields.email)
            .with_active_courses(fields.active_courses)
    }

    /// Replaces the stored digest with one already computed
    pub fn with_password_hash(mut self, password_hash: String) -> Self {
        self.password_hash = password_hash;
        self
    }

    /// Overrides the generated id (used when importing records that already have one)
    pub fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }

    /// Sets the RUT
    pub fn with_rut(mut self, rut: Option<String>) -> Self {
        self.rut = rut;
        self
    }

    /// Sets the email
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }

    /// Sets the active course labels
    pub fn with_active_courses(mut self, active_courses: Vec<String>) -> Self {
        self.active_courses = StringList(active_courses);
        self
    }

    /// Sets the subject → teacher mapping
    pub fn with_assigned_teachers(mut self, assigned_teachers: StringMap) -> Self {
        self.assigned_teachers = assigned_teachers;
        self
    }

    pub fn get_id(&self) -> String {
        self.id.clone()
    }

    pub fn get_username(&self) -> String {
        self.username.clone()
    }

    pub fn get_role(&self) -> UserRole {
        self.role
    }

    pub fn is_student(&self) -> bool {
        self.role == UserRole::Student
    }

    pub fn get_display_name(&self) -> String {
        self.display_name.clone()
    }

    pub fn get_rut(&self) -> Option<String> {
        self.rut.clone()
    }

    pub fn get_email(&self) -> Option<String> {
        self.email.clone()
    }

    pub fn get_active_courses(&self) -> Vec<String> {
        self.active_courses.0.clone()
    }

    pub fn get_assigned_teachers(&self) -> StringMap {
        self.assigned_teachers.clone()
    }

    pub fn get_password_hash(&self) -> String {
        self.password_hash.clone()
    }

    /// Checks a plain-text password against the stored digest
    pub fn verify_password(&self, password: &str) -> bool {
        match self.password_hash.split_once('$') {
            Some((salt, digest)) => digest_password(salt, password) == digest,
            None => false,
        }
    }

    /// Gets the creation timestamp as a DateTime<Utc>
    pub fn get_created_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.created_at, Utc)
    }

    /// Gets the update timestamp as a DateTime<Utc>
    pub fn get_updated_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.updated_at, Utc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_new_hashes_password() {
        let user = User::new("felipe".to_string(), "secret", UserRole::Student, "Felipe".to_string());

        assert!(Uuid::parse_str(&user.get_id()).is_ok());
        assert_ne!(user.get_password_hash(), "secret");
        assert!(user.verify_password("secret"));
        assert!(!user.verify_password("Secret"));
    }

    #[test]
    fn test_hash_password_uses_fresh_salt() {
        assert_ne!(hash_password("1234"), hash_password("1234"));
    }

    #[test]
    fn test_password_hash_is_not_serialized() {
        let user = User::new("ana".to_string(), "pw", UserRole::Teacher, "Ana".to_string());
        let json = serde_json::to_value(&user).unwrap();

        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "teacher");
    }

    #[test]
    fn test_role_parses_case_insensitively() {
        assert_eq!("Student".parse::<UserRole>().unwrap(), UserRole::Student);
        assert_eq!(" ADMIN ".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert!("parent".parse::<UserRole>().is_err());
    }
}
