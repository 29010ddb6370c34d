use crate::db::{DbPool, with_retry};
use crate::models::{NewUser, StringList, User, UserRole, UserUpdate, hash_password};
use crate::repo::RepoError;
use crate::rut::Rut;
use crate::schema::users;
use anyhow::Result;
use chrono::Utc;
use diesel::prelude::*;
use tracing::{debug, instrument};

/// Normalizes an optional RUT to canonical form, rejecting invalid ones
fn canonical_optional_rut(rut: Option<String>) -> Result<Option<String>> {
    match rut.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => Rut::parse(raw)
            .map(|r| Some(r.to_string()))
            .map_err(|e| RepoError::Invalid(e.to_string()).into()),
    }
}

/// Trims optional text, mapping blank values to `None`
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Creates a new user in the database
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `new_user` - Username, plain-text password, role and profile data
///
/// ### Returns
///
/// A Result containing the newly created User if successful
///
/// ### Errors
///
/// Returns an error if:
/// - The username or display name is blank, or the RUT is invalid
/// - The username or RUT is already taken
/// - The database insert operation fails
#[instrument(skip(pool, new_user), fields(username = %new_user.username, role = %new_user.role))]
pub async fn create_user(pool: &DbPool, new_user: NewUser) -> Result<User> {
    let username = new_user.username.trim().to_string();
    if username.is_empty() {
        return Err(RepoError::Invalid("username must not be empty".to_string()).into());
    }
    if new_user.display_name.trim().is_empty() {
        return Err(RepoError::Invalid("display name must not be empty".to_string()).into());
    }
    let rut = canonical_optional_rut(new_user.rut.clone())?;

    let user = User::from_new(NewUser {
        username,
        display_name: new_user.display_name.trim().to_string(),
        rut,
        email: non_blank(new_user.email.clone()),
        ..new_user
    });

    insert_user(pool, user).await
}

/// Inserts an already built user (used by imports that carry their own ids)
///
/// ### Errors
///
/// Returns `RepoError::Conflict` if the id, username or RUT is taken.
pub async fn insert_user(pool: &DbPool, user: User) -> Result<User> {
    let conn = &mut pool.get()?;

    let result = with_retry(|| {
        diesel::insert_into(users::table)
            .values(&user)
            .execute(conn)
    })
    .await;

    match result {
        Ok(_) => {
            debug!("Created user {}", user.get_id());
            Ok(user)
        }
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => Err(RepoError::Conflict(format!(
            "user {} already exists",
            user.get_username()
        ))
        .into()),
        Err(e) => Err(e.into()),
    }
}

/// Retrieves a user from the database by its ID
///
/// ### Returns
///
/// A Result containing an Option with the User if found, or None if not found
pub fn get_user(pool: &DbPool, user_id: &str) -> Result<Option<User>> {
    let conn = &mut pool.get()?;

    let result = users::table
        .find(user_id)
        .first::<User>(conn)
        .optional()?;

    Ok(result)
}

/// Retrieves a user by username
pub fn get_user_by_username(pool: &DbPool, username: &str) -> Result<Option<User>> {
    let conn = &mut pool.get()?;

    let result = users::table
        .filter(users::username.eq(username.trim()))
        .first::<User>(conn)
        .optional()?;

    Ok(result)
}

/// Retrieves a user by RUT, accepting any spelling `Rut::parse` accepts
///
/// An invalid RUT simply matches nobody.
pub fn get_user_by_rut(pool: &DbPool, rut: &str) -> Result<Option<User>> {
    let canonical = match Rut::parse(rut) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => return Ok(None),
    };
    let conn = &mut pool.get()?;

    let result = users::table
        .filter(users::rut.eq(canonical))
        .first::<User>(conn)
        .optional()?;

    Ok(result)
}

/// Lists users ordered by username, optionally restricted to one role
pub fn list_users(pool: &DbPool, role: Option<UserRole>) -> Result<Vec<User>> {
    let conn = &mut pool.get()?;

    let mut query = users::table.order(users::username.asc()).into_boxed();
    if let Some(role) = role {
        query = query.filter(users::role.eq(role));
    }

    Ok(query.load::<User>(conn)?)
}

/// Applies an update to a user
///
/// ### Errors
///
/// Returns an error if:
/// - The user does not exist
/// - A provided field is blank or the RUT is invalid
/// - The new RUT belongs to another user
#[instrument(skip(pool, update))]
pub async fn update_user(pool: &DbPool, user_id: &str, update: UserUpdate) -> Result<User> {
    let existing = get_user(pool, user_id)?
        .ok_or_else(|| RepoError::NotFound(format!("User {}", user_id)))?;

    let display_name = match update.display_name.map(|d| d.trim().to_string()) {
        Some(name) if name.is_empty() => {
            return Err(RepoError::Invalid("display name must not be empty".to_string()).into());
        }
        Some(name) => name,
        None => existing.get_display_name(),
    };
    let rut = match update.rut {
        Some(raw) => canonical_optional_rut(Some(raw))?,
        None => existing.get_rut(),
    };
    let email = match update.email {
        Some(raw) => non_blank(Some(raw)),
        None => existing.get_email(),
    };
    let password_hash = update
        .password
        .map(|p| hash_password(&p))
        .unwrap_or_else(|| existing.get_password_hash());
    let role = update.role.unwrap_or(existing.get_role());
    let active_courses = StringList(
        update
            .active_courses
            .unwrap_or_else(|| existing.get_active_courses()),
    );
    let assigned_teachers = update
        .assigned_teachers
        .unwrap_or_else(|| existing.get_assigned_teachers());

    let conn = &mut pool.get()?;
    let now = Utc::now().naive_utc();
    let result = with_retry(|| {
        diesel::update(users::table.find(user_id))
            .set((
                users::display_name.eq(&display_name),
                users::rut.eq(&rut),
                users::email.eq(&email),
                users::password_hash.eq(&password_hash),
                users::role.eq(role),
                users::active_courses.eq(&active_courses),
                users::assigned_teachers.eq(&assigned_teachers),
                users::updated_at.eq(now),
            ))
            .execute(conn)
    })
    .await;

    match result {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => {
            return Err(RepoError::Conflict("RUT already belongs to another user".to_string()).into());
        }
        Err(e) => return Err(e.into()),
    }

    get_user(pool, user_id)?.ok_or_else(|| RepoError::NotFound(format!("User {}", user_id)).into())
}

/// Replaces a user's active course labels
pub async fn set_active_courses(pool: &DbPool, user_id: &str, active_courses: Vec<String>) -> Result<()> {
    let conn = &mut pool.get()?;
    let list = StringList(active_courses);
    let now = Utc::now().naive_utc();

    let updated = with_retry(|| {
        diesel::update(users::table.find(user_id))
            .set((users::active_courses.eq(&list), users::updated_at.eq(now)))
            .execute(conn)
    })
    .await?;

    if updated == 0 {
        return Err(RepoError::NotFound(format!("User {}", user_id)).into());
    }
    Ok(())
}

/// Deletes a user; their assignments and attendance go with them and their
/// grades lose the link
pub async fn delete_user(pool: &DbPool, user_id: &str) -> Result<()> {
    let conn = &mut pool.get()?;

    let deleted = with_retry(|| diesel::delete(users::table.find(user_id)).execute(conn)).await?;
    if deleted == 0 {
        return Err(RepoError::NotFound(format!("User {}", user_id)).into());
    }
    Ok(())
}

/// Checks a username and password pair
///
/// ### Returns
///
/// The user when the password matches, `None` for an unknown user or a wrong
/// password
pub fn verify_password(pool: &DbPool, username: &str, password: &str) -> Result<Option<User>> {
    Ok(get_user_by_username(pool, username)?.filter(|user| user.verify_password(password)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;

    fn new_student(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "1234".to_string(),
            role: UserRole::Student,
            display_name: format!("Student {}", username),
            rut: None,
            email: None,
            active_courses: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let pool = setup_test_db();
        let user = create_user(
            &pool,
            NewUser {
                rut: Some("12.345.678-5".to_string()),
                email: Some("  ".to_string()),
                ..new_student(" felipe ")
            },
        )
        .await
        .unwrap();

        assert_eq!(user.get_username(), "felipe");
        assert_eq!(user.get_rut(), Some("12345678-5".to_string()));
        assert_eq!(user.get_email(), None);

        let fetched = get_user(&pool, &user.get_id()).unwrap().unwrap();
        assert_eq!(fetched.get_username(), "felipe");
        assert_eq!(fetched.get_role(), UserRole::Student);
        assert!(fetched.verify_password("1234"));

        let by_rut = get_user_by_rut(&pool, "123456785").unwrap().unwrap();
        assert_eq!(by_rut.get_id(), user.get_id());
    }

    #[tokio::test]
    async fn test_create_user_rejects_invalid_rut() {
        let pool = setup_test_db();
        let result = create_user(
            &pool,
            NewUser {
                rut: Some("12345678-9".to_string()),
                ..new_student("ana")
            },
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err.downcast_ref::<RepoError>(), Some(RepoError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_duplicate_username_is_conflict() {
        let pool = setup_test_db();
        create_user(&pool, new_student("ana")).await.unwrap();

        let err = create_user(&pool, new_student("ana")).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<RepoError>(), Some(RepoError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_list_users_by_role() {
        let pool = setup_test_db();
        create_user(&pool, new_student("b")).await.unwrap();
        create_user(&pool, new_student("a")).await.unwrap();
        create_user(
            &pool,
            NewUser {
                role: UserRole::Teacher,
                ..new_student("prof")
            },
        )
        .await
        .unwrap();

        let students = list_users(&pool, Some(UserRole::Student)).unwrap();
        let names: Vec<String> = students.iter().map(|u| u.get_username()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(list_users(&pool, None).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_user_changes_only_given_fields() {
        let pool = setup_test_db();
        let user = create_user(&pool, new_student("ana")).await.unwrap();

        let updated = update_user(
            &pool,
            &user.get_id(),
            UserUpdate {
                display_name: Some("Ana María".to_string()),
                password: Some("nueva".to_string()),
                active_courses: Some(vec!["4to Básico Sección A".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.get_display_name(), "Ana María");
        assert_eq!(updated.get_username(), "ana");
        assert_eq!(updated.get_active_courses(), vec!["4to Básico Sección A"]);
        assert!(updated.verify_password("nueva"));
        assert!(verify_password(&pool, "ana", "nueva").unwrap().is_some());
        assert!(verify_password(&pool, "ana", "1234").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_user_is_not_found() {
        let pool = setup_test_db();
        let err = update_user(&pool, "missing", UserUpdate::default()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<RepoError>(), Some(RepoError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_user() {
        let pool = setup_test_db();
        let user = create_user(&pool, new_student("ana")).await.unwrap();

        delete_user(&pool, &user.get_id()).await.unwrap();

        assert!(get_user(&pool, &user.get_id()).unwrap().is_none());
        assert!(delete_user(&pool, &user.get_id()).await.is_err());
    }
}
