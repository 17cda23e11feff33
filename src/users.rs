use chrono::Utc;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    auth::hash_password,
    catalog::SearchQuery,
    error::{AppError, FieldError},
    models::{Role, User, UserRow},
    pagination::{Page, PageMeta, PageQuery},
};

pub const MIN_PASSWORD_LEN: usize = 6;
const NAME_LEN: std::ops::RangeInclusive<usize> = 2..=50;
const PHONE_MAX_LEN: usize = 20;

pub const SORTABLE: &[(&str, &str)] = &[
    ("id", "id"),
    ("firstName", "first_name"),
    ("lastName", "last_name"),
    ("email", "email"),
    ("role", "role"),
    ("createdAt", "created_at"),
    ("modifiedAt", "modified_at"),
];

const USER_COLUMNS: &str =
    "id, first_name, last_name, email, password_hash, role, phone, photo, active, created_at, modified_at";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub phone: Option<String>,
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub phone: Option<String>,
    pub photo: Option<String>,
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

struct Profile<'a> {
    first_name: &'a str,
    last_name: &'a str,
    email: &'a str,
    password: Option<&'a str>,
    phone: Option<&'a str>,
}

fn validate(profile: &Profile<'_>) -> Result<(), AppError> {
    let mut errors = Vec::new();
    for (field, value) in [("firstName", profile.first_name), ("lastName", profile.last_name)] {
        if !NAME_LEN.contains(&value.trim().chars().count()) {
            errors.push(FieldError::new(
                field,
                format!(
                    "{field} must be between {} and {} characters",
                    NAME_LEN.start(),
                    NAME_LEN.end()
                ),
            ));
        }
    }
    if !looks_like_email(profile.email.trim()) {
        errors.push(FieldError::new("email", "email must be a valid e-mail address"));
    }
    if profile
        .password
        .is_some_and(|password| password.chars().count() < MIN_PASSWORD_LEN)
    {
        errors.push(FieldError::new(
            "password",
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    if profile
        .phone
        .is_some_and(|phone| phone.trim().chars().count() > PHONE_MAX_LEN)
    {
        errors.push(FieldError::new(
            "phone",
            format!("phone cannot exceed {PHONE_MAX_LEN} characters"),
        ));
    }
    AppError::check(errors)
}

fn to_user(row: UserRow) -> Result<User, AppError> {
    User::try_from(row).map_err(AppError::Internal)
}

fn duplicate_email(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("A user with that email already exists".to_string())
        }
        _ => AppError::Database(err),
    }
}

fn hash(password: &str) -> Result<String, AppError> {
    hash_password(password).map_err(|err| AppError::Internal(format!("password hash failed: {err}")))
}

fn optional_text(text: Option<String>) -> Option<String> {
    text.map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

async fn user_row(db: &SqlitePool, id: i64, active_only: bool) -> Result<UserRow, AppError> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ?{}",
        if active_only { " AND active = 1" } else { "" }
    );
    sqlx::query_as::<_, UserRow>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("User"))
}

/// Active accounts, optionally narrowed to one role.
pub async fn list(
    db: &SqlitePool,
    query: &PageQuery,
    search: &SearchQuery,
    role: Option<Role>,
) -> Result<Page<User>, AppError> {
    let request = query.validate(SORTABLE)?;
    let pattern = search
        .q
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| format!("%{text}%"));

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM users WHERE active = 1");
    let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {USER_COLUMNS} FROM users WHERE active = 1"));
    for builder in [&mut count, &mut select] {
        if let Some(role) = role {
            builder.push(" AND role = ").push_bind(i64::from(role));
        }
        if let Some(pattern) = &pattern {
            builder
                .push(" AND (first_name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR last_name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR email LIKE ")
                .push_bind(pattern.clone())
                .push(")");
        }
    }

    let total = count.build_query_scalar::<i64>().fetch_one(db).await?;
    select.push(request.order_clause());
    let items = select
        .build_query_as::<UserRow>()
        .fetch_all(db)
        .await?
        .into_iter()
        .map(to_user)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page {
        items,
        meta: PageMeta::new(&request, total),
    })
}

pub async fn get(db: &SqlitePool, id: i64) -> Result<User, AppError> {
    user_row(db, id, true).await.and_then(to_user)
}

pub async fn create(db: &SqlitePool, input: UserInput) -> Result<User, AppError> {
    validate(&Profile {
        first_name: &input.first_name,
        last_name: &input.last_name,
        email: &input.email,
        password: Some(&input.password),
        phone: input.phone.as_deref(),
    })?;

    let password_hash = hash(&input.password)?;
    let now = Utc::now().to_rfc3339();
    let id = sqlx::query(
        r#"INSERT INTO users (first_name, last_name, email, password_hash, role, phone, photo, active, created_at, modified_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)"#,
    )
    .bind(input.first_name.trim())
    .bind(input.last_name.trim())
    .bind(input.email.trim().to_lowercase())
    .bind(password_hash)
    .bind(i64::from(input.role))
    .bind(optional_text(input.phone))
    .bind(optional_text(input.photo))
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await
    .map_err(duplicate_email)?
    .last_insert_rowid();

    log::info!("User {id} created with role {}", input.role);
    get(db, id).await
}

pub async fn update(db: &SqlitePool, id: i64, changes: UserChanges) -> Result<User, AppError> {
    let current = user_row(db, id, true).await?;
    let first_name = changes.first_name.unwrap_or(current.first_name);
    let last_name = changes.last_name.unwrap_or(current.last_name);
    let email = changes.email.unwrap_or(current.email);
    let phone = match changes.phone {
        Some(phone) => optional_text(Some(phone)),
        None => current.phone,
    };
    validate(&Profile {
        first_name: &first_name,
        last_name: &last_name,
        email: &email,
        password: changes.password.as_deref(),
        phone: phone.as_deref(),
    })?;

    let password_hash = match changes.password.as_deref() {
        Some(password) => hash(password)?,
        None => current.password_hash,
    };
    let role = changes.role.map(i64::from).unwrap_or(current.role);
    let photo = match changes.photo {
        Some(photo) => optional_text(Some(photo)),
        None => current.photo,
    };

    sqlx::query(
        r#"UPDATE users
           SET first_name = ?, last_name = ?, email = ?, password_hash = ?, role = ?, phone = ?, photo = ?, modified_at = ?
           WHERE id = ? AND active = 1"#,
    )
    .bind(first_name.trim())
    .bind(last_name.trim())
    .bind(email.trim().to_lowercase())
    .bind(password_hash)
    .bind(role)
    .bind(phone)
    .bind(photo)
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(db)
    .await
    .map_err(duplicate_email)?;

    get(db, id).await
}

pub async fn delete(db: &SqlitePool, id: i64) -> Result<User, AppError> {
    let result = sqlx::query("UPDATE users SET active = 0, modified_at = ? WHERE id = ? AND active = 1")
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("User"));
    }
    log::info!("User {id} deactivated");
    user_row(db, id, false).await.and_then(to_user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::authenticate_credentials,
        db::{connect, run_migrations},
        notify::LogNotifier,
        state::AppState,
    };
    use std::sync::Arc;

    async fn pool() -> SqlitePool {
        let pool = connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn customer(email: &str) -> UserInput {
        UserInput {
            first_name: "Ana".into(),
            last_name: "Diaz".into(),
            email: email.into(),
            password: "cli123***".into(),
            role: Role::Customer,
            phone: Some("351-555-0101".into()),
            photo: None,
        }
    }

    #[test]
    fn test_email_shape() {
        assert!(looks_like_email("ana@example.com"));
        assert!(!looks_like_email("ana.example.com"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("ana@example"));
        assert!(!looks_like_email("ana @example.com"));
    }

    #[actix_web::test]
    async fn test_create_hashes_and_hides_password() {
        let db = pool().await;
        let user = create(&db, customer("Ana@Example.com")).await.unwrap();
        assert_eq!(user.email, "ana@example.com");
        assert_eq!(user.role, Role::Customer);

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("cli123"));

        let state = AppState::new(db, Arc::new(LogNotifier), 4);
        let found = authenticate_credentials(&state, "ANA@example.com", "cli123***")
            .await
            .unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
        assert!(authenticate_credentials(&state, "ana@example.com", "wrong")
            .await
            .unwrap()
            .is_none());
    }

    #[actix_web::test]
    async fn test_duplicate_email_conflicts() {
        let db = pool().await;
        create(&db, customer("ana@example.com")).await.unwrap();
        let err = create(&db, customer("ANA@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let other = create(&db, customer("bob@example.com")).await.unwrap();
        let changes = UserChanges {
            email: Some("ana@example.com".into()),
            ..UserChanges::default()
        };
        assert!(matches!(update(&db, other.id, changes).await, Err(AppError::Conflict(_))));
    }

    #[actix_web::test]
    async fn test_validation_errors() {
        let db = pool().await;
        let mut input = customer("not-an-email");
        input.first_name = "A".into();
        input.password = "123".into();
        match create(&db, input).await {
            Err(AppError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
                assert_eq!(fields, vec!["firstName", "email", "password"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[actix_web::test]
    async fn test_update_and_role_filter() {
        let db = pool().await;
        let ana = create(&db, customer("ana@example.com")).await.unwrap();
        let mut staff = customer("staff@venues.local");
        staff.role = Role::Staff;
        create(&db, staff).await.unwrap();

        let promoted = update(
            &db,
            ana.id,
            UserChanges {
                last_name: Some("Diaz Perez".into()),
                phone: Some(String::new()),
                ..UserChanges::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(promoted.last_name, "Diaz Perez");
        assert_eq!(promoted.phone, None);

        let customers = list(&db, &PageQuery::default(), &SearchQuery::default(), Some(Role::Customer))
            .await
            .unwrap();
        assert_eq!(customers.meta.total, 1);
        assert_eq!(customers.items[0].id, ana.id);

        let search = SearchQuery {
            q: Some("staff@".into()),
        };
        let found = list(&db, &PageQuery::default(), &search, None).await.unwrap();
        assert_eq!(found.items.len(), 1);
        assert_eq!(found.items[0].role, Role::Staff);
    }

    #[actix_web::test]
    async fn test_soft_delete() {
        let db = pool().await;
        let ana = create(&db, customer("ana@example.com")).await.unwrap();
        let deleted = delete(&db, ana.id).await.unwrap();
        assert!(!deleted.active);
        assert!(matches!(get(&db, ana.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(delete(&db, ana.id).await, Err(AppError::NotFound(_))));
    }
}
