use actix_web::{dev::ServiceRequest, web, Error, HttpMessage};
use actix_web_httpauth::extractors::basic::BasicAuth;
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use serde::Serialize;

use crate::{
    error::AppError,
    models::{Role, UserRow},
    state::AppState,
};

pub const AUTH_REALM: &str = "Venue Bookings";

/// The caller behind a request, resolved from Basic credentials.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: i64,
    pub display_name: String,
    pub email: String,
    pub role: Role,
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed_hash = PasswordHash::new(password_hash);
    match parsed_hash {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

pub async fn authenticate_credentials(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<Option<AuthUser>, AppError> {
    let user = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, first_name, last_name, email, password_hash, role, phone, photo,
                  active, created_at, modified_at
           FROM users
           WHERE email = ? AND active = 1
           LIMIT 1"#,
    )
    .bind(email.trim().to_lowercase())
    .fetch_optional(&state.db)
    .await?;

    let Some(user) = user else {
        return Ok(None);
    };

    if !verify_password(password, &user.password_hash) {
        return Ok(None);
    }

    let role = Role::try_from(user.role).map_err(AppError::Internal)?;
    Ok(Some(AuthUser {
        id: user.id,
        display_name: format!("{} {}", user.first_name, user.last_name),
        email: user.email,
        role,
    }))
}

async fn authenticate(req: &ServiceRequest, credentials: &BasicAuth) -> Result<AuthUser, AppError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| AppError::Internal("application state missing".to_string()))?;
    let email = credentials.user_id();
    let password = credentials.password().unwrap_or_default();
    authenticate_credentials(state, email, password)
        .await?
        .ok_or(AppError::Unauthorized)
}

async fn guard(
    req: ServiceRequest,
    credentials: BasicAuth,
    allowed: fn(Role) -> bool,
    denied: &str,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    match authenticate(&req, &credentials).await {
        Ok(user) => {
            if !allowed(user.role) {
                log::info!("Denied {} ({}) on {}", user.email, user.role, req.path());
                return Err((AppError::Forbidden(denied.to_string()).into(), req));
            }
            req.extensions_mut().insert(user);
            Ok(req)
        }
        Err(err) => Err((err.into(), req)),
    }
}

/// Any active account.
pub async fn basic_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    guard(req, credentials, |_| true, "").await
}

pub async fn staff_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    guard(
        req,
        credentials,
        Role::is_staff_or_admin,
        "Staff or administrator access required",
    )
    .await
}

/// Administrators and customers; staff manage the catalog but do not book.
pub async fn booking_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    guard(
        req,
        credentials,
        Role::can_book,
        "Only administrators and customers can create bookings",
    )
    .await
}

pub async fn admin_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    guard(
        req,
        credentials,
        Role::is_admin,
        "Administrator access required",
    )
    .await
}
