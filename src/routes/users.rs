/// User Routes
///
/// Self service under `/users/me` and admin management of other users.
/// All handlers sit behind the access gate; the admin ones also behind
/// `RequireRole<AdminOnly>`.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, Principal, UserUpdate};
use crate::configuration::ApplicationSettings;
use crate::error::AppError;
use crate::routes::auth::with_cleared_cookies;
use crate::store::{Role, UserRecord};

/// Public view of a user; never carries the hash or refresh token
#[derive(Serialize)]
pub struct UserResponse {
    pub identity: String,
    pub role: Role,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&UserRecord> for UserResponse {
    fn from(record: &UserRecord) -> Self {
        Self {
            identity: record.identity.clone(),
            role: record.role,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

/// Password change for the caller
#[derive(Deserialize)]
pub struct UpdateSelfRequest {
    pub password: String,
}

/// Admin update; omitted fields are left alone
#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub password: Option<String>,
    pub role: Option<Role>,
}

/// GET /users/me
pub async fn get_current_user(
    principal: web::ReqData<Principal>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let record = service.find_user(&principal.identity).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(&record)))
}

/// PUT /users/me
///
/// Only the password can be changed here; a role cannot be self-assigned.
pub async fn update_current_user(
    principal: web::ReqData<Principal>,
    form: web::Json<UpdateSelfRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let update = UserUpdate {
        password: Some(form.into_inner().password),
        role: None,
    };
    let record = service.update_user(&principal.identity, update).await?;

    Ok(HttpResponse::Ok().json(UserResponse::from(&record)))
}

/// DELETE /users/me
pub async fn delete_current_user(
    principal: web::ReqData<Principal>,
    service: web::Data<AuthService>,
    settings: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    service.delete_user(&principal.identity).await?;
    Ok(with_cleared_cookies(HttpResponse::NoContent(), &settings).finish())
}

/// GET /users
pub async fn list_users(service: web::Data<AuthService>) -> Result<HttpResponse, AppError> {
    let users: Vec<UserResponse> = service
        .list_users()
        .await?
        .iter()
        .map(UserResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(users))
}

/// GET /users/{identity}
///
/// # Errors
/// - 404: no such user
pub async fn get_user(
    path: web::Path<String>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let record = service.find_user(&path).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(&record)))
}

/// PUT /users/{identity}
pub async fn update_user(
    principal: web::ReqData<Principal>,
    path: web::Path<String>,
    form: web::Json<UpdateUserRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let record = service
        .update_user(
            &path,
            UserUpdate {
                password: form.password,
                role: form.role,
            },
        )
        .await?;

    tracing::info!(
        admin = %principal.identity,
        identity = %record.identity,
        role = %record.role,
        "User updated by admin"
    );

    Ok(HttpResponse::Ok().json(UserResponse::from(&record)))
}

/// DELETE /users/{identity}
pub async fn delete_user(
    principal: web::ReqData<Principal>,
    path: web::Path<String>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    service.delete_user(&path).await?;

    tracing::info!(admin = %principal.identity, identity = %path, "User deleted by admin");
    Ok(HttpResponse::NoContent().finish())
}
