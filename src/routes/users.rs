use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    http::Method,
    middleware,
    routing::{delete, get, patch, post, MethodRouter},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};

use crate::error::{AppError, AppResult, ErrorBody};
use crate::middleware::{run_gates, AuthUser};
use crate::models::{CreateUser, UpdateUser, User};
use crate::routes::{AppState, UserGates, USERS_PREFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
}

/// One row of the users route table.
pub struct UserRoute {
    pub method: Method,
    pub path: &'static str,
    pub access: Access,
    endpoint: MethodRouter<AppState>,
}

/// Route table for `/api/users`, in registration order.
///
/// `POST /` stays public so callers can register themselves.
pub fn route_table() -> Vec<UserRoute> {
    vec![
        UserRoute {
            method: Method::GET,
            path: "/",
            access: Access::Authenticated,
            endpoint: get(list_users),
        },
        UserRoute {
            method: Method::DELETE,
            path: "/{id}",
            access: Access::Authenticated,
            endpoint: delete(delete_user),
        },
        UserRoute {
            method: Method::GET,
            path: "/{id}",
            access: Access::Authenticated,
            endpoint: get(get_user),
        },
        UserRoute {
            method: Method::PATCH,
            path: "/{id}",
            access: Access::Authenticated,
            endpoint: patch(update_user),
        },
        UserRoute {
            method: Method::POST,
            path: "/",
            access: Access::Public,
            endpoint: post(create_user),
        },
    ]
}

pub fn routes(gates: UserGates) -> Router<AppState> {
    let mut router = Router::new();

    for route in route_table() {
        let endpoint = match route.access {
            Access::Public => route.endpoint,
            Access::Authenticated => route.endpoint.route_layer(middleware::from_fn_with_state(
                gates.authenticate.clone(),
                run_gates,
            )),
        };
        tracing::debug!("Registering {} {} ({:?})", route.method, route.path, route.access);
        router = router.route(route.path, endpoint);
    }

    router.layer(middleware::from_fn_with_state(gates.rate_limit, run_gates))
}

#[derive(OpenApi)]
#[openapi(
    paths(list_users, get_user, create_user, update_user, delete_user),
    components(schemas(User, CreateUser, UpdateUser, DeletedUser, ErrorBody)),
    modifiers(&BearerSecurity),
    tags(
        (name = "Users", description = "User accounts")
    )
)]
struct UsersApi;

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "ApiKeyAuth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// OpenAPI document for the users routes.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    UsersApi::openapi()
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeletedUser {
    pub deleted: bool,
    pub id: String,
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("A valid email is required".to_string()));
    }
    Ok(email.to_string())
}

fn normalize_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

/// Get all users
///
/// Get all users from the database.
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    security(("ApiKeyAuth" = [])),
    responses(
        (status = 200, description = "Get all users", body = [User]),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody),
        (status = 500, description = "Server error", body = ErrorBody)
    )
)]
async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    let users = state.users.list().await?;
    Ok(Json(users))
}

/// Get user
///
/// Get user from the database.
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "Users",
    security(("ApiKeyAuth" = [])),
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Get user", body = User),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody),
        (status = 500, description = "Server error", body = ErrorBody)
    )
)]
async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    let user = state
        .users
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Create user
#[utoipa::path(
    post,
    path = "/api/users",
    tag = "Users",
    request_body = CreateUser,
    responses(
        (status = 200, description = "Create user", body = User),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody),
        (status = 500, description = "Server error", body = ErrorBody)
    )
)]
async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUser>, JsonRejection>,
) -> AppResult<Json<User>> {
    let Json(payload) = payload?;
    let email = normalize_email(&payload.email)?;

    if state.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let user = state
        .users
        .create(CreateUser {
            email,
            name: normalize_name(payload.name),
        })
        .await?;

    tracing::info!("Created user {}", user.id);
    Ok(Json(user))
}

/// Update user
#[utoipa::path(
    patch,
    path = "/api/users/{id}",
    tag = "Users",
    security(("ApiKeyAuth" = [])),
    params(("id" = String, Path, description = "User id")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "Updated user", body = User),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody),
        (status = 500, description = "Server error", body = ErrorBody)
    )
)]
async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUser>, JsonRejection>,
) -> AppResult<Json<User>> {
    let Json(payload) = payload?;
    let changes = UpdateUser {
        email: payload.email.as_deref().map(normalize_email).transpose()?,
        name: normalize_name(payload.name),
    };
    if changes.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    if let Some(email) = &changes.email {
        if let Some(owner) = state.users.find_by_email(email).await? {
            if owner.id != id {
                return Err(AppError::Conflict("Email already registered".to_string()));
            }
        }
    }

    let user = state
        .users
        .update(&id, changes)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Delete user
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    tag = "Users",
    security(("ApiKeyAuth" = [])),
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted", body = DeletedUser),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody),
        (status = 500, description = "Server error", body = ErrorBody)
    )
)]
async fn delete_user(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<DeletedUser>> {
    if !state.users.delete(&id).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!("User {} deleted by {}", id, caller.id);
    Ok(Json(DeletedUser { deleted: true, id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use utoipa::openapi::path::Operation;

    fn operation<'a>(
        doc: &'a utoipa::openapi::OpenApi,
        method: &Method,
        path: &str,
    ) -> Option<&'a Operation> {
        let item = doc.paths.paths.get(path)?;
        match *method {
            Method::GET => item.get.as_ref(),
            Method::POST => item.post.as_ref(),
            Method::PATCH => item.patch.as_ref(),
            Method::DELETE => item.delete.as_ref(),
            _ => None,
        }
    }

    #[test]
    fn only_user_creation_is_public() {
        let public: Vec<_> = route_table()
            .into_iter()
            .filter(|r| r.access == Access::Public)
            .map(|r| (r.method, r.path))
            .collect();

        assert_eq!(public, vec![(Method::POST, "/")]);
    }

    #[test]
    fn method_and_path_pairs_are_unique() {
        let table = route_table();
        for (i, a) in table.iter().enumerate() {
            for b in &table[i + 1..] {
                assert!(
                    !(a.method == b.method && a.path == b.path),
                    "{} {} registered twice",
                    a.method,
                    a.path
                );
            }
        }
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn openapi_documents_every_route_with_matching_security() {
        let doc = openapi();

        for route in route_table() {
            let path = match route.path {
                "/" => USERS_PREFIX.to_string(),
                rest => format!("{USERS_PREFIX}{rest}"),
            };
            let op = operation(&doc, &route.method, &path)
                .unwrap_or_else(|| panic!("{} {} is not documented", route.method, path));

            assert_eq!(op.tags.as_deref(), Some(&["Users".to_string()][..]));
            assert!(op.summary.is_some(), "{} {} has no summary", route.method, path);

            let secured = op.security.as_ref().is_some_and(|s| !s.is_empty());
            assert_eq!(
                secured,
                route.access == Access::Authenticated,
                "{} {} security does not match its access",
                route.method,
                path
            );
        }

        let schemes = doc.components.as_ref().map(|c| &c.security_schemes).unwrap();
        assert!(schemes.contains_key("ApiKeyAuth"));
    }

    #[test]
    fn email_must_look_like_one() {
        assert_eq!(normalize_email("  ada@example.com ").unwrap(), "ada@example.com");
        assert!(normalize_email("   ").is_err());
        assert!(normalize_email("ada").is_err());
    }

    #[test]
    fn blank_names_are_dropped() {
        assert_eq!(normalize_name(Some("  ".to_string())), None);
        assert_eq!(normalize_name(Some(" Ada ".to_string())).as_deref(), Some("Ada"));
    }
}
