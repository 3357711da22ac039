use crate::config::get_jwt_secret;
use crate::error::{GarrisonError, GarrisonResult};
use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// The authenticated principal, decoded from the bearer token issued by the
/// external identity service. Travels in request extensions instead of any
/// ambient session state.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub user_id: Option<i32>,
    pub username: Option<String>,
    pub role: Option<String>,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }

    /// The employee row this token acts as. Tokens without a user id cannot
    /// touch guard-scoped resources.
    pub fn employee_id(&self) -> GarrisonResult<i32> {
        self.user_id
            .ok_or_else(|| GarrisonError::Unauthorized("Token carries no user id".to_string()))
    }

    pub fn require_admin(&self) -> GarrisonResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(GarrisonError::Forbidden(
                "Administrator role required".to_string(),
            ))
        }
    }
}

pub async fn auth_middleware(mut request: Request, next: Next) -> Result<Response, StatusCode> {
    let path = request.uri().path();
    let public_routes = ["/api/ping", "/api/system/health"];

    if !path.starts_with("/api/") || public_routes.contains(&path) {
        return Ok(next.run(request).await);
    }

    // 1. Extract the Authorization header
    let auth_header = match request.headers().get(header::AUTHORIZATION) {
        Some(header) => header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?,
        None => return Err(StatusCode::UNAUTHORIZED),
    };

    if !auth_header.starts_with("Bearer ") {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let token = &auth_header["Bearer ".len()..];

    // 2. Validate the token
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(&get_jwt_secret()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    // 3. Attach the claims to the request extensions
    request.extensions_mut().insert(token_data.claims);

    Ok(next.run(request).await)
}
