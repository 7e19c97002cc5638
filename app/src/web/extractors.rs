//! Request extractors: the trusted identity headers set by the fronting auth
//! layer, and the browser session behind the `ds_session` cookie.

use actix_web::cookie::{Cookie, SameSite};
use actix_web::http::header;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest, HttpResponse};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::services::session::SessionHandle;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "ds_session";
pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
  Customer,
  Employee,
  Admin,
}

impl Role {
  pub fn parse(raw: &str) -> Option<Self> {
    match raw.trim().to_lowercase().as_str() {
      "customer" | "cliente" => Some(Role::Customer),
      "employee" | "funcionario" => Some(Role::Employee),
      "admin" => Some(Role::Admin),
      _ => None,
    }
  }

  pub fn is_staff(&self) -> bool {
    matches!(self, Role::Employee | Role::Admin)
  }
}

/// Whoever is making the request; guests have no user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
  pub user_id: Option<Uuid>,
  pub role: Option<Role>,
}

fn header_str<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
  req.headers().get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty())
}

fn viewer_from(req: &HttpRequest) -> Result<Viewer, AppError> {
  let Some(raw_id) = header_str(req, USER_ID_HEADER) else {
    return Ok(Viewer {
      user_id: None,
      role: None,
    });
  };
  let user_id = Uuid::parse_str(raw_id).map_err(|_| {
    warn!("Malformed {} header.", USER_ID_HEADER);
    AppError::Auth(format!("Invalid {} header.", USER_ID_HEADER))
  })?;
  let role = match header_str(req, USER_ROLE_HEADER) {
    Some(raw) => Role::parse(raw).ok_or_else(|| AppError::Auth(format!("Unknown role '{}'.", raw)))?,
    None => Role::Customer,
  };
  Ok(Viewer {
    user_id: Some(user_id),
    role: Some(role),
  })
}

impl FromRequest for Viewer {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    ready(viewer_from(req))
  }
}

/// A signed-in user of any role.
#[derive(Debug, Clone, Copy)]
pub struct SignedIn {
  pub user_id: Uuid,
  pub role: Role,
}

impl FromRequest for SignedIn {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    ready(viewer_from(req).and_then(|viewer| match (viewer.user_id, viewer.role) {
      (Some(user_id), Some(role)) => Ok(SignedIn { user_id, role }),
      _ => Err(AppError::Auth("Faça login para continuar!".to_string())),
    }))
  }
}

/// Employee or admin.
#[derive(Debug, Clone, Copy)]
pub struct StaffIdentity {
  pub user_id: Uuid,
  pub role: Role,
}

impl FromRequest for StaffIdentity {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
    let result = SignedIn::from_request(req, payload).into_inner().and_then(|user| {
      if user.role.is_staff() {
        Ok(StaffIdentity {
          user_id: user.user_id,
          role: user.role,
        })
      } else {
        Err(AppError::Forbidden("Acesso restrito à equipe.".to_string()))
      }
    });
    ready(result)
  }
}

#[derive(Debug, Clone, Copy)]
pub struct AdminIdentity {
  pub user_id: Uuid,
}

impl FromRequest for AdminIdentity {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
    let result = SignedIn::from_request(req, payload).into_inner().and_then(|user| {
      if user.role == Role::Admin {
        Ok(AdminIdentity { user_id: user.user_id })
      } else {
        Err(AppError::Forbidden("Acesso restrito a administradores.".to_string()))
      }
    });
    ready(result)
  }
}

/// The server-side session for this browser.
#[derive(Clone)]
pub struct BrowserSession(pub SessionHandle);

impl FromRequest for BrowserSession {
  type Error = AppError;
  type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let state = req.app_data::<web::Data<AppState>>().cloned();
    let cookie = req.cookie(SESSION_COOKIE).map(|c| c.value().to_string());
    Box::pin(async move {
      let state = state.ok_or_else(|| AppError::Config("Application state is not registered.".to_string()))?;
      let handle = SessionHandle::load(state.store.as_ref(), cookie.as_deref()).await?;
      Ok(BrowserSession(handle))
    })
  }
}

impl BrowserSession {
  pub fn handle(&self) -> &SessionHandle {
    &self.0
  }

  /// Persists the session and attaches its cookie to `response`.
  pub async fn commit(&self, state: &AppState, mut response: HttpResponse) -> Result<HttpResponse, AppError> {
    self.0.save(state.store.as_ref()).await?;
    let cookie = Cookie::build(SESSION_COOKIE, self.0.id().to_string())
      .path("/")
      .http_only(true)
      .same_site(SameSite::Lax)
      .finish();
    response
      .add_cookie(&cookie)
      .map_err(|e| AppError::Internal(format!("Could not set session cookie: {}", e)))?;
    Ok(response)
  }
}

/// 303 to `location`, the answer to every browser form post.
pub fn see_other(location: &str) -> HttpResponse {
  HttpResponse::SeeOther()
    .insert_header((header::LOCATION, location.to_string()))
    .finish()
}
