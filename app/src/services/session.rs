//! Server-side session behind an opaque id. Handlers mutate the in-memory
//! copy and persist it once when responding.

use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{CartLine, Flash, FlashLevel, SessionState};
use crate::store::SessionStore;

#[derive(Clone)]
pub struct SessionHandle {
  id: Uuid,
  fresh: bool,
  state: Arc<Mutex<SessionState>>,
}

impl SessionHandle {
  pub fn new_session() -> Self {
    Self {
      id: Uuid::new_v4(),
      fresh: true,
      state: Arc::new(Mutex::new(SessionState::default())),
    }
  }

  /// Loads the session named by the cookie value. Unknown or malformed ids
  /// start a new session.
  pub async fn load<S>(store: &S, cookie_value: Option<&str>) -> Result<Self>
  where
    S: SessionStore + ?Sized,
  {
    let Some(id) = cookie_value.and_then(|raw| Uuid::parse_str(raw).ok()) else {
      return Ok(Self::new_session());
    };
    match store.load_session(id).await? {
      Some(state) => Ok(Self {
        id,
        fresh: false,
        state: Arc::new(Mutex::new(state)),
      }),
      None => Ok(Self::new_session()),
    }
  }

  pub async fn save<S>(&self, store: &S) -> Result<()>
  where
    S: SessionStore + ?Sized,
  {
    let snapshot = self.snapshot();
    store.save_session(self.id, &snapshot).await
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn is_fresh(&self) -> bool {
    self.fresh
  }

  pub fn snapshot(&self) -> SessionState {
    self.state.lock().clone()
  }

  pub fn with<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
    f(&mut self.state.lock())
  }

  pub fn flash(&self, level: FlashLevel, message: impl Into<String>) {
    self.with(|s| s.flash(level, message));
  }

  pub fn take_flashes(&self) -> Vec<Flash> {
    self.with(SessionState::take_flashes)
  }

  pub fn pending_checkout(&self) -> Option<Uuid> {
    self.state.lock().pending_checkout
  }

  pub fn set_pending_checkout(&self, checkout_ref: Option<Uuid>) {
    self.with(|s| s.pending_checkout = checkout_ref);
  }

  pub fn take_pending_checkout(&self) -> Option<Uuid> {
    self.with(|s| s.pending_checkout.take())
  }

  pub fn guest_cart(&self) -> Vec<CartLine> {
    self.state.lock().guest_cart.clone()
  }

  pub fn replace_guest_cart(&self, lines: Vec<CartLine>) {
    self.with(|s| s.guest_cart = lines);
  }

  pub fn user_id(&self) -> Option<Uuid> {
    self.state.lock().user_id
  }

  /// Records the signed-in user seen on this session.
  pub fn note_user(&self, user_id: Option<Uuid>) {
    if user_id.is_some() {
      self.with(|s| s.user_id = user_id);
    }
  }
}
