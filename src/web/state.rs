//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::backoffice::Backoffice;
use crate::session::SessionManager;
use crate::web::templates::Templates;

pub struct AppState {
    pub office: Backoffice,
    pub sessions: SessionManager,
    pub templates: Templates,
}

pub type SharedState = Arc<AppState>;
