mod error;
mod routes;
mod types;

pub use routes::create_router;

use crate::config::{LoadOptions, SamplingOptions};
use crate::model::ModelSession;

/// Shared application state
pub struct AppState {
    pub session: ModelSession,
    pub load_options: LoadOptions,
    pub sampling: SamplingOptions,
}
