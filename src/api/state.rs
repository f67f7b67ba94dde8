//! Application state for the API server

use crate::core::export::ExportService;
use std::sync::Arc;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ExportService>,
}

impl AppState {
    pub fn new(service: Arc<ExportService>) -> Self {
        Self { service }
    }
}
