use std::sync::Arc;

use crate::rooms::RoomRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RoomRegistry::new()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
