use crate::engine::MatchingEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: MatchingEngine,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            engine: MatchingEngine::new(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        AppState::new()
    }
}
