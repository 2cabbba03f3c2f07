// server/src/state.rs

use common::DockingRunner;
use std::{sync::Arc, time::Instant};

use crate::settings::ServerSettings;

#[derive(Clone)]
pub struct AppState {
    // único runner del proceso: vina siempre lee la misma config
    pub runner: Arc<DockingRunner>,
    pub settings: Arc<ServerSettings>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(settings: ServerSettings) -> Self {
        Self {
            runner: Arc::new(DockingRunner::new(settings.runner.clone())),
            settings: Arc::new(settings),
            started_at: Instant::now(),
        }
    }
}
