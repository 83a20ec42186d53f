use std::sync::Arc;

use crate::dispatch::DispatchClient;

#[derive(Clone)]
pub struct AppState {
    pub dispatch: Arc<DispatchClient>,
}

impl AppState {
    pub fn new(dispatch: DispatchClient) -> Self {
        Self {
            dispatch: Arc::new(dispatch),
        }
    }
}
