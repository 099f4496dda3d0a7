use std::sync::Arc;

use crate::config::Config;
use crate::controller::ExecutionController;
use crate::scheduler::ScheduleCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub controller: Arc<ExecutionController>,
    pub scheduler: Arc<ScheduleCoordinator>,
}
