use std::sync::Arc;

use crate::auth::{AuthGuard, AuthService, UserManagementService};
use crate::monitoring::CaseMonitoringService;
use crate::store::CaseStore;
use crate::worker::WorkerHandlers;

#[derive(Clone)]
pub struct AppState {
    pub guard: Arc<AuthGuard>,
    pub auth: Arc<AuthService>,
    pub monitoring: Arc<CaseMonitoringService>,
    pub users: Arc<UserManagementService>,
    pub cases: Arc<dyn CaseStore>,
    pub worker: Arc<WorkerHandlers>,
}
