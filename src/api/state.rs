use std::sync::Arc;
use crate::{
    auth::SsoClient,
    config::Settings,
    service::ServiceContext,
};

#[derive(Clone)]
pub struct AppState {
    pub service_context: Arc<ServiceContext>,
    pub sso_client: Arc<SsoClient>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        service_context: Arc<ServiceContext>,
        sso_client: Arc<SsoClient>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            service_context,
            sso_client,
            settings,
        }
    }
}
