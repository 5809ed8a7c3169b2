use std::sync::Arc;

use tokio::sync::broadcast;

use crate::auth::{create_authorizer, JwtValidator, StreamAuthorizer};
use crate::config::Settings;
use crate::events::EventRouter;
use crate::registry::{ConnectionRegistry, RoomIndex};

/// Shared handle to every component; passed explicitly to handlers, tasks,
/// and emission call sites. There is no global server instance.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub jwt_validator: Arc<JwtValidator>,
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: Arc<RoomIndex>,
    pub router: Arc<EventRouter>,
    pub authorizer: Arc<dyn StreamAuthorizer>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let jwt_validator = Arc::new(JwtValidator::new(&settings.jwt));
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomIndex::new());
        let router = Arc::new(EventRouter::new(registry.clone(), rooms.clone()));
        let authorizer = create_authorizer(&settings.entitlements);
        let (shutdown_tx, _) = broadcast::channel(8);

        Self {
            settings: Arc::new(settings),
            jwt_validator,
            registry,
            rooms,
            router,
            authorizer,
            shutdown_tx,
        }
    }
}
