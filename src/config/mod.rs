mod settings;

pub use settings::{
    ApiConfig, EntitlementsConfig, JwtConfig, MetricsConfig, ServerConfig, Settings,
    ShutdownConfig, WebSocketConfig,
};
