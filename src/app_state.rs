//! Shared application state injected into all Axum handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenIssuer;
use crate::config::SafeguardConfig;
use crate::domain::{EventBus, LocationStore, SessionRegistry};
use crate::notify::Notifier;
use crate::persistence::Store;
use crate::service::emergency_service::DEFAULT_NOTIFIER_TIMEOUT;
use crate::service::proximity::{DEFAULT_NEARBY_RADIUS_KM, DEFAULT_RECENCY_WINDOW_SECS};
use crate::service::{
    EmergencyService, EmergencySettings, LocationService, ProximityEngine, UserService,
    VoiceService,
};

/// Default outbound queue size of a WebSocket connection.
pub const DEFAULT_CONNECTION_BUFFER: usize = 256;

/// Runtime tunables shared by the services.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeSettings {
    /// Emergency and location fan-out radius.
    pub nearby_radius_km: f64,
    /// Proximity recency window.
    pub recency_window: chrono::Duration,
    /// Per-contact SMS deadline.
    pub notifier_timeout: Duration,
    /// Outbound queue size of each connection.
    pub connection_buffer: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            nearby_radius_km: DEFAULT_NEARBY_RADIUS_KM,
            recency_window: chrono::Duration::seconds(DEFAULT_RECENCY_WINDOW_SECS),
            notifier_timeout: DEFAULT_NOTIFIER_TIMEOUT,
            connection_buffer: DEFAULT_CONNECTION_BUFFER,
        }
    }
}

impl From<&SafeguardConfig> for RuntimeSettings {
    fn from(config: &SafeguardConfig) -> Self {
        Self {
            nearby_radius_km: config.nearby_radius_km,
            recency_window: config.recency_window(),
            notifier_timeout: config.notifier_timeout,
            connection_buffer: config.connection_buffer,
        }
    }
}

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Accounts, tokens and contacts.
    pub users: UserService,
    /// Location ingestion and proximity queries.
    pub locations: LocationService,
    /// Emergency state machine.
    pub emergencies: EmergencyService,
    /// Voice phrase lifecycle.
    pub voice: VoiceService,
    /// Live connection bindings.
    pub registry: Arc<SessionRegistry>,
    /// Outbound queue size of each connection.
    pub connection_buffer: usize,
}

impl AppState {
    /// Wires every service around one store, notifier and token issuer.
    #[must_use]
    pub fn build(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        tokens: Arc<dyn TokenIssuer>,
        settings: RuntimeSettings,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let events = EventBus::new(Arc::clone(&registry));
        let index = Arc::new(LocationStore::new());
        let proximity = ProximityEngine::new(
            Arc::clone(&index),
            Arc::clone(&store),
            settings.recency_window,
        );

        let locations = LocationService::new(
            Arc::clone(&store),
            Arc::clone(&index),
            proximity.clone(),
            events.clone(),
            settings.nearby_radius_km,
        );
        let emergencies = EmergencyService::new(
            Arc::clone(&store),
            index,
            proximity,
            notifier,
            events,
            EmergencySettings {
                nearby_radius_km: settings.nearby_radius_km,
                notifier_timeout: settings.notifier_timeout,
            },
        );

        let voice = VoiceService::new(Arc::clone(&store), Arc::clone(emergencies.locks()));

        Self {
            users: UserService::new(Arc::clone(&store), tokens),
            locations,
            emergencies,
            voice,
            registry,
            connection_buffer: settings.connection_buffer.max(1),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn settings_from_absurd_config_use_defaults() {
        let Ok(config) = SafeguardConfig::from_lookup(|key| match key {
            "RECENCY_WINDOW_SECS" => Some(i64::MAX.to_string()),
            _ => None,
        }) else {
            panic!("out-of-range values must not fail startup");
        };
        let settings = RuntimeSettings::from(&config);
        assert_eq!(
            settings.recency_window,
            chrono::Duration::seconds(DEFAULT_RECENCY_WINDOW_SECS)
        );
    }
}
