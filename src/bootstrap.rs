//! # Venue Service Bootstrap
//!
//! Brings the service up in order: configuration, venue storage, broker
//! handler with the venue handlers bound, then waits for the broker topology
//! to be ready. The returned [`VenueServiceHandle`] owns everything that was
//! started and shuts it down on [`VenueServiceHandle::stop`].

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::binding::{self, HealthTraits, RequestTracker};
use crate::config::{ConfigManager, DatabaseConfig, StorageBackend};
use crate::database::{MemoryVenueDatabase, PostgresVenueDatabase, VenueDatabase};
use crate::error::{Result, ServiceError};
use crate::events::Subscription;
use crate::logging::{log_error, log_service_operation};
use crate::messaging::{AmqpConnector, BrokerHandler, Connector};
use crate::state_machine::ConnectionState;
use crate::venue::{venue_response_validator, VenueMessageValidator};

/// Where to find configuration
#[derive(Debug, Clone, Default)]
pub struct BootstrapConfig {
    /// Explicit configuration file (None = discover)
    pub config_path: Option<PathBuf>,
    /// Directory probed for a configuration file (None = default search)
    pub config_directory: Option<PathBuf>,
    /// Environment override (None = auto-detect)
    pub environment_override: Option<String>,
}

/// Running service
pub struct VenueServiceHandle {
    pub broker: BrokerHandler,
    pub database: Arc<dyn VenueDatabase>,
    pub tracker: Arc<RequestTracker>,
    pub config_manager: Arc<ConfigManager>,
    subscriptions: Vec<Subscription>,
    running: bool,
}

/// Service status snapshot
#[derive(Debug, Clone)]
pub struct SystemStatus {
    pub running: bool,
    pub environment: String,
    pub storage_backend: String,
    pub broker_state: ConnectionState,
    pub health: HealthTraits,
}

impl VenueServiceHandle {
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn status(&self) -> SystemStatus {
        SystemStatus {
            running: self.running,
            environment: self.config_manager.environment().to_string(),
            storage_backend: self.database.backend_name().to_string(),
            broker_state: self.broker.state(),
            health: self.tracker.traits(),
        }
    }

    /// Unbind the venue handlers and stop the broker handler
    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            warn!("Venue service already stopped");
            return Ok(());
        }

        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        self.broker.shutdown();
        self.running = false;

        log_service_operation("bootstrap", "stop", "stopped", None);
        info!("🛑 Venue service stopped");
        Ok(())
    }
}

/// Startup sequence of the venue service
pub struct VenueServiceBootstrap;

impl VenueServiceBootstrap {
    /// Bootstrap against RabbitMQ
    pub async fn bootstrap(config: BootstrapConfig) -> Result<VenueServiceHandle> {
        let config_manager = Self::load_config(&config)?;
        Self::bootstrap_with(config_manager, AmqpConnector).await
    }

    /// Bootstrap with already loaded configuration and any broker connector
    pub async fn bootstrap_with<C: Connector>(
        config_manager: Arc<ConfigManager>,
        connector: C,
    ) -> Result<VenueServiceHandle> {
        info!(
            environment = config_manager.environment(),
            config_path = %config_manager.config_path().display(),
            "🚀 BOOTSTRAP: Starting venue service"
        );

        let database = Self::open_database(&config_manager.config().database).await?;
        log_service_operation("bootstrap", "open_database", "ready", Some(database.backend_name()));

        let broker = BrokerHandler::new(
            config_manager.config().message.clone(),
            VenueMessageValidator::shared(),
            venue_response_validator(),
        );
        let error_subscription = broker.on_error(|e| {
            log_error("broker", "lifecycle", &e.to_string(), None);
        });

        let tracker = Arc::new(RequestTracker::new());
        let mut subscriptions = binding::bind(database.clone(), &broker, tracker.clone());
        subscriptions.push(error_subscription);

        broker.start(connector);
        if let Err(e) = broker.wait_until_ready().await {
            error!(error = %e, "❌ BOOTSTRAP: Broker did not become ready");
            broker.shutdown();
            return Err(ServiceError::Broker(e));
        }

        log_service_operation("bootstrap", "connect_broker", "ready", None);
        info!("✅ BOOTSTRAP: Venue service ready");

        Ok(VenueServiceHandle {
            broker,
            database,
            tracker,
            config_manager,
            subscriptions,
            running: true,
        })
    }

    fn load_config(config: &BootstrapConfig) -> Result<Arc<ConfigManager>> {
        let manager = match (&config.config_path, &config.config_directory) {
            (Some(path), _) => {
                let environment = config
                    .environment_override
                    .clone()
                    .unwrap_or_else(crate::config::detect_environment);
                ConfigManager::load_from_path_with_env(path, &environment)?
            }
            (None, Some(directory)) => ConfigManager::load_from_directory(directory)?,
            (None, None) => ConfigManager::load()?,
        };

        info!(
            "✅ BOOTSTRAP: Configuration loaded for environment: {}",
            manager.environment()
        );
        Ok(manager)
    }

    async fn open_database(config: &DatabaseConfig) -> Result<Arc<dyn VenueDatabase>> {
        let database: Arc<dyn VenueDatabase> = match config.backend {
            StorageBackend::Memory => {
                warn!("⚠️ Using in-memory venue storage; venues are lost on restart");
                Arc::new(MemoryVenueDatabase::new())
            }
            StorageBackend::Postgres => Arc::new(PostgresVenueDatabase::connect(config).await?),
        };
        Ok(database)
    }
}
