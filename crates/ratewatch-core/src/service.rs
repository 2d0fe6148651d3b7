//! The assembled service: scheduler plus webhook gateway

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::alerting::{
    AlertEvaluator, LineTransport, LogTransport, MessagingTransport, NotificationDispatcher,
};
use crate::api::{AppState, HttpServer};
use crate::config::Config;
use crate::error::Result;
use crate::inbound::{ContentRelay, RateQuery};
use crate::rate::{HttpRateSource, RateSource};
use crate::schedule::{CycleRunner, EngineSettings, ScheduleEngine};

/// The rate monitoring service
pub struct RateWatch {
    config: Config,
    source: Arc<dyn RateSource>,
    transport: Arc<dyn MessagingTransport>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl RateWatch {
    /// Build the service from configuration
    pub fn new(config: Config) -> Result<Self> {
        let source: Arc<dyn RateSource> = Arc::new(HttpRateSource::new(&config.provider)?);

        let transport: Arc<dyn MessagingTransport> = if config.transport.dry_run {
            info!("Dry-run mode: notifications are logged, not sent");
            Arc::new(LogTransport)
        } else {
            Arc::new(LineTransport::new(&config.transport)?)
        };

        Ok(Self::with_parts(config, source, transport))
    }

    /// Build the service around an explicit source and transport
    pub fn with_parts(
        config: Config,
        source: Arc<dyn RateSource>,
        transport: Arc<dyn MessagingTransport>,
    ) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::clone(&transport),
            config.transport.recipient_id.clone(),
        ));

        Self {
            config,
            source,
            transport,
            dispatcher,
        }
    }

    /// The rate source
    pub fn source(&self) -> Arc<dyn RateSource> {
        Arc::clone(&self.source)
    }

    /// A schedule engine for the configured rules
    pub fn engine(&self) -> Result<ScheduleEngine> {
        let runner = CycleRunner::new(
            Arc::clone(&self.source),
            AlertEvaluator::new(self.config.messages.clone()),
            Arc::clone(&self.dispatcher),
        );
        ScheduleEngine::new(
            &self.config.schedule.rules,
            runner,
            EngineSettings::from(&self.config.schedule),
        )
    }

    /// Handler state for the webhook gateway
    pub fn app_state(&self) -> AppState {
        let webhook = &self.config.webhook;
        AppState {
            query: Arc::new(RateQuery::new(
                Arc::clone(&self.source),
                webhook.query_keyword.clone(),
                &self.config.messages,
            )),
            relay: Arc::new(ContentRelay::new(
                Arc::clone(&self.dispatcher),
                &self.config.messages,
                webhook.relay_channel,
            )),
            transport: Arc::clone(&self.transport),
            channel_secret: self.config.transport.channel_secret.as_deref().map(Arc::from),
            verify_token: webhook.verify_token.as_deref().map(Arc::from),
        }
    }

    /// Run until Ctrl+C
    pub async fn run(self) -> Result<()> {
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl+C received, shutting down...");
            }
            signal.cancel();
        });
        self.run_until(shutdown).await
    }

    /// Run the scheduler and the gateway until `shutdown` is cancelled
    pub async fn run_until(self, shutdown: CancellationToken) -> Result<()> {
        info!("Starting ratewatch...");

        let mut engine = self.engine()?;
        engine.start()?;
        for timer in engine.next_fire_times() {
            info!(rule = %timer.rule, next_fire = ?timer.next_fire, "Timer registered");
        }

        let addr = self.config.server.addr();
        let server = HttpServer::new(self.app_state());
        let http_shutdown = shutdown.child_token();
        let mut http_handle = tokio::spawn(async move { server.serve(&addr, http_shutdown).await });

        let server_result = tokio::select! {
            () = shutdown.cancelled() => None,
            joined = &mut http_handle => Some(joined),
        };

        engine.stop().await;

        let joined = match server_result {
            Some(joined) => joined,
            None => http_handle.await,
        };

        match joined {
            Ok(Ok(())) => {
                info!("ratewatch stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "HTTP server error");
                Err(e)
            }
            Err(e) => Err(crate::error::Error::internal(format!("HTTP server task failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{RecordingTransport, ScriptedSource};
    use rust_decimal_macros::dec;

    fn dry_config() -> Config {
        let mut config = Config::default();
        config.transport.dry_run = true;
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config
    }

    #[tokio::test]
    async fn test_shutdown_stops_service() {
        let service = RateWatch::with_parts(
            dry_config(),
            ScriptedSource::fixed(dec!(31)),
            RecordingTransport::new(),
        );
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();

        let handle = tokio::spawn(service.run_until(shutdown));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.cancel();

        handle.await.unwrap().unwrap();
    }

    #[test]
    fn test_engine_registers_default_rules() {
        let service = RateWatch::with_parts(
            dry_config(),
            ScriptedSource::fixed(dec!(31)),
            RecordingTransport::new(),
        );

        let engine = service.engine().unwrap();

        let names: Vec<String> = engine.preview().into_iter().map(|t| t.rule).collect();
        assert_eq!(
            names,
            vec!["daily-0000", "daily-0100", "daily-0200", "daily-0300", "daily-0400", "below-29"]
        );
    }

    #[test]
    fn test_dry_run_needs_no_credentials() {
        assert!(RateWatch::new(dry_config()).is_ok());
    }

    #[test]
    fn test_live_transport_needs_token() {
        let mut config = dry_config();
        config.transport.dry_run = false;
        assert!(RateWatch::new(config).is_err());
    }
}
