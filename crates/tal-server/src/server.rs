use std::sync::Arc;

use tal_ledger::{
    spawn_ticker, AnomalyNotifier, AppendPipeline, DiscrepancyMonitor, FraudScorer, LedgerStore,
    LedgerValidator, NotificationInbox, TicketSimulator,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::TalConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Capacity of the simulator-to-pipeline channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Ledger HTTP server, optionally driving the ticket simulator.
pub struct TalServer {
    config: TalConfig,
    state: Arc<AppState>,
}

impl TalServer {
    pub fn new(config: TalConfig, store: Arc<dyn LedgerStore>) -> Self {
        Self::with_scorer(config, store, None)
    }

    pub fn with_scorer(
        config: TalConfig,
        store: Arc<dyn LedgerStore>,
        scorer: Option<Arc<dyn FraudScorer>>,
    ) -> Self {
        let inbox = Arc::new(NotificationInbox::new());
        let notifier = AnomalyNotifier::new(config.notify, inbox.clone());
        let mut pipeline = AppendPipeline::new(store, notifier);
        if let Some(scorer) = scorer {
            pipeline = pipeline.with_scorer(scorer);
        }

        let sim = &config.simulation;
        let state = Arc::new(AppState {
            pipeline,
            validator: LedgerValidator::new(config.hasher()),
            inbox,
            discrepancies: Arc::new(DiscrepancyMonitor::new(sim.discrepancy_percent, sim.seed)),
            maintenance_mode: config.server.maintenance_mode,
        });
        Self { config, state }
    }

    pub fn config(&self) -> &TalConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(Arc::clone(&self.state))
    }

    /// Start the ticket simulator feeding the same append pipeline the HTTP
    /// handlers use, with discrepancy flagging attached.
    ///
    /// Maintenance mode blocks every append path, so in maintenance this
    /// starts nothing and returns `None`.
    pub fn start_simulation(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> ServerResult<Option<JoinHandle<u64>>> {
        if self.state.maintenance_mode {
            warn!("maintenance mode: simulator not started");
            return Ok(None);
        }
        let sim = &self.config.simulation;
        let simulator = TicketSimulator::new(sim.agents.clone(), sim.fee_every, sim.seed)?;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let ticker = spawn_ticker(simulator, sim.interval(), tx, shutdown);
        let pipeline = self
            .state
            .pipeline
            .clone()
            .with_discrepancies(Arc::clone(&self.state.discrepancies));
        tokio::spawn(async move {
            pipeline.run(rx).await;
        });
        Ok(Some(ticker))
    }

    /// Serve until `shutdown` flips to `true`, optionally running the
    /// simulator alongside.
    pub async fn serve(self, simulate: bool, shutdown: watch::Receiver<bool>) -> ServerResult<()> {
        let addr = self.config.server.bind_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, simulate, "TAL server listening");

        let mut background = Vec::new();
        if simulate {
            background.extend(self.start_simulation(shutdown.clone())?);
        }

        let mut stop = shutdown;
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = stop.wait_for(|&v| v).await;
            })
            .await
            .map_err(|e| ServerError::Internal(e.to_string()));

        for handle in background {
            if let Ok(ticks) = handle.await {
                info!(ticks, "simulator finished");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tal_ledger::{InMemoryLedger, LedgerReader};

    use super::*;

    fn simulating(maintenance_mode: bool) -> (TalServer, Arc<InMemoryLedger>) {
        let mut config = TalConfig::default();
        config.simulation.interval_ms = 3000;
        config.simulation.seed = Some(8);
        config.server.maintenance_mode = maintenance_mode;
        let store = Arc::new(InMemoryLedger::default());
        (TalServer::new(config, store.clone()), store)
    }

    #[tokio::test(start_paused = true)]
    async fn maintenance_mode_keeps_simulator_idle() {
        let (server, store) = simulating(true);
        let (_stop_tx, stop_rx) = watch::channel(false);

        assert!(server.start_simulation(stop_rx).unwrap().is_none());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.len().unwrap(), 0);
        assert!(server.state().discrepancies.all().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn simulator_appends_outside_maintenance() {
        let (server, store) = simulating(false);
        let (stop_tx, stop_rx) = watch::channel(false);

        let ticker = server.start_simulation(stop_rx).unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        stop_tx.send(true).unwrap();
        assert!(ticker.await.unwrap() >= 1);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(store.len().unwrap() >= 1);
    }

    #[test]
    fn server_construction() {
        let server = TalServer::new(TalConfig::default(), Arc::new(InMemoryLedger::default()));
        assert_eq!(server.config().server.bind_addr, "127.0.0.1:8088".parse().unwrap());
        assert!(!server.state().maintenance_mode);
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() {
        let mut config = TalConfig::default();
        config.server.bind_addr = "127.0.0.1:0".parse().unwrap();
        config.simulation.seed = Some(5);
        let server = TalServer::new(config, Arc::new(InMemoryLedger::default()));

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(server.serve(true, stop_rx));
        stop_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
