use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tal_types::{Amount, EntryKind, TransactionEvent};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::LedgerError;

/// Fee rate charged on a sale, in basis points (5%).
pub const FEE_BPS: u32 = 500;

/// Inclusive whole-unit price range of a simulated ticket.
pub const PRICE_RANGE: std::ops::RangeInclusive<u64> = 200..=999;

/// Generates ticket-sale events for demos and load.
///
/// Each tick yields one `Sale` for a random agent. Every `fee_every`-th tick
/// also yields a `Fee` on the same ticket at [`FEE_BPS`], computed in fixed
/// point.
#[derive(Debug)]
pub struct TicketSimulator {
    agents: Vec<String>,
    fee_every: u32,
    rng: StdRng,
    ticks: u64,
}

impl TicketSimulator {
    /// `seed` makes the event stream reproducible; `None` seeds from the OS.
    pub fn new(
        agents: Vec<String>,
        fee_every: u32,
        seed: Option<u64>,
    ) -> Result<Self, LedgerError> {
        if agents.is_empty() {
            return Err(LedgerError::Precondition {
                field: "agents",
                reason: "must name at least one agent",
            });
        }
        if agents.iter().any(|a| a.trim().is_empty()) {
            return Err(LedgerError::Precondition {
                field: "agents",
                reason: "agent ids must not be blank",
            });
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            agents,
            fee_every,
            rng,
            ticks: 0,
        })
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Events for the next tick, sale first.
    pub fn tick(&mut self) -> Vec<TransactionEvent> {
        self.ticks += 1;
        let agent = self.agents[self.rng.gen_range(0..self.agents.len())].clone();
        let price = Amount::from_minor(self.rng.gen_range(PRICE_RANGE) * 100);
        let subject = format!("TKT-{}", self.ticks);

        let mut events = vec![TransactionEvent::sale(price, subject.clone(), agent.clone())];
        if self.fee_every > 0 && self.ticks % u64::from(self.fee_every) == 0 {
            events.push(TransactionEvent::new(
                EntryKind::Fee,
                price.percent_bps(FEE_BPS),
                subject,
                agent,
            ));
        }
        events
    }
}

/// Publish simulator events every `period` until `shutdown` flips to `true`
/// or the receiver is dropped. Returns the number of ticks run.
pub fn spawn_ticker(
    mut simulator: TicketSimulator,
    period: Duration,
    tx: mpsc::Sender<TransactionEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0u64;

        'outer: loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    ticks += 1;
                    for event in simulator.tick() {
                        debug!(kind = %event.kind, amount = %event.amount, subject = %event.subject_id, "simulated event");
                        if tx.send(event).await.is_err() {
                            break 'outer;
                        }
                    }
                }
            }
        }

        info!(ticks, "ticker stopped");
        ticks
    })
}
