use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::error::Elapsed;
use tokio::time::{sleep, timeout, Duration, MissedTickBehavior};

use crate::config::{ConfigStore, KEY_CANCEL_ORDERS_AUTO};
use crate::gateway::{Gateway, GatewayError, GatewayEvents};

const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 15;
const DEFAULT_AUTO_CANCEL_TICKS: u32 = 20;
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2000;
const DEFAULT_BOOK_RETRY_MS: u64 = 1000;
const WORKER_JOIN_TIMEOUT_MS: u64 = 1000;
const EXIT_CODE_FAILURE: i32 = 1;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub maintenance_interval: Duration,
    pub auto_cancel_ticks: u32,
    pub shutdown_timeout: Duration,
    pub book_retry_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            maintenance_interval: Duration::from_secs(DEFAULT_MAINTENANCE_INTERVAL_SECS),
            auto_cancel_ticks: DEFAULT_AUTO_CANCEL_TICKS,
            shutdown_timeout: Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS),
            book_retry_delay: Duration::from_millis(DEFAULT_BOOK_RETRY_MS),
        }
    }
}

/// Counts maintenance ticks while auto-cancel is enabled.
///
/// The counter is frozen while the flag is off.
#[derive(Debug, Clone)]
pub struct MaintenanceTicker {
    count: u32,
    every: u32,
}

impl MaintenanceTicker {
    pub fn new(every: u32) -> Self {
        Self {
            count: 0,
            every: every.max(1),
        }
    }

    /// Returns true when this tick should cancel every open order.
    pub fn tick(&mut self, auto_cancel: bool) -> bool {
        if !auto_cancel {
            return false;
        }
        self.count += 1;
        if self.count == self.every {
            self.count = 0;
            true
        } else {
            false
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Serializes cancel-all between the maintenance worker and the shutdown drain.
#[derive(Clone)]
pub struct OrderDrain {
    gateway: Arc<dyn Gateway>,
    guard: Arc<Mutex<()>>,
}

impl OrderDrain {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            guard: Arc::new(Mutex::new(())),
        }
    }

    pub async fn cancel_all(&self) -> Result<(), GatewayError> {
        let _guard = self.guard.lock().await;
        self.gateway.cancel_all().await
    }

    /// Waits up to `wait` for an in-flight cancel to finish, then gives the
    /// gateway its own `budget` for this cancel.
    pub async fn cancel_all_within(
        &self,
        wait: Duration,
        budget: Duration,
    ) -> Result<Result<(), GatewayError>, Elapsed> {
        let _guard = match timeout(wait, self.guard.lock()).await {
            Ok(guard) => Some(guard),
            Err(_) => {
                log::warn!(
                    "[EXIT] previous cancel still running after {:?}, cancelling anyway",
                    wait
                );
                None
            }
        };
        timeout(budget, self.gateway.cancel_all()).await
    }
}

/// Requests a deliberate shutdown with an exit code.
#[derive(Clone)]
pub struct ExitHandle {
    tx: mpsc::UnboundedSender<i32>,
}

impl ExitHandle {
    pub fn request(&self, code: i32) {
        if self.tx.send(code).is_err() {
            log::warn!("[EXIT] supervisor already gone, exit code {} dropped", code);
        }
    }
}

pub async fn maintenance_loop(
    gateway: Arc<dyn Gateway>,
    drain: OrderDrain,
    events: GatewayEvents,
    store: Arc<dyn ConfigStore>,
    settings: SupervisorConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = MaintenanceTicker::new(settings.auto_cancel_ticks);
    let mut interval = tokio::time::interval(settings.maintenance_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {}
        }

        if ticker.tick(store.get_bool(KEY_CANCEL_ORDERS_AUTO)) {
            log::info!("[MAINT] auto-cancel interval reached, cancelling all open orders");
            if let Err(e) = drain.cancel_all().await {
                log::error!("[MAINT] cancel_all failed: {}", e);
            }
        }
        match gateway.pos().await {
            Ok(wallet) => events.wallet(wallet),
            Err(e) => log::warn!("[MAINT] position refresh failed: {}", e),
        }
    }
    log::debug!("[MAINT] worker stopped");
}

pub async fn book_loop(
    gateway: Arc<dyn Gateway>,
    events: GatewayEvents,
    settings: SupervisorConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let result = tokio::select! {
            _ = shutdown.changed() => break,
            result = gateway.book() => result,
        };
        match result {
            Ok(book) => events.book(book),
            Err(e) => {
                log::warn!("[BOOK] book pump failed: {}", e);
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = sleep(settings.book_retry_delay) => {}
                }
            }
        }
    }
    log::debug!("[BOOK] worker stopped");
}

/// Resolves with the name of the first termination signal. A failed SIGINT
/// listener leaves SIGTERM armed.
async fn first_termination<I, T>(sigint: I, sigterm: T) -> &'static str
where
    I: Future<Output = std::io::Result<()>>,
    T: Future<Output = ()>,
{
    tokio::pin!(sigterm);
    tokio::select! {
        result = sigint => match result {
            Ok(()) => return "SIGINT",
            Err(e) => log::error!("[EXIT] failed to listen for SIGINT: {}", e),
        },
        _ = &mut sigterm => return "SIGTERM",
    }
    sigterm.await;
    "SIGTERM"
}

async fn termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                let received = first_termination(tokio::signal::ctrl_c(), async move {
                    term.recv().await;
                })
                .await;
                log::info!("[EXIT] Handling {}", received);
                return;
            }
            Err(e) => log::error!("[EXIT] failed to listen for SIGTERM: {}", e),
        }
    }
    let received = first_termination(tokio::signal::ctrl_c(), std::future::pending::<()>()).await;
    log::info!("[EXIT] Handling {}", received);
}

/// Owns the background workers and the cancel-all drain on exit.
pub struct Supervisor {
    exchange_name: String,
    gateway: Arc<dyn Gateway>,
    events: GatewayEvents,
    store: Arc<dyn ConfigStore>,
    settings: SupervisorConfig,
    drain: OrderDrain,
    shutdown_tx: watch::Sender<bool>,
    exit_tx: mpsc::UnboundedSender<i32>,
    exit_rx: mpsc::UnboundedReceiver<i32>,
}

impl Supervisor {
    pub fn new(
        exchange_name: &str,
        gateway: Arc<dyn Gateway>,
        events: GatewayEvents,
        store: Arc<dyn ConfigStore>,
        settings: SupervisorConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        Self {
            exchange_name: exchange_name.to_string(),
            drain: OrderDrain::new(gateway.clone()),
            gateway,
            events,
            store,
            settings,
            shutdown_tx,
            exit_tx,
            exit_rx,
        }
    }

    pub fn exit_handle(&self) -> ExitHandle {
        ExitHandle {
            tx: self.exit_tx.clone(),
        }
    }

    /// Runs until a signal, an exit request or a worker failure, then drains
    /// open orders. Returns the exit code the process should terminate with.
    pub async fn run(mut self) -> i32 {
        if let Err(e) = self.gateway.start(self.events.clone()).await {
            log::error!("[GW] {} failed to start gateway: {}", self.exchange_name, e);
            return self.happy_ending(EXIT_CODE_FAILURE).await;
        }

        let mut workers = JoinSet::new();
        workers.spawn(maintenance_loop(
            self.gateway.clone(),
            self.drain.clone(),
            self.events.clone(),
            self.store.clone(),
            self.settings.clone(),
            self.shutdown_tx.subscribe(),
        ));
        workers.spawn(book_loop(
            self.gateway.clone(),
            self.events.clone(),
            self.settings.clone(),
            self.shutdown_tx.subscribe(),
        ));

        let requested = tokio::select! {
            _ = termination_signal() => 0,
            code = self.exit_rx.recv() => code.unwrap_or(0),
            Some(joined) = workers.join_next() => {
                match joined {
                    Ok(()) => log::error!("[EXIT] background worker exited unexpectedly"),
                    Err(e) => log::error!("[EXIT] background worker crashed: {}", e),
                }
                EXIT_CODE_FAILURE
            }
        };

        let code = self.happy_ending(requested).await;

        let joined = timeout(Duration::from_millis(WORKER_JOIN_TIMEOUT_MS), async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if joined.is_err() {
            log::warn!("[EXIT] workers did not stop in time, aborting them");
            workers.abort_all();
        }
        if let Err(e) = self.gateway.stop().await {
            log::warn!("[GW] {} failed to stop gateway: {}", self.exchange_name, e);
        }
        log::info!("[EXIT] Exiting with code {}", code);
        code
    }

    /// Stops the workers and cancels every open order before handing back
    /// `code`. A failed or timed-out cancel is logged and not retried.
    pub async fn happy_ending(&self, code: i32) -> i32 {
        log::info!(
            "[EXIT] {} Attempting to cancel all open orders, please wait..",
            self.exchange_name
        );
        let _ = self.shutdown_tx.send(true);
        let cancelled = self
            .drain
            .cancel_all_within(self.settings.shutdown_timeout, self.settings.shutdown_timeout)
            .await;
        match cancelled {
            Ok(Ok(())) => log::info!(
                "[EXIT] {} cancel all open orders OK.",
                self.exchange_name
            ),
            Ok(Err(e)) => log::warn!(
                "[EXIT] {} cancel all open orders failed, still shutting down: {}",
                self.exchange_name,
                e
            ),
            Err(_) => log::warn!(
                "[EXIT] {} cancel all open orders timed out after {:?}, still shutting down.",
                self.exchange_name,
                self.settings.shutdown_timeout
            ),
        }
        code
    }
}
