use chrono::{DateTime, FixedOffset, Utc};
use env_logger::Builder;
use log::LevelFilter;
use quotegate::config::{ConfigStore, GatewayConfig, MapConfig};
use quotegate::control_bridge;
use quotegate::gateway::{Gateway, GatewayEvents};
use quotegate::ports::gateway_box::GatewayBox;
use quotegate::reconciler::Reconciler;
use quotegate::signals::Signals;
use quotegate::supervisor::{Supervisor, SupervisorConfig};
use quotegate::translator::EventTranslator;
use quotegate::transport::{LocalBus, Transport};
use std::env;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Duration;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging with local timezone
    let offset_seconds = env::var("TIMEZONE_OFFSET")
        .unwrap_or_else(|_| "0".to_string())
        .parse::<i32>()
        .expect("Invalid TIMEZONE_OFFSET");
    let offset = FixedOffset::east_opt(offset_seconds).expect("Invalid offset");
    Builder::from_default_env()
        .format(move |buf, record| {
            let utc_now: DateTime<Utc> = Utc::now();
            let local_now = utc_now.with_timezone(&offset);
            writeln!(
                buf,
                "{} [{}] - {}",
                local_now.format("%Y-%m-%dT%H:%M:%S%.3f%z"),
                record.level(),
                record.args()
            )
        })
        .filter(
            None,
            LevelFilter::from_str(&env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()))
                .unwrap_or(LevelFilter::Debug),
        )
        .init();

    let git_hash = option_env!("QUOTEGATE_GIT_HASH").unwrap_or("unknown");
    log::info!("quotegate git: {}", git_hash);

    let store: Arc<dyn ConfigStore> =
        Arc::new(MapConfig::from_env_or_yaml().expect("failed to load config"));
    let cfg = GatewayConfig::from_store(store.as_ref()).expect("invalid gateway config");
    log::info!(
        "[CONFIG] EXCHANGE={} pair={}/{} environment={}",
        cfg.exchange,
        cfg.pair.base,
        cfg.pair.quote,
        cfg.environment()
    );

    let gateway: Arc<dyn Gateway> = Arc::new(
        GatewayBox::create(&cfg.exchange, &cfg.pair)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?,
    );

    let bus = Arc::new(LocalBus::default());
    let transport: Arc<dyn Transport> = bus.clone();
    let signals = Arc::new(Signals::new());
    let reconciler = Arc::new(Reconciler::new(
        &cfg.exchange,
        cfg.initial_auto_start(),
        transport.clone(),
        signals.clone(),
    ));
    let translator = Arc::new(EventTranslator::new(transport.clone(), signals.clone()));
    control_bridge::register(
        transport.as_ref(),
        reconciler.clone(),
        cfg.clone(),
        gateway.product(),
    );

    signals.quoting_permission.subscribe(|state| {
        log::debug!("[GW] quoting permission is {}", state);
    });

    let settings = SupervisorConfig {
        shutdown_timeout: Duration::from_millis(cfg.shutdown_timeout_ms),
        ..SupervisorConfig::default()
    };
    let supervisor = Supervisor::new(
        &cfg.exchange,
        gateway,
        GatewayEvents::new(reconciler, translator),
        store,
        settings,
    );
    let exit = supervisor.exit_handle();

    // Operator commands arrive on stdin as "<Topic> <json>"
    let control_bus = bus.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) if line.trim() == "exit" => {
                    exit.request(0);
                    break;
                }
                Ok(Some(line)) => {
                    if let Err(e) = control_bus.dispatch_line(&line) {
                        log::warn!("[CONTROL] ignored command: {}", e);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("[CONTROL] stdin closed: {}", e);
                    break;
                }
            }
        }
    });

    log::info!("Starting gateway supervisor...");
    let code = supervisor.run().await;
    std::process::exit(code);
}
