use fragment::{
    FragmentCacheOperations, FragmentEvent, FragmentRequest, SingleFlightFragmentCacheController,
    StatsSnapshot, StoreRegistry,
};
use shared::config::Config;
use shared::BoxError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use storage_engine::MokaStore;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const RENDER_DELAY: Duration = Duration::from_millis(20);

#[derive(Debug, Default)]
struct RoundStats {
    requests: u64,
    failed: u64,
    renders: u64,
    duration_ms: u64,
}

impl RoundStats {
    fn log_summary(&self, round: &str) {
        let rps = if self.duration_ms == 0 {
            self.requests
        } else {
            self.requests * 1000 / self.duration_ms
        };
        info!(
            round,
            requests = self.requests,
            failed = self.failed,
            renders = self.renders,
            duration_ms = self.duration_ms,
            rps,
            "Round finished"
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting fragment cache bench");

    match dotenvy::dotenv() {
        Ok(_) => info!("Loaded environment variables from .env file"),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    let config = Config::from_env();
    info!(
        max_entries = ?config.max_entries,
        policy = ?config.store_error_policy,
        single_flight = config.single_flight,
        default_ttl = %config.default_ttl,
        concurrency = config.bench_concurrency,
        distinct_keys = config.bench_distinct_keys,
        "Configuration loaded"
    );

    let registry = StoreRegistry::new().with_policy(config.store_error_policy);
    registry
        .register(
            "default",
            Arc::new(MokaStore::new("template_fragments", config.max_entries)),
        )
        .await;

    let (events_tx, events_rx) = broadcast::channel(1024);
    tokio::spawn(log_events(events_rx));

    let controller = registry
        .controller(None)
        .await?
        .with_event_broadcaster(events_tx);

    let stats = if config.single_flight {
        let cache = Arc::new(SingleFlightFragmentCacheController::new(controller));
        run_rounds(cache.clone(), &config).await;
        cache.stats()
    } else {
        let cache = Arc::new(controller);
        run_rounds(cache.clone(), &config).await;
        cache.stats()
    };

    log_stats(&stats);
    Ok(())
}

async fn run_rounds<C: FragmentCacheOperations>(cache: Arc<C>, config: &Config) {
    // cold round renders every key, warm round should be all hits
    for round in ["cold", "warm"] {
        run_round(cache.clone(), config).await.log_summary(round);
    }
}

async fn run_round<C: FragmentCacheOperations>(cache: Arc<C>, config: &Config) -> RoundStats {
    let renders = Arc::new(AtomicU64::new(0));
    let mut tasks = JoinSet::new();
    let start = Instant::now();

    for worker in 0..config.bench_concurrency {
        let cache = cache.clone();
        let renders = renders.clone();
        let product_id = (worker % config.bench_distinct_keys) as u64;
        let request = FragmentRequest::new(config.default_ttl, "product_card")
            .vary(product_id)
            .vary("en");

        tasks.spawn(async move {
            cache
                .get_or_compute(&request, || render_product(product_id, renders))
                .await
        });
    }

    let mut stats = RoundStats::default();
    while let Some(joined) = tasks.join_next().await {
        stats.requests += 1;
        match joined {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!("Fragment request failed: {}", e);
                stats.failed += 1;
            }
            Err(e) => {
                warn!("Bench task panicked: {}", e);
                stats.failed += 1;
            }
        }
    }

    stats.renders = renders.load(Ordering::Relaxed);
    stats.duration_ms = start.elapsed().as_millis() as u64;
    stats
}

async fn render_product(product_id: u64, renders: Arc<AtomicU64>) -> Result<String, BoxError> {
    renders.fetch_add(1, Ordering::Relaxed);
    tokio::time::sleep(RENDER_DELAY).await;
    Ok(format!(
        "<article class=\"product\" data-id=\"{product_id}\">Product {product_id}</article>"
    ))
}

async fn log_events(mut rx: broadcast::Receiver<FragmentEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => debug!(target: "fragment_events", "{}", json),
                Err(e) => warn!("Failed to serialize fragment event: {}", e),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Event logger lagged, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn log_stats(stats: &StatsSnapshot) {
    info!(
        hits = stats.hits,
        misses = stats.misses,
        shared = stats.shared,
        bypasses = stats.bypasses,
        computes = stats.computes,
        compute_failures = stats.compute_failures,
        store_errors = stats.store_errors,
        hit_ratio = stats.hit_ratio(),
        "Fragment cache stats"
    );
}
