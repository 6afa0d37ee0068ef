use std::convert::Infallible;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::{Instant, sleep, timeout};

use crate::config::{BusConfig, ConsumptionStrategy, TransportConfig};
use crate::error::{ReceiverError, TransportError};
use crate::health::HealthMonitor;
use crate::oplog::OperationalLogger;
use crate::router::Router;
use crate::sink::LogSink;
use crate::transport::{BusClient, BusItem, BusTransport, DirectSocketTransport, RedisBus, TaskGuard, Transport};

// ═══════════════════════════════════════════════════════════════
//  Receiver
// ═══════════════════════════════════════════════════════════════

/// Ingestion engine: one transport, one log sink, one operational logger.
///
/// [`start`](Self::start) consumes the receiver and only returns once the
/// loop hit a terminal error, so a receiver runs at most once.
pub struct Receiver<B: BusClient = RedisBus> {
    transport: Transport<B>,
    router: Router,
}

impl Receiver<RedisBus> {
    /// Validate `config`, build its transport and prepare `logpath`.
    pub fn new(
        config: TransportConfig,
        logpath: impl Into<PathBuf>,
        logger: OperationalLogger,
    ) -> Result<Self, ReceiverError> {
        config.validate()?;
        let transport = Transport::from_config(&config)?;
        let sink = LogSink::new(logpath)?;
        Ok(Self::with_transport(transport, sink, logger))
    }
}

impl<B: BusClient> Receiver<B> {
    pub fn with_transport(
        transport: impl Into<Transport<B>>,
        sink: LogSink,
        logger: OperationalLogger,
    ) -> Self {
        let transport = transport.into();
        logger.set_transport(transport.kind());
        Self {
            transport,
            router: Router::new(Arc::new(sink), logger),
        }
    }

    pub fn sink(&self) -> &Arc<LogSink> {
        self.router.sink()
    }

    pub fn logger(&self) -> &OperationalLogger {
        self.router.logger()
    }

    /// Run until the transport fails. The returned error is the terminal
    /// state; it has already been reported on the operational log.
    pub async fn start(self) -> ReceiverError {
        let logger = self.router.logger().clone();
        let error = match self.transport {
            Transport::Direct(transport) => run_direct(transport, &self.router).await,
            Transport::Bus(transport) => run_bus(transport, self.router).await,
        };
        logger.terminated(&error);
        error
    }

    /// [`start`](Self::start), raced against `shutdown`. When shutdown wins the
    /// loop is dropped, closing its sockets and files, and the result is
    /// [`ReceiverError::Interrupted`].
    pub async fn start_until<F>(self, shutdown: F) -> ReceiverError
    where
        F: Future<Output = ()>,
    {
        let logger = self.router.logger().clone();
        tokio::select! {
            error = self.start() => error,
            () = shutdown => {
                let error = ReceiverError::Interrupted;
                logger.terminated(&error);
                error
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Direct socket loop
// ═══════════════════════════════════════════════════════════════

async fn run_direct(mut transport: DirectSocketTransport, router: &Router) -> ReceiverError {
    let Err(error) = direct_loop(&mut transport, router).await;
    transport.close();
    error.into()
}

async fn direct_loop(
    transport: &mut DirectSocketTransport,
    router: &Router,
) -> Result<Infallible, TransportError> {
    let addr = transport.bind().await?;
    router
        .logger()
        .listening(&format!("direct {addr} topic {}", transport.topic()));

    loop {
        match transport.receive().await? {
            Some(message) => router.route(&message),
            None => return Err(TransportError::Closed),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Bus loops
// ═══════════════════════════════════════════════════════════════

async fn run_bus<B: BusClient>(transport: BusTransport<B>, router: Router) -> ReceiverError {
    let (config, mut client) = transport.into_parts();

    if let Err(e) = client.subscribe(&config.channels).await {
        client.close();
        return e.into();
    }
    router.logger().listening(&format!(
        "bus {} strategy {} patterns {}",
        config.target(),
        config.strategy,
        config.channels.join(",")
    ));

    let result = match config.strategy {
        ConsumptionStrategy::Polling => poll_loop(&mut client, &config, &router).await,
        ConsumptionStrategy::BlockingIterate => iterate_loop(&mut client, &config, &router).await,
        ConsumptionStrategy::BackgroundThread => return run_background(client, config, router).await,
    };
    client.close();
    let Err(error) = result;
    error.into()
}

async fn poll_loop<B: BusClient>(
    client: &mut B,
    config: &BusConfig,
    router: &Router,
) -> Result<Infallible, TransportError> {
    let idle = config.idle_delay();
    let mut health = monitor_for(config);
    loop {
        match client.poll_item()? {
            Some(item) => {
                router.route_item(item);
                // A busy stream never hits the idle sleep.
                tokio::task::yield_now().await;
            }
            None => {
                probe_if_due(client, &mut health, router.logger()).await;
                sleep(idle).await;
            }
        }
    }
}

async fn iterate_loop<B: BusClient>(
    client: &mut B,
    config: &BusConfig,
    router: &Router,
) -> Result<Infallible, TransportError> {
    let mut health = monitor_for(config);
    loop {
        let item = client.next_item().await?;
        router.route_item(item);
        probe_if_due(client, &mut health, router.logger()).await;
    }
}

/// Hand the client to a spawned worker and wait for it. Dropping the
/// returned future aborts the worker.
async fn run_background<B: BusClient>(client: B, config: BusConfig, router: Router) -> ReceiverError {
    let logger = router.logger().clone();
    let on_item = move |item: BusItem| router.route_item(item);
    let mut worker = TaskGuard::new(tokio::spawn(background_worker(client, config, on_item, logger)));

    match worker.join().await {
        Ok(error) => error.into(),
        Err(e) => ReceiverError::Worker(e.to_string()),
    }
}

/// Probes only after an item was handled, so an idle bus is never pinged.
async fn background_worker<B, F>(
    mut client: B,
    config: BusConfig,
    on_item: F,
    logger: OperationalLogger,
) -> TransportError
where
    B: BusClient,
    F: Fn(BusItem) + Send + Sync + 'static,
{
    let idle = config.idle_delay();
    let mut health = monitor_for(&config);
    let error = loop {
        match client.poll_item() {
            Ok(Some(item)) => {
                on_item(item);
                probe_if_due(&mut client, &mut health, &logger).await;
                tokio::task::yield_now().await;
            }
            Ok(None) => sleep(idle).await,
            Err(e) => break e,
        }
    };
    client.close();
    error
}

fn monitor_for(config: &BusConfig) -> HealthMonitor {
    HealthMonitor::new(config.probe_interval(), Instant::now()).with_timeout(config.probe_timeout())
}

async fn probe_if_due<B: BusClient>(client: &mut B, health: &mut HealthMonitor, logger: &OperationalLogger) {
    let now = Instant::now();
    if !health.should_probe(now) {
        return;
    }
    let outcome = match timeout(health.timeout(), client.ping()).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Unresponsive(health.timeout())),
    };
    match outcome {
        Ok(()) => logger.probe_ok(),
        Err(e) => logger.probe_failed(&e),
    }
    health.record_probe(now);
}
