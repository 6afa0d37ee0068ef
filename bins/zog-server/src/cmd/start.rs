use zog_engine::{OperationalLogger, Receiver, ReceiverError};

use crate::config::Effective;
use crate::error::ServerError;

pub async fn run(eff: Effective) -> Result<(), ServerError> {
    tracing::info!(
        name = %eff.name,
        logpath = %eff.logpath.display(),
        transport = eff.transport.kind(),
        "zog starting"
    );

    let receiver = Receiver::new(eff.transport, &eff.logpath, OperationalLogger::new(&eff.name))?;
    let stats = receiver.logger().stats();

    let result = match receiver.start_until(shutdown_signal()).await {
        ReceiverError::Interrupted => Ok(()),
        error => Err(error.into()),
    };

    tracing::info!(
        routed = stats.routed(),
        defects = stats.defects(),
        write_failures = stats.write_failures(),
        probes = stats.probes(),
        probe_failures = stats.probe_failures(),
        "zog stopped"
    );
    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c, running until the receiver fails");
        std::future::pending::<()>().await;
    }
    tracing::info!("ctrl-c received, shutting down");
}
