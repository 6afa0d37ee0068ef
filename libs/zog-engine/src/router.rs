use std::sync::Arc;

use crate::oplog::OperationalLogger;
use crate::sink::LogSink;
use crate::topic::Message;
use crate::transport::BusItem;

/// Fans delivered messages out to per-topic logs.
///
/// Write failures and malformed items are logged and dropped; neither ends
/// the receive loop.
#[derive(Debug, Clone)]
pub struct Router {
    sink: Arc<LogSink>,
    logger: OperationalLogger,
}

impl Router {
    pub fn new(sink: Arc<LogSink>, logger: OperationalLogger) -> Self {
        Self { sink, logger }
    }

    pub fn sink(&self) -> &Arc<LogSink> {
        &self.sink
    }

    pub fn logger(&self) -> &OperationalLogger {
        &self.logger
    }

    pub fn route(&self, message: &Message) {
        match self.sink.append(message.topic(), message.payload()) {
            Ok(()) => self.logger.routed(message.topic()),
            Err(e) => self.logger.write_failed(message.topic(), &e),
        }
    }

    /// Route a raw bus item by its channel, or report it as a defect.
    pub fn route_item(&self, item: BusItem) {
        match item.into_message() {
            Ok(message) => self.route(&message),
            Err(defect) => self.logger.routing_defect(&defect),
        }
    }
}
