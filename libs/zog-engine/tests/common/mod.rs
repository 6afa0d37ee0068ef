#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use zog_engine::transport::BusFuture;
use zog_engine::{BusClient, BusItem, TransportError};

/// One scripted step of a fake bus.
pub enum Step {
    Item(BusItem),
    /// Nothing pending. Polling sees `None`; a blocking read waits `gap` first.
    Empty,
    Fail(TransportError),
}

pub fn publish(channel: &str, payload: &str) -> Step {
    Step::Item(BusItem::publication(channel, payload))
}

pub fn reset() -> Step {
    Step::Fail(TransportError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "connection reset by peer",
    )))
}

/// What the receiver did to the bus, for assertions.
#[derive(Debug, Default)]
pub struct BusRecord {
    pub subscribed: Vec<String>,
    pub pings: usize,
    pub closed: bool,
    pub remaining: usize,
}

/// Bus client that replays a fixed script. Once the script runs out, every
/// read fails with [`TransportError::Closed`].
pub struct ScriptedBus {
    steps: VecDeque<Step>,
    gap: Duration,
    fail_subscribe: bool,
    fail_ping: bool,
    hang_ping: bool,
    record: Arc<Mutex<BusRecord>>,
}

impl ScriptedBus {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> (Self, Arc<Mutex<BusRecord>>) {
        let record = Arc::new(Mutex::new(BusRecord::default()));
        let bus = Self {
            steps: steps.into_iter().collect(),
            gap: Duration::from_millis(600),
            fail_subscribe: false,
            fail_ping: false,
            hang_ping: false,
            record: Arc::clone(&record),
        };
        (bus, record)
    }

    pub fn failing_subscribe(mut self) -> Self {
        self.fail_subscribe = true;
        self
    }

    pub fn failing_ping(mut self) -> Self {
        self.fail_ping = true;
        self
    }

    /// PING is sent but no reply ever comes back.
    pub fn silent_ping(mut self) -> Self {
        self.hang_ping = true;
        self
    }

    fn next_step(&mut self) -> Option<Step> {
        let step = self.steps.pop_front();
        self.record.lock().unwrap().remaining = self.steps.len();
        step
    }
}

impl BusClient for ScriptedBus {
    fn subscribe<'a>(&'a mut self, patterns: &'a [String]) -> BusFuture<'a, ()> {
        Box::pin(async move {
            if self.fail_subscribe {
                return Err(TransportError::Connect {
                    addr: "scripted".into(),
                    detail: "connection refused".into(),
                });
            }
            self.record.lock().unwrap().subscribed = patterns.to_vec();
            Ok(())
        })
    }

    fn poll_item(&mut self) -> Result<Option<BusItem>, TransportError> {
        match self.next_step() {
            Some(Step::Item(item)) => Ok(Some(item)),
            Some(Step::Empty) => Ok(None),
            Some(Step::Fail(e)) => Err(e),
            None => Err(TransportError::Closed),
        }
    }

    fn next_item(&mut self) -> BusFuture<'_, BusItem> {
        Box::pin(async move {
            loop {
                match self.next_step() {
                    Some(Step::Item(item)) => return Ok(item),
                    Some(Step::Empty) => tokio::time::sleep(self.gap).await,
                    Some(Step::Fail(e)) => return Err(e),
                    None => return Err(TransportError::Closed),
                }
            }
        })
    }

    fn ping(&mut self) -> BusFuture<'_, ()> {
        Box::pin(async move {
            self.record.lock().unwrap().pings += 1;
            if self.hang_ping {
                std::future::pending::<()>().await;
            }
            if self.fail_ping {
                return Err(TransportError::Closed);
            }
            Ok(())
        })
    }

    fn close(&mut self) {
        self.record.lock().unwrap().closed = true;
    }
}

pub fn read_log(dir: &Path, name: &str) -> String {
    std::fs::read_to_string(dir.join(name)).unwrap_or_default()
}

pub fn log_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
