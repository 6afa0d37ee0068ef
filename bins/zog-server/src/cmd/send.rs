use tokio::io::{AsyncBufReadExt, BufReader};

use zog_engine::{Address, BusConfig, BusEmitter, ByteOrder, FramingConfig, SocketEmitter};

use crate::config::{SendArgs, TransportKind};
use crate::error::ServerError;

pub async fn run(args: SendArgs) -> Result<(), ServerError> {
    let addr = Address::parse(&args.addr)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sent = 0u64;

    match args.kind {
        TransportKind::Direct => {
            let framing = FramingConfig {
                length_bytes: args.length_bytes,
                byte_order: if args.little_endian {
                    ByteOrder::Little
                } else {
                    ByteOrder::Big
                },
                max_payload: 0,
            };
            let target = connect_target(&addr);
            let mut emitter = SocketEmitter::connect(&target, &framing).await?;
            tracing::info!(addr = %target, "sending stdin to direct receiver");
            while let Some(line) = lines.next_line().await? {
                emitter.send(&line).await?;
                sent += 1;
            }
            emitter.close().await?;
        }
        TransportKind::Bus => {
            let channel = args
                .channel
                .ok_or_else(|| ServerError::Usage("bus send needs -c <channel>".into()))?;
            let mut config = BusConfig::default();
            addr.apply_to_bus(&mut config);
            let mut emitter = BusEmitter::connect(&config, &channel).await?;
            tracing::info!(bus = %config.target(), channel = %channel, "publishing stdin");
            while let Some(line) = lines.next_line().await? {
                emitter.publish(&line).await?;
                sent += 1;
            }
        }
    }

    tracing::info!(sent, "stdin drained");
    Ok(())
}

/// A wildcard bind host is not something to connect to; use loopback.
fn connect_target(addr: &Address) -> String {
    match addr.host.as_str() {
        "*" | "0.0.0.0" => format!("127.0.0.1:{}", addr.port),
        _ => addr.host_port(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_host_connects_to_loopback() {
        let addr = Address::parse("tcp://*:5011").unwrap();
        assert_eq!(connect_target(&addr), "127.0.0.1:5011");

        let addr = Address::parse("tcp://10.1.2.3:5011").unwrap();
        assert_eq!(connect_target(&addr), "10.1.2.3:5011");
    }
}
