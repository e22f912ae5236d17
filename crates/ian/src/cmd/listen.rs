use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ian_iface::{ArtemisNetworkInterface, Disconnect, DisconnectCause, InterfaceConfig};
use ian_listener::{ArgumentCategory, ListenerArgument};
use ian_transport::parse_address;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::info;

use crate::cmd::{parse_timeout, runtime, ListenArgs};
use crate::exit::{disconnect_error, iface_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_observation, Observation, OutputFormat};

struct Seen {
    observation: Observation,
    cause: Option<DisconnectCause>,
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_timeout(&args.timeout)?;
    let (host, port) =
        parse_address(&args.address).map_err(|err| transport_error("invalid address", err))?;

    runtime()?.block_on(listen(&host, port, timeout, &args, format))
}

async fn listen(
    host: &str,
    port: u16,
    timeout: std::time::Duration,
    args: &ListenArgs,
    format: OutputFormat,
) -> CliResult<i32> {
    let config = InterfaceConfig {
        connect_timeout: timeout,
        ..InterfaceConfig::default()
    };
    let iface = ArtemisNetworkInterface::connect(host, port, config)
        .await
        .map_err(|err| iface_error("connect failed", err))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    iface
        .listeners()
        .on_category(ArgumentCategory::Packet, forward(tx.clone()));
    iface
        .listeners()
        .on_category(ArgumentCategory::ConnectionEvent, forward(tx));
    if let Some(limit) = args.count {
        // Registered after `forward`, so the last counted packet is still
        // printed. Nothing but the disconnect follows a stop.
        let seen = Arc::new(AtomicUsize::new(0));
        let stopper = iface.clone();
        iface
            .listeners()
            .on_category(ArgumentCategory::Packet, move |_: &dyn ListenerArgument| {
                if seen.fetch_add(1, Ordering::SeqCst) + 1 >= limit {
                    stopper.stop();
                }
            });
    }
    iface
        .start()
        .map_err(|err| iface_error("start failed", err))?;
    info!(%host, port, "listening");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut cause = None;

    while cause.is_none() {
        let seen = tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                iface.stop();
                continue;
            }
            seen = rx.recv() => seen,
        };
        let Some(seen) = seen else {
            break;
        };

        if !args.packets_only || seen.observation.kind == "packet" {
            print_observation(&seen.observation, format);
        }
        cause = seen.cause;
    }

    iface.dispose().await;

    match cause {
        Some(cause) if cause.is_error() => Err(disconnect_error("connection lost", &cause)),
        _ => Ok(SUCCESS),
    }
}

fn forward(tx: UnboundedSender<Seen>) -> impl Fn(&dyn ListenerArgument) + Send + Sync + 'static {
    move |argument: &dyn ListenerArgument| {
        let cause = argument
            .as_any()
            .downcast_ref::<Disconnect>()
            .map(|event| event.cause.clone());
        let _ = tx.send(Seen {
            observation: Observation::from_argument(argument),
            cause,
        });
    }
}
