//! Process entry point: a thin wrapper connecting a [`Node`] to a Unix
//! socket and running its event loop to completion.
//!
//! Argument parsing is hand-rolled rather than pulled in from a CLI crate —
//! the interface is three positional values fixed by the simulator's own
//! process-spawning convention, not something a user ever types by hand.

use std::process::ExitCode;

use log::{info, Level};
use rand::SeedableRng;

use ot_rfsim_node::ble::{BleChannel, NullBleSink};
use ot_rfsim_node::config::Config;
use ot_rfsim_node::host_bridge::NullHostBridge;
use ot_rfsim_node::mac::NullMacFrameBuilder;
use ot_rfsim_node::node::LoopResult;
use ot_rfsim_node::source_match::VecSourceMatchTable;
use ot_rfsim_node::transport::{SharedTransport, UnixSocketTransport};
use ot_rfsim_node::uart::NullUartSink;
use ot_rfsim_node::{Node, NodeError};

struct ProdConfig;

impl Config for ProdConfig {
    type Transport = SharedTransport;
    type SourceMatch = VecSourceMatchTable;
    type Rng = rand::rngs::StdRng;
    type MacFrameBuilder = NullMacFrameBuilder;
    type UartSink = NullUartSink;
    type HostBridge = NullHostBridge;
    type BleSink = NullBleSink;
}

/// `<NodeId> <OTNS-Unix-socket-file> [<random-seed>]`, matching the
/// simulator's own fixed invocation convention for a node process.
struct Args {
    node_id: u32,
    socket_path: String,
    seed: Option<u64>,
}

impl Args {
    fn parse(mut argv: impl Iterator<Item = String>) -> Result<Self, NodeError> {
        let node_id = argv
            .next()
            .ok_or_else(|| NodeError::InvalidArgs("usage: <NodeId> <OTNS-Unix-socket-file> [<random-seed>]".into()))?
            .parse::<u32>()
            .map_err(|e| NodeError::InvalidArgs(format!("node ID: {}", e)))?;
        if node_id < 1 {
            return Err(NodeError::InvalidArgs(format!("invalid NodeId: {} (must be >= 1 and < UINT32_MAX)", node_id)));
        }
        let socket_path = argv.next().ok_or_else(|| NodeError::InvalidArgs("missing socket path".into()))?;
        let seed = argv
            .next()
            .map(|s| {
                let v = s.parse::<i64>().map_err(|e| NodeError::InvalidArgs(format!("invalid random-seed integer: {} ({})", s, e)))?;
                if v <= i32::MIN as i64 || v >= i32::MAX as i64 {
                    return Err(NodeError::InvalidArgs(format!(
                        "invalid random-seed integer: {} (must be > INT32_MIN and < INT32_MAX)",
                        s
                    )));
                }
                Ok(v as u64)
            })
            .transpose()?;

        Ok(Args { node_id, socket_path, seed })
    }
}

/// Whether to bind the BLE UDP side channel, read from the environment
/// rather than a CLI flag — the simulator's own invocation of a node process
/// never varies beyond the three positional arguments above.
fn ble_enabled() -> bool {
    std::env::var("OT_RFSIM_ENABLE_BLE").as_deref() == Ok("1")
}

fn log_level() -> Level {
    match std::env::var("OT_RFSIM_LOG_LEVEL").as_deref() {
        Ok("trace") => Level::Trace,
        Ok("debug") => Level::Debug,
        Ok("warn") => Level::Warn,
        Ok("error") => Level::Error,
        _ => Level::Info,
    }
}

fn run() -> Result<(), NodeError> {
    let args = Args::parse(std::env::args().skip(1))?;

    let transport = SharedTransport::new(UnixSocketTransport::connect(&args.socket_path)?);

    let _ = log_sink_install(transport.clone(), log_level());

    let rng = match args.seed {
        Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
        None => rand::rngs::StdRng::from_entropy(),
    };
    let ble = if ble_enabled() { Some(BleChannel::bind(args.node_id)?) } else { None };

    let mut node = Node::<ProdConfig>::new(
        args.node_id,
        transport,
        VecSourceMatchTable::new(),
        rng,
        NullMacFrameBuilder,
        NullUartSink,
        NullHostBridge,
        NullBleSink,
        ble,
    );
    node.send_node_info()?;

    loop {
        match node.run()? {
            LoopResult::Terminate => return Ok(()),
            LoopResult::PseudoReset => info!("pseudo-reset requested; no stack state to clear, resuming"),
            LoopResult::HardReset => info!("hard-reset requested; re-entering the event loop"),
            LoopResult::Continue => unreachable!("Node::run only returns on Terminate/PseudoReset/HardReset, or an error"),
        }
    }
}

fn log_sink_install(transport: SharedTransport, level: Level) -> Result<(), log::SetLoggerError> {
    ot_rfsim_node::log_sink::SimLogger::new(transport, level).install()
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ot-rfsim-node: {}", e);
            ExitCode::FAILURE
        }
    }
}
