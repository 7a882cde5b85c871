//! # udt-send
//!
//! Streams stdin to a UDT peer over UDP. Runs the sender engine on its own
//! thread, decodes ACK/NAK feedback on a second one and escalates to an EXP
//! timeout when the peer goes quiet with data in flight.
//!
//! ## Usage
//!
//! ```bash
//! cat capture.ts | udt-send --peer 10.0.0.2:9000
//! udt-send --peer 10.0.0.2:9000 --config sender.toml --bind 0.0.0.0:9001 < file
//! ```

use std::io::Read;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use quanta::Instant;
use udt_transport::wire::{ControlBody, Packet};
use udt_transport::{SenderConfig, SenderEngine, SenderStats, Session, UdpSink, UdtSender};

const READ_CHUNK: usize = 64 * 1024;
const FEEDBACK_POLL: Duration = Duration::from_millis(100);

fn main() -> anyhow::Result<()> {
    // ── Logging ─────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();

    // ── Parse CLI ───────────────────────────────────────────────
    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => SenderConfig::from_file(path)?,
        None => SenderConfig::default(),
    };

    tracing::info!(
        peer = %args.peer,
        bind = %args.bind,
        window = config.session.flow_window,
        max_payload = config.max_payload_size,
        "udt-send starting"
    );

    // ── Socket & engine ─────────────────────────────────────────
    let socket = UdpSocket::bind(args.bind)?;
    socket.connect(args.peer)?;
    let feedback_socket = socket.try_clone()?;
    feedback_socket.set_read_timeout(Some(FEEDBACK_POLL))?;

    let session = Arc::new(Session::new(
        config.session.flow_window,
        config.session.destination_id,
    ));
    let stats = Arc::new(SenderStats::new());
    let exp = Arc::new(ExpClock::new(args.exp_interval));
    let engine = SenderEngine::new(config, Arc::new(UdpSink::new(socket)), session.clone())
        .with_exp_timer(exp.clone())
        .with_stats(stats.clone());
    let mut sender = UdtSender::spawn(engine)?;

    // ── Graceful shutdown ───────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            tracing::info!("shutting down...");
            running.store(false, Ordering::Relaxed);
        })?;
    }

    // ── Feedback thread ─────────────────────────────────────────
    let feedback = {
        let engine = sender.engine().clone();
        let running = running.clone();
        let exp = exp.clone();
        std::thread::Builder::new()
            .name("udt-feedback".into())
            .spawn(move || {
                feedback_loop(&feedback_socket, &engine, &session, &exp, &running)
            })?
    };

    // ── Stream stdin ────────────────────────────────────────────
    let mut stdin = std::io::stdin().lock();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut total_bytes: u64 = 0;
    while running.load(Ordering::Relaxed) {
        let n = stdin.read(&mut buf)?;
        if n == 0 {
            break;
        }
        sender.write(buf[..n].to_vec())?;
        total_bytes += n as u64;
    }
    tracing::info!(total_bytes, "input drained, waiting for acknowledgments");

    while running.load(Ordering::Relaxed) && sender.is_running() && sender.has_outstanding() {
        std::thread::sleep(Duration::from_millis(10));
    }

    // ── Cleanup ─────────────────────────────────────────────────
    running.store(false, Ordering::Relaxed);
    let result = sender.stop();
    if feedback.join().is_err() {
        tracing::error!("feedback thread panicked");
    }

    let snapshot = stats.snapshot();
    let stats_json = serde_json::to_string(&snapshot)?;
    tracing::info!(
        stats = %stats_json,
        retransmit_ratio = snapshot.retransmit_ratio(),
        "udt-send stopped"
    );
    result?;
    Ok(())
}

// ─── Feedback ───────────────────────────────────────────────────────────────

fn feedback_loop(
    socket: &UdpSocket,
    engine: &SenderEngine,
    session: &Session,
    exp: &ExpClock,
    running: &AtomicBool,
) {
    let mut buf = [0u8; 65_536];
    while running.load(Ordering::Relaxed) && !engine.is_stopped() {
        match socket.recv(&mut buf) {
            Ok(len) => match Packet::decode(&mut &buf[..len]) {
                Ok(Packet::Control(ctrl)) => {
                    exp.reset();
                    if let ControlBody::Ack(ack) = &ctrl.body {
                        if ack.available_buffer > 0 {
                            session.set_flow_window_size(ack.available_buffer as usize);
                        }
                    }
                    if let Err(e) = engine.receive(&ctrl) {
                        tracing::warn!(error = %e, "feedback handling failed");
                    }
                }
                Ok(Packet::Data(_)) => {}
                Err(e) => tracing::debug!(error = %e, len, "undecodable datagram"),
            },
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(e) => {
                tracing::debug!(error = %e, "feedback recv failed");
                std::thread::sleep(FEEDBACK_POLL);
            }
        }

        if engine.unacknowledged() > 0 && exp.expired() {
            engine.on_exp_timeout();
            exp.reset();
        }
    }
}

/// Peer-silence timer. Reset on every control packet and by NAKs through
/// the engine.
struct ExpClock {
    epoch: Instant,
    last_reset_ms: AtomicU64,
    interval: Duration,
}

impl ExpClock {
    fn new(interval: Duration) -> Self {
        ExpClock {
            epoch: Instant::now(),
            last_reset_ms: AtomicU64::new(0),
            interval,
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn reset(&self) {
        self.last_reset_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    fn expired(&self) -> bool {
        let last = self.last_reset_ms.load(Ordering::Relaxed);
        self.now_ms().saturating_sub(last) >= self.interval.as_millis() as u64
    }
}

impl udt_transport::ExpTimer for ExpClock {
    fn reset_exp_timer(&self) {
        self.reset();
    }
}

// ─── CLI Parsing ────────────────────────────────────────────────────────────

struct Args {
    peer: SocketAddr,
    bind: SocketAddr,
    config: Option<String>,
    exp_interval: Duration,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut peer = None;
    let mut bind: SocketAddr = "0.0.0.0:0".parse()?;
    let mut config = None;
    let mut exp_ms = 1000u64;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--peer" | "-p" => {
                i += 1;
                let val = args
                    .get(i)
                    .ok_or_else(|| anyhow::anyhow!("--peer requires a value"))?;
                peer = Some(
                    val.parse()
                        .map_err(|e| anyhow::anyhow!("invalid peer address '{}': {}", val, e))?,
                );
            }
            "--bind" | "-b" => {
                i += 1;
                let val = args
                    .get(i)
                    .ok_or_else(|| anyhow::anyhow!("--bind requires a value"))?;
                bind = val
                    .parse()
                    .map_err(|e| anyhow::anyhow!("invalid bind address '{}': {}", val, e))?;
            }
            "--config" | "-c" => {
                i += 1;
                config = Some(
                    args.get(i)
                        .ok_or_else(|| anyhow::anyhow!("--config requires a value"))?
                        .clone(),
                );
            }
            "--exp-ms" => {
                i += 1;
                let val = args
                    .get(i)
                    .ok_or_else(|| anyhow::anyhow!("--exp-ms requires a value"))?;
                exp_ms = val
                    .parse()
                    .map_err(|e| anyhow::anyhow!("invalid EXP interval '{}': {}", val, e))?;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                anyhow::bail!("unknown argument: {other}\nRun with --help for usage.");
            }
        }
        i += 1;
    }

    if peer.is_none() {
        if let Ok(val) = std::env::var("UDT_PEER") {
            peer = Some(val.trim().parse()?);
        }
    }
    let peer = peer.ok_or_else(|| {
        anyhow::anyhow!("no peer specified. Use --peer or UDT_PEER env var.\nRun with --help for usage.")
    })?;

    Ok(Args {
        peer,
        bind,
        config,
        exp_interval: Duration::from_millis(exp_ms.max(1)),
    })
}

fn print_help() {
    eprintln!(
        r#"udt-send: stream stdin to a UDT peer

USAGE:
  udt-send --peer <ADDR> [OPTIONS]

OPTIONS:
  --peer, -p <addr>     Peer UDP address (required)
  --bind, -b <addr>     Local bind address (default: 0.0.0.0:0)
  --config, -c <path>   TOML sender configuration
  --exp-ms <ms>         Peer silence before unacknowledged data is resent (default: 1000)
  --help, -h            Show this help

ENVIRONMENT VARIABLES:
  UDT_PEER   Peer address (fallback for --peer)
  RUST_LOG   Log level filter (e.g. info, udt_transport=trace)
"#
    );
}
