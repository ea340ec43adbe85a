//! blackhole-client: raw-mode terminal passthrough over the transport
//! client.
//!
//! Puts the controlling terminal in raw mode, forwards stdin bytes
//! straight through as STDIN frames, writes decoded STDOUT frames back
//! to stdout, and forwards SIGWINCH as a RESIZE frame — the same
//! terminal-as-PTY-frontend shape as `pty-proxy`, just talking the
//! Blackhole wire protocol instead of a Unix socket.

use std::io::Write;
use std::os::fd::BorrowedFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use blackhole_client::{Coordinator, CoordinatorAction, TerminalEmulator, Transport, TransportEvent};
use blackhole_protocol::Frame;
use clap::Parser;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::termios::{self, SetArg};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "blackhole-client", about = "Raw-mode terminal client for Blackhole")]
struct Args {
    /// LAN host URL, e.g. ws://192.168.1.10:9527
    #[arg(long)]
    url: Option<String>,

    /// Relay base URL. Mutually exclusive in effect with --url: when
    /// set, connects via the relay instead of directly.
    #[arg(long)]
    relay: Option<String>,

    /// Session code, used when connecting through a relay.
    #[arg(long)]
    session: Option<String>,

    /// Bearer token for the relay URL.
    #[arg(long)]
    token: Option<String>,
}

static SIGWINCH_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigwinch(_sig: i32) {
    SIGWINCH_RECEIVED.store(true, Ordering::Relaxed);
}

/// Writes decoded STDOUT payloads straight to the real terminal; resize
/// is a no-op since the real terminal owns its own grid.
struct PassthroughEmulator;

impl TerminalEmulator for PassthroughEmulator {
    fn write(&mut self, bytes: &[u8]) {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(bytes);
        let _ = stdout.flush();
    }

    fn resize(&mut self, _cols: u16, _rows: u16, _pixel_width: u32, _pixel_height: u32) {}

    fn get_selection_text(&self) -> Option<String> {
        None
    }
}

fn terminal_size() -> Option<(u16, u16)> {
    let mut size: libc::winsize = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::ioctl(libc::STDIN_FILENO, libc::TIOCGWINSZ, &mut size) };
    if ret == 0 && size.ws_row > 0 && size.ws_col > 0 {
        Some((size.ws_row, size.ws_col))
    } else {
        None
    }
}

struct RawModeGuard {
    original: Option<termios::Termios>,
}

impl RawModeGuard {
    fn enable() -> Self {
        let fd = unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) };
        let original = termios::tcgetattr(fd).ok();
        if let Some(ref orig) = original {
            let mut raw = orig.clone();
            termios::cfmakeraw(&mut raw);
            let _ = termios::tcsetattr(fd, SetArg::TCSANOW, &raw);
        }
        Self { original }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Some(ref orig) = self.original {
            let fd = unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) };
            let _ = termios::tcsetattr(fd, SetArg::TCSANOW, orig);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let url = match &args.relay {
        Some(base) => blackhole_client::transport::relay_url(base, args.session.as_deref(), args.token.as_deref())
            .context("invalid relay URL")?,
        None => {
            let base = args.url.context("either --url or --relay is required")?;
            blackhole_client::transport::lan_url(&base)
        }
    };

    unsafe {
        signal::signal(Signal::SIGWINCH, SigHandler::Handler(handle_sigwinch))
            .context("failed to install SIGWINCH handler")?;
    }

    let _raw_mode = RawModeGuard::enable();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<TransportEvent>();
    let transport = Transport::spawn(url, true, event_tx);

    let mut coordinator: Coordinator<PassthroughEmulator, fn() -> PassthroughEmulator> =
        Coordinator::new(|| PassthroughEmulator);

    let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    std::thread::spawn(move || {
        use std::io::Read;
        let stdin = std::io::stdin();
        let mut lock = stdin.lock();
        let mut buf = [0u8; 4096];
        loop {
            match lock.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if stdin_tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut winsize_tick = tokio::time::interval(Duration::from_millis(50));

    loop {
        tokio::select! {
            bytes = stdin_rx.recv() => {
                let Some(bytes) = bytes else { break };
                if let Some(session_id) = coordinator.active_session() {
                    transport.send(Frame::Stdin { session_id: session_id.to_string(), payload: bytes });
                }
            }
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    TransportEvent::Frame(frame) => handle_frame(&mut coordinator, &transport, frame),
                    TransportEvent::StateChanged(state) => info!(?state, "transport state changed"),
                    TransportEvent::HeartbeatTimeout => warn!("heartbeat timeout, reconnecting"),
                }
            }
            _ = winsize_tick.tick() => {
                if SIGWINCH_RECEIVED.swap(false, Ordering::Relaxed) {
                    send_resize(&mut coordinator, &transport);
                }
            }
        }
    }

    Ok(())
}

fn handle_frame(
    coordinator: &mut Coordinator<PassthroughEmulator, fn() -> PassthroughEmulator>,
    transport: &Transport,
    frame: Frame,
) {
    match frame {
        Frame::SessionList { sessions } => {
            for action in coordinator.on_session_list(sessions) {
                apply_action(transport, action);
            }
            send_resize(coordinator, transport);
        }
        Frame::SessionCreated { session_id } => {
            for action in coordinator.on_session_created(session_id) {
                apply_action(transport, action);
            }
            send_resize(coordinator, transport);
        }
        Frame::SessionClosed { session_id } => {
            coordinator.on_session_closed(&session_id);
        }
        Frame::Stdout { session_id, payload } => {
            coordinator.on_stdout(&session_id, &payload);
        }
        Frame::Error { code, message } => {
            warn!(code = %code, message = %message, "host reported an error");
        }
        Frame::Unsupported { version } => {
            warn!(version, "host rejected our protocol version");
        }
        _ => {}
    }
}

fn apply_action(transport: &Transport, action: CoordinatorAction) {
    match action {
        CoordinatorAction::Send(frame) => transport.send(frame),
        CoordinatorAction::ScheduleResize(_) => {}
    }
}

fn send_resize(coordinator: &mut Coordinator<PassthroughEmulator, fn() -> PassthroughEmulator>, transport: &Transport) {
    let Some(session_id) = coordinator.active_session().map(str::to_string) else { return };
    let Some((rows, cols)) = terminal_size() else { return };
    if let Some(frame) =
        coordinator.run_resize(&session_id, cols as f64, rows as f64, 0.0, 0.0, 1.0, 1.0, None)
    {
        transport.send(frame);
    }
}
