//! partty Viewer Entry Point
//!
//! Usage:
//!   partty [OPTIONS]
//!
//! Options:
//!   --host <HOST>      Daemon host (default: 127.0.0.1)
//!   --port <PORT>      Daemon port (default: 2222)
//!   --plain            Write raw ANSI frames instead of using the alternate screen
//!   --log-file <FILE>  Write logs to a file

use std::io::{self, IsTerminal};
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::{
    cursor, execute,
    event::EventStream,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::net::TcpStream;

use partty_core::transport::{write_message, FramedReader};
use partty_core::{ClientEvent, ServerMessage, TerminalInfo, PROTOCOL_VERSION};
use partty_viewer::{App, Screen};

/// partty - watch the party parrot served by a partty daemon
#[derive(Parser, Debug)]
#[command(name = "partty")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Daemon host
    #[arg(long, env = "PARTTY_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Daemon port
    #[arg(short = 'p', long, env = "PARTTY_PORT", default_value_t = 2222)]
    port: u16,

    /// Write raw ANSI frames instead of using the alternate screen
    #[arg(long)]
    plain: bool,

    /// Write logs to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

/// Logs go to a file when asked; the terminal belongs to the animation
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let Some(path) = log_file else {
        return Ok(());
    };

    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("partty_viewer=info,partty_core=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

fn is_interactive() -> bool {
    io::stdin().is_terminal() && io::stdout().is_terminal()
}

/// What the server needs to know about this terminal
fn terminal_info(interactive: bool) -> Option<TerminalInfo> {
    if !interactive {
        return None;
    }
    let (cols, rows) = crossterm::terminal::size().unwrap_or((80, 24));
    Some(TerminalInfo {
        term: std::env::var("TERM").unwrap_or_else(|_| "unknown".to_string()),
        cols,
        rows,
    })
}

/// Set up panic hook to restore terminal
fn install_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, cursor::Show);
        original_hook(panic_info);
    }));
}

fn enter_screen(plain: bool) -> Result<Screen> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    if plain {
        execute!(stdout, cursor::Hide)?;
        return Ok(Screen::Plain(Box::new(tokio::io::stdout())));
    }

    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.hide_cursor()?;
    terminal.clear()?;
    Ok(Screen::Tui(terminal))
}

fn restore_screen(screen: Screen) -> Result<()> {
    disable_raw_mode()?;
    match screen {
        Screen::Tui(mut terminal) => {
            execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
            terminal.show_cursor()?;
        }
        Screen::Plain(_) => execute!(io::stdout(), cursor::Show)?,
    }
    Ok(())
}

/// Show why the session ended after the screen is restored
fn print_goodbye(app: &App) {
    if let Some(reason) = app.goodbye() {
        println!("\n\x1b[35mpartty:\x1b[0m {reason}");
    }
}

/// Send the handshake and wait for the server's answer
async fn handshake<R, W>(
    reader: &mut FramedReader<R>,
    writer: &mut W,
    terminal: Option<TerminalInfo>,
) -> Result<App>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    write_message(
        writer,
        &ClientEvent::Handshake {
            protocol_version: PROTOCOL_VERSION,
            terminal,
        },
    )
    .await
    .context("Failed to send handshake")?;

    match reader.next::<ServerMessage>().await? {
        Some(ServerMessage::Welcome {
            session_id,
            tick_ms,
        }) => {
            tracing::info!(session_id, tick_ms, "Session started");
            Ok(App::new(session_id, tick_ms))
        }
        Some(ServerMessage::Rejected { reason }) => bail!("{reason}"),
        Some(other) => bail!("Unexpected reply to handshake: {other:?}"),
        None => bail!("Server closed the connection during the handshake"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;

    let interactive = is_interactive();

    let stream = TcpStream::connect((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("Failed to connect to {}:{}", args.host, args.port))?;
    stream.set_nodelay(true)?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = FramedReader::new(read_half);

    let mut app = handshake(&mut reader, &mut write_half, terminal_info(interactive)).await?;
    if !interactive {
        bail!("partty requires an active terminal");
    }

    install_panic_hook();
    let mut screen = enter_screen(args.plain)?;

    let result = partty_viewer::run(
        &mut app,
        &mut screen,
        EventStream::new(),
        &mut reader,
        &mut write_half,
    )
    .await;

    restore_screen(screen)?;
    result?;
    print_goodbye(&app);
    Ok(())
}
