//! Terminal setup and the interactive event loop.

use crate::shell::app::App;
use crate::shell::view;
use crate::transport::Transport;
use anyhow::Result;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// How often the input thread checks whether the UI has gone away.
const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run the terminal UI until the operator quits.
pub async fn run<T: Transport>(app: &mut App<T>) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Draw, then wait for either a key or the in-flight completion.
async fn event_loop<T: Transport>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App<T>,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<Event>(64);
    tokio::task::spawn_blocking(move || forward_input(tx));

    loop {
        terminal.draw(|frame| view::draw(frame, app))?;

        if app.should_quit() {
            debug!("Quit requested");
            return Ok(());
        }

        let busy = app.is_busy();
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => app.handle_event(event),
                None => return Ok(()),
            },
            Some(completion) = app.dispatcher_mut().completion(), if busy => {
                app.on_completion(completion);
            }
        }
    }
}

/// Blocking terminal reader. Exits once the receiver is dropped.
fn forward_input(tx: mpsc::Sender<Event>) {
    while !tx.is_closed() {
        match event::poll(INPUT_POLL_INTERVAL) {
            Ok(true) => match event::read() {
                Ok(event) => {
                    if tx.blocking_send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read terminal event: {}", e);
                    break;
                }
            },
            Ok(false) => {}
            Err(e) => {
                warn!("Failed to poll terminal: {}", e);
                break;
            }
        }
    }
}
