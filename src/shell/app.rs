//! Shell state and key handling, independent of the terminal.

use crate::catalog::Catalog;
use crate::config::ConnectionConfig;
use crate::dispatch::{Completion, ControlId, Dispatcher, SendRequest};
use crate::shell::rows::RowModel;
use crate::transcript::Transcript;
use crate::transport::{SendResult, Transport};
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::{debug, info};
use tui_input::backend::crossterm::EventHandler;
use tui_input::Input;

/// Status line text when nothing is in flight.
pub const READY: &str = "Ready";

/// Which widget receives typed keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Rows,
    Host,
    Port,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::Rows => Focus::Host,
            Focus::Host => Focus::Port,
            Focus::Port => Focus::Rows,
        }
    }

    fn prev(self) -> Self {
        match self {
            Focus::Rows => Focus::Port,
            Focus::Host => Focus::Rows,
            Focus::Port => Focus::Host,
        }
    }
}

/// Operator-editable connection settings, read on every send.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: Input,
    pub port: Input,
    pub auto_newline: bool,
}

impl Settings {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            host: Input::new(config.host.clone()),
            port: Input::new(config.port.to_string()),
            auto_newline: config.auto_newline,
        }
    }

    /// Port field as a valid TCP port.
    pub fn port(&self) -> Option<u16> {
        self.port.value().trim().parse::<u16>().ok().filter(|p| *p != 0)
    }
}

/// Everything the terminal UI draws.
pub struct App<T: Transport> {
    rows: RowModel,
    page: usize,
    selected: Option<usize>,
    focus: Focus,
    settings: Settings,
    dispatcher: Dispatcher<T>,
    transcript: Transcript,
    warning: Option<String>,
    status: String,
    scroll_back: u16,
    quit: bool,
}

impl<T: Transport> App<T> {
    pub fn new(catalog: &Catalog, connection: &ConnectionConfig, transport: T) -> Self {
        let rows = RowModel::from_catalog(catalog);
        let selected = rows.first_command(0);
        Self {
            rows,
            page: 0,
            selected,
            focus: Focus::Rows,
            settings: Settings::from_config(connection),
            dispatcher: Dispatcher::new(transport),
            transcript: Transcript::new(),
            warning: None,
            status: READY.to_string(),
            scroll_back: 0,
            quit: false,
        }
    }

    pub fn rows(&self) -> &RowModel {
        &self.rows
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Lines scrolled up from the bottom of the transcript.
    pub fn scroll_back(&self) -> u16 {
        self.scroll_back
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn is_busy(&self) -> bool {
        self.dispatcher.is_busy()
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<T> {
        &mut self.dispatcher
    }

    /// Whether the send control is usable right now.
    pub fn control_enabled(&self, control: ControlId) -> bool {
        self.dispatcher.active_control() != Some(control)
            && self.rows.find(control).is_some_and(|row| row.has_command())
    }

    /// Handle one terminal event.
    pub fn handle_event(&mut self, event: Event) {
        if let Event::Key(key) = event {
            if key.kind == KeyEventKind::Press {
                self.handle_key(key);
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        if ctrl && key.code == KeyCode::Char('c') {
            self.quit = true;
            return;
        }

        if self.warning.is_some() {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter) {
                self.warning = None;
            }
            return;
        }

        match key.code {
            KeyCode::Esc => self.quit = true,
            KeyCode::Char('n') if ctrl => {
                self.settings.auto_newline = !self.settings.auto_newline;
                debug!("Auto newline: {}", self.settings.auto_newline);
            }
            KeyCode::Char('l') if ctrl => self.clear_transcript(),
            KeyCode::Tab => self.focus = self.focus.next(),
            KeyCode::BackTab => self.focus = self.focus.prev(),
            KeyCode::PageUp => {
                let max = u16::try_from(self.transcript.row_count()).unwrap_or(u16::MAX);
                self.scroll_back = self.scroll_back.saturating_add(5).min(max);
            }
            KeyCode::PageDown => self.scroll_back = self.scroll_back.saturating_sub(5),
            _ => match self.focus {
                Focus::Rows => self.handle_rows_key(key, ctrl),
                Focus::Host => self.handle_host_key(key),
                Focus::Port => self.handle_port_key(key),
            },
        }
    }

    fn handle_rows_key(&mut self, key: KeyEvent, ctrl: bool) {
        match key.code {
            KeyCode::Left if ctrl => self.switch_page(false),
            KeyCode::Right if ctrl => self.switch_page(true),
            KeyCode::Up => self.step_row(false),
            KeyCode::Down => self.step_row(true),
            KeyCode::Enter => self.send_selected(),
            _ => {
                if let Some(row) = self.selected {
                    if let Some(input) = self.rows.input_mut(self.page, row) {
                        input.handle_event(&Event::Key(key));
                    }
                }
            }
        }
    }

    fn handle_host_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Enter {
            self.focus = Focus::Rows;
        } else {
            self.settings.host.handle_event(&Event::Key(key));
        }
    }

    fn handle_port_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => self.focus = Focus::Rows,
            KeyCode::Char(c) if !c.is_ascii_digit() => {}
            _ => {
                self.settings.port.handle_event(&Event::Key(key));
            }
        }
    }

    fn switch_page(&mut self, forward: bool) {
        let count = self.rows.pages().len();
        if count == 0 {
            return;
        }
        self.page = if forward {
            (self.page + 1) % count
        } else {
            (self.page + count - 1) % count
        };
        self.selected = self.rows.first_command(self.page);
    }

    fn step_row(&mut self, forward: bool) {
        if let Some(row) = self.selected {
            self.selected = self.rows.step(self.page, row, forward);
        }
    }

    /// Send the selected row of the current page.
    pub fn send_selected(&mut self) {
        let control = self
            .selected
            .and_then(|row| self.rows.row(self.page, row))
            .and_then(|row| row.control);
        if let Some(control) = control {
            self.send(control);
        }
    }

    /// Send the command held by `control`.
    pub fn send(&mut self, control: ControlId) {
        let Some(payload) = self.rows.find(control).and_then(|row| row.text()) else {
            return;
        };
        let payload = payload.to_string();

        // An unparsable port goes through as 0 so the dispatcher rejects it
        // after the busy, command and host checks.
        let request = SendRequest {
            host: self.settings.host.value().to_string(),
            port: self.settings.port().unwrap_or(0),
            payload,
            control,
            auto_newline: self.settings.auto_newline,
        };

        match self.dispatcher.dispatch(request) {
            Ok(sent) => {
                self.transcript.on_sent(&sent.payload);
                self.scroll_back = 0;
                if let Some(target) = self.dispatcher.active_target() {
                    self.status = format!("Sending to {}...", target);
                }
            }
            Err(e) => self.warn(e.to_string()),
        }
    }

    /// Render the result and re-enable the originating control.
    pub fn on_completion(&mut self, completion: Completion) {
        match &completion.result {
            SendResult::Success(response) => self.transcript.on_success(response),
            SendResult::Failure(reason) => self.transcript.on_failure(reason),
        }
        self.scroll_back = 0;
        self.status = READY.to_string();
        debug!("Control {} re-enabled", completion.control);
    }

    pub fn clear_transcript(&mut self) {
        self.transcript.clear();
        self.scroll_back = 0;
    }

    fn warn(&mut self, message: String) {
        info!("Warning: {}", message);
        self.warning = Some(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::parse;
    use crate::dispatch::tests::FakeTransport;
    use crate::transcript::Category;
    use crate::transport::{TcpTransport, TransportOptions};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn app<T: Transport>(transport: T) -> App<T> {
        let catalog = parse("// A\n*IDN?\n\n*RST\n// B\nOUTP ON");
        App::new(&catalog, &ConnectionConfig::default(), transport)
    }

    #[tokio::test]
    async fn test_send_then_complete() {
        let mut app = app(FakeTransport::answering(SendResult::Success(
            "ACME,DMM\n".to_string(),
        )));

        app.handle_key(key(KeyCode::Enter));
        assert!(app.is_busy());
        assert!(!app.control_enabled(ControlId(0)));
        assert!(app.control_enabled(ControlId(1)));
        assert!(app.status().starts_with("Sending to 169.254.156.89:5025"));

        let completion = app.dispatcher_mut().completion().await.unwrap();
        app.on_completion(completion);

        let lines = app.transcript().lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].category, Category::Sent);
        assert_eq!(lines[0].text, "*IDN?");
        assert_eq!(lines[1].category, Category::Success);
        assert_eq!(lines[1].text, "ACME,DMM");
        assert_eq!(app.status(), READY);
        assert!(app.control_enabled(ControlId(0)));
    }

    #[tokio::test]
    async fn test_second_send_while_busy_warns_once() {
        let mut app = app(FakeTransport::held());

        app.handle_key(key(KeyCode::Enter));
        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Enter));

        assert_eq!(app.warning(), Some("Operation in progress!"));
        assert_eq!(app.transcript().len(), 1);

        // Dismiss, let the first finish.
        app.handle_key(key(KeyCode::Esc));
        assert!(app.warning().is_none());
        assert!(!app.should_quit());

        app.dispatcher_mut().transport_for_tests().gate.add_permits(1);
        let completion = app.dispatcher_mut().completion().await.unwrap();
        assert_eq!(completion.control, ControlId(0));
        app.on_completion(completion);

        assert_eq!(
            app.dispatcher_mut()
                .transport_for_tests()
                .calls
                .load(Ordering::SeqCst),
            1
        );
        assert_eq!(app.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_host_warns_without_transcript() {
        let mut app = app(FakeTransport::held());
        app.handle_key(key(KeyCode::Tab));
        for _ in 0..20 {
            app.handle_key(key(KeyCode::Backspace));
        }
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.focus(), Focus::Rows);

        app.handle_key(key(KeyCode::Enter));

        assert_eq!(app.warning(), Some("Please enter IP address!"));
        assert!(app.transcript().is_empty());
        assert!(!app.is_busy());
    }

    #[tokio::test]
    async fn test_port_field_accepts_digits_only() {
        let mut app = app(FakeTransport::held());
        app.handle_key(key(KeyCode::BackTab));
        assert_eq!(app.focus(), Focus::Port);

        for _ in 0..5 {
            app.handle_key(key(KeyCode::Backspace));
        }
        app.handle_key(key(KeyCode::Char('x')));
        assert_eq!(app.settings().port.value(), "");
        assert_eq!(app.settings().port(), None);

        app.handle_key(key(KeyCode::Enter));
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.warning(), Some("Port must be between 1 and 65535!"));
        assert!(app.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_editing_row_changes_payload() {
        let mut app = app(FakeTransport::answering(SendResult::Success(String::new())));
        app.handle_key(key(KeyCode::Char('?')));
        app.handle_key(ctrl('n'));
        assert!(!app.settings().auto_newline);

        app.handle_key(key(KeyCode::Enter));
        let completion = app.dispatcher_mut().completion().await.unwrap();
        app.on_completion(completion);

        let payloads = app
            .dispatcher_mut()
            .transport_for_tests()
            .payloads
            .lock()
            .unwrap()
            .clone();
        assert_eq!(payloads, vec!["*IDN??"]);
        // Empty response still shows up.
        assert_eq!(app.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_page_switch_and_clear() {
        let mut app = app(FakeTransport::held());
        app.handle_key(KeyEvent::new(KeyCode::Right, KeyModifiers::CONTROL));
        assert_eq!(app.page(), 1);
        assert_eq!(app.selected(), Some(0));
        app.handle_key(KeyEvent::new(KeyCode::Right, KeyModifiers::CONTROL));
        assert_eq!(app.page(), 0);

        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.transcript().len(), 1);
        app.handle_key(ctrl('l'));
        app.handle_key(ctrl('l'));
        assert!(app.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_refused_connection_renders_one_error_line() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connection = ConnectionConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..ConnectionConfig::default()
        };
        let transport = TcpTransport::new(TransportOptions {
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_millis(100),
        });
        let mut app = App::new(&parse("*IDN?"), &connection, transport);

        app.handle_key(key(KeyCode::Enter));
        let completion = app.dispatcher_mut().completion().await.unwrap();
        app.on_completion(completion);

        let errors: Vec<_> = app
            .transcript()
            .lines()
            .iter()
            .filter(|l| l.category == Category::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].text.contains("refused"));
        assert_eq!(errors[0].timestamp.len(), 8);
        assert!(app.control_enabled(ControlId(0)));
        assert!(!app.is_busy());
    }

    #[tokio::test]
    async fn test_ctrl_c_quits_even_with_warning() {
        let mut app = app(FakeTransport::held());
        app.handle_key(key(KeyCode::Enter));
        app.handle_key(key(KeyCode::Enter));
        assert!(app.warning().is_some());
        app.handle_key(ctrl('c'));
        assert!(app.should_quit());
    }
}
