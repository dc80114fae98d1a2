//! Interactive console loop
//!
//! Two tasks share the terminal:
//! - the command loop (this future) reads stdin lines and drives the
//!   [`Session`]; it runs on the caller's task because the output stream
//!   is not `Send`
//! - the presentation task owns the [`StatusView`] and redraws stdout on
//!   every [`ScribeEvent`], on UI messages from the command loop, and on a
//!   slow tick while playing

use crate::audio::source::{AudioSource, DecodedSource};
use crate::console::commands::Command;
use crate::console::view::{StatusView, TransportSnapshot};
use crate::error::{Error, Result};
use crate::playback::session::Session;
use crate::playback::transport::TransportState;
use cscribe_common::config::ControlConfig;
use cscribe_common::events::ScribeEvent;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Status redraw interval while a song plays
const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Screen width used for centering
const SCREEN_WIDTH: usize = 72;

/// Requests from the command loop to the presentation task
#[derive(Debug)]
enum UiMessage {
    /// Track a newly loaded transport
    Transport(Arc<TransportState>),
    Mode(String),
    ToggleHelp,
    Redraw,
    Shutdown,
}

/// Console front end over a [`Session`]
pub struct ConsoleApp {
    session: Session,
    controls: ControlConfig,
    ui_tx: mpsc::UnboundedSender<UiMessage>,
    presenter: Option<JoinHandle<()>>,
}

impl ConsoleApp {
    /// Build the app and start its presentation task
    pub fn new(session: Session, controls: ControlConfig) -> Self {
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let events = session.bus().subscribe();
        let presenter = tokio::spawn(present(ui_rx, events));
        Self {
            session,
            controls,
            ui_tx,
            presenter: Some(presenter),
        }
    }

    /// Run until `q`, end of input, Ctrl-C or a device failure.
    ///
    /// # Errors
    /// Only fatal device errors are returned; everything else is shown on
    /// the mode line.
    pub async fn run(mut self, initial_file: Option<PathBuf>) -> Result<()> {
        let outcome = self.command_loop(initial_file).await;
        self.shutdown().await;
        outcome
    }

    async fn command_loop(&mut self, initial_file: Option<PathBuf>) -> Result<()> {
        let mut events = self.session.bus().subscribe();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        self.send(UiMessage::Redraw);
        if let Some(path) = initial_file {
            self.open(&path).await?;
        }

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => {
                            info!("End of input, quitting");
                            return Ok(());
                        }
                        Err(e) => {
                            warn!("Failed to read console input: {}", e);
                            return Ok(());
                        }
                    };
                    match Command::parse(&line) {
                        Ok(Command::Quit) => {
                            info!("Quit requested");
                            return Ok(());
                        }
                        Ok(command) => self.execute(command).await?,
                        Err(e) => self.send(UiMessage::Mode(e.to_string())),
                    }
                }
                event = events.recv() => {
                    if let Some(outcome) = on_bus_event(event) {
                        return outcome;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl-C, quitting");
                    return Ok(());
                }
            }
        }
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        debug!("Command: {:?}", command);

        match command {
            Command::Open(path) => return self.open(&path).await,
            Command::Help => {
                self.send(UiMessage::ToggleHelp);
                return Ok(());
            }
            Command::Redraw => {
                self.send(UiMessage::Redraw);
                return Ok(());
            }
            _ => {}
        }

        let Some(controller) = self.session.controller() else {
            self.send(UiMessage::Mode("No song loaded. Type o <path> to open one.".to_string()));
            return Ok(());
        };

        match command {
            Command::JumpToMark => controller.jump_to_mark(),
            Command::TempoDown => controller.adjust_tempo(-self.controls.tempo_step),
            Command::TempoUp => controller.adjust_tempo(self.controls.tempo_step),
            Command::Back => controller.seek_relative(-self.controls.seek_step_seconds),
            Command::Forward => controller.seek_relative(self.controls.seek_step_seconds),
            Command::SetMark => controller.set_mark_here(),
            Command::SeekTo(seconds) => controller.seek_to(seconds),
            Command::Open(_) | Command::Help | Command::Redraw | Command::Quit => {}
        }
        Ok(())
    }

    /// Decode on the blocking pool while the current song keeps playing
    async fn open(&mut self, path: &Path) -> Result<()> {
        if let Err(e) = self.session.begin_load() {
            self.send(UiMessage::Mode(e.to_string()));
            return Ok(());
        }
        self.send(UiMessage::Mode(format!("Loading {}...", path.display())));

        let decode_path = path.to_path_buf();
        let opened = tokio::task::spawn_blocking(move || DecodedSource::open(&decode_path))
            .await
            .map_err(|e| Error::SourceOpen {
                path: path.to_path_buf(),
                reason: format!("Decoder task failed: {}", e),
            })
            .and_then(|decoded| decoded)
            .map(|source| Box::new(source) as Box<dyn AudioSource>);

        match self.session.finish_load(path, opened) {
            Ok(()) => {
                if let Some(transport) = self.session.transport() {
                    self.send(UiMessage::Transport(Arc::clone(transport)));
                }
                self.send(UiMessage::Mode(String::new()));
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            // LoadFailed already reached the presentation task
            Err(_) => Ok(()),
        }
    }

    fn send(&self, message: UiMessage) {
        // Presentation task only ends on shutdown
        let _ = self.ui_tx.send(message);
    }

    async fn shutdown(&mut self) {
        self.session.stop();
        self.send(UiMessage::Shutdown);
        if let Some(presenter) = self.presenter.take() {
            if let Err(e) = presenter.await {
                warn!("Presentation task ended abnormally: {}", e);
            }
        }
    }
}

/// What a bus event means for the command loop: `Some` ends the loop
fn on_bus_event(event: std::result::Result<ScribeEvent, broadcast::error::RecvError>) -> Option<Result<()>> {
    match event {
        Ok(ScribeEvent::AudioDeviceError { total_errors, .. }) => Some(Err(Error::AudioOutput(format!(
            "Output device failed ({} stream errors)",
            total_errors
        )))),
        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => None,
        Err(broadcast::error::RecvError::Closed) => Some(Ok(())),
    }
}

/// Presentation task body
async fn present(mut ui_rx: mpsc::UnboundedReceiver<UiMessage>, mut events: broadcast::Receiver<ScribeEvent>) {
    let mut view = StatusView::new(SCREEN_WIDTH);
    let mut transport: Option<Arc<TransportState>> = None;
    let mut ticker = tokio::time::interval(TICK_INTERVAL);

    loop {
        tokio::select! {
            message = ui_rx.recv() => match message {
                Some(UiMessage::Transport(t)) => {
                    view.set_read_failures(0);
                    transport = Some(t);
                }
                Some(UiMessage::Mode(text)) if text.is_empty() => view.reset_mode_line(),
                Some(UiMessage::Mode(text)) => view.set_mode_line(text),
                Some(UiMessage::ToggleHelp) => view.toggle_help(),
                Some(UiMessage::Redraw) => {}
                Some(UiMessage::Shutdown) | None => break,
            },
            event = events.recv() => match event {
                Ok(event) => apply_event(&mut view, &event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Presentation lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                // Nothing moves on screen without a song
                if transport.is_none() {
                    continue;
                }
            }
        }

        draw(&view, transport.as_deref());
    }

    debug!("Presentation task stopped");
}

fn apply_event(view: &mut StatusView, event: &ScribeEvent) {
    match event {
        ScribeEvent::LoadFailed { message, .. } => view.set_mode_line(message.clone()),
        ScribeEvent::RealtimeReadFailure { total_failures, .. } => view.set_read_failures(*total_failures),
        ScribeEvent::AudioDeviceError { .. } => view.set_mode_line("Audio device failed, quitting."),
        ScribeEvent::SongLoaded { .. }
        | ScribeEvent::TransportChanged { .. }
        | ScribeEvent::EngineStateChanged { .. } => {}
    }
}

fn draw(view: &StatusView, transport: Option<&TransportState>) {
    let snapshot = transport.map(TransportSnapshot::capture);
    let screen = view.render(snapshot.as_ref());

    let mut stdout = std::io::stdout().lock();
    // Clear and home, then the full screen
    let result = writeln!(stdout, "\x1b[2J\x1b[H{}", screen).and_then(|_| stdout.flush());
    if let Err(e) = result {
        warn!("Failed to draw console: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sink::AudioSink;
    use crate::playback::engine::PlaybackEngine;
    use crate::playback::health::RealtimeHealth;
    use crate::playback::session::SinkOpener;
    use cscribe_common::events::{EngineState, EventBus};
    use std::sync::Mutex;

    #[test]
    fn test_device_error_ends_loop_with_fatal_error() {
        let outcome = on_bus_event(Ok(ScribeEvent::AudioDeviceError {
            total_errors: 3,
            timestamp: chrono::Utc::now(),
        }));
        let err = outcome.unwrap().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("3 stream errors"));
    }

    #[test]
    fn test_other_events_keep_loop_running() {
        let refresh = ScribeEvent::TransportChanged {
            position_ms: 0,
            mark_ms: None,
            tempo: 1.0,
            timestamp: chrono::Utc::now(),
        };
        assert!(on_bus_event(Ok(refresh)).is_none());
        assert!(on_bus_event(Err(broadcast::error::RecvError::Lagged(4))).is_none());
        assert!(matches!(
            on_bus_event(Err(broadcast::error::RecvError::Closed)),
            Some(Ok(()))
        ));
    }

    struct ParkedSink;

    impl AudioSink for ParkedSink {
        fn start(&mut self, _engine: PlaybackEngine) -> Result<()> {
            Ok(())
        }
        fn stop(&mut self) -> Result<()> {
            Ok(())
        }
        fn device_name(&self) -> String {
            "parked".to_string()
        }
    }

    #[tokio::test]
    async fn test_stream_error_while_playing_reaches_command_loop() {
        let health_slot: Arc<Mutex<Option<Arc<RealtimeHealth>>>> = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&health_slot);
        let opener: SinkOpener = Box::new(move |_spec, health| {
            *captured.lock().unwrap() = Some(health);
            Ok(Box::new(ParkedSink) as Box<dyn AudioSink>)
        });
        let bus = EventBus::new(64);
        let mut session = Session::new(bus.clone(), opener).with_monitor_interval(Duration::from_millis(5));
        let mut events = bus.subscribe();

        session.begin_load().unwrap();
        let source = DecodedSource::from_samples("etude", vec![0.0; 100], 1, 10).unwrap();
        session
            .finish_load(Path::new("etude"), Ok(Box::new(source) as Box<dyn AudioSource>))
            .unwrap();
        assert_eq!(session.state(), EngineState::Playing);

        // What cpal's error callback does on a stream failure
        health_slot.lock().unwrap().as_ref().unwrap().record_device_error();

        let outcome = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(outcome) = on_bus_event(events.recv().await) {
                    return outcome;
                }
            }
        })
        .await
        .expect("device error should end the loop within timeout");
        assert!(matches!(outcome, Err(Error::AudioOutput(_))));
    }
}
