//! The interactive monitoring session.
//!
//! Three activities run concurrently:
//!
//! - **ingest** pushes feed records into the [`SnapshotAggregator`]
//! - **render** redraws the tables every interval
//! - **input** (this session) waits for keys and runs commands
//!
//! Commands that prompt for input pause the render task first, so the
//! prompt is never overwritten by a tick. Pausing is a rendezvous: the
//! session sends [`RenderSignal::Pause`] and waits until render has parked;
//! resuming hands render the updated [`MonitoringState`] and triggers an
//! immediate redraw.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::KeyEvent;
use parking_lot::Mutex;
use ratatui::backend::Backend;
use ratatui::Terminal;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::data::{parse_interval, MonitoringState, SnapshotAggregator, Visibility};
use crate::error::IotopError;
use crate::events::{command_for, Command, KeyEvents};
use crate::feed::Feed;
use crate::settings::DecodePolicy;
use crate::ui::{LineEditor, Screen, Theme};

/// How long a rejected input message stays on screen.
pub const ERROR_DWELL: Duration = Duration::from_secs(2);

const SIGNAL_BUFFER: usize = 4;

const FILTER_PROMPT: &str = "Show which nodes (edge,src,box,sink; blank for all): ";

/// Messages from the session to the render task.
#[derive(Debug)]
pub enum RenderSignal {
    /// Park after acknowledging.
    Pause(oneshot::Sender<()>),
    /// Adopt the state and redraw.
    Resume(MonitoringState),
}

/// Sending half of the render rendezvous.
///
/// A detached control has no render task; pause and resume do nothing.
#[derive(Debug, Clone, Default)]
struct RenderControl {
    signals: Option<mpsc::Sender<RenderSignal>>,
}

impl RenderControl {
    fn attached(signals: mpsc::Sender<RenderSignal>) -> Self {
        Self {
            signals: Some(signals),
        }
    }

    /// Returns once render has parked, or has already stopped.
    async fn pause(&self) {
        let Some(signals) = &self.signals else {
            return;
        };
        let (ack, parked) = oneshot::channel();
        if signals.send(RenderSignal::Pause(ack)).await.is_ok() {
            let _ = parked.await;
        }
    }

    async fn resume(&self, state: MonitoringState) {
        if let Some(signals) = &self.signals {
            let _ = signals.send(RenderSignal::Resume(state)).await;
        }
    }
}

/// Draw the tables every `state.interval` until the signal channel closes.
pub async fn render<B: Backend>(
    screen: Arc<Mutex<Screen<B>>>,
    aggregator: Arc<SnapshotAggregator>,
    mut state: MonitoringState,
    mut signals: mpsc::Receiver<RenderSignal>,
) -> Result<(), IotopError> {
    loop {
        let body = aggregator.flush(&state);
        screen.lock().draw_dashboard(&state, body)?;

        tokio::select! {
            _ = tokio::time::sleep(state.interval) => {}
            signal = signals.recv() => match signal {
                Some(RenderSignal::Pause(ack)) => {
                    let _ = ack.send(());
                    debug!("render paused");
                    match wait_for_resume(&mut signals).await {
                        Some(next) => state = next,
                        None => return Ok(()),
                    }
                }
                Some(RenderSignal::Resume(next)) => state = next,
                None => return Ok(()),
            }
        }
    }
}

async fn wait_for_resume(signals: &mut mpsc::Receiver<RenderSignal>) -> Option<MonitoringState> {
    loop {
        match signals.recv().await? {
            RenderSignal::Resume(state) => return Some(state),
            RenderSignal::Pause(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

/// Push feed records into `aggregator` until the feed fails or closes.
///
/// Always ends with the error that stopped it.
pub async fn ingest(
    mut feed: Feed,
    aggregator: Arc<SnapshotAggregator>,
    policy: DecodePolicy,
) -> IotopError {
    while let Some(event) = feed.recv().await {
        match event.and_then(|record| aggregator.push(record)) {
            Ok(()) => {}
            Err(IotopError::Decode(e)) if policy == DecodePolicy::Skip => {
                warn!(error = %e, "skipping malformed record");
            }
            Err(e) => return e,
        }
    }
    IotopError::Feed("monitoring stream is closed".to_string())
}

fn ingest_outcome(res: Result<IotopError, JoinError>) -> Result<(), IotopError> {
    Err(res.unwrap_or_else(|e| IotopError::Feed(format!("ingest task failed, {}", e))))
}

fn render_outcome(res: Result<Result<(), IotopError>, JoinError>) -> Result<(), IotopError> {
    match res {
        Ok(done) => done,
        Err(e) => Err(IotopError::Terminal(io::Error::other(e))),
    }
}

/// Outcome of one key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// A dashboard bound to a terminal.
pub struct Session<B: Backend> {
    screen: Arc<Mutex<Screen<B>>>,
    aggregator: Arc<SnapshotAggregator>,
    state: MonitoringState,
    editor: LineEditor,
    control: RenderControl,
}

impl<B: Backend + Send + 'static> Session<B> {
    pub fn new(terminal: Terminal<B>, state: MonitoringState, theme: Theme) -> Self {
        Self {
            screen: Arc::new(Mutex::new(Screen::new(terminal, theme))),
            aggregator: Arc::new(SnapshotAggregator::new()),
            state,
            editor: LineEditor::new(),
            control: RenderControl::default(),
        }
    }

    pub fn state(&self) -> &MonitoringState {
        &self.state
    }

    pub fn screen(&self) -> &Arc<Mutex<Screen<B>>> {
        &self.screen
    }

    pub fn aggregator(&self) -> &Arc<SnapshotAggregator> {
        &self.aggregator
    }

    /// Run until the user quits or something fails.
    ///
    /// Returns `Ok(())` on quit and the first fatal error otherwise.
    pub async fn run(
        mut self,
        feed: Feed,
        mut keys: KeyEvents,
        policy: DecodePolicy,
    ) -> Result<(), IotopError> {
        info!(
            feed = feed.description(),
            interval = ?self.state.interval,
            filter = %self.state.visibility,
            "session started"
        );

        let (signals, receiver) = mpsc::channel(SIGNAL_BUFFER);
        self.control = RenderControl::attached(signals);

        let mut ingest_task = tokio::spawn(ingest(feed, self.aggregator.clone(), policy));
        let mut render_task = tokio::spawn(render(
            self.screen.clone(),
            self.aggregator.clone(),
            self.state.clone(),
            receiver,
        ));

        let mut render_joined = false;
        let result = loop {
            tokio::select! {
                res = &mut ingest_task => break ingest_outcome(res),
                res = &mut render_task => {
                    render_joined = true;
                    break render_outcome(res);
                }
                key = keys.next_key() => {
                    let key = match key {
                        Ok(key) => key,
                        Err(e) => break Err(e),
                    };
                    // Prompts wait on the user; a failed feed still ends the session.
                    tokio::select! {
                        flow = self.dispatch(key, &mut keys) => match flow {
                            Ok(Flow::Continue) => {}
                            Ok(Flow::Quit) => break Ok(()),
                            Err(e) => break Err(e),
                        },
                        res = &mut ingest_task => break ingest_outcome(res),
                        res = &mut render_task => {
                            render_joined = true;
                            break render_outcome(res);
                        }
                    }
                }
            }
        };

        ingest_task.abort();
        if !render_joined {
            // Render must be gone before the caller restores the terminal.
            render_task.abort();
            let _ = render_task.await;
        }
        match &result {
            Ok(()) => info!("session finished"),
            Err(e) => warn!(error = %e, "session ended"),
        }
        result
    }

    async fn dispatch(&mut self, key: KeyEvent, keys: &mut KeyEvents) -> Result<Flow, IotopError> {
        let Some(command) = command_for(key) else {
            return Ok(Flow::Continue);
        };
        debug!(?command, "command");
        match command {
            Command::Quit => return Ok(Flow::Quit),
            Command::ToggleMode => self.toggle_mode().await,
            Command::ChangeInterval => self.change_interval(keys).await?,
            Command::ChangeFilter => self.change_filter(keys).await?,
        }
        Ok(Flow::Continue)
    }

    /// Switch between rates and cumulative totals.
    pub async fn toggle_mode(&mut self) {
        self.control.pause().await;
        self.state.toggle_mode();
        info!(mode = self.state.mode.label(), "display mode changed");
        self.control.resume(self.state.clone()).await;
    }

    /// Prompt for a new refresh interval.
    ///
    /// Rejected input is shown for [`ERROR_DWELL`] and the interval stays
    /// unchanged. Blank input keeps the interval too.
    pub async fn change_interval(&mut self, keys: &mut KeyEvents) -> Result<(), IotopError> {
        self.control.pause().await;
        let prompt = format!("Change delay from {:?} to ", self.state.interval);
        let line = self.editor.start(&prompt, &self.screen, keys).await?;
        match parse_interval(&line) {
            Ok(Some(interval)) => {
                info!(from = ?self.state.interval, to = ?interval, "interval changed");
                self.state.interval = interval;
            }
            Ok(None) => {}
            Err(e) => self.show_error(&e).await?,
        }
        self.control.resume(self.state.clone()).await;
        Ok(())
    }

    /// Prompt for the categories to show. Blank input shows all of them.
    pub async fn change_filter(&mut self, keys: &mut KeyEvents) -> Result<(), IotopError> {
        self.control.pause().await;
        let line = self.editor.start(FILTER_PROMPT, &self.screen, keys).await?;
        match Visibility::parse(&line) {
            Ok(visibility) => {
                info!(filter = %visibility, "filter changed");
                self.state.visibility = visibility;
            }
            Err(e) => self.show_error(&e).await?,
        }
        self.control.resume(self.state.clone()).await;
        Ok(())
    }

    async fn show_error(&self, err: &IotopError) -> Result<(), IotopError> {
        warn!(error = %err, "input rejected");
        self.screen.lock().draw_message(&err.to_string())?;
        tokio::time::sleep(ERROR_DWELL).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DisplayMode;
    use crate::feed::FeedEvent;
    use crossterm::event::{Event, KeyCode, KeyModifiers};
    use ratatui::backend::TestBackend;
    use serde_json::json;
    use tokio::time::Instant;

    type Keys = mpsc::UnboundedSender<io::Result<Event>>;

    fn session() -> Session<TestBackend> {
        let terminal = Terminal::new(TestBackend::new(120, 20)).unwrap();
        Session::new(terminal, MonitoringState::new(Duration::from_secs(5)), Theme::dark())
    }

    fn keys() -> (Keys, KeyEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, KeyEvents::from_channel(rx))
    }

    fn type_line(tx: &Keys, text: &str) {
        for c in text.chars() {
            press(tx, KeyCode::Char(c));
        }
        press(tx, KeyCode::Enter);
    }

    fn press(tx: &Keys, code: KeyCode) {
        tx.send(Ok(Event::Key(KeyEvent::new(code, KeyModifiers::NONE))))
            .unwrap();
    }

    fn top_row(session: &Session<TestBackend>) -> String {
        let screen = session.screen().lock();
        let buf = screen.terminal().backend().buffer();
        (0..buf.area.width).map(|x| buf[(x, 0)].symbol()).collect()
    }

    fn source(name: &str, sent: i64, ts: i64) -> serde_json::Value {
        json!({
            "node_name": name,
            "node_type": "source",
            "state": "running",
            "output_stats": {"num_sent_total": sent, "num_dropped": 0, "outputs": {}},
            "ts": ts
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparsable_interval_is_shown_and_ignored() {
        let mut session = session();
        let (tx, mut keys) = keys();
        type_line(&tx, "abc");

        let started = Instant::now();
        session.change_interval(&mut keys).await.unwrap();

        assert_eq!(session.state().interval, Duration::from_secs(5));
        assert!(top_row(&session).contains("Unacceptable floating point"));
        assert!(started.elapsed() >= ERROR_DWELL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_below_one_second_is_rejected() {
        let mut session = session();
        let (tx, mut keys) = keys();
        type_line(&tx, "0.2");

        session.change_interval(&mut keys).await.unwrap();
        assert_eq!(session.state().interval, Duration::from_secs(5));
        assert!(top_row(&session).contains("at least 1 second"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_valid_interval_is_applied() {
        let mut session = session();
        let (tx, mut keys) = keys();
        type_line(&tx, "2.5");

        session.change_interval(&mut keys).await.unwrap();
        assert_eq!(session.state().interval, Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_interval_keeps_current() {
        let mut session = session();
        let (tx, mut keys) = keys();
        type_line(&tx, "");

        session.change_interval(&mut keys).await.unwrap();
        assert_eq!(session.state().interval, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_prompt_updates_visibility() {
        let mut session = session();
        let (tx, mut keys) = keys();
        type_line(&tx, "src,box");

        session.change_filter(&mut keys).await.unwrap();
        let visibility = session.state().visibility;
        assert!(visibility.sources && visibility.boxes);
        assert!(!visibility.edges && !visibility.sinks);

        type_line(&tx, "");
        session.change_filter(&mut keys).await.unwrap();
        assert!(session.state().visibility.is_all());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_filter_token_keeps_visibility() {
        let mut session = session();
        let (tx, mut keys) = keys();
        type_line(&tx, "edge,bogus");

        session.change_filter(&mut keys).await.unwrap();
        assert!(session.state().visibility.is_all());
        assert!(top_row(&session).contains("Invalid node name ('bogus')"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_escape_in_filter_prompt_clears_filter() {
        let mut session = session();
        session.state.visibility = Visibility::parse("edge").unwrap();
        let (tx, mut keys) = keys();
        press(&tx, KeyCode::Char('s'));
        press(&tx, KeyCode::Esc);

        session.change_filter(&mut keys).await.unwrap();
        assert!(session.state().visibility.is_all());
    }

    #[tokio::test]
    async fn test_toggle_mode() {
        let mut session = session();
        session.toggle_mode().await;
        assert_eq!(session.state().mode, DisplayMode::Absolute);
        session.toggle_mode().await;
        assert_eq!(session.state().mode, DisplayMode::Rate);
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_parks_until_resumed() {
        let session = session();
        let (signals, receiver) = mpsc::channel(SIGNAL_BUFFER);
        let task = tokio::spawn(render(
            session.screen().clone(),
            session.aggregator().clone(),
            session.state().clone(),
            receiver,
        ));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(top_row(&session).contains("mode: rate"));

        let control = RenderControl::attached(signals);
        control.pause().await;
        session.screen().lock().draw_message("paused").unwrap();

        // A parked render does not tick over the prompt.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(top_row(&session).starts_with("paused"));

        let mut next = session.state().clone();
        next.toggle_mode();
        control.resume(next).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(top_row(&session).contains("mode: absolute"));

        drop(control);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_ingest_skips_malformed_records() {
        let (tx, rx) = mpsc::channel::<FeedEvent>(8);
        let aggregator = Arc::new(SnapshotAggregator::new());
        tx.send(Ok(json!({"bogus": true}))).await.unwrap();
        tx.send(Ok(source("src", 10, 1))).await.unwrap();
        drop(tx);

        let err = ingest(Feed::new(rx, "test".into()), aggregator.clone(), DecodePolicy::Skip).await;
        assert!(matches!(err, IotopError::Feed(_)));
        assert_eq!(aggregator.current().sources.len(), 1);
    }

    #[tokio::test]
    async fn test_strict_ingest_stops_on_malformed_record() {
        let (tx, rx) = mpsc::channel::<FeedEvent>(8);
        let aggregator = Arc::new(SnapshotAggregator::new());
        tx.send(Ok(json!({"bogus": true}))).await.unwrap();
        tx.send(Ok(source("src", 10, 1))).await.unwrap();

        let err = ingest(Feed::new(rx, "test".into()), aggregator.clone(), DecodePolicy::Abort).await;
        assert!(matches!(err, IotopError::Decode(_)));
        assert!(aggregator.current().sources.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_quits_on_q() {
        let session = session();
        let screen = session.screen().clone();
        let (feed_tx, feed_rx) = mpsc::channel::<FeedEvent>(8);
        feed_tx.send(Ok(source("src", 10, 1))).await.unwrap();
        let (tx, keys) = keys();

        let run = tokio::spawn(session.run(Feed::new(feed_rx, "test".into()), keys, DecodePolicy::Skip));
        tokio::time::sleep(Duration::from_secs(6)).await;
        {
            let screen = screen.lock();
            let buf = screen.terminal().backend().buffer();
            let text: String = buf.content().iter().map(|c| c.symbol()).collect();
            assert!(text.contains("src"));
        }

        press(&tx, KeyCode::Char('q'));
        assert!(run.await.unwrap().is_ok());
        drop(feed_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fails_when_feed_closes() {
        let session = session();
        let (feed_tx, feed_rx) = mpsc::channel::<FeedEvent>(8);
        drop(feed_tx);
        let (_tx, keys) = keys();

        let err = session
            .run(Feed::new(feed_rx, "test".into()), keys, DecodePolicy::Skip)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "monitoring stream is closed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ends_when_feed_closes_during_prompt() {
        let session = session();
        let screen = session.screen().clone();
        let (feed_tx, feed_rx) = mpsc::channel::<FeedEvent>(8);
        let (tx, keys) = keys();

        let run = tokio::spawn(session.run(Feed::new(feed_rx, "test".into()), keys, DecodePolicy::Skip));
        press(&tx, KeyCode::Char('d'));
        tokio::time::sleep(Duration::from_millis(10)).await;
        {
            let screen = screen.lock();
            let buf = screen.terminal().backend().buffer();
            let top: String = (0..buf.area.width).map(|x| buf[(x, 0)].symbol()).collect();
            assert!(top.starts_with("Change delay from"), "top row was {:?}", top);
        }

        drop(feed_tx);
        let err = run.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "monitoring stream is closed");
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fails_when_keyboard_closes() {
        let session = session();
        let (_feed_tx, feed_rx) = mpsc::channel::<FeedEvent>(8);
        let (tx, keys) = keys();
        drop(tx);

        let err = session
            .run(Feed::new(feed_rx, "test".into()), keys, DecodePolicy::Skip)
            .await
            .unwrap_err();
        assert!(matches!(err, IotopError::InputRead(_)));
    }
}
