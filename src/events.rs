//! Keyboard input.
//!
//! Terminal events are read on a dedicated blocking thread and forwarded
//! over a channel, so the session can await them alongside its tasks.

use std::io;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::IotopError;

/// A top-level dashboard command bound to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    ChangeInterval,
    ToggleMode,
    ChangeFilter,
}

/// Map a key press to its command, if any.
pub fn command_for(key: KeyEvent) -> Option<Command> {
    match key.code {
        KeyCode::Char('q') => Some(Command::Quit),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Command::Quit)
        }
        KeyCode::Char('d') => Some(Command::ChangeInterval),
        KeyCode::Char('c') => Some(Command::ToggleMode),
        KeyCode::Char('u') => Some(Command::ChangeFilter),
        _ => None,
    }
}

/// Stream of key presses.
#[derive(Debug)]
pub struct KeyEvents {
    receiver: mpsc::UnboundedReceiver<io::Result<Event>>,
}

impl KeyEvents {
    /// Start reading terminal events on a background thread.
    ///
    /// The thread stops after a read error or once the receiver is dropped
    /// and the next event arrives.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || loop {
            let event = event::read();
            let failed = event.is_err();
            if tx.send(event).is_err() || failed {
                debug!("keyboard reader stopped");
                break;
            }
        });
        Self::from_channel(rx)
    }

    /// Read events from an existing channel.
    pub fn from_channel(receiver: mpsc::UnboundedReceiver<io::Result<Event>>) -> Self {
        Self { receiver }
    }

    /// Wait for the next key press, skipping releases and non-key events.
    pub async fn next_key(&mut self) -> Result<KeyEvent, IotopError> {
        loop {
            match self.receiver.recv().await {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => return Ok(key),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(IotopError::InputRead(e.to_string())),
                None => {
                    return Err(IotopError::InputRead("keyboard input closed".to_string()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_command_bindings() {
        assert_eq!(command_for(key(KeyCode::Char('q'))), Some(Command::Quit));
        assert_eq!(command_for(key(KeyCode::Char('d'))), Some(Command::ChangeInterval));
        assert_eq!(command_for(key(KeyCode::Char('c'))), Some(Command::ToggleMode));
        assert_eq!(command_for(key(KeyCode::Char('u'))), Some(Command::ChangeFilter));
        assert_eq!(command_for(key(KeyCode::Char('x'))), None);
        assert_eq!(
            command_for(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Command::Quit)
        );
    }

    #[tokio::test]
    async fn test_next_key_skips_releases_and_resizes() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut keys = KeyEvents::from_channel(rx);

        tx.send(Ok(Event::Resize(80, 24))).unwrap();
        tx.send(Ok(Event::Key(KeyEvent {
            code: KeyCode::Char('x'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        })))
        .unwrap();
        tx.send(Ok(Event::Key(key(KeyCode::Char('d'))))).unwrap();

        assert_eq!(keys.next_key().await.unwrap().code, KeyCode::Char('d'));
    }

    #[tokio::test]
    async fn test_closed_input_is_fatal() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut keys = KeyEvents::from_channel(rx);
        tx.send(Err(io::Error::other("tty gone"))).unwrap();
        drop(tx);

        let err = keys.next_key().await.unwrap_err();
        assert!(matches!(err, IotopError::InputRead(_)));
        assert!(!err.is_recoverable());
        assert!(matches!(keys.next_key().await, Err(IotopError::InputRead(_))));
    }
}
