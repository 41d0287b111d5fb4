//! Session configuration mutated by keyboard commands.

use std::fmt;
use std::time::Duration;

use crate::error::IotopError;

/// Smallest refresh interval accepted from the command line or a prompt.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// How counters are displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    /// Per-second deltas against the previous snapshot.
    #[default]
    Rate,
    /// Cumulative totals.
    Absolute,
}

impl DisplayMode {
    pub fn toggled(self) -> Self {
        match self {
            DisplayMode::Rate => DisplayMode::Absolute,
            DisplayMode::Absolute => DisplayMode::Rate,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DisplayMode::Rate => "rate",
            DisplayMode::Absolute => "absolute",
        }
    }
}

/// Which tables are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility {
    pub edges: bool,
    pub sources: bool,
    pub boxes: bool,
    pub sinks: bool,
}

impl Default for Visibility {
    fn default() -> Self {
        Self::all()
    }
}

impl Visibility {
    /// Every table shown.
    pub fn all() -> Self {
        Self {
            edges: true,
            sources: true,
            boxes: true,
            sinks: true,
        }
    }

    fn none() -> Self {
        Self {
            edges: false,
            sources: false,
            boxes: false,
            sinks: false,
        }
    }

    /// Parse a comma-separated list of categories to show.
    ///
    /// Accepted tokens are `edge`, `source` (or `src`), `box` and `sink`.
    /// Blank input shows everything. Any unknown token rejects the whole
    /// input.
    pub fn parse(input: &str) -> Result<Self, IotopError> {
        if input.trim().is_empty() {
            return Ok(Self::all());
        }

        let mut visibility = Self::none();
        for token in input.split(',') {
            match token.trim() {
                "edge" => visibility.edges = true,
                "source" | "src" => visibility.sources = true,
                "box" => visibility.boxes = true,
                "sink" => visibility.sinks = true,
                other => {
                    return Err(IotopError::InputParse(format!(
                        "Invalid node name ('{}')",
                        other
                    )))
                }
            }
        }
        Ok(visibility)
    }

    pub fn is_all(&self) -> bool {
        *self == Self::all()
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return f.write_str("all");
        }
        let names: Vec<&str> = [
            (self.edges, "edge"),
            (self.sources, "src"),
            (self.boxes, "box"),
            (self.sinks, "sink"),
        ]
        .into_iter()
        .filter_map(|(shown, name)| shown.then_some(name))
        .collect();
        f.write_str(&names.join(","))
    }
}

/// Interval, display mode and table visibility of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringState {
    pub interval: Duration,
    /// Period at which the server emits snapshots, when known. Fixed for
    /// the life of the status source.
    pub sample_period: Option<Duration>,
    pub mode: DisplayMode,
    pub visibility: Visibility,
}

impl MonitoringState {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            sample_period: None,
            mode: DisplayMode::default(),
            visibility: Visibility::all(),
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = Some(period);
        self
    }

    /// Time between the snapshots that rates are computed from.
    pub fn rate_period(&self) -> Duration {
        self.sample_period.unwrap_or(self.interval)
    }

    pub fn is_rate(&self) -> bool {
        self.mode == DisplayMode::Rate
    }

    pub fn toggle_mode(&mut self) {
        self.mode = self.mode.toggled();
    }
}

/// Parse a refresh interval typed at the prompt, in seconds.
///
/// Blank input means "keep the current interval" and yields `None`.
pub fn parse_interval(input: &str) -> Result<Option<Duration>, IotopError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    let secs: f64 = input
        .parse()
        .map_err(|e| IotopError::InputParse(format!("Unacceptable floating point, {}", e)))?;
    let interval = Duration::try_from_secs_f64(secs)
        .map_err(|e| IotopError::InputParse(format!("Unacceptable interval, {}", e)))?;
    if interval < MIN_INTERVAL {
        return Err(IotopError::InputParse(
            "Interval must be at least 1 second".to_string(),
        ));
    }
    Ok(Some(interval))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_visibility() {
        let v = Visibility::parse("src, box").unwrap();
        assert!(v.sources && v.boxes);
        assert!(!v.edges && !v.sinks);
        assert_eq!(v.to_string(), "src,box");
    }

    #[test]
    fn test_blank_visibility_shows_everything() {
        assert_eq!(Visibility::parse("  ").unwrap(), Visibility::all());
        assert_eq!(Visibility::all().to_string(), "all");
    }

    #[test]
    fn test_unknown_token_rejects_input() {
        let err = Visibility::parse("edge,stream").unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "Invalid node name ('stream')");
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("2.5").unwrap(), Some(Duration::from_millis(2500)));
        assert_eq!(parse_interval("").unwrap(), None);
        assert!(parse_interval("abc").unwrap_err().to_string().starts_with("Unacceptable floating point"));
        assert!(parse_interval("0.5").is_err());
        assert!(parse_interval("-3").is_err());
        assert!(parse_interval("inf").is_err());
    }

    #[test]
    fn test_toggle_mode() {
        let mut state = MonitoringState::new(Duration::from_secs(5));
        assert!(state.is_rate());
        state.toggle_mode();
        assert_eq!(state.mode, DisplayMode::Absolute);
    }

    #[test]
    fn test_rate_period_follows_sampling() {
        let mut state = MonitoringState::new(Duration::from_secs(5));
        assert_eq!(state.rate_period(), Duration::from_secs(5));

        state = state.with_sample_period(Duration::from_secs(5));
        state.interval = Duration::from_secs(2);
        assert_eq!(state.rate_period(), Duration::from_secs(5));
    }
}
