//! Terminal stage reporting for the host binary.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Set to any value to force plain output even on a terminal.
pub const PLAIN_ENV: &str = "LIVE_OVERLAY_PLAIN";

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        let pretty = is_tty
            && match mode {
                UiMode::Pretty => true,
                UiMode::Auto => std::env::var_os(PLAIN_ENV).is_none(),
                UiMode::Plain => false,
            };
        Self { pretty }
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    /// Report a stage. The stage is marked done, with its duration, when the
    /// returned guard drops.
    pub fn stage(&self, name: &str) -> StageGuard {
        let spinner = self.pretty.then(|| {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            spinner
        });
        if spinner.is_none() {
            eprintln!("==> {}", name);
        }
        StageGuard {
            name: name.to_string(),
            start: Instant::now(),
            spinner,
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    /// Update the spinner text while the stage runs. Plain mode prints nothing.
    pub fn progress(&self, message: &str) {
        if let Some(spinner) = &self.spinner {
            spinner.set_message(format!("{}: {}", self.name, message));
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = format!("✔ {} ({})", self.name, format_duration(self.start.elapsed()));
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_only_on_a_terminal() {
        assert!(!Ui::new(UiMode::Pretty, false).is_pretty());
        assert!(Ui::new(UiMode::Pretty, true).is_pretty());
        assert!(!Ui::new(UiMode::Plain, true).is_pretty());
    }

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
