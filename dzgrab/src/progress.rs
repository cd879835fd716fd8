use std::sync::LazyLock;

use indicatif::{ProgressBar, ProgressStyle};

const PB_STYLE: &str = "{spinner:.blue} {msg:.cyan} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

const SPINNER_STYLE: &str = "{spinner:.blue} {msg:.cyan} [{elapsed_precise}] {bytes} ({bytes_per_sec})";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

static PB_TEMPLATE: LazyLock<Option<ProgressStyle>> = LazyLock::new(|| {
    ProgressStyle::with_template(PB_STYLE)
        .ok()
        .map(|style| style.tick_chars(TICK).progress_chars(PB_CHARS))
});

static SPINNER_TEMPLATE: LazyLock<Option<ProgressStyle>> = LazyLock::new(|| {
    ProgressStyle::with_template(SPINNER_STYLE)
        .ok()
        .map(|style| style.tick_chars(TICK))
});

/// Download progress on stderr. Without a content-length it degrades to a
/// byte counter; when hidden every call is a no-op.
pub struct ProgressTracker {
    pb: ProgressBar,
}

impl ProgressTracker {
    pub fn new(len: Option<u64>, msg: impl Into<String>, visible: bool) -> Self {
        if !visible {
            return Self {
                pb: ProgressBar::hidden(),
            };
        }

        let (pb, style) = match len {
            Some(len) if len > 0 => (ProgressBar::new(len), PB_TEMPLATE.as_ref()),
            _ => (ProgressBar::no_length(), SPINNER_TEMPLATE.as_ref()),
        };
        let pb = match style {
            Some(style) => pb.with_style(style.clone()),
            None => pb,
        };

        Self {
            pb: pb.with_message(msg.into()),
        }
    }

    pub fn step(&self, len: u64) -> &Self {
        self.pb.inc(len);
        self
    }

    pub fn position(&self) -> u64 {
        self.pb.position()
    }

    pub fn finish(&self, msg: Option<String>) {
        match msg {
            Some(msg) => self.pb.finish_with_message(msg),
            None => self.pb.finish(),
        }
    }

    pub fn abandon(&self) {
        self.pb.abandon();
    }
}
