use std::fmt;

/// Result of one transfer attempt. Failures are values, not errors: they are
/// counted and the batch moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Transferred,
    SkippedExisting,
    Failed(FailureReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    MissingSavePath,
    MissingAfterDownload(String),
    UnsupportedKind(String),
    InvalidTarget(String),
    Remote(String),
    Io(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::MissingSavePath => write!(f, "no save_path specified"),
            FailureReason::MissingAfterDownload(path) => {
                write!(f, "downloaded file not found at '{path}'")
            }
            FailureReason::UnsupportedKind(kind) => {
                write!(f, "entity type '{kind}' cannot be transferred")
            }
            FailureReason::InvalidTarget(reason) => write!(f, "invalid target: {reason}"),
            FailureReason::Remote(reason) => write!(f, "{reason}"),
            FailureReason::Io(reason) => write!(f, "I/O error: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub transferred: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Transferred => self.transferred += 1,
            TransferOutcome::SkippedExisting => self.skipped += 1,
            TransferOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn absorb(&mut self, other: RunSummary) {
        self.transferred += other.transferred;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    pub fn total(&self) -> usize {
        self.transferred + self.skipped + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

impl Direction {
    fn done_label(self) -> &'static str {
        match self {
            Direction::Download => "Downloaded",
            Direction::Upload => "Uploaded",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Direction::Download => "Download",
            Direction::Upload => "Upload",
        }
    }
}

/// Renders the end-of-run block printed after a batch.
pub fn format_summary(direction: Direction, scope: &str, summary: &RunSummary) -> String {
    format!(
        "{title} summary{scope}:\n  {done}: {} files\n  Skipped: {} files\n  Failed: {} files\n  Total processed: {} files",
        summary.transferred,
        summary.skipped,
        summary.failed,
        summary.total(),
        title = direction.title(),
        done = direction.done_label(),
        scope = if scope.is_empty() {
            String::new()
        } else {
            format!(" ({scope})")
        },
    )
}

pub fn print_summary(direction: Direction, scope: &str, summary: &RunSummary) {
    println!("\n{}", format_summary(direction, scope, summary));
}
