use tokio::sync::watch;

/// Where a sync run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    ResolvingAll,
    DownloadingAll,
    Reconciling,
    Done,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::ResolvingAll => "resolving",
            Self::DownloadingAll => "downloading",
            Self::Reconciling => "reconciling",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncProgress {
    pub phase: SyncPhase,
    /// 0..=100, never decreasing within a run.
    pub percent: u8,
}

const RESOLVE_SPAN: u8 = 50;

/// Publishes run progress on a watch channel.
///
/// Resolution covers 0–50 %, downloads 50–100 %.
#[derive(Debug)]
pub struct ProgressTracker {
    tx: watch::Sender<SyncProgress>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SyncProgress::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncProgress> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> SyncProgress {
        *self.tx.borrow()
    }

    /// Reset for a new run.
    pub fn start(&self) {
        self.tx.send_replace(SyncProgress {
            phase: SyncPhase::ResolvingAll,
            percent: 0,
        });
    }

    pub fn enter(&self, phase: SyncPhase) {
        self.tx.send_if_modified(|p| {
            let changed = p.phase != phase;
            p.phase = phase;
            changed
        });
    }

    pub fn resolved(&self, done: usize, total: usize) {
        self.advance(scaled(done, total, 0, RESOLVE_SPAN));
    }

    pub fn downloaded(&self, done: usize, total: usize) {
        self.advance(scaled(done, total, RESOLVE_SPAN, 100 - RESOLVE_SPAN));
    }

    pub fn finish(&self) {
        self.tx.send_modify(|p| {
            p.phase = SyncPhase::Done;
            p.percent = 100;
        });
    }

    fn advance(&self, percent: u8) {
        self.tx.send_if_modified(|p| {
            if percent > p.percent {
                p.percent = percent;
                true
            } else {
                false
            }
        });
    }
}

/// `offset + span * done / total`; an empty phase counts as complete.
fn scaled(done: usize, total: usize, offset: u8, span: u8) -> u8 {
    if total == 0 {
        return offset + span;
    }
    let done = done.min(total);
    offset + (usize::from(span) * done / total) as u8
}
