//! User-facing sync notices.
//!
//! Three independent states a host can render: a syncing banner, a success
//! summary and an error with a retry affordance. Each is dismissed on its
//! own.

use serde::Serialize;

use crate::delivery::DrainReport;

/// Which notice slot a `Notice` occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    Syncing,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Notice {
    Syncing {
        pending: usize,
    },
    Success {
        synced: usize,
        total: usize,
    },
    Error {
        failed: usize,
        total: usize,
        evicted: usize,
    },
}

impl Notice {
    pub fn kind(&self) -> NoticeKind {
        match self {
            Notice::Syncing { .. } => NoticeKind::Syncing,
            Notice::Success { .. } => NoticeKind::Success,
            Notice::Error { .. } => NoticeKind::Error,
        }
    }

    /// Whether the host should offer a manual retry alongside this notice.
    pub fn offers_retry(&self) -> bool {
        matches!(self, Notice::Error { .. })
    }

    pub fn message(&self) -> String {
        match *self {
            Notice::Syncing { pending } => {
                format!("Syncing {pending} saved {}...", results(pending))
            }
            Notice::Success { synced, total } => {
                format!("Synced {synced} of {total} saved {}.", results(total))
            }
            Notice::Error {
                failed,
                total,
                evicted,
            } => {
                let mut message = format!(
                    "{failed} of {total} saved {} could not be synced.",
                    results(total)
                );
                if evicted > 0 {
                    message.push_str(&format!(
                        " {evicted} {} set aside after repeated failures.",
                        if evicted == 1 { "was" } else { "were" }
                    ));
                }
                message.push_str(" Retry?");
                message
            }
        }
    }
}

fn results(count: usize) -> &'static str {
    if count == 1 { "result" } else { "results" }
}

/// The currently visible notices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncNotices {
    syncing: Option<Notice>,
    success: Option<Notice>,
    error: Option<Notice>,
}

impl SyncNotices {
    /// Show the syncing banner and drop a stale error.
    pub fn drain_started(&mut self, pending: usize) {
        self.syncing = Some(Notice::Syncing { pending });
        self.error = None;
    }

    /// Replace the syncing banner with the outcome of a drain.
    pub fn drain_finished(&mut self, report: &DrainReport) {
        self.syncing = None;
        if report.synced > 0 {
            self.success = Some(Notice::Success {
                synced: report.synced,
                total: report.total,
            });
        }
        if report.failed > 0 {
            self.error = Some(Notice::Error {
                failed: report.failed,
                total: report.total,
                evicted: report.evicted.len(),
            });
        }
    }

    pub fn get(&self, kind: NoticeKind) -> Option<&Notice> {
        self.slot(kind).as_ref()
    }

    pub fn dismiss(&mut self, kind: NoticeKind) {
        *self.slot_mut(kind) = None;
    }

    /// Visible notices in display order.
    pub fn visible(&self) -> Vec<&Notice> {
        [&self.syncing, &self.success, &self.error]
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.visible().is_empty()
    }

    fn slot(&self, kind: NoticeKind) -> &Option<Notice> {
        match kind {
            NoticeKind::Syncing => &self.syncing,
            NoticeKind::Success => &self.success,
            NoticeKind::Error => &self.error,
        }
    }

    fn slot_mut(&mut self, kind: NoticeKind) -> &mut Option<Notice> {
        match kind {
            NoticeKind::Syncing => &mut self.syncing,
            NoticeKind::Success => &mut self.success,
            NoticeKind::Error => &mut self.error,
        }
    }
}
