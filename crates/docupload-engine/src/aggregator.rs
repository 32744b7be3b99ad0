//! Progress aggregation
//!
//! [`summarize`] derives the queue-wide summary from the item set. It holds
//! no state and is recomputed after every mutation.

use docupload_core::domain::{percent_of, UploadItem, UploadStatus};
use serde::{Deserialize, Serialize};

/// Number of items per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub uploading: usize,
    pub paused: usize,
    pub conflict: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    fn add(&mut self, status: UploadStatus) {
        let slot = match status {
            UploadStatus::Queued => &mut self.queued,
            UploadStatus::Uploading => &mut self.uploading,
            UploadStatus::Paused => &mut self.paused,
            UploadStatus::Conflict => &mut self.conflict,
            UploadStatus::Succeeded => &mut self.succeeded,
            UploadStatus::Failed => &mut self.failed,
            UploadStatus::Cancelled => &mut self.cancelled,
        };
        *slot += 1;
    }

    /// Count for one status
    pub fn get(&self, status: UploadStatus) -> usize {
        match status {
            UploadStatus::Queued => self.queued,
            UploadStatus::Uploading => self.uploading,
            UploadStatus::Paused => self.paused,
            UploadStatus::Conflict => self.conflict,
            UploadStatus::Succeeded => self.succeeded,
            UploadStatus::Failed => self.failed,
            UploadStatus::Cancelled => self.cancelled,
        }
    }
}

/// Queue-wide progress summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    /// Sum of all source sizes
    pub total_bytes: u64,
    /// Sum of all loaded bytes
    pub uploaded_bytes: u64,
    /// `uploaded_bytes / total_bytes` as a whole percent; 0 when empty
    pub percent: u8,
    /// Items per status
    pub counts: StatusCounts,
    /// queued + uploading + paused
    pub in_flight_count: usize,
    /// succeeded + failed + cancelled
    pub completed_count: usize,
}

/// Summarizes a set of items
pub fn summarize<'a, I>(items: I) -> ProgressSummary
where
    I: IntoIterator<Item = &'a UploadItem>,
{
    let mut summary = ProgressSummary::default();
    for item in items {
        summary.total_bytes += item.source().size;
        summary.uploaded_bytes += item.progress().loaded;
        summary.counts.add(item.status());
    }

    let c = &summary.counts;
    summary.in_flight_count = c.queued + c.uploading + c.paused;
    summary.completed_count = c.succeeded + c.failed + c.cancelled;
    summary.percent = percent_of(summary.uploaded_bytes, summary.total_bytes);
    summary
}
