//! Per-run counters.

use serde::Serialize;

use crate::archive::DistributeStats;

/// What one run did. Printed by the CLI as a table or JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub messages_found: usize,
    /// Messages that could not be fetched or decoded.
    pub messages_failed: usize,
    pub attachments_seen: usize,
    /// Attachments without a filename or with an unrouted extension.
    pub attachments_ignored: usize,
    /// Attachments whose save or extraction failed.
    pub attachments_failed: usize,
    pub scripts_saved: usize,
    pub archives_extracted: usize,
    pub archives_failed: usize,
    pub audio_moved: usize,
    pub scripts_moved: usize,
    pub boilerplate_removed: usize,
    /// Archive entries that could not be moved into place.
    pub move_failures: usize,
    /// Bytes written for direct-saved attachments.
    pub bytes_written: u64,
}

impl RunSummary {
    /// Fold the result of one archive distribution into the totals.
    pub fn record_distribution(&mut self, stats: &DistributeStats) {
        self.archives_extracted += 1;
        self.audio_moved += stats.audio_moved;
        self.scripts_moved += stats.scripts_moved;
        self.boilerplate_removed += stats.boilerplate_removed;
        self.move_failures += stats.move_failures;
    }

    /// `true` if anything was recovered from rather than processed cleanly.
    pub fn had_errors(&self) -> bool {
        self.messages_failed > 0
            || self.attachments_failed > 0
            || self.archives_failed > 0
            || self.move_failures > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_distribution() {
        let mut summary = RunSummary::default();
        summary.record_distribution(&DistributeStats {
            entries: 4,
            audio_moved: 2,
            scripts_moved: 1,
            boilerplate_removed: 1,
            move_failures: 0,
        });
        assert_eq!(summary.archives_extracted, 1);
        assert_eq!(summary.audio_moved, 2);
        assert_eq!(summary.scripts_moved, 1);
        assert!(!summary.had_errors());
    }

    #[test]
    fn test_serializes_to_json() {
        let summary = RunSummary {
            messages_found: 3,
            ..Default::default()
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["messages_found"], 3);
        assert_eq!(json["bytes_written"], 0);
    }
}
