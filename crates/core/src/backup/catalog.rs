//! Ordering and truncation of listed backups.

use super::groups::BackupGroup;

/// Sort `groups` newest first and keep at most `limit` entries (`0` keeps all).
///
/// Equal indices fall back to modification time and then file path so the
/// result is stable across calls on an unchanged directory.
pub fn catalog(mut groups: Vec<BackupGroup>, limit: usize) -> Vec<BackupGroup> {
    groups.sort_by(|a, b| {
        b.index
            .cmp(&a.index)
            .then_with(|| b.mod_time.cmp(&a.mod_time))
            .then_with(|| a.bin_file.cmp(&b.bin_file))
    });

    if limit > 0 && limit < groups.len() {
        groups.truncate(limit);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn group(index: u64) -> BackupGroup {
        BackupGroup {
            index,
            bin_file: Some(PathBuf::from(format!("{index}.save"))),
            xml_file: None,
            meta_file: None,
            mod_time: Utc.timestamp_opt(1_700_000_000 + index as i64, 0).unwrap(),
        }
    }

    fn indices(groups: &[BackupGroup]) -> Vec<u64> {
        groups.iter().map(|group| group.index).collect()
    }

    #[test]
    fn zero_limit_returns_everything_newest_first() {
        let sorted = catalog(vec![group(2), group(7), group(4)], 0);
        assert_eq!(indices(&sorted), vec![7, 4, 2]);
    }

    #[test]
    fn limit_keeps_highest_indices() {
        let sorted = catalog(vec![group(2), group(7), group(4), group(9)], 2);
        assert_eq!(indices(&sorted), vec![9, 7]);

        let all = catalog(vec![group(1), group(3)], 5);
        assert_eq!(indices(&all), vec![3, 1]);
    }
}
