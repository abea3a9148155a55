//! Conflict resolution between a local and a remote copy of one record.
//!
//! The rule is a total order over `(version, updated_at, is_dirty)`:
//! 1. No remote copy: local wins.
//! 2. Strictly higher `version` wins.
//! 3. Equal version: strictly later `updated_at` wins.
//! 4. Full tie: a dirty local copy wins, otherwise the remote copy.
//!
//! Resolution never mutates its inputs. Roles are asymmetric, so
//! `resolve(a, b)` and `resolve(b, a)` may disagree.

use std::cmp::Ordering;

use casesync_types::SyncedRecord;

/// Which side of a comparison won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// The local copy.
    Local,
    /// The remote copy.
    Remote,
}

/// Decide which copy of a record wins.
pub fn pick_winner(local: &SyncedRecord, remote: Option<&SyncedRecord>) -> Winner {
    let Some(remote) = remote else {
        return Winner::Local;
    };

    match local
        .version
        .cmp(&remote.version)
        .then(local.updated_at.cmp(&remote.updated_at))
    {
        Ordering::Greater => Winner::Local,
        Ordering::Less => Winner::Remote,
        Ordering::Equal if local.is_dirty => Winner::Local,
        Ordering::Equal => Winner::Remote,
    }
}

/// Return the winning copy. Always one of the two inputs.
pub fn resolve<'a>(local: &'a SyncedRecord, remote: Option<&'a SyncedRecord>) -> &'a SyncedRecord {
    match (pick_winner(local, remote), remote) {
        (Winner::Remote, Some(remote)) => remote,
        _ => local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casesync_types::{Fields, RecordId, Timestamp};

    fn record(version: u64, updated_at: i64, is_dirty: bool) -> SyncedRecord {
        let mut record = SyncedRecord::new_local(
            RecordId::new("c1").unwrap(),
            Fields::new(),
            Timestamp::from_millis(0),
        );
        record.version = version;
        record.updated_at = Timestamp::from_millis(updated_at);
        record.is_dirty = is_dirty;
        record
    }

    #[test]
    fn absent_remote_means_local_wins() {
        let local = record(0, 10, true);
        assert_eq!(pick_winner(&local, None), Winner::Local);
        assert!(std::ptr::eq(resolve(&local, None), &local));
    }

    #[test]
    fn higher_version_beats_later_timestamp() {
        // Device Y edited later but against an older version.
        let local = record(0, 2_000, true);
        let remote = record(1, 1_000, false);
        assert_eq!(pick_winner(&local, Some(&remote)), Winner::Remote);

        let local = record(3, 1, true);
        let remote = record(2, 9_999, false);
        assert_eq!(pick_winner(&local, Some(&remote)), Winner::Local);
    }

    #[test]
    fn equal_version_falls_back_to_timestamp() {
        let local = record(4, 200, false);
        let remote = record(4, 100, false);
        assert_eq!(pick_winner(&local, Some(&remote)), Winner::Local);
        assert_eq!(pick_winner(&remote, Some(&local)), Winner::Remote);
    }

    #[test]
    fn full_tie_prefers_dirty_local() {
        let remote = record(2, 100, false);
        assert_eq!(pick_winner(&record(2, 100, true), Some(&remote)), Winner::Local);
        assert_eq!(pick_winner(&record(2, 100, false), Some(&remote)), Winner::Remote);
    }

    #[test]
    fn resolve_is_total_and_deterministic() {
        for lv in 0..3u64 {
            for rv in 0..3u64 {
                for lt in 0..3i64 {
                    for rt in 0..3i64 {
                        for dirty in [false, true] {
                            let local = record(lv, lt, dirty);
                            let remote = record(rv, rt, false);
                            let first = resolve(&local, Some(&remote));
                            let second = resolve(&local, Some(&remote));
                            assert!(
                                std::ptr::eq(first, &local) || std::ptr::eq(first, &remote)
                            );
                            assert!(std::ptr::eq(first, second));
                            if rv > lv {
                                assert!(std::ptr::eq(first, &remote));
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn resolve_does_not_mutate_inputs() {
        let local = record(1, 5, true);
        let remote = record(1, 6, false);
        let (before_local, before_remote) = (local.clone(), remote.clone());
        let _ = resolve(&local, Some(&remote));
        assert_eq!(local, before_local);
        assert_eq!(remote, before_remote);
    }
}
