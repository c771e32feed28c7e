//! Core model in Raft: RaftLog Definition

use std::ops::RangeInclusive;

#[cfg(test)]
use mockall::automock;

use crate::protocol::Entry;
use crate::protocol::LogId;
use crate::Result;

#[cfg_attr(test, automock)]
pub trait RaftLog: Send + Sync + 'static {
    fn entry(
        &self,
        index: u64,
    ) -> Result<Option<Entry>>;

    fn entry_term(
        &self,
        index: u64,
    ) -> Option<u64>;

    fn last_index(&self) -> u64;

    fn last_log_id(&self) -> Option<LogId>;

    fn is_empty(&self) -> bool;

    /// Entries within the inclusive index range, in index order.
    /// Indexes beyond the end of the log are silently skipped.
    fn get_entries_between(
        &self,
        range: RangeInclusive<u64>,
    ) -> Vec<Entry>;

    /// Leader-side append of one new command at the next free index.
    /// Durable once this returns.
    fn append(
        &self,
        term: u64,
        command: Vec<u8>,
    ) -> Result<Entry>;

    /// Appends pre-indexed entries, e.g. when seeding a follower log.
    /// Durable once this returns.
    fn append_entries(
        &self,
        entries: Vec<Entry>,
    ) -> Result<()>;

    /// Removes every entry with index >= `index`.
    fn truncate_from(
        &self,
        index: u64,
    ) -> Result<()>;

    /// Follower-side merge of replicated entries starting right after
    /// `prev_log_index`, assuming the consistency check already passed.
    ///
    /// Entries already present with a matching term are kept untouched. The
    /// first term mismatch truncates that suffix before the remainder is
    /// appended. Returns the index of the last new (or matching) entry.
    fn filter_out_conflicts_and_append(
        &self,
        prev_log_index: u64,
        new_entries: Vec<Entry>,
    ) -> Result<u64>;

    /// Highest index replicated on a majority whose entry carries
    /// `current_term`, if that advances past `commit_index`.
    fn calculate_majority_matched_index(
        &self,
        current_term: u64,
        commit_index: u64,
        peer_matched_ids: Vec<u64>,
    ) -> Option<u64>;

    fn flush(&self) -> Result<()>;

    /// @Write
    fn reset(&self) -> Result<()>;

    fn len(&self) -> usize;
}
