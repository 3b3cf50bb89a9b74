//! In-memory normalized message table.
//!
//! The table is built once per run from reader output and is read-only
//! afterwards. Messages are kept sorted by datetime so that a time window maps
//! to a contiguous slice.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use infoflow_core::{ClassLabel, Message, MessageId, MessageRecord, TimeWindow, User, UserId};
use tracing::{debug, info, warn};

/// Surrogate ids for every (platform, source user id) pair seen as an author
/// or as a parent.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: Vec<User>,
    by_key: HashMap<(String, String), usize>,
    by_id: HashMap<UserId, usize>,
}

impl UserDirectory {
    /// Collect users from records. Ids are assigned in (platform, source user
    /// id) order starting at `u0`.
    pub fn from_records(records: &[MessageRecord]) -> Self {
        // (msgs_count, received_share_count)
        let mut tally: BTreeMap<(String, String), (usize, usize)> = BTreeMap::new();

        for record in records {
            tally
                .entry((record.platform.clone(), record.source_user_id.clone()))
                .or_default()
                .0 += 1;
            if let Some(parent) = &record.parent_source_user_id {
                tally
                    .entry((record.platform.clone(), parent.clone()))
                    .or_default()
                    .1 += 1;
            }
        }

        let mut directory = Self::default();
        for (idx, ((platform, source_user_id), (msgs_count, received_share_count))) in
            tally.into_iter().enumerate()
        {
            let id = UserId::from_index(idx);
            directory
                .by_key
                .insert((platform.clone(), source_user_id.clone()), idx);
            directory.by_id.insert(id.clone(), idx);
            directory.users.push(User {
                id,
                platform,
                source_user_id,
                msgs_count,
                received_share_count,
            });
        }
        directory
    }

    /// All users in id order.
    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Number of users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether no users are known.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Look up a user by surrogate id.
    pub fn get(&self, id: &UserId) -> Option<&User> {
        self.by_id.get(id).map(|&idx| &self.users[idx])
    }

    /// Look up a user by its composite key.
    pub fn lookup(&self, platform: &str, source_user_id: &str) -> Option<&User> {
        self.by_key
            .get(&(platform.to_string(), source_user_id.to_string()))
            .map(|&idx| &self.users[idx])
    }

    /// Number of distinct users per platform, ordered by platform label.
    pub fn platform_sizes(&self) -> BTreeMap<String, usize> {
        let mut sizes = BTreeMap::new();
        for user in &self.users {
            *sizes.entry(user.platform.clone()).or_insert(0) += 1;
        }
        sizes
    }
}

/// Earliest and latest datetime among records that would be kept.
pub fn record_time_range(records: &[MessageRecord]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let mut complete = records.iter().filter(|r| r.is_complete()).map(|r| r.datetime);
    let first = complete.next()?;
    Some(complete.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t))))
}

/// The normalized message table of one run.
#[derive(Debug, Clone, Default)]
pub struct MessageTable {
    messages: Vec<Message>,
    users: UserDirectory,
}

impl MessageTable {
    /// Build the table from reader output.
    ///
    /// Rows lacking a platform or source user id are dropped. Rows repeating
    /// an input message id already seen are dropped (first one wins).
    /// Rows without an input id get `m<N>` from their position among the kept
    /// rows.
    pub fn from_records(records: Vec<MessageRecord>) -> Self {
        let total = records.len();
        let mut seen_ids = HashSet::new();
        let mut incomplete = 0usize;
        let mut duplicates = 0usize;

        let kept: Vec<MessageRecord> = records
            .into_iter()
            .filter(|r| {
                if !r.is_complete() {
                    incomplete += 1;
                    return false;
                }
                match &r.msg_id {
                    Some(id) if !seen_ids.insert(id.clone()) => {
                        duplicates += 1;
                        false
                    }
                    _ => true,
                }
            })
            .collect();

        if incomplete > 0 {
            warn!(dropped = incomplete, "Dropped messages missing platform or source user id");
        }
        if duplicates > 0 {
            debug!(dropped = duplicates, "Dropped duplicate message ids");
        }

        let users = UserDirectory::from_records(&kept);

        let mut messages: Vec<Message> = kept
            .into_iter()
            .enumerate()
            .filter_map(|(idx, record)| {
                let user_id = users
                    .lookup(&record.platform, &record.source_user_id)?
                    .id
                    .clone();
                let parent_user_id = record
                    .parent_source_user_id
                    .as_deref()
                    .and_then(|parent| users.lookup(&record.platform, parent))
                    .map(|u| u.id.clone());
                let id = match record.msg_id {
                    Some(msg_id) => MessageId(msg_id),
                    None => MessageId::from_index(idx),
                };
                Some(Message {
                    id,
                    datetime: record.datetime,
                    platform: record.platform,
                    source_user_id: record.source_user_id,
                    parent_source_user_id: record.parent_source_user_id,
                    user_id,
                    parent_user_id,
                    class_counts: record.class_counts,
                })
            })
            .collect();

        messages.sort_by_key(|m| m.datetime);

        info!(
            rows = total,
            messages = messages.len(),
            users = users.len(),
            "Built message table"
        );

        Self { messages, users }
    }

    /// Build the table from the records falling within `bounds`, both ends
    /// included.
    pub fn from_records_within(records: Vec<MessageRecord>, bounds: &TimeWindow) -> Self {
        let total = records.len();
        let records: Vec<MessageRecord> = records
            .into_iter()
            .filter(|r| bounds.contains(r.datetime))
            .collect();
        if records.len() < total {
            debug!(
                dropped = total - records.len(),
                start = %bounds.start,
                end = %bounds.end,
                "Dropped messages outside the analysed range"
            );
        }
        Self::from_records(records)
    }

    /// All messages, sorted by datetime.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The user directory.
    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the table holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Earliest and latest message datetimes.
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.messages.first()?.datetime, self.messages.last()?.datetime))
    }

    /// Messages within `window`, bounds included.
    pub fn window_view(&self, window: &TimeWindow) -> &[Message] {
        let lo = self.messages.partition_point(|m| m.datetime < window.start);
        let hi = self.messages.partition_point(|m| m.datetime <= window.end);
        if lo >= hi {
            return &[];
        }
        &self.messages[lo..hi]
    }

    /// Classes with a positive count on at least one message.
    pub fn observed_classes(&self) -> BTreeSet<ClassLabel> {
        self.messages
            .iter()
            .flat_map(|m| m.class_counts.iter())
            .filter(|(_, &count)| count > 0)
            .map(|(class, _)| class.clone())
            .collect()
    }
}
