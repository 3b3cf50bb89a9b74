//! Actor registry.
//!
//! Actors are registered kind by kind (platforms, then individuals, then
//! groups). Every kind draws its ids from the same [`ActorIdCounter`], which is
//! threaded through [`assign_actor_ids`] as a plain value.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use infoflow_core::{Actor, ActorId, ActorKind, ActorKindTag, Message};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{FlowError, FlowResult};
use crate::store::MessageTable;

// =============================================================================
// Id assignment
// =============================================================================

/// Next free numeric suffix for actor ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorIdCounter(u64);

impl ActorIdCounter {
    /// Counter starting at `next`.
    pub fn new(next: u64) -> Self {
        Self(next)
    }

    /// The next suffix that will be handed out.
    pub fn next(&self) -> u64 {
        self.0
    }
}

/// Turn zero-based local candidate indices into `a<N>` ids.
///
/// Each index is offset by the counter. The returned counter is
/// `max(local) + previous + 1`.
pub fn assign_actor_ids(
    counter: ActorIdCounter,
    local_indices: &[u64],
    kind: ActorKindTag,
) -> FlowResult<(Vec<ActorId>, ActorIdCounter)> {
    let max_local = local_indices
        .iter()
        .copied()
        .max()
        .ok_or(FlowError::NoActors { kind })?;

    let ids = local_indices
        .iter()
        .map(|&local| ActorId::from_index(local + counter.0))
        .collect();

    Ok((ids, ActorIdCounter(max_local + counter.0 + 1)))
}

/// Minimum number of authored messages for an individual to count as active at
/// `per_month` messages per 30 days over `[start, end]`.
pub fn min_messages_for_activity(per_month: usize, start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
    let days = (end - start).num_days().max(0) as usize;
    per_month * days / 30
}

// =============================================================================
// Group definitions
// =============================================================================

/// One member of a configured group, by composite user key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub platform: String,
    pub source_user_id: String,
}

/// A configured group actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDefinition {
    pub label: String,
    pub members: Vec<GroupMember>,
}

impl GroupDefinition {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            members: Vec::new(),
        }
    }

    pub fn with_member(mut self, platform: impl Into<String>, source_user_id: impl Into<String>) -> Self {
        self.members.push(GroupMember {
            platform: platform.into(),
            source_user_id: source_user_id.into(),
        });
        self
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Thresholds applied before id assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryOptions {
    /// Platforms with fewer distinct users are not registered.
    pub min_platform_size: usize,
    /// Individuals with fewer authored messages are not registered.
    pub min_user_messages: usize,
}

/// All actors of one run, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ActorRegistry {
    actors: Vec<Actor>,
    index: HashMap<ActorId, usize>,
    counter: ActorIdCounter,
}

impl ActorRegistry {
    /// Create an empty registry drawing ids from `counter`.
    pub fn new(counter: ActorIdCounter) -> Self {
        Self {
            counter,
            ..Self::default()
        }
    }

    /// Register one actor per platform with at least `min_platform_size`
    /// distinct users.
    pub fn register_platforms(
        &mut self,
        table: &MessageTable,
        min_platform_size: usize,
    ) -> FlowResult<Vec<ActorId>> {
        let sizes = table.users().platform_sizes();
        let total = sizes.len();
        let candidates: Vec<(String, usize)> = sizes
            .into_iter()
            .filter(|(_, size)| *size >= min_platform_size)
            .collect();

        debug!(
            candidates = candidates.len(),
            excluded = total - candidates.len(),
            min_platform_size,
            "Filtered platform candidates"
        );

        let actors = candidates
            .into_iter()
            .map(|(platform, num_users)| {
                (
                    ActorKind::Platform {
                        platform: platform.clone(),
                    },
                    platform.clone(),
                    platform,
                    num_users,
                )
            })
            .collect();
        self.register(ActorKindTag::Platform, actors)
    }

    /// Register one actor per user with at least `min_user_messages` authored
    /// messages.
    pub fn register_individuals(
        &mut self,
        table: &MessageTable,
        min_user_messages: usize,
    ) -> FlowResult<Vec<ActorId>> {
        let users = table.users().users();
        let actors: Vec<_> = users
            .iter()
            .filter(|u| u.msgs_count >= min_user_messages)
            .map(|u| {
                (
                    ActorKind::Individual {
                        user_id: u.id.clone(),
                    },
                    u.source_user_id.clone(),
                    format!("{}: @{}", u.platform, u.source_user_id),
                    1,
                )
            })
            .collect();

        debug!(
            candidates = actors.len(),
            excluded = users.len() - actors.len(),
            min_user_messages,
            "Filtered individual candidates"
        );

        self.register(ActorKindTag::Individual, actors)
    }

    /// Register the configured groups. Members unknown to the user directory
    /// are dropped.
    pub fn register_groups(&mut self, table: &MessageTable, groups: &[GroupDefinition]) -> FlowResult<Vec<ActorId>> {
        let mut actors = Vec::with_capacity(groups.len());

        for group in groups {
            if group.members.is_empty() {
                return Err(FlowError::config(format!("group {:?} has no members", group.label)));
            }

            let mut members = BTreeSet::new();
            for member in &group.members {
                match table.users().lookup(&member.platform, &member.source_user_id) {
                    Some(user) => {
                        members.insert(user.id.clone());
                    }
                    None => warn!(
                        group = %group.label,
                        platform = %member.platform,
                        source_user_id = %member.source_user_id,
                        "Dropping unknown group member"
                    ),
                }
            }

            let num_users = members.len();
            actors.push((
                ActorKind::Group { members },
                group.label.clone(),
                format!("group: {}", group.label),
                num_users,
            ));
        }

        self.register(ActorKindTag::Group, actors)
    }

    fn register(
        &mut self,
        kind: ActorKindTag,
        actors: Vec<(ActorKind, String, String, usize)>,
    ) -> FlowResult<Vec<ActorId>> {
        let local: Vec<u64> = (0..actors.len() as u64).collect();
        let (ids, counter) = assign_actor_ids(self.counter, &local, kind)?;
        self.counter = counter;

        for (id, (actor_kind, label, long_label, num_users)) in ids.iter().zip(actors) {
            self.index.insert(id.clone(), self.actors.len());
            self.actors.push(Actor {
                id: id.clone(),
                kind: actor_kind,
                label,
                long_label,
                num_users,
            });
        }

        info!(
            kind = %kind,
            count = ids.len(),
            next_id = self.counter.next(),
            "Registered actors"
        );
        Ok(ids)
    }

    /// The counter after every registration so far.
    pub fn counter(&self) -> ActorIdCounter {
        self.counter
    }

    /// All actors in registration order.
    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Look up an actor.
    pub fn get(&self, id: &ActorId) -> FlowResult<&Actor> {
        self.index
            .get(id)
            .map(|&idx| &self.actors[idx])
            .ok_or_else(|| FlowError::UnknownActor { actor_id: id.clone() })
    }

    /// Ids of every actor of `kind`, in registration order.
    pub fn ids_of_kind(&self, kind: ActorKindTag) -> Vec<ActorId> {
        self.actors
            .iter()
            .filter(|a| a.kind.tag() == kind)
            .map(|a| a.id.clone())
            .collect()
    }

    /// All actor ids in registration order.
    pub fn ids(&self) -> Vec<ActorId> {
        self.actors.iter().map(|a| a.id.clone()).collect()
    }

    /// Select the messages of `view` that belong to an actor.
    ///
    /// A group left with a single known member selects nothing.
    pub fn resolve_messages<'a>(&self, id: &ActorId, view: &'a [Message]) -> FlowResult<Vec<&'a Message>> {
        let actor = self.get(id)?;
        let selected = match &actor.kind {
            ActorKind::Platform { platform } => view.iter().filter(|m| &m.platform == platform).collect(),
            ActorKind::Individual { user_id } => view.iter().filter(|m| &m.user_id == user_id).collect(),
            ActorKind::Group { members } if members.len() < 2 => Vec::new(),
            ActorKind::Group { members } => view.iter().filter(|m| members.contains(&m.user_id)).collect(),
        };
        Ok(selected)
    }
}
