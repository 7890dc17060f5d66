//! Chat Manager — group addressing, delivery routing, and slash-command
//! parsing.
//!
//! Groups are keyed by a deterministic hash of their participant set so
//! any peer can independently derive the same group id for the same set
//! of participants, without a create race. The one exception is `General`,
//! which is reserved as id 1 and always broadcasts.

use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

use crate::ids::EntityId;
use crate::model::{ChatGroup, ChatMessage};

/// Derive a group id from a participant set. `BTreeSet` iterates in sorted
/// order, so the same set of names always hashes the same way regardless
/// of insertion order — required for every peer to agree on the id without
/// any coordination.
pub fn group_id_for_participants(participants: &BTreeSet<String>) -> EntityId {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for name in participants {
        name.hash(&mut hasher);
        0u8.hash(&mut hasher); // separator so {"ab","c"} != {"a","bc"}
    }
    let h = hasher.finish();
    // Never collide with the reserved General id.
    if h == crate::ids::GENERAL_GROUP_ID {
        h.wrapping_add(1)
    } else {
        h
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Broadcast,
    Targeted,
}

pub struct ChatManager {
    pub groups: HashMap<EntityId, ChatGroup>,
}

impl ChatManager {
    pub fn new(owner_user_id: impl Into<String>) -> Self {
        let general = ChatGroup::general(owner_user_id);
        let mut groups = HashMap::new();
        groups.insert(general.group_id, general);
        Self { groups }
    }

    /// Get or deterministically create the group for this participant set.
    pub fn group_for(
        &mut self,
        participants: BTreeSet<String>,
        owner_user_id: impl Into<String>,
    ) -> EntityId {
        if participants.is_empty() {
            return crate::ids::GENERAL_GROUP_ID;
        }
        let id = group_id_for_participants(&participants);
        self.groups.entry(id).or_insert_with(|| ChatGroup {
            group_id: id,
            name: default_group_name(&participants),
            participants,
            owner_user_id: owner_user_id.into(),
            messages: std::collections::VecDeque::new(),
            unread: 0,
        });
        id
    }

    pub fn delivery_for(&self, group_id: EntityId) -> Delivery {
        match self.groups.get(&group_id) {
            Some(g) if g.is_broadcast() => Delivery::Broadcast,
            Some(_) => Delivery::Targeted,
            None => Delivery::Broadcast,
        }
    }

    pub fn record_message(&mut self, group_id: EntityId, message: ChatMessage, is_local: bool) {
        if let Some(group) = self.groups.get_mut(&group_id) {
            group.messages.push_back(message);
            if !is_local {
                group.unread += 1;
            }
        }
    }

    pub fn mark_read(&mut self, group_id: EntityId) {
        if let Some(group) = self.groups.get_mut(&group_id) {
            group.unread = 0;
        }
    }
}

fn default_group_name(participants: &BTreeSet<String>) -> String {
    participants.iter().cloned().collect::<Vec<_>>().join(", ")
}

/// A parsed `/roll NdM±K` command, parsed locally. Parsing never touches
/// the network — only the locally computed result is ever sent as a chat
/// message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiceRoll {
    pub count: u32,
    pub sides: u32,
    pub modifier: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollParseError {
    NotARollCommand,
    Malformed,
    ZeroCountOrSides,
}

impl DiceRoll {
    /// Parse `"/roll 2d6+3"`, `"/roll d20"`, `"/roll 4d8-1"`. Returns
    /// `NotARollCommand` for anything not starting with `/roll`, and
    /// `Malformed`/`ZeroCountOrSides` for recognized-but-invalid bodies.
    pub fn parse(input: &str) -> Result<Self, RollParseError> {
        let rest = input
            .trim()
            .strip_prefix("/roll")
            .ok_or(RollParseError::NotARollCommand)?
            .trim();
        if rest.is_empty() {
            return Err(RollParseError::Malformed);
        }
        let (dice_part, modifier) = split_modifier(rest)?;
        let (count_str, sides_str) = dice_part
            .split_once('d')
            .ok_or(RollParseError::Malformed)?;
        let count = if count_str.is_empty() {
            1
        } else {
            count_str.parse::<u32>().map_err(|_| RollParseError::Malformed)?
        };
        let sides = sides_str
            .parse::<u32>()
            .map_err(|_| RollParseError::Malformed)?;
        if count == 0 || sides == 0 {
            return Err(RollParseError::ZeroCountOrSides);
        }
        Ok(DiceRoll {
            count,
            sides,
            modifier,
        })
    }

    /// Roll using `rng` and return the total including modifier.
    pub fn roll_with<R: rand::Rng>(&self, rng: &mut R) -> (Vec<u32>, i32) {
        let rolls: Vec<u32> = (0..self.count)
            .map(|_| rng.random_range(1..=self.sides))
            .collect();
        let total = rolls.iter().sum::<u32>() as i32 + self.modifier;
        (rolls, total)
    }
}

fn split_modifier(s: &str) -> Result<(&str, i32), RollParseError> {
    if let Some(idx) = s.rfind(['+', '-']) {
        // Only treat it as a modifier split if there's a digit after it and
        // the char before it isn't itself part of "d" (avoids splitting a
        // negative-sides typo weirdly — reject it as malformed instead).
        let (dice, modifier_str) = s.split_at(idx);
        if dice.is_empty() {
            return Err(RollParseError::Malformed);
        }
        let modifier = modifier_str
            .parse::<i32>()
            .map_err(|_| RollParseError::Malformed)?;
        Ok((dice, modifier))
    } else {
        Ok((s, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_id_is_deterministic_for_same_participant_set() {
        let mut a = BTreeSet::new();
        a.insert("alice".to_string());
        a.insert("bob".to_string());
        let mut b = BTreeSet::new();
        b.insert("bob".to_string());
        b.insert("alice".to_string());
        assert_eq!(group_id_for_participants(&a), group_id_for_participants(&b));
    }

    #[test]
    fn general_is_always_broadcast() {
        let manager = ChatManager::new("gm");
        assert_eq!(
            manager.delivery_for(crate::ids::GENERAL_GROUP_ID),
            Delivery::Broadcast
        );
    }

    #[test]
    fn non_empty_participant_group_is_targeted() {
        let mut manager = ChatManager::new("gm");
        let mut participants = BTreeSet::new();
        participants.insert("alice".to_string());
        participants.insert("bob".to_string());
        let id = manager.group_for(participants, "alice");
        assert_eq!(manager.delivery_for(id), Delivery::Targeted);
    }

    #[test]
    fn empty_participants_resolves_to_general() {
        let mut manager = ChatManager::new("gm");
        let id = manager.group_for(BTreeSet::new(), "gm");
        assert_eq!(id, crate::ids::GENERAL_GROUP_ID);
    }

    #[test]
    fn parses_basic_roll_command() {
        assert_eq!(
            DiceRoll::parse("/roll 2d6+3"),
            Ok(DiceRoll {
                count: 2,
                sides: 6,
                modifier: 3
            })
        );
    }

    #[test]
    fn parses_implicit_single_die_count() {
        assert_eq!(
            DiceRoll::parse("/roll d20"),
            Ok(DiceRoll {
                count: 1,
                sides: 20,
                modifier: 0
            })
        );
    }

    #[test]
    fn parses_negative_modifier() {
        assert_eq!(
            DiceRoll::parse("/roll 4d8-1"),
            Ok(DiceRoll {
                count: 4,
                sides: 8,
                modifier: -1
            })
        );
    }

    #[test]
    fn non_roll_text_is_not_a_roll_command() {
        assert_eq!(DiceRoll::parse("hello there"), Err(RollParseError::NotARollCommand));
    }

    #[test]
    fn zero_sides_is_rejected() {
        assert_eq!(DiceRoll::parse("/roll 1d0"), Err(RollParseError::ZeroCountOrSides));
    }

    #[test]
    fn roll_with_produces_count_many_values_in_range() {
        let roll = DiceRoll {
            count: 3,
            sides: 6,
            modifier: 2,
        };
        let mut rng = rand::rng();
        let (values, total) = roll.roll_with(&mut rng);
        assert_eq!(values.len(), 3);
        assert!(values.iter().all(|v| (1..=6).contains(v)));
        assert_eq!(total, values.iter().sum::<u32>() as i32 + 2);
    }
}
