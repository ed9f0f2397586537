use std::collections::{HashMap, HashSet};

/// Conversation -> members and member -> conversations, always mutated together.
#[derive(Debug, Default)]
pub struct Adjacency {
    members: HashMap<String, HashSet<String>>,
    conversations: HashMap<String, HashSet<String>>,
}

impl Adjacency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the pair was not already present.
    pub fn insert(&mut self, conversation_id: &str, member_id: &str) -> bool {
        let added = self
            .members
            .entry(conversation_id.to_string())
            .or_default()
            .insert(member_id.to_string());
        self.conversations
            .entry(member_id.to_string())
            .or_default()
            .insert(conversation_id.to_string());
        added
    }

    /// Returns true if the pair was present.
    pub fn remove(&mut self, conversation_id: &str, member_id: &str) -> bool {
        let removed = remove_edge(&mut self.members, conversation_id, member_id);
        remove_edge(&mut self.conversations, member_id, conversation_id);
        removed
    }

    /// Drop a conversation entirely. Returns its former members.
    pub fn remove_conversation(&mut self, conversation_id: &str) -> Vec<String> {
        let Some(members) = self.members.remove(conversation_id) else {
            return Vec::new();
        };
        for member_id in &members {
            remove_edge(&mut self.conversations, member_id, conversation_id);
        }
        let mut members: Vec<String> = members.into_iter().collect();
        members.sort();
        members
    }

    pub fn contains(&self, conversation_id: &str, member_id: &str) -> bool {
        self.members
            .get(conversation_id)
            .is_some_and(|m| m.contains(member_id))
    }

    pub fn members_of(&self, conversation_id: &str) -> Option<&HashSet<String>> {
        self.members.get(conversation_id)
    }

    pub fn conversations_of(&self, member_id: &str) -> Option<&HashSet<String>> {
        self.conversations.get(member_id)
    }

    /// Sorted member list, the form that gets sealed to storage.
    pub fn sorted_members(&self, conversation_id: &str) -> Vec<String> {
        sorted(self.members.get(conversation_id))
    }

    pub fn sorted_conversations(&self, member_id: &str) -> Vec<String> {
        sorted(self.conversations.get(member_id))
    }

    pub fn conversation_ids(&self) -> impl Iterator<Item = &String> {
        self.members.keys()
    }

    pub fn conversation_count(&self) -> usize {
        self.members.len()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.members
            .iter()
            .flat_map(|(c, ms)| ms.iter().map(move |m| (c.as_str(), m.as_str())))
    }
}

/// Empty sets are removed so that a map key always means "has edges".
fn remove_edge(map: &mut HashMap<String, HashSet<String>>, from: &str, to: &str) -> bool {
    let Some(set) = map.get_mut(from) else {
        return false;
    };
    let removed = set.remove(to);
    if set.is_empty() {
        map.remove(from);
    }
    removed
}

fn sorted(set: Option<&HashSet<String>>) -> Vec<String> {
    let mut out: Vec<String> = set.map(|s| s.iter().cloned().collect()).unwrap_or_default();
    out.sort();
    out
}
