use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at,
        }
    }
}

/// Conversation state stored in the session store
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,

    /// Oldest first. Never longer than the store's per-session turn cap.
    pub turns: Vec<Turn>,

    pub created_at: DateTime<Utc>,

    /// Last successful mutation. Never moves backwards.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a turn and drop the oldest ones beyond `max_turns`.
    pub(crate) fn push_turn(&mut self, turn: Turn, max_turns: usize) {
        let at = turn.created_at;
        self.turns.push(turn);
        self.touch(at);

        if self.turns.len() > max_turns {
            let excess = self.turns.len() - max_turns;
            self.turns.drain(..excess);
        }
    }

    pub(crate) fn clear_turns(&mut self, now: DateTime<Utc>) {
        self.turns.clear();
        self.touch(now);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// The last `limit` turns, or all of them when `limit` is `None` or zero.
    pub fn tail(&self, limit: Option<usize>) -> &[Turn] {
        match limit {
            Some(n) if n > 0 && n < self.turns.len() => &self.turns[self.turns.len() - n..],
            _ => &self.turns,
        }
    }

    pub fn summary(&self, max_turns: usize) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            message_count: self.turns.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            max_messages: max_turns,
        }
    }
}

/// Lightweight view of a session, without its turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub max_messages: usize,
}

/// Store statistics for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub active_sessions: usize,
    pub max_sessions: usize,
    pub max_turns_per_session: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_push_turn_drops_oldest() {
        let mut session = Session::new("s", at(0));
        for i in 0..4 {
            session.push_turn(Turn::new(Role::User, format!("m{i}"), at(i + 1)), 3);
        }

        let contents: Vec<_> = session.turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m1", "m2", "m3"]);
        assert_eq!(session.updated_at, at(4));
        assert_eq!(session.created_at, at(0));
    }

    #[test]
    fn test_updated_at_never_moves_backwards() {
        let mut session = Session::new("s", at(10));
        session.push_turn(Turn::new(Role::User, "late clock", at(5)), 5);
        assert_eq!(session.updated_at, at(10));
    }

    #[test]
    fn test_tail() {
        let mut session = Session::new("s", at(0));
        for i in 0..3 {
            session.push_turn(Turn::new(Role::Assistant, format!("m{i}"), at(i)), 5);
        }

        assert_eq!(session.tail(None).len(), 3);
        assert_eq!(session.tail(Some(0)).len(), 3);
        assert_eq!(session.tail(Some(10)).len(), 3);
        assert_eq!(session.tail(Some(2))[0].content, "m1");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }
}
