//! User document schema
//!
//! Stores credentials, profile, mood history, schedule, the embedded daily
//! plan and the friend list. Friend-state transitions and mood recording are
//! pure helpers here so they can be tested without a database.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::plan::{DailyPlan, MoodState, Schedule};
use crate::types::{CalmaError, Result};

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    pub username: String,

    pub email: String,

    /// Argon2 password hash
    pub password_hash: String,

    /// Opaque reference to a profile image (URL or blob id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i32>,

    #[serde(default)]
    pub interests: Vec<String>,

    /// Personal notes, embedded
    #[serde(default)]
    pub notes: Vec<NoteEntry>,

    /// Mood log, at most one entry per calendar day
    #[serde(default)]
    pub mood_history: Vec<MoodEntry>,

    /// Per-segment activity times chosen by the user
    #[serde(default)]
    pub schedule: Schedule,

    /// Current daily plan, replaced on generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_plan: Option<DailyPlan>,

    #[serde(default)]
    pub friends: Vec<FriendEntry>,
}

impl UserDoc {
    pub fn new(username: String, email: String, password_hash: String, age: Option<i32>) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            username,
            email,
            password_hash,
            profile_image: None,
            age,
            interests: Vec::new(),
            notes: Vec::new(),
            mood_history: Vec::new(),
            schedule: Schedule::default(),
            daily_plan: None,
            friends: Vec::new(),
        }
    }

    /// Most recently recorded mood, if any
    pub fn latest_mood(&self) -> Option<MoodState> {
        self.mood_history.last().map(|e| e.mood)
    }

    /// Friend entry for `other`, if present
    pub fn friend_entry(&self, other: &ObjectId) -> Option<&FriendEntry> {
        self.friends.iter().find(|f| &f.friend_id == other)
    }

    /// Whether `other` is an accepted friend
    pub fn is_friend(&self, other: &ObjectId) -> bool {
        self.friend_entry(other)
            .map(|f| f.status == FriendStatus::Accepted)
            .unwrap_or(false)
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "username": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("username_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// One entry in the mood log
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MoodEntry {
    pub mood: MoodState,
    pub recorded_at: DateTime,
}

/// A personal note embedded in the user document
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NoteEntry {
    /// Note id (UUID string)
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl NoteEntry {
    pub fn new(title: String, content: String) -> Self {
        let now = DateTime::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            content,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Friendship state as seen from the owning user's side
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FriendStatus {
    /// This user sent the request
    Sent,
    /// This user received the request and has not answered
    Pending,
    Accepted,
    Declined,
}

/// One edge in the friend list
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FriendEntry {
    pub friend_id: ObjectId,
    pub status: FriendStatus,
    pub sent_at: DateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime>,
}

/// Record `mood` in `history`, keeping at most one entry per UTC calendar
/// day. A same-day write replaces that day's entry so regenerating a plan
/// later in the day updates the log instead of failing.
pub fn record_mood(history: &mut Vec<MoodEntry>, mood: MoodState, now: DateTime) {
    let today = now.to_chrono().date_naive();
    history.retain(|e| e.recorded_at.to_chrono().date_naive() != today);
    history.push(MoodEntry {
        mood,
        recorded_at: now,
    });
}

/// Create the Sent/Pending pair for a new friend request.
/// A previously declined edge may be re-requested; anything else is an error.
pub fn send_friend_request(
    sender: &mut Vec<FriendEntry>,
    recipient: &mut Vec<FriendEntry>,
    sender_id: ObjectId,
    recipient_id: ObjectId,
) -> Result<()> {
    let existing = sender.iter().find(|f| f.friend_id == recipient_id);
    match existing.map(|f| f.status) {
        Some(FriendStatus::Accepted) => {
            return Err(CalmaError::BadRequest("Already friends".into()));
        }
        Some(FriendStatus::Sent) | Some(FriendStatus::Pending) => {
            return Err(CalmaError::BadRequest("Friend request already pending".into()));
        }
        Some(FriendStatus::Declined) | None => {}
    }

    sender.retain(|f| f.friend_id != recipient_id);
    recipient.retain(|f| f.friend_id != sender_id);

    let now = DateTime::now();
    sender.push(FriendEntry {
        friend_id: recipient_id,
        status: FriendStatus::Sent,
        sent_at: now,
        accepted_at: None,
    });
    recipient.push(FriendEntry {
        friend_id: sender_id,
        status: FriendStatus::Pending,
        sent_at: now,
        accepted_at: None,
    });

    Ok(())
}

/// Accept a pending request: both sides become Accepted
pub fn accept_friend_request(
    accepter: &mut [FriendEntry],
    requester: &mut [FriendEntry],
    accepter_id: ObjectId,
    requester_id: ObjectId,
) -> Result<()> {
    let incoming = accepter
        .iter_mut()
        .find(|f| f.friend_id == requester_id && f.status == FriendStatus::Pending)
        .ok_or_else(|| CalmaError::NotFound("No pending friend request".into()))?;

    let now = DateTime::now();
    incoming.status = FriendStatus::Accepted;
    incoming.accepted_at = Some(now);

    if let Some(outgoing) = requester
        .iter_mut()
        .find(|f| f.friend_id == accepter_id && f.status == FriendStatus::Sent)
    {
        outgoing.status = FriendStatus::Accepted;
        outgoing.accepted_at = Some(now);
    }

    Ok(())
}

/// Decline a pending request: the pending edge is removed, the sender's
/// edge is marked Declined
pub fn decline_friend_request(
    decliner: &mut Vec<FriendEntry>,
    requester: &mut [FriendEntry],
    decliner_id: ObjectId,
    requester_id: ObjectId,
) -> Result<()> {
    let had_pending = decliner
        .iter()
        .any(|f| f.friend_id == requester_id && f.status == FriendStatus::Pending);
    if !had_pending {
        return Err(CalmaError::NotFound("No pending friend request".into()));
    }

    decliner.retain(|f| f.friend_id != requester_id);

    if let Some(outgoing) = requester
        .iter_mut()
        .find(|f| f.friend_id == decliner_id)
    {
        outgoing.status = FriendStatus::Declined;
    }

    Ok(())
}

/// Remove the friendship edge from both sides
pub fn remove_friend(
    owner: &mut Vec<FriendEntry>,
    other: &mut Vec<FriendEntry>,
    owner_id: ObjectId,
    other_id: ObjectId,
) {
    owner.retain(|f| f.friend_id != other_id);
    other.retain(|f| f.friend_id != owner_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (ObjectId, ObjectId) {
        (ObjectId::new(), ObjectId::new())
    }

    #[test]
    fn test_send_request_creates_sent_and_pending() {
        let (alice, bob) = ids();
        let mut alice_friends = Vec::new();
        let mut bob_friends = Vec::new();

        send_friend_request(&mut alice_friends, &mut bob_friends, alice, bob).unwrap();

        assert_eq!(alice_friends[0].status, FriendStatus::Sent);
        assert_eq!(alice_friends[0].friend_id, bob);
        assert_eq!(bob_friends[0].status, FriendStatus::Pending);
        assert_eq!(bob_friends[0].friend_id, alice);
    }

    #[test]
    fn test_duplicate_request_rejected() {
        let (alice, bob) = ids();
        let mut alice_friends = Vec::new();
        let mut bob_friends = Vec::new();

        send_friend_request(&mut alice_friends, &mut bob_friends, alice, bob).unwrap();
        let err = send_friend_request(&mut alice_friends, &mut bob_friends, alice, bob);
        assert!(err.is_err());
    }

    #[test]
    fn test_accept_flips_both_sides() {
        let (alice, bob) = ids();
        let mut alice_friends = Vec::new();
        let mut bob_friends = Vec::new();

        send_friend_request(&mut alice_friends, &mut bob_friends, alice, bob).unwrap();
        accept_friend_request(&mut bob_friends, &mut alice_friends, bob, alice).unwrap();

        assert_eq!(alice_friends[0].status, FriendStatus::Accepted);
        assert_eq!(bob_friends[0].status, FriendStatus::Accepted);
        assert!(bob_friends[0].accepted_at.is_some());
    }

    #[test]
    fn test_accept_without_pending_fails() {
        let (alice, bob) = ids();
        let mut alice_friends: Vec<FriendEntry> = Vec::new();
        let mut bob_friends: Vec<FriendEntry> = Vec::new();

        let result = accept_friend_request(&mut bob_friends, &mut alice_friends, bob, alice);
        assert!(result.is_err());
    }

    #[test]
    fn test_decline_removes_pending_and_marks_sender() {
        let (alice, bob) = ids();
        let mut alice_friends = Vec::new();
        let mut bob_friends = Vec::new();

        send_friend_request(&mut alice_friends, &mut bob_friends, alice, bob).unwrap();
        decline_friend_request(&mut bob_friends, &mut alice_friends, bob, alice).unwrap();

        assert!(bob_friends.is_empty());
        assert_eq!(alice_friends[0].status, FriendStatus::Declined);
    }

    #[test]
    fn test_declined_edge_can_be_rerequested() {
        let (alice, bob) = ids();
        let mut alice_friends = Vec::new();
        let mut bob_friends = Vec::new();

        send_friend_request(&mut alice_friends, &mut bob_friends, alice, bob).unwrap();
        decline_friend_request(&mut bob_friends, &mut alice_friends, bob, alice).unwrap();
        send_friend_request(&mut alice_friends, &mut bob_friends, alice, bob).unwrap();

        assert_eq!(alice_friends[0].status, FriendStatus::Sent);
        assert_eq!(bob_friends[0].status, FriendStatus::Pending);
    }

    #[test]
    fn test_remove_friend_clears_both_sides() {
        let (alice, bob) = ids();
        let mut alice_friends = Vec::new();
        let mut bob_friends = Vec::new();

        send_friend_request(&mut alice_friends, &mut bob_friends, alice, bob).unwrap();
        accept_friend_request(&mut bob_friends, &mut alice_friends, bob, alice).unwrap();
        remove_friend(&mut alice_friends, &mut bob_friends, alice, bob);

        assert!(alice_friends.is_empty());
        assert!(bob_friends.is_empty());
    }

    #[test]
    fn test_record_mood_appends_new_day() {
        let mut history = vec![MoodEntry {
            mood: MoodState::Bad,
            recorded_at: DateTime::from_millis(0),
        }];

        record_mood(&mut history, MoodState::Good, DateTime::now());

        assert_eq!(history.len(), 2);
        assert_eq!(history.last().unwrap().mood, MoodState::Good);
    }

    #[test]
    fn test_record_mood_replaces_same_day_entry() {
        let now = DateTime::now();
        let mut history = Vec::new();

        record_mood(&mut history, MoodState::Bad, now);
        record_mood(&mut history, MoodState::VeryGood, now);

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].mood, MoodState::VeryGood);
    }

    #[test]
    fn test_latest_mood() {
        let mut user = UserDoc::new("ana".into(), "ana@example.com".into(), "hash".into(), None);
        assert!(user.latest_mood().is_none());

        user.mood_history.push(MoodEntry {
            mood: MoodState::Neutral,
            recorded_at: DateTime::now(),
        });
        assert_eq!(user.latest_mood(), Some(MoodState::Neutral));
    }
}
