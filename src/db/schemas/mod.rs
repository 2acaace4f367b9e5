//! Database schemas for Calma
//!
//! Defines MongoDB document structures for users, resources and chat messages.

mod chat;
mod metadata;
mod resource;
mod user;

pub use chat::{room_id, ChatMessageDoc, CHAT_COLLECTION};
pub use metadata::Metadata;
pub use resource::{ResourceDoc, RESOURCE_COLLECTION};
pub use user::{
    accept_friend_request, decline_friend_request, record_mood, remove_friend,
    send_friend_request, FriendEntry, FriendStatus, MoodEntry, NoteEntry, UserDoc,
    USER_COLLECTION,
};
