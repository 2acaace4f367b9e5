//! Daily plan domain: moods, day segments, resource categories and the
//! allocator that fills schedule slots with recommended resources.

pub mod allocator;
pub mod categories;
pub mod pool;
pub mod sampler;

pub use allocator::{generate, rebalance};
pub use categories::categories_for;
pub use pool::{MongoResourcePool, ResourcePool};
pub use sampler::{RandomSampler, Sampler};

use std::fmt;
use std::str::FromStr;

use bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::types::CalmaError;

/// User-reported mood, the key into the category table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodState {
    VeryGood,
    Good,
    Neutral,
    Bad,
    VeryBad,
}

impl MoodState {
    /// Spanish display label, as shown in the client UI
    pub fn label(&self) -> &'static str {
        match self {
            Self::VeryGood => "Muy bien",
            Self::Good => "Bien",
            Self::Neutral => "Neutro",
            Self::Bad => "Mal",
            Self::VeryBad => "Muy mal",
        }
    }
}

impl fmt::Display for MoodState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MoodState {
    type Err = CalmaError;

    /// Accepts the API identifiers and the legacy Spanish labels.
    /// Matching is exact apart from surrounding whitespace and case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "very_good" | "muy bien" => Ok(Self::VeryGood),
            "good" | "bien" => Ok(Self::Good),
            "neutral" | "neutro" => Ok(Self::Neutral),
            "bad" | "mal" => Ok(Self::Bad),
            "very_bad" | "muy mal" => Ok(Self::VeryBad),
            _ => Err(CalmaError::InvalidMoodState(s.to_string())),
        }
    }
}

/// Segment of the day, in fixed plan order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaySegment {
    Morning,
    Afternoon,
    Evening,
}

impl DaySegment {
    /// Segments in the order plans are filled
    pub const ALL: [DaySegment; 3] = [Self::Morning, Self::Afternoon, Self::Evening];
}

/// Resource category, stored and displayed with its Spanish label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Aprender")]
    Learning,
    #[serde(rename = "Podcast")]
    Podcast,
    #[serde(rename = "Meditación y Mindfulness")]
    Meditation,
    #[serde(rename = "Ejercicios de Respiración")]
    Breathing,
    #[serde(rename = "Música y Sonidos Relajantes")]
    RelaxingMusic,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Learning => "Aprender",
            Self::Podcast => "Podcast",
            Self::Meditation => "Meditación y Mindfulness",
            Self::Breathing => "Ejercicios de Respiración",
            Self::RelaxingMusic => "Música y Sonidos Relajantes",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = CalmaError;

    /// Accepts the Spanish label or an ASCII slug (for URL path segments)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "aprender" => Ok(Self::Learning),
            "podcast" => Ok(Self::Podcast),
            "meditación y mindfulness" | "meditacion" => Ok(Self::Meditation),
            "ejercicios de respiración" | "respiracion" => Ok(Self::Breathing),
            "música y sonidos relajantes" | "musica" => Ok(Self::RelaxingMusic),
            _ => Err(CalmaError::BadRequest(format!("Unknown category: {}", s))),
        }
    }
}

/// Per-segment activity times chosen by the user (at most 2 per segment)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub morning: Vec<String>,
    #[serde(default)]
    pub afternoon: Vec<String>,
    #[serde(default)]
    pub evening: Vec<String>,
}

impl Schedule {
    pub fn slots(&self) -> ScheduleSlots {
        ScheduleSlots {
            morning: self.morning.len(),
            afternoon: self.afternoon.len(),
            evening: self.evening.len(),
        }
    }
}

/// Requested resource count per segment, derived from the schedule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleSlots {
    pub morning: usize,
    pub afternoon: usize,
    pub evening: usize,
}

impl ScheduleSlots {
    pub fn get(&self, segment: DaySegment) -> usize {
        match segment {
            DaySegment::Morning => self.morning,
            DaySegment::Afternoon => self.afternoon,
            DaySegment::Evening => self.evening,
        }
    }
}

/// A resource embedded in a plan: the full document snapshot, not a reference
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanResource {
    /// Source resource document id (ObjectId hex)
    pub id: String,
    pub category: Category,
    pub title: String,
    pub author: String,
    pub duration_minutes: i64,
    pub description: String,
    /// Opaque media reference (URL or blob id)
    pub content: String,
}

/// The generated daily plan, stored embedded in the user document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyPlan {
    /// Mood the plan was generated for
    pub mood: MoodState,
    pub generated_at: DateTime,
    pub morning: Vec<PlanResource>,
    pub afternoon: Vec<PlanResource>,
    pub evening: Vec<PlanResource>,
}

impl DailyPlan {
    pub fn empty(mood: MoodState) -> Self {
        Self {
            mood,
            generated_at: DateTime::now(),
            morning: Vec::new(),
            afternoon: Vec::new(),
            evening: Vec::new(),
        }
    }

    pub fn segment(&self, segment: DaySegment) -> &[PlanResource] {
        match segment {
            DaySegment::Morning => &self.morning,
            DaySegment::Afternoon => &self.afternoon,
            DaySegment::Evening => &self.evening,
        }
    }

    pub fn segment_mut(&mut self, segment: DaySegment) -> &mut Vec<PlanResource> {
        match segment {
            DaySegment::Morning => &mut self.morning,
            DaySegment::Afternoon => &mut self.afternoon,
            DaySegment::Evening => &mut self.evening,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mood_from_str_identifiers() {
        assert_eq!("very_good".parse::<MoodState>().unwrap(), MoodState::VeryGood);
        assert_eq!("neutral".parse::<MoodState>().unwrap(), MoodState::Neutral);
        assert_eq!("very_bad".parse::<MoodState>().unwrap(), MoodState::VeryBad);
    }

    #[test]
    fn test_mood_from_str_spanish_labels() {
        assert_eq!("Muy bien".parse::<MoodState>().unwrap(), MoodState::VeryGood);
        assert_eq!("Bien".parse::<MoodState>().unwrap(), MoodState::Good);
        assert_eq!("Neutro".parse::<MoodState>().unwrap(), MoodState::Neutral);
        assert_eq!("Mal".parse::<MoodState>().unwrap(), MoodState::Bad);
        assert_eq!(" Muy mal ".parse::<MoodState>().unwrap(), MoodState::VeryBad);
    }

    #[test]
    fn test_mood_from_str_rejects_unknown() {
        let err = "feliz".parse::<MoodState>().unwrap_err();
        assert!(matches!(err, CalmaError::InvalidMoodState(_)));
    }

    #[test]
    fn test_mood_serde_round_trip() {
        let json = serde_json::to_string(&MoodState::VeryGood).unwrap();
        assert_eq!(json, "\"very_good\"");
        let back: MoodState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MoodState::VeryGood);
    }

    #[test]
    fn test_category_serde_uses_spanish_labels() {
        let json = serde_json::to_string(&Category::Meditation).unwrap();
        assert_eq!(json, "\"Meditación y Mindfulness\"");
        let back: Category = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Category::Meditation);
    }

    #[test]
    fn test_category_from_slug() {
        assert_eq!("respiracion".parse::<Category>().unwrap(), Category::Breathing);
        assert_eq!("musica".parse::<Category>().unwrap(), Category::RelaxingMusic);
        assert_eq!("Aprender".parse::<Category>().unwrap(), Category::Learning);
    }

    #[test]
    fn test_schedule_slot_derivation() {
        let schedule = Schedule {
            morning: vec!["08:00".into(), "09:30".into()],
            afternoon: vec![],
            evening: vec!["21:00".into()],
        };
        let slots = schedule.slots();
        assert_eq!(slots.get(DaySegment::Morning), 2);
        assert_eq!(slots.get(DaySegment::Afternoon), 0);
        assert_eq!(slots.get(DaySegment::Evening), 1);
    }

    #[test]
    fn test_segment_order_is_fixed() {
        assert_eq!(
            DaySegment::ALL,
            [DaySegment::Morning, DaySegment::Afternoon, DaySegment::Evening]
        );
    }
}
