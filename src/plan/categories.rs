//! Static mood × day-segment → category table
//!
//! Plain configuration data. Each cell holds the 1-2 categories a plan
//! segment draws resources from for the given mood.

use super::{Category, DaySegment, MoodState};

use Category::{Breathing, Learning, Meditation, Podcast, RelaxingMusic};

/// Look up the category list for a (mood, segment) cell
pub const fn categories_for(mood: MoodState, segment: DaySegment) -> &'static [Category] {
    match (mood, segment) {
        (MoodState::VeryGood, DaySegment::Morning) => &[Podcast, Learning],
        (MoodState::VeryGood, DaySegment::Afternoon) => &[Breathing, RelaxingMusic],
        (MoodState::VeryGood, DaySegment::Evening) => &[Meditation],

        (MoodState::Good, DaySegment::Morning) => &[Learning, Podcast],
        (MoodState::Good, DaySegment::Afternoon) => &[Meditation],
        (MoodState::Good, DaySegment::Evening) => &[RelaxingMusic, Breathing],

        (MoodState::Neutral, DaySegment::Morning) => &[Breathing, Learning],
        (MoodState::Neutral, DaySegment::Afternoon) => &[Podcast, Meditation],
        (MoodState::Neutral, DaySegment::Evening) => &[RelaxingMusic, Meditation],

        (MoodState::Bad, DaySegment::Morning) => &[Breathing, Meditation],
        (MoodState::Bad, DaySegment::Afternoon) => &[Podcast, Meditation],
        (MoodState::Bad, DaySegment::Evening) => &[RelaxingMusic, Meditation],

        (MoodState::VeryBad, DaySegment::Morning) => &[Meditation],
        (MoodState::VeryBad, DaySegment::Afternoon) => &[Breathing, Podcast],
        (MoodState::VeryBad, DaySegment::Evening) => &[RelaxingMusic, Meditation],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_very_good_cells() {
        assert_eq!(
            categories_for(MoodState::VeryGood, DaySegment::Morning),
            &[Podcast, Learning]
        );
        assert_eq!(
            categories_for(MoodState::VeryGood, DaySegment::Afternoon),
            &[Breathing, RelaxingMusic]
        );
        assert_eq!(
            categories_for(MoodState::VeryGood, DaySegment::Evening),
            &[Meditation]
        );
    }

    #[test]
    fn test_very_bad_cells() {
        assert_eq!(
            categories_for(MoodState::VeryBad, DaySegment::Morning),
            &[Meditation]
        );
        assert_eq!(
            categories_for(MoodState::VeryBad, DaySegment::Afternoon),
            &[Breathing, Podcast]
        );
        assert_eq!(
            categories_for(MoodState::VeryBad, DaySegment::Evening),
            &[RelaxingMusic, Meditation]
        );
    }

    #[test]
    fn test_every_cell_has_one_or_two_categories() {
        let moods = [
            MoodState::VeryGood,
            MoodState::Good,
            MoodState::Neutral,
            MoodState::Bad,
            MoodState::VeryBad,
        ];
        for mood in moods {
            for segment in DaySegment::ALL {
                let cats = categories_for(mood, segment);
                assert!(
                    (1..=2).contains(&cats.len()),
                    "cell ({:?}, {:?}) has {} categories",
                    mood,
                    segment,
                    cats.len()
                );
            }
        }
    }
}
