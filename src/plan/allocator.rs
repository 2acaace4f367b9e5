//! Plan generation and re-balancing
//!
//! Both operations walk the day segments in fixed order and thread a global
//! used-set across them, so no resource ever appears twice in one plan.
//! Segments with zero slots are skipped without querying the pool, and a
//! segment that cannot be filled completely is left short without error.

use std::collections::HashSet;

use bson::DateTime;
use tracing::debug;

use super::categories::categories_for;
use super::pool::ResourcePool;
use super::sampler::Sampler;
use super::{DailyPlan, DaySegment, MoodState, PlanResource, ScheduleSlots};
use crate::types::{CalmaError, Result};

/// Generate a fresh plan for `mood`, filling each segment's slots
pub async fn generate(
    mood: MoodState,
    slots: &ScheduleSlots,
    pool: &dyn ResourcePool,
    sampler: &mut dyn Sampler,
) -> Result<DailyPlan> {
    let mut plan = DailyPlan::empty(mood);
    let mut used: HashSet<String> = HashSet::new();

    for segment in DaySegment::ALL {
        let count = slots.get(segment);
        if count == 0 {
            continue;
        }

        let picked = draw(mood, segment, count, pool, sampler, &used).await?;
        for resource in &picked {
            used.insert(resource.id.clone());
        }
        *plan.segment_mut(segment) = picked;
    }

    debug!(mood = %mood, "Generated daily plan");
    Ok(plan)
}

/// Re-balance an existing plan against new slot counts.
///
/// Each segment keeps the head of its previous list up to the new count;
/// only the shortfall is drawn fresh, from the plan's recorded mood. When
/// no segment changes size this performs no queries and returns the same
/// selection.
pub async fn rebalance(
    existing: &DailyPlan,
    slots: &ScheduleSlots,
    pool: &dyn ResourcePool,
    sampler: &mut dyn Sampler,
) -> Result<DailyPlan> {
    let mood = existing.mood;
    let mut plan = DailyPlan {
        mood,
        generated_at: DateTime::now(),
        morning: Vec::new(),
        afternoon: Vec::new(),
        evening: Vec::new(),
    };

    // Seed the used-set with everything retained across all segments, so
    // fresh draws in one segment cannot duplicate retentions in another.
    let mut used: HashSet<String> = HashSet::new();
    for segment in DaySegment::ALL {
        let count = slots.get(segment);
        let retained: Vec<PlanResource> = existing
            .segment(segment)
            .iter()
            .take(count)
            .cloned()
            .collect();
        for resource in &retained {
            used.insert(resource.id.clone());
        }
        *plan.segment_mut(segment) = retained;
    }

    for segment in DaySegment::ALL {
        let count = slots.get(segment);
        let have = plan.segment(segment).len();
        if count <= have {
            continue;
        }

        let shortfall = count - have;
        let drawn = draw(mood, segment, shortfall, pool, sampler, &used).await?;
        for resource in &drawn {
            used.insert(resource.id.clone());
        }
        plan.segment_mut(segment).extend(drawn);
    }

    debug!(mood = %mood, "Rebalanced daily plan");
    Ok(plan)
}

/// Draw up to `count` resources for a (mood, segment) cell, excluding `used`
async fn draw(
    mood: MoodState,
    segment: DaySegment,
    count: usize,
    pool: &dyn ResourcePool,
    sampler: &mut dyn Sampler,
    used: &HashSet<String>,
) -> Result<Vec<PlanResource>> {
    let categories = categories_for(mood, segment);
    let candidates = pool.candidates(categories, used).await?;

    // Partial fill is silent: take what is available.
    let take = count.min(candidates.len());
    if take == 0 {
        return Ok(Vec::new());
    }

    let indices = sampler.pick(candidates.len(), take);
    if indices.len() != take {
        return Err(CalmaError::Internal(format!(
            "Sampler returned {} picks, expected {}",
            indices.len(),
            take
        )));
    }

    Ok(indices
        .into_iter()
        .map(|i| candidates[i].clone())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::sampler::{FirstN, RandomSampler};
    use crate::plan::Category;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory pool that counts how many queries it served
    struct MemoryPool {
        resources: Vec<PlanResource>,
        queries: AtomicUsize,
    }

    impl MemoryPool {
        fn new(resources: Vec<PlanResource>) -> Self {
            Self {
                resources,
                queries: AtomicUsize::new(0),
            }
        }

        fn query_count(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResourcePool for MemoryPool {
        async fn candidates(
            &self,
            categories: &[Category],
            exclude: &HashSet<String>,
        ) -> Result<Vec<PlanResource>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .resources
                .iter()
                .filter(|r| categories.contains(&r.category) && !exclude.contains(&r.id))
                .cloned()
                .collect())
        }
    }

    fn resource(id: &str, category: Category) -> PlanResource {
        PlanResource {
            id: id.to_string(),
            category,
            title: format!("title-{id}"),
            author: "author".into(),
            duration_minutes: 10,
            description: String::new(),
            content: format!("https://media.example/{id}"),
        }
    }

    fn slots(morning: usize, afternoon: usize, evening: usize) -> ScheduleSlots {
        ScheduleSlots {
            morning,
            afternoon,
            evening,
        }
    }

    fn all_ids(plan: &DailyPlan) -> Vec<String> {
        DaySegment::ALL
            .iter()
            .flat_map(|s| plan.segment(*s).iter().map(|r| r.id.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_zero_slot_segments_are_empty_and_query_free() {
        let pool = MemoryPool::new(vec![
            resource("a", Category::Meditation),
            resource("b", Category::Breathing),
        ]);
        let mut sampler = RandomSampler::seeded(1);

        let plan = generate(MoodState::VeryBad, &slots(0, 0, 0), &pool, &mut sampler)
            .await
            .unwrap();

        assert!(plan.morning.is_empty());
        assert!(plan.afternoon.is_empty());
        assert!(plan.evening.is_empty());
        assert_eq!(pool.query_count(), 0);
    }

    #[tokio::test]
    async fn test_no_resource_repeats_across_segments() {
        // Meditation appears in VeryBad cells for morning and evening, so
        // without the used-set the same resource could land twice.
        let pool = MemoryPool::new(vec![
            resource("m1", Category::Meditation),
            resource("m2", Category::Meditation),
            resource("m3", Category::Meditation),
            resource("b1", Category::Breathing),
            resource("p1", Category::Podcast),
            resource("r1", Category::RelaxingMusic),
        ]);
        let mut sampler = RandomSampler::seeded(9);

        let plan = generate(MoodState::VeryBad, &slots(1, 2, 2), &pool, &mut sampler)
            .await
            .unwrap();

        let ids = all_ids(&plan);
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len(), "duplicate resource in plan: {ids:?}");
    }

    #[tokio::test]
    async fn test_segment_length_is_min_of_requested_and_available() {
        // Only 2 morning-eligible resources but 5 requested.
        let pool = MemoryPool::new(vec![
            resource("m1", Category::Meditation),
            resource("m2", Category::Meditation),
        ]);
        let mut sampler = RandomSampler::seeded(3);

        let plan = generate(MoodState::VeryBad, &slots(5, 0, 0), &pool, &mut sampler)
            .await
            .unwrap();

        assert_eq!(plan.morning.len(), 2);
    }

    #[tokio::test]
    async fn test_very_bad_scenario() {
        // Pool: 3 meditation, 1 breathing. Slots M:1 A:2 E:0.
        let pool = MemoryPool::new(vec![
            resource("m1", Category::Meditation),
            resource("m2", Category::Meditation),
            resource("m3", Category::Meditation),
            resource("b1", Category::Breathing),
        ]);
        let mut sampler = RandomSampler::seeded(11);

        let plan = generate(MoodState::VeryBad, &slots(1, 2, 0), &pool, &mut sampler)
            .await
            .unwrap();

        assert_eq!(plan.morning.len(), 1);
        assert_eq!(plan.morning[0].category, Category::Meditation);
        // Afternoon draws from {Breathing, Podcast}; only b1 qualifies.
        assert_eq!(plan.afternoon.len(), 1);
        assert_eq!(plan.afternoon[0].id, "b1");
        assert!(plan.evening.is_empty());
    }

    #[tokio::test]
    async fn test_rebalance_unchanged_counts_is_idempotent_and_query_free() {
        let pool = MemoryPool::new(vec![
            resource("m1", Category::Meditation),
            resource("b1", Category::Breathing),
            resource("p1", Category::Podcast),
        ]);
        let mut sampler = FirstN;

        let plan = generate(MoodState::VeryBad, &slots(1, 1, 0), &pool, &mut sampler)
            .await
            .unwrap();
        let queries_after_generate = pool.query_count();

        let rebalanced = rebalance(&plan, &slots(1, 1, 0), &pool, &mut sampler)
            .await
            .unwrap();

        assert_eq!(all_ids(&rebalanced), all_ids(&plan));
        assert_eq!(pool.query_count(), queries_after_generate);
    }

    #[tokio::test]
    async fn test_rebalance_shrink_retains_head_and_drops_tail() {
        let existing = DailyPlan {
            mood: MoodState::Good,
            generated_at: DateTime::now(),
            morning: vec![
                resource("a", Category::Learning),
                resource("b", Category::Podcast),
            ],
            afternoon: vec![resource("c", Category::Meditation)],
            evening: Vec::new(),
        };
        let pool = MemoryPool::new(Vec::new());
        let mut sampler = FirstN;

        let plan = rebalance(&existing, &slots(1, 1, 0), &pool, &mut sampler)
            .await
            .unwrap();

        assert_eq!(plan.morning.len(), 1);
        assert_eq!(plan.morning[0].id, "a");
        assert_eq!(plan.afternoon[0].id, "c");
        // Nothing grew, so no queries.
        assert_eq!(pool.query_count(), 0);
    }

    #[tokio::test]
    async fn test_rebalance_grow_draws_only_shortfall() {
        let existing = DailyPlan {
            mood: MoodState::Good,
            generated_at: DateTime::now(),
            morning: vec![resource("a", Category::Learning)],
            afternoon: Vec::new(),
            evening: Vec::new(),
        };
        // Good/Morning draws from {Learning, Podcast}. "a" is retained and
        // must not be drawn again.
        let pool = MemoryPool::new(vec![
            resource("a", Category::Learning),
            resource("x", Category::Learning),
            resource("y", Category::Podcast),
        ]);
        let mut sampler = FirstN;

        let plan = rebalance(&existing, &slots(2, 0, 0), &pool, &mut sampler)
            .await
            .unwrap();

        assert_eq!(plan.morning.len(), 2);
        assert_eq!(plan.morning[0].id, "a");
        assert_ne!(plan.morning[1].id, "a");
        assert_eq!(pool.query_count(), 1);
    }

    #[tokio::test]
    async fn test_rebalance_grow_partial_fill_is_silent() {
        let existing = DailyPlan {
            mood: MoodState::Good,
            generated_at: DateTime::now(),
            morning: vec![resource("a", Category::Learning)],
            afternoon: Vec::new(),
            evening: Vec::new(),
        };
        // Nothing new is eligible, so the segment stays at 1 of 3.
        let pool = MemoryPool::new(vec![resource("a", Category::Learning)]);
        let mut sampler = FirstN;

        let plan = rebalance(&existing, &slots(3, 0, 0), &pool, &mut sampler)
            .await
            .unwrap();

        assert_eq!(plan.morning.len(), 1);
        assert_eq!(plan.morning[0].id, "a");
    }

    #[tokio::test]
    async fn test_rebalance_keeps_recorded_mood() {
        let existing = DailyPlan {
            mood: MoodState::Bad,
            generated_at: DateTime::now(),
            morning: Vec::new(),
            afternoon: Vec::new(),
            evening: Vec::new(),
        };
        let pool = MemoryPool::new(vec![resource("m1", Category::Meditation)]);
        let mut sampler = FirstN;

        let plan = rebalance(&existing, &slots(1, 0, 0), &pool, &mut sampler)
            .await
            .unwrap();

        assert_eq!(plan.mood, MoodState::Bad);
        // Bad/Morning is {Breathing, Meditation}, so m1 qualifies.
        assert_eq!(plan.morning[0].id, "m1");
    }
}
