//! Filtered and sorted views over a todo collection.
//!
//! Everything here is a pure function of its inputs. Views are recomputed
//! on every read and never cached, so they cannot go stale relative to the
//! collection they were derived from.

use serde::{Deserialize, Serialize};

use crate::types::{Filter, SortOrder, Todo};

/// Filter then sort, returning a new vector. The input is never modified.
pub fn project(todos: &[Todo], filter: Filter, sort: SortOrder) -> Vec<Todo> {
    let mut view: Vec<Todo> = todos.iter().filter(|t| filter.matches(t)).cloned().collect();
    sort_todos(&mut view, sort);
    view
}

/// Stable sort; ties keep their collection order.
pub fn sort_todos(todos: &mut [Todo], sort: SortOrder) {
    match sort {
        SortOrder::Date => todos.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortOrder::Priority => todos.sort_by_key(|t| t.priority.rank()),
        SortOrder::Alphabetical => todos.sort_by(|a, b| a.text.cmp(&b.text)),
    }
}

/// Aggregate counts over a collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
}

impl Counts {
    pub fn of(todos: &[Todo]) -> Self {
        let completed = todos.iter().filter(|t| t.completed).count();
        Self {
            total: todos.len(),
            active: todos.len() - completed,
            completed,
        }
    }

    /// `round(completed / total * 100)`, or 0 for an empty collection.
    pub fn completion_percentage(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        // Integer half-up rounding of completed * 100 / total.
        ((self.completed * 200 + self.total) / (2 * self.total)) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Priority, TodoId};
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn todo(id: &str, text: &str, completed: bool, priority: Priority, secs: i64) -> Todo {
        Todo {
            id: TodoId::from(id),
            text: text.to_string(),
            completed,
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            priority,
        }
    }

    fn texts(todos: &[Todo]) -> Vec<&str> {
        todos.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_active_by_date_scenario() {
        let todos = vec![
            todo("1", "Buy milk", false, Priority::Medium, 100),
            todo("2", "Call mom", true, Priority::High, 200),
        ];
        let view = project(&todos, Filter::Active, SortOrder::Date);
        assert_eq!(texts(&view), vec!["Buy milk"]);
    }

    #[test]
    fn test_date_sort_newest_first_with_stable_ties() {
        let todos = vec![
            todo("1", "a", false, Priority::Medium, 100),
            todo("2", "b", false, Priority::Medium, 300),
            todo("3", "c", false, Priority::Medium, 100),
        ];
        let view = project(&todos, Filter::All, SortOrder::Date);
        assert_eq!(texts(&view), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_priority_sort() {
        let todos = vec![
            todo("1", "low", false, Priority::Low, 1),
            todo("2", "high", false, Priority::High, 2),
            todo("3", "medium", false, Priority::Medium, 3),
            todo("4", "high2", false, Priority::High, 4),
        ];
        let view = project(&todos, Filter::All, SortOrder::Priority);
        assert_eq!(texts(&view), vec!["high", "high2", "medium", "low"]);
    }

    #[test]
    fn test_alphabetical_is_case_sensitive() {
        let todos = vec![
            todo("1", "banana", false, Priority::Medium, 1),
            todo("2", "Apple", false, Priority::Medium, 2),
            todo("3", "apple", false, Priority::Medium, 3),
        ];
        let view = project(&todos, Filter::All, SortOrder::Alphabetical);
        assert_eq!(texts(&view), vec!["Apple", "apple", "banana"]);
    }

    #[test]
    fn test_projection_does_not_touch_input() {
        let todos = vec![
            todo("1", "b", true, Priority::Low, 1),
            todo("2", "a", false, Priority::High, 2),
        ];
        let before = todos.clone();
        let _ = project(&todos, Filter::Completed, SortOrder::Alphabetical);
        assert_eq!(todos, before);
    }

    #[test]
    fn test_counts() {
        let todos = vec![
            todo("1", "a", true, Priority::Low, 1),
            todo("2", "b", false, Priority::Low, 2),
            todo("3", "c", false, Priority::Low, 3),
        ];
        let counts = Counts::of(&todos);
        assert_eq!(counts.total, 3);
        assert_eq!(counts.active, 2);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.completion_percentage(), 33);
    }

    #[test]
    fn test_completion_percentage_edges() {
        assert_eq!(Counts::of(&[]).completion_percentage(), 0);
        let half = Counts { total: 2, active: 1, completed: 1 };
        assert_eq!(half.completion_percentage(), 50);
        let two_thirds = Counts { total: 3, active: 1, completed: 2 };
        assert_eq!(two_thirds.completion_percentage(), 67);
        let all = Counts { total: 7, active: 0, completed: 7 };
        assert_eq!(all.completion_percentage(), 100);
        // 1/8 = 12.5% rounds up
        let eighth = Counts { total: 8, active: 7, completed: 1 };
        assert_eq!(eighth.completion_percentage(), 13);
    }

    fn arb_priority() -> impl Strategy<Value = Priority> {
        prop_oneof![Just(Priority::Low), Just(Priority::Medium), Just(Priority::High)]
    }

    fn arb_todos() -> impl Strategy<Value = Vec<Todo>> {
        prop::collection::vec(
            ("[a-zA-Z ]{1,8}", any::<bool>(), arb_priority(), 0i64..1_000),
            0..40,
        )
        .prop_map(|items| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, (text, completed, priority, secs))| {
                    todo(&i.to_string(), &text, completed, priority, secs)
                })
                .collect()
        })
    }

    fn ids(todos: &[Todo]) -> HashSet<TodoId> {
        todos.iter().map(|t| t.id.clone()).collect()
    }

    proptest! {
        #[test]
        fn active_and_completed_partition_all(todos in arb_todos()) {
            let all = ids(&project(&todos, Filter::All, SortOrder::Date));
            let active = ids(&project(&todos, Filter::Active, SortOrder::Date));
            let completed = ids(&project(&todos, Filter::Completed, SortOrder::Date));
            prop_assert!(active.is_disjoint(&completed));
            let union: HashSet<_> = active.union(&completed).cloned().collect();
            prop_assert_eq!(union, all);
        }

        #[test]
        fn priority_sort_is_monotonic(todos in arb_todos()) {
            let view = project(&todos, Filter::All, SortOrder::Priority);
            for pair in view.windows(2) {
                prop_assert!(pair[0].priority.rank() <= pair[1].priority.rank());
            }
        }

        #[test]
        fn alphabetical_sort_matches_str_order_and_is_stable(todos in arb_todos()) {
            let view = project(&todos, Filter::All, SortOrder::Alphabetical);
            let position = |t: &Todo| todos.iter().position(|o| o.id == t.id).unwrap();
            for pair in view.windows(2) {
                prop_assert!(pair[0].text <= pair[1].text);
                if pair[0].text == pair[1].text {
                    prop_assert!(position(&pair[0]) < position(&pair[1]));
                }
            }
        }

        #[test]
        fn counts_agree_with_projections(todos in arb_todos()) {
            let counts = Counts::of(&todos);
            prop_assert_eq!(counts.active, project(&todos, Filter::Active, SortOrder::Date).len());
            prop_assert_eq!(counts.completed, project(&todos, Filter::Completed, SortOrder::Date).len());
            prop_assert!(counts.completion_percentage() <= 100);
        }
    }
}
