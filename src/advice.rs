//! Text analysis capability for meal advice and reflection feedback.
//!
//! The analysis backend is currently switched off; [`DisabledAdvisor`] is
//! what the daemon wires in.

use crate::logstore::FoodEntry;

pub trait Advisor: Send + Sync {
    fn meal_advice(&self, meal: &FoodEntry) -> String;

    fn reflection_feedback(&self, text: &str) -> String;
}

/// Always answers that analysis is unavailable
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledAdvisor;

impl Advisor for DisabledAdvisor {
    fn meal_advice(&self, _meal: &FoodEntry) -> String {
        "(анализ временно недоступен)".to_string()
    }

    fn reflection_feedback(&self, _text: &str) -> String {
        "Анализ временно недоступен.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_advisor() {
        let advisor = DisabledAdvisor;
        let meal = FoodEntry {
            label: "обед".to_string(),
            description: "суп".to_string(),
        };
        assert!(advisor.meal_advice(&meal).contains("недоступен"));
        assert!(advisor.reflection_feedback("день").contains("недоступен"));
    }
}
