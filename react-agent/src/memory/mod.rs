use serde::{Deserialize, Serialize};

/// Action/observation transcript of a single run.
///
/// Entries are only ever added in `Action:`/`Observation:` pairs, so the
/// length is always twice the number of recorded steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    entries: Vec<String>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, action: &str, observation: &str) {
        self.entries.push(format!("Action: {}", action));
        self.entries.push(format!("Observation: {}", observation));
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn steps(&self) -> usize {
        self.entries.len() / 2
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn render(&self) -> String {
        self.entries.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_appends_pair_in_order() {
        let mut history = History::new();
        history.record("Search[capital of France]", "Paris");

        assert_eq!(
            history.entries(),
            &["Action: Search[capital of France]", "Observation: Paris"]
        );
        assert_eq!(history.steps(), 1);
    }

    #[test]
    fn test_render_and_clear() {
        let mut history = History::new();
        assert_eq!(history.render(), "");

        history.record("A[1]", "one");
        history.record("B[2]", "two");
        assert_eq!(history.len(), 4);
        assert_eq!(history.render(), "Action: A[1]\nObservation: one\nAction: B[2]\nObservation: two");

        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.steps(), 0);
    }
}
