use std::collections::VecDeque;

/// Recently navigated-to song URLs, oldest first, capped at `capacity`.
#[derive(Debug, Clone)]
pub struct PlaybackHistory {
    urls: VecDeque<String>,
    capacity: usize,
}

impl PlaybackHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            urls: VecDeque::new(),
            capacity,
        }
    }

    /// Append `url`, evicting the oldest entry when full.  A zero-capacity
    /// history records nothing.
    pub fn push(&mut self, url: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        while self.urls.len() >= self.capacity {
            self.urls.pop_front();
        }
        self.urls.push_back(url.into());
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.iter().any(|u| u == url)
    }

    pub fn clear(&mut self) {
        self.urls.clear();
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.urls.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut history = PlaybackHistory::new(3);
        for url in ["a", "b", "c", "d"] {
            history.push(url);
            assert!(history.len() <= 3);
        }
        assert!(!history.contains("a"));
        assert_eq!(history.iter().collect::<Vec<_>>(), vec!["b", "c", "d"]);
    }

    #[test]
    fn many_insertions_stay_bounded() {
        let mut history = PlaybackHistory::new(10);
        for i in 0..100 {
            history.push(format!("song-{i}"));
        }
        assert_eq!(history.len(), 10);
        assert_eq!(history.iter().next(), Some("song-90"));
        assert_eq!(history.iter().last(), Some("song-99"));
    }

    #[test]
    fn clear_empties() {
        let mut history = PlaybackHistory::new(2);
        history.push("a");
        history.clear();
        assert!(history.is_empty());
        assert!(!history.contains("a"));
    }

    #[test]
    fn huge_capacity_allocates_lazily() {
        let mut history = PlaybackHistory::new(usize::MAX);
        history.push("a");
        history.push("b");
        assert_eq!(history.len(), 2);
        assert_eq!(history.capacity(), usize::MAX);
    }

    #[test]
    fn zero_capacity_records_nothing() {
        let mut history = PlaybackHistory::new(0);
        history.push("a");
        assert!(history.is_empty());
    }
}
