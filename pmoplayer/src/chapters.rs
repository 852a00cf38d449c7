//! Chapter-based intro detection for the skip-intro action.
//!
//! Everything here is a pure function of `(chapters, current_time)`; the
//! session only keeps the last answer around to report enter/exit edges.

use serde::{Deserialize, Serialize};

/// Chapter marker as returned by the metadata provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub timestamp_seconds: f64,
    pub name: String,
}

impl Chapter {
    pub fn new(timestamp_seconds: f64, name: impl Into<String>) -> Self {
        Self {
            timestamp_seconds,
            name: name.into(),
        }
    }
}

/// Half-open interval `[start, end)` covered by the intro.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct IntroWindow {
    pub start: f64,
    pub end: f64,
}

const INTRO_MARKER: &str = "intro";

impl IntroWindow {
    /// Finds the intro window of a chapter list.
    ///
    /// The first chapter (by timestamp) whose name contains "intro"
    /// (case-insensitive) opens the window; the next chapter strictly after it
    /// closes it. Without a closing chapter there is no window.
    pub fn detect(chapters: &[Chapter]) -> Option<IntroWindow> {
        let mut sorted: Vec<&Chapter> = chapters
            .iter()
            .filter(|c| c.timestamp_seconds.is_finite())
            .collect();
        sorted.sort_by(|a, b| a.timestamp_seconds.total_cmp(&b.timestamp_seconds));

        let intro = sorted
            .iter()
            .find(|c| c.name.to_lowercase().contains(INTRO_MARKER))?;
        let end = sorted
            .iter()
            .find(|c| c.timestamp_seconds > intro.timestamp_seconds)?;

        Some(IntroWindow {
            start: intro.timestamp_seconds,
            end: end.timestamp_seconds,
        })
    }

    pub fn contains(&self, time: f64) -> bool {
        self.start <= time && time < self.end
    }
}

/// Whether `time` falls inside the intro window of `chapters`.
pub fn is_in_intro_window(chapters: &[Chapter], time: f64) -> bool {
    IntroWindow::detect(chapters)
        .map(|w| w.contains(time))
        .unwrap_or(false)
}

/// Edge reported when playback crosses the intro window boundary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IntroTransition {
    Entered(IntroWindow),
    Exited,
}

/// Remembers the last inside/outside answer to turn it into edges.
#[derive(Clone, Debug, Default)]
pub struct IntroTracker {
    inside: bool,
}

impl IntroTracker {
    pub fn inside(&self) -> bool {
        self.inside
    }

    pub fn update(&mut self, chapters: &[Chapter], time: f64) -> Option<IntroTransition> {
        let window = IntroWindow::detect(chapters);
        let now_inside = window.map(|w| w.contains(time)).unwrap_or(false);
        let transition = match (self.inside, now_inside, window) {
            (false, true, Some(w)) => Some(IntroTransition::Entered(w)),
            (true, false, _) => Some(IntroTransition::Exited),
            _ => None,
        };
        self.inside = now_inside;
        transition
    }

    pub fn reset(&mut self) {
        self.inside = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode() -> Vec<Chapter> {
        vec![
            Chapter::new(0.0, "Intro"),
            Chapter::new(90.0, "Episode"),
            Chapter::new(1200.0, "Credits"),
        ]
    }

    #[test]
    fn test_window_is_half_open() {
        let chapters = episode();
        assert!(is_in_intro_window(&chapters, 45.0));
        assert!(is_in_intro_window(&chapters, 0.0));
        assert!(!is_in_intro_window(&chapters, 90.0));
        assert!(!is_in_intro_window(&chapters, 1199.0));
    }

    #[test]
    fn test_match_is_case_insensitive_substring() {
        let chapters = vec![
            Chapter::new(0.0, "Cold open"),
            Chapter::new(120.0, "OPENING INTRODUCTION"),
            Chapter::new(200.0, "Part 1"),
        ];
        let window = IntroWindow::detect(&chapters).unwrap();
        assert_eq!(window, IntroWindow { start: 120.0, end: 200.0 });
    }

    #[test]
    fn test_first_match_wins() {
        let chapters = vec![
            Chapter::new(300.0, "Intro B"),
            Chapter::new(10.0, "Intro A"),
            Chapter::new(60.0, "Story"),
            Chapter::new(400.0, "End"),
        ];
        let window = IntroWindow::detect(&chapters).unwrap();
        assert_eq!(window.start, 10.0);
        assert_eq!(window.end, 60.0);
    }

    #[test]
    fn test_no_closing_chapter_means_no_window() {
        let chapters = vec![Chapter::new(0.0, "Story"), Chapter::new(50.0, "Intro")];
        assert!(IntroWindow::detect(&chapters).is_none());
        assert!(!is_in_intro_window(&chapters, 60.0));
        assert!(IntroWindow::detect(&[]).is_none());
    }

    #[test]
    fn test_same_timestamp_does_not_close_window() {
        let chapters = vec![
            Chapter::new(0.0, "Intro"),
            Chapter::new(0.0, "Logo"),
            Chapter::new(30.0, "Story"),
        ];
        assert_eq!(IntroWindow::detect(&chapters).unwrap().end, 30.0);
    }

    #[test]
    fn test_tracker_reports_edges() {
        let chapters = episode();
        let mut tracker = IntroTracker::default();

        assert!(matches!(
            tracker.update(&chapters, 1.0),
            Some(IntroTransition::Entered(_))
        ));
        assert_eq!(tracker.update(&chapters, 2.0), None);
        assert_eq!(tracker.update(&chapters, 95.0), Some(IntroTransition::Exited));
        assert_eq!(tracker.update(&chapters, 96.0), None);
        assert_eq!(tracker.update(&[], 10.0), None);
    }
}
