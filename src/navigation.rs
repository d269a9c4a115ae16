//! Card navigation state machine.
//!
//! The visible card is either `Browsing(index)` or the end-of-chapter
//! `Summary`. Every visible change runs as explicit timed phases: the current
//! card exits for [`EXIT_PHASE`], the index swaps, then the next card enters
//! for [`ENTER_PHASE`]. Callers drive time with [`CardNavigator::tick`]. While
//! a transition is running every navigation input is rejected, so a burst of
//! input yields at most one transition at a time.

use serde::Serialize;
use std::time::Duration;

pub const EXIT_PHASE: Duration = Duration::from_millis(250);
pub const ENTER_PHASE: Duration = Duration::from_millis(300);

/// Horizontal travel needed at release for a swipe to navigate.
pub const SWIPE_THRESHOLD_PX: f32 = 60.0;
/// Vertical travel after which a gesture is treated as page scroll.
pub const VERTICAL_LOCK_PX: f32 = 10.0;
/// Horizontal travel before the card starts following the pointer.
pub const HORIZONTAL_TRACK_PX: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    fn sign(self) -> f32 {
        match self {
            Direction::Left => -1.0,
            Direction::Right => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "index")]
pub enum View {
    Browsing(usize),
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Card(usize),
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Animation {
    Idle,
    Exiting {
        direction: Direction,
        target: Target,
        remaining: Duration,
    },
    Entering {
        from: Direction,
        remaining: Duration,
    },
}

/// Visible changes the owner reacts to (persistence, summary display).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavEvent {
    IndexChanged(usize),
    SummaryEntered,
    SummaryLeft,
}

#[derive(Debug, Clone)]
pub struct CardNavigator {
    total: usize,
    index: usize,
    in_summary: bool,
    animation: Animation,
    drag_offset: f32,
    events: Vec<NavEvent>,
}

impl CardNavigator {
    /// `None` for an empty deck: there is nothing to navigate.
    pub fn new(total: usize, initial_index: usize) -> Option<Self> {
        if total == 0 {
            return None;
        }
        Some(Self {
            total,
            index: initial_index.min(total - 1),
            in_summary: false,
            animation: Animation::Idle,
            drag_offset: 0.0,
            events: Vec::new(),
        })
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn view(&self) -> View {
        if self.in_summary {
            View::Summary
        } else {
            View::Browsing(self.index)
        }
    }

    /// Last browsed card; stays on the final card while the summary shows.
    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn in_summary(&self) -> bool {
        self.in_summary
    }

    pub fn is_animating(&self) -> bool {
        !matches!(self.animation, Animation::Idle)
    }

    pub fn exit_direction(&self) -> Option<Direction> {
        match self.animation {
            Animation::Exiting { direction, .. } => Some(direction),
            _ => None,
        }
    }

    pub fn enter_direction(&self) -> Option<Direction> {
        match self.animation {
            Animation::Entering { from, .. } => Some(from),
            _ => None,
        }
    }

    pub fn drag_offset(&self) -> f32 {
        self.drag_offset
    }

    pub fn set_drag_offset(&mut self, offset: f32) {
        self.drag_offset = if self.is_animating() { 0.0 } else { offset };
    }

    /// Next card, or the summary from the last card.
    pub fn advance(&mut self) -> bool {
        if self.is_animating() || self.in_summary {
            return false;
        }
        let target = if self.index + 1 < self.total {
            Target::Card(self.index + 1)
        } else {
            Target::Summary
        };
        self.start_exit(Direction::Left, target);
        true
    }

    pub fn retreat(&mut self) -> bool {
        if self.is_animating() || self.in_summary || self.index == 0 {
            return false;
        }
        self.start_exit(Direction::Right, Target::Card(self.index - 1));
        true
    }

    pub fn jump_to(&mut self, index: usize) -> bool {
        if self.is_animating() || self.in_summary || index == self.index || index >= self.total {
            return false;
        }
        let direction = if index > self.index {
            Direction::Left
        } else {
            Direction::Right
        };
        self.start_exit(direction, Target::Card(index));
        true
    }

    /// Leave the summary for the last card; only the enter phase plays.
    pub fn go_back_from_summary(&mut self) -> bool {
        if self.is_animating() || !self.in_summary {
            return false;
        }
        self.in_summary = false;
        self.events.push(NavEvent::SummaryLeft);
        self.set_index(self.total - 1);
        self.animation = Animation::Entering {
            from: Direction::Left,
            remaining: ENTER_PHASE,
        };
        true
    }

    /// Start over from the first card, without animation.
    pub fn restart(&mut self) -> bool {
        if self.is_animating() || !self.in_summary {
            return false;
        }
        self.in_summary = false;
        self.events.push(NavEvent::SummaryLeft);
        self.set_index(0);
        true
    }

    /// Advance animation time, crossing as many phase boundaries as `elapsed` covers.
    pub fn tick(&mut self, elapsed: Duration) {
        let mut left = elapsed;
        loop {
            match self.animation {
                Animation::Idle => return,
                Animation::Exiting {
                    direction,
                    target,
                    remaining,
                } => {
                    if left < remaining {
                        self.animation = Animation::Exiting {
                            direction,
                            target,
                            remaining: remaining - left,
                        };
                        return;
                    }
                    left -= remaining;
                    match target {
                        Target::Card(index) => self.set_index(index),
                        Target::Summary => {
                            self.in_summary = true;
                            self.events.push(NavEvent::SummaryEntered);
                        }
                    }
                    self.animation = Animation::Entering {
                        from: direction.opposite(),
                        remaining: ENTER_PHASE,
                    };
                }
                Animation::Entering { from, remaining } => {
                    if left < remaining {
                        self.animation = Animation::Entering {
                            from,
                            remaining: remaining - left,
                        };
                    } else {
                        self.animation = Animation::Idle;
                    }
                    return;
                }
            }
        }
    }

    /// Events produced since the last call, oldest first.
    pub fn drain_events(&mut self) -> Vec<NavEvent> {
        std::mem::take(&mut self.events)
    }

    fn start_exit(&mut self, direction: Direction, target: Target) {
        self.drag_offset = 0.0;
        self.animation = Animation::Exiting {
            direction,
            target,
            remaining: EXIT_PHASE,
        };
    }

    fn set_index(&mut self, index: usize) {
        if index != self.index {
            self.index = index;
            self.events.push(NavEvent::IndexChanged(index));
        }
    }

    /// Where the card should be drawn right now.
    pub fn card_transform(&self) -> CardTransform {
        if self.drag_offset != 0.0 {
            return CardTransform::dragging(self.drag_offset);
        }
        match self.animation {
            Animation::Idle => CardTransform::resting(),
            Animation::Exiting {
                direction,
                remaining,
                ..
            } => {
                let t = progress(EXIT_PHASE, remaining);
                CardTransform {
                    translate: Translate::Percent(direction.sign() * 120.0 * t),
                    rotate_deg: direction.sign() * 12.0 * t,
                    opacity: 1.0 - t,
                }
            }
            Animation::Entering { from, remaining } => {
                let t = progress(ENTER_PHASE, remaining);
                CardTransform {
                    translate: Translate::Percent(from.sign() * 80.0 * (1.0 - t)),
                    rotate_deg: from.sign() * 6.0 * (1.0 - t),
                    opacity: t,
                }
            }
        }
    }
}

fn progress(phase: Duration, remaining: Duration) -> f32 {
    let done = phase.saturating_sub(remaining).as_secs_f32();
    (done / phase.as_secs_f32()).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "unit", content = "value")]
pub enum Translate {
    Px(f32),
    Percent(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CardTransform {
    pub translate: Translate,
    pub rotate_deg: f32,
    pub opacity: f32,
}

impl CardTransform {
    pub fn resting() -> Self {
        Self {
            translate: Translate::Px(0.0),
            rotate_deg: 0.0,
            opacity: 1.0,
        }
    }

    /// Follows the pointer with a slight tilt, fading to at most half opacity.
    pub fn dragging(offset: f32) -> Self {
        Self {
            translate: Translate::Px(offset),
            rotate_deg: offset / 400.0 * 8.0,
            opacity: (1.0 - offset.abs() / 600.0).max(0.5),
        }
    }
}

/// What a finished pointer gesture asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    Advance,
    Retreat,
    SnapBack,
}

/// Classifies a pointer drag as a horizontal swipe or a vertical scroll.
///
/// Once a gesture is classified vertical it stops tracking horizontally, so
/// scrolling inside a card never turns into navigation.
#[derive(Debug, Clone, Default)]
pub struct GestureTracker {
    start_x: f32,
    start_y: f32,
    current_x: f32,
    dragging: bool,
    vertical: bool,
}

impl GestureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pointer_down(&mut self, x: f32, y: f32, animating: bool) {
        if animating {
            return;
        }
        self.start_x = x;
        self.start_y = y;
        self.current_x = x;
        self.dragging = true;
        self.vertical = false;
    }

    /// New drag offset when it changed.
    pub fn pointer_move(&mut self, x: f32, y: f32, animating: bool) -> Option<f32> {
        if !self.dragging || animating {
            return None;
        }
        let dx = x - self.start_x;
        let dy = y - self.start_y;

        if !self.vertical && dy.abs() > VERTICAL_LOCK_PX && dy.abs() > dx.abs() {
            self.vertical = true;
            self.dragging = false;
            return Some(0.0);
        }

        if !self.vertical && dx.abs() > HORIZONTAL_TRACK_PX {
            self.current_x = x;
            return Some(dx);
        }
        None
    }

    pub fn pointer_up(&mut self, animating: bool) -> GestureOutcome {
        let was_dragging = self.dragging;
        self.dragging = false;
        if !was_dragging || animating {
            return GestureOutcome::SnapBack;
        }

        let diff = self.start_x - self.current_x;
        if diff.abs() > SWIPE_THRESHOLD_PX {
            if diff > 0.0 {
                GestureOutcome::Advance
            } else {
                GestureOutcome::Retreat
            }
        } else {
            GestureOutcome::SnapBack
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }
}

/// A horizontal swipe on the summary screen returns to the last card.
pub fn summary_swipe_goes_back(start: (f32, f32), end: (f32, f32)) -> bool {
    let dx = start.0 - end.0;
    let dy = (start.1 - end.1).abs();
    dx.abs() > SWIPE_THRESHOLD_PX && dx.abs() > dy
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    Advance,
    Retreat,
    BackFromSummary,
}

/// Arrow keys navigate unless focus is in a text field.
pub fn key_command(key: Key, in_summary: bool, from_text_input: bool) -> Option<NavCommand> {
    if from_text_input {
        return None;
    }
    match (key, in_summary) {
        (Key::ArrowLeft | Key::ArrowUp, true) => Some(NavCommand::BackFromSummary),
        (_, true) => None,
        (Key::ArrowRight | Key::ArrowDown, false) => Some(NavCommand::Advance),
        (Key::ArrowLeft | Key::ArrowUp, false) => Some(NavCommand::Retreat),
        (Key::Other, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(550);

    fn settle(nav: &mut CardNavigator) {
        nav.tick(WINDOW);
        assert!(!nav.is_animating());
    }

    #[test]
    fn test_empty_deck_has_no_navigator() {
        assert!(CardNavigator::new(0, 0).is_none());
    }

    #[test]
    fn test_initial_index_is_clamped() {
        let nav = CardNavigator::new(3, 10).unwrap();
        assert_eq!(nav.view(), View::Browsing(2));
    }

    #[test]
    fn test_advance_runs_two_phases() {
        let mut nav = CardNavigator::new(5, 1).unwrap();
        assert!(nav.advance());
        assert!(nav.is_animating());
        assert_eq!(nav.exit_direction(), Some(Direction::Left));
        assert_eq!(nav.view(), View::Browsing(1));

        nav.tick(Duration::from_millis(249));
        assert_eq!(nav.view(), View::Browsing(1));

        nav.tick(Duration::from_millis(1));
        assert_eq!(nav.view(), View::Browsing(2));
        assert_eq!(nav.exit_direction(), None);
        assert_eq!(nav.enter_direction(), Some(Direction::Right));
        assert_eq!(nav.drain_events(), vec![NavEvent::IndexChanged(2)]);

        nav.tick(Duration::from_millis(299));
        assert!(nav.is_animating());
        nav.tick(Duration::from_millis(1));
        assert!(!nav.is_animating());
        assert_eq!(nav.enter_direction(), None);
    }

    #[test]
    fn test_inputs_ignored_while_animating() {
        let mut nav = CardNavigator::new(5, 2).unwrap();
        assert!(nav.advance());
        assert!(!nav.advance());
        assert!(!nav.retreat());
        assert!(!nav.jump_to(0));

        nav.tick(Duration::from_millis(400));
        assert!(!nav.advance());
        assert!(!nav.jump_to(4));

        nav.tick(Duration::from_millis(150));
        assert_eq!(nav.view(), View::Browsing(3));
        assert_eq!(nav.drain_events(), vec![NavEvent::IndexChanged(3)]);
    }

    #[test]
    fn test_retreat_is_noop_at_first_card() {
        let mut nav = CardNavigator::new(5, 0).unwrap();
        assert!(!nav.retreat());
        assert!(!nav.is_animating());
        assert!(nav.drain_events().is_empty());
    }

    #[test]
    fn test_retreat_moves_right() {
        let mut nav = CardNavigator::new(5, 1).unwrap();
        assert!(nav.retreat());
        assert_eq!(nav.exit_direction(), Some(Direction::Right));
        nav.tick(EXIT_PHASE);
        assert_eq!(nav.enter_direction(), Some(Direction::Left));
        assert_eq!(nav.view(), View::Browsing(0));
    }

    #[test]
    fn test_jump_to_direction_and_guards() {
        let mut nav = CardNavigator::new(5, 2).unwrap();
        assert!(!nav.jump_to(2));
        assert!(!nav.jump_to(5));

        assert!(nav.jump_to(4));
        assert_eq!(nav.exit_direction(), Some(Direction::Left));
        settle(&mut nav);
        assert_eq!(nav.view(), View::Browsing(4));

        assert!(nav.jump_to(1));
        assert_eq!(nav.exit_direction(), Some(Direction::Right));
        settle(&mut nav);
        assert_eq!(nav.view(), View::Browsing(1));
    }

    #[test]
    fn test_advancing_total_times_reaches_summary_once() {
        let total = 5;
        let mut nav = CardNavigator::new(total, 0).unwrap();
        let mut summaries = 0;
        for _ in 0..total {
            assert!(nav.advance());
            settle(&mut nav);
            summaries += nav
                .drain_events()
                .iter()
                .filter(|e| **e == NavEvent::SummaryEntered)
                .count();
        }
        assert_eq!(nav.view(), View::Summary);
        assert_eq!(summaries, 1);
        assert_eq!(nav.current_index(), total - 1);

        // Further advances stay put
        assert!(!nav.advance());
    }

    #[test]
    fn test_back_from_summary_plays_enter_only() {
        let mut nav = CardNavigator::new(2, 1).unwrap();
        nav.advance();
        settle(&mut nav);
        nav.drain_events();

        assert!(nav.go_back_from_summary());
        assert_eq!(nav.view(), View::Browsing(1));
        assert_eq!(nav.enter_direction(), Some(Direction::Left));
        assert_eq!(nav.drain_events(), vec![NavEvent::SummaryLeft]);

        assert!(!nav.go_back_from_summary());
        nav.tick(ENTER_PHASE);
        assert!(!nav.is_animating());
    }

    #[test]
    fn test_restart_from_summary() {
        let mut nav = CardNavigator::new(3, 2).unwrap();
        assert!(!nav.restart());
        nav.advance();
        nav.tick(EXIT_PHASE);
        // Still entering the summary
        assert!(!nav.restart());
        nav.tick(ENTER_PHASE);
        nav.drain_events();

        assert!(nav.restart());
        assert_eq!(nav.view(), View::Browsing(0));
        assert!(!nav.is_animating());
        assert_eq!(
            nav.drain_events(),
            vec![NavEvent::SummaryLeft, NavEvent::IndexChanged(0)]
        );
    }

    #[test]
    fn test_card_transform_phases() {
        let mut nav = CardNavigator::new(3, 0).unwrap();
        assert_eq!(nav.card_transform(), CardTransform::resting());

        nav.set_drag_offset(-200.0);
        let drag = nav.card_transform();
        assert_eq!(drag.translate, Translate::Px(-200.0));
        assert!((drag.rotate_deg + 4.0).abs() < 1e-4);
        assert!((drag.opacity - (1.0 - 200.0 / 600.0)).abs() < 1e-4);

        nav.set_drag_offset(-900.0);
        assert_eq!(nav.card_transform().opacity, 0.5);

        nav.advance();
        assert_eq!(nav.drag_offset(), 0.0);
        nav.tick(EXIT_PHASE - Duration::from_millis(1));
        let exiting = nav.card_transform();
        assert!(matches!(exiting.translate, Translate::Percent(p) if p < -100.0));
        assert!(exiting.rotate_deg < -11.0);

        nav.tick(Duration::from_millis(1));
        let entering = nav.card_transform();
        assert_eq!(entering.translate, Translate::Percent(80.0));
        assert!((entering.rotate_deg - 6.0).abs() < 1e-4);
        assert_eq!(entering.opacity, 0.0);

        nav.tick(ENTER_PHASE);
        assert_eq!(nav.card_transform(), CardTransform::resting());
    }

    #[test]
    fn test_drag_ignored_while_animating() {
        let mut nav = CardNavigator::new(3, 0).unwrap();
        nav.advance();
        nav.set_drag_offset(40.0);
        assert_eq!(nav.drag_offset(), 0.0);
    }

    #[test]
    fn test_swipe_right_past_threshold_retreats() {
        let mut tracker = GestureTracker::new();
        tracker.pointer_down(100.0, 300.0, false);
        assert_eq!(tracker.pointer_move(140.0, 302.0, false), Some(40.0));
        assert_eq!(tracker.pointer_move(180.0, 305.0, false), Some(80.0));
        assert_eq!(tracker.pointer_up(false), GestureOutcome::Retreat);
    }

    #[test]
    fn test_swipe_left_past_threshold_advances() {
        let mut tracker = GestureTracker::new();
        tracker.pointer_down(300.0, 300.0, false);
        tracker.pointer_move(200.0, 300.0, false);
        assert_eq!(tracker.pointer_up(false), GestureOutcome::Advance);
    }

    #[test]
    fn test_short_swipe_snaps_back() {
        let mut tracker = GestureTracker::new();
        tracker.pointer_down(100.0, 100.0, false);
        tracker.pointer_move(150.0, 100.0, false);
        assert_eq!(tracker.pointer_up(false), GestureOutcome::SnapBack);
    }

    #[test]
    fn test_vertical_gesture_is_never_a_swipe() {
        let mut tracker = GestureTracker::new();
        tracker.pointer_down(100.0, 100.0, false);
        assert_eq!(tracker.pointer_move(104.0, 130.0, false), Some(0.0));
        assert!(!tracker.is_dragging());
        // Later horizontal travel is ignored for the rest of the gesture
        assert_eq!(tracker.pointer_move(300.0, 130.0, false), None);
        assert_eq!(tracker.pointer_up(false), GestureOutcome::SnapBack);
    }

    #[test]
    fn test_gesture_during_animation_snaps_back() {
        let mut tracker = GestureTracker::new();
        tracker.pointer_down(100.0, 100.0, false);
        tracker.pointer_move(250.0, 100.0, false);
        assert_eq!(tracker.pointer_up(true), GestureOutcome::SnapBack);

        tracker.pointer_down(100.0, 100.0, true);
        assert!(!tracker.is_dragging());
    }

    #[test]
    fn test_summary_swipe() {
        assert!(summary_swipe_goes_back((300.0, 100.0), (200.0, 110.0)));
        assert!(summary_swipe_goes_back((100.0, 100.0), (200.0, 110.0)));
        assert!(!summary_swipe_goes_back((300.0, 100.0), (250.0, 100.0)));
        assert!(!summary_swipe_goes_back((300.0, 100.0), (200.0, 250.0)));
    }

    #[test]
    fn test_key_commands() {
        assert_eq!(key_command(Key::ArrowRight, false, false), Some(NavCommand::Advance));
        assert_eq!(key_command(Key::ArrowDown, false, false), Some(NavCommand::Advance));
        assert_eq!(key_command(Key::ArrowLeft, false, false), Some(NavCommand::Retreat));
        assert_eq!(key_command(Key::ArrowUp, true, false), Some(NavCommand::BackFromSummary));
        assert_eq!(key_command(Key::ArrowRight, true, false), None);
        assert_eq!(key_command(Key::ArrowRight, false, true), None);
        assert_eq!(key_command(Key::Other, false, false), None);
    }
}
