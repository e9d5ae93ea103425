// src/navigation.rs

//! Navigation Controller.
//!
//! Owns the current index into the image list. Every operation is a pure
//! index transform: when its precondition does not hold it is a silent no-op
//! (no wrap-around, no error). Operations report whether the index changed so
//! the caller knows when to invalidate the current frame.

use crate::input::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigator {
    current: usize,
    total: usize,
    jump_distance: usize,
}

impl Navigator {
    /// Creates a navigator positioned on the first of `total` items.
    ///
    /// `total` must be at least 1; the image list guarantees this. A zero
    /// `jump_distance` is raised to 1.
    pub fn new(total: usize, jump_distance: usize) -> Self {
        debug_assert!(total >= 1, "Navigator requires a non-empty list");
        Navigator {
            current: 0,
            total: total.max(1),
            jump_distance: jump_distance.max(1),
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn jump_distance(&self) -> usize {
        self.jump_distance
    }

    fn last_index(&self) -> usize {
        self.total - 1
    }

    fn move_to(&mut self, index: usize) -> bool {
        let changed = index != self.current;
        self.current = index;
        changed
    }

    pub fn next(&mut self) -> bool {
        if self.current < self.last_index() {
            self.move_to(self.current + 1)
        } else {
            false
        }
    }

    pub fn prev(&mut self) -> bool {
        if self.current > 0 {
            self.move_to(self.current - 1)
        } else {
            false
        }
    }

    /// Advances by `n` only if the whole jump fits; never partially advances.
    pub fn jump_forward(&mut self, n: usize) -> bool {
        match self.current.checked_add(n) {
            Some(target) if target <= self.last_index() => self.move_to(target),
            _ => false,
        }
    }

    /// Steps back by `n` only if the whole jump fits.
    pub fn jump_backward(&mut self, n: usize) -> bool {
        match self.current.checked_sub(n) {
            Some(target) => self.move_to(target),
            None => false,
        }
    }

    pub fn first(&mut self) -> bool {
        self.move_to(0)
    }

    pub fn last(&mut self) -> bool {
        self.move_to(self.last_index())
    }

    /// Applies a navigation command. Non-navigation commands are ignored.
    /// Returns true if the index changed.
    pub fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::Next => self.next(),
            Command::Prev => self.prev(),
            Command::JumpForward => self.jump_forward(self.jump_distance),
            Command::JumpBackward => self.jump_backward(self.jump_distance),
            Command::First => self.first(),
            Command::Last => self.last(),
            Command::ToggleFullscreen | Command::EmitCurrent | Command::Quit => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_then_prev_is_identity_away_from_boundaries() {
        for total in 2..8 {
            for start in 0..total - 1 {
                let mut nav = Navigator::new(total, 10);
                nav.current = start;
                assert!(nav.next());
                assert!(nav.prev());
                assert_eq!(nav.current(), start);
            }
        }
    }

    #[test]
    fn boundaries_are_silent_no_ops() {
        let mut nav = Navigator::new(3, 10);
        assert!(!nav.prev());
        assert_eq!(nav.current(), 0);
        nav.last();
        assert!(!nav.next());
        assert_eq!(nav.current(), 2);
    }

    #[test]
    fn single_item_list_never_moves() {
        let mut nav = Navigator::new(1, 10);
        for command in [
            Command::Next,
            Command::Prev,
            Command::JumpForward,
            Command::JumpBackward,
            Command::First,
            Command::Last,
        ] {
            assert!(!nav.apply(command));
            assert_eq!(nav.current(), 0);
        }
    }

    #[test]
    fn jump_forward_is_all_or_nothing() {
        let total = 25;
        for start in 0..total {
            let mut nav = Navigator::new(total, 10);
            nav.current = start;
            let moved = nav.jump_forward(10);
            if start + 10 > total - 1 {
                assert!(!moved);
                assert_eq!(nav.current(), start);
            } else {
                assert!(moved);
                assert_eq!(nav.current(), start + 10);
            }
        }
    }

    #[test]
    fn jump_backward_is_all_or_nothing() {
        let mut nav = Navigator::new(30, 10);
        nav.current = 9;
        assert!(!nav.jump_backward(10));
        assert_eq!(nav.current(), 9);
        nav.current = 10;
        assert!(nav.jump_backward(10));
        assert_eq!(nav.current(), 0);
    }

    #[test]
    fn first_and_last_report_change_only_when_moving() {
        let mut nav = Navigator::new(5, 10);
        assert!(!nav.first());
        assert!(nav.last());
        assert_eq!(nav.current(), 4);
        assert!(!nav.last());
        assert!(nav.first());
        assert_eq!(nav.current(), 0);
    }

    #[test]
    fn apply_uses_configured_jump_distance() {
        let mut nav = Navigator::new(10, 3);
        assert!(nav.apply(Command::JumpForward));
        assert_eq!(nav.current(), 3);
        assert!(nav.apply(Command::JumpBackward));
        assert_eq!(nav.current(), 0);
        assert!(!nav.apply(Command::EmitCurrent));
    }

    #[test]
    fn zero_jump_distance_is_raised_to_one() {
        assert_eq!(Navigator::new(4, 0).jump_distance(), 1);
    }
}
