//! Keyboard and mouse input reduced to what the demos consume.
//!
//! Window events are pushed onto an [`InputQueue`] as they arrive and drained
//! into [`InputState`] once per frame. The state yields a [`FrameInput`]: the
//! movement [`CommandMask`], the cursor delta accumulated since the last
//! frame, and the current [`InputMode`].

use std::collections::{HashSet, VecDeque};

use bitflags::bitflags;
use tracing::debug;
pub use winit::keyboard::KeyCode;

bitflags! {
    /// Game commands derived from held keys and mode-switch presses.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CommandMask: u32 {
        const FORWARD = 1;
        const BACKWARD = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
        /// Escape was pressed this frame.
        const UNFOCUS = 1 << 4;
        /// Enter or a left click returned to play mode this frame.
        const FOCUS = 1 << 5;
    }
}

/// Whether input drives the camera (play) or is left to the UI (edit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    Edit,
    #[default]
    Play,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Left => Self::Left,
            winit::event::MouseButton::Right => Self::Right,
            winit::event::MouseButton::Middle => Self::Middle,
            _ => Self::Other,
        }
    }
}

/// A raw input event recorded by the window layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Key { code: KeyCode, pressed: bool },
    MouseButton { button: MouseButton, pressed: bool },
    /// Unaccelerated device motion, in device units.
    MouseMotion { dx: f64, dy: f64 },
    /// The window lost focus; held keys are released.
    FocusLost,
}

/// FIFO of input events waiting for the next frame.
#[derive(Debug, Default)]
pub struct InputQueue {
    events: VecDeque<InputEvent>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: InputEvent) {
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = InputEvent> + '_ {
        self.events.drain(..)
    }
}

/// Snapshot handed to frame listeners once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameInput {
    pub commands: CommandMask,
    pub cursor_delta: (f32, f32),
    pub mode: InputMode,
}

/// Held keys, accumulated cursor motion and the current mode.
#[derive(Debug, Default)]
pub struct InputState {
    held: HashSet<KeyCode>,
    edges: CommandMask,
    cursor_delta: (f32, f32),
    mode: InputMode,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn mode(&self) -> InputMode {
        self.mode
    }

    /// Apply one event. Returns the new mode when the event switched it.
    pub fn apply(&mut self, event: InputEvent) -> Option<InputMode> {
        match event {
            InputEvent::Key { code, pressed: true } => {
                self.held.insert(code);
                match code {
                    KeyCode::Escape => {
                        self.edges |= CommandMask::UNFOCUS;
                        self.switch_mode(InputMode::Edit)
                    }
                    KeyCode::Enter | KeyCode::NumpadEnter => {
                        self.edges |= CommandMask::FOCUS;
                        self.switch_mode(InputMode::Play)
                    }
                    _ => None,
                }
            }
            InputEvent::Key {
                code,
                pressed: false,
            } => {
                self.held.remove(&code);
                None
            }
            InputEvent::MouseButton {
                button: MouseButton::Left,
                pressed: true,
            } if self.mode == InputMode::Edit => {
                self.edges |= CommandMask::FOCUS;
                self.switch_mode(InputMode::Play)
            }
            InputEvent::MouseButton { .. } => None,
            InputEvent::MouseMotion { dx, dy } => {
                if self.mode == InputMode::Play {
                    self.cursor_delta.0 += dx as f32;
                    self.cursor_delta.1 += dy as f32;
                }
                None
            }
            InputEvent::FocusLost => {
                self.held.clear();
                None
            }
        }
    }

    /// Drain `queue` into the state, returning the last mode change, if any.
    pub fn process(&mut self, queue: &mut InputQueue) -> Option<InputMode> {
        let mut changed = None;
        for event in queue.drain() {
            if let Some(mode) = self.apply(event) {
                changed = Some(mode);
            }
        }
        changed
    }

    /// Consume `queue` for a frame that will not be rendered.
    ///
    /// Key state and mode changes still apply; the frame's cursor motion and
    /// command edges are dropped so they do not replay on the next drawn frame.
    pub fn skip_frame(&mut self, queue: &mut InputQueue) -> Option<InputMode> {
        let changed = self.process(queue);
        self.take_frame_input();
        changed
    }

    /// Movement commands from held keys; empty outside play mode.
    pub fn command_mask(&self) -> CommandMask {
        let mut mask = self.edges;
        if self.mode != InputMode::Play {
            return mask;
        }
        let bindings = [
            (KeyCode::KeyW, CommandMask::FORWARD),
            (KeyCode::KeyS, CommandMask::BACKWARD),
            (KeyCode::KeyA, CommandMask::LEFT),
            (KeyCode::KeyD, CommandMask::RIGHT),
        ];
        for (key, command) in bindings {
            if self.held.contains(&key) {
                mask |= command;
            }
        }
        mask
    }

    /// Take this frame's input, resetting the cursor delta and mode edges.
    pub fn take_frame_input(&mut self) -> FrameInput {
        let input = FrameInput {
            commands: self.command_mask(),
            cursor_delta: self.cursor_delta,
            mode: self.mode,
        };
        self.cursor_delta = (0.0, 0.0);
        self.edges = CommandMask::empty();
        input
    }

    fn switch_mode(&mut self, mode: InputMode) -> Option<InputMode> {
        if self.mode == mode {
            return None;
        }
        debug!(?mode, "Input mode changed");
        self.mode = mode;
        self.cursor_delta = (0.0, 0.0);
        Some(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, pressed: bool) -> InputEvent {
        InputEvent::Key { code, pressed }
    }

    #[test]
    fn test_command_bits_match_game_commands() {
        assert_eq!(CommandMask::FORWARD.bits(), 1);
        assert_eq!(CommandMask::BACKWARD.bits(), 2);
        assert_eq!(CommandMask::LEFT.bits(), 4);
        assert_eq!(CommandMask::RIGHT.bits(), 8);
        assert_eq!(CommandMask::UNFOCUS.bits(), 16);
        assert_eq!(CommandMask::FOCUS.bits(), 32);
    }

    #[test]
    fn test_held_keys_build_mask() {
        let mut state = InputState::new();
        state.apply(key(KeyCode::KeyW, true));
        state.apply(key(KeyCode::KeyD, true));
        assert_eq!(
            state.command_mask(),
            CommandMask::FORWARD | CommandMask::RIGHT
        );
        state.apply(key(KeyCode::KeyW, false));
        assert_eq!(state.command_mask(), CommandMask::RIGHT);
    }

    #[test]
    fn test_escape_enters_edit_mode_and_blocks_movement() {
        let mut state = InputState::new();
        state.apply(key(KeyCode::KeyW, true));
        assert_eq!(state.apply(key(KeyCode::Escape, true)), Some(InputMode::Edit));
        state.apply(InputEvent::MouseMotion { dx: 10.0, dy: 4.0 });

        let input = state.take_frame_input();
        assert_eq!(input.mode, InputMode::Edit);
        assert_eq!(input.commands, CommandMask::UNFOCUS);
        assert_eq!(input.cursor_delta, (0.0, 0.0));
    }

    #[test]
    fn test_click_returns_to_play_mode() {
        let mut state = InputState::new();
        state.apply(key(KeyCode::Escape, true));
        state.take_frame_input();
        let changed = state.apply(InputEvent::MouseButton {
            button: MouseButton::Left,
            pressed: true,
        });
        assert_eq!(changed, Some(InputMode::Play));
        assert!(state.take_frame_input().commands.contains(CommandMask::FOCUS));
    }

    #[test]
    fn test_cursor_delta_accumulates_and_resets() {
        let mut state = InputState::new();
        let mut queue = InputQueue::new();
        queue.push(InputEvent::MouseMotion { dx: 1.5, dy: -2.0 });
        queue.push(InputEvent::MouseMotion { dx: 0.5, dy: 1.0 });
        assert_eq!(state.process(&mut queue), None);
        assert!(queue.is_empty());

        assert_eq!(state.take_frame_input().cursor_delta, (2.0, -1.0));
        assert_eq!(state.take_frame_input().cursor_delta, (0.0, 0.0));
    }

    #[test]
    fn test_focus_lost_releases_keys() {
        let mut state = InputState::new();
        state.apply(key(KeyCode::KeyA, true));
        state.apply(InputEvent::FocusLost);
        assert!(state.command_mask().is_empty());
    }

    #[test]
    fn test_skipped_frame_empties_queue_and_drops_motion() {
        let mut state = InputState::new();
        let mut queue = InputQueue::new();
        for _ in 0..64 {
            queue.push(InputEvent::MouseMotion { dx: 1.0, dy: 1.0 });
        }
        queue.push(key(KeyCode::KeyW, true));
        queue.push(key(KeyCode::Escape, true));

        assert_eq!(state.skip_frame(&mut queue), Some(InputMode::Edit));
        assert!(queue.is_empty());
        assert_eq!(state.mode(), InputMode::Edit);

        let input = state.take_frame_input();
        assert_eq!(input.cursor_delta, (0.0, 0.0));
        assert!(input.commands.is_empty());
    }
}
