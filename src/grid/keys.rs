//! Keyboard bindings for the grid, independent of any terminal or DOM.
//!
//! Hosts translate their native key events into [`KeyInput`] and feed them
//! to [`crate::grid::Grid::handle_key`]. Effects that need a collaborator
//! (navigation, re-fetch, input focus) come back as [`KeyEffect`] values.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Up,
    Down,
    Enter,
    Escape,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyTarget {
    #[default]
    Grid,
    /// A text field owns focus; only `Escape` is interpreted.
    TextInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub ctrl: bool,
    pub meta: bool,
    pub target: KeyTarget,
}

impl KeyInput {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            ctrl: false,
            meta: false,
            target: KeyTarget::Grid,
        }
    }

    pub fn char(c: char) -> Self {
        Self::new(Key::Char(c))
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn in_text_input(mut self) -> Self {
        self.target = KeyTarget::TextInput;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    FocusNext,
    FocusPrev,
    OpenDetail,
    ToggleSelect,
    ToggleExpand,
    Refresh,
    FocusSearch,
    Reset,
    OpenHelp,
    BlurInput,
}

impl KeyCommand {
    /// Whether the host should suppress the key's native behaviour.
    pub const fn prevents_default(self) -> bool {
        matches!(self, KeyCommand::ToggleSelect | KeyCommand::FocusSearch)
    }
}

/// Maps a key to a command. `None` means the key passes through.
pub fn binding(input: &KeyInput) -> Option<KeyCommand> {
    if input.target == KeyTarget::TextInput {
        return (input.key == Key::Escape).then_some(KeyCommand::BlurInput);
    }
    match input.key {
        Key::Char('j') | Key::Down => Some(KeyCommand::FocusNext),
        Key::Char('k') | Key::Up => Some(KeyCommand::FocusPrev),
        Key::Enter => Some(KeyCommand::OpenDetail),
        Key::Char(' ') => Some(KeyCommand::ToggleSelect),
        Key::Char('x') => Some(KeyCommand::ToggleExpand),
        Key::Char('r') if !(input.ctrl || input.meta) => Some(KeyCommand::Refresh),
        Key::Char('/') => Some(KeyCommand::FocusSearch),
        Key::Escape => Some(KeyCommand::Reset),
        Key::Char('?') => Some(KeyCommand::OpenHelp),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEffect {
    NavigateToDetail(String),
    Refresh,
    FocusSearch,
    BlurInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyOutcome {
    pub handled: bool,
    pub prevent_default: bool,
    pub effect: Option<KeyEffect>,
}

impl KeyOutcome {
    pub fn ignored() -> Self {
        Self::default()
    }

    pub fn handled(command: KeyCommand) -> Self {
        Self {
            handled: true,
            prevent_default: command.prevents_default(),
            effect: None,
        }
    }

    pub fn with_effect(mut self, effect: KeyEffect) -> Self {
        self.effect = Some(effect);
        self
    }
}

/// Attachment switch. A detached controller lets every key through, so
/// only the grid that currently owns the screen reacts.
#[derive(Debug, Clone, Default)]
pub struct KeyboardController {
    attached: bool,
}

impl KeyboardController {
    pub fn attach(&mut self) {
        self.attached = true;
    }

    pub fn detach(&mut self) {
        self.attached = false;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn command_for(&self, input: &KeyInput) -> Option<KeyCommand> {
        if !self.attached {
            return None;
        }
        binding(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_input_only_handles_escape() {
        for c in ['j', 'k', 'x', 'r', '/', '?', ' '] {
            assert_eq!(binding(&KeyInput::char(c).in_text_input()), None);
        }
        assert_eq!(
            binding(&KeyInput::new(Key::Escape).in_text_input()),
            Some(KeyCommand::BlurInput)
        );
    }

    #[test]
    fn refresh_yields_to_platform_modifiers() {
        assert_eq!(binding(&KeyInput::char('r')), Some(KeyCommand::Refresh));
        assert_eq!(binding(&KeyInput::char('r').with_ctrl()), None);
        assert_eq!(binding(&KeyInput::char('r').with_meta()), None);
    }

    #[test]
    fn bindings_are_case_sensitive() {
        assert_eq!(binding(&KeyInput::char('J')), None);
        assert_eq!(binding(&KeyInput::char('X')), None);
        assert_eq!(binding(&KeyInput::char('R')), None);
    }

    #[test]
    fn arrows_alias_vim_keys() {
        assert_eq!(binding(&KeyInput::new(Key::Down)), Some(KeyCommand::FocusNext));
        assert_eq!(binding(&KeyInput::new(Key::Up)), Some(KeyCommand::FocusPrev));
    }

    #[test]
    fn space_and_slash_prevent_default() {
        assert!(KeyCommand::ToggleSelect.prevents_default());
        assert!(KeyCommand::FocusSearch.prevents_default());
        assert!(!KeyCommand::FocusNext.prevents_default());
    }

    #[test]
    fn detached_controller_passes_everything_through() {
        let mut ctl = KeyboardController::default();
        assert_eq!(ctl.command_for(&KeyInput::char('j')), None);
        ctl.attach();
        assert_eq!(ctl.command_for(&KeyInput::char('j')), Some(KeyCommand::FocusNext));
        ctl.detach();
        assert_eq!(ctl.command_for(&KeyInput::char('j')), None);
    }
}
