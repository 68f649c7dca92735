use crate::orchestrator::{Action, FieldValues, InputState};
use crate::preferences::{keys, Preferences};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Decompile,
    Compile,
    Upgrade,
    Script,
    Tools,
    Preferences,
}

impl Tab {
    pub const ALL: [Tab; 6] = [
        Tab::Decompile,
        Tab::Compile,
        Tab::Upgrade,
        Tab::Script,
        Tab::Tools,
        Tab::Preferences,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Decompile => "Decompile",
            Tab::Compile => "Compile",
            Tab::Upgrade => "Upgrade",
            Tab::Script => "Decompile Script",
            Tab::Tools => "Tools",
            Tab::Preferences => "Preferences",
        }
    }

    /// `(preference key, label)` for each text field on the tab.
    pub fn fields(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Tab::Decompile => Action::Decompile.fields(),
            Tab::Compile => Action::Compile.fields(),
            Tab::Upgrade => Action::Upgrade.fields(),
            Tab::Script => Action::ExtractDialogue.fields(),
            Tab::Tools => Action::AddHeader.fields(),
            Tab::Preferences => &[(keys::EMULATOR, "Emulator"), (keys::EDITOR, "Project Editor")],
        }
    }

    pub fn buttons(self) -> &'static [Button] {
        match self {
            Tab::Decompile => &[Button::Run(Action::Decompile)],
            Tab::Compile => &[Button::Run(Action::Compile)],
            Tab::Upgrade => &[Button::Run(Action::Upgrade)],
            Tab::Script => &[Button::Run(Action::ExtractDialogue)],
            Tab::Tools => &[
                Button::Run(Action::Expand32),
                Button::Run(Action::Expand48),
                Button::Run(Action::AddHeader),
                Button::Run(Action::StripHeader),
            ],
            Tab::Preferences => &[Button::SavePreferences, Button::ToggleTitles],
        }
    }

    /// ROM that Ctrl-R opens when no ROM field has focus.
    fn rom_key(self) -> Option<&'static str> {
        match self {
            Tab::Decompile => Some(keys::EXPORT_ROM),
            Tab::Compile => Some(keys::IMPORT_ROM),
            Tab::Upgrade => Some(keys::UPGRADE_ROM),
            Tab::Script => Some(keys::SCRIPT_ROM),
            Tab::Tools => Some(keys::TOOLS_ROM),
            Tab::Preferences => None,
        }
    }

    fn project_key(self) -> Option<&'static str> {
        match self {
            Tab::Decompile => Some(keys::EXPORT_PROJ),
            Tab::Compile => Some(keys::IMPORT_PROJ),
            Tab::Upgrade => Some(keys::UPGRADE_PROJ),
            Tab::Script => Some(keys::SCRIPT_PROJ),
            Tab::Tools | Tab::Preferences => None,
        }
    }
}

fn is_rom_key(key: &str) -> bool {
    matches!(
        key,
        keys::EXPORT_ROM
            | keys::IMPORT_BASEROM
            | keys::IMPORT_ROM
            | keys::UPGRADE_ROM
            | keys::SCRIPT_ROM
            | keys::TOOLS_ROM
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Run(Action),
    SavePreferences,
    ToggleTitles,
}

impl Button {
    pub fn label(self) -> &'static str {
        match self {
            Button::Run(action) => action.label(),
            Button::SavePreferences => "Save Preferences",
            Button::ToggleTitles => "Toggle Alternate Titles",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overlay {
    #[default]
    None,
    Help,
    About,
}

/// What the event loop should do after a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiAction {
    None,
    Quit,
    Submit(Action),
    RunRom(String),
    EditProject(String),
    OpenFolder(String),
    SavePreferences,
    ToggleTitles,
}

/// Form state owned by the UI thread: selected tab, focus, field text.
pub struct FormState {
    pub tab: usize,
    pub focus: usize,
    pub overlay: Overlay,
    values: FieldValues,
}

impl FormState {
    /// Pre-fill every field from the stored preferences.
    pub fn from_preferences(prefs: &Preferences) -> Self {
        let values = Tab::ALL
            .iter()
            .flat_map(|t| t.fields().iter())
            .map(|&(key, _)| (key, prefs.get(key).unwrap_or_default().to_string()))
            .collect();
        Self {
            tab: 0,
            focus: 0,
            overlay: Overlay::None,
            values,
        }
    }

    pub fn tab(&self) -> Tab {
        Tab::ALL[self.tab]
    }

    pub fn values(&self) -> &FieldValues {
        &self.values
    }

    pub fn value(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or_default()
    }

    pub fn focused_field(&self) -> Option<&'static str> {
        self.tab().fields().get(self.focus).map(|&(key, _)| key)
    }

    pub fn focused_button(&self) -> Option<Button> {
        let tab = self.tab();
        self.focus
            .checked_sub(tab.fields().len())
            .and_then(|i| tab.buttons().get(i).copied())
    }

    fn focus_count(&self) -> usize {
        let tab = self.tab();
        tab.fields().len() + tab.buttons().len()
    }

    fn move_focus(&mut self, forward: bool) {
        let n = self.focus_count();
        self.focus = if forward {
            (self.focus + 1) % n
        } else {
            (self.focus + n - 1) % n
        };
    }

    fn switch_tab(&mut self, forward: bool) {
        let n = Tab::ALL.len();
        self.tab = if forward {
            (self.tab + 1) % n
        } else {
            (self.tab + n - 1) % n
        };
        self.focus = 0;
    }

    fn target(&self, key: Option<&'static str>) -> Option<String> {
        key.map(|k| self.value(k).trim().to_string())
    }

    fn rom_target(&self) -> Option<String> {
        let key = self
            .focused_field()
            .filter(|k| is_rom_key(k))
            .or_else(|| self.tab().rom_key());
        self.target(key)
    }

    fn activate(&self, button: Button, input: InputState) -> UiAction {
        if input == InputState::Disabled {
            return UiAction::None;
        }
        match button {
            Button::Run(action) => UiAction::Submit(action),
            Button::SavePreferences => UiAction::SavePreferences,
            Button::ToggleTitles => UiAction::ToggleTitles,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent, input: InputState) -> UiAction {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && matches!(key.code, KeyCode::Char('q') | KeyCode::Char('c')) {
            return UiAction::Quit;
        }

        if self.overlay != Overlay::None {
            self.overlay = match (self.overlay, key.code) {
                (Overlay::Help, KeyCode::F(1)) | (Overlay::About, KeyCode::F(2)) => Overlay::None,
                (Overlay::About, KeyCode::F(1)) => Overlay::Help,
                (Overlay::Help, KeyCode::F(2)) => Overlay::About,
                (current, KeyCode::F(_)) | (current, KeyCode::Char(_)) => current,
                _ => Overlay::None,
            };
            return UiAction::None;
        }

        match key.code {
            KeyCode::F(1) => self.overlay = Overlay::Help,
            KeyCode::F(2) => self.overlay = Overlay::About,
            KeyCode::Char('t') if ctrl => return UiAction::ToggleTitles,
            // Run/edit/open are controls too and stay off while an operation runs.
            KeyCode::Char('r' | 'e' | 'o') if ctrl && input == InputState::Disabled => {
                return UiAction::None
            }
            KeyCode::Char('r') if ctrl => {
                return self.rom_target().map_or(UiAction::None, UiAction::RunRom)
            }
            KeyCode::Char('e') if ctrl => {
                return self
                    .target(self.tab().project_key())
                    .map_or(UiAction::None, UiAction::EditProject)
            }
            KeyCode::Char('o') if ctrl => {
                return self
                    .target(self.tab().project_key())
                    .map_or(UiAction::None, UiAction::OpenFolder)
            }
            KeyCode::Tab | KeyCode::Down => self.move_focus(true),
            KeyCode::BackTab | KeyCode::Up => self.move_focus(false),
            KeyCode::Right | KeyCode::PageDown => self.switch_tab(true),
            KeyCode::Left | KeyCode::PageUp => self.switch_tab(false),
            KeyCode::Enter => match self.focused_button() {
                Some(button) => return self.activate(button, input),
                None => self.move_focus(true),
            },
            KeyCode::Backspace if input == InputState::Enabled => {
                if let Some(field) = self.focused_field() {
                    if let Some(v) = self.values.get_mut(field) {
                        v.pop();
                    }
                }
            }
            KeyCode::Char(c) if !ctrl && input == InputState::Enabled => {
                if let Some(field) = self.focused_field() {
                    self.values.entry(field).or_default().push(c);
                }
            }
            _ => {}
        }
        UiAction::None
    }
}
