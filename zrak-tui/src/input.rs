use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, Screen};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Action {
    None,
    Quit,
    /// Load live reading, timeline, and forecast for the highlighted city
    LoadCity,
    /// Same as `LoadCity`, bypassing the cached live reading
    RefreshCity,
    /// Run `service.compare`(...) over the marked cities
    Compare,
}

pub(crate) fn handle_key_event(key: KeyEvent, app: &mut App) -> Action {
    use KeyCode::{Char, Down, Enter, Esc, Left, Up};

    // Global quit shortcuts
    if key.code == Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }
    if key.code == Char('q') && key.modifiers.is_empty() {
        return Action::Quit;
    }

    let mut action = Action::None;

    match app.screen {
        Screen::CitySelect => match key.code {
            Up | Char('k') => {
                if app.city_list_index > 0 {
                    app.city_list_index -= 1;
                }
            }
            Down | Char('j') => {
                if app.city_list_index + 1 < app.cities.len() {
                    app.city_list_index += 1;
                }
            }
            Enter => {
                action = Action::LoadCity;
            }
            Char(' ') => {
                app.toggle_mark();
            }
            Char('c') => {
                action = Action::Compare;
            }
            _ => {}
        },

        Screen::Timeline => match key.code {
            Left | Esc | Char('b') => {
                app.screen = Screen::CitySelect;
            }
            Char('r') => {
                action = Action::RefreshCity;
            }
            _ => {}
        },

        Screen::Comparison => match key.code {
            Left | Esc | Char('b') => {
                app.screen = Screen::CitySelect;
            }
            Char('r') => {
                action = Action::Compare;
            }
            _ => {}
        },
    }
    action
}
