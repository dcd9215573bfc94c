use log::warn;

use super::{reserve_player_mut, SEEK_STEP_SEC};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyAction {
    TogglePlay,
    SeekBy(f64),
    ToggleCaptions,
    ToggleFullscreen,
}

/// Shortcut for a `KeyboardEvent.key` / `.code` pair, if any.
pub fn key_action(key: &str, code: &str) -> Option<KeyAction> {
    if key == " " || code == "Space" {
        return Some(KeyAction::TogglePlay);
    }
    match key {
        "ArrowLeft" => Some(KeyAction::SeekBy(-SEEK_STEP_SEC)),
        "ArrowRight" => Some(KeyAction::SeekBy(SEEK_STEP_SEC)),
        _ if key.eq_ignore_ascii_case("c") => Some(KeyAction::ToggleCaptions),
        _ if key.eq_ignore_ascii_case("f") => Some(KeyAction::ToggleFullscreen),
        _ => None,
    }
}

/// Run the shortcut for a key press. Returns true when the key was consumed,
/// so the page can suppress its default action.
pub fn player_key_down(key: &str, code: &str) -> bool {
    let Some(action) = key_action(key, code) else {
        return false;
    };
    reserve_player_mut(|player| match action {
        KeyAction::TogglePlay => player.toggle_play(),
        KeyAction::SeekBy(delta) => player.seek_by(delta),
        KeyAction::ToggleCaptions => player.toggle_captions(),
        KeyAction::ToggleFullscreen => {
            if let Err(err) = player.toggle_fullscreen() {
                warn!("Fullscreen toggle failed: {}", err);
            }
        }
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_toggles_play() {
        assert_eq!(key_action(" ", ""), Some(KeyAction::TogglePlay));
        assert_eq!(key_action("Spacebar", "Space"), Some(KeyAction::TogglePlay));
    }

    #[test]
    fn test_arrows_seek_ten_seconds() {
        assert_eq!(key_action("ArrowLeft", "ArrowLeft"), Some(KeyAction::SeekBy(-10.0)));
        assert_eq!(key_action("ArrowRight", "ArrowRight"), Some(KeyAction::SeekBy(10.0)));
    }

    #[test]
    fn test_letters_ignore_case() {
        assert_eq!(key_action("C", "KeyC"), Some(KeyAction::ToggleCaptions));
        assert_eq!(key_action("f", "KeyF"), Some(KeyAction::ToggleFullscreen));
        assert_eq!(key_action("x", "KeyX"), None);
        assert_eq!(key_action("Enter", "Enter"), None);
    }
}
