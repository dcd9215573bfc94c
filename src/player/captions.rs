use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{HtmlMediaElement, TextTrack, TextTrackMode, VttCue};

use crate::js_api::JsApi;

/// Index of the track whose language matches `lang` (case-insensitive), or
/// `None` when captions are off or no track matches.
pub fn select_track<S: AsRef<str>>(enabled: bool, languages: &[S], lang: &str) -> Option<usize> {
    if !enabled {
        return None;
    }
    languages
        .iter()
        .position(|track_lang| track_lang.as_ref().eq_ignore_ascii_case(lang))
}

/// Text of all active cues, one per line, skipping empty ones.
pub fn compose_cue_text<S: AsRef<str>>(cues: &[S]) -> String {
    cues.iter()
        .map(|cue| cue.as_ref())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn media_tracks(media: &HtmlMediaElement) -> Vec<TextTrack> {
    let Some(list) = media.text_tracks() else {
        return vec![];
    };
    (0..list.length()).filter_map(|i| list.get(i)).collect()
}

fn active_cue_text(track: &TextTrack) -> String {
    let texts: Vec<String> = match track.active_cues() {
        Some(cues) => (0..cues.length())
            .filter_map(|i| cues.get(i))
            .filter_map(|cue| cue.dyn_into::<VttCue>().ok())
            .map(|cue| cue.text())
            .collect(),
        None => vec![],
    };
    compose_cue_text(&texts)
}

/// Keeps exactly one text track in `hidden` mode and forwards its cues to JS,
/// where they are drawn as an overlay instead of by the native renderer.
pub struct CaptionBinding {
    track: Option<TextTrack>,
    on_cue_change: Option<Closure<dyn FnMut()>>,
}

impl CaptionBinding {
    pub fn new() -> CaptionBinding {
        CaptionBinding {
            track: None,
            on_cue_change: None,
        }
    }

    pub fn bind(&mut self, media: &HtmlMediaElement, enabled: bool, lang: &str) {
        self.unbind();

        let tracks = media_tracks(media);
        for track in &tracks {
            track.set_mode(TextTrackMode::Disabled);
        }
        let languages: Vec<String> = tracks.iter().map(|track| track.language()).collect();
        let Some(index) = select_track(enabled, &languages, lang) else {
            JsApi::dispatch_caption_text("");
            return;
        };

        let track = tracks[index].clone();
        track.set_mode(TextTrackMode::Hidden);

        let handler_track = track.clone();
        let on_cue_change = Closure::<dyn FnMut()>::new(move || {
            JsApi::dispatch_caption_text(&active_cue_text(&handler_track));
        });
        track.set_oncuechange(Some(on_cue_change.as_ref().unchecked_ref()));
        JsApi::dispatch_caption_text(&active_cue_text(&track));

        self.track = Some(track);
        self.on_cue_change = Some(on_cue_change);
    }

    /// Detach the cue handler. The closure is dropped only after the track no
    /// longer references it.
    pub fn unbind(&mut self) {
        if let Some(track) = self.track.take() {
            track.set_oncuechange(None);
        }
        self.on_cue_change = None;
    }
}

impl Drop for CaptionBinding {
    fn drop(&mut self) {
        self.unbind();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LANGS: [&str; 3] = ["en", "es", "PT"];

    #[test]
    fn test_select_track_case_insensitive() {
        assert_eq!(select_track(true, &LANGS, "ES"), Some(1));
        assert_eq!(select_track(true, &LANGS, "pt"), Some(2));
    }

    #[test]
    fn test_select_track_disabled_or_missing() {
        assert_eq!(select_track(false, &LANGS, "en"), None);
        assert_eq!(select_track(true, &LANGS, "ko"), None);
    }

    #[test]
    fn test_compose_cue_text() {
        assert_eq!(compose_cue_text(&["Hello", "", "world"]), "Hello\nworld");
        assert_eq!(compose_cue_text::<&str>(&[]), "");
    }
}
