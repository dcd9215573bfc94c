use std::cell::{Cell, RefCell};

use js_sys::Array;
use wasm_bindgen::prelude::*;

use crate::{
    cache::offline::OfflineState,
    player::settings::PlayerSettings,
    show::{meta::ShowMeta, script::ScriptTimeline},
};

pub fn safe_string(s: &str) -> String {
    String::from_utf8_lossy(s.as_bytes()).into_owned()
}

pub fn safe_js_string(s: &str) -> JsValue {
    JsValue::from_str(&safe_string(s))
}

#[wasm_bindgen(getter_with_clone)]
pub struct OnShowLoadedCallbackData {
    pub show_id: String,
    pub script_version: String,
    pub intro_end_sec: f64,
}

impl Into<js_sys::Map> for OnShowLoadedCallbackData {
    fn into(self) -> js_sys::Map {
        let map = js_sys::Map::new();
        map.str_set("showId", &safe_js_string(&self.show_id));
        map.str_set("scriptVersion", &self.script_version.to_js_value());
        map.str_set("introEndSec", &self.intro_end_sec.to_js_value());
        map
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackSnapshot {
    pub playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub fullscreen: bool,
    pub resume_available: bool,
    pub saved_time: f64,
}

impl ToJsValue for PlaybackSnapshot {
    fn to_js_value(&self) -> JsValue {
        let map = js_sys::Map::new();
        map.str_set("playing", &self.playing.to_js_value());
        map.str_set("currentTime", &self.current_time.to_js_value());
        map.str_set("duration", &self.duration.to_js_value());
        map.str_set("fullscreen", &self.fullscreen.to_js_value());
        map.str_set("resumeAvailable", &self.resume_available.to_js_value());
        map.str_set("savedTime", &self.saved_time.to_js_value());
        map.to_js_object().into()
    }
}

impl ToJsValue for PlayerSettings {
    fn to_js_value(&self) -> JsValue {
        let map = js_sys::Map::new();
        map.str_set("captionsEnabled", &self.captions_enabled.to_js_value());
        map.str_set("captionLang", &self.caption_lang.to_js_value());
        map.str_set("speed", &self.speed.rate().to_js_value());
        map.str_set("volume", &self.volume.to_js_value());
        map.str_set("audienceMode", &self.audience_mode.to_js_value());
        map.to_js_object().into()
    }
}

fn captions_to_js(meta: &ShowMeta) -> Array {
    meta.captions
        .iter()
        .map(|track| {
            let map = js_sys::Map::new();
            map.str_set("lang", &track.lang.to_js_value());
            map.str_set("label", &track.label.to_js_value());
            JsValue::from(map.to_js_object())
        })
        .collect()
}

fn characters_to_js(timeline: &ScriptTimeline) -> Array {
    timeline
        .characters
        .iter()
        .map(|character| {
            let map = js_sys::Map::new();
            map.str_set("id", &character.id.to_js_value());
            map.str_set("displayName", &character.display_name.to_js_value());
            map.str_set("color", &character.color.to_js_value());
            JsValue::from(map.to_js_object())
        })
        .collect()
}

#[wasm_bindgen(module = "showplayer-js-api")]
extern "C" {
    pub fn onShowLoaded(data: js_sys::Object, characters: Array, captions: Array);
    pub fn onScriptError(message: &str);
    pub fn onCaptionText(text: &str);
    pub fn onOfflineStateChanged(state: &str);
    pub fn onPlaybackStateChanged(snapshot: JsValue);
    pub fn onSpeakerChanged(speaker: JsValue);
    pub fn onSettingsChanged(settings: JsValue);
    pub fn onStageAvailable(available: bool);
}

thread_local! {
    static HOLD_DEPTH: Cell<u32> = Cell::new(0);
    static DEFERRED: RefCell<Vec<Box<dyn FnOnce()>>> = RefCell::new(Vec::new());
}

/// Run `f` with page callbacks held back. Anything dispatched inside is
/// delivered once the outermost scope returns, so handlers can call back
/// into the player without hitting a live borrow.
pub fn with_dispatch_held<R>(f: impl FnOnce() -> R) -> R {
    HOLD_DEPTH.set(HOLD_DEPTH.get() + 1);
    let result = f();
    let depth = HOLD_DEPTH.get() - 1;
    HOLD_DEPTH.set(depth);
    if depth == 0 {
        flush_deferred();
    }
    result
}

fn flush_deferred() {
    loop {
        let pending = DEFERRED.with_borrow_mut(std::mem::take);
        if pending.is_empty() {
            break;
        }
        for callback in pending {
            callback();
        }
    }
}

fn emit(callback: impl FnOnce() + 'static) {
    if HOLD_DEPTH.get() > 0 {
        DEFERRED.with_borrow_mut(|pending| pending.push(Box::new(callback)));
    } else {
        callback();
    }
}

pub struct JsApi {}

impl JsApi {
    pub fn dispatch_show_loaded(meta: &ShowMeta, timeline: &ScriptTimeline) {
        let data: js_sys::Map = OnShowLoadedCallbackData {
            show_id: meta.id.clone(),
            script_version: timeline.version.clone(),
            intro_end_sec: timeline.intro_end_sec,
        }
        .into();
        let data = data.to_js_object();
        let characters = characters_to_js(timeline);
        let captions = captions_to_js(meta);
        emit(move || onShowLoaded(data, characters, captions));
    }

    pub fn dispatch_script_error(message: &str) {
        let message = safe_string(message);
        emit(move || onScriptError(&message));
    }

    pub fn dispatch_caption_text(text: &str) {
        let text = safe_string(text);
        emit(move || onCaptionText(&text));
    }

    pub fn dispatch_offline_state(state: OfflineState) {
        emit(move || onOfflineStateChanged(state.as_str()));
    }

    pub fn dispatch_playback_state(snapshot: &PlaybackSnapshot) {
        let snapshot = snapshot.to_js_value();
        emit(move || onPlaybackStateChanged(snapshot));
    }

    pub fn dispatch_speaker_changed(speaker: Option<&str>) {
        let speaker = speaker.map_or(JsValue::NULL, safe_js_string);
        emit(move || onSpeakerChanged(speaker));
    }

    pub fn dispatch_settings_changed(settings: &PlayerSettings) {
        let settings = settings.to_js_value();
        emit(move || onSettingsChanged(settings));
    }

    pub fn dispatch_stage_available(available: bool) {
        emit(move || onStageAvailable(available));
    }
}

pub trait JsSerializable {
    fn to_js_object(&self) -> js_sys::Object;
}

pub trait JsUtils {
    fn str_set(&self, key: &str, value: &JsValue);
}

impl JsSerializable for js_sys::Map {
    fn to_js_object(&self) -> js_sys::Object {
        js_sys::Object::from_entries(self).unwrap_or_else(|_| js_sys::Object::new())
    }
}

impl JsUtils for js_sys::Map {
    fn str_set(&self, key: &str, value: &JsValue) {
        self.set(&safe_js_string(key), value);
    }
}

pub trait ToJsValue {
    fn to_js_value(&self) -> JsValue;
}

impl ToJsValue for String {
    fn to_js_value(&self) -> JsValue {
        safe_js_string(self)
    }
}

impl ToJsValue for f64 {
    fn to_js_value(&self) -> JsValue {
        JsValue::from_f64(*self)
    }
}

impl ToJsValue for bool {
    fn to_js_value(&self) -> JsValue {
        JsValue::from_bool(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_held_dispatches_run_after_outermost_scope() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (a, b) = (Rc::clone(&seen), Rc::clone(&seen));
        with_dispatch_held(|| {
            emit(move || a.borrow_mut().push("outer"));
            with_dispatch_held(|| emit(move || b.borrow_mut().push("inner")));
            assert!(seen.borrow().is_empty());
        });
        assert_eq!(*seen.borrow(), vec!["outer", "inner"]);

        let c = Rc::clone(&seen);
        emit(move || c.borrow_mut().push("direct"));
        assert_eq!(seen.borrow().last(), Some(&"direct"));
    }

    #[test]
    fn test_handler_can_reborrow_state_held_during_dispatch() {
        let state = Rc::new(RefCell::new(0));
        let handler_state = Rc::clone(&state);
        let read = with_dispatch_held(|| {
            let mut guard = state.borrow_mut();
            *guard = 5;
            emit(move || {
                *handler_state.borrow_mut() += 1;
            });
            let value = *guard;
            value
        });
        assert_eq!(read, 5);
        assert_eq!(*state.borrow(), 6);
    }

    #[test]
    fn test_dispatch_raised_by_handler_is_delivered() {
        let seen = Rc::new(RefCell::new(0));
        let outer = Rc::clone(&seen);
        with_dispatch_held(|| {
            emit(move || {
                let inner = Rc::clone(&outer);
                with_dispatch_held(|| emit(move || *inner.borrow_mut() += 1));
                *outer.borrow_mut() += 1;
            });
        });
        assert_eq!(*seen.borrow(), 2);
    }
}
