pub mod cache;
pub mod error;
pub mod js_api;
pub mod player;
pub mod rendering;
pub mod show;
pub mod utils;

use wasm_bindgen::prelude::*;
use web_sys::{HtmlElement, HtmlMediaElement};

use js_api::ToJsValue;
use player::{
    commands::{init_command_loop, player_dispatch, player_dispatch_async, PlayerCommand},
    keyboard_events::player_key_down,
    reserve_player_mut, reserve_player_ref,
};
use utils::{init_logging, set_panic_hook};

#[wasm_bindgen(start)]
pub fn main() {
    set_panic_hook();
    init_logging();
    init_command_loop();
}

#[wasm_bindgen]
pub fn mount_player(container: HtmlElement, media: HtmlMediaElement) -> Result<(), JsValue> {
    reserve_player_mut(|player| player.mount(container, media))?;
    Ok(())
}

#[wasm_bindgen]
pub fn unmount_player() {
    reserve_player_mut(|player| player.unmount());
}

#[wasm_bindgen]
pub fn set_base_path(path: String) {
    player_dispatch(PlayerCommand::SetBasePath(path));
}

/// Fetch the episode script. Resolves once it is loaded; a failed load is
/// also reported through `onScriptError` and leaves the stage idling.
#[wasm_bindgen]
pub async fn load_show() -> Result<(), JsValue> {
    player_dispatch_async(PlayerCommand::LoadShow).await?;
    Ok(())
}

/// Registers the fetch/install/activate handlers when running inside the
/// service worker.
#[wasm_bindgen]
pub fn sw_install() -> Result<(), JsValue> {
    cache::worker::install()?;
    Ok(())
}

// Playback. `play` goes through the command queue because it awaits the
// media element; everything else acts on the player directly.

#[wasm_bindgen]
pub async fn play(from: Option<f64>) -> Result<(), JsValue> {
    player_dispatch_async(PlayerCommand::Play { from }).await?;
    Ok(())
}

#[wasm_bindgen]
pub fn pause() {
    reserve_player_mut(|player| player.pause());
}

#[wasm_bindgen]
pub fn toggle_play() {
    reserve_player_mut(|player| player.toggle_play());
}

#[wasm_bindgen]
pub fn seek_by(delta: f64) {
    reserve_player_mut(|player| player.seek_by(delta));
}

#[wasm_bindgen]
pub fn skip_intro() {
    reserve_player_mut(|player| player.skip_intro());
}

#[wasm_bindgen]
pub fn start_over() {
    reserve_player_mut(|player| player.start_over());
}

#[wasm_bindgen]
pub fn resume() {
    reserve_player_mut(|player| player.resume());
}

#[wasm_bindgen]
pub fn toggle_fullscreen() -> Result<(), JsValue> {
    reserve_player_ref(|player| player.toggle_fullscreen())?;
    Ok(())
}

#[wasm_bindgen]
pub fn playback_state() -> JsValue {
    reserve_player_ref(|player| player.playback_snapshot().to_js_value())
}

// Settings

#[wasm_bindgen]
pub fn set_captions_enabled(enabled: bool) {
    reserve_player_mut(|player| player.set_captions_enabled(enabled));
}

#[wasm_bindgen]
pub fn toggle_captions() {
    reserve_player_mut(|player| player.toggle_captions());
}

#[wasm_bindgen]
pub fn set_caption_lang(lang: String) -> bool {
    reserve_player_mut(|player| player.set_caption_lang(&lang))
}

/// Accepts 0.75, 1, 1.25, 1.5 and 2; anything else is ignored.
#[wasm_bindgen]
pub fn set_speed(rate: f64) -> bool {
    reserve_player_mut(|player| player.set_speed(rate))
}

/// Returns the volume actually applied, clamped to [0, 1].
#[wasm_bindgen]
pub fn set_volume(volume: f64) -> f64 {
    reserve_player_mut(|player| player.set_volume(volume))
}

#[wasm_bindgen]
pub fn set_audience_mode(enabled: bool) {
    reserve_player_mut(|player| player.set_audience_mode(enabled));
}

#[wasm_bindgen]
pub fn toggle_audience_mode() {
    reserve_player_mut(|player| player.toggle_audience_mode());
}

#[wasm_bindgen]
pub fn set_reduce_motion(reduce: bool) {
    reserve_player_mut(|player| player.set_reduce_motion(reduce));
}

#[wasm_bindgen]
pub fn set_active_speaker(speaker: Option<String>) {
    reserve_player_mut(|player| player.set_active_speaker(speaker));
}

#[wasm_bindgen]
pub fn settings() -> JsValue {
    reserve_player_ref(|player| player.settings.to_js_value())
}

// Offline

#[wasm_bindgen]
pub async fn save_offline() -> Result<(), JsValue> {
    player_dispatch_async(PlayerCommand::SaveOffline).await?;
    Ok(())
}

#[wasm_bindgen]
pub fn offline_state() -> String {
    reserve_player_ref(|player| player.offline_state().as_str().to_string())
}

// Input

/// Returns true when the key maps to a player shortcut.
#[wasm_bindgen]
pub fn key_down(key: String, code: String) -> bool {
    player_key_down(&key, &code)
}
