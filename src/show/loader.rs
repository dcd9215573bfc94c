use std::rc::Rc;

use log::{debug, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use crate::error::{Result, ShowError};

use super::script::{ScriptTimeline, ShowScript};

/// Load state of the episode script. The stage animates in static idle until
/// `Ready`, and stays there on `Failed`.
#[derive(Debug, Clone)]
pub enum ScriptState {
    Loading,
    Ready(Rc<ScriptTimeline>),
    Failed(String),
}

pub async fn fetch_text(url: &str) -> Result<String> {
    let window = web_sys::window().ok_or(ShowError::Unavailable("window"))?;
    let response = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(|err| ShowError::Fetch {
            url: url.to_string(),
            message: ShowError::from(err).to_string(),
        })?;
    let response = response.dyn_into::<web_sys::Response>()?;
    if !response.ok() {
        return Err(ShowError::HttpStatus {
            url: url.to_string(),
            status: response.status(),
        });
    }
    let text = JsFuture::from(response.text()?).await?;
    text.as_string()
        .ok_or_else(|| ShowError::Js(format!("{url} returned a non-text body")))
}

/// Fetch and index the script once. Errors are returned as `ScriptState::Failed`
/// so the caller never has to special-case them: playback works either way.
pub async fn load_script(url: &str) -> ScriptState {
    let result = fetch_text(url)
        .await
        .and_then(|json| ShowScript::from_json(&json));
    match result {
        Ok(script) => {
            let timeline = ScriptTimeline::from_script(&script);
            debug!(
                "Loaded script {} ({} scenes, {} lines, {} gestures, {} laughs)",
                url,
                timeline.scenes.len(),
                timeline.lines.len(),
                timeline.gestures.len(),
                timeline.laughs.len()
            );
            ScriptState::Ready(Rc::new(timeline))
        }
        Err(err) => {
            warn!("Failed to load script: {}", err);
            ScriptState::Failed(err.to_string())
        }
    }
}
