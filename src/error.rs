use wasm_bindgen::{JsCast, JsValue};

/// Result type for player operations
pub type Result<T> = std::result::Result<T, ShowError>;

/// Everything that can go wrong while loading or playing a show.
///
/// None of these are fatal to the page: callers at the wasm boundary log them
/// and fall back to a static stage or a status badge.
#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Failed to load {url} ({status})")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid show script: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("JavaScript error: {0}")]
    Js(String),

    #[error("{0} is not available")]
    Unavailable(&'static str),
}

impl From<JsValue> for ShowError {
    fn from(value: JsValue) -> Self {
        let message = value
            .as_string()
            .or_else(|| {
                value
                    .dyn_ref::<js_sys::Error>()
                    .map(|err| String::from(err.message()))
            })
            .unwrap_or_else(|| format!("{:?}", value));
        ShowError::Js(message)
    }
}

// `dyn_into` failures hand back the original object.
impl From<js_sys::Object> for ShowError {
    fn from(value: js_sys::Object) -> Self {
        ShowError::from(JsValue::from(value))
    }
}

impl From<web_sys::Element> for ShowError {
    fn from(value: web_sys::Element) -> Self {
        ShowError::from(JsValue::from(value))
    }
}

impl From<ShowError> for JsValue {
    fn from(err: ShowError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_message() {
        let err = ShowError::HttpStatus {
            url: "/show/pilot-v1/script.json".to_string(),
            status: 404,
        };
        assert_eq!(
            err.to_string(),
            "Failed to load /show/pilot-v1/script.json (404)"
        );
    }

    #[test]
    fn test_parse_error_converts() {
        let parse_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: ShowError = parse_err.into();
        assert!(err.to_string().starts_with("Invalid show script:"));
    }

    #[test]
    fn test_failed_casts_convert() {
        fn converts<T: Into<ShowError>>() {}
        converts::<JsValue>();
        converts::<js_sys::Object>();
        converts::<web_sys::Element>();
    }
}
