pub fn set_panic_hook() {
    // When the `console_error_panic_hook` feature is enabled, we can call the
    // `set_panic_hook` function at least once during initialization, and then
    // we will get better error messages if our code ever panics.
    //
    // For more details see
    // https://github.com/rustwasm/console_error_panic_hook#readme
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

pub fn init_logging() {
    // Fails only when a logger is already installed.
    let _ = console_log::init_with_level(log::Level::Info);
}

#[inline]
pub fn clamp01(n: f64) -> f64 {
    n.max(0.0).min(1.0)
}

#[inline]
pub fn clamp(n: f64, min: f64, max: f64) -> f64 {
    n.max(min).min(max)
}

#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Stable per-character phase offset in [0, 1).
pub fn seed_from_id(id: &str) -> f64 {
    let mut h: u32 = 0;
    for c in id.encode_utf16() {
        h = h.wrapping_mul(31).wrapping_add(c as u32);
    }
    (h % 10_000) as f64 / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_from_id_is_stable_and_bounded() {
        let a = seed_from_id("host");
        assert_eq!(a, seed_from_id("host"));
        assert!((0.0..1.0).contains(&a));
        assert_ne!(seed_from_id("host"), seed_from_id("ops"));
    }
}
