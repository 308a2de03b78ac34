// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Size normalization for providers with constrained size inputs.

/// DashScope multimodal generation accepts total pixel counts between
/// 768x768 and 1280x1280.
const MIN_PIXELS: u64 = 589_824;
const MAX_PIXELS: u64 = 1_638_400;

/// Parse "WxH" or "W*H" into a pair. Zero dimensions are rejected.
pub fn parse_size(size: &str) -> Option<(u32, u32)> {
    let s = size.trim().to_ascii_lowercase().replace('x', "*");
    let (w, h) = s.split_once('*')?;
    let w: u32 = w.trim().parse().ok()?;
    let h: u32 = h.trim().parse().ok()?;
    if w == 0 || h == 0 {
        None
    } else {
        Some((w, h))
    }
}

/// Clamp a requested size into the DashScope pixel window, rescaling
/// proportionally in 16-pixel increments. In-range sizes pass through
/// unchanged; malformed input falls back to 1280*1280.
pub fn clamp_pixel_window(size: Option<&str>) -> String {
    let Some((w, h)) = size.and_then(parse_size) else {
        return "1280*1280".to_string();
    };
    let pixels = w as u64 * h as u64;
    if (MIN_PIXELS..=MAX_PIXELS).contains(&pixels) {
        return format!("{w}*{h}");
    }
    if pixels > MAX_PIXELS {
        let scale = (MAX_PIXELS as f64 / pixels as f64).sqrt();
        let mut w = snap16(w, scale, 16);
        let mut h = snap16(h, scale, 16);
        // Rounding can overshoot the window; cap once more.
        if w as u64 * h as u64 > MAX_PIXELS {
            w = w.min(1280);
            let h_cap = (MAX_PIXELS / w as u64) as u32;
            h = h.min(h_cap) / 16 * 16;
        }
        return format!("{w}*{h}");
    }
    let scale = (MIN_PIXELS as f64 / pixels as f64).sqrt();
    let w = snap16(w, scale, 384);
    let h = snap16(h, scale, 384);
    format!("{w}*{h}")
}

fn snap16(dim: u32, scale: f64, floor: u32) -> u32 {
    let snapped = ((dim as f64 * scale) / 16.0).round() as u32 * 16;
    snapped.max(floor)
}

/// The enumerated aspect ratio set for ratio-oriented providers.
const RATIO_SET: [&str; 10] = [
    "1:1", "16:9", "9:16", "4:3", "3:4", "3:2", "2:3", "5:4", "4:5", "21:9",
];

/// Map a size value to the nearest of a fixed enumerated ratio set.
/// Exact ratio strings pass through; anything unparseable becomes "auto".
pub fn nearest_aspect_ratio(size: Option<&str>) -> String {
    let Some(raw) = size else {
        return "auto".to_string();
    };
    let s: String = raw.trim().to_ascii_lowercase().replace(' ', "");
    if RATIO_SET.contains(&s.as_str()) {
        return s;
    }
    let Some((w, h)) = parse_size(&s) else {
        return "auto".to_string();
    };
    let r = w as f64 / h as f64;
    let ratio = if r > 2.0 {
        "21:9"
    } else if r >= 1.6 {
        "16:9"
    } else if r >= 1.2 {
        "4:3"
    } else if r >= 0.9 {
        "1:1"
    } else if r >= 0.7 {
        "3:4"
    } else if r >= 0.55 {
        "4:5"
    } else {
        "9:16"
    };
    ratio.to_string()
}

/// Qwen-Image only accepts five fixed sizes; snap by aspect ratio.
pub fn qwen_fixed_size(size: Option<&str>) -> &'static str {
    let Some((w, h)) = size.and_then(parse_size) else {
        return "1664*928";
    };
    let ratio = w as f64 / h as f64;
    if ratio >= 1.7 {
        "1664*928" // 16:9
    } else if ratio >= 1.2 {
        "1472*1104" // 4:3
    } else if ratio >= 0.85 {
        "1328*1328" // 1:1
    } else if ratio >= 0.65 {
        "1104*1472" // 3:4
    } else {
        "928*1664" // 9:16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixels(size: &str) -> u64 {
        let (w, h) = parse_size(size).unwrap();
        w as u64 * h as u64
    }

    #[test]
    fn in_range_sizes_are_idempotent() {
        assert_eq!(clamp_pixel_window(Some("1280*1280")), "1280*1280");
        assert_eq!(clamp_pixel_window(Some("1024x1024")), "1024*1024");
        // Normalizing an already-normalized value is a fixed point.
        let once = clamp_pixel_window(Some("4096*2304"));
        assert_eq!(clamp_pixel_window(Some(&once)), once);
    }

    #[test]
    fn oversized_is_scaled_into_the_window() {
        let result = clamp_pixel_window(Some("4096*2304"));
        let total = pixels(&result);
        assert!(total <= MAX_PIXELS, "got {result} ({total} px)");
        assert!(total >= MIN_PIXELS, "got {result} ({total} px)");
        // Aspect ratio survives within 16-px snapping tolerance.
        let (w, h) = parse_size(&result).unwrap();
        let original = 4096.0 / 2304.0;
        let scaled = w as f64 / h as f64;
        assert!((original - scaled).abs() / original < 0.05, "got {result}");
    }

    #[test]
    fn undersized_is_scaled_up() {
        let result = clamp_pixel_window(Some("512*512"));
        assert!(pixels(&result) >= MIN_PIXELS, "got {result}");
        let (w, h) = parse_size(&result).unwrap();
        assert_eq!(w % 16, 0);
        assert_eq!(h % 16, 0);
    }

    #[test]
    fn malformed_input_falls_back() {
        assert_eq!(clamp_pixel_window(None), "1280*1280");
        assert_eq!(clamp_pixel_window(Some("banana")), "1280*1280");
        assert_eq!(clamp_pixel_window(Some("0*100")), "1280*1280");
    }

    #[test]
    fn dimensions_are_sixteen_aligned_after_clamping() {
        for size in ["5000*5000", "100*100", "3000*1000"] {
            let result = clamp_pixel_window(Some(size));
            let (w, h) = parse_size(&result).unwrap();
            assert_eq!(w % 16, 0, "{size} -> {result}");
            assert_eq!(h % 16, 0, "{size} -> {result}");
        }
    }

    #[test]
    fn ratio_strings_pass_through() {
        assert_eq!(nearest_aspect_ratio(Some("16:9")), "16:9");
        assert_eq!(nearest_aspect_ratio(Some(" 21:9 ")), "21:9");
    }

    #[test]
    fn sizes_map_to_nearest_ratio() {
        assert_eq!(nearest_aspect_ratio(Some("1920x1080")), "16:9");
        assert_eq!(nearest_aspect_ratio(Some("1080x1920")), "9:16");
        assert_eq!(nearest_aspect_ratio(Some("1024*1024")), "1:1");
        assert_eq!(nearest_aspect_ratio(Some("1280*960")), "4:3");
        assert_eq!(nearest_aspect_ratio(Some("2560*1080")), "21:9");
        assert_eq!(nearest_aspect_ratio(Some("768*1024")), "3:4");
    }

    #[test]
    fn unparseable_ratio_is_auto() {
        assert_eq!(nearest_aspect_ratio(None), "auto");
        assert_eq!(nearest_aspect_ratio(Some("huge")), "auto");
    }

    #[test]
    fn qwen_sizes_snap_to_fixed_set() {
        assert_eq!(qwen_fixed_size(Some("1920x1080")), "1664*928");
        assert_eq!(qwen_fixed_size(Some("1024x768")), "1472*1104");
        assert_eq!(qwen_fixed_size(Some("1000x1000")), "1328*1328");
        assert_eq!(qwen_fixed_size(Some("768x1024")), "1104*1472");
        assert_eq!(qwen_fixed_size(Some("720x1280")), "928*1664");
        assert_eq!(qwen_fixed_size(None), "1664*928");
    }
}
