//! ASS (Advanced SubStation Alpha) document rendering.
//!
//! Subtitles are centred on a fixed 1080x1920 canvas; libass scales the
//! canvas to whatever the video actually is.

use super::{Subtitle, SubtitleStyle};

const PLAY_RES_X: u32 = 1080;
const PLAY_RES_Y: u32 = 1920;

/// Numpad-style alignment: middle centre.
const ALIGN_CENTER: u8 = 5;

/// Opaque white, used when a colour cannot be parsed.
const FALLBACK_COLOR: &str = "&H00FFFFFF";

/// Convert `#RRGGBB` (or an `&H` literal) to the ASS `&HAABBGGRR` form.
pub fn to_ass_color(color: &str) -> String {
    let color = color.trim();

    if let Some(hex) = color.strip_prefix('#') {
        if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            let (r, g, b) = (&hex[0..2], &hex[2..4], &hex[4..6]);
            return format!("&H00{b}{g}{r}").to_uppercase();
        }
        return FALLBACK_COLOR.to_string();
    }

    let literal = color
        .strip_prefix("&H")
        .or_else(|| color.strip_prefix("&h"))
        .map(|rest| rest.trim_end_matches('&'));
    match literal {
        Some(digits)
            if !digits.is_empty()
                && digits.len() <= 8
                && digits.chars().all(|c| c.is_ascii_hexdigit()) =>
        {
            format!("&H{:0>8}", digits.to_uppercase())
        }
        _ => FALLBACK_COLOR.to_string(),
    }
}

/// Format seconds as `H:MM:SS.CC`.
pub fn format_ass_time(secs: f64) -> String {
    let total_cs = (secs.max(0.0) * 100.0).round() as u64;
    let hours = total_cs / 360_000;
    let minutes = (total_cs / 6_000) % 60;
    let seconds = (total_cs / 100) % 60;
    let centis = total_cs % 100;
    format!("{hours}:{minutes:02}:{seconds:02}.{centis:02}")
}

/// Keep override braces and newlines in the text from being interpreted.
fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('{', "\\{")
        .replace('}', "\\}")
        .replace('\n', "\\N")
}

fn style_line(style: &SubtitleStyle) -> String {
    format!(
        "Style: Default,{font},{size},{primary},{primary},{outline},&H00000000,{bold},0,0,0,100,100,0,0,1,{outline_w},{shadow},{align},10,10,10,1",
        font = style.font_name,
        size = style.font_size,
        primary = to_ass_color(&style.primary_color),
        outline = to_ass_color(&style.outline_color),
        bold = if style.bold { -1 } else { 0 },
        outline_w = style.outline_size,
        shadow = style.shadow_size,
        align = ALIGN_CENTER,
    )
}

fn dialogue_line(subtitle: &Subtitle) -> String {
    let tag = subtitle
        .color
        .as_deref()
        .map(|c| format!("{{\\c{}&}}", to_ass_color(c)))
        .unwrap_or_default();

    format!(
        "Dialogue: 0,{},{},Default,,0,0,0,,{}{}",
        format_ass_time(subtitle.start),
        format_ass_time(subtitle.end),
        tag,
        escape_text(&subtitle.text)
    )
}

/// Render a complete ASS document.
pub fn render(subtitles: &[Subtitle], style: &SubtitleStyle) -> String {
    let mut lines = vec![
        "[Script Info]".to_string(),
        "ScriptType: v4.00+".to_string(),
        format!("PlayResX: {PLAY_RES_X}"),
        format!("PlayResY: {PLAY_RES_Y}"),
        "WrapStyle: 0".to_string(),
        "ScaledBorderAndShadow: yes".to_string(),
        String::new(),
        "[V4+ Styles]".to_string(),
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding".to_string(),
        style_line(style),
        String::new(),
        "[Events]".to_string(),
        "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text".to_string(),
    ];

    lines.extend(subtitles.iter().map(dialogue_line));

    let mut document = lines.join("\n");
    document.push('\n');
    document
}
