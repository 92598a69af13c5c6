//! Repair of text fragments mangled by a wrong transfer encoding.
//!
//! The feed occasionally serves UTF-8 bytes that were decoded as Windows-1252
//! along the way, which turns `转发` into `è½¬å\u{8f}\u{91}`. Runs of such
//! characters are re-encoded to bytes and decoded again as UTF-8 when that
//! produces valid text made of three- or four-byte characters. Other runs,
//! such as accented Latin letters next to a no-break space, are left alone.

use encoding_rs::{UTF_8, WINDOWS_1252};

/// Upper bound on repair passes; each effective pass shortens the string.
const MAX_PASSES: usize = 4;

/// Normalize a text fragment extracted from the feed markup.
///
/// Zero-width spaces and replacement characters are dropped and mojibake runs
/// are repaired until nothing changes, which makes the function idempotent.
#[must_use]
pub fn normalize_text(raw: &str) -> String {
    let mut current = strip_noise(raw);
    for _ in 0..MAX_PASSES {
        let repaired = strip_noise(&repair_mojibake(&current));
        if repaired == current {
            break;
        }
        current = repaired;
    }
    current
}

fn strip_noise(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\u{200b}' | '\u{fffd}'))
        .collect()
}

/// Single repair pass over every maximal run of high single-byte characters.
fn repair_mojibake(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = String::new();
    let mut bytes = Vec::new();

    for c in text.chars() {
        if let Some(byte) = single_byte(c) {
            run.push(c);
            bytes.push(byte);
            continue;
        }
        flush_run(&mut out, &mut run, &mut bytes);
        out.push(c);
    }
    flush_run(&mut out, &mut run, &mut bytes);
    out
}

fn flush_run(out: &mut String, run: &mut String, bytes: &mut Vec<u8>) {
    if run.is_empty() {
        return;
    }
    match UTF_8.decode_without_bom_handling_and_without_replacement(bytes.as_slice()) {
        Some(decoded) if is_wide_text(&decoded) => out.push_str(&decoded),
        _ => out.push_str(run),
    }
    run.clear();
    bytes.clear();
}

/// Garbled CJK and punctuation decode to characters at or above U+0800.
/// Two-byte results (U+0080..U+07FF) are as likely to be clean Latin text
/// that happens to form valid UTF-8, so they do not count as a repair.
fn is_wide_text(decoded: &str) -> bool {
    !decoded.is_empty() && decoded.chars().all(|c| u32::from(c) >= 0x800)
}

/// The byte a character had before being mis-decoded, if it is a high byte.
fn single_byte(c: char) -> Option<u8> {
    let code = u32::from(c);
    if code < 0x80 {
        return None;
    }
    if let Ok(byte) = u8::try_from(code) {
        return Some(byte);
    }
    let mut buf = [0u8; 4];
    let (encoded, _, had_errors) = WINDOWS_1252.encode(c.encode_utf8(&mut buf));
    match encoded.as_ref() {
        [byte] if !had_errors && *byte >= 0x80 => Some(*byte),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Decode UTF-8 bytes the wrong way round, the way the garbling happens.
    fn garble(text: &str) -> String {
        text.bytes().map(char::from).collect()
    }

    #[test]
    fn test_clean_text_unchanged() {
        let text = "今天天气不错 赞[3] 转发[1] 评论[0]";
        assert_eq!(normalize_text(text), text);
    }

    #[test]
    fn test_repairs_latin1_mojibake() {
        let garbled = format!("prefix {} suffix", garble("转发理由"));
        assert_eq!(normalize_text(&garbled), "prefix 转发理由 suffix");
    }

    #[test]
    fn test_repairs_windows_1252_mojibake() {
        // "€" is E2 82 AC; 0x82 shows up as '‚' under Windows-1252.
        let garbled = "â‚¬5";
        assert_eq!(normalize_text(garbled), "€5");
    }

    #[test]
    fn test_strips_zero_width_and_replacement() {
        assert_eq!(normalize_text("a\u{200b}b\u{fffd}c"), "abc");
    }

    #[test]
    fn test_leaves_undecodable_runs() {
        assert_eq!(normalize_text("café"), "café");
    }

    #[test]
    fn test_clean_latin_runs_unchanged() {
        for text in [
            "Gruß\u{a0}赞[1] 转发[0] 评论[0]",
            "«CAFÉ»",
            "OLÉ…",
            "Ça\u{a0}va",
        ] {
            assert_eq!(normalize_text(text), text, "input {text:?}");
        }
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "原始用户: 某人".to_string(),
            garble("显示地图"),
            format!("{} and café", garble("全文")),
            "\u{a0}今天 14:30\u{a0}来自iPhone".to_string(),
            "Gruß\u{a0}赞[1]".to_string(),
        ];
        for input in inputs {
            let once = normalize_text(&input);
            assert_eq!(normalize_text(&once), once, "input {input:?}");
        }
    }
}
