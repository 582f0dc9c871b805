//! Terminal escape sequence stripping and humanizing.
//!
//! A single-pass scanner recognizes the ECMA-48 subset that pseudo-console
//! output is made of, without interpreting it:
//!
//! - CSI: `ESC '['`, parameter bytes `0x30..=0x3F`, intermediate bytes
//!   `0x20..=0x2F`, one final byte `0x40..=0x7E`
//! - OSC: `ESC ']'`, any bytes except BEL, terminated by BEL
//! - Charset switch: `ESC '('` or `ESC ')'` plus a designator from `0 1 2 A B`
//! - Single ESC command: ESC plus one byte from `@..Z`, `\`, `^`, `_`
//!
//! Both transforms are stateless: each call scans its chunk in isolation, so
//! a sequence split across two chunks is not recognized. Callers that read
//! from a live stream should hold back an unterminated tail (see
//! [`incomplete_suffix`]) and prepend it to the next chunk.

mod tables;

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;

/// One recognized control sequence, borrowed from the input chunk.
enum Sequence<'a> {
    Csi {
        params: &'a str,
        intermediates: &'a str,
        final_byte: u8,
    },
    Osc {
        payload: &'a str,
    },
    Charset,
    Command,
}

/// What the scanner found at an ESC byte.
enum Scan<'a> {
    /// A well-formed sequence of the given total byte length.
    Sequence(usize, Sequence<'a>),
    /// The ESC opens no production; it stays a literal byte.
    Literal,
    /// The chunk ended before the terminator; the tail must stay untouched.
    Incomplete,
}

/// Classify the bytes at `esc` (which must index an ESC byte).
///
/// All sequence bytes are ASCII, so every boundary this returns is a valid
/// `str` slice point even in multibyte text.
fn scan_sequence(input: &str, esc: usize) -> Scan<'_> {
    let bytes = input.as_bytes();
    let Some(&intro) = bytes.get(esc + 1) else {
        return Scan::Incomplete;
    };
    match intro {
        b'[' => {
            let mut i = esc + 2;
            while i < bytes.len() && (0x30..=0x3f).contains(&bytes[i]) {
                i += 1;
            }
            let params_end = i;
            while i < bytes.len() && (0x20..=0x2f).contains(&bytes[i]) {
                i += 1;
            }
            match bytes.get(i) {
                None => Scan::Incomplete,
                Some(&fin) if (0x40..=0x7e).contains(&fin) => Scan::Sequence(
                    i + 1 - esc,
                    Sequence::Csi {
                        params: &input[esc + 2..params_end],
                        intermediates: &input[params_end..i],
                        final_byte: fin,
                    },
                ),
                Some(_) => Scan::Literal,
            }
        }
        b']' => match bytes[esc + 2..].iter().position(|&b| b == BEL) {
            Some(offset) => Scan::Sequence(
                offset + 3,
                Sequence::Osc {
                    payload: &input[esc + 2..esc + 2 + offset],
                },
            ),
            None => Scan::Incomplete,
        },
        b'(' | b')' => match bytes.get(esc + 2) {
            None => Scan::Incomplete,
            Some(b'0'..=b'2' | b'A' | b'B') => Scan::Sequence(3, Sequence::Charset),
            Some(_) => Scan::Literal,
        },
        // '[' , ']' , '(' and ')' open their own productions above; the rest
        // of the 0x40..=0x5F column is a complete two-byte command.
        0x40..=0x5a | 0x5c | 0x5e | 0x5f => Scan::Sequence(2, Sequence::Command),
        _ => Scan::Literal,
    }
}

/// Remove every well-formed control sequence, keeping all other characters.
///
/// Idempotent: `strip(&strip(s)) == strip(s)`. Removing a sequence can butt
/// a previously literal ESC against bytes that now complete a sequence, so
/// the scan runs to a fixpoint; each pass only removes, which bounds the
/// iteration.
pub fn strip(input: &str) -> String {
    let mut out = strip_once(input);
    loop {
        let next = strip_once(&out);
        if next.len() == out.len() {
            return out;
        }
        out = next;
    }
}

fn strip_once(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut lit = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != ESC {
            i += 1;
            continue;
        }
        match scan_sequence(input, i) {
            Scan::Sequence(len, _) => {
                out.push_str(&input[lit..i]);
                i += len;
                lit = i;
            }
            Scan::Literal => i += 1,
            Scan::Incomplete => break,
        }
    }
    out.push_str(&input[lit..]);
    out
}

/// Replace recognized sequences with readable tags.
///
/// OSC sequences become `<OSC:payload>` first; the result is then scanned
/// for CSI sequences, which become style tags (SGR), fixed cursor/erase
/// tags, or a raw `<ESC[..>` fallback. Charset switches and single ESC
/// commands pass through unchanged.
pub fn humanize(input: &str) -> String {
    humanize_csi(&humanize_osc(input))
}

fn humanize_osc(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut lit = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != ESC || bytes.get(i + 1) != Some(&b']') {
            i += 1;
            continue;
        }
        match scan_sequence(input, i) {
            Scan::Sequence(len, Sequence::Osc { payload }) => {
                out.push_str(&input[lit..i]);
                out.push_str("<OSC:");
                out.push_str(payload);
                out.push('>');
                i += len;
                lit = i;
            }
            // No terminator in this chunk: the tail stays untouched.
            Scan::Incomplete => break,
            _ => i += 1,
        }
    }
    out.push_str(&input[lit..]);
    out
}

fn humanize_csi(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut lit = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != ESC || bytes.get(i + 1) != Some(&b'[') {
            i += 1;
            continue;
        }
        match scan_sequence(input, i) {
            Scan::Sequence(
                len,
                Sequence::Csi {
                    params,
                    intermediates,
                    final_byte,
                },
            ) => {
                out.push_str(&input[lit..i]);
                push_csi_tag(&mut out, params, intermediates, final_byte);
                i += len;
                lit = i;
            }
            Scan::Incomplete => break,
            _ => i += 1,
        }
    }
    out.push_str(&input[lit..]);
    out
}

fn push_csi_tag(out: &mut String, params: &str, intermediates: &str, final_byte: u8) {
    if final_byte == b'm' && intermediates.is_empty() {
        // SGR: one tag per parameter, in order, no separator. An empty
        // field is code 0; anything the table does not know keeps its raw
        // token text.
        for field in params.split(';') {
            let code = if field.is_empty() {
                Some(0)
            } else {
                field.parse::<u16>().ok()
            };
            match code.and_then(tables::sgr_tag) {
                Some(tag) => out.push_str(tag),
                None => {
                    out.push_str("<sgr:");
                    out.push_str(field);
                    out.push('>');
                }
            }
        }
        return;
    }
    if let Some(tag) = tables::csi_command_tag(final_byte) {
        out.push_str(tag);
        return;
    }
    out.push_str("<ESC[");
    out.push_str(params);
    out.push_str(intermediates);
    out.push(final_byte as char);
    out.push('>');
}

/// Byte offset where an unterminated trailing sequence begins, or
/// `input.len()` when the chunk ends cleanly.
///
/// Stream consumers can split a chunk here, transform the head, and carry
/// the tail into the next read so no sequence is ever fed to [`strip`] or
/// [`humanize`] in halves.
pub fn incomplete_suffix(input: &str) -> usize {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != ESC {
            i += 1;
            continue;
        }
        match scan_sequence(input, i) {
            Scan::Sequence(len, _) => i += len,
            Scan::Literal => i += 1,
            Scan::Incomplete => return i,
        }
    }
    input.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strip_removes_sgr_pair() {
        assert_eq!(strip("\x1b[31mHello\x1b[0m"), "Hello");
    }

    #[test]
    fn strip_removes_osc_with_payload() {
        assert_eq!(strip("\x1b]0;My Title\x07Ready"), "Ready");
    }

    #[test]
    fn strip_removes_charset_switches_and_commands() {
        assert_eq!(strip("\x1b(Bhello\x1b)0 \x1bM\x1b7"), "hello \u{1b}7");
    }

    #[test]
    fn strip_leaves_plain_text_alone() {
        let text = "héllo → wörld, no sequences here";
        assert_eq!(strip(text), text);
    }

    #[test]
    fn strip_leaves_unterminated_tail_untouched() {
        assert_eq!(strip("done\x1b[31"), "done\x1b[31");
        assert_eq!(strip("done\x1b]0;title"), "done\x1b]0;title");
        assert_eq!(strip("done\x1b"), "done\x1b");
    }

    #[test]
    fn strip_keeps_malformed_csi_and_resumes_scanning() {
        // 0x01 is neither parameter, intermediate, nor final.
        assert_eq!(strip("\x1b[31\u{1}m"), "\x1b[31\u{1}m");
        assert_eq!(strip("\x1b[31\u{1}m\x1b[32mok\x1b[0m"), "\x1b[31\u{1}mok");
    }

    #[test]
    fn strip_converges_when_removal_joins_a_new_sequence() {
        // Removing the inner CSI leaves ESC adjacent to "[31m".
        assert_eq!(strip("\x1b\x1b[31m[31m"), "");
    }

    #[test]
    fn humanize_tags_colors_and_reset() {
        assert_eq!(humanize("\x1b[31mHello\x1b[0m"), "<fg:red>Hello<reset>");
    }

    #[test]
    fn humanize_embeds_osc_payload() {
        assert_eq!(humanize("\x1b]0;My Title\x07Ready"), "<OSC:0;My Title>Ready");
    }

    #[test]
    fn humanize_falls_back_per_unknown_sgr_token() {
        assert_eq!(humanize("\x1b[38;5;200m"), "<sgr:38><sgr:5><sgr:200>");
    }

    #[test]
    fn humanize_treats_empty_parameter_as_reset() {
        assert_eq!(humanize("\x1b[m"), "<reset>");
        assert_eq!(humanize("\x1b[;1m"), "<reset><bold>");
    }

    #[test]
    fn humanize_uses_fixed_cursor_and_erase_tags() {
        assert_eq!(humanize("\x1b[1A\x1b[2J\x1b[K\x1b[10;20H"), "<up><erase-display><erase-line><home>");
    }

    #[test]
    fn humanize_renders_unknown_csi_raw() {
        assert_eq!(humanize("\x1b[?25l"), "<ESC[?25l>");
        assert_eq!(humanize("\x1b[s"), "<ESC[s>");
    }

    #[test]
    fn humanize_leaves_commands_and_charset_untouched() {
        assert_eq!(humanize("\x1bM\x1b(Btext"), "\x1bM\x1b(Btext");
    }

    #[test]
    fn humanize_leaves_unterminated_tail_untouched() {
        assert_eq!(humanize("ok\x1b[31"), "ok\x1b[31");
        assert_eq!(humanize("ok\x1b]0;no-bel"), "ok\x1b]0;no-bel");
    }

    #[test]
    fn humanize_sees_csi_inside_an_osc_tag() {
        // The OSC pass runs first, so a CSI hidden in the payload surfaces
        // in the second pass.
        assert_eq!(humanize("\x1b]0;\x1b[31m\x07done"), "<OSC:0;<fg:red>>done");
        assert_eq!(strip("\x1b]0;\x1b[31m\x07done"), "done");
    }

    #[test]
    fn incomplete_suffix_finds_the_split_point() {
        assert_eq!(incomplete_suffix("plain"), 5);
        assert_eq!(incomplete_suffix("ab\x1b[3"), 2);
        assert_eq!(incomplete_suffix("\x1b[31mok\x1b]t"), 7);
        assert_eq!(incomplete_suffix("ok\x1b"), 2);
    }

    proptest! {
        #[test]
        fn strip_is_idempotent(s in "\\PC*") {
            let once = strip(&s);
            prop_assert_eq!(strip(&once), once.clone());
        }

        #[test]
        fn strip_is_idempotent_on_escape_heavy_input(
            s in proptest::collection::vec(
                prop_oneof![
                    Just("\x1b".to_string()),
                    Just("[".to_string()),
                    Just("]".to_string()),
                    Just("31m".to_string()),
                    Just("\x07".to_string()),
                    Just("(B".to_string()),
                    Just("text".to_string()),
                ],
                0..16,
            )
        ) {
            let s: String = s.concat();
            let once = strip(&s);
            prop_assert_eq!(strip(&once), once.clone());
        }

        #[test]
        fn strip_never_grows_input(s in "\\PC*") {
            prop_assert!(strip(&s).len() <= s.len());
        }
    }
}
