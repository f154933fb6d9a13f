//! Text codec for the four XML special characters Sky escapes in embedded
//! payloads: `& " < >`. Anything else, including entities we do not own
//! (`&apos;`, numeric references), passes through untouched.

/// Escape `& " < >` for embedding in an XML text node or attribute.
pub fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverse exactly the four escapes produced by [`encode`].
///
/// Single pass, so `&amp;lt;` decodes to the literal text `&lt;` rather
/// than cascading into `<`.
pub fn decode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        let mut matched = false;
        for (entity, plain) in [
            ("&amp;", '&'),
            ("&quot;", '"'),
            ("&lt;", '<'),
            ("&gt;", '>'),
        ] {
            if rest.starts_with(entity) {
                out.push(plain);
                rest = &rest[entity.len()..];
                matched = true;
                break;
            }
        }
        if !matched {
            out.push('&');
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_the_four_specials() {
        assert_eq!(
            encode(r#"<a href="x">Tom & Jerry</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&lt;/a&gt;"
        );
    }

    #[test]
    fn decode_reverses_encode() {
        for s in [
            "",
            "plain text",
            "a & b < c > d \" e",
            "&&&&",
            "<<<>>>",
            "ends with &",
            "&amp; already escaped once",
            "unicode ✓ çà",
        ] {
            assert_eq!(decode(&encode(s)), s, "round-trip failed for {:?}", s);
        }
    }

    #[test]
    fn decode_is_single_pass() {
        // &amp;lt; means the author wrote the literal text "&lt;".
        assert_eq!(decode("&amp;lt;"), "&lt;");
        assert_eq!(decode("&amp;amp;"), "&amp;");
    }

    #[test]
    fn unknown_entities_pass_through() {
        assert_eq!(decode("&apos;&#38;&bogus;"), "&apos;&#38;&bogus;");
    }

    #[test]
    fn lone_ampersands_pass_through() {
        assert_eq!(decode("fish & chips"), "fish & chips");
        assert_eq!(decode("&"), "&");
        assert_eq!(decode("&am"), "&am");
    }

    #[test]
    fn decodes_an_embedded_fragment() {
        let escaped = "&lt;DIDL-Lite&gt;&lt;item id=&quot;1&quot;/&gt;&lt;/DIDL-Lite&gt;";
        assert_eq!(decode(escaped), r#"<DIDL-Lite><item id="1"/></DIDL-Lite>"#);
    }
}
