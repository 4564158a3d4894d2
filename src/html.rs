//! A small, forgiving HTML tokenizer.
//!
//! The converter output is machine-generated HTML, so this only needs to get the
//! element structure and text right. Comments, doctypes and processing
//! instructions are dropped; `script` and `style` contents are skipped. Malformed
//! markup never fails: anything that does not parse as a tag is text.

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HtmlEvent {
    Start(StartTag),
    End(String),
    Text(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartTag {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub self_closing: bool,
}

impl StartTag {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// Whether this element has no end tag (void element or `<x/>`).
    pub fn is_void(&self) -> bool {
        self.self_closing || is_void_element(&self.name)
    }
}

fn is_void_element(name: &str) -> bool {
    matches!(
        name,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "source"
            | "track"
            | "wbr"
    )
}

/// Streams [`HtmlEvent`]s out of an HTML string.
pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    raw_text_end: Option<&'static str>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            raw_text_end: None,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_past(&mut self, needle: &str) {
        match self.rest().find(needle) {
            Some(idx) => self.pos += idx + needle.len(),
            None => self.pos = self.input.len(),
        }
    }

    fn skip_raw_text(&mut self, end_tag: &str) {
        let rest = self.rest();
        let lower = rest.to_ascii_lowercase();
        match lower.find(end_tag) {
            Some(idx) => self.pos += idx,
            None => self.pos = self.input.len(),
        }
    }

    fn take_text(&mut self) -> HtmlEvent {
        let rest = self.rest();
        // Always consume at least one byte so a stray '<' cannot stall us.
        let first = rest.chars().next().map_or(0, char::len_utf8);
        let len = rest[first..].find('<').map_or(rest.len(), |idx| idx + first);
        let raw = &rest[..len];
        self.pos += len;
        HtmlEvent::Text(decode_entities(raw))
    }

    fn parse_end_tag(&mut self) -> Option<HtmlEvent> {
        let rest = self.rest();
        let close = rest.find('>')?;
        let name = rest[2..close]
            .trim()
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if name.is_empty() || !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return None;
        }
        self.pos += close + 1;
        Some(HtmlEvent::End(name))
    }

    fn parse_start_tag(&mut self) -> Option<HtmlEvent> {
        let rest = self.rest();
        let bytes = rest.as_bytes();
        let mut idx = 1;

        let name_start = idx;
        while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'-') {
            idx += 1;
        }
        if idx == name_start || !bytes[name_start].is_ascii_alphabetic() {
            return None;
        }
        let name = rest[name_start..idx].to_ascii_lowercase();

        let mut attrs = Vec::new();
        let mut self_closing = false;
        loop {
            while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
                idx += 1;
            }
            if idx >= bytes.len() {
                return None;
            }
            match bytes[idx] {
                b'>' => {
                    idx += 1;
                    break;
                }
                b'/' => {
                    self_closing = true;
                    idx += 1;
                    continue;
                }
                _ => {}
            }

            let key_start = idx;
            while idx < bytes.len()
                && !bytes[idx].is_ascii_whitespace()
                && !matches!(bytes[idx], b'=' | b'>' | b'/')
            {
                idx += 1;
            }
            let key = rest[key_start..idx].to_ascii_lowercase();
            while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
                idx += 1;
            }

            let mut value = String::new();
            if idx < bytes.len() && bytes[idx] == b'=' {
                idx += 1;
                while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
                    idx += 1;
                }
                if idx >= bytes.len() {
                    return None;
                }
                if matches!(bytes[idx], b'"' | b'\'') {
                    let quote = bytes[idx];
                    let value_start = idx + 1;
                    let value_len = bytes[value_start..].iter().position(|b| *b == quote)?;
                    value = decode_entities(&rest[value_start..value_start + value_len]);
                    idx = value_start + value_len + 1;
                } else {
                    let value_start = idx;
                    while idx < bytes.len()
                        && !bytes[idx].is_ascii_whitespace()
                        && bytes[idx] != b'>'
                    {
                        idx += 1;
                    }
                    value = decode_entities(&rest[value_start..idx]);
                }
            }
            if !key.is_empty() {
                self_closing = false;
                attrs.push((key, value));
            }
        }

        self.pos += idx;
        if !self_closing {
            self.raw_text_end = match name.as_str() {
                "script" => Some("</script"),
                "style" => Some("</style"),
                _ => None,
            };
        }
        Some(HtmlEvent::Start(StartTag {
            name,
            attrs,
            self_closing,
        }))
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = HtmlEvent;

    fn next(&mut self) -> Option<HtmlEvent> {
        if let Some(end_tag) = self.raw_text_end.take() {
            self.skip_raw_text(end_tag);
        }

        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return None;
            }
            if !rest.starts_with('<') {
                return Some(self.take_text());
            }
            if rest.starts_with("<!--") {
                self.skip_past("-->");
                continue;
            }
            if rest.starts_with("<!") || rest.starts_with("<?") {
                self.skip_past(">");
                continue;
            }
            if rest.starts_with("</") {
                if let Some(event) = self.parse_end_tag() {
                    return Some(event);
                }
                return Some(self.take_text());
            }
            if let Some(event) = self.parse_start_tag() {
                return Some(event);
            }
            return Some(self.take_text());
        }
    }
}

/// Decodes the character references docutils and pulldown-cmark emit.
/// Unknown references are kept verbatim.
pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let Some(semi) = rest[1..].find(';').map(|idx| idx + 1).filter(|idx| *idx <= 10) else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };

        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            "ndash" => Some('–'),
            "mdash" => Some('—'),
            "hellip" => Some('…'),
            "copy" => Some('©'),
            _ => decode_numeric(entity),
        };

        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_numeric(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = if let Some(hex) = digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u32>().ok()?
    };
    char::from_u32(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(input: &str) -> Vec<HtmlEvent> {
        Tokenizer::new(input).collect()
    }

    fn start(name: &str) -> StartTag {
        StartTag {
            name: name.to_string(),
            attrs: Vec::new(),
            self_closing: false,
        }
    }

    #[test]
    fn tags_and_text_in_order() {
        assert_eq!(
            events("<p>Hi <em>there</em></p>"),
            vec![
                HtmlEvent::Start(start("p")),
                HtmlEvent::Text("Hi ".to_string()),
                HtmlEvent::Start(start("em")),
                HtmlEvent::Text("there".to_string()),
                HtmlEvent::End("em".to_string()),
                HtmlEvent::End("p".to_string()),
            ]
        );
    }

    #[test]
    fn attributes_with_quotes_and_bare_values() {
        let evs = events(r#"<div class="system-message error" id=x data-flag>"#);
        let HtmlEvent::Start(tag) = &evs[0] else {
            panic!("expected start tag, got {evs:?}");
        };
        assert_eq!(tag.name, "div");
        assert!(tag.has_class("system-message"));
        assert!(tag.has_class("error"));
        assert_eq!(tag.attr("id"), Some("x"));
        assert_eq!(tag.attr("data-flag"), Some(""));
    }

    #[test]
    fn comments_doctype_and_scripts_are_dropped() {
        let evs = events("<!DOCTYPE html><!-- c --><script>if (a < b) {}</script><b>x</b>");
        assert_eq!(
            evs,
            vec![
                HtmlEvent::Start(start("script")),
                HtmlEvent::End("script".to_string()),
                HtmlEvent::Start(start("b")),
                HtmlEvent::Text("x".to_string()),
                HtmlEvent::End("b".to_string()),
            ]
        );
    }

    #[test]
    fn stray_angle_brackets_are_text() {
        let text: String = events("a < b <3")
            .into_iter()
            .filter_map(|ev| match ev {
                HtmlEvent::Text(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(text, "a < b <3");
    }

    #[test]
    fn void_and_self_closing_elements() {
        let evs = events("<br><img src='a.png'/>");
        let voids: Vec<bool> = evs
            .iter()
            .map(|ev| matches!(ev, HtmlEvent::Start(tag) if tag.is_void()))
            .collect();
        assert_eq!(voids, vec![true, true]);
    }

    #[test]
    fn entities_decode() {
        assert_eq!(decode_entities("&lt;stdin&gt; &amp; &#65;&#x42; &bogus; &"), "<stdin> & AB &bogus; &");
    }
}
