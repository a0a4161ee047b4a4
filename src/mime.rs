//! Raw RFC 5322 messages as input

use crate::error::{Result, SegregationError};
use mailparse::{MailHeaderMap, ParsedMail};
use regex::Regex;
use std::sync::LazyLock;

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)\b.*?</(script|style)\s*>|<br\s*/?>|</(p|div|li|h\d)\s*>|<[^>]*>")
        .unwrap()
});

/// Text and sender taken from a raw message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Address from the `From` header
    pub sender: Option<String>,

    /// Plain text body, or the text of the HTML body when there is none
    pub text: String,
}

pub fn parse_raw_message(raw: &[u8]) -> Result<RawMessage> {
    let parsed = mailparse::parse_mail(raw).map_err(|e| SegregationError::Message(e.to_string()))?;

    let sender = parsed
        .headers
        .get_first_header("From")
        .and_then(|h| mailparse::addrparse_header(h).ok())
        .and_then(|list| list.extract_single_info())
        .map(|info| info.addr);

    let (plain, html) = find_text_parts(&parsed);
    let text = match (plain, html) {
        (Some(plain), _) => plain,
        (None, Some(html)) => html_to_text(&html),
        (None, None) => String::new(),
    };

    Ok(RawMessage {
        sender,
        text: text.replace("\r\n", "\n"),
    })
}

/// First `text/plain` and first `text/html` leaf, depth first
fn find_text_parts(part: &ParsedMail) -> (Option<String>, Option<String>) {
    if part.subparts.is_empty() {
        let mimetype = part.ctype.mimetype.to_lowercase();
        let Ok(body) = part.get_body() else {
            return (None, None);
        };
        return if mimetype == "text/html" {
            (None, Some(body))
        } else if mimetype.starts_with("text/") {
            (Some(body), None)
        } else {
            (None, None)
        };
    }

    let mut found = (None, None);
    for sub in &part.subparts {
        let (plain, html) = find_text_parts(sub);
        if found.0.is_none() {
            found.0 = plain;
        }
        if found.1.is_none() {
            found.1 = html;
        }
        if found.0.is_some() {
            break;
        }
    }
    found
}

fn html_to_text(html: &str) -> String {
    let text = TAG_REGEX.replace_all(html, |caps: &regex::Captures| {
        let tag = caps[0].to_lowercase();
        if tag.starts_with("<br") || (tag.starts_with("</") && !tag.starts_with("</script")) {
            "\n"
        } else {
            ""
        }
    });

    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_blocks_become_lines() {
        let text = html_to_text("<p>Hello</p><p>World &amp; co</p><script>x()</script>");
        assert_eq!(text, "Hello\nWorld & co");
    }
}
