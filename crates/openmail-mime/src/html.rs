//! HTML to plain text reduction.
//!
//! Produces the single-line previews shown in message lists: markup is
//! stripped, `script`/`style` contents are dropped entirely, common
//! entities are decoded, and whitespace runs collapse to single spaces.

/// Converts an HTML fragment to a single-line plain text string.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut chars = html.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '<' {
            out.push(c);
            continue;
        }

        // Find the end of the tag
        let rest = &html[i..];
        let Some(end) = rest.find('>') else {
            // Unterminated tag, drop the remainder
            break;
        };
        let tag = &rest[1..end];
        let name = tag
            .trim_start_matches('/')
            .split(|ch: char| ch.is_whitespace() || ch == '/' || ch == '>')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();

        // Skip past the tag itself
        while let Some(&(j, _)) = chars.peek() {
            if j > i + end {
                break;
            }
            chars.next();
        }

        // Elide script/style content up to the closing tag
        if (name == "script" || name == "style") && !tag.starts_with('/') {
            let close = format!("</{name}");
            let after_tag = i + end + 1;
            if let Some(pos) = html[after_tag..].to_ascii_lowercase().find(&close) {
                let skip_to = after_tag + pos;
                while let Some(&(j, _)) = chars.peek() {
                    if j >= skip_to {
                        break;
                    }
                    chars.next();
                }
            } else {
                break;
            }
        } else if is_block_tag(&name) {
            out.push(' ');
        }
    }

    collapse_whitespace(&decode_entities(&out))
}

/// Tags that imply a word break when stripped.
fn is_block_tag(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "br"
            | "tr"
            | "td"
            | "th"
            | "li"
            | "ul"
            | "ol"
            | "table"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "blockquote"
            | "hr"
    )
}

/// Decodes the handful of entities that matter for previews.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Collapses all whitespace runs to single spaces and trims.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = true;

    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(c);
            in_space = false;
        }
    }

    out.trim_end().to_string()
}
