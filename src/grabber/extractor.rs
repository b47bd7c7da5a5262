use scraper::{Html, Node, Selector};

const SKIPPED_ELEMENTS: [&str; 5] = ["script", "style", "noscript", "template", "head"];

/// Convert an HTML document to plain text.
///
/// Each text run lands on its own line with whitespace collapsed. Link
/// targets, scripts and styles are dropped.
pub fn html_to_text(markup: &str) -> String {
    let document = Html::parse_document(markup);
    let body = Selector::parse("body").ok();
    let root = body
        .as_ref()
        .and_then(|selector| document.select(selector).next())
        .unwrap_or_else(|| document.root_element());

    let mut lines = Vec::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let skipped = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIPPED_ELEMENTS.contains(&e.name()))
        });
        if skipped {
            continue;
        }

        let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !line.is_empty() {
            lines.push(line);
        }
    }

    lines.join("\n")
}

/// JavaScript returning `[{src, width, height}]` for every image on the
/// page. Images that failed to decode report a zero size.
pub fn image_probe_script() -> &'static str {
    r#"
    (() => {
        const seen = new Set();
        const images = [];
        for (const img of Array.from(document.images)) {
            const src = img.currentSrc || img.src;
            if (!src || seen.has(src)) {
                continue;
            }
            seen.add(src);
            images.push({
                src: src,
                width: img.complete ? img.naturalWidth : 0,
                height: img.complete ? img.naturalHeight : 0
            });
        }
        return images;
    })()
    "#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_drops_scripts_and_links() {
        let html = r#"<html><head><title>T</title><style>p { color: red }</style></head>
<body>
  <h1>Release   notes</h1>
  <script>var x = 1;</script>
  <p>Read the <a href="https://example.com/full">full changelog</a> today.</p>
</body></html>"#;

        let text = html_to_text(html);
        assert!(text.contains("Release notes"));
        assert!(text.contains("full changelog"));
        assert!(!text.contains("https://example.com/full"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn test_html_to_text_decodes_entities() {
        let text = html_to_text("<p>Fish &amp; chips</p>");
        assert_eq!(text, "Fish & chips");
    }

    #[test]
    fn test_html_to_text_empty() {
        assert_eq!(html_to_text(""), "");
    }

    #[test]
    fn test_image_probe_script_reports_natural_size() {
        let script = image_probe_script();
        assert!(script.contains("naturalWidth"));
        assert!(script.contains("document.images"));
    }
}
