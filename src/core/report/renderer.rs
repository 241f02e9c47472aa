// src/core/report/renderer.rs

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::error::RenderError;

/// Converts a text report into a rendered document.
pub trait DocumentRenderer: Send + Sync {
    /// Renders the report at `source` and returns where the document was written.
    ///
    /// Fails with [`RenderError::SourceNotFound`] when `source` does not exist.
    fn render_document(&self, title: &str, source: &Path) -> Result<PathBuf, RenderError>;
}

/// Writes an HTML page next to the text report, keeping its base name.
#[derive(Debug, Default, Clone)]
pub struct HtmlRenderer;

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

impl DocumentRenderer for HtmlRenderer {
    fn render_document(&self, title: &str, source: &Path) -> Result<PathBuf, RenderError> {
        if !source.is_file() {
            return Err(RenderError::SourceNotFound(source.to_path_buf()));
        }
        let text = std::fs::read_to_string(source)?;
        let title = escape_html(title);

        let mut html = String::with_capacity(text.len() + 512);
        let _ = write!(
            html,
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
             <style>body{{font-family:sans-serif;margin:2em}}pre{{font-family:monospace;font-size:10pt;white-space:pre-wrap}}</style>\n\
             </head>\n<body>\n<h1>{title}</h1>\n<pre>\n"
        );
        html.push_str(&escape_html(&text));
        html.push_str("</pre>\n</body>\n</html>\n");

        let rendered = source.with_extension("html");
        std::fs::write(&rendered, html)?;
        debug!(path = %rendered.display(), "Rendered HTML report.");
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_next_to_the_source_with_escaped_text() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("abcd1234_report.txt");
        std::fs::write(&source, "PORT <22> & ssh\n").unwrap();

        let rendered = HtmlRenderer.render_document("Scan Report abcd1234", &source).unwrap();
        assert_eq!(rendered, dir.path().join("abcd1234_report.html"));

        let html = std::fs::read_to_string(&rendered).unwrap();
        assert!(html.contains("<h1>Scan Report abcd1234</h1>"));
        assert!(html.contains("PORT &lt;22&gt; &amp; ssh"));
    }

    #[test]
    fn missing_source_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = HtmlRenderer
            .render_document("t", &dir.path().join("missing_report.txt"))
            .unwrap_err();
        assert!(matches!(err, RenderError::SourceNotFound(_)));
    }
}
