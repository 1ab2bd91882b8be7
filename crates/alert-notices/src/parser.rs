/// HTML to plain text for alert notice pages.
///
/// Output is loosely markdown-shaped: `#` headings, `* ` list items, `[text](url)`
/// links, `**bold**` and `_italic_`, one blank line between blocks. Script-like
/// elements are dropped.
use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

const SKIPPED: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "svg", "head", "button",
];

const BLOCKS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "main", "aside", "nav",
    "table", "thead", "tbody", "blockquote", "dl", "dt", "dd", "figure", "figcaption",
    "address", "form", "fieldset",
];

/// Render the first element matching `selector`. `None` when the page has no
/// such element.
pub fn container_text(html: &str, selector: &Selector) -> Option<String> {
    let document = Html::parse_document(html);
    let container = document.select(selector).next()?;
    Some(html_to_text(container))
}

pub fn html_to_text(root: ElementRef<'_>) -> String {
    let mut writer = TextWriter::default();
    writer.element(root);
    writer.finish()
}

/// Drop the last `footer_bytes` bytes of `text`, backing off to a character
/// boundary. Text no longer than the footer becomes empty. Zero disables it.
pub fn trim_footer(text: &str, footer_bytes: usize) -> &str {
    if footer_bytes == 0 {
        return text;
    }
    let Some(mut cut) = text.len().checked_sub(footer_bytes) else {
        return "";
    };
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}

#[derive(Default)]
struct TextWriter {
    out: String,
    pending_space: bool,
    pre_depth: usize,
    list_depth: usize,
}

impl TextWriter {
    fn element(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        if SKIPPED.contains(&name) {
            return;
        }

        match name {
            "br" => self.line_break(),
            "hr" => {
                self.block_break();
                self.out.push_str("* * *");
                self.block_break();
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                self.block_break();
                self.out.push_str(&"#".repeat(level));
                self.out.push(' ');
                self.children(el);
                self.block_break();
            }
            "ul" | "ol" => {
                if self.list_depth == 0 {
                    self.block_break();
                } else {
                    self.line_break();
                }
                self.list_depth += 1;
                self.children(el);
                self.list_depth -= 1;
                if self.list_depth == 0 {
                    self.block_break();
                }
            }
            "li" => {
                self.line_break();
                let indent = self.list_depth.saturating_sub(1);
                self.out.push_str(&"  ".repeat(indent));
                self.out.push_str("* ");
                self.children(el);
            }
            "pre" => {
                self.block_break();
                self.pre_depth += 1;
                self.children(el);
                self.pre_depth -= 1;
                self.block_break();
            }
            "tr" => {
                self.line_break();
                self.children(el);
            }
            "td" | "th" => {
                if !self.at_line_start() {
                    self.out.push_str(" | ");
                }
                self.children(el);
            }
            "a" => match el.value().attr("href").filter(|h| h.starts_with("http")) {
                Some(href) => {
                    let label = inline_text(el);
                    if label.is_empty() || label == href {
                        self.word(href);
                    } else {
                        self.word(&format!("[{label}]({href})"));
                    }
                }
                None => self.children(el),
            },
            "b" | "strong" => self.wrapped(el, "**"),
            "i" | "em" => self.wrapped(el, "_"),
            _ if BLOCKS.contains(&name) => {
                self.block_break();
                self.children(el);
                self.block_break();
            }
            _ => self.children(el),
        }
    }

    fn children(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => self.text(text),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.element(child_el);
                    }
                }
                _ => {}
            }
        }
    }

    fn wrapped(&mut self, el: ElementRef<'_>, marker: &str) {
        let inner = inline_text(el);
        if !inner.is_empty() {
            self.word(&format!("{marker}{inner}{marker}"));
        }
    }

    fn text(&mut self, text: &str) {
        if self.pre_depth > 0 {
            self.out.push_str(text);
            return;
        }
        if text.starts_with(char::is_whitespace) {
            self.pending_space = true;
        }
        for (i, word) in text.split_whitespace().enumerate() {
            if i > 0 {
                self.pending_space = true;
            }
            self.word(word);
        }
        if text.ends_with(char::is_whitespace) {
            self.pending_space = true;
        }
    }

    fn word(&mut self, word: &str) {
        if self.pending_space && !self.out.is_empty() && !self.out.ends_with([' ', '\n']) {
            self.out.push(' ');
        }
        self.out.push_str(word);
        self.pending_space = false;
    }

    fn at_line_start(&self) -> bool {
        self.out.is_empty() || self.out.ends_with('\n')
    }

    fn trim_trailing_spaces(&mut self) {
        let trimmed = self.out.trim_end_matches(' ').len();
        self.out.truncate(trimmed);
    }

    fn line_break(&mut self) {
        self.trim_trailing_spaces();
        if !self.at_line_start() {
            self.out.push('\n');
        }
        self.pending_space = false;
    }

    fn block_break(&mut self) {
        self.trim_trailing_spaces();
        self.pending_space = false;
        if self.out.is_empty() {
            return;
        }
        while !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    fn finish(self) -> String {
        static BLANK_RUNS: OnceLock<Regex> = OnceLock::new();
        let blank_runs = BLANK_RUNS
            .get_or_init(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").unwrap());
        let collapsed = blank_runs.replace_all(&self.out, "\n\n");
        let lines: Vec<&str> = collapsed.lines().map(str::trim_end).collect();
        lines.join("\n").trim().to_string()
    }
}

fn inline_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
