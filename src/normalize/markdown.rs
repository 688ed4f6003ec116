//! Markdown rendering of a token stream.

use super::html::{Token, attr, decode_entities};

/// Page chrome dropped together with everything inside it.
const CHROME_ELEMENTS: [&str; 6] = ["head", "nav", "header", "footer", "aside", "form"];

#[derive(Debug, Clone, PartialEq)]
enum FrameKind {
    Root,
    Heading(usize),
    Link(Option<String>),
    Emphasis(&'static str),
    Code,
    Pre,
    Blockquote,
    Cell,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    tag: String,
    buf: String,
}

#[derive(Debug)]
enum ListKind {
    Unordered,
    Ordered(usize),
}

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Vec<String>>,
    row: Option<Vec<String>>,
}

impl Table {
    fn finish_row(&mut self) {
        if let Some(row) = self.row.take() {
            if !row.is_empty() {
                self.rows.push(row);
            }
        }
    }

    fn render(&self) -> String {
        let width = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        if width == 0 {
            return String::new();
        }
        let line = |row: &Vec<String>| {
            let cells: Vec<&str> = (0..width)
                .map(|i| row.get(i).map_or("", String::as_str))
                .collect();
            format!("| {} |", cells.join(" | "))
        };

        let mut out = Vec::with_capacity(self.rows.len() + 1);
        for (i, row) in self.rows.iter().enumerate() {
            out.push(line(row));
            if i == 0 {
                out.push(format!("|{}", " --- |".repeat(width)));
            }
        }
        out.join("\n")
    }
}

struct Renderer {
    frames: Vec<Frame>,
    lists: Vec<ListKind>,
    tables: Vec<Table>,
    skip: Option<(String, usize)>,
}

/// Render tokens to Markdown. Unknown tags are transparent: their text is
/// kept, the tag itself is dropped.
pub fn render(tokens: &[Token<'_>]) -> String {
    let mut r = Renderer {
        frames: vec![Frame {
            kind: FrameKind::Root,
            tag: String::new(),
            buf: String::new(),
        }],
        lists: Vec::new(),
        tables: Vec::new(),
        skip: None,
    };

    for token in tokens {
        match token {
            Token::Text(text) => r.text(text),
            Token::Open {
                name,
                attrs,
                self_closing,
            } => r.open(name, attrs, *self_closing),
            Token::Close(name) => r.close(name),
        }
    }

    while r.frames.len() > 1 {
        r.pop_frame();
    }
    while let Some(table) = r.tables.pop() {
        r.emit_table(table);
    }
    let root = r.frames.pop().map(|f| f.buf).unwrap_or_default();
    tidy(&root)
}

impl Renderer {
    fn top(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn in_kind(&self, pred: impl Fn(&FrameKind) -> bool) -> bool {
        self.frames.iter().any(|f| pred(&f.kind))
    }

    fn in_pre(&self) -> bool {
        self.in_kind(|k| *k == FrameKind::Pre)
    }

    /// Inside a heading, link or cell everything stays on one line.
    fn inline_only(&self) -> bool {
        self.in_kind(|k| matches!(k, FrameKind::Heading(_) | FrameKind::Link(_) | FrameKind::Cell))
    }

    fn push_raw(&mut self, s: &str) {
        self.top().buf.push_str(s);
    }

    fn text(&mut self, raw: &str) {
        if self.skip.is_some() {
            return;
        }
        let decoded = decode_entities(raw);
        if self.in_pre() {
            self.push_raw(&decoded);
            return;
        }

        let collapsed = collapse_whitespace(&decoded);
        let buf = &mut self.top().buf;
        let at_line_start = buf.is_empty() || buf.ends_with('\n') || buf.ends_with(' ');
        let piece = if at_line_start {
            collapsed.trim_start()
        } else {
            collapsed.as_str()
        };
        buf.push_str(piece);
    }

    fn paragraph_break(&mut self) {
        if self.inline_only() || !self.lists.is_empty() {
            self.soft_space();
        } else {
            self.push_raw("\n\n");
        }
    }

    fn line_break(&mut self) {
        if self.inline_only() {
            self.soft_space();
        } else {
            self.push_raw("\n");
        }
    }

    fn soft_space(&mut self) {
        let buf = &mut self.top().buf;
        if !buf.is_empty() && !buf.ends_with([' ', '\n']) {
            buf.push(' ');
        }
    }

    fn push_frame(&mut self, kind: FrameKind, tag: &str) {
        self.frames.push(Frame {
            kind,
            tag: tag.to_string(),
            buf: String::new(),
        });
    }

    fn open(&mut self, name: &str, attrs: &str, self_closing: bool) {
        if let Some((skip_tag, depth)) = &mut self.skip {
            if *skip_tag == name && !self_closing {
                *depth += 1;
            }
            return;
        }
        if CHROME_ELEMENTS.contains(&name) {
            if !self_closing {
                self.skip = Some((name.to_string(), 1));
            }
            return;
        }
        if self.in_pre() {
            return;
        }

        match name {
            "p" | "div" | "section" | "article" | "main" | "figure" | "figcaption" | "dl"
            | "details" | "summary" | "address" => self.paragraph_break(),
            "br" => self.line_break(),
            "hr" => {
                if !self.inline_only() {
                    self.push_raw("\n\n---\n\n");
                }
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse().unwrap_or(1);
                self.push_frame(FrameKind::Heading(level), name);
            }
            "a" => {
                let href = attr(attrs, "href");
                self.push_frame(FrameKind::Link(href), name);
            }
            "strong" | "b" => self.push_frame(FrameKind::Emphasis("**"), name),
            "em" | "i" => self.push_frame(FrameKind::Emphasis("*"), name),
            "code" | "kbd" | "samp" | "tt" => self.push_frame(FrameKind::Code, name),
            "pre" => {
                self.paragraph_break();
                self.push_frame(FrameKind::Pre, name);
            }
            "blockquote" => {
                self.paragraph_break();
                self.push_frame(FrameKind::Blockquote, name);
            }
            "img" => {
                if let Some(src) = attr(attrs, "src") {
                    let alt = attr(attrs, "alt").unwrap_or_default();
                    self.push_raw(&format!("![{}]({})", collapse_whitespace(&alt).trim(), src));
                }
            }
            "ul" | "ol" => {
                if self_closing {
                    return;
                }
                if self.lists.is_empty() {
                    self.push_raw("\n");
                }
                self.lists.push(if name == "ol" {
                    ListKind::Ordered(0)
                } else {
                    ListKind::Unordered
                });
            }
            "li" => self.list_item(),
            "dt" | "dd" => self.push_raw("\n"),
            "table" => {
                if !self_closing {
                    self.paragraph_break();
                    self.tables.push(Table::default());
                }
            }
            "tr" => {
                self.close_cell();
                if let Some(table) = self.tables.last_mut() {
                    table.finish_row();
                    table.row = Some(Vec::new());
                }
            }
            "td" | "th" => {
                if self.tables.is_empty() {
                    self.soft_space();
                    return;
                }
                self.close_cell();
                self.push_frame(FrameKind::Cell, name);
            }
            _ => {}
        }
    }

    fn list_item(&mut self) {
        let depth = self.lists.len();
        let marker = match self.lists.last_mut() {
            Some(ListKind::Ordered(n)) => {
                *n += 1;
                format!("{}. ", n)
            }
            Some(ListKind::Unordered) | None => "- ".to_string(),
        };
        let indent = "  ".repeat(depth.saturating_sub(1));
        self.push_raw(&format!("\n{}{}", indent, marker));
    }

    fn close(&mut self, name: &str) {
        if let Some((skip_tag, depth)) = &mut self.skip {
            if *skip_tag == name {
                *depth -= 1;
                if *depth == 0 {
                    self.skip = None;
                }
            }
            return;
        }
        if self.in_pre() && name != "pre" {
            return;
        }

        if let Some(pos) = self.frames.iter().rposition(|f| f.tag == name) {
            if pos > 0 {
                while self.frames.len() > pos {
                    self.pop_frame();
                }
                return;
            }
        }

        match name {
            "p" | "div" | "section" | "article" | "main" | "figure" | "figcaption" | "dl"
            | "details" | "summary" | "address" => self.paragraph_break(),
            "ul" | "ol" => {
                if self.lists.pop().is_some() {
                    let sep = if self.lists.is_empty() { "\n\n" } else { "\n" };
                    self.push_raw(sep);
                }
            }
            "tr" => {
                self.close_cell();
                if let Some(table) = self.tables.last_mut() {
                    table.finish_row();
                }
            }
            "table" => {
                self.close_cell();
                if let Some(table) = self.tables.pop() {
                    self.emit_table(table);
                }
            }
            _ => {}
        }
    }

    fn close_cell(&mut self) {
        if let Some(pos) = self.frames.iter().rposition(|f| f.kind == FrameKind::Cell) {
            while self.frames.len() > pos {
                self.pop_frame();
            }
        }
    }

    fn emit_table(&mut self, mut table: Table) {
        table.finish_row();
        let rendered = table.render();
        if !rendered.is_empty() {
            self.push_raw(&format!("\n\n{}\n\n", rendered));
        }
    }

    /// Close the innermost frame and fold its text into its parent.
    fn pop_frame(&mut self) {
        let Some(frame) = self.frames.pop() else { return };
        let text = frame.buf;
        match frame.kind {
            FrameKind::Root => {
                self.frames.push(Frame {
                    kind: FrameKind::Root,
                    tag: String::new(),
                    buf: text,
                });
            }
            FrameKind::Heading(level) => {
                let text = text.trim();
                if !text.is_empty() {
                    self.push_raw(&format!("\n\n{} {}\n\n", "#".repeat(level), text));
                }
            }
            FrameKind::Link(href) => {
                let label = text.trim();
                match href {
                    Some(href) if !label.is_empty() && is_navigable(&href) => {
                        self.push_raw(&format!("[{}]({})", label, href));
                    }
                    _ => self.push_raw(label),
                }
            }
            FrameKind::Emphasis(marker) => {
                let inner = text.trim();
                if inner.is_empty() {
                    self.push_raw(&text);
                } else {
                    let lead = if text.starts_with(' ') { " " } else { "" };
                    let trail = if text.ends_with(' ') { " " } else { "" };
                    self.push_raw(&format!("{}{}{}{}{}", lead, marker, inner, marker, trail));
                }
            }
            FrameKind::Code => {
                if !text.trim().is_empty() {
                    self.push_raw(&format!("`{}`", text.trim()));
                }
            }
            FrameKind::Pre => {
                let body = text.trim_matches('\n');
                if !body.trim().is_empty() {
                    self.push_raw(&format!("\n\n```\n{}\n```\n\n", body));
                }
            }
            FrameKind::Blockquote => {
                let quoted: Vec<String> = tidy(&text)
                    .lines()
                    .map(|line| {
                        if line.is_empty() {
                            ">".to_string()
                        } else {
                            format!("> {}", line)
                        }
                    })
                    .collect();
                if !quoted.is_empty() {
                    self.push_raw(&format!("\n\n{}\n\n", quoted.join("\n")));
                }
            }
            FrameKind::Cell => {
                let cell = collapse_whitespace(&text).trim().replace('|', "\\|");
                if let Some(table) = self.tables.last_mut() {
                    table.row.get_or_insert_with(Vec::new).push(cell);
                }
            }
        }
    }
}

fn is_navigable(href: &str) -> bool {
    let lower = href.trim().to_ascii_lowercase();
    !(lower.is_empty() || lower.starts_with('#') || lower.starts_with("javascript:"))
}

pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

/// Trim line ends and collapse runs of blank lines, leaving fenced code
/// untouched.
pub fn tidy(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut in_fence = false;
    let mut blank_run = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            lines.push(line.trim());
            blank_run = false;
            continue;
        }
        if in_fence {
            lines.push(line);
            continue;
        }

        let line = line.trim_end();
        if line.trim().is_empty() {
            if !blank_run && !lines.is_empty() {
                lines.push("");
            }
            blank_run = true;
        } else {
            lines.push(line);
            blank_run = false;
        }
    }

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::super::html::tokenize;
    use super::*;

    fn md(html: &str) -> String {
        render(&tokenize(html))
    }

    #[test]
    fn test_headings_and_paragraphs() {
        let out = md("<h1>Lakers beat Celtics</h1><p>Final   score\n 110-102.</p><p>Next</p>");
        assert_eq!(out, "# Lakers beat Celtics\n\nFinal score 110-102.\n\nNext");
    }

    #[test]
    fn test_links_and_emphasis() {
        let out = md(r#"<p>See <a href="https://nba.com/g7">the <b>recap</b></a> now</p>"#);
        assert_eq!(out, "See [the **recap**](https://nba.com/g7) now");
    }

    #[test]
    fn test_fragment_links_render_as_text() {
        assert_eq!(md(r##"<a href="#top">Top</a>"##), "Top");
        assert_eq!(md(r#"<a href="javascript:void(0)">Menu</a>"#), "Menu");
    }

    #[test]
    fn test_nested_lists() {
        let out = md("<ul><li>One</li><li>Two<ol><li>a</li><li>b</li></ol></li></ul><p>after</p>");
        assert_eq!(out, "- One\n- Two\n  1. a\n  2. b\n\nafter");
    }

    #[test]
    fn test_code_block_preserves_whitespace() {
        let out = md("<p>Run:</p><pre><code>fn main() {\n    println!(\"&lt;hi&gt;\");\n}</code></pre>");
        assert_eq!(
            out,
            "Run:\n\n```\nfn main() {\n    println!(\"<hi>\");\n}\n```"
        );
    }

    #[test]
    fn test_inline_code() {
        assert_eq!(md("<p>Use <code>cargo test</code>.</p>"), "Use `cargo test`.");
    }

    #[test]
    fn test_table() {
        let out = md(
            "<table><tr><th>Team</th><th>PTS</th></tr><tr><td>LAL</td><td>110</td></tr><tr><td>BOS</td><td>102</td></tr></table>",
        );
        assert_eq!(
            out,
            "| Team | PTS |\n| --- | --- |\n| LAL | 110 |\n| BOS | 102 |"
        );
    }

    #[test]
    fn test_table_with_omitted_end_tags() {
        let out = md("<table><tr><td>a<td>b<tr><td>c</table>");
        assert_eq!(out, "| a | b |\n| --- | --- |\n| c |  |");
    }

    #[test]
    fn test_chrome_is_dropped() {
        let out = md(
            "<header><nav><a href='/'>Home</a></nav></header><main><p>Body</p></main><aside>Ads</aside><footer>(c)</footer>",
        );
        assert_eq!(out, "Body");
    }

    #[test]
    fn test_nested_chrome_of_same_kind() {
        let out = md("<aside>x<aside>y</aside>z</aside><p>kept</p>");
        assert_eq!(out, "kept");
    }

    #[test]
    fn test_blockquote() {
        let out = md("<blockquote><p>Quote one</p><p>two</p></blockquote>");
        assert_eq!(out, "> Quote one\n>\n> two");
    }

    #[test]
    fn test_image() {
        assert_eq!(md(r#"<img src="/a.png" alt="Chart">"#), "![Chart](/a.png)");
    }

    #[test]
    fn test_unclosed_inline_tags_are_closed() {
        let out = md("<p><b>bold<i>both</p>");
        assert_eq!(out, "**bold*both***");
    }

    #[test]
    fn test_stray_close_tags_are_ignored() {
        assert_eq!(md("text</span></div>"), "text");
    }

    #[test]
    fn test_tidy_collapses_blank_lines() {
        assert_eq!(tidy("a\n\n\n\nb   \n\n"), "a\n\nb");
        assert_eq!(tidy("```\ncode\n\n\n  x\n```"), "```\ncode\n\n\n  x\n```");
    }
}
