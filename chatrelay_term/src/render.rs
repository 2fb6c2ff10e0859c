//! Message text to terminal lines.
//!
//! Output lines map one-to-one onto input lines, and a line's rendering only
//! depends on the lines before it. Appending text after a newline therefore
//! never changes lines that were already printed.

use syntect::{
    easy::HighlightLines,
    highlighting::{Theme, ThemeSet},
    parsing::{SyntaxReference, SyntaxSet},
    util::as_24_bit_terminal_escaped,
};

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Prose(Vec<String>),
    Code {
        language: Option<String>,
        lines: Vec<String>,
        closed: bool,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub blocks: Vec<Block>,
}

fn fence_info(line: &str) -> Option<&str> {
    line.trim_start().strip_prefix("```").map(str::trim)
}

fn is_fence_close(line: &str) -> bool {
    let line = line.trim();
    line.len() >= 3 && line.chars().all(|c| c == '`')
}

pub fn parse(text: &str) -> Document {
    let mut blocks: Vec<Block> = vec![];
    let mut prose: Vec<String> = vec![];

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(Block::Code { lines, closed, .. }) = blocks.last_mut() {
            if !*closed {
                if is_fence_close(line) {
                    *closed = true;
                } else {
                    lines.push(line.to_owned());
                }
                continue;
            }
        }

        match fence_info(line) {
            Some(info) => {
                if !prose.is_empty() {
                    blocks.push(Block::Prose(std::mem::take(&mut prose)));
                }
                let language = info.split_whitespace().next().map(str::to_owned);
                blocks.push(Block::Code {
                    language,
                    lines: vec![],
                    closed: false,
                });
            }
            None => prose.push(line.to_owned()),
        }
    }
    if !prose.is_empty() {
        blocks.push(Block::Prose(prose));
    }

    Document { blocks }
}

pub struct Renderer {
    syntax_set: SyntaxSet,
    theme: Theme,
}

impl Renderer {
    pub fn new(theme_name: &str) -> Self {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let theme_set = ThemeSet::load_defaults();
        let theme = theme_set
            .themes
            .get(theme_name)
            .cloned()
            .unwrap_or_else(|| theme_set.themes["base16-ocean.dark"].clone());

        Self { syntax_set, theme }
    }

    fn syntax_for(&self, language: Option<&str>) -> Option<&SyntaxReference> {
        language.and_then(|token| self.syntax_set.find_syntax_by_token(token))
    }

    pub fn render(&self, text: &str) -> Vec<String> {
        self.render_document(&parse(text))
    }

    pub fn render_document(&self, document: &Document) -> Vec<String> {
        let mut out = vec![];
        for block in &document.blocks {
            match block {
                Block::Prose(lines) => out.extend(lines.iter().map(|line| render_prose_line(line))),
                Block::Code {
                    language,
                    lines,
                    closed,
                } => {
                    let label = language.as_deref().unwrap_or("");
                    out.push(format!("{DIM}```{label}{RESET}"));
                    out.extend(self.render_code(language.as_deref(), lines));
                    if *closed {
                        out.push(format!("{DIM}```{RESET}"));
                    }
                }
            }
        }
        out
    }

    fn render_code(&self, language: Option<&str>, lines: &[String]) -> Vec<String> {
        let Some(syntax) = self.syntax_for(language) else {
            return lines.to_vec();
        };

        let mut highlighter = HighlightLines::new(syntax, &self.theme);
        lines
            .iter()
            .map(|line| {
                let with_newline = format!("{line}\n");
                match highlighter.highlight_line(&with_newline, &self.syntax_set) {
                    Ok(ranges) => {
                        let escaped = as_24_bit_terminal_escaped(&ranges, false);
                        format!("{}{RESET}", escaped.trim_end_matches('\n'))
                    }
                    Err(_) => line.clone(),
                }
            })
            .collect()
    }
}

fn render_prose_line(line: &str) -> String {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        let heading = trimmed.trim_start_matches('#').trim_start();
        format!("{BOLD}{heading}{RESET}")
    } else if let Some(item) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
    {
        let indent = &line[..line.len() - trimmed.len()];
        format!("{indent}• {item}")
    } else {
        line.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(language: Option<&str>, lines: &[&str], closed: bool) -> Block {
        Block::Code {
            language: language.map(str::to_owned),
            lines: lines.iter().map(|l| l.to_string()).collect(),
            closed,
        }
    }

    fn prose(lines: &[&str]) -> Block {
        Block::Prose(lines.iter().map(|l| l.to_string()).collect())
    }

    #[test]
    fn parse_splits_prose_and_fenced_code() {
        let doc = parse("Here:\n```rust\nfn main() {}\n```\nDone.");
        assert_eq!(
            doc.blocks,
            vec![
                prose(&["Here:"]),
                code(Some("rust"), &["fn main() {}"], true),
                prose(&["Done."]),
            ]
        );
    }

    #[test]
    fn parse_reads_language_from_first_word_of_info_string() {
        let doc = parse("```python title=\"x.py\"\nprint(1)\n```");
        assert_eq!(doc.blocks, vec![code(Some("python"), &["print(1)"], true)]);

        let doc = parse("```\nplain\n```");
        assert_eq!(doc.blocks, vec![code(None, &["plain"], true)]);
    }

    #[test]
    fn parse_runs_unclosed_fence_to_the_end() {
        let doc = parse("```js\nlet a = 1;\nlet b = 2;");
        assert_eq!(
            doc.blocks,
            vec![code(Some("js"), &["let a = 1;", "let b = 2;"], false)]
        );
    }

    #[test]
    fn parse_keeps_fences_inside_code_as_code() {
        let doc = parse("```md\n```rust (not a fence here)\n```");
        assert_eq!(
            doc.blocks,
            vec![code(Some("md"), &["```rust (not a fence here)"], true)]
        );
    }

    #[test]
    fn render_maps_lines_one_to_one() {
        let renderer = Renderer::new("base16-ocean.dark");
        let text = "# Title\n- item\n```rust\nlet x = 1;\n```\nend";
        let lines = renderer.render(text);

        assert_eq!(lines.len(), text.split('\n').count());
        assert_eq!(lines[0], format!("{BOLD}Title{RESET}"));
        assert_eq!(lines[1], "• item");
        assert_eq!(lines[5], "end");
    }

    #[test]
    fn render_colours_known_languages_only() {
        let renderer = Renderer::new("base16-ocean.dark");

        let known = renderer.render("```rust\nlet x = 1;\n```");
        assert!(known[1].contains("\x1b[38;2;"), "{:?}", known[1]);

        let unknown = renderer.render("```not-a-language\nlet x = 1;\n```");
        assert_eq!(unknown[1], "let x = 1;");

        let bare = renderer.render("```\nlet x = 1;\n```");
        assert_eq!(bare[1], "let x = 1;");
    }

    #[test]
    fn render_of_a_prefix_is_stable_when_text_is_appended() {
        let renderer = Renderer::new("base16-ocean.dark");
        let full = "Intro\n```python\ndef f():\n    return 1\n```\nOutro";

        let full_lines = renderer.render(full);
        let mut end = 0;
        while let Some(offset) = full[end..].find('\n') {
            end += offset;
            let prefix_lines = renderer.render(&full[..end]);
            assert_eq!(prefix_lines[..], full_lines[..prefix_lines.len()], "prefix {end}");
            end += 1;
        }
    }
}
