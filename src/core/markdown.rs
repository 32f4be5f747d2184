//! Minimal line-based Markdown tokenizer.
//!
//! Only the token kinds the snippet pipeline consumes are distinguished:
//! fenced code (with its info string), indented code blocks and inline code
//! spans. Everything else is passed through as `Text`.
//!
//! List items are tracked only far enough to strip their content indent, so
//! a fence nested under `1. ` or `- ` is still a fence and not an indented
//! code block.

use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Fenced block. `params` is the trimmed info string after the fence marker.
    Fence { params: String, content: String },
    /// Indented (4 spaces or tab) code block.
    CodeBlock { content: String },
    /// Backtick code span inside a text line.
    CodeInline { content: String },
    Text(String),
}

static FENCE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(`{3,}|~{3,})(.*)$").unwrap());

static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^( {0,3})([-*+]|\d{1,9}[.)])( {1,4})\S").unwrap());

static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`\n]+)`").unwrap());

struct OpenFence {
    marker: char,
    len: usize,
    params: String,
    content: String,
    /// Content indent of the enclosing list item, 0 at top level.
    base: usize,
    /// Spaces before the opening marker, relative to `base`.
    indent: usize,
}

fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn strip_spaces(line: &str, max: usize) -> &str {
    &line[leading_spaces(line).min(max)..]
}

fn closes(line: &str, fence: &OpenFence) -> bool {
    let line = strip_spaces(line, fence.base);
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return false;
    }
    let run = trimmed.chars().take_while(|c| *c == fence.marker).count();
    run >= fence.len && trimmed[run..].trim().is_empty()
}

fn indented_code_line(line: &str) -> Option<&str> {
    line.strip_prefix("    ").or_else(|| line.strip_prefix('\t'))
}

/// Tokenize a Markdown document into an ordered token stream.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut fence: Option<OpenFence> = None;
    let mut code_block: Vec<&str> = Vec::new();
    let mut prev_blank = true;
    let mut list_indent: Option<usize> = None;

    for line in source.lines() {
        if let Some(open) = fence.as_mut() {
            if closes(line, open) {
                if let Some(done) = fence.take() {
                    tokens.push(Token::Fence {
                        params: done.params,
                        content: done.content,
                    });
                }
                prev_blank = true;
            } else {
                open.content.push_str(strip_spaces(line, open.base + open.indent));
                open.content.push('\n');
            }
            continue;
        }

        // A blank line followed by an unindented non-item line ends the list.
        if let Some(indent) = list_indent {
            if prev_blank
                && !line.trim().is_empty()
                && leading_spaces(line) < indent
                && !LIST_ITEM.is_match(line)
            {
                list_indent = None;
            }
        }
        let (line, base) = match list_indent {
            Some(indent) if leading_spaces(line) >= indent => (&line[indent..], indent),
            _ => (line, 0),
        };

        let indented = indented_code_line(line).filter(|c| !c.trim().is_empty());
        if let Some(code) = indented {
            if prev_blank || !code_block.is_empty() {
                code_block.push(code);
                continue;
            }
        } else if line.trim().is_empty() && !code_block.is_empty() {
            code_block.push("");
            continue;
        }

        flush_code_block(&mut code_block, &mut tokens);

        if let Some(caps) = FENCE_OPEN.captures(line) {
            let marker_run = &caps[1];
            let info = caps[2].trim();
            let marker = marker_run.chars().next().unwrap_or('`');
            // Backtick fences cannot carry backticks in their info string.
            if !(marker == '`' && info.contains('`')) {
                fence = Some(OpenFence {
                    marker,
                    len: marker_run.len(),
                    params: info.to_string(),
                    content: String::new(),
                    base,
                    indent: leading_spaces(line),
                });
                continue;
            }
        }

        if let Some(caps) = LIST_ITEM.captures(line) {
            list_indent = Some(base + caps[1].len() + caps[2].len() + caps[3].len());
        }

        for cap in INLINE_CODE.captures_iter(line) {
            tokens.push(Token::CodeInline {
                content: cap[1].to_string(),
            });
        }
        prev_blank = line.trim().is_empty();
        if !prev_blank {
            tokens.push(Token::Text(line.to_string()));
        }
    }

    flush_code_block(&mut code_block, &mut tokens);

    // An unterminated fence runs to the end of the document.
    if let Some(open) = fence {
        tokens.push(Token::Fence {
            params: open.params,
            content: open.content,
        });
    }

    tokens
}

fn flush_code_block(lines: &mut Vec<&str>, tokens: &mut Vec<Token>) {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        return;
    }
    let mut content = lines.join("\n");
    content.push('\n');
    tokens.push(Token::CodeBlock { content });
    lines.clear();
}
