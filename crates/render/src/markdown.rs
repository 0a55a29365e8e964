//! Tolerant markdown segmentation for assistant replies.
//!
//! Replies render while they are still arriving, so the parser never fails:
//! an unclosed fence renders as a code block, half-arrived inline markers
//! stay literal text, and a malformed table row degrades to prose. Each new
//! fragment re-parses the whole body, which keeps the renderer stateless.

/// Inline content inside a prose block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Code(String),
    Strong(String),
    Emphasis(String),
    Link { text: String, href: String },
    Image { alt: String, src: String },
}

/// One block of a rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, spans: Vec<Inline> },
    Paragraph { spans: Vec<Inline> },
    CodeBlock {
        language: Option<String>,
        code: String,
        /// False while the closing fence has not arrived yet.
        closed: bool,
    },
    List { ordered: bool, items: Vec<Vec<Inline>> },
    Quote { lines: Vec<Vec<Inline>> },
    Table {
        header: Vec<Vec<Inline>>,
        rows: Vec<Vec<Vec<Inline>>>,
    },
    Rule,
}

/// Parsed form of one message body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageDocument {
    pub blocks: Vec<Block>,
}

impl MessageDocument {
    pub fn parse(text: &str) -> Self {
        let lines: Vec<&str> = text.lines().collect();
        let mut blocks = Vec::new();
        let mut paragraph: Vec<&str> = Vec::new();
        let mut index = 0;

        while index < lines.len() {
            let line = lines[index];
            let trimmed = line.trim_start();

            if let Some(fence_rest) = trimmed.strip_prefix("```") {
                flush_paragraph(&mut paragraph, &mut blocks);
                let language = fence_rest
                    .trim()
                    .split_whitespace()
                    .next()
                    .map(str::to_string);
                index += 1;

                let mut code_lines = Vec::new();
                let mut closed = false;
                while index < lines.len() {
                    if lines[index].trim_start().starts_with("```") {
                        closed = true;
                        index += 1;
                        break;
                    }
                    code_lines.push(lines[index]);
                    index += 1;
                }
                blocks.push(Block::CodeBlock {
                    language,
                    code: code_lines.join("\n"),
                    closed,
                });
                continue;
            }

            if trimmed.is_empty() {
                flush_paragraph(&mut paragraph, &mut blocks);
                index += 1;
                continue;
            }

            if let Some((level, rest)) = heading_parts(trimmed) {
                flush_paragraph(&mut paragraph, &mut blocks);
                blocks.push(Block::Heading {
                    level,
                    spans: parse_inline(rest),
                });
                index += 1;
                continue;
            }

            if is_rule(trimmed) {
                flush_paragraph(&mut paragraph, &mut blocks);
                blocks.push(Block::Rule);
                index += 1;
                continue;
            }

            if line.contains('|')
                && index + 1 < lines.len()
                && is_table_separator(lines[index + 1])
            {
                flush_paragraph(&mut paragraph, &mut blocks);
                let header = split_table_row(line);
                index += 2;

                let mut rows = Vec::new();
                while index < lines.len() && lines[index].contains('|') {
                    let cells = split_table_row(lines[index]);
                    if cells.len() != header.len() {
                        // Malformed row: leave it for the prose path below.
                        break;
                    }
                    rows.push(cells);
                    index += 1;
                }
                blocks.push(Block::Table { header, rows });
                continue;
            }

            if unordered_item(trimmed).is_some() {
                flush_paragraph(&mut paragraph, &mut blocks);
                let mut items = Vec::new();
                while index < lines.len() {
                    match unordered_item(lines[index].trim_start()) {
                        Some(item) => items.push(parse_inline(item)),
                        None => break,
                    }
                    index += 1;
                }
                blocks.push(Block::List {
                    ordered: false,
                    items,
                });
                continue;
            }

            if ordered_item(trimmed).is_some() {
                flush_paragraph(&mut paragraph, &mut blocks);
                let mut items = Vec::new();
                while index < lines.len() {
                    match ordered_item(lines[index].trim_start()) {
                        Some(item) => items.push(parse_inline(item)),
                        None => break,
                    }
                    index += 1;
                }
                blocks.push(Block::List {
                    ordered: true,
                    items,
                });
                continue;
            }

            if quote_line(trimmed).is_some() {
                flush_paragraph(&mut paragraph, &mut blocks);
                let mut quoted = Vec::new();
                while index < lines.len() {
                    match quote_line(lines[index].trim_start()) {
                        Some(inner) => quoted.push(parse_inline(inner)),
                        None => break,
                    }
                    index += 1;
                }
                blocks.push(Block::Quote { lines: quoted });
                continue;
            }

            paragraph.push(line.trim());
            index += 1;
        }

        flush_paragraph(&mut paragraph, &mut blocks);
        Self { blocks }
    }

    /// Code blocks in document order, keyed by block index. The copy
    /// affordance uses the index as its stable key.
    pub fn code_blocks(&self) -> impl Iterator<Item = (usize, &Block)> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| matches!(block, Block::CodeBlock { .. }))
    }

    pub fn code_block_text(&self, block_index: usize) -> Option<&str> {
        match self.blocks.get(block_index)? {
            Block::CodeBlock { code, .. } => Some(code),
            _ => None,
        }
    }
}

fn flush_paragraph(paragraph: &mut Vec<&str>, blocks: &mut Vec<Block>) {
    if paragraph.is_empty() {
        return;
    }
    let text = paragraph.join(" ");
    paragraph.clear();
    let spans = parse_inline(&text);
    if !spans.is_empty() {
        blocks.push(Block::Paragraph { spans });
    }
}

fn heading_parts(trimmed: &str) -> Option<(u8, &str)> {
    let hashes = trimmed.bytes().take_while(|byte| *byte == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = trimmed[hashes..].strip_prefix(' ')?;
    Some((hashes as u8, rest.trim_start()))
}

fn is_rule(trimmed: &str) -> bool {
    trimmed.len() >= 3
        && (trimmed.chars().all(|c| c == '-')
            || trimmed.chars().all(|c| c == '*')
            || trimmed.chars().all(|c| c == '_'))
}

fn is_table_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.contains('-')
        && trimmed.contains('|')
        && trimmed.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

fn split_table_row(line: &str) -> Vec<Vec<Inline>> {
    line.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .map(|cell| parse_inline(cell.trim()))
        .collect()
}

fn unordered_item(trimmed: &str) -> Option<&str> {
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return Some(rest);
        }
    }
    None
}

fn ordered_item(trimmed: &str) -> Option<&str> {
    let digits = trimmed.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    trimmed[digits..].strip_prefix(". ")
}

fn quote_line(trimmed: &str) -> Option<&str> {
    trimmed
        .strip_prefix("> ")
        .or_else(|| trimmed.strip_prefix('>'))
}

/// Parses inline markup. A marker without a matching closer stays literal
/// text, which keeps half-arrived markup readable mid-stream.
pub fn parse_inline(text: &str) -> Vec<Inline> {
    let mut spans = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("**") {
            if let Some(end) = after.find("**") {
                let candidate = &after[..end];
                if !candidate.is_empty()
                    && !candidate.starts_with(' ')
                    && !candidate.ends_with(' ')
                {
                    flush_literal(&mut literal, &mut spans);
                    spans.push(Inline::Strong(candidate.to_string()));
                    rest = &after[end + 2..];
                    continue;
                }
            }
            literal.push_str("**");
            rest = after;
            continue;
        }

        if let Some(after) = rest.strip_prefix('`') {
            if let Some(end) = after.find('`') {
                flush_literal(&mut literal, &mut spans);
                spans.push(Inline::Code(after[..end].to_string()));
                rest = &after[end + 1..];
                continue;
            }
            literal.push('`');
            rest = after;
            continue;
        }

        if let Some(after) = rest.strip_prefix('*') {
            if let Some(end) = after.find('*') {
                let candidate = &after[..end];
                if !candidate.is_empty()
                    && !candidate.starts_with(' ')
                    && !candidate.ends_with(' ')
                {
                    flush_literal(&mut literal, &mut spans);
                    spans.push(Inline::Emphasis(candidate.to_string()));
                    rest = &after[end + 1..];
                    continue;
                }
            }
            literal.push('*');
            rest = after;
            continue;
        }

        if let Some(after) = rest.strip_prefix("![") {
            if let Some((alt, src, consumed)) = link_parts(after) {
                flush_literal(&mut literal, &mut spans);
                spans.push(Inline::Image {
                    alt: alt.to_string(),
                    src: src.to_string(),
                });
                rest = &after[consumed..];
                continue;
            }
            literal.push('!');
            rest = &rest[1..];
            continue;
        }

        if let Some(after) = rest.strip_prefix('[') {
            if let Some((text, href, consumed)) = link_parts(after) {
                flush_literal(&mut literal, &mut spans);
                spans.push(Inline::Link {
                    text: text.to_string(),
                    href: href.to_string(),
                });
                rest = &after[consumed..];
                continue;
            }
            literal.push('[');
            rest = after;
            continue;
        }

        let mut chars = rest.chars();
        if let Some(ch) = chars.next() {
            literal.push(ch);
            rest = chars.as_str();
        }
    }

    flush_literal(&mut literal, &mut spans);
    spans
}

/// Splits `text](href)` into its parts plus the bytes consumed, given input
/// positioned just after the opening bracket.
fn link_parts(after: &str) -> Option<(&str, &str, usize)> {
    let close = after.find("](")?;
    let text = &after[..close];
    let tail = &after[close + 2..];
    let end = tail.find(')')?;
    Some((text, &tail[..end], close + 2 + end + 1))
}

fn flush_literal(literal: &mut String, spans: &mut Vec<Inline>) {
    if !literal.is_empty() {
        spans.push(Inline::Text(std::mem::take(literal)));
    }
}
