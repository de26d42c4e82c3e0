//! Structural markdown splitter.
//!
//! Headings give the outline: `#` names the document, `##` opens a section,
//! `###` and deeper (or a short `**bold**` lead-in) open a subsection. The
//! first references or acknowledgements section ends the useful text.
//! Lines wrapped mid-sentence are re-joined, table rows stay together, and a
//! section over the token budget is packed sentence by sentence into several
//! chunks.

use std::collections::HashSet;

use crate::record::ChunkRecord;

const FILTERED_SECTIONS: &[&str] = &["acknowledgement", "acknowledgment", "reference"];
const SHORT_PARAGRAPH_CHARS: usize = 100;
const BOLD_LEAD_MAX_CHARS: usize = 50;

/// Rough BERT-token estimate: four tokens per three words.
pub fn approx_tokens(text: &str) -> usize {
    (text.split_whitespace().count() * 4).div_ceil(3)
}

/// Splits one markdown document into ordered chunks of at most `max_tokens`
/// (a single sentence longer than the budget stays whole).
pub fn split_markdown(text: &str, filename: &str, max_tokens: usize) -> Vec<ChunkRecord> {
    let outline = Outline::parse(text);
    let max_tokens = max_tokens.max(1);

    let mut out: Vec<ChunkRecord> = Vec::new();
    for block in outline.blocks {
        let body = block.paragraphs.join("\n");
        let pieces = if approx_tokens(&body) > max_tokens {
            pack_sentences(&body, max_tokens)
        } else {
            vec![body]
        };
        for text in pieces {
            let index = out.len() as i64;
            out.push(ChunkRecord {
                text,
                filename: filename.to_string(),
                title: outline.title.clone(),
                section: block.section.clone(),
                subsection: block.subsection.clone(),
                index,
            });
        }
    }
    out
}

#[derive(Debug, Default)]
struct Block {
    section: String,
    subsection: String,
    paragraphs: Vec<String>,
}

#[derive(Debug, Default)]
struct Outline {
    title: String,
    blocks: Vec<Block>,
}

enum Line<'a> {
    Heading(usize, &'a str),
    BoldLead(&'a str, &'a str),
    Text(&'a str),
}

fn classify(line: &str) -> Line<'_> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes > 0 && line[hashes..].starts_with(' ') {
        return Line::Heading(hashes, line[hashes..].trim());
    }
    if let Some(rest) = line.strip_prefix("**") {
        if let Some(close) = rest.find("**") {
            let name = rest[..close].trim();
            if name.chars().count() >= 2 && close + 4 < BOLD_LEAD_MAX_CHARS {
                return Line::BoldLead(name, rest[close + 2..].trim());
            }
        }
    }
    Line::Text(line)
}

impl Outline {
    fn parse(text: &str) -> Self {
        let mut outline = Outline {
            blocks: vec![Block::default()],
            ..Outline::default()
        };
        let mut raw: Vec<Vec<String>> = vec![Vec::new()];
        let mut seen: HashSet<&str> = HashSet::new();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (section, subsection, first) = match classify(line) {
                Line::Text(t) => {
                    // Repeated running headers and footers.
                    if seen.insert(t) {
                        if let Some(cur) = raw.last_mut() {
                            cur.push(t.to_string());
                        }
                    }
                    continue;
                }
                Line::Heading(1, name) => {
                    if outline.title.is_empty() {
                        outline.title = name.to_string();
                    }
                    (String::new(), String::new(), None)
                }
                Line::Heading(2, name) => (name.to_string(), String::new(), None),
                Line::Heading(_, name) => (current_section(&outline), name.to_string(), None),
                Line::BoldLead(name, rest) => (
                    current_section(&outline),
                    name.to_string(),
                    Some(rest).filter(|r| !r.is_empty()),
                ),
            };
            outline.blocks.push(Block {
                section,
                subsection,
                paragraphs: Vec::new(),
            });
            raw.push(first.map(str::to_string).into_iter().collect());
        }

        // Without any `##` section, subsections act as sections.
        if outline.blocks.iter().all(|b| b.section.is_empty()) {
            for b in &mut outline.blocks {
                b.section = std::mem::take(&mut b.subsection);
            }
        }

        let mut kept = Vec::new();
        for (mut block, lines) in outline.blocks.into_iter().zip(raw) {
            let lowered = block.section.to_lowercase();
            if FILTERED_SECTIONS.iter().any(|f| lowered.contains(f)) {
                break;
            }
            if lines.is_empty() {
                continue;
            }
            block.paragraphs = merge_paragraphs(&lines);
            kept.push(block);
        }
        outline.blocks = kept;
        outline
    }
}

fn current_section(outline: &Outline) -> String {
    outline
        .blocks
        .last()
        .map(|b| b.section.clone())
        .unwrap_or_default()
}

fn is_table_row(line: &str) -> bool {
    line.len() > 2 && line.starts_with('|') && line.ends_with('|')
}

fn ends_sentence(text: &str) -> bool {
    let opened = text.matches('(').count();
    let closed = text.matches(')').count();
    text.ends_with(['.', '!', '?']) && closed >= opened
}

/// Re-joins wrapped lines, keeps tables whole and glues short paragraphs to
/// their neighbours.
fn merge_paragraphs(lines: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut in_table = false;
    for line in lines {
        if is_table_row(line) {
            match out.last_mut() {
                Some(last) if in_table => {
                    last.push('\n');
                    last.push_str(line);
                }
                _ => out.push(line.clone()),
            }
            in_table = true;
            continue;
        }
        if in_table {
            in_table = false;
            out.push(line.clone());
            continue;
        }
        match out.last_mut() {
            Some(last) if !ends_sentence(last) => {
                if !last.ends_with('-') {
                    last.push(' ');
                }
                last.push_str(line);
            }
            Some(last) if last.len() < SHORT_PARAGRAPH_CHARS || line.len() < SHORT_PARAGRAPH_CHARS => {
                last.push('\n');
                last.push_str(line);
            }
            _ => out.push(line.clone()),
        }
    }
    out
}

fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '.' | '!' | '?' => chars.peek().is_none_or(|&(_, next)| next.is_whitespace()),
            '\n' => true,
            _ => false,
        };
        if boundary {
            let end = i + c.len_utf8();
            let s = text[start..end].trim();
            if !s.is_empty() {
                out.push(s);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn pack_sentences(text: &str, max_tokens: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut used = 0;
    for sentence in sentences(text) {
        let n = approx_tokens(sentence);
        if !cur.is_empty() && used + n > max_tokens {
            out.push(std::mem::take(&mut cur));
            used = 0;
        }
        if !cur.is_empty() {
            cur.push(' ');
        }
        cur.push_str(sentence);
        used += n;
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}
