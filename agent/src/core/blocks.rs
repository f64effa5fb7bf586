//! Splits a raw model response into ordered, typed blocks.
//!
//! The tag grammar is flat: `<python>`, `<bash>` and `<final_answer>` open a
//! block that runs to the nearest matching close tag. Tags never nest. Text
//! outside tags, and an opening tag that is never closed, degrade to
//! [`BlockKind::Text`] so no input is dropped.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Python,
    Bash,
    /// `<final_answer>` block; its acceptance ends the step.
    Terminal,
    Text,
}

/// Tagged kinds in the order the scanner tries them.
const TAGGED: [BlockKind; 3] = [BlockKind::Python, BlockKind::Bash, BlockKind::Terminal];

impl BlockKind {
    /// Tag name used on the wire, `None` for plain text.
    pub fn tag(self) -> Option<&'static str> {
        match self {
            BlockKind::Python => Some("python"),
            BlockKind::Bash => Some("bash"),
            BlockKind::Terminal => Some("final_answer"),
            BlockKind::Text => None,
        }
    }

    pub fn is_code(self) -> bool {
        matches!(self, BlockKind::Python | BlockKind::Bash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBlock {
    /// Sequence number within the turn, starting at 0.
    pub id: usize,
    pub kind: BlockKind,
    /// Content between the tags (or the raw text for text blocks).
    pub text: String,
}

impl ResponseBlock {
    /// Exact source form: tag wrappers reinserted around the untouched body.
    pub fn to_source(&self) -> String {
        match self.kind.tag() {
            Some(tag) => format!("<{tag}>{}</{tag}>", self.text),
            None => self.text.clone(),
        }
    }

    /// Normalized form used when replaying a block into the conversation:
    /// the body on its own lines between the tags.
    pub fn to_message(&self) -> String {
        match self.kind.tag() {
            Some(tag) => format!("<{tag}>\n{}\n</{tag}>", self.text.trim_matches('\n')),
            None => self.text.clone(),
        }
    }
}

/// Parse `content` into blocks covering the whole input, in source order.
///
/// Empty spans are omitted, so an empty input yields no blocks.
pub fn parse_blocks(content: &str) -> Vec<ResponseBlock> {
    let mut blocks = Vec::new();
    let mut idx = 0;

    while idx < content.len() {
        let Some((pos, kind)) = next_open_tag(content, idx) else {
            push_block(&mut blocks, BlockKind::Text, &content[idx..]);
            break;
        };

        push_block(&mut blocks, BlockKind::Text, &content[idx..pos]);

        let tag = kind.tag().unwrap_or_default();
        let open = format!("<{tag}>");
        let close = format!("</{tag}>");
        let body_start = pos + open.len();
        match content[body_start..].find(&close) {
            Some(offset) => {
                let body_end = body_start + offset;
                blocks.push(ResponseBlock {
                    id: blocks.len(),
                    kind,
                    text: content[body_start..body_end].to_string(),
                });
                idx = body_end + close.len();
            }
            None => {
                push_block(&mut blocks, BlockKind::Text, &content[pos..]);
                break;
            }
        }
    }

    blocks
}

/// Concatenate blocks back into their source form.
pub fn reconstruct(blocks: &[ResponseBlock]) -> String {
    blocks.iter().map(ResponseBlock::to_source).collect()
}

fn next_open_tag(content: &str, from: usize) -> Option<(usize, BlockKind)> {
    TAGGED
        .iter()
        .filter_map(|kind| {
            let tag = kind.tag()?;
            content[from..]
                .find(&format!("<{tag}>"))
                .map(|offset| (from + offset, *kind))
        })
        .min_by_key(|(pos, _)| *pos)
}

fn push_block(blocks: &mut Vec<ResponseBlock>, kind: BlockKind, text: &str) {
    if text.is_empty() {
        return;
    }
    blocks.push(ResponseBlock {
        id: blocks.len(),
        kind,
        text: text.to_string(),
    });
}
