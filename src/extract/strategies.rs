use serde_json::Value;

/// One self-contained algorithm for recovering structured data from free
/// text. `Err` carries the diagnostic for why this strategy gave up.
pub trait ExtractStrategy {
    fn name(&self) -> &'static str;
    fn extract(&self, text: &str) -> Result<Value, String>;
}

const FILLER_PREFIXES: [&str; 4] = [
    "Here is the JSON:",
    "Here is the result:",
    "Result:",
    "Output:",
];

fn parse_structured(text: &str) -> Result<Value, String> {
    let value: Value = serde_json::from_str(text).map_err(|err| err.to_string())?;
    if value.is_object() || value.is_array() {
        Ok(value)
    } else {
        Err("parsed value is not an object or array".to_string())
    }
}

/// Whole-text parse after trimming whitespace and known filler prefixes.
pub struct DirectStrategy;

impl ExtractStrategy for DirectStrategy {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn extract(&self, text: &str) -> Result<Value, String> {
        let mut candidate = text.trim();
        for prefix in FILLER_PREFIXES {
            if let Some(rest) = candidate.strip_prefix(prefix) {
                candidate = rest.trim();
            }
        }
        parse_structured(candidate)
    }
}

/// Parses the contents of ``` fenced blocks, optionally language-tagged.
/// When several blocks exist the largest is attempted first.
pub struct FencedBlockStrategy;

impl FencedBlockStrategy {
    fn blocks(text: &str) -> Vec<&str> {
        let mut blocks = Vec::new();
        let mut cursor = 0;
        while let Some(open) = text[cursor..].find("```") {
            let tag_start = cursor + open + 3;
            let Some(newline) = text[tag_start..].find('\n') else {
                break;
            };
            let content_start = tag_start + newline + 1;
            let Some(close) = text[content_start..].find("```") else {
                break;
            };
            blocks.push(text[content_start..content_start + close].trim());
            cursor = content_start + close + 3;
        }
        blocks
    }
}

impl ExtractStrategy for FencedBlockStrategy {
    fn name(&self) -> &'static str {
        "fenced_block"
    }

    fn extract(&self, text: &str) -> Result<Value, String> {
        let mut blocks = Self::blocks(text);
        if blocks.is_empty() {
            return Err("no fenced code blocks found".to_string());
        }
        blocks.sort_by_key(|block| std::cmp::Reverse(block.len()));
        let total = blocks.len();
        for block in blocks {
            if let Ok(value) = parse_structured(block) {
                return Ok(value);
            }
        }
        Err(format!("none of {total} fenced block(s) parsed"))
    }
}

/// Takes the substring from the first opening brace or bracket to the last
/// matching closer and parses that.
pub struct BoundaryScanStrategy;

impl ExtractStrategy for BoundaryScanStrategy {
    fn name(&self) -> &'static str {
        "boundary_scan"
    }

    fn extract(&self, text: &str) -> Result<Value, String> {
        let brace = text.find('{');
        let bracket = text.find('[');
        let (open, close) = match (brace, bracket) {
            (Some(b), Some(k)) if b < k => (b, text.rfind('}')),
            (Some(b), None) => (b, text.rfind('}')),
            (_, Some(k)) => (k, text.rfind(']')),
            (None, None) => return Err("no object or array boundaries found".to_string()),
        };
        let Some(close) = close else {
            return Err("opening boundary has no matching closer".to_string());
        };
        if close < open {
            return Err("closing boundary precedes the opening one".to_string());
        }
        parse_structured(&text[open..=close])
    }
}
