//! Blueprint parsing: literal spans and named slot placeholders.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::schema::template::Transform;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BlueprintError {
    #[error("blueprint parse error: {0}")]
    Parse(String),
    #[error("unknown transform '{transform}' in placeholder '{placeholder}'")]
    UnknownTransform {
        placeholder: String,
        transform: String,
    },
}

/// A segment of a parsed blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Segment {
    /// Literal text, emitted as-is.
    Literal(String),
    /// A named slot: `{name}` or, inline, `{name|upper|a}`.
    Slot {
        name: String,
        transforms: Vec<Transform>,
    },
}

/// A parsed card blueprint. Serialized as its source string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Blueprint {
    source: String,
    segments: Vec<Segment>,
}

impl Blueprint {
    /// Parse a blueprint string into a sequence of segments.
    ///
    /// Syntax:
    /// - `{name}` → `Slot` with no inline transforms
    /// - `{name|t1|t2}` → `Slot` with inline transforms applied in order
    /// - Everything else → `Literal`
    ///
    /// Card text never carries braces, so `{{` and `}}` are errors rather
    /// than escapes.
    pub fn parse(input: &str) -> Result<Blueprint, BlueprintError> {
        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let chars: Vec<char> = input.chars().collect();
        let len = chars.len();
        let mut i = 0;

        while i < len {
            if chars[i] == '{' {
                if i + 1 < len && chars[i + 1] == '{' {
                    return Err(BlueprintError::Parse(
                        "literal braces are not allowed".to_string(),
                    ));
                }

                if !literal_buf.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal_buf)));
                }

                let start = i + 1;
                let mut end = start;
                let mut closed = false;
                while end < len {
                    if chars[end] == '{' {
                        return Err(BlueprintError::Parse(
                            "nested braces are not allowed".to_string(),
                        ));
                    }
                    if chars[end] == '}' {
                        closed = true;
                        break;
                    }
                    end += 1;
                }

                if !closed {
                    return Err(BlueprintError::Parse("unclosed brace".to_string()));
                }

                let content: String = chars[start..end].iter().collect();
                if content.trim().is_empty() {
                    return Err(BlueprintError::Parse("empty braces".to_string()));
                }

                segments.push(Self::parse_placeholder(&content)?);
                i = end + 1;
            } else if chars[i] == '}' {
                return Err(BlueprintError::Parse(
                    "unmatched closing brace".to_string(),
                ));
            } else {
                literal_buf.push(chars[i]);
                i += 1;
            }
        }

        if !literal_buf.is_empty() {
            segments.push(Segment::Literal(literal_buf));
        }

        Ok(Blueprint {
            source: input.to_string(),
            segments,
        })
    }

    fn parse_placeholder(content: &str) -> Result<Segment, BlueprintError> {
        let mut parts = content.split('|');
        let name = parts.next().unwrap_or_default().trim();

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(BlueprintError::Parse(format!(
                "invalid placeholder name '{}'",
                name
            )));
        }

        let mut transforms = Vec::new();
        for part in parts {
            let transform =
                Transform::parse(part).ok_or_else(|| BlueprintError::UnknownTransform {
                    placeholder: name.to_string(),
                    transform: part.trim().to_string(),
                })?;
            transforms.push(transform);
        }

        Ok(Segment::Slot {
            name: name.to_string(),
            transforms,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Slot names in order of first appearance.
    pub fn slot_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Slot { name, .. } = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Inline transforms declared on the first occurrence of a slot.
    pub fn inline_transforms(&self, slot: &str) -> &[Transform] {
        self.segments
            .iter()
            .find_map(|segment| match segment {
                Segment::Slot { name, transforms } if name == slot => Some(transforms.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Words contributed by literal spans alone.
    pub fn literal_word_count(&self) -> usize {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.split_whitespace().count(),
                Segment::Slot { .. } => 0,
            })
            .sum()
    }
}

impl TryFrom<String> for Blueprint {
    type Error = BlueprintError;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Blueprint::parse(&source)
    }
}

impl From<Blueprint> for String {
    fn from(blueprint: Blueprint) -> Self {
        blueprint.source
    }
}

impl fmt::Display for Blueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
