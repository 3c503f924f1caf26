//! Path Resolver
//!
//! Compiles a dotted property-path string (`"user.address.city"`) into an
//! accessor that walks an observed value. Compilation is all-or-nothing: a
//! single disallowed character rejects the whole path, and the caller is
//! expected to degrade the binding to a no-op rather than fail.
//!
//! Traversal is deliberately permissive: the walk dead-ends to `Undefined`
//! the moment an intermediate value is *falsy*, which covers not just
//! missing values but also `0`, `""`, and `false`. That lossiness is part
//! of the traversal contract and is preserved for compatibility with
//! template expressions that rely on it.

use thiserror::Error;

use super::context::EvalContext;
use super::value::Value;

/// Rejection from path compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path contains a character outside the identifier set.
    #[error("invalid character {found:?} in path {path:?}")]
    InvalidCharacter { path: String, found: char },
}

/// Identifier characters: ASCII alphanumerics, `_`, `$`, the segment
/// separator, and the Unicode letter ranges allowed in property names
/// (the HTML custom-element name ranges, minus the astral planes).
fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '_' | '$' | '.')
        || matches!(c as u32,
            0x00B7
                | 0x00C0..=0x00D6
                | 0x00D8..=0x00F6
                | 0x00F8..=0x037D
                | 0x037F..=0x1FFF
                | 0x200C..=0x200D
                | 0x203F..=0x2040
                | 0x2070..=0x218F
                | 0x2C00..=0x2FEF
                | 0x3001..=0xD7FF
                | 0xF900..=0xFDCF
                | 0xFDF0..=0xFFFD)
}

/// A compiled property path.
///
/// Produced by [`parse_path`]; evaluating it against a root value walks the
/// segments in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathAccessor {
    segments: Vec<String>,
}

impl PathAccessor {
    /// The path's segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Walk the path from `root`.
    ///
    /// Short-circuits to `Undefined` at the first falsy intermediate value;
    /// stepping into a truthy non-object also yields `Undefined`. Reads are
    /// tracked: under an active tracking frame, every slot the walk touches
    /// wires a dependency edge.
    pub fn get(&self, root: &Value) -> Value {
        let mut current = root.clone();
        for segment in &self.segments {
            if !current.is_truthy() {
                return Value::Undefined;
            }
            current = match &current {
                Value::Object(node) => node.get(segment),
                _ => Value::Undefined,
            };
        }
        current
    }

    /// Walk to the parent of the final segment and write through it.
    ///
    /// Returns `false` without writing if any intermediate step is not an
    /// object. The intermediate walk is untracked; the final write notifies
    /// normally.
    pub fn set(&self, root: &Value, value: impl Into<Value>) -> bool {
        let (last, parents) = match self.segments.split_last() {
            Some(split) => split,
            None => return false,
        };

        let parent = EvalContext::untracked(|| {
            let mut current = root.clone();
            for segment in parents {
                current = match &current {
                    Value::Object(node) => node.get(segment),
                    _ => return None,
                };
            }
            Some(current)
        });

        match parent {
            Some(Value::Object(node)) => {
                node.set(last, value);
                true
            }
            _ => false,
        }
    }
}

/// Compile a dotted path into an accessor.
///
/// Any character outside the identifier set rejects the entire path; there
/// is no partial compilation.
pub fn parse_path(path: &str) -> Result<PathAccessor, PathError> {
    if let Some(found) = path.chars().find(|c| !is_path_char(*c)) {
        return Err(PathError::InvalidCharacter {
            path: path.to_string(),
            found,
        });
    }

    Ok(PathAccessor {
        segments: path.split('.').map(str::to_string).collect(),
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
