//! JSON operations for shared documents (json0 text and object subset).
//!
//! Wire format, one component per edit:
//! ```text
//! { "p": ["content", 4], "si": "abc" }        insert text at char offset 4
//! { "p": ["content", 4], "sd": "abc" }        delete text at char offset 4
//! { "p": ["cursor", "s1"], "oi": {...} }      insert object key
//! { "p": ["cursor", "s1"], "od": {...} }      delete object key
//! { "p": ["cursor", "s1"], "od": {..}, "oi": {..} }   replace object key
//! ```
//!
//! Offsets count chars, not bytes. An [`Op`] is an ordered batch: every
//! component is addressed against the document produced by the ones before it.
//!
//! [`transform`] rewrites an op so it applies after a concurrent one.
//! Ties between two inserts at the same spot, or two writes to the same key,
//! go to the [`Side::Left`] op.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An ordered batch of components.
pub type Op = Vec<OpComponent>;

/// One step of a path into a JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl PathSegment {
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Key(_) => None,
        }
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            Self::Key(k) => Some(k),
            Self::Index(_) => None,
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// What a component does at the end of its path.
#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    InsertText(String),
    DeleteText(String),
    InsertObject(Value),
    DeleteObject(Value),
    ReplaceObject { old: Value, new: Value },
}

impl OpKind {
    fn is_text(&self) -> bool {
        matches!(self, Self::InsertText(_) | Self::DeleteText(_))
    }

    /// The value this component leaves at its key, if any.
    fn written_value(&self) -> Option<&Value> {
        match self {
            Self::InsertObject(v) | Self::ReplaceObject { new: v, .. } => Some(v),
            _ => None,
        }
    }
}

/// A single positioned edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawComponent", into = "RawComponent")]
pub struct OpComponent {
    pub path: Vec<PathSegment>,
    pub kind: OpKind,
}

#[derive(Serialize, Deserialize)]
struct RawComponent {
    p: Vec<PathSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    si: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    od: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    oi: Option<Value>,
}

impl TryFrom<RawComponent> for OpComponent {
    type Error = OpError;

    fn try_from(raw: RawComponent) -> Result<Self, Self::Error> {
        let kind = match (raw.si, raw.sd, raw.oi, raw.od) {
            (Some(s), None, None, None) => OpKind::InsertText(s),
            (None, Some(s), None, None) => OpKind::DeleteText(s),
            (None, None, Some(v), None) => OpKind::InsertObject(v),
            (None, None, None, Some(v)) => OpKind::DeleteObject(v),
            (None, None, Some(new), Some(old)) => OpKind::ReplaceObject { old, new },
            _ => return Err(OpError::Malformed(format_path(&raw.p))),
        };

        let last = raw.p.last().ok_or(OpError::EmptyPath)?;
        let well_formed = if kind.is_text() {
            last.as_index().is_some()
        } else {
            last.as_key().is_some()
        };
        if !well_formed {
            return Err(OpError::Malformed(format_path(&raw.p)));
        }

        Ok(Self { path: raw.p, kind })
    }
}

impl From<OpComponent> for RawComponent {
    fn from(c: OpComponent) -> Self {
        let mut raw = RawComponent { p: c.path, si: None, sd: None, od: None, oi: None };
        match c.kind {
            OpKind::InsertText(s) => raw.si = Some(s),
            OpKind::DeleteText(s) => raw.sd = Some(s),
            OpKind::InsertObject(v) => raw.oi = Some(v),
            OpKind::DeleteObject(v) => raw.od = Some(v),
            OpKind::ReplaceObject { old, new } => {
                raw.od = Some(old);
                raw.oi = Some(new);
            }
        }
        raw
    }
}

impl OpComponent {
    /// Insert `text` into the string at `field`, at char `offset`.
    pub fn text_insert(field: &str, offset: usize, text: impl Into<String>) -> Self {
        Self {
            path: vec![field.into(), offset.into()],
            kind: OpKind::InsertText(text.into()),
        }
    }

    /// Delete `text` from the string at `field`, starting at char `offset`.
    pub fn text_delete(field: &str, offset: usize, text: impl Into<String>) -> Self {
        Self {
            path: vec![field.into(), offset.into()],
            kind: OpKind::DeleteText(text.into()),
        }
    }

    pub fn object_insert(path: Vec<PathSegment>, value: Value) -> Self {
        Self { path, kind: OpKind::InsertObject(value) }
    }

    pub fn object_delete(path: Vec<PathSegment>, old: Value) -> Self {
        Self { path, kind: OpKind::DeleteObject(old) }
    }

    pub fn object_replace(path: Vec<PathSegment>, old: Value, new: Value) -> Self {
        Self { path, kind: OpKind::ReplaceObject { old, new } }
    }

    /// Path of the container this component edits.
    pub fn parent(&self) -> &[PathSegment] {
        match self.path.split_last() {
            Some((_, parent)) => parent,
            None => &[],
        }
    }

    /// Char offset of a text component.
    pub fn offset(&self) -> Option<usize> {
        if self.kind.is_text() {
            self.path.last().and_then(PathSegment::as_index)
        } else {
            None
        }
    }

    /// Key of an object component.
    pub fn key(&self) -> Option<&str> {
        if self.kind.is_text() {
            None
        } else {
            self.path.last().and_then(PathSegment::as_key)
        }
    }

    fn with_offset(&self, offset: usize) -> Self {
        let mut path = self.parent().to_vec();
        path.push(PathSegment::Index(offset));
        Self { path, kind: self.kind.clone() }
    }

    fn with_kind(&self, kind: OpKind) -> Self {
        Self { path: self.path.clone(), kind }
    }

    /// Apply this component to `doc` in place.
    pub fn apply(&self, doc: &mut Value) -> Result<(), OpError> {
        let (last, parent) = self.path.split_last().ok_or(OpError::EmptyPath)?;
        let target = resolve_mut(doc, parent)?;

        match &self.kind {
            OpKind::InsertText(text) => {
                let Value::String(s) = target else {
                    return Err(OpError::NotText(format_path(parent)));
                };
                let offset = last.as_index().ok_or_else(|| OpError::Malformed(format_path(&self.path)))?;
                let at = byte_offset(s, offset).ok_or(OpError::OutOfRange {
                    offset,
                    len: s.chars().count(),
                })?;
                s.insert_str(at, text);
            }
            OpKind::DeleteText(text) => {
                let Value::String(s) = target else {
                    return Err(OpError::NotText(format_path(parent)));
                };
                let offset = last.as_index().ok_or_else(|| OpError::Malformed(format_path(&self.path)))?;
                let start = byte_offset(s, offset).ok_or(OpError::OutOfRange {
                    offset,
                    len: s.chars().count(),
                })?;
                let end = start + text.len();
                if s.get(start..end) != Some(text.as_str()) {
                    return Err(OpError::TextMismatch {
                        offset,
                        expected: text.clone(),
                    });
                }
                s.replace_range(start..end, "");
            }
            kind => {
                let Value::Object(map) = target else {
                    return Err(OpError::NotObject(format_path(parent)));
                };
                let key = last.as_key().ok_or_else(|| OpError::Malformed(format_path(&self.path)))?;
                match kind {
                    OpKind::InsertObject(v) | OpKind::ReplaceObject { new: v, .. } => {
                        map.insert(key.to_string(), v.clone());
                    }
                    OpKind::DeleteObject(_) => {
                        if map.remove(key).is_none() {
                            return Err(OpError::MissingKey(format_path(&self.path)));
                        }
                    }
                    OpKind::InsertText(_) | OpKind::DeleteText(_) => {}
                }
            }
        }
        Ok(())
    }
}

/// Apply every component in order. On error `doc` is left untouched.
pub fn apply(doc: &mut Value, op: &[OpComponent]) -> Result<(), OpError> {
    let mut next = doc.clone();
    for component in op {
        component.apply(&mut next)?;
    }
    *doc = next;
    Ok(())
}

// ───────────────────────────────────────────────────────────────────
// Transform
// ───────────────────────────────────────────────────────────────────

/// Which of two concurrent ops wins ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn flip(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Rewrite `op` so it applies on top of the concurrent `other`.
///
/// `transform(a, b, Left)` and `transform(b, a, Right)` converge:
/// `a · b'` and `b · a'` leave the same document.
pub fn transform(op: &[OpComponent], other: &[OpComponent], side: Side) -> Op {
    match side {
        Side::Left => transform_x(op, other).0,
        Side::Right => transform_x(other, op).1,
    }
}

/// Transform two concurrent ops against each other: `(left', right')`.
pub fn transform_x(left: &[OpComponent], right: &[OpComponent]) -> (Op, Op) {
    let mut left: Op = left.to_vec();
    let mut new_right: Op = Vec::new();

    for right_component in right {
        let mut current = Some(right_component.clone());
        let mut new_left = Vec::with_capacity(left.len());

        let mut k = 0;
        while k < left.len() {
            let Some(rc) = current.take() else { break };
            let lc = &left[k];
            new_left.extend(transform_component(lc, &rc, Side::Left));
            let mut next = transform_component(&rc, lc, Side::Right);
            k += 1;

            match next.len() {
                1 => current = next.pop(),
                0 => {
                    new_left.extend_from_slice(&left[k..]);
                    break;
                }
                _ => {
                    // The right component split in two; transform the rest of
                    // `left` against both halves.
                    let (l, r) = transform_x(&left[k..], &next);
                    new_left.extend(l);
                    new_right.extend(r);
                    break;
                }
            }
        }

        if let Some(rc) = current {
            new_right.push(rc);
        }
        left = new_left;
    }

    (left, new_right)
}

/// Transform a single component against a single concurrent component.
///
/// Returns zero components when `c` is absorbed, two when a text deletion
/// is split around a concurrent insertion.
pub fn transform_component(c: &OpComponent, other: &OpComponent, side: Side) -> Vec<OpComponent> {
    // Other replaced or removed a container that `c` edits inside.
    if !other.kind.is_text() && other.path.len() < c.path.len() && c.path.starts_with(&other.path) {
        return Vec::new();
    }

    if c.parent() != other.parent() {
        return vec![c.clone()];
    }

    match (c.offset(), other.offset()) {
        (Some(p), Some(q)) => transform_text(c, p, other, q, side),
        (None, None) => match (c.key(), other.key()) {
            (Some(a), Some(b)) if a == b => transform_object(c, other, side),
            _ => vec![c.clone()],
        },
        _ => vec![c.clone()],
    }
}

fn transform_text(c: &OpComponent, p: usize, other: &OpComponent, q: usize, side: Side) -> Vec<OpComponent> {
    match (&c.kind, &other.kind) {
        (OpKind::InsertText(_), OpKind::InsertText(o)) => {
            let shift = q < p || (q == p && side == Side::Right);
            let p = if shift { p + char_len(o) } else { p };
            vec![c.with_offset(p)]
        }
        (OpKind::InsertText(_), OpKind::DeleteText(o)) => {
            let m = char_len(o);
            let p = if p <= q {
                p
            } else if p <= q + m {
                q
            } else {
                p - m
            };
            vec![c.with_offset(p)]
        }
        (OpKind::DeleteText(s), OpKind::InsertText(o)) => {
            let n = char_len(s);
            let inserted = char_len(o);
            let mut out = Vec::with_capacity(2);
            let mut rest = s.clone();
            if p < q && q < p + n {
                let head = char_slice(s, 0, q - p);
                rest = char_slice(s, q - p, n);
                out.push(c.with_kind(OpKind::DeleteText(head)).with_offset(p));
            } else if q >= p + n {
                return vec![c.clone()];
            }
            out.push(c.with_kind(OpKind::DeleteText(rest)).with_offset(p + inserted));
            out
        }
        (OpKind::DeleteText(s), OpKind::DeleteText(o)) => {
            let n = char_len(s);
            let m = char_len(o);
            if p >= q + m {
                vec![c.with_offset(p - m)]
            } else if p + n <= q {
                vec![c.clone()]
            } else {
                // Overlap: keep only the chars the other side did not delete.
                let mut remaining = String::new();
                if p < q {
                    remaining.push_str(&char_slice(s, 0, q - p));
                }
                if p + n > q + m {
                    remaining.push_str(&char_slice(s, q + m - p, n));
                }
                if remaining.is_empty() {
                    Vec::new()
                } else {
                    vec![c.with_kind(OpKind::DeleteText(remaining)).with_offset(p.min(q))]
                }
            }
        }
        _ => vec![c.clone()],
    }
}

fn transform_object(c: &OpComponent, other: &OpComponent, side: Side) -> Vec<OpComponent> {
    match &other.kind {
        OpKind::ReplaceObject { new: theirs, .. } => match (c.kind.written_value(), side) {
            (Some(ours), Side::Left) => vec![c.with_kind(OpKind::ReplaceObject {
                old: theirs.clone(),
                new: ours.clone(),
            })],
            _ => Vec::new(),
        },
        OpKind::InsertObject(theirs) => match (c.kind.written_value(), side) {
            (Some(ours), Side::Left) => vec![c.with_kind(OpKind::ReplaceObject {
                old: theirs.clone(),
                new: ours.clone(),
            })],
            (Some(_), Side::Right) => Vec::new(),
            (None, _) => vec![c.clone()],
        },
        OpKind::DeleteObject(_) => match c.kind.written_value() {
            Some(ours) => vec![c.with_kind(OpKind::InsertObject(ours.clone()))],
            None => Vec::new(),
        },
        OpKind::InsertText(_) | OpKind::DeleteText(_) => vec![c.clone()],
    }
}

// ───────────────────────────────────────────────────────────────────
// Helpers
// ───────────────────────────────────────────────────────────────────

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn char_slice(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}

/// Byte index of char `offset`; the string length when `offset` is the end.
fn byte_offset(s: &str, offset: usize) -> Option<usize> {
    match s.char_indices().nth(offset) {
        Some((i, _)) => Some(i),
        None if s.chars().count() == offset => Some(s.len()),
        None => None,
    }
}

fn resolve_mut<'a>(mut value: &'a mut Value, path: &[PathSegment]) -> Result<&'a mut Value, OpError> {
    for segment in path {
        value = match (segment, value) {
            (PathSegment::Key(k), Value::Object(map)) => map.get_mut(k),
            (PathSegment::Index(i), Value::Array(items)) => items.get_mut(*i),
            _ => None,
        }
        .ok_or_else(|| OpError::InvalidPath(format_path(path)))?;
    }
    Ok(value)
}

fn format_path(path: &[PathSegment]) -> String {
    let parts: Vec<String> = path
        .iter()
        .map(|s| match s {
            PathSegment::Index(i) => i.to_string(),
            PathSegment::Key(k) => k.clone(),
        })
        .collect();
    format!("[{}]", parts.join(", "))
}

/// Operation errors.
#[derive(Debug, Clone, PartialEq)]
pub enum OpError {
    EmptyPath,
    Malformed(String),
    InvalidPath(String),
    NotText(String),
    NotObject(String),
    MissingKey(String),
    OutOfRange { offset: usize, len: usize },
    TextMismatch { offset: usize, expected: String },
}

impl std::fmt::Display for OpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyPath => write!(f, "Op error: empty path"),
            Self::Malformed(p) => write!(f, "Op error: malformed component at {p}"),
            Self::InvalidPath(p) => write!(f, "Op error: no value at {p}"),
            Self::NotText(p) => write!(f, "Op error: {p} is not a string"),
            Self::NotObject(p) => write!(f, "Op error: {p} is not an object"),
            Self::MissingKey(p) => write!(f, "Op error: no key at {p}"),
            Self::OutOfRange { offset, len } => {
                write!(f, "Op error: offset {offset} beyond text length {len}")
            }
            Self::TextMismatch { offset, expected } => {
                write!(f, "Op error: text at {offset} does not match {expected:?}")
            }
        }
    }
}

impl std::error::Error for OpError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(content: &str) -> Value {
        json!({ "content": content })
    }

    fn applied(start: &Value, ops: &[&[OpComponent]]) -> Value {
        let mut d = start.clone();
        for op in ops {
            apply(&mut d, op).unwrap();
        }
        d
    }

    /// Both application orders of two concurrent ops reach the same document.
    fn assert_converges(start: Value, a: Op, b: Op) -> Value {
        let a_prime = transform(&a, &b, Side::Left);
        let b_prime = transform(&b, &a, Side::Right);
        let via_a = applied(&start, &[&a, &b_prime]);
        let via_b = applied(&start, &[&b, &a_prime]);
        assert_eq!(via_a, via_b, "a'={a_prime:?} b'={b_prime:?}");
        via_a
    }

    #[test]
    fn test_component_wire_shapes() {
        let insert = OpComponent::text_insert("content", 0, "X");
        assert_eq!(serde_json::to_value(&insert).unwrap(), json!({ "p": ["content", 0], "si": "X" }));

        let replace = OpComponent::object_replace(
            vec!["cursor".into(), "s1".into()],
            json!(1),
            json!(2),
        );
        assert_eq!(
            serde_json::to_value(&replace).unwrap(),
            json!({ "p": ["cursor", "s1"], "od": 1, "oi": 2 })
        );
    }

    #[test]
    fn test_decode_components() {
        let op: Op = serde_json::from_value(json!([
            { "p": ["content", 3], "sd": "abc" },
            { "p": ["cursor", "s9"], "oi": { "x": 1 } }
        ]))
        .unwrap();
        assert_eq!(op[0].kind, OpKind::DeleteText("abc".into()));
        assert_eq!(op[0].offset(), Some(3));
        assert_eq!(op[1].key(), Some("s9"));
    }

    #[test]
    fn test_decode_rejects_mixed_component() {
        let bad = json!({ "p": ["content", 0], "si": "a", "sd": "b" });
        assert!(serde_json::from_value::<OpComponent>(bad).is_err());

        let text_on_key = json!({ "p": ["content", "x"], "si": "a" });
        assert!(serde_json::from_value::<OpComponent>(text_on_key).is_err());
    }

    #[test]
    fn test_apply_text_ops() {
        let mut d = doc("hello");
        apply(&mut d, &[OpComponent::text_insert("content", 0, "X")]).unwrap();
        assert_eq!(d, doc("Xhello"));

        apply(&mut d, &[OpComponent::text_delete("content", 1, "hel")]).unwrap();
        assert_eq!(d, doc("Xlo"));
    }

    #[test]
    fn test_apply_counts_chars() {
        let mut d = doc("héllo");
        apply(&mut d, &[OpComponent::text_insert("content", 2, "!")]).unwrap();
        assert_eq!(d, doc("hé!llo"));
    }

    #[test]
    fn test_apply_delete_mismatch_leaves_doc() {
        let mut d = doc("hello");
        let op = vec![
            OpComponent::text_insert("content", 0, "X"),
            OpComponent::text_delete("content", 1, "nope"),
        ];
        let err = apply(&mut d, &op).unwrap_err();
        assert!(matches!(err, OpError::TextMismatch { offset: 1, .. }));
        assert_eq!(d, doc("hello"));
    }

    #[test]
    fn test_apply_out_of_range() {
        let mut d = doc("ab");
        let err = apply(&mut d, &[OpComponent::text_insert("content", 5, "x")]).unwrap_err();
        assert_eq!(err, OpError::OutOfRange { offset: 5, len: 2 });
    }

    #[test]
    fn test_apply_object_ops() {
        let mut d = json!({ "cursor": {} });
        let path: Vec<PathSegment> = vec!["cursor".into(), "s1".into()];
        apply(&mut d, &[OpComponent::object_insert(path.clone(), json!(1))]).unwrap();
        apply(&mut d, &[OpComponent::object_replace(path.clone(), json!(1), json!(2))]).unwrap();
        assert_eq!(d, json!({ "cursor": { "s1": 2 } }));

        apply(&mut d, &[OpComponent::object_delete(path.clone(), json!(2))]).unwrap();
        assert_eq!(d, json!({ "cursor": {} }));

        let err = apply(&mut d, &[OpComponent::object_delete(path, json!(2))]).unwrap_err();
        assert!(matches!(err, OpError::MissingKey(_)));
    }

    #[test]
    fn test_transform_insert_tie_left_first() {
        let a = vec![OpComponent::text_insert("content", 2, "A")];
        let b = vec![OpComponent::text_insert("content", 2, "B")];
        let result = assert_converges(doc("xxxx"), a, b);
        assert_eq!(result, doc("xxABxx"));
    }

    #[test]
    fn test_transform_insert_before_delete() {
        let a = vec![OpComponent::text_insert("content", 0, "X")];
        let b = vec![OpComponent::text_delete("content", 2, "ll")];
        let result = assert_converges(doc("hello"), a, b);
        assert_eq!(result, doc("Xheo"));
    }

    #[test]
    fn test_transform_insert_inside_deleted_range() {
        let a = vec![OpComponent::text_insert("content", 3, "X")];
        let b = vec![OpComponent::text_delete("content", 1, "ell")];
        let result = assert_converges(doc("hello"), a, b);
        assert_eq!(result, doc("hXo"));
    }

    #[test]
    fn test_transform_delete_split_by_insert() {
        let a = vec![OpComponent::text_delete("content", 1, "ell")];
        let b = vec![OpComponent::text_insert("content", 2, "XY")];

        let a_prime = transform(&a, &b, Side::Left);
        assert_eq!(
            a_prime,
            vec![
                OpComponent::text_delete("content", 1, "e"),
                OpComponent::text_delete("content", 3, "ll"),
            ]
        );
        let result = assert_converges(doc("hello"), a, b);
        assert_eq!(result, doc("hXYo"));
    }

    #[test]
    fn test_transform_overlapping_deletes() {
        let a = vec![OpComponent::text_delete("content", 1, "ell")];
        let b = vec![OpComponent::text_delete("content", 2, "llo")];
        let result = assert_converges(doc("hello!"), a, b);
        assert_eq!(result, doc("h!"));
    }

    #[test]
    fn test_transform_identical_deletes_vanish() {
        let a = vec![OpComponent::text_delete("content", 0, "he")];
        let b = a.clone();
        assert!(transform(&a, &b, Side::Left).is_empty());
        assert_eq!(assert_converges(doc("hello"), a, b), doc("llo"));
    }

    #[test]
    fn test_transform_multi_component_batches() {
        // Replacement on one side, typing on the other.
        let a = vec![
            OpComponent::text_delete("content", 0, "hello"),
            OpComponent::text_insert("content", 0, "howdy"),
        ];
        let b = vec![
            OpComponent::text_insert("content", 5, " world"),
            OpComponent::text_insert("content", 0, ">"),
        ];
        let result = assert_converges(doc("hello"), a, b);
        assert_eq!(result, doc("howdy> world"));
    }

    #[test]
    fn test_transform_same_cursor_key() {
        let path: Vec<PathSegment> = vec!["cursor".into(), "s1".into()];
        let start = json!({ "cursor": { "s1": 0 } });
        let a = vec![OpComponent::object_replace(path.clone(), json!(0), json!(1))];
        let b = vec![OpComponent::object_replace(path, json!(0), json!(2))];
        let result = assert_converges(start, a, b);
        assert_eq!(result, json!({ "cursor": { "s1": 1 } }));
    }

    #[test]
    fn test_transform_delete_against_replace() {
        let path: Vec<PathSegment> = vec!["cursor".into(), "s1".into()];
        let start = json!({ "cursor": { "s1": 0 } });
        let a = vec![OpComponent::object_delete(path.clone(), json!(0))];
        let b = vec![OpComponent::object_replace(path, json!(0), json!(7))];
        let result = assert_converges(start, a, b);
        assert_eq!(result, json!({ "cursor": { "s1": 7 } }));
    }

    #[test]
    fn test_transform_independent_keys() {
        let start = json!({ "cursor": {} });
        let a = vec![OpComponent::object_insert(vec!["cursor".into(), "s1".into()], json!(1))];
        let b = vec![OpComponent::object_insert(vec!["cursor".into(), "s2".into()], json!(2))];
        assert_eq!(transform(&a, &b, Side::Left), a);
        let result = assert_converges(start, a, b);
        assert_eq!(result, json!({ "cursor": { "s1": 1, "s2": 2 } }));
    }

    #[test]
    fn test_transform_edit_inside_replaced_container() {
        let start = json!({ "meta": { "title": "abc" } });
        let a = vec![OpComponent {
            path: vec!["meta".into(), "title".into(), 0usize.into()],
            kind: OpKind::InsertText("x".into()),
        }];
        let b = vec![OpComponent::object_replace(
            vec!["meta".into()],
            json!({ "title": "abc" }),
            json!({}),
        )];
        assert!(transform(&a, &b, Side::Left).is_empty());
        assert_eq!(assert_converges(start, a, b), json!({ "meta": {} }));
    }

    #[test]
    fn test_side_flip() {
        assert_eq!(Side::Left.flip(), Side::Right);
        assert_eq!(Side::Right.flip(), Side::Left);
    }
}
