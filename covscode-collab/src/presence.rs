//! Presence: where every participant's cursor is.
//!
//! ```text
//! local caret move
//!       │
//!       ▼
//! cursor_update_op()  ──► presence doc  { cursor: { <siteId>: CursorInfo } }
//!                                │
//!            remote op batch ◄───┘
//!                  │
//!                  ▼
//! PresenceState::rebuild()  ──► SessionUi::render_cursors()
//! ```
//!
//! Entries are keyed by site id, so one user in two windows shows two
//! cursors. A site that left stays out of the list even while its entry
//! lingers in the document.

use std::collections::HashSet;

use covscode_core::{Op, OpComponent, Participant, PathSegment};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level field of the presence document.
pub const CURSOR_FIELD: &str = "cursor";

// ───────────────────────────────────────────────────────────────────
// Wire shape
// ───────────────────────────────────────────────────────────────────

/// Position of one cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPosition {
    pub file_path: String,
    /// Character offset into the file
    pub position: usize,
}

/// One participant's cursor, as stored in the presence document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorInfo {
    pub user: Participant,
    pub cursor_position: CursorPosition,
}

impl CursorInfo {
    pub fn new(user: Participant, file_path: impl Into<String>, position: usize) -> Self {
        Self {
            user,
            cursor_position: CursorPosition {
                file_path: file_path.into(),
                position,
            },
        }
    }

    pub fn site_id(&self) -> Option<&str> {
        self.user.site_id()
    }

    /// Whether this cursor belongs in the editor showing `editor_path`.
    pub fn targets(&self, editor_path: &str) -> bool {
        !self.cursor_position.file_path.is_empty()
            && editor_path.ends_with(self.cursor_position.file_path.as_str())
    }
}

// ───────────────────────────────────────────────────────────────────
// Presence document ops
// ───────────────────────────────────────────────────────────────────

/// Op writing `info` under its site id: replace when present, else insert.
///
/// `current` is the presence document's data; a document without a cursor
/// map gets one.
pub fn cursor_update_op(current: &Value, info: &CursorInfo) -> Result<Op, PresenceError> {
    let site_id = info.site_id().ok_or_else(|| PresenceError::MissingSiteId(info.user.label()))?;
    let value = serde_json::to_value(info).map_err(|e| PresenceError::Encode(e.to_string()))?;

    let Some(map) = current.get(CURSOR_FIELD).and_then(Value::as_object) else {
        let mut fresh = Map::new();
        fresh.insert(site_id.to_string(), value);
        let path = vec![PathSegment::from(CURSOR_FIELD)];
        return Ok(match current.get(CURSOR_FIELD) {
            Some(old) => vec![OpComponent::object_replace(path, old.clone(), Value::Object(fresh))],
            None => vec![OpComponent::object_insert(path, Value::Object(fresh))],
        });
    };

    let path = vec![PathSegment::from(CURSOR_FIELD), PathSegment::from(site_id)];
    Ok(match map.get(site_id) {
        Some(old) if *old == value => Vec::new(),
        Some(old) => vec![OpComponent::object_replace(path, old.clone(), value)],
        None => vec![OpComponent::object_insert(path, value)],
    })
}

/// Op deleting the entry for `site_id`, if there is one.
pub fn cursor_removal_op(current: &Value, site_id: &str) -> Option<Op> {
    let old = current.get(CURSOR_FIELD)?.get(site_id)?;
    let path = vec![PathSegment::from(CURSOR_FIELD), PathSegment::from(site_id)];
    Some(vec![OpComponent::object_delete(path, old.clone())])
}

/// Initial contents of a presence document.
pub fn empty_presence() -> Value {
    serde_json::json!({ CURSOR_FIELD: {} })
}

// ───────────────────────────────────────────────────────────────────
// Local view
// ───────────────────────────────────────────────────────────────────

/// Ordered cursor list, one entry per site id.
#[derive(Debug, Clone, Default)]
pub struct PresenceState {
    cursors: Vec<CursorInfo>,
    departed: HashSet<String>,
}

impl PresenceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursors(&self) -> &[CursorInfo] {
        &self.cursors
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    pub fn get(&self, site_id: &str) -> Option<&CursorInfo> {
        self.cursors.iter().find(|c| c.site_id() == Some(site_id))
    }

    /// Move (or add) the cursor of `user`. The user must carry a site id.
    pub fn update(&mut self, user: &Participant, file_path: &str, position: usize) -> Result<(), PresenceError> {
        let site_id = user.site_id().ok_or_else(|| PresenceError::MissingSiteId(user.label()))?;
        match self.cursors.iter_mut().find(|c| c.site_id() == Some(site_id)) {
            Some(existing) => {
                existing.cursor_position = CursorPosition {
                    file_path: file_path.to_string(),
                    position,
                };
            }
            None => self.cursors.push(CursorInfo::new(user.clone(), file_path, position)),
        }
        Ok(())
    }

    /// Drop the cursor of `user` and ignore its site from now on.
    ///
    /// False when there was no cursor to drop.
    pub fn remove(&mut self, user: &Participant) -> bool {
        let Some(site_id) = user.site_id() else {
            return false;
        };
        self.departed.insert(site_id.to_string());
        let before = self.cursors.len();
        self.cursors.retain(|c| c.site_id() != Some(site_id));
        self.cursors.len() != before
    }

    pub fn reset(&mut self) {
        self.cursors.clear();
        self.departed.clear();
    }

    /// Bring the list in line with the presence document's cursor map.
    ///
    /// Known entries keep their place, new ones are appended, and entries
    /// missing from the map are dropped. Malformed entries and departed
    /// sites are skipped.
    pub fn rebuild(&mut self, data: &Value) {
        let Some(map) = data.get(CURSOR_FIELD).and_then(Value::as_object) else {
            self.cursors.clear();
            return;
        };

        for (site_id, entry) in map {
            if self.departed.contains(site_id) {
                continue;
            }
            match serde_json::from_value::<CursorInfo>(entry.clone()) {
                Ok(info) if info.site_id() == Some(site_id.as_str()) => {
                    let pos = info.cursor_position;
                    // site id checked above
                    let _ = self.update(&info.user, &pos.file_path, pos.position);
                }
                Ok(_) => log::debug!("Cursor entry {site_id} names another site"),
                Err(e) => log::debug!("Malformed cursor entry {site_id}: {e}"),
            }
        }
        self.cursors
            .retain(|c| c.site_id().is_some_and(|site| map.contains_key(site)));
    }

    /// Cursors to draw in the editor showing `editor_path`, with colors.
    ///
    /// Colors follow each cursor's index within the editor's group.
    pub fn cursors_for_file<'a>(&'a self, editor_path: &str, local_site: Option<&str>) -> Vec<(CursorColor, &'a CursorInfo)> {
        self.cursors
            .iter()
            .filter(|c| c.targets(editor_path))
            .filter(|c| local_site.is_none() || c.site_id() != local_site)
            .enumerate()
            .map(|(i, c)| (CursorColor::from_palette(i), c))
            .collect()
    }
}

// ───────────────────────────────────────────────────────────────────
// Colors
// ───────────────────────────────────────────────────────────────────

/// Number of distinct palette entries before colors repeat.
pub const PALETTE_SIZE: usize = 8;

/// RGBA color for cursor decorations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl CursorColor {
    /// Palette entry `index`, wrapping after [`PALETTE_SIZE`].
    pub fn from_palette(index: usize) -> Self {
        let hue = (index % PALETTE_SIZE) as f32 / PALETTE_SIZE as f32;
        let (r, g, b) = hsl_to_rgb(hue, 0.7, 0.55);
        Self { r, g, b, a: 1.0 }
    }

    pub fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// `#rrggbb`, alpha dropped.
    pub fn to_hex(&self) -> String {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02x}{:02x}{:02x}", channel(self.r), channel(self.g), channel(self.b))
    }
}

impl Default for CursorColor {
    fn default() -> Self {
        Self::from_palette(0)
    }
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

/// Presence errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceError {
    /// Cursor updates need the server-assigned site id
    MissingSiteId(String),
    Encode(String),
}

impl std::fmt::Display for PresenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSiteId(user) => write!(f, "Presence error: {user} has no site id"),
            Self::Encode(e) => write!(f, "Presence error: {e}"),
        }
    }
}

impl std::error::Error for PresenceError {}
