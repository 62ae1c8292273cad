//! Canvas model: strokes, text annotations and room metadata.

use crate::error::ValidationError;
use kurbo::Point;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Store-generated key of a stroke or text record.
pub type RecordId = String;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Identity of a signed-in user as issued by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Six-digit room identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Number of digits in a room id.
    pub const LEN: usize = 6;

    /// Validate a room id: exactly six ASCII digits.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let len = input.chars().count();
        if len != Self::LEN {
            return Err(ValidationError::RoomIdLength(len));
        }
        if !input.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::RoomIdNotNumeric);
        }
        Ok(Self(input.to_string()))
    }

    /// Id for a number known to have six digits.
    pub(crate) fn from_digits(n: u32) -> Self {
        debug_assert!((100_000..=999_999).contains(&n));
        Self(n.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An sRGB color, stored on the wire as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RgbHex {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbHex {
    pub const BLACK: RgbHex = RgbHex::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl Default for RgbHex {
    fn default() -> Self {
        Self::BLACK
    }
}

impl FromStr for RgbHex {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidColor(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        match hex.len() {
            6 => Ok(Self::new(channel(0)?, channel(2)?, channel(4)?)),
            3 => {
                // #rgb shorthand
                let short = |i: usize| {
                    u8::from_str_radix(&hex[i..i + 1], 16)
                        .map(|v| v * 17)
                        .map_err(|_| invalid())
                };
                Ok(Self::new(short(0)?, short(1)?, short(2)?))
            }
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for RgbHex {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RgbHex> for String {
    fn from(value: RgbHex) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RgbHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A record stored under a store-generated key.
pub trait Record: Clone + Serialize + DeserializeOwned {
    fn id(&self) -> &str;
    fn set_id(&mut self, id: RecordId);
    /// Structural checks serde cannot express.
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// A freehand polyline drawn in one gesture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    #[serde(skip)]
    pub id: RecordId,
    #[serde(default)]
    pub color: RgbHex,
    pub width: f64,
    pub points: Vec<Point>,
    pub user_id: UserId,
    pub timestamp: i64,
}

impl Stroke {
    /// Start a stroke at a single point, stamped with the current time.
    pub fn begin(color: RgbHex, width: f64, start: Point, user_id: UserId) -> Self {
        Self {
            id: RecordId::new(),
            color,
            width,
            points: vec![start],
            user_id,
            timestamp: now_millis(),
        }
    }
}

impl Record for Stroke {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn check(&self) -> Result<(), String> {
        if self.points.is_empty() {
            return Err("stroke has no points".to_string());
        }
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(format!("stroke width {} is not positive", self.width));
        }
        Ok(())
    }
}

/// A text label anchored at its baseline-left point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAnnotation {
    #[serde(skip)]
    pub id: RecordId,
    pub text: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub color: RgbHex,
    #[serde(default = "TextAnnotation::default_size")]
    pub size: f64,
    pub user_id: UserId,
    pub timestamp: i64,
}

impl TextAnnotation {
    /// Size used when a record carries none.
    pub const DEFAULT_SIZE: f64 = 16.0;

    fn default_size() -> f64 {
        Self::DEFAULT_SIZE
    }

    pub fn new(text: impl Into<String>, anchor: Point, color: RgbHex, size: f64, user_id: UserId) -> Self {
        Self {
            id: RecordId::new(),
            text: text.into(),
            x: anchor.x,
            y: anchor.y,
            color,
            size,
            user_id,
            timestamp: now_millis(),
        }
    }

    pub fn anchor(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

impl Record for TextAnnotation {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn check(&self) -> Result<(), String> {
        if self.text.trim().is_empty() {
            return Err("text is empty".to_string());
        }
        if !(self.size.is_finite() && self.size > 0.0) {
            return Err(format!("text size {} is not positive", self.size));
        }
        Ok(())
    }
}

/// Room metadata stored at `rooms/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    #[serde(skip)]
    pub id: String,
    pub host_id: UserId,
    #[serde(default)]
    pub created_at: i64,
}

impl Record for Room {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }
}

/// Records decoded from a collection snapshot.
#[derive(Debug, Clone)]
pub struct DecodedRecords<T> {
    pub records: BTreeMap<RecordId, T>,
    /// Keys that failed to decode, with the reason.
    pub rejected: Vec<(RecordId, String)>,
}

/// Decode a keyed collection snapshot. Absent means empty; malformed entries
/// are reported in `rejected` and left out.
pub fn decode_records<T: Record>(value: Option<&Value>) -> DecodedRecords<T> {
    let mut decoded = DecodedRecords {
        records: BTreeMap::new(),
        rejected: Vec::new(),
    };
    let Some(value) = value else {
        return decoded;
    };
    let Some(entries) = value.as_object() else {
        if !value.is_null() {
            decoded
                .rejected
                .push((RecordId::new(), "collection is not an object".to_string()));
        }
        return decoded;
    };

    for (key, entry) in entries {
        let parsed = serde_json::from_value::<T>(entry.clone())
            .map_err(|e| e.to_string())
            .and_then(|record| record.check().map(|_| record));
        match parsed {
            Ok(mut record) => {
                record.set_id(key.clone());
                decoded.records.insert(key.clone(), record);
            }
            Err(reason) => decoded.rejected.push((key.clone(), reason)),
        }
    }
    decoded
}

/// Local view of one room's canvas.
///
/// Iteration over strokes and texts follows key order, which for push keys is
/// creation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanvasModel {
    strokes: BTreeMap<RecordId, Stroke>,
    texts: BTreeMap<RecordId, TextAnnotation>,
    current_stroke: Option<RecordId>,
}

impl CanvasModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strokes(&self) -> impl Iterator<Item = &Stroke> {
        self.strokes.values()
    }

    pub fn texts(&self) -> impl Iterator<Item = &TextAnnotation> {
        self.texts.values()
    }

    pub fn stroke_map(&self) -> &BTreeMap<RecordId, Stroke> {
        &self.strokes
    }

    pub fn text_map(&self) -> &BTreeMap<RecordId, TextAnnotation> {
        &self.texts
    }

    pub fn stroke(&self, id: &str) -> Option<&Stroke> {
        self.strokes.get(id)
    }

    pub fn text(&self, id: &str) -> Option<&TextAnnotation> {
        self.texts.get(id)
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }

    pub fn text_count(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.texts.is_empty()
    }

    /// Id of the stroke this client is drawing, if any.
    pub fn current_stroke(&self) -> Option<&str> {
        self.current_stroke.as_deref()
    }

    pub fn set_current_stroke(&mut self, id: Option<RecordId>) {
        self.current_stroke = id;
    }

    pub fn insert_stroke(&mut self, stroke: Stroke) {
        self.strokes.insert(stroke.id.clone(), stroke);
    }

    pub fn insert_text(&mut self, text: TextAnnotation) {
        self.texts.insert(text.id.clone(), text);
    }

    pub fn remove_stroke(&mut self, id: &str) -> Option<Stroke> {
        self.strokes.remove(id)
    }

    pub fn remove_text(&mut self, id: &str) -> Option<TextAnnotation> {
        self.texts.remove(id)
    }

    /// Append a point to a stroke. Returns the updated stroke, or `None` if the
    /// stroke is not in the model.
    pub fn append_point(&mut self, id: &str, point: Point) -> Option<&Stroke> {
        let stroke = self.strokes.get_mut(id)?;
        stroke.points.push(point);
        Some(stroke)
    }

    pub fn replace_strokes(&mut self, strokes: BTreeMap<RecordId, Stroke>) {
        self.strokes = strokes;
    }

    pub fn replace_texts(&mut self, texts: BTreeMap<RecordId, TextAnnotation>) {
        self.texts = texts;
    }

    /// Drop every stroke and text.
    pub fn clear(&mut self) {
        self.strokes.clear();
        self.texts.clear();
    }
}
