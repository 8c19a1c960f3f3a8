use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("Failed to persist annotations: {0}")]
    Persistence(#[from] score_store::StoreError),
    #[error("Unknown color: {0}")]
    InvalidColor(String),
}

pub type Result<T> = std::result::Result<T, AnnotationError>;

/// Namespace used for annotations when nobody is signed in
pub const ANONYMOUS_USER: &str = "anonymous";

/// Page-fraction coordinate, both components in `[0, 1]`
pub type Point = [f32; 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Pans the page, never records
    Cursor,
    Pen,
    Eraser,
}

impl Tool {
    /// Stroke width in device-independent pixels
    pub fn default_width(self) -> f32 {
        match self {
            Tool::Eraser => 20.0,
            Tool::Pen | Tool::Cursor => 1.0,
        }
    }

    pub fn records(self) -> bool {
        !matches!(self, Tool::Cursor)
    }
}

/// Ink palette. Serialized as the hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Color {
    #[default]
    #[serde(rename = "#000000")]
    Black,
    #[serde(rename = "#607d8b")]
    BlueGrey,
    #[serde(rename = "#1e96f2")]
    Blue,
    #[serde(rename = "#673ab7")]
    Purple,
    #[serde(rename = "#f44336")]
    Red,
    #[serde(rename = "#ff9800")]
    Orange,
    #[serde(rename = "#4caf50")]
    Green,
    #[serde(rename = "#795648")]
    Brown,
}

impl Color {
    pub const ALL: [Color; 8] = [
        Color::Black,
        Color::BlueGrey,
        Color::Blue,
        Color::Purple,
        Color::Red,
        Color::Orange,
        Color::Green,
        Color::Brown,
    ];

    pub fn hex(self) -> &'static str {
        match self {
            Color::Black => "#000000",
            Color::BlueGrey => "#607d8b",
            Color::Blue => "#1e96f2",
            Color::Purple => "#673ab7",
            Color::Red => "#f44336",
            Color::Orange => "#ff9800",
            Color::Green => "#4caf50",
            Color::Brown => "#795648",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Color::Black => "black",
            Color::BlueGrey => "bluegrey",
            Color::Blue => "blue",
            Color::Purple => "purple",
            Color::Red => "red",
            Color::Orange => "orange",
            Color::Green => "green",
            Color::Brown => "brown",
        }
    }

    pub fn rgb(self) -> [u8; 3] {
        let hex = &self.hex()[1..];
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0);
        [channel(0), channel(2), channel(4)]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts a palette name (`"red"`) or its hex string (`"#f44336"`)
impl FromStr for Color {
    type Err = AnnotationError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Color::ALL
            .into_iter()
            .find(|c| c.name() == wanted || c.hex() == wanted)
            .ok_or_else(|| AnnotationError::InvalidColor(s.to_string()))
    }
}

/// One recorded stroke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawInstruction {
    pub tool: Tool,
    pub color: Color,
    /// Device-independent pixels, scaled by the surface density at draw time
    pub width: f32,
    pub points: Vec<Point>,
}

/// Where the annotations of one page live
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnnotationKey {
    pub uid: Option<String>,
    pub score_key: String,
    pub part_key: String,
    pub page: usize,
}

impl AnnotationKey {
    pub fn new(
        uid: Option<String>,
        score_key: impl Into<String>,
        part_key: impl Into<String>,
        page: usize,
    ) -> Self {
        Self {
            uid,
            score_key: score_key.into(),
            part_key: part_key.into(),
            page,
        }
    }

    pub fn storage_key(&self) -> String {
        format!(
            "annotation/{}/{}/{}/{}",
            self.uid.as_deref().unwrap_or(ANONYMOUS_USER),
            self.score_key,
            self.part_key,
            self.page
        )
    }
}
