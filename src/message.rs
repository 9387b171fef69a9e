use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    White,
    Gray,
    Gold,
    Yellow,
    Green,
    Red,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Segment {
    text: String,
    color: Color,
}

/// Coloured chat text. `Display` gives the plain rendering used for the console.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    segments: Vec<Segment>,
}
impl Message {
    pub fn new(text: impl Into<String>, color: Color) -> Self {
        Self::default().then(text, color)
    }
    pub fn then(mut self, text: impl Into<String>, color: Color) -> Self {
        self.segments.push(Segment { text: text.into(), color });
        self
    }
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, Color::Red)
    }
    pub fn success(text: impl Into<String>) -> Self {
        Self::new(text, Color::Green)
    }
    pub fn notice(text: impl Into<String>) -> Self {
        Self::new(text, Color::Yellow)
    }
    pub fn color(&self) -> Option<Color> {
        self.segments.first().map(|s| s.color)
    }
    pub fn to_json(&self) -> String {
        serde_json::json!({ "text": "", "extra": self.segments }).to_string()
    }
}
impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.segments.iter().try_for_each(|s| f.write_str(&s.text))
    }
}
