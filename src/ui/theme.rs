use ratatui::style::Color;

// Dark slate surfaces with the Nix snowflake blue as the accent.
//
// Keep this palette cohesive. Prefer adding new roles here instead of sprinkling colors through the UI.
pub const BAR_BG: Color = Color::Rgb(15, 20, 30);

pub const FG: Color = Color::Rgb(226, 232, 240);
pub const MUTED: Color = Color::Rgb(148, 163, 184);
pub const DIM: Color = Color::Rgb(100, 116, 139);
pub const BORDER: Color = Color::Rgb(51, 65, 85);

pub const ACCENT: Color = Color::Rgb(126, 186, 228);
pub const ACCENT_STRONG: Color = Color::Rgb(82, 119, 195);

// Semantic colors (keep minimal).
pub const HIGHLIGHT: Color = Color::Yellow; // selected row
pub const REQUIRED: Color = Color::Rgb(248, 113, 113); // required option marker
pub const RUNNING: Color = Color::Rgb(134, 239, 172); // executing indicator
