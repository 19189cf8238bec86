pub mod follow;
pub mod tui;
