pub mod bookmarks;
pub mod ui;

pub use bookmarks::*;
