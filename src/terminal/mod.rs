pub mod cell;
pub mod charset;
pub mod color;
pub mod cursor;
pub mod grid;
pub mod hyperlink;
pub mod line;
pub mod modes;
pub mod screen;
pub mod search;
pub mod selection;

pub use screen::Screen;
