pub mod puppeteer;

pub use puppeteer::{ChromeBoard, LaunchConfig, Session};

/// A rendered listing page made of repeated tiles that grows as it is scrolled.
pub trait Board {
    type Tile<'a>: Tile
    where
        Self: 'a;

    fn tile_count(&self) -> anyhow::Result<usize>;

    fn scroll_to_bottom(&self) -> anyhow::Result<()>;

    /// Tiles currently present, in document order.
    fn tiles(&self) -> anyhow::Result<Vec<Self::Tile<'_>>>;
}

/// One tile of a [`Board`]. Selectors are CSS, relative to the tile.
pub trait Tile {
    fn scroll_into_view(&self) -> anyhow::Result<()>;

    fn contains(&self, selector: &str) -> bool;

    /// Rendered text of the first match.
    fn text(&self, selector: &str) -> anyhow::Result<String>;

    /// Resolved `href` of the first match, empty when it has none.
    fn href(&self, selector: &str) -> anyhow::Result<String>;
}
