use core::time::Duration;

use anyhow::Context as _;
use hcol::{
    db::{Store, publish},
    event::{EventListing, NOT_MENTIONED, classify_location, parse_period},
    scrape::{Board, Tile},
    util::wait_until,
};

pub const TILE: &str = ".hackathon-tile";
const LINK: &str = "a";

enum Policy {
    /// The tile is dropped when the field cannot be read.
    Required,
    /// The field falls back to this value.
    Default(&'static str),
}

struct Field {
    name: &'static str,
    selector: &'static str,
    policy: Policy,
}

const TITLE: Field = Field { name: "name", selector: "h3.mb-4", policy: Policy::Required };
const PERIOD: Field = Field { name: "submission period", selector: ".submission-period", policy: Policy::Required };
const INFO: Field = Field { name: "location", selector: ".info", policy: Policy::Required };
const PRIZE: Field = Field { name: "prize", selector: ".prize-amount", policy: Policy::Default(NOT_MENTIONED) };

/// Upper bounds of the waits for client-side rendering.
#[derive(Clone, Copy, Debug)]
pub struct Pacing {
    /// First tile after navigation.
    pub first_tile: Duration,
    /// New tiles after a scroll.
    pub scroll: Duration,
    /// A tile's content after it was scrolled into view.
    pub settle: Duration,
    pub poll: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            first_tile: const { Duration::from_secs(15) },
            scroll: const { Duration::from_secs(2) },
            settle: const { Duration::from_secs(1) },
            poll: const { Duration::from_millis(250) },
        }
    }
}

pub struct Context {
    pub target_count: usize,
    pub max_scrolls: usize,
    pub pacing: Pacing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stop {
    Target,
    Ceiling,
    Stalled,
}

#[derive(Debug)]
pub struct Loaded {
    pub stop: Stop,
    pub scrolls: usize,
    pub tiles: usize,
}

#[derive(Debug)]
pub struct Harvest {
    pub records: Vec<EventListing>,
    pub skipped: usize,
}

/// Scrolls until `target_count` tiles exist, `max_scrolls` productive scrolls
/// were made, or a scroll brings no new tile.
pub fn load_more<B: Board>(ctx: &Context, board: &B) -> anyhow::Result<Loaded> {
    let Pacing { scroll, poll, .. } = ctx.pacing;

    let mut previous = 0;
    let mut attempt = 0;
    let mut scrolls = 0;
    let mut current = board.tile_count()?;

    let stop = loop {
        if current >= ctx.target_count {
            break Stop::Target;
        }
        if attempt >= ctx.max_scrolls {
            break Stop::Ceiling;
        }

        board.scroll_to_bottom()?;
        scrolls += 1;

        let before = current;
        wait_until(scroll, poll, || Ok(board.tile_count()? > before))?;
        current = board.tile_count()?;
        tracing::info!(target: "loader", "scroll {}: found {current} hackathons", attempt + 1);

        if current == previous {
            break Stop::Stalled;
        }
        previous = current;
        attempt += 1;
    };

    Ok(Loaded {
        stop,
        scrolls,
        tiles: current,
    })
}

fn read<T: Tile>(tile: &T, field: &Field) -> anyhow::Result<String> {
    match (tile.text(field.selector), &field.policy) {
        (Ok(text), _) => Ok(text),
        (Err(e), Policy::Default(fallback)) => {
            tracing::debug!(target: "extract", "{} missing ({e}), using {fallback:?}", field.name);
            Ok((*fallback).to_owned())
        }
        (Err(e), Policy::Required) => Err(e.context(field.name)),
    }
}

fn extract<T: Tile>(pacing: &Pacing, tile: &T) -> anyhow::Result<EventListing> {
    tile.scroll_into_view().context("scroll into view")?;
    if !wait_until(pacing.settle, pacing.poll, || Ok(tile.contains(TITLE.selector)))? {
        tracing::debug!(target: "extract", "tile still empty after {:?}", pacing.settle);
    }

    let name = read(tile, &TITLE)?;
    let (start_date, end_date) = parse_period(&read(tile, &PERIOD)?);
    let (mode, location) = classify_location(&read(tile, &INFO)?);
    let prize_money = read(tile, &PRIZE)?;
    let apply_link = tile.href(LINK).context("apply link")?;

    Ok(EventListing {
        name,
        start_date,
        end_date,
        mode,
        location,
        prize_money,
        apply_link,
    })
}

/// Waits for the board, loads it up to the target and extracts the first
/// `target_count` tiles. Tiles that cannot be read are skipped.
pub fn collect<B: Board>(ctx: &Context, board: &B) -> anyhow::Result<Harvest> {
    let Pacing { first_tile, poll, .. } = ctx.pacing;

    if !wait_until(first_tile, poll, || Ok(board.tile_count()? > 0))? {
        anyhow::bail!("no `{TILE}` appeared within {first_tile:?}");
    }

    let loaded = load_more(ctx, board)?;
    tracing::debug!(target: "loader", "loading ended with {} tiles counted", loaded.tiles);
    let tiles = board.tiles()?;
    tracing::info!(
        target: "loader",
        "\x1b[36mfinal total hackathons found: {}\x1b[0m ({:?} after {} scrolls)",
        tiles.len(),
        loaded.stop,
        loaded.scrolls,
    );

    let mut harvest = Harvest {
        records: Vec::with_capacity(tiles.len().min(ctx.target_count)),
        skipped: 0,
    };
    for (idx, tile) in tiles.iter().take(ctx.target_count).enumerate() {
        match extract(&ctx.pacing, tile) {
            Ok(record) => harvest.records.push(record),
            Err(e) => {
                tracing::warn!(target: "extract", "\x1b[31mskipping tile #{idx}\x1b[0m: {e:#}");
                harvest.skipped += 1;
            }
        }
    }

    Ok(harvest)
}

/// Runs `scrape` on the blocking pool, then replaces the stored listings with
/// its harvest. A failed scrape returns before `store` is touched; without a
/// store the harvest is only returned.
pub async fn run<S, F>(store: Option<&S>, scrape: F) -> anyhow::Result<Harvest>
where
    S: Store,
    F: FnOnce() -> anyhow::Result<Harvest> + Send + 'static,
{
    let harvest = tokio::task::spawn_blocking(scrape).await??;

    tracing::info!(
        target: "devpost",
        "extracted {} hackathons, skipped {}",
        harvest.records.len(),
        harvest.skipped,
    );

    if let Some(store) = store {
        let stored = publish(store, &harvest.records).await?;
        tracing::info!(target: "devpost", "\x1b[36m{stored} hackathons stored in MongoDB\x1b[0m");
    }

    Ok(harvest)
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use hcol::event::{Mode, NO_LOCATION, NOT_AVAILABLE};

    use super::*;

    const IMMEDIATE: Pacing = Pacing {
        first_tile: Duration::ZERO,
        scroll: Duration::ZERO,
        settle: Duration::ZERO,
        poll: Duration::ZERO,
    };

    fn ctx() -> Context {
        Context {
            target_count: 100,
            max_scrolls: 30,
            pacing: IMMEDIATE,
        }
    }

    #[derive(Clone)]
    struct FakeTile(Vec<(&'static str, String)>);

    impl FakeTile {
        fn event(i: usize) -> Self {
            Self(vec![
                (TITLE.selector, format!("Hack {i}")),
                (PERIOD.selector, "Jan 5 - Jan 7, 2025".to_owned()),
                (INFO.selector, "Online".to_owned()),
                (PRIZE.selector, "$10,000".to_owned()),
                (LINK, format!("https://hack{i}.devpost.com/")),
            ])
        }

        fn with(mut self, selector: &'static str, value: &str) -> Self {
            self.0.retain(|(s, _)| *s != selector);
            self.0.push((selector, value.to_owned()));
            self
        }

        fn without(mut self, selector: &'static str) -> Self {
            self.0.retain(|(s, _)| *s != selector);
            self
        }

        fn get(&self, selector: &str) -> anyhow::Result<String> {
            self.0
                .iter()
                .find(|(s, _)| *s == selector)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| anyhow::anyhow!("no element `{selector}`"))
        }
    }

    impl Tile for FakeTile {
        fn scroll_into_view(&self) -> anyhow::Result<()> {
            Ok(())
        }

        fn contains(&self, selector: &str) -> bool {
            self.get(selector).is_ok()
        }

        fn text(&self, selector: &str) -> anyhow::Result<String> {
            self.get(selector)
        }

        fn href(&self, selector: &str) -> anyhow::Result<String> {
            self.get(selector)
        }
    }

    struct FakeBoard {
        tiles: Vec<FakeTile>,
        visible: Cell<usize>,
        growth: fn(usize) -> usize,
        scrolls: Cell<usize>,
    }

    impl FakeBoard {
        fn new(tiles: Vec<FakeTile>) -> Self {
            Self {
                visible: Cell::new(tiles.len()),
                tiles,
                growth: |_| 0,
                scrolls: Cell::new(0),
            }
        }

        fn growing(initial: usize, growth: fn(usize) -> usize) -> Self {
            Self {
                tiles: Vec::new(),
                visible: Cell::new(initial),
                growth,
                scrolls: Cell::new(0),
            }
        }
    }

    impl Board for FakeBoard {
        type Tile<'a> = FakeTile;

        fn tile_count(&self) -> anyhow::Result<usize> {
            Ok(self.visible.get())
        }

        fn scroll_to_bottom(&self) -> anyhow::Result<()> {
            let n = self.scrolls.get() + 1;
            self.scrolls.set(n);
            self.visible.set(self.visible.get() + (self.growth)(n));
            Ok(())
        }

        fn tiles(&self) -> anyhow::Result<Vec<FakeTile>> {
            Ok((0..self.visible.get())
                .map(|i| self.tiles.get(i).cloned().unwrap_or_else(|| FakeTile::event(i)))
                .collect())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        events: RefCell<Vec<EventListing>>,
        clears: Cell<usize>,
        inserts: Cell<usize>,
    }

    impl Store for MemoryStore {
        async fn clear(&self) -> anyhow::Result<u64> {
            self.clears.set(self.clears.get() + 1);
            Ok(self.events.take().len() as u64)
        }

        async fn replace_all(&self, records: &[EventListing]) -> anyhow::Result<u64> {
            self.inserts.set(self.inserts.get() + 1);
            Ok(self.events.replace(records.to_vec()).len() as u64)
        }
    }

    fn stale_store() -> MemoryStore {
        let store = MemoryStore::default();
        *store.events.borrow_mut() = FakeBoard::growing(5, |_| 0)
            .tiles()
            .unwrap()
            .iter()
            .map(|t| extract(&IMMEDIATE, t).unwrap())
            .collect();
        store
    }

    #[test]
    fn load_never_exceeds_ceiling() {
        let board = FakeBoard::growing(1, |_| 1);
        let loaded = load_more(&ctx(), &board).unwrap();
        assert_eq!(loaded.stop, Stop::Ceiling);
        assert_eq!(board.scrolls.get(), 30);
        assert_eq!(loaded.tiles, 31);
    }

    #[test]
    fn load_stops_on_first_repeat() {
        let board = FakeBoard::growing(5, |n| if n < 3 { 4 } else { 0 });
        let loaded = load_more(&ctx(), &board).unwrap();
        assert_eq!(loaded.stop, Stop::Stalled);
        assert_eq!(loaded.scrolls, 3);
        assert_eq!(loaded.tiles, 13);
    }

    #[test]
    fn stall_is_measured_from_zero() {
        let board = FakeBoard::growing(5, |_| 0);
        let loaded = load_more(&ctx(), &board).unwrap();
        assert_eq!(loaded.stop, Stop::Stalled);
        assert_eq!(loaded.scrolls, 2);
    }

    #[test]
    fn load_stops_at_target() {
        let board = FakeBoard::growing(10, |_| 50);
        let loaded = load_more(&ctx(), &board).unwrap();
        assert_eq!(loaded.stop, Stop::Target);
        assert_eq!(loaded.scrolls, 2);

        let board = FakeBoard::growing(150, |_| 50);
        assert_eq!(load_more(&ctx(), &board).unwrap().scrolls, 0);
    }

    #[test]
    fn missing_prize_is_not_mentioned() {
        let tile = FakeTile::event(0).without(PRIZE.selector);
        let record = extract(&IMMEDIATE, &tile).unwrap();
        assert_eq!(record.prize_money, NOT_MENTIONED);
    }

    #[test]
    fn offline_tile_keeps_location() {
        let tile = FakeTile::event(0)
            .with(INFO.selector, "Stanford University")
            .with(PERIOD.selector, "Rolling deadline");
        let record = extract(&IMMEDIATE, &tile).unwrap();
        assert_eq!(record.mode, Mode::Offline);
        assert_eq!(record.location, "Stanford University");
        assert_eq!(record.start_date, "Rolling deadline");
        assert_eq!(record.end_date, NOT_AVAILABLE);
    }

    #[test]
    fn extraction_is_truncated_to_target() {
        let board = FakeBoard::growing(120, |_| 0);
        let harvest = collect(&ctx(), &board).unwrap();
        assert_eq!(harvest.records.len(), 100);
        assert_eq!(harvest.records[99].name, "Hack 99");
    }

    #[tokio::test]
    async fn three_tiles_replace_the_collection() {
        let board = FakeBoard::new((0..3).map(FakeTile::event).collect());
        let store = stale_store();

        let harvest = collect(&ctx(), &board).unwrap();
        assert_eq!(harvest.skipped, 0);
        let first = &harvest.records[0];
        assert_eq!(first.start_date, "Jan 5, 2025");
        assert_eq!(first.end_date, "Jan 7, 2025");
        assert_eq!(first.mode, Mode::Online);
        assert_eq!(first.location, NO_LOCATION);
        assert_eq!(first.apply_link, "https://hack0.devpost.com/");

        assert_eq!(publish(&store, &harvest.records).await.unwrap(), 3);
        assert_eq!(*store.events.borrow(), harvest.records);
        assert_eq!(store.inserts.get(), 1);
    }

    #[tokio::test]
    async fn broken_tile_is_skipped() {
        let board = FakeBoard::new(vec![
            FakeTile::event(0),
            FakeTile::event(1).without(LINK),
            FakeTile::event(2),
        ]);
        let store = stale_store();

        let harvest = collect(&ctx(), &board).unwrap();
        assert_eq!(harvest.skipped, 1);
        let names = harvest.records.iter().map(|r| &*r.name).collect::<Vec<_>>();
        assert_eq!(names, ["Hack 0", "Hack 2"]);

        assert_eq!(publish(&store, &harvest.records).await.unwrap(), 2);
        assert_eq!(store.events.borrow().len(), 2);
    }

    #[tokio::test]
    async fn empty_board_aborts_before_store() {
        let store = stale_store();

        let err = run(Some(&store), || collect(&ctx(), &FakeBoard::new(Vec::new())))
            .await
            .unwrap_err();
        assert!(err.to_string().contains(TILE));
        assert_eq!(store.events.borrow().len(), 5);
        assert_eq!(store.clears.get(), 0);
        assert_eq!(store.inserts.get(), 0);
    }

    #[tokio::test]
    async fn nothing_extracted_inserts_nothing() {
        let store = stale_store();

        let harvest = run(Some(&store), || {
            let tiles = (0..3).map(|i| FakeTile::event(i).without(TITLE.selector));
            collect(&ctx(), &FakeBoard::new(tiles.collect()))
        })
        .await
        .unwrap();
        assert!(harvest.records.is_empty());
        assert_eq!(harvest.skipped, 3);

        assert!(store.events.borrow().is_empty());
        assert_eq!(store.clears.get(), 1);
        assert_eq!(store.inserts.get(), 0);
    }

    #[tokio::test]
    async fn dry_run_leaves_store_alone() {
        let harvest = run(None::<&MemoryStore>, || collect(&ctx(), &FakeBoard::growing(4, |_| 0)))
            .await
            .unwrap();
        assert_eq!(harvest.records.len(), 4);
    }
}
