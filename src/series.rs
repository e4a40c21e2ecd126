use std::thread;
use std::time::Duration;

use crate::fetch::{Kline, KlineFetcher, RateSignal, INTERVAL_MS, PAGE_LIMIT};

/// Delay between successive successful pages, keeping the request rate
/// well under the per-second limit even when weight is low.
const PAGE_PACING: Duration = Duration::from_millis(11);

/// Mutable cursor state driving pagination over one symbol's date range.
/// The cursor only moves forward, past the last row's open time plus one
/// interval; throttle retries reuse it untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start_ms: i64,
    pub end_ms: i64,
    pub limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Fetching,
    Throttled(Duration),
    Done,
    Failed,
}

/// Result of one symbol's assembly run.
#[derive(Debug)]
pub enum AssemblyOutcome {
    /// Every page up to the end bound was fetched.
    Complete(Vec<Kline>),
    /// A terminal error cut the run short; the rows fetched so far survive.
    Partial(Vec<Kline>),
    /// Nothing was fetched for the window.
    NoData,
}

/// Drives pagination for one symbol across one date range to completion or
/// terminal failure, accumulating pages into a single clean series.
pub struct SeriesAssembler {
    symbol: String,
    window: FetchWindow,
    start_bound_ms: i64,
    rows: Vec<Kline>,
    state: FetchState,
}

impl SeriesAssembler {
    pub fn new(symbol: &str, start_ms: i64, end_ms: i64) -> Self {
        Self {
            symbol: symbol.to_string(),
            window: FetchWindow {
                start_ms,
                end_ms,
                limit: PAGE_LIMIT,
            },
            start_bound_ms: start_ms,
            rows: Vec::new(),
            state: FetchState::Fetching,
        }
    }

    pub fn window(&self) -> FetchWindow {
        self.window
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    /// Apply one fetch outcome to the state machine. Pure transition: no
    /// I/O and no sleeping happens here.
    pub fn apply(&mut self, signal: RateSignal) {
        match signal {
            RateSignal::Data(page) => self.apply_page(page, None),
            RateSignal::SoftThrottle(page, cooldown) => self.apply_page(page, Some(cooldown)),
            RateSignal::RetryAfter(wait) => {
                self.state = FetchState::Throttled(wait);
            }
            RateSignal::TransientError | RateSignal::FatalError => {
                self.state = FetchState::Failed;
            }
        }
    }

    fn apply_page(&mut self, page: Vec<Kline>, cooldown: Option<Duration>) {
        let Some(last) = page.last() else {
            // An empty page normally surfaces as FatalError; if it arrives
            // here anyway, the window has no more data.
            self.state = FetchState::Done;
            return;
        };

        let next_start = last.open_time.timestamp_millis() + INTERVAL_MS;
        self.rows.extend(page);
        self.window.start_ms = next_start;

        self.state = if self.window.start_ms >= self.window.end_ms {
            FetchState::Done
        } else if let Some(wait) = cooldown {
            FetchState::Throttled(wait)
        } else {
            FetchState::Fetching
        };
    }

    /// If the last signal demanded a pause, hand back the wait and re-arm
    /// the fetch state with the cursor untouched.
    pub fn take_throttle(&mut self) -> Option<Duration> {
        match self.state {
            FetchState::Throttled(wait) => {
                self.state = FetchState::Fetching;
                Some(wait)
            }
            _ => None,
        }
    }

    /// Page through the window until the end bound or a terminal signal.
    /// All sleeping happens here, never inside `apply`.
    pub fn run(&mut self, fetcher: &KlineFetcher) {
        loop {
            match self.state {
                FetchState::Fetching => {
                    let signal =
                        fetcher.fetch_page(&self.symbol, self.window.start_ms, self.window.end_ms);
                    self.report(&signal);
                    self.apply(signal);

                    if self.state == FetchState::Fetching {
                        thread::sleep(PAGE_PACING);
                    }
                }
                FetchState::Throttled(_) => {
                    if let Some(wait) = self.take_throttle() {
                        thread::sleep(wait);
                    }
                }
                FetchState::Done | FetchState::Failed => break,
            }
        }
    }

    fn report(&self, signal: &RateSignal) {
        match signal {
            RateSignal::Data(page) | RateSignal::SoftThrottle(page, _) => {
                if let Some(last) = page.last() {
                    println!(
                        "   Fetched {} rows through {} for {}",
                        page.len(),
                        last.open_time.format("%Y-%m-%d %H:%M"),
                        self.symbol
                    );
                }
                if let RateSignal::SoftThrottle(_, wait) = signal {
                    println!(
                        "   Weight near the ceiling; cooling down {}s after this page",
                        wait.as_secs()
                    );
                }
            }
            RateSignal::RetryAfter(wait) => {
                println!(
                    "   Rate limited; sleeping {}s and retrying the same window for {}",
                    wait.as_secs(),
                    self.symbol
                );
            }
            RateSignal::TransientError => {
                println!("   Transport error for {}; stopping pagination", self.symbol);
            }
            RateSignal::FatalError => {
                println!("   No further data for {}; stopping pagination", self.symbol);
            }
        }
    }

    /// Finalize: clamp to the requested bounds, order by open time, and
    /// resolve duplicate keys by keeping the last occurrence. Rows fetched
    /// before a terminal failure are preserved, not discarded.
    pub fn finish(self) -> AssemblyOutcome {
        let failed = self.state == FetchState::Failed;
        let start = self.start_bound_ms;
        let end = self.window.end_ms;

        let mut rows = self.rows;
        rows.retain(|row| {
            let ms = row.open_time.timestamp_millis();
            ms >= start && ms < end
        });
        let rows = dedup_keep_last(rows);

        if rows.is_empty() {
            AssemblyOutcome::NoData
        } else if failed {
            AssemblyOutcome::Partial(rows)
        } else {
            AssemblyOutcome::Complete(rows)
        }
    }
}

/// Order rows by open time and drop duplicate keys, keeping the last
/// occurrence. Pages can overlap at their boundary row; the stable sort
/// preserves fetch order among equal keys, so the most recent fetch wins.
pub fn dedup_keep_last(mut rows: Vec<Kline>) -> Vec<Kline> {
    rows.sort_by_key(|row| row.open_time);

    let mut out: Vec<Kline> = Vec::with_capacity(rows.len());
    for row in rows {
        match out.last_mut() {
            Some(prev) if prev.open_time == row.open_time => *prev = row,
            _ => out.push(row),
        }
    }
    out
}
