//! Single-pass windowed count/sum/min/max over one series' samples.
//!
//! Window boundaries are anchored by the data: a window opens at its first
//! sample `t` and ends at `t + window`, inclusive. A sample whose timestamp is
//! exactly the window end still belongs to that window.

use log::trace;

use crate::chunkenc::{ChunkDecoder, DecodeError, Encoding};
use crate::store::Series;
use crate::utils::labels_to_string;
use crate::ExportError;

/// Default window length: 5 minutes in milliseconds.
pub const DEFAULT_WINDOW_MS: i64 = 5 * 60 * 1000;

/// A closed window. `timestamp` is the window end boundary.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Aggregation {
    pub timestamp: i64,
    pub count: i64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Window {
    Empty,
    Accumulating {
        end: i64,
        count: i64,
        sum: f64,
        min: f64,
        max: f64,
    },
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    window_ms: i64,
    window: Window,
}

impl Default for Aggregator {
    fn default() -> Self {
        Aggregator::new(DEFAULT_WINDOW_MS)
    }
}

impl Aggregator {
    pub fn new(window_ms: i64) -> Self {
        Aggregator {
            window_ms,
            window: Window::Empty,
        }
    }

    /// Fold one sample in, returning the window it closed if `t` is past the
    /// current window end.
    pub fn push(&mut self, t: i64, v: f64) -> Option<Aggregation> {
        let closed = match self.window {
            Window::Accumulating { end, .. } if t > end => self.close(),
            _ => None,
        };
        if self.window == Window::Empty {
            self.window = Window::Accumulating {
                end: t.saturating_add(self.window_ms),
                count: 0,
                sum: 0.,
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            };
        }
        self.accumulate(v);
        closed
    }

    fn accumulate(&mut self, v: f64) {
        if let Window::Accumulating {
            count,
            sum,
            min,
            max,
            ..
        } = &mut self.window
        {
            *count += 1;
            *sum += v;
            if *min > v {
                *min = v;
            }
            if *max < v {
                *max = v;
            }
        }
    }

    /// Close the trailing partial window, if any sample is pending.
    pub fn flush(&mut self) -> Option<Aggregation> {
        self.close()
    }

    fn close(&mut self) -> Option<Aggregation> {
        match std::mem::replace(&mut self.window, Window::Empty) {
            Window::Empty => None,
            Window::Accumulating {
                end,
                count,
                sum,
                min,
                max,
            } => Some(Aggregation {
                timestamp: end,
                count,
                sum,
                min,
                max,
            }),
        }
    }
}

/// Decode every chunk of `series` in order and feed the samples through one
/// aggregator, handing each closed window to `emit`. Returns the number of
/// samples seen.
pub fn aggregate_series<D, F>(
    series: &Series,
    decoder: &D,
    window_ms: i64,
    mut emit: F,
) -> Result<u64, ExportError>
where
    D: ChunkDecoder + ?Sized,
    F: FnMut(Aggregation) -> Result<(), ExportError>,
{
    let decode_err = |chunk: usize, source: DecodeError| ExportError::Decode {
        labels: labels_to_string(&series.labels),
        chunk,
        source,
    };

    let mut aggregator = Aggregator::new(window_ms);
    let mut samples = 0u64;
    for (index, chunk) in series.chunks.iter().enumerate() {
        let raw = chunk
            .raw
            .as_ref()
            .ok_or_else(|| decode_err(index, DecodeError::MissingRaw))?;
        let encoding = Encoding::from_wire(raw.r#type).map_err(|err| decode_err(index, err))?;
        let iter = decoder
            .decode(encoding, &raw.data)
            .map_err(|err| decode_err(index, err))?;
        for sample in iter {
            let sample = sample.map_err(|err| decode_err(index, err))?;
            samples += 1;
            if let Some(aggr) = aggregator.push(sample.timestamp, sample.value) {
                emit(aggr)?;
            }
        }
        trace!("chunk {} done, {} samples so far", index, samples);
    }
    if let Some(aggr) = aggregator.flush() {
        emit(aggr)?;
    }
    Ok(samples)
}

#[cfg(test)]
fn run(samples: &[(i64, f64)], window_ms: i64) -> Vec<Aggregation> {
    let mut aggregator = Aggregator::new(window_ms);
    let mut out: Vec<_> = samples
        .iter()
        .filter_map(|(t, v)| aggregator.push(*t, *v))
        .collect();
    out.extend(aggregator.flush());
    out
}

#[test]
fn test_anchored_windows() {
    let samples = [
        (0, -1.),
        (120_000, 10.),
        (300_000, -10.),
        (420_000, 20.),
        (600_000, -20.),
        (900_000, 15.),
        (1_020_000, -1.),
        (1_200_000, 10.),
    ];
    assert_eq!(
        run(&samples, DEFAULT_WINDOW_MS),
        vec![
            Aggregation {
                timestamp: 300_000,
                count: 3,
                sum: -1.,
                min: -10.,
                max: 10.,
            },
            Aggregation {
                timestamp: 720_000,
                count: 2,
                sum: 0.,
                min: -20.,
                max: 20.,
            },
            Aggregation {
                timestamp: 1_200_000,
                count: 3,
                sum: 24.,
                min: -1.,
                max: 15.,
            },
        ]
    );
}

#[test]
fn test_sample_on_window_end_stays_in_window() {
    let out = run(
        &[
            (1_000, 1.),
            (1_000 + DEFAULT_WINDOW_MS, 2.),
            (1_001 + DEFAULT_WINDOW_MS, 4.),
        ],
        DEFAULT_WINDOW_MS,
    );
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].timestamp, 1_000 + DEFAULT_WINDOW_MS);
    assert_eq!(out[0].count, 2);
    assert_eq!(out[0].sum, 3.);
    // The next window is anchored on its own first sample, not on the grid.
    assert_eq!(out[1].timestamp, 1_001 + 2 * DEFAULT_WINDOW_MS);
    assert_eq!(out[1].count, 1);
}

#[test]
fn test_empty_and_single() {
    assert!(run(&[], DEFAULT_WINDOW_MS).is_empty());
    assert_eq!(
        run(&[(7, 3.5)], 10),
        vec![Aggregation {
            timestamp: 17,
            count: 1,
            sum: 3.5,
            min: 3.5,
            max: 3.5,
        }]
    );
    let mut aggregator = Aggregator::default();
    assert_eq!(aggregator.flush(), None);
}

#[test]
fn test_window_invariants() {
    // Deterministic LCG so the test needs no extra crates.
    let mut seed = 0x2545_f491_4f6c_dd1du64;
    let mut next = move || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        seed >> 33
    };
    for _ in 0..50 {
        let mut t = (next() % 1_000_000) as i64;
        let samples: Vec<(i64, f64)> = (0..(next() % 500))
            .map(|_| {
                t += 1 + (next() % 400_000) as i64;
                (t, (next() % 2000) as f64 - 1000.)
            })
            .collect();
        let out = run(&samples, DEFAULT_WINDOW_MS);

        assert_eq!(out.iter().map(|a| a.count).sum::<i64>(), samples.len() as i64);
        assert!(out.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        for a in &out {
            assert!(a.count >= 1);
            let mean = a.sum / a.count as f64;
            assert!(a.min <= mean + 1e-9 && mean <= a.max + 1e-9);
        }
    }
}
