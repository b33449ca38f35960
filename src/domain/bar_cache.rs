//! Read-through cache of aggregated bar series.
//!
//! Entries are keyed by (symbol, timeframe, cutoff), so a cached series is
//! exactly what a fresh aggregation under the same cutoff would return.
//! Callers must `invalidate` a symbol whenever its raw data changes. Each
//! symbol carries a generation that `invalidate` bumps; a fill whose load
//! started under an older generation is returned to its caller but never
//! cached.

use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use log::{debug, warn};

use super::aggregate::aggregate;
use super::error::EngineError;
use super::ohlcv::BarSeries;
use super::timeframe::Timeframe;
use crate::ports::data_port::BarProvider;

type CacheKey = (String, Timeframe, Option<NaiveDate>);

pub struct BarCache<P: BarProvider> {
    provider: P,
    entries: DashMap<CacheKey, Arc<BarSeries>>,
    generations: DashMap<String, u64>,
}

impl<P: BarProvider> BarCache<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            entries: DashMap::new(),
            generations: DashMap::new(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn get(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        cutoff: Option<NaiveDate>,
    ) -> Result<Arc<BarSeries>, EngineError> {
        let key = (symbol.to_string(), timeframe, cutoff);
        if let Some(hit) = self.entries.get(&key) {
            debug!("bar cache hit: {symbol} {timeframe} {cutoff:?}");
            return Ok(Arc::clone(hit.value()));
        }

        let generation = *self.generations.entry(symbol.to_string()).or_insert(0);
        let raw = self.provider.load_raw(symbol)?;
        let series = Arc::new(aggregate(&raw, timeframe, cutoff)?);

        // Holding the generation guard keeps `invalidate` out until the
        // entry is in place.
        let current = self.generations.get(symbol);
        if current.as_deref() != Some(&generation) {
            debug!("bar cache fill for {symbol} {timeframe} superseded by invalidate, not cached");
            return Ok(series);
        }
        debug!(
            "bar cache fill: {symbol} {timeframe} {cutoff:?}, {} bars",
            series.len()
        );
        // A concurrent fill for the same key produced an identical series;
        // keep whichever landed first.
        let entry = self.entries.entry(key).or_insert(series);
        let cached = Arc::clone(entry.value());
        drop(entry);
        drop(current);
        Ok(cached)
    }

    /// Drop every cached series of `symbol`. Returns how many were removed.
    pub fn invalidate(&self, symbol: &str) -> usize {
        *self.generations.entry(symbol.to_string()).or_insert(0) += 1;
        let before = self.entries.len();
        self.entries.retain(|(cached, _, _), _| cached != symbol);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            warn!("bar cache invalidated {removed} entries for {symbol}");
        }
        removed
    }

    pub fn clear(&self) {
        self.generations.iter_mut().for_each(|mut g| *g += 1);
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
