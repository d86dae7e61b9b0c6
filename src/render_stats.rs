//! Paint statistics for debugging and performance analysis.
//!
//! Enable render stats by compiling with the `render-stats` feature:
//! ```bash
//! cargo test --features render-stats
//! ```
//!
//! Stats are printed every second when enabled, showing:
//! - Refreshes and how many finished within their frame
//! - Layers painted and cleared
//! - Nodes painted vs skipped
//! - Clip applications and restores issued to surfaces
//! - Resumptions, abandoned resumptions and manual composites

/// Snapshot of accumulated paint statistics.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub refreshes: u64,
    pub frames_finished: u64,
    pub frames_pending: u64,
    pub layers_painted: u64,
    pub layers_cleared: u64,
    pub nodes_painted: u64,
    pub nodes_skipped: u64,
    pub clips_applied: u64,
    pub clips_restored: u64,
    pub resumptions: u64,
    pub resumptions_abandoned: u64,
    pub composites: u64,
}

#[cfg(feature = "render-stats")]
mod inner {
    use super::StatsSnapshot;
    use std::cell::RefCell;
    use std::time::Instant;

    thread_local! {
        static STATS: RefCell<RenderStats> = RefCell::new(RenderStats::new());
    }

    struct RenderStats {
        counters: StatsSnapshot,
        last_print: Instant,
    }

    impl RenderStats {
        fn new() -> Self {
            Self {
                counters: StatsSnapshot::default(),
                last_print: Instant::now(),
            }
        }

        fn reset(&mut self) {
            self.counters = StatsSnapshot::default();
            self.last_print = Instant::now();
        }
    }

    fn bump(f: impl FnOnce(&mut StatsSnapshot)) {
        STATS.with(|s| f(&mut s.borrow_mut().counters));
    }

    /// Record a full refresh (build, order, assign, paint).
    #[inline]
    pub fn record_refresh() {
        bump(|c| c.refreshes += 1);
    }

    #[inline]
    pub fn record_layer_painted() {
        bump(|c| c.layers_painted += 1);
    }

    #[inline]
    pub fn record_layer_cleared() {
        bump(|c| c.layers_cleared += 1);
    }

    #[inline]
    pub fn record_node_painted() {
        bump(|c| c.nodes_painted += 1);
    }

    /// Record a node that was advanced over without painting.
    #[inline]
    pub fn record_node_skipped() {
        bump(|c| c.nodes_skipped += 1);
    }

    #[inline]
    pub fn record_clip_applied() {
        bump(|c| c.clips_applied += 1);
    }

    #[inline]
    pub fn record_clip_restored() {
        bump(|c| c.clips_restored += 1);
    }

    #[inline]
    pub fn record_resumption() {
        bump(|c| c.resumptions += 1);
    }

    #[inline]
    pub fn record_resumption_abandoned() {
        bump(|c| c.resumptions_abandoned += 1);
    }

    #[inline]
    pub fn record_composite() {
        bump(|c| c.composites += 1);
    }

    /// Return a snapshot of the current stats (for testing).
    pub fn get_stats() -> StatsSnapshot {
        STATS.with(|s| s.borrow().counters.clone())
    }

    /// Reset all stats to zero (for test isolation).
    pub fn reset_stats() {
        STATS.with(|s| {
            s.borrow_mut().reset();
        });
    }

    /// Called at the end of each paint pass to potentially print stats.
    pub fn end_frame(finished: bool) {
        STATS.with(|s| {
            let mut stats = s.borrow_mut();

            if finished {
                stats.counters.frames_finished += 1;
            } else {
                stats.counters.frames_pending += 1;
            }

            if stats.last_print.elapsed().as_secs() >= 1 {
                let c = &stats.counters;
                let node_total = c.nodes_painted + c.nodes_skipped;
                let skip_rate = if node_total > 0 {
                    (c.nodes_skipped as f64 / node_total as f64) * 100.0
                } else {
                    0.0
                };

                eprintln!(
                    "[Render Stats] refreshes={} finished={} pending={}",
                    c.refreshes, c.frames_finished, c.frames_pending
                );
                eprintln!(
                    "  layers: painted={} cleared={} composites={}",
                    c.layers_painted, c.layers_cleared, c.composites
                );
                eprintln!(
                    "  nodes: total={} painted={} skipped={} skip_rate={:.1}%",
                    node_total, c.nodes_painted, c.nodes_skipped, skip_rate
                );
                eprintln!(
                    "  clips: applied={} restored={}",
                    c.clips_applied, c.clips_restored
                );
                eprintln!(
                    "  resumptions: resumed={} abandoned={}",
                    c.resumptions, c.resumptions_abandoned
                );

                stats.reset();
            }
        });
    }
}

#[cfg(feature = "render-stats")]
pub use inner::*;

// No-op implementations when feature is disabled - these get completely inlined away

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn get_stats() -> StatsSnapshot {
    StatsSnapshot::default()
}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn reset_stats() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_refresh() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_layer_painted() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_layer_cleared() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_node_painted() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_node_skipped() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_clip_applied() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_clip_restored() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_resumption() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_resumption_abandoned() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_composite() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn end_frame(_finished: bool) {}

#[cfg(test)]
#[cfg(feature = "render-stats")]
mod tests {
    use super::*;

    /// Reset stats before each test to ensure isolation
    /// (tests share the thread-local when run on the same thread).
    fn setup() {
        reset_stats();
    }

    #[test]
    fn test_node_counters() {
        setup();
        record_node_painted();
        record_node_painted();
        record_node_skipped();
        let s = get_stats();
        assert_eq!(s.nodes_painted, 2);
        assert_eq!(s.nodes_skipped, 1);
    }

    #[test]
    fn test_clip_counters() {
        setup();
        record_clip_applied();
        record_clip_restored();
        record_clip_restored();
        let s = get_stats();
        assert_eq!(s.clips_applied, 1);
        assert_eq!(s.clips_restored, 2);
    }

    #[test]
    fn test_end_frame_counts_pending_frames() {
        setup();
        end_frame(false);
        end_frame(false);
        end_frame(true);
        let s = get_stats();
        assert_eq!(s.frames_pending, 2);
        assert_eq!(s.frames_finished, 1);
    }

    #[test]
    fn test_reset_clears_all_counters() {
        setup();
        record_refresh();
        record_layer_painted();
        record_layer_cleared();
        record_resumption();
        record_resumption_abandoned();
        record_composite();
        assert_ne!(get_stats(), StatsSnapshot::default());

        reset_stats();
        assert_eq!(get_stats(), StatsSnapshot::default());
    }
}
