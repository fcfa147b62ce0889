//! Trace decomposition and the segment-backed trace store.
//!
//! A trace is authored as a polyline but rendered as one instanced box per
//! straight run. The segment store is the render unit; the trace record is
//! kept alongside it so that hit tests on a segment can be mapped back to
//! the authored trace.

use std::collections::HashMap;

use crate::entity::{PlacementContext, Trace, TraceSegment};
use crate::geometry::Point;
use crate::layer::Layer;
use crate::store::{InstancedEntityStore, Slot};

/// Split a polyline into its straight segments: N waypoints give N-1
/// segments, each carrying its length, angle and the trace width.
pub fn decompose(trace: &Trace) -> Vec<TraceSegment> {
    trace
        .points
        .windows(2)
        .enumerate()
        .map(|(index, pair)| {
            TraceSegment::between(&trace.id, index, pair[0], pair[1], trace.width, trace.layer)
        })
        .collect()
}

/// An authored trace and how many of its segments made it into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub trace: Trace,
    pub committed: usize,
}

impl TraceRecord {
    pub fn is_complete(&self) -> bool {
        self.committed + 1 >= self.trace.points.len()
    }
}

/// Trace records plus the instanced store of their segments.
#[derive(Debug, Clone)]
pub struct TraceStore {
    segments: InstancedEntityStore<TraceSegment>,
    records: HashMap<String, TraceRecord>,
    order: Vec<String>,
}

impl TraceStore {
    pub fn new(segment_capacity: usize, context: PlacementContext) -> Self {
        Self {
            segments: InstancedEntityStore::new(segment_capacity, context),
            records: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn segments(&self) -> &InstancedEntityStore<TraceSegment> {
        &self.segments
    }

    pub fn segments_mut(&mut self) -> &mut InstancedEntityStore<TraceSegment> {
        &mut self.segments
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Decompose and store a trace. Returns the number of segments committed.
    ///
    /// If the segment store fills up part way, the trace is kept with the
    /// segments that fit. Zero means nothing was stored: the id was taken,
    /// the polyline had fewer than two points, or the store was already full.
    pub fn add(&mut self, trace: Trace) -> usize {
        if self.records.contains_key(&trace.id) {
            log::warn!("trace '{}' already exists", trace.id);
            return 0;
        }
        if trace.points.len() < 2 {
            log::warn!("trace '{}' needs at least two points", trace.id);
            return 0;
        }
        if !trace.is_well_formed() {
            log::warn!("trace '{}' has degenerate geometry, rejecting", trace.id);
            return 0;
        }

        let segments = decompose(&trace);
        let wanted = segments.len();
        let committed = self.segments.add_many(segments);
        if committed == 0 {
            return 0;
        }
        if committed < wanted {
            log::warn!(
                "trace '{}' truncated to {} of {} segments",
                trace.id,
                committed,
                wanted
            );
        }

        self.order.push(trace.id.clone());
        self.records
            .insert(trace.id.clone(), TraceRecord { trace, committed });
        committed
    }

    pub fn remove(&mut self, id: &str) -> bool {
        if self.records.remove(id).is_none() {
            return false;
        }
        self.order.retain(|t| t != id);
        self.segments.remove_where(|s| s.trace_id == id);
        true
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.order.clear();
        self.segments.clear();
    }

    /// Move the trace so its first waypoint lands on `anchor`. Segments are
    /// updated in place, keeping their slots.
    pub fn update_position(&mut self, id: &str, anchor: Point) -> bool {
        if !anchor.is_finite() {
            return false;
        }
        let Some(record) = self.records.get_mut(id) else {
            return false;
        };
        let first = record.trace.points[0];
        let (dx, dz) = (anchor.x - first.x, anchor.z - first.z);
        record.trace.translate(dx, dz);

        for index in 0..record.committed {
            let seg_id = format!("{id}#{index}");
            self.segments.update_with(&seg_id, |s| {
                s.start = s.start.translate(dx, dz);
                s.end = s.end.translate(dx, dz);
                true
            });
        }
        true
    }

    pub fn update_width(&mut self, id: &str, width: f64) -> bool {
        if !width.is_finite() || width <= 0.0 {
            return false;
        }
        let Some(record) = self.records.get_mut(id) else {
            return false;
        };
        record.trace.width = width;
        for index in 0..record.committed {
            let seg_id = format!("{id}#{index}");
            self.segments.update_with(&seg_id, |s| {
                s.width = width;
                true
            });
        }
        true
    }

    pub fn set_context(&mut self, context: PlacementContext) {
        self.segments.set_context(context);
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn by_id(&self, id: &str) -> Option<&Trace> {
        self.records.get(id).map(|r| &r.trace)
    }

    pub fn record(&self, id: &str) -> Option<&TraceRecord> {
        self.records.get(id)
    }

    /// Traces in insertion order.
    pub fn all(&self) -> Vec<&Trace> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| &r.trace))
            .collect()
    }

    pub fn by_layer(&self, layer: Layer) -> Vec<&Trace> {
        self.all().into_iter().filter(|t| t.layer == layer).collect()
    }

    /// The authored trace that owns the segment in `slot`.
    pub fn id_for_instance(&self, slot: Slot) -> Option<&str> {
        self.segments.entity_at(slot).map(|s| s.trace_id.as_str())
    }

    pub fn committed_segments(&self, id: &str) -> impl Iterator<Item = &TraceSegment> + '_ {
        let count = self.records.get(id).map(|r| r.committed).unwrap_or(0);
        let id = id.to_string();
        (0..count).filter_map(move |index| self.segments.by_id(&format!("{id}#{index}")))
    }

    /// Copper area over committed segments; zero for unknown ids.
    pub fn area(&self, id: &str) -> f64 {
        self.committed_segments(id).map(|s| s.area()).sum()
    }

    /// Centreline length over committed segments; zero for unknown ids.
    pub fn length(&self, id: &str) -> f64 {
        self.committed_segments(id).map(|s| s.length).sum()
    }
}
