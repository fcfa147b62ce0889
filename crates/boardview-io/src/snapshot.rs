use serde::Serialize;

use boardview_core::{Board, BoardDimensions, EntityKind, Hole, Pad, PadShape, Point, Size, Trace};

use crate::document::{BoardDocument, BoardSpec, Component, DrillComponent, PathComponent, SmdComponent};
use crate::error::SnapshotError;
use crate::validate::validate_document;

/// What an import actually placed. Counts fall short of the document when a
/// store ran out of capacity part way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub pads: usize,
    pub traces: usize,
    pub trace_segments: usize,
    pub holes: usize,
    /// Components that could not be placed at all.
    pub dropped: usize,
}

impl ImportReport {
    pub fn is_complete(&self) -> bool {
        self.dropped == 0
    }
}

/// Transcribe the live board into a document.
///
/// Pad and hole `pos` carry the elevation they are drawn at; a trace's `pos`
/// is its first waypoint at its layer elevation. Importers only read x and z.
pub fn export_board(board: &Board) -> BoardDocument {
    let dims = board.dimensions();
    let offsets = board.offsets();
    let mut components = Vec::with_capacity(
        board.entity_count(EntityKind::Pad)
            + board.entity_count(EntityKind::Trace)
            + board.entity_count(EntityKind::Hole),
    );

    for pad in board.pads().all() {
        let smd = SmdComponent {
            id: pad.id.clone(),
            pos: [pad.position.x, offsets.elevation(pad.layer), pad.position.z],
            size: [pad.size.width, pad.size.height],
            layer: pad.layer,
            rotation: pad.rotation,
        };
        components.push(match pad.shape {
            PadShape::Rectangle => Component::SmdRect(smd),
            PadShape::Circle => Component::SmdCircle(smd),
        });
    }

    for trace in board.traces().all() {
        let first = trace.points[0];
        components.push(Component::Path(PathComponent {
            id: trace.id.clone(),
            pos: [first.x, offsets.elevation(trace.layer), first.z],
            points: trace.points.iter().map(|p| [p.x, p.z]).collect(),
            width: trace.width,
            layer: trace.layer,
        }));
    }

    for hole in board.holes().all() {
        components.push(Component::Drill(DrillComponent {
            id: hole.id.clone(),
            pos: [hole.position.x, 0.0, hole.position.z],
            diameter: hole.diameter,
        }));
    }

    BoardDocument {
        version: None,
        board: BoardSpec {
            width: dims.width,
            height: dims.height,
            thickness: dims.thickness,
        },
        components,
    }
}

/// Replace the board's contents with the document's.
///
/// The document is validated first; on any violation the board is left
/// exactly as it was. Capacity shortfalls are not errors, they show up in
/// the returned report.
pub fn import_board(board: &mut Board, doc: &BoardDocument) -> Result<ImportReport, SnapshotError> {
    validate_document(doc)?;

    board.set_dimensions(BoardDimensions {
        width: doc.board.width,
        height: doc.board.height,
        thickness: doc.board.thickness,
    })?;
    board.clear();

    let mut report = ImportReport::default();
    for component in &doc.components {
        let placed = match component {
            Component::SmdRect(c) => board.add_pad(pad_from(c, PadShape::Rectangle)),
            Component::SmdCircle(c) => board.add_pad(pad_from(c, PadShape::Circle)),
            Component::Path(c) => {
                let committed = board.add_trace(trace_from(c));
                report.trace_segments += committed;
                committed > 0
            }
            Component::Drill(c) => board.add_hole(Hole::new(&c.id, Point::new(c.pos[0], c.pos[2]), c.diameter)),
        };

        if !placed {
            report.dropped += 1;
            continue;
        }
        match component {
            Component::SmdRect(_) | Component::SmdCircle(_) => report.pads += 1,
            Component::Path(_) => report.traces += 1,
            Component::Drill(_) => report.holes += 1,
        }
    }

    log::info!(
        "Imported {} pads, {} traces ({} segments), {} holes; {} dropped",
        report.pads,
        report.traces,
        report.trace_segments,
        report.holes,
        report.dropped
    );
    Ok(report)
}

fn pad_from(c: &SmdComponent, shape: PadShape) -> Pad {
    Pad {
        id: c.id.clone(),
        shape,
        position: Point::new(c.pos[0], c.pos[2]),
        size: Size::new(c.size[0], c.size[1]),
        rotation: c.rotation,
        layer: c.layer,
    }
}

fn trace_from(c: &PathComponent) -> Trace {
    Trace::new(
        &c.id,
        c.points.iter().map(|p| Point::new(p[0], p[1])).collect(),
        c.width,
        c.layer,
    )
}
