//! Curve and arrowhead geometry for links.
//!
//! Everything here is a pure function of node centers, node extents and the
//! per-node bezier offsets. Offsets are stored as `[in_dx, in_dy, out_dx, out_dy]`
//! relative to the node center: edges arriving at a node bend through the
//! `in` control point, edges leaving it through the `out` control point.

use serde::{Deserialize, Serialize};

use crate::types::Position;

/// Rendered node outline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Circle,
    Rectangle,
}

/// Half-extent of a rendered node around its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extent {
    Circle { radius: f64 },
    Rect { half_width: f64, half_height: f64 },
}

impl Extent {
    pub fn from_shape(shape: Shape, size: f64) -> Self {
        match shape {
            Shape::Circle => Extent::Circle { radius: size / 2.0 },
            Shape::Rectangle => Extent::Rect {
                half_width: size / 2.0,
                half_height: size / 2.0,
            },
        }
    }

    /// Distance from the center to the outline along the unit direction `(ux, uy)`.
    pub fn along(&self, ux: f64, uy: f64) -> f64 {
        match *self {
            Extent::Circle { radius } => radius,
            Extent::Rect {
                half_width,
                half_height,
            } => {
                let (ax, ay) = (ux.abs(), uy.abs());
                if ax < 1e-12 {
                    half_height
                } else if ay < 1e-12 {
                    half_width
                } else {
                    (half_width / ax).min(half_height / ay)
                }
            }
        }
    }

    /// Radius of the smallest circle containing the outline.
    pub fn bounding_radius(&self) -> f64 {
        match *self {
            Extent::Circle { radius } => radius,
            Extent::Rect {
                half_width,
                half_height,
            } => (half_width * half_width + half_height * half_height).sqrt(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrowMode {
    None,
    /// One arrowhead at the target of every link.
    #[default]
    Target,
    /// Like `Target`, plus an arrowhead at the source of reversible links.
    Both,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadShape {
    #[default]
    Triangle,
    Diamond,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteStyle {
    pub arrow_length: f64,
    pub arrow_width: f64,
    pub mode: ArrowMode,
    /// Head drawn on reversible links.
    pub reversible_head: HeadShape,
}

impl Default for RouteStyle {
    fn default() -> Self {
        Self {
            arrow_length: 8.0,
            arrow_width: 6.0,
            mode: ArrowMode::Target,
            reversible_head: HeadShape::Diamond,
        }
    }
}

/// One end of a link as the router sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Endpoint {
    pub center: Position,
    pub extent: Extent,
    pub bezi: Option<[f64; 4]>,
}

impl Endpoint {
    fn in_control(&self) -> Option<Position> {
        self.bezi.map(|b| self.center.offset(b[0], b[1]))
    }

    fn out_control(&self) -> Option<Position> {
        self.bezi.map(|b| self.center.offset(b[2], b[3]))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrowHead {
    Triangle([Position; 3]),
    Diamond([Position; 4]),
}

impl ArrowHead {
    pub fn points(&self) -> &[Position] {
        match self {
            ArrowHead::Triangle(p) => p,
            ArrowHead::Diamond(p) => p,
        }
    }

    pub fn tip(&self) -> Position {
        self.points()[0]
    }
}

/// Renderable geometry of one link: a cubic bezier plus optional heads.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeGeometry {
    pub start: Position,
    pub control1: Position,
    pub control2: Position,
    pub end: Position,
    pub head: Option<ArrowHead>,
    pub tail: Option<ArrowHead>,
}

impl EdgeGeometry {
    pub fn point_at(&self, t: f64) -> Position {
        let u = 1.0 - t;
        let (a, b, c, d) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
        Position::new(
            a * self.start.x + b * self.control1.x + c * self.control2.x + d * self.end.x,
            a * self.start.y + b * self.control1.y + c * self.control2.y + d * self.end.y,
        )
    }

    /// SVG path data for the curve.
    pub fn svg_path(&self) -> String {
        format!(
            "M{:.2},{:.2} C{:.2},{:.2} {:.2},{:.2} {:.2},{:.2}",
            self.start.x,
            self.start.y,
            self.control1.x,
            self.control1.y,
            self.control2.x,
            self.control2.y,
            self.end.x,
            self.end.y
        )
    }
}

fn unit(from: Position, to: Position) -> Option<(f64, f64)> {
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1e-9 {
        None
    } else {
        Some((dx / len, dy / len))
    }
}

/// Direction of travel into `end`, using the nearest distinct control point.
fn approach(end: Position, candidates: [Position; 3]) -> Option<(f64, f64)> {
    candidates.into_iter().find_map(|c| unit(c, end))
}

/// Arrowhead triangle with its tip at `tip`, pointing along `(ux, uy)`.
pub fn triangle_head(tip: Position, ux: f64, uy: f64, length: f64, width: f64) -> ArrowHead {
    let base = tip.offset(-ux * length, -uy * length);
    let half = width / 2.0;
    ArrowHead::Triangle([
        tip,
        base.offset(-uy * half, ux * half),
        base.offset(uy * half, -ux * half),
    ])
}

pub fn diamond_head(tip: Position, ux: f64, uy: f64, length: f64, width: f64) -> ArrowHead {
    let mid = tip.offset(-ux * length / 2.0, -uy * length / 2.0);
    let back = tip.offset(-ux * length, -uy * length);
    let half = width / 2.0;
    ArrowHead::Diamond([
        tip,
        mid.offset(-uy * half, ux * half),
        back,
        mid.offset(uy * half, -ux * half),
    ])
}

/// Route one link from `source` to `target`.
///
/// The visible curve stops short of the target outline by the arrow length when
/// a head is drawn, and at the outline otherwise. Coincident endpoints produce a
/// degenerate zero-length curve without heads.
pub fn route_link(
    source: &Endpoint,
    target: &Endpoint,
    reversible: bool,
    style: &RouteStyle,
) -> EdgeGeometry {
    let s = source.center;
    let t = target.center;
    let control1 = source.out_control().unwrap_or_else(|| s.lerp(&t, 1.0 / 3.0));
    let control2 = target.in_control().unwrap_or_else(|| s.lerp(&t, 2.0 / 3.0));

    let mut geometry = EdgeGeometry {
        start: s,
        control1,
        control2,
        end: t,
        head: None,
        tail: None,
    };

    let shape = if reversible {
        style.reversible_head
    } else {
        HeadShape::Triangle
    };
    let make_head = |tip: Position, ux: f64, uy: f64| match shape {
        HeadShape::Triangle => triangle_head(tip, ux, uy, style.arrow_length, style.arrow_width),
        HeadShape::Diamond => diamond_head(tip, ux, uy, style.arrow_length, style.arrow_width),
    };

    if let Some((ux, uy)) = approach(t, [control2, control1, s]) {
        let tip = t.offset(-ux * target.extent.along(ux, uy), -uy * target.extent.along(ux, uy));
        if style.mode == ArrowMode::None {
            geometry.end = tip;
        } else {
            geometry.end = tip.offset(-ux * style.arrow_length, -uy * style.arrow_length);
            geometry.head = Some(make_head(tip, ux, uy));
        }
    }

    if let Some((ux, uy)) = approach(s, [control1, control2, t]) {
        let reach = source.extent.along(ux, uy);
        let tip = s.offset(-ux * reach, -uy * reach);
        if style.mode == ArrowMode::Both && reversible {
            geometry.start = tip.offset(-ux * style.arrow_length, -uy * style.arrow_length);
            geometry.tail = Some(make_head(tip, ux, uy));
        } else {
            geometry.start = tip;
        }
    }

    geometry
}

/// Bezier offsets for a reaction at `center` with the given input and output
/// neighbor positions. Each side's mean is pulled halfway toward the reaction,
/// so incoming edges arrive from the input side and outgoing edges leave toward
/// the output side. `None` unless both sides are populated.
pub fn auto_bezi(center: Position, inputs: &[Position], outputs: &[Position]) -> Option<[f64; 4]> {
    let input_mean = Position::centroid(inputs)?;
    let output_mean = Position::centroid(outputs)?;
    let inp = input_mean.lerp(&center, 0.5);
    let out = output_mean.lerp(&center, 0.5);
    Some([
        inp.x - center.x,
        inp.y - center.y,
        out.x - center.x,
        out.y - center.y,
    ])
}
