use std::fmt::Write as _;

use crate::router::{EdgeGeometry, Extent};
use crate::types::Position;

/// A node as drawn in the debug export.
#[derive(Debug, Clone)]
pub struct SvgNode {
    pub center: Position,
    pub extent: Extent,
    pub label: String,
    pub pinned: bool,
}

/// Render nodes and routed edges into a standalone SVG document.
pub fn render_svg(nodes: &[SvgNode], edges: &[EdgeGeometry], margin: f64) -> String {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for node in nodes {
        let r = node.extent.bounding_radius();
        min_x = min_x.min(node.center.x - r);
        min_y = min_y.min(node.center.y - r);
        max_x = max_x.max(node.center.x + r);
        max_y = max_y.max(node.center.y + r);
    }
    if !min_x.is_finite() {
        (min_x, min_y, max_x, max_y) = (0.0, 0.0, 0.0, 0.0);
    }
    let width = (max_x - min_x + margin * 2.0).max(1.0);
    let height = (max_y - min_y + margin * 2.0).max(1.0);

    let mut svg = format!(
        r#"<svg width="{:.0}" height="{:.0}" viewBox="{:.2} {:.2} {:.2} {:.2}" xmlns="http://www.w3.org/2000/svg">
<rect x="{:.2}" y="{:.2}" width="100%" height="100%" fill="white"/>
"#,
        width,
        height,
        min_x - margin,
        min_y - margin,
        width,
        height,
        min_x - margin,
        min_y - margin
    );

    for edge in edges {
        let _ = writeln!(
            svg,
            r#"<path d="{}" fill="none" stroke="gray" stroke-width="1.5"/>"#,
            edge.svg_path()
        );
        for head in edge.head.iter().chain(edge.tail.iter()) {
            let points: Vec<String> = head
                .points()
                .iter()
                .map(|p| format!("{:.2},{:.2}", p.x, p.y))
                .collect();
            let _ = writeln!(svg, r#"<polygon points="{}" fill="gray"/>"#, points.join(" "));
        }
    }

    for node in nodes {
        let stroke = if node.pinned { "crimson" } else { "black" };
        match node.extent {
            Extent::Circle { radius } => {
                let _ = writeln!(
                    svg,
                    r#"<circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="lightblue" stroke="{}"/>"#,
                    node.center.x, node.center.y, radius, stroke
                );
            }
            Extent::Rect {
                half_width,
                half_height,
            } => {
                let _ = writeln!(
                    svg,
                    r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="lightyellow" stroke="{}"/>"#,
                    node.center.x - half_width,
                    node.center.y - half_height,
                    half_width * 2.0,
                    half_height * 2.0,
                    stroke
                );
            }
        }
        let _ = writeln!(
            svg,
            r#"<text x="{:.2}" y="{:.2}" font-size="10" text-anchor="middle">{}</text>"#,
            node.center.x,
            node.center.y - node.extent.bounding_radius() - 2.0,
            escape(&node.label)
        );
    }

    svg.push_str("</svg>\n");
    svg
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
