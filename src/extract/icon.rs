//! SVG icon shape classification
//!
//! Player buttons are drawn as inline SVG. A pause icon is two axis-aligned
//! rectangles; a play icon is a single triangle pointing right. The outlines
//! may come from one `<path>`, several `<path>`s, `<rect>`s or a `<polygon>`.
//! Only straight-line path commands (`M L H V Z`, absolute or relative) are
//! understood; any curve makes that path unknown.

use regex::Regex;
use scraper::ElementRef;
use std::sync::LazyLock;

use crate::page::{attr, select_within};

const SHAPES: &str = "svg path, svg rect, svg polygon";

static PATH_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[MmLlHhVvZzCcSsQqTtAa]|[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?").unwrap()
});

/// Minimum coordinate difference treated as a real offset
const EPSILON: f64 = 0.01;

/// Recognized icon shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconShape {
    /// Two vertical bars (pause icon: media is playing)
    Bars,
    /// Rightward triangle (play icon: media is paused)
    Triangle,
}

type Point = (f64, f64);

/// Classify the icon drawn inside `button`, taking all of its SVG shapes
/// together. Shapes that can't be read (curves, circles) are skipped; if the
/// combination is not an icon, each shape is tried on its own.
pub fn classify_icon(button: ElementRef<'_>) -> Option<IconShape> {
    let shapes: Vec<Vec<Vec<Point>>> = select_within(button, SHAPES)
        .into_iter()
        .filter_map(outlines_of)
        .collect();
    let combined: Vec<Vec<Point>> = shapes.iter().flatten().cloned().collect();
    classify_outlines(&combined).or_else(|| shapes.iter().find_map(|outlines| classify_outlines(outlines)))
}

/// Classify the shape drawn by an SVG path `d` attribute.
pub fn classify_path(d: &str) -> Option<IconShape> {
    classify_outlines(&parse_subpaths(d)?)
}

fn classify_outlines(outlines: &[Vec<Point>]) -> Option<IconShape> {
    match outlines {
        [a, b] if is_upright_rect(a) && is_upright_rect(b) => Some(IconShape::Bars),
        [single] if is_right_triangle(single) => Some(IconShape::Triangle),
        _ => None,
    }
}

fn outlines_of(shape: ElementRef<'_>) -> Option<Vec<Vec<Point>>> {
    match shape.value().name() {
        "path" => parse_subpaths(attr(shape, "d")?),
        "rect" => rect_outline(shape).map(|outline| vec![outline]),
        "polygon" => polygon_outline(attr(shape, "points")?).map(|outline| vec![outline]),
        _ => None,
    }
}

/// Corners of a `<rect>`. Rounded corners are ignored.
fn rect_outline(rect: ElementRef<'_>) -> Option<Vec<Point>> {
    let length = |name: &str| -> Option<f64> {
        attr(rect, name)?.trim().trim_end_matches("px").parse().ok()
    };
    let (x, y) = (length("x").unwrap_or(0.0), length("y").unwrap_or(0.0));
    let (width, height) = (length("width")?, length("height")?);
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    Some(vec![(x, y), (x + width, y), (x + width, y + height), (x, y + height)])
}

/// Vertices of a `<polygon points="...">`.
fn polygon_outline(points: &str) -> Option<Vec<Point>> {
    let numbers = PATH_TOKEN_RE
        .find_iter(points)
        .map(|m| m.as_str().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    if numbers.len() < 6 || numbers.len() % 2 != 0 {
        return None;
    }
    let mut current: Vec<Point> = numbers.chunks(2).map(|pair| (pair[0], pair[1])).collect();
    let mut outlines = Vec::new();
    close(&mut current, &mut outlines);
    outlines.pop()
}

/// Split a path into subpaths of vertices. Returns `None` on curves or
/// malformed data.
fn parse_subpaths(d: &str) -> Option<Vec<Vec<Point>>> {
    let tokens: Vec<&str> = PATH_TOKEN_RE.find_iter(d).map(|m| m.as_str()).collect();
    let mut subpaths: Vec<Vec<Point>> = Vec::new();
    let mut current: Vec<Point> = Vec::new();
    let mut pos: Point = (0.0, 0.0);
    let mut start: Point = (0.0, 0.0);
    let mut command = ' ';
    let mut i = 0;

    let number = |i: &mut usize| -> Option<f64> {
        let value = tokens.get(*i)?.parse::<f64>().ok()?;
        *i += 1;
        Some(value)
    };

    while i < tokens.len() {
        if let Some(c) = tokens[i].chars().next().filter(char::is_ascii_alphabetic) {
            command = c;
            i += 1;
            if matches!(command, 'Z' | 'z') {
                close(&mut current, &mut subpaths);
                pos = start;
                continue;
            }
        }

        match command {
            'M' | 'm' => {
                let (x, y) = (number(&mut i)?, number(&mut i)?);
                close(&mut current, &mut subpaths);
                pos = if command == 'm' { (pos.0 + x, pos.1 + y) } else { (x, y) };
                start = pos;
                current.push(pos);
                // Extra coordinate pairs after a moveto are implicit linetos.
                command = if command == 'm' { 'l' } else { 'L' };
            }
            'L' | 'l' => {
                let (x, y) = (number(&mut i)?, number(&mut i)?);
                pos = if command == 'l' { (pos.0 + x, pos.1 + y) } else { (x, y) };
                current.push(pos);
            }
            'H' | 'h' => {
                let x = number(&mut i)?;
                pos.0 = if command == 'h' { pos.0 + x } else { x };
                current.push(pos);
            }
            'V' | 'v' => {
                let y = number(&mut i)?;
                pos.1 = if command == 'v' { pos.1 + y } else { y };
                current.push(pos);
            }
            _ => return None,
        }
    }
    close(&mut current, &mut subpaths);

    Some(subpaths)
}

fn close(current: &mut Vec<Point>, subpaths: &mut Vec<Vec<Point>>) {
    if current.is_empty() {
        return;
    }
    let mut points = std::mem::take(current);
    points.dedup_by(|a, b| same(*a, *b));
    if points.len() > 1 && same(points[0], points[points.len() - 1]) {
        points.pop();
    }
    subpaths.push(points);
}

fn same(a: Point, b: Point) -> bool {
    (a.0 - b.0).abs() < EPSILON && (a.1 - b.1).abs() < EPSILON
}

/// Four vertices, every edge horizontal or vertical, taller than wide.
fn is_upright_rect(points: &[Point]) -> bool {
    if points.len() != 4 {
        return false;
    }
    let axis_aligned = (0..4).all(|k| {
        let (a, b) = (points[k], points[(k + 1) % 4]);
        (a.0 - b.0).abs() < EPSILON || (a.1 - b.1).abs() < EPSILON
    });
    let (min_x, max_x, min_y, max_y) = bounds(points);
    axis_aligned && (max_y - min_y) > (max_x - min_x)
}

/// Three vertices: two share an x coordinate and the third sits to their
/// right, between them vertically.
fn is_right_triangle(points: &[Point]) -> bool {
    if points.len() != 3 {
        return false;
    }
    let apex = points
        .iter()
        .copied()
        .fold(points[0], |best, p| if p.0 > best.0 { p } else { best });
    let base: Vec<Point> = points.iter().copied().filter(|p| !same(*p, apex)).collect();
    if base.len() != 2 {
        return false;
    }
    let (lo, hi) = if base[0].1 < base[1].1 { (base[0].1, base[1].1) } else { (base[1].1, base[0].1) };
    (base[0].0 - base[1].0).abs() < EPSILON
        && apex.0 - base[0].0 > EPSILON
        && apex.1 > lo
        && apex.1 < hi
}

fn bounds(points: &[Point]) -> (f64, f64, f64, f64) {
    points.iter().fold(
        (f64::MAX, f64::MIN, f64::MAX, f64::MIN),
        |(min_x, max_x, min_y, max_y), p| (min_x.min(p.0), max_x.max(p.0), min_y.min(p.1), max_y.max(p.1)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Page;

    fn classify_button(svg: &str) -> Option<IconShape> {
        let page = Page::from_html("https://neurokaraoke.com/", &format!("<button><svg>{svg}</svg></button>"));
        classify_icon(page.first("button")?)
    }

    #[test]
    fn test_pause_icon_from_rects() {
        assert_eq!(
            classify_button(r#"<rect x="6" y="4" width="4" height="16" rx="1"/><rect x="14" y="4" width="4" height="16" rx="1"/>"#),
            Some(IconShape::Bars)
        );
    }

    #[test]
    fn test_pause_icon_from_separate_paths() {
        assert_eq!(
            classify_button(r#"<path d="M6 5h4v14H6z"/><path d="M14 5h4v14h-4z"/>"#),
            Some(IconShape::Bars)
        );
    }

    #[test]
    fn test_play_icon_from_polygon() {
        assert_eq!(classify_button(r#"<polygon points="8,5 8,19 19,12"/>"#), Some(IconShape::Triangle));
        assert_eq!(classify_button(r#"<polygon points="8 5 19 12 8 19 8 5"/>"#), Some(IconShape::Triangle));
        assert_eq!(classify_button(r#"<polygon points="16,5 16,19 5,12"/>"#), None);
    }

    #[test]
    fn test_unreadable_shapes_are_skipped() {
        // Ring drawn with arcs around a play triangle
        assert_eq!(
            classify_button(r#"<path d="M12 2a10 10 0 1 0 0 20a10 10 0 1 0 0-20z"/><path d="M10 8v8l6-4z"/>"#),
            Some(IconShape::Triangle)
        );
    }

    #[test]
    fn test_each_shape_tried_alone() {
        // Square backdrop plus a one-path pause icon
        assert_eq!(
            classify_button(r#"<rect width="24" height="24"/><path d="M6 19h4V5H6v14zm8-14v14h4V5h-4z"/>"#),
            Some(IconShape::Bars)
        );
    }

    #[test]
    fn test_wide_rects_are_not_pause() {
        assert_eq!(
            classify_button(r#"<rect x="3" y="6" width="18" height="2"/><rect x="3" y="16" width="18" height="2"/>"#),
            None
        );
        assert_eq!(classify_button(r#"<rect width="0" height="16"/><rect x="8" width="4" height="16"/>"#), None);
    }

    #[test]
    fn test_material_pause_icon() {
        assert_eq!(classify_path("M6 19h4V5H6v14zm8-14v14h4V5h-4z"), Some(IconShape::Bars));
    }

    #[test]
    fn test_material_play_icon() {
        assert_eq!(classify_path("M8 5v14l11-7z"), Some(IconShape::Triangle));
    }

    #[test]
    fn test_absolute_commands_with_commas() {
        assert_eq!(classify_path("M8,5 L8,19 L19,12 Z"), Some(IconShape::Triangle));
        assert_eq!(
            classify_path("M6,5 L10,5 L10,19 L6,19 Z M14,5 L18,5 L18,19 L14,19 Z"),
            Some(IconShape::Bars)
        );
    }

    #[test]
    fn test_left_pointing_triangle_is_not_play() {
        assert_eq!(classify_path("M16 5v14L5 12z"), None);
    }

    #[test]
    fn test_curves_are_unknown() {
        assert_eq!(classify_path("M12 2C6.48 2 2 6.48 2 12s4.48 10 10 10z"), None);
    }

    #[test]
    fn test_wide_bars_are_not_pause() {
        // Two horizontal bars (a "menu" style icon)
        assert_eq!(classify_path("M3 6h18v2H3zM3 16h18v2H3z"), None);
    }

    #[test]
    fn test_garbage_is_unknown() {
        assert_eq!(classify_path(""), None);
        assert_eq!(classify_path("M 1"), None);
    }
}
