//! Cross-module integration test for the tile-tree bounds invariant
//! (spec.md §8: "after any resize or ratio change, every pane's bounds equal
//! the piecewise composition of its ancestors' splits"), combining
//! `tile::Workspace` with the `widget` module's shared test widget.

use std::sync::Arc;

use yetty::tile::{Orientation, PixelBounds, Workspace};
use yetty::widget::test_support::NullWidget;

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 0.01
}

/// Builds a root split horizontally at 0.25, then splits its right column
/// vertically at 0.6, giving a tree three panes deep:
///
/// ```text
/// +--------+------------------+
/// |        |      (top)       |
/// | (left) +------------------+
/// |        |     bottom_id    |
/// +--------+------------------+
/// ```
///
/// `split_pane` always hands back the freshly created *second* child and
/// turns the node it was called on into the enclosing `Split`, so the left
/// column and the right column's top half are never individually addressable
/// again — this test checks them by complement arithmetic against the
/// `Split` nodes' own bounds instead, which is exactly the piecewise
/// composition the invariant describes.
#[test]
fn resize_and_ratio_changes_preserve_the_piecewise_bounds_invariant() {
    let mut ws = Workspace::create().unwrap();
    let root_bounds = PixelBounds { x: 0.0, y: 0.0, width: 1000.0, height: 800.0 };

    let root_id = ws.set_root_pane(Arc::new(NullWidget::new()), root_bounds);
    let right_id = ws.split_pane(root_id, Orientation::Horizontal, Arc::new(NullWidget::new())).unwrap();
    ws.set_ratio(root_id, 0.25).unwrap();

    let bottom_id = ws.split_pane(right_id, Orientation::Vertical, Arc::new(NullWidget::new())).unwrap();
    ws.set_ratio(right_id, 0.6).unwrap();

    let root_bounds_now = ws.bounds(root_id).unwrap();
    let right_bounds = ws.bounds(right_id).unwrap();
    let bottom_bounds = ws.bounds(bottom_id).unwrap();

    // The root split's own bounds are always the whole tree, at any depth.
    assert!(close(root_bounds_now.x, 0.0));
    assert!(close(root_bounds_now.width, 1000.0));
    assert!(close(root_bounds_now.height, 800.0));

    // The left column (the original root pane, now unaddressable) is exactly
    // the complement of the right column along the split axis.
    let left_width_implied = root_bounds_now.width - right_bounds.width;
    assert!(close(left_width_implied, 1000.0 * 0.25));
    assert!(close(right_bounds.x, left_width_implied));
    assert!(close(right_bounds.width, 1000.0 * 0.75));
    assert!(close(right_bounds.height, 800.0));

    // The right column's own split (vertical, ratio 0.6) puts its top half
    // (now unaddressable) above `bottom_id`, whose bounds are the bottom 40%
    // of that same column — piecewise composition of both ancestor splits.
    let top_height_implied = right_bounds.height - bottom_bounds.height;
    assert!(close(top_height_implied, 800.0 * 0.6));
    assert!(close(bottom_bounds.height, 800.0 * 0.4));
    assert!(close(bottom_bounds.x, right_bounds.x));
    assert!(close(bottom_bounds.width, right_bounds.width));
    assert!(close(bottom_bounds.y, right_bounds.y + top_height_implied));

    // A whole-tree resize re-propagates the same ratios against new
    // dimensions — the invariant holds again at a different scale, not just
    // at construction time.
    let new_bounds = PixelBounds { x: 0.0, y: 0.0, width: 2000.0, height: 400.0 };
    ws.resize(new_bounds);

    let root_bounds_now = ws.bounds(root_id).unwrap();
    let right_bounds = ws.bounds(right_id).unwrap();
    let bottom_bounds = ws.bounds(bottom_id).unwrap();

    assert!(close(root_bounds_now.width, 2000.0));
    let left_width_implied = root_bounds_now.width - right_bounds.width;
    assert!(close(left_width_implied, 2000.0 * 0.25));
    assert!(close(right_bounds.width, 2000.0 * 0.75));

    let top_height_implied = right_bounds.height - bottom_bounds.height;
    assert!(close(top_height_implied, 400.0 * 0.6));
    assert!(close(bottom_bounds.height, 400.0 * 0.4));
    assert!(close(bottom_bounds.y, right_bounds.y + top_height_implied));
}
