//! Recursive binary split/pane tile tree and the workspace that owns it.
//!
//! Parent edges are arena indices (`NodeId`) rather than `Weak` back-references —
//! the borrow checker makes a doubly-linked tree with `Weak` parents awkward to
//! mutate in place, and spec.md's own Design Notes endorse the arena/index scheme
//! as an equally valid realisation of "non-owning parent back-edge".

use std::cell::Cell;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::event::Event;
use crate::object::ObjectId;
use crate::widget::{ScreenType, Widget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Index into the [`Workspace`]'s node arena. Stable across reshaping, unlike a
/// pointer would be once the backing `Vec` reallocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

enum Node {
    Split { orientation: Orientation, ratio: f32, parent: Option<NodeId>, first: NodeId, second: NodeId, bounds: PixelBounds },
    Pane { parent: Option<NodeId>, widget: Arc<dyn Widget>, bounds: PixelBounds },
}

fn clamp_ratio(ratio: f32) -> f32 {
    ratio.clamp(0.05, 0.95)
}

/// Owns the tile-tree arena, the focused pane, and the shared render-pass
/// resources every pane draws through.
pub struct Workspace {
    nodes: Vec<Option<Node>>,
    root: Option<NodeId>,
    focused: Option<NodeId>,
    active_screen: Cell<ScreenType>,
}

impl Workspace {
    pub fn create() -> Result<Self> {
        Ok(Self { nodes: Vec::new(), root: None, focused: None, active_screen: Cell::new(ScreenType::Main) })
    }

    /// The screen whose widgets currently participate in `prepare_frame`/`render`.
    pub fn active_screen(&self) -> ScreenType {
        self.active_screen.get()
    }

    /// Switches which screen's widgets are eligible to prepare/render. A widget
    /// whose `screen_type()` no longer matches keeps its CPU/GPU state intact —
    /// only the per-frame `on` eligibility it's driven with changes — so switching
    /// back doesn't force it through a fresh create/dispose cycle.
    pub fn set_active_screen(&self, screen: ScreenType) {
        self.active_screen.set(screen);
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(node));
        id
    }

    /// Sets a single pane as the whole tree, focused by default.
    pub fn set_root_pane(&mut self, widget: Arc<dyn Widget>, bounds: PixelBounds) -> NodeId {
        let id = self.push(Node::Pane { parent: None, widget, bounds });
        self.root = Some(id);
        self.focused = Some(id);
        id
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    pub fn pane_widget(&self, id: NodeId) -> Option<&Arc<dyn Widget>> {
        match self.nodes.get(id.0)?.as_ref()? {
            Node::Pane { widget, .. } => Some(widget),
            Node::Split { .. } => None,
        }
    }

    pub fn bounds(&self, id: NodeId) -> Option<PixelBounds> {
        match self.nodes.get(id.0)?.as_ref()? {
            Node::Pane { bounds, .. } | Node::Split { bounds, .. } => Some(*bounds),
        }
    }

    /// Splits the pane at `id` into a `Split` node holding the original pane and a
    /// freshly-created pane for `new_widget`. The new pane becomes focused.
    pub fn split_pane(&mut self, id: NodeId, orientation: Orientation, new_widget: Arc<dyn Widget>) -> Result<NodeId> {
        let (parent, bounds) = match self.nodes.get(id.0).and_then(|n| n.as_ref()) {
            Some(Node::Pane { parent, bounds, .. }) => (*parent, *bounds),
            Some(Node::Split { .. }) => return Err(Error::invalid_argument("cannot split a Split node directly")),
            None => return Err(Error::not_found("node not found")),
        };

        let original = self.nodes[id.0].take().unwrap();
        let original_widget = match original {
            Node::Pane { widget, .. } => widget,
            Node::Split { .. } => unreachable!(),
        };

        let first = self.push(Node::Pane { parent: None, widget: original_widget, bounds });
        let second = self.push(Node::Pane { parent: None, widget: new_widget, bounds });

        self.nodes[id.0] = Some(Node::Split { orientation, ratio: 0.5, parent, first, second, bounds });
        self.set_parent(first, Some(id));
        self.set_parent(second, Some(id));
        self.propagate_bounds(id, bounds);
        self.focused = Some(second);
        Ok(second)
    }

    /// Closes the pane at `id`. If it has a sibling under a `Split` parent, the
    /// sibling replaces the parent in the tree. Focus falls back to the sibling,
    /// or is cleared if `id` was the whole tree.
    pub fn close_pane(&mut self, id: NodeId) -> Result<()> {
        let parent = match self.nodes.get(id.0).and_then(|n| n.as_ref()) {
            Some(Node::Pane { parent, .. }) => *parent,
            Some(Node::Split { .. }) => return Err(Error::invalid_argument("cannot close a Split node directly")),
            None => return Err(Error::not_found("node not found")),
        };

        self.nodes[id.0] = None;
        if self.focused == Some(id) {
            self.focused = None;
        }

        let Some(parent_id) = parent else {
            self.root = None;
            return Ok(());
        };

        let (grandparent, sibling, bounds) = match self.nodes.get(parent_id.0).and_then(|n| n.as_ref()) {
            Some(Node::Split { parent, first, second, bounds, .. }) => {
                let sibling = if *first == id { *second } else { *first };
                (*parent, sibling, *bounds)
            }
            _ => return Err(Error::internal_bug("tile tree parent is not a Split")),
        };

        self.nodes[parent_id.0] = None;
        self.set_parent(sibling, grandparent);

        match grandparent {
            Some(gp) => {
                if let Some(Node::Split { first, second, .. }) = self.nodes[gp.0].as_mut() {
                    if *first == parent_id {
                        *first = sibling;
                    } else {
                        *second = sibling;
                    }
                }
                self.propagate_bounds(sibling, bounds);
            }
            None => {
                self.root = Some(sibling);
                self.propagate_bounds(sibling, bounds);
            }
        }

        if self.focused.is_none() {
            self.focused = Some(self.first_pane_under(sibling));
        }
        Ok(())
    }

    fn first_pane_under(&self, id: NodeId) -> NodeId {
        match self.nodes[id.0].as_ref().unwrap() {
            Node::Pane { .. } => id,
            Node::Split { first, .. } => self.first_pane_under(*first),
        }
    }

    fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        match self.nodes[id.0].as_mut().unwrap() {
            Node::Pane { parent: p, .. } | Node::Split { parent: p, .. } => *p = parent,
        }
    }

    /// Sets the split ratio (clamped to `(0.05, 0.95)`) and eagerly re-propagates
    /// bounds to both children.
    pub fn set_ratio(&mut self, id: NodeId, ratio: f32) -> Result<()> {
        let bounds = match self.nodes.get_mut(id.0).and_then(|n| n.as_mut()) {
            Some(Node::Split { ratio: r, bounds, .. }) => {
                *r = clamp_ratio(ratio);
                *bounds
            }
            Some(Node::Pane { .. }) => return Err(Error::invalid_argument("only Split nodes have a ratio")),
            None => return Err(Error::not_found("node not found")),
        };
        self.propagate_bounds(id, bounds);
        Ok(())
    }

    /// Resizes the whole tree to `bounds`, eagerly propagating to every
    /// descendant.
    pub fn resize(&mut self, bounds: PixelBounds) {
        if let Some(root) = self.root {
            self.propagate_bounds(root, bounds);
        }
    }

    fn propagate_bounds(&mut self, id: NodeId, bounds: PixelBounds) {
        let children = match self.nodes.get_mut(id.0).and_then(|n| n.as_mut()) {
            Some(Node::Pane { bounds: b, .. }) => {
                *b = bounds;
                None
            }
            Some(Node::Split { orientation, ratio, bounds: b, first, second, .. }) => {
                *b = bounds;
                let (first_bounds, second_bounds) = split_bounds(bounds, *orientation, *ratio);
                Some((*first, first_bounds, *second, second_bounds))
            }
            None => None,
        };
        if let Some((first, first_bounds, second, second_bounds)) = children {
            self.propagate_bounds(first, first_bounds);
            self.propagate_bounds(second, second_bounds);
        }
    }

    /// Sets focus to `id`, clearing the previous focus. No-op (and no event) if
    /// `id` no longer exists, matching the "emit no event if the widget is gone"
    /// resolution for focus loss during tree mutation.
    pub fn set_focus(&mut self, id: NodeId) {
        if matches!(self.nodes.get(id.0), Some(Some(Node::Pane { .. }))) {
            self.focused = Some(id);
        }
    }

    /// Applies a `SplitPane`/`Close` tree-mutation event if it targets a pane
    /// currently in this tree. Returns `true` if the event was handled.
    pub fn handle_event(&mut self, event: &Event) -> bool {
        match event {
            Event::Close { object } => {
                if let Some(id) = self.find_pane_by_object(*object) {
                    let _ = self.close_pane(id);
                    return true;
                }
                false
            }
            _ => false,
        }
    }

    fn find_pane_by_object(&self, object: ObjectId) -> Option<NodeId> {
        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(Node::Pane { widget, .. }) = node {
                if widget.id() == object {
                    return Some(NodeId(i));
                }
            }
        }
        None
    }

    /// Depth-first per-frame preparation of every pane, called once before
    /// `render` each frame. A pane is "on" for GPU-resource purposes when its
    /// widget reports itself visible; hidden panes release their resources via
    /// the `OnOffEdge` falling transition inside `prepare_frame`.
    pub fn prepare_frame(&self, ctx: &crate::widget::FrameContext<'_>) {
        if let Some(root) = self.root {
            self.prepare_node(root, ctx);
        }
    }

    fn prepare_node(&self, id: NodeId, ctx: &crate::widget::FrameContext<'_>) {
        match self.nodes[id.0].as_ref().unwrap() {
            Node::Pane { widget, .. } => {
                widget.prepare_frame(ctx, is_eligible(widget.as_ref(), self.active_screen.get()));
            }
            Node::Split { first, second, .. } => {
                self.prepare_node(*first, ctx);
                self.prepare_node(*second, ctx);
            }
        }
    }

    /// Depth-first render of every visible pane on the active screen into the
    /// shared pass. A pane belonging to the inactive screen is skipped entirely,
    /// per the "only widgets of the active screen are rendered" rule.
    pub fn render(&self, pass: &mut wgpu::RenderPass<'_>) {
        if let Some(root) = self.root {
            self.render_node(root, pass);
        }
    }

    fn render_node(&self, id: NodeId, pass: &mut wgpu::RenderPass<'_>) {
        match self.nodes[id.0].as_ref().unwrap() {
            Node::Pane { widget, bounds, .. } => {
                if is_eligible(widget.as_ref(), self.active_screen.get()) {
                    widget.render(pass, *bounds);
                }
            }
            Node::Split { first, second, .. } => {
                self.render_node(*first, pass);
                self.render_node(*second, pass);
            }
        }
    }
}

/// A pane's widget is eligible to prepare/render when it's visible and belongs to
/// the workspace's current active screen.
fn is_eligible(widget: &dyn Widget, active_screen: ScreenType) -> bool {
    widget.visible() && widget.screen_type() == active_screen
}

fn split_bounds(bounds: PixelBounds, orientation: Orientation, ratio: f32) -> (PixelBounds, PixelBounds) {
    match orientation {
        Orientation::Horizontal => {
            let split_x = bounds.x + bounds.width * ratio;
            (
                PixelBounds { x: bounds.x, y: bounds.y, width: bounds.width * ratio, height: bounds.height },
                PixelBounds { x: split_x, y: bounds.y, width: bounds.width * (1.0 - ratio), height: bounds.height },
            )
        }
        Orientation::Vertical => {
            let split_y = bounds.y + bounds.height * ratio;
            (
                PixelBounds { x: bounds.x, y: bounds.y, width: bounds.width, height: bounds.height * ratio },
                PixelBounds { x: bounds.x, y: split_y, width: bounds.width, height: bounds.height * (1.0 - ratio) },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::test_support::NullWidget;

    fn bounds() -> PixelBounds {
        PixelBounds { x: 0.0, y: 0.0, width: 800.0, height: 600.0 }
    }

    #[test]
    fn single_pane_occupies_full_bounds() {
        let mut ws = Workspace::create().unwrap();
        let id = ws.set_root_pane(Arc::new(NullWidget::new()), bounds());
        assert_eq!(ws.bounds(id), Some(bounds()));
        assert_eq!(ws.focused(), Some(id));
    }

    #[test]
    fn split_produces_complementary_bounds() {
        let mut ws = Workspace::create().unwrap();
        let root = ws.set_root_pane(Arc::new(NullWidget::new()), bounds());
        let second = ws.split_pane(root, Orientation::Horizontal, Arc::new(NullWidget::new())).unwrap();
        let root_node = ws.root().unwrap();
        let b = ws.bounds(root_node).unwrap();
        assert_eq!(b, bounds());
        let second_bounds = ws.bounds(second).unwrap();
        assert!((second_bounds.width - 400.0).abs() < 0.01);
        assert_eq!(ws.focused(), Some(second));
    }

    #[test]
    fn ratio_is_clamped() {
        let mut ws = Workspace::create().unwrap();
        let root = ws.set_root_pane(Arc::new(NullWidget::new()), bounds());
        let _second = ws.split_pane(root, Orientation::Vertical, Arc::new(NullWidget::new())).unwrap();
        let split_id = ws.root().unwrap();
        ws.set_ratio(split_id, 5.0).unwrap();
        match ws.nodes[split_id.0].as_ref().unwrap() {
            Node::Split { ratio, .. } => assert!((*ratio - 0.95).abs() < 1e-6),
            _ => panic!("expected split"),
        }
        ws.set_ratio(split_id, -3.0).unwrap();
        match ws.nodes[split_id.0].as_ref().unwrap() {
            Node::Split { ratio, .. } => assert!((*ratio - 0.05).abs() < 1e-6),
            _ => panic!("expected split"),
        }
    }

    #[test]
    fn closing_pane_promotes_sibling() {
        let mut ws = Workspace::create().unwrap();
        let root = ws.set_root_pane(Arc::new(NullWidget::new()), bounds());
        let second = ws.split_pane(root, Orientation::Horizontal, Arc::new(NullWidget::new())).unwrap();
        ws.close_pane(second).unwrap();
        let new_root = ws.root().unwrap();
        assert_eq!(ws.bounds(new_root), Some(bounds()));
        assert!(ws.pane_widget(new_root).is_some());
    }

    #[test]
    fn resize_propagates_to_all_panes() {
        let mut ws = Workspace::create().unwrap();
        let root = ws.set_root_pane(Arc::new(NullWidget::new()), bounds());
        let second = ws.split_pane(root, Orientation::Horizontal, Arc::new(NullWidget::new())).unwrap();
        let new_bounds = PixelBounds { x: 0.0, y: 0.0, width: 1600.0, height: 1200.0 };
        ws.resize(new_bounds);
        let root_id = ws.root().unwrap();
        assert_eq!(ws.bounds(root_id), Some(new_bounds));
        let second_bounds = ws.bounds(second).unwrap();
        assert!((second_bounds.width - 800.0).abs() < 0.01);
    }

    #[test]
    fn set_focus_on_missing_node_is_noop() {
        let mut ws = Workspace::create().unwrap();
        let root = ws.set_root_pane(Arc::new(NullWidget::new()), bounds());
        ws.set_focus(NodeId(999));
        assert_eq!(ws.focused(), Some(root));
    }

    #[test]
    fn workspace_defaults_to_main_screen_and_switches() {
        let ws = Workspace::create().unwrap();
        assert_eq!(ws.active_screen(), ScreenType::Main);
        ws.set_active_screen(ScreenType::Alternate);
        assert_eq!(ws.active_screen(), ScreenType::Alternate);
    }

    #[test]
    fn only_active_screen_widgets_are_eligible() {
        let main_widget = NullWidget::with_screen_type(ScreenType::Main);
        let alt_widget = NullWidget::with_screen_type(ScreenType::Alternate);

        assert!(is_eligible(&main_widget, ScreenType::Main));
        assert!(!is_eligible(&alt_widget, ScreenType::Main));
        assert!(is_eligible(&alt_widget, ScreenType::Alternate));
        assert!(!is_eligible(&main_widget, ScreenType::Alternate));
    }

    #[test]
    fn hidden_widget_is_ineligible_even_on_its_own_screen() {
        let widget = NullWidget::with_screen_type(ScreenType::Main);
        widget.set_visible(false);
        assert!(!is_eligible(&widget, ScreenType::Main));
    }
}
