//! Coordinate resolution
//!
//! Absolute screen positions for the line-oriented backend combine three
//! sources: the node's offsets summed up the ancestor chain, the focused
//! window's virtual viewport as reported by the window manager, and the
//! status bar. The XML backend reports absolute bounds already and skips
//! all of it. Window info that cannot be parsed degrades to a zero offset
//! instead of failing.

use crate::tree::{Backend, Bounds, NodeId, ViewTree};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// Containers injected by system chrome whose offsets must not contribute
/// to a descendant's position.
const CHROME_CONTAINER_CLASSES: &[&str] = &[
    "com.android.internal.widget.ActionBarView",
    "com.android.internal.widget.ActionBarContextView",
    "com.android.internal.view.menu.ActionMenuView",
    "com.android.internal.policy.impl.PhoneWindow$DecorView",
];

/// Owner name of the status bar window in the window-manager dump.
const STATUS_BAR_COMPONENT: &str = "StatusBar";

/// The window manager renamed its frame labels in SDK 17.
const FRAME_LABELS_MIN_SDK: u32 = 17;

lazy_static! {
    static ref RE_WINDOW: Regex =
        Regex::new(r"Window #(\d+) Window\{([0-9a-fA-F]+) (?:u\d+ )?(.+?)\}").unwrap();
    static ref RE_CURRENT_FOCUS: Regex =
        Regex::new(r"mCurrentFocus=Window\{([0-9a-fA-F]+) (?:u\d+ )?(.+?)\}").unwrap();
    // SDK >= 17 labels
    static ref RE_FRAMES_PARENT: Regex = Regex::new(
        r"Frames: containing=\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\] parent=\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]"
    )
    .unwrap();
    static ref RE_CONTENT_FRAME: Regex =
        Regex::new(r"content=\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]").unwrap();
    // older labels
    static ref RE_M_PARENT_FRAME: Regex =
        Regex::new(r"mParentFrame=\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]").unwrap();
    static ref RE_M_CONTENT_FRAME: Regex =
        Regex::new(r"mContentFrame=\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]").unwrap();
    static ref RE_VIEW_VISIBILITY: Regex =
        Regex::new(r"mViewVisibility=0x([0-9a-fA-F]+)").unwrap();
}

/// One on-screen window from the window-manager dump
#[derive(Debug, Clone, Serialize)]
pub struct Window {
    pub num: u32,
    pub id: u32,
    pub activity: String,
    pub viewport_x: i32,
    pub viewport_y: i32,
    pub viewport_width: i32,
    pub viewport_height: i32,
    pub parent_x: i32,
    pub parent_y: i32,
    pub visibility: i32,
}

/// Parsed window list plus the focused window, rebuilt fresh on every
/// coordinate-resolution pass.
#[derive(Debug, Clone, Default)]
pub struct WindowManagerState {
    pub windows: Vec<Window>,
    pub focused: Option<usize>,
}

fn frame_quad(caps: &regex::Captures<'_>, first: usize) -> (i32, i32, i32, i32) {
    let coord = |i: usize| caps[i].parse::<i32>().unwrap_or(0);
    (
        coord(first),
        coord(first + 1),
        coord(first + 2),
        coord(first + 3),
    )
}

/// Parse a `dumpsys window windows` text dump. Blocks that carry no
/// parseable frames keep a zero viewport rather than failing.
pub fn parse_window_dump(dump: &str, sdk: u32) -> WindowManagerState {
    let mut state = WindowManagerState::default();
    let heads: Vec<(usize, usize, u32, u32, String)> = RE_WINDOW
        .captures_iter(dump)
        .filter_map(|caps| {
            let m = caps.get(0)?;
            Some((
                m.start(),
                m.end(),
                caps[1].parse().unwrap_or(0),
                u32::from_str_radix(&caps[2], 16).unwrap_or(0),
                caps[3].to_string(),
            ))
        })
        .collect();
    for (i, head) in heads.iter().enumerate() {
        let block_end = heads.get(i + 1).map(|h| h.0).unwrap_or(dump.len());
        let block = &dump[head.1..block_end];
        let (content, parent) = if sdk >= FRAME_LABELS_MIN_SDK {
            (
                RE_CONTENT_FRAME.captures(block),
                RE_FRAMES_PARENT.captures(block),
            )
        } else {
            (
                RE_M_CONTENT_FRAME.captures(block),
                RE_M_PARENT_FRAME.captures(block),
            )
        };
        let (vx, vy, vr, vb) = content
            .map(|caps| frame_quad(&caps, 1))
            .unwrap_or((0, 0, 0, 0));
        let (px, py) = match parent {
            // the parent quad sits after the containing quad in the
            // Frames: line
            Some(caps) if sdk >= FRAME_LABELS_MIN_SDK => {
                let (x, y, _, _) = frame_quad(&caps, 5);
                (x, y)
            }
            Some(caps) => {
                let (x, y, _, _) = frame_quad(&caps, 1);
                (x, y)
            }
            None => (0, 0),
        };
        let visibility = RE_VIEW_VISIBILITY
            .captures(block)
            .and_then(|caps| i32::from_str_radix(&caps[1], 16).ok())
            .unwrap_or(0);
        state.windows.push(Window {
            num: head.2,
            id: head.3,
            activity: head.4.clone(),
            viewport_x: vx,
            viewport_y: vy,
            viewport_width: vr - vx,
            viewport_height: vb - vy,
            parent_x: px,
            parent_y: py,
            visibility,
        });
    }
    if let Some(caps) = RE_CURRENT_FOCUS.captures(dump) {
        let focus_id = u32::from_str_radix(&caps[1], 16).unwrap_or(0);
        let focus_name = caps[2].to_string();
        state.focused = state
            .windows
            .iter()
            .position(|w| w.id == focus_id)
            .or_else(|| state.windows.iter().position(|w| w.activity == focus_name));
    }
    debug!(
        windows = state.windows.len(),
        focused = ?state.focused,
        "window manager state"
    );
    state
}

impl WindowManagerState {
    pub fn focused_window(&self) -> Option<&Window> {
        self.focused.and_then(|i| self.windows.get(i))
    }

    /// Height of the status bar window, zero when it is not in the list.
    pub fn status_bar_height(&self) -> i32 {
        self.windows
            .iter()
            .find(|w| w.activity == STATUS_BAR_COMPONENT)
            .map(|w| w.viewport_height)
            .unwrap_or(0)
    }

    /// Screen offset of the focused window's content, to add to
    /// ancestor-summed node coordinates. Zero when no window info was
    /// parsed.
    pub fn offset(&self) -> (i32, i32) {
        let Some(fw) = self.focused_window() else {
            return (0, 0);
        };
        let status_bar = self.status_bar_height();
        let mut ox = fw.viewport_x;
        let mut oy = fw.viewport_y;
        // the window sits directly under the status bar
        if fw.viewport_y <= status_bar {
            oy -= status_bar;
        }
        // some devices report the content frame aligned with the parent
        // frame; compensate with the parent offset
        if fw.parent_x == fw.viewport_x && fw.parent_y == fw.viewport_y {
            ox += fw.parent_x;
            oy += fw.parent_y;
        }
        (ox, oy)
    }
}

/// Sum of the local offsets up the ancestor chain, skipping chrome
/// containers.
fn ancestor_sum(tree: &ViewTree, id: NodeId) -> (i32, i32) {
    let mut x = tree.local_x(id);
    let mut y = tree.local_y(id);
    let mut cursor = tree.node(id).parent();
    while let Some(parent) = cursor {
        let class = tree.class_name(parent).unwrap_or("");
        if !CHROME_CONTAINER_CLASSES.contains(&class) {
            x += tree.local_x(parent);
            y += tree.local_y(parent);
        }
        cursor = tree.node(parent).parent();
    }
    (x, y)
}

/// Absolute screen position of a node.
pub fn absolute_position(tree: &ViewTree, id: NodeId, wm: &WindowManagerState) -> (i32, i32) {
    if tree.backend() == Backend::UiAutomator {
        if let Some(bounds) = tree.node(id).bounds() {
            return (bounds.left, bounds.top);
        }
    }
    let (x, y) = ancestor_sum(tree, id);
    let (ox, oy) = wm.offset();
    (x + ox, y + oy)
}

/// Compute and store absolute bounds for every node of a freshly parsed
/// tree. A no-op for the XML backend, whose bounds arrive absolute.
pub fn resolve_tree(tree: &mut ViewTree, wm: &WindowManagerState) {
    if tree.backend() == Backend::UiAutomator {
        return;
    }
    let ids: Vec<NodeId> = tree.ids().collect();
    for id in ids {
        let (x, y) = absolute_position(tree, id, wm);
        let (width, height) = tree.size(id);
        tree.node_mut(id)
            .set_bounds(Bounds::new(x, y, x + width, y + height));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::line;

    const NEWER_WINDOW_DUMP: &str = "\
  Window #2 Window{44c4a2a8 u0 StatusBar}:
    mDisplayId=0
    Frames: containing=[0,0][1080,1920] parent=[0,0][1080,1920]
    content=[0,0][1080,75] visible=[0,0][1080,75]
    mViewVisibility=0x0
  Window #1 Window{44bf1e90 u0 com.example/com.example.Main}:
    Frames: containing=[0,0][1080,1920] parent=[0,0][1080,1920]
    content=[0,75][1080,1920] visible=[0,75][1080,1920]
    mViewVisibility=0x0
  mCurrentFocus=Window{44bf1e90 u0 com.example/com.example.Main}
";

    const OLDER_WINDOW_DUMP: &str = "\
  Window #1 Window{40e2e848 com.example/com.example.Main paused=false}:
    mContainingFrame=[0,0][480,800] mParentFrame=[0,0][480,800]
    mContentFrame=[0,38][480,800] mVisibleFrame=[0,38][480,800]
    mViewVisibility=0x0
  mCurrentFocus=Window{40e2e848 com.example/com.example.Main}
";

    const THREE_NODE_DUMP: &str = "\
FrameLayout@44c06bf0 mID=5,NO_ID getVisibility()=7,VISIBLE
 LinearLayout@44c063c0 mID=4,id/a layout:mLeft=1,5 layout:mTop=2,10 getVisibility()=7,VISIBLE layout:getWidth()=2,50 layout:getHeight()=2,20
  Button@44c06598 mID=4,id/b layout:mLeft=1,1 layout:mTop=1,1 getVisibility()=7,VISIBLE layout:getWidth()=2,10 layout:getHeight()=2,10
";

    #[test]
    fn test_parse_newer_window_dump() {
        let state = parse_window_dump(NEWER_WINDOW_DUMP, 21);
        assert_eq!(state.windows.len(), 2);
        assert_eq!(state.status_bar_height(), 75);
        let focused = state.focused_window().unwrap();
        assert_eq!(focused.activity, "com.example/com.example.Main");
        assert_eq!(focused.viewport_y, 75);
        assert_eq!(focused.viewport_width, 1080);
        assert_eq!(focused.parent_y, 0);
        assert_eq!(focused.visibility, 0);
    }

    #[test]
    fn test_parse_older_window_dump() {
        let state = parse_window_dump(OLDER_WINDOW_DUMP, 15);
        assert_eq!(state.windows.len(), 1);
        let focused = state.focused_window().unwrap();
        assert_eq!(focused.viewport_y, 38);
        assert_eq!(focused.parent_x, 0);
    }

    #[test]
    fn test_unparsed_window_info_degrades_to_zero_offset() {
        let state = parse_window_dump("no windows here", 21);
        assert!(state.windows.is_empty());
        assert_eq!(state.offset(), (0, 0));
    }

    #[test]
    fn test_status_bar_heuristic_cancels_content_origin() {
        // focused window starts exactly at the status bar's lower edge;
        // the status-bar height is subtracted only then (device heuristic,
        // not a guaranteed invariant)
        let state = parse_window_dump(NEWER_WINDOW_DUMP, 21);
        assert_eq!(state.offset(), (0, 0));
    }

    #[test]
    fn test_parent_frame_quirk_applies_when_origins_align() {
        // content frame aligned with the parent frame adds the parent
        // offset on top (device heuristic, not a guaranteed invariant)
        let mut state = parse_window_dump(NEWER_WINDOW_DUMP, 21);
        let i = state.focused.unwrap();
        state.windows[i].viewport_y = 120;
        state.windows[i].parent_x = 0;
        state.windows[i].parent_y = 120;
        assert_eq!(state.offset(), (0, 240));
    }

    #[test]
    fn test_zero_offsets_resolve_to_local_position() {
        let tree = line::parse(THREE_NODE_DUMP, 19).unwrap();
        let wm = WindowManagerState::default();
        let root = tree.root();
        assert_eq!(absolute_position(&tree, root, &wm), (0, 0));
        let a = tree.by_unique_id("id/a").unwrap();
        assert_eq!(absolute_position(&tree, a, &wm), (5, 10));
    }

    #[test]
    fn test_grandchild_sums_ancestor_offsets() {
        let tree = line::parse(THREE_NODE_DUMP, 19).unwrap();
        let wm = WindowManagerState::default();
        let b = tree.by_unique_id("id/b").unwrap();
        assert_eq!(absolute_position(&tree, b, &wm), (6, 11));
    }

    #[test]
    fn test_chrome_containers_are_skipped() {
        let dump = "\
com.android.internal.policy.impl.PhoneWindow$DecorView@1 mID=5,NO_ID layout:mLeft=2,40 layout:mTop=2,40 getVisibility()=7,VISIBLE
 TextView@2 mID=4,id/t layout:mLeft=1,3 layout:mTop=1,4 getVisibility()=7,VISIBLE
";
        let tree = line::parse(dump, 19).unwrap();
        let t = tree.by_unique_id("id/t").unwrap();
        assert_eq!(absolute_position(&tree, t, &WindowManagerState::default()), (3, 4));
    }

    #[test]
    fn test_resolve_tree_fills_bounds() {
        let mut tree = line::parse(THREE_NODE_DUMP, 19).unwrap();
        resolve_tree(&mut tree, &WindowManagerState::default());
        let b = tree.by_unique_id("id/b").unwrap();
        assert_eq!(
            tree.node(b).bounds(),
            Some(Bounds::new(6, 11, 16, 21))
        );
        assert_eq!(tree.center(b), Some((11, 16)));
    }
}
