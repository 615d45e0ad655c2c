use mqrtree::{Envelope, EntryView, MqrTree, NodeKind, NodeView, Quadrant};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Re-implements the quadrant-selection rule, so the walker checks the tree
/// against an independent statement of it.
fn expected_quadrant(entry_mbr: &Envelope, node_mbr: &Envelope) -> Quadrant {
    let [ex, ey] = entry_mbr.centroid();
    let [nx, ny] = node_mbr.centroid();
    if ex == nx && ey == ny {
        return Quadrant::Center;
    }
    if ex < nx {
        if ey < ny {
            Quadrant::Sw
        } else {
            Quadrant::Nw
        }
    } else if ey >= ny {
        Quadrant::Ne
    } else {
        Quadrant::Se
    }
}

fn assert_close(actual: f64, expected: f64, what: &str) {
    assert!(
        (actual - expected).abs() <= 1e-9,
        "{what}: {actual} vs {expected}"
    );
}

/// Walks the tree checking, for every node:
/// - the node MBR equals the union of its entries' MBRs (1e-9 tolerance);
/// - every entry of a Normal node sits in the quadrant its centroid selects;
/// - entry counts stay within 2..=5 (the root may hold a single entry).
/// Returns the number of leaves seen.
fn check_invariants<T>(view: NodeView<'_, T>, is_root: bool) -> usize {
    let mut union: Option<Envelope> = None;
    let mut leaves = 0;
    for quad in Quadrant::ALL {
        let Some(entry) = view.slot(quad) else {
            continue;
        };
        let mbr = entry.mbr();
        union = Some(match union {
            None => mbr,
            Some(u) => u.expanded(&mbr),
        });
        if view.kind() == NodeKind::Normal {
            assert_eq!(
                expected_quadrant(&mbr, &view.mbr()),
                quad,
                "entry stored in the wrong quadrant of a Normal node"
            );
        }
        match entry {
            EntryView::Leaf { .. } => leaves += 1,
            EntryView::Subtree(child) => {
                let parent = child.parent().expect("subtree entries keep a parent link");
                assert_eq!(parent.mbr(), view.mbr());
                leaves += check_invariants(child, false);
            }
        }
    }

    let union = union.expect("nodes must hold at least one entry");
    let mbr = view.mbr();
    assert_close(mbr.min_x, union.min_x, "node MBR min_x");
    assert_close(mbr.max_x, union.max_x, "node MBR max_x");
    assert_close(mbr.min_y, union.min_y, "node MBR min_y");
    assert_close(mbr.max_y, union.max_y, "node MBR max_y");

    let count = view.entry_count();
    assert!(count <= 5);
    if !is_root {
        assert!(count >= 2, "non-root node holds fewer than 2 entries");
    }
    leaves
}

fn leaf_payloads<'a>(view: NodeView<'a, i32>, out: &mut Vec<i32>) {
    for quad in Quadrant::ALL {
        match view.slot(quad) {
            Some(EntryView::Leaf { payload, .. }) => out.push(*payload),
            Some(EntryView::Subtree(child)) => leaf_payloads(child, out),
            None => {}
        }
    }
}

fn leaf_of(view: NodeView<'_, i32>, quad: Quadrant) -> i32 {
    match view.slot(quad) {
        Some(EntryView::Leaf { payload, .. }) => *payload,
        _ => panic!("expected a leaf in {quad:?}"),
    }
}

fn subtree_of(view: NodeView<'_, i32>, quad: Quadrant) -> NodeView<'_, i32> {
    match view.slot(quad) {
        Some(EntryView::Subtree(child)) => child,
        _ => panic!("expected a subtree in {quad:?}"),
    }
}

/// The six-envelope construction from the paper, step by step.
#[test]
fn paper_example() {
    let e1 = Envelope::new(85.0, 200.0, 180.0, 360.0);
    let e2 = Envelope::new(310.0, 510.0, 240.0, 330.0);
    let e3 = Envelope::new(170.0, 340.0, 120.0, 240.0);
    let e4 = Envelope::new(0.0, 115.0, 0.0, 90.0);
    let e5 = Envelope::new(255.0, 405.0, 60.0, 150.0);
    let e6 = Envelope::new(390.0, 470.0, 0.0, 90.0);

    let mut tree = MqrTree::new();
    tree.insert(1, e1).unwrap();
    tree.insert(2, e2).unwrap();
    tree.insert(3, e3).unwrap();

    // The first three spread over NW, NE and SW.
    let root = tree.root_view().unwrap();
    assert_eq!(root.mbr(), e1.expanded(&e2).expanded(&e3));
    assert_eq!(root.kind(), NodeKind::Normal);
    assert_eq!(leaf_of(root, Quadrant::Nw), 1);
    assert_eq!(leaf_of(root, Quadrant::Ne), 2);
    assert_eq!(leaf_of(root, Quadrant::Sw), 3);
    check_invariants(root, true);

    // e4 drags the root centroid onto e3's centroid: e3 migrates to Center
    // and the root becomes a Center node.
    tree.insert(4, e4).unwrap();
    let root = tree.root_view().unwrap();
    let mbr = root.mbr();
    assert_eq!(mbr, e1.expanded(&e2).expanded(&e3).expanded(&e4));
    assert_eq!(mbr.centroid(), e3.centroid());
    assert_eq!(root.kind(), NodeKind::Center);
    assert_eq!(leaf_of(root, Quadrant::Center), 3);
    assert_eq!(leaf_of(root, Quadrant::Sw), 4);
    assert_eq!(leaf_of(root, Quadrant::Nw), 1);
    assert_eq!(leaf_of(root, Quadrant::Ne), 2);
    assert!(root.slot(Quadrant::Se).is_none());

    // e5 lands in the empty SE slot without disturbing anything.
    tree.insert(5, e5).unwrap();
    let root = tree.root_view().unwrap();
    assert_eq!(root.kind(), NodeKind::Center);
    assert_eq!(leaf_of(root, Quadrant::Se), 5);
    check_invariants(root, true);

    // e6 collides with e5 in SE; both move into a fresh child placed by
    // their centroids against the pair's union.
    tree.insert(6, e6).unwrap();
    let root = tree.root_view().unwrap();
    let child = subtree_of(root, Quadrant::Se);
    assert_eq!(child.mbr(), e5.expanded(&e6));
    assert_eq!(child.entry_count(), 2);
    assert_eq!(leaf_of(child, Quadrant::Nw), 5);
    assert_eq!(leaf_of(child, Quadrant::Se), 6);
    assert_eq!(leaf_of(root, Quadrant::Nw), 1);
    assert_eq!(leaf_of(root, Quadrant::Ne), 2);
    assert_eq!(leaf_of(root, Quadrant::Center), 3);
    assert_eq!(leaf_of(root, Quadrant::Sw), 4);
    assert_eq!(check_invariants(root, true), 6);
}

/// Scenario after the paper example: a large envelope whose centroid lands
/// exactly on the new root centroid forces a full reorganisation.
#[test]
fn paper_example_large_expansion() {
    let e1 = Envelope::new(85.0, 200.0, 180.0, 360.0);
    let e2 = Envelope::new(310.0, 510.0, 240.0, 330.0);
    let e3 = Envelope::new(170.0, 340.0, 120.0, 240.0);
    let e4 = Envelope::new(0.0, 115.0, 0.0, 90.0);
    let e5 = Envelope::new(255.0, 405.0, 60.0, 150.0);
    let e6 = Envelope::new(390.0, 470.0, 0.0, 90.0);
    let e7 = Envelope::new(-100.0, 600.0, -100.0, 600.0);

    let mut tree = MqrTree::new();
    for (i, env) in [e1, e2, e3, e4, e5, e6, e7].iter().enumerate() {
        tree.insert(i as i32 + 1, *env).unwrap();
    }

    let root = tree.root_view().unwrap();
    assert_eq!(root.mbr(), e7);
    assert_eq!(root.mbr().centroid(), [250.0, 250.0]);

    // e7's centroid coincides with the new root centroid, so it takes the
    // Center slot; the displaced children are reassigned around it.
    assert_eq!(root.kind(), NodeKind::Center);
    assert_eq!(leaf_of(root, Quadrant::Center), 7);
    assert_eq!(leaf_of(root, Quadrant::Nw), 1);
    assert_eq!(leaf_of(root, Quadrant::Ne), 2);
    assert_eq!(leaf_of(root, Quadrant::Sw), 4);

    // e3, e5 and e6 all end up southeast of the new centroid.
    let se = subtree_of(root, Quadrant::Se);
    let mut payloads = Vec::new();
    leaf_payloads(se, &mut payloads);
    payloads.sort_unstable();
    assert_eq!(payloads, vec![3, 5, 6]);

    assert_eq!(check_invariants(root, true), 7);
}

#[test]
fn invariants_hold_for_random_rectangles() {
    let mut tree = MqrTree::new();
    let mut rng = StdRng::seed_from_u64(11);
    for i in 0..250 {
        let min_x = rng.gen_range(-500.0..500.0);
        let min_y = rng.gen_range(-500.0..500.0);
        let env = Envelope::new(
            min_x,
            min_x + rng.gen_range(0.0..80.0),
            min_y,
            min_y + rng.gen_range(0.0..80.0),
        );
        tree.insert(i, env).unwrap();
    }

    let leaves = check_invariants(tree.root_view().unwrap(), true);
    assert_eq!(leaves, 250);

    // Whole-space search returns every payload exactly once.
    let mut everything: Vec<i32> = tree
        .query(&tree.mbr().unwrap())
        .into_iter()
        .copied()
        .collect();
    everything.sort_unstable();
    let expected: Vec<i32> = (0..250).collect();
    assert_eq!(everything, expected);
}

fn overlaps_interior(a: &Envelope, b: &Envelope) -> bool {
    a.min_x < b.max_x && b.min_x < a.max_x && a.min_y < b.max_y && b.min_y < a.max_y
}

fn check_no_sibling_overlap<T>(view: NodeView<'_, T>) {
    let mbrs: Vec<Envelope> = Quadrant::ALL
        .iter()
        .filter_map(|quad| view.slot(*quad).map(|entry| entry.mbr()))
        .collect();
    for i in 0..mbrs.len() {
        for j in (i + 1)..mbrs.len() {
            assert!(
                !overlaps_interior(&mbrs[i], &mbrs[j]),
                "sibling MBRs overlap: {:?} and {:?}",
                mbrs[i],
                mbrs[j]
            );
        }
    }
    for quad in Quadrant::ALL {
        if let Some(EntryView::Subtree(child)) = view.slot(quad) {
            check_no_sibling_overlap(child);
        }
    }
}

/// With point data, sibling entries do not overlap as interiors at any
/// level. Checked on a row-major grid and on a low-discrepancy sequence.
#[test]
fn points_yield_zero_sibling_overlap() {
    let mut tree = MqrTree::new();
    let mut id = 0;
    for y in 0..16 {
        for x in 0..16 {
            let env = Envelope::point(f64::from(x) * 10.0, f64::from(y) * 10.0);
            tree.insert(id, env).unwrap();
            id += 1;
        }
    }
    let root = tree.root_view().unwrap();
    assert!(root.parent().is_none());
    assert_eq!(check_invariants(root, true), 256);
    check_no_sibling_overlap(root);

    let mut tree = MqrTree::new();
    for i in 1..=50 {
        let x = (f64::from(i) * 0.754_877_666_246_692_7).fract() * 100.0;
        let y = (f64::from(i) * 0.569_840_290_998_053_2).fract() * 100.0;
        tree.insert(i, Envelope::point(x, y)).unwrap();
    }
    let root = tree.root_view().unwrap();
    assert_eq!(check_invariants(root, true), 50);
    check_no_sibling_overlap(root);
}
