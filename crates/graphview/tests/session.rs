use std::time::Duration;

use graphview::*;
use tracing_test::traced_test;

fn session_of(graph: GraphModel) -> GraphSession {
    GraphSession::with_graph(SessionConfig::default(), "main", graph).unwrap()
}

/// `M1 -> R1 -> M2`
fn chain() -> GraphModel {
    let mut g = GraphModel::new();
    let m1 = g.add_node(Node::metabolite("M1", "m1").at(300.0, 300.0)).unwrap();
    let r1 = g.add_node(Node::reaction("R1", "r1").at(400.0, 300.0)).unwrap();
    let m2 = g.add_node(Node::metabolite("M2", "m2").at(500.0, 300.0)).unwrap();
    g.add_link(m1, r1, Link::default()).unwrap();
    g.add_link(r1, m2, Link::default()).unwrap();
    g
}

/// One metabolite `atp` consumed by three reactions.
fn hub() -> GraphModel {
    let mut g = GraphModel::new();
    let atp = g.add_node(Node::metabolite("atp", "atp").at(0.0, 0.0)).unwrap();
    for (i, r) in ["R1", "R2", "R3"].into_iter().enumerate() {
        let rk = g.add_node(Node::reaction(r, r).at(50.0 * i as f64, 80.0)).unwrap();
        g.add_link(atp, rk, Link::default()).unwrap();
    }
    g
}

/// `A -> R1 -> B -> R2 -> C` with `X -> R1`, plus an unrelated `Y -> R9`.
fn pathway() -> GraphModel {
    let mut g = GraphModel::new();
    let mut add = |node: Node| g.add_node(node).unwrap();
    let a = add(Node::metabolite("A", "a").at(0.0, 0.0));
    let r1 = add(Node::reaction("R1", "r1").at(50.0, 0.0));
    let b = add(Node::metabolite("B", "b").at(100.0, 0.0));
    let r2 = add(Node::reaction("R2", "r2").at(150.0, 0.0));
    let c = add(Node::metabolite("C", "c").at(200.0, 0.0));
    let x = add(Node::metabolite("X", "x").at(50.0, 50.0));
    let y = add(Node::metabolite("Y", "y").at(0.0, 200.0));
    let r9 = add(Node::reaction("R9", "r9").at(50.0, 200.0));
    for (s, t) in [(a, r1), (r1, b), (b, r2), (r2, c), (x, r1), (y, r9)] {
        g.add_link(s, t, Link::default()).unwrap();
    }
    g
}

fn link_ids(graph: &GraphModel) -> Vec<(String, String)> {
    graph
        .links()
        .map(|v| {
            (
                graph.id_of(v.source).unwrap().to_string(),
                graph.id_of(v.target).unwrap().to_string(),
            )
        })
        .collect()
}

#[test]
fn test_suspend_and_restore_round_trip() {
    let mut s = session_of(chain());
    s.select_ids(&["M1"]).unwrap();
    assert_eq!(s.suspend_selected().unwrap(), vec!["M1".to_string()]);

    let g = s.graph();
    assert_eq!(g.node_count(), 2);
    assert_eq!(link_ids(g), vec![("R1".to_string(), "M2".to_string())]);
    assert_eq!(g.suspended().len(), 1);
    assert_eq!(g.suspended()[0].node_id, "M1");

    let report = s.restore("M1").unwrap();
    assert_eq!(report.restored_links, 1);
    assert!(report.skipped.is_empty());

    let g = s.graph();
    assert_eq!(g.node_count(), 3);
    assert_eq!(g.link_count(), 2);
    assert!(link_ids(g).contains(&("M1".to_string(), "R1".to_string())));
    assert!(g.suspended().is_empty());
    let m1 = g.node(g.key_of("M1").unwrap()).unwrap();
    assert_eq!(m1.group_key, "m1");
    assert!(m1.is_metabolite());
}

#[test]
fn test_restore_unknown_token_fails_cleanly() {
    let mut s = session_of(chain());
    assert!(matches!(s.restore("nope"), Err(NetworkError::NotSuspended(_))));
    assert_eq!(s.graph().node_count(), 3);
    assert!(!s.undo().unwrap());
}

#[test]
fn test_split_then_join_restores_degree() {
    let mut s = session_of(hub());
    s.select_ids(&["atp"]).unwrap();
    let copies = s.split_selected().unwrap();
    assert_eq!(copies.len(), 2);
    assert_eq!(s.graph().node_count(), 6);
    assert_eq!(s.graph().link_count(), 3);

    let atp = s.graph().key_of("atp").unwrap();
    assert_eq!(s.graph().degree(atp), 1);

    let mut class_mates = vec![atp];
    class_mates.extend(copies);
    s.select(&class_mates).unwrap();
    assert_eq!(s.join_selected().unwrap(), 2);

    let g = s.graph();
    assert_eq!(g.node_count(), 4);
    assert_eq!(g.link_count(), 3);
    assert_eq!(g.degree(g.key_of("atp").unwrap()), 3);
    g.validate().unwrap();
}

#[test]
fn test_isolate_reaction_repoints_one_link() {
    let mut s = session_of(hub());
    s.select_ids(&["R1"]).unwrap();
    let created = s.isolate_selected().unwrap();
    assert_eq!(created.len(), 1);

    let g = s.graph();
    assert_eq!(g.node_count(), 5);
    assert_eq!(g.link_count(), 3);
    assert_eq!(g.degree(g.key_of("atp").unwrap()), 2);
    assert_eq!(g.node(created[0]).unwrap().group_key, "atp");
    assert_eq!(g.degree(created[0]), 1);
}

#[test]
fn test_every_edit_leaves_dense_indices_consistent() {
    let mut s = session_of(pathway());
    s.select_ids(&["B"]).unwrap();
    s.split_selected().unwrap();
    s.select_ids(&["X", "Y"]).unwrap();
    s.suspend_selected().unwrap();
    s.select_ids(&["R9"]).unwrap();
    s.delete_selected().unwrap();

    let g = s.graph();
    let n = g.node_count();
    for (i, &key) in g.node_keys().iter().enumerate() {
        assert_eq!(g.index_of(key), Some(i));
    }
    for (source, target) in g.dense_links() {
        assert!(source < n && target < n);
    }
    assert_eq!(s.simulation().node_count(), n);
}

#[test]
fn test_undo_history_is_bounded() {
    let config = SessionConfig {
        history_capacity: 2,
        ..SessionConfig::default()
    };
    let mut s = GraphSession::with_graph(config, "main", pathway()).unwrap();
    for id in ["Y", "X", "C"] {
        s.select_ids(&[id]).unwrap();
        s.delete_selected().unwrap();
    }
    assert_eq!(s.graph().node_count(), 5);
    assert!(s.undo().unwrap());
    assert!(s.undo().unwrap());
    assert!(!s.undo().unwrap());
    assert_eq!(s.graph().node_count(), 7);
    assert!(s.graph().key_of("Y").is_none());
}

#[test]
fn test_undo_collapse_does_not_select_a_reused_slot() {
    let mut s = session_of(pathway());
    s.select_ids(&["R9"]).unwrap();
    let collapsed = s.collapse_selected().unwrap();
    assert_eq!(s.selection(), &[collapsed]);
    assert_eq!(s.graph().node_count(), 7);

    // The collapsed node sits in a slot R9 or Y held before the edit.
    assert!(s.undo().unwrap());
    assert!(s.graph().contains(collapsed));
    assert!(s.selection().is_empty());
    assert!(s.selected_ids().is_empty());

    assert!(s.redo().unwrap());
    assert!(s.selection().is_empty());
    assert_eq!(s.delete_selected().unwrap(), 0);
    assert_eq!(s.graph().node_count(), 7);
}

#[test]
fn test_selection_follows_ids_across_undo() {
    let mut s = session_of(pathway());
    s.select_ids(&["Y"]).unwrap();
    s.delete_selected().unwrap();
    s.select_ids(&["R9", "A"]).unwrap();
    let c = s.graph().key_of("C").unwrap();
    s.pin(c, None).unwrap();

    assert!(s.undo().unwrap());
    assert_eq!(s.selected_ids(), vec!["R9".to_string(), "A".to_string()]);
    assert!(s.undo().unwrap());
    assert_eq!(s.selected_ids(), vec!["R9".to_string(), "A".to_string()]);
    assert!(s.graph().key_of("Y").is_some());
}

#[test]
fn test_shortest_path_to_self() {
    let s = session_of(pathway());
    let a = s.graph().key_of("A").unwrap();
    let outcome = s.shortest_path(a, a, SearchBudget::unlimited()).unwrap();
    assert_eq!(outcome, SearchOutcome::Complete(vec![a]));
}

#[traced_test]
#[test]
fn test_expired_budget_returns_partial_path() {
    let s = session_of(pathway());
    let g = s.graph();
    let (a, c) = (g.key_of("A").unwrap(), g.key_of("C").unwrap());
    let outcome = s
        .shortest_path(a, c, SearchBudget::with_timeout(Duration::ZERO))
        .unwrap();
    assert!(!outcome.is_complete());
    assert_eq!(outcome.value().first(), Some(&a));
    assert!(logs_contain("ran out of budget"));
}

#[test]
fn test_extract_component_registers_new_graph() {
    let mut s = session_of(pathway());
    s.select_ids(&["A", "C"]).unwrap();
    let outcome = s.extract_component("sub", SearchBudget::unlimited()).unwrap();
    assert_eq!(outcome, SearchOutcome::Complete(6));

    let sub = s.registry().get("sub").unwrap();
    assert_eq!(sub.link_count(), 5);
    assert!(sub.key_of("X").is_some());
    assert!(sub.key_of("R9").is_none());
    assert_eq!(s.active_name(), "main");

    assert!(matches!(
        s.extract_component("sub", SearchBudget::unlimited()),
        Err(NetworkError::GraphExists(_))
    ));
}

#[test]
fn test_switch_graph_clears_selection() {
    let mut s = session_of(pathway());
    s.select_ids(&["A", "C"]).unwrap();
    s.extract_component("sub", SearchBudget::unlimited()).unwrap();
    s.switch_graph("sub").unwrap();
    assert!(s.selection().is_empty());
    assert_eq!(s.graph().node_count(), 6);
    assert_eq!(s.simulation().node_count(), 6);
}

#[test]
fn test_drag_is_not_recorded() {
    let mut s = session_of(chain());
    s.select_ids(&["M1"]).unwrap();
    let moved = s.drag_selected(10.0, -5.0).unwrap();
    assert_eq!(moved.len(), 1);
    let m1 = s.graph().node(moved[0]).unwrap();
    assert_eq!(m1.position, layout::Position::new(310.0, 295.0));
    assert!(!s.undo().unwrap());
    assert!(s.simulation().is_running());
}

#[test]
fn test_snapshot_round_trip_keeps_history_and_commits() {
    let mut s = session_of(chain());
    s.commit("initial");
    s.select_ids(&["M2"]).unwrap();
    s.delete_selected().unwrap();
    s.join_graphs("main", "main", "twice", true).unwrap();
    s.select_ids(&["R1"]).unwrap();

    let json = s.to_snapshot().to_json().unwrap();
    let snapshot = SessionSnapshot::from_json(&json).unwrap();
    assert_eq!(snapshot.active_name, "main");
    assert_eq!(snapshot.selection, vec!["R1".to_string()]);

    let mut loaded = GraphSession::from_snapshot(SessionConfig::default(), &snapshot).unwrap();
    assert_eq!(loaded.registry().len(), 2);
    assert_eq!(loaded.selected_ids(), vec!["R1".to_string()]);
    assert_eq!(loaded.graph().node_count(), 2);

    assert!(loaded.undo().unwrap());
    assert_eq!(loaded.graph().node_count(), 3);

    loaded.restore_commit("initial").unwrap();
    assert_eq!(loaded.graph().to_persisted(), chain().to_persisted());
}
