//! Star column rewrite tests over complete plans.
//!
//! Plans are built the way plan construction hands them over: `*` expanded to a `**`
//! column per table, joins making the names unique (`**`, `**0`), a screen or writer
//! at the root.
//!
//! ## What These Tests Verify
//! - Ambiguous star columns are prefixed per table (`T0$**`, `T1$**`) and the screen
//!   restores the original names
//! - Plans without ambiguity come back untouched
//! - A star leaf visited before the ambiguity is found keeps its name
//! - A writer takes over unprefixing; no projection is added under the screen

use physopt_core::expr::{DataType, Expr, JoinType};
use physopt_core::plan::{JoinAlgorithm, JoinSpec, PhysicalNode, PhysicalOp, PlanRef, TableRef};
use physopt_core::schema::{Field, Schema};
use physopt_core::settings::PlannerSettings;
use physopt_rules::default_pass_registry;
use physopt_rules::star_columns::{insert_rename_project, is_prefixed_star_column};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

fn scan(table: &str, columns: &[&str]) -> PlanRef {
    PhysicalNode::scan(
        TableRef::new("dfs", table),
        Schema::new(columns.iter().map(|c| Field::new(*c, DataType::Utf8)).collect()),
    )
}

fn col(i: usize) -> Expr {
    Expr::input_ref(i, DataType::Utf8)
}

fn join(join_type: JoinType, left: PlanRef, right: PlanRef) -> PlanRef {
    let width = left.schema().len();
    let spec = JoinSpec {
        join_type,
        condition: Expr::equals(col(0), col(width)),
        equi_keys: vec![(0, 0)],
        extra_condition: None,
    };
    PhysicalNode::join(JoinAlgorithm::Hash, spec, left, right).unwrap()
}

fn project(input: PlanRef, exprs: Vec<Expr>, names: &[&str]) -> PlanRef {
    PhysicalNode::project(input, exprs, names).unwrap()
}

fn upper(arg: Expr) -> Expr {
    Expr::Function {
        name: "UPPER".into(),
        args: vec![arg],
        return_type: DataType::Utf8,
    }
}

fn is_project(node: &PlanRef, allow_duplicates: bool) -> bool {
    matches!(
        node.op(),
        PhysicalOp::Project { allow_duplicates: a, .. } if *a == allow_duplicates
    )
}

/// `Screen → Project(*, UPPER(a.*) AS extra_col) → Join(Scan(A: *), Scan(B: *))`
fn select_star_with_extra_column() -> PlanRef {
    let join = join(JoinType::Inner, scan("a", &["**"]), scan("b", &["**"]));
    assert_eq!(join.field_names(), vec!["**", "**0"]);
    let project = project(
        join,
        vec![col(0), col(1), upper(col(0))],
        &["**", "**0", "extra_col"],
    );
    PhysicalNode::screen(project)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_two_star_tables_with_extra_column() {
    init_tracing();
    let root = select_star_with_extra_column();
    let out = insert_rename_project(&root).unwrap();

    // Screen over the unprefixing projection.
    assert!(matches!(out.op(), PhysicalOp::Screen));
    assert_eq!(out.field_names(), vec!["**", "**0", "extra_col"]);
    let unprefix = &out.children()[0];
    assert!(is_project(unprefix, true));

    // The select list follows the prefixed join fields; extra_col keeps its name.
    let select = &unprefix.children()[0];
    assert_eq!(select.field_names(), vec!["T0$**", "T1$**", "extra_col"]);

    let join = &select.children()[0];
    assert_eq!(join.field_names(), vec!["T0$**", "T1$**"]);

    // One prefixing projection above each scan.
    for (side, expected) in join.children().iter().zip(["T0$**", "T1$**"]) {
        assert!(is_project(side, false));
        assert_eq!(side.field_names(), vec![expected]);
        assert!(matches!(side.children()[0].op(), PhysicalOp::Scan { .. }));
        assert_eq!(side.children()[0].field_names(), vec!["**"]);
    }
}

#[test]
fn test_rewritten_root_keeps_output_names() {
    let join = join(
        JoinType::Left,
        scan("orders", &["**"]),
        scan("lineitem", &["**", "l_orderkey"]),
    );
    let reordered = project(
        join,
        vec![col(2), col(0), upper(col(1))],
        &["l_orderkey", "**", "upper_star"],
    );
    let sorted = PhysicalNode::limit(reordered, 0, 100);
    let root = PhysicalNode::screen(sorted);

    let out = insert_rename_project(&root).unwrap();
    assert!(!Arc::ptr_eq(&out, &root));
    assert_eq!(out.field_names(), root.field_names());
    assert_eq!(out.schema().data_types(), root.schema().data_types());
}

#[test]
fn test_single_star_table_is_unchanged() {
    let root = PhysicalNode::screen(project(scan("a", &["**"]), vec![col(0)], &["**"]));
    let out = insert_rename_project(&root).unwrap();
    assert!(Arc::ptr_eq(&out, &root));

    let filtered = PhysicalNode::filter(scan("a", &["**"]), col(0)).unwrap();
    let out = insert_rename_project(&filtered).unwrap();
    assert!(Arc::ptr_eq(&out, &filtered));
}

#[test]
fn test_plain_columns_are_unchanged() {
    let root = PhysicalNode::screen(join(
        JoinType::Inner,
        scan("nation", &["n_nationkey", "n_name"]),
        scan("region", &["r_regionkey", "r_name"]),
    ));
    let out = insert_rename_project(&root).unwrap();
    assert!(Arc::ptr_eq(&out, &root));
}

#[test]
fn test_leaf_visited_before_ambiguity_keeps_name() {
    // The semi join's own row is just `**`, so nothing is ambiguous when the left scan
    // is visited. The right projection, visited later, mixes `**` with `c`.
    let left = scan("a", &["**"]);
    let right = project(scan("b", &["**", "c"]), vec![col(0), col(1)], &["**", "c"]);
    let root = PhysicalNode::screen(join(JoinType::Semi, left.clone(), right));

    let out = insert_rename_project(&root).unwrap();
    assert_eq!(out.field_names(), vec!["**"]);

    // Single-column result: a plain projection under the screen.
    let unprefix = &out.children()[0];
    assert!(is_project(unprefix, false));

    let join = &unprefix.children()[0];
    assert!(Arc::ptr_eq(&join.children()[0], &left));

    // The pass-through projection collapsed into the prefixing one.
    let right = &join.children()[1];
    assert!(is_project(right, false));
    assert_eq!(right.field_names(), vec!["T0$**", "c"]);
    assert!(matches!(right.children()[0].op(), PhysicalOp::Scan { .. }));
}

#[test]
fn test_writer_owns_unprefixing() {
    let select = project(scan("t", &["**", "c"]), vec![col(0), col(1)], &["**", "c"]);
    let writer = PhysicalNode::writer(select, TableRef::new("dfs", "ctas_target"));
    let root = PhysicalNode::screen(writer);

    let out = insert_rename_project(&root).unwrap();
    assert_eq!(out.field_names(), vec!["Fragment", "Records"]);

    let writer = &out.children()[0];
    assert!(matches!(writer.op(), PhysicalOp::Writer { .. }));
    let below = &writer.children()[0];
    assert!(is_project(below, false));
    assert_eq!(below.field_names(), vec!["T0$**", "c"]);
    assert!(!out.display(0).contains("ProjectAllowDup"));
}

#[test]
fn test_table_ids_restart_per_call() {
    let root = select_star_with_extra_column();
    let first = insert_rename_project(&root).unwrap();
    let second = insert_rename_project(&root).unwrap();
    assert_eq!(first, second);
    assert!(first
        .children()[0]
        .children()[0]
        .field_names()
        .iter()
        .take(2)
        .all(|n| is_prefixed_star_column(n)));

    // Unrelated plans rewritten separately reuse the same prefixes.
    let other = PhysicalNode::screen(project(
        scan("c", &["**", "c_id"]),
        vec![col(0), col(1)],
        &["**", "c_id"],
    ));
    let other = insert_rename_project(&other).unwrap();
    let other_select = &other.children()[0].children()[0];
    assert_eq!(other_select.field_names(), vec!["T0$**", "c_id"]);
}

#[test]
fn test_default_registry_runs_star_pass() {
    let root = select_star_with_extra_column();
    let registry = default_pass_registry();

    let out = registry.run(&root, &PlannerSettings::default()).unwrap();
    assert_eq!(out, insert_rename_project(&root).unwrap());

    let disabled = PlannerSettings {
        rename_star_columns: false,
        ..Default::default()
    };
    let untouched = registry.run(&root, &disabled).unwrap();
    assert!(!untouched.display(0).contains("T0$"));
}
