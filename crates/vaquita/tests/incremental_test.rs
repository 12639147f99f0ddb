use vaquita::{Constraint, ConstraintId, IncSolver, Variable, VariableId};

fn v(i: usize) -> VariableId {
    VariableId::new(i)
}

fn c(i: usize) -> ConstraintId {
    ConstraintId::new(i)
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn incremental_solve_matches_the_static_result_on_a_chain() {
    let vars = vec![
        Variable::new(0.0, 1.0),
        Variable::new(0.0, 1.0),
        Variable::new(0.0, 1.0),
    ];
    let cons = vec![
        Constraint::new(v(0), v(1), 5.0),
        Constraint::new(v(1), v(2), 5.0),
    ];
    let mut solver = IncSolver::new(vars, cons).unwrap();
    let active = solver.solve().unwrap();
    assert!(active);
    assert_close(solver.position(v(0)), -5.0);
    assert_close(solver.position(v(1)), 0.0);
    assert_close(solver.position(v(2)), 5.0);
}

#[test]
fn incremental_solve_splits_the_gap_by_weight() {
    let vars = vec![Variable::new(0.0, 3.0), Variable::new(0.0, 1.0)];
    let cons = vec![Constraint::new(v(0), v(1), 10.0)];
    let mut solver = IncSolver::new(vars, cons).unwrap();
    solver.solve().unwrap();
    assert_close(solver.position(v(0)), -2.5);
    assert_close(solver.position(v(1)), 7.5);
}

#[test]
fn converged_solve_is_idempotent() {
    let vars = vec![
        Variable::new(4.0, 1.0),
        Variable::new(0.0, 2.0),
        Variable::new(2.0, 1.0),
    ];
    let cons = vec![
        Constraint::new(v(0), v(1), 2.0),
        Constraint::new(v(1), v(2), 2.0),
    ];
    let mut solver = IncSolver::new(vars, cons).unwrap();
    solver.solve().unwrap();
    let first = solver.positions();
    let first_cost = solver.cost();

    solver.satisfy().unwrap();
    solver.split_blocks();
    assert_eq!(solver.positions(), first);
    assert_close(solver.cost(), first_cost);
}

#[test]
fn cycle_is_relaxed_and_remaining_constraints_hold_exactly() {
    // a + 4 <= b, b + 4 <= c, c + 4 <= a cannot all hold; the constraint
    // closing the cycle gets its gap relaxed to its realised slack, the other
    // two stay tight at their specified gaps.
    let vars = vec![
        Variable::new(0.0, 1.0),
        Variable::new(0.0, 1.0),
        Variable::new(0.0, 1.0),
    ];
    let cons = vec![
        Constraint::new(v(0), v(1), 4.0),
        Constraint::new(v(1), v(2), 4.0),
        Constraint::new(v(2), v(0), 4.0),
    ];
    let mut solver = IncSolver::new(vars, cons).unwrap();
    solver.solve().unwrap();

    let relaxed: Vec<usize> = (0..3)
        .filter(|&i| solver.constraint(c(i)).is_unsatisfiable())
        .collect();
    assert_eq!(relaxed, vec![2]);

    assert_close(solver.position(v(0)), -4.0);
    assert_close(solver.position(v(1)), 0.0);
    assert_close(solver.position(v(2)), 4.0);
    assert_close(solver.position(v(1)) - solver.position(v(0)), 4.0);
    assert_close(solver.position(v(2)) - solver.position(v(1)), 4.0);
    // the sacrificed constraint holds only at its relaxed gap
    assert_close(solver.constraint(c(2)).gap(), -12.0);
}

#[test]
fn equality_constraint_is_tightened_even_when_slack_is_positive() {
    let vars = vec![Variable::new(0.0, 1.0), Variable::new(10.0, 1.0)];
    let cons = vec![Constraint::equality(v(0), v(1), 5.0)];
    let mut solver = IncSolver::new(vars, cons).unwrap();
    let active = solver.solve().unwrap();
    assert!(active);
    assert_close(solver.position(v(0)), 2.5);
    assert_close(solver.position(v(1)), 7.5);
    assert_close(solver.position(v(1)) - solver.position(v(0)), 5.0);
}

#[test]
fn cost_is_non_increasing_across_incremental_passes() {
    let desireds = [9.0, 2.0, 7.0, 1.0, 8.0, 0.0];
    let vars: Vec<Variable> = desireds.iter().map(|&d| Variable::new(d, 1.0)).collect();
    let cons: Vec<Constraint> = (0..desireds.len() - 1)
        .map(|i| Constraint::new(v(i), v(i + 1), 2.0))
        .collect();
    let mut solver = IncSolver::new(vars, cons).unwrap();
    solver.satisfy().unwrap();
    let mut last = solver.cost();
    for _ in 0..5 {
        solver.split_blocks();
        solver.satisfy().unwrap();
        let cost = solver.cost();
        assert!(cost <= last + 1e-9, "cost rose from {last} to {cost}");
        last = cost;
    }
}

#[test]
fn moving_desired_positions_and_resolving_splits_the_block() {
    let vars = vec![Variable::new(0.0, 1.0), Variable::new(0.0, 1.0)];
    let cons = vec![Constraint::new(v(0), v(1), 10.0)];
    let mut solver = IncSolver::new(vars, cons).unwrap();
    solver.solve().unwrap();
    assert_close(solver.position(v(0)), -5.0);
    assert_close(solver.position(v(1)), 5.0);
    assert!(solver.constraint(c(0)).is_active());

    // pull the variables far apart; the active constraint now has a negative
    // multiplier and the block must split so both reach their targets
    solver.set_desired(v(0), -20.0);
    solver.set_desired(v(1), 20.0);
    let active = solver.solve().unwrap();
    assert!(!active);
    assert_close(solver.position(v(0)), -20.0);
    assert_close(solver.position(v(1)), 20.0);
    assert!(!solver.constraint(c(0)).is_active());
    assert_close(solver.cost(), 0.0);
}

#[test]
fn moving_desired_positions_back_together_remerges() {
    let vars = vec![Variable::new(-20.0, 1.0), Variable::new(20.0, 1.0)];
    let cons = vec![Constraint::new(v(0), v(1), 10.0)];
    let mut solver = IncSolver::new(vars, cons).unwrap();
    solver.solve().unwrap();
    assert_close(solver.position(v(0)), -20.0);
    assert_close(solver.position(v(1)), 20.0);

    solver.set_desired(v(0), 0.0);
    solver.set_desired(v(1), 0.0);
    solver.solve().unwrap();
    assert_close(solver.position(v(0)), -5.0);
    assert_close(solver.position(v(1)), 5.0);
    assert!(solver.constraint(c(0)).is_active());
}

#[test]
fn solve_reports_whether_any_constraint_is_active() {
    let vars = vec![Variable::new(0.0, 1.0), Variable::new(20.0, 1.0)];
    let cons = vec![Constraint::new(v(0), v(1), 10.0)];
    let mut solver = IncSolver::new(vars, cons).unwrap();
    let active = solver.solve().unwrap();
    assert!(!active);
    assert_eq!(solver.positions(), vec![0.0, 20.0]);
}

#[test]
fn feasibility_holds_on_a_dense_instance() {
    // overlapping desired positions with both chain and skip constraints
    let desireds = [5.0, 5.0, 5.0, 5.0, 5.0, 5.0];
    let vars: Vec<Variable> = desireds.iter().map(|&d| Variable::new(d, 1.0)).collect();
    let mut cons: Vec<Constraint> = (0..desireds.len() - 1)
        .map(|i| Constraint::new(v(i), v(i + 1), 3.0))
        .collect();
    cons.push(Constraint::new(v(0), v(2), 7.0));
    cons.push(Constraint::new(v(2), v(5), 8.0));
    let mut solver = IncSolver::new(vars, cons).unwrap();
    solver.solve().unwrap();
    for i in 0..7 {
        let con = solver.constraint(c(i));
        let sep = solver.position(con.right()) - solver.position(con.left());
        assert!(
            sep >= con.gap() - 1e-7,
            "constraint {i} violated: separation {sep} < gap {}",
            con.gap()
        );
        assert!(!con.is_unsatisfiable());
    }
}
