use lotinduction::{
    Bayesable, BinaryLikelihood, BoundVarSpec, Grammar, IdrProposal, InsertDeleteProposal,
    LikelihoodError, LotHypothesis, MCMCable, Node, NodeSelection, ProposalError, Proposer,
    RegenerationProposal,
};
use rand::rngs::SmallRng;
use rand::SeedableRng;

fn fol_grammar() -> Grammar {
    let mut g = Grammar::new();
    g.add_rule("BOOL", "x", None, 2.0).unwrap();
    g.add_rule("BOOL", "not_", Some(&["BOOL"]), 1.0).unwrap();
    g.add_rule("BOOL", "and_", Some(&["BOOL", "BOOL"]), 1.0).unwrap();
    g.add_rule("BOOL", "exists_", Some(&["FUNCTION", "SET"]), 0.5)
        .unwrap();
    g.add_rule("SET", "S", None, 1.0).unwrap();
    g.add_binding_rule(
        "FUNCTION",
        "lambda",
        Some(&["BOOL"]),
        1.0,
        BoundVarSpec::new("BOOL", None),
    )
    .unwrap();
    g
}

#[test]
fn regeneration_proposals_stay_well_scoped() {
    let g = fol_grammar();
    let mut rng = SmallRng::seed_from_u64(41);
    let proposer = RegenerationProposal::default();
    let mut current = g.generate("BOOL", &mut rng).unwrap();
    for _ in 0..300 {
        let p = match proposer.propose_value(&g, &current, &mut rng) {
            Ok(p) => p,
            Err(ProposalError::Failed) => continue,
            Err(e) => panic!("unexpected proposal error: {}", e),
        };
        assert!(p.forward.is_finite());
        assert!(p.backward.is_finite());
        assert!(g.log_probability(&p.value).unwrap().is_finite());
        current = p.value;
    }
}

#[test]
fn weighted_selection_proposals_are_still_exact() {
    let mut g = fol_grammar();
    g.bv_resample_weight = 3.0;
    let proposer = RegenerationProposal {
        selection: NodeSelection::ResampleWeighted,
        ..RegenerationProposal::default()
    };
    let mut rng = SmallRng::seed_from_u64(43);
    let root = g.parse("and_(x,not_(x))", "BOOL").unwrap();
    for _ in 0..100 {
        let p = proposer.propose_value(&g, &root, &mut rng).unwrap();
        assert!(p.forward.is_finite());
        assert!(p.backward.is_finite());
    }
}

#[test]
fn insert_delete_walks_between_wrapped_forms() {
    let g = fol_grammar();
    let proposer = InsertDeleteProposal::default();
    let mut rng = SmallRng::seed_from_u64(47);
    let mut current = g.parse("not_(x)", "BOOL").unwrap();
    let mut sizes = Vec::new();
    for _ in 0..200 {
        if let Ok(p) = proposer.propose_value(&g, &current, &mut rng) {
            assert!(p.forward.is_finite());
            assert!(p.backward.is_finite());
            assert!(g.log_probability(&p.value).unwrap().is_finite());
            current = p.value;
            sizes.push(current.len());
        }
    }
    // both growth and shrinkage happen
    assert!(sizes.windows(2).any(|w| w[1] > w[0]));
    assert!(sizes.windows(2).any(|w| w[1] < w[0]));
}

#[test]
fn idr_mixes_both_kernels() {
    let g = fol_grammar();
    let proposer = IdrProposal::default();
    let mut rng = SmallRng::seed_from_u64(53);
    let root = g.parse("not_(and_(x,x))", "BOOL").unwrap();
    let mut ok = 0;
    for _ in 0..200 {
        if let Ok(p) = proposer.propose_value(&g, &root, &mut rng) {
            ok += 1;
            assert!(g.log_probability(&p.value).unwrap().is_finite());
        }
    }
    assert!(ok > 100);
}

fn eval(_: &Grammar, tree: &Node, _: &String) -> Result<String, LikelihoodError> {
    Ok(tree.to_string())
}

#[test]
fn insert_delete_exhausts_on_grammars_without_unary_rules() {
    // no unary same-type rule exists, so neither kernel move has candidates
    let mut g = Grammar::new();
    g.add_rule("NUM", "one", None, 1.0).unwrap();
    g.add_rule("NUM", "two", None, 1.0).unwrap();
    let mut rng = SmallRng::seed_from_u64(59);
    let mut h = LotHypothesis::new(
        &g,
        "NUM",
        BinaryLikelihood::new(0.9, eval),
        InsertDeleteProposal::default(),
        &mut rng,
    )
    .unwrap();
    match h.propose(&mut rng) {
        Err(ProposalError::Exhausted { tries }) => assert_eq!(tries, 100),
        other => panic!("expected exhaustion, got {:?}", other.map(|(h, fb)| (h.to_string(), fb))),
    }
}

#[test]
fn proposals_leave_the_original_untouched() {
    let g = fol_grammar();
    let proposer = RegenerationProposal::default();
    let mut rng = SmallRng::seed_from_u64(61);
    let root = g.parse("and_(x,not_(x))", "BOOL").unwrap();
    let snapshot = root.clone();
    for _ in 0..50 {
        let _ = proposer.propose_value(&g, &root, &mut rng);
    }
    assert_eq!(root, snapshot);
}

#[test]
fn hypothesis_proposals_invalidate_cached_scores() {
    let g = fol_grammar();
    let mut rng = SmallRng::seed_from_u64(67);
    let mut h = LotHypothesis::new(
        &g,
        "BOOL",
        BinaryLikelihood::new(0.9, eval),
        RegenerationProposal::default(),
        &mut rng,
    )
    .unwrap();
    h.compute_posterior(&[], None).unwrap();
    assert!(!h.bayes_score().posterior.is_nan());
    let (next, _) = h.propose(&mut rng).unwrap();
    assert!(next.bayes_score().posterior.is_nan());
}
