//! A library for program induction over languages of thought.
//!
//! Hypotheses are expression trees drawn from a weighted [`Grammar`], scored
//! by a prior (the tree's generation probability) and a likelihood over
//! observed data, and searched with Metropolis-Hastings using proposal
//! kernels that report exact forward and backward probabilities.
//!
//! # Examples
//!
//! Sample a boolean expression and recover its probability:
//!
//! ```
//! use lotinduction::Grammar;
//! use rand::{rngs::SmallRng, SeedableRng};
//!
//! let mut g = Grammar::new();
//! g.add_rule("BOOL", "x", None, 2.0).unwrap();
//! g.add_rule("BOOL", "not_", Some(&["BOOL"]), 1.0).unwrap();
//! g.add_rule("BOOL", "and_", Some(&["BOOL", "BOOL"]), 1.0).unwrap();
//!
//! let mut rng = SmallRng::seed_from_u64(1);
//! let tree = g.generate("BOOL", &mut rng).unwrap();
//! let lp = g.log_probability(&tree).unwrap();
//! assert!((lp - tree.generation_log_probability()).abs() < 1e-9);
//!
//! // printing and parsing are inverses
//! let reparsed = g.parse(&tree.to_string(), "BOOL").unwrap();
//! assert_eq!(reparsed, tree);
//! ```

pub mod grammar;
pub mod hypothesis;
pub mod lexicon;
pub mod mcmc;
pub mod node;
pub mod proposal;
mod utils;

pub use crate::grammar::{
    BoundVarSpec, GenerationLimits, Grammar, GrammarError, ParseError, Rule, RuleId,
};
pub use crate::hypothesis::{
    Bayesable, BayesScore, BinaryLikelihood, Datum, LikelihoodError, LikelihoodModel,
    LotHypothesis, MCMCable, MultinomialLikelihood, Observation, Temperable,
};
pub use crate::lexicon::{Dispatch, Lexicon, WordEvaluator};
pub use crate::mcmc::{Control, MCMCChain, SearchError};
pub use crate::node::{Evaluator, Node, RuleRef};
pub use crate::proposal::{
    IdrProposal, InsertDeleteProposal, NodeSelection, Proposal, ProposalError, Proposer,
    RegenerationProposal,
};
