use winnow::{
    ascii::multispace0,
    combinator::{alt, delimited, separated},
    prelude::*,
    token::take_while,
};

use super::{Grammar, RuleId, Scopes};
use crate::node::{Node, RuleRef};

#[derive(Clone, Debug)]
pub enum ParseError {
    /// No rule with this name takes this printed form for this nonterminal.
    InapplicableRule(String, String),
    Other(String),
}
impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        match self {
            ParseError::InapplicableRule(nt, s) => {
                write!(f, "invalid rule {} for nonterminal {}", s, nt)
            }
            ParseError::Other(err) => write!(f, "could not parse: {}", err),
        }
    }
}
impl std::error::Error for ParseError {}

#[derive(Debug, Clone)]
struct Item {
    name: String,
    /// Whether the item was written with parentheses. Distinguishes the
    /// thunk `set_()` from the terminal `five`.
    applied: bool,
    args: Vec<Item>,
}

impl Item {
    fn into_node(self, g: &Grammar, nt: &str, scopes: &mut Scopes) -> Result<Node, ParseError> {
        // bound variables shadow grammar rules of the same name
        if let Some((index, br)) = scopes.find_name(nt, &self.name) {
            let arg_tps = br.argument_types.clone();
            if self.applied != arg_tps.is_some() || self.args.len() != arg_tps.as_ref().map_or(0, Vec::len) {
                return Err(ParseError::InapplicableRule(nt.to_owned(), self.name));
            }
            let rule = RuleRef::Bound(index);
            let logprob = g
                .choice_logprob(nt, scopes, rule)
                .map_err(|e| ParseError::Other(e.to_string()))?;
            let children = match arg_tps {
                None => None,
                Some(arg_tps) => Some(
                    self.args
                        .into_iter()
                        .zip(arg_tps)
                        .map(|(item, arg_nt)| item.into_node(g, &arg_nt, scopes))
                        .collect::<Result<Vec<_>, _>>()?,
                ),
            };
            return Ok(Node {
                rule,
                nonterminal: nt.to_owned(),
                name: self.name,
                children,
                logprob,
            });
        }
        if let Some(id) = self.matching_rule(g, nt) {
            return self.apply_rule(g, nt, id, scopes);
        }
        // pass-through rules print as their sole child; try each in turn
        let pass_throughs: Vec<RuleId> = g
            .rule_ids(nt)
            .iter()
            .copied()
            .filter(|&id| g.arena[id.0].name.is_empty())
            .collect();
        for id in pass_throughs {
            let wrapped = Item {
                name: String::new(),
                applied: true,
                args: vec![self.clone()],
            };
            if let Ok(node) = wrapped.apply_rule(g, nt, id, scopes) {
                return Ok(node);
            }
        }
        Err(ParseError::InapplicableRule(nt.to_owned(), self.name))
    }

    /// The rule at `nt` whose name and printed form both match.
    fn matching_rule(&self, g: &Grammar, nt: &str) -> Option<RuleId> {
        g.rule_ids(nt).iter().copied().find(|&id| {
            let r = &g.arena[id.0];
            r.name == self.name && r.is_terminal() != self.applied
        })
    }

    fn apply_rule(
        self,
        g: &Grammar,
        nt: &str,
        id: RuleId,
        scopes: &mut Scopes,
    ) -> Result<Node, ParseError> {
        let r = &g.arena[id.0];
        if self.args.len() != r.arity() {
            return Err(ParseError::InapplicableRule(nt.to_owned(), self.name));
        }
        let rule = RuleRef::Grammar(id);
        let logprob = g
            .choice_logprob(nt, scopes, rule)
            .map_err(|e| ParseError::Other(e.to_string()))?;
        let name = r.name.clone();
        let arg_tps = r.argument_types.clone();
        let spec = r.bound_var.clone();
        let children = match arg_tps {
            None => None,
            Some(arg_tps) => Some(scopes.with(g, spec.as_ref(), |scopes| {
                self.args
                    .into_iter()
                    .zip(arg_tps)
                    .map(|(item, arg_nt)| item.into_node(g, &arg_nt, scopes))
                    .collect::<Result<Vec<_>, _>>()
            })?),
        };
        Ok(Node {
            rule,
            nonterminal: nt.to_owned(),
            name,
            children,
            logprob,
        })
    }
}

fn alphanumeric_ext(c: char) -> bool {
    (c >= 0x21 as char && c <= 0x7E as char) && !(c == '(' || c == ')' || c == ',')
}

fn parse_item_name(input: &mut &str) -> PResult<String> {
    multispace0(input)?;
    let name = take_while(1.., alphanumeric_ext).parse_next(input)?;
    multispace0(input)?;
    Ok(name.to_owned())
}

fn parse_var(input: &mut &str) -> PResult<Item> {
    let name = parse_item_name.parse_next(input)?;
    Ok(Item {
        name,
        applied: false,
        args: vec![],
    })
}

fn parse_func(input: &mut &str) -> PResult<Item> {
    let name = parse_item_name.parse_next(input)?;
    let args = delimited("(", separated(0.., parse_expr, ","), ")").parse_next(input)?;
    multispace0(input)?;
    Ok(Item {
        name,
        applied: true,
        args,
    })
}

fn parse_expr(input: &mut &str) -> PResult<Item> {
    alt((parse_func, parse_var)).parse_next(input)
}

pub fn parse(grammar: &Grammar, input: &str, nonterminal: &str) -> Result<Node, ParseError> {
    match parse_expr.parse(input) {
        Ok(item) => {
            let mut scopes = Scopes::default();
            item.into_node(grammar, nonterminal, &mut scopes)
        }
        Err(err) => Err(ParseError::Other(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use crate::grammar::{BoundVarSpec, Grammar};

    fn grammar() -> Grammar {
        let mut g = Grammar::new();
        g.add_rule("EXPR", "five", None, 1.0).unwrap();
        g.add_rule("EXPR", "set_", Some(&[]), 1.0).unwrap();
        g.add_rule("EXPR", "plus", Some(&["EXPR", "EXPR"]), 1.0).unwrap();
        g.add_rule("START", "", Some(&["EXPR"]), 1.0).unwrap();
        g.add_binding_rule(
            "EXPR",
            "lambda",
            Some(&["EXPR"]),
            1.0,
            BoundVarSpec::new("EXPR", None),
        )
        .unwrap();
        g
    }

    #[test]
    fn parse_distinguishes_terminal_and_thunk() {
        let g = grammar();
        let terminal = g.parse("five", "EXPR").unwrap();
        assert!(terminal.is_terminal());
        let thunk = g.parse("set_()", "EXPR").unwrap();
        assert!(!thunk.is_terminal());
        assert_eq!(thunk.children.as_deref(), Some(&[][..]));
        assert!(g.parse("five()", "EXPR").is_err());
        assert!(g.parse("set_", "EXPR").is_err());
    }

    #[test]
    fn parse_resolves_bound_variables_by_scope() {
        let g = grammar();
        let tree = g.parse("lambda(plus(y1,five))", "EXPR").unwrap();
        assert_eq!(tree.to_string(), "lambda(plus(y1,five))");
        assert!(g.log_probability(&tree).unwrap().is_finite());
        // out of scope: y1 does not exist without the lambda
        assert!(g.parse("plus(y1,five)", "EXPR").is_err());
    }

    #[test]
    fn parse_pass_through_rules() {
        let g = grammar();
        let tree = g.parse("plus(five,five)", "START").unwrap();
        assert_eq!(tree.name, "");
        assert_eq!(tree.nonterminal, "START");
        assert_eq!(tree.to_string(), "plus(five,five)");
    }

    #[test]
    fn parse_thunks_in_argument_position() {
        let g = grammar();
        let tree = g.parse("plus(set_(),five)", "EXPR").unwrap();
        assert_eq!(tree.to_string(), "plus(set_(),five)");
        assert_eq!(g.parse(&tree.to_string(), "EXPR").unwrap(), tree);
        // an empty item name is never a rule
        assert!(g.parse("", "EXPR").is_err());
        assert!(g.parse("()", "EXPR").is_err());
    }

    #[test]
    fn parse_tolerates_whitespace() {
        let g = grammar();
        let a = g.parse("plus( five , plus(five,five) )", "EXPR").unwrap();
        let b = g.parse("plus(five,plus(five,five))", "EXPR").unwrap();
        assert_eq!(a, b);
    }
}
