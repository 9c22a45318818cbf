use crate::db::domain::{node::DomainNode, operator::DomainOperator};

///
/// Push every `!` of a normalized domain down onto its leaves.
///
/// Negated `&` / `|` become their De Morgan dual and negated leaves take the
/// negated term operator, so the SQL layer never has to wrap `IN` or `LIKE`
/// in `NOT (...)`. Leaves whose operator has no negation stay behind an
/// explicit `!`.
///
#[must_use]
pub fn distribute_not(domain: &DomainNode) -> DomainNode {
    let mut result = DomainNode::new();
    let mut stack = vec![false];

    for token in domain.items() {
        let negate = stack.pop().unwrap_or(false);

        if token.is_leaf() {
            if negate {
                push_negated_leaf(&mut result, token);
            } else {
                result.push(token.clone());
            }
            continue;
        }

        match token.domain_operator() {
            Some(DomainOperator::Not) => stack.push(!negate),
            Some(op) => {
                let emitted = match op.dual() {
                    Some(dual) if negate => dual,
                    _ => op,
                };
                result.push(DomainNode::op(emitted));
                stack.push(negate);
                stack.push(negate);
            }
            None => result.push(token.clone()),
        }
    }

    result
}

// Rewrites the operator, or emits `!` ahead of the unchanged leaf when no
// negation exists. TRUE and FALSE leaves swap.
fn push_negated_leaf(result: &mut DomainNode, leaf: &DomainNode) {
    if leaf.is_true_leaf() {
        result.push(DomainNode::false_leaf());
        return;
    }
    if leaf.is_false_leaf() {
        result.push(DomainNode::true_leaf());
        return;
    }

    let items = leaf.items();
    match items[1].term_operator().and_then(|op| op.negate()) {
        Some(negated) => result.push(DomainNode::list([
            items[0].clone(),
            DomainNode::value(negated.to_string()),
            items[2].clone(),
        ])),
        None => {
            result.push(DomainNode::op(DomainOperator::Not));
            result.push(leaf.clone());
        }
    }
}
