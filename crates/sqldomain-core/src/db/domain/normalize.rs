use crate::db::domain::{DomainError, node::DomainNode, operator::DomainOperator};
use tracing::warn;

///
/// Normalize a domain into explicit prefix form.
///
/// - an empty domain becomes `[TRUE_LEAF]`
/// - a bare leaf becomes a singleton list
/// - implicit top-level conjunction becomes an explicit leading `&`
///
/// Every top-level term consumes one operand slot and every operator opens
/// `arity - 1` more. A domain whose slots do not balance is rejected.
///
pub fn normalize(domain: &DomainNode) -> Result<DomainNode, DomainError> {
    if domain.is_leaf() || domain.is_value() {
        return normalize(&DomainNode::list([domain.clone()]));
    }
    if domain.is_empty() {
        return Ok(DomainNode::list([DomainNode::true_leaf()]));
    }

    let mut result = DomainNode::new();
    let mut expected: i32 = 1;

    for term in domain.items() {
        if expected == 0 {
            result.insert(0, DomainNode::op(DomainOperator::And));
            expected = 1;
        }

        result.push(term.clone());
        expected += term.domain_operator().map_or(0, DomainOperator::arity) - 1;
    }

    if expected != 0 {
        warn!(domain = %domain, expected, "domain is syntactically unbalanced");
        return Err(DomainError::Unbalanced {
            domain: domain.string(),
        });
    }

    Ok(result)
}

/// True when a prefix-form domain consumes exactly its top-level terms.
#[must_use]
pub fn is_balanced(domain: &DomainNode) -> bool {
    let mut expected: i32 = 1;
    for term in domain.items() {
        if expected <= 0 {
            return false;
        }
        expected += term.domain_operator().map_or(0, DomainOperator::arity) - 1;
    }

    expected == 0
}
