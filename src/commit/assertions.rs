use crate::commit::tx::Condition;
use crate::error::StoreError;
use crate::storage::types::Item;

const MAX_CONDITION_DEPTH: usize = 16;

pub fn validate_condition(condition: &Condition) -> Result<(), StoreError> {
    validate_at_depth(condition, 0)
}

fn validate_at_depth(condition: &Condition, depth: usize) -> Result<(), StoreError> {
    if depth > MAX_CONDITION_DEPTH {
        return Err(StoreError::Validation(format!(
            "condition nesting exceeds {MAX_CONDITION_DEPTH}"
        )));
    }
    match condition {
        Condition::AttributeExists(attribute)
        | Condition::AttributeNotExists(attribute)
        | Condition::Equals { attribute, .. } => {
            if attribute.is_empty() {
                return Err(StoreError::Validation(
                    "condition attribute name is empty".into(),
                ));
            }
            Ok(())
        }
        Condition::All(inner) | Condition::Any(inner) => {
            if inner.is_empty() {
                return Err(StoreError::Validation(
                    "compound condition has no operands".into(),
                ));
            }
            for c in inner {
                validate_at_depth(c, depth + 1)?;
            }
            Ok(())
        }
        Condition::Not(inner) => validate_at_depth(inner, depth + 1),
    }
}

/// Evaluates `condition` against the stored item, `None` meaning no item.
pub fn evaluate_condition(item: Option<&Item>, condition: &Condition) -> bool {
    match condition {
        Condition::AttributeExists(attribute) => item.is_some_and(|i| i.contains(attribute)),
        Condition::AttributeNotExists(attribute) => !item.is_some_and(|i| i.contains(attribute)),
        Condition::Equals { attribute, value } => {
            item.and_then(|i| i.get(attribute)) == Some(value)
        }
        Condition::All(inner) => inner.iter().all(|c| evaluate_condition(item, c)),
        Condition::Any(inner) => inner.iter().any(|c| evaluate_condition(item, c)),
        Condition::Not(inner) => !evaluate_condition(item, inner),
    }
}

#[cfg(test)]
mod tests {
    use super::{evaluate_condition, validate_condition};
    use crate::commit::tx::Condition;
    use crate::storage::types::Item;

    #[test]
    fn missing_item_has_no_attributes() {
        assert!(evaluate_condition(None, &Condition::not_exists("P")));
        assert!(!evaluate_condition(None, &Condition::exists("P")));
        assert!(!evaluate_condition(None, &Condition::equals("V", 0i64)));
    }

    #[test]
    fn versioned_update_condition_requires_both_clauses() {
        let condition = Condition::exists("P").and(Condition::equals("V", 3i64));
        let current = Item::new().with("P", "+15550001").with("V", 3i64);
        let stale = Item::new().with("P", "+15550001").with("V", 4i64);
        let headless = Item::new().with("V", 3i64);
        assert!(evaluate_condition(Some(&current), &condition));
        assert!(!evaluate_condition(Some(&stale), &condition));
        assert!(!evaluate_condition(Some(&headless), &condition));
    }

    #[test]
    fn idempotent_put_condition_accepts_absent_or_matching_owner() {
        let condition = Condition::not_exists("P").or(Condition::equals("P", "+15550001"));
        let same = Item::new().with("P", "+15550001");
        let other = Item::new().with("P", "+15550002");
        assert!(evaluate_condition(None, &condition));
        assert!(evaluate_condition(Some(&same), &condition));
        assert!(!evaluate_condition(Some(&other), &condition));
        assert!(!evaluate_condition(
            Some(&same),
            &Condition::Not(Box::new(condition))
        ));
    }

    #[test]
    fn empty_compound_conditions_are_rejected() {
        assert!(validate_condition(&Condition::All(Vec::new())).is_err());
        assert!(validate_condition(&Condition::not_exists("")).is_err());

        let mut deep = Condition::exists("P");
        for _ in 0..20 {
            deep = Condition::Not(Box::new(deep));
        }
        assert!(validate_condition(&deep).is_err());
    }
}
