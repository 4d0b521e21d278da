//! Tagged per-element results returned by the orchestrators.
//!
//! Orchestrators collect results in completion order, so every outcome keeps
//! a tag (the source index or the item key) letting callers restore the
//! original order when they need it.

/// The result of one concurrent unit of work, tagged with the index of the
/// source or handler that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T, E> {
    /// Index of the originating source/handler in the input collection.
    pub index: usize,
    /// The element's own success or failure; one element failing never fails
    /// the whole operation.
    pub result: Result<T, E>,
}

impl<T, E> Outcome<T, E> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn is_err(&self) -> bool {
        self.result.is_err()
    }
}

/// A sharded item's result, tagged with its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedOutcome<K, T, E> {
    /// The item's key, as submitted.
    pub key: K,
    /// The handler's success or failure for this item.
    pub result: Result<T, E>,
}

impl<K, T, E> KeyedOutcome<K, T, E> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn is_err(&self) -> bool {
        self.result.is_err()
    }
}

/// Sort outcomes back into input order, in place.
pub fn sort_by_index<T, E>(outcomes: &mut [Outcome<T, E>]) {
    outcomes.sort_by_key(|o| o.index);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_reflect_result() {
        let ok: Outcome<u32, &str> = Outcome { index: 0, result: Ok(1) };
        assert!(ok.is_ok());
        let err: Outcome<u32, &str> = Outcome { index: 1, result: Err("nope") };
        assert!(err.is_err());
        let keyed: KeyedOutcome<&str, u32, &str> =
            KeyedOutcome { key: "a", result: Ok(2) };
        assert!(keyed.is_ok());
    }

    #[test]
    fn sort_restores_input_order() {
        let mut outcomes: Vec<Outcome<u32, &str>> = vec![
            Outcome { index: 2, result: Ok(2) },
            Outcome { index: 0, result: Ok(0) },
            Outcome { index: 1, result: Err("x") },
        ];
        sort_by_index(&mut outcomes);
        let indices: Vec<usize> = outcomes.iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
