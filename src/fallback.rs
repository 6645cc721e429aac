/// Sequential fallback over alternative interpretations of one input.
///
/// Some scraped fields arrive in several incompatible shapes and the right
/// one cannot be known without trying. A chain holds the original input and
/// runs parse attempts against it in order: the first success resolves the
/// chain and later attempts become no-ops. An attempt may fail in a way the
/// caller declared recoverable, in which case the failure is recorded and
/// the next attempt still sees the untouched original input. Any other
/// failure aborts the chain on the spot.
#[derive(Debug)]
pub struct FallbackChain<I, T, E> {
    input: I,
    resolved: Option<T>,
    last_miss: Option<E>,
}

impl<I, T, E> FallbackChain<I, T, E> {
    pub fn new(input: I) -> Self {
        FallbackChain {
            input,
            resolved: None,
            last_miss: None,
        }
    }

    /// Runs `parse` against the original input unless an earlier attempt
    /// already succeeded. `recoverable` decides whether a failure falls
    /// through to the next attempt or propagates immediately.
    pub fn attempt<F, R>(mut self, parse: F, recoverable: R) -> Result<Self, E>
    where
        F: FnOnce(&I) -> Result<T, E>,
        R: FnOnce(&E) -> bool,
    {
        if self.resolved.is_some() {
            return Ok(self);
        }
        match parse(&self.input) {
            Ok(value) => {
                self.resolved = Some(value);
                Ok(self)
            }
            Err(miss) if recoverable(&miss) => {
                self.last_miss = Some(miss);
                Ok(self)
            }
            Err(fatal) => Err(fatal),
        }
    }

    /// The resolved value, or `None` when every attempt missed. Never fails;
    /// callers decide whether an unresolved chain means "absent" or an error.
    pub fn finish(self) -> Option<T> {
        self.resolved
    }

    /// The failure recorded by the most recent recoverable miss.
    pub fn last_miss(&self) -> Option<&E> {
        self.last_miss.as_ref()
    }
}

#[cfg(test)]
#[derive(Debug, PartialEq)]
enum Miss {
    Soft,
    Hard,
}

#[test]
fn test_first_success_wins() {
    let chain = FallbackChain::<_, i32, Miss>::new("7")
        .attempt(|s| s.parse().map_err(|_| Miss::Soft), |m| *m == Miss::Soft)
        .unwrap()
        .attempt(|_| panic!("resolved chain must not run further attempts"), |m| {
            *m == Miss::Soft
        })
        .unwrap();
    assert_eq!(Some(7), chain.finish());
}

#[test]
fn test_recoverable_miss_falls_through_with_original_input() {
    let chain = FallbackChain::<_, i32, Miss>::new("42")
        .attempt(|_| Err(Miss::Soft), |m| *m == Miss::Soft)
        .unwrap()
        .attempt(
            |s| {
                // The second attempt must see the input, not the failure.
                assert_eq!(&"42", s);
                s.parse().map_err(|_| Miss::Soft)
            },
            |m| *m == Miss::Soft,
        )
        .unwrap();
    assert_eq!(Some(42), chain.finish());
}

#[test]
fn test_unrecoverable_miss_propagates() {
    let result = FallbackChain::<_, i32, Miss>::new("oops")
        .attempt(|_| Err(Miss::Hard), |m| *m == Miss::Soft);
    assert_eq!(Miss::Hard, result.unwrap_err());
}

#[test]
fn test_exhausted_chain_resolves_to_none() {
    let chain = FallbackChain::<_, i32, Miss>::new("oops")
        .attempt(|_| Err(Miss::Soft), |m| *m == Miss::Soft)
        .unwrap()
        .attempt(|_| Err(Miss::Soft), |m| *m == Miss::Soft)
        .unwrap();
    assert!(chain.last_miss().is_some());
    assert_eq!(None, chain.finish());
}
