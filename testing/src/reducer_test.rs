//! Given-When-Then harness for reducers.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use appeals_core::reducer::Reducer;
use std::fmt::Debug;

type StateAssertion<S> = Box<dyn FnOnce(&S)>;
type EffectAssertion<F> = Box<dyn FnOnce(&[F])>;
type ErrorAssertion<X> = Box<dyn FnOnce(&X)>;

/// Fluent API for testing reducers.
///
/// Either effect assertions or an error assertion may be registered, not both.
/// A rejected action must leave the state untouched; `run` checks that too.
///
/// # Example
///
/// ```ignore
/// use appeals_testing::ReducerTest;
///
/// ReducerTest::new(TicketReducer)
///     .with_env(TicketEnvironment::default())
///     .given_state(open_ticket())
///     .when_action(claim_by(BOB))
///     .then_state(|state| assert_eq!(state.ticket.status, TicketStatus::InProgress))
///     .then_effects(|effects| assert_eq!(effects.len(), 4))
///     .run();
/// ```
pub struct ReducerTest<R>
where
    R: Reducer,
{
    reducer: R,
    environment: Option<R::Environment>,
    initial_state: Option<R::State>,
    action: Option<R::Action>,
    state_assertions: Vec<StateAssertion<R::State>>,
    effect_assertions: Vec<EffectAssertion<R::Effect>>,
    error_assertion: Option<ErrorAssertion<R::Error>>,
}

impl<R> ReducerTest<R>
where
    R: Reducer,
    R::State: Clone + PartialEq + Debug,
    R::Effect: Debug,
    R::Error: Debug,
{
    /// Create a new reducer test with the given reducer.
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            action: None,
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
            error_assertion: None,
        }
    }

    /// Set the environment (Given).
    #[must_use]
    pub fn with_env(mut self, env: R::Environment) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given).
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Set the action under test (When).
    #[must_use]
    pub fn when_action(mut self, action: R::Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Assert on the resulting state (Then).
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Assert on the resulting effects (Then).
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[R::Effect]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Expect the action to be rejected (Then).
    #[must_use]
    pub fn then_error<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::Error) + 'static,
    {
        self.error_assertion = Some(Box::new(assertion));
        self
    }

    /// Run the reducer and every assertion.
    ///
    /// # Panics
    ///
    /// Panics if state, action or environment is missing, if the outcome does not
    /// match the expectation, or if any assertion fails.
    #[allow(clippy::panic, clippy::expect_used)]
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");
        let action = self.action.expect("Action must be set with when_action()");
        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        let before = state.clone();
        let outcome = self.reducer.reduce(&mut state, action, &env);

        match (outcome, self.error_assertion) {
            (Ok(effects), None) => {
                for assertion in self.effect_assertions {
                    assertion(&effects);
                }
            }
            (Ok(effects), Some(_)) => {
                panic!("Expected the action to be rejected, but it produced {effects:?}")
            }
            (Err(error), Some(assertion)) => {
                assert_eq!(state, before, "A rejected action must not change state");
                assertion(&error);
            }
            (Err(error), None) => panic!("Action was rejected: {error:?}"),
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }
    }
}

/// Helper assertions for effect lists.
pub mod assertions {
    use std::fmt::Debug;

    /// Assert that there are no effects.
    ///
    /// # Panics
    ///
    /// Panics if `effects` is not empty.
    pub fn assert_no_effects<F: Debug>(effects: &[F]) {
        assert!(
            effects.is_empty(),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects.
    ///
    /// # Panics
    ///
    /// Panics if the count differs.
    pub fn assert_effects_count<F: Debug>(effects: &[F], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {expected} effects, but found {effects:?}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appeals_core::{smallvec, SmallVec};

    #[derive(Clone, Debug, PartialEq)]
    struct Counter {
        count: i32,
    }

    #[derive(Debug)]
    enum CounterAction {
        Increment,
        Decrement,
    }

    struct CounterReducer;

    impl Reducer for CounterReducer {
        type State = Counter;
        type Action = CounterAction;
        type Environment = ();
        type Effect = i32;
        type Error = String;

        fn reduce(
            &self,
            state: &mut Counter,
            action: CounterAction,
            _env: &(),
        ) -> Result<SmallVec<[i32; 4]>, String> {
            match action {
                CounterAction::Increment => {
                    state.count += 1;
                    Ok(smallvec![state.count])
                }
                CounterAction::Decrement if state.count == 0 => Err("already zero".into()),
                CounterAction::Decrement => {
                    state.count -= 1;
                    Ok(SmallVec::new())
                }
            }
        }
    }

    #[test]
    fn test_effects_and_state() {
        ReducerTest::new(CounterReducer)
            .with_env(())
            .given_state(Counter { count: 0 })
            .when_action(CounterAction::Increment)
            .then_state(|state| assert_eq!(state.count, 1))
            .then_effects(|effects| assert_eq!(effects, [1]))
            .run();
    }

    #[test]
    fn test_rejection() {
        ReducerTest::new(CounterReducer)
            .with_env(())
            .given_state(Counter { count: 0 })
            .when_action(CounterAction::Decrement)
            .then_error(|error| assert_eq!(error, "already zero"))
            .then_state(|state| assert_eq!(state.count, 0))
            .run();
    }

    #[test]
    fn test_assertions() {
        assertions::assert_no_effects::<i32>(&[]);
        assertions::assert_effects_count(&[1, 2], 2);
    }
}
