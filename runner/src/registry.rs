//! Registered test cases and one-time pre-init hooks.
//!
//! Registration is two-phase: every case and hook is registered first, then
//! the session runs the hooks and the cases. Nothing here runs test code on
//! its own.

use std::marker::PhantomData;

use clap::ValueEnum;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::context::TestContext;
use crate::core::types::{Outcome, TestCaseInfo};

/// A runnable test case. `invoke` is called once per cycle, between a single
/// `set_up` and a single `tear_down`.
pub trait TestCase {
    fn info(&self) -> &TestCaseInfo;

    fn set_up(&mut self) {}

    fn invoke(&mut self, t: &mut TestContext<'_>) -> Outcome;

    fn tear_down(&mut self) {}
}

/// Plain function or closure case.
pub struct FunctionTest<F> {
    info: TestCaseInfo,
    body: F,
}

impl<F> FunctionTest<F>
where
    F: FnMut(&mut TestContext<'_>) -> Outcome,
{
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            info: TestCaseInfo::new(name),
            body,
        }
    }
}

impl<F> TestCase for FunctionTest<F>
where
    F: FnMut(&mut TestContext<'_>) -> Outcome,
{
    fn info(&self) -> &TestCaseInfo {
        &self.info
    }

    fn invoke(&mut self, t: &mut TestContext<'_>) -> Outcome {
        (self.body)(t)
    }
}

pub type Method<T> = fn(&mut T, &mut TestContext<'_>) -> Outcome;

/// Method case: a fresh `T` is built for every cycle.
pub struct MethodTest<T> {
    info: TestCaseInfo,
    method: Method<T>,
    _subject: PhantomData<fn() -> T>,
}

impl<T: Default> MethodTest<T> {
    pub fn new(name: impl Into<String>, method: Method<T>) -> Self {
        Self {
            info: TestCaseInfo::new(name),
            method,
            _subject: PhantomData,
        }
    }
}

impl<T: Default> TestCase for MethodTest<T> {
    fn info(&self) -> &TestCaseInfo {
        &self.info
    }

    fn invoke(&mut self, t: &mut TestContext<'_>) -> Outcome {
        let mut subject = T::default();
        (self.method)(&mut subject, t)
    }
}

/// Fixture case: one `T` is built in `set_up` and shared by every cycle.
pub struct FixtureTest<T> {
    info: TestCaseInfo,
    method: Method<T>,
    fixture: Option<T>,
}

impl<T: Default> FixtureTest<T> {
    pub fn new(name: impl Into<String>, method: Method<T>) -> Self {
        Self {
            info: TestCaseInfo::new(name),
            method,
            fixture: None,
        }
    }
}

impl<T: Default> TestCase for FixtureTest<T> {
    fn info(&self) -> &TestCaseInfo {
        &self.info
    }

    fn set_up(&mut self) {
        self.fixture = Some(T::default());
    }

    fn invoke(&mut self, t: &mut TestContext<'_>) -> Outcome {
        match self.fixture.as_mut() {
            Some(fixture) => (self.method)(fixture, t),
            None => Err(t.record_abort("fixture invoked before set_up")),
        }
    }

    fn tear_down(&mut self) {
        self.fixture = None;
    }
}

/// Order in which registered cases run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunOrder {
    /// By name; equal names keep declaration order.
    #[default]
    Lexicographic,
    Declaration,
    /// Shuffled; reproducible when a seed is given.
    Random,
}

pub type PreInit = Box<dyn FnMut()>;

#[derive(Default)]
pub struct Registry {
    cases: Vec<Box<dyn TestCase>>,
    pre_inits: Vec<PreInit>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, body: F) -> &mut Self
    where
        F: FnMut(&mut TestContext<'_>) -> Outcome + 'static,
    {
        self.register_case(Box::new(FunctionTest::new(name, body)))
    }

    pub fn register_method<T: Default + 'static>(
        &mut self,
        name: impl Into<String>,
        method: Method<T>,
    ) -> &mut Self {
        self.register_case(Box::new(MethodTest::new(name, method)))
    }

    pub fn register_fixture<T: Default + 'static>(
        &mut self,
        name: impl Into<String>,
        method: Method<T>,
    ) -> &mut Self {
        self.register_case(Box::new(FixtureTest::new(name, method)))
    }

    pub fn register_case(&mut self, case: Box<dyn TestCase>) -> &mut Self {
        self.cases.push(case);
        self
    }

    pub fn pre_init<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut() + 'static,
    {
        self.pre_inits.push(Box::new(hook));
        self
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub(crate) fn run_pre_inits(&mut self) {
        for hook in &mut self.pre_inits {
            hook();
        }
    }

    /// Indices of the registered cases in run order.
    pub fn ordered(&self, order: RunOrder, seed: Option<u64>) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.cases.len()).collect();
        match order {
            RunOrder::Lexicographic => {
                // Stable sort keeps declaration order for equal names.
                indices.sort_by(|a, b| self.cases[*a].info().name.cmp(&self.cases[*b].info().name));
            }
            RunOrder::Declaration => {}
            RunOrder::Random => {
                let mut rng = match seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                indices.shuffle(&mut rng);
            }
        }
        indices
    }

    pub fn info(&self, index: usize) -> &TestCaseInfo {
        self.cases[index].info()
    }

    pub(crate) fn case_mut(&mut self, index: usize) -> &mut dyn TestCase {
        self.cases[index].as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(registry: &Registry, order: RunOrder, seed: Option<u64>) -> Vec<String> {
        registry
            .ordered(order, seed)
            .into_iter()
            .map(|index| registry.info(index).name.clone())
            .collect()
    }

    fn sample() -> Registry {
        let mut registry = Registry::new();
        registry
            .register("charlie", |_| Ok(()))
            .register("alpha", |_| Ok(()))
            .register("bravo", |_| Ok(()))
            .register("alpha", |_| Ok(()));
        registry
    }

    #[test]
    fn lexicographic_order_is_stable_for_equal_names() {
        let registry = sample();
        let ordered = registry.ordered(RunOrder::Lexicographic, None);
        assert_eq!(ordered, vec![1, 3, 2, 0]);
    }

    #[test]
    fn declaration_order_keeps_registration_order() {
        let registry = sample();
        assert_eq!(
            names(&registry, RunOrder::Declaration, None),
            vec!["charlie", "alpha", "bravo", "alpha"]
        );
    }

    #[test]
    fn random_order_is_reproducible_with_a_seed() {
        let registry = sample();
        let first = names(&registry, RunOrder::Random, Some(7));
        let second = names(&registry, RunOrder::Random, Some(7));
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["alpha", "alpha", "bravo", "charlie"]);
    }

    #[test]
    fn pre_init_hooks_run_in_registration_order() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = Registry::new();
        let first = Rc::clone(&calls);
        let second = Rc::clone(&calls);
        registry
            .pre_init(move || first.borrow_mut().push("first"))
            .pre_init(move || second.borrow_mut().push("second"));

        registry.run_pre_inits();
        assert_eq!(*calls.borrow(), vec!["first", "second"]);
    }
}
