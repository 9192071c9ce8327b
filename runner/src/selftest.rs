//! Built-in suite run by the `sectrun` binary.
//!
//! Each case checks the engine's own exploration rules from inside a test
//! body. Fixture cases keep state across cycles, so the last cycle of a case
//! can verify what the earlier cycles did.

use std::thread;

use tracing::debug;

use crate::context::TestContext;
use crate::core::types::Outcome;
use crate::registry::Registry;
use crate::{check, check_eq, require, require_eq};

pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .pre_init(|| debug!("self-test suite registered"))
        .register_fixture("sections.single", single_section)
        .register_fixture("sections.siblings", sibling_sections)
        .register_fixture("sections.nested", nested_sections)
        .register_fixture("loops.ordinal", ordinal_loop)
        .register("loops.each", each_loop)
        .register("loops.empty", empty_loop)
        .register("assertions.macros", assertion_macros)
        .register("assertions.threads", worker_threads)
        .register("assertions.should_panic", should_panic)
        .register_method("cases.fresh_subject", fresh_subject);
    registry
}

#[derive(Debug, Default)]
struct Visits {
    shared: u32,
    a: u32,
    b: u32,
    x: u32,
    y: u32,
}

fn single_section(v: &mut Visits, t: &mut TestContext<'_>) -> Outcome {
    v.shared += 1;
    t.section("A", |t| {
        v.a += 1;
        require_eq!(t, v.a, 1)
    })?;
    check_eq!(t, v.shared, 1);
    Ok(())
}

fn sibling_sections(v: &mut Visits, t: &mut TestContext<'_>) -> Outcome {
    v.shared += 1;
    t.section("A", |t| {
        v.a += 1;
        check_eq!(t, v.b, 0);
        Ok(())
    })?;
    t.section("B", |t| {
        v.b += 1;
        // B is only reachable on the second cycle.
        check_eq!(t, v.shared, 2);
        check_eq!(t, v.a, 1);
        Ok(())
    })
}

fn nested_sections(v: &mut Visits, t: &mut TestContext<'_>) -> Outcome {
    t.section("A", |t| {
        v.a += 1;
        t.section("X", |t| {
            v.x += 1;
            check_eq!(t, v.y, 0);
            Ok(())
        })?;
        t.section("Y", |t| {
            v.y += 1;
            check_eq!(t, v.a, 2);
            check_eq!(t, v.x, 1);
            Ok(())
        })
    })
}

#[derive(Debug, Default)]
struct Ordinals {
    seen: Vec<usize>,
    children: Vec<usize>,
}

fn ordinal_loop(o: &mut Ordinals, t: &mut TestContext<'_>) -> Outcome {
    let Some(i) = t.ordinal("i", 3)? else {
        return Ok(());
    };
    o.seen.push(i);
    t.section("child", |t| {
        o.children.push(i);
        Ok(())
    })?;
    if i == 2 {
        check_eq!(t, o.seen, vec![0, 1, 2]);
        check_eq!(t, o.children, vec![0, 1, 2]);
    }
    Ok(())
}

fn each_loop(t: &mut TestContext<'_>) -> Outcome {
    const PRIMES: [u64; 4] = [2, 3, 5, 7];
    if let Some(p) = t.each("prime", &PRIMES)? {
        let divisors = (2..*p).filter(|d| p % d == 0).count();
        check_eq!(t, divisors, 0);
    }
    Ok(())
}

fn empty_loop(t: &mut TestContext<'_>) -> Outcome {
    let entered = t.ordinal("nothing", 0)?;
    check!(t, entered.is_none());
    Ok(())
}

fn assertion_macros(t: &mut TestContext<'_>) -> Outcome {
    let words = ["alpha", "beta"];
    check!(t, words.len() == 2);
    require!(t, words.contains(&"beta"))?;
    require_eq!(t, words.join("+"), "alpha+beta")?;
    t.log("macros evaluated");
    Ok(())
}

fn worker_threads(t: &mut TestContext<'_>) -> Outcome {
    let recorder = t.recorder();
    thread::scope(|scope| {
        for worker in 0..4u32 {
            let recorder = recorder.clone();
            scope.spawn(move || {
                let square = worker * worker;
                recorder.check(square >= worker, format!("worker {worker}"));
            });
        }
    });
    t.checkpoint()?;
    check!(t, !t.is_failed());
    Ok(())
}

fn should_panic(t: &mut TestContext<'_>) -> Outcome {
    t.section_should_panic("index out of range", |_| {
        let values: Vec<u32> = Vec::new();
        let index = values.len() + 1;
        let _ = values[index];
        Ok(())
    })
}

#[derive(Debug, Default)]
struct Counter {
    hits: u32,
}

fn fresh_subject(c: &mut Counter, t: &mut TestContext<'_>) -> Outcome {
    c.hits += 1;
    t.section("first", |t| {
        check_eq!(t, c.hits, 1);
        Ok(())
    })?;
    t.section("second", |t| {
        check_eq!(t, c.hits, 1);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TestSession;
    use crate::test_support::RecordingReport;

    #[test]
    fn self_test_suite_passes() {
        let report = RecordingReport::new();
        let mut session = TestSession::new(registry(), Box::new(report.clone()));
        session.run_pre_inits();
        let outcome = session.run_all().expect("run");

        assert!(outcome.result.passed(), "{:?}", report.events());
        assert_eq!(outcome.result.failed_assertions, 0);
        assert_eq!(outcome.cases.len(), 10);
    }

    #[test]
    fn cycle_counts_follow_the_section_layout() {
        let report = RecordingReport::new();
        let mut session = TestSession::new(registry(), Box::new(report));
        session.run_pre_inits();
        let outcome = session.run_all().expect("run");

        let cycles = |name: &str| {
            outcome
                .cases
                .iter()
                .find(|case| case.name == name)
                .map(|case| case.tally.cycles)
        };
        assert_eq!(cycles("sections.single"), Some(1));
        assert_eq!(cycles("sections.siblings"), Some(2));
        assert_eq!(cycles("sections.nested"), Some(2));
        assert_eq!(cycles("loops.ordinal"), Some(3));
        assert_eq!(cycles("loops.each"), Some(4));
        assert_eq!(cycles("loops.empty"), Some(1));
        assert_eq!(cycles("cases.fresh_subject"), Some(2));
    }
}
