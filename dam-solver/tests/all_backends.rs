#![allow(unused_macros)]
use rstest_reuse::template;

// A testing "template" injecting each in-process backend into a test

#[template]
#[rstest]
#[case::microlp(dam_solver::MilpSolver::new(dam_solver::Engine::MicroLp))]
#[case::default(dam_solver::MilpSolver::default())]
pub fn all_backends(#[case] backend: impl dam_solver::Backend + 'static) -> () {}
