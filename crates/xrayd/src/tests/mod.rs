//! Test suites for the supervisor.

mod supervisor_run;
pub(crate) mod support;
